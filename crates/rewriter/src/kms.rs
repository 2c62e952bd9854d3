//! HTTP client for the remote key service.
//!
//! The key service is an external collaborator that stores and serves named
//! key material over a small REST surface:
//!
//! - `GET  {base}/v1/key/{name}/_currentversion`: current material for a key
//! - `POST {base}/v1/keys`: create a key (never overwrites)
//! - `DELETE {base}/v1/key/{name}`: delete a key
//!
//! Material travels Base64-encoded inside JSON bodies. HTTP statuses map
//! onto the [`KeyError`] taxonomy: 404 means the key does not exist, 401/403
//! mean the caller is not authorized, and anything else, including a
//! timeout, means the service is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crypto::{Key, KeyError, KeyProvider};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::util::{decode_base64, encode_base64};

/// JSON body for key-material responses and creation requests.
#[derive(Debug, Serialize, Deserialize)]
struct KeyMaterial {
    name: String,
    cipher: String,
    /// Base64-encoded key material.
    material: String,
}

/// Key-service client speaking the REST surface above.
#[derive(Debug)]
pub struct KmsClient {
    base: Url,
    http: reqwest::Client,
}

impl KmsClient {
    /// Build a client for the given endpoint URI.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unavailable`] for unparseable URIs, unsupported
    /// schemes, or an HTTP client that cannot be constructed.
    pub fn new(uri: &str, timeout: Duration) -> Result<Self, KeyError> {
        let mut base = Url::parse(uri)
            .map_err(|e| KeyError::Unavailable(format!("invalid key service URI {uri}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(KeyError::Unavailable(format!(
                "unsupported key service scheme: {}",
                base.scheme()
            )));
        }
        // Url::join treats a path without a trailing slash as a file and
        // would drop its last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyError::Unavailable(e.to_string()))?;

        Ok(Self { base, http })
    }

    fn current_version_url(&self, name: &str) -> Result<Url, KeyError> {
        self.base
            .join(&format!("v1/key/{name}/_currentversion"))
            .map_err(|e| KeyError::Unavailable(e.to_string()))
    }

    fn keys_url(&self) -> Result<Url, KeyError> {
        self.base
            .join("v1/keys")
            .map_err(|e| KeyError::Unavailable(e.to_string()))
    }

    fn key_url(&self, name: &str) -> Result<Url, KeyError> {
        self.base
            .join(&format!("v1/key/{name}"))
            .map_err(|e| KeyError::Unavailable(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> KeyError {
    KeyError::Unavailable(err.to_string())
}

fn is_unauthorized(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

#[async_trait]
impl KeyProvider for KmsClient {
    async fn get_key(&self, name: &str) -> Result<Option<Key>, KeyError> {
        let url = self.current_version_url(name)?;
        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if is_unauthorized(status) {
            return Err(KeyError::Unauthorized(name.to_owned()));
        }
        if !status.is_success() {
            return Err(KeyError::Unavailable(format!(
                "key service returned {status} fetching key {name}"
            )));
        }

        let body: KeyMaterial = response
            .json()
            .await
            .map_err(|e| KeyError::InvalidResponse(e.to_string()))?;
        let material = decode_base64(&body.material)
            .map_err(|e| KeyError::InvalidResponse(format!("bad key material encoding: {e}")))?;
        Ok(Some(Key::new(name, material)))
    }

    async fn create_key(
        &self,
        name: &str,
        material: &[u8],
        cipher: &str,
    ) -> Result<Key, KeyError> {
        let body = KeyMaterial {
            name: name.to_owned(),
            cipher: cipher.to_owned(),
            material: encode_base64(material),
        };
        let response = self
            .http
            .post(self.keys_url()?)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(KeyError::AlreadyExists(name.to_owned()));
        }
        if is_unauthorized(status) {
            return Err(KeyError::Unauthorized(name.to_owned()));
        }
        if !status.is_success() {
            return Err(KeyError::Unavailable(format!(
                "key service returned {status} creating key {name}"
            )));
        }
        Ok(Key::new(name, material.to_vec()))
    }

    async fn delete_key(&self, name: &str) -> Result<(), KeyError> {
        let response = self
            .http
            .delete(self.key_url(name)?)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(KeyError::NotFound(name.to_owned()));
        }
        if is_unauthorized(status) {
            return Err(KeyError::Unauthorized(name.to_owned()));
        }
        if !status.is_success() {
            return Err(KeyError::Unavailable(format!(
                "key service returned {status} deleting key {name}"
            )));
        }
        Ok(())
    }
}

/// Build a key provider for a configured endpoint URI.
pub fn provider_for_uri(uri: &str, timeout: Duration) -> Result<Arc<dyn KeyProvider>, KeyError> {
    Ok(Arc::new(KmsClient::new(uri, timeout)?))
}
