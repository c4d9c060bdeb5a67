//! Signed storage URLs
//!
//! Product files live in an external object store that accepts self-issued,
//! expiring URLs: the backend signs `"{method}:{key}:{expires}"` with a
//! shared HMAC-SHA256 secret and the store verifies the same signature on
//! delivery. The backend never proxies file bytes; it only mints upload URLs
//! for sellers and download URLs for verified buyers, and records the object
//! key on the product row.

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
    models::SignedUrlResponse,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Service minting and checking signed storage URLs
#[derive(Clone)]
pub struct StorageService {
    signing_secret: String,
    public_base_url: String,
    url_ttl_secs: i64,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            signing_secret: config.signing_secret.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            url_ttl_secs: config.url_ttl_secs as i64,
        }
    }

    /// Mints an expiring upload URL for a new object key
    ///
    /// The key is namespaced under the uploading user so sellers cannot
    /// collide with (or guess) each other's objects.
    pub fn sign_upload(&self, user_id: Uuid, file_name: &str) -> AppResult<SignedUrlResponse> {
        let sanitized = sanitize_file_name(file_name)?;
        let key = format!("uploads/{}/{}-{}", user_id, Uuid::new_v4(), sanitized);
        self.sign("PUT", &key)
    }

    /// Mints an expiring download URL for an existing object key
    pub fn sign_download(&self, key: &str) -> AppResult<SignedUrlResponse> {
        if key.is_empty() {
            return Err(AppError::Validation("Product has no stored file".to_string()));
        }
        self.sign("GET", key)
    }

    fn sign(&self, method: &str, key: &str) -> AppResult<SignedUrlResponse> {
        let expires = Utc::now().timestamp() + self.url_ttl_secs;
        let signature = self.signature(method, key, expires)?;

        let url = format!(
            "{}/{}?method={}&expires={}&signature={}",
            self.public_base_url, key, method, expires, signature
        );

        Ok(SignedUrlResponse {
            url,
            key: key.to_string(),
            expires_at: expires,
        })
    }

    /// Checks a presented signature for an object access
    ///
    /// The store-side counterpart of `sign`; kept here so both ends share
    /// one definition of the signing payload.
    pub fn verify(&self, method: &str, key: &str, expires: i64, signature: &str) -> AppResult<()> {
        if Utc::now().timestamp() > expires {
            return Err(AppError::Auth("Signed URL has expired".to_string()));
        }

        let digest = hex::decode(signature)
            .map_err(|_| AppError::Auth("Malformed URL signature".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|_| AppError::Config("Invalid storage signing secret".to_string()))?;
        mac.update(signing_payload(method, key, expires).as_bytes());

        mac.verify_slice(&digest)
            .map_err(|_| AppError::Auth("URL signature mismatch".to_string()))
    }

    fn signature(&self, method: &str, key: &str, expires: i64) -> AppResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|_| AppError::Config("Invalid storage signing secret".to_string()))?;
        mac.update(signing_payload(method, key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn signing_payload(method: &str, key: &str, expires: i64) -> String {
    format!("{}:{}:{}", method, key, expires)
}

/// Keeps only a safe basename: path separators and traversal sequences are
/// rejected rather than rewritten
fn sanitize_file_name(file_name: &str) -> AppResult<&str> {
    if file_name.is_empty() || file_name.len() > 255 {
        return Err(AppError::Validation("Invalid file name".to_string()));
    }
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(AppError::Validation("File name must be a plain basename".to_string()));
    }
    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn service() -> StorageService {
        StorageService::new(&StorageConfig {
            signing_secret: "storage_secret_0123456789".to_string(),
            public_base_url: "http://localhost:3000/files/".to_string(),
            url_ttl_secs: 900,
        })
    }

    /// Tests that a minted URL carries a signature its own service accepts
    #[test]
    fn test_sign_and_verify_round_trip() {
        let service = service();
        let signed = service.sign_download("uploads/abc/model.zip").unwrap();

        assert!(signed.url.starts_with("http://localhost:3000/files/uploads/abc/model.zip?"));
        assert!(signed.expires_at > Utc::now().timestamp());

        let signature = signed
            .url
            .rsplit_once("signature=")
            .map(|(_, s)| s.to_string())
            .unwrap();
        assert!(service
            .verify("GET", &signed.key, signed.expires_at, &signature)
            .is_ok());
    }

    /// Tests tamper and expiry rejection
    #[test]
    fn test_verify_rejections() {
        let service = service();
        let signed = service.sign_download("uploads/abc/model.zip").unwrap();
        let signature = signed.url.rsplit_once("signature=").map(|(_, s)| s.to_string()).unwrap();

        // Different key or method invalidates the signature.
        assert!(service
            .verify("GET", "uploads/abc/other.zip", signed.expires_at, &signature)
            .is_err());
        assert!(service
            .verify("PUT", &signed.key, signed.expires_at, &signature)
            .is_err());

        // An expiry in the past fails before any digest work.
        assert!(service.verify("GET", &signed.key, 1_000, &signature).is_err());

        // Garbage signature material.
        assert!(service
            .verify("GET", &signed.key, signed.expires_at, "not-hex!")
            .is_err());
    }

    /// Tests upload key namespacing and file name sanitation
    #[test]
    fn test_sign_upload_keys() {
        let service = service();
        let user_id = Uuid::new_v4();

        let signed = service.sign_upload(user_id, "scene.blend").unwrap();
        assert!(signed.key.starts_with(&format!("uploads/{}/", user_id)));
        assert!(signed.key.ends_with("-scene.blend"));

        assert!(service.sign_upload(user_id, "").is_err());
        assert!(service.sign_upload(user_id, "../etc/passwd").is_err());
        assert!(service.sign_upload(user_id, "a/b.zip").is_err());
    }

    /// Tests that two uploads of the same file name get distinct keys
    #[test]
    fn test_upload_keys_are_unique() {
        let service = service();
        let user_id = Uuid::new_v4();

        let first = service.sign_upload(user_id, "scene.blend").unwrap();
        let second = service.sign_upload(user_id, "scene.blend").unwrap();
        assert_ne!(first.key, second.key);
    }
}
