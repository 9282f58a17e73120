use bcrypt::{hash, verify, DEFAULT_COST};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::errors::{AppError, Result};

pub fn hash_password(plain: &str) -> Result<String> {
    Ok(hash(plain, DEFAULT_COST)?)
}

pub fn verify_password(plain: &str, hashed: &str) -> Result<bool> {
    Ok(verify(plain, hashed)?)
}

/// bcrypt is CPU-bound; keep it off the async workers.
pub async fn hash_blocking(plain: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?
}

pub async fn verify_blocking(plain: String, hashed: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hashed))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?
}

/// One-time token for password reset and email verification links.
///
/// The raw value goes to the user; only its SHA-256 digest is stored.
pub struct OneTimeToken {
    pub raw: String,
    pub digest: String,
}

pub fn generate_one_time_token() -> OneTimeToken {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let digest = digest_token(&raw);
    OneTimeToken { raw, digest }
}

pub fn digest_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_round_trip() {
        let hashed = hash_password("correct horse").unwrap();
        assert_ne!(hashed, "correct horse");
        assert!(verify_password("correct horse", &hashed).unwrap());
        assert!(!verify_password("wrong horse", &hashed).unwrap());
    }

    #[tokio::test]
    async fn blocking_wrappers_agree() {
        let hashed = hash_blocking("s3cret!".into()).await.unwrap();
        assert!(verify_blocking("s3cret!".into(), hashed.clone()).await.unwrap());
        assert!(!verify_blocking("nope".into(), hashed).await.unwrap());
    }

    #[test]
    fn one_time_tokens_store_only_the_digest() {
        let token = generate_one_time_token();
        assert_eq!(token.raw.len(), 64);
        assert_eq!(token.digest, digest_token(&token.raw));
        assert_ne!(token.digest, token.raw);
        assert_ne!(generate_one_time_token().raw, token.raw);
    }
}
