use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::user::Role;

const REFRESH_TYPE: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<ObjectId> {
        ObjectId::parse_str(&self.sub).map_err(|_| AppError::TokenInvalid)
    }

    fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some(REFRESH_TYPE)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Issues and verifies the access/refresh token pair. Each kind has its own
/// secret, so a refresh token never passes as an access token.
#[derive(Clone)]
pub struct TokenService {
    access_key: (EncodingKey, DecodingKey),
    refresh_key: (EncodingKey, DecodingKey),
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        TokenService {
            access_key: (
                EncodingKey::from_secret(access_secret.as_bytes()),
                DecodingKey::from_secret(access_secret.as_bytes()),
            ),
            refresh_key: (
                EncodingKey::from_secret(refresh_secret.as_bytes()),
                DecodingKey::from_secret(refresh_secret.as_bytes()),
            ),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.jwt_expire,
            config.jwt_refresh_expire,
        )
    }

    pub fn issue_pair(&self, user_id: &ObjectId, role: Role) -> Result<TokenPair> {
        Ok(TokenPair {
            token: self.sign(user_id, role, None, self.access_ttl, &self.access_key.0)?,
            refresh_token: self.sign(
                user_id,
                role,
                Some(REFRESH_TYPE),
                self.refresh_ttl,
                &self.refresh_key.0,
            )?,
            expires_in: self.access_ttl.as_secs(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims> {
        let claims = Self::decode(token, &self.access_key.1)?;
        if claims.is_refresh() {
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims> {
        let claims = Self::decode(token, &self.refresh_key.1)?;
        if !claims.is_refresh() {
            return Err(AppError::TokenInvalid);
        }
        Ok(claims)
    }

    fn sign(
        &self,
        user_id: &ObjectId,
        role: Role,
        token_type: Option<&str>,
        ttl: Duration,
        key: &EncodingKey,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_hex(),
            role,
            iat: now,
            exp: now + ttl.as_secs() as i64,
            token_type: token_type.map(str::to_string),
        };
        encode(&Header::default(), &claims, key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    fn decode(token: &str, key: &DecodingKey) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Ok(decode::<Claims>(token, key, &validation)?.claims)
    }
}
