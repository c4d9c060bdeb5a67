//! Authentication and authorization module
//!
//! JWT-based session auth for marketplace users and the admin back office.
//! Passwords are stored as salted SHA-256 digests; tokens carry the user id
//! and admin flag with an issuer check. Session lookups go through a single
//! shared, bounded, TTL-expiring cache so repeated requests with the same
//! token do not hit the database every time.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::Config,
    database::Database,
    error::{AppError, AppResult},
    models::{LoginRequest, LoginResponse, RegisterRequest, User, UserResponse},
};

/// JWT token claims containing user identity and permissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Authenticated actor context injected into request handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
}

/// Core authentication service handling tokens, credentials, and sessions
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    token_expiry: Duration,
    password_salt: String,
    // Single shared session cache, bounded and TTL-expiring; built once at
    // startup from config and injected everywhere through AppState.
    sessions: Cache<String, AuthUser>,
}

impl AuthService {
    /// Creates a new auth service with JWT and session-cache configuration
    pub fn new(config: &Config) -> Result<Self> {
        let encoding_key = EncodingKey::from_secret(config.auth.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.auth.jwt_secret.as_bytes());

        let sessions = Cache::builder()
            .max_capacity(config.cache.session_capacity)
            .time_to_live(std::time::Duration::from_secs(config.cache.session_ttl_secs))
            .build();

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: "gamestash".to_string(),
            token_expiry: Duration::hours(config.auth.jwt_expiry_hours),
            password_salt: config.auth.password_salt.clone(),
            sessions,
        })
    }

    /// Generates a JWT token for an authenticated user
    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.token_expiry;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to generate JWT token")
    }

    /// Validates and decodes a JWT token, returning claims if valid
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .context("Failed to validate JWT token")?;

        Ok(token_data.claims)
    }

    /// Produces the salted digest stored for a password
    pub fn hash_password(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.password_salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Checks a candidate password against a stored digest
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> bool {
        self.hash_password(password) == stored_hash
    }

    /// Registers a new user account
    pub async fn register_user(
        &self,
        database: &Database,
        payload: RegisterRequest,
    ) -> AppResult<LoginResponse> {
        if payload.password.len() < 8 {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        if !payload.email.contains('@') {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }

        if database.get_user_by_email(&payload.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = self.hash_password(&payload.password);
        let user = database
            .create_user(&payload.email, payload.username.as_deref(), &password_hash)
            .await?;

        self.login_response(&user)
    }

    /// Authenticates email/password credentials and returns a session token
    pub async fn login_user(
        &self,
        database: &Database,
        payload: LoginRequest,
    ) -> AppResult<LoginResponse> {
        let user = database
            .get_user_by_email(&payload.email)
            .await?
            .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

        if !self.verify_password(&payload.password, &user.password_hash) {
            return Err(AppError::Auth("Invalid credentials".to_string()));
        }

        database.update_user_last_login(user.id).await?;
        self.login_response(&user)
    }

    fn login_response(&self, user: &User) -> AppResult<LoginResponse> {
        let token = self.generate_token(user)?;
        Ok(LoginResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_expiry.num_seconds(),
            user: UserResponse::from(user.clone()),
        })
    }

    /// Resolves a bearer token to an authenticated actor
    ///
    /// Hits the session cache first; on a miss, validates the token and
    /// loads the user row, then caches the result for the configured TTL.
    pub async fn authenticate(&self, token: &str, database: &Database) -> AppResult<AuthUser> {
        if let Some(cached) = self.sessions.get(token).await {
            debug!("Session cache hit for user {}", cached.id);
            return Ok(cached);
        }

        let claims = self
            .validate_token(token)
            .map_err(|_| AppError::Auth("Invalid or expired token".to_string()))?;

        let user_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;

        let user = database
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Auth("User not found".to_string()))?;

        if !user.is_active {
            return Err(AppError::Auth("Account is deactivated".to_string()));
        }

        let auth_user = AuthUser {
            id: user.id,
            email: user.email,
            is_admin: user.is_admin,
            is_active: user.is_active,
        };

        self.sessions.insert(token.to_string(), auth_user.clone()).await;
        Ok(auth_user)
    }

    /// Drops a cached session, e.g. after an account-state change
    pub async fn invalidate_session(&self, token: &str) {
        self.sessions.invalidate(token).await;
    }
}

/// Rejects non-admin actors for back-office routes
pub fn require_admin(actor: &AuthUser) -> AppResult<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(AppError::Auth("Admin access required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, CacheConfig, Config, PaymentsConfig, StorageConfig};

    fn test_config() -> Config {
        Config {
            server_address: "0.0.0.0:0".to_string(),
            database_url: "postgresql://localhost/test".to_string(),
            database_max_connections: 1,
            auth: AuthConfig {
                jwt_secret: "this_is_a_very_long_jwt_secret_for_testing_purposes".to_string(),
                jwt_expiry_hours: 24,
                password_salt: "a_long_static_salt_value".to_string(),
            },
            payments: PaymentsConfig {
                webhook_secret: "whsec_test_0123456789".to_string(),
                signature_tolerance_secs: 300,
            },
            storage: StorageConfig {
                signing_secret: "storage_secret_0123456789".to_string(),
                public_base_url: "http://localhost:3000/files".to_string(),
                url_ttl_secs: 900,
            },
            cache: CacheConfig {
                session_capacity: 100,
                session_ttl_secs: 60,
            },
        }
    }

    fn test_user(service: &AuthService) -> User {
        User {
            id: Uuid::new_v4(),
            email: "tester@test.local".to_string(),
            username: Some("tester".to_string()),
            password_hash: service.hash_password("hunter2hunter2"),
            is_admin: false,
            is_active: true,
            total_views: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        }
    }

    /// Tests JWT token generation and validation round trip
    #[test]
    fn test_token_round_trip() {
        let service = AuthService::new(&test_config()).unwrap();
        let user = test_user(&service);

        let token = service.generate_token(&user).unwrap();
        assert!(!token.is_empty());

        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert!(!claims.is_admin);
    }

    /// Tests that tokens from a different issuer secret are rejected
    #[test]
    fn test_foreign_token_rejected() {
        let service = AuthService::new(&test_config()).unwrap();

        let mut other_config = test_config();
        other_config.auth.jwt_secret =
            "a_completely_different_secret_of_sufficient_length!!".to_string();
        let other = AuthService::new(&other_config).unwrap();

        let user = test_user(&service);
        let token = other.generate_token(&user).unwrap();

        assert!(service.validate_token(&token).is_err());
    }

    /// Tests password hashing and verification
    #[test]
    fn test_password_hashing() {
        let service = AuthService::new(&test_config()).unwrap();

        let digest = service.hash_password("hunter2hunter2");
        assert_ne!(digest, "hunter2hunter2");
        assert!(service.verify_password("hunter2hunter2", &digest));
        assert!(!service.verify_password("wrong-password", &digest));

        // Same password, different salt, different digest.
        let mut other_config = test_config();
        other_config.auth.password_salt = "another_static_salt_value".to_string();
        let other = AuthService::new(&other_config).unwrap();
        assert_ne!(other.hash_password("hunter2hunter2"), digest);
    }

    /// Tests admin gating
    #[test]
    fn test_require_admin() {
        let actor = AuthUser {
            id: Uuid::new_v4(),
            email: "user@test.local".to_string(),
            is_admin: false,
            is_active: true,
        };
        assert!(require_admin(&actor).is_err());

        let admin = AuthUser { is_admin: true, ..actor };
        assert!(require_admin(&admin).is_ok());
    }
}
