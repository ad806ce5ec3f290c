//! Authentication and authorization utilities
//!
//! Provides:
//! - Admin account storage
//! - Argon2 hashing for passwords and security codes
//! - JWT token generation and validation
//! - Admin context extraction for mutating routes

mod memory;

pub use memory::MemoryAccountStore;

use crate::errors::{AppError, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Scope carried by every admin token
pub const ADMIN_SCOPE: &str = "admin";

/// Shortest password accepted by a reset
pub const MIN_PASSWORD_LEN: usize = 6;

/// A stored admin console account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub security_code_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for admin accounts
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by its login name
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>>;

    /// The account a security-code reset applies to (the oldest one)
    async fn primary_account(&self) -> Result<Option<AdminAccount>>;

    /// Create an account from already-hashed secrets
    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        security_code_hash: &str,
    ) -> Result<AdminAccount>;

    /// Replace an account's password hash
    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<()>;
}

/// Hash a password or security code into a PHC string
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash secret: {}", e),
        })
}

/// Check a secret against a stored PHC string
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored hash is not a valid PHC string");
            false
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (admin username)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }

    /// Generate a new JWT token
    pub fn generate_token(&self, username: &str, scopes: Vec<String>) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: username.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            scopes,
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid token".to_string(),
                },
            })
    }
}

/// Token issued by a successful login
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login, security-code check and password reset for the admin console
#[derive(Clone)]
pub struct AdminAuth {
    accounts: Arc<dyn AccountStore>,
    jwt: Arc<JwtManager>,
}

impl AdminAuth {
    pub fn new(accounts: Arc<dyn AccountStore>, jwt: Arc<JwtManager>) -> Self {
        Self { accounts, jwt }
    }

    pub fn jwt(&self) -> Arc<JwtManager> {
        self.jwt.clone()
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let account = self
            .accounts
            .find_by_username(username.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_secret(password, &account.password_hash) {
            tracing::warn!(username = %account.username, "Rejected admin login");
            return Err(AppError::InvalidCredentials);
        }

        let token = self
            .jwt
            .generate_token(&account.username, vec![ADMIN_SCOPE.to_string()])?;
        tracing::info!(username = %account.username, "Admin logged in");

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.expiration_secs(),
        })
    }

    /// First step of the forgot-password flow
    pub async fn verify_passcode(&self, passcode: &str) -> Result<AdminAccount> {
        let account = self.accounts.primary_account().await?.ok_or_else(|| {
            AppError::Unauthorized {
                message: "No admin account is configured".to_string(),
            }
        })?;

        if !verify_secret(passcode, &account.security_code_hash) {
            return Err(AppError::Unauthorized {
                message: "Incorrect passcode".to_string(),
            });
        }
        Ok(account)
    }

    /// Replace the password after re-checking the security code
    pub async fn update_password(
        &self,
        security_code: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<()> {
        let account = self.verify_passcode(security_code).await?;

        if new_password.is_empty() {
            return Err(AppError::MissingField {
                field: "newPassword".to_string(),
            });
        }
        if confirm_password.is_empty() {
            return Err(AppError::MissingField {
                field: "confirmPassword".to_string(),
            });
        }
        if new_password != confirm_password {
            return Err(AppError::validation("confirmPassword", "New passwords do not match"));
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "newPassword",
                format!("Password should be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }

        let hash = hash_secret(new_password)?;
        self.accounts.update_password_hash(account.id, &hash).await?;
        tracing::info!(username = %account.username, "Admin password updated");
        Ok(())
    }

    /// Create the first admin account if none exists yet.
    ///
    /// Returns whether an account was created.
    pub async fn ensure_account(
        &self,
        username: &str,
        password: &str,
        security_code: &str,
    ) -> Result<bool> {
        if self.accounts.primary_account().await?.is_some() {
            return Ok(false);
        }

        let password_hash = hash_secret(password)?;
        let security_code_hash = hash_secret(security_code)?;
        self.accounts
            .create_account(username, &password_hash, &security_code_hash)
            .await?;
        tracing::info!(username = %username, "Bootstrap admin account created");
        Ok(true)
    }
}

/// Admin identity taken from a validated bearer token
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub username: String,
    pub scopes: Vec<String>,
}

impl AdminContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Extract the token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Axum extractor for AdminContext
impl<S> FromRequestParts<S> for AdminContext
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Expected a Bearer token".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let claims = jwt.validate_token(token)?;

        let context = AdminContext {
            username: claims.sub,
            scopes: claims.scopes,
        };
        if !context.has_scope(ADMIN_SCOPE) {
            return Err(AppError::Unauthorized {
                message: "Token does not grant admin access".to_string(),
            });
        }

        Ok(context)
    }
}
