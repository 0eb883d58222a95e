//! Authentication service: login against configured users and session tokens

use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, UserConfig};
use crate::error::{AppError, AppResult};
use shared::Role;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Username
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// Issued session token
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub username: String,
    pub role: Role,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<Vec<UserConfig>>,
    jwt_secret: String,
    access_token_expiry: i64,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(config: &Config) -> Self {
        Self {
            users: Arc::new(config.users.clone()),
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
        }
    }

    /// Authenticate a user with username and password
    pub fn login(&self, username: &str, password: &str) -> AppResult<AuthTokens> {
        let user = self
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username.trim()))
            .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            tracing::info!(username = %user.username, "Rejected login");
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(username = %user.username, role = %user.role, "User logged in");
        self.generate_token(&user.username, user.role)
    }

    /// Issue an access token
    pub fn generate_token(&self, username: &str, role: Role) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            role,
            exp: (now + Duration::seconds(self.access_token_expiry)).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(AuthTokens {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
            username: username.to_string(),
            role,
        })
    }

    /// Validate an access token and return its claims
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let mut config = Config::default();
        config.users = vec![UserConfig {
            username: "sara".into(),
            password_hash: bcrypt::hash("s3cret", 4).unwrap(),
            role: Role::Agent,
        }];
        AuthService::new(&config)
    }

    #[test]
    fn test_login_round_trip() {
        let auth = service();
        let tokens = auth.login("Sara", "s3cret").unwrap();
        let claims = auth.validate_token(&tokens.access_token).unwrap();
        assert_eq!(claims.sub, "sara");
        assert_eq!(claims.role, Role::Agent);
    }

    #[test]
    fn test_login_rejects_bad_password_and_unknown_user() {
        let auth = service();
        assert!(matches!(auth.login("sara", "nope"), Err(AppError::InvalidCredentials)));
        assert!(matches!(auth.login("omar", "s3cret"), Err(AppError::InvalidCredentials)));
    }

    #[test]
    fn test_expired_token() {
        let mut auth = service();
        auth.access_token_expiry = -3600;
        let tokens = auth.generate_token("sara", Role::Agent).unwrap();
        assert!(matches!(
            auth.validate_token(&tokens.access_token),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_tampered_token() {
        let auth = service();
        let tokens = auth.generate_token("sara", Role::Admin).unwrap();
        let tampered = format!("{}x", tokens.access_token);
        assert!(matches!(auth.validate_token(&tampered), Err(AppError::InvalidToken)));
    }
}
