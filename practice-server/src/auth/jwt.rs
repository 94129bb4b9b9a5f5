//! JWT token service
//!
//! Issues and validates HS256 access tokens for staff sessions.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use shared::models::Role;
use thiserror::Error;

/// Minimum secret length accepted from `JWT_SECRET`
pub const MIN_SECRET_LEN: usize = 32;

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret, at least 32 characters
    pub secret: String,
    /// Token lifetime in minutes
    pub expiration_minutes: i64,
    pub issuer: String,
    pub audience: String,
}

impl JwtConfig {
    /// Read `JWT_SECRET`, `JWT_EXPIRATION_MINUTES`, `JWT_ISSUER`, `JWT_AUDIENCE`
    pub fn from_env() -> Result<Self, JwtError> {
        Ok(Self {
            secret: load_jwt_secret()?,
            expiration_minutes: std::env::var("JWT_EXPIRATION_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(1440),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "practice-server".to_string()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "practice-clients".to_string()),
        })
    }

    /// Fixed, non-secret configuration for tests
    pub fn for_tests() -> Self {
        Self {
            secret: "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            expiration_minutes: 60,
            issuer: "practice-server".to_string(),
            audience: "practice-clients".to_string(),
        }
    }
}

/// Claims stored in the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff user id
    pub sub: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    /// Comma separated
    pub permissions: String,
    pub token_type: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token generation failed: {0}")]
    GenerationFailed(String),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Random 256-bit key
pub fn generate_secure_jwt_secret() -> Result<Vec<u8>, JwtError> {
    let rng = SystemRandom::new();
    let mut key = vec![0u8; 32];

    rng.fill(&mut key).map_err(|_| {
        JwtError::KeyGenerationFailed("Failed to generate secure random key".to_string())
    })?;

    Ok(key)
}

/// Random printable 64-character secret (development fallback)
pub fn generate_secure_printable_jwt_secret() -> Result<String, JwtError> {
    const ALLOWED: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+[]{}|;:,.<>?";

    let mut bytes = [0u8; 64];
    SystemRandom::new().fill(&mut bytes).map_err(|_| {
        JwtError::KeyGenerationFailed("Failed to generate secure random key".to_string())
    })?;

    Ok(bytes
        .iter()
        .map(|b| ALLOWED[*b as usize % ALLOWED.len()] as char)
        .collect())
}

fn load_jwt_secret() -> Result<String, JwtError> {
    match std::env::var("JWT_SECRET") {
        Ok(secret) => {
            if secret.len() < MIN_SECRET_LEN {
                return Err(JwtError::ConfigError(format!(
                    "JWT_SECRET must be at least {MIN_SECRET_LEN} characters long"
                )));
            }
            Ok(secret)
        }
        Err(_) => {
            #[cfg(debug_assertions)]
            {
                tracing::warn!(
                    "JWT_SECRET not set! Generating a temporary key for development; tokens will not survive a restart."
                );
                generate_secure_printable_jwt_secret()
            }
            #[cfg(not(debug_assertions))]
            {
                Err(JwtError::ConfigError(
                    "JWT_SECRET environment variable must be set in release builds".to_string(),
                ))
            }
        }
    }
}

/// JWT token service
#[derive(Clone)]
pub struct JwtService {
    pub config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("expiration_minutes", &self.config.expiration_minutes)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn with_config(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issue an access token for a staff user
    pub fn generate_token(
        &self,
        user_id: i64,
        username: &str,
        display_name: &str,
        role: Role,
        permissions: &[String],
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now + Duration::minutes(self.config.expiration_minutes);

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            role: role.as_str().to_string(),
            permissions: permissions.join(","),
            token_type: "access".to_string(),
            exp: expiration.timestamp(),
            iat: now.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::GenerationFailed(e.to_string()))
    }

    /// Validate signature, expiry, issuer and audience
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::InvalidToken => JwtError::InvalidToken(e.to_string()),
                _ => JwtError::InvalidToken(format!("Token validation failed: {}", e)),
            }
        })?;

        if token_data.claims.token_type != "access" {
            return Err(JwtError::InvalidToken("not an access token".to_string()));
        }

        Ok(token_data.claims)
    }

    /// Token from an `Authorization: Bearer <token>` header value
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ")
    }

    /// Token lifetime in seconds
    pub fn expires_in_seconds(&self) -> i64 {
        self.config.expiration_minutes * 60
    }

    /// Seconds left before `claims` expire
    pub fn get_expiration_seconds(&self, claims: &Claims) -> i64 {
        let now = Utc::now().timestamp();
        (claims.exp - now).max(0)
    }
}

/// Authenticated staff user, parsed from JWT claims
///
/// Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub permissions: Vec<String>,
}

impl TryFrom<Claims> for CurrentUser {
    type Error = String;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| format!("invalid subject: {}", claims.sub))?;
        let role = claims.role.parse::<Role>()?;
        let permissions = if claims.permissions.is_empty() {
            vec![]
        } else {
            claims
                .permissions
                .split(',')
                .map(|s| s.to_string())
                .collect()
        };

        Ok(Self {
            id,
            username: claims.username,
            display_name: claims.display_name,
            role,
            permissions,
        })
    }
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Permission check
    ///
    /// Admins and holders of `all` pass everything; `module:*` covers every
    /// `module:<action>`.
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.is_admin() {
            return true;
        }

        if self.permissions.iter().any(|p| p == "all") {
            return true;
        }

        self.permissions.iter().any(|p| {
            if p == permission {
                return true;
            }
            if let Some(prefix) = p.strip_suffix(":*") {
                permission
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with(':'))
            } else {
                false
            }
        })
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    pub fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| self.has_permission(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::with_config(JwtConfig::for_tests())
    }

    fn user(role: Role, permissions: &[&str]) -> CurrentUser {
        CurrentUser {
            id: 7,
            username: "jane".to_string(),
            display_name: "Jane".to_string(),
            role,
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = service();
        let permissions = vec!["patients:read".to_string(), "patients:write".to_string()];

        let token = service
            .generate_token(42, "dr.who", "Dr Who", Role::Clinician, &permissions)
            .expect("Failed to generate test token");

        let claims = service
            .validate_token(&token)
            .expect("Failed to validate test token");

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "dr.who");
        assert_eq!(claims.role, "clinician");
        assert_eq!(claims.permissions, "patients:read,patients:write");

        let user = CurrentUser::try_from(claims).unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.role, Role::Clinician);
        assert_eq!(user.display_name, "Dr Who");
    }

    #[test]
    fn test_rejects_token_from_other_secret() {
        let token = service()
            .generate_token(1, "a", "A", Role::Billing, &[])
            .unwrap();
        let other = JwtService::with_config(JwtConfig {
            secret: "another-secret-that-is-also-long-enough!!".to_string(),
            ..JwtConfig::for_tests()
        });
        assert!(matches!(
            other.validate_token(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_rejects_wrong_audience() {
        let token = service()
            .generate_token(1, "a", "A", Role::Billing, &[])
            .unwrap();
        let other = JwtService::with_config(JwtConfig {
            audience: "someone-else".to_string(),
            ..JwtConfig::for_tests()
        });
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let service = JwtService::with_config(JwtConfig {
            expiration_minutes: -10,
            ..JwtConfig::for_tests()
        });
        let token = service.generate_token(1, "a", "A", Role::Admin, &[]).unwrap();
        assert!(matches!(
            service.validate_token(&token),
            Err(JwtError::ExpiredToken)
        ));
    }

    #[test]
    fn test_current_user_permissions() {
        let user = user(Role::FrontDesk, &["patients:read", "tasks:*"]);

        assert!(user.has_permission("patients:read"));
        assert!(user.has_permission("tasks:write"));
        assert!(!user.has_permission("tasksx:write"));
        assert!(!user.has_permission("billing:read"));
        assert!(user.has_any_permission(&["billing:read", "patients:read"]));
        assert!(!user.has_all_permissions(&["billing:read", "patients:read"]));
    }

    #[test]
    fn test_all_permission() {
        let user = user(Role::Billing, &["all"]);
        assert!(user.has_permission("users:manage"));
    }

    #[test]
    fn test_admin_has_all_permissions() {
        let admin = user(Role::Admin, &[]);
        assert!(admin.has_permission("audit:read"));
        assert!(admin.has_permission("users:manage"));
        assert!(admin.is_admin());
    }

    #[test]
    fn test_malformed_claims() {
        let mut claims = service()
            .validate_token(
                &service()
                    .generate_token(1, "a", "A", Role::Admin, &[])
                    .unwrap(),
            )
            .unwrap();
        claims.role = "superuser".to_string();
        assert!(CurrentUser::try_from(claims.clone()).is_err());
        claims.role = "admin".to_string();
        claims.sub = "abc".to_string();
        assert!(CurrentUser::try_from(claims).is_err());
    }

    #[test]
    fn test_secure_key_generation() {
        let key1 = generate_secure_jwt_secret().expect("Failed to generate first secure key");
        let key2 = generate_secure_jwt_secret().expect("Failed to generate second secure key");
        assert_ne!(key1, key2);
        assert_eq!(key1.len(), 32);

        let printable = generate_secure_printable_jwt_secret().unwrap();
        assert_eq!(printable.len(), 64);
        assert!(printable.len() >= MIN_SECRET_LEN);
    }
}
