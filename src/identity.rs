use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::model::{Caller, Role};

#[derive(Debug)]
pub enum IdentityError {
    Missing,
    Invalid(String),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Missing => write!(f, "missing bearer token"),
            IdentityError::Invalid(e) => write!(f, "invalid token: {e}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Turns a bearer token into a verified caller. Token issuing lives with
/// the identity collaborator; this side only verifies.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Caller, IdentityError>;
}

/// Claims carried by tokens from the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id, as a string.
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: u64,
}

/// HS256 verifier with a shared secret.
pub struct JwtIdentity {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentity {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentity {
    async fn resolve(&self, token: &str) -> Result<Caller, IdentityError> {
        let claims = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| IdentityError::Invalid(e.to_string()))?
            .claims;
        let user_id = claims
            .sub
            .trim()
            .parse()
            .map_err(|_| IdentityError::Invalid("sub is not a user id".into()))?;
        let role = match claims.role.as_deref() {
            Some("admin") => Role::Admin,
            Some("user") | None => Role::User,
            Some(other) => return Err(IdentityError::Invalid(format!("unknown role {other}"))),
        };
        Ok(Caller { user_id, role })
    }
}
