use gatekeep_core::{Authenticator, Principal, VerificationError};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token issued for a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            id: claims.sub,
            email: claims.email,
            roles: claims.roles,
            created: claims.iat,
            expires: claims.exp,
        }
    }
}

/// Verifies HS256 access tokens locally, without a round trip.
#[derive(Clone)]
pub struct JwtAuthenticator {
    jwt_secret: Secret<String>,
}

impl JwtAuthenticator {
    pub fn new(jwt_secret: Secret<String>) -> Self {
        Self { jwt_secret }
    }
}

#[async_trait::async_trait]
impl Authenticator for JwtAuthenticator {
    #[tracing::instrument(name = "Verifying access token", skip_all)]
    async fn verify(&self, credential: &str) -> Result<Principal, VerificationError> {
        let secret = self.jwt_secret.expose_secret().as_bytes();

        decode::<Claims>(
            credential,
            &DecodingKey::from_secret(secret),
            &Validation::default(),
        )
        .map(|data| data.claims.into())
        .map_err(|e| match e.kind() {
            ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                VerificationError::Malformed(e.to_string())
            }
            _ => VerificationError::Rejected(e.to_string()),
        })
    }
}
