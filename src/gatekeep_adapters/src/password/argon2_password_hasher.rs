use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
    password_hash::{self, PasswordHasher as _, SaltString, rand_core},
};
use gatekeep_core::{HashError, PasswordHasher};
use secrecy::{ExposeSecret, Secret};

/// Argon2id with the parameters every stored digest in the system uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2PasswordHasher;

fn argon2() -> Result<Argon2<'static>, HashError> {
    Ok(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(15000, 2, 1, None).map_err(|e| HashError(e.to_string()))?,
    ))
}

#[async_trait::async_trait]
impl PasswordHasher for Argon2PasswordHasher {
    #[tracing::instrument(name = "Computing password hash", skip_all)]
    async fn hash(&self, plain: &Secret<String>) -> Result<String, HashError> {
        let current_span: tracing::Span = tracing::Span::current();
        let plain = plain.clone();

        tokio::task::spawn_blocking(move || {
            current_span.in_scope(move || {
                let salt: SaltString = SaltString::generate(rand_core::OsRng);
                argon2()?
                    .hash_password(plain.expose_secret().as_bytes(), &salt)
                    .map(|h| h.to_string())
                    .map_err(|e| HashError(e.to_string()))
            })
        })
        .await
        .map_err(|e| HashError(e.to_string()))?
    }

    #[tracing::instrument(name = "Verify password hash", skip_all)]
    async fn verify(&self, plain: &Secret<String>, digest: &str) -> Result<bool, HashError> {
        let current_span: tracing::Span = tracing::Span::current();
        let plain = plain.clone();
        let digest = digest.to_owned();

        tokio::task::spawn_blocking(move || {
            current_span.in_scope(|| {
                let expected: PasswordHash<'_> =
                    PasswordHash::new(&digest).map_err(|e| HashError(e.to_string()))?;

                match argon2()?.verify_password(plain.expose_secret().as_bytes(), &expected) {
                    Ok(()) => Ok(true),
                    Err(password_hash::Error::Password) => Ok(false),
                    Err(e) => Err(HashError(e.to_string())),
                }
            })
        })
        .await
        .map_err(|e| HashError(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> Secret<String> {
        Secret::new(value.to_owned())
    }

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hasher = Argon2PasswordHasher;
        let digest = hasher.hash(&secret("correct horse")).await.unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert_eq!(hasher.verify(&secret("correct horse"), &digest).await, Ok(true));
        assert_eq!(hasher.verify(&secret("battery staple"), &digest).await, Ok(false));
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let hasher = Argon2PasswordHasher;
        let first = hasher.hash(&secret("pw")).await.unwrap();
        let second = hasher.hash(&secret("pw")).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_garbage_digest_is_an_error() {
        let result = Argon2PasswordHasher
            .verify(&secret("pw"), "not a phc string")
            .await;
        assert!(result.is_err());
    }
}
