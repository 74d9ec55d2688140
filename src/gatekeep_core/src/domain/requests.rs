use std::collections::BTreeMap;

use secrecy::Secret;

use crate::domain::strategy::Strategy;

/// Strategy-specific login parameters.
#[derive(Debug, Clone)]
pub enum LoginParams {
    Password(Secret<String>),
    Provider {
        access_token: Secret<String>,
        user_id: String,
    },
}

/// A single login attempt. Lives for one orchestration call only.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub service: Strategy,
    pub email: String,
    pub params: LoginParams,
}

impl LoginRequest {
    pub fn password(email: impl Into<String>, password: Secret<String>) -> Self {
        Self {
            service: Strategy::Password,
            email: email.into(),
            params: LoginParams::Password(password),
        }
    }

    pub fn provider(
        service: Strategy,
        email: impl Into<String>,
        access_token: Secret<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            email: email.into(),
            params: LoginParams::Provider {
                access_token,
                user_id: user_id.into(),
            },
        }
    }

    pub fn submitted_password(&self) -> Option<&Secret<String>> {
        match &self.params {
            LoginParams::Password(password) => Some(password),
            LoginParams::Provider { .. } => None,
        }
    }

    pub fn provider_user_id(&self) -> Option<&str> {
        match &self.params {
            LoginParams::Provider { user_id, .. } => Some(user_id),
            LoginParams::Password(_) => None,
        }
    }
}

/// Provisioning payload handed to an `AccountCreator`.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub username: String,
    /// Absent for accounts that only log in through an identity provider.
    pub password: Option<Secret<String>>,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub service: Strategy,
    /// Provider-issued token names mapped to their values.
    pub tokens: BTreeMap<String, String>,
}
