use std::{collections::BTreeMap, sync::LazyLock};

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    constants::USERS_COLLECTION,
    domain::{
        document::{Entity, Metadata},
        strategy::Strategy,
    },
};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

/// Cheap syntactic check of an email address.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_REGEX.is_match(address)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailObject {
    pub address: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

impl EmailObject {
    /// A primary address that still has to be confirmed with a 6-digit code.
    pub fn unverified_primary(address: impl Into<String>) -> Self {
        let code = rand::rng().random_range(100_000..1_000_000u32);
        Self {
            address: address.into(),
            verified: false,
            primary: true,
            verification_code: Some(code.to_string()),
        }
    }

    /// A primary address whose ownership was already proven elsewhere.
    pub fn verified_primary(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            verified: true,
            primary: true,
            verification_code: None,
        }
    }

    pub fn mark_verified(&mut self) {
        self.verified = true;
        self.verification_code = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCredential {
    pub hashed: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredential {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
}

/// Per-strategy credentials. An empty slot means the strategy is not set up
/// for this user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthServices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<ProviderCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<ProviderCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<ProviderCredential>,
}

impl AuthServices {
    pub fn provider(&self, strategy: Strategy) -> Option<&ProviderCredential> {
        match strategy {
            Strategy::Password => None,
            Strategy::Facebook => self.facebook.as_ref(),
            Strategy::Github => self.github.as_ref(),
            Strategy::Google => self.google.as_ref(),
        }
    }

    /// Store provider credentials in the slot for `strategy`.
    ///
    /// Linking the password strategy is a no-op; use `password` directly.
    pub fn link_provider(&mut self, strategy: Strategy, credential: ProviderCredential) {
        match strategy {
            Strategy::Password => {}
            Strategy::Facebook => self.facebook = Some(credential),
            Strategy::Github => self.github = Some(credential),
            Strategy::Google => self.google = Some(credential),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub username: String,
    pub primary_email: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub emails: Vec<EmailObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<AuthServices>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<UserSettings>,
}

impl User {
    /// The email flagged primary, if the record has one.
    pub fn primary_email_object(&self) -> Option<&EmailObject> {
        self.emails.iter().find(|email| email.primary)
    }

    pub fn primary_email_object_mut(&mut self) -> Option<&mut EmailObject> {
        self.emails.iter_mut().find(|email| email.primary)
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.services
            .as_ref()
            .and_then(|services| services.password.as_ref())
            .map(|password| password.hashed.as_str())
    }
}

impl Entity for User {
    const COLLECTION: &'static str = USERS_COLLECTION;

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
