use gatekeep_core::{IdentityProviderClient, NormalizedProfile, ProviderError, Strategy};
use serde::Deserialize;

use super::non_empty;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleName {
    #[serde(rename = "givenName")]
    pub given_name: Option<String>,
    #[serde(rename = "familyName")]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleEmail {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub username: Option<String>,
    #[serde(default)]
    pub name: GoogleName,
    #[serde(default)]
    pub emails: Vec<GoogleEmail>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleClient;

impl IdentityProviderClient for GoogleClient {
    type Profile = GoogleProfile;

    fn strategy(&self) -> Strategy {
        Strategy::Google
    }

    /// The first listed address is the account's primary one.
    fn normalize(&self, profile: GoogleProfile) -> Result<NormalizedProfile, ProviderError> {
        let email = profile
            .emails
            .into_iter()
            .find_map(|email| non_empty(Some(email.value)))
            .ok_or(ProviderError::NoUsableIdentity)?;

        Ok(NormalizedProfile {
            user_id: profile.id,
            email,
            username: non_empty(profile.username),
            firstname: non_empty(profile.name.given_name),
            lastname: non_empty(profile.name.family_name),
        })
    }
}
