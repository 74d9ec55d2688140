use gatekeep_core::{IdentityProviderClient, NormalizedProfile, ProviderError, Strategy};
use serde::Deserialize;

use super::non_empty;

/// Graph API `/me?fields=id,email,first_name,last_name` response.
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookProfile {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FacebookClient;

impl IdentityProviderClient for FacebookClient {
    type Profile = FacebookProfile;

    fn strategy(&self) -> Strategy {
        Strategy::Facebook
    }

    fn normalize(&self, profile: FacebookProfile) -> Result<NormalizedProfile, ProviderError> {
        let email = non_empty(profile.email).ok_or(ProviderError::NoUsableIdentity)?;

        Ok(NormalizedProfile {
            user_id: profile.id,
            email,
            username: None,
            firstname: non_empty(profile.first_name),
            lastname: non_empty(profile.last_name),
        })
    }
}
