use gatekeep_core::{IdentityProviderClient, NormalizedProfile, ProviderError, Strategy};
use serde::Deserialize;

use super::non_empty;

#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GithubClient;

impl IdentityProviderClient for GithubClient {
    type Profile = GithubProfile;

    fn strategy(&self) -> Strategy {
        Strategy::Github
    }

    fn normalize(&self, profile: GithubProfile) -> Result<NormalizedProfile, ProviderError> {
        // Github users may hide their address, which leaves nothing to key an account on.
        let email = non_empty(profile.email).ok_or(ProviderError::NoUsableIdentity)?;

        let (firstname, lastname) = match non_empty(profile.name) {
            Some(name) => match name.split_once(' ') {
                Some((first, last)) => (Some(first.to_owned()), non_empty(Some(last.to_owned()))),
                None => (Some(name), None),
            },
            None => (None, None),
        };

        Ok(NormalizedProfile {
            user_id: profile.id.to_string(),
            email,
            username: non_empty(Some(profile.login)),
            firstname,
            lastname,
        })
    }
}
