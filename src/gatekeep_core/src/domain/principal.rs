use serde::{Deserialize, Serialize};

/// A verified identity together with the roles it holds.
///
/// Produced by an `Authenticator`; `created` and `expires` are unix timestamps
/// of the underlying session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub expires: i64,
}

impl Principal {
    /// Required roles this principal does not hold, in the order requested.
    pub fn missing_roles<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|role| !self.roles.contains(role))
            .map(String::as_str)
            .collect()
    }
}
