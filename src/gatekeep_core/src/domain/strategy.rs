use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named login mechanism.
///
/// The discriminants match the wire values used by clients (`0..=3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Password = 0,
    Facebook = 1,
    Github = 2,
    Google = 3,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid login strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Password,
        Strategy::Facebook,
        Strategy::Github,
        Strategy::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Password => "Password",
            Strategy::Facebook => "Facebook",
            Strategy::Github => "Github",
            Strategy::Google => "Google",
        }
    }

    /// Key of the `services` slot holding this strategy's credentials.
    pub fn service_key(&self) -> &'static str {
        match self {
            Strategy::Password => "password",
            Strategy::Facebook => "facebook",
            Strategy::Github => "github",
            Strategy::Google => "google",
        }
    }

    /// Whether the strategy delegates identity proofing to a third party.
    pub fn is_identity_provider(&self) -> bool {
        !matches!(self, Strategy::Password)
    }
}

impl TryFrom<i32> for Strategy {
    type Error = UnknownStrategy;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Strategy::Password),
            1 => Ok(Strategy::Facebook),
            2 => Ok(Strategy::Github),
            3 => Ok(Strategy::Google),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<i32>() {
            return Strategy::try_from(value);
        }
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| UnknownStrategy(s.to_owned()))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
