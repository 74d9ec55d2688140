//! Profile clients for the supported identity providers.
//!
//! Each client only maps the provider's profile payload; the consent and
//! redirect flow that produces the payload happens elsewhere.

pub mod facebook;
pub mod github;
pub mod google;

pub use facebook::{FacebookClient, FacebookProfile};
pub use github::{GithubClient, GithubProfile};
pub use google::{GoogleClient, GoogleProfile};

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
