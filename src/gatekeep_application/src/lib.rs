pub mod events;
pub mod repository;
pub mod use_cases;

#[cfg(test)]
mod test_support;

pub use events::{DomainEvent, EventDispatcher};
pub use repository::{EntityStream, Repository, RepositoryError};
pub use use_cases::{
    authorization_guard::{AuthorizationGuard, Decision},
    create_account::{RepositoryAccountCreator, user_indexes},
    credential_resolver::{CredentialResolver, PredicateBuilder},
    identity_provider::{IdentityLoginError, IdentityProviderAdapter},
    provisioning::{
        EmailVerificationError, LoginError, Provisioner, ProvisioningError,
        ProvisioningOrchestrator,
    },
};
