pub mod constants;
pub mod domain;
pub mod ports;
pub mod query;
pub mod strategies;
pub mod transport;

// Re-export commonly used types for convenience
pub use domain::{
    document::{DocumentId, Entity, InvalidDocumentId, Metadata},
    principal::Principal,
    requests::{CreateRequest, LoginParams, LoginRequest},
    strategy::{Strategy, UnknownStrategy},
    user::{AuthServices, EmailObject, PasswordCredential, ProviderCredential, User, UserSettings},
};

pub use ports::{
    repositories::{
        CodecError, DocumentStore, EntityCodec, JsonCodec, NoHooks, RepositoryHooks, StoreError,
    },
    services::{
        AccountCreator, CreationError, EventSink, EventSinkError, HashError, PasswordHasher,
    },
};

pub use query::{Filter, FindOptions, IndexSpec, Update};

pub use strategies::{
    authenticator::{Authenticator, VerificationError},
    identity_provider::{
        IdentityProviderClient, NormalizedProfile, ProviderError, ProviderIdentity, ProviderTokens,
    },
};

pub use transport::{
    CallContext, HandlerMetadata, HttpCallContext, HttpRequest, RpcCallContext, Transport,
};
