//! # Gatekeep - Authentication and Authorization Library
//!
//! This is a facade crate that re-exports the public APIs of the gatekeep
//! workspace crates. Use it to get everything in one place.
//!
//! ## Structure
//!
//! - **Core domain types**: `User`, `EmailObject`, `Principal`, `Strategy`, the filter language
//! - **Ports**: `DocumentStore`, `Authenticator`, `PasswordHasher`, `EventSink`, etc.
//! - **Use cases**: `ProvisioningOrchestrator`, `CredentialResolver`, `AuthorizationGuard`
//! - **Adapters**: `PostgresDocumentStore`, `JwtAuthenticator`, `RedisCacheHooks`, provider clients
//! - **Axum**: `require_authorization` middleware and the `CurrentPrincipal` extractor

// ============================================================================
// Core Domain Types and Ports
// ============================================================================

/// Core domain types, ports and the transport abstraction
pub mod core {
    pub use gatekeep_core::*;
}

pub use gatekeep_core::{
    AccountCreator, Authenticator, CallContext, CreateRequest, DocumentId, DocumentStore, Entity,
    EventSink, Filter, HandlerMetadata, HttpCallContext, IdentityProviderClient, LoginRequest,
    PasswordHasher, Principal, RepositoryHooks, RpcCallContext, Strategy, User,
};

// ============================================================================
// Use Cases (Application Layer)
// ============================================================================

/// Application use cases
pub mod use_cases {
    pub use gatekeep_application::*;
}

pub use gatekeep_application::{
    AuthorizationGuard, CredentialResolver, Decision, EventDispatcher, IdentityProviderAdapter,
    ProvisioningOrchestrator, Repository, RepositoryAccountCreator, RepositoryError,
};

// ============================================================================
// Adapters (Infrastructure)
// ============================================================================

/// Infrastructure adapters
pub mod adapters {
    pub use gatekeep_adapters::*;
}

pub use gatekeep_adapters::{
    Argon2PasswordHasher, GatekeepSettings, HttpAuthenticator, InMemoryDocumentStore,
    JwtAuthenticator, PostgresDocumentStore, RedisCacheHooks, RedisEventSink, TracingEventSink,
    init_tracing,
};

// ============================================================================
// Axum Integration
// ============================================================================

pub use gatekeep_axum::{CurrentPrincipal, RouteGuard, guarded, require_authorization};

// ============================================================================
// Re-export common external dependencies
// ============================================================================

/// Re-export async-trait for implementing the port traits
pub use async_trait::async_trait;

/// Re-export secrecy for working with secrets
pub use secrecy::{ExposeSecret, Secret};

pub use axum;
