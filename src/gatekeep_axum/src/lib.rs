//! Axum integration for the gatekeep authorization guard.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  gatekeep_core: HttpRequest, CallContext │
//! └──────────────┬───────────────────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────────────────┐
//! │  gatekeep_axum                           │
//! │  - AxumRequest newtype wrapper           │
//! │  - require_authorization middleware      │
//! │  - CurrentPrincipal extractor            │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gatekeep_axum::{RouteGuard, guarded};
//!
//! let guard = Arc::new(AuthorizationGuard::new(JwtAuthenticator::new(secret)));
//! let admin = guarded(
//!     Router::new().route("/admin", get(admin_page)),
//!     RouteGuard::new(guard, HandlerMetadata::with_roles(["admin"])),
//! );
//! ```

pub mod adapters;
pub mod guard;

pub use adapters::AxumRequest;
pub use guard::{CurrentPrincipal, RouteGuard, guarded, require_authorization};
