//! Transport-neutral access to the credential and principal of a call.
//!
//! The authorization guard is written once against [`CallContext`]. Two
//! implementations exist, one per transport:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  AuthorizationGuard (transport-agnostic) │
//! └──────────────┬───────────────────────────┘
//!                │ CallContext
//!        ┌───────┴─────────┐
//!        ▼                 ▼
//! ┌───────────────┐ ┌────────────────┐
//! │HttpCallContext│ │ RpcCallContext │
//! │ cookie/header │ │ payload field  │
//! └───────┬───────┘ └────────────────┘
//!         │ HttpRequest
//!         ▼
//! ┌──────────────────────────────────────────┐
//! │  gatekeep_axum: AxumRequest newtype      │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Web frameworks implement [`HttpRequest`] on a newtype wrapper of their own
//! request type, so the guard never depends on a specific framework.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    constants::{AUTHENTICATION_KEY, PRINCIPAL_PAYLOAD_KEY, ROLES_METADATA_KEY},
    domain::principal::Principal,
};

/// Trait for HTTP requests that can carry a bearer credential.
///
/// # Implementation Notes
///
/// - Return `&str` references directly from the framework's data structures
/// - Case-insensitive header lookup should be handled by implementor
pub trait HttpRequest {
    /// Get a header value by name.
    ///
    /// Returns `None` if the header doesn't exist or isn't valid UTF-8.
    fn header(&self, name: &str) -> Option<&str>;

    /// Get a cookie value by name.
    fn cookie(&self, name: &str) -> Option<&str>;

    fn method(&self) -> &str;

    fn path(&self) -> &str;

    /// Make the verified principal available to downstream handlers.
    fn insert_principal(&mut self, principal: Principal);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Rpc,
}

/// The per-call state the guard reads the credential from and writes the
/// principal into. Owned exclusively by the call that created it.
pub trait CallContext: Send {
    fn transport(&self) -> Transport;

    /// The bearer credential, if the call carries a non-empty one.
    fn credential(&self) -> Option<&str>;

    fn attach_principal(&mut self, principal: Principal);
}

/// Context of a synchronous HTTP request.
///
/// The credential is read from the `Authentication` cookie, falling back to a
/// header of the same name.
#[derive(Debug)]
pub struct HttpCallContext<R> {
    request: R,
}

impl<R: HttpRequest> HttpCallContext<R> {
    pub fn new(request: R) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &R {
        &self.request
    }

    pub fn into_inner(self) -> R {
        self.request
    }
}

impl<R: HttpRequest + Send> CallContext for HttpCallContext<R> {
    fn transport(&self) -> Transport {
        Transport::Http
    }

    fn credential(&self) -> Option<&str> {
        self.request
            .cookie(AUTHENTICATION_KEY)
            .filter(|value| !value.is_empty())
            .or_else(|| self.request.header(AUTHENTICATION_KEY))
            .filter(|value| !value.is_empty())
    }

    fn attach_principal(&mut self, principal: Principal) {
        self.request.insert_principal(principal);
    }
}

/// Context of an asynchronous message-based call.
///
/// The credential is the `Authentication` field of the payload; the principal
/// is written back into the payload under `user`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcCallContext {
    payload: Map<String, Value>,
}

impl RpcCallContext {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self { payload }
    }

    /// Build a context from a raw message body. Non-object bodies carry no
    /// credential.
    pub fn from_value(payload: Value) -> Self {
        match payload {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }

    pub fn principal(&self) -> Option<Principal> {
        self.payload
            .get(PRINCIPAL_PAYLOAD_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

impl CallContext for RpcCallContext {
    fn transport(&self) -> Transport {
        Transport::Rpc
    }

    fn credential(&self) -> Option<&str> {
        self.payload
            .get(AUTHENTICATION_KEY)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    fn attach_principal(&mut self, principal: Principal) {
        // Principal is plain data, serialization cannot fail.
        if let Ok(value) = serde_json::to_value(principal) {
            self.payload.insert(PRINCIPAL_PAYLOAD_KEY.to_owned(), value);
        }
    }
}

/// Out-of-band annotations attached to a handler or route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerMetadata {
    roles: Vec<String>,
}

impl HandlerMetadata {
    /// A handler open to any authenticated principal.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the `roles` annotation from a metadata map. A missing or
    /// malformed entry means no role requirement.
    pub fn from_map(metadata: &Map<String, Value>) -> Self {
        let roles = metadata
            .get(ROLES_METADATA_KEY)
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Self { roles }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}
