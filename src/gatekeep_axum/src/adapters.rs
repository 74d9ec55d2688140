use axum::extract::Request as AxumExtractRequest;
use gatekeep_core::{HttpRequest, Principal};

/// Newtype wrapper around Axum's request so `gatekeep_core::HttpRequest` can
/// be implemented without violating the orphan rule.
#[repr(transparent)]
pub struct AxumRequest(pub AxumExtractRequest);

impl From<AxumExtractRequest> for AxumRequest {
    fn from(req: AxumExtractRequest) -> Self {
        AxumRequest(req)
    }
}

impl From<AxumRequest> for AxumExtractRequest {
    fn from(wrapper: AxumRequest) -> Self {
        wrapper.0
    }
}

impl HttpRequest for AxumRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.0.headers().get(name)?.to_str().ok()
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        // A request may carry several Cookie headers.
        self.0
            .headers()
            .get_all(axum::http::header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    fn method(&self) -> &str {
        self.0.method().as_str()
    }

    fn path(&self) -> &str {
        self.0.uri().path()
    }

    /// The principal lands in the request extensions, where
    /// [`CurrentPrincipal`](crate::CurrentPrincipal) picks it up.
    fn insert_principal(&mut self, principal: Principal) {
        self.0.extensions_mut().insert(principal);
    }
}
