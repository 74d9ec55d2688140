pub mod http_authenticator;
pub mod jwt_authenticator;
