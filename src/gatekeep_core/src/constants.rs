/// Name of the cookie, header and RPC payload field carrying the bearer credential.
pub const AUTHENTICATION_KEY: &str = "Authentication";

/// Handler metadata key listing the roles a caller must hold.
pub const ROLES_METADATA_KEY: &str = "roles";

/// RPC payload field the verified principal is written to.
pub const PRINCIPAL_PAYLOAD_KEY: &str = "user";

/// Event emitted after every successful login.
pub const USER_LOGGED_IN_EVENT: &str = "user.logged_in";

/// Collection holding user documents.
pub const USERS_COLLECTION: &str = "users";

/// Token names used in `CreateRequest::tokens` by identity providers.
pub mod tokens {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER_ID: &str = "userId";
}
