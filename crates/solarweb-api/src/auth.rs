use secrecy::SecretString;

/// Which header contract the target deployment speaks.
///
/// Marker enum (no data) -- the access-key secret lives in [`AccessKey`].
/// Both contracts authenticate data requests with `Authorization: Bearer`;
/// they differ in the extra headers and in the feeds the account exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiContract {
    /// Access-key pair (`AccessKeyId` / `AccessKeyValue`) on every request
    /// plus the bearer token once logged in.
    #[default]
    AccessKey,
    /// Bearer token only.
    Bearer,
}

impl ApiContract {
    /// Whether this contract requires an [`AccessKey`] to build a client.
    pub fn requires_access_key(self) -> bool {
        matches!(self, Self::AccessKey)
    }
}

/// Application access-key pair issued by Solar.web.
#[derive(Debug, Clone)]
pub struct AccessKey {
    pub id: String,
    pub value: SecretString,
}

/// Account credentials used for `POST iam/jwt`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// A freshly issued token pair.
///
/// `Debug` never prints token material (`SecretString` redacts it).
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}
