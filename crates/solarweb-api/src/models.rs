// Wire types for the Solar.web query API.
//
// Only the envelope fields the mirror needs are typed; everything else is
// kept as raw `serde_json::Value` so it can be projected verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST iam/jwt`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest<'a> {
    pub user_id: &'a str,
    pub password: &'a str,
}

/// Response of `POST iam/jwt` and `PATCH iam/jwt/{refreshToken}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JwtResponse {
    pub jwt_token: String,
    pub refresh_token: String,
}

/// Response of `GET pvsystems`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvSystemList {
    #[serde(default)]
    pub pv_systems: Vec<Value>,
}

/// Response of `GET pvsystems/{id}/devices`.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Value>,
}

/// Generic `{ data: ... }` envelope wrapped around every feed response.
#[derive(Debug, Default, Deserialize)]
pub struct FeedEnvelope {
    #[serde(default)]
    pub data: Option<Value>,
}

/// Error body shape. Solar.web uses `responseMessage`; proxies in front of
/// it tend to use `message`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorResponse {
    #[serde(default, alias = "message")]
    pub response_message: Option<String>,
}
