// Async HTTP client for the Solar.web query API.
//
// Base path: https://swqapi.solarweb.com/
// Auth: `POST iam/jwt` issues a bearer token; `PATCH iam/jwt/{refresh}`
// renews it. The token is passed into every data call by the caller so
// the client itself stays stateless and cheaply cloneable.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::auth::{AccessKey, ApiContract, Credentials, SessionTokens};
use crate::error::Error;
use crate::models::{
    DeviceList, ErrorResponse, FeedEnvelope, JwtResponse, LoginRequest, PvSystemList,
};
use crate::transport::TransportConfig;

/// Production endpoint of the query API.
pub const DEFAULT_BASE_URL: &str = "https://swqapi.solarweb.com/";

/// Page size for the single-page system listing.
pub const SYSTEM_LIST_LIMIT: u32 = 1000;

/// Async client for the Solar.web query API.
///
/// Cloning is cheap: `reqwest::Client` is reference counted internally.
#[derive(Clone)]
pub struct SolarWebClient {
    http: reqwest::Client,
    base_url: Url,
    contract: ApiContract,
}

impl SolarWebClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for the given contract.
    ///
    /// With [`ApiContract::AccessKey`] the key pair is injected as default
    /// headers on every request; `access_key` is ignored for
    /// [`ApiContract::Bearer`].
    pub fn new(
        base_url: &str,
        contract: ApiContract,
        access_key: Option<&AccessKey>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json-patch+json"),
        );
        headers.insert(
            "Accept-Language",
            HeaderValue::from_str(&transport.accept_language)
                .map_err(|e| Error::InvalidHeader(format!("Accept-Language: {e}")))?,
        );

        if contract.requires_access_key() {
            let key = access_key.ok_or_else(|| Error::Authentication {
                message: "access-key contract selected but no access key configured".into(),
            })?;
            headers.insert(
                "AccessKeyId",
                HeaderValue::from_str(&key.id)
                    .map_err(|e| Error::InvalidHeader(format!("AccessKeyId: {e}")))?,
            );
            let mut value = HeaderValue::from_str(key.value.expose_secret())
                .map_err(|e| Error::InvalidHeader(format!("AccessKeyValue: {e}")))?;
            value.set_sensitive(true);
            headers.insert("AccessKeyValue", value);
        }

        let http = transport.build_client_with_headers(headers)?;
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            contract,
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages default headers).
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        contract: ApiContract,
    ) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            contract,
        })
    }

    /// Ensure the base URL ends with `/` so relative joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    /// The API base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The header contract this client was built for.
    pub fn contract(&self) -> ApiContract {
        self.contract
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"pvsystems/abc/flowdata?x=1"`) onto the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn bearer(token: &SecretString) -> Result<HeaderValue, Error> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| Error::InvalidHeader(format!("Authorization: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Exchange account credentials for a token pair.
    ///
    /// Any non-success status is reported as [`Error::Authentication`];
    /// connection failures stay [`Error::Transport`] so callers can tell
    /// bad credentials from an unreachable service.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionTokens, Error> {
        let url = self.url("iam/jwt")?;
        debug!("POST {url}");

        let body = LoginRequest {
            user_id: &credentials.username,
            password: credentials.password.expose_secret(),
        };
        let resp = self.http.post(url).json(&body).send().await?;
        Self::token_response(resp, "login").await
    }

    /// Renew the token pair using the refresh token.
    pub async fn refresh(&self, tokens: &SessionTokens) -> Result<SessionTokens, Error> {
        let url = self.url(&format!(
            "iam/jwt/{}",
            tokens.refresh_token.expose_secret()
        ))?;
        // The refresh token is part of the path; keep it out of the log line.
        debug!("PATCH {}iam/jwt/<refresh-token>", self.base_url);

        let resp = self
            .http
            .patch(url)
            .header(AUTHORIZATION, Self::bearer(&tokens.access_token)?)
            .send()
            .await?;
        Self::token_response(resp, "token refresh").await
    }

    async fn token_response(resp: reqwest::Response, what: &str) -> Result<SessionTokens, Error> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("{what} failed (HTTP {status}): {}", preview(&body)),
            });
        }

        let jwt: JwtResponse = Self::decode(resp).await?;
        Ok(SessionTokens {
            access_token: SecretString::from(jwt.jwt_token),
            refresh_token: SecretString::from(jwt.refresh_token),
        })
    }

    // ── Data endpoints ───────────────────────────────────────────────

    /// List the account's PV systems (single page, bounded).
    pub async fn list_systems(&self, token: &SecretString) -> Result<Vec<Value>, Error> {
        let path = format!("pvsystems?offset=0&limit={SYSTEM_LIST_LIMIT}");
        let list: PvSystemList = self.get(&path, token).await?;
        Ok(list.pv_systems)
    }

    /// List the devices (inverters, batteries, meters, ...) of one system.
    pub async fn list_system_devices(
        &self,
        token: &SecretString,
        system_id: &str,
    ) -> Result<Vec<Value>, Error> {
        let list: DeviceList = self
            .get(&format!("pvsystems/{system_id}/devices"), token)
            .await?;
        Ok(list.devices)
    }

    /// Fetch one feed and return its `data` member.
    ///
    /// `path` is relative to the base URL and may carry a query string.
    /// An empty body or a `null` `data` member yields `Ok(None)`.
    pub async fn fetch_feed(
        &self,
        token: &SecretString,
        path: &str,
    ) -> Result<Option<Value>, Error> {
        let envelope: Option<FeedEnvelope> = self.get(path, token).await?;
        Ok(envelope.and_then(|e| e.data))
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &SecretString) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, Self::bearer(token)?)
            .send()
            .await?;
        Self::handle_response(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            Self::decode(resp).await
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let body = resp.text().await?;
        trace!(body = %preview(&body), "response body");

        let text = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|e| e.response_message)
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    preview(&raw).to_owned()
                }
            });

        match status {
            reqwest::StatusCode::UNAUTHORIZED => Error::Unauthorized { message },
            reqwest::StatusCode::FORBIDDEN => Error::Forbidden { message },
            _ => Error::Http {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// First 200 bytes of a body, cut on a char boundary.
fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
