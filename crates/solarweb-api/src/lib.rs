// solarweb-api: Async Rust client for the Fronius Solar.web query API

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{AccessKey, ApiContract, Credentials, SessionTokens};
pub use client::{DEFAULT_BASE_URL, SYSTEM_LIST_LIMIT, SolarWebClient};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
