// ── Mirror context ──
//
// Everything one mirror run shares: the HTTP client, the session, both
// catalogs and the state sink. Built once per run and owned by the
// scheduler; the pieces with run-time state (session, device list, feed
// switches) replace their contents wholesale instead of being patched
// from several places.

use std::sync::Arc;

use solarweb_api::SolarWebClient;

use crate::catalog::{DeviceCatalog, FeedCatalog};
use crate::config::MirrorConfig;
use crate::error::CoreError;
use crate::session::CredentialSession;
use crate::store::StateSink;

pub struct MirrorContext {
    pub config: MirrorConfig,
    pub client: SolarWebClient,
    pub session: CredentialSession,
    pub devices: DeviceCatalog,
    pub feeds: FeedCatalog,
    pub sink: Arc<dyn StateSink>,
}

impl MirrorContext {
    /// Build the client and catalogs for `config`.
    pub fn new(config: MirrorConfig, sink: Arc<dyn StateSink>) -> Result<Self, CoreError> {
        let client = SolarWebClient::new(
            config.base_url.as_str(),
            config.contract,
            config.access_key.as_ref(),
            &config.transport(),
        )?;
        Ok(Self::with_client(config, client, sink))
    }

    /// Use a prebuilt client (custom headers, shared connection pool).
    pub fn with_client(
        config: MirrorConfig,
        client: SolarWebClient,
        sink: Arc<dyn StateSink>,
    ) -> Self {
        let feeds = if config.standard_feeds {
            FeedCatalog::standard(config.contract)
        } else {
            FeedCatalog::default()
        }
        .with_extra(&config.extra_feeds);

        let session = CredentialSession::new(
            client.clone(),
            config.credentials.clone(),
            Arc::clone(&sink),
        );

        Self {
            config,
            client,
            session,
            devices: DeviceCatalog::new(),
            feeds,
            sink,
        }
    }
}
