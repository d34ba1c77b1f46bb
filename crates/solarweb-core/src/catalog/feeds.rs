// ── Feed catalog ──
//
// The ordered list of per-system data feeds. Everything about a feed is
// fixed for the run except `enabled`, which can only go from true to
// false when the account turns out not to include the feed's tier.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use solarweb_api::ApiContract;
use strum::{Display, EnumString};
use tracing::info;

use crate::config::FeedSpec;
use crate::projector::ProjectionOptions;

/// Member naming array elements in every Solar.web feed.
pub const ARRAY_NAME_FIELD: &str = "channelName";

/// Account tier a feed requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EntitlementTier {
    /// Included in every account.
    Basic,
    /// Paid tier; a 403 disables every feed of this tier.
    Pro,
}

impl EntitlementTier {
    /// Whether a 403 on this tier means "not entitled" rather than a glitch.
    pub fn is_gated(self) -> bool {
        !matches!(self, Self::Basic)
    }
}

/// Values substituted into URL templates for one sweep.
#[derive(Debug, Clone)]
pub struct FeedContext<'a> {
    pub system_id: &'a str,
    /// Auxiliary-unit sub-device of this system, if discovered.
    pub aux_unit_id: Option<&'a str>,
    /// Calendar date for the aggregate feeds.
    pub date: NaiveDate,
    /// Window start, epoch milliseconds.
    pub from_ms: i64,
    /// Window end, epoch milliseconds.
    pub to_ms: i64,
}

impl<'a> FeedContext<'a> {
    /// Context for the last 24 hours ending at `now`, dated in local time.
    pub fn at(system_id: &'a str, aux_unit_id: Option<&'a str>, now: DateTime<Utc>) -> Self {
        Self {
            system_id,
            aux_unit_id,
            date: now.with_timezone(&Local).date_naive(),
            from_ms: (now - Duration::hours(24)).timestamp_millis(),
            to_ms: now.timestamp_millis(),
        }
    }
}

/// One data feed.
#[derive(Debug)]
pub struct FeedDescriptor {
    /// Mount segment below the system node.
    pub path: String,
    pub url_template: String,
    pub label: String,
    pub array_name_field: Option<String>,
    pub force_indexed: bool,
    pub tier: EntitlementTier,
    enabled: AtomicBool,
}

impl FeedDescriptor {
    pub fn new(
        path: impl Into<String>,
        url_template: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            url_template: url_template.into(),
            label: label.into(),
            array_name_field: Some(ARRAY_NAME_FIELD.to_owned()),
            force_indexed: false,
            tier: EntitlementTier::Basic,
            enabled: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.force_indexed = true;
        self
    }

    #[must_use]
    pub fn tier(mut self, tier: EntitlementTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disable for the rest of the run. Returns `true` on the transition.
    pub fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }

    /// Whether the template needs an auxiliary-unit id.
    pub fn needs_aux_unit(&self) -> bool {
        self.url_template.contains("{aux}")
    }

    /// Expand the URL template, or `None` when it refers to an
    /// auxiliary unit the system does not have.
    pub fn render_url(&self, ctx: &FeedContext<'_>) -> Option<String> {
        let mut url = self.url_template.replace("{id}", ctx.system_id);
        if self.needs_aux_unit() {
            url = url.replace("{aux}", ctx.aux_unit_id?);
        }
        Some(
            url.replace("{year}", &ctx.date.year().to_string())
                .replace("{month}", &ctx.date.month().to_string())
                .replace("{day}", &ctx.date.day().to_string())
                .replace("{from}", &ctx.from_ms.to_string())
                .replace("{to}", &ctx.to_ms.to_string()),
        )
    }

    pub fn projection_options(&self) -> ProjectionOptions {
        ProjectionOptions {
            force_indexed: self.force_indexed,
            array_name_field: self.array_name_field.clone(),
            container_label: Some(self.label.clone()),
        }
    }
}

impl From<&FeedSpec> for FeedDescriptor {
    fn from(spec: &FeedSpec) -> Self {
        let tier = if spec.pro {
            EntitlementTier::Pro
        } else {
            EntitlementTier::Basic
        };
        let mut feed = FeedDescriptor::new(
            spec.path.clone(),
            spec.url.clone(),
            spec.label.clone().unwrap_or_else(|| spec.path.clone()),
        )
        .tier(tier);
        feed.force_indexed = spec.force_indexed;
        feed
    }
}

/// Ordered feed list shared by all systems.
#[derive(Debug, Default)]
pub struct FeedCatalog {
    feeds: Vec<FeedDescriptor>,
}

impl FeedCatalog {
    pub fn new(feeds: Vec<FeedDescriptor>) -> Self {
        Self { feeds }
    }

    /// The built-in feeds for a header contract.
    pub fn standard(contract: ApiContract) -> Self {
        let mut feeds = vec![
            FeedDescriptor::new("flowdata", "pvsystems/{id}/flowdata", "Flowdata"),
            FeedDescriptor::new(
                "histdata",
                "pvsystems/{id}/histdata?from={from}&to={to}",
                "Historical Data",
            )
            .indexed(),
            FeedDescriptor::new("weather", "pvsystems/{id}/weather/current", "Weather"),
            FeedDescriptor::new("total", "pvsystems/{id}/aggdata", "AggData Total"),
            FeedDescriptor::new("year", "pvsystems/{id}/aggdata/years/{year}", "AggData Year"),
            FeedDescriptor::new(
                "month",
                "pvsystems/{id}/aggdata/years/{year}/months/{month}",
                "AggData Month",
            ),
            FeedDescriptor::new(
                "day",
                "pvsystems/{id}/aggdata/years/{year}/months/{month}/days/{day}",
                "AggData day",
            ),
            FeedDescriptor::new(
                "energyforecast",
                "pvsystems/{id}/weather/energyforecast?from={from}&to={to}",
                "Energy Forecast",
            )
            .indexed()
            .tier(EntitlementTier::Pro),
        ];

        if contract == ApiContract::Bearer {
            feeds.extend([
                FeedDescriptor::new("live", "pvsystems/{id}/livedata", "Live Data"),
                FeedDescriptor::new("efm", "pvsystems/{id}/efm/state", "Energy Flow Manager"),
                FeedDescriptor::new(
                    "aux",
                    "pvsystems/{id}/devices/{aux}/flowdata",
                    "Auxiliary Unit",
                ),
            ]);
        }

        Self { feeds }
    }

    /// Append user-declared feeds.
    #[must_use]
    pub fn with_extra(mut self, extra: &[FeedSpec]) -> Self {
        self.feeds.extend(extra.iter().map(FeedDescriptor::from));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedDescriptor> {
        self.feeds.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &FeedDescriptor> {
        self.feeds.iter().filter(|f| f.is_enabled())
    }

    pub fn get(&self, path: &str) -> Option<&FeedDescriptor> {
        self.feeds.iter().find(|f| f.path == path)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Permanently disable every feed of `tier`. Returns the paths that
    /// were still enabled.
    pub fn disable_tier(&self, tier: EntitlementTier) -> Vec<String> {
        let disabled: Vec<String> = self
            .feeds
            .iter()
            .filter(|f| f.tier == tier && f.disable())
            .map(|f| f.path.clone())
            .collect();
        if !disabled.is_empty() {
            info!(%tier, feeds = ?disabled, "account not entitled, feeds disabled for this run");
        }
        disabled
    }
}
