// ── Feed failure policy ──
//
// | outcome                         | action                          |
// |---------------------------------|---------------------------------|
// | 401                             | reactive refresh (single-flight)|
// | 403 on a gated tier             | disable the tier for the run    |
// | anything else (network/5xx/...) | skip the feed for this sweep    |

use crate::catalog::{EntitlementTier, FeedDescriptor};

/// What the scheduler should do about a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Arm the reactive refresh; the feed is retried next sweep.
    RefreshSession,
    /// The account lacks this tier; stop requesting its feeds.
    DisableTier(EntitlementTier),
    /// Log and retry on the next sweep.
    SkipFeed,
}

/// Stateless classifier for feed fetch failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailurePolicy;

impl FailurePolicy {
    pub fn classify(err: &solarweb_api::Error, feed: &FeedDescriptor) -> FailureAction {
        if err.is_unauthorized() {
            FailureAction::RefreshSession
        } else if err.is_forbidden() && feed.tier.is_gated() {
            FailureAction::DisableTier(feed.tier)
        } else {
            FailureAction::SkipFeed
        }
    }
}
