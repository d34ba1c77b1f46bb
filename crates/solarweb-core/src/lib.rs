//! Session lifecycle, feed scheduling and JSON-to-tree projection for a
//! Solar.web account mirror.
//!
//! - **[`Scheduler`]**: Central facade managing the run:
//!   [`start()`](Scheduler::start) logs in, discovers the account's PV
//!   systems, runs a first sweep, then keeps the mirror current with a
//!   periodic sweep, proactive token refresh, a reactive refresh armed
//!   by 401 responses, and a re-login backoff.
//!   [`run_once()`](Scheduler::run_once) does a single sweep for CLI use.
//!
//! - **[`JsonTreeProjector`]**: Deterministic mapping of schema-less
//!   JSON into addressable tree nodes. Array elements are keyed by a name
//!   field where one exists, so addresses survive reordering.
//!
//! - **[`CredentialSession`]**: Token pair behind an `ArcSwapOption`:
//!   lock-free reads, single-flight login/refresh.
//!
//! - **[`FeedCatalog`] / [`DeviceCatalog`]**: What to fetch and for
//!   which systems. Entitlement-gated feeds switch off for the rest of the
//!   run on the first 403.
//!
//! - **[`StateSink`]**: Boundary to the hierarchical state store;
//!   [`TreeStore`] is the in-memory implementation.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod policy;
pub mod projector;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timers;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{
    Device, DeviceCatalog, EntitlementTier, FeedCatalog, FeedContext, FeedDescriptor, SubDevice,
};
pub use config::{FeedSpec, MIN_POLL_INTERVAL, MirrorConfig, TlsVerification};
pub use context::MirrorContext;
pub use error::CoreError;
pub use policy::{FailureAction, FailurePolicy};
pub use projector::{JsonTreeProjector, ProjectionOptions, ProjectionStats};
pub use scheduler::{MirrorState, Scheduler, SweepReport};
pub use session::{CONNECTION_PATH, CredentialSession, RefreshOutcome};
pub use store::{
    CommandWrite, Node, NodeKind, NodePath, NodeSpec, ScalarType, ScalarValue, StateSink,
    TreeStore,
};
pub use timers::{TimerRegistry, TimerSlot};

// Transport types callers need to build a `MirrorConfig`.
pub use solarweb_api::{AccessKey, ApiContract, Credentials, DEFAULT_BASE_URL};
