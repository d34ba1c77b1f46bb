// ── What to mirror ──
//
// Systems found at startup and the feeds fetched for each of them.

mod devices;
mod feeds;

pub use devices::{AUX_UNIT_DEVICE_TYPE, Device, DeviceCatalog, REFRESH_COMMAND, SubDevice};
pub use feeds::{ARRAY_NAME_FIELD, EntitlementTier, FeedCatalog, FeedContext, FeedDescriptor};
