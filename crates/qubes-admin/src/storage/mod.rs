//! Storage pools and volumes.

mod pool;
mod volume;

pub use self::pool::Pool;
pub use self::volume::{Volume, VolumeId};

/// Tracing target for storage calls.
pub(crate) const STORAGE_TARGET: &str = "qubes_admin::storage";
