//! Cached collections of daemon entities.
//!
//! A collection starts unpopulated. The first lookup issues one listing call
//! and keeps the answer until [`VmCollection::clear_cache`] (or the
//! equivalent on [`WrapperCollection`]) drops it, or a forced refresh
//! replaces it. Wrapper objects handed out by a collection survive
//! refreshes while the entity they represent is still listed, so callers
//! holding an `Rc` see the same object on later lookups.
//!
//! Membership is always decided against the latest listing, never against
//! the wrappers already built. Iteration follows ascending name order.

mod domains;
mod wrapper;

pub use self::domains::VmCollection;
pub use self::wrapper::{Wrapped, WrapperCollection};

/// Tracing target for cache population and invalidation.
pub(crate) const COLLECTION_TARGET: &str = "qubes_admin::collection";
