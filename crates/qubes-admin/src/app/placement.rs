//! Domain creation requests and storage placement.

use std::collections::BTreeMap;

use crate::error::AdminError;
use crate::identifier::ToIdentifier;
use crate::vm::VmClass;

/// Where the volumes of a new or cloned domain are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoragePlacement {
    /// The daemon's default pool.
    #[default]
    Default,
    /// One pool for every volume.
    Pool(String),
    /// Pools chosen per volume slot.
    PerVolume(BTreeMap<String, String>),
}

impl StoragePlacement {
    /// Combines a single pool and per-volume pools, allowing at most one.
    ///
    /// An empty per-volume map counts as absent.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] when both are given.
    pub fn new(
        pool: Option<String>,
        volume_pools: BTreeMap<String, String>,
    ) -> Result<Self, AdminError> {
        match (pool, volume_pools.is_empty()) {
            (Some(_), false) => Err(AdminError::usage(
                "only one of a pool and per-volume pools can be used",
            )),
            (Some(pool), true) => Ok(Self::Pool(pool)),
            (None, false) => Ok(Self::PerVolume(volume_pools)),
            (None, true) => Ok(Self::Default),
        }
    }

    /// Single pool for every volume.
    #[must_use]
    pub fn pool(pool: impl ToIdentifier) -> Self {
        Self::Pool(pool.to_identifier())
    }

    /// Whether the daemon's default placement applies.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Text appended to a creation or clone payload.
    ///
    /// Per-volume entries are emitted in ascending slot order.
    #[must_use]
    pub fn payload_suffix(&self) -> String {
        match self {
            Self::Default => String::new(),
            Self::Pool(pool) => format!(" pool={pool}"),
            Self::PerVolume(pools) => pools
                .iter()
                .map(|(slot, pool)| format!(" pool:{slot}={pool}"))
                .collect(),
        }
    }
}

/// Parameters of a domain to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVm {
    class: VmClass,
    name: String,
    label: String,
    template: Option<String>,
    placement: StoragePlacement,
}

impl NewVm {
    /// Domain `name` of `class` with `label`.
    #[must_use]
    pub fn new(class: VmClass, name: impl Into<String>, label: impl ToIdentifier) -> Self {
        Self {
            class,
            name: name.into(),
            label: label.to_identifier(),
            template: None,
            placement: StoragePlacement::Default,
        }
    }

    /// Bases the domain on `template`.
    #[must_use]
    pub fn template(mut self, template: impl ToIdentifier) -> Self {
        self.template = Some(template.to_identifier());
        self
    }

    /// Stores the domain's volumes according to `placement`.
    #[must_use]
    pub fn placement(mut self, placement: StoragePlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Name of the domain to create.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested template, if any.
    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Creation method, which names the class.
    #[must_use]
    pub fn method(&self) -> String {
        let prefix = if self.placement.is_default() {
            "admin.vm.Create."
        } else {
            "admin.vm.CreateInPool."
        };
        format!("{prefix}{}", self.class)
    }

    /// Creation payload: name, label, then any pool placement.
    #[must_use]
    pub fn payload(&self) -> String {
        format!(
            "name={} label={}{}",
            self.name,
            self.label,
            self.placement.payload_suffix()
        )
    }
}
