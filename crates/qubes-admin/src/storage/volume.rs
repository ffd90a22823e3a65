//! Storage volumes.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::client::AdminClient;
use crate::error::AdminError;
use crate::protocol::{Attributes, SOURCE, parse_key_value_lines, parse_name_lines};
use crate::transport::{CallRequest, PayloadStream};

use super::STORAGE_TARGET;

/// How a volume is addressed; fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VolumeId {
    /// A volume inside a pool, addressed by its volume id.
    Pool {
        /// Pool name.
        pool: String,
        /// Volume id within the pool.
        vid: String,
    },
    /// A volume attached to a domain, addressed by slot name.
    Domain {
        /// Owning domain name.
        vm: String,
        /// Slot name such as `root` or `private`.
        slot: String,
    },
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool { pool, vid } => write!(f, "{pool}:{vid}"),
            Self::Domain { vm, slot } => write!(f, "{vm}:{slot}"),
        }
    }
}

/// View over one storage volume.
///
/// Everything except the identity is read from a fresh `Info` call on every
/// access; the most recent answer is kept only for inspection.
///
/// `Eq`, `Ord` and `Hash` compare the [`VolumeId`] the wrapper was built
/// with and never call the daemon. A volume reached through a domain slot
/// is therefore unequal to the same volume reached through its pool and
/// vid. Use [`Volume::same_volume`] to compare the resolved pool and vid.
pub struct Volume {
    client: AdminClient,
    id: VolumeId,
    info: RefCell<Option<Attributes>>,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Volume {
    /// Volume `vid` in `pool`.
    #[must_use]
    pub fn in_pool(client: AdminClient, pool: impl Into<String>, vid: impl Into<String>) -> Self {
        Self::with_id(
            client,
            VolumeId::Pool {
                pool: pool.into(),
                vid: vid.into(),
            },
        )
    }

    /// Volume attached to `vm` under `slot`.
    #[must_use]
    pub fn of_domain(client: AdminClient, vm: impl Into<String>, slot: impl Into<String>) -> Self {
        Self::with_id(
            client,
            VolumeId::Domain {
                vm: vm.into(),
                slot: slot.into(),
            },
        )
    }

    fn with_id(client: AdminClient, id: VolumeId) -> Self {
        Self {
            client,
            id,
            info: RefCell::new(None),
        }
    }

    /// Identity chosen at construction.
    #[must_use]
    pub const fn id(&self) -> &VolumeId {
        &self.id
    }

    fn call(&self, function: &str, payload: Option<&[u8]>) -> Result<Vec<u8>, AdminError> {
        match &self.id {
            VolumeId::Domain { vm, slot } => self.client.qubesd_call(
                vm,
                &format!("admin.vm.volume.{function}"),
                Some(slot),
                payload,
            ),
            VolumeId::Pool { pool, vid } => {
                let mut body = vid.as_bytes().to_vec();
                if let Some(extra) = payload {
                    body.push(b' ');
                    body.extend_from_slice(extra);
                }
                self.client.qubesd_call(
                    SOURCE,
                    &format!("admin.pool.volume.{function}"),
                    Some(pool),
                    Some(&body),
                )
            }
        }
    }

    /// Fetches the current volume information.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed responses.
    pub fn fetch_info(&self) -> Result<Attributes, AdminError> {
        let body = self.call("Info", None)?;
        let info = parse_key_value_lines(&body)?;
        debug!(target: STORAGE_TARGET, volume = %self.id, "fetched volume info");
        *self.info.borrow_mut() = Some(info.clone());
        Ok(info)
    }

    /// Information from the most recent fetch, if any.
    #[must_use]
    pub fn last_info(&self) -> Option<Attributes> {
        self.info.borrow().clone()
    }

    fn field(&self, key: &str) -> Result<String, AdminError> {
        let info = self.fetch_info()?;
        info.get(key).cloned().ok_or_else(|| {
            AdminError::protocol(format!("volume info for {} lacks '{key}'", self.id))
        })
    }

    fn flag(&self, key: &str) -> Result<bool, AdminError> {
        Ok(self.field(key)? == "True")
    }

    fn number(&self, key: &str) -> Result<u64, AdminError> {
        let raw = self.field(key)?;
        raw.parse()
            .map_err(|_| AdminError::invalid_value(key.to_owned(), raw))
    }

    /// Pool holding the volume.
    ///
    /// # Errors
    ///
    /// Fails only for domain volumes, whose pool needs an `Info` call.
    pub fn pool(&self) -> Result<String, AdminError> {
        match &self.id {
            VolumeId::Pool { pool, .. } => Ok(pool.clone()),
            VolumeId::Domain { .. } => self.field("pool"),
        }
    }

    /// Volume id within its pool.
    ///
    /// # Errors
    ///
    /// Fails only for domain volumes, whose id needs an `Info` call.
    pub fn vid(&self) -> Result<String, AdminError> {
        match &self.id {
            VolumeId::Pool { vid, .. } => Ok(vid.clone()),
            VolumeId::Domain { .. } => self.field("vid"),
        }
    }

    /// Size in bytes.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed values.
    pub fn size(&self) -> Result<u64, AdminError> {
        self.number("size")
    }

    /// Used space in bytes.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed values.
    pub fn usage(&self) -> Result<u64, AdminError> {
        self.number("usage")
    }

    /// Whether the volume is writable.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn rw(&self) -> Result<bool, AdminError> {
        self.flag("rw")
    }

    /// Whether a snapshot of the source is taken on domain start.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn snap_on_start(&self) -> Result<bool, AdminError> {
        self.flag("snap_on_start")
    }

    /// Whether changes are committed on domain stop.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn save_on_stop(&self) -> Result<bool, AdminError> {
        self.flag("save_on_stop")
    }

    /// Source volume id; `None` when the volume is its own source.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn source(&self) -> Result<Option<String>, AdminError> {
        let source = self.field("source")?;
        Ok((!source.is_empty()).then_some(source))
    }

    /// Whether the volume is hidden from block device listings.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn internal(&self) -> Result<bool, AdminError> {
        self.flag("internal")
    }

    /// Number of old revisions kept.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed values.
    pub fn revisions_to_keep(&self) -> Result<u64, AdminError> {
        self.number("revisions_to_keep")
    }

    /// Revision identifiers, oldest first as listed by the daemon.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn revisions(&self) -> Result<Vec<String>, AdminError> {
        let body = self.call("ListSnapshots", None)?;
        parse_name_lines(&body)
    }

    /// Grows the volume to `size` bytes.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn resize(&self, size: u64) -> Result<(), AdminError> {
        self.call("Resize", Some(size.to_string().as_bytes()))
            .map(drop)
    }

    /// Reverts the volume to `revision`.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn revert(&self, revision: &str) -> Result<(), AdminError> {
        self.call("Revert", Some(revision.as_bytes())).map(drop)
    }

    /// Replaces the volume contents with the data read from `stream`.
    ///
    /// The stream is consumed and closed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] for pool-addressed volumes and
    /// propagates call failures.
    pub fn import_data(&self, stream: PayloadStream) -> Result<(), AdminError> {
        let VolumeId::Domain { vm, slot } = &self.id else {
            drop(stream);
            return Err(AdminError::usage(
                "data can only be imported into a domain volume",
            ));
        };
        let request = CallRequest::new(vm.as_str(), "admin.vm.volume.Import")
            .with_arg(slot.as_str())
            .with_payload_stream(stream);
        self.client.call(request).map(drop)
    }

    /// Reports whether both wrappers denote the same pool volume.
    ///
    /// Domain-addressed volumes are resolved through `Info` first.
    ///
    /// # Errors
    ///
    /// Propagates call failures from the resolution.
    pub fn same_volume(&self, other: &Self) -> Result<bool, AdminError> {
        Ok(self.pool()? == other.pool()? && self.vid()? == other.vid()?)
    }
}

impl PartialEq for Volume {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Volume {}

impl Hash for Volume {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Volume {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Volume {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
