//! The domain collection.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::client::AdminClient;
use crate::error::AdminError;
use crate::protocol::{Listing, SOURCE, parse_entity_listing};
use crate::vm::{QubesVm, VmClass};

use super::COLLECTION_TARGET;

/// Cached collection of domains keyed by name.
///
/// Wrappers are rebuilt only when their domain disappears from the listing
/// or its class changes. A renamed wrapper is moved to its new key. A domain
/// removed and recreated under the same name cannot be told apart from the
/// original and keeps its wrapper.
pub struct VmCollection {
    client: AdminClient,
    listing: RefCell<Option<Listing>>,
    wrappers: RefCell<BTreeMap<String, Rc<QubesVm>>>,
}

impl fmt::Debug for VmCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmCollection")
            .field("populated", &self.listing.borrow().is_some())
            .field("wrappers", &self.wrappers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl VmCollection {
    /// Creates an unpopulated collection.
    #[must_use]
    pub fn new(client: AdminClient) -> Self {
        Self {
            client,
            listing: RefCell::new(None),
            wrappers: RefCell::new(BTreeMap::new()),
        }
    }

    /// Lists domains unless a listing is cached or `force` is set.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed listings; the cached state is
    /// left untouched on error.
    pub fn refresh_cache(&self, force: bool) -> Result<(), AdminError> {
        if !force && self.listing.borrow().is_some() {
            return Ok(());
        }
        let body = self
            .client
            .qubesd_call(SOURCE, "admin.vm.List", None, None)?;
        let listing = parse_entity_listing(&body)?;
        debug!(
            target: COLLECTION_TARGET,
            entity = "domain",
            count = listing.len(),
            "populated collection"
        );
        self.reconcile(&listing);
        *self.listing.borrow_mut() = Some(listing);
        Ok(())
    }

    fn reconcile(&self, listing: &Listing) {
        let mut wrappers = self.wrappers.borrow_mut();
        let previous = std::mem::take(&mut *wrappers);
        let mut renamed = Vec::new();
        for (key, vm) in previous {
            let name = vm.name();
            let Some(attributes) = listing.get(&name) else {
                debug!(target: COLLECTION_TARGET, name = %name, "dropped wrapper of vanished domain");
                continue;
            };
            let listed_class = attributes.get("class").map(String::as_str);
            if listed_class != Some(vm.class().as_str()) {
                debug!(
                    target: COLLECTION_TARGET,
                    name = %name,
                    from = vm.class().as_str(),
                    to = listed_class,
                    "dropped wrapper after class change"
                );
                continue;
            }
            if name == key {
                wrappers.insert(name, vm);
            } else {
                renamed.push((key, name, vm));
            }
        }
        // A renamed wrapper displaces a stale one left under its new name.
        for (key, name, vm) in renamed {
            debug!(target: COLLECTION_TARGET, from = %key, to = %name, "re-keyed renamed domain");
            wrappers.insert(name, vm);
        }
    }

    /// Drops the cached listing; built wrappers are kept for reconciliation.
    pub fn clear_cache(&self) {
        debug!(target: COLLECTION_TARGET, entity = "domain", "cleared collection cache");
        *self.listing.borrow_mut() = None;
    }

    /// Reports whether `name` is in the current listing.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn contains(&self, name: &str) -> Result<bool, AdminError> {
        self.refresh_cache(false)?;
        Ok(self
            .listing
            .borrow()
            .as_ref()
            .is_some_and(|listing| listing.contains_key(name)))
    }

    fn listed_class(&self, name: &str) -> Result<Option<VmClass>, AdminError> {
        self.refresh_cache(false)?;
        let listing = self.listing.borrow();
        let Some(attributes) = listing.as_ref().and_then(|listing| listing.get(name)) else {
            return Ok(None);
        };
        let class = attributes.get("class").ok_or_else(|| {
            AdminError::protocol(format!("domain listing for '{name}' has no class"))
        })?;
        VmClass::from_tag(class).map(Some)
    }

    /// Returns the wrapper for `name`, building it with the listed class.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] when `name` is not listed,
    /// [`AdminError::UnknownClass`] for a class tag with no wrapper, and
    /// propagates refresh failures.
    pub fn get(&self, name: &str) -> Result<Rc<QubesVm>, AdminError> {
        let Some(class) = self.listed_class(name)? else {
            return Err(AdminError::NotFound {
                entity: "domain",
                name: name.to_owned(),
            });
        };
        let mut wrappers = self.wrappers.borrow_mut();
        let vm = wrappers
            .entry(name.to_owned())
            .or_insert_with(|| Rc::new(QubesVm::new(self.client.clone(), name, class)));
        Ok(Rc::clone(vm))
    }

    /// Listed domain names in ascending order.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn keys(&self) -> Result<Vec<String>, AdminError> {
        self.refresh_cache(false)?;
        Ok(self
            .listing
            .borrow()
            .iter()
            .flat_map(|listing| listing.keys().cloned())
            .collect())
    }

    /// Wrappers for every listed domain, in ascending name order.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub fn values(&self) -> Result<Vec<Rc<QubesVm>>, AdminError> {
        self.keys()?.iter().map(|name| self.get(name)).collect()
    }

    /// Number of listed domains.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn len(&self) -> Result<usize, AdminError> {
        self.keys().map(|keys| keys.len())
    }

    /// Reports whether no domain is listed.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn is_empty(&self) -> Result<bool, AdminError> {
        self.len().map(|len| len == 0)
    }

    /// Removes the domain `name`, then drops the whole cached listing.
    ///
    /// # Errors
    ///
    /// Propagates the daemon's refusal; the cache is kept in that case.
    pub fn remove(&self, name: &str) -> Result<(), AdminError> {
        self.client
            .qubesd_call(name, "admin.vm.Remove", None, None)?;
        self.clear_cache();
        Ok(())
    }
}
