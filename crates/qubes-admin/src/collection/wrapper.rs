//! Name-keyed collections of simple wrappers such as labels and pools.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::client::AdminClient;
use crate::error::AdminError;
use crate::protocol::{SOURCE, parse_name_lines};

use super::COLLECTION_TARGET;

/// Wrapper type kept in a [`WrapperCollection`].
pub trait Wrapped {
    /// Entity name used in not-found errors.
    const ENTITY: &'static str;
    /// Listing method called against `dom0`.
    const LIST_METHOD: &'static str;

    /// Builds the wrapper for `name`.
    fn wrap(client: &AdminClient, name: &str) -> Self;

    /// Name the wrapper currently represents.
    fn name(&self) -> &str;
}

/// Cached collection over a names-only listing.
pub struct WrapperCollection<T> {
    client: AdminClient,
    names: RefCell<Option<BTreeSet<String>>>,
    objects: RefCell<BTreeMap<String, Rc<T>>>,
}

impl<T> fmt::Debug for WrapperCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperCollection")
            .field("names", &self.names.borrow())
            .field("objects", &self.objects.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<T: Wrapped> WrapperCollection<T> {
    /// Creates an unpopulated collection.
    #[must_use]
    pub fn new(client: AdminClient) -> Self {
        Self {
            client,
            names: RefCell::new(None),
            objects: RefCell::new(BTreeMap::new()),
        }
    }

    /// Lists the entities unless a listing is already cached or `force` is set.
    ///
    /// Wrappers whose name is no longer listed are dropped.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed listings; the cached state is
    /// left untouched on error.
    pub fn refresh_cache(&self, force: bool) -> Result<(), AdminError> {
        if !force && self.names.borrow().is_some() {
            return Ok(());
        }
        let body = self.client.qubesd_call(SOURCE, T::LIST_METHOD, None, None)?;
        let names: BTreeSet<String> = parse_name_lines(&body)?.into_iter().collect();
        debug!(
            target: COLLECTION_TARGET,
            entity = T::ENTITY,
            count = names.len(),
            "populated collection"
        );

        let mut objects = self.objects.borrow_mut();
        let previous = std::mem::take(&mut *objects);
        for (key, object) in previous {
            let name = object.name();
            if !names.contains(name) {
                debug!(target: COLLECTION_TARGET, entity = T::ENTITY, name, "dropped stale wrapper");
                continue;
            }
            if name != key {
                debug!(target: COLLECTION_TARGET, entity = T::ENTITY, from = %key, to = name, "re-keyed wrapper");
            }
            objects.insert(name.to_owned(), object);
        }
        *self.names.borrow_mut() = Some(names);
        Ok(())
    }

    /// Drops the cached listing; the next lookup lists again.
    pub fn clear_cache(&self) {
        debug!(target: COLLECTION_TARGET, entity = T::ENTITY, "cleared collection cache");
        *self.names.borrow_mut() = None;
    }

    /// Reports whether `name` is in the current listing.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn contains(&self, name: &str) -> Result<bool, AdminError> {
        self.refresh_cache(false)?;
        Ok(self
            .names
            .borrow()
            .as_ref()
            .is_some_and(|names| names.contains(name)))
    }

    /// Returns the wrapper for `name`, building it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] when `name` is not listed, and
    /// propagates refresh failures.
    pub fn get(&self, name: &str) -> Result<Rc<T>, AdminError> {
        if !self.contains(name)? {
            return Err(AdminError::NotFound {
                entity: T::ENTITY,
                name: name.to_owned(),
            });
        }
        let mut objects = self.objects.borrow_mut();
        let object = objects
            .entry(name.to_owned())
            .or_insert_with(|| Rc::new(T::wrap(&self.client, name)));
        Ok(Rc::clone(object))
    }

    /// Listed names in ascending order.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn keys(&self) -> Result<Vec<String>, AdminError> {
        self.refresh_cache(false)?;
        Ok(self
            .names
            .borrow()
            .iter()
            .flatten()
            .cloned()
            .collect())
    }

    /// Wrappers for every listed name, in ascending name order.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub fn values(&self) -> Result<Vec<Rc<T>>, AdminError> {
        self.keys()?.iter().map(|name| self.get(name)).collect()
    }

    /// Number of listed entities.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn len(&self) -> Result<usize, AdminError> {
        self.keys().map(|keys| keys.len())
    }

    /// Reports whether the listing is empty.
    ///
    /// # Errors
    ///
    /// As for [`Self::refresh_cache`].
    pub fn is_empty(&self) -> Result<bool, AdminError> {
        self.len().map(|len| len == 0)
    }
}
