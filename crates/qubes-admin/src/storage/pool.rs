//! Storage pools.

use std::fmt;

use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::client::AdminClient;
use crate::collection::Wrapped;
use crate::error::AdminError;
use crate::identifier::ToIdentifier;
use crate::protocol::{Attributes, SOURCE, parse_key_value_lines, parse_name_lines};

use super::STORAGE_TARGET;
use super::volume::Volume;

/// A storage pool.
///
/// The pool configuration is fetched once and kept for the lifetime of the
/// wrapper. Volume listings are never cached.
pub struct Pool {
    client: AdminClient,
    name: String,
    config: OnceCell<Attributes>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Pool {
    /// Creates a wrapper for the pool called `name`.
    #[must_use]
    pub fn new(client: AdminClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            config: OnceCell::new(),
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration, including the `driver` key.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed responses.
    pub fn config(&self) -> Result<&Attributes, AdminError> {
        self.config.get_or_try_init(|| {
            let body = self
                .client
                .qubesd_call(SOURCE, "admin.pool.Info", Some(&self.name), None)?;
            let config = parse_key_value_lines(&body)?;
            debug!(target: STORAGE_TARGET, pool = %self.name, "cached pool config");
            Ok(config)
        })
    }

    /// Storage driver backing the pool.
    ///
    /// # Errors
    ///
    /// As for [`Self::config`], and [`AdminError::Protocol`] when the
    /// configuration has no driver.
    pub fn driver(&self) -> Result<&str, AdminError> {
        self.config()?
            .get("driver")
            .map(String::as_str)
            .ok_or_else(|| AdminError::protocol(format!("pool {} reports no driver", self.name)))
    }

    /// Volumes currently held by the pool, listed afresh on every call.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn volumes(&self) -> Result<Vec<Volume>, AdminError> {
        let body = self
            .client
            .qubesd_call(SOURCE, "admin.pool.volume.List", Some(&self.name), None)?;
        Ok(parse_name_lines(&body)?
            .into_iter()
            .map(|vid| Volume::in_pool(self.client.clone(), self.name.as_str(), vid))
            .collect())
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Pool {}

impl PartialEq<str> for Pool {
    fn eq(&self, other: &str) -> bool {
        self.name == other
    }
}

impl PartialOrd for Pool {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pool {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl std::hash::Hash for Pool {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl ToIdentifier for Pool {
    fn to_identifier(&self) -> String {
        self.name.clone()
    }
}

impl Wrapped for Pool {
    const ENTITY: &'static str = "pool";
    const LIST_METHOD: &'static str = "admin.pool.List";

    fn wrap(client: &AdminClient, name: &str) -> Self {
        Self::new(client.clone(), name)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
