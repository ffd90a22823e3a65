//! The application root.
//!
//! [`Qubes`] owns the collections, the global property holder, and the pool
//! driver cache. Everything it hands out holds a clone of the shared
//! [`AdminClient`] rather than a reference back to the root.

use std::collections::BTreeMap;
use std::process::Child;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use qubes_admin_config::{Config, RunMode};
use tracing::debug;

use crate::client::{AdminClient, ServiceOutput};
use crate::collection::{VmCollection, WrapperCollection};
use crate::error::AdminError;
use crate::identifier::ToIdentifier;
use crate::label::Label;
use crate::property::{ADMIN_PROPERTY_PREFIX, PropertyHolder};
use crate::protocol::{SOURCE, parse_word_listing};
use crate::storage::Pool;
use crate::transport::ServiceOptions;
use crate::vm::QubesVm;

mod placement;

pub use self::placement::{NewVm, StoragePlacement};

/// Tracing target for application-level operations.
pub(crate) const APP_TARGET: &str = "qubes_admin::app";

/// Top-level handle over one daemon connection.
#[derive(Debug)]
pub struct Qubes {
    client: AdminClient,
    properties: PropertyHolder,
    domains: VmCollection,
    labels: WrapperCollection<Label>,
    pools: WrapperCollection<Pool>,
    pool_drivers: OnceCell<BTreeMap<String, Vec<String>>>,
}

impl Qubes {
    /// Builds the root over an existing client.
    #[must_use]
    pub fn new(client: AdminClient) -> Self {
        Self {
            properties: PropertyHolder::new(client.clone(), ADMIN_PROPERTY_PREFIX, SOURCE),
            domains: VmCollection::new(client.clone()),
            labels: WrapperCollection::new(client.clone()),
            pools: WrapperCollection::new(client.clone()),
            pool_drivers: OnceCell::new(),
            client,
        }
    }

    /// Builds the root with the transport selected by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(AdminClient::from_config(config))
    }

    /// Shared client used for every call.
    #[must_use]
    pub const fn client(&self) -> &AdminClient {
        &self.client
    }

    /// Run mode of the underlying transport.
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        self.client.run_mode()
    }

    /// Global properties held by `dom0`.
    #[must_use]
    pub const fn properties(&self) -> &PropertyHolder {
        &self.properties
    }

    /// All domains.
    #[must_use]
    pub const fn domains(&self) -> &VmCollection {
        &self.domains
    }

    /// All labels.
    #[must_use]
    pub const fn labels(&self) -> &WrapperCollection<Label> {
        &self.labels
    }

    /// All storage pools.
    #[must_use]
    pub const fn pools(&self) -> &WrapperCollection<Pool> {
        &self.pools
    }

    /// Performs a raw call.
    ///
    /// # Errors
    ///
    /// Propagates transport and daemon failures.
    pub fn qubesd_call(
        &self,
        dest: &str,
        method: &str,
        arg: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<Vec<u8>, AdminError> {
        self.client.qubesd_call(dest, method, arg, payload)
    }

    fn drivers(&self) -> Result<&BTreeMap<String, Vec<String>>, AdminError> {
        self.pool_drivers.get_or_try_init(|| {
            let body = self.qubesd_call(SOURCE, "admin.pool.ListDrivers", None, None)?;
            let drivers = parse_word_listing(&body)?;
            debug!(target: APP_TARGET, count = drivers.len(), "cached pool drivers");
            Ok(drivers)
        })
    }

    /// Names of the available storage pool drivers.
    ///
    /// # Errors
    ///
    /// Propagates call failures on first use.
    pub fn pool_drivers(&self) -> Result<Vec<String>, AdminError> {
        Ok(self.drivers()?.keys().cloned().collect())
    }

    /// Parameters accepted when creating a pool with `driver`.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] for an unknown driver and propagates
    /// call failures on first use.
    pub fn pool_driver_parameters(&self, driver: &str) -> Result<Vec<String>, AdminError> {
        self.drivers()?
            .get(driver)
            .cloned()
            .ok_or_else(|| AdminError::NotFound {
                entity: "pool driver",
                name: driver.to_owned(),
            })
    }

    /// Creates a storage pool.
    ///
    /// Parameters are sent one `key=value` line each, sorted by key.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn add_pool(
        &self,
        name: &str,
        driver: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), AdminError> {
        let mut payload = format!("name={name}\n");
        for (key, value) in parameters {
            payload.push_str(&format!("{key}={value}\n"));
        }
        self.qubesd_call(SOURCE, "admin.pool.Add", Some(driver), Some(payload.as_bytes()))?;
        self.pools.clear_cache();
        Ok(())
    }

    /// Removes a storage pool.
    ///
    /// # Errors
    ///
    /// Propagates call failures, such as the pool still being in use.
    pub fn remove_pool(&self, name: impl ToIdentifier) -> Result<(), AdminError> {
        let name = name.to_identifier();
        self.qubesd_call(SOURCE, "admin.pool.Remove", Some(&name), None)?;
        self.pools.clear_cache();
        Ok(())
    }

    /// Finds a label by name, or by decimal index when no name matches.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] when neither lookup matches and
    /// propagates call failures.
    pub fn get_label(&self, label: &str) -> Result<Rc<Label>, AdminError> {
        match self.labels.get(label) {
            Err(error) if error.is_not_found() => {}
            found => return found,
        }
        if let Ok(index) = label.parse::<u32>() {
            for candidate in self.labels.values()? {
                if candidate.index()? == index {
                    return Ok(candidate);
                }
            }
        }
        Err(AdminError::NotFound {
            entity: "label",
            name: label.to_owned(),
        })
    }

    /// Creates a domain and returns its wrapper.
    ///
    /// # Errors
    ///
    /// Propagates the daemon's refusal (for example an existing name) and
    /// lookup failures for the new domain.
    pub fn add_new_vm(&self, request: &NewVm) -> Result<Rc<QubesVm>, AdminError> {
        let method = request.method();
        let payload = request.payload();
        debug!(target: APP_TARGET, method = %method, name = request.name(), "creating domain");
        self.qubesd_call(SOURCE, &method, request.template_name(), Some(payload.as_bytes()))?;
        self.domains.clear_cache();
        self.domains.get(request.name())
    }

    /// Clones `source` under `new_name` and returns the new wrapper.
    ///
    /// # Errors
    ///
    /// Propagates call failures and lookup failures for the clone.
    pub fn clone_vm(
        &self,
        source: impl ToIdentifier,
        new_name: &str,
        placement: &StoragePlacement,
    ) -> Result<Rc<QubesVm>, AdminError> {
        let source = source.to_identifier();
        let method = if placement.is_default() {
            "admin.vm.Clone"
        } else {
            "admin.vm.CloneInPool"
        };
        let payload = format!("name={new_name}{}", placement.payload_suffix());
        debug!(target: APP_TARGET, source = %source, name = new_name, "cloning domain");
        self.qubesd_call(&source, method, None, Some(payload.as_bytes()))?;
        self.domains.clear_cache();
        self.domains.get(new_name)
    }

    /// Renames `vm`; the wrapper stays valid under its new name.
    ///
    /// # Errors
    ///
    /// Propagates the daemon's refusal; nothing changes locally then.
    pub fn rename_vm(&self, vm: &QubesVm, new_name: &str) -> Result<(), AdminError> {
        vm.rename(new_name)?;
        self.domains.clear_cache();
        Ok(())
    }

    /// Domains whose `template` property names `template`.
    ///
    /// # Errors
    ///
    /// Propagates listing and property failures.
    pub fn template_dependents(
        &self,
        template: impl ToIdentifier,
    ) -> Result<Vec<Rc<QubesVm>>, AdminError> {
        let template = template.to_identifier();
        let mut dependents = Vec::new();
        for vm in self.domains.values()? {
            if vm.template()?.as_deref() == Some(template.as_str()) {
                dependents.push(vm);
            }
        }
        Ok(dependents)
    }

    /// Starts `service` in `dest`.
    ///
    /// # Errors
    ///
    /// As for [`AdminClient::run_service`].
    pub fn run_service(
        &self,
        dest: impl ToIdentifier,
        service: &str,
        options: &ServiceOptions,
    ) -> Result<Child, AdminError> {
        self.client
            .run_service(&dest.to_identifier(), service, options)
    }

    /// Runs `service` in `dest` to completion.
    ///
    /// # Errors
    ///
    /// As for [`AdminClient::run_service_for_stdio`].
    pub fn run_service_for_stdio(
        &self,
        dest: impl ToIdentifier,
        service: &str,
        input: Option<&[u8]>,
        options: &ServiceOptions,
    ) -> Result<ServiceOutput, AdminError> {
        self.client
            .run_service_for_stdio(&dest.to_identifier(), service, input, options)
    }
}
