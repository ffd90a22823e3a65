//! Domain wrappers.
//!
//! A [`QubesVm`] is a view over one domain. Properties go through a
//! [`PropertyHolder`] bound to the domain's current name; lifecycle calls
//! carry no local state, and the volume map is cached until the domain is
//! renamed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::process::Child;
use std::rc::Rc;
use std::str::FromStr;

use strum::{Display, EnumString, IntoStaticStr};
use tracing::debug;

use crate::client::{AdminClient, ServiceOutput};
use crate::error::AdminError;
use crate::identifier::ToIdentifier;
use crate::property::{PropertyHolder, PropertyValue, VM_PROPERTY_PREFIX};
use crate::protocol::{parse_entity_listing, parse_name_lines};
use crate::storage::Volume;
use crate::transport::ServiceOptions;

/// Tracing target for domain operations.
pub(crate) const VM_TARGET: &str = "qubes_admin::vm";

/// Domain classes with a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
pub enum VmClass {
    /// Domain based on a template.
    #[strum(serialize = "AppVM")]
    AppVm,
    /// Template providing the root filesystem to other domains.
    #[strum(serialize = "TemplateVM")]
    TemplateVm,
    /// Domain with its own root filesystem.
    #[strum(serialize = "StandaloneVM")]
    StandaloneVm,
    /// Disposable domain.
    #[strum(serialize = "DispVM")]
    DispVm,
    /// The administrative domain.
    #[strum(serialize = "AdminVM")]
    AdminVm,
}

impl VmClass {
    /// Looks up the wrapper class for a daemon class tag.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::UnknownClass`] for tags with no wrapper.
    pub fn from_tag(tag: &str) -> Result<Self, AdminError> {
        Self::from_str(tag).map_err(|_| AdminError::UnknownClass {
            class: tag.to_owned(),
        })
    }

    /// Class tag as used by the daemon.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Whether domains of this class are based on a template.
    #[must_use]
    pub const fn has_template(self) -> bool {
        matches!(self, Self::AppVm | Self::DispVm)
    }
}

/// Power state reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum PowerState {
    /// Not running.
    Halted,
    /// Changing state.
    Transient,
    /// Running.
    Running,
    /// Paused in memory.
    Paused,
    /// Suspended to memory.
    Suspended,
    /// Shutting down.
    Halting,
    /// Being destroyed.
    Dying,
    /// Crashed.
    Crashed,
    /// State unavailable.
    #[strum(serialize = "NA")]
    Unavailable,
}

/// View over one domain.
pub struct QubesVm {
    client: AdminClient,
    class: VmClass,
    properties: PropertyHolder,
    volumes: RefCell<Option<BTreeMap<String, Rc<Volume>>>>,
}

impl fmt::Debug for QubesVm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QubesVm")
            .field("name", &self.name())
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl QubesVm {
    /// Creates a wrapper for the domain `name` of class `class`.
    #[must_use]
    pub fn new(client: AdminClient, name: impl Into<String>, class: VmClass) -> Self {
        let properties = PropertyHolder::new(client.clone(), VM_PROPERTY_PREFIX, name);
        Self {
            client,
            class,
            properties,
            volumes: RefCell::new(None),
        }
    }

    /// Current domain name.
    #[must_use]
    pub fn name(&self) -> String {
        self.properties.dest()
    }

    /// Class the wrapper was built for.
    #[must_use]
    pub const fn class(&self) -> VmClass {
        self.class
    }

    /// Property access for this domain.
    #[must_use]
    pub const fn properties(&self) -> &PropertyHolder {
        &self.properties
    }

    /// Reads one property.
    ///
    /// # Errors
    ///
    /// As for [`PropertyHolder::get`].
    pub fn property(&self, name: &str) -> Result<PropertyValue, AdminError> {
        self.properties.get(name)
    }

    /// Sets one property.
    ///
    /// Renames go through the application root so the domain collection
    /// learns about them; setting `name` here is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] for `name`, otherwise as for
    /// [`PropertyHolder::set`].
    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), AdminError> {
        self.properties.set(name, value)
    }

    /// Template the domain is based on, if any.
    ///
    /// # Errors
    ///
    /// As for [`PropertyHolder::get`].
    pub fn template(&self) -> Result<Option<String>, AdminError> {
        if !self.class.has_template() {
            return Ok(None);
        }
        Ok(self.properties.get("template")?.as_str().map(str::to_owned))
    }

    fn call(&self, method: &str) -> Result<Vec<u8>, AdminError> {
        let name = self.name();
        debug!(target: VM_TARGET, vm = %name, method, "domain call");
        self.client.qubesd_call(&name, method, None, None)
    }

    /// Starts the domain.
    ///
    /// # Errors
    ///
    /// Propagates call failures, such as the domain already running.
    pub fn start(&self) -> Result<(), AdminError> {
        self.call("admin.vm.Start").map(drop)
    }

    /// Asks the domain to shut down.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn shutdown(&self) -> Result<(), AdminError> {
        self.call("admin.vm.Shutdown").map(drop)
    }

    /// Stops the domain immediately.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn kill(&self) -> Result<(), AdminError> {
        self.call("admin.vm.Kill").map(drop)
    }

    /// Pauses the domain.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn pause(&self) -> Result<(), AdminError> {
        self.call("admin.vm.Pause").map(drop)
    }

    /// Resumes a paused domain.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn unpause(&self) -> Result<(), AdminError> {
        self.call("admin.vm.Unpause").map(drop)
    }

    /// Current power state.
    ///
    /// # Errors
    ///
    /// Propagates call failures, and returns [`AdminError::Protocol`] when
    /// the listing does not describe this domain's state.
    pub fn power_state(&self) -> Result<PowerState, AdminError> {
        let name = self.name();
        let listing = parse_entity_listing(&self.call("admin.vm.List")?)?;
        let state = listing
            .get(&name)
            .and_then(|attributes| attributes.get("state"))
            .ok_or_else(|| AdminError::protocol(format!("no power state listed for {name}")))?;
        PowerState::from_str(state).map_err(|_| AdminError::invalid_value("state", state.as_str()))
    }

    /// Whether the domain is halted.
    ///
    /// # Errors
    ///
    /// As for [`Self::power_state`].
    pub fn is_halted(&self) -> Result<bool, AdminError> {
        Ok(self.power_state()? == PowerState::Halted)
    }

    /// Whether the domain is paused.
    ///
    /// # Errors
    ///
    /// As for [`Self::power_state`].
    pub fn is_paused(&self) -> Result<bool, AdminError> {
        Ok(self.power_state()? == PowerState::Paused)
    }

    /// Whether the domain is in any state other than halted.
    ///
    /// # Errors
    ///
    /// As for [`Self::power_state`].
    pub fn is_running(&self) -> Result<bool, AdminError> {
        Ok(self.power_state()? != PowerState::Halted)
    }

    /// Volumes attached to the domain, keyed by slot name.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn volumes(&self) -> Result<BTreeMap<String, Rc<Volume>>, AdminError> {
        if let Some(volumes) = self.volumes.borrow().as_ref() {
            return Ok(volumes.clone());
        }
        let name = self.name();
        let slots = parse_name_lines(&self.call("admin.vm.volume.List")?)?;
        let volumes: BTreeMap<String, Rc<Volume>> = slots
            .into_iter()
            .map(|slot| {
                let volume = Volume::of_domain(self.client.clone(), name.as_str(), slot.as_str());
                (slot, Rc::new(volume))
            })
            .collect();
        *self.volumes.borrow_mut() = Some(volumes.clone());
        Ok(volumes)
    }

    /// One attached volume.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] for an unknown slot and propagates
    /// call failures.
    pub fn volume(&self, slot: &str) -> Result<Rc<Volume>, AdminError> {
        self.volumes()?
            .remove(slot)
            .ok_or_else(|| AdminError::NotFound {
                entity: "volume",
                name: slot.to_owned(),
            })
    }

    /// Renames the domain and points this wrapper at the new name.
    pub(crate) fn rename(&self, new_name: &str) -> Result<(), AdminError> {
        self.properties.write("name", new_name)?;
        debug!(target: VM_TARGET, from = %self.name(), to = new_name, "renamed domain");
        self.properties.retarget(new_name);
        *self.volumes.borrow_mut() = None;
        Ok(())
    }

    /// Starts `service` in this domain.
    ///
    /// # Errors
    ///
    /// As for [`AdminClient::run_service`].
    pub fn run_service(&self, service: &str, options: &ServiceOptions) -> Result<Child, AdminError> {
        self.client.run_service(&self.name(), service, options)
    }

    /// Runs `service` in this domain to completion.
    ///
    /// # Errors
    ///
    /// As for [`AdminClient::run_service_for_stdio`].
    pub fn run_service_for_stdio(
        &self,
        service: &str,
        input: Option<&[u8]>,
        options: &ServiceOptions,
    ) -> Result<ServiceOutput, AdminError> {
        self.client
            .run_service_for_stdio(&self.name(), service, input, options)
    }

    /// Runs a shell command in this domain.
    ///
    /// # Errors
    ///
    /// As for [`AdminClient::run`].
    pub fn run(
        &self,
        command: &str,
        input: Option<&[u8]>,
        options: &ServiceOptions,
    ) -> Result<ServiceOutput, AdminError> {
        self.client.run(&self.name(), command, input, options)
    }
}

impl PartialEq for QubesVm {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for QubesVm {}

impl fmt::Display for QubesVm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl ToIdentifier for QubesVm {
    fn to_identifier(&self) -> String {
        self.name()
    }
}
