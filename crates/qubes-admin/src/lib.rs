//! Client library for the Qubes admin daemon.
//!
//! Calls reach the daemon either through its Unix socket, when running in the
//! administrative domain, or through `qrexec-client-vm` from inside a managed
//! domain. Both paths implement [`Transport`]; the configured
//! [`qubes_admin_config::RunMode`] picks one.
//!
//! On top of the transport sit typed views over daemon entities:
//!
//! - [`Qubes`] is the application root. It owns the domain, label, and pool
//!   collections and the global property holder.
//! - [`VmCollection`] and [`WrapperCollection`] cache the daemon's listings
//!   and keep handing out the same wrapper for an entity while it exists.
//! - [`QubesVm`], [`Label`], [`Pool`], and [`Volume`] wrap single entities.
//!
//! # Example
//!
//! ```rust,no_run
//! use qubes_admin::{NewVm, Qubes, VmClass};
//! use qubes_admin_config::Config;
//!
//! let app = Qubes::from_config(&Config::default());
//! let red = app.get_label("red")?;
//! let vm = app.add_new_vm(&NewVm::new(VmClass::AppVm, "work", &red).template("fedora-40"))?;
//! vm.start()?;
//! # Ok::<(), qubes_admin::AdminError>(())
//! ```

pub mod app;
pub mod client;
pub mod collection;
pub mod error;
pub mod identifier;
pub mod label;
pub mod property;
pub mod protocol;
pub mod storage;
pub mod transport;
pub mod vm;

#[cfg(test)]
mod tests;

pub use self::app::{NewVm, Qubes, StoragePlacement};
pub use self::client::{AdminClient, ServiceOutput};
pub use self::collection::{VmCollection, Wrapped, WrapperCollection};
pub use self::error::{AdminError, DaemonErrorKind};
pub use self::identifier::ToIdentifier;
pub use self::label::Label;
pub use self::property::{PropertyEntry, PropertyHolder, PropertyType, PropertyValue};
pub use self::storage::{Pool, Volume, VolumeId};
pub use self::transport::{
    CallRequest, LocalTransport, PayloadStream, RemoteTransport, ServiceOptions, Transport,
};
pub use self::vm::{PowerState, QubesVm, VmClass};
