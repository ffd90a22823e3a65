//! `qvm-create`: creates a new domain.

use clap::Parser;
use qubes_admin::{NewVm, Qubes, StoragePlacement, VmClass};
use tracing::info;

use crate::errors::parse_assignment;
use crate::{CLI_TARGET, CliError, Tool};

fn parse_class(text: &str) -> Result<VmClass, String> {
    VmClass::from_tag(text).map_err(|error| error.to_string())
}

/// Arguments accepted by `qvm-create`.
#[derive(Parser, Debug)]
#[command(name = "qvm-create", about = "Create a new domain.")]
pub(crate) struct CreateArgs {
    /// Class of the new domain.
    #[arg(
        short = 'C',
        long = "class",
        value_name = "CLASS",
        default_value = "AppVM",
        value_parser = parse_class
    )]
    pub(crate) class: VmClass,
    /// Label name or index.
    #[arg(short = 'l', long = "label", value_name = "LABEL")]
    pub(crate) label: String,
    /// Template to base the domain on; the daemon's default otherwise.
    #[arg(short = 't', long = "template", value_name = "TEMPLATE")]
    pub(crate) template: Option<String>,
    /// Pool for every volume of the domain.
    #[arg(short = 'P', value_name = "POOL")]
    pub(crate) pool: Option<String>,
    /// Pool for one volume; may be repeated.
    #[arg(long = "pool", value_name = "VOLUME=POOL", value_parser = parse_assignment)]
    pub(crate) volume_pools: Vec<(String, String)>,
    /// Property to set once the domain exists; may be repeated.
    #[arg(long = "prop", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub(crate) properties: Vec<(String, String)>,
    /// Name of the new domain.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
}

impl Tool for CreateArgs {
    fn execute(self, app: &Qubes) -> Result<(), CliError> {
        let placement = StoragePlacement::new(self.pool, self.volume_pools.into_iter().collect())?;
        let label = app.get_label(&self.label)?;

        let mut request = NewVm::new(self.class, self.name, &label).placement(placement);
        if let Some(template) = self.template {
            request = request.template(template);
        }
        let vm = app.add_new_vm(&request)?;
        info!(target: CLI_TARGET, vm = %vm, class = %vm.class(), "created domain");

        for (name, value) in &self.properties {
            vm.set_property(name, value.as_str())?;
        }
        Ok(())
    }
}
