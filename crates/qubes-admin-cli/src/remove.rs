//! `qvm-remove`: removes domains from the system.

use clap::Parser;
use qubes_admin::Qubes;
use tracing::info;

use crate::{CLI_TARGET, CliError, Tool};

/// Arguments accepted by `qvm-remove`.
#[derive(Parser, Debug)]
#[command(name = "qvm-remove", about = "Remove domains from the system.")]
pub(crate) struct RemoveArgs {
    /// Domains to remove.
    #[arg(value_name = "VMNAME", required = true, num_args = 1..)]
    pub(crate) domains: Vec<String>,
}

impl Tool for RemoveArgs {
    fn execute(self, app: &Qubes) -> Result<(), CliError> {
        // Every name must resolve before anything is removed.
        let vms = self
            .domains
            .iter()
            .map(|name| app.domains().get(name))
            .collect::<Result<Vec<_>, _>>()?;

        for vm in vms {
            app.domains().remove(&vm.name())?;
            info!(target: CLI_TARGET, vm = %vm, "removed domain");
        }
        Ok(())
    }
}
