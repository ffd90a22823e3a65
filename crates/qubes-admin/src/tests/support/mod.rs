//! Shared fixtures for unit and behavioural tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::app::Qubes;
use crate::client::AdminClient;
use crate::transport::FakeTransport;

pub(crate) mod fake_daemon;

pub(crate) use self::fake_daemon::FakeDaemon;

/// Writes an executable `/bin/sh` script into `dir`.
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}"))
        .with_context(|| format!("write script {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod script {}", path.display()))?;
    Ok(path)
}

/// Application root backed by a fresh fake transport.
pub(crate) fn fake_app() -> (Qubes, FakeTransport) {
    let fake = FakeTransport::new();
    let app = Qubes::new(AdminClient::new(Rc::new(fake.clone())));
    (app, fake)
}
