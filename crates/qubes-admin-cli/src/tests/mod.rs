//! In-process tests for the command-line tools.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context;
use qubes_admin::transport::FakeTransport;
use qubes_admin::{AdminClient, Qubes};
use qubes_admin_config::Config;
use rstest::rstest;

use crate::create::CreateArgs;
use crate::remove::RemoveArgs;
use crate::{CliError, ConfigLoader, OrthoConfigLoader, Tool, run_tool};

mod behaviour;

struct StaticConfigLoader {
    config: Config,
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, CliError> {
        Ok(self.config.clone())
    }
}

/// Result of one in-process tool run.
pub(crate) struct Outcome {
    pub(crate) exit: ExitCode,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Runs tool `T` with `args` against a root over `fake`.
pub(crate) fn invoke<T: Tool>(fake: &FakeTransport, args: &[&str]) -> Outcome {
    let loader = StaticConfigLoader {
        config: Config::default(),
    };
    let app = Qubes::new(AdminClient::new(Rc::new(fake.clone())));
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run_tool::<T, _, _, _, _, _>(
        args.iter().map(OsString::from),
        &mut stdout,
        &mut stderr,
        &loader,
        move |_| app,
    );
    Outcome {
        exit,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

fn expect_label_listing(fake: &FakeTransport) {
    fake.expect("dom0", "admin.label.List", None, None, b"0\0red\nblue\n");
}

fn expect_created_listing(fake: &FakeTransport) {
    fake.expect(
        "dom0",
        "admin.vm.List",
        None,
        None,
        b"0\0new-vm class=AppVM state=Halted\n",
    );
}

// ---------------------------------------------------------------------------
// qvm-create
// ---------------------------------------------------------------------------

#[rstest]
fn creates_appvm_with_label() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);
    fake.expect(
        "dom0",
        "admin.vm.Create.AppVM",
        None,
        Some(b"name=new-vm label=red"),
        b"0\0",
    );
    expect_created_listing(&fake);

    let outcome = invoke::<CreateArgs>(&fake, &["qvm-create", "-l", "red", "new-vm"]);
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
fn missing_name_is_a_usage_error() {
    let fake = FakeTransport::new();
    let outcome = invoke::<CreateArgs>(&fake, &["qvm-create", "-l", "red"]);
    assert_eq!(outcome.exit, ExitCode::from(2));
    assert!(outcome.stderr.contains("NAME"), "stderr: {}", outcome.stderr);
    assert!(fake.calls().is_empty());
}

#[rstest]
fn passes_custom_template() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);
    fake.expect(
        "dom0",
        "admin.vm.Create.AppVM",
        Some("some-template"),
        Some(b"name=new-vm label=red"),
        b"0\0",
    );
    expect_created_listing(&fake);

    let outcome = invoke::<CreateArgs>(
        &fake,
        &["qvm-create", "-l", "red", "-t", "some-template", "new-vm"],
    );
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
fn sets_properties_after_creation() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);
    fake.expect(
        "dom0",
        "admin.vm.Create.AppVM",
        None,
        Some(b"name=new-vm label=red"),
        b"0\0",
    );
    expect_created_listing(&fake);
    fake.expect(
        "new-vm",
        "admin.vm.property.Set",
        Some("netvm"),
        Some(b"sys-whonix"),
        b"0\0",
    );

    let outcome = invoke::<CreateArgs>(
        &fake,
        &["qvm-create", "-l", "red", "--prop", "netvm=sys-whonix", "new-vm"],
    );
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
fn places_every_volume_in_one_pool() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);
    fake.expect(
        "dom0",
        "admin.vm.CreateInPool.AppVM",
        None,
        Some(b"name=new-vm label=red pool=some-pool"),
        b"0\0",
    );
    expect_created_listing(&fake);

    let outcome = invoke::<CreateArgs>(
        &fake,
        &["qvm-create", "-l", "red", "-P", "some-pool", "new-vm"],
    );
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
fn places_volumes_in_separate_pools() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);
    fake.expect(
        "dom0",
        "admin.vm.CreateInPool.AppVM",
        None,
        Some(b"name=new-vm label=red pool:private=some-pool pool:volatile=other-pool"),
        b"0\0",
    );
    expect_created_listing(&fake);

    let outcome = invoke::<CreateArgs>(
        &fake,
        &[
            "qvm-create",
            "-l",
            "red",
            "--pool",
            "private=some-pool",
            "--pool",
            "volatile=other-pool",
            "new-vm",
        ],
    );
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
fn single_pool_and_volume_pools_are_exclusive() {
    let fake = FakeTransport::new();
    let outcome = invoke::<CreateArgs>(
        &fake,
        &[
            "qvm-create",
            "-l",
            "red",
            "-P",
            "lvm",
            "--pool",
            "private=file",
            "new-vm",
        ],
    );
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(
        outcome.stderr.starts_with("qvm-create: error: "),
        "stderr: {}",
        outcome.stderr
    );
    assert!(fake.calls().is_empty());
}

#[rstest]
fn selects_class_by_tag() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);
    fake.expect(
        "dom0",
        "admin.vm.Create.StandaloneVM",
        None,
        Some(b"name=box label=blue"),
        b"0\0",
    );
    fake.expect(
        "dom0",
        "admin.vm.List",
        None,
        None,
        b"0\0box class=StandaloneVM state=Halted\n",
    );

    let outcome = invoke::<CreateArgs>(
        &fake,
        &["qvm-create", "-C", "StandaloneVM", "-l", "blue", "box"],
    );
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
#[case(&["qvm-create", "-C", "QuantumVM", "-l", "red", "x"])]
#[case(&["qvm-create", "-l", "red", "--prop", "netvm", "x"])]
#[case(&["qvm-create", "-l", "red", "--pool", "=lvm", "x"])]
fn rejects_malformed_values_before_calling(#[case] args: &[&str]) {
    let fake = FakeTransport::new();
    let outcome = invoke::<CreateArgs>(&fake, args);
    assert_eq!(outcome.exit, ExitCode::from(2), "stderr: {}", outcome.stderr);
    assert!(fake.calls().is_empty());
}

#[rstest]
fn unknown_label_fails_without_creating() {
    let fake = FakeTransport::new();
    expect_label_listing(&fake);

    let outcome = invoke::<CreateArgs>(&fake, &["qvm-create", "-l", "purple", "new-vm"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(
        outcome.stderr,
        "qvm-create: error: no such label: 'purple'\n"
    );
    assert_eq!(fake.call_count("dom0", "admin.vm.Create.AppVM"), 0);
}

#[rstest]
fn help_goes_to_stdout() {
    let fake = FakeTransport::new();
    let outcome = invoke::<CreateArgs>(&fake, &["qvm-create", "--help"]);
    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("--prop"), "stdout: {}", outcome.stdout);
    assert!(outcome.stderr.is_empty());
}

// ---------------------------------------------------------------------------
// qvm-remove
// ---------------------------------------------------------------------------

const TWO_DOMAINS: &[u8] = b"0\0some-vm class=AppVM state=Halted\n\
other-vm class=AppVM state=Halted\n";

#[rstest]
fn removes_every_named_domain() {
    let fake = FakeTransport::new();
    fake.expect("dom0", "admin.vm.List", None, None, TWO_DOMAINS);
    fake.expect("some-vm", "admin.vm.Remove", None, None, b"0\0");
    fake.expect("other-vm", "admin.vm.Remove", None, None, b"0\0");

    let outcome = invoke::<RemoveArgs>(&fake, &["qvm-remove", "some-vm", "other-vm"]);
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    fake.assert_all_called();
}

#[rstest]
fn unknown_name_removes_nothing() {
    let fake = FakeTransport::new();
    fake.expect("dom0", "admin.vm.List", None, None, TWO_DOMAINS);

    let outcome = invoke::<RemoveArgs>(&fake, &["qvm-remove", "some-vm", "missing-vm"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(
        outcome.stderr,
        "qvm-remove: error: no such domain: 'missing-vm'\n"
    );
    assert_eq!(fake.call_count("some-vm", "admin.vm.Remove"), 0);
}

#[rstest]
fn requires_at_least_one_name() {
    let fake = FakeTransport::new();
    let outcome = invoke::<RemoveArgs>(&fake, &["qvm-remove"]);
    assert_eq!(outcome.exit, ExitCode::from(2));
    assert!(outcome.stderr.contains("VMNAME"), "stderr: {}", outcome.stderr);
}

#[rstest]
fn daemon_refusal_is_reported() {
    let fake = FakeTransport::new();
    fake.expect("dom0", "admin.vm.List", None, None, TWO_DOMAINS);
    fake.expect(
        "some-vm",
        "admin.vm.Remove",
        None,
        None,
        b"2\0QubesVMInUseError\0Domain is in use: 'some-vm'\0",
    );

    let outcome = invoke::<RemoveArgs>(&fake, &["qvm-remove", "some-vm"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(
        outcome.stderr,
        "qvm-remove: error: Domain is in use: 'some-vm'\n"
    );
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[rstest]
fn configuration_file_reaches_the_application_factory() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("qubes-admin.toml");
    fs::write(&path, "admin_socket = \"/run/test/qubesd.sock\"\n")?;
    let config_path = path.to_str().context("utf-8 configuration path")?;

    let fake = FakeTransport::new();
    fake.expect("dom0", "admin.vm.List", None, None, TWO_DOMAINS);
    fake.expect("some-vm", "admin.vm.Remove", None, None, b"0\0");
    let app = Qubes::new(AdminClient::new(Rc::new(fake.clone())));
    let seen_socket: RefCell<Option<String>> = RefCell::new(None);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run_tool::<RemoveArgs, _, _, _, _, _>(
        ["qvm-remove", "--config-path", config_path, "some-vm"]
            .iter()
            .map(OsString::from),
        &mut stdout,
        &mut stderr,
        &OrthoConfigLoader,
        |config: &Config| {
            *seen_socket.borrow_mut() = Some(config.admin_socket().as_str().to_owned());
            app
        },
    );

    assert_eq!(
        exit,
        ExitCode::SUCCESS,
        "stderr: {}",
        String::from_utf8_lossy(&stderr)
    );
    assert_eq!(
        seen_socket.into_inner().as_deref(),
        Some("/run/test/qubesd.sock")
    );
    fake.assert_all_called();
    Ok(())
}
