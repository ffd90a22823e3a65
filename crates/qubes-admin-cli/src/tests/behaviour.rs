//! Behaviour scenarios for the command-line tools.

use std::cell::RefCell;
use std::process::ExitCode;

use qubes_admin::transport::FakeTransport;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::create::CreateArgs;
use crate::remove::RemoveArgs;

use super::{Outcome, invoke};

struct World {
    fake: FakeTransport,
    outcome: RefCell<Option<Outcome>>,
}

impl World {
    fn with_outcome<R>(&self, check: impl FnOnce(&Outcome) -> R) -> R {
        match self.outcome.borrow().as_ref() {
            Some(outcome) => check(outcome),
            None => panic!("no tool has run"),
        }
    }
}

#[fixture]
fn world() -> World {
    World {
        fake: FakeTransport::new(),
        outcome: RefCell::new(None),
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

// ---------------------------------------------------------------------------
// Daemon state
// ---------------------------------------------------------------------------

#[given("the daemon knows labels \"{labels}\"")]
fn given_labels(world: &World, labels: String) {
    let body = format!("0\0{}\n", words(&labels).join("\n"));
    world
        .fake
        .expect("dom0", "admin.label.List", None, None, body.as_bytes());
}

#[given("the daemon knows AppVMs \"{names}\"")]
fn given_domains(world: &World, names: String) {
    let mut body = String::from("0\0");
    for name in words(&names) {
        body.push_str(&format!("{name} class=AppVM state=Halted\n"));
    }
    world
        .fake
        .expect("dom0", "admin.vm.List", None, None, body.as_bytes());
}

#[given("the daemon accepts \"{method}\" with payload \"{payload}\"")]
fn given_creation(world: &World, method: String, payload: String) {
    world
        .fake
        .expect("dom0", &method, None, Some(payload.as_bytes()), b"0\0");
}

#[given("the daemon accepts removal of \"{name}\"")]
fn given_removal(world: &World, name: String) {
    world
        .fake
        .expect(&name, "admin.vm.Remove", None, None, b"0\0");
}

// ---------------------------------------------------------------------------
// Invocations
// ---------------------------------------------------------------------------

#[when("qvm-create runs with \"{args}\"")]
fn when_create(world: &World, args: String) {
    let mut argv = vec!["qvm-create"];
    argv.extend(words(&args));
    *world.outcome.borrow_mut() = Some(invoke::<CreateArgs>(&world.fake, &argv));
}

#[when("qvm-remove runs with \"{args}\"")]
fn when_remove(world: &World, args: String) {
    let mut argv = vec!["qvm-remove"];
    argv.extend(words(&args));
    *world.outcome.borrow_mut() = Some(invoke::<RemoveArgs>(&world.fake, &argv));
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[then("the tool succeeds")]
fn then_succeeds(world: &World) {
    world.with_outcome(|outcome| {
        assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    });
}

#[then("the tool fails with \"{message}\"")]
fn then_fails(world: &World, message: String) {
    world.with_outcome(|outcome| {
        assert_eq!(outcome.exit, ExitCode::FAILURE);
        assert!(
            outcome.stderr.contains(&message),
            "stderr: {}",
            outcome.stderr
        );
    });
}

#[then("every expected call was made")]
fn then_all_called(world: &World) {
    world.fake.assert_all_called();
}

#[then("no domain was removed")]
fn then_nothing_removed(world: &World) {
    let removals = world
        .fake
        .calls()
        .into_iter()
        .filter(|(_, method, _, _)| method == "admin.vm.Remove")
        .count();
    assert_eq!(removals, 0);
}

#[scenario(path = "tests/features/qvm_create.feature")]
fn qvm_create(world: World) {
    let _ = world;
}

#[scenario(path = "tests/features/qvm_remove.feature")]
fn qvm_remove(world: World) {
    let _ = world;
}
