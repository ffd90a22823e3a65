//! Scripted transport for tests.
//!
//! [`FakeTransport`] answers calls from a table of expected requests, each
//! mapped to a raw daemon response, and records every call it receives.
//! Clones share state, so a test can keep one handle for assertions while
//! the application owns another.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::rc::Rc;

use qubes_admin_config::RunMode;

use crate::error::AdminError;
use crate::protocol::decode_response;

use super::{CallBody, CallRequest, ServiceOptions, Transport, piped};

/// `(dest, method, arg, payload)` identifying one call.
pub type CallKey = (String, String, Option<String>, Option<Vec<u8>>);

/// Service invocation recorded by [`FakeTransport`].
pub type ServiceKey = (String, String, ServiceOptions);

#[derive(Debug)]
struct FakeState {
    expected: RefCell<HashMap<CallKey, Vec<u8>>>,
    answered: RefCell<HashSet<CallKey>>,
    calls: RefCell<Vec<CallKey>>,
    services: RefCell<Vec<ServiceKey>>,
    service_program: RefCell<String>,
    run_mode: Cell<RunMode>,
}

/// Transport double driven by an expected-call table.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    state: Rc<FakeState>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    /// Creates a fake in local run mode with no expectations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(FakeState {
                expected: RefCell::new(HashMap::new()),
                answered: RefCell::new(HashSet::new()),
                calls: RefCell::new(Vec::new()),
                services: RefCell::new(Vec::new()),
                service_program: RefCell::new("true".to_owned()),
                run_mode: Cell::new(RunMode::Local),
            }),
        }
    }

    /// Sets the run mode reported to callers.
    #[must_use]
    pub fn with_run_mode(self, mode: RunMode) -> Self {
        self.state.run_mode.set(mode);
        self
    }

    /// Sets the program spawned for service invocations.
    #[must_use]
    pub fn with_service_program(self, program: impl Into<String>) -> Self {
        *self.state.service_program.borrow_mut() = program.into();
        self
    }

    /// Registers the raw response for a call.
    pub fn expect(
        &self,
        dest: &str,
        method: &str,
        arg: Option<&str>,
        payload: Option<&[u8]>,
        response: &[u8],
    ) {
        let key = (
            dest.to_owned(),
            method.to_owned(),
            arg.map(str::to_owned),
            payload.map(<[u8]>::to_vec),
        );
        self.state
            .expected
            .borrow_mut()
            .insert(key, response.to_vec());
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallKey> {
        self.state.calls.borrow().clone()
    }

    /// Number of calls to `method` against `dest`.
    #[must_use]
    pub fn call_count(&self, dest: &str, method: &str) -> usize {
        self.state
            .calls
            .borrow()
            .iter()
            .filter(|(call_dest, call_method, _, _)| call_dest == dest && call_method == method)
            .count()
    }

    /// Service invocations built so far.
    #[must_use]
    pub fn service_requests(&self) -> Vec<ServiceKey> {
        self.state.services.borrow().clone()
    }

    /// Expected calls that were never made.
    #[must_use]
    pub fn uncalled(&self) -> Vec<CallKey> {
        let answered = self.state.answered.borrow();
        let mut missing: Vec<CallKey> = self
            .state
            .expected
            .borrow()
            .keys()
            .filter(|key| !answered.contains(*key))
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    /// Asserts that every expected call was made.
    ///
    /// # Panics
    ///
    /// Panics listing the calls that were never made.
    pub fn assert_all_called(&self) {
        let missing = self.uncalled();
        assert!(missing.is_empty(), "expected calls not made: {missing:?}");
    }
}

impl Transport for FakeTransport {
    fn call(&self, mut request: CallRequest) -> Result<Vec<u8>, AdminError> {
        let body = request.take_body()?;
        let payload = match body {
            CallBody::Empty => None,
            CallBody::Bytes(bytes) => Some(bytes),
            CallBody::Stream(stream) => Some(stream.read_all().map_err(|error| {
                AdminError::communication("failed to read payload stream", error)
            })?),
        };
        let key = (
            request.dest().to_owned(),
            request.method().to_owned(),
            request.arg().map(str::to_owned),
            payload,
        );
        self.state.calls.borrow_mut().push(key.clone());

        let response = self.state.expected.borrow().get(&key).cloned();
        let Some(raw) = response else {
            return Err(AdminError::Communication {
                message: format!("unexpected call {key:?}"),
                source: None,
            });
        };
        self.state.answered.borrow_mut().insert(key);
        decode_response(&raw)
    }

    fn service_command(
        &self,
        dest: &str,
        service: &str,
        options: &ServiceOptions,
    ) -> Result<Command, AdminError> {
        self.state
            .services
            .borrow_mut()
            .push((dest.to_owned(), service.to_owned(), options.clone()));
        options.check_wait_compatible()?;
        let mut command = Command::new(self.state.service_program.borrow().as_str());
        piped(&mut command);
        Ok(command)
    }

    fn run_mode(&self) -> RunMode {
        self.state.run_mode.get()
    }
}
