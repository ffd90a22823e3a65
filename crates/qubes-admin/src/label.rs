//! Domain labels.

use std::fmt;

use once_cell::unsync::OnceCell;

use crate::client::AdminClient;
use crate::collection::Wrapped;
use crate::error::AdminError;
use crate::identifier::ToIdentifier;
use crate::protocol::{SOURCE, body_text};

/// A label that can be assigned to domains.
///
/// The numeric index and the colour are fetched on first use and kept for
/// the lifetime of the wrapper.
#[derive(Debug)]
pub struct Label {
    client: AdminClient,
    name: String,
    index: OnceCell<u32>,
    color: OnceCell<String>,
}

impl Label {
    /// Creates a wrapper for the label called `name`.
    #[must_use]
    pub fn new(client: AdminClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            index: OnceCell::new(),
            color: OnceCell::new(),
        }
    }

    /// Label name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric index, usable as an alternate lookup key.
    ///
    /// # Errors
    ///
    /// Propagates call failures and non-numeric responses.
    pub fn index(&self) -> Result<u32, AdminError> {
        self.index
            .get_or_try_init(|| {
                let body = self.fetch("admin.label.Index")?;
                body.trim()
                    .parse()
                    .map_err(|_| AdminError::invalid_value("label index", body.trim()))
            })
            .copied()
    }

    /// Colour as reported by the daemon, such as `0xcc0000`.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn color(&self) -> Result<&str, AdminError> {
        self.color
            .get_or_try_init(|| self.fetch("admin.label.Get").map(|body| body.trim().to_owned()))
            .map(String::as_str)
    }

    fn fetch(&self, method: &str) -> Result<String, AdminError> {
        let body = self
            .client
            .qubesd_call(SOURCE, method, Some(&self.name), None)?;
        body_text(&body, "label attribute").map(str::to_owned)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Label {}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl ToIdentifier for Label {
    fn to_identifier(&self) -> String {
        self.name.clone()
    }
}

impl Wrapped for Label {
    const ENTITY: &'static str = "label";
    const LIST_METHOD: &'static str = "admin.label.List";

    fn wrap(client: &AdminClient, name: &str) -> Self {
        Self::new(client.clone(), name)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
