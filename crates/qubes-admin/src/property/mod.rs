//! Named attributes of daemon-backed objects.
//!
//! A [`PropertyHolder`] reads, writes, resets, and lists the properties of
//! one destination through a method prefix such as `admin.vm.property.`.
//! Values read from the daemon are cached per property name; every write or
//! reset invalidates exactly the key it touched.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString};
use tracing::debug;

use crate::client::AdminClient;
use crate::error::AdminError;
use crate::protocol::{body_text, parse_name_lines};

/// Tracing target for property access.
pub(crate) const PROPERTY_TARGET: &str = "qubes_admin::property";

/// Method prefix for global properties held by `dom0`.
pub const ADMIN_PROPERTY_PREFIX: &str = "admin.property.";
/// Method prefix for per-domain properties.
pub const VM_PROPERTY_PREFIX: &str = "admin.vm.property.";

/// Type tag sent with every property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PropertyType {
    /// Free-form text.
    Str,
    /// `True` or `False`.
    Bool,
    /// Decimal integer.
    Int,
    /// Domain name, empty when unset.
    Vm,
    /// Label name, empty when unset.
    Label,
}

/// Decoded property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Text value.
    Str(String),
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Referenced domain, if any.
    Vm(Option<String>),
    /// Referenced label, if any.
    Label(Option<String>),
}

impl PropertyValue {
    /// Decodes `raw` according to its type tag.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::InvalidValue`] when a boolean or integer value
    /// does not parse.
    pub fn decode(kind: PropertyType, raw: &str) -> Result<Self, AdminError> {
        let value = match kind {
            PropertyType::Str => Self::Str(raw.to_owned()),
            PropertyType::Bool => match raw {
                "True" => Self::Bool(true),
                "False" => Self::Bool(false),
                other => return Err(AdminError::invalid_value("bool", other)),
            },
            PropertyType::Int => Self::Int(
                raw.parse()
                    .map_err(|_| AdminError::invalid_value("int", raw))?,
            ),
            PropertyType::Vm => Self::Vm(non_empty(raw)),
            PropertyType::Label => Self::Label(non_empty(raw)),
        };
        Ok(value)
    }

    /// Text sent to the daemon when setting this value.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Str(text) => text.clone(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::Int(number) => number.to_string(),
            Self::Vm(name) | Self::Label(name) => name.clone().unwrap_or_default(),
        }
    }

    /// Returns the text form of string-like values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            Self::Vm(name) | Self::Label(name) => name.as_deref(),
            Self::Bool(_) | Self::Int(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_owned())
}

/// One cached property read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    /// Whether the daemon reports the default value.
    pub is_default: bool,
    /// Declared value type.
    pub kind: PropertyType,
    /// Decoded value.
    pub value: PropertyValue,
}

impl PropertyEntry {
    /// Parses a `default=<bool> type=<type> <value>` response.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Protocol`] for a malformed header and
    /// [`AdminError::InvalidValue`] for a value that does not match its type.
    pub fn parse(body: &[u8]) -> Result<Self, AdminError> {
        let text = body_text(body, "property value")?;
        let mut fields = text.splitn(3, ' ');
        let is_default = match fields.next().and_then(|f| f.strip_prefix("default=")) {
            Some("True") => true,
            Some("False") => false,
            _ => {
                return Err(AdminError::protocol(format!(
                    "property response '{text}' lacks a default flag"
                )));
            }
        };
        let kind = fields
            .next()
            .and_then(|field| field.strip_prefix("type="))
            .and_then(|name| PropertyType::from_str(name).ok())
            .ok_or_else(|| {
                AdminError::protocol(format!("property response '{text}' lacks a known type"))
            })?;
        let value = PropertyValue::decode(kind, fields.next().unwrap_or_default())?;
        Ok(Self {
            is_default,
            kind,
            value,
        })
    }
}

/// Cached property access for one destination.
#[derive(Debug)]
pub struct PropertyHolder {
    client: AdminClient,
    prefix: &'static str,
    dest: RefCell<String>,
    cache: RefCell<HashMap<String, PropertyEntry>>,
}

impl PropertyHolder {
    /// Creates a holder calling `<prefix><Verb>` against `dest`.
    #[must_use]
    pub fn new(client: AdminClient, prefix: &'static str, dest: impl Into<String>) -> Self {
        Self {
            client,
            prefix,
            dest: RefCell::new(dest.into()),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Destination the holder currently calls.
    #[must_use]
    pub fn dest(&self) -> String {
        self.dest.borrow().clone()
    }

    /// Method prefix in use.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        self.prefix
    }

    fn method(&self, verb: &str) -> String {
        format!("{}{verb}", self.prefix)
    }

    fn call(&self, verb: &str, name: &str, payload: Option<&[u8]>) -> Result<Vec<u8>, AdminError> {
        let dest = self.dest();
        self.client
            .qubesd_call(&dest, &self.method(verb), Some(name), payload)
    }

    /// Reads a property together with its default flag.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed responses.
    pub fn entry(&self, name: &str) -> Result<PropertyEntry, AdminError> {
        if let Some(entry) = self.cache.borrow().get(name) {
            return Ok(entry.clone());
        }
        let body = self.call("Get", name, None)?;
        let entry = PropertyEntry::parse(&body)?;
        debug!(
            target: PROPERTY_TARGET,
            dest = %self.dest.borrow(),
            property = name,
            is_default = entry.is_default,
            "cached property value"
        );
        self.cache
            .borrow_mut()
            .insert(name.to_owned(), entry.clone());
        Ok(entry)
    }

    /// Reads a property value.
    ///
    /// # Errors
    ///
    /// As for [`Self::entry`].
    pub fn get(&self, name: &str) -> Result<PropertyValue, AdminError> {
        self.entry(name).map(|entry| entry.value)
    }

    /// Reports whether a property holds its default value.
    ///
    /// # Errors
    ///
    /// As for [`Self::entry`].
    pub fn is_default(&self, name: &str) -> Result<bool, AdminError> {
        self.entry(name).map(|entry| entry.is_default)
    }

    /// Sets a property and forgets its cached value.
    ///
    /// # Errors
    ///
    /// As for [`Self::set_raw`].
    pub fn set(&self, name: &str, value: impl Into<PropertyValue>) -> Result<(), AdminError> {
        self.set_raw(name, &value.into().encode())
    }

    /// Sets a property from its wire text.
    ///
    /// A domain's `name` cannot be set here; renames go through
    /// `Qubes::rename_vm` so the wrapper and the domain collection follow.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Usage`] for a domain's `name`, and propagates
    /// call failures.
    pub fn set_raw(&self, name: &str, value: &str) -> Result<(), AdminError> {
        if self.prefix == VM_PROPERTY_PREFIX && name == "name" {
            return Err(AdminError::usage("rename domains through Qubes::rename_vm"));
        }
        self.write(name, value)
    }

    pub(crate) fn write(&self, name: &str, value: &str) -> Result<(), AdminError> {
        self.call("Set", name, Some(value.as_bytes()))?;
        self.invalidate(name);
        Ok(())
    }

    /// Restores a property to its default and forgets its cached value.
    ///
    /// # Errors
    ///
    /// Propagates call failures.
    pub fn reset(&self, name: &str) -> Result<(), AdminError> {
        self.call("Reset", name, None)?;
        self.invalidate(name);
        Ok(())
    }

    /// Lists the names of all properties the destination recognises.
    ///
    /// # Errors
    ///
    /// Propagates call failures and malformed responses.
    pub fn list(&self) -> Result<Vec<String>, AdminError> {
        let dest = self.dest();
        let body = self
            .client
            .qubesd_call(&dest, &self.method("List"), None, None)?;
        parse_name_lines(&body)
    }

    /// Fetches the help text for a property.
    ///
    /// # Errors
    ///
    /// Propagates call failures and non-text responses.
    pub fn help(&self, name: &str) -> Result<String, AdminError> {
        let body = self.call("Help", name, None)?;
        body_text(&body, "property help").map(str::to_owned)
    }

    /// Forgets the cached value of one property.
    pub fn invalidate(&self, name: &str) {
        if self.cache.borrow_mut().remove(name).is_some() {
            debug!(
                target: PROPERTY_TARGET,
                dest = %self.dest.borrow(),
                property = name,
                "invalidated property"
            );
        }
    }

    /// Forgets every cached value.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Points the holder at a new destination, dropping all cached values.
    pub(crate) fn retarget(&self, dest: impl Into<String>) {
        *self.dest.borrow_mut() = dest.into();
        self.clear_cache();
    }
}
