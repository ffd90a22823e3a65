//! Conversion of names and wrappers into daemon identifiers.
//!
//! Operations that take a domain, template, label, or pool accept either the
//! raw name or the wrapper object and normalise it here, at the API boundary.

use std::rc::Rc;

/// Values that name a daemon entity.
pub trait ToIdentifier {
    /// Returns the entity name sent to the daemon.
    fn to_identifier(&self) -> String;
}

impl ToIdentifier for str {
    fn to_identifier(&self) -> String {
        self.to_owned()
    }
}

impl ToIdentifier for String {
    fn to_identifier(&self) -> String {
        self.clone()
    }
}

impl<T: ToIdentifier + ?Sized> ToIdentifier for &T {
    fn to_identifier(&self) -> String {
        (**self).to_identifier()
    }
}

impl<T: ToIdentifier + ?Sized> ToIdentifier for Rc<T> {
    fn to_identifier(&self) -> String {
        (**self).to_identifier()
    }
}
