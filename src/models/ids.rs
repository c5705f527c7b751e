//! Newtype wrappers for entity identifiers.
//!
//! Customers and saved calculations are both keyed by opaque strings
//! (UUIDs in practice); the wrappers keep the two from being mixed up.

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapping a `String` inner type.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given string.
            #[inline]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Returns a reference to the inner string.
            #[inline]
            #[must_use]
            pub fn as_inner(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

define_string_id! {
    /// Unique identifier for a customer pricing profile.
    CustomerId
}

define_string_id! {
    /// Unique identifier for a saved calculation.
    CalculationId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_id_serde_is_transparent() {
        let id = CustomerId::new("c3f1a2b4-0000-0000-0000-000000000001".to_owned());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""c3f1a2b4-0000-0000-0000-000000000001""#);
        let back: CustomerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn calculation_id_display_and_accessors() {
        let id = CalculationId::from("calc-7");
        assert_eq!(id.to_string(), "calc-7");
        assert_eq!(id.as_inner(), "calc-7");
        assert_eq!(id.into_inner(), "calc-7");
    }
}
