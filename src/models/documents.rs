//! On-disk JSON document shapes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{Customer, SavedCalculation};

/// `{ "customers": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomersDocument {
    /// Stored customers; a missing key loads as empty.
    #[serde(default)]
    pub customers: Vec<Customer>,
}

/// `{ "calculations": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationsDocument {
    /// Stored calculations; a missing key loads as empty.
    #[serde(default)]
    pub calculations: Vec<SavedCalculation>,
}

/// Storage preferences, always kept in the application data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePreferences {
    /// Directory holding the data files, if the user picked one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_storage_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_loads_as_empty_collections() {
        let customers: CustomersDocument = serde_json::from_str("{}").unwrap();
        assert!(customers.customers.is_empty());
        let calculations: CalculationsDocument = serde_json::from_str("{}").unwrap();
        assert!(calculations.calculations.is_empty());
    }

    #[test]
    fn empty_preferences_serialize_to_empty_object() {
        let json = serde_json::to_string(&StoragePreferences::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn preferences_use_camel_case_key() {
        let prefs: StoragePreferences =
            serde_json::from_str(r#"{"customStoragePath":"/srv/laskuri"}"#).unwrap();
        assert_eq!(prefs.custom_storage_path, Some(PathBuf::from("/srv/laskuri")));
    }
}
