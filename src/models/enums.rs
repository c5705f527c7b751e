//! Enumeration types for constrained values.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Legal form of the customer company.
///
/// The wire names are the Finnish abbreviations used by the stored JSON
/// documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanyType {
    /// Sole trader (toiminimi).
    #[serde(rename = "Toiminimi")]
    SoleTrader,
    /// Limited company (osakeyhtiö, OY).
    #[serde(rename = "OY")]
    LimitedCompany,
}

impl CompanyType {
    /// Minimum monthly year-end accounting price for this company type.
    #[inline]
    #[must_use]
    pub const fn year_end_floor(self) -> f64 {
        match self {
            Self::SoleTrader => 100.0_f64,
            Self::LimitedCompany => 260.0_f64,
        }
    }
}

impl fmt::Display for CompanyType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SoleTrader => f.write_str("Toiminimi"),
            Self::LimitedCompany => f.write_str("OY"),
        }
    }
}

/// Workflow label of a saved calculation.
///
/// No transition rules are enforced; any label may be assigned at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalculationType {
    /// Work in progress.
    #[default]
    Draft,
    /// Sent to the customer as an offer.
    Offer,
    /// Agreed pricing.
    Final,
    /// No longer in use.
    Archived,
}

impl CalculationType {
    /// All labels in workflow display order.
    pub const ALL: [Self; 4] = [Self::Draft, Self::Offer, Self::Final, Self::Archived];

    /// Returns the wire name of the label.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Offer => "offer",
            Self::Final => "final",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for CalculationType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`CalculationType`] label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown calculation type `{0}` (expected draft, offer, final or archived)")]
pub struct ParseCalculationTypeError(String);

impl FromStr for CalculationType {
    type Err = ParseCalculationTypeError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| ParseCalculationTypeError(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_type_uses_finnish_wire_names() {
        let json = serde_json::to_string(&CompanyType::SoleTrader).unwrap();
        assert_eq!(json, r#""Toiminimi""#);
        let parsed: CompanyType = serde_json::from_str(r#""OY""#).unwrap();
        assert_eq!(parsed, CompanyType::LimitedCompany);
    }

    #[test]
    fn company_type_floors() {
        assert!((CompanyType::SoleTrader.year_end_floor() - 100.0).abs() < f64::EPSILON);
        assert!((CompanyType::LimitedCompany.year_end_floor() - 260.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_company_type_fails() {
        let result = serde_json::from_str::<CompanyType>(r#""Oyj""#);
        assert!(result.is_err());
    }

    #[test]
    fn calculation_type_serde() {
        let variants = [
            (CalculationType::Draft, r#""draft""#),
            (CalculationType::Offer, r#""offer""#),
            (CalculationType::Final, r#""final""#),
            (CalculationType::Archived, r#""archived""#),
        ];
        for (variant, expected_json) in variants {
            let json = serde_json::to_string(&variant).unwrap();
            assert_eq!(json, expected_json);
            let deserialized: CalculationType = serde_json::from_str(&json).unwrap();
            assert_eq!(deserialized, variant);
        }
    }

    #[test]
    fn calculation_type_from_str_is_case_insensitive() {
        assert_eq!("Offer".parse::<CalculationType>(), Ok(CalculationType::Offer));
        assert_eq!(" FINAL ".parse::<CalculationType>(), Ok(CalculationType::Final));
        assert!("sent".parse::<CalculationType>().is_err());
    }

    #[test]
    fn calculation_type_defaults_to_draft() {
        assert_eq!(CalculationType::default(), CalculationType::Draft);
    }
}
