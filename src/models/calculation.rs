//! Saved, versioned calculation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CalculationId, CalculationType, Customer, CustomerId, InvoiceCalculationResult};

/// VAT rate applied when none is given (Finnish general rate).
pub const DEFAULT_VAT_RATE: f64 = 0.24;

/// A persisted calculation that snapshots a customer at a point in time.
///
/// The snapshot is an independent copy; later edits to the live customer
/// never reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCalculation {
    /// Unique identifier.
    pub id: CalculationId,
    /// Customer the calculation was made for (back-reference, not ownership).
    pub customer_id: CustomerId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last modification instant.
    pub modified_at: DateTime<Utc>,
    /// Workflow label.
    #[serde(rename = "type")]
    pub kind: CalculationType,
    /// Customer state the result was computed from.
    pub customer_snapshot: Customer,
    /// Computed invoice.
    pub result: InvoiceCalculationResult,
    /// Starts at 1, bumped by every mutating operation.
    pub version: u32,
}

/// Parameters for creating a [`SavedCalculation`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    /// Display name.
    pub name: String,
    /// Initial label.
    pub kind: CalculationType,
    /// Description; empty is stored as absent.
    pub description: String,
    /// Notes; empty is stored as absent.
    pub notes: String,
    /// VAT rate for the first computation.
    pub vat_rate: f64,
}

impl NewCalculation {
    /// A draft with no description or notes at the default VAT rate.
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            kind: CalculationType::Draft,
            description: String::new(),
            notes: String::new(),
            vat_rate: DEFAULT_VAT_RATE,
        }
    }

    /// Sets the initial label.
    #[inline]
    #[must_use]
    pub const fn kind(mut self, kind: CalculationType) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the description.
    #[inline]
    #[must_use]
    pub fn description<T: Into<String>>(mut self, description: T) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the notes.
    #[inline]
    #[must_use]
    pub fn notes<T: Into<String>>(mut self, notes: T) -> Self {
        self.notes = notes.into();
        self
    }

    /// Sets the VAT rate.
    #[inline]
    #[must_use]
    pub const fn vat_rate(mut self, vat_rate: f64) -> Self {
        self.vat_rate = vat_rate;
        self
    }
}
