//! Saved-calculation lifecycle.
//!
//! Each function is a pure transform: ids and instants are passed in, and
//! the input record is left untouched. The manager facades
//! ([`crate::laskuri`]) supply them from their injected services.

use chrono::{DateTime, Utc};

use crate::models::{
    CalculationId, CalculationType, Customer, NewCalculation, SavedCalculation,
};
use crate::pricing::calculate_invoice;

/// Suffix appended to a duplicate's name when no new name is given.
const COPY_SUFFIX: &str = " (Copy)";

/// Turns an empty string into `None`.
fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Creates version 1 of a calculation for `customer`.
///
/// The customer is deep-copied into the snapshot, so later edits to the
/// live record cannot change this calculation.
#[must_use]
pub fn create_saved_calculation(
    customer: &Customer,
    request: NewCalculation,
    id: CalculationId,
    now: DateTime<Utc>,
) -> SavedCalculation {
    let result = calculate_invoice(customer, request.vat_rate, now);
    SavedCalculation {
        id,
        customer_id: customer.id.clone(),
        name: request.name,
        description: non_empty(request.description),
        notes: non_empty(request.notes),
        created_at: now,
        modified_at: now,
        kind: request.kind,
        customer_snapshot: customer.clone(),
        result,
        version: 1,
    }
}

/// Copies `calc` under a new id, resetting timestamps and version.
///
/// The snapshot and result are carried over without recomputation; the
/// copy keeps the old numbers until it is recalculated.
#[must_use]
pub fn duplicate_calculation(
    calc: &SavedCalculation,
    new_name: Option<&str>,
    id: CalculationId,
    now: DateTime<Utc>,
) -> SavedCalculation {
    let name = new_name.map_or_else(|| format!("{}{COPY_SUFFIX}", calc.name), str::to_owned);
    SavedCalculation {
        id,
        name,
        created_at: now,
        modified_at: now,
        version: 1,
        ..calc.clone()
    }
}

/// Reprices the stored snapshot.
///
/// Uses `vat_rate` when given, otherwise the rate of the previous result.
/// The live customer is never consulted.
#[must_use]
pub fn recalculate_invoice(
    calc: &SavedCalculation,
    vat_rate: Option<f64>,
    now: DateTime<Utc>,
) -> SavedCalculation {
    let rate = vat_rate.unwrap_or(calc.result.vat_rate);
    SavedCalculation {
        result: calculate_invoice(&calc.customer_snapshot, rate, now),
        modified_at: now,
        version: calc.version.saturating_add(1),
        ..calc.clone()
    }
}

/// Replaces the snapshot with a fresh copy of `customer` and reprices it at
/// the calculation's existing VAT rate.
///
/// The calculation follows the snapshot: `customer_id` becomes
/// `customer.id`, so passing another customer moves the record to it.
#[must_use]
pub fn update_calculation_customer(
    calc: &SavedCalculation,
    customer: &Customer,
    now: DateTime<Utc>,
) -> SavedCalculation {
    SavedCalculation {
        customer_id: customer.id.clone(),
        customer_snapshot: customer.clone(),
        result: calculate_invoice(customer, calc.result.vat_rate, now),
        modified_at: now,
        version: calc.version.saturating_add(1),
        ..calc.clone()
    }
}

/// Relabels a calculation. Any label is accepted from any other.
#[must_use]
pub fn set_calculation_type(
    calc: &SavedCalculation,
    kind: CalculationType,
    now: DateTime<Utc>,
) -> SavedCalculation {
    SavedCalculation {
        kind,
        modified_at: now,
        version: calc.version.saturating_add(1),
        ..calc.clone()
    }
}
