//! Data models for customers, invoices and saved calculations.
//!
//! This module contains strongly-typed representations of the stored JSON
//! documents, newtype ID wrappers, and enumeration types for constrained
//! values.

mod calculation;
mod customer;
mod documents;
mod enums;
mod ids;
mod invoice;

pub use calculation::{DEFAULT_VAT_RATE, NewCalculation, SavedCalculation};
pub use customer::{Customer, Discount, MarginFactors, ValidationIssue};
pub use documents::{CalculationsDocument, CustomersDocument, StoragePreferences};
pub use enums::{CalculationType, CompanyType, ParseCalculationTypeError};
pub use ids::{CalculationId, CustomerId};
pub use invoice::{InvoiceCalculationResult, Subtotals};

/// Re-export of [`chrono::DateTime`] for convenience.
pub use chrono::DateTime;
/// Re-export of [`chrono::Utc`] for convenience.
pub use chrono::Utc;
