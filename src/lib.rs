//! Service-invoice pricing for accounting-firm customers.
//!
//! The [`pricing`] module turns a [`models::Customer`] profile into an
//! itemized [`models::InvoiceCalculationResult`]. The [`calculations`]
//! module versions and snapshots those results as saved calculations, and
//! [`laskuri`] ties both to a pluggable [`storage`] backend.

pub mod calculations;
pub mod error;
pub mod laskuri;
pub mod models;
pub mod pricing;
pub mod services;
pub mod storage;
