//! Itemized invoice produced by the calculator.

use serde::{Deserialize, Serialize};

/// Pre-margin, pre-VAT line items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtotals {
    /// Average monthly hours times the hourly rate.
    pub hourly_work: f64,
    /// Accounting software, passed through at cost.
    pub accounting_software: f64,
    /// Salary payment price times number of employees.
    pub salary_payments: f64,
    /// Sum of the three lines above.
    pub total_subtotal: f64,
}

/// Output of one calculator run for a customer and VAT rate.
///
/// Derived entirely from its inputs and the instant used for date checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCalculationResult {
    /// Hours over the last three months divided by three.
    pub average_hours: f64,
    /// Line items.
    pub subtotals: Subtotals,
    /// Margin multiplier in `[0.1, 1.0]`.
    pub margin_coefficient: f64,
    /// Margin earned on hourly work only.
    pub margin_amount: f64,
    /// Year-end accounting fee, zero outside the window.
    pub year_end_accounting_price: f64,
    /// Discount applied to the total subtotal.
    pub discount_amount: f64,
    /// One-time fees.
    pub additional_fees: f64,
    /// VAT rate used, as a fraction (0.24 = 24 %).
    pub vat_rate: f64,
    /// Invoice total before VAT.
    pub price_without_vat: f64,
    /// Invoice total including VAT.
    pub price_with_vat: f64,
    /// Firm's own profit proxy.
    pub customer_margin: f64,
}

impl InvoiceCalculationResult {
    /// VAT portion of the total.
    #[inline]
    #[must_use]
    pub fn vat_amount(&self) -> f64 {
        self.price_with_vat - self.price_without_vat
    }
}
