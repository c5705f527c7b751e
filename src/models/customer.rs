//! Customer pricing profile.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::{CalculationId, CompanyType, CustomerId};
use crate::pricing::parse_instant;

/// The nine independent levers that raise the margin coefficient.
///
/// Each `true` flag adds the same fixed step; flags never interact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(
    clippy::struct_excessive_bools,
    reason = "each factor is an independent yes/no lever stored as-is"
)]
pub struct MarginFactors {
    /// Customer trades across borders.
    pub foreign_trade: bool,
    /// Customer handles cash.
    pub cash_operations: bool,
    /// Customer runs an online shop.
    pub ecommerce: bool,
    /// Customer imports goods.
    pub import: bool,
    /// Balance sheet carries fixed assets.
    pub assets_in_balance: bool,
    /// Customer holds investments.
    pub investments: bool,
    /// Customer is a limited company.
    pub is_limited_company: bool,
    /// Customer is VAT liable.
    pub vat_liable: bool,
    /// Bank statements are delivered manually.
    pub manual_bank_statement: bool,
}

impl MarginFactors {
    /// Every factor enabled.
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self {
            foreign_trade: true,
            cash_operations: true,
            ecommerce: true,
            import: true,
            assets_in_balance: true,
            investments: true,
            is_limited_company: true,
            vat_liable: true,
            manual_bank_statement: true,
        }
    }

    /// Number of enabled factors (0..=9).
    #[inline]
    #[must_use]
    pub fn count(&self) -> u8 {
        [
            self.foreign_trade,
            self.cash_operations,
            self.ecommerce,
            self.import,
            self.assets_in_balance,
            self.investments,
            self.is_limited_company,
            self.vat_liable,
            self.manual_bank_statement,
        ]
        .into_iter()
        .map(u8::from)
        .sum()
    }
}

/// Percentage discount with an expiry date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    /// Discount percentage, 0–100.
    pub percentage: f64,
    /// Last instant the discount applies (ISO-8601).
    pub valid_until: String,
}

/// A customer pricing profile.
///
/// Replaced wholesale on update; there are no partial-field patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Unique identifier.
    pub id: CustomerId,
    /// Display name.
    pub name: String,
    /// Legal form; selects the year-end price floor.
    pub company_type: CompanyType,
    /// Total hours worked over the last three months.
    pub hours_last3_months: f64,
    /// Hourly rate.
    pub hourly_rate: f64,
    /// Monthly accounting software price (passed through).
    pub accounting_software_price: f64,
    /// Price per employee salary payment.
    pub salary_payment_price: f64,
    /// Number of employees paid each month.
    pub number_of_employees: u32,
    /// Previous year's total invoicing, used for year-end pricing.
    pub previous_year_invoicing: f64,
    /// Date until which the pricing as a whole is valid (ISO-8601).
    pub pricing_valid_until: String,
    /// Start of the year-end accounting window (ISO-8601).
    pub year_end_accounting_start_date: String,
    /// End of the year-end accounting window (ISO-8601).
    pub year_end_accounting_end_date: String,
    /// Margin levers.
    pub margin_factors: MarginFactors,
    /// Discount details.
    pub discount: Discount,
    /// First invoicing month; adds a one-time setup fee.
    pub is_first_month: bool,
    /// Special offer flag. Stored only; no pricing rule reads it.
    pub is_special_offer: bool,
    /// Ids of saved calculations referencing this customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_ids: Option<Vec<CalculationId>>,
}

impl Customer {
    /// Creates a profile with zeroed prices, no factors and empty dates.
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(id: CustomerId, name: T, company_type: CompanyType) -> Self {
        Self {
            id,
            name: name.into(),
            company_type,
            hours_last3_months: 0.0,
            hourly_rate: 0.0,
            accounting_software_price: 0.0,
            salary_payment_price: 0.0,
            number_of_employees: 0,
            previous_year_invoicing: 0.0,
            pricing_valid_until: String::new(),
            year_end_accounting_start_date: String::new(),
            year_end_accounting_end_date: String::new(),
            margin_factors: MarginFactors::default(),
            discount: Discount::default(),
            is_first_month: false,
            is_special_offer: false,
            calculation_ids: None,
        }
    }

    /// Adds a calculation id to the back-reference index if absent.
    ///
    /// Returns `true` when the index changed.
    #[inline]
    pub fn link_calculation(&mut self, id: &CalculationId) -> bool {
        let ids = self.calculation_ids.get_or_insert_with(Vec::new);
        if ids.contains(id) {
            return false;
        }
        ids.push(id.clone());
        true
    }

    /// Removes a calculation id from the back-reference index.
    ///
    /// Returns `true` when the index changed.
    #[inline]
    pub fn unlink_calculation(&mut self, id: &CalculationId) -> bool {
        let Some(ids) = self.calculation_ids.as_mut() else {
            return false;
        };
        let before = ids.len();
        ids.retain(|existing| existing != id);
        ids.len() != before
    }

    /// Checks the profile against the documented input constraints.
    ///
    /// The calculator itself never calls this; bad inputs flow through the
    /// arithmetic unchanged. Callers that want strict input use this (or
    /// [`crate::pricing::validate_customer`]) before pricing.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let amounts = [
            ("hoursLast3Months", self.hours_last3_months),
            ("hourlyRate", self.hourly_rate),
            ("accountingSoftwarePrice", self.accounting_software_price),
            ("salaryPaymentPrice", self.salary_payment_price),
            ("previousYearInvoicing", self.previous_year_invoicing),
        ];
        for (field, value) in amounts {
            if !value.is_finite() {
                issues.push(ValidationIssue::NotFinite { field });
            } else if value < 0.0 {
                issues.push(ValidationIssue::Negative { field, value });
            }
        }
        let pct = self.discount.percentage;
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            issues.push(ValidationIssue::DiscountOutOfRange(pct));
        }
        let dates = [
            ("pricingValidUntil", &self.pricing_valid_until),
            ("yearEndAccountingStartDate", &self.year_end_accounting_start_date),
            ("yearEndAccountingEndDate", &self.year_end_accounting_end_date),
            ("discount.validUntil", &self.discount.valid_until),
        ];
        for (field, value) in dates {
            if parse_instant(value).is_none() {
                issues.push(ValidationIssue::InvalidDate {
                    field,
                    value: value.clone(),
                });
            }
        }
        issues
    }
}

/// A single problem found by [`Customer::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// A price or hour field is below zero.
    Negative {
        /// Wire name of the field.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A numeric field is NaN or infinite.
    NotFinite {
        /// Wire name of the field.
        field: &'static str,
    },
    /// Discount percentage is outside 0–100.
    DiscountOutOfRange(f64),
    /// A date field does not parse as an ISO-8601 instant.
    InvalidDate {
        /// Wire name of the field.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

impl fmt::Display for ValidationIssue {
    #[inline]
    #[allow(
        clippy::pattern_type_mismatch,
        reason = "the raw date is bound by reference through the match on &self"
    )]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative { field, value } => write!(f, "{field} is negative ({value})"),
            Self::NotFinite { field } => write!(f, "{field} is not a finite number"),
            Self::DiscountOutOfRange(pct) => {
                write!(f, "discount percentage {pct} is outside 0-100")
            }
            Self::InvalidDate { field, value } => {
                write!(f, "{field} is not a valid date ({value:?})")
            }
        }
    }
}
