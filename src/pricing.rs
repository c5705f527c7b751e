//! Invoice pricing calculator.
//!
//! Every function here is pure: the only time input is the `now` instant
//! passed in by the caller, which makes the date-window rules
//! reproducible in tests. Inputs are not validated; negative or absurd
//! values flow through the arithmetic, and unparseable dates collapse the
//! dependent amount to zero. Use [`validate_customer`] first when strict
//! input is wanted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{LaskuriError, Result};
use crate::models::{Customer, InvoiceCalculationResult, Subtotals};

/// Margin coefficient carried by every customer, even with no factors set.
pub const BASE_MARGIN_COEFFICIENT: f64 = 0.1;

/// Increment added per enabled margin factor.
pub const MARGIN_FACTOR_STEP: f64 = 0.1;

/// One-time setup fee charged in the customer's first month.
pub const FIRST_MONTH_FEE: f64 = 50.0;

/// Hours are reported as a three-month total.
const HOURS_WINDOW_MONTHS: f64 = 3.0;

/// Year-end fee is the previous year's invoicing spread over a year.
const MONTHS_PER_YEAR: f64 = 12.0;

/// Naive date-time layouts accepted after RFC 3339, interpreted as UTC.
const NAIVE_DATE_TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses an ISO-8601 date or timestamp into a UTC instant.
///
/// Accepts RFC 3339 (`2025-01-31T12:00:00.000Z`, any offset), naive
/// date-times (`2025-01-31T12:00:00`, taken as UTC) and plain dates
/// (`2025-01-31`, midnight UTC). Returns `None` for anything else,
/// including the empty string.
#[must_use]
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Margin coefficient: 0.1 plus 0.1 per enabled margin factor.
///
/// Always within `[0.1, 1.0]`. Computed as `(1 + factors) / 10` so each
/// step lands on the nearest double to its decimal value.
#[inline]
#[must_use]
pub fn calculate_margin_coefficient(customer: &Customer) -> f64 {
    f64::from(customer.margin_factors.count() + 1) / 10.0
}

/// Monthly year-end accounting price.
///
/// `previous_year_invoicing / 12`, raised to the company-type floor
/// (100 for sole traders, 260 for limited companies). The price is only
/// charged while `now` lies inside the customer's year-end window
/// (bounds inclusive); outside it, or when either bound fails to parse,
/// the result is 0.
#[must_use]
pub fn calculate_year_end_price(customer: &Customer, now: DateTime<Utc>) -> f64 {
    let base = customer.previous_year_invoicing / MONTHS_PER_YEAR;
    let floor = customer.company_type.year_end_floor();
    let price = if base < floor { floor } else { base };

    let start = parse_instant(&customer.year_end_accounting_start_date);
    let end = parse_instant(&customer.year_end_accounting_end_date);
    let (Some(start), Some(end)) = (start, end) else {
        return 0.0;
    };
    if now < start || now > end {
        return 0.0;
    }
    price
}

/// Discount on `subtotal`.
///
/// Applies only while `discount.valid_until >= now` and the percentage is
/// positive. There is no start date: a discount is valid from the moment
/// it is entered until it expires.
#[must_use]
pub fn calculate_discount(subtotal: f64, customer: &Customer, now: DateTime<Utc>) -> f64 {
    let discount = &customer.discount;
    let still_valid = parse_instant(&discount.valid_until).is_some_and(|until| until >= now);
    if still_valid && discount.percentage > 0.0 {
        subtotal * (discount.percentage / 100.0)
    } else {
        0.0
    }
}

/// The firm's profit proxy for one invoice.
///
/// Accounting software is a pass-through cost: it is added to the
/// subtotal but subtracted here.
#[inline]
#[must_use]
pub fn calculate_customer_margin(
    hourly_work: f64,
    salary_payments: f64,
    pass_through_software_cost: f64,
    year_end_price: f64,
    discount_amount: f64,
) -> f64 {
    hourly_work + salary_payments - pass_through_software_cost + year_end_price - discount_amount
}

/// Computes the full invoice breakdown for `customer` at `vat_rate`.
///
/// `now` drives the year-end window and discount expiry checks.
#[must_use]
pub fn calculate_invoice(
    customer: &Customer,
    vat_rate: f64,
    now: DateTime<Utc>,
) -> InvoiceCalculationResult {
    let average_hours = customer.hours_last3_months / HOURS_WINDOW_MONTHS;

    let hourly_work = average_hours * customer.hourly_rate;
    let accounting_software = customer.accounting_software_price;
    let salary_payments =
        customer.salary_payment_price * f64::from(customer.number_of_employees);
    let total_subtotal = hourly_work + accounting_software + salary_payments;

    // Margin is earned on hourly work only, never on pass-through lines.
    let margin_coefficient = calculate_margin_coefficient(customer);
    let margin_amount = hourly_work * margin_coefficient;

    let year_end_accounting_price = calculate_year_end_price(customer, now);
    let discount_amount = calculate_discount(total_subtotal, customer, now);
    let additional_fees = if customer.is_first_month {
        FIRST_MONTH_FEE
    } else {
        0.0
    };

    let price_without_vat = total_subtotal + margin_amount + year_end_accounting_price
        - discount_amount
        + additional_fees;
    let price_with_vat = price_without_vat * (1.0 + vat_rate);

    let customer_margin = calculate_customer_margin(
        hourly_work,
        salary_payments,
        accounting_software,
        year_end_accounting_price,
        discount_amount,
    );

    tracing::trace!(
        customer = %customer.id,
        price_without_vat,
        price_with_vat,
        "invoice calculated"
    );

    InvoiceCalculationResult {
        average_hours,
        subtotals: Subtotals {
            hourly_work,
            accounting_software,
            salary_payments,
            total_subtotal,
        },
        margin_coefficient,
        margin_amount,
        year_end_accounting_price,
        discount_amount,
        additional_fees,
        vat_rate,
        price_without_vat,
        price_with_vat,
        customer_margin,
    }
}

/// Rejects customers that fail [`Customer::validate`].
///
/// # Errors
///
/// Returns [`LaskuriError::Validation`] listing every issue found.
#[inline]
pub fn validate_customer(customer: &Customer) -> Result<()> {
    let issues = customer.validate();
    if issues.is_empty() {
        return Ok(());
    }
    let joined = issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(LaskuriError::Validation(format!(
        "customer {}: {joined}",
        customer.id
    )))
}
