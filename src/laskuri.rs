//! Store-backed calculation manager.
//!
//! Combines the pure calculator ([`crate::pricing`]) and lifecycle
//! transforms ([`crate::calculations`]) with a [`Storage`] /
//! [`BlockingStorage`] backend, an injected [`Clock`] and an
//! [`IdGenerator`].
//!
//! Collection operations are load-modify-save against the store. Updates of
//! a missing id fail with a not-found error; deletes of a missing id log a
//! warning and return the collection unchanged. The `calculationIds`
//! back-reference index on customers is maintained best-effort: a failure
//! there is logged and never undoes the calculation write that caused it.
//!
//! [`Storage`]: crate::storage::Storage
//! [`BlockingStorage`]: crate::storage::BlockingStorage
//! [`Clock`]: crate::services::Clock
//! [`IdGenerator`]: crate::services::IdGenerator

/// Generates a store-backed manager (async or blocking).
macro_rules! define_laskuri {
    (
        manager_name: $manager:ident,
        builder_name: $builder:ident,
        storage_trait: $storage_trait:ident,
        manager_doc: $manager_doc:expr,
        builder_doc: $builder_doc:expr,
        $(async_kw: $async_kw:tt,)?
        $(await_kw: $await_ext:tt,)?
    ) => {
        #[doc = $builder_doc]
        #[derive(Debug)]
        pub struct $builder<S: $storage_trait> {
            /// Storage backend.
            storage: Option<S>,
            /// Time source; the system clock when unset.
            clock: Option<Box<dyn Clock>>,
            /// Id source; random UUIDs when unset.
            ids: Option<Box<dyn IdGenerator>>,
            /// VAT rate used when a call does not name one.
            default_vat_rate: f64,
        }

        impl<S: $storage_trait> $builder<S> {
            /// Sets the storage backend.
            #[inline]
            #[must_use]
            pub fn storage(mut self, storage: S) -> Self {
                self.storage = Some(storage);
                self
            }

            /// Sets the time source used for date windows and timestamps.
            #[inline]
            #[must_use]
            pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
                self.clock = Some(Box::new(clock));
                self
            }

            /// Sets the source of calculation ids.
            #[inline]
            #[must_use]
            pub fn id_generator<G: IdGenerator + 'static>(mut self, ids: G) -> Self {
                self.ids = Some(Box::new(ids));
                self
            }

            /// Overrides the default VAT rate (0.24).
            #[inline]
            #[must_use]
            pub const fn default_vat_rate(mut self, rate: f64) -> Self {
                self.default_vat_rate = rate;
                self
            }

            /// Builds the manager.
            ///
            /// # Errors
            ///
            /// Returns [`LaskuriError::Configuration`] if no storage was
            /// provided, and [`LaskuriError::Validation`] if the default VAT
            /// rate is negative or not finite.
            #[inline]
            pub fn build(self) -> Result<$manager<S>> {
                let storage = self.storage.ok_or_else(|| {
                    LaskuriError::Configuration("storage backend is required".to_owned())
                })?;
                if !self.default_vat_rate.is_finite() || self.default_vat_rate < 0.0 {
                    return Err(LaskuriError::Validation(format!(
                        "default VAT rate must be a non-negative number, got {}",
                        self.default_vat_rate
                    )));
                }
                let clock: Box<dyn Clock> = match self.clock {
                    Some(clock) => clock,
                    None => Box::new(SystemClock),
                };
                let ids: Box<dyn IdGenerator> = match self.ids {
                    Some(ids) => ids,
                    None => Box::new(UuidGenerator),
                };
                Ok($manager {
                    storage,
                    clock,
                    ids,
                    default_vat_rate: self.default_vat_rate,
                })
            }
        }

        #[doc = $manager_doc]
        #[derive(Debug)]
        pub struct $manager<S: $storage_trait> {
            /// Storage backend.
            storage: S,
            /// Time source.
            clock: Box<dyn Clock>,
            /// Id source.
            ids: Box<dyn IdGenerator>,
            /// VAT rate used when a call does not name one.
            default_vat_rate: f64,
        }

        impl<S: $storage_trait> $manager<S> {
            /// Creates a new builder for configuring the manager.
            #[inline]
            #[must_use]
            pub const fn builder() -> $builder<S> {
                $builder {
                    storage: None,
                    clock: None,
                    ids: None,
                    default_vat_rate: DEFAULT_VAT_RATE,
                }
            }

            /// The storage backend.
            #[inline]
            #[must_use]
            pub const fn storage(&self) -> &S {
                &self.storage
            }

            /// VAT rate applied when a call does not name one.
            #[inline]
            #[must_use]
            pub const fn default_vat_rate(&self) -> f64 {
                self.default_vat_rate
            }

            /// Current instant according to the injected clock.
            #[inline]
            #[must_use]
            pub fn now(&self) -> DateTime<Utc> {
                self.clock.now()
            }

            // ── Pure wrappers ───────────────────────────────────────────

            /// Prices `customer` now, at `vat_rate` or the default rate.
            #[inline]
            #[must_use]
            pub fn calculate(
                &self,
                customer: &Customer,
                vat_rate: Option<f64>,
            ) -> InvoiceCalculationResult {
                pricing::calculate_invoice(
                    customer,
                    vat_rate.unwrap_or(self.default_vat_rate),
                    self.clock.now(),
                )
            }

            /// Starts a creation request carrying this manager's default VAT
            /// rate.
            #[inline]
            #[must_use]
            pub fn new_calculation<T: Into<String>>(&self, name: T) -> NewCalculation {
                NewCalculation::new(name).vat_rate(self.default_vat_rate)
            }

            /// Creates version 1 of a calculation with a fresh id.
            ///
            /// Nothing is stored; pass the result to `add_calculation`.
            #[inline]
            #[must_use]
            pub fn create_saved_calculation(
                &self,
                customer: &Customer,
                request: NewCalculation,
            ) -> SavedCalculation {
                calculations::create_saved_calculation(
                    customer,
                    request,
                    self.next_calculation_id(),
                    self.clock.now(),
                )
            }

            /// Copies `calc` under a fresh id without repricing it.
            #[inline]
            #[must_use]
            pub fn duplicate_calculation(
                &self,
                calc: &SavedCalculation,
                new_name: Option<&str>,
            ) -> SavedCalculation {
                calculations::duplicate_calculation(
                    calc,
                    new_name,
                    self.next_calculation_id(),
                    self.clock.now(),
                )
            }

            /// Reprices the stored snapshot of `calc`.
            #[inline]
            #[must_use]
            pub fn recalculate_invoice(
                &self,
                calc: &SavedCalculation,
                vat_rate: Option<f64>,
            ) -> SavedCalculation {
                calculations::recalculate_invoice(calc, vat_rate, self.clock.now())
            }

            /// Replaces the snapshot of `calc` with `customer` and reprices.
            #[inline]
            #[must_use]
            pub fn update_calculation_customer(
                &self,
                calc: &SavedCalculation,
                customer: &Customer,
            ) -> SavedCalculation {
                calculations::update_calculation_customer(calc, customer, self.clock.now())
            }

            /// Relabels `calc`.
            #[inline]
            #[must_use]
            pub fn set_calculation_type(
                &self,
                calc: &SavedCalculation,
                kind: CalculationType,
            ) -> SavedCalculation {
                calculations::set_calculation_type(calc, kind, self.clock.now())
            }

            // ── Storage location ────────────────────────────────────────

            /// Creates the data files if missing.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails.
            #[inline]
            pub $($async_kw)? fn init_storage(&self) -> Result<()> {
                self.storage.init_storage() $( .$await_ext )?
            }

            /// The user-selected data directory, if any.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails.
            #[inline]
            pub $($async_kw)? fn storage_location(&self) -> Result<Option<PathBuf>> {
                self.storage.storage_location() $( .$await_ext )?
            }

            /// Moves the data files to `path`.
            ///
            /// # Errors
            ///
            /// Returns [`LaskuriError::InvalidStoragePath`] if `path` is not
            /// an existing directory.
            #[inline]
            pub $($async_kw)? fn set_storage_location(&self, path: &Path) -> Result<()> {
                self.storage.set_storage_location(path) $( .$await_ext )?
            }

            // ── Customers ───────────────────────────────────────────────

            /// Returns all customers.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn customers(&self) -> Result<Vec<Customer>> {
                self.storage.load_customers() $( .$await_ext )?
            }

            /// Returns the customer with the given id.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
                let customers = self.storage.load_customers() $( .$await_ext )? ?;
                Ok(customers.into_iter().find(|customer| customer.id == *id))
            }

            /// Finds a customer by exact id, or else by case-insensitive name.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn find_customer(&self, key: &str) -> Result<Option<Customer>> {
                let customers = self.storage.load_customers() $( .$await_ext )? ?;
                let needle = key.trim();
                if let Some(found) = customers.iter().find(|customer| customer.id.as_inner() == needle) {
                    return Ok(Some(found.clone()));
                }
                let lowered = needle.to_lowercase();
                Ok(customers
                    .into_iter()
                    .find(|customer| customer.name.to_lowercase() == lowered))
            }

            /// Appends `customer` and saves the collection.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails.
            #[tracing::instrument(skip_all, fields(customer_id = %customer.id))]
            pub $($async_kw)? fn add_customer(&self, customer: Customer) -> Result<Vec<Customer>> {
                let mut customers = self.storage.load_customers() $( .$await_ext )? ?;
                if customers.iter().any(|existing| existing.id == customer.id) {
                    tracing::warn!("a customer with this id already exists");
                }
                customers.push(customer);
                self.storage.save_customers(&customers) $( .$await_ext )? ?;
                tracing::debug!(count = customers.len(), "customer added");
                Ok(customers)
            }

            /// Replaces the stored customer with the same id.
            ///
            /// # Errors
            ///
            /// Returns [`LaskuriError::CustomerNotFound`] if no stored
            /// customer has that id, or a storage error.
            #[tracing::instrument(skip_all, fields(customer_id = %customer.id))]
            pub $($async_kw)? fn update_customer(&self, customer: Customer) -> Result<Vec<Customer>> {
                let mut customers = self.storage.load_customers() $( .$await_ext )? ?;
                let Some(slot) = customers.iter_mut().find(|existing| existing.id == customer.id) else {
                    return Err(LaskuriError::CustomerNotFound(customer.id));
                };
                *slot = customer;
                self.storage.save_customers(&customers) $( .$await_ext )? ?;
                tracing::debug!("customer updated");
                Ok(customers)
            }

            /// Removes the customer with the given id.
            ///
            /// Saved calculations of the customer are kept. A missing id is
            /// logged and the collection returned unchanged.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails.
            #[tracing::instrument(skip_all, fields(customer_id = %id))]
            pub $($async_kw)? fn delete_customer(&self, id: &CustomerId) -> Result<Vec<Customer>> {
                let mut customers = self.storage.load_customers() $( .$await_ext )? ?;
                let before = customers.len();
                customers.retain(|customer| customer.id != *id);
                if customers.len() == before {
                    tracing::warn!("no customer found to delete");
                    return Ok(customers);
                }
                self.storage.save_customers(&customers) $( .$await_ext )? ?;
                tracing::debug!("customer deleted");
                Ok(customers)
            }

            // ── Calculations ────────────────────────────────────────────

            /// Returns all saved calculations.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn calculations(&self) -> Result<Vec<SavedCalculation>> {
                self.storage.load_calculations() $( .$await_ext )?
            }

            /// Returns the saved calculation with the given id.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn calculation(
                &self,
                id: &CalculationId,
            ) -> Result<Option<SavedCalculation>> {
                let all = self.storage.load_calculations() $( .$await_ext )? ?;
                Ok(all.into_iter().find(|calc| calc.id == *id))
            }

            /// Returns the saved calculations referencing `customer_id`.
            ///
            /// Scans the calculations; the back-reference index is not
            /// consulted.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn calculations_for_customer(
                &self,
                customer_id: &CustomerId,
            ) -> Result<Vec<SavedCalculation>> {
                let all = self.storage.load_calculations() $( .$await_ext )? ?;
                Ok(all
                    .into_iter()
                    .filter(|calc| calc.customer_id == *customer_id)
                    .collect())
            }

            /// Appends `calc`, saves, then links it from its customer.
            ///
            /// A calculation whose id is already stored replaces that record
            /// instead of being appended; ids stay unique in the collection.
            ///
            /// # Errors
            ///
            /// Returns an error if saving the calculations fails. Index
            /// maintenance failures are only logged.
            #[tracing::instrument(skip_all, fields(calculation_id = %calc.id))]
            pub $($async_kw)? fn add_calculation(
                &self,
                calc: SavedCalculation,
            ) -> Result<Vec<SavedCalculation>> {
                let mut all = self.storage.load_calculations() $( .$await_ext )? ?;
                let calc_id = calc.id.clone();
                let owner = calc.customer_id.clone();
                if let Some(slot) = all.iter_mut().find(|existing| existing.id == calc_id) {
                    tracing::warn!("calculation id already stored, replacing the record");
                    *slot = calc;
                } else {
                    all.push(calc);
                }
                self.storage.save_calculations(&all) $( .$await_ext )? ?;
                tracing::debug!(count = all.len(), "calculation added");
                self.maintain_calculation_index(&calc_id, Some(&owner)) $( .$await_ext )?;
                Ok(all)
            }

            /// Replaces the stored calculation with the same id, then points
            /// the index at its (possibly new) customer.
            ///
            /// # Errors
            ///
            /// Returns [`LaskuriError::CalculationNotFound`] if no stored
            /// calculation has that id, or a storage error.
            #[tracing::instrument(skip_all, fields(calculation_id = %calc.id))]
            pub $($async_kw)? fn update_calculation(
                &self,
                calc: SavedCalculation,
            ) -> Result<Vec<SavedCalculation>> {
                let mut all = self.storage.load_calculations() $( .$await_ext )? ?;
                let Some(slot) = all.iter_mut().find(|existing| existing.id == calc.id) else {
                    return Err(LaskuriError::CalculationNotFound(calc.id));
                };
                let calc_id = calc.id.clone();
                let owner = calc.customer_id.clone();
                *slot = calc;
                self.storage.save_calculations(&all) $( .$await_ext )? ?;
                tracing::debug!("calculation updated");
                self.maintain_calculation_index(&calc_id, Some(&owner)) $( .$await_ext )?;
                Ok(all)
            }

            /// Removes the calculation with the given id and unlinks it from
            /// every customer.
            ///
            /// A missing id is logged and the collection returned unchanged.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails. Index
            /// maintenance failures are only logged.
            #[tracing::instrument(skip_all, fields(calculation_id = %id))]
            pub $($async_kw)? fn delete_calculation(
                &self,
                id: &CalculationId,
            ) -> Result<Vec<SavedCalculation>> {
                let mut all = self.storage.load_calculations() $( .$await_ext )? ?;
                let before = all.len();
                all.retain(|calc| calc.id != *id);
                if all.len() == before {
                    tracing::warn!("no calculation found to delete");
                    return Ok(all);
                }
                self.storage.save_calculations(&all) $( .$await_ext )? ?;
                tracing::debug!("calculation deleted");
                self.maintain_calculation_index(id, None) $( .$await_ext )?;
                Ok(all)
            }

            /// Recomputes every customer's `calculationIds` from the
            /// calculations' `customerId` and saves the customers.
            ///
            /// Returns the repaired customers.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn rebuild_calculation_index(&self) -> Result<Vec<Customer>> {
                let all = self.storage.load_calculations() $( .$await_ext )? ?;
                let mut customers = self.storage.load_customers() $( .$await_ext )? ?;
                let (repaired, orphaned) = rebuild_index(&mut customers, &all);
                if orphaned > 0 {
                    tracing::warn!(orphaned, "calculations reference unknown customers");
                }
                self.storage.save_customers(&customers) $( .$await_ext )? ?;
                tracing::info!(repaired, "calculation index rebuilt");
                Ok(customers)
            }

            // ── Private helpers ─────────────────────────────────────────

            /// Draws a fresh calculation id.
            fn next_calculation_id(&self) -> CalculationId {
                CalculationId::new(self.ids.next_id())
            }

            /// Links `calc_id` from `owner` and unlinks it everywhere else.
            $($async_kw)? fn sync_calculation_index(
                &self,
                calc_id: &CalculationId,
                owner: Option<&CustomerId>,
            ) -> Result<()> {
                let mut customers = self.storage.load_customers() $( .$await_ext )? ?;
                if relink(&mut customers, calc_id, owner) {
                    self.storage.save_customers(&customers) $( .$await_ext )? ?;
                }
                Ok(())
            }

            /// Runs [`Self::sync_calculation_index`], logging failures.
            $($async_kw)? fn maintain_calculation_index(
                &self,
                calc_id: &CalculationId,
                owner: Option<&CustomerId>,
            ) {
                if let Err(err) = self.sync_calculation_index(calc_id, owner) $( .$await_ext )? {
                    tracing::warn!(
                        error = %err,
                        calculation_id = %calc_id,
                        "failed to update customer calculation index"
                    );
                }
            }
        }
    };
}

use std::collections::HashMap;

use crate::models::{CalculationId, Customer, CustomerId, SavedCalculation};

/// Points `calc_id` at `owner` in the index of every customer.
///
/// Returns `true` if any customer changed.
fn relink(customers: &mut [Customer], calc_id: &CalculationId, owner: Option<&CustomerId>) -> bool {
    let mut changed = false;
    for customer in customers {
        let updated = if owner == Some(&customer.id) {
            customer.link_calculation(calc_id)
        } else {
            customer.unlink_calculation(calc_id)
        };
        changed |= updated;
    }
    changed
}

/// Rebuilds every customer's index from `calculations`, in calculation
/// order.
///
/// Returns the number of customers whose index changed and the number of
/// calculations whose customer is unknown.
fn rebuild_index(customers: &mut [Customer], calculations: &[SavedCalculation]) -> (usize, usize) {
    let mut by_customer: HashMap<&CustomerId, Vec<CalculationId>> = HashMap::new();
    for calc in calculations {
        by_customer
            .entry(&calc.customer_id)
            .or_default()
            .push(calc.id.clone());
    }
    let mut repaired = 0_usize;
    for customer in customers {
        let ids = by_customer.remove(&customer.id).unwrap_or_default();
        let rebuilt = if ids.is_empty() && customer.calculation_ids.is_none() {
            None
        } else {
            Some(ids)
        };
        if customer.calculation_ids != rebuilt {
            customer.calculation_ids = rebuilt;
            repaired = repaired.saturating_add(1);
        }
    }
    let orphaned = by_customer.values().map(Vec::len).sum();
    (repaired, orphaned)
}

// ── Async variant ───────────────────────────────────────────────────────

#[cfg(feature = "async")]
mod async_laskuri {
    //! Async manager.

    use std::path::{Path, PathBuf};

    use chrono::{DateTime, Utc};

    use crate::calculations;
    use crate::error::{LaskuriError, Result};
    use crate::models::{
        CalculationId, CalculationType, Customer, CustomerId, DEFAULT_VAT_RATE,
        InvoiceCalculationResult, NewCalculation, SavedCalculation,
    };
    use crate::pricing;
    use crate::services::{Clock, IdGenerator, SystemClock, UuidGenerator};
    use crate::storage::Storage;

    use super::{rebuild_index, relink};

    define_laskuri! {
        manager_name: Laskuri,
        builder_name: LaskuriBuilder,
        storage_trait: Storage,
        manager_doc: "Async calculation manager backed by a [`Storage`].\n\nUse [`Laskuri::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`Laskuri`] manager.",
        async_kw: async,
        await_kw: await,
    }
}

// ── Blocking variant ────────────────────────────────────────────────────

#[cfg(feature = "blocking")]
mod blocking_laskuri {
    //! Blocking manager.

    use std::path::{Path, PathBuf};

    use chrono::{DateTime, Utc};

    use crate::calculations;
    use crate::error::{LaskuriError, Result};
    use crate::models::{
        CalculationId, CalculationType, Customer, CustomerId, DEFAULT_VAT_RATE,
        InvoiceCalculationResult, NewCalculation, SavedCalculation,
    };
    use crate::pricing;
    use crate::services::{Clock, IdGenerator, SystemClock, UuidGenerator};
    use crate::storage::BlockingStorage;

    use super::{rebuild_index, relink};

    define_laskuri! {
        manager_name: LaskuriBlocking,
        builder_name: LaskuriBlockingBuilder,
        storage_trait: BlockingStorage,
        manager_doc: "Blocking calculation manager backed by a [`BlockingStorage`].\n\nUse [`LaskuriBlocking::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`LaskuriBlocking`] manager.",
    }
}

#[cfg(feature = "async")]
pub use async_laskuri::{Laskuri, LaskuriBuilder};
#[cfg(feature = "blocking")]
pub use blocking_laskuri::{LaskuriBlocking, LaskuriBlockingBuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LaskuriError, Result};
    use crate::models::{CalculationType, CompanyType, NewCalculation};
    use crate::pricing::parse_instant;
    use crate::services::{FixedClock, SequentialIds};
    use crate::storage::InMemoryStorage;
    use chrono::{DateTime, Utc};

    /// Store that reads from memory but refuses to save customers.
    #[derive(Debug, Default)]
    struct CustomerWriteFailing {
        /// Backing data.
        inner: InMemoryStorage,
    }

    #[cfg(feature = "blocking")]
    impl crate::storage::BlockingStorage for CustomerWriteFailing {
        fn init_storage(&self) -> Result<()> {
            crate::storage::BlockingStorage::init_storage(&self.inner)
        }
        fn storage_location(&self) -> Result<Option<std::path::PathBuf>> {
            crate::storage::BlockingStorage::storage_location(&self.inner)
        }
        fn set_storage_location(&self, path: &std::path::Path) -> Result<()> {
            crate::storage::BlockingStorage::set_storage_location(&self.inner, path)
        }
        fn load_customers(&self) -> Result<Vec<Customer>> {
            crate::storage::BlockingStorage::load_customers(&self.inner)
        }
        fn save_customers(&self, _customers: &[Customer]) -> Result<()> {
            Err(LaskuriError::storage("save customers", "disk full"))
        }
        fn load_calculations(&self) -> Result<Vec<SavedCalculation>> {
            crate::storage::BlockingStorage::load_calculations(&self.inner)
        }
        fn save_calculations(&self, calculations: &[SavedCalculation]) -> Result<()> {
            crate::storage::BlockingStorage::save_calculations(&self.inner, calculations)
        }
    }

    #[cfg(feature = "async")]
    impl crate::storage::Storage for CustomerWriteFailing {
        fn init_storage(&self) -> impl Future<Output = Result<()>> + Send {
            crate::storage::Storage::init_storage(&self.inner)
        }
        fn storage_location(
            &self,
        ) -> impl Future<Output = Result<Option<std::path::PathBuf>>> + Send {
            crate::storage::Storage::storage_location(&self.inner)
        }
        fn set_storage_location(
            &self,
            path: &std::path::Path,
        ) -> impl Future<Output = Result<()>> + Send {
            crate::storage::Storage::set_storage_location(&self.inner, path)
        }
        fn load_customers(&self) -> impl Future<Output = Result<Vec<Customer>>> + Send {
            crate::storage::Storage::load_customers(&self.inner)
        }
        fn save_customers(
            &self,
            _customers: &[Customer],
        ) -> impl Future<Output = Result<()>> + Send {
            core::future::ready(Err(LaskuriError::storage("save customers", "disk full")))
        }
        fn load_calculations(&self) -> impl Future<Output = Result<Vec<SavedCalculation>>> + Send {
            crate::storage::Storage::load_calculations(&self.inner)
        }
        fn save_calculations(
            &self,
            calculations: &[SavedCalculation],
        ) -> impl Future<Output = Result<()>> + Send {
            crate::storage::Storage::save_calculations(&self.inner, calculations)
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        parse_instant(raw).unwrap()
    }

    /// Reference customer: 300 h over three months at 50 plus 100 software.
    fn reference_customer(id: &str, name: &str) -> Customer {
        Customer {
            hours_last3_months: 300.0,
            hourly_rate: 50.0,
            accounting_software_price: 100.0,
            ..Customer::new(CustomerId::from(id), name, CompanyType::SoleTrader)
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn relink_moves_id_between_customers() {
        let calc_id = CalculationId::from("calc-1");
        let mut customers = vec![
            reference_customer("c-1", "Alpha"),
            reference_customer("c-2", "Beta"),
        ];
        assert!(customers[0].link_calculation(&calc_id));

        let owner = CustomerId::from("c-2");
        assert!(relink(&mut customers, &calc_id, Some(&owner)));
        assert_eq!(customers[0].calculation_ids, Some(Vec::new()));
        assert_eq!(customers[1].calculation_ids, Some(vec![calc_id.clone()]));

        // Already consistent: nothing to save.
        assert!(!relink(&mut customers, &calc_id, Some(&owner)));
    }

    #[test]
    fn rebuild_index_counts_repairs_and_orphans() {
        let mut customers = vec![
            reference_customer("c-1", "Alpha"),
            reference_customer("c-2", "Beta"),
        ];
        customers[1].calculation_ids = Some(vec![CalculationId::from("stale")]);

        let template = crate::calculations::create_saved_calculation(
            &customers[0],
            NewCalculation::new("Q1"),
            CalculationId::from("calc-1"),
            at("2025-01-01"),
        );
        let orphan = SavedCalculation {
            id: CalculationId::from("calc-2"),
            customer_id: CustomerId::from("gone"),
            ..template.clone()
        };
        let (repaired, orphaned) = rebuild_index(&mut customers, &[template, orphan]);
        assert_eq!(repaired, 2);
        assert_eq!(orphaned, 1);
        assert_eq!(
            customers[0].calculation_ids,
            Some(vec![CalculationId::from("calc-1")])
        );
        assert_eq!(customers[1].calculation_ids, Some(Vec::new()));
    }

    #[test]
    fn rebuild_index_leaves_unindexed_customers_alone() {
        let mut customers = vec![reference_customer("c-1", "Alpha")];
        let (repaired, orphaned) = rebuild_index(&mut customers, &[]);
        assert_eq!((repaired, orphaned), (0, 0));
        assert!(customers[0].calculation_ids.is_none());
    }

    #[cfg(feature = "blocking")]
    mod blocking {
        use super::*;

        type Manager = LaskuriBlocking<InMemoryStorage>;

        fn manager_with(storage: InMemoryStorage) -> Manager {
            LaskuriBlocking::builder()
                .storage(storage)
                .clock(FixedClock::new(at("2025-03-01T09:00:00Z")))
                .id_generator(SequentialIds::new("calc"))
                .build()
                .unwrap()
        }

        fn seeded() -> Manager {
            manager_with(InMemoryStorage::with_data(
                vec![
                    reference_customer("c-1", "Alpha Oy"),
                    reference_customer("c-2", "Beta Tmi"),
                ],
                Vec::new(),
            ))
        }

        /// Creates and stores a calculation for `customer_id`.
        fn save_for(manager: &Manager, customer_id: &str, name: &str) -> SavedCalculation {
            let customer = manager
                .customer(&CustomerId::from(customer_id))
                .unwrap()
                .unwrap();
            let calc = manager.create_saved_calculation(&customer, manager.new_calculation(name));
            let _all = manager.add_calculation(calc.clone()).unwrap();
            calc
        }

        fn index_of(manager: &Manager, customer_id: &str) -> Option<Vec<CalculationId>> {
            manager
                .customer(&CustomerId::from(customer_id))
                .unwrap()
                .unwrap()
                .calculation_ids
        }

        #[test]
        fn build_requires_storage() {
            let result = LaskuriBlocking::<InMemoryStorage>::builder().build();
            assert!(matches!(result, Err(LaskuriError::Configuration(_))));
        }

        #[test]
        fn build_rejects_bad_vat_rate() {
            for rate in [-0.1, f64::NAN, f64::INFINITY] {
                let result = LaskuriBlocking::builder()
                    .storage(InMemoryStorage::new())
                    .default_vat_rate(rate)
                    .build();
                assert!(matches!(result, Err(LaskuriError::Validation(_))));
            }
        }

        #[test]
        fn calculate_matches_reference_scenario() {
            let manager = seeded();
            let result = manager.calculate(&reference_customer("c-1", "Alpha Oy"), None);
            assert_close(result.average_hours, 100.0);
            assert_close(result.subtotals.total_subtotal, 5100.0);
            assert_close(result.margin_amount, 500.0);
            assert_close(result.price_without_vat, 5600.0);
            assert_close(result.price_with_vat, 6944.0);
        }

        #[test]
        fn calculate_honours_default_vat_rate() {
            let manager = LaskuriBlocking::builder()
                .storage(InMemoryStorage::new())
                .default_vat_rate(0.255)
                .build()
                .unwrap();
            assert!((manager.default_vat_rate() - 0.255).abs() < f64::EPSILON);
            let result = manager.calculate(&reference_customer("c-1", "Alpha"), None);
            assert_close(result.price_with_vat, 5600.0 * 1.255);
            let explicit = manager.calculate(&reference_customer("c-1", "Alpha"), Some(0.0));
            assert_close(explicit.price_with_vat, 5600.0);
        }

        #[test]
        fn created_calculation_uses_injected_services() {
            let manager = seeded();
            let customer = reference_customer("c-1", "Alpha Oy");
            let first = manager.create_saved_calculation(&customer, manager.new_calculation("Q1"));
            let second = manager.create_saved_calculation(&customer, manager.new_calculation("Q2"));
            assert_eq!(first.id, CalculationId::from("calc-1"));
            assert_eq!(second.id, CalculationId::from("calc-2"));
            assert_eq!(first.created_at, at("2025-03-01T09:00:00Z"));
            assert_eq!(manager.now(), first.created_at);
            assert_eq!(first.version, 1);
        }

        #[test]
        fn duplicate_draws_fresh_id() {
            let manager = seeded();
            let original = manager.create_saved_calculation(
                &reference_customer("c-1", "Alpha Oy"),
                manager.new_calculation("Q1"),
            );
            let copy = manager.duplicate_calculation(&original, None);
            assert_eq!(copy.id, CalculationId::from("calc-2"));
            assert_eq!(copy.name, "Q1 (Copy)");
            assert_eq!(copy.result, original.result);
        }

        #[test]
        fn lifecycle_wrappers_bump_version() {
            let manager = seeded();
            let customer = reference_customer("c-1", "Alpha Oy");
            let calc = manager.create_saved_calculation(&customer, manager.new_calculation("Q1"));
            let recalculated = manager.recalculate_invoice(&calc, Some(0.14));
            let refreshed = manager.update_calculation_customer(&recalculated, &customer);
            let offered = manager.set_calculation_type(&refreshed, CalculationType::Offer);
            assert_eq!(offered.version, 4);
            assert_eq!(offered.kind, CalculationType::Offer);
            assert!((offered.result.vat_rate - 0.14).abs() < f64::EPSILON);
        }

        #[test]
        fn find_customer_by_id_or_name() {
            let manager = seeded();
            let by_id = manager.find_customer("c-2").unwrap().unwrap();
            assert_eq!(by_id.name, "Beta Tmi");
            let by_name = manager.find_customer("  alpha oy ").unwrap().unwrap();
            assert_eq!(by_name.id, CustomerId::from("c-1"));
            assert!(manager.find_customer("nobody").unwrap().is_none());
        }

        #[test]
        fn add_customer_appends() {
            let manager = seeded();
            let customers = manager
                .add_customer(reference_customer("c-3", "Gamma"))
                .unwrap();
            assert_eq!(customers.len(), 3);
            assert_eq!(manager.customers().unwrap(), customers);
        }

        #[test]
        fn update_customer_replaces_wholesale() {
            let manager = seeded();
            let changed = Customer {
                hourly_rate: 75.0,
                ..reference_customer("c-1", "Alpha Oy")
            };
            let customers = manager.update_customer(changed).unwrap();
            assert_eq!(customers.len(), 2);
            let stored = manager.customer(&CustomerId::from("c-1")).unwrap().unwrap();
            assert!((stored.hourly_rate - 75.0).abs() < f64::EPSILON);
        }

        #[test]
        fn update_missing_customer_fails() {
            let manager = seeded();
            let err = manager
                .update_customer(reference_customer("c-404", "Ghost"))
                .unwrap_err();
            assert!(matches!(err, LaskuriError::CustomerNotFound(id) if id.as_inner() == "c-404"));
            assert_eq!(manager.customers().unwrap().len(), 2);
        }

        #[test]
        fn delete_missing_customer_is_noop() {
            let manager = seeded();
            let customers = manager.delete_customer(&CustomerId::from("c-404")).unwrap();
            assert_eq!(customers.len(), 2);
        }

        #[test]
        fn delete_customer_keeps_calculations() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let customers = manager.delete_customer(&CustomerId::from("c-1")).unwrap();
            assert_eq!(customers.len(), 1);
            let remaining = manager.calculation(&calc.id).unwrap();
            assert_eq!(remaining, Some(calc));
        }

        #[test]
        fn add_calculation_links_customer() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            assert_eq!(index_of(&manager, "c-1"), Some(vec![calc.id.clone()]));
            assert!(index_of(&manager, "c-2").is_none());
            assert_eq!(manager.calculations().unwrap().len(), 1);
        }

        #[test]
        fn index_has_set_semantics() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let _all = manager.add_calculation(calc.clone()).unwrap();
            assert_eq!(index_of(&manager, "c-1"), Some(vec![calc.id]));
        }

        #[test]
        fn repeated_add_keeps_one_record() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let all = manager.add_calculation(calc.clone()).unwrap();
            assert_eq!(all.len(), 1);

            let repriced = manager.recalculate_invoice(&calc, None);
            let all = manager.update_calculation(repriced).unwrap();
            let versions: Vec<u32> = all
                .iter()
                .filter(|stored| stored.id == calc.id)
                .map(|stored| stored.version)
                .collect();
            assert_eq!(versions, vec![2]);
            assert_eq!(manager.calculations().unwrap(), all);
        }

        #[test]
        fn repeated_add_moves_record_to_new_owner() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let beta = manager.customer(&CustomerId::from("c-2")).unwrap().unwrap();
            let moved = manager.update_calculation_customer(&calc, &beta);
            let all = manager.add_calculation(moved).unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0].customer_id, beta.id);
            assert_eq!(index_of(&manager, "c-1"), Some(Vec::new()));
            assert_eq!(index_of(&manager, "c-2"), Some(vec![calc.id]));
        }

        #[test]
        fn update_calculation_relinks_new_owner() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let beta = manager.customer(&CustomerId::from("c-2")).unwrap().unwrap();
            let moved = manager.update_calculation_customer(&calc, &beta);
            assert_eq!(moved.customer_id, beta.id);
            let all = manager.update_calculation(moved).unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0].version, 2);
            assert_eq!(index_of(&manager, "c-1"), Some(Vec::new()));
            assert_eq!(index_of(&manager, "c-2"), Some(vec![calc.id]));
        }

        #[test]
        fn update_missing_calculation_fails() {
            let manager = seeded();
            let calc = manager.create_saved_calculation(
                &reference_customer("c-1", "Alpha Oy"),
                manager.new_calculation("never stored"),
            );
            let err = manager.update_calculation(calc).unwrap_err();
            assert!(matches!(err, LaskuriError::CalculationNotFound(_)));
        }

        #[test]
        fn delete_calculation_unlinks_customer() {
            let manager = seeded();
            let first = save_for(&manager, "c-1", "Q1");
            let second = save_for(&manager, "c-1", "Q2");
            let remaining = manager.delete_calculation(&first.id).unwrap();
            assert_eq!(remaining.len(), 1);
            assert_eq!(index_of(&manager, "c-1"), Some(vec![second.id]));
        }

        #[test]
        fn delete_missing_calculation_is_noop() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let all = manager
                .delete_calculation(&CalculationId::from("calc-404"))
                .unwrap();
            assert_eq!(all, vec![calc.clone()]);
            assert_eq!(index_of(&manager, "c-1"), Some(vec![calc.id]));
        }

        #[test]
        fn calculations_for_customer_scans_by_customer_id() {
            let manager = seeded();
            let alpha = save_for(&manager, "c-1", "Q1");
            let _beta = save_for(&manager, "c-2", "Q1");
            let found = manager
                .calculations_for_customer(&CustomerId::from("c-1"))
                .unwrap();
            assert_eq!(found, vec![alpha]);
        }

        #[test]
        fn index_failure_keeps_calculation_write() {
            let storage = CustomerWriteFailing {
                inner: InMemoryStorage::with_data(
                    vec![reference_customer("c-1", "Alpha Oy")],
                    Vec::new(),
                ),
            };
            let manager = LaskuriBlocking::builder()
                .storage(storage)
                .clock(FixedClock::new(at("2025-03-01")))
                .id_generator(SequentialIds::new("calc"))
                .build()
                .unwrap();
            let customer = reference_customer("c-1", "Alpha Oy");
            let calc = manager.create_saved_calculation(&customer, manager.new_calculation("Q1"));

            let all = manager.add_calculation(calc).unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(manager.calculations().unwrap().len(), 1);
            let stored = manager.customer(&CustomerId::from("c-1")).unwrap().unwrap();
            assert!(stored.calculation_ids.is_none());
        }

        #[test]
        fn rebuild_repairs_drift() {
            let manager = seeded();
            let calc = save_for(&manager, "c-1", "Q1");
            let mut drifted = manager.customer(&CustomerId::from("c-1")).unwrap().unwrap();
            drifted.calculation_ids = Some(vec![CalculationId::from("stale")]);
            let _customers = manager.update_customer(drifted).unwrap();

            let customers = manager.rebuild_calculation_index().unwrap();
            assert_eq!(customers[0].calculation_ids, Some(vec![calc.id.clone()]));
            assert_eq!(index_of(&manager, "c-1"), Some(vec![calc.id]));
        }

        #[test]
        fn storage_location_round_trip() {
            let manager = seeded();
            manager.init_storage().unwrap();
            assert!(manager.storage_location().unwrap().is_none());
            let dir = tempfile::tempdir().unwrap();
            manager.set_storage_location(dir.path()).unwrap();
            assert_eq!(
                manager.storage_location().unwrap().as_deref(),
                Some(dir.path())
            );
            let missing = dir.path().join("missing");
            assert!(matches!(
                manager.set_storage_location(&missing),
                Err(LaskuriError::InvalidStoragePath(_))
            ));
        }

        #[test]
        fn storage_accessor_exposes_backend() {
            let manager = seeded();
            let customers =
                crate::storage::BlockingStorage::load_customers(manager.storage()).unwrap();
            assert_eq!(customers.len(), 2);
        }
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;

        fn manager() -> Laskuri<InMemoryStorage> {
            Laskuri::builder()
                .storage(InMemoryStorage::with_data(
                    vec![reference_customer("c-1", "Alpha Oy")],
                    Vec::new(),
                ))
                .clock(FixedClock::new(at("2025-03-01T09:00:00Z")))
                .id_generator(SequentialIds::new("calc"))
                .build()
                .unwrap()
        }

        #[tokio::test]
        async fn build_requires_storage() {
            let result = Laskuri::<InMemoryStorage>::builder().build();
            assert!(matches!(result, Err(LaskuriError::Configuration(_))));
        }

        #[tokio::test]
        async fn add_and_delete_calculation_maintain_index() {
            let manager = manager();
            let customer = manager
                .customer(&CustomerId::from("c-1"))
                .await
                .unwrap()
                .unwrap();
            let calc = manager.create_saved_calculation(&customer, manager.new_calculation("Q1"));
            let all = manager.add_calculation(calc.clone()).await.unwrap();
            assert_eq!(all.len(), 1);

            let linked = manager
                .customer(&CustomerId::from("c-1"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(linked.calculation_ids, Some(vec![calc.id.clone()]));

            let remaining = manager.delete_calculation(&calc.id).await.unwrap();
            assert!(remaining.is_empty());
            let unlinked = manager
                .customer(&CustomerId::from("c-1"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(unlinked.calculation_ids, Some(Vec::new()));
        }

        #[tokio::test]
        async fn update_missing_customer_fails() {
            let manager = manager();
            let result = manager
                .update_customer(reference_customer("c-9", "Nobody"))
                .await;
            assert!(matches!(result, Err(LaskuriError::CustomerNotFound(_))));
        }

        #[tokio::test]
        async fn delete_missing_calculation_is_noop() {
            let manager = manager();
            let all = manager
                .delete_calculation(&CalculationId::from("calc-404"))
                .await
                .unwrap();
            assert!(all.is_empty());
        }

        #[tokio::test]
        async fn index_failure_keeps_calculation_write() {
            let manager = Laskuri::builder()
                .storage(CustomerWriteFailing {
                    inner: InMemoryStorage::with_data(
                        vec![reference_customer("c-1", "Alpha Oy")],
                        Vec::new(),
                    ),
                })
                .id_generator(SequentialIds::new("calc"))
                .build()
                .unwrap();
            let customer = reference_customer("c-1", "Alpha Oy");
            let calc = manager.create_saved_calculation(&customer, manager.new_calculation("Q1"));
            let all = manager.add_calculation(calc).await.unwrap();
            assert_eq!(all.len(), 1);
            assert!(manager.rebuild_calculation_index().await.is_err());
        }

        #[tokio::test]
        async fn rebuild_links_existing_calculations() {
            let manager = manager();
            let customer = reference_customer("c-1", "Alpha Oy");
            let calc = manager.create_saved_calculation(&customer, manager.new_calculation("Q1"));
            crate::storage::Storage::save_calculations(manager.storage(), &[calc.clone()])
                .await
                .unwrap();

            let customers = manager.rebuild_calculation_index().await.unwrap();
            assert_eq!(customers[0].calculation_ids, Some(vec![calc.id]));
        }
    }
}
