//! In-memory storage backend for testing.
//!
//! Provides [`InMemoryStorage`], a thread-safe in-memory implementation of
//! the storage traits. Ideal for unit tests and embedders that keep their
//! own persistence.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(feature = "async")]
use core::future::{self, Future};

use crate::error::{LaskuriError, Result};
use crate::models::{Customer, SavedCalculation};

/// Thread-safe in-memory storage for testing.
///
/// This type implements both [`super::Storage`] (async) and
/// [`super::BlockingStorage`] (blocking) traits, providing a zero-setup
/// storage backend for tests.
///
/// The storage location is only recorded; it still has to name an existing
/// directory, like for [`super::FileStorage`].
///
/// # Example
///
/// ```rust
/// use laskuri_rs::storage::InMemoryStorage;
///
/// let storage = InMemoryStorage::new();
/// // Use with Laskuri or LaskuriBlocking builders:
/// // LaskuriBlocking::builder().storage(storage).build()
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// All state behind a single mutex for thread-safe interior mutability.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Stored customers.
    customers: Vec<Customer>,
    /// Stored calculations.
    calculations: Vec<SavedCalculation>,
    /// User-selected location.
    location: Option<PathBuf>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with `customers` and `calculations`.
    #[inline]
    #[must_use]
    pub fn with_data(customers: Vec<Customer>, calculations: Vec<SavedCalculation>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                customers,
                calculations,
                location: None,
            }),
        }
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Result<R> {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(f(&mut inner))
    }

    /// Records `path` as the location if it is an existing directory.
    fn set_location(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(LaskuriError::InvalidStoragePath(path.to_path_buf()));
        }
        self.with_lock(|inner| inner.location = Some(path.to_path_buf()))
    }
}

/// Wraps a mutex poison error.
fn lock_error<T>(err: &std::sync::PoisonError<T>) -> LaskuriError {
    LaskuriError::storage("acquire storage lock", err.to_string())
}

// ── BlockingStorage implementation ──────────────────────────────────────

#[cfg(feature = "blocking")]
impl super::BlockingStorage for InMemoryStorage {
    #[inline]
    fn init_storage(&self) -> Result<()> {
        self.with_lock(|_| ())
    }

    #[inline]
    fn storage_location(&self) -> Result<Option<PathBuf>> {
        self.with_lock(|inner| inner.location.clone())
    }

    #[inline]
    fn set_storage_location(&self, path: &Path) -> Result<()> {
        self.set_location(path)
    }

    #[inline]
    fn load_customers(&self) -> Result<Vec<Customer>> {
        self.with_lock(|inner| inner.customers.clone())
    }

    #[inline]
    fn save_customers(&self, customers: &[Customer]) -> Result<()> {
        self.with_lock(|inner| inner.customers = customers.to_vec())
    }

    #[inline]
    fn load_calculations(&self) -> Result<Vec<SavedCalculation>> {
        self.with_lock(|inner| inner.calculations.clone())
    }

    #[inline]
    fn save_calculations(&self, calculations: &[SavedCalculation]) -> Result<()> {
        self.with_lock(|inner| inner.calculations = calculations.to_vec())
    }
}

// ── Storage (async) implementation ──────────────────────────────────────

#[cfg(feature = "async")]
impl super::Storage for InMemoryStorage {
    #[inline]
    fn init_storage(&self) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.with_lock(|_| ()))
    }

    #[inline]
    fn storage_location(&self) -> impl Future<Output = Result<Option<PathBuf>>> + Send {
        future::ready(self.with_lock(|inner| inner.location.clone()))
    }

    #[inline]
    fn set_storage_location(&self, path: &Path) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.set_location(path))
    }

    #[inline]
    fn load_customers(&self) -> impl Future<Output = Result<Vec<Customer>>> + Send {
        future::ready(self.with_lock(|inner| inner.customers.clone()))
    }

    #[inline]
    fn save_customers(&self, customers: &[Customer]) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.with_lock(|inner| inner.customers = customers.to_vec()))
    }

    #[inline]
    fn load_calculations(&self) -> impl Future<Output = Result<Vec<SavedCalculation>>> + Send {
        future::ready(self.with_lock(|inner| inner.calculations.clone()))
    }

    #[inline]
    fn save_calculations(
        &self,
        calculations: &[SavedCalculation],
    ) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.with_lock(|inner| inner.calculations = calculations.to_vec()))
    }
}
