//! JSON-file-based storage backend.
//!
//! Keeps customers and calculations in two JSON documents inside a data
//! directory. The data directory defaults to the preferences directory
//! (default: `$XDG_DATA_HOME/laskuri_data/`) and can be moved with
//! [`set_storage_location`](super::BlockingStorage::set_storage_location).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LaskuriError, Result};
use crate::models::{
    CalculationsDocument, Customer, CustomersDocument, SavedCalculation, StoragePreferences,
};

/// Subfolder of the platform data directory holding preferences and, by
/// default, the data files.
const APP_DATA_SUBFOLDER: &str = "laskuri_data";

/// File name for customers.
const CUSTOMERS_FILE: &str = "customers.json";
/// File name for saved calculations.
const CALCULATIONS_FILE: &str = "calculations.json";
/// File name for storage preferences.
const PREFS_FILE: &str = "storage_prefs.json";

/// File-backed storage that persists documents as pretty-printed JSON.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Other processes writing the same files are not coordinated
/// with; the last write wins.
///
/// # File layout
///
/// ```text
/// <prefs dir>/
///   storage_prefs.json    ({"customStoragePath": "..."} or {})
/// <data dir>/             (custom path, or the prefs dir)
///   customers.json        ({"customers": [...]})
///   calculations.json     ({"calculations": [...]})
/// ```
#[derive(Debug)]
pub struct FileStorage {
    /// Directory holding `storage_prefs.json`.
    prefs_dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates a new file storage whose preferences live in `prefs_dir`.
    ///
    /// Creates the directory (and parents) if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    #[inline]
    pub fn new(prefs_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&prefs_dir)
            .map_err(|err| LaskuriError::storage("create storage directory", err))?;
        Ok(Self {
            prefs_dir,
            lock: Mutex::new(()),
        })
    }

    /// Returns the default preferences directory for this application.
    ///
    /// On Linux: `$XDG_DATA_HOME/laskuri_data/` (typically
    /// `~/.local/share/laskuri_data/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_DATA_SUBFOLDER))
            .ok_or_else(|| {
                LaskuriError::storage(
                    "locate data directory",
                    "could not determine platform data directory",
                )
            })
    }

    /// Directory holding the preferences file.
    #[inline]
    #[must_use]
    pub fn prefs_dir(&self) -> &Path {
        &self.prefs_dir
    }

    /// Directory the data files are currently read from and written to.
    ///
    /// # Errors
    ///
    /// Returns an error only if the in-process lock is poisoned.
    #[inline]
    pub fn data_dir(&self) -> Result<PathBuf> {
        self.with_lock(|| Ok(self.resolve_data_dir()))
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Acquires the in-process mutex guard and executes `op`.
    fn with_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self
            .lock
            .lock()
            .map_err(|err| LaskuriError::storage("acquire storage lock", err.to_string()))?;
        op()
    }

    /// Reads the preferences file. A missing file yields the defaults.
    fn read_prefs(&self) -> Result<StoragePreferences> {
        Ok(read_document(&self.prefs_dir.join(PREFS_FILE), "load storage preferences")?
            .unwrap_or_default())
    }

    /// Reads the preferences, falling back to the defaults on any failure.
    fn current_prefs(&self) -> StoragePreferences {
        self.read_prefs().unwrap_or_else(|err| {
            tracing::warn!(
                error = %err,
                prefs_dir = %self.prefs_dir.display(),
                "failed to read storage preferences, using default location"
            );
            StoragePreferences::default()
        })
    }

    /// Returns the custom data directory, or the preferences directory.
    fn resolve_data_dir(&self) -> PathBuf {
        self.current_prefs()
            .custom_storage_path
            .unwrap_or_else(|| self.prefs_dir.clone())
    }

    /// Creates `dir` and writes empty documents where none exist.
    fn initialize_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|err| LaskuriError::storage("initialize storage", err))?;
        let customers = dir.join(CUSTOMERS_FILE);
        if !customers.exists() {
            write_document(&customers, &CustomersDocument::default(), "initialize storage")?;
        }
        let calculations = dir.join(CALCULATIONS_FILE);
        if !calculations.exists() {
            write_document(
                &calculations,
                &CalculationsDocument::default(),
                "initialize storage",
            )?;
        }
        tracing::debug!(dir = %dir.display(), "storage initialized");
        Ok(())
    }

    /// Initializes the current data directory (with lock).
    fn initialize(&self) -> Result<()> {
        self.with_lock(|| Self::initialize_dir(&self.resolve_data_dir()))
    }

    /// Reads the custom location (with lock).
    fn read_location(&self) -> Result<Option<PathBuf>> {
        self.with_lock(|| Ok(self.current_prefs().custom_storage_path))
    }

    /// Validates and persists a new custom location (with lock).
    fn write_location(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(LaskuriError::InvalidStoragePath(path.to_path_buf()));
        }
        self.with_lock(|| {
            let mut prefs = self.current_prefs();
            prefs.custom_storage_path = Some(path.to_path_buf());
            write_document(
                &self.prefs_dir.join(PREFS_FILE),
                &prefs,
                "save storage preferences",
            )?;
            tracing::info!(path = %path.display(), "storage location updated");
            Ok(())
        })
    }

    /// Reads the customer document, initializing storage if it is missing.
    fn read_customers(&self) -> Result<Vec<Customer>> {
        self.with_lock(|| {
            let dir = self.resolve_data_dir();
            match read_document::<CustomersDocument>(&dir.join(CUSTOMERS_FILE), "load customers")? {
                Some(doc) => Ok(doc.customers),
                None => {
                    Self::initialize_dir(&dir)?;
                    Ok(Vec::new())
                }
            }
        })
    }

    /// Overwrites the customer document.
    fn write_customers(&self, customers: &[Customer]) -> Result<()> {
        self.with_lock(|| {
            let doc = CustomersDocument {
                customers: customers.to_vec(),
            };
            write_document(
                &self.resolve_data_dir().join(CUSTOMERS_FILE),
                &doc,
                "save customers",
            )
        })
    }

    /// Reads the calculation document, initializing storage if it is missing.
    fn read_calculations(&self) -> Result<Vec<SavedCalculation>> {
        self.with_lock(|| {
            let dir = self.resolve_data_dir();
            match read_document::<CalculationsDocument>(
                &dir.join(CALCULATIONS_FILE),
                "load calculations",
            )? {
                Some(doc) => Ok(doc.calculations),
                None => {
                    Self::initialize_dir(&dir)?;
                    Ok(Vec::new())
                }
            }
        })
    }

    /// Overwrites the calculation document.
    fn write_calculations(&self, calculations: &[SavedCalculation]) -> Result<()> {
        self.with_lock(|| {
            let doc = CalculationsDocument {
                calculations: calculations.to_vec(),
            };
            write_document(
                &self.resolve_data_dir().join(CALCULATIONS_FILE),
                &doc,
                "save calculations",
            )
        })
    }
}

// ── Free-standing helpers ───────────────────────────────────────────────

/// Reads and deserializes a JSON document. Returns `None` if the file does
/// not exist.
fn read_document<T: DeserializeOwned>(path: &Path, operation: &'static str) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| LaskuriError::storage(operation, err)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(LaskuriError::storage(operation, err)),
    }
}

/// Atomically writes a pretty-printed JSON document (write-to-tmp then
/// rename).
fn write_document<T: Serialize>(path: &Path, doc: &T, operation: &'static str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json =
        serde_json::to_string_pretty(doc).map_err(|err| LaskuriError::storage(operation, err))?;
    fs::write(&tmp_path, json).map_err(|err| LaskuriError::storage(operation, err))?;
    fs::rename(&tmp_path, path).map_err(|err| LaskuriError::storage(operation, err))?;
    Ok(())
}

// ── BlockingStorage implementation ──────────────────────────────────────

#[cfg(feature = "blocking")]
impl super::BlockingStorage for FileStorage {
    #[inline]
    fn init_storage(&self) -> Result<()> {
        self.initialize()
    }

    #[inline]
    fn storage_location(&self) -> Result<Option<PathBuf>> {
        self.read_location()
    }

    #[inline]
    fn set_storage_location(&self, path: &Path) -> Result<()> {
        self.write_location(path)
    }

    #[inline]
    fn load_customers(&self) -> Result<Vec<Customer>> {
        self.read_customers()
    }

    #[inline]
    fn save_customers(&self, customers: &[Customer]) -> Result<()> {
        self.write_customers(customers)
    }

    #[inline]
    fn load_calculations(&self) -> Result<Vec<SavedCalculation>> {
        self.read_calculations()
    }

    #[inline]
    fn save_calculations(&self, calculations: &[SavedCalculation]) -> Result<()> {
        self.write_calculations(calculations)
    }
}

// ── Storage (async) implementation ──────────────────────────────────────

#[cfg(feature = "async")]
impl super::Storage for FileStorage {
    #[inline]
    fn init_storage(&self) -> impl Future<Output = Result<()>> + Send {
        core::future::ready(self.initialize())
    }

    #[inline]
    fn storage_location(&self) -> impl Future<Output = Result<Option<PathBuf>>> + Send {
        core::future::ready(self.read_location())
    }

    #[inline]
    fn set_storage_location(&self, path: &Path) -> impl Future<Output = Result<()>> + Send {
        core::future::ready(self.write_location(path))
    }

    #[inline]
    fn load_customers(&self) -> impl Future<Output = Result<Vec<Customer>>> + Send {
        core::future::ready(self.read_customers())
    }

    #[inline]
    fn save_customers(&self, customers: &[Customer]) -> impl Future<Output = Result<()>> + Send {
        core::future::ready(self.write_customers(customers))
    }

    #[inline]
    fn load_calculations(&self) -> impl Future<Output = Result<Vec<SavedCalculation>>> + Send {
        core::future::ready(self.read_calculations())
    }

    #[inline]
    fn save_calculations(
        &self,
        calculations: &[SavedCalculation],
    ) -> impl Future<Output = Result<()>> + Send {
        core::future::ready(self.write_calculations(calculations))
    }
}
