//! Pluggable document stores for customers and saved calculations.
//!
//! This module defines the [`Storage`] (async) and [`BlockingStorage`]
//! (blocking) traits via a shared macro, mirroring the facade generation
//! pattern in [`crate::laskuri`].
//!
//! Stores are whole-collection: callers load a list, change it and save it
//! back. There is no transaction or locking discipline across that
//! read-modify-write; concurrent writers lose updates (last writer wins).

#[cfg(feature = "storage-file")]
mod file;
mod memory;

#[cfg(feature = "storage-file")]
pub use file::FileStorage;
pub use memory::InMemoryStorage;

/// Generates a storage trait (async or blocking) with all store methods.
///
/// Uses `@methods` to define the method list once, and `@method` to render
/// each method in async (`impl Future + Send`) or blocking (`fn`) style.
macro_rules! define_storage {
    // ── Entry points ────────────────────────────────────────────────
    (
        trait_name: $trait_name:ident,
        trait_doc: $trait_doc:expr,
        mode: async_mode,
    ) => {
        #[doc = $trait_doc]
        pub trait $trait_name: core::fmt::Debug + Send + Sync {
            define_storage!(@methods async_mode);
        }
    };
    (
        trait_name: $trait_name:ident,
        trait_doc: $trait_doc:expr,
        mode: blocking,
    ) => {
        #[doc = $trait_doc]
        pub trait $trait_name: core::fmt::Debug + Send + Sync {
            define_storage!(@methods blocking);
        }
    };

    // ── Single method list (shared between both variants) ───────────
    (@methods $mode:ident) => {
        // Location
        define_storage!(@method $mode, init_storage,
            "Creates the data directory and empty collection documents if they\nare missing. Idempotent: existing data is never overwritten.\n\n# Errors\n\nReturns an error if the directory or files cannot be created.",
            -> Result<()>);
        define_storage!(@method $mode, storage_location,
            "Returns the user-selected data directory, or `None` when the\ndefault location is in use.\n\nFailures reading the preferences degrade to `None` and are logged.\n\n# Errors\n\nReserved for backends that cannot degrade; the bundled ones always\nreturn `Ok`.",
            -> Result<Option<PathBuf>>);
        define_storage!(@method $mode, set_storage_location,
            "Points the store at a different data directory.\n\n# Errors\n\nReturns [`LaskuriError::InvalidStoragePath`] if `path` is not an\nexisting directory, or a storage error if the preference cannot be\nsaved.",
            path: &Path, -> Result<()>);

        // Customers
        define_storage!(@method $mode, load_customers,
            "Returns all stored customers.\n\n# Errors\n\nReturns an error if the store cannot be read or parsed.",
            -> Result<Vec<Customer>>);
        define_storage!(@method $mode, save_customers,
            "Replaces the stored customer collection.\n\n# Errors\n\nReturns an error if the store cannot be written.",
            customers: &[Customer], -> Result<()>);

        // Calculations
        define_storage!(@method $mode, load_calculations,
            "Returns all stored calculations.\n\n# Errors\n\nReturns an error if the store cannot be read or parsed.",
            -> Result<Vec<SavedCalculation>>);
        define_storage!(@method $mode, save_calculations,
            "Replaces the stored calculation collection.\n\n# Errors\n\nReturns an error if the store cannot be written.",
            calculations: &[SavedCalculation], -> Result<()>);
    };

    // ── Blocking method renderer ────────────────────────────────────
    (@method blocking, $name:ident, $doc:expr,
     $($param:ident: $param_ty:ty,)* -> $ret:ty) => {
        #[doc = $doc]
        fn $name(&self $(, $param: $param_ty)*) -> $ret;
    };

    // ── Async method renderer (returns impl Future + Send) ──────────
    (@method async_mode, $name:ident, $doc:expr,
     $($param:ident: $param_ty:ty,)* -> $ret:ty) => {
        #[doc = $doc]
        fn $name(&self $(, $param: $param_ty)*)
            -> impl core::future::Future<Output = $ret> + Send;
    };
}

#[cfg(feature = "async")]
mod async_storage {
    //! Async storage trait definition.

    use std::path::{Path, PathBuf};

    #[allow(unused_imports, reason = "referenced from rustdoc links only")]
    use crate::error::LaskuriError;
    use crate::error::Result;
    use crate::models::{Customer, SavedCalculation};

    define_storage! {
        trait_name: Storage,
        trait_doc: "Async document store for customers and saved calculations.\n\nAll methods take `&self`; implementations use interior mutability\n(e.g. `Mutex`) for thread-safe mutation.",
        mode: async_mode,
    }
}

#[cfg(feature = "blocking")]
mod blocking_storage {
    //! Blocking storage trait definition.

    use std::path::{Path, PathBuf};

    #[allow(unused_imports, reason = "referenced from rustdoc links only")]
    use crate::error::LaskuriError;
    use crate::error::Result;
    use crate::models::{Customer, SavedCalculation};

    define_storage! {
        trait_name: BlockingStorage,
        trait_doc: "Blocking document store for customers and saved calculations.\n\nAll methods take `&self`; implementations use interior mutability\n(e.g. `Mutex`) for thread-safe mutation.",
        mode: blocking,
    }
}

#[cfg(feature = "async")]
pub use async_storage::Storage;
#[cfg(feature = "blocking")]
pub use blocking_storage::BlockingStorage;
