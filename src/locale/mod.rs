//! Localization: generated locale caches and the per-request accessor.
//!
//! # Architecture
//!
//! - `kind`: the locale type domain (`act`, `err`, `lbl`, `msg`) and applications
//! - `cache`: builds `<cache>/<application>/locale/<language>.json` from the database
//! - `accessor`: loads a cache file into an immutable [`Locale`] and validates
//!   languages against the module settings
//!
//! # Example
//!
//! ```rust,ignore
//! let locale = service.set_locale(Some("nl")).await?;
//! let save = locale.lbl("Save"); // "{$lblSave}" when untranslated
//! ```

mod accessor;
mod cache;
mod kind;

pub use accessor::{Locale, LocaleError, LocaleService};
pub use cache::{
    is_valid_language_code, CacheLayout, LocaleCacheBuilder, LocaleCacheFile, LocaleTables,
    ModuleTable, NameTable, CORE_MODULE,
};
pub use kind::{Application, LocaleType};
