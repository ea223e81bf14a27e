//! Locale cache builder.
//!
//! Turns the translation rows of one `(language, application)` pair into a
//! generated JSON file that the accessor loads at request start. The file is
//! only rebuilt when it is missing.

use crate::db::{Database, LocaleRow};
use crate::locale::{Application, LocaleError, LocaleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Default module, present in every backend table even without rows.
pub const CORE_MODULE: &str = "core";

const GENERATED_NOTICE: &str =
    "This file is generated by the backend, it contains the locale. Do NOT edit.";

/// `name -> value`
pub type NameTable = BTreeMap<String, String>;

/// `module -> name -> value`
pub type ModuleTable = BTreeMap<String, NameTable>;

/// Per-type translation tables, in one of the two cache layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum LocaleTables {
    /// `type -> module -> name -> value` (backend)
    Modular {
        types: BTreeMap<LocaleType, ModuleTable>,
    },
    /// `type -> name -> value` (every other application)
    Flat { types: BTreeMap<LocaleType, NameTable> },
}

impl LocaleTables {
    /// Partition rows by type (in declaration order) and, for modular
    /// applications, by module.
    ///
    /// Rows with a type outside the enumeration are skipped.
    pub fn assemble(rows: &[LocaleRow], application: Application) -> Self {
        let mut modular: BTreeMap<LocaleType, ModuleTable> = BTreeMap::new();
        let mut flat: BTreeMap<LocaleType, NameTable> = BTreeMap::new();

        for kind in LocaleType::ALL {
            let mut modules = ModuleTable::new();
            modules.insert(CORE_MODULE.to_string(), NameTable::new());
            modular.insert(kind, modules);
            flat.insert(kind, NameTable::new());
        }

        for row in rows {
            let kind = match row.kind.parse::<LocaleType>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!("Skipping locale {}.{}: {}", row.module, row.name, e);
                    continue;
                }
            };

            if application.is_modular() {
                if let Some(modules) = modular.get_mut(&kind) {
                    modules
                        .entry(row.module.clone())
                        .or_default()
                        .insert(row.name.clone(), row.value.clone());
                }
            } else if let Some(names) = flat.get_mut(&kind) {
                names.insert(row.name.clone(), row.value.clone());
            }
        }

        if application.is_modular() {
            LocaleTables::Modular { types: modular }
        } else {
            LocaleTables::Flat { types: flat }
        }
    }

    /// Number of translations across all types and modules.
    pub fn len(&self) -> usize {
        match self {
            LocaleTables::Modular { types } => types
                .values()
                .flat_map(|modules| modules.values())
                .map(|names| names.len())
                .sum(),
            LocaleTables::Flat { types } => types.values().map(|names| names.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk shape of a generated locale file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleCacheFile {
    #[serde(rename = "_notice")]
    pub notice: String,
    pub generated_at: DateTime<Utc>,
    pub application: Application,
    pub language: String,
    pub tables: LocaleTables,
}

/// Where generated locale files live.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<application>/locale/<language>.json`
    pub fn locale_file(&self, application: Application, language: &str) -> PathBuf {
        self.root
            .join(application.as_str())
            .join("locale")
            .join(format!("{}.json", language))
    }
}

/// Language codes end up in file names, so only plain codes are accepted.
pub fn is_valid_language_code(language: &str) -> bool {
    !language.is_empty()
        && language.len() <= 16
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct LocaleCacheBuilder {
    db: Database,
    layout: CacheLayout,
}

impl LocaleCacheBuilder {
    pub fn new(db: Database, layout: CacheLayout) -> Self {
        Self { db, layout }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Regenerate the cache file for one language of one application,
    /// overwriting any existing file. Returns the written path.
    pub async fn build(
        &self,
        language: &str,
        application: Application,
    ) -> Result<PathBuf, LocaleError> {
        if !is_valid_language_code(language) {
            return Err(LocaleError::InvalidLanguage(language.to_string()));
        }

        let rows = self.db.locale_rows(language, application.as_str()).await?;
        let file = LocaleCacheFile {
            notice: GENERATED_NOTICE.to_string(),
            generated_at: Utc::now(),
            application,
            language: language.to_string(),
            tables: LocaleTables::assemble(&rows, application),
        };

        let path = self.layout.locale_file(application, language);
        let encoded = serde_json::to_vec_pretty(&file).map_err(|source| LocaleError::Malformed {
            path: path.clone(),
            source,
        })?;
        write_replacing(&path, &encoded).await?;

        info!(
            "Built {} locale cache for {} ({} translations)",
            application,
            language,
            file.tables.len()
        );
        Ok(path)
    }
}

/// Write next to the target and rename over it, so a concurrent reader sees
/// either the old file or the complete new one.
async fn write_replacing(path: &Path, contents: &[u8]) -> Result<(), LocaleError> {
    let io_err = |source| LocaleError::Cache {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let temp = path.with_extension(format!(
        "json.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    tokio::fs::write(&temp, contents).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(io_err(e));
    }
    Ok(())
}
