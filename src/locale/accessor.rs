//! Locale accessor.
//!
//! A [`Locale`] is an immutable snapshot of one generated cache file. It is
//! built per request by [`LocaleService::set_locale`] and passed explicitly to
//! whatever renders output, so no translation state is shared between requests.

use crate::db::Database;
use crate::locale::cache::{
    LocaleCacheBuilder, LocaleCacheFile, LocaleTables, NameTable, CORE_MODULE,
};
use crate::locale::{Application, LocaleType};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

static EMPTY: NameTable = NameTable::new();

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("Invalid language ({0}).")]
    InvalidLanguage(String),

    #[error("Failed to access locale cache {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed locale cache {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Translations of one language for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    language: String,
    application: Application,
    tables: LocaleTables,
}

impl Locale {
    pub fn new(language: impl Into<String>, application: Application, tables: LocaleTables) -> Self {
        Self {
            language: language.into(),
            application,
            tables,
        }
    }

    /// Read a generated cache file.
    pub async fn load(path: &std::path::Path) -> Result<Self, LocaleError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| LocaleError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        let file: LocaleCacheFile =
            serde_json::from_slice(&bytes).map_err(|source| LocaleError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file.language, file.application, file.tables))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn application(&self) -> Application {
        self.application
    }

    /// Look a key up outside of any module (the `core` module on the backend).
    pub fn get(&self, kind: LocaleType, key: &str) -> String {
        self.lookup(kind, None, key)
            .map(str::to_string)
            .unwrap_or_else(|| kind.placeholder(key))
    }

    /// Look a key up in `module` first, then in `core`.
    ///
    /// Applications without modules ignore `module`.
    pub fn get_in(&self, kind: LocaleType, module: &str, key: &str) -> String {
        self.lookup(kind, Some(module), key)
            .map(str::to_string)
            .unwrap_or_else(|| kind.placeholder(key))
    }

    /// Like [`Locale::get_in`] but without the placeholder fallback.
    pub fn lookup(&self, kind: LocaleType, module: Option<&str>, key: &str) -> Option<&str> {
        match &self.tables {
            LocaleTables::Flat { types } => types.get(&kind)?.get(key).map(String::as_str),
            LocaleTables::Modular { types } => {
                let modules = types.get(&kind)?;
                module
                    .and_then(|m| modules.get(m))
                    .and_then(|names| names.get(key))
                    .or_else(|| modules.get(CORE_MODULE)?.get(key))
                    .map(String::as_str)
            }
        }
    }

    /// Every translation of a kind visible without a module.
    pub fn entries(&self, kind: LocaleType) -> &NameTable {
        let table = match &self.tables {
            LocaleTables::Flat { types } => types.get(&kind),
            LocaleTables::Modular { types } => {
                types.get(&kind).and_then(|modules| modules.get(CORE_MODULE))
            }
        };
        table.unwrap_or(&EMPTY)
    }

    pub fn action(&self, key: &str) -> String {
        self.get(LocaleType::Action, key)
    }

    pub fn error(&self, key: &str) -> String {
        self.get(LocaleType::Error, key)
    }

    pub fn label(&self, key: &str) -> String {
        self.get(LocaleType::Label, key)
    }

    pub fn message(&self, key: &str) -> String {
        self.get(LocaleType::Message, key)
    }

    pub fn actions(&self) -> &NameTable {
        self.entries(LocaleType::Action)
    }

    pub fn errors(&self) -> &NameTable {
        self.entries(LocaleType::Error)
    }

    pub fn labels(&self) -> &NameTable {
        self.entries(LocaleType::Label)
    }

    pub fn messages(&self) -> &NameTable {
        self.entries(LocaleType::Message)
    }

    // Short aliases used by templates and handlers.

    pub fn act(&self, key: &str) -> String {
        self.action(key)
    }

    pub fn err(&self, key: &str) -> String {
        self.error(key)
    }

    pub fn lbl(&self, key: &str) -> String {
        self.label(key)
    }

    pub fn msg(&self, key: &str) -> String {
        self.message(key)
    }
}

/// Loads locales for one application and knows which languages it may serve.
///
/// Language lists are read from the module settings on first use and kept for
/// the lifetime of the service.
pub struct LocaleService {
    db: Database,
    builder: LocaleCacheBuilder,
    application: Application,
    default_language: String,
    active_languages: OnceCell<Vec<String>>,
    redirect_languages: OnceCell<Vec<String>>,
    interface_languages: OnceCell<Vec<String>>,
    working_languages: OnceCell<Vec<String>>,
}

impl LocaleService {
    pub fn new(
        db: Database,
        builder: LocaleCacheBuilder,
        application: Application,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            db,
            builder,
            application,
            default_language: default_language.into(),
            active_languages: OnceCell::new(),
            redirect_languages: OnceCell::new(),
            interface_languages: OnceCell::new(),
            working_languages: OnceCell::new(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Load the locale of `language`, or of the default language when absent.
    ///
    /// The cache file is generated first when it does not exist yet.
    pub async fn set_locale(&self, language: Option<&str>) -> Result<Locale, LocaleError> {
        let language = language.unwrap_or(&self.default_language);

        if !self.locale_languages().await?.iter().any(|l| l == language) {
            return Err(LocaleError::InvalidLanguage(language.to_string()));
        }

        let path = self.builder.layout().locale_file(self.application, language);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| LocaleError::Cache {
                path: path.clone(),
                source,
            })?;
        if !exists {
            debug!("No {} locale cache for {}, building", self.application, language);
            self.builder.build(language, self.application).await?;
        }

        Locale::load(&path).await
    }

    /// Regenerate the cache of every language this application allows.
    pub async fn rebuild_all(&self) -> Result<Vec<PathBuf>, LocaleError> {
        let languages = self.locale_languages().await?;
        let builds = languages
            .iter()
            .map(|language| self.builder.build(language, self.application));
        futures::future::try_join_all(builds).await
    }

    /// Languages a locale may be loaded for: interface languages on the
    /// backend, active site languages elsewhere.
    pub async fn locale_languages(&self) -> Result<&[String], LocaleError> {
        match self.application {
            Application::Backend => self.interface_languages().await,
            Application::Frontend => self.active_languages().await,
        }
    }

    pub async fn active_languages(&self) -> Result<&[String], LocaleError> {
        self.cached_setting(&self.active_languages, "active_languages", None)
            .await
    }

    pub async fn redirect_languages(&self) -> Result<&[String], LocaleError> {
        self.cached_setting(&self.redirect_languages, "redirect_languages", None)
            .await
    }

    pub async fn interface_languages(&self) -> Result<&[String], LocaleError> {
        self.cached_setting(&self.interface_languages, "interface_languages", None)
            .await
    }

    /// Content languages editors may work in; the active languages when unset.
    pub async fn working_languages(&self) -> Result<&[String], LocaleError> {
        self.cached_setting(
            &self.working_languages,
            "working_languages",
            Some("active_languages"),
        )
        .await
    }

    /// Pick the working language from a request value, falling back to the
    /// default language for anything that is not a working language.
    pub async fn working_language(&self, requested: Option<&str>) -> Result<String, LocaleError> {
        let languages = self.working_languages().await?;
        Ok(requested
            .filter(|lang| languages.iter().any(|l| l == lang))
            .unwrap_or(&self.default_language)
            .to_string())
    }

    /// Interface language for visitors without a stored preference.
    pub async fn default_interface_language(&self) -> Result<String, LocaleError> {
        let language: Option<String> = self
            .db
            .module_setting(CORE_MODULE, "default_interface_language")
            .await?;
        Ok(language.unwrap_or_else(|| self.default_language.clone()))
    }

    /// Preferred language from an `Accept-Language` header, limited to the
    /// redirect languages.
    pub async fn browser_language(&self, accept_language: Option<&str>) -> Result<String, LocaleError> {
        if let Some(header) = accept_language.filter(|h| h.len() >= 2) {
            let redirect = self.redirect_languages().await?;
            for entry in header.split(',') {
                let code: String = entry.trim().chars().take(2).collect();
                if redirect.iter().any(|l| *l == code) {
                    return Ok(code);
                }
            }
        }
        Ok(self.default_language.clone())
    }

    async fn cached_setting<'a>(
        &'a self,
        cell: &'a OnceCell<Vec<String>>,
        name: &str,
        fallback: Option<&str>,
    ) -> Result<&'a [String], LocaleError> {
        let languages = cell
            .get_or_try_init(|| async {
                let mut value: Option<Vec<String>> =
                    self.db.module_setting(CORE_MODULE, name).await?;
                if value.is_none() {
                    if let Some(fallback) = fallback {
                        value = self.db.module_setting(CORE_MODULE, fallback).await?;
                    }
                }
                Ok::<_, LocaleError>(value.unwrap_or_else(|| vec![self.default_language.clone()]))
            })
            .await?;
        Ok(languages.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocaleRow;
    use crate::locale::cache::CacheLayout;
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    fn row(kind: &str, module: &str, name: &str, value: &str) -> LocaleRow {
        LocaleRow {
            kind: kind.to_string(),
            module: module.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn backend_locale() -> Locale {
        let rows = vec![
            row("lbl", "core", "Save", "save"),
            row("lbl", "Pages", "Save", "save page"),
            row("lbl", "Pages", "Move", "move"),
            row("act", "core", "Edit", "edit"),
            row("err", "core", "Required", "required"),
            row("msg", "core", "Saved", "saved"),
        ];
        Locale::new(
            "en",
            Application::Backend,
            LocaleTables::assemble(&rows, Application::Backend),
        )
    }

    fn frontend_locale() -> Locale {
        let rows = vec![
            row("lbl", "core", "Home", "home"),
            row("lbl", "Blog", "Archive", "archive"),
        ];
        Locale::new(
            "en",
            Application::Frontend,
            LocaleTables::assemble(&rows, Application::Frontend),
        )
    }

    async fn create_service(application: Application) -> (LocaleService, Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.set_module_setting("core", "active_languages", &vec!["en", "nl"])
            .await
            .unwrap();
        db.set_module_setting("core", "redirect_languages", &vec!["nl", "en"])
            .await
            .unwrap();
        db.set_module_setting("core", "interface_languages", &vec!["en"])
            .await
            .unwrap();
        db.upsert_locale("frontend", "core", "nl", "lbl", "Home", "start")
            .await
            .unwrap();
        db.upsert_locale("backend", "core", "en", "lbl", "Save", "save")
            .await
            .unwrap();

        let builder = LocaleCacheBuilder::new(db.clone(), CacheLayout::new(temp_dir.path()));
        let service = LocaleService::new(db.clone(), builder, application, "en");
        (service, db, temp_dir)
    }

    // ==================== Getter Tests ====================

    #[test]
    fn test_get_existing_keys() {
        let locale = backend_locale();
        assert_eq!(locale.label("Save"), "save");
        assert_eq!(locale.action("Edit"), "edit");
        assert_eq!(locale.error("Required"), "required");
        assert_eq!(locale.message("Saved"), "saved");
    }

    #[test]
    fn test_missing_keys_return_placeholders() {
        let locale = backend_locale();
        assert_eq!(locale.label("foo"), "{$lblfoo}");
        assert_eq!(locale.action("foo"), "{$actfoo}");
        assert_eq!(locale.error("foo"), "{$errfoo}");
        assert_eq!(locale.message("foo"), "{$msgfoo}");
    }

    #[test]
    fn test_short_aliases() {
        let locale = backend_locale();
        assert_eq!(locale.lbl("Save"), locale.label("Save"));
        assert_eq!(locale.act("Edit"), locale.action("Edit"));
        assert_eq!(locale.err("Nope"), "{$errNope}");
        assert_eq!(locale.msg("Saved"), "saved");
    }

    #[test]
    fn test_module_lookup_prefers_module() {
        let locale = backend_locale();
        assert_eq!(locale.get_in(LocaleType::Label, "Pages", "Save"), "save page");
        assert_eq!(locale.get_in(LocaleType::Label, "Blog", "Save"), "save");
        assert_eq!(locale.get_in(LocaleType::Label, "Pages", "Move"), "move");
        assert_eq!(locale.get(LocaleType::Label, "Move"), "{$lblMove}");
    }

    #[test]
    fn test_flat_locale_ignores_module() {
        let locale = frontend_locale();
        assert_eq!(locale.label("Archive"), "archive");
        assert_eq!(locale.get_in(LocaleType::Label, "Pages", "Home"), "home");
    }

    #[test]
    fn test_bulk_getters() {
        let locale = backend_locale();
        assert_eq!(locale.labels().len(), 1);
        assert_eq!(locale.labels()["Save"], "save");
        assert_eq!(locale.actions().len(), 1);
        assert_eq!(locale.errors().len(), 1);
        assert_eq!(locale.messages().len(), 1);

        let frontend = frontend_locale();
        assert_eq!(frontend.labels().len(), 2);
        assert!(frontend.messages().is_empty());
    }

    // ==================== set_locale Tests ====================

    #[tokio::test]
    async fn test_set_locale_rejects_inactive_language() {
        let (service, _db, _temp_dir) = create_service(Application::Frontend).await;

        for language in ["fr", "de", "", "EN"] {
            let result = service.set_locale(Some(language)).await;
            assert!(
                matches!(result, Err(LocaleError::InvalidLanguage(ref l)) if l == language),
                "{} should be rejected",
                language
            );
        }
    }

    #[tokio::test]
    async fn test_set_locale_builds_missing_cache() {
        let (service, _db, temp_dir) = create_service(Application::Frontend).await;
        let path = temp_dir.path().join("frontend/locale/nl.json");
        assert!(!path.exists());

        let locale = service.set_locale(Some("nl")).await.expect("Should load");
        assert!(path.exists());
        assert_eq!(locale.language(), "nl");
        assert_eq!(locale.label("Home"), "start");
    }

    #[tokio::test]
    async fn test_set_locale_uses_existing_cache() {
        let (service, db, _temp_dir) = create_service(Application::Frontend).await;
        service.set_locale(Some("nl")).await.unwrap();

        // Content changes do not invalidate an existing cache file
        db.upsert_locale("frontend", "core", "nl", "lbl", "Home", "thuis")
            .await
            .unwrap();
        let locale = service.set_locale(Some("nl")).await.unwrap();
        assert_eq!(locale.label("Home"), "start");
    }

    #[tokio::test]
    async fn test_set_locale_defaults_language() {
        let (service, _db, _temp_dir) = create_service(Application::Backend).await;
        let locale = service.set_locale(None).await.expect("Should load default");
        assert_eq!(locale.language(), "en");
        assert_eq!(locale.application(), Application::Backend);
        assert_eq!(locale.label("Save"), "save");
    }

    #[tokio::test]
    async fn test_backend_validates_interface_languages() {
        let (service, _db, _temp_dir) = create_service(Application::Backend).await;
        // nl is an active site language but not an interface language
        let result = service.set_locale(Some("nl")).await;
        assert!(matches!(result, Err(LocaleError::InvalidLanguage(_))));
    }

    #[tokio::test]
    async fn test_set_locale_malformed_cache() {
        let (service, _db, temp_dir) = create_service(Application::Frontend).await;
        let path = temp_dir.path().join("frontend/locale/en.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "<?php $lbl = array(); ?>").unwrap();

        let result = service.set_locale(Some("en")).await;
        assert!(matches!(result, Err(LocaleError::Malformed { .. })));
    }

    // ==================== Language List Tests ====================

    #[tokio::test]
    async fn test_language_lists_are_cached() {
        let (service, db, _temp_dir) = create_service(Application::Frontend).await;
        assert_eq!(service.active_languages().await.unwrap(), ["en", "nl"]);

        db.set_module_setting("core", "active_languages", &vec!["fr"])
            .await
            .unwrap();
        assert_eq!(service.active_languages().await.unwrap(), ["en", "nl"]);
    }

    #[tokio::test]
    async fn test_missing_language_setting_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let builder = LocaleCacheBuilder::new(db.clone(), CacheLayout::new(temp_dir.path()));
        let service = LocaleService::new(db, builder, Application::Frontend, "nl");

        assert_eq!(service.active_languages().await.unwrap(), ["nl"]);
        assert_eq!(service.working_languages().await.unwrap(), ["nl"]);
        assert_eq!(service.default_interface_language().await.unwrap(), "nl");
    }

    #[tokio::test]
    async fn test_working_language_selection() {
        let (service, _db, _temp_dir) = create_service(Application::Backend).await;
        assert_eq!(service.working_language(Some("nl")).await.unwrap(), "nl");
        assert_eq!(service.working_language(Some("fr")).await.unwrap(), "en");
        assert_eq!(service.working_language(None).await.unwrap(), "en");
    }

    #[tokio::test]
    async fn test_default_interface_language_setting() {
        let (service, db, _temp_dir) = create_service(Application::Backend).await;
        assert_eq!(service.default_interface_language().await.unwrap(), "en");

        db.set_module_setting("core", "default_interface_language", &"nl")
            .await
            .unwrap();
        assert_eq!(service.default_interface_language().await.unwrap(), "nl");
    }

    // ==================== rebuild_all Tests ====================

    #[tokio::test]
    async fn test_rebuild_all_writes_every_active_language() {
        let (service, _db, temp_dir) = create_service(Application::Frontend).await;

        let mut paths = service.rebuild_all().await.expect("Should rebuild");
        paths.sort();
        assert_eq!(
            paths,
            vec![
                temp_dir.path().join("frontend/locale/en.json"),
                temp_dir.path().join("frontend/locale/nl.json"),
            ]
        );
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[tokio::test]
    async fn test_rebuild_all_refreshes_stale_cache() {
        let (service, db, _temp_dir) = create_service(Application::Frontend).await;
        service.set_locale(Some("nl")).await.unwrap();
        db.upsert_locale("frontend", "core", "nl", "lbl", "Home", "thuis")
            .await
            .unwrap();

        service.rebuild_all().await.unwrap();
        let locale = service.set_locale(Some("nl")).await.unwrap();
        assert_eq!(locale.label("Home"), "thuis");
    }

    // ==================== browser_language Tests ====================

    #[tokio::test]
    async fn test_browser_language_matches_redirect_language() {
        let (service, _db, _temp_dir) = create_service(Application::Frontend).await;
        let language = service
            .browser_language(Some("fr-FR,nl-BE;q=0.8,en;q=0.5"))
            .await
            .unwrap();
        assert_eq!(language, "nl");
    }

    #[tokio::test]
    async fn test_browser_language_fallback() {
        let (service, _db, _temp_dir) = create_service(Application::Frontend).await;
        assert_eq!(service.browser_language(Some("de,fr")).await.unwrap(), "en");
        assert_eq!(service.browser_language(Some("x")).await.unwrap(), "en");
        assert_eq!(service.browser_language(None).await.unwrap(), "en");
    }
}
