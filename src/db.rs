use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// A translation row as stored in the `locale` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LocaleRow {
    #[sqlx(rename = "type")]
    pub kind: String,
    pub module: String,
    pub name: String,
    pub value: String,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database and create the tables this crate reads from.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context(format!("Invalid database url {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database only lives as long as its single connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context(format!("Failed to open database at {}", database_url))?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS locale (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application TEXT NOT NULL,
                module TEXT NOT NULL,
                language TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('act', 'err', 'lbl', 'msg')),
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                edited_on DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (application, module, language, type, name)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create locale table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modules_settings (
                module TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (module, name)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create modules_settings table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS meta (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                keywords TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT ''
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create meta table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pages (
                revisionId INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL,
                userId INTEGER NOT NULL DEFAULT 0,
                parentId INTEGER NOT NULL DEFAULT 0,
                templateId INTEGER NOT NULL DEFAULT 0,
                metaId INTEGER REFERENCES meta(id),
                language TEXT NOT NULL,
                \"type\" TEXT NOT NULL DEFAULT 'page',
                title TEXT NOT NULL,
                navigationTitle TEXT NOT NULL DEFAULT '',
                navigationTitleOverwrite BOOLEAN NOT NULL DEFAULT 0,
                hidden BOOLEAN NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                publishOn DATETIME NOT NULL,
                data TEXT,
                createdOn DATETIME NOT NULL,
                editedOn DATETIME NOT NULL,
                allowMove BOOLEAN NOT NULL DEFAULT 1,
                allowChildren BOOLEAN NOT NULL DEFAULT 1,
                allowEdit BOOLEAN NOT NULL DEFAULT 1,
                allowDelete BOOLEAN NOT NULL DEFAULT 1,
                sequence INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create pages table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pages_id_language ON pages (id, language, status)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create pages index")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modules_extras (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module TEXT NOT NULL,
                \"type\" TEXT NOT NULL CHECK (\"type\" IN ('homepage', 'block', 'widget')),
                label TEXT NOT NULL,
                action TEXT,
                data TEXT,
                hidden BOOLEAN NOT NULL DEFAULT 0,
                sequence INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create modules_extras table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pages_blocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                revisionId INTEGER NOT NULL,
                position TEXT NOT NULL DEFAULT 'main',
                extraId INTEGER REFERENCES modules_extras(id),
                html TEXT NOT NULL DEFAULT '',
                visible BOOLEAN NOT NULL DEFAULT 1,
                sequence INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create pages_blocks table")?;

        Ok(())
    }

    // ==================== Locale ====================

    /// Every translation row for one language of one application.
    pub async fn locale_rows(&self, language: &str, application: &str) -> Result<Vec<LocaleRow>> {
        let rows = sqlx::query_as::<_, LocaleRow>(
            "SELECT type, module, name, value
             FROM locale
             WHERE language = ?1 AND application = ?2
             ORDER BY type ASC, name ASC, module ASC",
        )
        .bind(language)
        .bind(application)
        .fetch_all(&self.pool)
        .await
        .context(format!(
            "Failed to fetch locale for {} ({})",
            language, application
        ))?;

        debug!(
            "Fetched {} locale rows for {} ({})",
            rows.len(),
            language,
            application
        );
        Ok(rows)
    }

    /// Insert or replace a single translation.
    pub async fn upsert_locale(
        &self,
        application: &str,
        module: &str,
        language: &str,
        kind: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO locale (application, module, language, type, name, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (application, module, language, type, name)
             DO UPDATE SET value = excluded.value, edited_on = CURRENT_TIMESTAMP",
        )
        .bind(application)
        .bind(module)
        .bind(language)
        .bind(kind)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to save locale")?;
        Ok(())
    }

    // ==================== Module settings ====================

    /// Read a JSON-encoded module setting. Undecodable values are treated as absent.
    pub async fn module_setting<T: DeserializeOwned>(
        &self,
        module: &str,
        name: &str,
    ) -> Result<Option<T>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM modules_settings WHERE module = ?1 AND name = ?2")
                .bind(module)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .context(format!("Failed to read setting {}.{}", module, name))?;

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Ignoring malformed setting {}.{}: {}", module, name, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn set_module_setting<T: Serialize>(
        &self,
        module: &str,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let encoded = serde_json::to_string(value).context("Failed to encode setting")?;
        sqlx::query(
            "INSERT INTO modules_settings (module, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (module, name) DO UPDATE SET value = excluded.value",
        )
        .bind(module)
        .bind(name)
        .bind(encoded)
        .execute(&self.pool)
        .await
        .context(format!("Failed to save setting {}.{}", module, name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    async fn create_test_db() -> Database {
        Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create database")
    }

    // ==================== Database Initialization Tests ====================

    #[tokio::test]
    async fn test_database_creation() {
        let db = create_test_db().await;
        let rows = db.locale_rows("en", "backend").await.expect("Should query");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_database_reopening() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite:{}", temp_dir.path().join("cms.db").display());

        {
            let db = Database::connect(&url).await.expect("Should create");
            db.upsert_locale("backend", "core", "en", "lbl", "Save", "save")
                .await
                .expect("Should insert");
        }

        let db = Database::connect(&url).await.expect("Should reopen");
        let rows = db.locale_rows("en", "backend").await.expect("Should query");
        assert_eq!(rows.len(), 1, "Locale should persist");
    }

    #[tokio::test]
    async fn test_invalid_database_path() {
        let result = Database::connect("sqlite:/non/existent/path/cms.db").await;
        assert!(result.is_err());
    }

    // ==================== Locale Tests ====================

    #[tokio::test]
    async fn test_locale_rows_filters_language_and_application() {
        let db = create_test_db().await;
        db.upsert_locale("backend", "core", "en", "lbl", "Save", "save")
            .await
            .unwrap();
        db.upsert_locale("backend", "core", "nl", "lbl", "Save", "opslaan")
            .await
            .unwrap();
        db.upsert_locale("frontend", "core", "en", "lbl", "Save", "store")
            .await
            .unwrap();

        let rows = db.locale_rows("en", "backend").await.unwrap();
        assert_eq!(
            rows,
            vec![LocaleRow {
                kind: "lbl".to_string(),
                module: "core".to_string(),
                name: "Save".to_string(),
                value: "save".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_locale_rows_ordering() {
        let db = create_test_db().await;
        db.upsert_locale("backend", "Pages", "en", "msg", "Saved", "saved")
            .await
            .unwrap();
        db.upsert_locale("backend", "core", "en", "lbl", "Title", "title")
            .await
            .unwrap();
        db.upsert_locale("backend", "core", "en", "act", "Edit", "edit")
            .await
            .unwrap();
        db.upsert_locale("backend", "core", "en", "lbl", "Add", "add")
            .await
            .unwrap();

        let rows = db.locale_rows("en", "backend").await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Edit", "Add", "Title", "Saved"]);
    }

    #[tokio::test]
    async fn test_upsert_locale_replaces_value() {
        let db = create_test_db().await;
        db.upsert_locale("backend", "core", "en", "lbl", "Save", "save")
            .await
            .unwrap();
        db.upsert_locale("backend", "core", "en", "lbl", "Save", "Save it")
            .await
            .unwrap();

        let rows = db.locale_rows("en", "backend").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "Save it");
    }

    #[tokio::test]
    async fn test_locale_rejects_unknown_type() {
        let db = create_test_db().await;
        let result = db
            .upsert_locale("backend", "core", "en", "xyz", "Save", "save")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sql_injection_prevention_language() {
        let db = create_test_db().await;
        db.upsert_locale("backend", "core", "en", "lbl", "Save", "save")
            .await
            .unwrap();

        let rows = db
            .locale_rows("en' OR '1'='1", "backend")
            .await
            .expect("Should handle safely");
        assert!(rows.is_empty());
    }

    // ==================== Module Setting Tests ====================

    #[tokio::test]
    async fn test_module_setting_roundtrip() {
        let db = create_test_db().await;
        db.set_module_setting("core", "active_languages", &vec!["en", "nl"])
            .await
            .unwrap();

        let languages: Option<Vec<String>> =
            db.module_setting("core", "active_languages").await.unwrap();
        assert_eq!(languages, Some(vec!["en".to_string(), "nl".to_string()]));
    }

    #[tokio::test]
    async fn test_module_setting_missing() {
        let db = create_test_db().await;
        let value: Option<String> = db.module_setting("core", "nothing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_module_setting_malformed_is_absent() {
        let db = create_test_db().await;
        sqlx::query("INSERT INTO modules_settings (module, name, value) VALUES ('core', 'broken', 'a:1:{')")
            .execute(db.pool())
            .await
            .unwrap();

        let value: Option<Vec<String>> = db.module_setting("core", "broken").await.unwrap();
        assert!(value.is_none());
    }
}
