use anyhow::{Context, Result};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row, Transaction};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::db::Database;
use crate::pages::model::{Page, PageRecord, PageStatus};
use crate::pages::normalize::{normalize_row, RawRow, RawValue, PAGE_PREFIX};

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Int,
    Bool,
    Text,
}

/// Page table columns, selected as `p_<column>`. `metaId` is left out: the
/// joined `meta_id` takes its place.
const PAGE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("revisionId", ColumnKind::Int),
    ("id", ColumnKind::Int),
    ("userId", ColumnKind::Int),
    ("parentId", ColumnKind::Int),
    ("templateId", ColumnKind::Int),
    ("language", ColumnKind::Text),
    ("type", ColumnKind::Text),
    ("title", ColumnKind::Text),
    ("navigationTitle", ColumnKind::Text),
    ("navigationTitleOverwrite", ColumnKind::Bool),
    ("hidden", ColumnKind::Bool),
    ("status", ColumnKind::Text),
    ("publishOn", ColumnKind::Text),
    ("data", ColumnKind::Text),
    ("createdOn", ColumnKind::Text),
    ("editedOn", ColumnKind::Text),
    ("allowMove", ColumnKind::Bool),
    ("allowChildren", ColumnKind::Bool),
    ("allowEdit", ColumnKind::Bool),
    ("allowDelete", ColumnKind::Bool),
    ("sequence", ColumnKind::Int),
];

/// Computed columns, selected after the page columns so they win on clashes.
const DERIVED_COLUMNS: &[(&str, &str, ColumnKind)] = &[
    ("meta_id", "m.id", ColumnKind::Int),
    (
        "publish_on",
        "CAST(strftime('%s', p.publishOn) AS INTEGER)",
        ColumnKind::Int,
    ),
    (
        "created_on",
        "CAST(strftime('%s', p.createdOn) AS INTEGER)",
        ColumnKind::Int,
    ),
    (
        "edited_on",
        "CAST(strftime('%s', p.editedOn) AS INTEGER)",
        ColumnKind::Int,
    ),
    (
        "has_extra",
        "CASE WHEN COUNT(e.id) > 0 THEN 1 ELSE 0 END",
        ColumnKind::Int,
    ),
    ("extra_ids", "GROUP_CONCAT(b.extraId)", ColumnKind::Text),
];

/// Extra type that counts towards `has_extra`.
const BLOCK_EXTRA: &str = "block";

fn revision_query() -> &'static str {
    static QUERY: OnceLock<String> = OnceLock::new();
    QUERY.get_or_init(|| {
        let page_columns = PAGE_COLUMNS
            .iter()
            .map(|(column, _)| format!("p.\"{}\" AS \"{}{}\"", column, PAGE_PREFIX, column));
        let derived_columns = DERIVED_COLUMNS
            .iter()
            .map(|(alias, expr, _)| format!("{} AS {}", expr, alias));
        let select = page_columns
            .chain(derived_columns)
            .collect::<Vec<_>>()
            .join(",\n    ");

        format!(
            "SELECT {}
             FROM pages AS p
             LEFT JOIN meta AS m ON m.id = p.metaId
             LEFT JOIN pages_blocks AS b ON b.revisionId = p.revisionId AND b.extraId IS NOT NULL
             LEFT JOIN modules_extras AS e ON e.id = b.extraId AND e.\"type\" = ?1
             WHERE p.id = ?2 AND p.revisionId = ?3 AND p.language = ?4
             GROUP BY p.revisionId",
            select
        )
    })
}

fn raw_value(row: &SqliteRow, column: &str, kind: ColumnKind) -> Result<RawValue> {
    let value = match kind {
        ColumnKind::Int => row
            .try_get::<Option<i64>, _>(column)?
            .map_or(RawValue::Null, RawValue::Int),
        ColumnKind::Bool => row
            .try_get::<Option<bool>, _>(column)?
            .map_or(RawValue::Null, RawValue::Bool),
        ColumnKind::Text => row
            .try_get::<Option<String>, _>(column)?
            .map_or(RawValue::Null, RawValue::Text),
    };
    Ok(value)
}

fn raw_row(row: &SqliteRow) -> Result<RawRow> {
    let mut raw = Vec::with_capacity(PAGE_COLUMNS.len() + DERIVED_COLUMNS.len());
    for (column, kind) in PAGE_COLUMNS {
        let alias = format!("{}{}", PAGE_PREFIX, column);
        let value = raw_value(row, &alias, *kind)
            .with_context(|| format!("Failed to decode page column {}", column))?;
        raw.push((alias, value));
    }
    for (alias, _, kind) in DERIVED_COLUMNS {
        let value = raw_value(row, alias, *kind)
            .with_context(|| format!("Failed to decode page column {}", alias))?;
        raw.push((alias.to_string(), value));
    }
    Ok(raw)
}

#[derive(Clone)]
pub struct PageRepository {
    db: Database,
}

impl PageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every record for a page revision in one language. Empty on a miss.
    pub async fn get(&self, id: i64, revision_id: i64, language: &str) -> Result<Vec<PageRecord>> {
        self.fetch(id, revision_id, language, None).await
    }

    pub async fn get_one(
        &self,
        id: i64,
        revision_id: i64,
        language: &str,
    ) -> Result<Option<PageRecord>> {
        Ok(self
            .fetch(id, revision_id, language, Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// The newest active revision of a page.
    pub async fn get_active(&self, id: i64, language: &str) -> Result<Option<PageRecord>> {
        let revision_id: Option<i64> = sqlx::query_scalar(
            "SELECT revisionId FROM pages
             WHERE id = ?1 AND language = ?2 AND status = ?3
             ORDER BY revisionId DESC
             LIMIT 1",
        )
        .bind(id)
        .bind(language)
        .bind(PageStatus::Active.as_str())
        .fetch_optional(self.db.pool())
        .await
        .context(format!("Failed to find active revision of page {}", id))?;

        match revision_id {
            Some(revision_id) => self.get_one(id, revision_id, language).await,
            None => Ok(None),
        }
    }

    async fn fetch(
        &self,
        id: i64,
        revision_id: i64,
        language: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PageRecord>> {
        let sql = match limit {
            Some(limit) => format!("{}\nLIMIT {}", revision_query(), limit),
            None => revision_query().to_string(),
        };

        let rows = sqlx::query(&sql)
            .bind(BLOCK_EXTRA)
            .bind(id)
            .bind(revision_id)
            .bind(language)
            .fetch_all(self.db.pool())
            .await
            .context(format!(
                "Failed to fetch page {} revision {} ({})",
                id, revision_id, language
            ))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = normalize_row(raw_row(row)?).context(format!(
                "Failed to normalize page {} revision {}",
                id, revision_id
            ))?;
            records.push(record);
        }

        debug!(
            "Fetched {} record(s) for page {} revision {} ({})",
            records.len(),
            id,
            revision_id,
            language
        );
        Ok(records)
    }

    /// Delete revisions in one statement. Returns the number of deleted rows.
    pub async fn delete_by_revision_ids(&self, revision_ids: &[i64]) -> Result<u64> {
        if revision_ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM pages WHERE revisionId IN (");
        let mut separated = query.separated(", ");
        for revision_id in revision_ids {
            separated.push_bind(*revision_id);
        }
        separated.push_unseparated(")");

        let deleted = query
            .build()
            .execute(self.db.pool())
            .await
            .context("Failed to delete page revisions")?
            .rows_affected();

        info!("Deleted {} page revision(s)", deleted);
        Ok(deleted)
    }

    /// Start staging writes. Nothing is visible to other readers until
    /// [`PageUnitOfWork::save`]; dropping the unit of work discards it.
    pub async fn begin(&self) -> Result<PageUnitOfWork> {
        let tx = self
            .db
            .pool()
            .begin()
            .await
            .context("Failed to start page transaction")?;
        Ok(PageUnitOfWork { tx, staged: 0 })
    }
}

pub struct PageUnitOfWork {
    tx: Transaction<'static, Sqlite>,
    staged: usize,
}

impl PageUnitOfWork {
    /// Stage a new revision and return its revision id.
    pub async fn add(&mut self, page: &Page) -> Result<i64> {
        let data = page
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode page data")?;

        let revision_id: i64 = sqlx::query_scalar(
            "INSERT INTO pages (
                id, userId, parentId, templateId, metaId, language, \"type\", title,
                navigationTitle, navigationTitleOverwrite, hidden, status, publishOn, data,
                createdOn, editedOn, allowMove, allowChildren, allowEdit, allowDelete, sequence
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                datetime('now'), datetime('now'), ?15, ?16, ?17, ?18, ?19
             )
             RETURNING revisionId",
        )
        .bind(page.id)
        .bind(page.user_id)
        .bind(page.parent_id)
        .bind(page.template_id)
        .bind(page.meta_id)
        .bind(&page.language)
        .bind(&page.page_type)
        .bind(&page.title)
        .bind(&page.navigation_title)
        .bind(page.navigation_title_overwrite)
        .bind(page.hidden)
        .bind(page.status.as_str())
        .bind(page.publish_on.format("%Y-%m-%d %H:%M:%S").to_string())
        .bind(data)
        .bind(page.allow_move)
        .bind(page.allow_children)
        .bind(page.allow_edit)
        .bind(page.allow_delete)
        .bind(page.sequence)
        .fetch_one(&mut *self.tx)
        .await
        .context(format!("Failed to stage page {}", page.id))?;

        self.staged += 1;
        Ok(revision_id)
    }

    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Commit everything staged so far.
    pub async fn save(self) -> Result<usize> {
        let staged = self.staged;
        self.tx
            .commit()
            .await
            .context("Failed to save staged pages")?;
        info!("Saved {} page revision(s)", staged);
        Ok(staged)
    }
}
