use crate::assets::{self, GENERIC_ERROR_MESSAGE};
use crate::config::Config;
use crate::db::Database;
use crate::locale::{Application, CacheLayout, LocaleCacheBuilder, LocaleService};
use crate::pages::PageRepository;
use crate::security::Viewer;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Module whose permission guards the page routes.
const PAGES_MODULE: &str = "Pages";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend_locale: Arc<LocaleService>,
    pub pages: PageRepository,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let builder = LocaleCacheBuilder::new(db.clone(), CacheLayout::new(config.cache_root()));
        let backend_locale = LocaleService::new(
            db.clone(),
            builder,
            Application::Backend,
            config.site_default_language.clone(),
        );

        Self {
            pages: PageRepository::new(db),
            backend_locale: Arc::new(backend_locale),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/backend/js", get(assets::serve_script))
        .route(
            "/backend/pages/:id/revisions/:revision_id",
            get(get_page_revision),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub language: Option<String>,
}

async fn get_page_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, revision_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> Response {
    let viewer = Viewer::from_headers(&headers, &state.config);
    if !viewer.is_allowed_module(PAGES_MODULE) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let languages = match state.backend_locale.working_languages().await {
        Ok(languages) => languages,
        Err(e) => return internal_error(&state, &e.to_string()),
    };
    // Pages only exist in working languages; anything else cannot match
    let language = match query.language {
        Some(language) if languages.contains(&language) => language,
        Some(_) => return StatusCode::NOT_FOUND.into_response(),
        None => state.backend_locale.default_language().to_string(),
    };

    match state.pages.get_one(id, revision_id, &language).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error(&state, &format!("{:#}", e)),
    }
}

fn internal_error(state: &AppState, message: &str) -> Response {
    error!("Request failed: {}", message);
    let body = if state.config.debug {
        message.to_string()
    } else {
        GENERIC_ERROR_MESSAGE.to_string()
    };
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}
