//! Script proxy for backend modules.
//!
//! `GET /backend/js?module=Pages&file=pages.js&language=nl` serves a module
//! script with its locale placeholders filled in for the viewer's interface
//! language.

mod path;
mod template;

pub use path::{resolve_script, script_dir};
pub use template::{add_slashes, render, ScriptContext};

use crate::locale::LocaleError;
use crate::security::Viewer;
use crate::server::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript";

/// Body sent instead of error details when debug mode is off.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong.";

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Invalid file.")]
    InvalidFile,

    #[error("File not present.")]
    NotFound,

    #[error("Module not allowed.")]
    Forbidden,

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Locale(#[from] LocaleError),
}

impl AssetError {
    pub fn status(&self) -> StatusCode {
        match self {
            AssetError::InvalidFile => StatusCode::BAD_REQUEST,
            AssetError::NotFound => StatusCode::NOT_FOUND,
            AssetError::Forbidden => StatusCode::FORBIDDEN,
            AssetError::Read { .. } | AssetError::Locale(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An [`AssetError`] paired with the debug flag that decides how much of it
/// reaches the client.
pub struct AssetFailure {
    pub error: AssetError,
    pub debug: bool,
}

impl IntoResponse for AssetFailure {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if matches!(self.error, AssetError::Forbidden) {
            return status.into_response();
        }
        let body = if self.debug {
            self.error.to_string()
        } else {
            GENERIC_ERROR_MESSAGE.to_string()
        };
        (status, body).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScriptQuery {
    pub module: Option<String>,
    pub file: Option<String>,
    pub language: Option<String>,
}

pub async fn serve_script(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ScriptQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            warn!("Refused script request: {}", rejection);
            return AssetFailure {
                error: AssetError::InvalidFile,
                debug: state.config.debug,
            }
            .into_response();
        }
    };

    match render_script(&state, &headers, &query).await {
        Ok(body) => ([(header::CONTENT_TYPE, JAVASCRIPT_CONTENT_TYPE)], body).into_response(),
        Err(error) => {
            warn!(
                "Refused script {:?}/{:?}: {}",
                query.module, query.file, error
            );
            AssetFailure {
                error,
                debug: state.config.debug,
            }
            .into_response()
        }
    }
}

async fn render_script(
    state: &AppState,
    headers: &HeaderMap,
    query: &ScriptQuery,
) -> Result<String, AssetError> {
    let module = query.module.as_deref().unwrap_or("");
    let file = query.file.as_deref().unwrap_or("");

    let base = script_dir(&state.config, module)?;
    let path = resolve_script(&base, file).await?;

    let viewer = Viewer::from_headers(headers, &state.config);
    if !viewer.is_allowed_module(module) {
        return Err(AssetError::Forbidden);
    }

    let locales = &state.backend_locale;
    let interface_language = match viewer.interface_language() {
        Some(language) => language.to_string(),
        None => locales.default_interface_language().await?,
    };
    let locale = locales.set_locale(Some(&interface_language)).await?;
    let working_language = locales.working_language(query.language.as_deref()).await?;

    let source = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| AssetError::Read {
            path: path.clone(),
            source,
        })?;

    debug!(
        "Serving {} for {} (interface {}, working {})",
        path.display(),
        module,
        interface_language,
        working_language
    );

    Ok(render(
        &source,
        &ScriptContext {
            locale: &locale,
            module,
            interface_language: &interface_language,
            working_language: &working_language,
        },
    ))
}
