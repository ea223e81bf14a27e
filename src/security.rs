use crate::config::Config;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys and other sensitive values
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Whoever is making a backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Editor {
        interface_language: Option<String>,
        modules: Vec<String>,
    },
}

impl Viewer {
    /// Resolve the viewer from a `Authorization: Bearer <key>` header.
    pub fn from_headers(headers: &HeaderMap, config: &Config) -> Self {
        let Some(expected) = config.api_key.as_deref() else {
            return Viewer::Anonymous;
        };

        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token);

        match presented {
            Some(token) if constant_time_compare(token, expected) => Viewer::Editor {
                interface_language: config.editor_interface_language.clone(),
                modules: config.editor_modules.clone(),
            },
            _ => Viewer::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Editor { .. })
    }

    /// `core` holds shared code and is always allowed.
    pub fn is_allowed_module(&self, module: &str) -> bool {
        if is_core_module(module) {
            return true;
        }
        match self {
            Viewer::Anonymous => false,
            Viewer::Editor { modules, .. } => modules
                .iter()
                .any(|m| m == "*" || m.eq_ignore_ascii_case(module)),
        }
    }

    /// Stored interface language preference, if any.
    pub fn interface_language(&self) -> Option<&str> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Editor {
                interface_language, ..
            } => interface_language.as_deref(),
        }
    }
}

pub fn is_core_module(module: &str) -> bool {
    module.eq_ignore_ascii_case("core")
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}
