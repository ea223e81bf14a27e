//! Locale kinds and applications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The enumerated `type` domain of the locale table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LocaleType {
    #[serde(rename = "act")]
    Action,
    #[serde(rename = "err")]
    Error,
    #[serde(rename = "lbl")]
    Label,
    #[serde(rename = "msg")]
    Message,
}

impl LocaleType {
    /// Declaration order of the type domain.
    pub const ALL: [LocaleType; 4] = [
        LocaleType::Action,
        LocaleType::Error,
        LocaleType::Label,
        LocaleType::Message,
    ];

    /// Short code used in storage and in placeholders (e.g. "lbl").
    pub fn code(&self) -> &'static str {
        match self {
            LocaleType::Action => "act",
            LocaleType::Error => "err",
            LocaleType::Label => "lbl",
            LocaleType::Message => "msg",
        }
    }

    /// Marker shown instead of a missing translation: `{$lblSave}`.
    pub fn placeholder(&self, key: &str) -> String {
        format!("{{${}{}}}", self.code(), key)
    }
}

impl FromStr for LocaleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocaleType::ALL
            .into_iter()
            .find(|kind| kind.code() == s)
            .ok_or_else(|| format!("Unknown locale type: '{}'", s))
    }
}

impl fmt::Display for LocaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The application a locale belongs to.
///
/// Only the backend keeps translations partitioned per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Application {
    Backend,
    Frontend,
}

impl Application {
    pub fn as_str(&self) -> &'static str {
        match self {
            Application::Backend => "backend",
            Application::Frontend => "frontend",
        }
    }

    pub fn is_modular(&self) -> bool {
        matches!(self, Application::Backend)
    }
}

impl FromStr for Application {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backend" => Ok(Application::Backend),
            "frontend" => Ok(Application::Frontend),
            _ => Err(format!("Unknown application: '{}'", s)),
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
