use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::pages::normalize::flag;

pub const HOME_PAGE_ID: i64 = 1;
pub const ERROR_PAGE_ID: i64 = 404;

const FORBIDDEN_TO_DELETE: [i64; 2] = [HOME_PAGE_ID, ERROR_PAGE_ID];
const FORBIDDEN_TO_MOVE: [i64; 2] = [HOME_PAGE_ID, ERROR_PAGE_ID];
const FORBIDDEN_TO_HAVE_CHILDREN: [i64; 1] = [ERROR_PAGE_ID];

pub fn is_forbidden_to_delete(id: i64) -> bool {
    FORBIDDEN_TO_DELETE.contains(&id)
}

pub fn is_forbidden_to_move(id: i64) -> bool {
    FORBIDDEN_TO_MOVE.contains(&id)
}

pub fn is_forbidden_to_have_children(id: i64) -> bool {
    FORBIDDEN_TO_HAVE_CHILDREN.contains(&id)
}

/// A normalized page revision: snake-case field names mapped to values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PageRecord {
    fields: Map<String, Value>,
}

impl PageRecord {
    pub(crate) fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn integer(&self, field: &str) -> Option<i64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.integer("id")
    }

    pub fn revision_id(&self) -> Option<i64> {
        self.integer("revision_id")
    }

    pub fn language(&self) -> Option<&str> {
        self.fields.get("language").and_then(Value::as_str)
    }

    /// Decoded `data` blob, `None` when the page has none.
    pub fn data(&self) -> Option<&Value> {
        self.fields.get("data").filter(|v| !v.is_null())
    }

    pub fn allow_delete(&self) -> bool {
        flag(self.fields.get("allow_delete"))
    }

    pub fn allow_move(&self) -> bool {
        flag(self.fields.get("allow_move"))
    }

    pub fn allow_children(&self) -> bool {
        flag(self.fields.get("allow_children"))
    }

    pub fn has_extra(&self) -> bool {
        flag(self.fields.get("has_extra"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Active,
    Archive,
    Draft,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Active => "active",
            PageStatus::Archive => "archive",
            PageStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PageStatus::Active),
            "archive" => Ok(PageStatus::Archive),
            "draft" => Ok(PageStatus::Draft),
            other => Err(format!("Unknown page status: {}", other)),
        }
    }
}

/// A page revision to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: i64,
    pub user_id: i64,
    pub parent_id: i64,
    pub template_id: i64,
    pub meta_id: Option<i64>,
    pub language: String,
    pub page_type: String,
    pub title: String,
    pub navigation_title: String,
    pub navigation_title_overwrite: bool,
    pub hidden: bool,
    pub status: PageStatus,
    pub publish_on: NaiveDateTime,
    pub data: Option<Value>,
    pub allow_move: bool,
    pub allow_children: bool,
    pub allow_edit: bool,
    pub allow_delete: bool,
    pub sequence: i64,
}

impl Page {
    /// An active, visible page published now, with every action allowed.
    pub fn new(id: i64, language: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id,
            user_id: 0,
            parent_id: 0,
            template_id: 0,
            meta_id: None,
            language: language.into(),
            page_type: "page".to_string(),
            navigation_title: title.clone(),
            title,
            navigation_title_overwrite: false,
            hidden: false,
            status: PageStatus::Active,
            publish_on: Utc::now().naive_utc(),
            data: None,
            allow_move: true,
            allow_children: true,
            allow_edit: true,
            allow_delete: true,
            sequence: 0,
        }
    }
}
