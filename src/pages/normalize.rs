//! Reshaping of raw page rows into flat snake-case records.

use crate::pages::data::{decode_data, DataError};
use crate::pages::model::{
    is_forbidden_to_delete, is_forbidden_to_have_children, is_forbidden_to_move, PageRecord,
};
use serde_json::{Map, Number, Value};

/// Prefix carried by every column selected from the page table.
pub const PAGE_PREFIX: &str = "p_";

/// A column value as it came out of the database.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Columns in select order.
pub type RawRow = Vec<(String, RawValue)>;

/// Split an identifier into words at case transitions.
///
/// A word is either an uppercase run (letters and digits) that ends where the
/// identifier ends or where a capitalized word starts (`XML` in `someFieldXML`,
/// `XML` in `XMLParser`), or a letter followed by lowercase letters and digits
/// (`some`, `Field`, `page2`). Characters that cannot start a word are
/// skipped: leading digits, underscores, non-ASCII characters, and a lone
/// lowercase letter.
pub fn split_words(ident: &str) -> Vec<&str> {
    let bytes = ident.as_bytes();
    let mut words = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match acronym_end(bytes, i).or_else(|| word_end(bytes, i)) {
            Some(end) => {
                words.push(&ident[i..end]);
                i = end;
            }
            None => i += 1,
        }
    }

    words
}

fn is_lower_or_digit(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn acronym_end(bytes: &[u8], start: usize) -> Option<usize> {
    if !bytes[start].is_ascii_uppercase() {
        return None;
    }

    let mut max = start + 1;
    while max < bytes.len() && (bytes[max].is_ascii_uppercase() || bytes[max].is_ascii_digit()) {
        max += 1;
    }

    // Longest run that is followed by the end or by a capitalized word
    (start + 1..=max).rev().find(|&end| {
        end == bytes.len()
            || (bytes[end].is_ascii_uppercase()
                && end + 1 < bytes.len()
                && is_lower_or_digit(bytes[end + 1]))
    })
}

fn word_end(bytes: &[u8], start: usize) -> Option<usize> {
    if !bytes[start].is_ascii_alphabetic()
        || start + 1 >= bytes.len()
        || !is_lower_or_digit(bytes[start + 1])
    {
        return None;
    }

    let mut end = start + 2;
    while end < bytes.len() && is_lower_or_digit(bytes[end]) {
        end += 1;
    }
    Some(end)
}

/// `someFieldXML` → `some_field_xml`
pub fn snake_case(ident: &str) -> String {
    split_words(ident)
        .iter()
        .map(|word| word.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalized name of a result column: page columns lose their prefix and
/// are snake-cased, derived columns are kept as they are.
pub fn normalize_column(column: &str) -> String {
    match column.strip_prefix(PAGE_PREFIX) {
        Some(field) => snake_case(field),
        None => column.to_string(),
    }
}

/// Truthiness of a normalized value: `"0"`, `""`, `0`, `false` and `null`
/// are false.
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !(s.is_empty() || s == "0"),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn convert(value: RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::String(if b { "1" } else { "0" }.to_string()),
        RawValue::Int(i) => Value::Number(i.into()),
        RawValue::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        RawValue::Text(s) => Value::String(s),
    }
}

fn record_id(fields: &Map<String, Value>) -> Option<i64> {
    match fields.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Turn a raw page row into a [`PageRecord`].
///
/// Columns are applied in order, so a later column wins when two normalize to
/// the same name. The `*_allowed` copies reflect the stored flags; the static
/// page rules are applied to the `allow_*` fields afterwards.
pub fn normalize_row(row: RawRow) -> Result<PageRecord, DataError> {
    let mut fields = Map::new();
    for (column, value) in row {
        fields.insert(normalize_column(&column), convert(value));
    }

    for (stored, copy) in [
        ("allow_move", "move_allowed"),
        ("allow_children", "children_allowed"),
        ("allow_delete", "delete_allowed"),
    ] {
        let allowed = flag(fields.get(stored));
        fields.insert(copy.to_string(), Value::Bool(allowed));
    }

    if let Some(id) = record_id(&fields) {
        if is_forbidden_to_delete(id) {
            fields.insert("allow_delete".to_string(), Value::Bool(false));
        }
        if is_forbidden_to_move(id) {
            fields.insert("allow_move".to_string(), Value::Bool(false));
        }
        if is_forbidden_to_have_children(id) {
            fields.insert("allow_children".to_string(), Value::Bool(false));
        }
    }

    let edit_allowed = flag(fields.get("allow_edit"));
    fields.insert("edit_allowed".to_string(), Value::Bool(edit_allowed));
    let has_extra = flag(fields.get("has_extra"));
    fields.insert("has_extra".to_string(), Value::Bool(has_extra));

    if let Some(Value::String(raw)) = fields.get("data") {
        let decoded = decode_data(raw)?;
        fields.insert("data".to_string(), decoded);
    }

    Ok(PageRecord::from_fields(fields))
}
