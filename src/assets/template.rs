//! Locale substitution for proxied scripts.
//!
//! Scripts reference translations with the same markers the accessor uses for
//! missing keys (`{$lblSave}`, `{$msgSaved|ucfirst}`), plus the two language
//! variables `{$INTERFACE_LANGUAGE}` and `{$WORKING_LANGUAGE}`. Substituted
//! values are slash-escaped so they can sit inside JavaScript string literals.

use crate::locale::{Locale, LocaleType};
use regex::{Captures, Regex};
use std::sync::OnceLock;

pub struct ScriptContext<'a> {
    pub locale: &'a Locale,
    pub module: &'a str,
    pub interface_language: &'a str,
    pub working_language: &'a str,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\$(?:(act|err|lbl|msg)(\w+)((?:\|[a-z]+)*)|(INTERFACE_LANGUAGE|WORKING_LANGUAGE))\}")
            .unwrap()
    })
}

/// Replace every known placeholder in `source`.
///
/// Untranslated keys are left as they are, so they stay visible in the output.
pub fn render(source: &str, ctx: &ScriptContext<'_>) -> String {
    placeholder_regex()
        .replace_all(source, |caps: &Captures<'_>| {
            if let Some(variable) = caps.get(4) {
                let value = match variable.as_str() {
                    "INTERFACE_LANGUAGE" => ctx.interface_language,
                    _ => ctx.working_language,
                };
                return add_slashes(value);
            }

            let kind: LocaleType = match caps[1].parse() {
                Ok(kind) => kind,
                Err(_) => return caps[0].to_string(),
            };
            match ctx.locale.lookup(kind, Some(ctx.module), &caps[2]) {
                Some(value) => {
                    let modified = caps
                        .get(3)
                        .map(|m| m.as_str())
                        .unwrap_or("")
                        .split('|')
                        .filter(|m| !m.is_empty())
                        .fold(value.to_string(), |acc, modifier| apply_modifier(&acc, modifier));
                    add_slashes(&modified)
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn apply_modifier(value: &str, modifier: &str) -> String {
    match modifier {
        "ucfirst" => {
            let mut chars = value.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        "lowercase" => value.to_lowercase(),
        "uppercase" => value.to_uppercase(),
        // Unknown modifiers leave the value untouched
        _ => value.to_string(),
    }
}

/// Backslash-escape quotes, backslashes and NUL bytes.
pub fn add_slashes(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\'' | '"' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            '\0' => result.push_str("\\0"),
            _ => result.push(c),
        }
    }
    result
}
