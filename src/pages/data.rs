//! Decoder for the opaque `data` column of pages.
//!
//! Older revisions hold PHP `serialize()` payloads (`a:1:{s:4:"link";…}`),
//! newer ones hold JSON. Both decode into a [`serde_json::Value`]; arrays with
//! keys `0..n` in order become JSON arrays, every other array becomes an
//! object with stringified keys.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("unexpected end of serialized data at byte {0}")]
    UnexpectedEnd(usize),

    #[error("unexpected {found:?} at byte {offset}, expected {expected}")]
    Unexpected {
        offset: usize,
        found: char,
        expected: &'static str,
    },

    #[error("unsupported serialized type {tag:?} at byte {offset}")]
    Unsupported { tag: char, offset: usize },

    #[error("invalid number at byte {0}")]
    InvalidNumber(usize),

    #[error("trailing data at byte {0}")]
    Trailing(usize),

    #[error("invalid UTF-8 in string at byte {0}")]
    InvalidUtf8(usize),

    #[error("arrays nested deeper than {max} levels at byte {offset}")]
    TooDeep { offset: usize, max: usize },

    #[error("invalid JSON data: {0}")]
    Json(String),
}

/// Deepest array nesting accepted in serialized data. Decoding recurses per
/// level, so this bounds stack use.
pub const MAX_DEPTH: usize = 256;

/// Decode a stored `data` value. An empty string decodes to `null`.
pub fn decode_data(raw: &str) -> Result<Value, DataError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| DataError::Json(e.to_string()));
    }

    let mut parser = Parser {
        input: trimmed.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    if parser.pos != parser.input.len() {
        return Err(DataError::Trailing(parser.pos));
    }
    Ok(value)
}

enum Key {
    Int(i64),
    Str(String),
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn value(&mut self) -> Result<Value, DataError> {
        let offset = self.pos;
        match self.next()? {
            b'N' => {
                self.expect(b';', "';'")?;
                Ok(Value::Null)
            }
            b'b' => {
                self.expect(b':', "':'")?;
                Ok(Value::Bool(self.integer(b';')? != 0))
            }
            b'i' => {
                self.expect(b':', "':'")?;
                Ok(Value::Number(self.integer(b';')?.into()))
            }
            b'd' => {
                self.expect(b':', "':'")?;
                let start = self.pos;
                let text = self.until(b';')?;
                let number: f64 = text.parse().map_err(|_| DataError::InvalidNumber(start))?;
                // INF and NAN have no JSON representation
                Ok(Number::from_f64(number).map_or(Value::Null, Value::Number))
            }
            b's' => {
                self.expect(b':', "':'")?;
                Ok(Value::String(self.string()?))
            }
            b'a' => {
                if self.depth >= MAX_DEPTH {
                    return Err(DataError::TooDeep {
                        offset,
                        max: MAX_DEPTH,
                    });
                }
                self.expect(b':', "':'")?;
                self.depth += 1;
                let array = self.array();
                self.depth -= 1;
                array
            }
            other => Err(DataError::Unsupported {
                tag: other as char,
                offset,
            }),
        }
    }

    fn array(&mut self) -> Result<Value, DataError> {
        let count = self.length(b':')?;
        self.expect(b'{', "'{'")?;

        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.key()?;
            let value = self.value()?;
            entries.push((key, value));
        }
        self.expect(b'}', "'}'")?;

        let sequential = entries
            .iter()
            .enumerate()
            .all(|(i, (key, _))| matches!(key, Key::Int(k) if *k == i as i64));

        if sequential {
            Ok(Value::Array(entries.into_iter().map(|(_, v)| v).collect()))
        } else {
            let mut map = Map::new();
            for (key, value) in entries {
                let key = match key {
                    Key::Int(k) => k.to_string(),
                    Key::Str(s) => s,
                };
                map.insert(key, value);
            }
            Ok(Value::Object(map))
        }
    }

    fn key(&mut self) -> Result<Key, DataError> {
        let offset = self.pos;
        match self.next()? {
            b'i' => {
                self.expect(b':', "':'")?;
                Ok(Key::Int(self.integer(b';')?))
            }
            b's' => {
                self.expect(b':', "':'")?;
                Ok(Key::Str(self.string()?))
            }
            other => Err(DataError::Unexpected {
                offset,
                found: other as char,
                expected: "an integer or string key",
            }),
        }
    }

    /// `<len>:"<bytes>";` where the length counts bytes, not characters.
    fn string(&mut self) -> Result<String, DataError> {
        let len = self.length(b':')?;
        self.expect(b'"', "'\"'")?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or(DataError::UnexpectedEnd(self.input.len()))?;
        let start = self.pos;
        let text = std::str::from_utf8(&self.input[start..end])
            .map_err(|_| DataError::InvalidUtf8(start))?;
        self.pos = end;
        self.expect(b'"', "'\"'")?;
        self.expect(b';', "';'")?;
        Ok(text.to_string())
    }

    fn integer(&mut self, terminator: u8) -> Result<i64, DataError> {
        let start = self.pos;
        self.until(terminator)?
            .parse()
            .map_err(|_| DataError::InvalidNumber(start))
    }

    fn length(&mut self, terminator: u8) -> Result<usize, DataError> {
        let start = self.pos;
        self.until(terminator)?
            .parse()
            .map_err(|_| DataError::InvalidNumber(start))
    }

    /// Text up to (not including) `terminator`, which is consumed.
    fn until(&mut self, terminator: u8) -> Result<&'a str, DataError> {
        let start = self.pos;
        let offset = self.input[start..]
            .iter()
            .position(|b| *b == terminator)
            .ok_or(DataError::UnexpectedEnd(self.input.len()))?;
        self.pos = start + offset + 1;
        std::str::from_utf8(&self.input[start..start + offset])
            .map_err(|_| DataError::InvalidNumber(start))
    }

    fn next(&mut self) -> Result<u8, DataError> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or(DataError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, wanted: u8, expected: &'static str) -> Result<(), DataError> {
        let offset = self.pos;
        let found = self.next()?;
        if found == wanted {
            Ok(())
        } else {
            Err(DataError::Unexpected {
                offset,
                found: found as char,
                expected,
            })
        }
    }
}
