//! Dotted field paths into JSON documents
//!
//! Segments are separated by `.`; numeric segments index arrays and the
//! `@reverse` segment flips the current array, so
//! `messages.@reverse.0.content` selects the content of the last message.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::domain::DomainError;

const REVERSE: &str = "@reverse";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Reverse,
}

/// Parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parses a dotted path
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::validation("Field path cannot be empty"));
        }

        let segments = raw
            .split('.')
            .map(|part| match part {
                "" => Err(DomainError::validation(format!(
                    "Field path '{}' contains an empty segment",
                    raw
                ))),
                REVERSE => Ok(Segment::Reverse),
                _ => Ok(part
                    .parse::<usize>()
                    .map(Segment::Index)
                    .unwrap_or_else(|_| Segment::Key(part.to_string()))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the path as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolves the path against `root`
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<Cow<'a, Value>> {
        let mut current = root;
        let mut reversed = false;

        for segment in &self.segments {
            match segment {
                Segment::Reverse => {
                    if current.is_array() {
                        reversed = !reversed;
                    }
                }
                Segment::Index(index) => {
                    current = match current {
                        Value::Array(items) => {
                            let position = if reversed {
                                items.len().checked_sub(index + 1)?
                            } else {
                                *index
                            };
                            items.get(position)?
                        }
                        Value::Object(map) => map.get(&index.to_string())?,
                        _ => return None,
                    };
                    reversed = false;
                }
                Segment::Key(key) => {
                    current = current.as_object()?.get(key)?;
                    reversed = false;
                }
            }
        }

        match current {
            Value::Array(items) if reversed => {
                Some(Cow::Owned(Value::Array(items.iter().rev().cloned().collect())))
            }
            _ => Some(Cow::Borrowed(current)),
        }
    }

    /// Whether the path resolves to a non-null value
    pub fn is_present(&self, root: &Value) -> bool {
        self.lookup(root).is_some_and(|value| !value.is_null())
    }

    /// Resolves the path as plain text
    ///
    /// Strings are returned unescaped; other values as their JSON text.
    /// Null and missing values yield `None`.
    pub fn extract_text(&self, root: &Value) -> Option<String> {
        match self.lookup(root)?.as_ref() {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Resolves the path as raw JSON text with surrounding quotes trimmed
    ///
    /// Strings keep their JSON escapes so the result can be spliced back
    /// into a JSON string literal verbatim.
    pub fn extract_raw(&self, root: &Value) -> Option<String> {
        match self.lookup(root)?.as_ref() {
            Value::Null => None,
            Value::String(text) => {
                let encoded = serde_json::to_string(text).ok()?;
                Some(encoded[1..encoded.len() - 1].to_string())
            }
            other => Some(other.to_string()),
        }
    }
}

impl FromStr for FieldPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
