//! `.properties` files.
//!
//! The format is line based. Blank lines and lines whose first non-blank
//! character is `#` or `!` are ignored. A key ends at the first unescaped
//! `=`, `:` or blank; the separator and surrounding blanks are dropped and the
//! rest of the line is the value. A line ending in an odd number of
//! backslashes continues on the next line, whose leading blanks are skipped.
//! Keys and values understand the `\t`, `\n`, `\r`, `\f` and `\uXXXX` escapes;
//! any other escaped character stands for itself.

use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use trellis_core::ConfigSource;

const BLANKS: [char; 3] = [' ', '\t', '\x0c'];

/// Parsed key/value pairs. Later duplicates of a key overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text.
    pub fn parse(input: &str) -> Result<Self> {
        let mut properties = Self::new();
        let mut lines = input.lines().enumerate();

        while let Some((index, line)) = lines.next() {
            let first = line.trim_start_matches(BLANKS);
            if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
                continue;
            }

            let line_number = index + 1;
            let mut logical = String::new();
            let mut current = first;
            loop {
                if !continues(current) {
                    logical.push_str(current);
                    break;
                }
                logical.push_str(&current[..current.len() - 1]);
                match lines.next() {
                    Some((_, next)) => current = next.trim_start_matches(BLANKS),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical);
            properties.entries.insert(
                unescape(key, line_number)?,
                unescape(value, line_number)?,
            );
        }

        Ok(properties)
    }

    /// Read and parse a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Overwrite entries with those of `other`.
    pub fn merge(&mut self, other: Properties) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for Properties {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl ConfigSource for Properties {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start_matches(BLANKS)),
            ' ' | '\t' | '\x0c' => {
                let rest = line[i..].trim_start_matches(BLANKS);
                let rest = rest.strip_prefix(['=', ':']).unwrap_or(rest);
                return (&line[..i], rest.trim_start_matches(BLANKS));
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str, line: usize) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let unit = read_unit(&mut chars, line)?;
                let mut units = vec![unit];
                // surrogate pairs arrive as two consecutive escapes
                if (0xD800..0xDC00).contains(&unit) {
                    let mut lookahead = chars.clone();
                    if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
                        chars = lookahead;
                        units.push(read_unit(&mut chars, line)?);
                    }
                }
                for decoded in char::decode_utf16(units) {
                    out.push(decoded.map_err(|e| ConfigError::ParseError {
                        line,
                        message: e.to_string(),
                    })?);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

fn read_unit(chars: &mut impl Iterator<Item = char>, line: usize) -> Result<u16> {
    let hex: String = chars.take(4).collect();
    if hex.len() == 4 {
        if let Ok(unit) = u16::from_str_radix(&hex, 16) {
            return Ok(unit);
        }
    }
    Err(ConfigError::ParseError {
        line,
        message: format!("Malformed \\uXXXX escape: \\u{}", hex),
    })
}
