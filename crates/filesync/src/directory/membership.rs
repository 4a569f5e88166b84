//! Decoding of serialized group membership lists
//!
//! Members store their groups as a PHP-serialized array
//! (`a:2:{i:0;s:1:"3";i:1;s:1:"5";}`). JSON arrays (`["3", 5]`) are accepted
//! as well. Either way only the array values matter.

use super::GroupId;
use crate::error::{FilesyncError, Result};
use std::collections::BTreeSet;

/// Decode a serialized membership list into a set of group ids.
///
/// Empty input and serialized `null` decode to the empty set.
pub fn decode_group_ids(raw: &str) -> Result<BTreeSet<GroupId>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "N;" {
        return Ok(BTreeSet::new());
    }
    let values = if trimmed.starts_with('[') {
        decode_json(trimmed)
    } else {
        PhpReader::new(trimmed).read_array()
    }
    .map_err(|message| FilesyncError::Membership {
        raw: raw.to_string(),
        message,
    })?;

    values
        .into_iter()
        .map(|value| {
            value.parse::<i64>().map(GroupId::new).map_err(|_| FilesyncError::Membership {
                raw: raw.to_string(),
                message: format!("'{}' is not a group id", value),
            })
        })
        .collect()
}

fn decode_json(raw: &str) -> std::result::Result<Vec<String>, String> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("unexpected value {}", other)),
        })
        .collect()
}

/// Reader for the subset of PHP's `serialize()` format used by membership lists:
/// one array with integer or string keys and integer or string values.
struct PhpReader<'a> {
    input: &'a str,
    pos: usize,
}

type ReadResult<T> = std::result::Result<T, String>;

impl<'a> PhpReader<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn read_array(mut self) -> ReadResult<Vec<String>> {
        self.expect("a:")?;
        let count = self.read_number(':')?;
        self.expect("{")?;
        // each pair takes at least 8 bytes, so a larger count cannot be honest
        let mut values = Vec::with_capacity(count.min(self.input.len() / 8));
        for _ in 0..count {
            self.read_scalar()?;
            values.push(self.read_scalar()?);
        }
        self.expect("}")?;
        if self.pos != self.input.len() {
            return Err(format!("trailing data at offset {}", self.pos));
        }
        Ok(values)
    }

    fn read_scalar(&mut self) -> ReadResult<String> {
        if self.eat("i:") {
            let end = self.find(';')?;
            let value = self.input[self.pos..end].to_string();
            value
                .parse::<i64>()
                .map_err(|_| format!("invalid integer '{}'", value))?;
            self.pos = end + 1;
            Ok(value)
        } else if self.eat("s:") {
            let len = self.read_number(':')?;
            self.expect("\"")?;
            let end = self
                .pos
                .checked_add(len)
                .ok_or_else(|| format!("string length {} overflows", len))?;
            let value = self
                .input
                .get(self.pos..end)
                .ok_or_else(|| format!("string of length {} runs past the end", len))?
                .to_string();
            self.pos = end;
            self.expect("\";")?;
            Ok(value)
        } else {
            Err(format!("unsupported value at offset {}", self.pos))
        }
    }

    fn read_number(&mut self, terminator: char) -> ReadResult<usize> {
        let end = self.find(terminator)?;
        let digits = &self.input[self.pos..end];
        let number = digits
            .parse::<usize>()
            .map_err(|_| format!("invalid length '{}'", digits))?;
        self.pos = end + 1;
        Ok(number)
    }

    fn find(&self, needle: char) -> ReadResult<usize> {
        self.input[self.pos..]
            .find(needle)
            .map(|offset| self.pos + offset)
            .ok_or_else(|| format!("expected '{}' after offset {}", needle, self.pos))
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.input[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> ReadResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", token, self.pos))
        }
    }
}
