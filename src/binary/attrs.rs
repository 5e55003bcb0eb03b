use crate::binary::error::{BinaryError, Result};
use crate::binary::jid::Jid;
use crate::binary::node::{Attrs, Node, NodeValue};
use chrono::{DateTime, Utc};
use std::borrow::Cow;

/// Collects attribute lookups and records every failure instead of bailing on the first.
pub struct AttrParser<'a> {
    attrs: &'a Attrs,
    pub errors: Vec<BinaryError>,
}

impl<'a> AttrParser<'a> {
    pub(crate) fn new(node: &'a Node) -> Self {
        Self {
            attrs: &node.attrs,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BinaryError::AttrList(self.errors))
        }
    }

    fn get_raw(&mut self, key: &str, require: bool) -> Option<&'a NodeValue> {
        let val = self.attrs.get(key);
        if require && val.is_none() {
            self.errors.push(BinaryError::AttrParse(format!(
                "Required attribute '{key}' not found"
            )));
        }
        val
    }

    pub fn optional_string(&mut self, key: &str) -> Option<Cow<'a, str>> {
        self.get_raw(key, false).map(|v| match v {
            NodeValue::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string_value()),
        })
    }

    pub fn string(&mut self, key: &str) -> String {
        self.get_raw(key, true);
        self.optional_string(key)
            .map(Cow::into_owned)
            .unwrap_or_default()
    }

    pub fn optional_jid(&mut self, key: &str) -> Option<Jid> {
        match self.get_raw(key, false)? {
            NodeValue::Jid(j) => Some(j.clone()),
            other => match other.to_string_value().parse::<Jid>() {
                Ok(jid) => Some(jid),
                Err(e) => {
                    self.errors.push(e.into());
                    None
                }
            },
        }
    }

    pub fn jid(&mut self, key: &str) -> Jid {
        self.get_raw(key, true);
        self.optional_jid(key).unwrap_or_default()
    }

    fn get_i64(&mut self, key: &str, require: bool) -> Option<i64> {
        match self.get_raw(key, require)? {
            NodeValue::Int(i) => Some(*i),
            other => {
                let s = other.to_string_value();
                match s.parse::<i64>() {
                    Ok(val) => Some(val),
                    Err(e) => {
                        self.errors.push(BinaryError::AttrParse(format!(
                            "Failed to parse i64 from '{s}' for key '{key}': {e}"
                        )));
                        None
                    }
                }
            }
        }
    }

    pub fn optional_i64(&mut self, key: &str) -> Option<i64> {
        self.get_i64(key, false)
    }

    pub fn optional_u64(&mut self, key: &str) -> Option<u64> {
        let val = self.get_i64(key, false)?;
        match u64::try_from(val) {
            Ok(v) => Some(v),
            Err(_) => {
                self.errors.push(BinaryError::AttrParse(format!(
                    "Negative value {val} for unsigned key '{key}'"
                )));
                None
            }
        }
    }

    pub fn optional_unix_time(&mut self, key: &str) -> Option<DateTime<Utc>> {
        self.get_i64(key, false)
            .and_then(|ts| if ts == 0 { None } else { DateTime::from_timestamp(ts, 0) })
    }

    pub fn optional_bool(&mut self, key: &str) -> bool {
        match self.optional_string(key) {
            Some(s) => s == "true" || s == "1",
            None => false,
        }
    }
}
