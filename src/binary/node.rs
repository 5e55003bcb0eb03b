use crate::binary::attrs::AttrParser;
use crate::binary::jid::Jid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An attribute value. Timestamps travel as `Int` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeValue {
    String(String),
    Int(i64),
    Bytes(Vec<u8>),
    Jid(Jid),
}

impl Default for NodeValue {
    fn default() -> Self {
        NodeValue::String(String::new())
    }
}

impl NodeValue {
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value the way it would appear as a string attribute on the wire.
    pub fn to_string_value(&self) -> String {
        match self {
            NodeValue::String(s) => s.clone(),
            NodeValue::Int(i) => i.to_string(),
            NodeValue::Bytes(b) => hex::encode(b),
            NodeValue::Jid(j) => j.to_string(),
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

impl PartialEq<str> for NodeValue {
    fn eq(&self, other: &str) -> bool {
        match self {
            NodeValue::String(s) => s == other,
            _ => self.to_string_value() == other,
        }
    }
}

impl PartialEq<&str> for NodeValue {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl From<String> for NodeValue {
    fn from(s: String) -> Self {
        NodeValue::String(s)
    }
}

impl From<&str> for NodeValue {
    fn from(s: &str) -> Self {
        NodeValue::String(s.to_string())
    }
}

impl From<i64> for NodeValue {
    fn from(i: i64) -> Self {
        NodeValue::Int(i)
    }
}

impl From<Vec<u8>> for NodeValue {
    fn from(b: Vec<u8>) -> Self {
        NodeValue::Bytes(b)
    }
}

impl From<Jid> for NodeValue {
    fn from(jid: Jid) -> Self {
        NodeValue::Jid(jid)
    }
}

/// Node attributes in insertion order.
/// Linear search is fine for the handful of attributes a node carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attrs(pub Vec<(String, NodeValue)>);

impl Attrs {
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&NodeValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<NodeValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(pos) = self.0.iter().position(|(k, _)| *k == key) {
            self.0[pos].1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<NodeValue> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeValue)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

impl<K: Into<String>, V: Into<NodeValue>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attrs::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeContent {
    Bytes(Vec<u8>),
    String(String),
    Nodes(Vec<Node>),
}

/// One unit of the wire protocol: a tag, attributes and optional content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub content: Option<NodeContent>,
}

impl Node {
    pub fn new(tag: &str, attrs: Attrs, content: Option<NodeContent>) -> Self {
        Self {
            tag: tag.to_string(),
            attrs,
            content,
        }
    }

    pub fn attrs(&self) -> AttrParser<'_> {
        AttrParser::new(self)
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.content {
            Some(NodeContent::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn get_optional_child(&self, tag: &str) -> Option<&Node> {
        self.children()
            .and_then(|nodes| nodes.iter().find(|node| node.tag == tag))
    }

    /// Follows a path of child tags, e.g. `&["keys", "skey"]`.
    pub fn get_optional_child_by_tag<'a>(&'a self, tags: &[&str]) -> Option<&'a Node> {
        let mut current = self;
        for tag in tags {
            current = current.get_optional_child(tag)?;
        }
        Some(current)
    }

    pub fn get_children_by_tag(&self, tag: &str) -> Vec<&Node> {
        self.children()
            .map(|nodes| nodes.iter().filter(|c| c.tag == tag).collect())
            .unwrap_or_default()
    }

    /// Raw payload, if the content is binary or a string.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            Some(NodeContent::Bytes(b)) => Some(b),
            Some(NodeContent::String(s)) => Some(s.as_bytes()),
            _ => None,
        }
    }
}
