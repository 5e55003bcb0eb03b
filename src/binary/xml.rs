use crate::binary::node::{Node, NodeContent};
use std::fmt;

// Binary payloads longer than this are elided in logs.
const MAX_PRINTED_BYTES: usize = 64;

fn printable_str(data: &[u8]) -> Option<&str> {
    let s = std::str::from_utf8(data).ok()?;
    s.chars().all(|c| !c.is_control()).then_some(s)
}

fn fmt_node(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<{}", node.tag)?;

    let mut sorted: Vec<_> = node.attrs.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    for (k, v) in sorted {
        write!(f, " {k}=\"{v}\"")?;
    }

    match &node.content {
        None => write!(f, "/>"),
        Some(content) => {
            write!(f, ">")?;
            match content {
                NodeContent::Nodes(children) => {
                    for child in children {
                        fmt_node(child, f)?;
                    }
                }
                NodeContent::String(s) => write!(f, "{s}")?,
                NodeContent::Bytes(bytes) => match printable_str(bytes) {
                    Some(s) => write!(f, "{s}")?,
                    None if bytes.len() > MAX_PRINTED_BYTES => {
                        write!(f, "<!-- {} bytes -->", bytes.len())?
                    }
                    None => write!(f, "{}", hex::encode(bytes))?,
                },
            }
            write!(f, "</{}>", node.tag)
        }
    }
}

/// Compact XML-like rendering, used by the send/receive logs.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_node(self, f)
    }
}
