use crate::binary::{BinaryError, Node};

/// Converts between decrypted frame payloads and [`Node`] trees.
///
/// The binary dictionary codec lives outside this crate; the client only
/// needs these two stateless operations.
pub trait NodeCodec: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<Node, BinaryError>;

    fn encode(&self, node: &Node) -> Result<Vec<u8>, BinaryError>;
}

/// Codec that carries nodes as JSON. Handy for loopback channels and tests,
/// never spoken by a real server.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonNodeCodec;

impl NodeCodec for JsonNodeCodec {
    fn decode(&self, data: &[u8]) -> Result<Node, BinaryError> {
        if data.is_empty() {
            return Err(BinaryError::EmptyData);
        }
        serde_json::from_slice(data).map_err(|e| BinaryError::InvalidNode(e.to_string()))
    }

    fn encode(&self, node: &Node) -> Result<Vec<u8>, BinaryError> {
        serde_json::to_vec(node).map_err(|e| BinaryError::InvalidNode(e.to_string()))
    }
}
