use crate::binary::jid::JidError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinaryError {
    #[error("Invalid node format: {0}")]
    InvalidNode(String),
    #[error("Attribute parsing failed: {0}")]
    AttrParse(String),
    #[error("Unexpected end of binary data")]
    UnexpectedEof,
    #[error("Received empty data where payload was expected")]
    EmptyData,
    #[error("JID parsing error: {0}")]
    Jid(#[from] JidError),
    #[error("Multiple attribute parsing errors: {0:?}")]
    AttrList(Vec<BinaryError>),
}

pub type Result<T> = std::result::Result<T, BinaryError>;
