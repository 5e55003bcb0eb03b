use crate::binary::Jid;
use async_trait::async_trait;

/// A one-time pre-key as uploaded to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKey {
    pub id: u32,
    pub public_key: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPreKey {
    pub id: u32,
    pub public_key: [u8; 32],
    pub signature: [u8; 64],
}

/// Everything the server needs to publish a fresh batch of pre-keys.
#[derive(Debug, Clone)]
pub struct PreKeyUpload {
    pub registration_id: u32,
    pub identity_key: [u8; 32],
    pub signed_pre_key: SignedPreKey,
    pub pre_keys: Vec<PreKey>,
}

/// The long-term credential store of the linked device.
///
/// Key generation and the on-disk format belong to the implementation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The JID of this linked device, present once pairing completed.
    async fn jid(&self) -> Option<Jid>;

    /// True once the device has been paired and holds an identity.
    async fn is_registered(&self) -> bool {
        self.jid().await.is_some()
    }

    /// Number of generated pre-keys that have already been uploaded.
    async fn uploaded_pre_key_count(&self) -> Result<u32, anyhow::Error>;

    /// Produces `count` not-yet-uploaded pre-keys, generating them if needed.
    async fn next_pre_keys(&self, count: u32) -> Result<PreKeyUpload, anyhow::Error>;

    /// Marks every pre-key up to and including `last_id` as uploaded.
    async fn mark_pre_keys_uploaded(&self, last_id: u32) -> Result<(), anyhow::Error>;

    /// Wipes the identity and all session data.
    async fn delete(&self) -> Result<(), anyhow::Error>;
}
