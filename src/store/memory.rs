use crate::binary::Jid;
use crate::store::traits::{CredentialStore, PreKey, PreKeyUpload, SignedPreKey};
use async_trait::async_trait;
use rand::RngCore;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug)]
struct KeyState {
    registration_id: u32,
    identity_key: [u8; 32],
    signed_pre_key: SignedPreKey,
    pre_keys: Vec<PreKey>,
    uploaded_up_to: u32,
    next_pre_key_id: u32,
}

impl KeyState {
    fn generate() -> Self {
        let mut rng = rand::rng();
        let mut identity_key = [0u8; 32];
        let mut spk_public = [0u8; 32];
        let mut spk_signature = [0u8; 64];
        rng.fill_bytes(&mut identity_key);
        rng.fill_bytes(&mut spk_public);
        rng.fill_bytes(&mut spk_signature);

        Self {
            registration_id: rng.next_u32() & 0x3fff,
            identity_key,
            signed_pre_key: SignedPreKey {
                id: 1,
                public_key: spk_public,
                signature: spk_signature,
            },
            pre_keys: Vec::new(),
            uploaded_up_to: 0,
            next_pre_key_id: 1,
        }
    }
}

/// Volatile [`CredentialStore`] with random key material.
///
/// Useful for tests and throwaway sessions; nothing survives the process.
#[derive(Debug)]
pub struct MemoryStore {
    jid: Mutex<Option<Jid>>,
    deletions: AtomicUsize,
    state: Mutex<KeyState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jid: Mutex::new(None),
            deletions: AtomicUsize::new(0),
            state: Mutex::new(KeyState::generate()),
        }
    }

    /// A store that behaves as if pairing already happened.
    pub fn paired(jid: Jid) -> Self {
        let mut store = Self::new();
        *store.jid.get_mut() = Some(jid);
        store
    }

    /// How many times [`CredentialStore::delete`] ran.
    pub fn deletion_count(&self) -> usize {
        self.deletions.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn jid(&self) -> Option<Jid> {
        self.jid.lock().await.clone()
    }

    async fn uploaded_pre_key_count(&self) -> Result<u32, anyhow::Error> {
        let state = self.state.lock().await;
        Ok(state
            .pre_keys
            .iter()
            .filter(|k| k.id <= state.uploaded_up_to)
            .count() as u32)
    }

    async fn next_pre_keys(&self, count: u32) -> Result<PreKeyUpload, anyhow::Error> {
        let mut state = self.state.lock().await;
        let uploaded_up_to = state.uploaded_up_to;
        let pending = state
            .pre_keys
            .iter()
            .filter(|k| k.id > uploaded_up_to)
            .count() as u32;

        let mut rng = rand::rng();
        for _ in pending..count {
            let mut public_key = [0u8; 32];
            rng.fill_bytes(&mut public_key);
            let id = state.next_pre_key_id;
            state.next_pre_key_id += 1;
            state.pre_keys.push(PreKey { id, public_key });
        }

        Ok(PreKeyUpload {
            registration_id: state.registration_id,
            identity_key: state.identity_key,
            signed_pre_key: state.signed_pre_key.clone(),
            pre_keys: state
                .pre_keys
                .iter()
                .filter(|k| k.id > uploaded_up_to)
                .take(count as usize)
                .cloned()
                .collect(),
        })
    }

    async fn mark_pre_keys_uploaded(&self, last_id: u32) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock().await;
        if last_id >= state.next_pre_key_id {
            anyhow::bail!("pre-key {last_id} was never generated");
        }
        state.uploaded_up_to = state.uploaded_up_to.max(last_id);
        Ok(())
    }

    async fn delete(&self) -> Result<(), anyhow::Error> {
        self.deletions.fetch_add(1, Ordering::SeqCst);
        *self.jid.lock().await = None;
        *self.state.lock().await = KeyState::generate();
        Ok(())
    }
}
