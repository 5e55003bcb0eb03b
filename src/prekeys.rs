use crate::binary::{Node, NodeBuilder};
use crate::client::Client;
use crate::request::{InfoQuery, InfoQueryType};
use crate::store::{PreKey, PreKeyUpload};
use anyhow::{Context, anyhow};
use log::{debug, info};

/// Below this many keys on either side a fresh batch is uploaded.
pub const MIN_PRE_KEY_COUNT: u32 = 5;
pub const WANTED_PRE_KEY_COUNT: u32 = 50;

/// Signal key type marker for Curve25519 keys.
const DJB_KEY_TYPE: u8 = 5;

fn key_id_bytes(id: u32) -> Vec<u8> {
    id.to_be_bytes()[1..].to_vec()
}

fn pre_key_node(key: &PreKey) -> Node {
    NodeBuilder::new("key")
        .children([
            NodeBuilder::new("id").bytes(key_id_bytes(key.id)).build(),
            NodeBuilder::new("value").bytes(key.public_key.to_vec()).build(),
        ])
        .build()
}

fn upload_children(upload: &PreKeyUpload) -> Vec<Node> {
    let signed = &upload.signed_pre_key;
    vec![
        NodeBuilder::new("registration")
            .bytes(upload.registration_id.to_be_bytes().to_vec())
            .build(),
        NodeBuilder::new("type").bytes(vec![DJB_KEY_TYPE]).build(),
        NodeBuilder::new("identity")
            .bytes(upload.identity_key.to_vec())
            .build(),
        NodeBuilder::new("list")
            .children(upload.pre_keys.iter().map(pre_key_node))
            .build(),
        NodeBuilder::new("skey")
            .children([
                NodeBuilder::new("id").bytes(key_id_bytes(signed.id)).build(),
                NodeBuilder::new("value")
                    .bytes(signed.public_key.to_vec())
                    .build(),
                NodeBuilder::new("signature")
                    .bytes(signed.signature.to_vec())
                    .build(),
            ])
            .build(),
    ]
}

impl Client {
    /// Asks the server how many of our one-time pre-keys it still holds.
    pub async fn get_server_pre_key_count(&self) -> Result<u32, anyhow::Error> {
        let query = InfoQuery::new(
            "encrypt",
            InfoQueryType::Get,
            vec![NodeBuilder::new("count").build()],
        );
        let response = self.send_iq(query).await?;

        let count_node = response
            .get_optional_child("count")
            .ok_or_else(|| anyhow!("<count> element missing from pre-key count response"))?;
        let count = count_node
            .attrs()
            .optional_u64("value")
            .ok_or_else(|| anyhow!("<count> element has no numeric value"))?;
        Ok(count as u32)
    }

    /// Uploads a batch of `WANTED_PRE_KEY_COUNT` one-time pre-keys.
    pub async fn upload_pre_keys(&self) -> Result<(), anyhow::Error> {
        let _guard = self.prekey_upload_lock.lock().await;

        let upload = self
            .store
            .next_pre_keys(WANTED_PRE_KEY_COUNT)
            .await
            .context("failed to prepare pre-keys")?;
        let Some(last_id) = upload.pre_keys.last().map(|k| k.id) else {
            debug!(target: "Client/PreKeys", "Store produced no pre-keys, nothing to upload");
            return Ok(());
        };

        info!(target: "Client/PreKeys", "Uploading {} pre-keys", upload.pre_keys.len());
        let query = InfoQuery::new("encrypt", InfoQueryType::Set, upload_children(&upload));
        self.send_iq(query).await?;

        self.store
            .mark_pre_keys_uploaded(last_id)
            .await
            .context("failed to mark pre-keys as uploaded")?;
        info!(target: "Client/PreKeys", "Uploaded pre-keys up to id {last_id}");
        Ok(())
    }

    /// Tops up the server's pre-key supply when it, or the local store, runs low.
    pub(crate) async fn ensure_pre_keys(&self) -> Result<(), anyhow::Error> {
        let server_count = self.get_server_pre_key_count().await?;
        let local_count = self.store.uploaded_pre_key_count().await?;
        debug!(
            target: "Client/PreKeys",
            "Pre-key counts: server={server_count}, local={local_count}"
        );

        if server_count < MIN_PRE_KEY_COUNT || local_count < MIN_PRE_KEY_COUNT {
            self.upload_pre_keys().await?;
        }
        Ok(())
    }
}
