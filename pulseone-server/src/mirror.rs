//! Drains the Live Value Cache's mirror mailbox into the external KV
//! store (§4.3, §6): `redis`'s async connection manager, `SET EX` per
//! write. With no `cache.redis_url` configured the mailbox is drained
//! and logged instead of written anywhere, the same stand-in role the
//! seed device fleet plays for the configuration-persistence layer.

use pulseone_core::pipeline::MirrorWriteOwned;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub fn spawn(redis_url: Option<String>, mut rx: mpsc::Receiver<MirrorWriteOwned>) {
    tokio::spawn(async move {
        let manager = match redis_url {
            Some(url) => match redis::Client::open(url.as_str()) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(manager) => Some(manager),
                    Err(err) => {
                        warn!(error = %err, "failed to connect to cache mirror, writes will be dropped");
                        None
                    }
                },
                Err(err) => {
                    warn!(error = %err, "invalid cache mirror url, writes will be dropped");
                    None
                }
            },
            None => None,
        };

        let mut manager = manager;
        while let Some(write) = rx.recv().await {
            let Some(conn) = manager.as_mut() else {
                debug!(key = write.key(), "cache mirror disabled, dropping write");
                continue;
            };
            let payload = match serde_json::to_string(write.value()) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to serialize mirror value");
                    continue;
                }
            };
            let ttl_secs = write.ttl().as_secs().max(1);
            if let Err(err) = conn.set_ex::<_, _, ()>(write.key(), payload, ttl_secs).await {
                warn!(error = %err, key = write.key(), "cache mirror write failed");
            }
        }
    });
}
