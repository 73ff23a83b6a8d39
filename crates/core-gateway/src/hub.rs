// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The connection registry shared by both socket endpoints: one serving
//! task owns the connection map and drains a command channel, so no lock
//! is ever held across the broadcast fan-out or a slow client.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

enum HubCommand<M> {
    Register(Uuid, mpsc::Sender<M>),
    Unregister(Uuid),
    Broadcast(M),
}

/// Cheap-to-clone handle to a running [`Hub`]. Transport handlers hold one
/// of these; the actual connection map lives only inside the serving task.
#[derive(Clone)]
pub struct HubHandle<M> {
    cmd_tx: mpsc::Sender<HubCommand<M>>,
}

impl<M: Clone + Send + 'static> HubHandle<M> {
    pub async fn register(&self, id: Uuid, sender: mpsc::Sender<M>) {
        let _ = self.cmd_tx.send(HubCommand::Register(id, sender)).await;
    }

    pub async fn unregister(&self, id: Uuid) {
        let _ = self.cmd_tx.send(HubCommand::Unregister(id)).await;
    }

    /// Fan `message` out to every registered connection. A connection whose
    /// outbound channel is full or closed is evicted from the registry.
    pub async fn broadcast(&self, message: M) {
        let _ = self.cmd_tx.send(HubCommand::Broadcast(message)).await;
    }
}

/// Spawn the serving task and return a handle to it.
pub fn spawn_hub<M: Clone + Send + 'static>() -> HubHandle<M> {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HubCommand<M>>(1024);

    tokio::spawn(async move {
        let mut connections: HashMap<Uuid, mpsc::Sender<M>> = HashMap::new();
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                HubCommand::Register(id, sender) => {
                    connections.insert(id, sender);
                }
                HubCommand::Unregister(id) => {
                    connections.remove(&id);
                }
                HubCommand::Broadcast(message) => {
                    let mut dead = Vec::new();
                    for (id, sender) in connections.iter() {
                        if sender.try_send(message.clone()).is_err() {
                            dead.push(*id);
                        }
                    }
                    for id in dead {
                        debug!(%id, "evicting unresponsive connection from hub broadcast");
                        connections.remove(&id);
                    }
                }
            }
        }
    });

    HubHandle { cmd_tx }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_registered_connection() {
        let hub = spawn_hub::<String>();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        hub.register(id1, tx1).await;
        hub.register(id2, tx2).await;

        hub.broadcast("hello".to_string()).await;

        assert_eq!(rx1.recv().await, Some("hello".to_string()));
        assert_eq!(rx2.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn unregister_removes_a_connection_from_broadcast() {
        let hub = spawn_hub::<String>();
        let (tx, mut rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        hub.register(id, tx).await;
        hub.unregister(id).await;

        hub.broadcast("hi".to_string()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn a_full_receiver_is_evicted_without_blocking_the_hub() {
        let hub = spawn_hub::<String>();
        let (tx, _rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        hub.register(id, tx.clone()).await;

        // Fill the channel so the next try_send fails.
        tx.try_send("fill".to_string()).unwrap();
        hub.broadcast("overflow".to_string()).await;

        let (probe_tx, mut probe_rx) = mpsc::channel(8);
        let probe_id = Uuid::new_v4();
        hub.register(probe_id, probe_tx).await;
        hub.broadcast("probe".to_string()).await;
        assert_eq!(probe_rx.recv().await, Some("probe".to_string()));
    }
}
