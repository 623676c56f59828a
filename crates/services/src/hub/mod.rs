//! Notification hub
//!
//! Maps conversation IDs to the set of subscribed control-channel clients
//! and fans typed events out to them. Delivery is best-effort: clients
//! whose transport has gone away are skipped and reaped on removal.

pub mod events;

pub use events::*;

use crate::actions::models::AggregatedAction;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Handle to one connected control-channel client
///
/// The sender feeds the client's socket writer task; sends never block.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub user_id: Uuid,
    sender: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    pub fn new(id: Uuid, user_id: Uuid, sender: mpsc::UnboundedSender<String>) -> Self {
        Self { id, user_id, sender }
    }

    /// Queue a pre-serialized frame; false if the transport is gone
    pub fn send_json(&self, json: String) -> bool {
        self.sender.send(json).is_ok()
    }

    pub fn send_event(&self, event: &ServerEvent) -> bool {
        self.send_json(event.to_json())
    }
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<Uuid, HashMap<Uuid, ClientHandle>>,
    /// client id -> conversation id, for O(1) removal
    memberships: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct NotificationHub {
    state: RwLock<HubState>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a client to a conversation, moving it out of any prior one
    pub async fn register_client(&self, client: ClientHandle, conversation_id: Uuid) {
        let mut state = self.state.write().await;

        if let Some(previous) = state.memberships.insert(client.id, conversation_id) {
            if let Some(room) = state.rooms.get_mut(&previous) {
                room.remove(&client.id);
                if room.is_empty() {
                    state.rooms.remove(&previous);
                }
            }
        }

        debug!(client_id = %client.id, conversation_id = %conversation_id, "Client registered");
        state
            .rooms
            .entry(conversation_id)
            .or_default()
            .insert(client.id, client);
    }

    /// Drop a client from its conversation set, deleting the set if empty
    pub async fn remove_client(&self, client_id: Uuid) {
        let mut state = self.state.write().await;

        if let Some(conversation_id) = state.memberships.remove(&client_id) {
            if let Some(room) = state.rooms.get_mut(&conversation_id) {
                room.remove(&client_id);
                if room.is_empty() {
                    state.rooms.remove(&conversation_id);
                }
            }
            debug!(client_id = %client_id, conversation_id = %conversation_id, "Client removed");
        }
    }

    /// Conversation a client is currently subscribed to, if any
    pub async fn conversation_of(&self, client_id: Uuid) -> Option<Uuid> {
        self.state.read().await.memberships.get(&client_id).copied()
    }

    /// Number of clients currently subscribed to a conversation
    pub async fn client_count(&self, conversation_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(&conversation_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    /// Fan an event out to every subscriber of a conversation
    pub async fn broadcast(&self, conversation_id: Uuid, event: &ServerEvent) {
        let json = event.to_json();
        let state = self.state.read().await;

        let Some(room) = state.rooms.get(&conversation_id) else {
            return;
        };

        for client in room.values() {
            if !client.send_json(json.clone()) {
                // Reaped when the socket task calls remove_client
                warn!(client_id = %client.id, "Dropping event for disconnected client");
            }
        }
    }

    pub async fn notify_action_created(&self, conversation_id: Uuid, action: AggregatedAction) {
        self.broadcast(conversation_id, &ServerEvent::ActionCreated(action))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(sender: mpsc::UnboundedSender<String>) -> ClientHandle {
        ClientHandle::new(Uuid::new_v4(), Uuid::new_v4(), sender)
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let hub = NotificationHub::new();
        let conversation_id = Uuid::new_v4();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register_client(client(tx1), conversation_id).await;
        hub.register_client(client(tx2), conversation_id).await;

        hub.broadcast(conversation_id, &ServerEvent::OpenaiConnected)
            .await;

        for rx in [&mut rx1, &mut rx2] {
            let frame: serde_json::Value =
                serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["type"], "openai_connected");
        }
    }

    #[tokio::test]
    async fn register_moves_client_between_conversations() {
        let hub = NotificationHub::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = client(tx);
        hub.register_client(handle.clone(), first).await;
        hub.register_client(handle, second).await;

        assert_eq!(hub.client_count(first).await, 0);
        assert_eq!(hub.client_count(second).await, 1);

        hub.broadcast(first, &ServerEvent::TranscriptionStarted).await;
        assert!(rx.try_recv().is_err());

        hub.broadcast(second, &ServerEvent::TranscriptionStarted).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn remove_client_deletes_empty_sets() {
        let hub = NotificationHub::new();
        let conversation_id = Uuid::new_v4();

        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = client(tx);
        let client_id = handle.id;
        hub.register_client(handle, conversation_id).await;
        assert_eq!(hub.client_count(conversation_id).await, 1);

        hub.remove_client(client_id).await;
        assert_eq!(hub.client_count(conversation_id).await, 0);
        assert!(hub.state.read().await.rooms.is_empty());
    }

    #[tokio::test]
    async fn broadcast_skips_closed_transports() {
        let hub = NotificationHub::new();
        let conversation_id = Uuid::new_v4();

        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        drop(rx_dead);
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();

        hub.register_client(client(tx_dead), conversation_id).await;
        hub.register_client(client(tx_live), conversation_id).await;

        hub.broadcast(conversation_id, &ServerEvent::ProcessingCompleted)
            .await;

        // The live client still gets the event
        assert!(rx_live.try_recv().is_ok());
    }
}
