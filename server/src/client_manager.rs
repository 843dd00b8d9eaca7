//! Client connection management and action queuing for the encounter server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Binding each connection to the avatar and weapon it controls
//! - Buffering player actions and replaying them in arrival order
//! - Acknowledging the highest processed action per client
//!
//! The manager only tracks who is connected and what they asked for. Whether
//! an action has any effect is decided by the simulation.

use log::info;
use shared::{ActionState, EntityId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a client is considered gone
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client and its pending actions
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest action sequence number we've processed
    pub last_processed_action: u32,
    /// Buffered actions waiting to be applied
    pub pending_actions: Vec<ActionState>,
    /// Avatar entity this client drives, once spawned
    pub entity_id: Option<EntityId>,
    /// Weapon held by the avatar
    pub weapon_id: Option<EntityId>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_action: 0,
            pending_actions: Vec::new(),
            entity_id: None,
            weapon_id: None,
        }
    }

    /// Queues an action, keeping the buffer in sequence order so late
    /// datagrams still apply in the order they were issued
    pub fn add_action(&mut self, action: ActionState) {
        self.last_seen = Instant::now();
        self.pending_actions.push(action);
        self.pending_actions.sort_by_key(|a| a.sequence);
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Roster of connected clients with a capacity limit
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Client IDs start from 1 and are never reused
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns None when the server is full
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client and returns it so the caller can despawn its avatar
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Records which avatar and weapon a client controls
    pub fn bind_avatar(
        &mut self,
        client_id: u32,
        entity_id: EntityId,
        weapon_id: EntityId,
    ) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.entity_id = Some(entity_id);
                client.weapon_id = Some(weapon_id);
                true
            }
            None => false,
        }
    }

    /// Returns false if the client ID is unknown
    pub fn add_action(&mut self, client_id: u32, action: ActionState) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.add_action(action);
            true
        } else {
            false
        }
    }

    /// All unprocessed actions across clients, ordered by client timestamp
    pub fn get_chronological_actions(&self) -> Vec<(u32, ActionState)> {
        let mut all_actions: Vec<(u32, ActionState)> = Vec::new();

        for (client_id, client) in &self.clients {
            for action in &client.pending_actions {
                if action.sequence > client.last_processed_action {
                    all_actions.push((*client_id, action.clone()));
                }
            }
        }

        // Stable sort keeps per-client sequence order for equal timestamps
        all_actions.sort_by_key(|(_, action)| action.timestamp);
        all_actions
    }

    pub fn mark_action_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_action = client.last_processed_action.max(sequence);
        }
    }

    pub fn cleanup_processed_actions(&mut self) {
        for client in self.clients.values_mut() {
            let acked = client.last_processed_action;
            client.pending_actions.retain(|action| action.sequence > acked);
        }
    }

    /// Removes every client silent for longer than [`CLIENT_TIMEOUT`]
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// (client, address, avatar, last processed action) for every client
    pub fn recipients(&self) -> Vec<(u32, SocketAddr, Option<EntityId>, u32)> {
        self.clients
            .values()
            .map(|c| (c.id, c.addr, c.entity_id, c.last_processed_action))
            .collect()
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PlayerAction;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn action(sequence: u32, timestamp: u64) -> ActionState {
        ActionState {
            sequence,
            timestamp,
            action: PlayerAction::Fire,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, test_addr());

        assert_eq!(client.id, 1);
        assert_eq!(client.last_processed_action, 0);
        assert!(client.pending_actions.is_empty());
        assert!(client.entity_id.is_none());
    }

    #[test]
    fn test_client_orders_actions_by_sequence() {
        let mut client = Client::new(1, test_addr());

        client.add_action(action(2, 100));
        client.add_action(action(1, 50));

        assert_eq!(client.pending_actions[0].sequence, 1);
        assert_eq!(client.pending_actions[1].sequence, 2);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client_returns_binding() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();
        assert!(manager.bind_avatar(client_id, 10, 11));

        let removed = manager.remove_client(&client_id).unwrap();
        assert_eq!(removed.entity_id, Some(10));
        assert_eq!(removed.weapon_id, Some(11));
        assert!(manager.is_empty());
        assert!(manager.remove_client(&client_id).is_none());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));
        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
    }

    #[test]
    fn test_add_action_to_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.add_action(999, action(1, 100)));
    }

    #[test]
    fn test_get_chronological_actions() {
        let mut manager = ClientManager::new(3);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        manager.add_action(client_id1, action(1, 100));
        manager.add_action(client_id2, action(1, 50));
        manager.add_action(client_id1, action(2, 200));

        let actions = manager.get_chronological_actions();
        let timestamps: Vec<u64> = actions.iter().map(|(_, a)| a.timestamp).collect();
        assert_eq!(timestamps, vec![50, 100, 200]);
    }

    #[test]
    fn test_processed_actions_are_acknowledged_and_dropped() {
        let mut manager = ClientManager::new(1);
        let client_id = manager.add_client(test_addr()).unwrap();
        manager.add_action(client_id, action(1, 10));
        manager.add_action(client_id, action(2, 20));
        manager.add_action(client_id, action(3, 30));

        manager.mark_action_processed(client_id, 2);
        manager.mark_action_processed(client_id, 1);
        manager.cleanup_processed_actions();

        let client = manager.get(client_id).unwrap();
        assert_eq!(client.last_processed_action, 2);
        assert_eq!(client.pending_actions.len(), 1);
        assert_eq!(manager.get_chronological_actions().len(), 1);
        assert_eq!(manager.recipients()[0].3, 2);
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(2);
        let quiet = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();
        manager.clients.get_mut(&quiet).unwrap().last_seen =
            Instant::now() - CLIENT_TIMEOUT - Duration::from_secs(1);

        let removed = manager.check_timeouts();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, quiet);
        assert_eq!(manager.len(), 1);
    }
}
