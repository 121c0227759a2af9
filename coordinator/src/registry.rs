use std::{
    collections::{BTreeMap, BTreeSet},
    time::SystemTime,
};

use comms::ClientId;

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub registered_at: SystemTime,
}

/// The set of clients known to the coordinator.
///
/// Registration is idempotent and clients are never removed.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client_id`.
    ///
    /// # Returns
    /// Whether the client was newly added.
    pub fn register(&mut self, client_id: ClientId) -> bool {
        if self.clients.contains_key(&client_id) {
            return false;
        }

        let record = ClientRecord {
            client_id,
            registered_at: SystemTime::now(),
        };
        self.clients.insert(client_id, record);
        true
    }

    pub fn is_registered(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ClientRecord> {
        self.clients.get(&client_id)
    }

    /// The ids of every registered client, in ascending order.
    pub fn ids(&self) -> BTreeSet<ClientId> {
        self.clients.keys().copied().collect()
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

    #[test]
    fn register_is_idempotent() {
        let mut registry = ClientRegistry::new();

        assert!(registry.register(3));
        let first = registry.get(3).unwrap().registered_at;

        assert!(!registry.register(3));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(3).unwrap().registered_at, first);
    }

    #[test]
    fn ids_are_sorted() {
        let mut registry = ClientRegistry::new();
        for id in [9, 1, 4] {
            registry.register(id);
        }

        assert_eq!(registry.ids().into_iter().collect::<Vec<_>>(), [1, 4, 9]);
        assert!(registry.is_registered(4));
        assert!(!registry.is_registered(2));
    }
}
