//! Ordered collection of connected clients

use crate::client::{Client, ClientHandle};

/// Connected clients in admission order, unique by handle
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<Client>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client, replacing any client registered under the same handle
    pub fn insert(&mut self, client: Client) {
        let handle = client.handle();
        match self.position(handle) {
            Some(index) => self.clients[index] = client,
            None => self.clients.push(client),
        }
    }

    /// Remove a client; dropping it closes its socket
    pub fn remove(&mut self, handle: ClientHandle) -> Option<Client> {
        self.position(handle).map(|index| self.clients.remove(index))
    }

    /// Look a client up
    pub fn get(&self, handle: ClientHandle) -> Option<&Client> {
        self.clients.iter().find(|client| client.handle() == handle)
    }

    /// Look a client up for modification
    pub fn get_mut(&mut self, handle: ClientHandle) -> Option<&mut Client> {
        self.clients
            .iter_mut()
            .find(|client| client.handle() == handle)
    }

    /// Whether a client is registered under `handle`
    #[cfg(test)]
    pub(crate) fn contains(&self, handle: ClientHandle) -> bool {
        self.position(handle).is_some()
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Handles of all registered clients, in admission order
    #[cfg(test)]
    pub(crate) fn handles(&self) -> Vec<ClientHandle> {
        self.clients.iter().map(Client::handle).collect()
    }

    /// Clients worth waiting on: everyone whose peer has not hung up
    pub fn pollable(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter().filter(|client| !client.is_hung_up())
    }

    /// Iterate over all clients
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    fn position(&self, handle: ClientHandle) -> Option<usize> {
        self.clients
            .iter()
            .position(|client| client.handle() == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use tether_types::ClientId;

    struct Fixture {
        listener: TcpListener,
        peers: Vec<TcpStream>,
        serial: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                peers: Vec::new(),
                serial: 0,
            }
        }

        fn client(&mut self, id: i32) -> Client {
            let peer = TcpStream::connect(self.listener.local_addr().unwrap()).unwrap();
            self.peers.push(peer);
            let (stream, addr) = self.listener.accept().unwrap();
            self.serial += 1;
            Client::new(stream, ClientId::new(id), addr, self.serial).unwrap()
        }
    }

    #[test]
    fn test_admission_order() {
        let mut fixture = Fixture::new();
        let mut registry = ClientRegistry::new();
        let first = fixture.client(1);
        let second = fixture.client(2);
        let expected = vec![first.handle(), second.handle()];

        registry.insert(first);
        registry.insert(second);

        assert_eq!(registry.handles(), expected);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut fixture = Fixture::new();
        let mut registry = ClientRegistry::new();
        let client = fixture.client(1);
        let handle = client.handle();
        registry.insert(client);

        let removed = registry.remove(handle).unwrap();
        assert_eq!(removed.identity(), ClientId::new(1));
        assert!(!registry.contains(handle));
        assert!(registry.remove(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_hung_up_clients_are_not_pollable() {
        let mut fixture = Fixture::new();
        let mut registry = ClientRegistry::new();
        let quiet = fixture.client(1);
        let gone = fixture.client(2);
        let (quiet_handle, gone_handle) = (quiet.handle(), gone.handle());
        registry.insert(quiet);
        registry.insert(gone);

        registry.get_mut(gone_handle).unwrap().mark_hung_up();

        let pollable: Vec<_> = registry.pollable().map(Client::handle).collect();
        assert_eq!(pollable, vec![quiet_handle]);
        assert!(registry.contains(gone_handle));
    }
}
