//! The store of currently-known-active game servers.
//!
//! The master only ever talks to the store through [`AddressBook`]; the
//! production deployment can put a database behind it while tests and
//! the default binary use the in-memory implementation.

use log::info;
use protocol::ServerFamily;
use std::net::SocketAddr;

/// Query/update interface over the set of reachable game servers.
pub trait AddressBook: Send {
    /// Up to `max_count` servers of the given family, in a stable order.
    fn get_active_servers(&self, family: ServerFamily, max_count: usize) -> Vec<SocketAddr>;

    /// Records a server as verified reachable.
    fn mark_online(&mut self, addr: SocketAddr);

    /// Records a server as gone.
    fn mark_offline(&mut self, addr: SocketAddr);
}

/// Insertion-ordered in-memory address book.
#[derive(Debug, Default)]
pub struct MemoryAddressBook {
    servers: Vec<SocketAddr>,
}

impl MemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl AddressBook for MemoryAddressBook {
    fn get_active_servers(&self, family: ServerFamily, max_count: usize) -> Vec<SocketAddr> {
        self.servers
            .iter()
            .filter(|addr| ServerFamily::of(addr) == family)
            .take(max_count)
            .copied()
            .collect()
    }

    fn mark_online(&mut self, addr: SocketAddr) {
        if !self.servers.contains(&addr) {
            info!("Server {} is now advertised", addr);
            self.servers.push(addr);
        }
    }

    fn mark_offline(&mut self, addr: SocketAddr) {
        let before = self.servers.len();
        self.servers.retain(|known| *known != addr);
        if self.servers.len() != before {
            info!("Server {} is no longer advertised", addr);
        }
    }
}
