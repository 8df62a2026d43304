//! Per-family cache of the advertised-server-list packet.
//!
//! Clients ask for the list far more often than it changes, so the
//! encoded `ResponseList` datagram is built once and handed out as-is
//! until it ages out (`GAME_SERVER_LIST_AGE` frames) or a registration
//! explicitly dirties it. The rebuild is bounded by how many entries fit
//! in one datagram; an over-full address book is truncated, never split
//! across packets.

use crate::registry::AddressBook;
use log::{debug, error};
use protocol::{Packet, ServerFamily, GAME_SERVER_LIST_AGE};

pub struct ServerListCache {
    family: ServerFamily,
    packet: Vec<u8>,
    dirty: bool,
    next_frame: u32,
}

impl ServerListCache {
    /// Starts empty and dirty, so the first request builds the packet.
    pub fn new(family: ServerFamily) -> Self {
        ServerListCache {
            family,
            packet: Vec::new(),
            dirty: true,
            next_frame: 0,
        }
    }

    /// Forces a rebuild on the next request, TTL notwithstanding.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The current list packet, rebuilt first if stale or dirty.
    ///
    /// Always returns a complete, well-formed datagram: the swap from
    /// old to new packet happens before anything is handed out.
    pub fn get_packet(&mut self, current_frame: u32, book: &dyn AddressBook) -> &[u8] {
        if self.dirty || current_frame >= self.next_frame {
            self.rebuild(current_frame, book);
        }
        &self.packet
    }

    fn rebuild(&mut self, current_frame: u32, book: &dyn AddressBook) {
        let max_count = self.family.max_list_entries();

        debug!("Rebuilding the {:?} server list", self.family);

        // Ask for one more than fits so truncation is observable.
        let mut servers = book.get_active_servers(self.family, max_count + 1);
        if servers.len() > max_count {
            debug!(
                "{:?} server list truncated to {} entries",
                self.family, max_count
            );
            servers.truncate(max_count);
        }

        match (Packet::ResponseList {
            family: self.family,
            servers,
        })
        .encode()
        {
            Ok(packet) => {
                self.packet = packet;
                self.dirty = false;
                self.next_frame = current_frame + GAME_SERVER_LIST_AGE;
            }
            // Unreachable while the list is truncated to max_count; keep
            // serving the previous packet if it ever happens.
            Err(e) => error!("Failed to encode the {:?} server list: {}", self.family, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryAddressBook;
    use std::net::SocketAddr;

    fn book_with(count: usize) -> MemoryAddressBook {
        let mut book = MemoryAddressBook::new();
        for i in 0..count {
            let addr: SocketAddr = format!("10.{}.{}.{}:3979", i / 65536, (i / 256) % 256, i % 256)
                .parse()
                .unwrap();
            book.mark_online(addr);
        }
        book
    }

    fn decoded_count(packet: &[u8]) -> usize {
        match Packet::decode(packet).unwrap() {
            Packet::ResponseList { servers, .. } => servers.len(),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn first_request_builds_a_valid_packet() {
        let book = book_with(3);
        let mut cache = ServerListCache::new(ServerFamily::V4);
        let packet = cache.get_packet(0, &book).to_vec();
        assert_eq!(decoded_count(&packet), 3);
    }

    #[test]
    fn empty_book_still_yields_a_packet() {
        let book = MemoryAddressBook::new();
        let mut cache = ServerListCache::new(ServerFamily::V6);
        let packet = cache.get_packet(0, &book).to_vec();
        assert_eq!(decoded_count(&packet), 0);
    }

    #[test]
    fn encoded_count_never_exceeds_datagram_capacity() {
        let max = ServerFamily::V4.max_list_entries();
        let book = book_with(max + 50);
        let mut cache = ServerListCache::new(ServerFamily::V4);

        let packet = cache.get_packet(0, &book).to_vec();
        assert_eq!(decoded_count(&packet), max);
        assert!(packet.len() <= protocol::SEND_MTU);
    }

    #[test]
    fn requests_inside_the_ttl_hit_the_cache() {
        let mut book = book_with(2);
        let mut cache = ServerListCache::new(ServerFamily::V4);

        let first = cache.get_packet(10, &book).to_vec();
        // The book changes, but the cache does not know yet.
        book.mark_online("10.9.9.9:3979".parse().unwrap());

        let second = cache.get_packet(10 + GAME_SERVER_LIST_AGE - 1, &book).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn ttl_expiry_triggers_a_rebuild() {
        let mut book = book_with(2);
        let mut cache = ServerListCache::new(ServerFamily::V4);

        cache.get_packet(10, &book);
        book.mark_online("10.9.9.9:3979".parse().unwrap());

        let packet = cache.get_packet(10 + GAME_SERVER_LIST_AGE, &book).to_vec();
        assert_eq!(decoded_count(&packet), 3);
    }

    #[test]
    fn mark_dirty_forces_a_rebuild_before_the_ttl() {
        let mut book = book_with(2);
        let mut cache = ServerListCache::new(ServerFamily::V4);

        cache.get_packet(10, &book);
        book.mark_online("10.9.9.9:3979".parse().unwrap());
        cache.mark_dirty();

        let packet = cache.get_packet(11, &book).to_vec();
        assert_eq!(decoded_count(&packet), 3);
    }
}
