//! Master-server orchestration: inbound dispatch and the per-tick pass.
//!
//! `MasterCore` owns all mutable protocol state (probes, list caches,
//! session keys, the frame counter, the address book) and is driven from
//! exactly one task. It never touches a socket itself: received
//! datagrams come in through [`handle_datagram`] and everything it wants
//! to send goes out through the outbound channel, which keeps the whole
//! state machine testable without any networking.
//!
//! Malformed, unexpected or key-mismatched datagrams are dropped with at
//! most a debug log; nothing a remote peer sends can abort the tick loop.
//!
//! [`handle_datagram`]: MasterCore::handle_datagram

use crate::network::{Endpoint, Outbound};
use crate::probe::{Probe, ProbeSet};
use crate::registry::AddressBook;
use crate::server_list::ServerListCache;
use crate::session::SessionKeys;
use log::{debug, error, info};
use protocol::{Packet, ServerFamily, MASTER_VERSION};
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub struct MasterCore {
    book: Box<dyn AddressBook>,
    probes: ProbeSet,
    lists: [ServerListCache; 2],
    session_keys: SessionKeys,
    frame: u32,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl MasterCore {
    pub fn new(book: Box<dyn AddressBook>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        MasterCore {
            book,
            probes: ProbeSet::new(),
            lists: [
                ServerListCache::new(ServerFamily::V4),
                ServerListCache::new(ServerFamily::V6),
            ],
            session_keys: SessionKeys::new(),
            frame: 0,
            outbound,
        }
    }

    /// Current logical frame. Advanced only by [`run_tick`].
    ///
    /// [`run_tick`]: MasterCore::run_tick
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn outstanding_probes(&self) -> usize {
        self.probes.len()
    }

    /// Dispatches one received datagram. Never fails; bad input is
    /// logged and dropped.
    pub fn handle_datagram(&mut self, endpoint: Endpoint, addr: SocketAddr, data: &[u8]) {
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping malformed datagram from {}: {}", addr, e);
                return;
            }
        };

        match endpoint {
            Endpoint::Public => self.handle_public(addr, packet),
            Endpoint::Probe => self.handle_probe(addr, packet),
        }
    }

    fn handle_public(&mut self, addr: SocketAddr, packet: Packet) {
        match packet {
            Packet::GetList { version, family } => {
                if version != MASTER_VERSION {
                    debug!(
                        "Dropping list request from {} with version {}",
                        addr, version
                    );
                    return;
                }
                let data = self.lists[family.index()]
                    .get_packet(self.frame, self.book.as_ref())
                    .to_vec();
                self.send_raw(Endpoint::Public, addr, data);
            }

            Packet::Register { port, session_key } => {
                if session_key == 0 {
                    // New server; hand it a key and wait for it to come back.
                    let key = self.session_keys.next_key();
                    debug!("Issuing session key to {}", addr);
                    self.send(Endpoint::Public, addr, &Packet::SessionKey { key });
                    return;
                }

                let server_address = SocketAddr::new(addr.ip(), port);
                info!("Querying {} to verify registration from {}", server_address, addr);

                let probe = Probe::new(server_address, addr, session_key, self.frame);
                self.send(
                    Endpoint::Probe,
                    server_address,
                    &Packet::FindServer { session_key },
                );
                self.probes.insert(probe);
            }

            Packet::Unregister { port } => {
                let server_address = SocketAddr::new(addr.ip(), port);
                self.book.mark_offline(server_address);
                self.lists[ServerFamily::of(&server_address).index()].mark_dirty();
            }

            other => {
                debug!(
                    "Dropping unexpected {:?} on the public endpoint from {}",
                    other, addr
                );
            }
        }
    }

    fn handle_probe(&mut self, addr: SocketAddr, packet: Packet) {
        match packet {
            Packet::ServerResponse { session_key } => {
                let Some(probe) = self.probes.resolve(addr, session_key) else {
                    // Unsolicited, replayed or spoofed; leaves no trace.
                    debug!("Dropping unmatched server response from {}", addr);
                    return;
                };

                info!("Verified {}", probe.server_address);
                self.book.mark_online(probe.server_address);
                self.lists[ServerFamily::of(&probe.server_address).index()].mark_dirty();
                self.send(
                    Endpoint::Public,
                    probe.reply_address,
                    &Packet::AckRegister { session_key },
                );
            }

            other => {
                debug!(
                    "Dropping unexpected {:?} on the probe endpoint from {}",
                    other, addr
                );
            }
        }
    }

    /// One service tick: retry every outstanding probe, then advance the
    /// frame counter.
    pub fn run_tick(&mut self) {
        self.probes.attempt_all(self.frame, &self.outbound);
        self.frame += 1;
    }

    fn send(&self, endpoint: Endpoint, addr: SocketAddr, packet: &Packet) {
        match packet.encode() {
            Ok(data) => self.send_raw(endpoint, addr, data),
            Err(e) => error!("Failed to encode {:?} for {}: {}", packet, addr, e),
        }
    }

    fn send_raw(&self, endpoint: Endpoint, addr: SocketAddr, data: Vec<u8>) {
        let _ = self.outbound.send(Outbound {
            endpoint,
            addr,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryAddressBook;
    use protocol::{SERVER_QUERY_ATTEMPTS, SERVER_QUERY_TIMEOUT};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn core() -> (MasterCore, UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MasterCore::new(Box::new(MemoryAddressBook::new()), tx), rx)
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn decoded(outbound: &Outbound) -> Packet {
        Packet::decode(&outbound.data).unwrap()
    }

    /// Runs a registration up to the point where the probe is outstanding.
    fn register(core: &mut MasterCore, rx: &mut UnboundedReceiver<Outbound>, from: &str, port: u16) -> u64 {
        let reply_addr = addr(from);
        core.handle_datagram(
            Endpoint::Public,
            reply_addr,
            &Packet::Register {
                port,
                session_key: 0,
            }
            .encode().unwrap(),
        );
        let sent = drain(rx);
        let key = match decoded(&sent[0]) {
            Packet::SessionKey { key } => key,
            other => panic!("expected session key, got {:?}", other),
        };

        core.handle_datagram(
            Endpoint::Public,
            reply_addr,
            &Packet::Register {
                port,
                session_key: key,
            }
            .encode().unwrap(),
        );
        key
    }

    #[test]
    fn registration_issues_key_then_probes() {
        let (mut core, mut rx) = core();
        let key = register(&mut core, &mut rx, "10.0.0.1:50000", 3979);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].endpoint, Endpoint::Probe);
        assert_eq!(sent[0].addr, addr("10.0.0.1:3979"));
        assert_eq!(decoded(&sent[0]), Packet::FindServer { session_key: key });
        assert_eq!(core.outstanding_probes(), 1);
    }

    #[test]
    fn matching_response_advertises_the_server_and_acks() {
        let (mut core, mut rx) = core();
        let key = register(&mut core, &mut rx, "10.0.0.1:50000", 3979);
        drain(&mut rx);

        core.handle_datagram(
            Endpoint::Probe,
            addr("10.0.0.1:3979"),
            &Packet::ServerResponse { session_key: key }.encode().unwrap(),
        );

        assert_eq!(core.outstanding_probes(), 0);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].endpoint, Endpoint::Public);
        assert_eq!(sent[0].addr, addr("10.0.0.1:50000"));
        assert_eq!(decoded(&sent[0]), Packet::AckRegister { session_key: key });

        // The server now shows up in the list.
        core.handle_datagram(
            Endpoint::Public,
            addr("10.0.0.9:40000"),
            &Packet::GetList {
                version: MASTER_VERSION,
                family: ServerFamily::V4,
            }
            .encode().unwrap(),
        );
        let sent = drain(&mut rx);
        match decoded(&sent[0]) {
            Packet::ResponseList { servers, .. } => {
                assert_eq!(servers, vec![addr("10.0.0.1:3979")]);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_session_key_changes_nothing() {
        let (mut core, mut rx) = core();
        let key = register(&mut core, &mut rx, "10.0.0.1:50000", 3979);
        drain(&mut rx);

        core.handle_datagram(
            Endpoint::Probe,
            addr("10.0.0.1:3979"),
            &Packet::ServerResponse {
                session_key: key + 1,
            }
            .encode().unwrap(),
        );

        // Probe still outstanding, no ack sent, book untouched.
        assert_eq!(core.outstanding_probes(), 1);
        assert!(drain(&mut rx).is_empty());
        core.handle_datagram(
            Endpoint::Public,
            addr("10.0.0.9:40000"),
            &Packet::GetList {
                version: MASTER_VERSION,
                family: ServerFamily::V4,
            }
            .encode().unwrap(),
        );
        let sent = drain(&mut rx);
        match decoded(&sent[0]) {
            Packet::ResponseList { servers, .. } => assert!(servers.is_empty()),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn unanswered_probe_retries_then_exhausts() {
        let (mut core, mut rx) = core();
        register(&mut core, &mut rx, "10.0.0.1:50000", 3979);
        drain(&mut rx);

        // Inside the spacing window nothing is resent.
        for _ in 0..SERVER_QUERY_TIMEOUT {
            core.run_tick();
        }
        assert!(drain(&mut rx).is_empty());

        // Each full window adds one resend until the budget is spent.
        let mut resends = 0;
        while core.outstanding_probes() > 0 {
            core.run_tick();
            resends += drain(&mut rx).len();
            assert!(core.frame() < 1000, "probe never exhausted");
        }
        assert_eq!(resends, SERVER_QUERY_ATTEMPTS as usize);

        // No further sends for the dead server.
        for _ in 0..(SERVER_QUERY_TIMEOUT * 3) {
            core.run_tick();
        }
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn unregister_drops_the_server_from_the_list() {
        let (mut core, mut rx) = core();
        let key = register(&mut core, &mut rx, "10.0.0.1:50000", 3979);
        drain(&mut rx);
        core.handle_datagram(
            Endpoint::Probe,
            addr("10.0.0.1:3979"),
            &Packet::ServerResponse { session_key: key }.encode().unwrap(),
        );
        drain(&mut rx);

        core.handle_datagram(
            Endpoint::Public,
            addr("10.0.0.1:50000"),
            &Packet::Unregister { port: 3979 }.encode().unwrap(),
        );

        core.handle_datagram(
            Endpoint::Public,
            addr("10.0.0.9:40000"),
            &Packet::GetList {
                version: MASTER_VERSION,
                family: ServerFamily::V4,
            }
            .encode().unwrap(),
        );
        let sent = drain(&mut rx);
        match decoded(&sent[0]) {
            Packet::ResponseList { servers, .. } => assert!(servers.is_empty()),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn garbage_and_wrong_version_are_dropped_silently() {
        let (mut core, mut rx) = core();

        core.handle_datagram(Endpoint::Public, addr("10.0.0.1:50000"), &[0xFF; 40]);
        core.handle_datagram(Endpoint::Public, addr("10.0.0.1:50000"), &[]);
        core.handle_datagram(
            Endpoint::Public,
            addr("10.0.0.1:50000"),
            &Packet::GetList {
                version: MASTER_VERSION + 1,
                family: ServerFamily::V4,
            }
            .encode().unwrap(),
        );
        // Probe-endpoint packets on the public endpoint are ignored too.
        core.handle_datagram(
            Endpoint::Public,
            addr("10.0.0.1:50000"),
            &Packet::ServerResponse { session_key: 1 }.encode().unwrap(),
        );

        assert!(drain(&mut rx).is_empty());
        assert_eq!(core.outstanding_probes(), 0);
    }

    #[test]
    fn list_requests_within_the_ttl_are_bit_identical() {
        let (mut core, mut rx) = core();
        let request = Packet::GetList {
            version: MASTER_VERSION,
            family: ServerFamily::V4,
        }
        .encode().unwrap();

        core.handle_datagram(Endpoint::Public, addr("10.0.0.9:40000"), &request);
        core.run_tick();
        core.handle_datagram(Endpoint::Public, addr("10.0.0.9:40000"), &request);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data, sent[1].data);
    }
}
