//! Outstanding liveness probes and their retry state machine.
//!
//! When a game server registers, the master does not take its word for
//! it: it sends a `FindServer` probe from the dedicated probe endpoint
//! and only advertises the server once the probe is answered with the
//! matching session key. A probe that stays unanswered is retried a
//! bounded number of times, spaced by whole frames, and then dropped.

use crate::network::{Endpoint, Outbound};
use log::{debug, error};
use protocol::{Packet, SERVER_QUERY_ATTEMPTS, SERVER_QUERY_TIMEOUT};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Outcome of one [`Probe::attempt`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Still inside the inter-attempt spacing window; nothing happened.
    Waiting,
    /// The probe datagram was (re)sent.
    Sent,
    /// The attempt budget is spent; the caller must remove the probe.
    Exhausted,
}

/// One candidate game server being verified.
#[derive(Debug)]
pub struct Probe {
    /// Address the probe datagrams go to.
    pub server_address: SocketAddr,
    /// Where the eventual `AckRegister` must be sent.
    pub reply_address: SocketAddr,
    /// Key the response must echo to be accepted.
    pub session_key: u64,
    last_sent_frame: u32,
    attempts: u32,
}

impl Probe {
    /// A probe whose initial datagram went out at `frame`. Sending that
    /// first datagram is the caller's job; this only tracks the retries.
    pub fn new(
        server_address: SocketAddr,
        reply_address: SocketAddr,
        session_key: u64,
        frame: u32,
    ) -> Self {
        Probe {
            server_address,
            reply_address,
            session_key,
            last_sent_frame: frame,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Gives the probe a chance to retry. Safe to call every tick: it is
    /// a no-op until `SERVER_QUERY_TIMEOUT` frames have passed since the
    /// last send.
    pub fn attempt(
        &mut self,
        current_frame: u32,
        outbound: &mpsc::UnboundedSender<Outbound>,
    ) -> ProbeStatus {
        if current_frame < self.last_sent_frame + SERVER_QUERY_TIMEOUT {
            return ProbeStatus::Waiting;
        }

        // No response within the window; this counts as a failed attempt.
        self.attempts += 1;

        if self.attempts > SERVER_QUERY_ATTEMPTS {
            debug!(
                "Too many query attempts for {}, giving up",
                self.server_address
            );
            return ProbeStatus::Exhausted;
        }

        debug!(
            "Re-querying {} (attempt {})",
            self.server_address, self.attempts
        );
        match (Packet::FindServer {
            session_key: self.session_key,
        })
        .encode()
        {
            Ok(data) => {
                let _ = outbound.send(Outbound {
                    endpoint: Endpoint::Probe,
                    addr: self.server_address,
                    data,
                });
            }
            Err(e) => error!("Failed to encode probe for {}: {}", self.server_address, e),
        }
        self.last_sent_frame = current_frame;
        ProbeStatus::Sent
    }
}

/// The master's collection of outstanding probes, keyed by the address
/// being probed. Only the orchestrator mutates it.
#[derive(Debug, Default)]
pub struct ProbeSet {
    probes: HashMap<SocketAddr, Probe>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a probe, replacing any earlier one for the same server.
    pub fn insert(&mut self, probe: Probe) {
        self.probes.insert(probe.server_address, probe);
    }

    /// Accepts a response only when both the source address and the
    /// session key match an outstanding probe. On a match the probe is
    /// removed and returned; anything else leaves the set untouched.
    pub fn resolve(&mut self, addr: SocketAddr, session_key: u64) -> Option<Probe> {
        match self.probes.get(&addr) {
            Some(probe) if probe.session_key == session_key => self.probes.remove(&addr),
            _ => None,
        }
    }

    /// Runs the retry state machine over every probe, dropping the
    /// exhausted ones. One server running out of attempts never affects
    /// any other probe.
    pub fn attempt_all(&mut self, current_frame: u32, outbound: &mpsc::UnboundedSender<Outbound>) {
        self.probes
            .retain(|_, probe| probe.attempt(current_frame, outbound) != ProbeStatus::Exhausted);
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.probes.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
