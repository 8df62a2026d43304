//! # Master Server Library
//!
//! Discovery/rendezvous service for game servers: game servers register
//! themselves, clients ask for the current list of reachable servers,
//! and the master independently verifies that a registered server is
//! actually alive before advertising it.
//!
//! ## How a registration becomes an advertisement
//!
//! 1. A game server sends `Register` with session key 0; the master
//!    answers with a freshly issued key.
//! 2. The server registers again carrying that key. The master sends a
//!    `FindServer` probe from its dedicated probe endpoint to the
//!    address the server claims to be reachable at.
//! 3. Only a `ServerResponse` echoing the exact session key resolves the
//!    probe; the server is then recorded in the address book, the cached
//!    list packet is dirtied, and an `AckRegister` goes back to the
//!    registrant. Responses with the wrong key, the wrong source address
//!    or no outstanding probe are dropped.
//! 4. A server that never answers is retried a bounded number of times
//!    (spaced in whole frames) and then forgotten.
//!
//! ## Execution model
//!
//! A single tick loop owns all protocol state. Per-socket receive tasks
//! only forward datagrams into it over a channel and a sender task only
//! drains the outbound queue, so no locking is needed anywhere in the
//! state machine. All timing is expressed in logical frames, advanced
//! once per tick, which keeps retry and TTL behavior independent of
//! wall-clock jitter and fully deterministic under test.
//!
//! ## Module Organization
//!
//! - [`core`]: inbound dispatch and the per-tick pass over the probes.
//! - [`network`]: sockets, channels and the tick loop driver.
//! - [`probe`]: the retry state machine for one candidate server.
//! - [`registry`]: the address-book interface and in-memory store.
//! - [`server_list`]: the cached, capacity-bounded list packet.
//! - [`session`]: session-key issuance.

pub mod core;
pub mod network;
pub mod probe;
pub mod registry;
pub mod server_list;
pub mod session;
