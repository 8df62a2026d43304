//! Wire protocol of the game-server rendezvous service.
//!
//! The master server, game servers and clients exchange small binary
//! datagrams with a common framing: `[size:u16][type:u8][payload]`,
//! little-endian, capped at one MTU. This crate owns the framing
//! primitives ([`wire::PacketWriter`] / [`wire::PacketReader`]), the
//! typed packet definitions ([`packets::Packet`]) and the protocol
//! constants that the retry and caching logic is expressed in.
//!
//! All timing constants are in *frames*: the master server advances a
//! logical frame counter once per tick, and every timeout and TTL is a
//! frame-count comparison rather than a wall-clock one.

pub mod packets;
pub mod wire;

pub use packets::Packet;
pub use wire::{PacketReader, PacketWriter, WireError};

use std::net::SocketAddr;

/// Maximum size of a single datagram we will ever send.
pub const SEND_MTU: usize = 1460;

/// Bytes taken by the `[size:u16][type:u8]` framing prefix.
pub const HEADER_SIZE: usize = 3;

/// Minimum number of frames between two probe attempts at the same server.
pub const SERVER_QUERY_TIMEOUT: u32 = 5;

/// How many times a server is probed before we give up on it.
pub const SERVER_QUERY_ATTEMPTS: u32 = 3;

/// Number of frames an advertised-server-list packet stays fresh.
pub const GAME_SERVER_LIST_AGE: u32 = 60;

/// Protocol revision carried by list requests.
pub const MASTER_VERSION: u8 = 2;

/// Address family of an advertised game server.
///
/// The family selects the wire width of each list entry: 4 address bytes
/// for IPv4, 16 for IPv6, plus a 2-byte port either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerFamily {
    V4,
    V6,
}

impl ServerFamily {
    pub const ALL: [ServerFamily; 2] = [ServerFamily::V4, ServerFamily::V6];

    /// Wire tag used in list requests and list packets.
    pub fn tag(self) -> u8 {
        match self {
            ServerFamily::V4 => 1,
            ServerFamily::V6 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, WireError> {
        match tag {
            1 => Ok(ServerFamily::V4),
            2 => Ok(ServerFamily::V6),
            other => Err(WireError::UnknownFamily(other)),
        }
    }

    /// Family of a concrete socket address.
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => ServerFamily::V4,
            SocketAddr::V6(_) => ServerFamily::V6,
        }
    }

    /// Bytes one `(address, port)` entry occupies in a list packet.
    pub fn entry_size(self) -> usize {
        match self {
            ServerFamily::V4 => 4 + 2,
            ServerFamily::V6 => 16 + 2,
        }
    }

    /// Stable index for per-family tables.
    pub fn index(self) -> usize {
        match self {
            ServerFamily::V4 => 0,
            ServerFamily::V6 => 1,
        }
    }

    /// How many servers of this family fit in a single list datagram.
    ///
    /// Derived from the datagram capacity minus the framing prefix, the
    /// family tag and the entry count. Servers beyond this bound are
    /// never encoded; one datagram is all a client gets.
    pub fn max_list_entries(self) -> usize {
        (SEND_MTU - HEADER_SIZE - 1 - 2) / self.entry_size()
    }
}
