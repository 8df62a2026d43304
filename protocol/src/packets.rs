//! Typed packets of the rendezvous protocol.
//!
//! The master server owns two UDP endpoints. The public endpoint speaks
//! the registration and list-request half of the protocol; the probe
//! endpoint speaks only [`Packet::FindServer`] / [`Packet::ServerResponse`].
//! Session keys bind a probe to the registration that caused it: a
//! response is only accepted if it echoes the key of the outstanding
//! probe for that address.

use crate::wire::{PacketReader, PacketWriter, WireError};
use crate::ServerFamily;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Wire discriminants, one per packet type.
pub mod packet_type {
    pub const FIND_SERVER: u8 = 0;
    pub const SERVER_RESPONSE: u8 = 1;
    pub const REGISTER: u8 = 2;
    pub const ACK_REGISTER: u8 = 3;
    pub const SESSION_KEY: u8 = 4;
    pub const GET_LIST: u8 = 5;
    pub const RESPONSE_LIST: u8 = 6;
    pub const UNREGISTER: u8 = 7;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Liveness probe sent from the master's probe endpoint to a
    /// candidate game server.
    FindServer { session_key: u64 },
    /// A game server's answer to a probe, echoing the probe's key.
    ServerResponse { session_key: u64 },
    /// A game server announcing itself. `session_key == 0` asks the
    /// master to issue a fresh key first.
    Register { port: u16, session_key: u64 },
    /// Sent to a game server once its registration has been verified.
    AckRegister { session_key: u64 },
    /// Master handing a newly registered server its session key.
    SessionKey { key: u64 },
    /// Client asking for the advertised-server list of one family.
    GetList { version: u8, family: ServerFamily },
    /// The advertised-server list. At most one datagram's worth of
    /// entries; see [`ServerFamily::max_list_entries`].
    ResponseList {
        family: ServerFamily,
        servers: Vec<SocketAddr>,
    },
    /// A game server going offline on purpose.
    Unregister { port: u16 },
}

impl Packet {
    /// Encodes the packet into a sendable datagram. Fails only when the
    /// result would not fit in one datagram, which the list builder
    /// rules out by bounding its entry count.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Packet::FindServer { session_key } => {
                let mut w = PacketWriter::new(packet_type::FIND_SERVER);
                w.write_u64(*session_key);
                w.finish()
            }
            Packet::ServerResponse { session_key } => {
                let mut w = PacketWriter::new(packet_type::SERVER_RESPONSE);
                w.write_u64(*session_key);
                w.finish()
            }
            Packet::Register { port, session_key } => {
                let mut w = PacketWriter::new(packet_type::REGISTER);
                w.write_u16(*port);
                w.write_u64(*session_key);
                w.finish()
            }
            Packet::AckRegister { session_key } => {
                let mut w = PacketWriter::new(packet_type::ACK_REGISTER);
                w.write_u64(*session_key);
                w.finish()
            }
            Packet::SessionKey { key } => {
                let mut w = PacketWriter::new(packet_type::SESSION_KEY);
                w.write_u64(*key);
                w.finish()
            }
            Packet::GetList { version, family } => {
                let mut w = PacketWriter::new(packet_type::GET_LIST);
                w.write_u8(*version);
                w.write_u8(family.tag());
                w.finish()
            }
            Packet::ResponseList { family, servers } => {
                encode_server_list(*family, servers)
            }
            Packet::Unregister { port } => {
                let mut w = PacketWriter::new(packet_type::UNREGISTER);
                w.write_u16(*port);
                w.finish()
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Packet, WireError> {
        let mut r = PacketReader::new(data)?;
        match r.packet_type() {
            packet_type::FIND_SERVER => Ok(Packet::FindServer {
                session_key: r.read_u64()?,
            }),
            packet_type::SERVER_RESPONSE => Ok(Packet::ServerResponse {
                session_key: r.read_u64()?,
            }),
            packet_type::REGISTER => Ok(Packet::Register {
                port: r.read_u16()?,
                session_key: r.read_u64()?,
            }),
            packet_type::ACK_REGISTER => Ok(Packet::AckRegister {
                session_key: r.read_u64()?,
            }),
            packet_type::SESSION_KEY => Ok(Packet::SessionKey { key: r.read_u64()? }),
            packet_type::GET_LIST => Ok(Packet::GetList {
                version: r.read_u8()?,
                family: ServerFamily::from_tag(r.read_u8()?)?,
            }),
            packet_type::RESPONSE_LIST => decode_server_list(&mut r),
            packet_type::UNREGISTER => Ok(Packet::Unregister { port: r.read_u16()? }),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// Addresses go on the wire in network byte order, ports little-endian
/// like every other integer field.
fn encode_server_list(family: ServerFamily, servers: &[SocketAddr]) -> Result<Vec<u8>, WireError> {
    let mut w = PacketWriter::new(packet_type::RESPONSE_LIST);
    w.write_u8(family.tag());
    w.write_u16(servers.len() as u16);
    for server in servers {
        match server.ip() {
            IpAddr::V4(ip) => w.write_bytes(&ip.octets()),
            IpAddr::V6(ip) => w.write_bytes(&ip.octets()),
        }
        w.write_u16(server.port());
    }
    w.finish()
}

fn decode_server_list(r: &mut PacketReader) -> Result<Packet, WireError> {
    let family = ServerFamily::from_tag(r.read_u8()?)?;
    let count = r.read_u16()?;
    // A spoofed count cannot make us allocate more than one datagram's worth.
    let mut servers = Vec::with_capacity((count as usize).min(family.max_list_entries()));
    for _ in 0..count {
        let ip: IpAddr = match family {
            ServerFamily::V4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(r.read_bytes(4)?);
                Ipv4Addr::from(octets).into()
            }
            ServerFamily::V6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(r.read_bytes(16)?);
                Ipv6Addr::from(octets).into()
            }
        };
        servers.push(SocketAddr::new(ip, r.read_u16()?));
    }
    Ok(Packet::ResponseList { family, servers })
}
