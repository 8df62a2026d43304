//! UDP transport layer driving the master-server core.
//!
//! Two sockets, three tasks, one owner: a receive task per socket
//! forwards `(endpoint, source, bytes)` into the tick loop over a
//! channel, a sender task drains the outbound queue, and the tick loop
//! itself is the only place core state is ever mutated. Socket I/O never
//! blocks the state machine and the state machine never touches a
//! socket.

use crate::core::MasterCore;
use crate::registry::AddressBook;
use log::{debug, error, info, warn};
use protocol::SEND_MTU;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Which of the two endpoints a datagram arrived on or leaves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Client list-requests and game-server registrations.
    Public,
    /// Liveness probes against candidate servers.
    Probe,
}

/// A datagram queued for sending.
#[derive(Debug)]
pub struct Outbound {
    pub endpoint: Endpoint,
    pub addr: SocketAddr,
    pub data: Vec<u8>,
}

/// Messages funneled from the receive tasks into the tick loop.
#[derive(Debug)]
pub enum MasterMessage {
    Datagram {
        endpoint: Endpoint,
        addr: SocketAddr,
        data: Vec<u8>,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Startup configuration for [`MasterServer`].
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Bind address of the public endpoint.
    pub public_addr: String,
    /// Bind address of the probe endpoint.
    pub probe_addr: String,
    /// Wall-clock length of one frame.
    pub tick_duration: Duration,
}

/// The running service: both sockets plus the core they drive.
pub struct MasterServer {
    public_socket: Arc<UdpSocket>,
    probe_socket: Arc<UdpSocket>,
    core: MasterCore,
    tick_duration: Duration,

    // Communication channels
    inbound_tx: mpsc::UnboundedSender<MasterMessage>,
    inbound_rx: mpsc::UnboundedReceiver<MasterMessage>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl MasterServer {
    /// Binds both endpoints. The service cannot run with only one
    /// socket, so a bind failure propagates out and the process exits
    /// with the diagnostic.
    pub async fn new(
        config: MasterConfig,
        book: Box<dyn AddressBook>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let public_socket = Arc::new(UdpSocket::bind(&config.public_addr).await?);
        let probe_socket = Arc::new(UdpSocket::bind(&config.probe_addr).await?);
        info!(
            "Master server listening on {} (public) and {} (probe)",
            public_socket.local_addr()?,
            probe_socket.local_addr()?
        );

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(MasterServer {
            public_socket,
            probe_socket,
            core: MasterCore::new(book, outbound_tx),
            tick_duration: config.tick_duration,
            inbound_tx,
            inbound_rx,
            outbound_rx,
        })
    }

    /// Address the public endpoint actually bound to.
    pub fn public_addr(&self) -> std::io::Result<SocketAddr> {
        self.public_socket.local_addr()
    }

    /// Address the probe endpoint actually bound to.
    pub fn probe_addr(&self) -> std::io::Result<SocketAddr> {
        self.probe_socket.local_addr()
    }

    fn socket_for(&self, endpoint: Endpoint) -> &Arc<UdpSocket> {
        match endpoint {
            Endpoint::Public => &self.public_socket,
            Endpoint::Probe => &self.probe_socket,
        }
    }

    /// Spawns the task that forwards datagrams from one socket into the
    /// tick loop.
    fn spawn_receiver(&self, endpoint: Endpoint) {
        let socket = Arc::clone(self.socket_for(endpoint));
        let inbound_tx = self.inbound_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; SEND_MTU];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = MasterMessage::Datagram {
                            endpoint,
                            addr,
                            data: buffer[..len].to_vec(),
                        };
                        if inbound_tx.send(message).is_err() {
                            // Tick loop is gone; nothing left to do.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Error receiving on {:?} endpoint: {}", endpoint, e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that writes queued outbound datagrams to the
    /// right socket.
    fn spawn_sender(&mut self) {
        let public_socket = Arc::clone(&self.public_socket);
        let probe_socket = Arc::clone(&self.probe_socket);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(Outbound {
                endpoint,
                addr,
                data,
            }) = outbound_rx.recv().await
            {
                let socket = match endpoint {
                    Endpoint::Public => &public_socket,
                    Endpoint::Probe => &probe_socket,
                };
                if let Err(e) = socket.send_to(&data, addr).await {
                    error!("Failed to send to {}: {}", addr, e);
                }
            }
        });
    }

    /// Main loop: drain inbound datagrams as they arrive, advance the
    /// frame counter once per tick interval.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_receiver(Endpoint::Public);
        self.spawn_receiver(Endpoint::Probe);
        self.spawn_sender();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Master server started");

        loop {
            tokio::select! {
                message = self.inbound_rx.recv() => {
                    match message {
                        Some(MasterMessage::Datagram { endpoint, addr, data }) => {
                            self.core.handle_datagram(endpoint, addr, &data);
                        }
                        Some(MasterMessage::Shutdown) | None => {
                            info!("Master server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.core.run_tick();

                    if self.core.frame() % 60 == 0 && self.core.outstanding_probes() > 0 {
                        debug!(
                            "Frame {}: {} outstanding probes",
                            self.core.frame(),
                            self.core.outstanding_probes()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
