//! Server network layer: UDP transport, packet dispatch, and the
//! authoritative game loop that records rewind history every tick and
//! answers hit claims.

use crate::client_manager::ClientManager;
use crate::game::GameState;
use crate::utils::{get_timestamp, ServerClock};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ActorId, InputState, Packet, Player, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: ActorId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ActorId>,
    },
}

/// Main server coordinating networking, simulation, and hit verification
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    clock: ServerClock,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        rewind_enabled: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!(
            "Server listening on {} (rewind {})",
            addr,
            if rewind_enabled { "on" } else { "off" }
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state: GameState::new(rewind_enabled),
            clock: ServerClock::new(),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet, exclude: Option<ActorId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet: packet.clone(),
            exclude,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let response = Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                    return;
                }

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&existing_id);
                    self.game_state.remove_player(&existing_id);
                }

                // Try to add new client
                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    self.game_state.add_player(client_id);
                    let response = Packet::Connected { client_id };
                    self.send_packet(&response, addr).await;
                } else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                }
            }

            Packet::Input {
                sequence,
                timestamp,
                move_x,
                move_z,
                yaw,
                jump,
            } => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let input = InputState {
                        sequence,
                        timestamp,
                        move_x,
                        move_z,
                        yaw,
                        jump,
                    };

                    let mut clients = self.clients.write().await;
                    clients.add_input(client_id, input);
                }
            }

            Packet::HitClaim {
                target,
                claimed_time,
                ray_start,
                ray_end,
            } => {
                let shooter = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                let shooter = match shooter {
                    Some(shooter) => shooter,
                    None => {
                        debug!("hit claim from unconnected address {}", addr);
                        return;
                    }
                };

                let allowed = {
                    let mut clients = self.clients.write().await;
                    clients.allow_claim(shooter)
                };
                if !allowed {
                    return;
                }

                let confirmed = self.game_state.verify_hit_claim(
                    shooter,
                    target,
                    claimed_time,
                    ray_start,
                    ray_end,
                );

                if confirmed {
                    info!(
                        "hit confirmed: {} -> {} at claimed t={:.3}s (server t={:.3}s)",
                        shooter,
                        target,
                        claimed_time,
                        self.clock.now()
                    );
                    // One-way presentation notification (ragdoll, marker).
                    let packet = Packet::HitConfirmed { shooter, target };
                    self.broadcast_packet(&packet, None).await;
                } else {
                    debug!(
                        "hit denied: {} -> {} at claimed t={:.3}s",
                        shooter, target, claimed_time
                    );
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                    self.game_state.remove_player(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies queued inputs in timestamp order, then advances the
    /// simulation one step.
    async fn process_inputs(&mut self, dt: f32) {
        let all_inputs = {
            let clients = self.clients.read().await;
            clients.get_chronological_inputs()
        };

        for (client_id, input) in &all_inputs {
            self.game_state.apply_input(*client_id, input, dt);

            let mut clients = self.clients.write().await;
            clients.mark_input_processed(*client_id, input.sequence);
        }

        self.game_state.update_physics(dt);

        let mut clients = self.clients.write().await;
        clients.cleanup_processed_inputs();
    }

    /// Broadcasts current game state to all connected clients
    async fn broadcast_game_state(&mut self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        let players: Vec<Player> = self.game_state.players.values().cloned().collect();
        let last_processed_input = {
            let clients = self.clients.read().await;
            clients.get_last_processed_inputs()
        };

        let packet = Packet::GameState {
            tick: self.game_state.tick,
            server_time: self.clock.now(),
            timestamp: get_timestamp(),
            last_processed_input,
            players,
        };

        self.broadcast_packet(&packet, None).await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.game_state.remove_player(&client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.process_inputs(dt).await;
                    self.game_state.tick += 1;
                    // Record rewind history after physics so snapshots hold
                    // this tick's final transforms.
                    self.game_state.record_histories(self.clock.now());
                    self.broadcast_game_state().await;

                    if self.game_state.tick % 300 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {:.1}Hz, server t={:.1}s",
                                   self.game_state.tick, client_count, 1.0 / dt, self.clock.now());
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, 1);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_game_message_broadcast_hit_confirmed() {
        let packet = Packet::HitConfirmed {
            shooter: 1,
            target: 2,
        };

        let msg = GameMessage::BroadcastPacket {
            packet: packet.clone(),
            exclude: None,
        };

        match msg {
            GameMessage::BroadcastPacket { packet: p, exclude } => {
                assert_eq!(exclude, None);
                match p {
                    Packet::HitConfirmed { shooter, target } => {
                        assert_eq!(shooter, 1);
                        assert_eq!(target, 2);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let packet = Packet::HitClaim {
            target: 2,
            claimed_time: 1.5,
            ray_start: Vec3::ZERO,
            ray_end: Vec3::new(0.0, 0.0, 50.0),
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        assert!(tx.send(msg).is_ok());

        let received = rx.try_recv();
        assert!(received.is_ok());

        match received.unwrap() {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::HitClaim { target, .. } => {
                        assert_eq!(target, 2);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect { client_version: 1 },
            Packet::Connected { client_id: 42 },
            Packet::Disconnect,
            Packet::Disconnected {
                reason: "Test".to_string(),
            },
            Packet::HitClaim {
                target: 3,
                claimed_time: 7.25,
                ray_start: Vec3::new(1.0, 1.6, 0.0),
                ray_end: Vec3::new(1.0, 1.6, 40.0),
            },
            Packet::HitConfirmed {
                shooter: 1,
                target: 3,
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet);
            assert!(serialized.is_ok());

            let deserialized: Result<Packet, _> = deserialize(&serialized.unwrap());
            assert!(deserialized.is_ok());

            match (&packet, &deserialized.unwrap()) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::Connected { .. }, Packet::Connected { .. }) => {}
                (Packet::Disconnect, Packet::Disconnect) => {}
                (Packet::Disconnected { .. }, Packet::Disconnected { .. }) => {}
                (Packet::HitClaim { .. }, Packet::HitClaim { .. }) => {}
                (Packet::HitConfirmed { .. }, Packet::HitConfirmed { .. }) => {}
                _ => panic!("Packet type mismatch after roundtrip"),
            }
        }
    }

    #[test]
    fn test_tick_duration_validation() {
        let valid_durations = vec![
            Duration::from_millis(16), // 60 Hz
            Duration::from_millis(33), // 30 Hz
            Duration::from_millis(8),  // 120 Hz
        ];

        for duration in valid_durations {
            assert!(duration.as_millis() > 0);
            assert!(duration.as_millis() < 1000);

            let hz = 1000.0 / duration.as_millis() as f64;
            assert!((1.0..=1000.0).contains(&hz));
        }
    }

    #[test]
    fn test_buffer_fits_largest_packet() {
        // GameState with a full 32-player roster must fit the recv buffer.
        let players: Vec<Player> = (0..32)
            .map(|id| Player::new(id, Vec3::new(id as f32, 0.0, -(id as f32))))
            .collect();

        let packet = Packet::GameState {
            tick: u32::MAX,
            server_time: 1e6,
            timestamp: u64::MAX,
            last_processed_input: (0..32).map(|id| (id, u32::MAX)).collect(),
            players,
        };

        let serialized = serialize(&packet).unwrap();
        assert!(serialized.len() < 2048, "packet too big: {}", serialized.len());
    }
}
