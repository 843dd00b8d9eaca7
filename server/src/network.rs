//! Server network layer handling UDP communications and the simulation tick

use crate::client_manager::{Client, ClientManager};
use crate::game::Simulation;
use crate::world::Controller;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ActionState, Packet, PlayerAction, Role, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Longest simulated step a single tick may take after a stall
const MAX_TICK_DT: f32 = 0.1;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client: Client },
    Shutdown,
}

/// Messages sent from the simulation loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet, exclude: Option<u32> },
}

/// Milliseconds since the Unix epoch, saturating
pub fn timestamp_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

/// Authoritative server: owns the simulation and talks UDP to observers
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    simulation: Simulation,
    tick_duration: Duration,

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
        simulation: Simulation,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            simulation,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop [`Server::run`] from another task
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

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

    /// Spawns task that drains the outgoing packet queue
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

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
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

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Despawns whatever a departed client was driving
    fn release_client(&mut self, client: &Client) {
        if let Some(entity) = client.entity_id {
            self.simulation.remove_player(entity);
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let existing = {
                    let mut clients = self.clients.write().await;
                    clients
                        .find_client_by_addr(addr)
                        .and_then(|id| clients.remove_client(&id))
                };
                if let Some(existing) = existing {
                    info!("Replacing existing client {} from {}", existing.id, addr);
                    self.release_client(&existing);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                let Some(client_id) = client_id else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                    return;
                };

                let (entity_id, weapon_id) =
                    self.simulation.add_player(Controller::Remote(client_id));
                {
                    let mut clients = self.clients.write().await;
                    clients.bind_avatar(client_id, entity_id, weapon_id);
                }
                self.simulation.start_play();

                self.send_packet(
                    Packet::Connected {
                        client_id,
                        entity_id,
                        weapon_id,
                    },
                    addr,
                );
            }

            Packet::Action {
                sequence,
                timestamp,
                action,
            } => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    clients.add_action(
                        client_id,
                        ActionState {
                            sequence,
                            timestamp,
                            action,
                        },
                    );
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    clients
                        .find_client_by_addr(addr)
                        .and_then(|id| clients.remove_client(&id))
                };
                if let Some(client) = removed {
                    self.release_client(&client);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies every queued action in client timestamp order
    async fn process_actions(&mut self) {
        let mut clients = self.clients.write().await;
        let actions = clients.get_chronological_actions();

        for (client_id, state) in actions {
            let Some(entity) = clients.get(client_id).and_then(|c| c.entity_id) else {
                continue;
            };
            apply_action(&mut self.simulation, entity, &state.action);
            clients.mark_action_processed(client_id, state.sequence);
        }
        clients.cleanup_processed_actions();
    }

    /// Sends each client its own view of the world
    async fn send_snapshots(&self) {
        let recipients = {
            let clients = self.clients.read().await;
            clients.recipients()
        };
        if recipients.is_empty() {
            return;
        }

        let timestamp = timestamp_millis();
        for (_, addr, entity, last_processed_action) in recipients {
            let packet = self
                .simulation
                .snapshot_packet(entity, last_processed_action, timestamp);
            self.send_packet(packet, addr);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client }) => {
                            warn!("Client {} timed out", client.id);
                            self.release_client(&client);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            self.broadcast_packet(
                                Packet::Disconnected { reason: "Server shutting down".to_string() },
                                None,
                            );
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_TICK_DT);
                    last_tick = now;

                    self.process_actions().await;
                    self.simulation.step(dt);
                    self.send_snapshots().await;

                    let tick = self.simulation.tick();
                    if tick % 60 == 0 {
                        debug!(
                            "Tick {}: {:?} wave {}, {} entities",
                            tick,
                            self.simulation.wave_state(),
                            self.simulation.wave_count(),
                            self.simulation.world().len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// Applies one player action to the simulation. Remote requests reach the
/// weapon as observer-originated and are forwarded to the authority path.
pub fn apply_action(simulation: &mut Simulation, entity: shared::EntityId, action: &PlayerAction) {
    match action {
        PlayerAction::Move { x, y } => simulation.set_player_move(entity, *x, *y),
        PlayerAction::Aim { direction } => simulation.set_player_aim(entity, *direction),
        PlayerAction::Fire => {
            simulation.request_fire(entity, Role::ObserverProxy);
        }
        PlayerAction::StartFire => simulation.start_fire(entity),
        PlayerAction::StopFire => simulation.stop_fire(entity),
    }
}
