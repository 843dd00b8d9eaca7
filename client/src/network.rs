use crate::effects::{CosmeticEvent, EffectPlayer, LogEffectPlayer};
use crate::replica::ObserverReplica;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{EntityId, Packet, PlayerAction, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

/// How often the observer sends its aim and fire requests
const ACTION_INTERVAL: Duration = Duration::from_millis(250);

/// Headless observer: mirrors the server's snapshots and plays cosmetic
/// effects through an [`EffectPlayer`]
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    entity_id: Option<EntityId>,
    weapon_id: Option<EntityId>,
    connected: bool,

    replica: ObserverReplica,
    effects: Box<dyn EffectPlayer + Send>,

    ping_ms: u64,
    fake_ping_ms: u64,
    auto_fire: bool,
    sequence: u32,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        auto_fire: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_effects(
            server_addr,
            fake_ping_ms,
            auto_fire,
            Box::new(LogEffectPlayer::new()),
        )
        .await
    }

    pub async fn with_effects(
        server_addr: &str,
        fake_ping_ms: u64,
        auto_fire: bool,
        effects: Box<dyn EffectPlayer + Send>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            entity_id: None,
            weapon_id: None,
            connected: false,
            replica: ObserverReplica::new(),
            effects,
            ping_ms: 0,
            fake_ping_ms,
            auto_fire,
            sequence: 0,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity_id
    }

    pub fn replica(&self) -> &ObserverReplica {
        &self.replica
    }

    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    pub async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                entity_id,
                weapon_id,
            } => {
                info!(
                    "Connected! Client ID: {}, avatar {}, weapon {}",
                    client_id, entity_id, weapon_id
                );
                self.client_id = Some(client_id);
                self.entity_id = Some(entity_id);
                self.weapon_id = Some(weapon_id);
                self.connected = true;
            }

            Packet::Snapshot { timestamp, .. } => {
                if timestamp > 0 {
                    self.ping_ms = now_millis().saturating_sub(timestamp);
                }
                for event in self.replica.apply_packet(&packet) {
                    self.effects.play(&event);
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                self.entity_id = None;
                self.weapon_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    pub async fn send_action(
        &mut self,
        action: PlayerAction,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }

        self.sequence += 1;
        let packet = Packet::Action {
            sequence: self.sequence,
            timestamp: now_millis(),
            action,
        };
        self.send_packet(&packet).await?;

        // Our own shot never comes back in snapshots, so show it now
        if let (PlayerAction::Fire, Some(weapon)) = (action, self.weapon_id) {
            self.effects.play(&CosmeticEvent::LocalShot { weapon });
        }
        Ok(())
    }

    /// Aims at the nearest threat and fires once
    async fn auto_fire_step(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(entity) = self.entity_id else {
            return Ok(());
        };
        if let Some(direction) = self.replica.aim_at_nearest_threat(entity) {
            self.send_action(PlayerAction::Aim { direction }).await?;
            self.send_action(PlayerAction::Fire).await?;
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut action_interval = interval(ACTION_INTERVAL);
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }
                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = action_interval.tick() => {
                    if self.auto_fire && self.connected {
                        if let Err(e) = self.auto_fire_step().await {
                            error!("Error sending action: {}", e);
                        }
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, leaving");
                    break;
                }
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
