//! Headless exerciser for the server: connects, walks forward for a bit,
//! then fires a lag-compensated hit claim at the first other player it
//! sees, stamped with the server time of the snapshot it aimed at.

use bincode::{deserialize, serialize};
use glam::Vec3;
use shared::{ActorId, Packet, Player, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::sleep;

fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn recv_packet(socket: &UdpSocket, buf: &mut [u8]) -> Option<Packet> {
    match socket.recv_from(buf).await {
        Ok((len, _)) => deserialize::<Packet>(&buf[0..len]).ok(),
        Err(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;

    let connect = Packet::Connect {
        client_version: PROTOCOL_VERSION,
    };
    socket.send_to(&serialize(&connect)?, server_addr).await?;
    println!("Sent connection request to {}", server_addr);

    let mut buf = [0u8; 2048];
    let my_id: ActorId = loop {
        match recv_packet(&socket, &mut buf).await {
            Some(Packet::Connected { client_id }) => break client_id,
            Some(Packet::Disconnected { reason }) => {
                println!("Connection refused: {}", reason);
                return Ok(());
            }
            _ => continue,
        }
    };
    println!("Connected with client id {}", my_id);

    // Walk forward for a second while watching the state stream.
    let mut sequence = 1;
    let mut me: Option<Player> = None;
    let mut victim: Option<Player> = None;
    let mut observed_time = 0.0f64;

    for _ in 0..60 {
        let input = Packet::Input {
            sequence,
            timestamp: get_timestamp(),
            move_x: 0.0,
            move_z: 1.0,
            yaw: 0.0,
            jump: false,
        };
        socket.send_to(&serialize(&input)?, server_addr).await?;
        sequence += 1;

        if let Some(Packet::GameState {
            server_time,
            players,
            ..
        }) = recv_packet(&socket, &mut buf).await
        {
            observed_time = server_time;
            me = players.iter().find(|p| p.id == my_id).cloned();
            victim = players.iter().find(|p| p.id != my_id).cloned();
        }

        sleep(Duration::from_millis(16)).await;
    }

    match (me, victim) {
        (Some(me), Some(victim)) => {
            // Aim at the victim's chest in the snapshot we just observed;
            // the claim carries that snapshot's server time.
            let aim_point = victim.position + Vec3::new(0.0, 1.45, 0.0);
            let start = me.eye_position();
            let direction = (aim_point - start).normalize_or_zero();
            let end = start + direction * 100.0;

            let claim = Packet::HitClaim {
                target: victim.id,
                claimed_time: observed_time,
                ray_start: start,
                ray_end: end,
            };
            println!(
                "Firing at player {} (observed server t={:.3}s)",
                victim.id, observed_time
            );
            socket.send_to(&serialize(&claim)?, server_addr).await?;

            // Wait briefly for the confirmation broadcast.
            for _ in 0..30 {
                if let Some(Packet::HitConfirmed { shooter, target }) =
                    recv_packet(&socket, &mut buf).await
                {
                    println!("Hit confirmed: {} -> {}", shooter, target);
                    break;
                }
                sleep(Duration::from_millis(16)).await;
            }
        }
        _ => println!("No other player connected, skipping hit claim"),
    }

    socket
        .send_to(&serialize(&Packet::Disconnect)?, server_addr)
        .await?;
    println!("Disconnected");
    Ok(())
}
