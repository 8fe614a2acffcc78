//! Connection lifecycle and input buffering for the authoritative server.
//!
//! Besides the usual connect/disconnect/timeout bookkeeping this module
//! enforces the server's abuse posture around hit claims: a per-client
//! token budget caps how many claims a client may submit per second, so a
//! modified client cannot spray the verifier with speculative shots.

use log::{info, warn};
use shared::{ActorId, InputState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Claims allowed per client per second. Generous next to any realistic
/// fire rate, tight next to a flood.
const CLAIM_BUDGET_PER_SECOND: u32 = 20;

/// One connected client: address, liveness, buffered inputs, and the claim
/// budget state.
#[derive(Debug)]
pub struct Client {
    pub id: ActorId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Highest input sequence applied to the simulation, echoed back to
    /// the client for reconciliation.
    pub last_processed_input: u32,
    /// Inputs waiting for the next tick, kept sorted by sequence.
    pub pending_inputs: Vec<InputState>,
    claims_this_window: u32,
    claim_window_start: Instant,
}

impl Client {
    pub fn new(id: ActorId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
            claims_this_window: 0,
            claim_window_start: Instant::now(),
        }
    }

    /// Buffers one input, keeping the queue ordered by sequence so packets
    /// arriving out of order are still applied in order. Duplicate
    /// sequences are dropped.
    pub fn add_input(&mut self, input: InputState) {
        self.last_seen = Instant::now();
        if self
            .pending_inputs
            .iter()
            .any(|pending| pending.sequence == input.sequence)
        {
            return;
        }
        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Spends one unit of the claim budget. Returns false when the client
    /// has exhausted its allowance for the current one-second window.
    pub fn try_spend_claim(&mut self) -> bool {
        self.last_seen = Instant::now();

        if self.claim_window_start.elapsed() >= Duration::from_secs(1) {
            self.claim_window_start = Instant::now();
            self.claims_this_window = 0;
        }

        if self.claims_this_window >= CLAIM_BUDGET_PER_SECOND {
            return false;
        }
        self.claims_this_window += 1;
        true
    }
}

/// Roster of connected clients with capacity enforcement, address lookup,
/// and chronological input collection for the tick loop.
pub struct ClientManager {
    clients: HashMap<ActorId, Client>,
    next_client_id: ActorId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection, or returns `None` at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ActorId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &ActorId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ActorId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn add_input(&mut self, client_id: ActorId, input: InputState) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.add_input(input);
            true
        } else {
            false
        }
    }

    /// Charges a hit claim against the client's budget. Unknown clients
    /// and clients over budget both get `false`; the caller drops the
    /// claim without verifying it.
    pub fn allow_claim(&mut self, client_id: ActorId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                let allowed = client.try_spend_claim();
                if !allowed {
                    warn!(
                        "client {} exceeded hit claim budget, claim dropped",
                        client_id
                    );
                }
                allowed
            }
            None => false,
        }
    }

    /// All unprocessed inputs across clients, ordered by client timestamp
    /// so the tick applies them deterministically.
    pub fn get_chronological_inputs(&self) -> Vec<(ActorId, InputState)> {
        let mut all_inputs: Vec<(ActorId, InputState)> = Vec::new();

        for (client_id, client) in &self.clients {
            for input in &client.pending_inputs {
                if input.sequence > client.last_processed_input {
                    all_inputs.push((*client_id, input.clone()));
                }
            }
        }

        all_inputs.sort_by_key(|(_, input)| input.timestamp);
        all_inputs
    }

    pub fn mark_input_processed(&mut self, client_id: ActorId, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            client
                .pending_inputs
                .retain(|input| input.sequence > client.last_processed_input);
        }
    }

    pub fn get_last_processed_inputs(&self) -> HashMap<ActorId, u32> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.last_processed_input))
            .collect()
    }

    /// Drops clients that have gone silent and reports their ids so the
    /// game state can despawn them.
    pub fn check_timeouts(&mut self) -> Vec<ActorId> {
        let timeout = Duration::from_secs(5);
        let timed_out: Vec<ActorId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(ActorId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
