//! Peer registry, gossip fan-out and liveness pruning.
//!
//! Every peer is an HTTP base URL mapped to the last time it answered. Any
//! failed contact removes the peer on the spot; there is no backoff and no
//! retry, a removed peer comes back only by registering again.

use crate::config::normalize_address;
use crate::constants::ROUTE_HEALTH;
use crate::node::Node;
use async_trait::async_trait;
use powchain_core::{now_millis, PeerMap, StateStore};
use serde::Serialize;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::RwLock, task::JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("peer answered with status {0}")]
    Status(u16),
}

impl PeerError {
    /// Whether the failure says the peer is gone, as opposed to the peer
    /// answering and declining the payload (4xx).
    pub fn is_liveness_failure(&self) -> bool {
        !matches!(self, PeerError::Status(code) if (400..500).contains(code))
    }
}

impl From<reqwest::Error> for PeerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PeerError::Timeout
        } else if let Some(status) = e.status() {
            PeerError::Status(status.as_u16())
        } else {
            PeerError::Connect(e.to_string())
        }
    }
}

/// Transport used to reach other nodes.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// POST `body` to `peer` + `route`. Non-2xx answers are errors.
    async fn post_json(
        &self,
        peer: &str,
        route: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, PeerError>;

    /// Liveness check against the peer's health endpoint.
    async fn probe(&self, peer: &str, timeout: Duration) -> Result<(), PeerError>;
}

#[derive(Clone, Default)]
pub struct HttpPeerClient {
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn post_json(
        &self,
        peer: &str,
        route: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, PeerError> {
        let res = self
            .http
            .post(format!("{peer}{route}"))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(PeerError::Status(status.as_u16()));
        }
        // An empty or non-JSON acknowledgement still counts as delivered.
        Ok(res.json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn probe(&self, peer: &str, timeout: Duration) -> Result<(), PeerError> {
        let res = self
            .http
            .get(format!("{peer}{ROUTE_HEALTH}"))
            .timeout(timeout)
            .send()
            .await?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(PeerError::Status(res.status().as_u16()))
        }
    }
}

/// Outcome of one fan-out round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: Vec<String>,
    pub declined: Vec<String>,
    pub removed: Vec<String>,
}

pub struct PeerRegistry {
    self_address: String,
    peers: RwLock<HashMap<String, u64>>,
    client: Arc<dyn PeerClient>,
    store: Arc<dyn StateStore>,
    activity_window: Duration,
    timeout: Duration,
}

impl PeerRegistry {
    pub fn new(
        self_address: &str,
        initial: PeerMap,
        client: Arc<dyn PeerClient>,
        store: Arc<dyn StateStore>,
        activity_window: Duration,
        timeout: Duration,
    ) -> Self {
        let self_address = normalize_address(self_address);
        let peers = initial
            .into_iter()
            .filter(|(address, _)| *address != self_address)
            .collect();
        Self {
            self_address,
            peers: RwLock::new(peers),
            client,
            store,
            activity_window,
            timeout,
        }
    }

    pub fn client(&self) -> &Arc<dyn PeerClient> {
        &self.client
    }

    /// Add `address` unless it is this node or already known. Returns whether
    /// the peer is new; a known peer only gets its last-seen refreshed.
    pub async fn register(&self, address: &str) -> bool {
        let address = normalize_address(address);
        if address.is_empty() || address == self.self_address {
            return false;
        }
        let now = now_millis();
        // The store is written under the guard so it sees changes in the
        // same order as the map.
        let added = {
            let mut peers = self.peers.write().await;
            let added = peers.insert(address.clone(), now).is_none();
            self.persist_put(&address, now);
            added
        };
        if added {
            info!(peer = %address, "peer registered");
        }
        added
    }

    pub async fn remove(&self, address: &str) -> bool {
        let removed = {
            let mut peers = self.peers.write().await;
            let removed = peers.remove(address).is_some();
            if removed {
                if let Err(e) = self.store.remove_peer(address) {
                    warn!(peer = %address, error = %e, "failed to persist peer removal");
                }
            }
            removed
        };
        if removed {
            warn!(peer = %address, "peer removed");
        }
        removed
    }

    /// Refresh last-seen for a peer still registered. A peer removed while
    /// the contact was in flight stays removed.
    pub async fn touch(&self, address: &str, now: u64) {
        let mut peers = self.peers.write().await;
        if let Some(last_seen) = peers.get_mut(address) {
            *last_seen = now;
            self.persist_put(address, now);
        }
    }

    pub async fn addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = self.peers.read().await.keys().cloned().collect();
        out.sort();
        out
    }

    pub async fn last_seen(&self, address: &str) -> Option<u64> {
        self.peers.read().await.get(address).copied()
    }

    /// Peers heard from within the activity window before `now`.
    pub async fn active(&self, now: u64) -> Vec<String> {
        let window = self.activity_window.as_millis() as u64;
        let mut out: Vec<String> = self
            .peers
            .read()
            .await
            .iter()
            .filter(|(_, last_seen)| now.saturating_sub(**last_seen) < window)
            .map(|(address, _)| address.clone())
            .collect();
        out.sort();
        out
    }

    /// Deliver `payload` to every registered peer concurrently. Peers that
    /// fail to take it are dropped; nothing is retried.
    pub async fn broadcast<T: Serialize + ?Sized>(&self, route: &str, payload: &T) -> Delivery {
        let body = match serde_json::to_value(payload) {
            Ok(body) => Arc::new(body),
            Err(e) => {
                warn!(route, error = %e, "payload not serializable, broadcast skipped");
                return Delivery::default();
            }
        };

        let mut tasks = JoinSet::new();
        for peer in self.addresses().await {
            let client = self.client.clone();
            let body = body.clone();
            let route = route.to_string();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let res = client.post_json(&peer, &route, &body, timeout).await;
                (peer, res)
            });
        }

        let mut delivery = Delivery::default();
        while let Some(joined) = tasks.join_next().await {
            let Ok((peer, res)) = joined else { continue };
            match res {
                Ok(_) => {
                    debug!(peer = %peer, route, "delivered");
                    self.touch(&peer, now_millis()).await;
                    delivery.delivered.push(peer);
                }
                Err(e) if !e.is_liveness_failure() => {
                    debug!(peer = %peer, route, error = %e, "peer declined payload");
                    self.touch(&peer, now_millis()).await;
                    delivery.declined.push(peer);
                }
                Err(e) => {
                    warn!(peer = %peer, route, error = %e, "delivery failed");
                    self.remove(&peer).await;
                    delivery.removed.push(peer);
                }
            }
        }
        delivery
    }

    /// Probe every peer once. Success refreshes last-seen, any failure
    /// removes the peer. Returns the addresses removed.
    pub async fn prune(&self) -> Vec<String> {
        let mut tasks = JoinSet::new();
        for peer in self.addresses().await {
            let client = self.client.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let res = client.probe(&peer, timeout).await;
                (peer, res)
            });
        }

        let mut removed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((peer, res)) = joined else { continue };
            match res {
                Ok(()) => self.touch(&peer, now_millis()).await,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "health probe failed");
                    if self.remove(&peer).await {
                        removed.push(peer);
                    }
                }
            }
        }
        removed.sort();
        removed
    }

    fn persist_put(&self, address: &str, last_seen: u64) {
        if let Err(e) = self.store.put_peer(address, last_seen) {
            warn!(peer = %address, error = %e, "failed to persist peer");
        }
    }
}

/// Probe all peers every `prune_interval` until shutdown.
pub async fn run_pruner(node: Arc<Node>) {
    let mut shutdown = node.subscribe_shutdown();
    let interval = node.config().prune_interval;
    info!(?interval, "peer pruner started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        let removed = node.peers().prune().await;
        if !removed.is_empty() {
            info!(count = removed.len(), "pruned unreachable peers");
        }
    }
    info!("peer pruner stopped");
}
