//! Two real nodes talking over loopback HTTP.

use powchain_core::{Difficulty, MemoryStore, TransactionRequest};
use powchain_node::{api, HttpPeerClient, MineOutcome, Miner, Node, NodeConfig};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};

struct Running {
    node: Arc<Node>,
    address: String,
    server: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        self.server.abort();
        let _ = self.server.await;
    }
}

async fn spawn_node() -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen = listener.local_addr().unwrap();
    let address = format!("http://{listen}");
    let config = NodeConfig {
        listen,
        advertise: address.clone(),
        difficulty: Difficulty::new(2),
        peer_timeout: Duration::from_secs(2),
        ..NodeConfig::default()
    };
    let node = Node::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(HttpPeerClient::new()),
    )
    .unwrap();
    let app = api::router(node.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Running {
        node,
        address,
        server,
    }
}

fn req(sender: &str, amount: u64) -> TransactionRequest {
    TransactionRequest {
        sender: sender.into(),
        receiver: "Z".into(),
        amount,
        timestamp: None,
    }
}

#[tokio::test]
async fn bootstrap_links_both_directions() {
    let seed = spawn_node().await;
    let joiner = spawn_node().await;

    let known = joiner.node.bootstrap(&seed.address).await.unwrap();
    assert_eq!(known, vec![seed.address.clone()]);
    assert_eq!(
        seed.node.peers().addresses().await,
        vec![joiner.address.clone()]
    );

    joiner.stop().await;
    seed.stop().await;
}

#[tokio::test]
async fn transactions_and_blocks_propagate() {
    let a = spawn_node().await;
    let b = spawn_node().await;
    b.node.bootstrap(&a.address).await.unwrap();

    a.node.submit_transaction(req("A", 1)).await.unwrap();
    a.node.submit_transaction(req("B", 2)).await.unwrap();
    assert_eq!(b.node.pending_transactions().await.len(), 2);

    let miner = Miner::new(a.node.clone()).unwrap();
    let MineOutcome::Mined(block) = miner.mine_once().await.unwrap() else {
        panic!("expected a mined block");
    };

    let b_chain = b.node.chain().await;
    assert_eq!(b_chain.len(), 2);
    assert_eq!(b_chain[1], block);
    assert_eq!(b_chain[1].miner, a.node.id().to_string());
    // Gossip keeps the origin's timestamp, so the pooled copies match and go.
    assert!(b.node.pending_transactions().await.is_empty());

    b.stop().await;
    a.stop().await;
}

#[tokio::test]
async fn unreachable_peer_is_dropped_on_broadcast() {
    let a = spawn_node().await;
    let b = spawn_node().await;
    a.node.register_peer(&b.address).await.unwrap();
    b.stop().await;

    a.node.submit_transaction(req("A", 1)).await.unwrap();
    assert!(a.node.peers().addresses().await.is_empty());
    assert_eq!(a.node.pending_transactions().await.len(), 1);

    a.stop().await;
}

#[tokio::test]
async fn prune_keeps_live_peers_only() {
    let a = spawn_node().await;
    let b = spawn_node().await;
    a.node.register_peer(&b.address).await.unwrap();
    a.node.register_peer("http://127.0.0.1:1").await.unwrap();

    let removed = a.node.peers().prune().await;
    assert_eq!(removed, vec!["http://127.0.0.1:1".to_string()]);
    assert_eq!(a.node.peers().addresses().await, vec![b.address.clone()]);

    b.stop().await;
    a.stop().await;
}
