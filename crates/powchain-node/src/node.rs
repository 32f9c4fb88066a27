use crate::config::NodeConfig;
use crate::constants::{ROUTE_RECEIVE_BLOCK, ROUTE_RECEIVE_TRANSACTION, ROUTE_REGISTER};
use crate::error::NodeError;
use crate::peers::{PeerClient, PeerRegistry};
use powchain_core::{
    constants::HASH_HEX_SIZE, now_millis, Block, Chain, PoolSnapshot, RejectReason, StateStore,
    Transaction, TransactionPool, TransactionRequest,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Chain and pool always change together under one lock, so "append the
/// block, then clear what it included" is atomic.
#[derive(Debug)]
pub struct Ledger {
    pub chain: Chain,
    pub pool: TransactionPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Head {
    pub height: u64,
    pub hash: String,
}

pub struct Node {
    id: Uuid,
    config: NodeConfig,
    ledger: Mutex<Ledger>,
    peers: PeerRegistry,
    store: Arc<dyn StateStore>,
    height: watch::Sender<u64>,
    shutdown: watch::Sender<bool>,
}

impl Node {
    /// Load persisted chain and peers, seeding genesis on an empty store.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn StateStore>,
        client: Arc<dyn PeerClient>,
    ) -> Result<Arc<Self>, NodeError> {
        let blocks = store.load_blocks()?;
        let fresh = blocks.is_empty();
        let chain = Chain::from_blocks(blocks, config.difficulty)?;
        if fresh {
            if let Err(e) = store.put_block(chain.tip()) {
                warn!(error = %e, "failed to persist genesis block");
            }
        }
        let peers = PeerRegistry::new(
            &config.advertise,
            store.load_peers()?,
            client,
            store.clone(),
            config.activity_window,
            config.peer_timeout,
        );

        let id = Uuid::new_v4();
        info!(
            node_id = %id,
            address = %config.advertise,
            height = chain.len(),
            difficulty = chain.difficulty().zeros(),
            "node state loaded"
        );
        let (height, _) = watch::channel(chain.len() as u64);
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            id,
            config,
            ledger: Mutex::new(Ledger {
                chain,
                pool: TransactionPool::new(),
            }),
            peers,
            store,
            height,
            shutdown,
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn ledger(&self) -> &Mutex<Ledger> {
        &self.ledger
    }

    /// Chain length, updated after every append.
    pub fn subscribe_height(&self) -> watch::Receiver<u64> {
        self.height.subscribe()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Local submission: pool it, then gossip it one hop.
    pub async fn submit_transaction(
        &self,
        req: TransactionRequest,
    ) -> Result<Transaction, NodeError> {
        check_request(&req)?;
        let tx = Transaction::from(req);
        self.ledger.lock().await.pool.add(tx.clone());
        info!(sender = %tx.sender, receiver = %tx.receiver, amount = tx.amount, "transaction added");
        self.peers
            .broadcast(ROUTE_RECEIVE_TRANSACTION, &TransactionRequest::from(&tx))
            .await;
        Ok(tx)
    }

    /// Peer-originated transaction. Never re-broadcast, which bounds gossip
    /// to a single hop.
    pub async fn receive_transaction(
        &self,
        req: TransactionRequest,
    ) -> Result<Transaction, NodeError> {
        check_request(&req)?;
        let tx = Transaction::from(req);
        self.ledger.lock().await.pool.add(tx.clone());
        info!(sender = %tx.sender, receiver = %tx.receiver, "transaction received from peer");
        Ok(tx)
    }

    /// Peer-originated block: the same append rule as a locally mined one.
    pub async fn receive_block(&self, block: Block) -> Result<(), NodeError> {
        if block.hash.len() != HASH_HEX_SIZE {
            return Err(NodeError::Validation(format!(
                "block hash must be {HASH_HEX_SIZE} hex characters"
            )));
        }
        let mut ledger = self.ledger.lock().await;
        ledger.chain.append(block.clone())?;
        let dropped = ledger.pool.remove_included(&block.transactions);
        self.after_append(&ledger, &block);
        info!(index = block.index, hash = %block.hash, dropped, "accepted block from peer");
        Ok(())
    }

    /// Appending step of the miner: append under the lock and clear exactly
    /// the transactions that were captured when mining began.
    pub async fn append_mined(
        &self,
        block: Block,
        snapshot: &PoolSnapshot,
    ) -> Result<(), RejectReason> {
        {
            let mut ledger = self.ledger.lock().await;
            ledger.chain.append(block.clone())?;
            ledger.pool.commit(snapshot);
            self.after_append(&ledger, &block);
        }
        info!(index = block.index, hash = %block.hash, txs = block.transactions.len(), "mined block appended");
        self.peers.broadcast(ROUTE_RECEIVE_BLOCK, &block).await;
        Ok(())
    }

    /// Runs with the ledger lock held, so blocks reach the store strictly in
    /// height order. The write is synchronous and blocks this worker for the
    /// duration of one store write.
    fn after_append(&self, ledger: &Ledger, block: &Block) {
        if let Err(e) = self.store.put_block(block) {
            warn!(index = block.index, error = %e, "failed to persist block");
        }
        self.height.send_replace(ledger.chain.len() as u64);
    }

    pub async fn chain(&self) -> Vec<Block> {
        self.ledger.lock().await.chain.blocks().to_vec()
    }

    pub async fn head(&self) -> Head {
        let ledger = self.ledger.lock().await;
        let tip = ledger.chain.tip();
        Head {
            height: tip.index,
            hash: tip.hash.clone(),
        }
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.lock().await.pool.pending()
    }

    pub async fn active_peers(&self) -> Vec<String> {
        self.peers.active(now_millis()).await
    }

    /// Register `address` and return every known peer address.
    pub async fn register_peer(&self, address: &str) -> Result<Vec<String>, NodeError> {
        let parsed = reqwest::Url::parse(address)
            .map_err(|e| NodeError::Validation(format!("invalid peer address: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NodeError::Validation(
                "peer address must be an http(s) URL".to_string(),
            ));
        }
        self.peers.register(address).await;
        Ok(self.peers.addresses().await)
    }

    pub fn health(&self) -> Health {
        Health {
            status: "active",
            node_id: self.id.to_string(),
        }
    }

    /// Register with a seed node once. The seed and the peers it reports are
    /// added locally too, so gossip flows in both directions.
    pub async fn bootstrap(&self, seed: &str) -> Result<Vec<String>, NodeError> {
        let body = json!({ "address": self.config.advertise });
        let reply = self
            .peers
            .client()
            .post_json(seed, ROUTE_REGISTER, &body, self.config.bootstrap_timeout)
            .await
            .map_err(|source| NodeError::PeerUnreachable {
                peer: seed.to_string(),
                source,
            })?;

        self.peers.register(seed).await;
        let reported = reply
            .get("peers")
            .and_then(|p| p.as_array())
            .map(|peers| {
                peers
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for peer in &reported {
            self.peers.register(peer).await;
        }
        info!(seed, reported = reported.len(), "registered with bootstrap node");
        Ok(self.peers.addresses().await)
    }

    pub fn flush(&self) {
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "failed to flush state store");
        }
    }
}

fn check_request(req: &TransactionRequest) -> Result<(), NodeError> {
    if req.sender.trim().is_empty() {
        return Err(NodeError::Validation("sender is required".to_string()));
    }
    if req.receiver.trim().is_empty() {
        return Err(NodeError::Validation("receiver is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::mock::MockClient;
    use powchain_core::{Difficulty, MemoryStore};

    const EASY: Difficulty = Difficulty::new(2);

    fn config() -> NodeConfig {
        NodeConfig {
            difficulty: EASY,
            ..NodeConfig::default()
        }
    }

    fn node_with(client: Arc<MockClient>, store: Arc<MemoryStore>) -> Arc<Node> {
        Node::new(config(), store, client).unwrap()
    }

    fn req(sender: &str, receiver: &str, amount: u64) -> TransactionRequest {
        TransactionRequest {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp: None,
        }
    }

    async fn mine_peer_block(node: &Node, txs: &[Transaction]) -> Block {
        let ledger = node.ledger().lock().await;
        Block::mine(ledger.chain.next_index(), txs, &ledger.chain.tip().hash, EASY)
    }

    #[tokio::test]
    async fn fresh_node_persists_genesis() {
        let store = Arc::new(MemoryStore::new());
        let node = node_with(Arc::new(MockClient::default()), store.clone());
        let chain = node.chain().await;
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 0);
        assert_eq!(chain[0].previous_hash, "0");
        assert_eq!(store.load_blocks().unwrap(), chain);
        assert_eq!(node.health().status, "active");
    }

    /// Reads an empty history and fails every write.
    struct ReadOnlyStore;

    impl StateStore for ReadOnlyStore {
        fn load_blocks(&self) -> anyhow::Result<Vec<Block>> {
            Ok(vec![])
        }
        fn put_block(&self, _: &Block) -> anyhow::Result<()> {
            anyhow::bail!("disk is read-only")
        }
        fn load_peers(&self) -> anyhow::Result<powchain_core::PeerMap> {
            Ok(Default::default())
        }
        fn put_peer(&self, _: &str, _: u64) -> anyhow::Result<()> {
            anyhow::bail!("disk is read-only")
        }
        fn remove_peer(&self, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk is read-only")
        }
        fn flush(&self) -> anyhow::Result<()> {
            anyhow::bail!("disk is read-only")
        }
    }

    #[tokio::test]
    async fn write_failures_never_abort_operations() {
        let node = Node::new(
            config(),
            Arc::new(ReadOnlyStore),
            Arc::new(MockClient::default()),
        )
        .unwrap();
        assert_eq!(node.chain().await.len(), 1);

        node.register_peer("http://10.0.0.2:5000").await.unwrap();
        node.submit_transaction(req("A", "B", 1)).await.unwrap();
        let block = mine_peer_block(&node, &node.pending_transactions().await).await;
        node.receive_block(block).await.unwrap();

        assert_eq!(node.chain().await.len(), 2);
        assert!(node.pending_transactions().await.is_empty());
        assert_eq!(node.peers().addresses().await, vec!["http://10.0.0.2:5000"]);
        node.flush();
    }

    #[tokio::test]
    async fn store_receives_blocks_in_height_order() {
        let store = Arc::new(MemoryStore::new());
        let node = node_with(Arc::new(MockClient::default()), store.clone());
        for i in 0..3 {
            node.submit_transaction(req("A", "B", i)).await.unwrap();
            let snapshot = node.ledger().lock().await.pool.snapshot();
            let block = mine_peer_block(&node, &snapshot.transactions).await;
            if i % 2 == 0 {
                node.append_mined(block, &snapshot).await.unwrap();
            } else {
                node.receive_block(block).await.unwrap();
            }
        }
        assert_eq!(store.load_blocks().unwrap(), node.chain().await);
    }

    #[tokio::test]
    async fn submit_pools_and_gossips() {
        let client = Arc::new(MockClient::default());
        let node = node_with(client.clone(), Arc::new(MemoryStore::new()));
        node.register_peer("http://10.0.0.2:5000").await.unwrap();

        let tx = node.submit_transaction(req("A", "B", 5)).await.unwrap();
        assert_eq!(node.pending_transactions().await, vec![tx.clone()]);

        let posts = client.posts_to(ROUTE_RECEIVE_TRANSACTION);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "http://10.0.0.2:5000");
        assert_eq!(posts[0].1["sender"], "A");
        assert_eq!(posts[0].1["timestamp"], tx.timestamp);
    }

    #[tokio::test]
    async fn received_transaction_is_not_rebroadcast() {
        let client = Arc::new(MockClient::default());
        let node = node_with(client.clone(), Arc::new(MemoryStore::new()));
        node.register_peer("http://10.0.0.2:5000").await.unwrap();

        let mut gossiped = req("A", "B", 5);
        gossiped.timestamp = Some(1_700_000_000_000);
        let tx = node.receive_transaction(gossiped).await.unwrap();
        assert_eq!(tx.timestamp, 1_700_000_000_000);
        assert_eq!(node.pending_transactions().await.len(), 1);
        assert!(client.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let node = node_with(Arc::new(MockClient::default()), Arc::new(MemoryStore::new()));
        assert!(matches!(
            node.submit_transaction(req("", "B", 1)).await,
            Err(NodeError::Validation(_))
        ));
        assert!(matches!(
            node.receive_transaction(req("A", " ", 1)).await,
            Err(NodeError::Validation(_))
        ));
        assert!(node.pending_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn receive_block_appends_and_clears_included() {
        let store = Arc::new(MemoryStore::new());
        let node = node_with(Arc::new(MockClient::default()), store.clone());
        let mut gossiped = req("A", "B", 5);
        gossiped.timestamp = Some(42);
        let tx = node.receive_transaction(gossiped).await.unwrap();
        node.receive_transaction(req("C", "D", 1)).await.unwrap();

        let mut height = node.subscribe_height();
        let block = mine_peer_block(&node, &[tx]).await;
        node.receive_block(block.clone()).await.unwrap();

        assert_eq!(node.chain().await.len(), 2);
        assert_eq!(*height.borrow_and_update(), 2);
        let pending = node.pending_transactions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender, "C");
        assert_eq!(store.load_blocks().unwrap().last(), Some(&block));
    }

    #[tokio::test]
    async fn receive_block_rejections_leave_chain_unchanged() {
        let node = node_with(Arc::new(MockClient::default()), Arc::new(MemoryStore::new()));
        let tip = node.head().await.hash;

        let wrong_height = Block::mine(3, &[], &tip, EASY);
        assert!(matches!(
            node.receive_block(wrong_height).await,
            Err(NodeError::Rejected(RejectReason::WrongHeight { expected: 1, got: 3 }))
        ));

        let broken = Block::mine(1, &[], "elsewhere", EASY);
        assert!(matches!(
            node.receive_block(broken).await,
            Err(NodeError::Rejected(RejectReason::BrokenLink))
        ));

        let mut short = Block::mine(1, &[], &tip, EASY);
        short.hash = "00".to_string();
        assert!(matches!(
            node.receive_block(short).await,
            Err(NodeError::Validation(_))
        ));

        assert_eq!(node.chain().await.len(), 1);
    }

    #[tokio::test]
    async fn register_validates_address() {
        let node = node_with(Arc::new(MockClient::default()), Arc::new(MemoryStore::new()));
        assert!(matches!(
            node.register_peer("not a url").await,
            Err(NodeError::Validation(_))
        ));
        assert!(matches!(
            node.register_peer("ftp://peer:21").await,
            Err(NodeError::Validation(_))
        ));
        let peers = node.register_peer("http://10.0.0.9:5000").await.unwrap();
        assert_eq!(peers, vec!["http://10.0.0.9:5000"]);
        assert_eq!(node.active_peers().await, vec!["http://10.0.0.9:5000"]);
    }

    #[tokio::test]
    async fn bootstrap_registers_seed_and_reported_peers() {
        let client = Arc::new(MockClient::default());
        *client.reply.lock().unwrap() = json!({
            "peers": ["http://127.0.0.1:5000", "http://10.0.0.3:5000"]
        });
        let node = node_with(client.clone(), Arc::new(MemoryStore::new()));

        let peers = node.bootstrap("http://seed:5000").await.unwrap();
        assert_eq!(peers, vec!["http://10.0.0.3:5000", "http://seed:5000"]);
        let posts = client.posts_to(ROUTE_REGISTER);
        assert_eq!(posts[0].1["address"], node.config().advertise);
    }

    #[tokio::test]
    async fn bootstrap_failure_is_reported_not_fatal() {
        let client = Arc::new(MockClient::with_down(&["http://seed:5000"]));
        let node = node_with(client, Arc::new(MemoryStore::new()));
        assert!(matches!(
            node.bootstrap("http://seed:5000").await,
            Err(NodeError::PeerUnreachable { .. })
        ));
        assert!(node.peers().addresses().await.is_empty());
    }

    #[tokio::test]
    async fn restart_reloads_chain_and_peers() {
        let store = Arc::new(MemoryStore::new());
        let first = node_with(Arc::new(MockClient::default()), store.clone());
        first.register_peer("http://10.0.0.2:5000").await.unwrap();
        let block = mine_peer_block(&first, &[]).await;
        first.receive_block(block).await.unwrap();
        drop(first);

        let second = node_with(Arc::new(MockClient::default()), store);
        assert_eq!(second.chain().await.len(), 2);
        assert_eq!(second.peers().addresses().await, vec!["http://10.0.0.2:5000"]);
    }
}
