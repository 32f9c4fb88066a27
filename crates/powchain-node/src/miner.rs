use crate::error::NodeError;
use crate::node::Node;
use powchain_core::{pow, Block, RejectReason};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MinerState {
    Idle,
    Mining,
    Appending,
}

/// Result of one pass through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// Pool was empty.
    Idle,
    Mined(Block),
    /// Another block took the height first; the work is thrown away.
    Stale(RejectReason),
    /// The search was abandoned because the chain moved or the node is
    /// shutting down.
    Cancelled,
}

pub struct Miner {
    node: Arc<Node>,
    state: watch::Sender<MinerState>,
    workers: Option<Arc<rayon::ThreadPool>>,
}

impl Miner {
    pub fn new(node: Arc<Node>) -> Result<Self, NodeError> {
        let threads = node.config().mining_threads;
        let workers = if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("pow-{i}"))
                .build()
                .map_err(|e| NodeError::Mining(e.to_string()))?;
            Some(Arc::new(pool))
        } else {
            None
        };
        let (state, _) = watch::channel(MinerState::Idle);
        Ok(Self {
            node,
            state,
            workers,
        })
    }

    pub fn subscribe_state(&self) -> watch::Receiver<MinerState> {
        self.state.subscribe()
    }

    /// Snapshot the pool, search for a nonce off the async runtime, then
    /// append. The search is cancelled as soon as the chain height changes.
    pub async fn mine_once(&self) -> Result<MineOutcome, NodeError> {
        let mut height = self.node.subscribe_height();
        height.borrow_and_update();
        let mut shutdown = self.node.subscribe_shutdown();
        if *shutdown.borrow_and_update() {
            return Ok(MineOutcome::Cancelled);
        }

        let (snapshot, candidate, difficulty) = {
            let ledger = self.node.ledger().lock().await;
            if ledger.pool.is_empty() {
                self.state.send_replace(MinerState::Idle);
                return Ok(MineOutcome::Idle);
            }
            let snapshot = ledger.pool.snapshot();
            let candidate = Block::candidate(
                ledger.chain.next_index(),
                &snapshot.transactions,
                &ledger.chain.tip().hash,
            )
            .with_miner(self.node.id().to_string());
            (snapshot, candidate, ledger.chain.difficulty())
        };

        self.state.send_replace(MinerState::Mining);
        debug!(
            index = candidate.index,
            txs = snapshot.transactions.len(),
            "mining candidate"
        );
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let workers = self.workers.clone();
        let mut search = tokio::task::spawn_blocking(move || match workers {
            Some(pool) => pool.install(|| pow::search_parallel(candidate, difficulty, &flag)),
            None => pow::search(candidate, difficulty, &flag),
        });

        let found = tokio::select! {
            res = &mut search => res?,
            _ = height.changed() => {
                cancel.store(true, Ordering::Relaxed);
                search.await?;
                debug!("chain advanced during search, restarting");
                None
            }
            _ = shutdown.changed() => {
                cancel.store(true, Ordering::Relaxed);
                search.await?;
                None
            }
        };
        let Some(block) = found else {
            self.state.send_replace(MinerState::Idle);
            return Ok(MineOutcome::Cancelled);
        };

        self.state.send_replace(MinerState::Appending);
        let outcome = match self.node.append_mined(block.clone(), &snapshot).await {
            Ok(()) => MineOutcome::Mined(block),
            Err(reason) => {
                info!(index = block.index, %reason, "discarding stale mined block");
                MineOutcome::Stale(reason)
            }
        };
        self.state.send_replace(MinerState::Idle);
        Ok(outcome)
    }

    /// Mine until shutdown. Sleeps `idle_interval` whenever the pool is empty
    /// and retries at once after stale or cancelled work.
    pub async fn run(self) {
        let mut shutdown = self.node.subscribe_shutdown();
        let idle = self.node.config().idle_interval;
        info!(threads = self.node.config().mining_threads, "miner started");
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let pause = match self.mine_once().await {
                Ok(MineOutcome::Idle) => true,
                Ok(MineOutcome::Mined(_)) | Ok(MineOutcome::Stale(_)) | Ok(MineOutcome::Cancelled) => {
                    false
                }
                Err(e) => {
                    error!(error = %e, "mining pass failed");
                    true
                }
            };
            if pause {
                tokio::select! {
                    _ = tokio::time::sleep(idle) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!("miner stopped");
    }
}
