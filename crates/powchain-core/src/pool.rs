use crate::Transaction;
use std::collections::VecDeque;

/// Pending transactions in arrival order. No deduplication and no checks on
/// the transfer itself: the ledger is a log, not an account model.
#[derive(Debug, Default)]
pub struct TransactionPool {
    entries: VecDeque<(u64, Transaction)>,
    next_seq: u64,
}

/// The pool contents captured when mining started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Sequence number of the first entry *not* captured.
    pub up_to: u64,
    pub transactions: Vec<Transaction>,
}

impl PoolSnapshot {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tx: Transaction) {
        self.entries.push_back((self.next_seq, tx));
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.entries.iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Copy of everything pending. Nothing is removed until [`commit`].
    ///
    /// [`commit`]: TransactionPool::commit
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            up_to: self.next_seq,
            transactions: self.pending(),
        }
    }

    /// Drop exactly the entries captured by `snapshot`. Anything that arrived
    /// after it stays pending for the next block.
    pub fn commit(&mut self, snapshot: &PoolSnapshot) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(seq, _)| *seq >= snapshot.up_to);
        before - self.entries.len()
    }

    /// Remove one pending copy of each transaction in `included`, used when a
    /// peer's block carrying them is accepted.
    pub fn remove_included(&mut self, included: &[Transaction]) -> usize {
        let mut removed = 0;
        for tx in included {
            if let Some(pos) = self.entries.iter().position(|(_, pending)| pending == tx) {
                self.entries.remove(pos);
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(sender: &str, amount: u64) -> Transaction {
        Transaction {
            sender: sender.to_string(),
            receiver: "Bob".to_string(),
            amount,
            timestamp: 1_600_000_000_000,
        }
    }

    #[test]
    fn keeps_insertion_order_and_duplicates() {
        let mut pool = TransactionPool::new();
        pool.add(tx("A", 1));
        pool.add(tx("B", 2));
        pool.add(tx("A", 1));
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.pending(), vec![tx("A", 1), tx("B", 2), tx("A", 1)]);
    }

    #[test]
    fn snapshot_does_not_drain() {
        let mut pool = TransactionPool::new();
        pool.add(tx("A", 1));
        let snap = pool.snapshot();
        assert_eq!(snap.transactions, vec![tx("A", 1)]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn commit_keeps_later_arrivals() {
        let mut pool = TransactionPool::new();
        pool.add(tx("A", 1));
        pool.add(tx("B", 2));
        let snap = pool.snapshot();
        // Identical to a captured entry, but arrived after the snapshot.
        pool.add(tx("A", 1));
        pool.add(tx("C", 3));
        assert_eq!(pool.commit(&snap), 2);
        assert_eq!(pool.pending(), vec![tx("A", 1), tx("C", 3)]);
    }

    #[test]
    fn commit_of_empty_snapshot_is_noop() {
        let mut pool = TransactionPool::new();
        let snap = pool.snapshot();
        assert!(snap.is_empty());
        pool.add(tx("A", 1));
        assert_eq!(pool.commit(&snap), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn remove_included_drops_one_copy_each() {
        let mut pool = TransactionPool::new();
        pool.add(tx("A", 1));
        pool.add(tx("A", 1));
        pool.add(tx("B", 2));
        assert_eq!(pool.remove_included(&[tx("A", 1), tx("Z", 9)]), 1);
        assert_eq!(pool.pending(), vec![tx("A", 1), tx("B", 2)]);
    }

    #[test]
    fn commit_twice_removes_nothing_new() {
        let mut pool = TransactionPool::new();
        pool.add(tx("A", 1));
        let snap = pool.snapshot();
        assert_eq!(pool.commit(&snap), 1);
        pool.add(tx("B", 2));
        assert_eq!(pool.commit(&snap), 0);
        assert_eq!(pool.pending(), vec![tx("B", 2)]);
    }
}
