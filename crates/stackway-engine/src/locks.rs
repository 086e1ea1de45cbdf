use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-instance-name async mutex table. All writers to a stack instance
/// (manager and status reducer alike) serialize through here.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn test_same_name_serializes() {
        let table = Arc::new(LockTable::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut join_set = JoinSet::new();

        for _ in 0..20 {
            let table = Arc::clone(&table);
            let counter = Arc::clone(&counter);
            join_set.spawn(async move {
                let _guard = table.lock("demo").await;
                // If two tasks ever hold the lock together, the counter
                // would observe an intermediate value above 1.
                let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(inside, 1);
                tokio::task::yield_now().await;
                counter.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while let Some(result) = join_set.join_next().await {
            result.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distinct_names_do_not_block() {
        let table = LockTable::new();
        let first = table.lock("a").await;
        // A second name must be immediately lockable while "a" is held.
        let second = table.lock("b").await;
        drop(first);
        drop(second);
    }
}
