//! Ordering-independent result collector.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::TestResult;

/// Collects finished results until the publisher drains them.
///
/// Results are keyed by [`TestResult::id`]; adding a result whose id is
/// already buffered replaces the earlier one. `add` never blocks on I/O and
/// is safe to call from concurrent tasks. `drain` empties the buffer under
/// the same lock, so a result is returned by exactly one drain.
///
/// No size limit is enforced here.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Insertion order of ids, used to return results in drain order.
    order: Vec<String>,
    results: HashMap<String, TestResult>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a result.
    pub fn add(&self, result: TestResult) {
        let mut inner = self.lock();
        if !inner.results.contains_key(&result.id) {
            inner.order.push(result.id.clone());
        }
        inner.results.insert(result.id.clone(), result);
    }

    /// Removes and returns every buffered result.
    pub fn drain(&self) -> Vec<TestResult> {
        let mut inner = self.lock();
        let order = std::mem::take(&mut inner.order);
        let mut results = std::mem::take(&mut inner.results);
        order
            .into_iter()
            .filter_map(|id| results.remove(&id))
            .collect()
    }

    /// Removes and returns at most `limit` results, oldest first.
    pub fn drain_up_to(&self, limit: usize) -> Vec<TestResult> {
        let mut inner = self.lock();
        let take = limit.min(inner.order.len());
        let ids: Vec<String> = inner.order.drain(..take).collect();
        ids.into_iter()
            .filter_map(|id| inner.results.remove(&id))
            .collect()
    }

    /// Number of buffered results.
    pub fn count(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use rand::Rng;

    use super::*;
    use crate::model::TestStatus;

    #[test]
    fn test_add_and_drain() {
        let buffer = ResultBuffer::new();
        buffer.add(TestResult::new("a", TestStatus::Passed));
        buffer.add(TestResult::new("b", TestStatus::Failed));
        assert_eq!(buffer.count(), 2);

        let drained = buffer.drain();
        let titles: Vec<_> = drained.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_same_id_replaces() {
        let buffer = ResultBuffer::new();
        let first = TestResult::new("a", TestStatus::Failed);
        let mut second = first.clone();
        second.status = TestStatus::Passed;

        buffer.add(first);
        buffer.add(second);

        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].status, TestStatus::Passed);
    }

    #[test]
    fn test_drain_up_to() {
        let buffer = ResultBuffer::new();
        for i in 0..5 {
            buffer.add(TestResult::new(format!("t{}", i), TestStatus::Passed));
        }

        let first = buffer.drain_up_to(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "t0");
        assert_eq!(buffer.count(), 3);
        assert_eq!(buffer.drain_up_to(10).len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        for _round in 0..5 {
            let buffer = Arc::new(ResultBuffer::new());
            let n = 200;

            let mut handles = Vec::new();
            for i in 0..n {
                let buffer = Arc::clone(&buffer);
                let delay = rand::thread_rng().gen_range(0..3);
                handles.push(tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    buffer.add(TestResult::new(format!("t{}", i), TestStatus::Passed));
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            let drained = buffer.drain();
            assert_eq!(drained.len(), n);
            let ids: HashSet<_> = drained.iter().map(|r| r.id.clone()).collect();
            assert_eq!(ids.len(), n);
            assert!(buffer.drain().is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_drains_never_duplicate() {
        let buffer = Arc::new(ResultBuffer::new());
        let n = 500;

        let producer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                for i in 0..n {
                    buffer.add(TestResult::new(format!("t{}", i), TestStatus::Passed));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut seen = Vec::new();
        while !producer.is_finished() {
            seen.extend(buffer.drain());
            tokio::task::yield_now().await;
        }
        producer.await.unwrap();
        seen.extend(buffer.drain());

        let ids: HashSet<_> = seen.iter().map(|r| r.id.clone()).collect();
        assert_eq!(seen.len(), n);
        assert_eq!(ids.len(), n);
    }
}
