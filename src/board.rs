use crate::aggregate::Aggregation;
use crate::types::{latency_key, Provider, Region, RegionLatency};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

#[derive(Default)]
struct BoardState {
    epoch: u64,
    entries: HashMap<String, RegionLatency>,
    total_samples: u64,
    revision: u64,
}

/// Shared latency state, one entry per (provider, region) pair.
///
/// Writes are tagged with the epoch of the scheduler that produced them.
/// Once the epoch moves on, late results from the old scheduler are dropped.
pub struct LatencyBoard {
    aggregation: Aggregation,
    state: Mutex<BoardState>,
    changes: watch::Sender<u64>,
}

impl LatencyBoard {
    pub fn new(aggregation: Aggregation) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            aggregation,
            state: Mutex::new(BoardState::default()),
            changes,
        }
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        // A panic while holding the lock leaves the map consistent enough to keep reading
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Invalidate every writer bound to the current epoch.
    pub fn advance_epoch(&self) -> u64 {
        let mut state = self.state();
        state.epoch += 1;
        state.epoch
    }

    /// Append a sample and recompute the aggregate.
    /// Returns false (and changes nothing) when `epoch` is stale.
    pub fn record(&self, epoch: u64, provider: &Provider, region: &Region, sample_ms: u64) -> bool {
        let revision = {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!(
                    epoch,
                    current = state.epoch,
                    region = %region.key,
                    "dropping sample from cancelled scheduler"
                );
                return false;
            }

            let key = latency_key(&provider.key, &region.key);
            let entry = state
                .entries
                .entry(key)
                .or_insert_with(|| RegionLatency::new(provider.clone(), region.clone()));
            entry.samples.push(sample_ms);
            entry.latency_ms = Some(self.aggregation.fold(&entry.samples));

            state.total_samples += 1;
            state.revision += 1;
            state.revision
        };

        self.changes.send_replace(revision);
        true
    }

    pub fn reset(&self) {
        let revision = {
            let mut state = self.state();
            state.entries.clear();
            state.total_samples = 0;
            state.revision += 1;
            state.revision
        };
        self.changes.send_replace(revision);
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<RegionLatency> {
        self.state().entries.get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<RegionLatency> {
        self.state().entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn total_samples(&self) -> u64 {
        self.state().total_samples
    }

    /// Receiver that is notified (with a revision number) after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(country: &str) -> (Provider, Region) {
        (
            Provider {
                key: "aws".to_string(),
                display_name: "AWS".to_string(),
            },
            Region {
                key: "eu-west-1".to_string(),
                display_name: "Ireland".to_string(),
                country: country.to_string(),
                location: "Dublin".to_string(),
                geo: "Europe".to_string(),
                ping_url: Some("https://example.com".to_string()),
            },
        )
    }

    #[test]
    fn test_record_creates_entry_lazily() {
        let board = LatencyBoard::new(Aggregation::Median);
        let (provider, region) = pair("IE");
        assert!(board.get("aws-eu-west-1").is_none());

        assert!(board.record(board.epoch(), &provider, &region, 30));
        assert!(board.record(board.epoch(), &provider, &region, 10));
        assert!(board.record(board.epoch(), &provider, &region, 200));

        let entry = board.get("aws-eu-west-1").unwrap();
        assert_eq!(entry.samples, vec![30, 10, 200]);
        assert_eq!(entry.latency_ms, Some(30.0));
        assert_eq!(board.len(), 1);
        assert_eq!(board.total_samples(), 3);
    }

    #[test]
    fn test_stale_epoch_rejected() {
        let board = LatencyBoard::new(Aggregation::Latest);
        let (provider, region) = pair("IE");
        let old = board.epoch();
        board.advance_epoch();

        assert!(!board.record(old, &provider, &region, 30));
        assert!(board.get("aws-eu-west-1").is_none());
        assert_eq!(board.total_samples(), 0);
    }

    #[test]
    fn test_reset() {
        let board = LatencyBoard::new(Aggregation::Median);
        let (provider, region) = pair("IE");
        board.record(board.epoch(), &provider, &region, 30);
        board.reset();
        assert_eq!(board.len(), 0);
        assert_eq!(board.total_samples(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_notified() {
        let board = LatencyBoard::new(Aggregation::Median);
        let mut rx = board.subscribe();
        let (provider, region) = pair("IE");

        board.record(board.epoch(), &provider, &region, 30);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
