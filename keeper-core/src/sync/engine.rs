//! Sync engine: one watermark / collect / exchange / merge cycle.

use crate::clock;
use crate::models::SecretRecord;
use crate::store::{MergeReport, SecretRepository};
use crate::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::info;

/// The server half of a sync run, as the engine needs it.
pub trait RemoteVault {
    /// The server's watermark for this device.
    fn last_sync(&self) -> impl Future<Output = Result<DateTime<Utc>>> + Send;

    /// Hand over local changes and receive the server's delta in return.
    fn push_items(
        &self,
        items: &[SecretRecord],
    ) -> impl Future<Output = Result<Vec<SecretRecord>>> + Send;
}

/// What one run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Server watermark the outbound batch was computed against.
    pub watermark: DateTime<Utc>,
    pub pushed: usize,
    pub received: usize,
    pub applied: usize,
    pub dropped: usize,
}

/// Orchestrates a sync run against a [`RemoteVault`].
///
/// A failed run leaves the local store untouched, so the next scheduled
/// invocation can simply try again.
pub struct SyncEngine<R> {
    remote: R,
    repo: SecretRepository,
}

impl<R: RemoteVault> SyncEngine<R> {
    pub fn new(remote: R, repo: SecretRepository) -> Self {
        Self { remote, repo }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Run one full cycle.
    pub async fn run_once(&self) -> Result<SyncReport> {
        // The watermark always comes from the server, never from local state.
        let watermark = self.remote.last_sync().await?;

        // Changes after the watermark, plus local writes a previous run missed.
        let outbound = self.repo.list_outbound(watermark)?;
        let inbound = self.remote.push_items(&outbound).await?;
        self.repo.mark_pushed(&outbound)?;
        let MergeReport { applied, dropped } = self.repo.merge_remote(&inbound)?;

        self.repo.record_sync(clock::now())?;

        let report = SyncReport {
            watermark,
            pushed: outbound.len(),
            received: inbound.len(),
            applied,
            dropped,
        };
        info!(
            watermark = %report.watermark,
            pushed = report.pushed,
            received = report.received,
            applied = report.applied,
            dropped = report.dropped,
            "Sync run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SecretKind;
    use crate::store::Database;
    use crate::KeeperError;
    use std::sync::Mutex;

    /// In-process stand-in for the server: a single user's record set plus
    /// one watermark for the device under test.
    #[derive(Default)]
    struct FakeRemote {
        records: Mutex<Vec<SecretRecord>>,
        watermark: Mutex<i64>,
        received: Mutex<Vec<Vec<SecretRecord>>>,
        fail_push: bool,
    }

    impl FakeRemote {
        fn with(records: Vec<SecretRecord>, watermark: i64) -> Self {
            Self {
                records: Mutex::new(records),
                watermark: Mutex::new(watermark),
                ..Self::default()
            }
        }
    }

    impl RemoteVault for FakeRemote {
        fn last_sync(&self) -> impl Future<Output = Result<DateTime<Utc>>> + Send {
            let watermark = *self.watermark.lock().unwrap();
            async move { Ok(clock::from_millis(watermark)) }
        }

        fn push_items(
            &self,
            items: &[SecretRecord],
        ) -> impl Future<Output = Result<Vec<SecretRecord>>> + Send {
            let result = if self.fail_push {
                Err(KeeperError::Network("connection reset".to_string()))
            } else {
                self.received.lock().unwrap().push(items.to_vec());
                let since = clock::from_millis(*self.watermark.lock().unwrap());
                let mut records = self.records.lock().unwrap();
                let mut written = Vec::new();
                for item in items {
                    match records.iter_mut().find(|r| r.uid == item.uid) {
                        Some(existing) if existing.updated_at >= item.updated_at => {}
                        Some(existing) => {
                            *existing = item.clone();
                            written.push(item.uid.clone());
                        }
                        None => {
                            records.push(item.clone());
                            written.push(item.uid.clone());
                        }
                    }
                }
                let delta = records
                    .iter()
                    .filter(|r| r.updated_at > since && !written.contains(&r.uid))
                    .cloned()
                    .collect();
                *self.watermark.lock().unwrap() = clock::to_millis(clock::now());
                Ok(delta)
            };
            async move { result }
        }
    }

    fn record(uid: &str, updated: i64) -> SecretRecord {
        SecretRecord {
            uid: uid.to_string(),
            kind: SecretKind::Text,
            ciphertext: vec![updated as u8; 32],
            description: uid.to_string(),
            created_at: clock::from_millis(1),
            updated_at: clock::from_millis(updated),
            is_deleted: false,
        }
    }

    fn repo() -> SecretRepository {
        SecretRepository::new(Database::in_memory().unwrap().shared())
    }

    #[tokio::test]
    async fn pushes_changes_since_server_watermark() {
        let repo = repo();
        repo.insert(&record("old", 100)).unwrap();
        repo.mark_pushed(&[record("old", 100)]).unwrap();
        repo.insert(&record("new", 300)).unwrap();

        let engine = SyncEngine::new(FakeRemote::with(vec![], 200), repo.clone());
        let report = engine.run_once().await.unwrap();

        assert_eq!(report.watermark, clock::from_millis(200));
        assert_eq!(report.pushed, 1);
        let sent = engine.remote().received.lock().unwrap();
        assert_eq!(sent[0].len(), 1);
        assert_eq!(sent[0][0].uid, "new");
    }

    #[tokio::test]
    async fn merges_inbound_delta() {
        let repo = repo();
        repo.insert(&record("shared", 100)).unwrap();

        let remote = FakeRemote::with(vec![record("shared", 400), record("theirs", 50)], 0);
        let engine = SyncEngine::new(remote, repo.clone());
        let report = engine.run_once().await.unwrap();

        // the local "shared" copy was dropped by the server as older
        assert_eq!(report.received, 2);
        assert_eq!(report.applied, 2);
        assert_eq!(repo.get("shared").unwrap().updated_at, clock::from_millis(400));
        assert!(repo.get("theirs").is_ok());
        assert!(repo.last_synced_at().unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_round_still_completes() {
        let repo = repo();
        let engine = SyncEngine::new(FakeRemote::with(vec![], 0), repo.clone());

        let report = engine.run_once().await.unwrap();

        assert_eq!((report.pushed, report.received, report.applied), (0, 0, 0));
        assert!(repo.last_synced_at().unwrap().is_some());
    }

    #[tokio::test]
    async fn second_run_is_quiet() {
        let repo = repo();
        repo.insert(&record("mine", clock::to_millis(clock::now()) - 10_000)).unwrap();
        let engine = SyncEngine::new(FakeRemote::with(vec![record("theirs", 5)], 0), repo.clone());

        engine.run_once().await.unwrap();
        let second = engine.run_once().await.unwrap();

        assert_eq!(second.pushed, 0);
        assert_eq!(second.received, 0);
    }

    #[tokio::test]
    async fn failed_exchange_changes_nothing_locally() {
        let repo = repo();
        repo.insert(&record("mine", 100)).unwrap();
        let remote = FakeRemote {
            fail_push: true,
            ..FakeRemote::default()
        };
        let engine = SyncEngine::new(remote, repo.clone());

        let before = repo.list_changed_since(clock::epoch()).unwrap();
        assert!(matches!(engine.run_once().await, Err(KeeperError::Network(_))));

        assert_eq!(repo.list_changed_since(clock::epoch()).unwrap(), before);
        assert!(repo.last_synced_at().unwrap().is_none());
    }

    #[tokio::test]
    async fn tombstone_reaches_peer() {
        let device_a = repo();
        let device_b = repo();
        device_a.insert(&record("doomed", 100)).unwrap();

        let server = FakeRemote::with(vec![], 0);
        let a = SyncEngine::new(server, device_a.clone());
        a.run_once().await.unwrap();
        device_a.soft_delete("doomed").unwrap();
        *a.remote().watermark.lock().unwrap() = 0;
        a.run_once().await.unwrap();

        let server = FakeRemote::with(a.remote().records.lock().unwrap().clone(), 0);
        let b = SyncEngine::new(server, device_b.clone());
        b.run_once().await.unwrap();

        assert!(device_b.list_active().unwrap().is_empty());
        let all = device_b.list_changed_since(clock::epoch()).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted);
    }

    /// Edits a record through the shared repository while the exchange is
    /// in flight, the way a concurrent CLI command would.
    struct EditDuringPush {
        inner: FakeRemote,
        repo: SecretRepository,
        edit: Mutex<Option<SecretRecord>>,
    }

    impl RemoteVault for EditDuringPush {
        fn last_sync(&self) -> impl Future<Output = Result<DateTime<Utc>>> + Send {
            self.inner.last_sync()
        }

        fn push_items(
            &self,
            items: &[SecretRecord],
        ) -> impl Future<Output = Result<Vec<SecretRecord>>> + Send {
            if let Some(edit) = self.edit.lock().unwrap().take() {
                self.repo.update(&edit).unwrap();
            }
            self.inner.push_items(items)
        }
    }

    #[tokio::test]
    async fn write_during_exchange_is_pushed_next_run() {
        let repo = repo();
        repo.insert(&record("x", clock::to_millis(clock::now()) - 1_000)).unwrap();
        let mut edit = record("x", 0);
        edit.ciphertext = b"user edit".to_vec();

        let remote = EditDuringPush {
            inner: FakeRemote::with(vec![], 0),
            repo: repo.clone(),
            edit: Mutex::new(Some(edit)),
        };
        let engine = SyncEngine::new(remote, repo.clone());
        for _ in 0..3 {
            engine.run_once().await.unwrap();
        }

        let sent = engine.remote().inner.received.lock().unwrap();
        let uids: Vec<Vec<&str>> = sent
            .iter()
            .map(|batch| batch.iter().map(|r| r.uid.as_str()).collect())
            .collect();
        assert_eq!(uids, vec![vec!["x"], vec!["x"], vec![]]);
        assert_eq!(sent[1][0].ciphertext, b"user edit".to_vec());
        assert!(!repo.is_pending("x").unwrap());

        let server = engine.remote().inner.records.lock().unwrap();
        assert_eq!(server[0].ciphertext, b"user edit".to_vec());
    }
}
