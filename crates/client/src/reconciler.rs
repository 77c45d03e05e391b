//! Write-queue reconciler.
//!
//! Stories written while offline (or whose upload failed) are queued in the
//! store and replayed by [`Reconciler::sweep`]. A sweep uploads every unsynced
//! write once, in insertion order, flags the successes and purges them.
//! Failed uploads stay queued for the next sweep.
//!
//! Sweeps run on demand, when connectivity comes back, on an explicit sync
//! request, or on a periodic tick. Concurrent sweeps are not coordinated, so
//! the remote upload must tolerate a duplicate.

use std::sync::Arc;
use std::time::Duration;
use storyline_core::{Error, NewPendingWrite, Store};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Delivers one story to the remote API.
#[async_trait::async_trait]
pub trait StoryUploader: Send + Sync {
    async fn upload(&self, story: &NewPendingWrite) -> Result<(), Error>;
}

/// Result of [`Reconciler::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Uploaded immediately.
    Delivered,
    /// Stored for a later sweep.
    Queued { local_id: i64 },
}

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: u32,
    pub delivered: u32,
    pub failed: u32,
    pub purged: u64,
}

/// Explicit sync request, optionally answered with the sweep result.
#[derive(Debug, Default)]
pub struct SyncRequest {
    reply: Option<oneshot::Sender<Result<SweepReport, Error>>>,
}

/// Sending side of the explicit sync trigger.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncRequest>,
}

impl SyncHandle {
    /// Ask the running loop to sweep and wait for the result.
    pub async fn sync(&self) -> Result<SweepReport, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncRequest { reply: Some(reply) })
            .await
            .map_err(|_| Error::InvalidInput("reconciler loop is not running".into()))?;
        rx.await
            .map_err(|_| Error::InvalidInput("reconciler loop stopped before answering".into()))?
    }

    /// Ask for a sweep without waiting for it.
    pub fn request(&self) -> bool {
        self.tx.try_send(SyncRequest::default()).is_ok()
    }
}

/// Create the explicit sync channel.
pub fn sync_channel(capacity: usize) -> (SyncHandle, mpsc::Receiver<SyncRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SyncHandle { tx }, rx)
}

/// Replays queued writes against a [`StoryUploader`].
#[derive(Clone)]
pub struct Reconciler {
    store: Store,
    uploader: Arc<dyn StoryUploader>,
    online: watch::Receiver<bool>,
}

impl Reconciler {
    /// `online` carries the current connectivity; the loop sweeps on every
    /// offline to online transition and stops once the sender is dropped.
    pub fn new(store: Store, uploader: Arc<dyn StoryUploader>, online: watch::Receiver<bool>) -> Self {
        Self { store, uploader, online }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Upload `story` now if online, otherwise (or if the upload fails) queue it.
    ///
    /// # Errors
    ///
    /// Invalid input, or a store failure while queueing. A queued story is
    /// never dropped silently.
    pub async fn submit(&self, story: &NewPendingWrite) -> Result<SubmitOutcome, Error> {
        story.validate()?;

        if self.is_online() {
            match self.uploader.upload(story).await {
                Ok(()) => return Ok(SubmitOutcome::Delivered),
                Err(e) => tracing::warn!("upload failed, queueing for replay: {e}"),
            }
        }

        let queued = self.store.enqueue_pending_write(story).await?;
        Ok(SubmitOutcome::Queued { local_id: queued.local_id })
    }

    /// Replay every unsynced write once, in insertion order.
    ///
    /// # Errors
    ///
    /// Fails without uploading anything if the queue cannot be read. If the
    /// store becomes unreachable mid-sweep, the sweep stops after the upload
    /// it could not record; that write stays queued and is replayed again.
    pub async fn sweep(&self) -> Result<SweepReport, Error> {
        let writes = self.store.list_pending_writes().await?;
        let mut report = SweepReport::default();

        for write in writes.iter().filter(|w| !w.synced) {
            report.attempted += 1;

            if let Err(e) = self.uploader.upload(&NewPendingWrite::from(write)).await {
                tracing::warn!(local_id = write.local_id, "replay failed, keeping write queued: {e}");
                report.failed += 1;
                continue;
            }

            if let Err(e) = self.store.mark_synced(write.local_id).await {
                tracing::warn!(local_id = write.local_id, "uploaded but could not flag as synced, aborting sweep: {e}");
                return Err(e);
            }
            report.delivered += 1;
        }

        report.purged = self.store.purge_synced().await?;

        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            purged = report.purged,
            "sweep finished"
        );
        Ok(report)
    }

    async fn sweep_logged(&self, trigger: &str) -> Result<SweepReport, Error> {
        tracing::debug!("sweep triggered by {trigger}");
        let result = self.sweep().await;
        if let Err(e) = &result {
            tracing::warn!("sweep triggered by {trigger} failed: {e}");
        }
        result
    }

    /// Drive sweeps from the connectivity channel, explicit sync requests and
    /// an optional periodic tick.
    ///
    /// Returns the number of sweeps run once the connectivity sender is dropped.
    pub async fn run(&self, mut requests: mpsc::Receiver<SyncRequest>, period: Option<Duration>) -> u64 {
        let mut online = self.online.clone();
        let mut was_online = *online.borrow_and_update();
        let mut requests_open = true;
        let mut ticker = period.map(|p| {
            let mut t = tokio::time::interval_at(Instant::now() + p, p);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        let mut sweeps = 0u64;

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        tracing::info!("connectivity channel closed, stopping reconciler");
                        break;
                    }
                    let now_online = *online.borrow_and_update();
                    if now_online && !was_online {
                        let _ = self.sweep_logged("connectivity restored").await;
                        sweeps += 1;
                    }
                    was_online = now_online;
                }
                request = requests.recv(), if requests_open => {
                    match request {
                        Some(request) => {
                            let result = self.sweep_logged("sync request").await;
                            sweeps += 1;
                            if let Some(reply) = request.reply {
                                let _ = reply.send(result);
                            }
                        }
                        None => requests_open = false,
                    }
                }
                _ = async {
                    match ticker.as_mut() {
                        Some(t) => { t.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if was_online {
                        let _ = self.sweep_logged("periodic tick").await;
                        sweeps += 1;
                    }
                }
            }
        }

        sweeps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeUploader {
        failing: Mutex<HashSet<String>>,
        uploaded: Mutex<Vec<String>>,
        close_after_upload: Mutex<Option<Store>>,
    }

    impl FakeUploader {
        fn failing(descriptions: &[&str]) -> Self {
            let uploader = Self::default();
            uploader
                .failing
                .lock()
                .unwrap()
                .extend(descriptions.iter().map(|d| d.to_string()));
            uploader
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn uploaded(&self) -> Vec<String> {
            self.uploaded.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl StoryUploader for FakeUploader {
        async fn upload(&self, story: &NewPendingWrite) -> Result<(), Error> {
            self.uploaded.lock().unwrap().push(story.description.clone());
            if self.failing.lock().unwrap().contains(&story.description) {
                return Err(Error::Network(format!("upload of {} failed", story.description)));
            }
            let closing = self.close_after_upload.lock().unwrap().take();
            if let Some(store) = closing {
                store.close().await.unwrap();
            }
            Ok(())
        }
    }

    fn make_write(description: &str) -> NewPendingWrite {
        NewPendingWrite::new(description, vec![0xff, 0xd8])
    }

    async fn make_reconciler(uploader: Arc<FakeUploader>, online: bool) -> (Reconciler, Store, watch::Sender<bool>) {
        let store = Store::open_in_memory().await.unwrap();
        let (tx, rx) = watch::channel(online);
        (Reconciler::new(store.clone(), uploader, rx), store, tx)
    }

    #[tokio::test]
    async fn test_submit_online_delivers() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, store, _tx) = make_reconciler(uploader.clone(), true).await;

        assert_eq!(reconciler.submit(&make_write("a")).await.unwrap(), SubmitOutcome::Delivered);
        assert!(store.list_pending_writes().await.unwrap().is_empty());
        assert_eq!(uploader.uploaded(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_submit_offline_queues_without_upload() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, store, _tx) = make_reconciler(uploader.clone(), false).await;

        let outcome = reconciler.submit(&make_write("a")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
        assert!(uploader.uploaded().is_empty());
        assert_eq!(store.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_failed_upload_queues() {
        let uploader = Arc::new(FakeUploader::failing(&["a"]));
        let (reconciler, store, _tx) = make_reconciler(uploader, true).await;

        let outcome = reconciler.submit(&make_write("a")).await.unwrap();
        let SubmitOutcome::Queued { local_id } = outcome else { panic!("expected queued, got {outcome:?}") };
        assert!(store.get_pending_write(local_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_fails_loudly_when_queue_unavailable() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, store, _tx) = make_reconciler(uploader, false).await;
        store.close().await.unwrap();

        assert!(reconciler.submit(&make_write("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_partial_failure_keeps_order() {
        let uploader = Arc::new(FakeUploader::failing(&["b"]));
        let (reconciler, store, _tx) = make_reconciler(uploader.clone(), false).await;
        for d in ["a", "b", "c"] {
            reconciler.submit(&make_write(d)).await.unwrap();
        }

        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report, SweepReport { attempted: 3, delivered: 2, failed: 1, purged: 2 });
        assert_eq!(uploader.uploaded(), vec!["a", "b", "c"]);

        let left = store.list_pending_writes().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].description, "b");
        assert!(!left[0].synced);

        uploader.heal();
        let report = reconciler.sweep().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(store.list_pending_writes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_empty_queue() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, _store, _tx) = make_reconciler(uploader.clone(), true).await;

        assert_eq!(reconciler.sweep().await.unwrap(), SweepReport::default());
        assert!(uploader.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_aborts_when_store_unavailable() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, store, _tx) = make_reconciler(uploader.clone(), false).await;
        reconciler.submit(&make_write("a")).await.unwrap();
        store.close().await.unwrap();

        assert!(reconciler.sweep().await.is_err());
        assert!(uploader.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_stops_when_store_lost_mid_sweep() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, store, _tx) = make_reconciler(uploader.clone(), false).await;
        for d in ["a", "b", "c"] {
            reconciler.submit(&make_write(d)).await.unwrap();
        }
        *uploader.close_after_upload.lock().unwrap() = Some(store.clone());

        assert!(reconciler.sweep().await.is_err());
        assert_eq!(uploader.uploaded(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_run_sweeps_on_reconnect_and_request() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, store, online_tx) = make_reconciler(uploader.clone(), false).await;
        reconciler.submit(&make_write("a")).await.unwrap();

        let (handle, requests) = sync_channel(4);
        let runner = reconciler.clone();
        let task = tokio::spawn(async move { runner.run(requests, None).await });

        online_tx.send(true).unwrap();
        handle.sync().await.unwrap();
        assert_eq!(uploader.uploaded(), vec!["a"]);
        assert!(store.list_pending_writes().await.unwrap().is_empty());

        drop(online_tx);
        assert_eq!(task.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_periodic_tick() {
        let uploader = Arc::new(FakeUploader::default());
        let (reconciler, _store, online_tx) = make_reconciler(uploader.clone(), false).await;
        reconciler.submit(&make_write("a")).await.unwrap();
        online_tx.send_replace(true);

        let (_handle, requests) = sync_channel(1);
        let runner = reconciler.clone();
        let task = tokio::spawn(async move { runner.run(requests, Some(Duration::from_millis(50))).await });

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(uploader.uploaded(), vec!["a"]);

        drop(online_tx);
        assert!(task.await.unwrap() >= 1);
    }
}
