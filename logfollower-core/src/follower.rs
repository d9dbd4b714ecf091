use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use logfollower_model::{ApplierState, Phase, Tick};
use logfollower_storage::Storage;
use logfollower_transport::Transport;

use crate::applier;
use crate::backoff::RetryPolicy;
use crate::codec::{self, DecodeError};
use crate::config::FollowerConfig;
use crate::error::FollowError;
use crate::filter::CollectionFilter;
use crate::tracker::TransactionTracker;

/// A clonable handle observers use to request a graceful stop. The
/// underlying flag is polled between markers and between fetches.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Polls the master for chunks starting at the last checkpoint,
/// decodes and applies each marker in turn, advances the checkpoint,
/// and reacts to errors.
pub struct Follower {
    config: FollowerConfig,
    transport: Box<dyn Transport>,
    storage: Box<dyn Storage>,
    filter: CollectionFilter,
    tracker: TransactionTracker,
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<ApplierState>>,
    next_from_tick: Tick,
}

impl Follower {
    pub fn new(
        config: FollowerConfig,
        transport: Box<dyn Transport>,
        storage: Box<dyn Storage>,
    ) -> Result<Follower, FollowError> {
        config.validate()?;
        let filter = CollectionFilter::new(config.restrict.clone());
        Ok(Follower {
            config,
            transport,
            storage,
            filter,
            tracker: TransactionTracker::new(),
            stop: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(ApplierState::initial())),
            next_from_tick: Tick(1),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// A read-only snapshot handle, for `logfollower status` and other
    /// observers, read under a single lock.
    pub fn status_handle(&self) -> Arc<Mutex<ApplierState>> {
        self.status.clone()
    }

    fn set_status(&self, f: impl FnOnce(&mut ApplierState)) {
        let mut guard = self.status.lock().expect("status mutex poisoned");
        f(&mut guard);
    }

    fn snapshot(&self) -> ApplierState {
        self.status.lock().expect("status mutex poisoned").clone()
    }

    fn initialize(&mut self) -> Result<(), FollowError> {
        let loaded = self.storage.load_state()?.unwrap_or_else(ApplierState::initial);
        self.set_status(|s| *s = loaded);

        if self.config.use_tick {
            let start = self
                .config
                .initial_tick
                .expect("validated: useTick requires initialTick");
            self.set_status(|s| {
                s.safe_resume_tick = start;
                s.last_applied_tick = Tick(start.0.saturating_sub(1));
            });
        }

        // Only the last-applied tick is durable across a restart: any
        // tick between the resume point and the previous session's
        // last-processed tick may belong to a transaction that was
        // aborted locally on shutdown, so it must be re-observed here,
        // not skipped as "already seen" — that dedup is scoped to one
        // session, not across a restart.
        self.set_status(|s| {
            s.last_processed_tick = Tick(s.safe_resume_tick.0.saturating_sub(1));
        });

        self.next_from_tick = self.snapshot().safe_resume_tick;
        self.set_status(|s| {
            s.phase = Phase::Running;
            s.running = true;
        });
        Ok(())
    }

    fn recompute_safe_resume_tick(&self) {
        let oldest_open = self.tracker.oldest_open_tick();
        self.set_status(|s| {
            s.safe_resume_tick = oldest_open.unwrap_or(Tick(s.last_applied_tick.0 + 1));
        });
    }

    fn should_checkpoint(&self, commits_since_checkpoint: u64, last_checkpoint: Instant) -> bool {
        commits_since_checkpoint >= self.config.checkpoint_commit_interval
            || last_checkpoint.elapsed() >= self.config.checkpoint_interval
    }

    fn persist(&self) -> Result<(), FollowError> {
        let state = self.snapshot();
        self.storage.persist_state(&state)?;
        Ok(())
    }

    /// Applies one already-decoded event, retrying a transient storage
    /// failure up to `maxConnectRetries` times before giving up fatally.
    fn apply_with_retry(&mut self, event: &logfollower_model::Event) -> Result<Option<Tick>, FollowError> {
        let mut attempts = 0u32;
        loop {
            match applier::apply(self.storage.as_ref(), &mut self.tracker, event) {
                Ok(applied) => return Ok(applied),
                Err(FollowError::StorageTransient(msg)) => {
                    attempts += 1;
                    if attempts > self.config.max_connect_retries {
                        return Err(FollowError::StorageFatal(format!(
                            "marker at tick {} still transient after {} retries: {}",
                            event.tick, attempts - 1, msg
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decodes and applies every marker in one chunk body (newline
    /// separated structured records). Returns whether at least one
    /// marker was actually applied.
    fn apply_chunk(
        &mut self,
        body: &[u8],
        commits_since_checkpoint: &mut u64,
        last_checkpoint: &mut Instant,
    ) -> Result<bool, FollowError> {
        let mut last_tick_in_stream = None;
        let mut made_progress = false;

        for line in body.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            let raw: serde_json::Value = serde_json::from_slice(line)
                .map_err(|e| DecodeError::Malformed(e.to_string()))?;
            let event = codec::decode(&raw, last_tick_in_stream)?;
            last_tick_in_stream = Some(event.tick);

            if event.tick <= self.snapshot().last_processed_tick {
                continue;
            }

            if self.filter.should_skip(&event) {
                self.set_status(|s| s.last_processed_tick = event.tick);
                continue;
            }

            let applied_tick = self.apply_with_retry(&event)?;
            self.set_status(|s| s.last_processed_tick = event.tick);

            if let Some(tick) = applied_tick {
                self.set_status(|s| {
                    s.last_applied_tick = tick;
                    s.progress = format!("applied marker tick {tick}");
                });
                made_progress = true;
                *commits_since_checkpoint += 1;
                self.recompute_safe_resume_tick();

                if self.should_checkpoint(*commits_since_checkpoint, *last_checkpoint) {
                    self.persist()?;
                    *commits_since_checkpoint = 0;
                    *last_checkpoint = Instant::now();
                }
            }
        }

        Ok(made_progress)
    }

    fn fail(&self, error: FollowError) -> FollowError {
        self.set_status(|s| {
            s.phase = Phase::Failed;
            s.running = false;
            s.last_error = Some(error.to_descriptor());
        });
        let _ = self.persist();
        error
    }

    fn shutdown(&mut self) -> Result<(), FollowError> {
        self.set_status(|s| s.phase = Phase::Stopping);
        // Recompute against the still-open transactions before
        // aborting them locally: the resume point must reflect the
        // oldest open remote tx's first-seen tick so a restart
        // refetches and re-observes its BeginTx. Aborting first would
        // empty the tracker and collapse the resume point to
        // lastAppliedTick + 1, losing that transaction's markers.
        self.recompute_safe_resume_tick();
        self.tracker.abort_all(self.storage.as_ref());
        self.set_status(|s| {
            s.phase = Phase::Stopped;
            s.running = false;
            s.progress = String::from("stopped");
        });
        self.persist()
    }

    /// Runs the follower until cancellation or a fatal error. A clean
    /// stop returns `Err(FollowError::Cancelled)`; every other `Err`
    /// reflects `phase == Failed`.
    pub async fn run(&mut self) -> Result<(), FollowError> {
        self.initialize()?;

        let mut retry = RetryPolicy::new(self.config.max_backoff);
        let mut commits_since_checkpoint = 0u64;
        let mut last_checkpoint = Instant::now();

        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.shutdown()?;
                return Err(FollowError::Cancelled);
            }

            let from_tick = self.next_from_tick;
            match self
                .transport
                .fetch(from_tick.0, self.config.chunk_size)
                .await
            {
                Ok(chunk) => {
                    // Any successful fetch, even an empty one, means
                    // the master is reachable and current; back off no
                    // further regardless of what this chunk contains.
                    retry.reset();

                    if self.config.require_from_present && !chunk.headers.from_present {
                        return Err(self.fail(FollowError::LogGap));
                    }

                    let result = self.apply_chunk(
                        &chunk.body,
                        &mut commits_since_checkpoint,
                        &mut last_checkpoint,
                    );
                    match result {
                        Ok(_) => {}
                        Err(e) if e.is_retryable() => {
                            let delay = retry.next_delay();
                            tracing::warn!(error = %e, delay_ms = delay.as_millis(), "transient failure applying chunk, retrying");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        Err(e) => return Err(self.fail(e)),
                    };

                    if chunk.headers.last_included_tick.0 > 0 {
                        self.next_from_tick = Tick(chunk.headers.last_included_tick.0 + 1);
                    }

                    if chunk.headers.check_more {
                        continue;
                    }
                    let delay = retry.next_delay();
                    tokio::time::sleep(delay).await;
                }
                Err(transport_err) => {
                    let delay = retry.next_delay();
                    tracing::warn!(error = %transport_err, delay_ms = delay.as_millis(), "transport fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logfollower_model::RestrictPolicy;
    use logfollower_storage::MemoryStorage;
    use logfollower_transport::{ChunkHeaders, ChunkResponse, FakeTransport, TransportError};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn config() -> FollowerConfig {
        FollowerConfig {
            endpoint: "http://master".to_owned(),
            checkpoint_interval: StdDuration::from_secs(3600),
            checkpoint_commit_interval: 1,
            max_backoff: StdDuration::from_millis(5),
            restrict: RestrictPolicy::none(false),
            ..FollowerConfig::default()
        }
    }

    fn chunk_of(
        markers: Vec<serde_json::Value>,
        last_included: Tick,
        check_more: bool,
    ) -> Result<ChunkResponse, TransportError> {
        let body = markers
            .iter()
            .map(serde_json::Value::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ChunkResponse {
            body: bytes::Bytes::from(body),
            headers: ChunkHeaders {
                last_included_tick: last_included,
                last_tick: last_included,
                check_more,
                from_present: true,
                active: true,
            },
            status: 200,
        })
    }

    /// An empty chunk produces no state change and a single back-off
    /// before the next fetch.
    #[tokio::test(start_paused = true)]
    async fn empty_log_backs_off_then_refetches() {
        let transport = FakeTransport::new(vec![chunk_of(vec![], Tick::ZERO, false)]);
        let storage = MemoryStorage::new();
        let mut follower =
            Follower::new(config(), Box::new(transport), Box::new(storage)).unwrap();
        let stop = follower.stop_handle();
        let status = follower.status_handle();

        let handle = tokio::spawn(async move { follower.run().await });

        tokio::time::advance(StdDuration::from_secs(1)).await;
        stop.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(FollowError::Cancelled)));
        assert_eq!(status.lock().unwrap().last_applied_tick, Tick::ZERO);
    }

    /// A single insert marker outside any transaction is applied and
    /// advances `lastAppliedTick` to its own tick.
    #[tokio::test(start_paused = true)]
    async fn single_insert_outside_a_transaction_is_applied_immediately() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let transport = FakeTransport::new(vec![chunk_of(
            vec![json!({"tick": 10, "type": "insert", "cname": "c", "data": {"_key": "a", "v": 1}})],
            Tick(10),
            false,
        )]);
        let mut follower =
            Follower::new(config(), Box::new(transport), Box::new(storage)).unwrap();
        let stop = follower.stop_handle();
        let status = follower.status_handle();

        let handle = tokio::spawn(async move { follower.run().await });

        tokio::time::advance(StdDuration::from_millis(10)).await;
        assert_eq!(status.lock().unwrap().last_applied_tick, Tick(10));

        stop.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(FollowError::Cancelled)));
    }

    /// Begin/insert/abort leaves nothing visible but still advances
    /// `lastAppliedTick` to the abort's own tick, since the
    /// transaction has no pending effects left once it closes.
    #[tokio::test(start_paused = true)]
    async fn abort_advances_last_applied_tick_past_a_transaction_with_no_effects() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let transport = FakeTransport::new(vec![chunk_of(
            vec![
                json!({"tick": 30, "type": "begin", "tid": 1}),
                json!({"tick": 31, "type": "insert", "tid": 1, "cname": "c", "data": {"_key": "z"}}),
                json!({"tick": 32, "type": "abort", "tid": 1}),
            ],
            Tick(32),
            false,
        )]);
        let mut follower =
            Follower::new(config(), Box::new(transport), Box::new(storage)).unwrap();
        let stop = follower.stop_handle();
        let status = follower.status_handle();

        let handle = tokio::spawn(async move { follower.run().await });

        tokio::time::advance(StdDuration::from_millis(10)).await;
        assert_eq!(status.lock().unwrap().last_applied_tick, Tick(32));

        stop.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;
        handle.await.unwrap().unwrap_err();
    }

    /// `requireFromPresent=true` against a log-gap response fails the
    /// follower immediately, with no further fetches.
    #[tokio::test(start_paused = true)]
    async fn log_gap_with_require_from_present_fails() {
        let storage = MemoryStorage::new();
        let mut gap_response = chunk_of(vec![], Tick::ZERO, false).unwrap();
        gap_response.headers.from_present = false;
        let transport = FakeTransport::new(vec![Ok(gap_response)]);
        let mut follower =
            Follower::new(config(), Box::new(transport), Box::new(storage)).unwrap();
        let status = follower.status_handle();

        let result = follower.run().await;
        assert!(matches!(result, Err(FollowError::LogGap)));
        let snap = status.lock().unwrap();
        assert_eq!(snap.phase, Phase::Failed);
        assert!(matches!(snap.last_error, Some(ref e) if e.kind == "LogGap"));
    }

    /// Begin/insert/insert/commit ends with both documents visible and
    /// `lastAppliedTick` at the commit's own tick. Mid-transaction
    /// invisibility itself is exercised at the `apply()` unit level
    /// (`applier::tests::explicit_tx_buffers_until_commit`), since the
    /// follower loop has no suspension point between markers of one
    /// fetched chunk to observe from outside.
    #[tokio::test(start_paused = true)]
    async fn begin_insert_insert_commit_applies_atomically() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let transport = FakeTransport::new(vec![chunk_of(
            vec![
                json!({"tick": 20, "type": "begin", "tid": 7}),
                json!({"tick": 21, "type": "insert", "tid": 7, "cname": "c", "data": {"_key": "x"}}),
                json!({"tick": 22, "type": "insert", "tid": 7, "cname": "c", "data": {"_key": "y"}}),
                json!({"tick": 23, "type": "commit", "tid": 7}),
            ],
            Tick(23),
            false,
        )]);
        let mut follower =
            Follower::new(config(), Box::new(transport), Box::new(storage)).unwrap();
        let stop = follower.stop_handle();
        let status = follower.status_handle();

        let handle = tokio::spawn(async move { follower.run().await });

        tokio::time::advance(StdDuration::from_millis(10)).await;
        assert_eq!(status.lock().unwrap().last_applied_tick, Tick(23));

        stop.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;
        handle.await.unwrap().unwrap_err();
    }

    /// A [`Storage`] wrapper sharing one [`MemoryStorage`] between two
    /// `Follower`s, used by `crash_mid_transaction_resumes_idempotently`
    /// to simulate a process restart against the same (in this test,
    /// in-memory-but-surviving) storage engine.
    struct SharedMemory(std::sync::Arc<MemoryStorage>);

    impl Storage for SharedMemory {
        fn begin_tx(&self) -> Result<logfollower_storage::LocalTxHandle, logfollower_storage::StorageError> {
            self.0.begin_tx()
        }
        fn commit_tx(&self, tx: logfollower_storage::LocalTxHandle) -> Result<(), logfollower_storage::StorageError> {
            self.0.commit_tx(tx)
        }
        fn abort_tx(&self, tx: logfollower_storage::LocalTxHandle) -> Result<(), logfollower_storage::StorageError> {
            self.0.abort_tx(tx)
        }
        fn upsert_by_key(
            &self,
            tx: logfollower_storage::LocalTxHandle,
            collection: &str,
            doc: serde_json::Value,
        ) -> Result<(), logfollower_storage::StorageError> {
            self.0.upsert_by_key(tx, collection, doc)
        }
        fn remove_by_key(
            &self,
            tx: logfollower_storage::LocalTxHandle,
            collection: &str,
            key: &str,
        ) -> Result<(), logfollower_storage::StorageError> {
            self.0.remove_by_key(tx, collection, key)
        }
        fn create_collection(&self, properties: serde_json::Value) -> Result<(), logfollower_storage::StorageError> {
            self.0.create_collection(properties)
        }
        fn drop_collection(&self, name: &str) -> Result<(), logfollower_storage::StorageError> {
            self.0.drop_collection(name)
        }
        fn rename_collection(&self, old_name: &str, new_name: &str) -> Result<(), logfollower_storage::StorageError> {
            self.0.rename_collection(old_name, new_name)
        }
        fn change_collection_properties(
            &self,
            name: &str,
            properties: serde_json::Value,
        ) -> Result<(), logfollower_storage::StorageError> {
            self.0.change_collection_properties(name, properties)
        }
        fn persist_state(&self, state: &ApplierState) -> Result<(), logfollower_storage::StorageError> {
            self.0.persist_state(state)
        }
        fn load_state(&self) -> Result<Option<ApplierState>, logfollower_storage::StorageError> {
            self.0.load_state()
        }
    }

    /// A crash after applying `Begin`/`Insert` but before `Commit`
    /// leaves `safeResumeTick` at the transaction's first tick; a
    /// second follower resuming from that tick re-observes and
    /// re-applies the same markers idempotently, and the commit makes
    /// the result visible exactly once.
    #[tokio::test(start_paused = true)]
    async fn crash_mid_transaction_resumes_idempotently() {
        let shared = std::sync::Arc::new(MemoryStorage::new());
        shared.create_collection(json!({"name": "c"})).unwrap();

        // First incarnation: observes Begin(40)/Insert(41) then is
        // stopped before Commit(42) ever arrives over the wire.
        let transport_one = FakeTransport::new(vec![chunk_of(
            vec![
                json!({"tick": 40, "type": "begin", "tid": 9}),
                json!({"tick": 41, "type": "insert", "tid": 9, "cname": "c", "data": {"_key": "z"}}),
            ],
            Tick(41),
            false,
        )]);
        let mut follower_one = Follower::new(
            config(),
            Box::new(transport_one),
            Box::new(SharedMemory(shared.clone())),
        )
        .unwrap();
        let stop_one = follower_one.stop_handle();
        let status_one = follower_one.status_handle();

        let handle_one = tokio::spawn(async move { follower_one.run().await });
        tokio::time::advance(StdDuration::from_millis(10)).await;
        stop_one.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;
        handle_one.await.unwrap().unwrap_err();

        let resume = status_one.lock().unwrap().safe_resume_tick;
        assert_eq!(resume, Tick(40));
        assert!(shared.snapshot("c").is_empty());

        // Second incarnation resumes at safeResumeTick=40, re-observing
        // Begin/Insert before the Commit that was never seen the first
        // time around.
        let transport_two = FakeTransport::new(vec![chunk_of(
            vec![
                json!({"tick": 40, "type": "begin", "tid": 9}),
                json!({"tick": 41, "type": "insert", "tid": 9, "cname": "c", "data": {"_key": "z"}}),
                json!({"tick": 42, "type": "commit", "tid": 9}),
            ],
            Tick(42),
            false,
        )]);
        let mut follower_two = Follower::new(
            config(),
            Box::new(transport_two),
            Box::new(SharedMemory(shared.clone())),
        )
        .unwrap();
        let stop_two = follower_two.stop_handle();
        let status_two = follower_two.status_handle();

        let handle_two = tokio::spawn(async move { follower_two.run().await });
        tokio::time::advance(StdDuration::from_millis(10)).await;
        assert_eq!(status_two.lock().unwrap().last_applied_tick, Tick(42));
        assert_eq!(shared.snapshot("c").len(), 1);

        stop_two.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;
        handle_two.await.unwrap().unwrap_err();
    }

    /// Monotonic progress and strict tick ordering: across a chunk
    /// mixing top-level and transactional markers, `lastAppliedTick`
    /// only ever increases and never exceeds `lastProcessedTick`.
    #[tokio::test(start_paused = true)]
    async fn monotonic_progress_and_tick_ordering_hold_across_a_chunk() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let transport = FakeTransport::new(vec![chunk_of(
            vec![
                json!({"tick": 1, "type": "insert", "cname": "c", "data": {"_key": "a"}}),
                json!({"tick": 2, "type": "begin", "tid": 1}),
                json!({"tick": 3, "type": "insert", "tid": 1, "cname": "c", "data": {"_key": "b"}}),
                json!({"tick": 4, "type": "commit", "tid": 1}),
                json!({"tick": 5, "type": "insert", "cname": "c", "data": {"_key": "c"}}),
            ],
            Tick(5),
            false,
        )]);
        let mut follower =
            Follower::new(config(), Box::new(transport), Box::new(storage)).unwrap();
        let stop = follower.stop_handle();
        let status = follower.status_handle();

        let handle = tokio::spawn(async move { follower.run().await });
        tokio::time::advance(StdDuration::from_millis(10)).await;

        let snap = status.lock().unwrap();
        assert_eq!(snap.last_applied_tick, Tick(5));
        assert!(snap.last_applied_tick.0 <= snap.last_processed_tick.0);
        assert_eq!(snap.last_processed_tick, Tick(5));
        drop(snap);

        stop.request_stop();
        tokio::time::advance(StdDuration::from_secs(1)).await;
        handle.await.unwrap().unwrap_err();
    }
}
