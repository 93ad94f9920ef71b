//! Tab Coordinator (spec §4.5): leader election, heartbeat, write
//! forwarding, and optimistic local writes across every tab open on the
//! same origin against the same database name.
//!
//! The coordinator wraps a [`SqlEngineHost`] rather than folding into
//! it: the host has no notion of "other tabs" at all, and every method
//! here either decides whether to call straight into the host or to
//! round-trip through the [`BroadcastChannel`] first. Callers drive the
//! coordinator cooperatively by calling [`TabCoordinator::pump`] at
//! their own event-loop boundaries (spec §5) rather than the
//! coordinator spawning background threads of its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::common::clock::{Clock, Deadline};
use crate::common::config::{DEFAULT_LEASE_TTL_MS, DEFAULT_WRITE_FORWARD_TIMEOUT_MS};
use crate::common::{Error, Result};
use crate::coordinator::channel::{BroadcastChannel, Message, Subscription, WriteOutcome};
use crate::coordinator::lease::{LeaderLease, LeaseStore};
use crate::coordinator::metrics::CoordinatorMetrics;
use crate::coordinator::state_machine::TabState;
use crate::host::{QueryResult, SqlEngineHost, Value};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

struct DbCoordState {
    role: TabState,
    leader_id: Option<String>,
    epoch: u64,
    last_seen_change_epoch: u64,
    allow_non_leader_writes: bool,
    optimistic: bool,
    /// Correlation id -> the local change epoch the write was applied
    /// against, so a later `Change` notification can tell whether this
    /// write is still the most recent thing this tab has seen.
    optimistic_pending: HashMap<u64, u64>,
    /// Set when an optimistic write diverged; surfaced once to the next
    /// caller, then cleared (spec §4.5's "surfaces `OPTIMISTIC_DIVERGED`").
    diverged: bool,
    handle: Option<u64>,
    subscription: Option<Box<dyn Subscription>>,
}

impl DbCoordState {
    fn new() -> Self {
        Self {
            role: TabState::Joining,
            leader_id: None,
            epoch: 0,
            last_seen_change_epoch: 0,
            allow_non_leader_writes: false,
            optimistic: false,
            optimistic_pending: HashMap::new(),
            diverged: false,
            handle: None,
            subscription: None,
        }
    }
}

/// Coordinates leadership and write forwarding for every database this
/// tab has joined. One instance per tab; every open database name gets
/// its own independent election and lease.
pub struct TabCoordinator {
    host: Arc<SqlEngineHost>,
    holder_id: String,
    lease_store: Arc<dyn LeaseStore>,
    channel: Arc<dyn BroadcastChannel>,
    clock: Arc<dyn Clock>,
    lease_ttl: Duration,
    write_forward_timeout: Duration,
    metrics: CoordinatorMetrics,
    next_correlation_id: AtomicU64,
    pending_responses: Mutex<HashMap<u64, WriteOutcome>>,
    dbs: Mutex<HashMap<String, DbCoordState>>,
}

impl TabCoordinator {
    pub fn new(
        host: Arc<SqlEngineHost>,
        holder_id: impl Into<String>,
        lease_store: Arc<dyn LeaseStore>,
        channel: Arc<dyn BroadcastChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            host,
            holder_id: holder_id.into(),
            lease_store,
            channel,
            clock,
            lease_ttl: Duration::from_millis(DEFAULT_LEASE_TTL_MS),
            write_forward_timeout: Duration::from_millis(DEFAULT_WRITE_FORWARD_TIMEOUT_MS),
            metrics: CoordinatorMetrics::new(),
            next_correlation_id: AtomicU64::new(1),
            pending_responses: Mutex::new(HashMap::new()),
            dbs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_write_forward_timeout(mut self, timeout: Duration) -> Self {
        self.write_forward_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    /// Associate an already-open host handle with a database name so
    /// `pump` can execute leader-side writes and invalidate the right
    /// cache on a `Change` notification.
    pub fn register_handle(&self, db: &str, handle: u64) {
        let mut dbs = self.dbs.lock();
        let state = dbs.entry(db.to_string()).or_insert_with(DbCoordState::new);
        state.handle = Some(handle);
        if state.subscription.is_none() {
            state.subscription = Some(self.channel.subscribe(db));
        }
    }

    pub fn set_allow_non_leader_writes(&self, db: &str, allow: bool) {
        self.dbs
            .lock()
            .entry(db.to_string())
            .or_insert_with(DbCoordState::new)
            .allow_non_leader_writes = allow;
    }

    pub fn set_optimistic(&self, db: &str, optimistic: bool) {
        self.dbs
            .lock()
            .entry(db.to_string())
            .or_insert_with(DbCoordState::new)
            .optimistic = optimistic;
    }

    pub fn role(&self, db: &str) -> TabState {
        self.dbs.lock().get(db).map(|s| s.role).unwrap_or(TabState::Joining)
    }

    pub fn is_leader(&self, db: &str) -> bool {
        self.role(db) == TabState::Leader
    }

    pub fn leader_id(&self, db: &str) -> Option<String> {
        self.dbs.lock().get(db).and_then(|s| s.leader_id.clone())
    }

    /// Try to become leader for `db`. Succeeds immediately if no lease
    /// exists or the current one has expired; otherwise this tab
    /// becomes a follower of whoever holds it (spec §4.5).
    pub fn request_leadership(&self, db: &str) -> Result<bool> {
        self.ensure_subscribed(db);
        let now = self.clock.now_ms();
        let current = self.lease_store.read(db)?;

        let expected_epoch = match &current {
            None => None,
            Some(lease) if !lease.is_live(now) => Some(lease.epoch),
            Some(lease) => {
                self.set_follower(db, Some(lease.holder_id.clone()), lease.epoch);
                return Ok(false);
            }
        };

        let new_epoch = current.as_ref().map(|l| l.epoch).unwrap_or(0) + 1;
        let new_lease = LeaderLease {
            holder_id: self.holder_id.clone(),
            expires_at_ms: now + self.lease_ttl.as_millis() as u64,
            epoch: new_epoch,
        };
        let won = self.lease_store.compare_and_swap(db, expected_epoch, new_lease)?;
        if won {
            self.set_leader(db, new_epoch);
            self.metrics.leader_changes.fetch_add(1, Ordering::Relaxed);
            self.channel.send(Message::LeaderChanged {
                db: db.to_string(),
                new_holder: Some(self.holder_id.clone()),
                epoch: new_epoch,
            })?;
        } else if let Some(lease) = self.lease_store.read(db)? {
            self.set_follower(db, Some(lease.holder_id), lease.epoch);
        }
        Ok(won)
    }

    /// Renew this tab's lease if it currently holds leadership. Callers
    /// are expected to invoke this roughly every `lease_ttl / 3` (spec
    /// §4.5); three missed renewals let the lease lapse naturally.
    pub fn heartbeat(&self, db: &str) -> Result<()> {
        if !self.is_leader(db) {
            return Ok(());
        }
        let now = self.clock.now_ms();
        let renewed = self
            .lease_store
            .renew(db, &self.holder_id, now + self.lease_ttl.as_millis() as u64)?;
        if !renewed {
            // Lost the lease out from under us; fall back to probing.
            self.set_joining(db);
        }
        Ok(())
    }

    /// Give up leadership explicitly (spec §4.5's graceful shutdown
    /// path): expire the lease immediately and announce it, then become
    /// a follower with no known leader until someone else wins.
    pub fn release(&self, db: &str) -> Result<()> {
        let now = self.clock.now_ms();
        let current = self.lease_store.read(db)?;
        if let Some(lease) = &current {
            if lease.holder_id == self.holder_id {
                let expired = LeaderLease {
                    holder_id: lease.holder_id.clone(),
                    expires_at_ms: now,
                    epoch: lease.epoch,
                };
                self.lease_store.compare_and_swap(db, Some(lease.epoch), expired)?;
            }
        }
        let epoch = current.map(|l| l.epoch).unwrap_or(0);
        self.channel.send(Message::LeaderChanged {
            db: db.to_string(),
            new_holder: None,
            epoch,
        })?;
        self.set_follower(db, None, epoch);
        Ok(())
    }

    /// Execute a write, forwarding it to the current leader when this
    /// tab isn't one. Returns the forwarded result directly outside
    /// optimistic mode; in optimistic mode (and only for followers),
    /// applies locally first and returns that result immediately,
    /// reconciling with the leader's answer asynchronously via `pump`.
    pub fn forward_write(
        &self,
        db: &str,
        sql: &str,
        params: &[Value],
        deadline: Deadline,
    ) -> Result<QueryResult> {
        self.take_diverged(db)?;

        let (allow_local, optimistic, handle) = {
            let dbs = self.dbs.lock();
            let state = dbs.get(db).ok_or_else(|| {
                Error::HandleMisuse(format!("coordinator has no registered handle for {db}"))
            })?;
            (state.allow_non_leader_writes, state.optimistic, state.handle)
        };
        let handle = handle.ok_or_else(|| {
            Error::HandleMisuse(format!("coordinator has no registered handle for {db}"))
        })?;

        if self.is_leader(db) || allow_local {
            return self.execute_and_notify(db, handle, sql, params, deadline);
        }

        if optimistic {
            let result = self.host.execute_with_params(handle, sql, params, deadline)?;
            let submission_epoch = self.host.change_epoch(handle)?;
            let correlation_id = self.next_correlation_id();
            self.dbs
                .lock()
                .get_mut(db)
                .expect("registered above")
                .optimistic_pending
                .insert(correlation_id, submission_epoch);
            self.channel.send(Message::WriteRequest {
                db: db.to_string(),
                correlation_id,
                sql: sql.to_string(),
                params: params.to_vec(),
                deadline,
            })?;
            self.metrics.writes_forwarded.fetch_add(1, Ordering::Relaxed);
            return Ok(result);
        }

        let correlation_id = self.next_correlation_id();
        self.channel.send(Message::WriteRequest {
            db: db.to_string(),
            correlation_id,
            sql: sql.to_string(),
            params: params.to_vec(),
            deadline,
        })?;
        self.metrics.writes_forwarded.fetch_add(1, Ordering::Relaxed);

        loop {
            self.pump(db)?;
            if let Some(outcome) = self.pending_responses.lock().remove(&correlation_id) {
                return match outcome {
                    WriteOutcome::Ok(result) => {
                        self.metrics.writes_confirmed.fetch_add(1, Ordering::Relaxed);
                        Ok(result)
                    }
                    WriteOutcome::Err(message) => Err(Error::InvalidSql { message, position: None }),
                };
            }
            if deadline.is_expired(self.clock.as_ref()) {
                self.channel.send(Message::WriteCancel { db: db.to_string(), correlation_id })?;
                self.metrics.writes_timed_out.fetch_add(1, Ordering::Relaxed);
                return Err(Error::WriteForwardTimeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Drain every message currently queued for `db` and apply its
    /// effect: invalidate on `Change`, track leadership on
    /// `LeaderChanged`, answer `WriteRequest`s while leading, and file
    /// `WriteResponse`s for `forward_write`'s callers to collect.
    pub fn pump(&self, db: &str) -> Result<()> {
        self.ensure_subscribed(db);
        loop {
            let message = {
                let dbs = self.dbs.lock();
                match dbs.get(db).and_then(|s| s.subscription.as_ref()) {
                    Some(sub) => sub.try_recv(),
                    None => None,
                }
            };
            let Some(message) = message else { break };
            self.apply(db, message)?;
        }
        Ok(())
    }

    /// Block until at least one message for `db` arrives or `timeout`
    /// elapses, then drain as in `pump`. Useful for a follower's own
    /// idle event loop rather than busy-polling.
    pub fn pump_blocking(&self, db: &str, timeout: Duration) -> Result<()> {
        self.ensure_subscribed(db);
        let message = {
            let dbs = self.dbs.lock();
            dbs.get(db).and_then(|s| s.subscription.as_ref()).and_then(|sub| sub.recv_timeout(timeout))
        };
        if let Some(message) = message {
            self.apply(db, message)?;
        }
        self.pump(db)
    }

    /// Execute a write the leader performs locally (its own call, or one
    /// answering a forwarded `WriteRequest`) and broadcast the resulting
    /// change epoch so followers know to invalidate (spec §4.5).
    fn execute_and_notify(
        &self,
        db: &str,
        handle: u64,
        sql: &str,
        params: &[Value],
        deadline: Deadline,
    ) -> Result<QueryResult> {
        let result = self.host.execute_with_params(handle, sql, params, deadline)?;
        let epoch = self.host.change_epoch(handle)?;
        self.channel.send(Message::Change { db: db.to_string(), epoch })?;
        Ok(result)
    }

    fn apply(&self, db: &str, message: Message) -> Result<()> {
        match message {
            Message::Change { epoch, .. } => self.observe_change(db, epoch)?,
            Message::LeaderChanged { new_holder, epoch, .. } => {
                if new_holder.as_deref() == Some(self.holder_id.as_str()) {
                    self.set_leader(db, epoch);
                } else {
                    self.set_follower(db, new_holder, epoch);
                }
            }
            Message::WriteRequest { correlation_id, sql, params, deadline, .. } => {
                if !self.is_leader(db) {
                    return Ok(());
                }
                if deadline.is_expired(self.clock.as_ref()) {
                    return Ok(());
                }
                let handle = self.dbs.lock().get(db).and_then(|s| s.handle);
                let outcome = match handle {
                    Some(handle) => match self.execute_and_notify(db, handle, &sql, &params, deadline) {
                        Ok(result) => WriteOutcome::Ok(result),
                        Err(err) => WriteOutcome::Err(err.to_string()),
                    },
                    None => WriteOutcome::Err(format!("no local handle open for {db}")),
                };
                self.channel.send(Message::WriteResponse {
                    db: db.to_string(),
                    correlation_id,
                    result: outcome,
                })?;
            }
            Message::WriteResponse { correlation_id, result, .. } => {
                self.reconcile_optimistic(db, correlation_id, &result);
                self.pending_responses.lock().insert(correlation_id, result);
            }
            Message::WriteCancel { correlation_id, .. } => {
                self.pending_responses.lock().remove(&correlation_id);
            }
        }
        Ok(())
    }

    fn observe_change(&self, db: &str, epoch: u64) -> Result<()> {
        let (should_invalidate, handle, was_follower, diverged_ids) = {
            let mut dbs = self.dbs.lock();
            let state = dbs.entry(db.to_string()).or_insert_with(DbCoordState::new);
            if epoch <= state.last_seen_change_epoch {
                return Ok(());
            }
            state.last_seen_change_epoch = epoch;
            let diverged_ids: Vec<u64> = state
                .optimistic_pending
                .iter()
                .filter(|(_, &submission_epoch)| epoch > submission_epoch)
                .map(|(&id, _)| id)
                .collect();
            for id in &diverged_ids {
                state.optimistic_pending.remove(id);
            }
            if !diverged_ids.is_empty() {
                state.diverged = true;
            }
            let was_follower = state.role == TabState::Follower;
            (true, state.handle, was_follower, diverged_ids)
        };
        let _ = diverged_ids;
        if should_invalidate {
            if let Some(handle) = handle {
                self.host.invalidate(handle)?;
            }
            if was_follower {
                self.metrics.follower_refreshes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn reconcile_optimistic(&self, db: &str, correlation_id: u64, result: &WriteOutcome) {
        let mut dbs = self.dbs.lock();
        let Some(state) = dbs.get_mut(db) else { return };
        if state.optimistic_pending.remove(&correlation_id).is_none() {
            return;
        }
        if matches!(result, WriteOutcome::Err(_)) {
            state.diverged = true;
        }
    }

    /// Surface a pending divergence exactly once, invalidating the
    /// handle's cache so the next read reflects the leader's state.
    fn take_diverged(&self, db: &str) -> Result<()> {
        let handle = {
            let mut dbs = self.dbs.lock();
            let Some(state) = dbs.get_mut(db) else { return Ok(()) };
            if !std::mem::take(&mut state.diverged) {
                return Ok(());
            }
            state.handle
        };
        if let Some(handle) = handle {
            self.host.invalidate(handle)?;
        }
        Err(Error::OptimisticDiverged)
    }

    fn set_leader(&self, db: &str, epoch: u64) {
        let mut dbs = self.dbs.lock();
        let state = dbs.entry(db.to_string()).or_insert_with(DbCoordState::new);
        state.role = TabState::Leader;
        state.leader_id = Some(self.holder_id.clone());
        state.epoch = epoch;
    }

    fn set_follower(&self, db: &str, leader_id: Option<String>, epoch: u64) {
        let mut dbs = self.dbs.lock();
        let state = dbs.entry(db.to_string()).or_insert_with(DbCoordState::new);
        state.role = TabState::Follower;
        state.leader_id = leader_id;
        state.epoch = epoch;
    }

    fn set_joining(&self, db: &str) {
        let mut dbs = self.dbs.lock();
        let state = dbs.entry(db.to_string()).or_insert_with(DbCoordState::new);
        state.role = TabState::Joining;
        state.leader_id = None;
    }

    fn ensure_subscribed(&self, db: &str) {
        let mut dbs = self.dbs.lock();
        let state = dbs.entry(db.to_string()).or_insert_with(DbCoordState::new);
        if state.subscription.is_none() {
            state.subscription = Some(self.channel.subscribe(db));
        }
    }

    fn next_correlation_id(&self) -> u64 {
        self.next_correlation_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockStore, MemoryBlockBackend};
    use crate::common::clock::ManualClock;
    use crate::coordinator::channel::InMemoryBroadcastChannel;
    use crate::coordinator::lease::InMemoryLeaseStore;
    use crate::host::{CipherHookFactory, NullCipherFactory, OpenConfig, PageIo, PreparedStatement, SqlEngine, SqlEngineFactory};

    #[derive(Default)]
    struct EchoEngine;

    impl SqlEngine for EchoEngine {
        fn execute(&mut self, io: &mut dyn PageIo, sql: &str, _params: &[Value]) -> Result<QueryResult> {
            let mut page = io.read_page(0)?;
            page[0] = page[0].wrapping_add(1);
            io.write_page(0, &page)?;
            io.sync()?;
            Ok(QueryResult {
                columns: vec!["echo".to_string()],
                rows: vec![vec![Value::Text(sql.to_string())]],
                rows_affected: 1,
                last_insert_id: None,
                elapsed: Duration::from_millis(0),
            })
        }

        fn prepare(&mut self, _io: &mut dyn PageIo, _sql: &str) -> Result<Box<dyn PreparedStatement>> {
            Err(Error::InvalidSql { message: "not supported".to_string(), position: None })
        }
    }

    struct EchoFactory;

    impl SqlEngineFactory for EchoFactory {
        fn create(&self) -> Box<dyn SqlEngine> {
            Box::new(EchoEngine)
        }
    }

    fn test_coordinator(holder_id: &str, clock: ManualClock) -> (TabCoordinator, Arc<dyn LeaseStore>, Arc<dyn BroadcastChannel>) {
        let lease_store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
        let channel: Arc<dyn BroadcastChannel> = Arc::new(InMemoryBroadcastChannel::new());
        let block_store = Arc::new(BlockStore::new(Box::new(MemoryBlockBackend::new()), Arc::new(clock.clone())));
        let cipher_factory: Arc<dyn CipherHookFactory> = Arc::new(NullCipherFactory);
        let host = Arc::new(SqlEngineHost::new(block_store, Arc::new(EchoFactory), cipher_factory, Arc::new(clock.clone())));
        let coordinator = TabCoordinator::new(
            host,
            holder_id,
            lease_store.clone(),
            channel.clone(),
            Arc::new(clock),
        );
        (coordinator, lease_store, channel)
    }

    #[test]
    fn test_first_requester_becomes_leader() {
        let (coordinator, _lease_store, _channel) = test_coordinator("tab-a", ManualClock::new());
        assert!(coordinator.request_leadership("x.db").unwrap());
        assert!(coordinator.is_leader("x.db"));
        assert_eq!(coordinator.leader_id("x.db").as_deref(), Some("tab-a"));
    }

    #[test]
    fn test_second_requester_becomes_follower() {
        let clock = ManualClock::new();
        let lease_store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
        let channel: Arc<dyn BroadcastChannel> = Arc::new(InMemoryBroadcastChannel::new());
        let block_store = Arc::new(BlockStore::new(Box::new(MemoryBlockBackend::new()), Arc::new(clock.clone())));
        let cipher_factory: Arc<dyn CipherHookFactory> = Arc::new(NullCipherFactory);

        let host_a = Arc::new(SqlEngineHost::new(block_store.clone(), Arc::new(EchoFactory), cipher_factory.clone(), Arc::new(clock.clone())));
        let coord_a = TabCoordinator::new(host_a, "tab-a", lease_store.clone(), channel.clone(), Arc::new(clock.clone()));
        let host_b = Arc::new(SqlEngineHost::new(block_store, Arc::new(EchoFactory), cipher_factory, Arc::new(clock.clone())));
        let coord_b = TabCoordinator::new(host_b, "tab-b", lease_store, channel, Arc::new(clock));

        assert!(coord_a.request_leadership("x.db").unwrap());
        assert!(!coord_b.request_leadership("x.db").unwrap());
        assert!(!coord_b.is_leader("x.db"));
        assert_eq!(coord_b.leader_id("x.db").as_deref(), Some("tab-a"));
    }

    #[test]
    fn test_expired_lease_can_be_reacquired_by_another_tab() {
        let clock = ManualClock::new();
        let (coord_a, lease_store, channel) = test_coordinator("tab-a", clock.clone());
        assert!(coord_a.request_leadership("x.db").unwrap());

        clock.advance_ms(DEFAULT_LEASE_TTL_MS + 1);

        let block_store = Arc::new(BlockStore::new(Box::new(MemoryBlockBackend::new()), Arc::new(clock.clone())));
        let cipher_factory: Arc<dyn CipherHookFactory> = Arc::new(NullCipherFactory);
        let host_b = Arc::new(SqlEngineHost::new(block_store, Arc::new(EchoFactory), cipher_factory, Arc::new(clock.clone())));
        let coord_b = TabCoordinator::new(host_b, "tab-b", lease_store, channel, Arc::new(clock));

        assert!(coord_b.request_leadership("x.db").unwrap());
        assert!(coord_b.is_leader("x.db"));
    }

    #[test]
    fn test_release_clears_leadership_and_notifies_followers() {
        let (coordinator, _lease_store, _channel) = test_coordinator("tab-a", ManualClock::new());
        assert!(coordinator.request_leadership("x.db").unwrap());
        coordinator.release("x.db").unwrap();
        assert!(!coordinator.is_leader("x.db"));
        assert_eq!(coordinator.role("x.db"), TabState::Follower);
    }

    #[test]
    fn test_forward_write_times_out_with_no_leader_response() {
        let clock = ManualClock::new();
        let (coordinator, _lease_store, _channel) = test_coordinator("tab-b", clock.clone());
        let config = OpenConfig::new("x.db");
        let handle = coordinator.host.open(config).unwrap();
        coordinator.register_handle("x.db", handle);

        let deadline = Deadline::after(&clock, Duration::from_millis(5));

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done_ticker = done.clone();
        let ticker_clock = clock.clone();
        let ticker = std::thread::spawn(move || {
            while !done_ticker.load(Ordering::Relaxed) {
                ticker_clock.advance_ms(1);
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        let err = coordinator
            .forward_write("x.db", "insert", &[], deadline)
            .unwrap_err();
        done.store(true, Ordering::Relaxed);
        ticker.join().unwrap();

        assert!(matches!(err, Error::WriteForwardTimeout));
        assert_eq!(coordinator.metrics().snapshot().writes_timed_out, 1);
    }

    #[test]
    fn test_leader_answers_forwarded_write_from_follower() {
        let clock = ManualClock::new();
        let lease_store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
        let channel: Arc<dyn BroadcastChannel> = Arc::new(InMemoryBroadcastChannel::new());
        let block_store = Arc::new(BlockStore::new(Box::new(MemoryBlockBackend::new()), Arc::new(clock.clone())));
        let cipher_factory: Arc<dyn CipherHookFactory> = Arc::new(NullCipherFactory);

        let host_a = Arc::new(SqlEngineHost::new(block_store.clone(), Arc::new(EchoFactory), cipher_factory.clone(), Arc::new(clock.clone())));
        let coord_a = TabCoordinator::new(host_a, "tab-a", lease_store.clone(), channel.clone(), Arc::new(clock.clone()));
        let handle_a = coord_a.host.open(OpenConfig::new("x.db")).unwrap();
        coord_a.register_handle("x.db", handle_a);
        assert!(coord_a.request_leadership("x.db").unwrap());

        let host_b = Arc::new(SqlEngineHost::new(block_store, Arc::new(EchoFactory), cipher_factory, Arc::new(clock.clone())));
        let coord_b = TabCoordinator::new(host_b, "tab-b", lease_store, channel, Arc::new(clock.clone()));
        let handle_b = coord_b.host.open(OpenConfig::new("x.db")).unwrap();
        coord_b.register_handle("x.db", handle_b);
        assert!(!coord_b.request_leadership("x.db").unwrap());

        // Background thread plays the leader's event loop so the
        // follower's blocking forward_write has something to answer it.
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done_writer = done.clone();
        let coord_a_thread = std::thread::spawn(move || {
            while !done_writer.load(Ordering::Relaxed) {
                coord_a.pump("x.db").unwrap();
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        let deadline = Deadline::after(&clock, Duration::from_secs(5));
        let result = coord_b.forward_write("x.db", "insert into t values (1)", &[], deadline).unwrap();
        done.store(true, Ordering::Relaxed);
        coord_a_thread.join().unwrap();

        assert_eq!(result.rows_affected, 1);
        assert_eq!(coord_b.metrics().snapshot().writes_confirmed, 1);
    }
}
