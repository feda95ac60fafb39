//! Slot lifecycle controller.

use super::reservation::{Accelerator, Lease};
use super::worker::{LoadReporter, Worker, WorkerLoader};
use super::{
    SchedulerConfig, SchedulerEvent, SlotName, SlotSpec, SlotState, SlotStatus, SlotTransition,
    SlotWeight,
};
use crate::error::{MurmurError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often `run` reloads a slot that vanished between loading and use.
const MAX_RUN_ATTEMPTS: usize = 3;

/// Result of a staged start or restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Every stage ran. Slots that failed to load are listed.
    Completed { failed: Vec<SlotName> },
    /// A newer teardown superseded this restore; nothing more was loaded.
    Aborted,
}

struct SlotEntry {
    spec: SlotSpec,
    state: SlotState,
    worker: Option<Worker>,
    /// Bumped whenever in-flight loads and runs must be disowned.
    generation: u64,
    cancel: CancellationToken,
    /// Runs in flight. Only non-exclusive slots go above one.
    active: usize,
    last_error: Option<String>,
}

impl SlotEntry {
    fn new(spec: SlotSpec) -> Self {
        Self {
            spec,
            state: SlotState::Unloaded,
            worker: None,
            generation: 0,
            cancel: CancellationToken::new(),
            active: 0,
            last_error: None,
        }
    }

    /// Cancel in-flight work, disown it, and hand back the worker handle.
    fn invalidate(&mut self) -> Option<Worker> {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.active = 0;
        self.worker.take()
    }
}

struct Lifecycle {
    epoch: u64,
    /// Slots that were live when last suspended.
    suspended: BTreeSet<SlotName>,
    restore_cancel: CancellationToken,
}

struct Inner {
    slots: Mutex<BTreeMap<SlotName, SlotEntry>>,
    lifecycle: Mutex<Lifecycle>,
    epoch: AtomicU64,
    history: Mutex<Vec<SlotTransition>>,
    seq: AtomicU64,
    events: broadcast::Sender<SchedulerEvent>,
    changed: watch::Sender<u64>,
    accelerator: Arc<Accelerator>,
    loader: Arc<dyn WorkerLoader>,
    config: SchedulerConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    /// Record a state change. Callers hold the slots lock, which keeps the
    /// sequence numbers in the order the changes happened.
    fn transition(&self, entry: &mut SlotEntry, to: SlotState, detail: Option<String>) {
        let from = entry.state;
        if from == to {
            return;
        }
        entry.state = to;

        let transition = SlotTransition {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            slot: entry.spec.name,
            from,
            to,
            at: Instant::now(),
            detail,
        };
        debug!(
            slot = %transition.slot,
            from = %from,
            to = %to,
            seq = transition.seq,
            "slot transition"
        );
        lock(&self.history).push(transition.clone());
        let _ = self.events.send(SchedulerEvent::Transition(transition));
        self.changed.send_modify(|version| *version += 1);
    }

    fn bump(&self) {
        self.changed.send_modify(|version| *version += 1);
    }

    fn priority_of(&self, slot: SlotName) -> u8 {
        lock(&self.slots)
            .get(&slot)
            .map(|entry| entry.spec.priority)
            .unwrap_or_default()
    }

    /// Hold back ready exclusive slots that rank below the new holder.
    fn pause_lower(&self, holder: SlotName, priority: u8) {
        let mut slots = lock(&self.slots);
        for (name, entry) in slots.iter_mut() {
            if *name != holder
                && entry.spec.exclusive
                && entry.state == SlotState::Ready
                && entry.spec.priority < priority
            {
                self.transition(
                    entry,
                    SlotState::Paused,
                    Some(format!("accelerator reserved by {}", holder)),
                );
            }
        }
    }

    fn resume_paused(&self) {
        let mut slots = lock(&self.slots);
        for entry in slots.values_mut() {
            if entry.state == SlotState::Paused {
                self.transition(entry, SlotState::Ready, None);
            }
        }
    }
}

/// Accelerator lease that also lifts pauses once released.
struct SlotLease {
    lease: Option<Lease>,
    inner: Arc<Inner>,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            drop(lease);
            self.inner.resume_paused();
        }
    }
}

enum Inspect {
    Loaded(Worker),
    Loading,
    Unloaded,
}

enum Claim {
    Go(u64, CancellationToken),
    Retry,
    /// A light slot started loading while this heavy one was reserving.
    WaitForLight,
    Superseded,
}

fn any_light_loading(slots: &BTreeMap<SlotName, SlotEntry>) -> bool {
    slots
        .values()
        .any(|entry| entry.spec.weight == SlotWeight::Light && entry.state == SlotState::Loading)
}

enum Attempt<T, F> {
    Finished(Result<T>),
    NotLoaded(F),
}

/// Owns every worker slot and the accelerator they share.
///
/// Cloning is cheap and shares the same slots.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(specs: Vec<SlotSpec>, loader: Arc<dyn WorkerLoader>, config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (changed, _) = watch::channel(0);
        let slots = specs
            .into_iter()
            .map(|spec| (spec.name, SlotEntry::new(spec)))
            .collect();

        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(slots),
                lifecycle: Mutex::new(Lifecycle {
                    epoch: 0,
                    suspended: BTreeSet::new(),
                    restore_cancel: CancellationToken::new(),
                }),
                epoch: AtomicU64::new(0),
                history: Mutex::new(Vec::new()),
                seq: AtomicU64::new(0),
                events,
                changed,
                accelerator: Accelerator::new(),
                loader,
                config,
            }),
        }
    }

    /// Subscribe to transitions and load progress.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// Every transition so far, in sequence order.
    pub fn history(&self) -> Vec<SlotTransition> {
        lock(&self.inner.history).clone()
    }

    pub fn state(&self, slot: SlotName) -> Option<SlotState> {
        lock(&self.inner.slots).get(&slot).map(|entry| entry.state)
    }

    pub fn snapshot(&self) -> Vec<SlotStatus> {
        let holder = self.inner.accelerator.holder();
        lock(&self.inner.slots)
            .values()
            .map(|entry| SlotStatus {
                name: entry.spec.name,
                state: entry.state,
                exclusive: entry.spec.exclusive,
                weight: entry.spec.weight,
                priority: entry.spec.priority,
                holds_accelerator: holder == Some(entry.spec.name),
                last_error: entry.last_error.clone(),
            })
            .collect()
    }

    pub fn accelerator_holder(&self) -> Option<SlotName> {
        self.inner.accelerator.holder()
    }

    /// The slot's worker, if it is loaded right now.
    pub fn worker(&self, slot: SlotName) -> Option<Worker> {
        lock(&self.inner.slots)
            .get(&slot)
            .filter(|entry| entry.state.is_loaded())
            .and_then(|entry| entry.worker.clone())
    }

    /// Slots that the next [`restore`](Self::restore) will bring back.
    pub fn suspended(&self) -> Vec<SlotName> {
        lock(&self.inner.lifecycle).suspended.iter().copied().collect()
    }

    fn spec(&self, slot: SlotName) -> Result<SlotSpec> {
        lock(&self.inner.slots)
            .get(&slot)
            .map(|entry| entry.spec.clone())
            .ok_or_else(|| MurmurError::InvalidParameter(format!("no {} slot is configured", slot)))
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn inspect(&self, slot: SlotName) -> Inspect {
        let slots = lock(&self.inner.slots);
        match slots.get(&slot) {
            Some(entry) if entry.state == SlotState::Loading => Inspect::Loading,
            Some(entry) if entry.state.is_loaded() => match &entry.worker {
                Some(worker) => Inspect::Loaded(worker.clone()),
                None => Inspect::Unloaded,
            },
            _ => Inspect::Unloaded,
        }
    }

    fn light_slot_loading(&self) -> bool {
        any_light_loading(&lock(&self.inner.slots))
    }

    async fn wait_change(changes: &mut watch::Receiver<u64>) -> Result<()> {
        changes.changed().await.map_err(|_| MurmurError::Cancelled)
    }

    /// Load the slot's worker if it is not loaded yet, and return it.
    ///
    /// Concurrent callers for the same slot share one load.
    pub async fn ensure_loaded(&self, slot: SlotName) -> Result<Worker> {
        self.load_slot(slot, None).await
    }

    async fn load_slot(&self, slot: SlotName, epoch: Option<u64>) -> Result<Worker> {
        let spec = self.spec(slot)?;
        let mut changes = self.inner.changed.subscribe();
        let mut waited_for_light = false;
        let mut settled = false;

        loop {
            if epoch.is_some_and(|expected| expected != self.epoch()) {
                return Err(MurmurError::Cancelled);
            }

            match self.inspect(slot) {
                Inspect::Loaded(worker) => return Ok(worker),
                Inspect::Loading => {
                    Self::wait_change(&mut changes).await?;
                    continue;
                }
                Inspect::Unloaded => {}
            }

            if spec.weight == SlotWeight::Heavy && self.light_slot_loading() {
                debug!(slot = %slot, "waiting for light slots to finish loading");
                waited_for_light = true;
                Self::wait_change(&mut changes).await?;
                continue;
            }
            if waited_for_light && !settled {
                settled = true;
                tokio::time::sleep(self.inner.config.settle_delay).await;
                continue;
            }

            let lease = if spec.exclusive {
                Some(self.reserve(&spec).await?)
            } else {
                None
            };

            let claim = {
                let mut slots = lock(&self.inner.slots);
                let light_loading = spec.weight == SlotWeight::Heavy && any_light_loading(&slots);
                match slots.get_mut(&slot) {
                    Some(entry) if entry.state.is_loaded() || entry.state == SlotState::Loading => {
                        Claim::Retry
                    }
                    Some(_) if epoch.is_some_and(|expected| expected != self.epoch()) => {
                        Claim::Superseded
                    }
                    Some(_) if light_loading => Claim::WaitForLight,
                    Some(entry) => {
                        self.inner.transition(entry, SlotState::Loading, None);
                        Claim::Go(entry.generation, entry.cancel.clone())
                    }
                    None => Claim::Superseded,
                }
            };
            let (generation, cancel) = match claim {
                Claim::Go(generation, cancel) => (generation, cancel),
                Claim::Retry => {
                    drop(lease);
                    continue;
                }
                Claim::WaitForLight => {
                    drop(lease);
                    debug!(slot = %slot, "light slot began loading, backing off");
                    waited_for_light = true;
                    settled = false;
                    continue;
                }
                Claim::Superseded => return Err(MurmurError::Cancelled),
            };

            info!(slot = %slot, "Loading worker");
            let reporter = LoadReporter::new(slot, self.inner.events.clone());
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(MurmurError::Cancelled),
                loaded = self.inner.loader.load(slot, &reporter) => loaded,
            };

            let (outcome, orphan) = {
                let mut slots = lock(&self.inner.slots);
                match slots.get_mut(&slot) {
                    Some(entry) if entry.generation == generation => match result {
                        Ok(worker) => {
                            entry.worker = Some(worker.clone());
                            entry.last_error = None;
                            self.inner.transition(entry, SlotState::Ready, None);
                            (Ok(worker), None)
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            entry.invalidate();
                            entry.last_error = Some(reason.clone());
                            self.inner
                                .transition(entry, SlotState::Error, Some(reason.clone()));
                            (Err(MurmurError::SlotFailed { slot, reason }), None)
                        }
                    },
                    // Torn down while loading; whatever came back is stale.
                    _ => (Err(MurmurError::Cancelled), result.ok()),
                }
            };
            drop(lease);

            match &outcome {
                Ok(_) => info!(slot = %slot, "Worker ready"),
                Err(MurmurError::Cancelled) => debug!(slot = %slot, "load disowned"),
                Err(e) => warn!(slot = %slot, error = %e, "Worker failed to load"),
            }
            if let Some(worker) = orphan {
                self.inner.loader.unload(slot, worker).await;
            }
            return outcome;
        }
    }

    /// Reserve the accelerator for `spec`, preempting a lower-priority holder.
    async fn reserve(&self, spec: &SlotSpec) -> Result<SlotLease> {
        let started = tokio::time::Instant::now();
        let deadline = started + self.inner.config.quiescence_timeout;

        loop {
            let holder = match self.inner.accelerator.try_acquire(spec.name) {
                Ok(lease) => {
                    self.inner.pause_lower(spec.name, spec.priority);
                    return Ok(SlotLease {
                        lease: Some(lease),
                        inner: Arc::clone(&self.inner),
                    });
                }
                Err(holder) => holder,
            };

            if holder != spec.name && spec.priority > self.inner.priority_of(holder) {
                info!(slot = %spec.name, holder = %holder, "Preempting accelerator holder");
                self.terminate(holder, format!("preempted by {}", spec.name))
                    .await;
            }

            if !self.inner.accelerator.wait_quiescent(deadline).await {
                let holder = self.inner.accelerator.holder().unwrap_or(holder);
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(slot = %spec.name, holder = %holder, waited_ms, "Accelerator reservation timed out");
                return Err(MurmurError::ResourceBusyTimeout { holder, waited_ms });
            }
        }
    }

    /// Tear one slot down to `Unloaded`, cancelling whatever it was doing.
    async fn terminate(&self, slot: SlotName, reason: String) {
        let worker = {
            let mut slots = lock(&self.inner.slots);
            match slots.get_mut(&slot) {
                Some(entry) => {
                    let worker = entry.invalidate();
                    self.inner
                        .transition(entry, SlotState::Unloaded, Some(reason));
                    worker
                }
                None => None,
            }
        };
        if let Some(worker) = worker {
            self.inner.loader.unload(slot, worker).await;
        }
    }

    /// Run `work` against the slot's worker, loading it first if needed.
    ///
    /// The slot is `Busy` while the work runs. If the work fails with a
    /// collaborator error the worker is dropped and the slot goes to `Error`;
    /// the next call loads a fresh one.
    pub async fn run<T, F, Fut>(&self, slot: SlotName, work: F) -> Result<T>
    where
        F: FnOnce(Worker) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let spec = self.spec(slot)?;
        let mut work = work;
        for _ in 0..MAX_RUN_ATTEMPTS {
            self.ensure_loaded(slot).await?;
            match self.execute(&spec, work).await {
                Attempt::Finished(result) => return result,
                Attempt::NotLoaded(returned) => {
                    debug!(slot = %slot, "worker went away before work started, reloading");
                    work = returned;
                }
            }
        }
        Err(MurmurError::SlotFailed {
            slot,
            reason: "worker kept unloading before work could start".to_string(),
        })
    }

    /// Like [`run`](Self::run), but never loads on demand.
    pub async fn run_loaded<T, F, Fut>(&self, slot: SlotName, work: F) -> Result<T>
    where
        F: FnOnce(Worker) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let spec = self.spec(slot)?;
        match self.execute(&spec, work).await {
            Attempt::Finished(result) => result,
            Attempt::NotLoaded(_) => Err(MurmurError::NotLoaded(slot)),
        }
    }

    async fn execute<T, F, Fut>(&self, spec: &SlotSpec, work: F) -> Attempt<T, F>
    where
        F: FnOnce(Worker) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let slot = spec.name;
        if !spec.exclusive && self.worker(slot).is_none() {
            return Attempt::NotLoaded(work);
        }
        let lease = if spec.exclusive {
            if self.worker(slot).is_none() {
                return Attempt::NotLoaded(work);
            }
            match self.reserve(spec).await {
                Ok(lease) => Some(lease),
                Err(e) => return Attempt::Finished(Err(e)),
            }
        } else {
            None
        };

        let claim = {
            let mut slots = lock(&self.inner.slots);
            match slots.get_mut(&slot) {
                Some(entry) if entry.state.is_loaded() => match entry.worker.clone() {
                    Some(worker) => {
                        if entry.state == SlotState::Paused {
                            self.inner.transition(entry, SlotState::Ready, None);
                        }
                        entry.active += 1;
                        self.inner.transition(entry, SlotState::Busy, None);
                        Some((worker, entry.generation, entry.cancel.clone()))
                    }
                    None => None,
                },
                _ => None,
            }
        };
        let Some((worker, generation, cancel)) = claim else {
            drop(lease);
            return Attempt::NotLoaded(work);
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MurmurError::Cancelled),
            done = work(worker) => done,
        };

        let failed_worker = {
            let mut slots = lock(&self.inner.slots);
            match slots.get_mut(&slot) {
                Some(entry) if entry.generation == generation => match &result {
                    Err(e) if e.is_collaborator_failure() => {
                        let reason = e.to_string();
                        let worker = entry.invalidate();
                        entry.last_error = Some(reason.clone());
                        self.inner
                            .transition(entry, SlotState::Error, Some(reason));
                        worker
                    }
                    _ => {
                        entry.active = entry.active.saturating_sub(1);
                        if entry.active == 0 {
                            self.inner.transition(entry, SlotState::Ready, None);
                        }
                        None
                    }
                },
                _ => None,
            }
        };
        drop(lease);

        if let Some(worker) = failed_worker {
            warn!(slot = %slot, "Worker failed, dropping it");
            self.inner.loader.unload(slot, worker).await;
        }
        Attempt::Finished(result)
    }

    /// Start every autostart slot: light slots first, then heavy ones after
    /// the settle delay.
    pub async fn start_all(&self) -> RestoreOutcome {
        let targets: Vec<SlotName> = lock(&self.inner.slots)
            .values()
            .filter(|entry| entry.spec.autostart)
            .map(|entry| entry.spec.name)
            .collect();
        let (epoch, cancel) = {
            let lifecycle = lock(&self.inner.lifecycle);
            (lifecycle.epoch, lifecycle.restore_cancel.clone())
        };
        info!(slots = targets.len(), "Starting worker slots");
        self.staged_start(&targets, epoch, &cancel).await
    }

    /// Tear down every slot and wait until the accelerator is quiescent.
    ///
    /// Remembers which slots were live so [`restore`](Self::restore) can
    /// bring them back, and aborts any restore still in progress.
    pub async fn suspend_all(&self) -> Result<()> {
        let (epoch, workers) = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            lifecycle.epoch += 1;
            self.inner.epoch.store(lifecycle.epoch, Ordering::SeqCst);
            lifecycle.restore_cancel.cancel();
            lifecycle.restore_cancel = CancellationToken::new();

            let mut slots = lock(&self.inner.slots);
            let mut workers = Vec::new();
            for (name, entry) in slots.iter_mut() {
                if !matches!(entry.state, SlotState::Unloaded | SlotState::Error) {
                    lifecycle.suspended.insert(*name);
                }
                if let Some(worker) = entry.invalidate() {
                    workers.push((*name, worker));
                }
                self.inner.transition(
                    entry,
                    SlotState::Unloaded,
                    Some("suspended".to_string()),
                );
            }
            (lifecycle.epoch, workers)
        };
        self.inner.bump();
        info!(epoch, "Suspended all worker slots");

        for (slot, worker) in workers {
            self.inner.loader.unload(slot, worker).await;
        }

        let started = tokio::time::Instant::now();
        let deadline = started + self.inner.config.quiescence_timeout;
        if !self.inner.accelerator.wait_quiescent(deadline).await {
            // Released between the timeout and this read counts as quiescent.
            if let Some(holder) = self.inner.accelerator.holder() {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(holder = %holder, waited_ms, "Accelerator did not quiesce after suspend");
                return Err(MurmurError::ResourceBusyTimeout { holder, waited_ms });
            }
        }
        Ok(())
    }

    /// Bring back the slots that were live at the last suspend.
    ///
    /// Gives up as soon as a newer [`suspend_all`](Self::suspend_all) has
    /// started, leaving slots as that teardown left them.
    pub async fn restore(&self) -> RestoreOutcome {
        let (epoch, cancel, targets) = {
            let lifecycle = lock(&self.inner.lifecycle);
            (
                lifecycle.epoch,
                lifecycle.restore_cancel.clone(),
                lifecycle.suspended.iter().copied().collect::<Vec<_>>(),
            )
        };
        info!(epoch, slots = targets.len(), "Restoring worker slots");

        let outcome = self.staged_start(&targets, epoch, &cancel).await;
        match &outcome {
            RestoreOutcome::Completed { .. } => {
                let mut lifecycle = lock(&self.inner.lifecycle);
                if lifecycle.epoch == epoch {
                    lifecycle.suspended.clear();
                }
            }
            RestoreOutcome::Aborted => info!(epoch, "Restore superseded"),
        }
        outcome
    }

    /// Run [`restore`](Self::restore) on a background task.
    pub fn restore_in_background(&self) -> JoinHandle<RestoreOutcome> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.restore().await })
    }

    async fn staged_start(
        &self,
        targets: &[SlotName],
        epoch: u64,
        cancel: &CancellationToken,
    ) -> RestoreOutcome {
        let (light, heavy): (Vec<SlotSpec>, Vec<SlotSpec>) = targets
            .iter()
            .filter_map(|slot| self.spec(*slot).ok())
            .partition(|spec| spec.weight == SlotWeight::Light);
        let had_light = !light.is_empty();
        let mut failed = Vec::new();

        for (stage, specs) in [light, heavy].into_iter().enumerate() {
            if specs.is_empty() {
                continue;
            }
            if stage > 0 && had_light {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return RestoreOutcome::Aborted,
                    _ = tokio::time::sleep(self.inner.config.settle_delay) => {}
                }
            }

            for spec in specs {
                if cancel.is_cancelled() || self.epoch() != epoch {
                    return RestoreOutcome::Aborted;
                }
                match self.load_slot(spec.name, Some(epoch)).await {
                    Ok(_) => {}
                    Err(MurmurError::Cancelled) if self.epoch() != epoch => {
                        return RestoreOutcome::Aborted;
                    }
                    Err(e) => {
                        warn!(slot = %spec.name, error = %e, "Slot did not start");
                        failed.push(spec.name);
                    }
                }
            }
        }

        RestoreOutcome::Completed { failed }
    }

    /// Run `op` with every slot torn down, then restore them in the
    /// background.
    pub async fn exclusive<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.suspend_all().await?;
        let result = op().await;

        let scheduler = self.clone();
        tokio::spawn(async move {
            match scheduler.restore().await {
                RestoreOutcome::Completed { failed } if !failed.is_empty() => {
                    warn!(?failed, "Some slots did not come back after exclusive operation");
                }
                outcome => debug!(?outcome, "restore after exclusive operation"),
            }
        });
        result
    }
}
