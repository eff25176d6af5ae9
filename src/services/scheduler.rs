//! Bounded-concurrency runner that drives Pending items through
//! classify -> describe and writes results back into the registry.
//!
//! Each `start()` copies the Pending indices into an immutable snapshot and
//! spawns a driver that admits at most `concurrency` pipeline tasks at a time.
//! Every registry write made by a task goes through [`Shared::commit`], which
//! drops the write unless the task's run is still the current one and has not
//! been cancelled. `cancel()` flips the run's token under the same lock, so
//! once it returns nothing from that run can land.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::pipeline::BatchView;
use crate::models::work_item::{Progress, WorkItem};
use crate::services::progress;
use crate::services::registry::Registry;
use crate::services::vision::{ServiceError, VisionService};

pub const DEFAULT_CONCURRENCY: usize = 2;
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub concurrency: usize,
    pub auto_describe: bool,
}

impl RunOptions {
    /// Concurrency is clamped into `1..=MAX_CONCURRENCY`.
    pub fn new(concurrency: usize, auto_describe: bool) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            auto_describe,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, true)
    }
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    index: usize,
    uri: String,
}

/// Everything a run needs, frozen at `start()`.
#[derive(Clone)]
struct RunContext {
    epoch: u64,
    run_id: Uuid,
    options: RunOptions,
    cancel: CancellationToken,
    snapshot: Arc<[SnapshotEntry]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    Applied,
    Discarded,
}

struct SchedulerState {
    registry: Registry,
    options: RunOptions,
    current: Option<RunContext>,
    next_epoch: u64,
}

struct Shared {
    service: Arc<dyn VisionService>,
    state: Mutex<SchedulerState>,
    running: watch::Sender<bool>,
}

/// Batch pipeline over the current set of listing photos.
///
/// Cloning is cheap; clones share the same registry and run.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(service: Arc<dyn VisionService>) -> Self {
        Self::with_options(service, RunOptions::default())
    }

    pub fn with_options(service: Arc<dyn VisionService>, options: RunOptions) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                service,
                state: Mutex::new(SchedulerState {
                    registry: Registry::default(),
                    options,
                    current: None,
                    next_epoch: 0,
                }),
                running,
            }),
        }
    }

    /// Replace the registry with fresh Pending items. Any in-flight run is
    /// invalidated and its late results are dropped.
    pub fn configure<I, S>(&self, inputs: I, options: RunOptions)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.shared.state.lock();
        if let Some(run) = state.current.take() {
            run.cancel.cancel();
            tracing::info!(run_id = %run.run_id, "Run invalidated by new inputs");
        }
        state.registry = Registry::from_inputs(inputs);
        state.options = options;
        self.shared.running.send_replace(false);
        metrics::gauge!("autofill_items_in_flight").set(0.0);

        tracing::info!(
            items = state.registry.len(),
            concurrency = options.concurrency,
            auto_describe = options.auto_describe,
            "Registry configured"
        );
    }

    /// Begin processing every Pending item. A run already in flight is
    /// superseded. Returns false when there is nothing to process.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let run = {
            let mut state = self.shared.state.lock();
            if state.current.is_some() {
                tracing::info!("Superseding in-flight run");
                cancel_locked(&mut state, &self.shared.running);
            }

            let snapshot: Arc<[SnapshotEntry]> = state
                .registry
                .pending()
                .into_iter()
                .map(|(index, uri)| SnapshotEntry { index, uri })
                .collect();
            if snapshot.is_empty() {
                tracing::debug!(items = state.registry.len(), "Nothing pending, start ignored");
                return false;
            }

            state.next_epoch += 1;
            let run = RunContext {
                epoch: state.next_epoch,
                run_id: Uuid::new_v4(),
                options: state.options,
                cancel: CancellationToken::new(),
                snapshot,
            };
            state.current = Some(run.clone());
            self.shared.running.send_replace(true);
            run
        };

        metrics::counter!("autofill_runs_started_total").increment(1);
        tracing::info!(
            run_id = %run.run_id,
            items = run.snapshot.len(),
            concurrency = run.options.concurrency,
            "Starting pipeline run"
        );

        tokio::spawn(drive(self.shared.clone(), run));
        true
    }

    /// Stop the current run. In-flight items go back to Pending and their
    /// results are never committed. Returns false if nothing was running.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();
        cancel_locked(&mut state, &self.shared.running)
    }

    /// Reset every Done/Error item to Pending. Does not start processing.
    pub fn requeue_all(&self) -> usize {
        let reset = self.shared.state.lock().registry.requeue_all();
        tracing::info!(reset, "Requeued all finished items");
        reset
    }

    /// Reset the Done/Error items matching `uri` to Pending. Does not start processing.
    pub fn requeue_one(&self, uri: &str) -> usize {
        let reset = self.shared.state.lock().registry.requeue_one(uri);
        tracing::info!(uri, reset, "Requeued item");
        reset
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.shared.state.lock().registry.items().to_vec()
    }

    pub fn progress(&self) -> Progress {
        progress::aggregate(self.shared.state.lock().registry.items())
    }

    pub fn running(&self) -> bool {
        *self.shared.running.borrow()
    }

    pub fn options(&self) -> RunOptions {
        self.shared.state.lock().options
    }

    /// Registry, progress and running flag read under one lock.
    pub fn view(&self) -> BatchView {
        let state = self.shared.state.lock();
        let items = state.registry.items();
        BatchView {
            running: state.current.is_some(),
            progress: progress::aggregate(items),
            items: items.to_vec(),
        }
    }

    /// Resolves once no run is in flight.
    pub async fn wait_idle(&self) {
        let mut running = self.shared.running.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = running.wait_for(|running| !running).await;
    }
}

fn cancel_locked(state: &mut SchedulerState, running: &watch::Sender<bool>) -> bool {
    let Some(run) = state.current.take() else {
        return false;
    };
    run.cancel.cancel();

    let rolled_back = run
        .snapshot
        .iter()
        .filter(|entry| state.registry.roll_back(entry.index, &entry.uri))
        .count();
    running.send_replace(false);
    metrics::gauge!("autofill_items_in_flight").set(0.0);

    tracing::info!(run_id = %run.run_id, rolled_back, "Run cancelled");
    true
}

impl Shared {
    fn is_current(state: &SchedulerState, run: &RunContext) -> bool {
        !run.cancel.is_cancelled()
            && state
                .current
                .as_ref()
                .is_some_and(|current| current.epoch == run.epoch)
    }

    fn claim(&self, run: &RunContext, entry: &SnapshotEntry) -> bool {
        let mut state = self.state.lock();
        if !Self::is_current(&state, run) {
            return false;
        }
        let claimed = state.registry.begin_classifying(entry.index, &entry.uri);
        metrics::gauge!("autofill_items_in_flight").set(state.registry.active_count() as f64);
        claimed
    }

    fn commit(
        &self,
        run: &RunContext,
        entry: &SnapshotEntry,
        apply: impl FnOnce(&mut Registry) -> bool,
    ) -> Commit {
        let mut state = self.state.lock();
        if !Self::is_current(&state, run) || !apply(&mut state.registry) {
            metrics::counter!("autofill_results_discarded_total").increment(1);
            tracing::debug!(
                run_id = %run.run_id,
                index = entry.index,
                uri = %entry.uri,
                "Discarding result from stale or cancelled run"
            );
            return Commit::Discarded;
        }
        metrics::gauge!("autofill_items_in_flight").set(state.registry.active_count() as f64);
        Commit::Applied
    }

    fn finish(&self, run: &RunContext) {
        let mut state = self.state.lock();
        if !Self::is_current(&state, run) {
            return;
        }
        state.current = None;
        self.running.send_replace(false);

        let progress = progress::aggregate(state.registry.items());
        tracing::info!(
            run_id = %run.run_id,
            completed = progress.completed,
            total = progress.total,
            "Pipeline run finished"
        );
    }

    fn record_failure(&self, run: &RunContext, entry: &SnapshotEntry, err: ServiceError) {
        let message = err.to_string();
        let committed = self.commit(run, entry, |registry| {
            registry.fail(entry.index, &entry.uri, message)
        });
        if committed == Commit::Applied {
            metrics::counter!("autofill_items_failed_total", "kind" => err.kind()).increment(1);
            tracing::warn!(
                run_id = %run.run_id,
                index = entry.index,
                uri = %entry.uri,
                error = %err,
                transient = err.is_transient(),
                "Pipeline item failed"
            );
        }
    }
}

/// Admission loop: keep up to `concurrency` tasks in flight until the
/// snapshot is exhausted and every task has returned, or the run is cancelled.
async fn drive(shared: Arc<Shared>, run: RunContext) {
    let mut tasks = JoinSet::new();
    let mut claimed: HashMap<task::Id, SnapshotEntry> = HashMap::new();
    let mut cursor = 0;

    loop {
        while tasks.len() < run.options.concurrency && !run.cancel.is_cancelled() {
            let Some(entry) = run.snapshot.get(cursor).cloned() else {
                break;
            };
            cursor += 1;
            if shared.claim(&run, &entry) {
                let handle = tasks.spawn(process_item(shared.clone(), run.clone(), entry.clone()));
                claimed.insert(handle.id(), entry);
            }
        }

        if tasks.is_empty() {
            break;
        }

        tokio::select! {
            _ = run.cancel.cancelled() => {
                // Results would be discarded anyway; stop the requests too.
                tasks.abort_all();
                break;
            }
            Some(joined) = tasks.join_next_with_id() => {
                let err = match joined {
                    Ok((id, ())) => {
                        claimed.remove(&id);
                        continue;
                    }
                    Err(err) => err,
                };
                let entry = claimed.remove(&err.id());
                if err.is_panic() {
                    tracing::error!(run_id = %run.run_id, error = %err, "Pipeline task panicked");
                    // The claimed item would otherwise stay active forever.
                    if let Some(entry) = entry {
                        let err = ServiceError::server("pipeline task panicked");
                        shared.record_failure(&run, &entry, err);
                    }
                }
            }
        }
    }

    shared.finish(&run);
}

/// One item through classify and, optionally, describe.
async fn process_item(shared: Arc<Shared>, run: RunContext, entry: SnapshotEntry) {
    let started = Instant::now();
    tracing::debug!(run_id = %run.run_id, index = entry.index, uri = %entry.uri, "Classifying");

    let classification = match shared.service.classify(&entry.uri).await {
        Ok(classification) => classification,
        Err(err) => return shared.record_failure(&run, &entry, err),
    };

    let description = if run.options.auto_describe {
        let staged = shared.commit(&run, &entry, |registry| {
            registry.begin_describing(entry.index, &entry.uri, classification.clone())
        });
        if staged == Commit::Discarded {
            return;
        }

        tracing::debug!(
            run_id = %run.run_id,
            index = entry.index,
            category = %classification.category,
            "Describing"
        );
        match shared
            .service
            .describe(&classification.category, &classification.labels)
            .await
        {
            Ok(description) => Some(description),
            Err(err) => return shared.record_failure(&run, &entry, err),
        }
    } else {
        None
    };

    let category = classification.category.clone();
    let committed = shared.commit(&run, &entry, |registry| {
        registry.complete(entry.index, &entry.uri, classification, description)
    });
    if committed == Commit::Applied {
        metrics::counter!("autofill_items_completed_total").increment(1);
        metrics::histogram!("autofill_item_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            run_id = %run.run_id,
            index = entry.index,
            uri = %entry.uri,
            category = %category,
            duration_ms = started.elapsed().as_millis() as u64,
            "Pipeline item done"
        );
    }
}
