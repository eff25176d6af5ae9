//! One-shot classify/describe runs (e.g. "regenerate description") guarded by
//! a generation counter instead of a per-run cancellation flag.
//!
//! Every `run`, `regenerate`, `describe_with` and `cancel` advances the
//! generation. A spawned task stamps the value it started with and may only
//! write state while that value is still current; anything else is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use strum::Display;
use tokio::task::{AbortHandle, JoinHandle};

use crate::models::work_item::{Classification, Description};
use crate::services::vision::VisionService;

#[derive(Debug, Clone, Copy, Serialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Idle,
    Classifying,
    Describing,
    Done,
    Error,
}

impl Stage {
    pub fn is_active(self) -> bool {
        matches!(self, Stage::Classifying | Stage::Describing)
    }
}

/// Read-only view of the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct SingleRunView {
    pub generation: u64,
    pub stage: Stage,
    pub input: Option<String>,
    pub classification: Option<Classification>,
    pub description: Option<Description>,
    pub error: Option<String>,
}

/// Handle to a spawned single run. Awaiting `handle` waits for the task
/// whether or not its result was committed.
#[derive(Debug)]
pub struct RunTicket {
    pub generation: u64,
    pub handle: JoinHandle<()>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SingleRunError {
    #[error("Input reference must not be empty")]
    EmptyInput,

    #[error("Category must not be empty")]
    EmptyCategory,

    #[error("Nothing to regenerate: no previous input or classification")]
    NothingToRegenerate,
}

struct SingleRunState {
    stage: Stage,
    input: Option<String>,
    classification: Option<Classification>,
    description: Option<Description>,
    error: Option<String>,
    in_flight: Option<AbortHandle>,
}

struct Inner {
    service: Arc<dyn VisionService>,
    auto_describe: bool,
    generation: AtomicU64,
    state: Mutex<SingleRunState>,
}

#[derive(Clone)]
pub struct SingleRunCoordinator {
    inner: Arc<Inner>,
}

impl SingleRunCoordinator {
    pub fn new(service: Arc<dyn VisionService>, auto_describe: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                auto_describe,
                generation: AtomicU64::new(0),
                state: Mutex::new(SingleRunState {
                    stage: Stage::Idle,
                    input: None,
                    classification: None,
                    description: None,
                    error: None,
                    in_flight: None,
                }),
            }),
        }
    }

    /// Classify (and describe) `input`, superseding anything in flight.
    pub fn run(&self, input: impl Into<String>) -> Result<RunTicket, SingleRunError> {
        let input = input.into();
        if input.trim().is_empty() {
            return Err(SingleRunError::EmptyInput);
        }
        let mut state = self.inner.state.lock();
        Ok(self.spawn_run(&mut state, input))
    }

    /// Describe again from the current classification, or re-run the last
    /// input when there is no classification yet.
    pub fn regenerate(&self) -> Result<RunTicket, SingleRunError> {
        let mut state = self.inner.state.lock();
        if let Some(classification) = state.classification.clone() {
            return Ok(self.spawn_describe(&mut state, classification));
        }
        match state.input.clone() {
            Some(input) => Ok(self.spawn_run(&mut state, input)),
            None => Err(SingleRunError::NothingToRegenerate),
        }
    }

    /// Describe a caller-supplied category and labels, keeping the last
    /// confidence when one exists.
    pub fn describe_with(
        &self,
        category: impl Into<String>,
        labels: Vec<String>,
    ) -> Result<RunTicket, SingleRunError> {
        let category = category.into();
        if category.trim().is_empty() {
            return Err(SingleRunError::EmptyCategory);
        }
        let mut state = self.inner.state.lock();
        let confidence = state
            .classification
            .as_ref()
            .map(|c| c.confidence)
            .unwrap_or(1.0);
        let classification = Classification {
            category,
            confidence,
            labels,
        };
        Ok(self.spawn_describe(&mut state, classification))
    }

    /// Supersede whatever is in flight. An active stage returns to Idle.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        let generation = self.inner.advance(&mut state);
        let was_active = state.stage.is_active();
        if was_active {
            state.stage = Stage::Idle;
        }
        tracing::info!(generation, was_active, "Single run cancelled");
        was_active
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> SingleRunView {
        let state = self.inner.state.lock();
        SingleRunView {
            generation: self.generation(),
            stage: state.stage,
            input: state.input.clone(),
            classification: state.classification.clone(),
            description: state.description.clone(),
            error: state.error.clone(),
        }
    }

    fn spawn_run(&self, state: &mut SingleRunState, input: String) -> RunTicket {
        let generation = self.inner.advance(state);
        state.stage = Stage::Classifying;
        state.input = Some(input.clone());
        state.classification = None;
        state.description = None;
        state.error = None;

        tracing::info!(generation, input = %input, "Single run started");
        let handle = tokio::spawn(classify_task(self.inner.clone(), generation, input));
        state.in_flight = Some(handle.abort_handle());
        RunTicket { generation, handle }
    }

    fn spawn_describe(
        &self,
        state: &mut SingleRunState,
        classification: Classification,
    ) -> RunTicket {
        let generation = self.inner.advance(state);
        state.stage = Stage::Describing;
        state.classification = Some(classification.clone());
        state.description = None;
        state.error = None;

        tracing::info!(generation, category = %classification.category, "Single describe started");
        let handle = tokio::spawn(describe_task(self.inner.clone(), generation, classification));
        state.in_flight = Some(handle.abort_handle());
        RunTicket { generation, handle }
    }
}

impl Inner {
    /// Bump the generation and abort the task it supersedes. Callers hold the
    /// state lock so bumps and commits are totally ordered.
    fn advance(&self, state: &mut SingleRunState) -> u64 {
        if let Some(previous) = state.in_flight.take() {
            previous.abort();
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn commit(&self, generation: u64, apply: impl FnOnce(&mut SingleRunState)) -> bool {
        let mut state = self.state.lock();
        let current = self.generation.load(Ordering::SeqCst);
        if current != generation {
            metrics::counter!("autofill_results_discarded_total").increment(1);
            tracing::debug!(generation, current, "Discarding superseded single-run result");
            return false;
        }
        apply(&mut state);
        true
    }

    fn fail(&self, generation: u64, message: String) {
        let committed = self.commit(generation, |state| {
            state.stage = Stage::Error;
            state.error = Some(message.clone());
            state.in_flight = None;
        });
        if committed {
            tracing::warn!(generation, error = %message, "Single run failed");
        }
    }
}

async fn classify_task(inner: Arc<Inner>, generation: u64, input: String) {
    let classification = match inner.service.classify(&input).await {
        Ok(classification) => classification,
        Err(err) => return inner.fail(generation, err.to_string()),
    };

    if !inner.auto_describe {
        inner.commit(generation, |state| {
            state.stage = Stage::Done;
            state.classification = Some(classification);
            state.in_flight = None;
        });
        return;
    }

    let staged = inner.commit(generation, |state| {
        state.stage = Stage::Describing;
        state.classification = Some(classification.clone());
    });
    if staged {
        describe_task(inner, generation, classification).await;
    }
}

async fn describe_task(inner: Arc<Inner>, generation: u64, classification: Classification) {
    match inner
        .service
        .describe(&classification.category, &classification.labels)
        .await
    {
        Ok(description) => {
            let committed = inner.commit(generation, |state| {
                state.stage = Stage::Done;
                state.description = Some(description);
                state.in_flight = None;
            });
            if committed {
                tracing::info!(generation, category = %classification.category, "Single run done");
            }
        }
        Err(err) => inner.fail(generation, err.to_string()),
    }
}
