//! Test helper utilities: a scripted vision service and polling helpers
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use listing_autofill::models::work_item::{
    Classification, Description, DescriptionMeta, ItemStatus, WorkItem,
};
use listing_autofill::services::vision::{ServiceError, VisionService};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

/// Holds scripted calls until opened.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Concurrency and call counters observed by the fake.
#[derive(Default)]
pub struct CallStats {
    pub classify_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallStats {
    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

/// Decrements on drop so aborted calls are accounted for too.
struct InFlightGuard<'a>(&'a CallStats);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Vision service with per-URI latency, failures and gates.
///
/// Classifies `uri` as category `category:{uri}` and describes a category
/// as `blurb for {category}`.
#[derive(Default)]
pub struct FakeVision {
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    classify_failures: HashMap<String, ServiceError>,
    describe_failures: HashMap<String, ServiceError>,
    classify_gates: HashMap<String, Gate>,
    classify_panics: HashSet<String>,
    all_gate: Option<Gate>,
    pub stats: CallStats,
}

impl FakeVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_delay(mut self, uri: &str, delay: Duration) -> Self {
        self.delays.insert(uri.to_string(), delay);
        self
    }

    pub fn fail_classify(mut self, uri: &str, err: ServiceError) -> Self {
        self.classify_failures.insert(uri.to_string(), err);
        self
    }

    pub fn fail_describe(mut self, category: &str, err: ServiceError) -> Self {
        self.describe_failures.insert(category.to_string(), err);
        self
    }

    /// Panic inside classify for `uri`, as a buggy service would.
    pub fn panic_classify(mut self, uri: &str) -> Self {
        self.classify_panics.insert(uri.to_string());
        self
    }

    /// Hold classify calls for `uri` until the gate opens.
    pub fn gate_classify(mut self, uri: &str, gate: &Gate) -> Self {
        self.classify_gates.insert(uri.to_string(), gate.clone());
        self
    }

    /// Hold every classify and describe call until the gate opens.
    pub fn gate_all(mut self, gate: &Gate) -> Self {
        self.all_gate = Some(gate.clone());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

pub fn category_for(uri: &str) -> String {
    format!("category:{uri}")
}

#[async_trait]
impl VisionService for FakeVision {
    async fn classify(&self, image_uri: &str) -> Result<Classification, ServiceError> {
        self.stats.classify_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.stats.enter();

        if let Some(gate) = &self.all_gate {
            gate.wait().await;
        }
        if let Some(gate) = self.classify_gates.get(image_uri) {
            gate.wait().await;
        }
        sleep(*self.delays.get(image_uri).unwrap_or(&self.default_delay)).await;

        if self.classify_panics.contains(image_uri) {
            panic!("scripted classify panic for {image_uri}");
        }
        if let Some(err) = self.classify_failures.get(image_uri) {
            return Err(err.clone());
        }
        Ok(Classification {
            category: category_for(image_uri),
            confidence: 0.9,
            labels: vec!["used".to_string(), "good condition".to_string()],
        })
    }

    async fn describe(
        &self,
        category: &str,
        _labels: &[String],
    ) -> Result<Description, ServiceError> {
        self.stats.describe_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.stats.enter();

        if let Some(gate) = &self.all_gate {
            gate.wait().await;
        }
        sleep(self.default_delay).await;

        if let Some(err) = self.describe_failures.get(category) {
            return Err(err.clone());
        }
        Ok(Description {
            blurb: format!("blurb for {category}"),
            meta: DescriptionMeta {
                model: "fake".to_string(),
                suggested_title: None,
                generated_at: Utc::now(),
            },
        })
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(1)).await;
    }
    condition()
}

pub fn statuses(items: &[WorkItem]) -> Vec<ItemStatus> {
    items.iter().map(|i| i.status).collect()
}

pub fn count_active(items: &[WorkItem]) -> usize {
    items.iter().filter(|i| i.status.is_active()).count()
}
