//! Ordered per-image work state and the transitions allowed on it.
//!
//! Forward path: `Pending -> Classifying -> (Describing) -> Done`, with any
//! active state able to fall to `Error`. `Done | Error -> Pending` only happens
//! through a requeue; cancelled in-flight items are rolled back to `Pending`.

use chrono::Utc;

use crate::models::work_item::{Classification, Description, ItemStatus, WorkItem};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    items: Vec<WorkItem>,
}

impl Registry {
    /// Fresh registry with one Pending item per input, in input order.
    pub fn from_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: inputs.into_iter().map(WorkItem::pending).collect(),
        }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        self.items.get(index)
    }

    /// Indices and URIs of every Pending item, in registry order.
    pub fn pending(&self) -> Vec<(usize, String)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status == ItemStatus::Pending)
            .map(|(index, item)| (index, item.uri.clone()))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_active()).count()
    }

    /// Pending -> Classifying. Fails if the slot no longer holds `uri` or is not Pending.
    pub fn begin_classifying(&mut self, index: usize, uri: &str) -> bool {
        self.transition(index, uri, |item| {
            if item.status != ItemStatus::Pending {
                return false;
            }
            item.status = ItemStatus::Classifying;
            item.error = None;
            true
        })
    }

    /// Classifying -> Describing, keeping the classification visible while describing.
    pub fn begin_describing(
        &mut self,
        index: usize,
        uri: &str,
        classification: Classification,
    ) -> bool {
        self.transition(index, uri, |item| {
            if item.status != ItemStatus::Classifying {
                return false;
            }
            item.status = ItemStatus::Describing;
            item.classification = Some(classification);
            true
        })
    }

    /// Active -> Done. `description` is `None` when auto-describe is off.
    pub fn complete(
        &mut self,
        index: usize,
        uri: &str,
        classification: Classification,
        description: Option<Description>,
    ) -> bool {
        self.transition(index, uri, |item| {
            if !item.status.is_active() {
                return false;
            }
            item.status = ItemStatus::Done;
            item.classification = Some(classification);
            item.description = description;
            item.error = None;
            true
        })
    }

    /// Active -> Error.
    pub fn fail(&mut self, index: usize, uri: &str, message: String) -> bool {
        self.transition(index, uri, |item| {
            if !item.status.is_active() {
                return false;
            }
            item.status = ItemStatus::Error;
            item.error = Some(message);
            true
        })
    }

    /// Active -> Pending for a cancelled task; partial results are dropped.
    pub fn roll_back(&mut self, index: usize, uri: &str) -> bool {
        self.transition(index, uri, |item| {
            if !item.status.is_active() {
                return false;
            }
            reset(item);
            true
        })
    }

    /// Done | Error -> Pending for every item. Returns how many were reset.
    pub fn requeue_all(&mut self) -> usize {
        self.requeue_where(|_| true)
    }

    /// Done | Error -> Pending for every item whose URI matches.
    pub fn requeue_one(&mut self, uri: &str) -> usize {
        self.requeue_where(|item| item.uri == uri)
    }

    fn requeue_where(&mut self, matches: impl Fn(&WorkItem) -> bool) -> usize {
        let mut reset_count = 0;
        for item in self.items.iter_mut() {
            if item.status.is_terminal() && matches(item) {
                reset(item);
                reset_count += 1;
            }
        }
        reset_count
    }

    fn transition(
        &mut self,
        index: usize,
        uri: &str,
        apply: impl FnOnce(&mut WorkItem) -> bool,
    ) -> bool {
        match self.items.get_mut(index) {
            Some(item) if item.uri == uri => {
                let applied = apply(item);
                if applied {
                    item.updated_at = Utc::now();
                }
                applied
            }
            _ => false,
        }
    }
}

fn reset(item: &mut WorkItem) {
    item.status = ItemStatus::Pending;
    item.classification = None;
    item.description = None;
    item.error = None;
    item.updated_at = Utc::now();
}
