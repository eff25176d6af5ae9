use crate::models::work_item::{ItemStatus, Progress, WorkItem};

/// Completion counters over a registry snapshot.
///
/// An empty registry reports 0% rather than dividing by zero.
pub fn aggregate(items: &[WorkItem]) -> Progress {
    let completed = items
        .iter()
        .filter(|item| item.status == ItemStatus::Done)
        .count();
    let total = items.len();
    let percent = (completed as f64 / total.max(1) as f64 * 100.0).round() as u8;

    Progress {
        completed,
        total,
        percent,
    }
}
