use std::collections::{HashMap, HashSet};

use crate::db::ReportState;

use super::event::LiveEvent;

/// Events that bring a client holding `previous` up to `current`.
///
/// A missing previous snapshot yields the full `reportData`. A current snapshot that is
/// missing (store never written) yields nothing. Summary-only changes become one
/// `summaryUpdate`; otherwise the summary travels implicitly with the per-comparison events.
pub fn diff_snapshots(previous: Option<&ReportState>, current: Option<&ReportState>) -> Vec<LiveEvent> {
    let current = match current {
        Some(current) => current,
        None => return Vec::new(),
    };
    let previous = match previous {
        Some(previous) => previous,
        None => return vec![LiveEvent::ReportData(current.clone())],
    };

    let before: HashMap<&str, _> = previous
        .comparisons
        .iter()
        .map(|comparison| (comparison.id.as_str(), comparison))
        .collect();
    let after: HashSet<&str> = current
        .comparisons
        .iter()
        .map(|comparison| comparison.id.as_str())
        .collect();

    let mut events: Vec<LiveEvent> = current
        .comparisons
        .iter()
        .filter(|comparison| before.get(comparison.id.as_str()) != Some(comparison))
        .map(|comparison| LiveEvent::ComparisonUpdate(comparison.clone()))
        .collect();

    events.extend(
        previous
            .comparisons
            .iter()
            .filter(|comparison| !after.contains(comparison.id.as_str()))
            .map(|comparison| LiveEvent::ComparisonRemoved {
                id: comparison.id.clone(),
            }),
    );

    if events.is_empty() && previous.summary != current.summary {
        events.push(LiveEvent::SummaryUpdate(current.summary));
    }
    events
}
