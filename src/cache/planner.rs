//! Merges queued purge events into one request.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;

use super::events::{CacheEvent, EventKind};

/// Merged purge request. A site-wide purge subsumes every path.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PurgePlan {
    pub all: bool,
    pub paths: BTreeSet<String>,
}

impl fmt::Display for PurgePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PurgePlan {{ all: {}, paths: {} }}", self.all, self.paths.len())
    }
}

impl PurgePlan {
    /// Deduplicates by event id and merges in epoch order.
    pub fn from_events(mut events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();
        events.sort_by_key(|event| event.epoch);

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            match event.kind {
                EventKind::PurgeAll => plan.all = true,
                EventKind::PurgePaths { paths } => plan.paths.extend(paths),
            }
        }

        if plan.all {
            plan.paths.clear();
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.paths.is_empty()
    }

    /// The plan expressed as an `X-Cache-Invalidate`-style value.
    pub fn header_value(&self) -> Option<String> {
        if self.all {
            return Some("/*".to_string());
        }
        if self.paths.is_empty() {
            return None;
        }
        Some(self.paths.iter().cloned().collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, epoch: u64) -> CacheEvent {
        CacheEvent::new(kind, epoch)
    }

    fn paths(values: &[&str]) -> EventKind {
        EventKind::PurgePaths {
            paths: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    #[test]
    fn empty_events_make_empty_plan() {
        let plan = PurgePlan::from_events(vec![]);
        assert!(plan.is_empty());
        assert_eq!(plan.header_value(), None);
    }

    #[test]
    fn paths_are_merged_and_deduplicated() {
        let plan = PurgePlan::from_events(vec![
            event(paths(&["/p/b/"]), 1),
            event(paths(&["/p/a/", "/p/b/"]), 2),
        ]);
        assert!(!plan.all);
        assert_eq!(plan.paths.len(), 2);
        assert_eq!(plan.header_value().as_deref(), Some("/p/a/, /p/b/"));
    }

    #[test]
    fn purge_all_subsumes_paths() {
        let plan = PurgePlan::from_events(vec![
            event(paths(&["/p/a/"]), 1),
            event(EventKind::PurgeAll, 2),
            event(paths(&["/p/b/"]), 3),
        ]);
        assert!(plan.all);
        assert!(plan.paths.is_empty());
        assert_eq!(plan.header_value().as_deref(), Some("/*"));
    }

    #[test]
    fn duplicate_event_ids_count_once() {
        let first = event(paths(&["/p/a/"]), 1);
        let plan = PurgePlan::from_events(vec![first.clone(), first]);
        assert_eq!(plan.paths.len(), 1);
    }
}
