use serde::{Deserialize, Serialize};

use crate::model::MetricRecord;

/// What a record cap is counted against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapScope {
    /// All projects of a page share one cap.
    #[default]
    Page,
    /// Each project is capped on its own.
    Project,
}

/// Records collected for one page, flushed once and then dropped.
#[derive(Debug)]
pub struct PageBuffer {
    records: Vec<MetricRecord>,
    cap: Option<usize>,
    scope: CapScope,
    dropped: usize,
}

impl PageBuffer {
    pub fn new(cap: Option<usize>, scope: CapScope) -> Self {
        Self {
            records: Vec::new(),
            cap,
            scope,
            dropped: 0,
        }
    }

    /// Append one project's records in order until the cap is hit. Returns
    /// how many were kept; the rest are counted as dropped.
    pub fn extend_project<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = MetricRecord>,
    {
        let mut kept = 0;
        for record in records {
            if self.has_room(kept) {
                self.records.push(record);
                kept += 1;
            } else {
                self.dropped += 1;
            }
        }
        kept
    }

    fn has_room(&self, kept_for_project: usize) -> bool {
        match (self.cap, self.scope) {
            (None, _) => true,
            (Some(cap), CapScope::Page) => self.records.len() < cap,
            (Some(cap), CapScope::Project) => kept_for_project < cap,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_records(self) -> Vec<MetricRecord> {
        self.records
    }
}
