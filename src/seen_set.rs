use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::Lead;

/// In-memory record of lead identifiers already observed.
///
/// Only grows during a process lifetime and is never persisted.
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    first_seen: HashMap<String, DateTime<Utc>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, lead_id: &str) -> bool {
        self.first_seen.contains_key(lead_id)
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }

    /// When the lead was first observed by this process.
    pub fn first_seen(&self, lead_id: &str) -> Option<DateTime<Utc>> {
        self.first_seen.get(lead_id).copied()
    }

    /// Marks every lead as seen. Returns how many were not seen before.
    pub fn mark_all<'a, I>(&mut self, leads: I) -> usize
    where
        I: IntoIterator<Item = &'a Lead>,
    {
        let now = Utc::now();
        let before = self.first_seen.len();
        for lead in leads {
            self.first_seen.entry(lead.id.clone()).or_insert(now);
        }
        self.first_seen.len() - before
    }

    /// Snapshot of the tracked identifiers.
    pub fn ids(&self) -> HashSet<String> {
        self.first_seen.keys().cloned().collect()
    }
}

/// Leads whose identifier is not in `seen`, in their original order.
pub fn new_leads(current: &[Lead], seen: &SeenSet) -> Vec<Lead> {
    current
        .iter()
        .filter(|lead| !seen.contains(&lead.id))
        .cloned()
        .collect()
}
