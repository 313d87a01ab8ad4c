//! Roster cache.
//!
//! Holds the known salesperson / department / course / expert names used by
//! cross-field lookup checks and export filters. Explicitly refreshed from
//! the record store and invalidated after successful imports; replaces the
//! page-level mutable caches of the original console.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::domain::entity::{EntityRecord, EntityType};
use crate::domain::error::Result;
use crate::infrastructure::store::{RecordStore, Scope};

#[derive(Debug, Default, Clone)]
pub struct RosterSnapshot {
    pub salespersons: HashSet<String>,
    pub departments: HashSet<String>,
    pub course_codes: HashSet<String>,
    pub course_names: HashSet<String>,
    pub expert_names: HashSet<String>,
}

impl RosterSnapshot {
    pub fn has_salesperson(&self, name: &str) -> bool {
        self.salespersons.contains(name)
    }

    pub fn has_department(&self, name: &str) -> bool {
        self.departments.contains(name)
    }

    pub fn has_course_code(&self, code: &str) -> bool {
        self.course_codes.contains(code)
    }

    pub fn has_expert(&self, name: &str) -> bool {
        self.expert_names.contains(name)
    }
}

pub struct RosterCache {
    inner: RwLock<Option<Arc<RosterSnapshot>>>,
}

impl RosterCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Current snapshot, loading it from the store on first use.
    pub async fn snapshot(&self, store: &dyn RecordStore) -> Result<Arc<RosterSnapshot>> {
        if let Some(snapshot) = self.inner.read().unwrap().clone() {
            return Ok(snapshot);
        }
        self.refresh(store).await
    }

    /// Rebuild the snapshot from the store.
    pub async fn refresh(&self, store: &dyn RecordStore) -> Result<Arc<RosterSnapshot>> {
        let mut snapshot = RosterSnapshot::default();

        for stored in store.list(EntityType::Salespersons, &Scope::All).await? {
            if let EntityRecord::Salesperson(s) = stored.record {
                snapshot.salespersons.insert(s.name);
                snapshot.departments.insert(s.department);
            }
        }
        for stored in store.list(EntityType::Courses, &Scope::All).await? {
            if let EntityRecord::Course(c) = stored.record {
                if let Some(code) = c.code {
                    snapshot.course_codes.insert(code);
                }
                snapshot.course_names.insert(c.name);
            }
        }
        for stored in store.list(EntityType::Experts, &Scope::All).await? {
            if let EntityRecord::Expert(e) = stored.record {
                snapshot.expert_names.insert(e.name);
            }
        }

        let snapshot = Arc::new(snapshot);
        *self.inner.write().unwrap() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Drop the snapshot; the next access reloads from the store.
    pub fn invalidate(&self) {
        *self.inner.write().unwrap() = None;
    }
}

impl Default for RosterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Salesperson;
    use crate::infrastructure::store::MemoryRecordStore;

    #[tokio::test]
    async fn test_snapshot_caches_until_invalidated() {
        let store = MemoryRecordStore::new();
        let cache = RosterCache::new();

        let first = cache.snapshot(&store).await.unwrap();
        assert!(first.salespersons.is_empty());

        store
            .insert(&EntityRecord::Salesperson(Salesperson {
                name: "张伟".to_string(),
                employee_no: None,
                department: "销售一部".to_string(),
                position: None,
                phone: None,
                email: None,
                hire_date: None,
                monthly_target: None,
            }))
            .await
            .unwrap();

        // Still the stale snapshot until an explicit invalidate.
        let cached = cache.snapshot(&store).await.unwrap();
        assert!(cached.salespersons.is_empty());

        cache.invalidate();
        let fresh = cache.snapshot(&store).await.unwrap();
        assert!(fresh.has_salesperson("张伟"));
        assert!(fresh.has_department("销售一部"));
    }
}
