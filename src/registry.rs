//! The process-wide component registry.
//!
//! Contents live behind an `Arc` that each merge replaces wholesale, so a
//! reader holding a snapshot never observes a half-applied merge.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use crate::error::ScanError;
use crate::model::{CandidateMap, CandidateType, TypeKey};

static GLOBAL: OnceLock<ComponentRegistry> = OnceLock::new();

/// What a merge does with a key already held by a different class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyConflictPolicy {
    /// Keep the registered class, report the newcomer.
    #[default]
    Reject,
    /// Replace the registered class. Only the duplicate class check applies.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Empty,
    Populated,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub inserted: Vec<TypeKey>,
    pub replaced: Vec<TypeKey>,
    pub issues: Vec<ScanError>,
}

impl MergeReport {
    pub fn duplicates(&self) -> usize {
        self.issues
            .iter()
            .filter(|e| matches!(e, ScanError::DuplicateValue { .. }))
            .count()
    }
}

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    entries: RwLock<Arc<CandidateMap>>,
    policy: KeyConflictPolicy,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: KeyConflictPolicy) -> Self {
        Self {
            entries: RwLock::default(),
            policy,
        }
    }

    /// The registry shared by the whole process, created empty on first use.
    pub fn global() -> &'static ComponentRegistry {
        GLOBAL.get_or_init(ComponentRegistry::new)
    }

    /// Creates the global registry with `policy`. Returns false when it
    /// already exists, in which case its policy is left alone.
    pub fn init_global(policy: KeyConflictPolicy) -> bool {
        GLOBAL.set(ComponentRegistry::with_policy(policy)).is_ok()
    }

    pub fn policy(&self) -> KeyConflictPolicy {
        self.policy
    }

    /// Folds freshly scanned candidates into the registry.
    ///
    /// A class already registered under any key is skipped as a duplicate
    /// scan. Key collisions with a different class follow the registry's
    /// [`KeyConflictPolicy`].
    pub fn merge(&self, candidates: &CandidateMap) -> MergeReport {
        let mut report = MergeReport::default();
        let mut guard = self.entries.write();
        let mut next = CandidateMap::clone(&guard);

        for (key, candidate) in candidates.iter() {
            if let Some((existing_key, _)) = next.iter().find(|(_, v)| *v == candidate) {
                error!(
                    class = %candidate.name,
                    key = %existing_key,
                    "duplicate scan of component, ignoring"
                );
                report.issues.push(ScanError::DuplicateValue {
                    key: *existing_key,
                    class_name: candidate.name.clone(),
                });
                continue;
            }

            if let Some(existing) = next.get(key) {
                match self.policy {
                    KeyConflictPolicy::Reject => {
                        error!(
                            %key,
                            class = %candidate.name,
                            existing = %existing.name,
                            "component type key already registered, ignoring"
                        );
                        report.issues.push(ScanError::DuplicateKey {
                            key: *key,
                            existing: existing.name.clone(),
                            rejected: candidate.name.clone(),
                        });
                        continue;
                    }
                    KeyConflictPolicy::Overwrite => {
                        warn!(
                            %key,
                            class = %candidate.name,
                            replaced = %existing.name,
                            "component type key reassigned"
                        );
                        report.replaced.push(*key);
                    }
                }
            } else {
                report.inserted.push(*key);
            }

            next.insert(*key, candidate.clone());
        }

        if !report.inserted.is_empty() || !report.replaced.is_empty() {
            *guard = Arc::new(next);
            info!(
                inserted = report.inserted.len(),
                replaced = report.replaced.len(),
                total = guard.len(),
                "component registry updated"
            );
        }
        report
    }

    /// The full current mapping. Cheap; later merges do not affect it.
    pub fn snapshot(&self) -> Arc<CandidateMap> {
        Arc::clone(&self.entries.read())
    }

    pub fn get(&self, key: TypeKey) -> Option<CandidateType> {
        self.entries.read().get(&key).cloned()
    }

    pub fn key_of(&self, class_name: &str) -> Option<TypeKey> {
        self.entries
            .read()
            .iter()
            .find(|(_, v)| v.name == class_name)
            .map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn state(&self) -> RegistryState {
        if self.is_empty() {
            RegistryState::Empty
        } else {
            RegistryState::Populated
        }
    }
}
