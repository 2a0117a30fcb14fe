//! # Feature registry: shared table, dependency order, error history.
//!
//! The registry is passive bookkeeping: it owns the feature cells, answers
//! lookups, computes the dependency-aware activation order, validates the
//! graph, and keeps a bounded history of failures. All lifecycle driving
//! happens in the [`Manager`](crate::Manager).
//!
//! ## Architecture
//! ```text
//! Manager ──► Registry
//!               ├─► cells: RwLock<HashMap<name, Arc<FeatureCell>>>
//!               ├─► history: Mutex<VecDeque<ErrorRecord>> (cap 100, FIFO)
//!               ├─► sorted()    → post-order DFS activation order
//!               ├─► validate()  → GraphReport (missing deps, cycles)
//!               └─► error_stats() / healthy() / problematic()
//! ```
//!
//! ## Rules
//! - Registering a duplicate name is a warn-level no-op.
//! - Unregistering purges that feature's history entries.
//! - `sorted()` tolerates bad graphs (cycles abandon the branch, unknown
//!   names are skipped); `validate()` is where problems become errors.
//! - Locks are short-scope and never held across an await.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::ErrorRecord;
use crate::features::{FeatureCell, FeatureState};

/// Maximum number of error records kept; older entries are evicted first.
pub const ERROR_HISTORY_CAP: usize = 100;

/// How far back [`ErrorStats::recent`] looks.
const RECENT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Result of dependency-graph validation.
#[derive(Debug, Clone, Default)]
pub struct GraphReport {
    /// True when no problems were found.
    pub valid: bool,
    /// One entry per missing dependency reference, one per detected cycle.
    pub errors: Vec<String>,
}

/// Aggregate view over the error history.
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    /// Records currently held.
    pub total: usize,
    /// Records per feature name.
    pub by_feature: HashMap<String, usize>,
    /// Records from the last five minutes, recomputed at call time.
    pub recent: usize,
}

/// Shared table of feature cells plus bounded error history.
pub struct Registry {
    cells: RwLock<HashMap<String, Arc<FeatureCell>>>,
    history: Mutex<VecDeque<ErrorRecord>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Adds a cell under its feature name.
    ///
    /// Returns `false` (and keeps the existing cell) when the name is taken.
    pub fn register(&self, cell: Arc<FeatureCell>) -> bool {
        let mut cells = self.write_cells();
        if cells.contains_key(cell.name()) {
            warn!(feature = cell.name(), "already registered, ignoring");
            return false;
        }
        debug!(feature = cell.name(), "registered");
        cells.insert(cell.name().to_string(), cell);
        true
    }

    /// Removes a cell and purges its error history.
    pub fn unregister(&self, name: &str) -> Option<Arc<FeatureCell>> {
        let removed = self.write_cells().remove(name);
        if removed.is_some() {
            self.locked_history().retain(|r| r.feature != name);
            debug!(feature = name, "unregistered");
        }
        removed
    }

    /// Looks up a cell by name.
    pub fn get(&self, name: &str) -> Option<Arc<FeatureCell>> {
        self.read_cells().get(name).map(Arc::clone)
    }

    /// All cells, sorted by name.
    pub fn all(&self) -> Vec<Arc<FeatureCell>> {
        let cells = self.read_cells();
        let mut all: Vec<Arc<FeatureCell>> = cells.values().map(Arc::clone).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Sorted list of registered names.
    pub fn names(&self) -> Vec<String> {
        let cells = self.read_cells();
        let mut names: Vec<String> = cells.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Cells currently in the given state, sorted by name.
    pub fn by_state(&self, state: FeatureState) -> Vec<Arc<FeatureCell>> {
        let mut hits: Vec<Arc<FeatureCell>> = self
            .read_cells()
            .values()
            .filter(|c| c.state() == state)
            .map(Arc::clone)
            .collect();
        hits.sort_by(|a, b| a.name().cmp(b.name()));
        hits
    }

    /// Number of registered cells.
    pub fn len(&self) -> usize {
        self.read_cells().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read_cells().is_empty()
    }

    /// Cells whose state is healthy (everything except error/disabled/fallback).
    pub fn healthy(&self) -> Vec<Arc<FeatureCell>> {
        let mut hits: Vec<Arc<FeatureCell>> = self
            .read_cells()
            .values()
            .filter(|c| c.state().is_healthy())
            .map(Arc::clone)
            .collect();
        hits.sort_by(|a, b| a.name().cmp(b.name()));
        hits
    }

    /// Cells in error, disabled or fallback state.
    pub fn problematic(&self) -> Vec<Arc<FeatureCell>> {
        let mut hits: Vec<Arc<FeatureCell>> = self
            .read_cells()
            .values()
            .filter(|c| !c.state().is_healthy())
            .map(Arc::clone)
            .collect();
        hits.sort_by(|a, b| a.name().cmp(b.name()));
        hits
    }

    /// Activation order: every unit after all of its reachable dependencies.
    ///
    /// Post-order DFS seeded in (priority desc, name asc) order, so
    /// independent units fall out by descending priority with names breaking
    /// ties. A dependency cycle abandons that branch with a warning and the
    /// partial order is still returned; unknown dependency names are skipped
    /// here ([`validate`](Self::validate) reports them).
    pub fn sorted(&self) -> Vec<Arc<FeatureCell>> {
        let cells = self.read_cells();

        let mut seeds: Vec<Arc<FeatureCell>> = cells.values().map(Arc::clone).collect();
        seeds.sort_by(|a, b| {
            b.config()
                .priority
                .cmp(&a.config().priority)
                .then_with(|| a.name().cmp(b.name()))
        });

        let mut visited: HashSet<String> = HashSet::new();
        let mut visiting: HashSet<String> = HashSet::new();
        let mut order: Vec<Arc<FeatureCell>> = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            Self::visit(seed.name(), &cells, &mut visited, &mut visiting, &mut order);
        }
        order
    }

    fn visit(
        name: &str,
        cells: &HashMap<String, Arc<FeatureCell>>,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        order: &mut Vec<Arc<FeatureCell>>,
    ) {
        if visited.contains(name) {
            return;
        }
        if visiting.contains(name) {
            warn!(feature = name, "dependency cycle detected, abandoning branch");
            return;
        }
        let Some(cell) = cells.get(name) else {
            debug!(feature = name, "unknown dependency, skipped in ordering");
            return;
        };

        visiting.insert(name.to_string());
        for dep in &cell.config().depends_on {
            Self::visit(dep, cells, visited, visiting, order);
        }
        visiting.remove(name);

        visited.insert(name.to_string());
        order.push(Arc::clone(cell));
    }

    /// Validates the dependency graph without mutating anything.
    ///
    /// Produces exactly one error per missing dependency reference and one
    /// per distinct cycle, carrying the path that closes the loop.
    pub fn validate(&self) -> GraphReport {
        let cells = self.read_cells();
        let mut errors = Vec::new();

        let mut names: Vec<&String> = cells.keys().collect();
        names.sort_unstable();

        for name in &names {
            for dep in &cells[*name].config().depends_on {
                if !cells.contains_key(dep) {
                    errors.push(format!(
                        "feature '{name}' depends on unknown feature '{dep}'"
                    ));
                }
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = Vec::new();
        for name in &names {
            Self::find_cycles(name, &cells, &mut visited, &mut stack, &mut errors);
        }

        GraphReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn find_cycles(
        name: &str,
        cells: &HashMap<String, Arc<FeatureCell>>,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
        errors: &mut Vec<String>,
    ) {
        if visited.contains(name) {
            return;
        }
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut path: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
            path.push(name);
            errors.push(format!("dependency cycle: {}", path.join(" -> ")));
            return;
        }
        let Some(cell) = cells.get(name) else {
            return;
        };

        stack.push(name.to_string());
        for dep in &cell.config().depends_on {
            Self::find_cycles(dep, cells, visited, stack, errors);
        }
        stack.pop();
        visited.insert(name.to_string());
    }

    /// Appends a record, evicting the oldest when the cap is reached.
    pub fn record_error(&self, record: ErrorRecord) {
        let mut history = self.locked_history();
        if history.len() == ERROR_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Full history copy, oldest first.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.locked_history().iter().cloned().collect()
    }

    /// Drops the entire history.
    pub fn clear_errors(&self) {
        self.locked_history().clear();
    }

    /// Aggregates the history into totals, per-feature counts and a
    /// recent-window count.
    pub fn error_stats(&self) -> ErrorStats {
        let history = self.locked_history();
        let now = SystemTime::now();

        let mut by_feature: HashMap<String, usize> = HashMap::new();
        let mut recent = 0;
        for record in history.iter() {
            *by_feature.entry(record.feature.clone()).or_default() += 1;
            // Clock skew puts a record in the future; count it as recent.
            let fresh = now
                .duration_since(record.at)
                .map(|age| age <= RECENT_WINDOW)
                .unwrap_or(true);
            if fresh {
                recent += 1;
            }
        }

        ErrorStats {
            total: history.len(),
            by_feature,
            recent,
        }
    }

    fn read_cells(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<FeatureCell>>> {
        // Nothing runs hooks under these locks, so poisoning is unreachable.
        self.cells.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cells(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<FeatureCell>>> {
        self.cells.write().unwrap_or_else(|e| e.into_inner())
    }

    fn locked_history(&self) -> MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("features", &self.len())
            .field("errors", &self.locked_history().len())
            .finish()
    }
}
