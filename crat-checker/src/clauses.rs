//! Clause storage for the checker: clauses are identified by the ids minted by the CRAT proof,
//! retrievable until deleted, never reused.
use rustc_hash::{FxHashMap, FxHashSet};

use crat_formula::Lit;

use crate::CheckerError;

/// A tracked clause, or `None` if it has been deleted but its id is still known.
type Slot = Option<Vec<Lit>>;

/// Keeps every clause the checker has seen, indexed by its CRAT id.
///
/// Mirrors the prototype's `ClauseManager`: ids must be introduced in strictly ascending order,
/// input clauses must all eventually be deleted, and exactly one live unit clause (the schema's
/// root literal) must remain when the proof ends. For each literal, a running count of live
/// clauses containing it is kept consistent with every `add_clause`/`delete_clause` (the
/// prototype's `literalCountDict`); in verbose mode the actual owning ids are also tracked
/// (`literalSetDict`), for diagnostics that name which clauses a literal occurs in.
#[derive(Default)]
pub struct ClauseManager {
    input_clause_count: u64,
    clauses: FxHashMap<u64, Slot>,
    max_clause_id: u64,
    live_clause_count: u64,
    max_live_clause_count: u64,
    total_clause_count: u64,
    literal_counts: FxHashMap<Lit, u64>,
    literal_sets: Option<FxHashMap<Lit, FxHashSet<u64>>>,
    /// Whether the empty clause has ever been added. One-way flag, never cleared.
    added_empty: bool,
}

impl ClauseManager {
    pub fn new(input_clause_count: u64) -> ClauseManager {
        ClauseManager {
            input_clause_count,
            ..ClauseManager::default()
        }
    }

    /// Like [`new`](ClauseManager::new), but also tracks, per literal, the exact set of live
    /// clause ids containing it (not just a count), for verbose diagnostics.
    pub fn with_verbose(input_clause_count: u64) -> ClauseManager {
        ClauseManager {
            input_clause_count,
            literal_sets: Some(FxHashMap::default()),
            ..ClauseManager::default()
        }
    }

    /// Number of live clauses containing `lit`.
    pub fn literal_count(&self, lit: Lit) -> u64 {
        self.literal_counts.get(&lit).copied().unwrap_or(0)
    }

    /// Ids of the live clauses containing `lit`. Only populated in verbose mode.
    pub fn literal_set(&self, lit: Lit) -> Option<&FxHashSet<u64>> {
        self.literal_sets.as_ref().and_then(|sets| sets.get(&lit))
    }

    /// Whether the empty clause has ever been added.
    pub fn added_empty(&self) -> bool {
        self.added_empty
    }

    pub fn live_clause_count(&self) -> u64 {
        self.live_clause_count
    }

    pub fn max_live_clause_count(&self) -> u64 {
        self.max_live_clause_count
    }

    pub fn total_clause_count(&self) -> u64 {
        self.total_clause_count
    }

    /// Looks up a clause by id. Fails if the id was never assigned or has since been deleted.
    pub fn find_clause(&self, id: u64) -> Result<&[Lit], CheckerError> {
        match self.clauses.get(&id) {
            None => Err(CheckerError::check_failed(format!(
                "clause #{} never defined",
                id
            ))),
            Some(None) => Err(CheckerError::check_failed(format!(
                "clause #{} has been deleted",
                id
            ))),
            Some(Some(lits)) => Ok(lits),
        }
    }

    /// Registers a clause under a new id. `clause` must already be in canonical CRAT form.
    pub fn add_clause(&mut self, clause: Vec<Lit>, id: u64) -> Result<(), CheckerError> {
        if id <= self.max_clause_id {
            return Err(CheckerError::check_failed(format!(
                "clause id {} is not in ascending order",
                id
            )));
        }
        self.max_clause_id = id;
        if clause.is_empty() {
            self.added_empty = true;
        }
        for &lit in &clause {
            *self.literal_counts.entry(lit).or_insert(0) += 1;
            if let Some(sets) = &mut self.literal_sets {
                sets.entry(lit).or_insert_with(FxHashSet::default).insert(id);
            }
        }
        self.clauses.insert(id, Some(clause));
        self.live_clause_count += 1;
        self.total_clause_count += 1;
        self.max_live_clause_count = self.max_live_clause_count.max(self.live_clause_count);
        Ok(())
    }

    /// Removes a clause, keeping its id reserved so it cannot be reintroduced.
    pub fn delete_clause(&mut self, id: u64) -> Result<Vec<Lit>, CheckerError> {
        let clause = match self.clauses.get_mut(&id) {
            None => {
                return Err(CheckerError::check_failed(format!(
                    "cannot delete clause #{}: never defined",
                    id
                )))
            }
            Some(slot @ Some(_)) => slot.take().unwrap(),
            Some(None) => {
                return Err(CheckerError::check_failed(format!(
                    "cannot delete clause #{}: already deleted",
                    id
                )))
            }
        };
        self.live_clause_count -= 1;
        for &lit in &clause {
            if let Some(count) = self.literal_counts.get_mut(&lit) {
                *count -= 1;
            }
            if let Some(sets) = &mut self.literal_sets {
                if let Some(set) = sets.get_mut(&lit) {
                    set.remove(&id);
                }
            }
        }
        Ok(clause)
    }

    /// Iterates over the literals of every clause that hasn't been deleted.
    pub fn live_clauses(&self) -> impl Iterator<Item = &[Lit]> {
        self.clauses.values().filter_map(|slot| slot.as_deref())
    }

    /// Checks that every input clause has been deleted and that exactly one unit clause, the
    /// schema's root literal, remains live. Returns that literal.
    pub fn check_final(&self) -> Result<Lit, CheckerError> {
        let mut never_defined = Vec::new();
        let mut not_deleted = Vec::new();

        for id in 1..=self.input_clause_count {
            match self.clauses.get(&id) {
                None => never_defined.push(id),
                Some(Some(_)) => not_deleted.push(id),
                Some(None) => {}
            }
        }

        if !never_defined.is_empty() {
            return Err(CheckerError::check_failed(format!(
                "input clauses {:?} never defined",
                never_defined
            )));
        }
        if !not_deleted.is_empty() {
            return Err(CheckerError::check_failed(format!(
                "input clauses {:?} not deleted",
                not_deleted
            )));
        }

        let mut ids: Vec<&u64> = self.clauses.keys().collect();
        ids.sort();

        let mut root = None;
        for &id in ids {
            if let Some(lits) = &self.clauses[&id] {
                if lits.len() == 1 {
                    if let Some(previous) = root {
                        return Err(CheckerError::check_failed(format!(
                            "at least two possible root nodes: {:?}, {:?}",
                            previous, lits[0]
                        )));
                    }
                    root = Some(lits[0]);
                }
            }
        }

        root.ok_or_else(|| CheckerError::check_failed("no root node found".to_owned()))
    }
}
