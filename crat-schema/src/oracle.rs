//! A small internal backtracking search, used as [`crate::reasoner::LocalReasoner`]'s fallback
//! when plain unit propagation can't justify a literal on its own.
//!
//! This is deliberately not a production CDCL solver: no watched literals, no restarts, no
//! clause-database management beyond keeping what it learns. It exists only to produce a short
//! chain of RUP-derivable lemma clauses for the rare case where a single literal isn't directly
//! propagation-derivable from the schema's current clause set, so the chain, once handed back to
//! the reasoner and added to its clause set, makes it so.
use rustc_hash::{FxHashMap, FxHashSet};

use crat_formula::{Lit, Var};

struct TrailEntry {
    lit: Lit,
    antecedent: Option<usize>,
}

enum Status {
    Satisfied,
    Conflict,
    Unit(Lit),
    Unresolved,
}

struct Search {
    clauses: Vec<Vec<Lit>>,
    assigned: FxHashMap<Var, bool>,
    trail: Vec<TrailEntry>,
    decisions: Vec<usize>,
    learned: Vec<Vec<Lit>>,
}

impl Search {
    fn new(base_clauses: &[Vec<Lit>]) -> Search {
        Search {
            clauses: base_clauses.to_vec(),
            assigned: FxHashMap::default(),
            trail: Vec::new(),
            decisions: Vec::new(),
            learned: Vec::new(),
        }
    }

    fn value(&self, lit: Lit) -> Option<bool> {
        self.assigned.get(&lit.var()).map(|&pos| pos == lit.is_positive())
    }

    fn assign(&mut self, lit: Lit, antecedent: Option<usize>) {
        self.assigned.insert(lit.var(), lit.is_positive());
        self.trail.push(TrailEntry { lit, antecedent });
    }

    fn clause_status(&self, clause: &[Lit]) -> Status {
        let mut unassigned = None;
        let mut unassigned_count = 0;
        for &lit in clause {
            match self.value(lit) {
                Some(true) => return Status::Satisfied,
                Some(false) => {}
                None => {
                    unassigned_count += 1;
                    unassigned = Some(lit);
                }
            }
        }
        match unassigned_count {
            0 => Status::Conflict,
            1 => Status::Unit(unassigned.expect("counted above")),
            _ => Status::Unresolved,
        }
    }

    /// Runs unit propagation to a fixpoint, returning the index of a falsified clause on
    /// conflict.
    fn propagate(&mut self) -> Option<usize> {
        loop {
            let mut progressed = false;
            for ci in 0..self.clauses.len() {
                match self.clause_status(&self.clauses[ci]) {
                    Status::Conflict => return Some(ci),
                    Status::Unit(lit) => {
                        self.assign(lit, Some(ci));
                        progressed = true;
                    }
                    _ => {}
                }
            }
            if !progressed {
                return None;
            }
        }
    }

    /// Resolves the conflicting clause with the antecedents of every propagated (non-decision,
    /// non-assumption) literal on the trail, in reverse trail order, until only decision or
    /// assumption literals remain. The result is, by construction, RUP from the clause database
    /// as it stood before this conflict.
    fn analyze(&self, conflict_ci: usize) -> Vec<Lit> {
        let mut working: FxHashSet<Lit> = self.clauses[conflict_ci].iter().copied().collect();
        for entry in self.trail.iter().rev() {
            if let Some(aci) = entry.antecedent {
                if working.contains(&!entry.lit) {
                    working.remove(&!entry.lit);
                    for &l2 in &self.clauses[aci] {
                        if l2 != entry.lit {
                            working.insert(l2);
                        }
                    }
                }
            }
        }
        working.into_iter().collect()
    }

    fn backtrack_last_decision(&mut self) {
        let mark = self.decisions.pop().expect("conflict at decision level 0");
        while self.trail.len() > mark {
            let entry = self.trail.pop().expect("mark is within trail bounds");
            self.assigned.remove(&entry.lit.var());
        }
    }

    fn pick_unassigned_var(&self) -> Option<Var> {
        for clause in &self.clauses {
            for &lit in clause {
                if self.value(lit).is_none() {
                    return Some(lit.var());
                }
            }
        }
        None
    }

    fn model(&self) -> Vec<Lit> {
        let mut vars: Vec<Var> = self.assigned.keys().copied().collect();
        vars.sort();
        vars.into_iter().map(|v| v.lit(self.assigned[&v])).collect()
    }

    fn run(&mut self, assumptions: &[Lit]) -> Result<Vec<Vec<Lit>>, Vec<Lit>> {
        for &lit in assumptions {
            if self.value(lit) == Some(false) {
                // Assumptions are already contradictory; nothing needs to be learned.
                return Ok(Vec::new());
            }
            if self.value(lit).is_none() {
                self.assign(lit, None);
            }
        }

        loop {
            if let Some(conflict_ci) = self.propagate() {
                if self.decisions.is_empty() {
                    return Ok(self.learned.clone());
                }
                let learned = self.analyze(conflict_ci);
                self.backtrack_last_decision();
                self.clauses.push(learned.clone());
                self.learned.push(learned);
                continue;
            }

            match self.pick_unassigned_var() {
                Some(var) => {
                    self.decisions.push(self.trail.len());
                    self.assign(var.positive(), None);
                }
                None => return Err(self.model()),
            }
        }
    }
}

/// Proves that `base_clauses /\ assumptions` is unsatisfiable, returning a sequence of clauses
/// that, added to `base_clauses` in order, each follow from what precedes it by unit propagation
/// alone and collectively derive the final conflict. Returns the satisfying assignment found
/// instead, as `Err`, if `assumptions` turns out to be satisfiable (a fatal, schema-is-wrong
/// condition the caller must treat as a proof failure, never as an ordinary negative result).
pub fn prove_unsat(base_clauses: &[Vec<Lit>], assumptions: &[Lit]) -> Result<Vec<Vec<Lit>>, Vec<Lit>> {
    Search::new(base_clauses).run(assumptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: isize) -> Lit {
        Lit::from_dimacs(n)
    }

    #[test]
    fn proves_unsat_via_plain_propagation() {
        let clauses = vec![vec![l(1)], vec![l(-1)]];
        assert_eq!(prove_unsat(&clauses, &[]).unwrap(), Vec::<Vec<Lit>>::new());
    }

    #[test]
    fn proves_unsat_requiring_a_decision() {
        // (1 \/ 2) /\ (1 \/ -2) /\ (-1 \/ 2) /\ (-1 \/ -2) is unsatisfiable.
        let clauses = vec![
            vec![l(1), l(2)],
            vec![l(1), l(-2)],
            vec![l(-1), l(2)],
            vec![l(-1), l(-2)],
        ];
        let learned = prove_unsat(&clauses, &[]).unwrap();
        assert!(!learned.is_empty());
    }

    #[test]
    fn reports_model_when_satisfiable() {
        let clauses = vec![vec![l(1), l(2)]];
        assert!(prove_unsat(&clauses, &[]).is_err());
    }

    #[test]
    fn contradictory_assumptions_need_no_learning() {
        let clauses: Vec<Vec<Lit>> = vec![];
        assert_eq!(prove_unsat(&clauses, &[l(1), l(-1)]).unwrap(), Vec::<Vec<Lit>>::new());
    }
}
