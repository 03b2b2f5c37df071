//! Reverse unit propagation (RUP) redundancy checks.
//!
//! Ported from the prototype's `ClauseManager.checkRup`, which assumes the negation of the
//! target clause and walks the hinted clauses in order, expecting each to become unit until one
//! is falsified outright.
use crat_formula::Lit;
use crat_proof::Hints;

use crate::{clauses::ClauseManager, CheckerError};

/// Checks that `clause` is implied by the current clause set.
///
/// Returns whether the check took the unhinted fallback path, which the caller uses to track
/// whether the proof was fully or only partially machine-verified.
pub fn check_rup(
    clauses: &ClauseManager,
    clause: &[Lit],
    hints: &Hints,
) -> Result<bool, CheckerError> {
    match hints {
        Hints::Clauses(ids) => {
            check_rup_hinted(clauses, clause, ids)?;
            Ok(false)
        }
        Hints::Unhinted => {
            check_rup_unhinted(clauses, clause)?;
            Ok(true)
        }
    }
}

/// Follows the hint list in order, deriving one new unit per hinted clause, until a hinted
/// clause is falsified outright by the current assignment (the conflict that proves `clause`).
///
/// `true_lits` holds the literals currently assumed true: the negation of `clause`'s literals,
/// plus every unit derived from a hinted clause so far.
fn check_rup_hinted(clauses: &ClauseManager, clause: &[Lit], hints: &[u64]) -> Result<(), CheckerError> {
    let mut true_lits: Vec<Lit> = clause.iter().map(|&lit| !lit).collect();

    for &id in hints {
        let hinted = clauses.find_clause(id)?;

        let mut unassigned = None;
        let mut satisfied = false;

        for &lit in hinted {
            if true_lits.contains(&!lit) {
                // lit is false under the current assignment, no information
                continue;
            }
            if true_lits.contains(&lit) {
                satisfied = true;
                break;
            }
            if unassigned.is_some() {
                return Err(CheckerError::check_failed(format!(
                    "RUP check failed: no unit literal found in hinted clause #{}",
                    id
                )));
            }
            unassigned = Some(lit);
        }

        if satisfied {
            return Err(CheckerError::check_failed(format!(
                "RUP check failed: literal true in hinted clause #{}",
                id
            )));
        }

        match unassigned {
            None => return Ok(()),
            Some(lit) => true_lits.push(lit),
        }
    }

    Err(CheckerError::check_failed(
        "RUP check failed: no conflict found after exhausting hints".to_owned(),
    ))
}

/// Fallback used when a proof step provides `*` instead of an explicit hint list.
///
/// Rather than trusting the `*` marker, this runs full unit propagation over every live clause
/// until either a conflict is found (the check succeeds) or a fixpoint is reached with none (the
/// check fails). This is the redesign adopted over the prototype, which treats an unhinted step
/// as automatically valid and only downgrades its final verdict to "partially verified".
fn check_rup_unhinted(clauses: &ClauseManager, clause: &[Lit]) -> Result<(), CheckerError> {
    let mut true_lits: Vec<Lit> = clause.iter().map(|&lit| !lit).collect();

    loop {
        let mut made_progress = false;

        for lits in clauses.live_clauses() {
            let mut unassigned = None;
            let mut satisfied = false;
            let mut multiple_unassigned = false;

            for &lit in lits {
                if true_lits.contains(&lit) {
                    satisfied = true;
                    break;
                }
                if !true_lits.contains(&!lit) {
                    if unassigned.is_some() {
                        multiple_unassigned = true;
                    }
                    unassigned = Some(lit);
                }
            }

            if satisfied || multiple_unassigned {
                continue;
            }

            match unassigned {
                None => return Ok(()),
                Some(lit) => {
                    true_lits.push(lit);
                    made_progress = true;
                }
            }
        }

        if !made_progress {
            return Err(CheckerError::check_failed(
                "unhinted RUP check failed: unit propagation reached a fixpoint without conflict"
                    .to_owned(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: isize) -> Lit {
        Lit::from_dimacs(n)
    }

    #[test]
    fn hinted_check_finds_conflict() {
        let mut clauses = ClauseManager::new(0);
        clauses.add_clause(vec![l(1), l(2)], 1).unwrap();
        clauses.add_clause(vec![l(-1), l(2)], 2).unwrap();
        clauses.add_clause(vec![l(-2)], 3).unwrap();

        // Derive clause [1]: assume -1, propagate clause 2 to get 2, conflict with clause 3.
        check_rup_hinted(&clauses, &[l(1)], &[2, 3]).unwrap();
    }

    #[test]
    fn hinted_check_rejects_missing_conflict() {
        let mut clauses = ClauseManager::new(0);
        clauses.add_clause(vec![l(1), l(2)], 1).unwrap();
        assert!(check_rup_hinted(&clauses, &[l(3)], &[1]).is_err());
    }

    #[test]
    fn unhinted_fallback_finds_conflict() {
        let mut clauses = ClauseManager::new(0);
        clauses.add_clause(vec![l(1), l(2)], 1).unwrap();
        clauses.add_clause(vec![l(-1), l(2)], 2).unwrap();
        clauses.add_clause(vec![l(-2)], 3).unwrap();

        check_rup_unhinted(&clauses, &[l(1)]).unwrap();
    }

    #[test]
    fn unhinted_fallback_rejects_unsupported_clause() {
        let mut clauses = ClauseManager::new(0);
        clauses.add_clause(vec![l(1), l(2)], 1).unwrap();
        assert!(check_rup_unhinted(&clauses, &[l(3)]).is_err());
    }
}
