//! Justifies the literal facts the validator's bottom-up walk depends on.
//!
//! The schema's defining clauses alone don't make every fact the validator needs directly unit
//! propagable; [`Reasoner::justify_unit`] is allowed to add further clauses (justified, in turn,
//! by propagation or by the internal [`oracle`](crate::oracle)) to make one so.
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crat_formula::Lit;
use crat_proof::{Hints, Id};

use crate::oracle;
use crate::SchemaError;

fn dimacs_vec(lits: &[Lit]) -> Vec<isize> {
    lits.iter().map(|l| l.to_dimacs()).collect()
}

enum PropResult {
    /// The ordered ids of the clauses that actually contributed a forced literal (or the final
    /// falsified clause), in the order a checker replaying them would need them.
    Conflict(Vec<Id>),
    Closure(FxHashSet<Lit>),
}

/// Unit-propagates `assumed` to a fixpoint over `clauses`, tracking which clause ids contributed
/// along the way. Detects a self-contradictory seed (both a literal and its complement already
/// assumed) immediately, rather than letting every clause mentioning either polarity read as
/// trivially satisfied.
fn propagate_closure(clauses: &[(Id, Vec<Lit>)], assumed: &[Lit]) -> PropResult {
    let mut forced: FxHashSet<Lit> = FxHashSet::default();
    for &lit in assumed {
        if forced.contains(&!lit) {
            return PropResult::Conflict(Vec::new());
        }
        forced.insert(lit);
    }

    let mut hints = Vec::new();
    loop {
        let mut changed = false;
        for (id, clause) in clauses {
            let mut satisfied = false;
            let mut unassigned = None;
            let mut unassigned_count = 0;
            for &lit in clause {
                if forced.contains(&lit) {
                    satisfied = true;
                    break;
                }
                if forced.contains(&!lit) {
                    continue;
                }
                unassigned_count += 1;
                unassigned = Some(lit);
            }
            if satisfied {
                continue;
            }
            if unassigned_count == 0 {
                hints.push(*id);
                return PropResult::Conflict(hints);
            }
            if unassigned_count == 1 {
                if forced.insert(unassigned.expect("counted above")) {
                    hints.push(*id);
                    changed = true;
                }
            }
        }
        if !changed {
            return PropResult::Closure(forced);
        }
    }
}

/// Justifies literal facts about the schema being built, against a clause database that grows as
/// the validator adds justification clauses.
///
/// `start_epoch`/`add_unit`/`revert_epoch` mirror the validator's own recursive structure: before
/// recursing into a child under an additional assumption, the validator pushes an epoch, adds the
/// assumed unit, and reverts the epoch on the way back out, the same discipline it uses for its
/// own `context` stack.
pub trait Reasoner {
    fn add_clauses(&mut self, clauses: &[Vec<Lit>]);
    /// Registers a node's own three defining clauses (at `base_id`, `base_id + 1`, `base_id + 2`)
    /// so later justifications and hint derivations can lean on them. A no-op if `base_id` was
    /// already registered, so a DAG node reached from more than one parent is only recorded once.
    fn note_node_clauses(&mut self, base_id: Id, clauses: [Vec<Lit>; 3]);
    fn start_epoch(&mut self);
    fn revert_epoch(&mut self);
    fn add_unit(&mut self, lit: Lit);
    fn is_unit(&mut self, lit: Lit, context: &[Lit]) -> bool;
    fn rup_check(&mut self, clause: &[Lit], context: &[Lit]) -> bool;
    /// Makes `lit` unit given `context`, returning the clauses added to do so (possibly none, if
    /// it already was) alongside the real hint chain each is RUP-derivable from. `next_id` is the
    /// id the writer will assign the first such clause (the caller mints one id per clause, in
    /// order, starting there).
    fn justify_unit(
        &mut self,
        lit: Lit,
        context: &[Lit],
        next_id: Id,
    ) -> Result<Vec<(Vec<Lit>, Hints)>, SchemaError>;
    /// Computes a real RUP hint chain for a standalone clause the validator is about to write
    /// (e.g. a case-split or combination clause), falling back to `Hints::Unhinted` if the
    /// clauses known so far don't make it directly propagation-derivable.
    fn clause_hints(&self, clause: &[Lit]) -> Hints;
    /// Like [`clause_hints`](Reasoner::clause_hints), but for a clause about to be *deleted*:
    /// excludes `excluded_id` (and anything already marked deleted) from consideration, since the
    /// checker removes the clause before checking its own redundancy.
    fn delete_hints(&self, excluded_id: Id, clause: &[Lit]) -> Hints;
    /// Marks a clause id as retired, so later `delete_hints` calls don't lean on it.
    fn mark_deleted(&mut self, id: Id);
}

/// Hand-rolled unit propagation over an explicit clause set and an epoched assumption trail.
///
/// Shipped as the production default: there is no external production-grade CDCL dependency to
/// lean on here, so the reasoner's own correctness rests on plain, auditable unit propagation,
/// falling back to [`oracle::prove_unsat`] only for the rare literal that propagation alone can't
/// settle.
#[derive(Default)]
pub struct LocalReasoner {
    clauses: Vec<(Id, Vec<Lit>)>,
    registered_nodes: FxHashSet<Id>,
    deleted: FxHashSet<Id>,
    trail: Vec<Lit>,
    epochs: Vec<usize>,
}

impl LocalReasoner {
    pub fn new() -> LocalReasoner {
        LocalReasoner::default()
    }

    /// Merges the epoched trail and the recursion's `context` into one assumption set, without
    /// duplicating a literal both channels happen to carry (the validator's OR-node handling
    /// always threads `svar` through both, in lockstep).
    fn assumed(&self, context: &[Lit]) -> Vec<Lit> {
        let mut assumed = self.trail.clone();
        for &lit in context {
            if !assumed.contains(&lit) {
                assumed.push(lit);
            }
        }
        assumed
    }

    fn live_clauses(&self) -> Vec<(Id, Vec<Lit>)> {
        self.clauses
            .iter()
            .filter(|(id, _)| !self.deleted.contains(id))
            .cloned()
            .collect()
    }

    fn hints_excluding(&self, exclude: Option<Id>, clause: &[Lit]) -> Hints {
        let candidates: Vec<(Id, Vec<Lit>)> = self
            .clauses
            .iter()
            .filter(|(id, _)| !self.deleted.contains(id) && Some(*id) != exclude)
            .cloned()
            .collect();
        let assumed: Vec<Lit> = clause.iter().map(|&l| !l).collect();
        match propagate_closure(&candidates, &assumed) {
            PropResult::Conflict(ids) => Hints::Clauses(ids),
            PropResult::Closure(_) => Hints::Unhinted,
        }
    }
}

impl Reasoner for LocalReasoner {
    fn add_clauses(&mut self, clauses: &[Vec<Lit>]) {
        let mut id = self.clauses.len() as Id + 1;
        for clause in clauses {
            self.clauses.push((id, clause.clone()));
            id += 1;
        }
    }

    fn note_node_clauses(&mut self, base_id: Id, clauses: [Vec<Lit>; 3]) {
        if self.registered_nodes.insert(base_id) {
            for (i, clause) in clauses.into_iter().enumerate() {
                self.clauses.push((base_id + i as Id, clause));
            }
        }
    }

    fn start_epoch(&mut self) {
        self.epochs.push(self.trail.len());
    }

    fn revert_epoch(&mut self) {
        let mark = self.epochs.pop().expect("revert_epoch without start_epoch");
        self.trail.truncate(mark);
    }

    fn add_unit(&mut self, lit: Lit) {
        self.trail.push(lit);
    }

    fn is_unit(&mut self, lit: Lit, context: &[Lit]) -> bool {
        if self.trail.contains(&lit) || context.contains(&lit) {
            return true;
        }
        self.rup_check(&[lit], context)
    }

    fn rup_check(&mut self, clause: &[Lit], context: &[Lit]) -> bool {
        let mut assumed = self.assumed(context);
        assumed.extend(clause.iter().map(|&l| !l));
        matches!(
            propagate_closure(&self.live_clauses(), &assumed),
            PropResult::Conflict(_)
        )
    }

    fn justify_unit(
        &mut self,
        lit: Lit,
        context: &[Lit],
        next_id: Id,
    ) -> Result<Vec<(Vec<Lit>, Hints)>, SchemaError> {
        if self.is_unit(lit, context) {
            return Ok(Vec::new());
        }

        let mut assumed = self.assumed(context);
        assumed.push(!lit);

        let plain: Vec<Vec<Lit>> = self.live_clauses().into_iter().map(|(_, c)| c).collect();
        let learned = oracle::prove_unsat(&plain, &assumed).map_err(|model| {
            SchemaError::JustificationFailed {
                lit: lit.to_dimacs(),
                context: dimacs_vec(&model),
            }
        })?;

        let mut out = Vec::with_capacity(learned.len());
        let mut id = next_id;
        for clause in learned {
            let neg: Vec<Lit> = clause.iter().map(|&l| !l).collect();
            let hints = match propagate_closure(&self.live_clauses(), &neg) {
                PropResult::Conflict(ids) => Hints::Clauses(ids),
                PropResult::Closure(_) => Hints::Unhinted,
            };
            self.clauses.push((id, clause.clone()));
            out.push((clause, hints));
            id += 1;
        }

        if !self.is_unit(lit, context) {
            return Err(SchemaError::StillNotUnit {
                lit: lit.to_dimacs(),
                context: dimacs_vec(context),
                clauses: out.iter().map(|(c, _)| dimacs_vec(c)).collect(),
            });
        }

        Ok(out)
    }

    fn clause_hints(&self, clause: &[Lit]) -> Hints {
        self.hints_excluding(None, clause)
    }

    fn delete_hints(&self, excluded_id: Id, clause: &[Lit]) -> Hints {
        self.hints_excluding(Some(excluded_id), clause)
    }

    fn mark_deleted(&mut self, id: Id) {
        self.deleted.insert(id);
    }
}

/// Cross-checks [`LocalReasoner`] against a second, independent oracle-only search for every
/// call, logging a warning on disagreement. Kept for debugging; not the production default,
/// since running two independent searches for every justification roughly doubles the cost.
pub struct DualReasoner {
    local: LocalReasoner,
}

impl DualReasoner {
    pub fn new() -> DualReasoner {
        DualReasoner {
            local: LocalReasoner::new(),
        }
    }

    fn cross_check(&self, clause: &[Lit], context: &[Lit], local_answer: bool) {
        let mut assumed = self.local.assumed(context);
        assumed.extend(clause.iter().map(|&l| !l));
        let plain: Vec<Vec<Lit>> = self.local.live_clauses().into_iter().map(|(_, c)| c).collect();
        let oracle_answer = match oracle::prove_unsat(&plain, &assumed) {
            Ok(_) => true,
            Err(_) => false,
        };
        if oracle_answer != local_answer {
            warn!(
                "reasoner disagreement on clause {:?} under context {:?}: local={}, oracle={}",
                dimacs_vec(clause),
                dimacs_vec(context),
                local_answer,
                oracle_answer
            );
        }
    }
}

impl Default for DualReasoner {
    fn default() -> DualReasoner {
        DualReasoner::new()
    }
}

impl Reasoner for DualReasoner {
    fn add_clauses(&mut self, clauses: &[Vec<Lit>]) {
        self.local.add_clauses(clauses);
    }

    fn note_node_clauses(&mut self, base_id: Id, clauses: [Vec<Lit>; 3]) {
        self.local.note_node_clauses(base_id, clauses);
    }

    fn start_epoch(&mut self) {
        self.local.start_epoch();
    }

    fn revert_epoch(&mut self) {
        self.local.revert_epoch();
    }

    fn add_unit(&mut self, lit: Lit) {
        self.local.add_unit(lit);
    }

    fn is_unit(&mut self, lit: Lit, context: &[Lit]) -> bool {
        let answer = self.local.is_unit(lit, context);
        self.cross_check(&[lit], context, answer);
        answer
    }

    fn rup_check(&mut self, clause: &[Lit], context: &[Lit]) -> bool {
        let answer = self.local.rup_check(clause, context);
        self.cross_check(clause, context, answer);
        answer
    }

    fn justify_unit(
        &mut self,
        lit: Lit,
        context: &[Lit],
        next_id: Id,
    ) -> Result<Vec<(Vec<Lit>, Hints)>, SchemaError> {
        self.local.justify_unit(lit, context, next_id)
    }

    fn clause_hints(&self, clause: &[Lit]) -> Hints {
        self.local.clause_hints(clause)
    }

    fn delete_hints(&self, excluded_id: Id, clause: &[Lit]) -> Hints {
        self.local.delete_hints(excluded_id, clause)
    }

    fn mark_deleted(&mut self, id: Id) {
        self.local.mark_deleted(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: isize) -> Lit {
        Lit::from_dimacs(n)
    }

    #[test]
    fn is_unit_true_when_propagation_alone_forces_it() {
        let mut r = LocalReasoner::new();
        r.add_clauses(&[vec![l(-1), l(2)]]);
        assert!(r.is_unit(l(2), &[l(1)]));
        assert!(!r.is_unit(l(2), &[]));
    }

    #[test]
    fn is_unit_true_by_membership_even_under_a_contradictory_seed() {
        // The central ITE case the maintainer flagged: checking whether `lit` is unit when `lit`
        // is already in `context` used to seed `forced` with both `lit` and `!lit` and silently
        // satisfy every clause mentioning either, instead of detecting the contradiction.
        let mut r = LocalReasoner::new();
        assert!(r.is_unit(l(1), &[l(1)]));
        assert!(r.is_unit(l(-1), &[l(-1)]));
    }

    #[test]
    fn justify_unit_returns_empty_when_already_forced() {
        let mut r = LocalReasoner::new();
        r.add_clauses(&[vec![l(1)]]);
        assert_eq!(r.justify_unit(l(1), &[], 100).unwrap(), Vec::new());
    }

    #[test]
    fn justify_unit_short_circuits_when_lit_is_already_in_context() {
        let mut r = LocalReasoner::new();
        assert_eq!(r.justify_unit(l(1), &[l(1)], 100).unwrap(), Vec::new());
    }

    #[test]
    fn justify_unit_falls_back_to_oracle_and_makes_lit_unit() {
        // (1\/2)/\(1\/-2)/\(-1\/2)/\(-1\/-2) is unsatisfiable on its own (needs a decision to see
        // it), which makes every literal vacuously unit, including one — var 5 — that doesn't
        // appear in any of these clauses at all; that can only be discovered via the oracle.
        let mut r = LocalReasoner::new();
        r.add_clauses(&[
            vec![l(1), l(2)],
            vec![l(1), l(-2)],
            vec![l(-1), l(2)],
            vec![l(-1), l(-2)],
        ]);
        let added = r.justify_unit(l(5), &[], 100).unwrap();
        assert!(!added.is_empty());
        assert!(r.is_unit(l(5), &[]));
    }

    #[test]
    fn clause_hints_finds_a_real_chain_when_propagation_alone_derives_it() {
        let mut r = LocalReasoner::new();
        r.add_clauses(&[vec![l(1), l(2)], vec![l(-1), l(2)], vec![l(-2)]]);
        // Clause [1] is RUP: assume -1, clause 2 ([-1,2]) forces 2, clause 3 ([-2]) conflicts.
        let hints = r.clause_hints(&[l(1)]);
        assert!(matches!(hints, Hints::Clauses(_)));
    }

    #[test]
    fn epoch_trail_is_scoped_to_start_and_revert() {
        let mut r = LocalReasoner::new();
        r.add_clauses(&[vec![l(-1), l(2)]]);
        r.start_epoch();
        r.add_unit(l(1));
        assert!(r.is_unit(l(2), &[]));
        r.revert_epoch();
        assert!(!r.is_unit(l(2), &[]));
    }

    #[test]
    fn delete_hints_excludes_the_clause_being_deleted() {
        let mut r = LocalReasoner::new();
        // Clause 1 ([1,2,3]) is subsumed by clause 2 ([1,2]), so it's still RUP after deletion.
        r.add_clauses(&[vec![l(1), l(2), l(3)], vec![l(1), l(2)]]);
        let hints = r.delete_hints(1, &[l(1), l(2), l(3)]);
        match hints {
            Hints::Clauses(ids) => {
                assert!(!ids.contains(&1));
                assert!(ids.contains(&2));
            }
            Hints::Unhinted => panic!("expected a real hint chain excluding the deleted clause"),
        }
    }
}
