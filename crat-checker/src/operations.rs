//! Extension operations: the AND/OR nodes of the counting schema, as seen by the checker.
//!
//! Ported from the prototype's `OperationManager`. Each output variable is defined in terms of
//! two existing literals and carries a dependency set (the input variables it transitively
//! depends on) used to check decomposability of conjunctions.
use rustc_hash::FxHashMap;

use crat_formula::{Lit, Var};
use crat_proof::Hints;

use crate::{clauses::ClauseManager, rup::check_rup, CheckerError};

/// Which Boolean connective an extension variable was defined with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Conjunction,
    Disjunction,
}

struct Operation {
    op: Op,
    left: Lit,
    right: Lit,
    /// Id of the first of the three defining clauses; the other two follow immediately.
    id: u64,
}

/// Tracks extension operations and the dependency sets needed to check decomposability.
pub struct OperationManager {
    input_variable_count: u64,
    operations: FxHashMap<Var, Operation>,
    dependency_sets: FxHashMap<Var, Vec<Var>>,
}

impl OperationManager {
    pub fn new(input_variable_count: u64) -> OperationManager {
        let mut dependency_sets = FxHashMap::default();
        for i in 1..=input_variable_count {
            let var = Var::from_dimacs(i as isize);
            dependency_sets.insert(var, vec![var]);
        }
        OperationManager {
            input_variable_count,
            operations: FxHashMap::default(),
            dependency_sets,
        }
    }

    fn dependency_set(&self, var: Var) -> Result<&[Var], CheckerError> {
        self.dependency_sets
            .get(&var)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                CheckerError::check_failed(format!("variable {} undefined", var.to_dimacs()))
            })
    }

    /// Defines `out_var` as `op(left, right)`, emitting its three defining clauses starting at
    /// `id`. For a conjunction the dependency sets of `left` and `right` must be disjoint.
    pub fn add_operation(
        &mut self,
        clauses: &mut ClauseManager,
        op: Op,
        out_var: Var,
        left: Lit,
        right: Lit,
        id: u64,
    ) -> Result<(), CheckerError> {
        if self.dependency_sets.contains_key(&out_var) {
            return Err(CheckerError::check_failed(format!(
                "operator output variable {} already in use",
                out_var.to_dimacs()
            )));
        }

        let left_deps = self.dependency_set(left.var())?.to_vec();
        let right_deps = self.dependency_set(right.var())?.to_vec();

        if op == Op::Conjunction {
            for v in &left_deps {
                if right_deps.contains(v) {
                    return Err(CheckerError::check_failed(format!(
                        "dependency sets of conjunction operands {} and {} are not disjoint",
                        left.to_dimacs(),
                        right.to_dimacs()
                    )));
                }
            }
        }

        let mut deps = left_deps;
        for v in right_deps {
            if !deps.contains(&v) {
                deps.push(v);
            }
        }
        self.dependency_sets.insert(out_var, deps);

        match op {
            Op::Conjunction => {
                clauses.add_clause(vec![out_var.positive(), !left, !right], id)?;
                clauses.add_clause(vec![!out_var.positive(), left], id + 1)?;
                clauses.add_clause(vec![!out_var.positive(), right], id + 2)?;
            }
            Op::Disjunction => {
                clauses.add_clause(vec![!out_var.positive(), left, right], id)?;
                clauses.add_clause(vec![out_var.positive(), !left], id + 1)?;
                clauses.add_clause(vec![out_var.positive(), !right], id + 2)?;
            }
        }

        self.operations.insert(
            out_var,
            Operation {
                op,
                left,
                right,
                id,
            },
        );

        Ok(())
    }

    /// Checks that the disjuncts of an `s` directive are logically disjoint, i.e. that
    /// `-left \/ -right` is RUP-derivable. Returns whether the unhinted fallback path was used.
    pub fn check_disjunction(
        &self,
        clauses: &ClauseManager,
        left: Lit,
        right: Lit,
        hints: &Hints,
    ) -> Result<bool, CheckerError> {
        check_rup(clauses, &[!left, !right], hints)
    }

    /// Deletes an operation's three defining clauses and forgets its dependency set.
    pub fn delete_operation(
        &mut self,
        clauses: &mut ClauseManager,
        out_var: Var,
    ) -> Result<(), CheckerError> {
        let operation = self.operations.remove(&out_var).ok_or_else(|| {
            CheckerError::check_failed(format!("operator {} undefined", out_var.to_dimacs()))
        })?;

        clauses.delete_clause(operation.id)?;
        clauses.delete_clause(operation.id + 1)?;
        clauses.delete_clause(operation.id + 2)?;

        self.dependency_sets.remove(&out_var);

        Ok(())
    }

    /// Computes the (possibly weighted) model count of the schema rooted at `root`.
    ///
    /// `weights` gives the weight of the positive literal of each input variable; missing
    /// entries default to `0.5` and contribute a factor of `2` to the unweighted scaling
    /// constant `beta`, so that an entirely unweighted count returns the exact model count.
    pub fn count(&self, root: Lit, weights: &FxHashMap<Var, f64>) -> f64 {
        let mut values: FxHashMap<Var, f64> = FxHashMap::default();
        let mut beta = 1.0f64;

        for i in 1..=self.input_variable_count {
            let var = Var::from_dimacs(i as isize);
            let weight = match weights.get(&var) {
                Some(&w) => w,
                None => {
                    beta *= 2.0;
                    0.5
                }
            };
            values.insert(var, weight);
        }

        let mut out_vars: Vec<&Var> = self.operations.keys().collect();
        out_vars.sort();

        for &out_var in out_vars {
            let operation = &self.operations[out_var];
            let left_val = lit_value(&values, operation.left);
            let right_val = lit_value(&values, operation.right);
            let result = match operation.op {
                Op::Conjunction => left_val * right_val,
                Op::Disjunction => left_val + right_val,
            };
            values.insert(*out_var, result);
        }

        let root_val = lit_value(&values, root);
        root_val * beta
    }
}

fn lit_value(values: &FxHashMap<Var, f64>, lit: Lit) -> f64 {
    let value = values[&lit.var()];
    if lit.is_negative() {
        1.0 - value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: isize) -> Lit {
        Lit::from_dimacs(n)
    }
    fn v(n: isize) -> Var {
        Var::from_dimacs(n)
    }

    #[test]
    fn conjunction_requires_disjoint_dependencies() {
        let mut ops = OperationManager::new(2);
        let mut clauses = ClauseManager::new(0);

        ops.add_operation(&mut clauses, Op::Conjunction, v(3), l(1), l(2), 1)
            .unwrap();

        // variable 3 now depends on {1, 2}; conjoining it with 1 again must fail.
        let err = ops.add_operation(&mut clauses, Op::Conjunction, v(4), l(3), l(1), 4);
        assert!(err.is_err());
    }

    #[test]
    fn disjunction_dependency_union_allows_overlap() {
        let mut ops = OperationManager::new(2);
        let mut clauses = ClauseManager::new(0);

        ops.add_operation(&mut clauses, Op::Disjunction, v(3), l(1), l(2), 1)
            .unwrap();
        ops.add_operation(&mut clauses, Op::Disjunction, v(4), l(3), l(1), 4)
            .unwrap();
    }

    #[test]
    fn unweighted_count_of_conjunction_matches_fraction_of_models() {
        let mut ops = OperationManager::new(2);
        let mut clauses = ClauseManager::new(0);
        ops.add_operation(&mut clauses, Op::Conjunction, v(3), l(1), l(2), 1)
            .unwrap();

        // 1 model out of 4 assignments satisfies var3 <-> (1 /\ 2); beta = 4.
        let count = ops.count(l(3), &FxHashMap::default());
        assert!((count - 1.0).abs() < 1e-9);
    }

    #[test]
    fn delete_operation_removes_defining_clauses() {
        let mut ops = OperationManager::new(2);
        let mut clauses = ClauseManager::new(0);
        ops.add_operation(&mut clauses, Op::Conjunction, v(3), l(1), l(2), 1)
            .unwrap();
        ops.delete_operation(&mut clauses, v(3)).unwrap();
        assert!(clauses.find_clause(1).is_err());
        assert!(clauses.find_clause(2).is_err());
        assert!(clauses.find_clause(3).is_err());
    }
}
