//! Proof checker for CRAT certificates.
//!
//! A CRAT proof interleaves clause-level RUP steps with extension-variable operations that
//! build a decomposable, deterministic counting schema over the input formula. [`Checker`]
//! replays a proof against an input [`CnfFormula`](crat_formula::CnfFormula) and, if every step
//! checks out, reports the model count of the schema's root.
use std::io::{self, BufRead};

use log::{debug, info};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crat_dimacs::DimacsParser;
use crat_formula::{clean_clause, CnfFormula, Var};
use crat_proof::{text::ProofReader, Hints, Id, ProofStep};

pub mod clauses;
pub mod operations;
pub mod rup;

use clauses::ClauseManager;
use operations::{Op, OperationManager};

/// Errors encountered while checking a CRAT proof.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("error reading proof: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Parse(#[from] crat_proof::text::ProofError),
    #[error("error reading input formula: {0}")]
    Dimacs(#[from] anyhow::Error),
    #[error("{0}")]
    CheckFailed(String),
    #[error("proof incomplete: no directives found")]
    Incomplete,
}

impl CheckerError {
    pub(crate) fn check_failed(msg: impl Into<String>) -> CheckerError {
        CheckerError::CheckFailed(msg.into())
    }

    fn at_line(self, line: usize) -> CheckerError {
        match self {
            CheckerError::CheckFailed(msg) => {
                CheckerError::CheckFailed(format!("Line {}: {}", line, msg))
            }
            other => other,
        }
    }
}

/// Per-directive-kind counters, kept for the final summary report.
#[derive(Default, Debug, Clone)]
pub struct RuleCounters {
    pub input: u64,
    pub add_rup: u64,
    pub delete_rup: u64,
    pub product: u64,
    pub sum: u64,
    pub delete_operation: u64,
}

/// Outcome of successfully replaying a proof to its end.
#[derive(Debug, Clone)]
pub struct CheckSummary {
    pub rule_counters: RuleCounters,
    pub total_clause_count: u64,
    pub max_live_clause_count: u64,
    /// Number of `a`/`dc`/`s` steps that fell back to unhinted unit propagation.
    pub unhinted_steps: u64,
    /// The schema's root literal, in DIMACS encoding.
    pub root: isize,
}

impl CheckSummary {
    /// Whether every step in the proof carried an explicit hint list.
    pub fn fully_hinted(&self) -> bool {
        self.unhinted_steps == 0
    }
}

/// Replays a CRAT proof against an input formula.
pub struct Checker {
    clauses: ClauseManager,
    operations: OperationManager,
    rule_counters: RuleCounters,
    unhinted_steps: u64,
    root: Option<isize>,
}

impl Checker {
    /// Reads a DIMACS CNF file and registers its clauses as CRAT input clauses `1..=n`,
    /// rejecting clauses that are tautological once cleaned into canonical form.
    pub fn from_dimacs(input: impl io::Read) -> Result<Checker, CheckerError> {
        let formula = DimacsParser::parse(input)?;
        Checker::from_formula(&formula)
    }

    pub fn from_formula(formula: &CnfFormula) -> Result<Checker, CheckerError> {
        Checker::from_formula_verbose(formula, false)
    }

    /// Like [`from_formula`](Checker::from_formula), but in verbose mode the clause manager
    /// additionally tracks, for each literal, the exact set of clauses it occurs in (rather than
    /// just a count), for richer diagnostics.
    pub fn from_formula_verbose(formula: &CnfFormula, verbose: bool) -> Result<Checker, CheckerError> {
        let mut clauses = if verbose {
            ClauseManager::with_verbose(formula.len() as u64)
        } else {
            ClauseManager::new(formula.len() as u64)
        };

        let mut id = 0u64;
        for clause in formula.iter() {
            id += 1;
            let cleaned = clean_clause(clause).ok_or_else(|| {
                CheckerError::check_failed(format!(
                    "cannot add input clause #{}: tautological",
                    id
                ))
            })?;
            clauses.add_clause(cleaned, id)?;
        }

        let operations = OperationManager::new(formula.var_count() as u64);

        Ok(Checker {
            clauses,
            operations,
            rule_counters: RuleCounters::default(),
            unhinted_steps: 0,
            root: None,
        })
    }

    /// Replays every directive in `proof`, returning a summary on success.
    pub fn check_proof(&mut self, proof: impl BufRead) -> Result<CheckSummary, CheckerError> {
        let mut reader = ProofReader::new(proof);
        let mut any_step = false;

        while let Some((line, step)) = reader.next_step()? {
            any_step = true;
            debug!("line {}: {:?}", line, step);
            self.check_step(step).map_err(|e| e.at_line(line))?;
        }

        if !any_step {
            return Err(CheckerError::Incomplete);
        }

        let root = self.clauses.check_final()?;
        self.root = Some(root.to_dimacs());

        info!(
            "proof checked: {} total clauses, {} max live clauses",
            self.clauses.total_clause_count(),
            self.clauses.max_live_clause_count()
        );

        Ok(CheckSummary {
            rule_counters: self.rule_counters.clone(),
            total_clause_count: self.clauses.total_clause_count(),
            max_live_clause_count: self.clauses.max_live_clause_count(),
            unhinted_steps: self.unhinted_steps,
            root: self.root.expect("root set above"),
        })
    }

    fn check_step(&mut self, step: ProofStep) -> Result<(), CheckerError> {
        match step {
            ProofStep::Input { id, clause } => {
                let stored = self.clauses.find_clause(id)?;
                if stored != clause.as_slice() {
                    return Err(CheckerError::check_failed(format!(
                        "clause given for 'i' does not match input clause #{}",
                        id
                    )));
                }
                self.rule_counters.input += 1;
            }
            ProofStep::AddRup { id, clause, hints } => {
                let unhinted = rup::check_rup(&self.clauses, &clause, &hints)?;
                self.clauses.add_clause(clause, id)?;
                self.count_hints(unhinted);
                self.rule_counters.add_rup += 1;
            }
            ProofStep::DeleteRup { id, hints } => {
                let clause = self.clauses.delete_clause(id)?;
                let unhinted = rup::check_rup(&self.clauses, &clause, &hints)?;
                self.count_hints(unhinted);
                self.rule_counters.delete_rup += 1;
            }
            ProofStep::Product {
                id,
                out_var,
                left,
                right,
            } => {
                self.operations.add_operation(
                    &mut self.clauses,
                    Op::Conjunction,
                    out_var,
                    left,
                    right,
                    id,
                )?;
                self.rule_counters.product += 1;
            }
            ProofStep::Sum {
                id,
                out_var,
                left,
                right,
                hints,
            } => {
                self.operations.add_operation(
                    &mut self.clauses,
                    Op::Disjunction,
                    out_var,
                    left,
                    right,
                    id,
                )?;
                let unhinted = self
                    .operations
                    .check_disjunction(&self.clauses, left, right, &hints)?;
                self.count_hints(unhinted);
                self.rule_counters.sum += 1;
            }
            ProofStep::DeleteOperation { out_var } => {
                self.operations.delete_operation(&mut self.clauses, out_var)?;
                self.rule_counters.delete_operation += 1;
            }
        }
        Ok(())
    }

    fn count_hints(&mut self, unhinted: bool) {
        if unhinted {
            self.unhinted_steps += 1;
        }
    }

    /// Computes the model count of the schema rooted at the literal found by
    /// [`check_proof`](Checker::check_proof). Must be called only after a successful check.
    pub fn count(&self, weights: &FxHashMap<Var, f64>) -> f64 {
        let root = self
            .root
            .expect("count() called before a successful check_proof()");
        self.operations
            .count(crat_formula::Lit::from_dimacs(root), weights)
    }
}

/// Parses a `-w W1:W2:...:Wn` weight specification: a colon-separated list of integers in
/// `0..=100`, positional by variable id (the first entry is variable 1's weight, and so on),
/// each scaled by `1/100`. Ported from the prototype's `run()`, which builds the same dict via
/// `int(wlist[v-1])/100.0`.
pub fn parse_weights(spec: &str) -> Result<FxHashMap<Var, f64>, String> {
    let mut weights = FxHashMap::default();
    for (index, token) in spec.split(':').enumerate() {
        let percent: u32 = token
            .parse()
            .map_err(|_| format!("couldn't extract weights from '{}'", spec))?;
        if percent > 100 {
            return Err(format!("couldn't extract weights from '{}'", spec));
        }
        let var = Var::from_dimacs((index + 1) as isize);
        weights.insert(var, f64::from(percent) / 100.0);
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnf(clauses: Vec<Vec<isize>>) -> CnfFormula {
        CnfFormula::from(
            clauses
                .into_iter()
                .map(|c| c.into_iter().map(crat_formula::Lit::from_dimacs).collect::<Vec<_>>()),
        )
    }

    #[test]
    fn checks_simple_and_gadget_proof() {
        // formula: (1) /\ (2), checked via an extension variable 3 <-> (1 /\ 2) and root 3.
        let formula = cnf(vec![vec![1], vec![2]]);
        let mut checker = Checker::from_formula(&formula).unwrap();

        let proof = "\
1 i 1 0
2 i 2 0
3 p 3 1 2
6 a 3 0 1 2 3 0
dc 1 6 4 0
dc 2 6 5 0
do 3
";
        let summary = checker.check_proof(proof.as_bytes()).unwrap();
        assert_eq!(summary.root, 3);
        assert!(summary.fully_hinted());
    }

    #[test]
    fn rejects_mismatched_input_directive() {
        let formula = cnf(vec![vec![1, 2]]);
        let mut checker = Checker::from_formula(&formula).unwrap();
        let proof = "1 i 1 2 3 0\n";
        assert!(checker.check_proof(proof.as_bytes()).is_err());
    }

    #[test]
    fn weight_spec_parses_positional_percentages() {
        let weights = parse_weights("50:25").unwrap();
        assert_eq!(weights[&Var::from_dimacs(1)], 0.5);
        assert_eq!(weights[&Var::from_dimacs(2)], 0.25);
    }

    #[test]
    fn weight_spec_rejects_out_of_range_and_non_integers() {
        assert!(parse_weights("150").is_err());
        assert!(parse_weights("abc").is_err());
    }
}
