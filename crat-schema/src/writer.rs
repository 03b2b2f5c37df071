//! Mints clause ids and serializes CRAT proof directives as the validator emits them.
use std::io::{self, Write};

use crat_formula::{Lit, Var};
use crat_proof::{text::write_step, Hints, Id, ProofStep};

/// Wraps an output stream, assigning each emitted clause a fresh, ascending id.
///
/// Extension variables are allocated by [`crate::node::Schema`] itself, since hash-consing needs
/// stable var identity the moment a node is built; a `Writer` only ever mints clause ids, which
/// are deferred until a node is actually emitted during the bottom-up walk.
pub struct Writer<W> {
    out: W,
    next_clause_id: Id,
    /// At verbosity >= 2, [`comment`](Writer::comment) writes a `c`-prefixed line describing
    /// which node the next clause(s) assert, matching the CLI's `-v -v` / `-vv` level.
    verbosity: u8,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, input_clause_count: u64) -> Writer<W> {
        Writer {
            out,
            next_clause_id: input_clause_count + 1,
            verbosity: 0,
        }
    }

    /// Like [`new`](Writer::new), but at `verbosity >= 2` also emits `c`-prefixed comments
    /// naming the node each clause asserts, per spec.md §6's "Output (generator side)".
    pub fn with_verbosity(out: W, input_clause_count: u64, verbosity: u8) -> Writer<W> {
        Writer {
            out,
            next_clause_id: input_clause_count + 1,
            verbosity,
        }
    }

    fn reserve_triple(&mut self) -> Id {
        let id = self.next_clause_id;
        self.next_clause_id += 3;
        id
    }

    /// The id the next call to [`do_clause`](Writer::do_clause) will mint, so a caller (the
    /// reasoner) can predict ids for a batch of clauses it's about to hand back.
    pub fn next_id(&self) -> Id {
        self.next_clause_id
    }

    fn write(&mut self, step: &ProofStep) -> io::Result<()> {
        write_step(&mut self.out, step)
    }

    /// Writes a `c`-prefixed comment line, only at verbosity >= 2.
    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        if self.verbosity >= 2 {
            writeln!(self.out, "c {}", text)?;
        }
        Ok(())
    }

    /// Emits `outVar <-> (left /\ right)`, returning the id of the first of its three defining
    /// clauses (the other two follow at `id + 1` and `id + 2`).
    pub fn do_and(&mut self, out_var: Var, left: Lit, right: Lit) -> io::Result<Id> {
        self.comment(&format!(
            "node {} = {} /\\ {}",
            out_var.to_dimacs(),
            left.to_dimacs(),
            right.to_dimacs()
        ))?;
        let id = self.reserve_triple();
        self.write(&ProofStep::Product {
            id,
            out_var,
            left,
            right,
        })?;
        Ok(id)
    }

    /// Emits `outVar <-> (left \/ right)`, RUP-justified by `hints`.
    pub fn do_or(&mut self, out_var: Var, left: Lit, right: Lit, hints: Hints) -> io::Result<Id> {
        self.comment(&format!(
            "node {} = {} \\/ {}",
            out_var.to_dimacs(),
            left.to_dimacs(),
            right.to_dimacs()
        ))?;
        let id = self.reserve_triple();
        self.write(&ProofStep::Sum {
            id,
            out_var,
            left,
            right,
            hints,
        })?;
        Ok(id)
    }

    /// Emits an `a` directive for a clause the reasoner has justified, RUP-hinted by `hints`
    /// (real hints when the reasoner could find a chain, `Hints::Unhinted` otherwise, in which
    /// case the checker re-derives it by full unit propagation instead).
    pub fn do_clause(&mut self, clause: Vec<Lit>, hints: Hints) -> io::Result<Id> {
        let id = self.next_clause_id;
        self.next_clause_id += 1;
        self.write(&ProofStep::AddRup { id, clause, hints })?;
        Ok(id)
    }

    pub fn do_delete_clause(&mut self, id: Id, hints: Hints) -> io::Result<()> {
        self.write(&ProofStep::DeleteRup { id, hints })
    }

    pub fn do_delete_operation(&mut self, out_var: Var) -> io::Result<()> {
        self.write(&ProofStep::DeleteOperation { out_var })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_ids_stay_ascending_across_triples_and_singles() {
        let mut writer = Writer::new(Vec::new(), 2);
        let and_id = writer
            .do_and(Var::from_dimacs(3), Lit::from_dimacs(1), Lit::from_dimacs(2))
            .unwrap();
        assert_eq!(and_id, 3);
        let clause_id = writer
            .do_clause(vec![Lit::from_dimacs(1)], Hints::Unhinted)
            .unwrap();
        assert_eq!(clause_id, 6);
        let or_id = writer
            .do_or(Var::from_dimacs(4), Lit::from_dimacs(1), Lit::from_dimacs(2), Hints::Unhinted)
            .unwrap();
        assert_eq!(or_id, 7);
    }
}
