//! CRAT proof directive format.
//!
//! A CRAT proof is a text file, one directive per line. Lines starting with `c` are comments.
//! Most directives are prefixed with an integer id; `dc` and `do` are not, since they refer to an
//! id introduced by an earlier directive instead of minting a new one.
use crat_formula::{Lit, Var};

pub mod text;

/// Id used to refer to a clause or an extension operation.
///
/// Clause ids and operation ids share a single namespace, since an operation's output variable
/// also names the defining clauses produced for it.
pub type Id = u64;

/// The hint list attached to an `a`, `dc` or `s` directive.
///
/// A CRAT proof can either list the ids of the clauses a RUP check should propagate through, in
/// the order they become unit, or replace the whole list with a single `*`, asking the checker to
/// find a propagation sequence itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hints {
    /// Explicit, ordered list of clause ids to propagate through.
    Clauses(Vec<Id>),
    /// `*`: let the checker search for a RUP derivation on its own.
    Unhinted,
}

impl Hints {
    pub fn is_unhinted(&self) -> bool {
        matches!(self, Hints::Unhinted)
    }
}

/// A single CRAT proof directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofStep {
    /// `Id i l1 l2 ... 0`: assert that clause `Id` of the input formula equals the given clause.
    Input { id: Id, clause: Vec<Lit> },
    /// `Id a l1 l2 ... 0 hints 0`: add a new clause justified by a RUP check.
    AddRup {
        id: Id,
        clause: Vec<Lit>,
        hints: Hints,
    },
    /// `dc Id hints 0`: delete clause `Id`, whose absence from the formula is RUP-justified by
    /// the asserted clause (the deleted clause re-derived from what remains).
    DeleteRup { id: Id, hints: Hints },
    /// `Id p outVar l1 l2`: define `outVar` as the conjunction of `l1` and `l2`.
    Product {
        id: Id,
        out_var: Var,
        left: Lit,
        right: Lit,
    },
    /// `Id s outVar l1 l2 hints 0`: define `outVar` as the disjunction of `l1` and `l2`, with the
    /// disjointness of the two disjuncts RUP-justified by the given hints.
    Sum {
        id: Id,
        out_var: Var,
        left: Lit,
        right: Lit,
        hints: Hints,
    },
    /// `do outVar`: delete the extension operation and its defining clauses for `outVar`.
    DeleteOperation { out_var: Var },
}

impl ProofStep {
    /// The directive keyword used in the textual encoding, e.g. `"a"` for [`ProofStep::AddRup`].
    pub fn command(&self) -> &'static str {
        match self {
            ProofStep::Input { .. } => "i",
            ProofStep::AddRup { .. } => "a",
            ProofStep::DeleteRup { .. } => "dc",
            ProofStep::Product { .. } => "p",
            ProofStep::Sum { .. } => "s",
            ProofStep::DeleteOperation { .. } => "do",
        }
    }
}
