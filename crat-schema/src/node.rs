//! The counting schema DAG.
//!
//! Building a schema ([`Schema::mk_and`], [`Schema::mk_or`], [`Schema::mk_ite`]) both allocates
//! extension variables and writes their defining clauses out immediately, through a
//! [`Writer`](crate::writer::Writer) passed in by the caller. [`crate::validate::validate`] later
//! walks the finished DAG to prove the root is forced by the input clauses and to delete them.
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Write;

use crat_formula::{Lit, Var};
use crat_proof::{Hints, Id};

use crate::writer::Writer;
use crate::SchemaError;

/// Which Boolean connective an extension variable was defined with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NType {
    And,
    Or,
}

/// A reference to a node in the schema, in a specific polarity.
///
/// Constants and negation are collapsed out of the node representation: `True`/`False` never get
/// allocated as nodes, and negating a [`Lit`]-backed reference is just a sign flip, so the unique
/// table only ever needs to dedup genuine AND/OR combinations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum XLit {
    True,
    False,
    Lit(Lit),
}

impl XLit {
    pub fn neg(self) -> XLit {
        match self {
            XLit::True => XLit::False,
            XLit::False => XLit::True,
            XLit::Lit(l) => XLit::Lit(!l),
        }
    }

    pub fn as_lit(self) -> Option<Lit> {
        match self {
            XLit::Lit(l) => Some(l),
            _ => None,
        }
    }

    fn is_constant(self) -> bool {
        matches!(self, XLit::True | XLit::False)
    }
}

impl From<Lit> for XLit {
    fn from(l: Lit) -> XLit {
        XLit::Lit(l)
    }
}

impl From<Var> for XLit {
    fn from(v: Var) -> XLit {
        XLit::Lit(v.positive())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct NodeRecord {
    pub ntype: NType,
    pub left: XLit,
    pub right: XLit,
    /// Id of the first of this node's three defining clauses.
    pub clause_id: Id,
    /// For an OR node built by [`Schema::mk_ite`], the if-then-else's condition literal: the
    /// validator proves the OR's two arms under `context + [c]` and `context + [!c]`
    /// respectively. `None` marks an OR node the validator cannot walk (a free OR, not backed by
    /// an if-then-else, is a modeling error this schema doesn't support).
    pub ite_var: Option<Lit>,
}

/// The schema DAG: a hash-consed set of AND/OR nodes over a fixed set of input variables.
pub struct Schema {
    pub(crate) nodes: FxHashMap<Var, NodeRecord>,
    unique: FxHashMap<(NType, XLit, XLit), Var>,
    dependency_sets: FxHashMap<Var, FxHashSet<Var>>,
    next_var: u32,
    input_var_count: usize,
}

impl Schema {
    pub fn new(input_var_count: usize) -> Schema {
        let mut dependency_sets = FxHashMap::default();
        for i in 1..=input_var_count {
            let var = Var::from_dimacs(i as isize);
            let mut set = FxHashSet::default();
            set.insert(var);
            dependency_sets.insert(var, set);
        }
        Schema {
            nodes: FxHashMap::default(),
            unique: FxHashMap::default(),
            dependency_sets,
            next_var: input_var_count as u32 + 1,
            input_var_count,
        }
    }

    pub fn input_var_count(&self) -> usize {
        self.input_var_count
    }

    pub(crate) fn node(&self, var: Var) -> Option<&NodeRecord> {
        self.nodes.get(&var)
    }

    pub fn input_lit(&self, dimacs: isize) -> XLit {
        XLit::Lit(Lit::from_dimacs(dimacs))
    }

    fn dependency_set(&self, lit: Lit) -> FxHashSet<Var> {
        self.dependency_sets
            .get(&lit.var())
            .cloned()
            .unwrap_or_default()
    }

    fn fresh_var(&mut self) -> Var {
        let var = Var::from_dimacs(self.next_var as isize);
        self.next_var += 1;
        var
    }

    /// Looks up or creates an AND node for `(left, right)`. Only constant operands are
    /// simplified away; equal or complementary non-constant operands still allocate a genuine
    /// node, matching the prototype's `addConjunction` (and keeping the AND nodes built by
    /// [`mk_ite`](Schema::mk_ite) always real, so its OR hint contract always applies).
    pub fn mk_and(
        &mut self,
        writer: &mut Writer<impl Write>,
        left: XLit,
        right: XLit,
    ) -> Result<XLit, SchemaError> {
        if left == XLit::False || right == XLit::False {
            return Ok(XLit::False);
        }
        if left == XLit::True {
            return Ok(right);
        }
        if right == XLit::True {
            return Ok(left);
        }

        if let Some(&var) = self.unique.get(&(NType::And, left, right)) {
            return Ok(XLit::Lit(var.positive()));
        }

        let (la, lb) = (
            left.as_lit().expect("constants handled above"),
            right.as_lit().expect("constants handled above"),
        );
        let left_deps = self.dependency_set(la);
        let right_deps = self.dependency_set(lb);
        if !left_deps.is_disjoint(&right_deps) {
            return Err(SchemaError::Other(format!(
                "conjunction operands {} and {} do not have disjoint dependency sets",
                la.to_dimacs(),
                lb.to_dimacs()
            )));
        }

        let var = self.fresh_var();
        let clause_id = writer.do_and(var, la, lb).map_err(io_err)?;

        let mut deps = left_deps;
        deps.extend(right_deps);
        self.dependency_sets.insert(var, deps);
        self.nodes.insert(
            var,
            NodeRecord {
                ntype: NType::And,
                left,
                right,
                clause_id,
                ite_var: None,
            },
        );
        self.unique.insert((NType::And, left, right), var);
        Ok(XLit::Lit(var.positive()))
    }

    /// Looks up or creates an OR node for `(left, right)`, RUP-justified by `hints`. Like
    /// [`mk_and`](Schema::mk_and), only constants are simplified away.
    pub(crate) fn mk_or(
        &mut self,
        writer: &mut Writer<impl Write>,
        left: XLit,
        right: XLit,
        hints: Hints,
        ite_var: Option<Lit>,
    ) -> Result<XLit, SchemaError> {
        if left == XLit::True || right == XLit::True {
            return Ok(XLit::True);
        }
        if left == XLit::False {
            return Ok(right);
        }
        if right == XLit::False {
            return Ok(left);
        }

        if let Some(&var) = self.unique.get(&(NType::Or, left, right)) {
            return Ok(XLit::Lit(var.positive()));
        }

        let (la, lb) = (
            left.as_lit().expect("constants handled above"),
            right.as_lit().expect("constants handled above"),
        );
        let mut deps = self.dependency_set(la);
        deps.extend(self.dependency_set(lb));

        let var = self.fresh_var();
        let clause_id = writer.do_or(var, la, lb, hints).map_err(io_err)?;

        self.dependency_sets.insert(var, deps);
        self.nodes.insert(
            var,
            NodeRecord {
                ntype: NType::Or,
                left,
                right,
                clause_id,
                ite_var,
            },
        );
        self.unique.insert((NType::Or, left, right), var);
        Ok(XLit::Lit(var.positive()))
    }

    /// `ite(c, t, e) = (c /\ t) \/ (not c /\ e)`, the schema's only supported route to an OR
    /// node. `nt`/`nf`'s own `{¬o,l}` defining clauses, at `clause_id + 1`, directly RUP-justify
    /// the resulting OR's disjointness, so no search is needed for that check either.
    pub fn mk_ite(
        &mut self,
        writer: &mut Writer<impl Write>,
        c: XLit,
        t: XLit,
        e: XLit,
    ) -> Result<XLit, SchemaError> {
        if c == XLit::True {
            return Ok(t);
        }
        if c == XLit::False {
            return Ok(e);
        }
        if t == e {
            return Ok(t);
        }
        if t == XLit::True && e == XLit::False {
            return Ok(c);
        }
        if t == XLit::False && e == XLit::True {
            return Ok(c.neg());
        }

        let nt = self.mk_and(writer, c, t)?;
        let nf = self.mk_and(writer, c.neg(), e)?;

        if nt.is_constant() || nf.is_constant() {
            // c/t/e were non-constant, so mk_and always allocates here in the intended usage;
            // this is only reachable if a caller already built and is reusing an equal/negated
            // pair of AND operands across separate ite() calls in a way the unique table
            // happened not to catch. Fall back to an unhinted disjointness check rather than
            // the exact hint pair, relying on full propagation at check time.
            return self.mk_or(writer, nt, nf, Hints::Unhinted, Some(c.as_lit().expect("non-constant c")));
        }

        let nt_var = nt.as_lit().expect("checked non-constant").var();
        let nf_var = nf.as_lit().expect("checked non-constant").var();
        let nt_clause = self.nodes[&nt_var].clause_id;
        let nf_clause = self.nodes[&nf_var].clause_id;
        let hints = Hints::Clauses(vec![nt_clause + 1, nf_clause + 1]);
        let c_lit = c.as_lit().expect("checked non-constant above");
        self.mk_or(writer, nt, nf, hints, Some(c_lit))
    }

    /// Vars of every AND/OR node reachable from `root`.
    pub fn reachable(&self, root: XLit) -> FxHashSet<Var> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(x) = stack.pop() {
            if let XLit::Lit(lit) = x {
                if let Some(rec) = self.nodes.get(&lit.var()) {
                    if seen.insert(lit.var()) {
                        stack.push(rec.left);
                        stack.push(rec.right);
                    }
                }
            }
        }
        seen
    }

    /// Discards node records not reachable from `root`, freeing memory used by dead-end
    /// subexpressions explored but never incorporated into the final schema. Does not retract
    /// clauses already written for them: once emitted, a CRAT proof directive is permanent.
    pub fn compress(&mut self, root: XLit) {
        let live = self.reachable(root);
        self.nodes.retain(|var, _| live.contains(var));
        self.unique.retain(|_, var| live.contains(var));
    }
}

fn io_err(e: std::io::Error) -> SchemaError {
    SchemaError::Other(format!("i/o error writing proof: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: isize) -> XLit {
        XLit::Lit(Lit::from_dimacs(n))
    }

    fn writer() -> Writer<Vec<u8>> {
        Writer::new(Vec::new(), 0)
    }

    #[test]
    fn and_of_disjoint_literals_allocates_fresh_var() {
        let mut schema = Schema::new(2);
        let mut w = writer();
        let x = schema.mk_and(&mut w, l(1), l(2)).unwrap();
        assert!(matches!(x, XLit::Lit(_)));
    }

    #[test]
    fn and_rejects_overlapping_dependencies() {
        let mut schema = Schema::new(2);
        let mut w = writer();
        let a = schema.mk_and(&mut w, l(1), l(2)).unwrap();
        assert!(schema.mk_and(&mut w, a, l(1)).is_err());
    }

    #[test]
    fn and_dedups_via_unique_table_in_given_order() {
        let mut schema = Schema::new(2);
        let mut w = writer();
        let a = schema.mk_and(&mut w, l(1), l(2)).unwrap();
        let b = schema.mk_and(&mut w, l(1), l(2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn and_simplifies_only_constants() {
        let mut schema = Schema::new(1);
        let mut w = writer();
        assert_eq!(schema.mk_and(&mut w, l(1), XLit::True).unwrap(), l(1));
        assert_eq!(schema.mk_and(&mut w, l(1), XLit::False).unwrap(), XLit::False);
    }

    #[test]
    fn ite_builds_two_and_nodes_and_one_or_node_with_condition_recorded() {
        let mut schema = Schema::new(3);
        let mut w = writer();
        let root = schema.mk_ite(&mut w, l(1), l(2), l(3)).unwrap();
        let var = root.as_lit().unwrap().var();
        let rec = schema.node(var).unwrap();
        assert_eq!(rec.ntype, NType::Or);
        assert_eq!(rec.ite_var, Some(Lit::from_dimacs(1)));
    }

    #[test]
    fn ite_simplifies_constant_condition() {
        let mut schema = Schema::new(2);
        let mut w = writer();
        assert_eq!(schema.mk_ite(&mut w, XLit::True, l(1), l(2)).unwrap(), l(1));
        assert_eq!(schema.mk_ite(&mut w, XLit::False, l(1), l(2)).unwrap(), l(2));
    }

    #[test]
    fn compress_drops_unreachable_nodes() {
        let mut schema = Schema::new(4);
        let mut w = writer();
        let dead = schema.mk_and(&mut w, l(1), l(2)).unwrap();
        let root = schema.mk_and(&mut w, l(3), l(4)).unwrap();
        schema.compress(root);
        assert!(schema.node(dead.as_lit().unwrap().var()).is_none());
        assert!(schema.node(root.as_lit().unwrap().var()).is_some());
    }
}
