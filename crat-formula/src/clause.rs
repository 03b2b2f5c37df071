//! Canonical clause form used throughout the CRAT checker and generator.
use std::cmp::Reverse;

use crate::lit::Lit;

/// Put a clause into canonical CRAT form.
///
/// Canonical form sorts literals in descending order of `|l|`, removes duplicates, and rejects
/// clauses containing both `l` and `-l`. Returns `None` for such tautological clauses, which are
/// never stored (ported from the prototype's `cleanClause`).
pub fn clean_clause(lits: &[Lit]) -> Option<Vec<Lit>> {
    let mut sorted: Vec<Lit> = lits.to_vec();
    sorted.sort_by_key(|lit| Reverse(lit.var()));

    let mut result: Vec<Lit> = Vec::with_capacity(sorted.len());
    for lit in sorted {
        match result.last() {
            Some(&last) if last == lit => continue,
            Some(&last) if last == !lit => return None,
            _ => result.push(lit),
        }
    }
    Some(result)
}

/// Whether a clause slice is already in canonical form.
///
/// Equivalent to `clean_clause(lits) == Some(lits.to_vec())`, but without allocating when the
/// slice is not canonical.
pub fn is_canonical(lits: &[Lit]) -> bool {
    for window in lits.windows(2) {
        if window[0].var() <= window[1].var() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(n: isize) -> Lit {
        Lit::from_dimacs(n)
    }

    #[test]
    fn sorts_descending_by_magnitude() {
        let cleaned = clean_clause(&[l(1), l(-3), l(2)]).unwrap();
        assert_eq!(cleaned, vec![l(-3), l(2), l(1)]);
    }

    #[test]
    fn removes_duplicates() {
        let cleaned = clean_clause(&[l(2), l(1), l(2)]).unwrap();
        assert_eq!(cleaned, vec![l(2), l(1)]);
    }

    #[test]
    fn rejects_tautologies() {
        assert_eq!(clean_clause(&[l(1), l(-1)]), None);
        assert_eq!(clean_clause(&[l(3), l(1), l(-3)]), None);
    }

    #[test]
    fn idempotent() {
        let once = clean_clause(&[l(1), l(-3), l(2), l(2)]).unwrap();
        let twice = clean_clause(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_clause_is_canonical_and_regular() {
        assert_eq!(clean_clause(&[]), Some(vec![]));
    }
}
