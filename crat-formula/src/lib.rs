//! Basic formula data types shared by the CRAT checker and schema generator.

/// Shortcut for tests.
#[cfg(test)]
#[doc(hidden)]
#[macro_export]
macro_rules! lit {
    ($x:expr) => {
        $crate::lit::Lit::from_dimacs($x)
    };
}

/// Shortcut for tests.
#[cfg(test)]
#[doc(hidden)]
#[macro_export]
macro_rules! var {
    ($x:expr) => {
        $crate::lit::Var::from_dimacs($x)
    };
}

pub mod clause;
pub mod cnf;
pub mod lit;

pub use clause::clean_clause;
pub use cnf::CnfFormula;
pub use lit::{Lit, Var};
