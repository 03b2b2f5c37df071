//! Counting schema DAG and the bottom-up CRAT proof generator.
//!
//! A [`Schema`] is a hash-consed DAG of AND/OR nodes built on top of a fixed set of input
//! variables, grounded on the prototype's `schema.py`. Building the DAG (`mk_and`/`mk_or`/
//! `mk_ite`) emits each node's three defining clauses as it is created; [`validate::validate`]
//! then walks the finished DAG bottom-up, using a [`Reasoner`](reasoner::Reasoner) to justify
//! every literal the walk depends on, and emits the resulting CRAT directive stream through a
//! [`Writer`](writer::Writer).
use thiserror::Error;

pub mod node;
pub mod oracle;
pub mod reasoner;
pub mod text;
pub mod validate;
pub mod writer;

pub use node::{NType, Schema};
pub use reasoner::{DualReasoner, LocalReasoner, Reasoner};
pub use writer::Writer;

/// Fatal failures while building or validating a schema.
///
/// These correspond to the prototype's `SchemaException`: conditions that can only arise if the
/// schema itself is unsound (e.g. the justification oracle finds a model where the schema claims
/// there is none), as opposed to ordinary CRAT checker failures, which are reported per-directive.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("proof failure: oracle found a model for context {context:?} while justifying literal {lit}, but the schema claims none exists")]
    JustificationFailed { lit: isize, context: Vec<isize> },
    #[error("proof failure: added clauses {clauses:?} but literal {lit} still isn't forced under context {context:?}")]
    StillNotUnit {
        lit: isize,
        context: Vec<isize>,
        clauses: Vec<Vec<isize>>,
    },
    #[error("schema error: {0}")]
    Other(String),
}
