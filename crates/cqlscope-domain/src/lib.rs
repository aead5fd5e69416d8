//! # cqlscope Domain Model
//!
//! Pure value types shared by every layer: CQL literals, the clause model a
//! scope accumulates, and the renderer that turns clauses into CQL text plus
//! positional bind values. Nothing here touches the network.
//!
//! ```rust
//! use cqlscope_domain::{render, Clause, ClauseSet, Consistency, Operation, Predicate};
//!
//! let mut clauses = ClauseSet::new();
//! clauses.apply(Clause::Where(Predicate::eq("title", "Hey")));
//! clauses.apply(Clause::Consistency(Consistency::Quorum));
//!
//! let statement = render(&Operation::Select, "posts", &clauses);
//! assert_eq!(
//!     statement.cql,
//!     "SELECT * FROM posts USING CONSISTENCY QUORUM WHERE title = 'Hey'"
//! );
//! ```

#![forbid(unsafe_code)]

pub mod clause;
pub mod error;
pub mod statement;
pub mod value;

pub use clause::{Clause, ClauseSet, Consistency, Operator, Predicate, UsingOptions};
pub use error::DomainError;
pub use statement::{render, render_batch, Operation, Statement};
pub use value::CqlValue;
