//! Const safety
//!
//! Two independent verdicts: whether a computed value is a valid
//! compile-time value of its type (`value`), and whether a piece of const
//! code sticks to operations whose result cannot differ between compile
//! time and runtime (`code`).

pub mod code;
pub mod value;

pub use code::{unconst_op_in_call, unconst_op_in_rvalue, UnconstChecker, UnconstOp, UnconstViolation};
pub use value::{PathElem, ValidityError, ValidityErrorKind, ValueValidator};
