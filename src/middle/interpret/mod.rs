//! Compile-time evaluator
//!
//! A small interpreter for const-context bodies: enough to compute promoted
//! values and `const`/`static` initializers, and to classify why an
//! evaluation failed.

pub mod error;
pub mod eval;
pub mod memory;
pub mod operator;
pub mod render;
pub mod value;

pub use error::{
    FailureKind, InterpError, InterpResult, ResourceExhaustionInfo, UndefinedBehaviorInfo,
    UnsupportedOp,
};
pub use eval::{value_needs_drop, EvaluatedConst, InterpConfig, Interpreter};
pub use memory::{Allocation, GlobalAlloc, Memory, MemoryKind};
pub use render::render_value;
pub use value::{AllocId, Pointer, Scalar, Value};
