//! Compile-time evaluation errors
//!
//! Four failure categories. Panics and resource exhaustion can also happen
//! when the same code runs at runtime; unsupported operations and undefined
//! behavior mean the code should never have been evaluated at compile time.

use crate::middle::ir::Local;
use thiserror::Error;

pub type InterpResult<T> = Result<T, InterpError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unsupported,
    UndefinedBehavior,
    Panic,
    ResourceExhaustion,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error("unsupported operation: {0}")]
    Unsupported(#[from] UnsupportedOp),
    #[error("undefined behavior: {0}")]
    UndefinedBehavior(#[from] UndefinedBehaviorInfo),
    #[error("evaluation panicked: {0}")]
    Panic(String),
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(#[from] ResourceExhaustionInfo),
}

impl InterpError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InterpError::Unsupported(_) => FailureKind::Unsupported,
            InterpError::UndefinedBehavior(_) => FailureKind::UndefinedBehavior,
            InterpError::Panic(_) => FailureKind::Panic,
            InterpError::ResourceExhaustion(_) => FailureKind::ResourceExhaustion,
        }
    }

    /// Failures the program could also hit at runtime
    pub fn is_runtime_reachable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Panic | FailureKind::ResourceExhaustion
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedOp {
    #[error("cannot cast a pointer to an integer at compile time")]
    PtrToIntCast,
    #[error("cannot compare pointers at compile time")]
    PtrComparison,
    #[error("cannot offset a pointer at compile time")]
    PtrOffset,
    #[error("cannot call address-sensitive function `{0}` at compile time")]
    AddressSensitiveCall(String),
    #[error("heap allocation")]
    HeapAllocation,
    #[error("access to a thread-local static")]
    ThreadLocalAccess,
    #[error("call to non-const fn `{0}`")]
    NonConstFnCall(String),
    #[error("no body available for `{0}`")]
    MissingBody(String),
    #[error("running the destructor of `{0}`")]
    NonConstDrop(String),
    #[error("reading a union field other than the one last written")]
    UnionTypePunning,
    #[error("field-by-field initialization of an enum")]
    PartialEnumInit,
    #[error("reading a pointer as raw bytes")]
    ReadPointerAsBytes,
    #[error("static `{0}` has no initializer")]
    StaticWithoutInit(String),
    #[error("static `{0}` refers to itself during initialization")]
    StaticCycle(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndefinedBehaviorInfo {
    #[error("entering unreachable code")]
    Unreachable,
    #[error("a function that never returns returned")]
    DivergingCallReturned,
    #[error("dereferencing a dangling pointer")]
    DanglingPointer,
    #[error("dereferencing an integer as a pointer")]
    IntegerAsPointer,
    #[error("accessing dead local {0}")]
    DeadLocal(Local),
    #[error("using uninitialized data")]
    UninitRead,
    #[error("{0:#x} is not a valid bool")]
    InvalidBool(u128),
    #[error("{0:#x} is not a valid char")]
    InvalidChar(u128),
    #[error("{0} is not a valid enum tag")]
    InvalidTag(u128),
    #[error("dividing by zero")]
    DivisionByZero,
    #[error("calculating the remainder with a divisor of zero")]
    RemainderByZero,
    #[error("overflow in signed division")]
    DivisionOverflow,
    #[error("index {index} is out of bounds for length {len}")]
    OutOfBounds { index: u64, len: u64 },
    #[error("writing to read-only memory")]
    WriteToReadOnly,
    #[error("calling a pointer that does not point to a function")]
    InvalidFnPointer,
    #[error("constructing an invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceExhaustionInfo {
    #[error("step limit of {0} reached")]
    StepLimitReached(u64),
    #[error("call stack deeper than {0} frames")]
    StackOverflow(usize),
    #[error("array of {len} elements exceeds the limit of {limit}")]
    AllocationTooLarge { len: u64, limit: u64 },
}
