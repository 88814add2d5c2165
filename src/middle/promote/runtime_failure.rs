//! Promoted constants that fail the way the runtime code would
//!
//! A promoted value whose evaluation panics (or runs out of steps) must not
//! turn a program that panics at runtime into one that fails to compile.
//! The use site is instead cut off by an assertion that always fails, so
//! running the program still panics, with the same message, at the same
//! point.

use crate::middle::interpret::{FailureKind, InterpError};
use crate::middle::ir::{
    AssertKind, BasicBlock, Body, ConstKind, Location, Operand, PromotedId, Rvalue, StatementKind,
    TerminatorKind,
};
use crate::util::span::Span;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeFailure {
    pub promoted: PromotedId,
    /// Block split off in front of the use site
    pub location: Location,
    pub span: Span,
    pub message: String,
    #[serde(skip)]
    pub kind: FailureKind,
}

/// Panic message the runtime would report for `err`
pub fn failure_message(err: &InterpError) -> String {
    match err {
        InterpError::Panic(message) => message.clone(),
        other => other.to_string(),
    }
}

fn refers_to(
    operand: &Operand,
    id: PromotedId,
) -> bool {
    matches!(operand, Operand::Constant(c) if c.kind == ConstKind::Promoted(id))
}

/// Location of the statement or call that reads promoted `id`
pub fn find_use_site(
    body: &Body,
    id: PromotedId,
) -> Option<Location> {
    for (index, block) in body.basic_blocks.iter().enumerate() {
        let bb = BasicBlock(index);
        for (statement_index, statement) in block.statements.iter().enumerate() {
            if let StatementKind::Assign(assign) = &statement.kind {
                if let Rvalue::Use(operand) = &assign.1 {
                    if refers_to(operand, id) {
                        return Some(Location::new(bb, statement_index));
                    }
                }
            }
        }
        if let TerminatorKind::Call { args, .. } = &block.terminator.kind {
            if args.iter().any(|arg| refers_to(arg, id)) {
                return Some(body.terminator_loc(bb));
            }
        }
    }
    None
}

/// Make the use site of promoted `id` unreachable behind an always-failing
/// assertion carrying `message`
pub fn insert_runtime_panic(
    body: &mut Body,
    id: PromotedId,
    err: &InterpError,
) -> Option<RuntimeFailure> {
    let location = find_use_site(body, id)?;
    let source_info = *body.source_info(location);
    let message = failure_message(err);

    let tail = body.split_block(location);
    let head = body.block_mut(location.block);
    head.terminator.source_info = source_info;
    head.terminator.kind = TerminatorKind::Assert {
        cond: Operand::bool(false),
        expected: true,
        msg: AssertKind::Custom(message.clone()),
        target: tail,
    };

    Some(RuntimeFailure {
        promoted: id,
        location,
        span: source_info.span,
        message,
        kind: err.kind(),
    })
}
