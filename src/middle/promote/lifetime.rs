//! Lifetime extension of borrowed temporaries
//!
//! `let x = &make();` borrows a temporary that cannot always be promoted.
//! The temporary then lives as long as `x` instead of dying at the end of
//! the statement: its `StorageDead` moves to where `x`'s storage ends.
//! `let p = &raw const make();` is treated the same way.

use crate::middle::const_check::ConstCx;
use crate::middle::ir::{
    BasicBlock, Body, Local, LocalKind, Location, Rvalue, Statement, StatementKind,
};
use crate::middle::promote::collect::{Candidate, TempState};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LifetimeExtension {
    pub temp: Local,
    /// User variable holding the borrow
    pub var: Local,
    /// The borrow
    pub location: Location,
}

/// Locations of every `&raw` borrow; these are never promotion candidates
fn raw_borrows(body: &Body) -> Vec<Location> {
    let mut locations = Vec::new();
    for (index, data) in body.basic_blocks.iter().enumerate() {
        for (statement_index, statement) in data.statements.iter().enumerate() {
            if let StatementKind::Assign(assign) = &statement.kind {
                if matches!(assign.1, Rvalue::AddressOf(..)) {
                    locations.push(Location::new(BasicBlock(index), statement_index));
                }
            }
        }
    }
    locations
}

/// Rejected borrows, and raw borrows, of single-assignment temps stored
/// straight into a user variable
pub fn plan_extensions<'c>(
    ccx: &ConstCx<'_>,
    temps: &[TempState],
    rejected: impl IntoIterator<Item = &'c Candidate>,
) -> Vec<LifetimeExtension> {
    let body = ccx.body;
    let rejected_refs = rejected.into_iter().filter_map(|candidate| match *candidate {
        Candidate::Ref(location) => Some(location),
        Candidate::Argument { .. } => None,
    });
    let mut extensions = Vec::new();
    for location in rejected_refs.chain(raw_borrows(body)) {
        let Some(StatementKind::Assign(assign)) = body.stmt_at(location).map(|s| &s.kind) else {
            continue;
        };
        let (dest, (Rvalue::Ref(_, place) | Rvalue::AddressOf(_, place))) = (&assign.0, &assign.1)
        else {
            continue;
        };
        let Some(var) = dest.as_local() else {
            continue;
        };
        if body.local_kind(var) != LocalKind::Var
            || body.local_kind(place.local) != LocalKind::Temp
            || place.has_deref()
        {
            continue;
        }
        if !matches!(temps[place.local.index()], TempState::Defined { .. }) {
            continue;
        }
        extensions.push(LifetimeExtension {
            temp: place.local,
            var,
            location,
        });
    }
    extensions
}

/// Move the temp's `StorageDead` after each `StorageDead` of the variable.
/// A variable that is never killed keeps the temp alive to the end.
pub fn apply_extension(
    body: &mut Body,
    extension: &LifetimeExtension,
) {
    debug!(
        "`{}`: extending the lifetime of {} to that of {}",
        body.display_name(),
        extension.temp,
        extension.var
    );
    for block in &mut body.basic_blocks {
        let statements = std::mem::take(&mut block.statements);
        for statement in statements {
            match statement.kind {
                StatementKind::StorageDead(local) if local == extension.temp => {}
                StatementKind::StorageDead(local) if local == extension.var => {
                    let source_info = statement.source_info;
                    block.statements.push(statement);
                    block.statements.push(Statement {
                        source_info,
                        kind: StatementKind::StorageDead(extension.temp),
                    });
                }
                _ => block.statements.push(statement),
            }
        }
    }
}
