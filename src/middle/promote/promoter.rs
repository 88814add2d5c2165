//! Moving validated candidates into promoted bodies
//!
//! Each candidate gets a fresh body whose return value is what the
//! candidate borrowed (or passed). The temps it is computed from are copied
//! over one by one; a temp only the candidate used is moved out of the
//! source, one with other users stays behind as well.

use crate::middle::ir::{
    BasicBlock, BasicBlockData, Body, BodySource, ConstKind, Local, LocalDecl, LocalKind,
    Location, Operand, Place, PromotedId, ProjectionElem, Rvalue, SourceInfo, SourceScopeData,
    Statement, StatementKind, Terminator, TerminatorKind,
};
use crate::middle::promote::collect::{Candidate, TempState};
use crate::middle::ty::{ModuleIR, Ty};
use crate::middle::visit::MutVisitor;
use std::collections::HashMap;
use std::mem;
use tracing::trace;

struct Promoter<'a> {
    module: &'a ModuleIR,
    source: &'a mut Body,
    promoted: Body,
    temps: &'a mut Vec<TempState>,
    /// Source temp to its copy in `promoted`
    copied: HashMap<Local, Local>,
    extra_statements: &'a mut Vec<(Location, Statement)>,
    /// Set while promoting a temp that keeps its source assignment
    keep_original: bool,
}

impl Promoter<'_> {
    fn new_block(&mut self) -> BasicBlock {
        let span = self.promoted.span;
        self.promoted.push_block(BasicBlockData {
            statements: Vec::new(),
            terminator: Terminator {
                source_info: SourceInfo::outermost(span),
                kind: TerminatorKind::Return,
            },
        })
    }

    fn last_block(&self) -> BasicBlock {
        BasicBlock(self.promoted.basic_blocks.len() - 1)
    }

    fn assign(
        &mut self,
        dest: Local,
        rvalue: Rvalue,
    ) {
        let span = self.promoted.span;
        let last = self.last_block();
        self.promoted
            .block_mut(last)
            .statements
            .push(Statement::assign(SourceInfo::outermost(span), Place::local(dest), rvalue));
    }

    fn is_temp_kind(
        &self,
        local: Local,
    ) -> bool {
        self.source.local_kind(local) == LocalKind::Temp
    }

    /// Copy the definition of `temp` into the promoted body and return the
    /// local holding it there
    fn promote_temp(
        &mut self,
        temp: Local,
    ) -> Local {
        if let Some(&new_temp) = self.copied.get(&temp) {
            return new_temp;
        }
        let (location, uses) = match self.temps[temp.index()] {
            TempState::Defined { location, uses } if uses > 0 => (location, uses),
            state => panic!("{} is not promotable: {:?}", temp, state),
        };
        // Temps used elsewhere in the source are copied; the last use goes
        // through the candidate, so the definition can move.
        let old_keep_original = self.keep_original;
        if uses > 1 {
            self.keep_original = true;
        }
        if !self.keep_original {
            self.temps[temp.index()] = TempState::PromotedOut;
        }

        let num_stmts = self.source.block(location.block).statements.len();
        let decl = self.source.local_decls[temp.index()].clone();
        let new_temp = self.promoted.push_local(LocalDecl::temp(decl.ty).with_span(decl.span));
        self.copied.insert(temp, new_temp);
        trace!("promoting {} as {}", temp, new_temp);

        if location.statement_index < num_stmts {
            let mut rvalue = {
                let statement =
                    &mut self.source.block_mut(location.block).statements[location.statement_index];
                let StatementKind::Assign(assign) = &mut statement.kind else {
                    panic!("{} is not defined by an assignment", temp)
                };
                if self.keep_original {
                    assign.1.clone()
                } else {
                    let unit = Rvalue::Use(Operand::constant(Ty::Unit, ConstKind::ZeroSized));
                    mem::replace(&mut assign.1, unit)
                }
            };
            self.visit_rvalue(&mut rvalue);
            self.assign(new_temp, rvalue);
        } else {
            let terminator = &mut self.source.block_mut(location.block).terminator;
            let (mut func, mut args) = match &terminator.kind {
                TerminatorKind::Call { func, args, .. } => (func.clone(), args.clone()),
                _ => panic!("{} is not defined by a call", temp),
            };
            if !self.keep_original {
                if let TerminatorKind::Call {
                    target: Some(target),
                    ..
                } = terminator.kind
                {
                    terminator.kind = TerminatorKind::Goto { target };
                }
            }

            self.visit_operand(&mut func);
            for arg in &mut args {
                self.visit_operand(arg);
            }

            let last = self.last_block();
            let next = self.new_block();
            self.promoted.block_mut(last).terminator.kind = TerminatorKind::Call {
                func,
                args,
                destination: Place::local(new_temp),
                target: Some(next),
            };
        }

        self.keep_original = old_keep_original;
        new_temp
    }

    fn promote_candidate(
        mut self,
        candidate: Candidate,
        id: PromotedId,
    ) -> Body {
        let mut rvalue = match candidate {
            Candidate::Ref(location) => {
                let source_info = *self.source.source_info(location);
                let (kind, borrowed) = match self.source.stmt_at(location).map(|s| &s.kind) {
                    Some(StatementKind::Assign(assign)) => match &assign.1 {
                        Rvalue::Ref(kind, place) => (*kind, place.local),
                        _ => panic!("candidate at {} is not a borrow", location),
                    },
                    _ => panic!("candidate at {} is not a borrow", location),
                };
                let ty = self.source.local_decls[borrowed.index()].ty.clone();
                let ref_ty = Ty::Ref(kind.to_mutbl_lossy(), Box::new(ty));

                let promoted_ref = self.source.push_local(
                    LocalDecl::temp(ref_ty.clone()).with_span(source_info.span),
                );
                self.temps.push(TempState::Unpromotable);
                self.extra_statements.push((
                    location,
                    Statement::assign(
                        source_info,
                        Place::local(promoted_ref),
                        Rvalue::Use(Operand::constant(ref_ty.clone(), ConstKind::Promoted(id))),
                    ),
                ));
                self.promoted.local_decls[0] = LocalDecl::temp(ref_ty);

                // `&_t.proj` becomes `&(*promoted_ref).proj`
                let statements = &mut self.source.block_mut(location.block).statements;
                if let Some(Statement {
                    kind: StatementKind::Assign(assign),
                    ..
                }) = statements.get_mut(location.statement_index)
                {
                    if let Rvalue::Ref(_, place) = &mut assign.1 {
                        place.projection.insert(0, ProjectionElem::Deref);
                        place.local = promoted_ref;
                    }
                }
                Rvalue::Ref(kind, Place::local(borrowed))
            }
            Candidate::Argument { block, index } => {
                let operand = match &self.source.block(block).terminator.kind {
                    TerminatorKind::Call { args, .. } => args[index].clone(),
                    _ => panic!("candidate in {} is not a call", block),
                };
                let ty = self.source.operand_ty(self.module, &operand);
                self.promoted.local_decls[0] = LocalDecl::temp(ty.clone());
                if let TerminatorKind::Call { args, .. } =
                    &mut self.source.block_mut(block).terminator.kind
                {
                    args[index] = Operand::constant(ty, ConstKind::Promoted(id));
                }
                Rvalue::Use(operand)
            }
        };

        self.new_block();
        self.visit_rvalue(&mut rvalue);
        self.assign(Local::RETURN_PLACE, rvalue);
        self.promoted
    }
}

impl MutVisitor for Promoter<'_> {
    fn visit_local(
        &mut self,
        local: &mut Local,
    ) {
        if self.is_temp_kind(*local) {
            *local = self.promote_temp(*local);
        }
    }
}

/// Promote `candidates` out of `body`, appending one promoted body per
/// candidate. Returns the ids in the order of `candidates`.
pub fn promote_candidates(
    module: &ModuleIR,
    body: &mut Body,
    temps: &mut Vec<TempState>,
    candidates: &[Candidate],
) -> Vec<(Candidate, PromotedId)> {
    let mut extra_statements = Vec::new();
    let mut promotions: Vec<(Candidate, PromotedId, Body)> = Vec::new();
    let first_id = body.promoted.len();

    // Later candidates first: a borrow nested in another promoted value
    // has then already been taken care of by the outer one.
    for &candidate in candidates.iter().rev() {
        if let Candidate::Ref(location) = candidate {
            if let Some(Statement {
                kind: StatementKind::Assign(assign),
                ..
            }) = body.stmt_at(location)
            {
                if let Some(local) = assign.0.as_local() {
                    if temps[local.index()] == TempState::PromotedOut {
                        continue;
                    }
                }
            }
        }

        let source_info = candidate.source_info(body);
        let scope = body
            .source_scopes
            .get(source_info.scope.0)
            .cloned()
            .unwrap_or_else(|| SourceScopeData::outermost(source_info.span));
        let id = PromotedId(first_id + promotions.len());
        let mut promoted = Body::new(
            BodySource {
                owner: body.source.owner.clone(),
                kind: body.source.kind,
                promoted: Some(id),
            },
            vec![LocalDecl::temp(Ty::Never)],
            0,
            source_info.span,
        );
        promoted.source_scopes = vec![SourceScopeData {
            parent: None,
            ..scope
        }];

        let promoter = Promoter {
            module,
            source: &mut *body,
            promoted,
            temps: &mut *temps,
            copied: HashMap::new(),
            extra_statements: &mut extra_statements,
            keep_original: false,
        };
        let promoted = promoter.promote_candidate(candidate, id);
        promotions.push((candidate, id, promoted));
    }

    // Insert the `promoted_ref = const ...` statements, back to front so
    // earlier indices stay valid.
    extra_statements.sort_by_key(|(loc, _)| std::cmp::Reverse(*loc));
    for (loc, statement) in extra_statements {
        body.block_mut(loc.block)
            .statements
            .insert(loc.statement_index, statement);
    }

    remove_promoted_out(body, temps);

    let mut ids = Vec::with_capacity(promotions.len());
    for (candidate, id, promoted) in promotions {
        ids.push((candidate, id));
        body.promoted.push(promoted);
    }
    ids.reverse();
    ids
}

/// Drop every trace of temps that now live in promoted bodies
fn remove_promoted_out(
    body: &mut Body,
    temps: &[TempState],
) {
    let promoted_out = |local: Local| {
        temps
            .get(local.index())
            .map_or(false, |state| *state == TempState::PromotedOut)
    };

    for block in &mut body.basic_blocks {
        block.statements.retain(|statement| match &statement.kind {
            StatementKind::Assign(assign) => match assign.0.as_local() {
                Some(local) => !promoted_out(local),
                None => true,
            },
            StatementKind::StorageLive(local) | StatementKind::StorageDead(local) => {
                !promoted_out(*local)
            }
            StatementKind::Nop => true,
        });

        let target = match &block.terminator.kind {
            TerminatorKind::Drop { place, target } => place
                .as_local()
                .filter(|local| promoted_out(*local))
                .map(|_| *target),
            _ => None,
        };
        if let Some(target) = target {
            block.terminator.kind = TerminatorKind::Goto { target };
        }
    }
}
