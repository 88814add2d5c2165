//! IR builder
//!
//! Builds bodies block by block. Used by the tests, the benches, and by
//! anything that wants to hand-construct IR without going through a file.

use crate::middle::ir::{
    AssertKind, BasicBlock, BasicBlockData, Body, BodyKind, BodySource, Local, LocalDecl,
    Operand, Place, Rvalue, Safety, SourceInfo, SourceScope, SourceScopeData, Statement,
    StatementKind, Terminator, TerminatorKind,
};
use crate::middle::ty::{FnId, Mutability, Ty};
use crate::util::span::Span;

/// 基本块构建器
pub struct BodyBuilder {
    body: Body,
    current: BasicBlock,
    scope: SourceScope,
    span: Span,
}

impl BodyBuilder {
    /// Start a body whose entry block is current
    pub fn new(
        owner: &str,
        kind: BodyKind,
        return_ty: Ty,
        arg_tys: Vec<Ty>,
    ) -> Self {
        let arg_count = arg_tys.len();
        let mut local_decls = vec![LocalDecl::temp(return_ty)];
        local_decls.extend(arg_tys.into_iter().map(|ty| LocalDecl::var(ty, Mutability::Not)));
        let source = BodySource {
            owner: owner.to_string(),
            kind,
            promoted: None,
        };
        let mut body = Body::new(source, local_decls, arg_count, Span::dummy());
        let entry = body.push_block(placeholder_block());
        Self {
            body,
            current: entry,
            scope: SourceScope::OUTERMOST,
            span: Span::dummy(),
        }
    }

    pub fn arg(
        &self,
        index: usize,
    ) -> Local {
        assert!(index < self.body.arg_count, "argument {} out of range", index);
        Local(index + 1)
    }

    pub fn temp(
        &mut self,
        ty: Ty,
    ) -> Local {
        self.body.push_local(LocalDecl::temp(ty).with_span(self.span))
    }

    /// Immutable user binding
    pub fn var(
        &mut self,
        ty: Ty,
    ) -> Local {
        self.body
            .push_local(LocalDecl::var(ty, Mutability::Not).with_span(self.span))
    }

    pub fn var_mut(
        &mut self,
        ty: Ty,
    ) -> Local {
        self.body
            .push_local(LocalDecl::var(ty, Mutability::Mut).with_span(self.span))
    }

    pub fn current_block(&self) -> BasicBlock {
        self.current
    }

    pub fn new_block(&mut self) -> BasicBlock {
        self.body.push_block(placeholder_block())
    }

    pub fn set_block(
        &mut self,
        block: BasicBlock,
    ) {
        self.current = block;
    }

    /// Span attached to everything built from now on
    pub fn at(
        &mut self,
        span: Span,
    ) -> &mut Self {
        self.span = span;
        self
    }

    /// Open a child scope with the given safety; returns the previous scope
    pub fn enter_scope(
        &mut self,
        safety: Safety,
    ) -> SourceScope {
        self.body.source_scopes.push(SourceScopeData {
            parent: Some(self.scope),
            safety,
            span: self.span,
        });
        let previous = self.scope;
        self.scope = SourceScope(self.body.source_scopes.len() - 1);
        previous
    }

    pub fn exit_scope(
        &mut self,
        previous: SourceScope,
    ) {
        self.scope = previous;
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            span: self.span,
            scope: self.scope,
        }
    }

    fn push(
        &mut self,
        kind: StatementKind,
    ) {
        let source_info = self.source_info();
        self.body
            .block_mut(self.current)
            .statements
            .push(Statement { source_info, kind });
    }

    pub fn assign(
        &mut self,
        place: impl Into<Place>,
        rvalue: Rvalue,
    ) -> &mut Self {
        self.push(StatementKind::Assign(Box::new((place.into(), rvalue))));
        self
    }

    pub fn storage_live(
        &mut self,
        local: Local,
    ) -> &mut Self {
        self.push(StatementKind::StorageLive(local));
        self
    }

    pub fn storage_dead(
        &mut self,
        local: Local,
    ) -> &mut Self {
        self.push(StatementKind::StorageDead(local));
        self
    }

    fn terminate(
        &mut self,
        kind: TerminatorKind,
    ) {
        let source_info = self.source_info();
        self.body.block_mut(self.current).terminator = Terminator { source_info, kind };
    }

    pub fn goto(
        &mut self,
        target: BasicBlock,
    ) {
        self.terminate(TerminatorKind::Goto { target });
    }

    pub fn ret(&mut self) {
        self.terminate(TerminatorKind::Return);
    }

    pub fn unreachable(&mut self) {
        self.terminate(TerminatorKind::Unreachable);
    }

    pub fn switch_bool(
        &mut self,
        discr: Operand,
        then_block: BasicBlock,
        else_block: BasicBlock,
    ) {
        self.terminate(TerminatorKind::SwitchInt {
            discr,
            targets: vec![(0, else_block)],
            otherwise: then_block,
        });
    }

    pub fn switch_int(
        &mut self,
        discr: Operand,
        targets: Vec<(u128, BasicBlock)>,
        otherwise: BasicBlock,
    ) {
        self.terminate(TerminatorKind::SwitchInt {
            discr,
            targets,
            otherwise,
        });
    }

    /// Call `func` and continue building in a fresh block after it
    pub fn call(
        &mut self,
        func: FnId,
        args: Vec<Operand>,
        destination: impl Into<Place>,
    ) -> BasicBlock {
        let next = self.new_block();
        self.terminate(TerminatorKind::Call {
            func: Operand::function(func),
            args,
            destination: destination.into(),
            target: Some(next),
        });
        self.current = next;
        next
    }

    /// Call through an arbitrary callee operand (function pointers)
    pub fn call_operand(
        &mut self,
        func: Operand,
        args: Vec<Operand>,
        destination: impl Into<Place>,
    ) -> BasicBlock {
        let next = self.new_block();
        self.terminate(TerminatorKind::Call {
            func,
            args,
            destination: destination.into(),
            target: Some(next),
        });
        self.current = next;
        next
    }

    /// Call that never returns; building continues in a fresh unreachable block
    pub fn call_diverging(
        &mut self,
        func: FnId,
        args: Vec<Operand>,
        destination: impl Into<Place>,
    ) -> BasicBlock {
        self.terminate(TerminatorKind::Call {
            func: Operand::function(func),
            args,
            destination: destination.into(),
            target: None,
        });
        let next = self.new_block();
        self.current = next;
        next
    }

    pub fn assert(
        &mut self,
        cond: Operand,
        expected: bool,
        msg: AssertKind,
    ) -> BasicBlock {
        let next = self.new_block();
        self.terminate(TerminatorKind::Assert {
            cond,
            expected,
            msg,
            target: next,
        });
        self.current = next;
        next
    }

    pub fn drop(
        &mut self,
        place: impl Into<Place>,
    ) -> BasicBlock {
        let next = self.new_block();
        self.terminate(TerminatorKind::Drop {
            place: place.into(),
            target: next,
        });
        self.current = next;
        next
    }

    pub fn finish(self) -> Body {
        self.body
    }
}

fn placeholder_block() -> BasicBlockData {
    BasicBlockData {
        statements: Vec::new(),
        terminator: Terminator {
            source_info: SourceInfo::default(),
            kind: TerminatorKind::Unreachable,
        },
    }
}
