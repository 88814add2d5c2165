//! Temp and candidate collection
//!
//! One walk over the reachable blocks records how every temporary is
//! assigned and used, and which borrows and call arguments could be
//! replaced by a promoted constant.

use crate::middle::const_check::ConstCx;
use crate::middle::ir::{
    BasicBlock, Body, Local, LocalKind, Location, Rvalue, SourceInfo, Terminator, TerminatorKind,
};
use crate::middle::traversal::reverse_postorder;
use crate::middle::ty::Ty;
use crate::middle::visit::{MutatingUseContext, PlaceContext, Visitor};
use std::fmt;

/// How a temporary is assigned and used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempState {
    /// No assignment seen yet
    Undefined,
    /// Assigned exactly once, at `location`, then used `uses` times
    Defined { location: Location, uses: usize },
    /// Assigned more than once, or mutated after its assignment
    Unpromotable,
    /// Moved into a promoted body; its assignment is gone from the source
    PromotedOut,
}

impl TempState {
    pub fn is_promotable(&self) -> bool {
        matches!(self, TempState::Defined { uses, .. } if *uses > 0)
    }
}

/// A place where a promoted constant may be used instead of runtime code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Candidate {
    /// Borrow of a temporary, `_r = &_t`
    Ref(Location),
    /// Call argument the callee requires to be a compile-time constant
    Argument { block: BasicBlock, index: usize },
}

impl Candidate {
    pub fn location(
        &self,
        body: &Body,
    ) -> Location {
        match *self {
            Candidate::Ref(location) => location,
            Candidate::Argument { block, .. } => body.terminator_loc(block),
        }
    }

    pub fn source_info(
        &self,
        body: &Body,
    ) -> SourceInfo {
        *body.source_info(self.location(body))
    }

    /// Argument candidates are validated as strictly as an explicit constant
    pub fn forces_explicit_promotion(&self) -> bool {
        matches!(self, Candidate::Argument { .. })
    }
}

impl fmt::Display for Candidate {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Candidate::Ref(location) => write!(f, "borrow at {}", location),
            Candidate::Argument { block, index } => {
                write!(f, "argument {} of the call in {}", index + 1, block)
            }
        }
    }
}

struct Collector<'a, 'b> {
    cx: &'a ConstCx<'b>,
    temps: Vec<TempState>,
    candidates: Vec<Candidate>,
}

impl Visitor for Collector<'_, '_> {
    fn visit_local(
        &mut self,
        local: Local,
        context: PlaceContext,
        location: Location,
    ) {
        // Only the return place and temporaries can be promoted.
        match self.cx.body.local_kind(local) {
            LocalKind::Arg | LocalKind::Var => return,
            LocalKind::Temp | LocalKind::ReturnPointer => {}
        }

        // Drops of a temp that was moved out leave nothing behind; storage
        // markers are not uses.
        if context.is_drop() || !context.is_use() {
            return;
        }

        let state = &mut self.temps[local.index()];
        match state {
            TempState::Undefined => {
                if matches!(
                    context,
                    PlaceContext::MutatingUse(
                        MutatingUseContext::Store | MutatingUseContext::Call
                    )
                ) {
                    *state = TempState::Defined { location, uses: 0 };
                    return;
                }
            }
            TempState::Defined { uses, .. } => {
                // Reads and borrows only; any other mutation means the value
                // is not fixed by its single assignment.
                let allowed_use = matches!(
                    context,
                    PlaceContext::MutatingUse(MutatingUseContext::Borrow)
                        | PlaceContext::NonMutatingUse(_)
                );
                if allowed_use {
                    *uses += 1;
                    return;
                }
            }
            TempState::Unpromotable | TempState::PromotedOut => {}
        }
        *state = TempState::Unpromotable;
    }

    fn visit_rvalue(
        &mut self,
        rvalue: &Rvalue,
        location: Location,
    ) {
        self.super_rvalue(rvalue, location);
        if let Rvalue::Ref(..) = rvalue {
            self.candidates.push(Candidate::Ref(location));
        }
    }

    fn visit_terminator(
        &mut self,
        terminator: &Terminator,
        location: Location,
    ) {
        self.super_terminator(terminator, location);
        if let TerminatorKind::Call { func, args, .. } = &terminator.kind {
            if let Ty::FnDef(id) = self.cx.body.operand_ty(self.cx.module, func) {
                for &index in &self.cx.module.function(id).required_const_args {
                    // Arguments that already are constants need no promotion.
                    if args.get(index).and_then(|arg| arg.place()).is_some() {
                        self.candidates.push(Candidate::Argument {
                            block: location.block,
                            index,
                        });
                    }
                }
            }
        }
    }
}

/// Walk the reachable part of the body in reverse postorder
pub fn collect_temps_and_candidates(cx: &ConstCx<'_>) -> (Vec<TempState>, Vec<Candidate>) {
    let mut collector = Collector {
        cx,
        temps: vec![TempState::Undefined; cx.body.local_decls.len()],
        candidates: Vec::new(),
    };
    for bb in reverse_postorder(cx.body) {
        collector.visit_basic_block_data(bb, cx.body.block(bb));
    }
    (collector.temps, collector.candidates)
}
