//! IR visitors
//!
//! `Visitor` walks a body read-only and reports every local with the
//! context it appears in; `MutVisitor` lets a pass rewrite locals,
//! places, operands and rvalues in place.

use crate::middle::ir::{
    BasicBlock, BasicBlockData, Body, BorrowKind, Location, Operand, Place, ProjectionElem,
    Rvalue, Statement, StatementKind, Terminator, TerminatorKind,
};
use crate::middle::ty::Mutability;
use crate::middle::ir::Local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonMutatingUseContext {
    Inspect,
    Copy,
    Move,
    SharedBorrow,
    ShallowBorrow,
    AddressOf,
    Projection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatingUseContext {
    Store,
    /// Destination of a call
    Call,
    Drop,
    Borrow,
    AddressOf,
    Projection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonUseContext {
    StorageLive,
    StorageDead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceContext {
    NonMutatingUse(NonMutatingUseContext),
    MutatingUse(MutatingUseContext),
    NonUse(NonUseContext),
}

impl PlaceContext {
    pub fn is_drop(self) -> bool {
        matches!(self, PlaceContext::MutatingUse(MutatingUseContext::Drop))
    }

    pub fn is_use(self) -> bool {
        !matches!(self, PlaceContext::NonUse(_))
    }

    pub fn is_mutating_use(self) -> bool {
        matches!(self, PlaceContext::MutatingUse(_))
    }

    pub fn is_storage_marker(self) -> bool {
        matches!(self, PlaceContext::NonUse(_))
    }
}

pub trait Visitor {
    fn visit_body(
        &mut self,
        body: &Body,
    ) {
        self.super_body(body);
    }

    fn visit_basic_block_data(
        &mut self,
        block: BasicBlock,
        data: &BasicBlockData,
    ) {
        self.super_basic_block_data(block, data);
    }

    fn visit_statement(
        &mut self,
        statement: &Statement,
        location: Location,
    ) {
        self.super_statement(statement, location);
    }

    fn visit_assign(
        &mut self,
        place: &Place,
        rvalue: &Rvalue,
        location: Location,
    ) {
        self.visit_place(
            place,
            PlaceContext::MutatingUse(MutatingUseContext::Store),
            location,
        );
        self.visit_rvalue(rvalue, location);
    }

    fn visit_terminator(
        &mut self,
        terminator: &Terminator,
        location: Location,
    ) {
        self.super_terminator(terminator, location);
    }

    fn visit_rvalue(
        &mut self,
        rvalue: &Rvalue,
        location: Location,
    ) {
        self.super_rvalue(rvalue, location);
    }

    fn visit_operand(
        &mut self,
        operand: &Operand,
        location: Location,
    ) {
        self.super_operand(operand, location);
    }

    fn visit_place(
        &mut self,
        place: &Place,
        context: PlaceContext,
        location: Location,
    ) {
        self.super_place(place, context, location);
    }

    fn visit_local(
        &mut self,
        _local: Local,
        _context: PlaceContext,
        _location: Location,
    ) {
    }

    fn super_body(
        &mut self,
        body: &Body,
    ) {
        for (index, data) in body.basic_blocks.iter().enumerate() {
            self.visit_basic_block_data(BasicBlock(index), data);
        }
    }

    fn super_basic_block_data(
        &mut self,
        block: BasicBlock,
        data: &BasicBlockData,
    ) {
        for (index, statement) in data.statements.iter().enumerate() {
            self.visit_statement(statement, Location::new(block, index));
        }
        self.visit_terminator(
            &data.terminator,
            Location::new(block, data.statements.len()),
        );
    }

    fn super_statement(
        &mut self,
        statement: &Statement,
        location: Location,
    ) {
        match &statement.kind {
            StatementKind::Assign(assign) => self.visit_assign(&assign.0, &assign.1, location),
            StatementKind::StorageLive(local) => self.visit_local(
                *local,
                PlaceContext::NonUse(NonUseContext::StorageLive),
                location,
            ),
            StatementKind::StorageDead(local) => self.visit_local(
                *local,
                PlaceContext::NonUse(NonUseContext::StorageDead),
                location,
            ),
            StatementKind::Nop => {}
        }
    }

    fn super_terminator(
        &mut self,
        terminator: &Terminator,
        location: Location,
    ) {
        match &terminator.kind {
            TerminatorKind::Goto { .. }
            | TerminatorKind::Return
            | TerminatorKind::Unreachable => {}
            TerminatorKind::SwitchInt { discr, .. } => self.visit_operand(discr, location),
            TerminatorKind::Drop { place, .. } => self.visit_place(
                place,
                PlaceContext::MutatingUse(MutatingUseContext::Drop),
                location,
            ),
            TerminatorKind::Call {
                func,
                args,
                destination,
                ..
            } => {
                self.visit_operand(func, location);
                for arg in args {
                    self.visit_operand(arg, location);
                }
                self.visit_place(
                    destination,
                    PlaceContext::MutatingUse(MutatingUseContext::Call),
                    location,
                );
            }
            TerminatorKind::Assert { cond, .. } => self.visit_operand(cond, location),
        }
    }

    fn super_rvalue(
        &mut self,
        rvalue: &Rvalue,
        location: Location,
    ) {
        match rvalue {
            Rvalue::Use(operand)
            | Rvalue::Repeat(operand, _)
            | Rvalue::Cast(_, operand, _)
            | Rvalue::UnaryOp(_, operand) => self.visit_operand(operand, location),
            Rvalue::Ref(kind, place) => {
                let context = match kind {
                    BorrowKind::Shared => {
                        PlaceContext::NonMutatingUse(NonMutatingUseContext::SharedBorrow)
                    }
                    BorrowKind::Shallow => {
                        PlaceContext::NonMutatingUse(NonMutatingUseContext::ShallowBorrow)
                    }
                    BorrowKind::Mut => PlaceContext::MutatingUse(MutatingUseContext::Borrow),
                };
                self.visit_place(place, context, location);
            }
            Rvalue::AddressOf(mutbl, place) => {
                let context = match mutbl {
                    Mutability::Not => {
                        PlaceContext::NonMutatingUse(NonMutatingUseContext::AddressOf)
                    }
                    Mutability::Mut => PlaceContext::MutatingUse(MutatingUseContext::AddressOf),
                };
                self.visit_place(place, context, location);
            }
            Rvalue::Len(place) | Rvalue::Discriminant(place) => self.visit_place(
                place,
                PlaceContext::NonMutatingUse(NonMutatingUseContext::Inspect),
                location,
            ),
            Rvalue::BinaryOp(_, operands) | Rvalue::CheckedBinaryOp(_, operands) => {
                self.visit_operand(&operands.0, location);
                self.visit_operand(&operands.1, location);
            }
            Rvalue::Aggregate(_, operands) => {
                for operand in operands {
                    self.visit_operand(operand, location);
                }
            }
            Rvalue::ThreadLocalRef(_) | Rvalue::HeapAlloc(_) => {}
        }
    }

    fn super_operand(
        &mut self,
        operand: &Operand,
        location: Location,
    ) {
        match operand {
            Operand::Copy(place) => self.visit_place(
                place,
                PlaceContext::NonMutatingUse(NonMutatingUseContext::Copy),
                location,
            ),
            Operand::Move(place) => self.visit_place(
                place,
                PlaceContext::NonMutatingUse(NonMutatingUseContext::Move),
                location,
            ),
            Operand::Constant(_) => {}
        }
    }

    fn super_place(
        &mut self,
        place: &Place,
        context: PlaceContext,
        location: Location,
    ) {
        let mut base_context = context;
        if !place.projection.is_empty() && context.is_use() {
            base_context = if context.is_mutating_use() {
                PlaceContext::MutatingUse(MutatingUseContext::Projection)
            } else {
                PlaceContext::NonMutatingUse(NonMutatingUseContext::Projection)
            };
        }
        self.visit_local(place.local, base_context, location);

        for elem in &place.projection {
            if let ProjectionElem::Index(index) = elem {
                self.visit_local(
                    *index,
                    PlaceContext::NonMutatingUse(NonMutatingUseContext::Copy),
                    location,
                );
            }
        }
    }
}

/// Rewrites IR in place. Only the hooks promotion and cleanup need.
pub trait MutVisitor {
    fn visit_local(
        &mut self,
        local: &mut Local,
    );

    fn visit_place(
        &mut self,
        place: &mut Place,
    ) {
        self.visit_local(&mut place.local);
        for elem in &mut place.projection {
            if let ProjectionElem::Index(index) = elem {
                self.visit_local(index);
            }
        }
    }

    fn visit_operand(
        &mut self,
        operand: &mut Operand,
    ) {
        match operand {
            Operand::Copy(place) | Operand::Move(place) => self.visit_place(place),
            Operand::Constant(_) => {}
        }
    }

    fn visit_rvalue(
        &mut self,
        rvalue: &mut Rvalue,
    ) {
        match rvalue {
            Rvalue::Use(operand)
            | Rvalue::Repeat(operand, _)
            | Rvalue::Cast(_, operand, _)
            | Rvalue::UnaryOp(_, operand) => self.visit_operand(operand),
            Rvalue::Ref(_, place)
            | Rvalue::AddressOf(_, place)
            | Rvalue::Len(place)
            | Rvalue::Discriminant(place) => self.visit_place(place),
            Rvalue::BinaryOp(_, operands) | Rvalue::CheckedBinaryOp(_, operands) => {
                self.visit_operand(&mut operands.0);
                self.visit_operand(&mut operands.1);
            }
            Rvalue::Aggregate(_, operands) => {
                for operand in operands {
                    self.visit_operand(operand);
                }
            }
            Rvalue::ThreadLocalRef(_) | Rvalue::HeapAlloc(_) => {}
        }
    }
}
