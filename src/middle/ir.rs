//! Mid-level Intermediate Representation
//!
//! Control-flow graph of basic blocks over numbered locals. Every statement
//! reads and writes places; every value is an operand. Bodies are produced
//! by the lowering stage and consumed by the checkers and by promotion.

use crate::middle::ty::{AdtId, FnId, ModuleIR, Mutability, StaticId, Ty};
use crate::util::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Local(pub usize);

impl Local {
    pub const RETURN_PLACE: Local = Local(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Local {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasicBlock(pub usize);

impl BasicBlock {
    pub const START: BasicBlock = BasicBlock(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Index into `Body::promoted` of the owning body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromotedId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SourceScope(pub usize);

impl SourceScope {
    pub const OUTERMOST: SourceScope = SourceScope(0);
}

/// A statement position; `statement_index == statements.len()` is the terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub block: BasicBlock,
    pub statement_index: usize,
}

impl Location {
    pub fn new(
        block: BasicBlock,
        statement_index: usize,
    ) -> Self {
        Self {
            block,
            statement_index,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}[{}]", self.block, self.statement_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Safety {
    #[default]
    Safe,
    /// Inside an explicit `unconst` block: address-dependent operations are
    /// the author's responsibility.
    Unconst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceScopeData {
    #[serde(default)]
    pub parent: Option<SourceScope>,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub span: Span,
}

impl SourceScopeData {
    pub fn outermost(span: Span) -> Self {
        Self {
            parent: None,
            safety: Safety::Safe,
            span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default)]
    pub span: Span,
    #[serde(default = "outermost_scope")]
    pub scope: SourceScope,
}

fn outermost_scope() -> SourceScope {
    SourceScope::OUTERMOST
}

impl SourceInfo {
    pub fn outermost(span: Span) -> Self {
        Self {
            span,
            scope: SourceScope::OUTERMOST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    ReturnPointer,
    Arg,
    /// Named, user-declared binding
    Var,
    /// Compiler-introduced temporary
    Temp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDecl {
    pub ty: Ty,
    #[serde(default = "immutable")]
    pub mutability: Mutability,
    /// Declared by the user (`let x`), as opposed to a temporary
    #[serde(default)]
    pub user_var: bool,
    #[serde(default)]
    pub span: Span,
}

fn immutable() -> Mutability {
    Mutability::Not
}

impl LocalDecl {
    pub fn temp(ty: Ty) -> Self {
        Self {
            ty,
            mutability: Mutability::Mut,
            user_var: false,
            span: Span::dummy(),
        }
    }

    pub fn var(
        ty: Ty,
        mutability: Mutability,
    ) -> Self {
        Self {
            ty,
            mutability,
            user_var: true,
            span: Span::dummy(),
        }
    }

    pub fn with_span(
        mut self,
        span: Span,
    ) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionElem {
    Deref,
    Field(usize),
    Index(Local),
    ConstantIndex(u64),
    Downcast(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub local: Local,
    #[serde(default)]
    pub projection: Vec<ProjectionElem>,
}

impl Place {
    pub fn local(local: Local) -> Self {
        Self {
            local,
            projection: Vec::new(),
        }
    }

    pub fn return_place() -> Self {
        Self::local(Local::RETURN_PLACE)
    }

    pub fn as_local(&self) -> Option<Local> {
        if self.projection.is_empty() {
            Some(self.local)
        } else {
            None
        }
    }

    pub fn has_deref(&self) -> bool {
        self.projection.contains(&ProjectionElem::Deref)
    }

    pub fn project(
        mut self,
        elem: ProjectionElem,
    ) -> Self {
        self.projection.push(elem);
        self
    }

    pub fn field(
        self,
        index: usize,
    ) -> Self {
        self.project(ProjectionElem::Field(index))
    }

    pub fn deref(self) -> Self {
        self.project(ProjectionElem::Deref)
    }

    /// Split off the last projection: `(base, elem)`
    pub fn last_projection(&self) -> Option<(Place, &ProjectionElem)> {
        let (last, rest) = self.projection.split_last()?;
        Some((
            Place {
                local: self.local,
                projection: rest.to_vec(),
            },
            last,
        ))
    }
}

impl From<Local> for Place {
    fn from(local: Local) -> Self {
        Place::local(local)
    }
}

/// Integer bits stored as a number when they fit in `u64` and as a decimal
/// string otherwise, so every input format can carry 128-bit values
mod bits {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Small(u64),
        Wide(String),
    }

    pub fn serialize<S: Serializer>(
        value: &u128,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match u64::try_from(*value) {
            Ok(small) => serializer.serialize_u64(small),
            Err(_) => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Small(value) => Ok(value as u128),
            Repr::Wide(text) => text.parse().map_err(de::Error::custom),
        }
    }

    /// `SwitchInt` targets
    pub mod arms {
        use crate::middle::ir::BasicBlock;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        #[derive(Serialize, Deserialize)]
        struct Arm(#[serde(with = "super")] u128, BasicBlock);

        pub fn serialize<S: Serializer>(
            arms: &[(u128, BasicBlock)],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(arms.iter().map(|&(value, target)| Arm(value, target)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<(u128, BasicBlock)>, D::Error> {
            let arms = Vec::<Arm>::deserialize(deserializer)?;
            Ok(arms.into_iter().map(|Arm(value, target)| (value, target)).collect())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstKind {
    /// Integer bits; the constant's type gives width and signedness
    Int(#[serde(with = "bits")] u128),
    Bool(bool),
    Char(char),
    /// IEEE bits (f32 stored in the low 32 bits)
    Float(u64),
    ZeroSized,
    /// Function item or function pointer
    Fn(FnId),
    /// Address of a static
    Static(StaticId),
    /// Result of a promoted body of the enclosing body
    Promoted(PromotedId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub ty: Ty,
    pub kind: ConstKind,
}

impl Constant {
    pub fn check_static_ptr(&self) -> Option<StaticId> {
        match self.kind {
            ConstKind::Static(id) => Some(id),
            _ => None,
        }
    }

    /// Integer bits if this is an integer constant
    pub fn try_eval_bits(&self) -> Option<u128> {
        match self.kind {
            ConstKind::Int(bits) if self.ty.is_integral() => Some(bits),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Copy(Place),
    Move(Place),
    Constant(Box<Constant>),
}

impl Operand {
    pub fn constant(
        ty: Ty,
        kind: ConstKind,
    ) -> Self {
        Operand::Constant(Box::new(Constant { ty, kind }))
    }

    pub fn int(
        ty: Ty,
        value: i128,
    ) -> Self {
        let bits = ty.scalar_bits().unwrap_or(128);
        Operand::constant(ty, ConstKind::Int(truncate(value as u128, bits)))
    }

    pub fn bool(value: bool) -> Self {
        Operand::constant(Ty::Bool, ConstKind::Bool(value))
    }

    pub fn function(id: FnId) -> Self {
        Operand::constant(Ty::FnDef(id), ConstKind::Fn(id))
    }

    pub fn static_ref(
        id: StaticId,
        ty: Ty,
    ) -> Self {
        Operand::constant(ty, ConstKind::Static(id))
    }

    pub fn place(&self) -> Option<&Place> {
        match self {
            Operand::Copy(place) | Operand::Move(place) => Some(place),
            Operand::Constant(_) => None,
        }
    }
}

/// Truncate `value` to its low `bits` bits
pub fn truncate(
    value: u128,
    bits: u32,
) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}

/// Sign-extend the low `bits` bits of `value`
pub fn sign_extend(
    value: u128,
    bits: u32,
) -> i128 {
    if bits >= 128 {
        value as i128
    } else {
        let shift = 128 - bits;
        ((value << shift) as i128) >> shift
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorrowKind {
    Shared,
    Mut,
    /// Borrow used only for match guards; never promotable
    Shallow,
}

impl BorrowKind {
    pub fn to_mutbl_lossy(self) -> Mutability {
        match self {
            BorrowKind::Mut => Mutability::Mut,
            BorrowKind::Shared | BorrowKind::Shallow => Mutability::Not,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    IntToInt,
    IntToFloat,
    FloatToInt,
    FloatToFloat,
    PtrToPtr,
    /// Pointer or function pointer to integer
    PointerExposeAddress,
    PointerFromExposedAddress,
    /// Function item to function pointer
    ReifyFnPointer,
    /// `&[T; N]` to `&[T]`
    Unsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitXor,
    BitAnd,
    BitOr,
    Shl,
    Shr,
    Eq,
    Lt,
    Le,
    Ne,
    Ge,
    Gt,
    Offset,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Lt | BinOp::Le | BinOp::Ne | BinOp::Ge | BinOp::Gt
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Ne => "!=",
            BinOp::Ge => ">=",
            BinOp::Gt => ">",
            BinOp::Offset => "offset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    Tuple,
    Array(Ty),
    Adt {
        adt: AdtId,
        variant: usize,
        /// Set for unions: the single initialized field
        #[serde(default)]
        active_field: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rvalue {
    Use(Operand),
    Repeat(Operand, u64),
    Ref(BorrowKind, Place),
    AddressOf(Mutability, Place),
    ThreadLocalRef(StaticId),
    Len(Place),
    Cast(CastKind, Operand, Ty),
    BinaryOp(BinOp, Box<(Operand, Operand)>),
    /// Produces `(result, overflowed)`
    CheckedBinaryOp(BinOp, Box<(Operand, Operand)>),
    UnaryOp(UnOp, Operand),
    Discriminant(Place),
    Aggregate(AggregateKind, Vec<Operand>),
    /// Fresh heap allocation of the given type
    HeapAlloc(Ty),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Assign(Box<(Place, Rvalue)>),
    StorageLive(Local),
    StorageDead(Local),
    Nop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub source_info: SourceInfo,
    pub kind: StatementKind,
}

impl Statement {
    pub fn assign(
        source_info: SourceInfo,
        place: Place,
        rvalue: Rvalue,
    ) -> Self {
        Self {
            source_info,
            kind: StatementKind::Assign(Box::new((place, rvalue))),
        }
    }

    pub fn make_nop(&mut self) {
        self.kind = StatementKind::Nop;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertKind {
    Overflow(BinOp),
    OverflowNeg,
    DivisionByZero,
    RemainderByZero,
    BoundsCheck,
    Custom(String),
}

impl AssertKind {
    pub fn description(&self) -> String {
        match self {
            AssertKind::Overflow(op) => {
                let verb = match op {
                    BinOp::Add => "add",
                    BinOp::Sub => "subtract",
                    BinOp::Mul => "multiply",
                    BinOp::Div => "divide",
                    BinOp::Rem => "calculate the remainder",
                    BinOp::Shl => "shift left",
                    BinOp::Shr => "shift right",
                    _ => "compute",
                };
                format!("attempt to {} with overflow", verb)
            }
            AssertKind::OverflowNeg => "attempt to negate with overflow".to_string(),
            AssertKind::DivisionByZero => "attempt to divide by zero".to_string(),
            AssertKind::RemainderByZero => {
                "attempt to calculate the remainder with a divisor of zero".to_string()
            }
            AssertKind::BoundsCheck => "index out of bounds".to_string(),
            AssertKind::Custom(msg) => msg.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminatorKind {
    Goto {
        target: BasicBlock,
    },
    SwitchInt {
        discr: Operand,
        #[serde(with = "bits::arms")]
        targets: Vec<(u128, BasicBlock)>,
        otherwise: BasicBlock,
    },
    Return,
    Unreachable,
    Drop {
        place: Place,
        target: BasicBlock,
    },
    Call {
        func: Operand,
        args: Vec<Operand>,
        destination: Place,
        /// `None` for calls that never return
        target: Option<BasicBlock>,
    },
    Assert {
        cond: Operand,
        expected: bool,
        msg: AssertKind,
        target: BasicBlock,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminator {
    #[serde(default)]
    pub source_info: SourceInfo,
    pub kind: TerminatorKind,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BasicBlock> {
        match &self.kind {
            TerminatorKind::Goto { target }
            | TerminatorKind::Drop { target, .. }
            | TerminatorKind::Assert { target, .. } => vec![*target],
            TerminatorKind::SwitchInt {
                targets, otherwise, ..
            } => targets
                .iter()
                .map(|(_, bb)| *bb)
                .chain(std::iter::once(*otherwise))
                .collect(),
            TerminatorKind::Call { target, .. } => target.iter().copied().collect(),
            TerminatorKind::Return | TerminatorKind::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlockData {
    #[serde(default)]
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Fn,
    ConstFn,
    Const,
    Static(Mutability),
}

/// Kind of compile-time context a body is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstContext {
    ConstFn,
    Const,
    Static(Mutability),
}

impl ConstContext {
    /// Const and static initializers: evaluated once, at compile time
    pub fn is_explicit(self) -> bool {
        matches!(self, ConstContext::Const | ConstContext::Static(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodySource {
    /// Name of the item this body belongs to
    pub owner: String,
    pub kind: BodyKind,
    #[serde(default)]
    pub promoted: Option<PromotedId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub source: BodySource,
    pub basic_blocks: Vec<BasicBlockData>,
    /// `local_decls[0]` is the return place, followed by `arg_count` arguments
    pub local_decls: Vec<LocalDecl>,
    #[serde(default)]
    pub arg_count: usize,
    #[serde(default = "default_scopes")]
    pub source_scopes: Vec<SourceScopeData>,
    #[serde(default)]
    pub span: Span,
    /// Bodies extracted from this one by promotion
    #[serde(default)]
    pub promoted: Vec<Body>,
}

fn default_scopes() -> Vec<SourceScopeData> {
    vec![SourceScopeData::outermost(Span::dummy())]
}

/// Type of a place, plus the enum variant selected by a downcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceTy {
    pub ty: Ty,
    pub variant: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TyError {
    #[error("local {0} is not declared")]
    UnknownLocal(Local),
    #[error("cannot dereference a value of type {0}")]
    NotDereferenceable(Ty),
    #[error("type {ty} has no field {field}")]
    NoField { ty: Ty, field: usize },
    #[error("cannot index into a value of type {0}")]
    NotIndexable(Ty),
    #[error("cannot downcast a value of type {0}")]
    NotAnEnum(Ty),
    #[error("{0}")]
    Malformed(String),
}

impl Body {
    pub fn new(
        source: BodySource,
        local_decls: Vec<LocalDecl>,
        arg_count: usize,
        span: Span,
    ) -> Self {
        Self {
            source,
            basic_blocks: Vec::new(),
            local_decls,
            arg_count,
            source_scopes: vec![SourceScopeData::outermost(span)],
            span,
            promoted: Vec::new(),
        }
    }

    pub fn return_ty(&self) -> &Ty {
        &self.local_decls[0].ty
    }

    pub fn local_kind(
        &self,
        local: Local,
    ) -> LocalKind {
        let index = local.index();
        if index == 0 {
            LocalKind::ReturnPointer
        } else if index <= self.arg_count {
            LocalKind::Arg
        } else if self.local_decls[index].user_var {
            LocalKind::Var
        } else {
            LocalKind::Temp
        }
    }

    pub fn locals(&self) -> impl Iterator<Item = Local> {
        (0..self.local_decls.len()).map(Local)
    }

    pub fn push_local(
        &mut self,
        decl: LocalDecl,
    ) -> Local {
        self.local_decls.push(decl);
        Local(self.local_decls.len() - 1)
    }

    pub fn push_block(
        &mut self,
        data: BasicBlockData,
    ) -> BasicBlock {
        self.basic_blocks.push(data);
        BasicBlock(self.basic_blocks.len() - 1)
    }

    pub fn block(
        &self,
        bb: BasicBlock,
    ) -> &BasicBlockData {
        &self.basic_blocks[bb.index()]
    }

    pub fn block_mut(
        &mut self,
        bb: BasicBlock,
    ) -> &mut BasicBlockData {
        &mut self.basic_blocks[bb.index()]
    }

    pub fn const_context(&self) -> Option<ConstContext> {
        match self.source.kind {
            BodyKind::Fn => None,
            BodyKind::ConstFn => Some(ConstContext::ConstFn),
            BodyKind::Const => Some(ConstContext::Const),
            BodyKind::Static(mutbl) => Some(ConstContext::Static(mutbl)),
        }
    }

    pub fn is_promoted(&self) -> bool {
        self.source.promoted.is_some()
    }

    /// Human-readable name, `owner::promoted[N]` for promoted bodies
    pub fn display_name(&self) -> String {
        match self.source.promoted {
            Some(id) => format!("{}::promoted[{}]", self.source.owner, id.0),
            None => self.source.owner.clone(),
        }
    }

    /// Statement at `loc`, `None` when `loc` is the terminator
    pub fn stmt_at(
        &self,
        loc: Location,
    ) -> Option<&Statement> {
        self.block(loc.block).statements.get(loc.statement_index)
    }

    pub fn terminator_loc(
        &self,
        bb: BasicBlock,
    ) -> Location {
        Location::new(bb, self.block(bb).statements.len())
    }

    pub fn source_info(
        &self,
        loc: Location,
    ) -> &SourceInfo {
        let block = self.block(loc.block);
        match block.statements.get(loc.statement_index) {
            Some(stmt) => &stmt.source_info,
            None => &block.terminator.source_info,
        }
    }

    /// Whether `scope` lies inside an `unconst` block
    pub fn in_unconst_scope(
        &self,
        scope: SourceScope,
    ) -> bool {
        let mut current = Some(scope);
        while let Some(s) = current {
            let Some(data) = self.source_scopes.get(s.0) else {
                return false;
            };
            if data.safety == Safety::Unconst {
                return true;
            }
            current = data.parent;
        }
        false
    }

    /// Split `loc.block` before `loc`; the tail (including the terminator)
    /// moves to a new block, which is returned. The head keeps a `Goto`.
    pub fn split_block(
        &mut self,
        loc: Location,
    ) -> BasicBlock {
        let head = self.block_mut(loc.block);
        let tail_statements = head.statements.split_off(loc.statement_index);
        let source_info = head.terminator.source_info;
        let tail_terminator = std::mem::replace(
            &mut head.terminator,
            Terminator {
                source_info,
                kind: TerminatorKind::Unreachable,
            },
        );
        let tail = self.push_block(BasicBlockData {
            statements: tail_statements,
            terminator: tail_terminator,
        });
        self.block_mut(loc.block).terminator.kind = TerminatorKind::Goto { target: tail };
        tail
    }

    pub fn try_place_ty(
        &self,
        module: &ModuleIR,
        place: &Place,
    ) -> Result<PlaceTy, TyError> {
        let decl = self
            .local_decls
            .get(place.local.index())
            .ok_or(TyError::UnknownLocal(place.local))?;
        let mut place_ty = PlaceTy {
            ty: decl.ty.clone(),
            variant: None,
        };
        for elem in &place.projection {
            place_ty = project_ty(module, place_ty, elem)?;
        }
        Ok(place_ty)
    }

    /// Type of `place`. The IR is verified on load, so failure here is a
    /// bug in whatever produced the body.
    pub fn place_ty(
        &self,
        module: &ModuleIR,
        place: &Place,
    ) -> Ty {
        match self.try_place_ty(module, place) {
            Ok(place_ty) => place_ty.ty,
            Err(err) => panic!("malformed IR in `{}`: {}", self.display_name(), err),
        }
    }

    pub fn operand_ty(
        &self,
        module: &ModuleIR,
        operand: &Operand,
    ) -> Ty {
        match operand {
            Operand::Copy(place) | Operand::Move(place) => self.place_ty(module, place),
            Operand::Constant(c) => c.ty.clone(),
        }
    }

    pub fn rvalue_ty(
        &self,
        module: &ModuleIR,
        rvalue: &Rvalue,
    ) -> Ty {
        match rvalue {
            Rvalue::Use(operand) => self.operand_ty(module, operand),
            Rvalue::Repeat(operand, count) => {
                Ty::Array(Box::new(self.operand_ty(module, operand)), *count)
            }
            Rvalue::Ref(kind, place) => {
                Ty::Ref(kind.to_mutbl_lossy(), Box::new(self.place_ty(module, place)))
            }
            Rvalue::AddressOf(mutbl, place) => {
                Ty::RawPtr(*mutbl, Box::new(self.place_ty(module, place)))
            }
            Rvalue::ThreadLocalRef(id) => {
                let def = module.static_def(*id);
                match def.mutability {
                    Mutability::Mut => Ty::RawPtr(Mutability::Mut, Box::new(def.ty.clone())),
                    Mutability::Not => Ty::shared_ref(def.ty.clone()),
                }
            }
            Rvalue::Len(_) => Ty::usize(),
            Rvalue::Cast(_, _, ty) => ty.clone(),
            Rvalue::BinaryOp(op, operands) => {
                if op.is_comparison() {
                    Ty::Bool
                } else {
                    self.operand_ty(module, &operands.0)
                }
            }
            Rvalue::CheckedBinaryOp(_, operands) => {
                Ty::Tuple(vec![self.operand_ty(module, &operands.0), Ty::Bool])
            }
            Rvalue::UnaryOp(_, operand) => self.operand_ty(module, operand),
            Rvalue::Discriminant(_) => Ty::Int(crate::middle::ty::IntTy::Isize),
            Rvalue::Aggregate(kind, operands) => match kind {
                AggregateKind::Tuple => Ty::Tuple(
                    operands
                        .iter()
                        .map(|op| self.operand_ty(module, op))
                        .collect(),
                ),
                AggregateKind::Array(elem) => Ty::Array(Box::new(elem.clone()), operands.len() as u64),
                AggregateKind::Adt { adt, .. } => Ty::Adt(*adt),
            },
            Rvalue::HeapAlloc(ty) => Ty::RawPtr(Mutability::Mut, Box::new(ty.clone())),
        }
    }
}

fn project_ty(
    module: &ModuleIR,
    base: PlaceTy,
    elem: &ProjectionElem,
) -> Result<PlaceTy, TyError> {
    match elem {
        ProjectionElem::Deref => match base.ty.builtin_deref() {
            Some(pointee) => Ok(PlaceTy {
                ty: pointee.clone(),
                variant: None,
            }),
            None => Err(TyError::NotDereferenceable(base.ty)),
        },
        ProjectionElem::Field(index) => {
            let fields = module
                .field_tys(&base.ty, base.variant)
                .ok_or_else(|| TyError::NoField {
                    ty: base.ty.clone(),
                    field: *index,
                })?;
            match fields.get(*index) {
                Some(ty) => Ok(PlaceTy {
                    ty: ty.clone(),
                    variant: None,
                }),
                None => Err(TyError::NoField {
                    ty: base.ty,
                    field: *index,
                }),
            }
        }
        ProjectionElem::Index(_) | ProjectionElem::ConstantIndex(_) => {
            match base.ty.sequence_element() {
                Some(elem) if !matches!(base.ty, Ty::Str) => Ok(PlaceTy {
                    ty: elem,
                    variant: None,
                }),
                _ => Err(TyError::NotIndexable(base.ty)),
            }
        }
        ProjectionElem::Downcast(variant) => match &base.ty {
            Ty::Adt(id) if module.adt(*id).is_enum() => Ok(PlaceTy {
                ty: base.ty.clone(),
                variant: Some(*variant),
            }),
            _ => Err(TyError::NotAnEnum(base.ty)),
        },
    }
}

/// Structural check run when a module is loaded: every local, block and
/// projection mentioned by a body must exist and type-check.
pub fn verify_body(
    module: &ModuleIR,
    body: &Body,
) -> Result<(), TyError> {
    use crate::middle::visit::{PlaceContext, Visitor};

    struct Verifier<'a> {
        module: &'a ModuleIR,
        body: &'a Body,
        error: Option<TyError>,
    }

    impl Visitor for Verifier<'_> {
        fn visit_place(
            &mut self,
            place: &Place,
            _context: PlaceContext,
            _location: Location,
        ) {
            if self.error.is_some() {
                return;
            }
            if let Err(err) = self.body.try_place_ty(self.module, place) {
                self.error = Some(err);
                return;
            }
            for elem in &place.projection {
                if let ProjectionElem::Index(index) = elem {
                    if index.index() >= self.body.local_decls.len() {
                        self.error = Some(TyError::UnknownLocal(*index));
                    }
                }
            }
        }

        fn visit_operand(
            &mut self,
            operand: &Operand,
            location: Location,
        ) {
            if let Operand::Constant(c) = operand {
                let known = match c.kind {
                    ConstKind::Fn(id) => id.0 < self.module.functions.len(),
                    ConstKind::Static(id) => id.0 < self.module.statics.len(),
                    ConstKind::Promoted(id) => id.0 < self.body.promoted.len(),
                    _ => true,
                };
                if !known && self.error.is_none() {
                    self.error = Some(TyError::Malformed(format!(
                        "constant refers to a missing item: {:?}",
                        c.kind
                    )));
                }
            }
            self.super_operand(operand, location);
        }

        fn visit_local(
            &mut self,
            local: Local,
            _context: PlaceContext,
            _location: Location,
        ) {
            if self.error.is_none() && local.index() >= self.body.local_decls.len() {
                self.error = Some(TyError::UnknownLocal(local));
            }
        }
    }

    if body.local_decls.is_empty() || body.arg_count >= body.local_decls.len() {
        return Err(TyError::Malformed(format!(
            "`{}` declares {} locals for {} arguments",
            body.display_name(),
            body.local_decls.len(),
            body.arg_count
        )));
    }
    for (index, block) in body.basic_blocks.iter().enumerate() {
        for succ in block.terminator.successors() {
            if succ.index() >= body.basic_blocks.len() {
                return Err(TyError::Malformed(format!(
                    "bb{} jumps to missing block {}",
                    index, succ
                )));
            }
        }
    }

    let mut verifier = Verifier {
        module,
        body,
        error: None,
    };
    verifier.visit_body(body);
    match verifier.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
