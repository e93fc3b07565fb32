#![forbid(unsafe_code)]

//! Intermediate language and data model shared by the checker and the
//! decision procedures: symbols, base types, index terms, resources,
//! specification telescopes and the pure/impure expression trees.

use miette::SourceSpan;

pub mod expr;
pub mod resource;
pub mod spec;
pub mod symbol;
pub mod term;
pub mod types;

pub use expr::{
    Action, Binop, Ctor, Expr, ExprKind, LabelDef, Lit, MemType, PExpr, PExprKind, Pattern,
    PatternKind,
};
pub use resource::{BlockKind, Resource};
pub use spec::{
    Access, FunctionSpec, GlobalDecl, PredicateDef, ReturnType, StructLayout, StructPiece, Tail,
    Telescope,
};
pub use symbol::Symbol;
pub use term::{ArithOp, CmpOp, IndexTerm, Subst, Term};
pub use types::{BaseType, Member, Sort, Tag};

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

/// Span used for nodes synthesised by the checker itself.
pub fn no_span() -> Span {
    span(0, 0)
}
