#![forbid(unsafe_code)]

//! Pure and impure expression trees of the intermediate language.

use crate::spec::Telescope;
use crate::symbol::Symbol;
use crate::types::{BaseType, Member, Tag};
use crate::{Span, no_span};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lit {
    Unit,
    Bool(bool),
    Int(i128),
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ctor {
    Nil(BaseType),
    Cons,
    Tuple,
    Struct { tag: Tag, members: Vec<Member> },
    /// Single-field wrapper with no run-time content of its own.
    Specified,
    /// Array values are not supported by the checker.
    Array(BaseType),
}

/// Memory type of a load, store or allocation: value type plus layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemType {
    pub bt: BaseType,
    pub size: u64,
    pub align: u64,
}

impl MemType {
    pub fn new(bt: BaseType, size: u64, align: u64) -> Self {
        Self { bt, size, align }
    }

    pub fn int(size: u64) -> Self {
        Self::new(BaseType::Integer, size, size)
    }

    pub fn pointer() -> Self {
        Self::new(BaseType::Pointer, 8, 8)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternKind {
    /// `_` when the name is absent.
    Bind(Option<Symbol>),
    Nil,
    Cons(Box<Pattern>, Box<Pattern>),
    Tuple(Vec<Pattern>),
    Specified(Box<Pattern>),
    Array(Vec<Pattern>),
    /// Constructor of a user datatype.
    Ctor(String, Vec<Pattern>),
}

impl Pattern {
    pub fn new(kind: PatternKind) -> Self {
        Self {
            span: no_span(),
            kind,
        }
    }

    pub fn bind(s: Symbol) -> Self {
        Self::new(PatternKind::Bind(Some(s)))
    }

    pub fn wildcard() -> Self {
        Self::new(PatternKind::Bind(None))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PExpr {
    pub span: Span,
    pub kind: PExprKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PExprKind {
    Sym(Symbol),
    Lit(Lit),
    Ctor {
        ctor: Ctor,
        args: Vec<PExpr>,
    },
    Binop {
        op: Binop,
        left: Box<PExpr>,
        right: Box<PExpr>,
    },
    Not(Box<PExpr>),
    /// `base + index * elem_size`
    ArrayShift {
        base: Box<PExpr>,
        elem_size: u64,
        index: Box<PExpr>,
    },
    /// Address of `member` inside the struct at `base`.
    MemberShift {
        base: Box<PExpr>,
        tag: Tag,
        member: Member,
    },
    StructMember {
        value: Box<PExpr>,
        member: Member,
    },
    Let {
        pat: Pattern,
        value: Box<PExpr>,
        body: Box<PExpr>,
    },
    If {
        cond: Box<PExpr>,
        then_branch: Box<PExpr>,
        else_branch: Box<PExpr>,
    },
    Case {
        scrutinee: Box<PExpr>,
        arms: Vec<(Pattern, PExpr)>,
    },
    Undef(String),
    Error(String),
}

impl PExpr {
    pub fn new(kind: PExprKind) -> Self {
        Self {
            span: no_span(),
            kind,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn sym(s: &Symbol) -> Self {
        Self::new(PExprKind::Sym(s.clone()))
    }

    pub fn int(n: i128) -> Self {
        Self::new(PExprKind::Lit(Lit::Int(n)))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(PExprKind::Lit(Lit::Bool(b)))
    }

    pub fn unit() -> Self {
        Self::new(PExprKind::Lit(Lit::Unit))
    }

    pub fn binop(op: Binop, left: PExpr, right: PExpr) -> Self {
        Self::new(PExprKind::Binop {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn if_(cond: PExpr, then_branch: PExpr, else_branch: PExpr) -> Self {
        Self::new(PExprKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Create { ty: MemType },
    Kill { ty: MemType, pointer: PExpr },
    Store { ty: MemType, pointer: PExpr, value: PExpr },
    Load { ty: MemType, pointer: PExpr },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Pure(PExpr),
    Action(Action),
    Skip,
    Call {
        func: Symbol,
        args: Vec<PExpr>,
    },
    Let {
        pat: Pattern,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Run `first` for its effects, then `second`.
    Seq {
        first: Box<Expr>,
        second: Box<Expr>,
    },
    If {
        cond: PExpr,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Case {
        scrutinee: PExpr,
        arms: Vec<(Pattern, Expr)>,
    },
    /// Jump to a label.
    Run {
        label: Symbol,
        args: Vec<PExpr>,
    },
    Return(PExpr),
    Assert(PExpr),
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            span: no_span(),
            kind,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn pure(pe: PExpr) -> Self {
        Self::new(ExprKind::Pure(pe))
    }

    pub fn action(action: Action) -> Self {
        Self::new(ExprKind::Action(action))
    }

    pub fn let_(pat: Pattern, value: Expr, body: Expr) -> Self {
        Self::new(ExprKind::Let {
            pat,
            value: Box::new(value),
            body: Box::new(body),
        })
    }

    pub fn seq(first: Expr, second: Expr) -> Self {
        Self::new(ExprKind::Seq {
            first: Box::new(first),
            second: Box::new(second),
        })
    }
}

/// Label of a procedure body, e.g. a loop head. The telescope ends in
/// `Tail::NoReturn`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelDef {
    pub name: Symbol,
    pub telescope: Telescope,
    pub body: Expr,
}
