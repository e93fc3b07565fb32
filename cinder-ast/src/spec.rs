#![forbid(unsafe_code)]

//! Specification telescopes and the global declarations that carry them.

use crate::expr::MemType;
use crate::resource::Resource;
use crate::symbol::Symbol;
use crate::term::{IndexTerm, Subst};
use crate::types::{BaseType, Member, Sort, Tag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnType {
    pub ret: (Symbol, BaseType),
    pub logical: Vec<(Symbol, Sort)>,
    pub resources: Vec<Resource>,
    pub constraints: Vec<IndexTerm>,
}

impl ReturnType {
    pub fn new(ret: Symbol, bt: BaseType) -> Self {
        Self {
            ret: (ret, bt),
            logical: Vec::new(),
            resources: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn logical(mut self, s: Symbol, sort: Sort) -> Self {
        self.logical.push((s, sort));
        self
    }

    pub fn resource(mut self, r: Resource) -> Self {
        self.resources.push(r);
        self
    }

    pub fn constraint(mut self, c: IndexTerm) -> Self {
        self.constraints.push(c);
        self
    }

    pub fn ret_term(&self) -> IndexTerm {
        IndexTerm::sym(self.ret.0.clone(), self.ret.1.clone())
    }

    pub fn subst(&self, s: &Subst) -> ReturnType {
        ReturnType {
            ret: self.ret.clone(),
            logical: self.logical.clone(),
            resources: self.resources.iter().map(|r| r.subst(s)).collect(),
            constraints: self.constraints.iter().map(|c| c.subst(s)).collect(),
        }
    }

    /// Rename the return value and every logical binder to fresh symbols.
    pub fn freshen(&self) -> ReturnType {
        let mut s = Subst::new();
        let ret = self.ret.0.fresh_like();
        s.insert(
            self.ret.0.clone(),
            IndexTerm::sym(ret.clone(), self.ret.1.clone()),
        );
        let logical = rename_binders(&self.logical, &mut s);
        let mut out = self.subst(&s);
        out.ret = (ret, self.ret.1.clone());
        out.logical = logical;
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tail {
    Return(ReturnType),
    /// Output arguments of a predicate pack clause.
    Outputs(Vec<IndexTerm>),
    /// Labels and loop continuations never return.
    NoReturn,
}

impl Tail {
    pub fn subst(&self, s: &Subst) -> Tail {
        match self {
            Tail::Return(rt) => Tail::Return(rt.subst(s)),
            Tail::Outputs(ts) => Tail::Outputs(ts.iter().map(|t| t.subst(s)).collect()),
            Tail::NoReturn => Tail::NoReturn,
        }
    }

    fn freshen(&self) -> Tail {
        match self {
            Tail::Return(rt) => Tail::Return(rt.freshen()),
            other => other.clone(),
        }
    }
}

/// Ordered computational arguments, logical variables, resources and
/// constraints, closed by a tail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Telescope {
    pub computational: Vec<(Symbol, BaseType)>,
    pub logical: Vec<(Symbol, Sort)>,
    pub resources: Vec<Resource>,
    pub constraints: Vec<IndexTerm>,
    pub tail: Tail,
}

impl Telescope {
    pub fn new(tail: Tail) -> Self {
        Self {
            computational: Vec::new(),
            logical: Vec::new(),
            resources: Vec::new(),
            constraints: Vec::new(),
            tail,
        }
    }

    pub fn returning(rt: ReturnType) -> Self {
        Self::new(Tail::Return(rt))
    }

    pub fn arg(mut self, s: Symbol, bt: BaseType) -> Self {
        self.computational.push((s, bt));
        self
    }

    pub fn logical(mut self, s: Symbol, sort: Sort) -> Self {
        self.logical.push((s, sort));
        self
    }

    pub fn resource(mut self, r: Resource) -> Self {
        self.resources.push(r);
        self
    }

    pub fn constraint(mut self, c: IndexTerm) -> Self {
        self.constraints.push(c);
        self
    }

    pub fn return_type(&self) -> Option<&ReturnType> {
        match &self.tail {
            Tail::Return(rt) => Some(rt),
            _ => None,
        }
    }

    /// Apply `s` to everything after the binders.
    pub fn subst(&self, s: &Subst) -> Telescope {
        Telescope {
            computational: self.computational.clone(),
            logical: self.logical.clone(),
            resources: self.resources.iter().map(|r| r.subst(s)).collect(),
            constraints: self.constraints.iter().map(|c| c.subst(s)).collect(),
            tail: self.tail.subst(s),
        }
    }

    /// Alpha-rename every binder, including those of the return type.
    pub fn freshen(&self) -> Telescope {
        let mut s = Subst::new();
        let computational = rename_binders(&self.computational, &mut s);
        let logical = rename_binders(&self.logical, &mut s);
        let mut out = self.subst(&s);
        out.computational = computational;
        out.logical = logical;
        out.tail = out.tail.freshen();
        out
    }
}

fn rename_binders(binders: &[(Symbol, BaseType)], s: &mut Subst) -> Vec<(Symbol, BaseType)> {
    binders
        .iter()
        .map(|(x, bt)| {
            let y = x.fresh_like();
            s.insert(x.clone(), IndexTerm::sym(y.clone(), bt.clone()));
            (y, bt.clone())
        })
        .collect()
}

/// Resource predicate definition.
///
/// Pack clauses take the input arguments as computational formals and end
/// in `Tail::Outputs`. Unpack clauses take inputs followed by outputs as
/// computational formals; their logical variables, resources and
/// constraints are what a packed instance stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredicateDef {
    pub name: String,
    pub iargs: Vec<BaseType>,
    pub oargs: Vec<BaseType>,
    pub pack: Vec<Telescope>,
    pub unpack: Vec<Telescope>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructPiece {
    pub offset: u64,
    pub size: u64,
    /// `None` marks padding.
    pub member: Option<(Member, MemType)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructLayout {
    pub tag: Tag,
    pub size: u64,
    pub align: u64,
    pub pieces: Vec<StructPiece>,
}

impl StructLayout {
    pub fn members(&self) -> impl Iterator<Item = (u64, &Member, &MemType)> {
        self.pieces.iter().filter_map(|p| {
            p.member
                .as_ref()
                .map(|(name, ty)| (p.offset, name, ty))
        })
    }

    pub fn member(&self, name: &str) -> Option<(u64, &MemType)> {
        self.members()
            .find(|(_, m, _)| m.as_str() == name)
            .map(|(offset, _, ty)| (offset, ty))
    }
}

/// A global variable. `address` is bound as a logical pointer in every check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalDecl {
    pub address: Symbol,
    pub ty: MemType,
}

/// `accesses g` clause: the function owns `g` on entry and hands it back on exit.
///
/// `pre_value` names the value on entry and may appear in the precondition
/// and the return type; `post_value` names the value on exit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Access {
    pub global: Symbol,
    pub pre_value: Symbol,
    pub post_value: Symbol,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSpec {
    pub telescope: Telescope,
    pub accesses: Vec<Access>,
}

impl FunctionSpec {
    pub fn new(telescope: Telescope) -> Self {
        Self {
            telescope,
            accesses: Vec::new(),
        }
    }

    pub fn accesses(mut self, access: Access) -> Self {
        self.accesses.push(access);
        self
    }
}
