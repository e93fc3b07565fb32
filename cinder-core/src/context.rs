#![forbid(unsafe_code)]

//! Local typing context.
//!
//! An ordered, persistent list of bindings and markers, oldest first. Every
//! operation returns a new context and leaves the old one intact, so
//! branching and backtracking only ever hold on to older values.

use cinder_ast::{BaseType, IndexTerm, Resource, Sort, Span, Symbol};
use im_rc::Vector;

use crate::error::{ErrorKind, TypeError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Program variable, aliased to the logical variable holding its value.
    Computational { logical: Symbol, bt: BaseType },
    Logical(Sort),
    Resource(Resource),
    /// Consumed resource, kept with the locations that consumed it.
    UsedResource(Resource, Vec<Span>),
    Constraint(IndexTerm),
}

impl Binding {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Binding::Computational { .. } => "computational variable",
            Binding::Logical(_) => "logical variable",
            Binding::Resource(_) => "resource",
            Binding::UsedResource(..) => "used resource",
            Binding::Constraint(_) => "constraint",
        }
    }

    /// Same meaning in two branches that started from one context.
    ///
    /// Live resources must be identical, not merely unifiable: both sides
    /// descend from the same bindings, so a differing resource means one
    /// branch rewrote it.
    fn merge(&self, other: &Binding) -> Option<Binding> {
        match (self, other) {
            (Binding::UsedResource(r1, l1), Binding::UsedResource(r2, l2)) if r1 == r2 => {
                let mut locs = l1.clone();
                for l in l2 {
                    if !locs.contains(l) {
                        locs.push(*l);
                    }
                }
                Some(Binding::UsedResource(r1.clone(), locs))
            }
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Entry {
    Marker,
    Bound(Symbol, Binding),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    entries: Vector<Entry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, markers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, s: &Symbol) -> Option<usize> {
        self.entries.iter().rposition(|e| match e {
            Entry::Bound(x, _) => x == s,
            Entry::Marker => false,
        })
    }

    pub fn get(&self, s: &Symbol) -> Option<&Binding> {
        self.position(s).and_then(|i| match self.entries.get(i) {
            Some(Entry::Bound(_, b)) => Some(b),
            _ => None,
        })
    }

    pub fn lookup(&self, s: &Symbol, span: Span) -> Result<&Binding, TypeError> {
        self.get(s).ok_or_else(|| {
            TypeError::new(
                ErrorKind::UnboundName {
                    name: s.to_string(),
                },
                span,
            )
        })
    }

    pub fn is_bound(&self, s: &Symbol) -> bool {
        self.position(s).is_some()
    }

    pub fn add(&self, s: Symbol, binding: Binding, span: Span) -> Result<Context, TypeError> {
        if self.is_bound(&s) {
            return Err(TypeError::new(
                ErrorKind::NameBoundTwice {
                    name: s.to_string(),
                },
                span,
            ));
        }
        let mut entries = self.entries.clone();
        entries.push_back(Entry::Bound(s, binding));
        Ok(Context { entries })
    }

    pub fn add_logical(&self, s: Symbol, sort: Sort, span: Span) -> Result<Context, TypeError> {
        self.add(s, Binding::Logical(sort), span)
    }

    pub fn add_computational(
        &self,
        s: Symbol,
        logical: Symbol,
        bt: BaseType,
        span: Span,
    ) -> Result<Context, TypeError> {
        self.add(s, Binding::Computational { logical, bt }, span)
    }

    /// Bind `r` under a fresh name.
    pub fn add_resource(&self, r: Resource) -> (Symbol, Context) {
        let s = Symbol::fresh("r");
        let mut entries = self.entries.clone();
        entries.push_back(Entry::Bound(s.clone(), Binding::Resource(r)));
        (s, Context { entries })
    }

    pub fn add_constraint(&self, lc: IndexTerm) -> Context {
        if lc.is_true() {
            return self.clone();
        }
        let mut entries = self.entries.clone();
        entries.push_back(Entry::Bound(Symbol::fresh("lc"), Binding::Constraint(lc)));
        Context { entries }
    }

    pub fn remove(&self, s: &Symbol, span: Span) -> Result<Context, TypeError> {
        let i = self.position(s).ok_or_else(|| {
            TypeError::new(
                ErrorKind::UnboundName {
                    name: s.to_string(),
                },
                span,
            )
        })?;
        let mut entries = self.entries.clone();
        entries.remove(i);
        Ok(Context { entries })
    }

    pub fn mark(&self) -> Context {
        let mut entries = self.entries.clone();
        entries.push_back(Entry::Marker);
        Context { entries }
    }

    /// Bindings added since the most recent marker, oldest first, and the
    /// context as it was before that marker.
    pub fn since(&self) -> Result<(Vec<(Symbol, Binding)>, Context), TypeError> {
        let i = self
            .entries
            .iter()
            .rposition(|e| matches!(e, Entry::Marker))
            .ok_or_else(|| TypeError::internal("context has no marker", cinder_ast::no_span()))?;
        let (before, after) = self.entries.clone().split_at(i);
        let bindings = after
            .iter()
            .filter_map(|e| match e {
                Entry::Bound(s, b) => Some((s.clone(), b.clone())),
                Entry::Marker => None,
            })
            .collect();
        Ok((bindings, Context { entries: before }))
    }

    /// Flag a live resource as consumed at `locations`.
    pub fn use_resource(
        &self,
        s: &Symbol,
        locations: Vec<Span>,
        span: Span,
    ) -> Result<Context, TypeError> {
        let i = self.position(s).ok_or_else(|| {
            TypeError::new(
                ErrorKind::UnboundName {
                    name: s.to_string(),
                },
                span,
            )
        })?;
        let resource = match self.entries.get(i) {
            Some(Entry::Bound(_, Binding::Resource(r))) => r.clone(),
            Some(Entry::Bound(_, other)) => {
                return Err(TypeError::new(
                    ErrorKind::KindMismatch {
                        name: s.to_string(),
                        expected: "resource",
                        found: other.kind_name(),
                    },
                    span,
                ));
            }
            _ => return Err(TypeError::internal("marker at binding position", span)),
        };
        let mut entries = self.entries.clone();
        entries.set(
            i,
            Entry::Bound(s.clone(), Binding::UsedResource(resource, locations)),
        );
        Ok(Context { entries })
    }

    fn bound(&self) -> impl Iterator<Item = (&Symbol, &Binding)> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Bound(s, b) => Some((s, b)),
            Entry::Marker => None,
        })
    }

    pub fn all_resources(&self) -> Vec<(Symbol, Resource)> {
        self.bound()
            .filter_map(|(s, b)| match b {
                Binding::Resource(r) => Some((s.clone(), r.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn all_used_resources(&self) -> Vec<(Symbol, Resource, Vec<Span>)> {
        self.bound()
            .filter_map(|(s, b)| match b {
                Binding::UsedResource(r, locs) => Some((s.clone(), r.clone(), locs.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn all_constraints(&self) -> Vec<IndexTerm> {
        self.bound()
            .filter_map(|(_, b)| match b {
                Binding::Constraint(lc) => Some(lc.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(name, logical alias, type)` of every program variable.
    pub fn all_computational(&self) -> Vec<(Symbol, Symbol, BaseType)> {
        self.bound()
            .filter_map(|(s, b)| match b {
                Binding::Computational { logical, bt } => {
                    Some((s.clone(), logical.clone(), bt.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn all_logical(&self) -> Vec<(Symbol, Sort)> {
        self.bound()
            .filter_map(|(s, b)| match b {
                Binding::Logical(sort) => Some((s.clone(), sort.clone())),
                _ => None,
            })
            .collect()
    }

    /// Everything except resources and markers.
    pub fn pure_part(&self) -> Context {
        let entries = self
            .entries
            .iter()
            .filter(|e| match e {
                Entry::Bound(_, Binding::Resource(_) | Binding::UsedResource(..)) => false,
                Entry::Bound(..) => true,
                Entry::Marker => false,
            })
            .cloned()
            .collect();
        Context { entries }
    }

    /// Join two contexts that branched from a common ancestor.
    ///
    /// Both must have the same shape; consumption locations of used
    /// resources are combined.
    pub fn merge(&self, other: &Context, span: Span) -> Result<Context, TypeError> {
        let incompatible = |reason: String| {
            TypeError::new(ErrorKind::IncompatibleEnvironments { reason }, span)
        };
        if self.entries.len() != other.entries.len() {
            return Err(incompatible(format!(
                "{} entries against {}",
                self.entries.len(),
                other.entries.len()
            )));
        }
        let mut entries = Vector::new();
        for (a, b) in self.entries.iter().zip(other.entries.iter()) {
            let merged = match (a, b) {
                (Entry::Marker, Entry::Marker) => Entry::Marker,
                (Entry::Bound(s1, b1), Entry::Bound(s2, b2)) if s1 == s2 => {
                    let merged = b1.merge(b2).ok_or_else(|| {
                        incompatible(format!(
                            "`{s1}` is a {} on one path and a {} on the other",
                            b1.kind_name(),
                            b2.kind_name()
                        ))
                    })?;
                    Entry::Bound(s1.clone(), merged)
                }
                _ => return Err(incompatible("binding lists differ in shape".to_string())),
            };
            entries.push_back(merged);
        }
        Ok(Context { entries })
    }
}
