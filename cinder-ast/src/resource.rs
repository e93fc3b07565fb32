#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use crate::symbol::Symbol;
use crate::term::{IndexTerm, Subst};

/// What an untyped byte range may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Allocated but never written. Reads are uninitialised reads.
    Uninit,
    /// Struct padding. Never readable.
    Padding,
    /// Owned but carrying no value at all. Never readable.
    Nothing,
}

/// Ownership assertion over a memory footprint.
///
/// Pointee and content are terms rather than bare symbols so a formal
/// resource in a telescope can be unified against a concrete one by
/// binding its still-unresolved logical slots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Points {
        pointer: IndexTerm,
        pointee: IndexTerm,
        size: u64,
    },
    Block {
        pointer: IndexTerm,
        size: IndexTerm,
        kind: BlockKind,
    },
    Region {
        pointer: IndexTerm,
        size: IndexTerm,
    },
    Array {
        pointer: IndexTerm,
        element_size: u64,
        length: IndexTerm,
        /// Integer-indexed map from element index to element value.
        content: IndexTerm,
    },
    Predicate {
        name: String,
        iargs: Vec<IndexTerm>,
        oargs: Vec<IndexTerm>,
    },
}

impl Resource {
    pub fn points(pointer: IndexTerm, pointee: IndexTerm, size: u64) -> Self {
        Resource::Points {
            pointer,
            pointee,
            size,
        }
    }

    pub fn block(pointer: IndexTerm, size: u64, kind: BlockKind) -> Self {
        Resource::Block {
            pointer,
            size: IndexTerm::int(i128::from(size)),
            kind,
        }
    }

    pub fn region(pointer: IndexTerm, size: IndexTerm) -> Self {
        Resource::Region { pointer, size }
    }

    pub fn pointer(&self) -> Option<&IndexTerm> {
        match self {
            Resource::Points { pointer, .. }
            | Resource::Block { pointer, .. }
            | Resource::Region { pointer, .. }
            | Resource::Array { pointer, .. } => Some(pointer),
            Resource::Predicate { .. } => None,
        }
    }

    /// Start address and byte size of the memory this resource covers.
    ///
    /// Predicates have no footprint until they are unpacked.
    pub fn footprint(&self) -> Option<(IndexTerm, IndexTerm)> {
        match self {
            Resource::Points { pointer, size, .. } => {
                Some((pointer.clone(), IndexTerm::int(i128::from(*size))))
            }
            Resource::Block { pointer, size, .. } | Resource::Region { pointer, size } => {
                Some((pointer.clone(), size.clone()))
            }
            Resource::Array {
                pointer,
                element_size,
                length,
                ..
            } => Some((
                pointer.clone(),
                IndexTerm::mul(IndexTerm::int(i128::from(*element_size)), length.clone()),
            )),
            Resource::Predicate { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Resource::Points { .. } => "points",
            Resource::Block { .. } => "block",
            Resource::Region { .. } => "region",
            Resource::Array { .. } => "array",
            Resource::Predicate { .. } => "predicate",
        }
    }

    pub fn subst(&self, s: &Subst) -> Resource {
        match self {
            Resource::Points {
                pointer,
                pointee,
                size,
            } => Resource::Points {
                pointer: pointer.subst(s),
                pointee: pointee.subst(s),
                size: *size,
            },
            Resource::Block {
                pointer,
                size,
                kind,
            } => Resource::Block {
                pointer: pointer.subst(s),
                size: size.subst(s),
                kind: *kind,
            },
            Resource::Region { pointer, size } => Resource::Region {
                pointer: pointer.subst(s),
                size: size.subst(s),
            },
            Resource::Array {
                pointer,
                element_size,
                length,
                content,
            } => Resource::Array {
                pointer: pointer.subst(s),
                element_size: *element_size,
                length: length.subst(s),
                content: content.subst(s),
            },
            Resource::Predicate { name, iargs, oargs } => Resource::Predicate {
                name: name.clone(),
                iargs: iargs.iter().map(|t| t.subst(s)).collect(),
                oargs: oargs.iter().map(|t| t.subst(s)).collect(),
            },
        }
    }

    /// Terms whose symbols must be known before the resource can be searched for.
    pub fn inputs(&self) -> Vec<&IndexTerm> {
        match self {
            Resource::Points { pointer, .. } => vec![pointer],
            Resource::Block { pointer, size, .. } | Resource::Region { pointer, size } => {
                vec![pointer, size]
            }
            Resource::Array {
                pointer, length, ..
            } => vec![pointer, length],
            Resource::Predicate { iargs, .. } => iargs.iter().collect(),
        }
    }

    /// Terms the search produces; these may bind logical slots.
    pub fn outputs(&self) -> Vec<&IndexTerm> {
        match self {
            Resource::Points { pointee, .. } => vec![pointee],
            Resource::Block { .. } | Resource::Region { .. } => Vec::new(),
            Resource::Array { content, .. } => vec![content],
            Resource::Predicate { oargs, .. } => oargs.iter().collect(),
        }
    }

    pub fn free_vars(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        for t in self.inputs().into_iter().chain(self.outputs()) {
            t.collect_free_vars(&mut out);
        }
        out
    }
}

fn args(f: &mut fmt::Formatter<'_>, items: &[IndexTerm]) -> fmt::Result {
    for (i, t) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{t}")?;
    }
    Ok(())
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Points {
                pointer,
                pointee,
                size,
            } => write!(f, "{pointer} |-({size})-> {pointee}"),
            Resource::Block {
                pointer,
                size,
                kind,
            } => write!(f, "block<{kind:?}>({pointer}, {size})"),
            Resource::Region { pointer, size } => write!(f, "region({pointer}, {size})"),
            Resource::Array {
                pointer,
                element_size,
                length,
                content,
            } => write!(f, "array({pointer}, {element_size} x {length}) = {content}"),
            Resource::Predicate { name, iargs, oargs } => {
                write!(f, "{name}(")?;
                args(f, iargs)?;
                if !oargs.is_empty() {
                    write!(f, "; ")?;
                    args(f, oargs)?;
                }
                write!(f, ")")
            }
        }
    }
}
