#![forbid(unsafe_code)]

//! Joining control-flow paths.

use cinder_ast::{IndexTerm, Resource, ReturnType, Span, Subst, Symbol};

use crate::context::Context;
use crate::error::{ErrorKind, TypeError};

/// Whether control reaches a point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fallible<T> {
    Normal(T),
    Unreachable,
}

impl<T> Fallible<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fallible<U> {
        match self {
            Fallible::Normal(x) => Fallible::Normal(f(x)),
            Fallible::Unreachable => Fallible::Unreachable,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Fallible::Unreachable)
    }

    pub fn normal(self) -> Option<T> {
        match self {
            Fallible::Normal(x) => Some(x),
            Fallible::Unreachable => None,
        }
    }
}

/// Join the contexts of several paths, ignoring the ones that never finish.
pub fn merge_paths(paths: Vec<Fallible<Context>>, span: Span) -> Result<Fallible<Context>, TypeError> {
    let mut merged: Option<Context> = None;
    for ctx in paths.into_iter().filter_map(Fallible::normal) {
        merged = Some(match merged {
            None => ctx,
            Some(acc) => acc.merge(&ctx, span)?,
        });
    }
    Ok(merged.map_or(Fallible::Unreachable, Fallible::Normal))
}

fn rename_apart(rt: &ReturnType, ret: &Symbol) -> ReturnType {
    let rt = rt.freshen();
    let mut s = Subst::new();
    s.insert(rt.ret.0.clone(), IndexTerm::sym(ret.clone(), rt.ret.1.clone()));
    let mut out = rt.subst(&s);
    out.ret = (ret.clone(), rt.ret.1.clone());
    out
}

fn same_inputs(a: &Resource, b: &Resource) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b) && a.inputs() == b.inputs()
}

/// Resource that is `a` on the first path and `b` on the second.
fn merge_resource(guard: &IndexTerm, a: &Resource, b: &Resource) -> Resource {
    let pick = |x: &IndexTerm, y: &IndexTerm| {
        if x == y {
            x.clone()
        } else {
            IndexTerm::ite(guard.clone(), x.clone(), y.clone())
        }
    };
    match (a, b) {
        (
            Resource::Points {
                pointer,
                pointee: v1,
                size,
            },
            Resource::Points { pointee: v2, .. },
        ) => Resource::points(pointer.clone(), pick(v1, v2), *size),
        (
            Resource::Array {
                pointer,
                element_size,
                length,
                content: c1,
            },
            Resource::Array { content: c2, .. },
        ) => Resource::Array {
            pointer: pointer.clone(),
            element_size: *element_size,
            length: length.clone(),
            content: pick(c1, c2),
        },
        (Resource::Predicate { name, iargs, oargs: o1 }, Resource::Predicate { oargs: o2, .. }) => {
            Resource::Predicate {
                name: name.clone(),
                iargs: iargs.clone(),
                oargs: o1.iter().zip(o2).map(|(x, y)| pick(x, y)).collect(),
            }
        }
        _ => a.clone(),
    }
}

/// Combine the return types of two exclusive paths with path conditions
/// `c1` and `c2`.
///
/// Each side's constraints hold under its own condition, so the merged
/// constraint is `(c1 && C1) || (c2 && C2)`. Logical binders of both sides
/// are renamed apart; resources must pair up one to one.
pub fn merge_return_types(
    (c1, rt1): (IndexTerm, ReturnType),
    (c2, rt2): (IndexTerm, ReturnType),
    span: Span,
) -> Result<(IndexTerm, ReturnType), TypeError> {
    if rt1.ret.1 != rt2.ret.1 {
        return Err(TypeError::new(
            ErrorKind::Mismatch {
                expected: rt1.ret.1.clone(),
                found: rt2.ret.1.clone(),
            },
            span,
        ));
    }
    let ret = rt1.ret.0.fresh_like();
    let left = rename_apart(&rt1, &ret);
    let right = rename_apart(&rt2, &ret);

    let unused = |r: &Resource| {
        TypeError::new(
            ErrorKind::UnusedResource {
                resource: r.to_string(),
            },
            span,
        )
    };
    let mut resources = Vec::new();
    let mut unmatched: Vec<&Resource> = right.resources.iter().collect();
    for a in &left.resources {
        let i = unmatched
            .iter()
            .position(|b| same_inputs(a, b))
            .ok_or_else(|| unused(a))?;
        let b = unmatched.remove(i);
        resources.push(merge_resource(&c1, a, b));
    }
    if let Some(b) = unmatched.first() {
        return Err(unused(b));
    }

    let mut one = vec![c1.clone()];
    one.extend(left.constraints);
    let mut two = vec![c2.clone()];
    two.extend(right.constraints);
    let mut logical = left.logical;
    logical.extend(right.logical);

    let merged = ReturnType {
        ret: (ret, rt1.ret.1.clone()),
        logical,
        resources,
        constraints: vec![IndexTerm::or(vec![IndexTerm::and(one), IndexTerm::and(two)])],
    };
    Ok((IndexTerm::or(vec![c1, c2]), merged))
}

/// Fold [`merge_return_types`] over the paths that reach their end.
pub fn merge_return_paths(
    paths: Vec<Fallible<(IndexTerm, ReturnType)>>,
    span: Span,
) -> Result<Fallible<(IndexTerm, ReturnType)>, TypeError> {
    let mut merged: Option<(IndexTerm, ReturnType)> = None;
    for path in paths.into_iter().filter_map(Fallible::normal) {
        merged = Some(match merged {
            None => path,
            Some(acc) => merge_return_types(acc, path, span)?,
        });
    }
    Ok(merged.map_or(Fallible::Unreachable, Fallible::Normal))
}
