#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::fmt;

use cinder_ast::{BaseType, Span};
use miette::Diagnostic;
use thiserror::Error;

use crate::context::Context;

/// Where a missing resource went, as far as the context remembers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnershipHistory {
    NeverOwned,
    UsedAt(Vec<Span>),
}

impl fmt::Display for OwnershipHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipHistory::NeverOwned => write!(f, "no resource for it was ever owned here"),
            OwnershipHistory::UsedAt(spans) => {
                write!(f, "it was already used at offset")?;
                for (i, s) in spans.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{}", s.offset())?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("unbound name `{name}`")]
    UnboundName { name: String },
    #[error("`{name}` is a {found}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("name `{name}` bound twice")]
    NameBoundTwice { name: String },
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: BaseType, found: BaseType },
    #[error("wrong number of arguments: expected {expected}, found {found}")]
    NumberArguments { expected: usize, found: usize },
    #[error("unsupported: {what}")]
    Unsupported { what: String },
    #[error("missing ownership of {pointer}: {history}")]
    MissingOwnership {
        pointer: String,
        history: OwnershipHistory,
    },
    #[error("missing ownership of global `{global}`")]
    MissingGlobalOwnership { global: String },
    #[error("missing resource {resource}")]
    MissingResource { resource: String },
    #[error("resource left unaccounted: {resource}")]
    UnusedResource { resource: String },
    #[error("resource mismatch: needed {expected}, found {found}")]
    ResourceMismatch { expected: String, found: String },
    #[error("cannot determine the size of {resource}")]
    UnknownResourceSize { resource: String },
    #[error("{predicate} must be unpacked before this access")]
    CannotUnpack { predicate: String },
    #[error("read of uninitialised memory at {pointer}")]
    UninitialisedRead { pointer: String },
    #[error("read of memory at {pointer} that holds no value")]
    ForbiddenRead { pointer: String },
    #[error("misaligned access at {pointer} (alignment {align})")]
    Misaligned { pointer: String, align: u64 },
    #[error("undefined behaviour: {what}")]
    UndefinedBehaviour { what: String },
    #[error("unsatisfied constraint {constraint}")]
    UnsatConstraint { constraint: String },
    #[error("logical variable `{name}` is not determined by the resources")]
    UnconstrainedLogicalVariable { name: String },
    #[error("incompatible environments: {reason}")]
    IncompatibleEnvironments { reason: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ErrorKind {
    /// Internal invariant violations. These abort backtracking search
    /// instead of making the current alternative fail.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnconstrainedLogicalVariable { .. }
                | ErrorKind::IncompatibleEnvironments { .. }
                | ErrorKind::Internal { .. }
        )
    }

    /// Failures that more packing could repair.
    pub(crate) fn is_missing(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingResource { .. }
                | ErrorKind::MissingOwnership { .. }
                | ErrorKind::MissingGlobalOwnership { .. }
        )
    }
}

/// Snapshot of the context at the point of failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Explanation {
    pub resources: Vec<String>,
    pub used: Vec<(String, Vec<Span>)>,
    pub constraints: Vec<String>,
    pub logical: Vec<String>,
    pub hints: Vec<String>,
}

impl Explanation {
    pub fn of(ctx: &Context) -> Self {
        Self {
            resources: ctx
                .all_resources()
                .into_iter()
                .map(|(_, r)| r.to_string())
                .collect(),
            used: ctx
                .all_used_resources()
                .into_iter()
                .map(|(_, r, spans)| (r.to_string(), spans))
                .collect(),
            constraints: ctx.all_constraints().iter().map(|c| c.to_string()).collect(),
            logical: ctx
                .all_logical()
                .into_iter()
                .map(|(s, sort)| format!("{s}: {sort}"))
                .collect(),
            hints: Vec::new(),
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut section = |title: &str, lines: &[String]| {
            if !lines.is_empty() {
                out.push_str(title);
                out.push('\n');
                for l in lines {
                    out.push_str("  ");
                    out.push_str(l);
                    out.push('\n');
                }
            }
        };
        section("resources:", &self.resources);
        let used: Vec<String> = self.used.iter().map(|(r, _)| r.clone()).collect();
        section("used resources:", &used);
        section("constraints:", &self.constraints);
        section("logical variables:", &self.logical);
        section("hints:", &self.hints);
        out
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("type error: {kind}")]
#[diagnostic(code(cinder::check))]
#[allow(unused_assignments)]
pub struct TypeError {
    pub kind: ErrorKind,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
    pub explanation: Option<Box<Explanation>>,
}

impl TypeError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            help: None,
            explanation: None,
        }
    }

    /// Attach the state of `ctx` unless an explanation is already present.
    pub fn explained(mut self, ctx: &Context) -> Self {
        if self.explanation.is_none() {
            let e = Explanation::of(ctx);
            self.help = Some(e.render()).filter(|h| !h.is_empty());
            self.explanation = Some(Box::new(e));
        }
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        Self::new(
            ErrorKind::Internal {
                message: message.into(),
            },
            span,
        )
    }

    pub fn unsupported(what: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Unsupported { what: what.into() }, span)
    }
}
