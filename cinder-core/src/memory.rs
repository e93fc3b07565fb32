#![forbid(unsafe_code)]

//! Loads and stores in terms of resources.
//!
//! A load reads the value recorded by the resource covering the address
//! and consumes nothing. A store only describes the resources that exist
//! after the write; permission to write is checked separately with
//! [`Checker::ownership_request`].

use cinder_ast::{BaseType, BlockKind, IndexTerm, MemType, Resource, Sort, Span, Symbol};
use tracing::trace;

use crate::check::Checker;
use crate::context::Context;
use crate::error::{ErrorKind, TypeError};
use crate::solver::Solver;

/// Result of a load: a fresh value and what is known about it.
#[derive(Clone, Debug, Default)]
pub struct Loaded {
    pub logical: Vec<(Symbol, Sort)>,
    pub constraints: Vec<IndexTerm>,
}

/// Resources describing memory after a store.
#[derive(Clone, Debug, Default)]
pub struct StoreContribution {
    pub logical: Vec<(Symbol, Sort)>,
    pub resources: Vec<Resource>,
    pub constraints: Vec<IndexTerm>,
}

impl<S: Solver + ?Sized> Checker<'_, S> {
    /// Alignment obligation of an access, when alignment checks are on.
    pub(crate) fn check_alignment(
        &mut self,
        ctx: &Context,
        pointer: &IndexTerm,
        ty: &MemType,
        span: Span,
    ) -> Result<(), TypeError> {
        if !self.config.check_alignment || ty.align <= 1 {
            return Ok(());
        }
        let aligned = IndexTerm::eq(
            IndexTerm::rem(pointer.clone(), IndexTerm::int(i128::from(ty.align))),
            IndexTerm::int(0),
        );
        if self.holds(ctx, &aligned) {
            Ok(())
        } else {
            Err(TypeError::new(
                ErrorKind::Misaligned {
                    pointer: pointer.to_string(),
                    align: ty.align,
                },
                span,
            )
            .explained(ctx))
        }
    }

    /// Read a value of type `ty` at `pointer`. Returns the value term and
    /// the facts to add to the context.
    pub fn load(
        &mut self,
        ctx: &Context,
        ty: &MemType,
        pointer: &IndexTerm,
        span: Span,
    ) -> Result<(IndexTerm, Loaded), TypeError> {
        let mut loaded = Loaded::default();
        let value = self.load_into(ctx, ty, pointer, &mut loaded, span)?;
        Ok((value, loaded))
    }

    fn load_into(
        &mut self,
        ctx: &Context,
        ty: &MemType,
        pointer: &IndexTerm,
        out: &mut Loaded,
        span: Span,
    ) -> Result<IndexTerm, TypeError> {
        let result = Symbol::fresh("read");
        let value = IndexTerm::sym(result.clone(), ty.bt.clone());
        out.logical.push((result, ty.bt.clone()));

        if let BaseType::Struct(tag) = &ty.bt {
            let global = self.global;
            let layout = global.get_struct(tag, span)?;
            for (offset, member, mty) in layout.members() {
                let at = IndexTerm::ptr_add(pointer.clone(), IndexTerm::int(i128::from(offset)));
                let part = self.load_into(ctx, mty, &at, out, span)?;
                out.constraints.push(IndexTerm::eq(
                    IndexTerm::struct_member(value.clone(), member.clone(), mty.bt.clone()),
                    part,
                ));
            }
            return Ok(value);
        }

        let pointee = self.read_scalar(ctx, ty, pointer, span)?;
        out.constraints.push(IndexTerm::eq(value.clone(), pointee));
        Ok(value)
    }

    /// Pointee of the unique live resource covering `pointer`.
    fn read_scalar(
        &mut self,
        ctx: &Context,
        ty: &MemType,
        pointer: &IndexTerm,
        span: Span,
    ) -> Result<IndexTerm, TypeError> {
        let mut covering = Vec::new();
        let mut packed = None;
        for (_, r) in ctx.all_resources() {
            match r.footprint() {
                Some((start, size)) => {
                    let inside = IndexTerm::and(vec![
                        IndexTerm::le(start.clone(), pointer.clone()),
                        IndexTerm::lt(pointer.clone(), IndexTerm::ptr_add(start.clone(), size)),
                    ]);
                    if self.provably_equal(ctx, &start, pointer) || self.holds(ctx, &inside) {
                        covering.push((start, r));
                    }
                }
                None => {
                    if let Resource::Predicate { iargs, .. } = &r {
                        if let Some(first) = iargs.first() {
                            if packed.is_none() && self.provably_equal(ctx, first, pointer) {
                                packed = Some(r.clone());
                            }
                        }
                    }
                }
            }
        }

        if covering.len() > 1 {
            let found: Vec<String> = covering.iter().map(|(_, r)| r.to_string()).collect();
            return Err(TypeError::internal(
                format!("several resources cover {pointer}: {}", found.join(", ")),
                span,
            )
            .explained(ctx));
        }
        let Some((start, found)) = covering.pop() else {
            if let Some(p) = packed {
                return Err(TypeError::new(
                    ErrorKind::CannotUnpack {
                        predicate: p.to_string(),
                    },
                    span,
                )
                .explained(ctx));
            }
            return Err(self.missing_ownership(ctx, pointer, span));
        };
        trace!(resource = %found, "load");

        match &found {
            Resource::Points { pointee, size, .. } => {
                if !self.provably_equal(ctx, &start, pointer) {
                    return Err(TypeError::new(
                        ErrorKind::Misaligned {
                            pointer: pointer.to_string(),
                            align: ty.align,
                        },
                        span,
                    )
                    .explained(ctx));
                }
                if *size != ty.size {
                    return Err(TypeError::new(
                        ErrorKind::ResourceMismatch {
                            expected: format!("{pointer} |-({})-> _", ty.size),
                            found: found.to_string(),
                        },
                        span,
                    )
                    .explained(ctx));
                }
                Ok(pointee.clone())
            }
            Resource::Block {
                kind: BlockKind::Uninit,
                ..
            }
            | Resource::Region { .. } => Err(TypeError::new(
                ErrorKind::UninitialisedRead {
                    pointer: pointer.to_string(),
                },
                span,
            )
            .explained(ctx)),
            Resource::Block { .. } => Err(TypeError::new(
                ErrorKind::ForbiddenRead {
                    pointer: pointer.to_string(),
                },
                span,
            )
            .explained(ctx)),
            Resource::Array { .. } | Resource::Predicate { .. } => Err(TypeError::new(
                ErrorKind::ResourceMismatch {
                    expected: format!("{pointer} |-({})-> _", ty.size),
                    found: found.to_string(),
                },
                span,
            )
            .explained(ctx)),
        }
    }

    /// Resources describing `ty` at `pointer` after writing `value`, or
    /// after allocation when there is no value.
    pub fn store(
        &mut self,
        ty: &MemType,
        pointer: &IndexTerm,
        value: Option<&IndexTerm>,
        span: Span,
    ) -> Result<StoreContribution, TypeError> {
        let mut out = StoreContribution::default();
        self.store_into(ty, pointer, value, &mut out, span)?;
        Ok(out)
    }

    fn store_into(
        &mut self,
        ty: &MemType,
        pointer: &IndexTerm,
        value: Option<&IndexTerm>,
        out: &mut StoreContribution,
        span: Span,
    ) -> Result<(), TypeError> {
        if let BaseType::Struct(tag) = &ty.bt {
            let global = self.global;
            let layout = global.get_struct(tag, span)?;
            for piece in &layout.pieces {
                let at = IndexTerm::ptr_add(pointer.clone(), IndexTerm::int(i128::from(piece.offset)));
                match &piece.member {
                    None => out
                        .resources
                        .push(Resource::block(at, piece.size, BlockKind::Padding)),
                    Some((member, mty)) => {
                        let part = value.map(|v| {
                            IndexTerm::struct_member(v.clone(), member.clone(), mty.bt.clone())
                        });
                        self.store_into(mty, &at, part.as_ref(), out, span)?;
                    }
                }
            }
            return Ok(());
        }

        match value {
            Some(v) => {
                let written = Symbol::fresh("written");
                let term = IndexTerm::sym(written.clone(), ty.bt.clone());
                out.logical.push((written, ty.bt.clone()));
                out.constraints.push(IndexTerm::eq(term.clone(), v.clone()));
                out.resources.push(Resource::points(pointer.clone(), term, ty.size));
            }
            None => out
                .resources
                .push(Resource::block(pointer.clone(), ty.size, BlockKind::Uninit)),
        }
        Ok(())
    }
}
