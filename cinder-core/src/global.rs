#![forbid(unsafe_code)]

use std::collections::HashMap;

use cinder_ast::{
    BaseType, FunctionSpec, GlobalDecl, IndexTerm, PredicateDef, Resource, Span, StructLayout,
    Symbol, Tag, Tail, Telescope,
};

use crate::error::{ErrorKind, TypeError};

/// Declarations supplied by the elaborator: struct layouts, function and
/// label specifications, resource predicates and global variables.
#[derive(Clone, Debug, Default)]
pub struct Global {
    structs: HashMap<Tag, StructLayout>,
    functions: HashMap<Symbol, FunctionSpec>,
    predicates: HashMap<String, PredicateDef>,
    globals: Vec<GlobalDecl>,
}

fn unbound(name: impl Into<String>, span: Span) -> TypeError {
    TypeError::new(ErrorKind::UnboundName { name: name.into() }, span)
}

impl Global {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_struct(mut self, layout: StructLayout) -> Self {
        self.structs.insert(layout.tag.clone(), layout);
        self
    }

    pub fn with_function(mut self, name: Symbol, spec: FunctionSpec) -> Self {
        self.functions.insert(name, spec);
        self
    }

    pub fn with_predicate(mut self, def: PredicateDef) -> Self {
        self.predicates.insert(def.name.clone(), def);
        self
    }

    pub fn with_global(mut self, decl: GlobalDecl) -> Self {
        self.globals.push(decl);
        self
    }

    pub fn get_struct(&self, tag: &str, span: Span) -> Result<&StructLayout, TypeError> {
        self.structs
            .get(tag)
            .ok_or_else(|| unbound(format!("struct {tag}"), span))
    }

    pub fn get_function(&self, name: &Symbol, span: Span) -> Result<&FunctionSpec, TypeError> {
        self.functions
            .get(name)
            .ok_or_else(|| unbound(name.to_string(), span))
    }

    pub fn get_predicate(&self, name: &str, span: Span) -> Result<&PredicateDef, TypeError> {
        self.predicates
            .get(name)
            .ok_or_else(|| unbound(format!("predicate {name}"), span))
    }

    pub fn globals(&self) -> &[GlobalDecl] {
        &self.globals
    }

    pub fn global_at(&self, address: &Symbol) -> Option<&GlobalDecl> {
        self.globals.iter().find(|g| &g.address == address)
    }

    /// Function telescope with its `accesses` clauses made explicit.
    ///
    /// Each accessed global contributes ownership of its cell on entry and
    /// on exit, with the entry and exit values as logical variables.
    pub fn effective_telescope(
        &self,
        spec: &FunctionSpec,
        span: Span,
    ) -> Result<Telescope, TypeError> {
        let mut telescope = spec.telescope.clone();
        for access in &spec.accesses {
            let decl = self
                .global_at(&access.global)
                .ok_or_else(|| unbound(access.global.to_string(), span))?;
            if let BaseType::Struct(tag) = &decl.ty.bt {
                return Err(TypeError::unsupported(
                    format!("accesses clause on struct global of type struct {tag}"),
                    span,
                ));
            }
            let pointer = IndexTerm::sym(decl.address.clone(), BaseType::Pointer);
            let bt = decl.ty.bt.clone();
            telescope.logical.push((access.pre_value.clone(), bt.clone()));
            telescope.resources.push(Resource::points(
                pointer.clone(),
                IndexTerm::sym(access.pre_value.clone(), bt.clone()),
                decl.ty.size,
            ));
            if let Tail::Return(rt) = &mut telescope.tail {
                rt.logical.push((access.post_value.clone(), bt.clone()));
                rt.resources.push(Resource::points(
                    pointer,
                    IndexTerm::sym(access.post_value.clone(), bt),
                    decl.ty.size,
                ));
            }
        }
        Ok(telescope)
    }
}
