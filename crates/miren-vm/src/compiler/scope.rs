// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Lexical scope tree with register/context-slot resolution.
//!
//! Semantic analysis attaches one [`Scope`] to each scope-introducing AST
//! node. Weak scopes (blocks) share the enclosing function's register shape
//! and bytecode generator; strong scopes (functions, the module) own fresh
//! ones.
//!
//! Every name starts out register-allocated. The first time a use crosses a
//! non-weak boundary on its way to the declaration, the name is promoted to
//! a context slot and its register entry is released.

use core::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::{BytecodeGenerator, ContextDescriptor, Register};
use crate::compiler::CompileError;
use crate::compiler::shape::RegisterShape;

/// Where a resolved name lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    /// A register of the declaring function.
    Register,
    /// A slot of the declaring scope's context.
    Context,
}

/// A resolved name: its storage and coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// A register index.
    Register(Register),
    /// A context slot, addressed relative to the use site.
    Context(ContextDescriptor),
}

/// Per-AST-node scope metadata.
pub struct Scope {
    parent: Option<Rc<Scope>>,
    weak: bool,
    shape: Rc<RefCell<RegisterShape>>,
    generator: Rc<RefCell<BytecodeGenerator>>,
    /// Name table in insertion order; the i-th context-kind name gets
    /// context slot i.
    names: RefCell<Vec<(String, StorageKind)>>,
}

impl Scope {
    /// The root scope of a module: strong, no parent.
    #[must_use]
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            weak: false,
            shape: Rc::new(RefCell::new(RegisterShape::new())),
            generator: Rc::new(RefCell::new(BytecodeGenerator::new())),
            names: RefCell::new(Vec::new()),
        })
    }

    /// A child scope. Weak children share the parent's register shape and
    /// generator; strong children get their own.
    #[must_use]
    pub fn child(parent: &Rc<Self>, weak: bool) -> Rc<Self> {
        let (shape, generator) = if weak {
            (Rc::clone(&parent.shape), Rc::clone(&parent.generator))
        } else {
            (
                Rc::new(RefCell::new(RegisterShape::new())),
                Rc::new(RefCell::new(BytecodeGenerator::new())),
            )
        };
        Rc::new(Self {
            parent: Some(Rc::clone(parent)),
            weak,
            shape,
            generator,
            names: RefCell::new(Vec::new()),
        })
    }

    /// Whether this scope shares its function's register file.
    #[must_use]
    pub const fn is_weak(&self) -> bool {
        self.weak
    }

    /// The register shape of the enclosing function.
    #[must_use]
    pub fn shape(&self) -> Rc<RefCell<RegisterShape>> {
        Rc::clone(&self.shape)
    }

    /// The bytecode generator of the enclosing function.
    #[must_use]
    pub fn generator(&self) -> Rc<RefCell<BytecodeGenerator>> {
        Rc::clone(&self.generator)
    }

    fn lookup(&self, name: &str) -> Option<StorageKind> {
        self.names
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kind)| *kind)
    }

    /// Context slot index of a context-kind name: its rank among the
    /// context-kind names in insertion order.
    fn context_index(&self, name: &str) -> Option<i32> {
        let names = self.names.borrow();
        let mut index = 0;
        for (n, kind) in names.iter() {
            if n == name {
                return (*kind == StorageKind::Context).then_some(index);
            }
            if *kind == StorageKind::Context {
                index += 1;
            }
        }
        None
    }

    /// Number of context slots this scope introduces.
    #[must_use]
    pub fn context_count(&self) -> i32 {
        self.names
            .borrow()
            .iter()
            .filter(|(_, kind)| *kind == StorageKind::Context)
            .count() as i32
    }

    /// Register a local declaration.
    pub fn declare_local(&self, name: &str) -> Result<(), CompileError> {
        if self.lookup(name).is_some() {
            return Err(CompileError::Redeclaration(name.to_owned()));
        }
        self.shape.borrow_mut().store_local(name)?;
        self.names
            .borrow_mut()
            .push((name.to_owned(), StorageKind::Register));
        Ok(())
    }

    /// Register an argument declaration. Only strong scopes take arguments.
    pub fn declare_argument(&self, name: &str, index: i32) -> Result<(), CompileError> {
        debug_assert!(!self.weak, "weak scopes cannot declare arguments");
        if self.lookup(name).is_some() {
            return Err(CompileError::Redeclaration(name.to_owned()));
        }
        self.shape.borrow_mut().store_argument(name, index)?;
        self.names
            .borrow_mut()
            .push((name.to_owned(), StorageKind::Register));
        Ok(())
    }

    /// Record a use of a name, promoting it to a context slot when the use
    /// crossed a non-weak boundary on the way here.
    pub fn touch(&self, name: &str, move_to_context: bool) -> Result<(), CompileError> {
        if let Some(kind) = self.lookup(name) {
            if move_to_context && kind == StorageKind::Register {
                self.shape.borrow_mut().remove_name(name)?;
                let mut names = self.names.borrow_mut();
                if let Some(entry) = names.iter_mut().find(|(n, _)| n == name) {
                    entry.1 = StorageKind::Context;
                }
            }
            return Ok(());
        }
        let Some(parent) = &self.parent else {
            return Err(CompileError::UnresolvedName(name.to_owned()));
        };
        parent.touch(name, move_to_context || !self.weak)
    }

    /// Resolve a name to its storage location, relative to this use site.
    ///
    /// The descriptor depth counts the context-introducing scopes between
    /// the use and the declaration.
    pub fn location(&self, name: &str) -> Result<Location, CompileError> {
        if let Some(kind) = self.lookup(name) {
            return self.resolve_in(self, kind, name, 0);
        }

        let mut depth = i32::from(self.context_count() > 0);
        let mut cursor = self.parent.clone();
        while let Some(scope) = cursor {
            if let Some(kind) = scope.lookup(name) {
                return self.resolve_in(&scope, kind, name, depth);
            }
            if scope.context_count() > 0 {
                depth += 1;
            }
            cursor = scope.parent.clone();
        }
        Err(CompileError::UnresolvedName(name.to_owned()))
    }

    /// Build the location of `name`, declared in `declaring` with the given
    /// kind, as seen `depth` context-introducing scopes away.
    fn resolve_in(
        &self,
        declaring: &Self,
        kind: StorageKind,
        name: &str,
        depth: i32,
    ) -> Result<Location, CompileError> {
        match kind {
            StorageKind::Register => {
                // A register name is only addressable from its own function;
                // promotion must have happened otherwise.
                debug_assert!(Rc::ptr_eq(&declaring.shape, &self.shape));
                let index = self
                    .shape
                    .borrow()
                    .index_of(name)
                    .ok_or_else(|| CompileError::UnresolvedName(name.to_owned()))?;
                Ok(Location::Register(index))
            }
            StorageKind::Context => {
                let index = declaring
                    .context_index(name)
                    .ok_or_else(|| CompileError::UnresolvedName(name.to_owned()))?;
                Ok(Location::Context(ContextDescriptor { index, depth }))
            }
        }
    }
}
