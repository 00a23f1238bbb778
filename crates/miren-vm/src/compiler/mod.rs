// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Compiler from the annotated AST to bytecode.
//!
//! The compiler is a match-based visitor over the AST. Semantic analysis
//! must have attached a scope to every scope-introducing node; code
//! generation walks the same tree, emitting into the generator owned by the
//! innermost strong scope.
//!
//! Calling convention: the accumulator carries every expression result.
//! Binary operands and call arguments spill into temporaries allocated from
//! the enclosing function's register shape and released within the same
//! statement.

#[cfg(test)]
mod compiler_test;

mod analyser;
mod scope;
mod shape;

pub use scope::{Location, Scope, StorageKind};
pub use shape::RegisterShape;

use core::fmt;
use std::rc::Rc;

use miren_ast::{Block, Expression, FunctionDefinition, Literal, MetaSlot, Module, Statement, Token};

use crate::bytecode::{Instruction, JumpKind, JumpLabel, Label};
use crate::heap::{Heap, HeapError};
use crate::object::Function;
use crate::value::Handle;

/// Compile-time failure kinds. No partial chunks are ever produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// An identifier did not resolve to any reachable declaration, or was
    /// used before its declaration point.
    UnresolvedName(String),
    /// A name was declared twice in the same scope.
    Redeclaration(String),
    /// The construct has no bytecode representation.
    UnsupportedConstruct(&'static str),
    /// `break` outside of a loop.
    BreakOutsideLoop,
    /// `continue` outside of a loop.
    ContinueOutsideLoop,
    /// Allocating a constant failed.
    Heap(HeapError),
    /// A compiler invariant was violated; not expected to surface.
    Internal(&'static str),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedName(name) => write!(f, "unresolved name `{name}`"),
            Self::Redeclaration(name) => write!(f, "`{name}` is declared twice"),
            Self::UnsupportedConstruct(what) => write!(f, "unsupported construct: {what}"),
            Self::BreakOutsideLoop => f.write_str("`break` outside of a loop"),
            Self::ContinueOutsideLoop => f.write_str("`continue` outside of a loop"),
            Self::Heap(error) => write!(f, "constant allocation failed: {error}"),
            Self::Internal(what) => write!(f, "compiler invariant violated: {what}"),
        }
    }
}

impl core::error::Error for CompileError {}

impl From<HeapError> for CompileError {
    fn from(error: HeapError) -> Self {
        Self::Heap(error)
    }
}

/// Run semantic analysis and code generation over a module.
///
/// The module compiles to an outer function with no arguments; running it
/// executes the top-level statements, and the value of the last expression
/// statement becomes the thread result.
///
/// # Errors
///
/// Returns a [`CompileError`] on unresolved names, redeclarations and
/// unsupported constructs. No partial chunk is produced.
pub fn compile(heap: &mut Heap, module: &Module) -> Result<Handle<Function>, CompileError> {
    analyser::analyse(module)?;

    let mut compiler = Compiler {
        heap,
        scopes: Vec::new(),
        loops: Vec::new(),
    };
    let function = compiler.compile_module(module)?;
    debug_assert!(compiler.scopes.is_empty());

    let chunk = function
        .get()
        .as_bytecode()
        .ok_or(CompileError::Internal("module compiled to a non-bytecode function"))?
        .chunk();
    tracing::debug!(
        instructions = chunk.code.len(),
        constants = chunk.constants.len(),
        registers = chunk.registers_count,
        "module compiled"
    );
    Ok(function)
}

/// One entry of the compiler's scope stack.
struct ScopeEntry {
    scope: Rc<Scope>,
    /// Whether entering this scope emitted a `PushContext`.
    pushed_context: bool,
}

/// Loop bookkeeping for `break`/`continue`.
struct LoopFrame {
    /// Label of the condition, the `continue` target.
    top: Label,
    /// Pending `break` jumps, patched at loop exit.
    break_jumps: Vec<JumpLabel>,
    /// Number of pushed contexts when the loop was entered.
    entry_context_depth: usize,
}

struct Compiler<'heap> {
    heap: &'heap mut Heap,
    scopes: Vec<ScopeEntry>,
    loops: Vec<LoopFrame>,
}

impl Compiler<'_> {
    fn scope(&self) -> Result<&Rc<Scope>, CompileError> {
        self.scopes
            .last()
            .map(|entry| &entry.scope)
            .ok_or(CompileError::Internal("scope stack is empty"))
    }

    fn emit(&self, instruction: Instruction) -> Result<Label, CompileError> {
        Ok(self.scope()?.generator().borrow_mut().emit(instruction))
    }

    fn emit_jump(&self, kind: JumpKind, to: Label) -> Result<JumpLabel, CompileError> {
        Ok(self.scope()?.generator().borrow_mut().emit_jump(kind, to))
    }

    fn label(&self) -> Result<Label, CompileError> {
        Ok(self.scope()?.generator().borrow().label())
    }

    fn update_jump_to_here(&self, jump: JumpLabel) -> Result<(), CompileError> {
        self.scope()?.generator().borrow_mut().update_jump_to_here(jump);
        Ok(())
    }

    /// Number of contexts pushed by the currently entered scopes.
    fn pushed_context_depth(&self) -> usize {
        self.scopes
            .iter()
            .filter(|entry| entry.pushed_context)
            .count()
    }

    /// Enter the scope attached to a node, emitting `PushContext` when the
    /// scope introduces context slots.
    fn enter_scope(&mut self, meta: &MetaSlot) -> Result<(), CompileError> {
        let scope = meta
            .get()
            .and_then(|any| any.downcast::<Scope>().ok())
            .ok_or(CompileError::Internal("scope missing from meta slot"))?;
        let context_count = scope.context_count();
        self.scopes.push(ScopeEntry {
            scope,
            pushed_context: context_count > 0,
        });
        if context_count > 0 {
            self.emit(Instruction::PushContext(context_count))?;
        }
        Ok(())
    }

    /// Leave the innermost scope. Weak scopes pop their context here;
    /// strong scopes end with `Return`, which discards the whole frame.
    fn exit_scope(&mut self) -> Result<(), CompileError> {
        let entry = self
            .scopes
            .last()
            .ok_or(CompileError::Internal("scope stack is empty"))?;
        if entry.pushed_context && entry.scope.is_weak() {
            self.emit(Instruction::PopContext)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn compile_module(&mut self, module: &Module) -> Result<Handle<Function>, CompileError> {
        self.enter_scope(&module.meta)?;

        let result = module
            .statements
            .iter()
            .try_for_each(|statement| self.compile_statement(statement));

        let chunk = {
            let scope = self.scope()?;
            let generator = scope.generator();
            let mut generator = generator.borrow_mut();
            generator.emit(Instruction::Return);
            generator.set_arguments_count(0);
            generator.set_registers_count(scope.shape().borrow().registers_count());
            generator.flush()
        };
        self.scopes.pop();
        result?;

        Ok(self.heap.alloc_function(chunk)?)
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::VariableDefinition { name, value } => {
                if let Some(value) = value {
                    self.compile_expression(value)?;
                }
                match self.scope()?.location(name)? {
                    Location::Register(register) => {
                        self.scope()?.shape().borrow_mut().mark_declared(name);
                        if value.is_some() {
                            self.emit(Instruction::StoreRegister(register))?;
                        }
                    }
                    Location::Context(descriptor) => {
                        self.emit(Instruction::DeclareContext(descriptor))?;
                        if value.is_some() {
                            self.emit(Instruction::StoreContext(descriptor))?;
                        }
                    }
                }
                Ok(())
            }
            Statement::FunctionDefinition(definition) => {
                self.compile_function_definition(definition)
            }
            Statement::Expression(expression) => self.compile_expression(expression),
            Statement::Block(block) => self.compile_block(block),
            Statement::IfElse {
                condition,
                body,
                else_branch,
            } => {
                self.compile_expression(condition)?;
                let if_false = self.emit_jump(JumpKind::JumpIfFalse, 0)?;
                self.compile_block(body)?;
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.emit_jump(JumpKind::Jump, 0)?;
                        self.update_jump_to_here(if_false)?;
                        self.compile_statement(else_branch)?;
                        self.update_jump_to_here(skip_else)?;
                    }
                    None => self.update_jump_to_here(if_false)?,
                }
                Ok(())
            }
            Statement::While { condition, body } => {
                let top = self.label()?;
                self.loops.push(LoopFrame {
                    top,
                    break_jumps: Vec::new(),
                    entry_context_depth: self.pushed_context_depth(),
                });

                self.compile_expression(condition)?;
                let exit = self.emit_jump(JumpKind::JumpIfFalse, 0)?;
                self.compile_block(body)?;
                self.emit_jump(JumpKind::Jump, top)?;
                self.update_jump_to_here(exit)?;

                let frame = self
                    .loops
                    .pop()
                    .ok_or(CompileError::Internal("loop stack is empty"))?;
                for jump in frame.break_jumps {
                    self.update_jump_to_here(jump)?;
                }
                Ok(())
            }
            Statement::Return(expression) => {
                match expression {
                    Some(expression) => self.compile_expression(expression)?,
                    None => {
                        self.emit(Instruction::LoadNull)?;
                    }
                }
                self.emit(Instruction::Return)?;
                Ok(())
            }
            Statement::Break => {
                let Some(frame) = self.loops.last() else {
                    return Err(CompileError::BreakOutsideLoop);
                };
                let pops = self.pushed_context_depth() - frame.entry_context_depth;
                for _ in 0..pops {
                    self.emit(Instruction::PopContext)?;
                }
                let jump = self.emit_jump(JumpKind::Jump, 0)?;
                self.loops
                    .last_mut()
                    .ok_or(CompileError::Internal("loop stack is empty"))?
                    .break_jumps
                    .push(jump);
                Ok(())
            }
            Statement::Continue => {
                let Some(frame) = self.loops.last() else {
                    return Err(CompileError::ContinueOutsideLoop);
                };
                let top = frame.top;
                let pops = self.pushed_context_depth() - frame.entry_context_depth;
                for _ in 0..pops {
                    self.emit(Instruction::PopContext)?;
                }
                self.emit_jump(JumpKind::Jump, top)?;
                Ok(())
            }
        }
    }

    /// Compile the inner function, wrap it as a constant and bind the
    /// resulting closure under the declared name.
    fn compile_function_definition(
        &mut self,
        definition: &FunctionDefinition,
    ) -> Result<(), CompileError> {
        self.enter_scope(&definition.meta)?;
        // Loops do not cross function boundaries; a break inside the body
        // must not see an enclosing loop.
        let enclosing_loops = core::mem::take(&mut self.loops);

        let body = (|| {
            for (index, name) in definition.arguments.iter().enumerate() {
                match self.scope()?.location(name)? {
                    Location::Register(_) => {
                        self.scope()?.shape().borrow_mut().mark_declared(name);
                    }
                    Location::Context(descriptor) => {
                        // Captured arguments are copied from their register
                        // into the freshly pushed context.
                        self.emit(Instruction::DeclareContext(descriptor))?;
                        self.emit(Instruction::LoadRegister(-(index as i32) - 1))?;
                        self.emit(Instruction::StoreContext(descriptor))?;
                    }
                }
            }
            self.compile_block(&definition.body)
        })();

        let chunk = {
            let scope = self.scope()?;
            let generator = scope.generator();
            let mut generator = generator.borrow_mut();
            generator.emit(Instruction::LoadNull);
            generator.emit(Instruction::Return);
            generator.set_arguments_count(definition.arguments.len() as i32);
            generator.set_registers_count(scope.shape().borrow().registers_count());
            generator.flush()
        };
        self.scopes.pop();
        self.loops = enclosing_loops;
        body?;

        let function = self.heap.alloc_function(chunk)?;
        let index = self
            .scope()?
            .generator()
            .borrow_mut()
            .store_constant(function.erased());
        self.emit(Instruction::LoadConstant(index))?;
        self.emit(Instruction::CreateClosure)?;

        match self.scope()?.location(&definition.name)? {
            Location::Register(register) => {
                self.scope()?
                    .shape()
                    .borrow_mut()
                    .mark_declared(&definition.name);
                self.emit(Instruction::StoreRegister(register))?;
            }
            Location::Context(descriptor) => {
                self.emit(Instruction::DeclareContext(descriptor))?;
                self.emit(Instruction::StoreContext(descriptor))?;
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.enter_scope(&block.meta)?;
        let result = block
            .statements
            .iter()
            .try_for_each(|statement| self.compile_statement(statement));
        self.exit_scope()?;
        result
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Literal(literal) => self.compile_literal(literal),
            Expression::Parenthesized(inner) => self.compile_expression(inner),
            Expression::Binary { op, left, right } => {
                // Evaluate left, spill; evaluate right, spill; reload left
                // into the accumulator and apply the opcode.
                self.compile_expression(left)?;
                let shape = self.scope()?.shape();
                let left_range = shape.borrow_mut().lock_range(1);
                self.emit(Instruction::StoreRegister(left_range.first))?;

                self.compile_expression(right)?;
                let shape = self.scope()?.shape();
                let right_range = shape.borrow_mut().lock_range(1);
                self.emit(Instruction::StoreRegister(right_range.first))?;

                self.emit(Instruction::LoadRegister(left_range.first))?;
                shape.borrow_mut().release_range(left_range);

                let operand = right_range.first;
                self.emit(match op {
                    Token::Add => Instruction::Add(operand),
                    Token::Sub => Instruction::Sub(operand),
                    Token::Mul => Instruction::Mul(operand),
                    Token::Div => Instruction::Div(operand),
                    Token::Equals => Instruction::CheckEqual(operand),
                    Token::NotEquals => Instruction::CheckNotEqual(operand),
                    Token::Greater => Instruction::CheckGreater(operand),
                    Token::GreaterEquals => Instruction::CheckGreaterOrEqual(operand),
                    Token::Less => Instruction::CheckLess(operand),
                    Token::LessEquals => Instruction::CheckLessOrEqual(operand),
                })?;
                shape.borrow_mut().release_range(right_range);
                Ok(())
            }
            Expression::Assignment { target, value } => {
                self.compile_expression(value)?;
                match self.scope()?.location(target)? {
                    Location::Register(register) => {
                        if !self.scope()?.shape().borrow().is_declared(target) {
                            return Err(CompileError::UnresolvedName(target.clone()));
                        }
                        self.emit(Instruction::StoreRegister(register))?;
                    }
                    Location::Context(descriptor) => {
                        self.emit(Instruction::StoreContext(descriptor))?;
                    }
                }
                Ok(())
            }
            Expression::FunctionCall { callee, arguments } => {
                self.compile_expression(callee)?;
                let shape = self.scope()?.shape();
                let callee_range = shape.borrow_mut().lock_range(1);
                self.emit(Instruction::StoreRegister(callee_range.first))?;

                let argument_range = shape.borrow_mut().lock_range(arguments.len() as i32);
                for (index, argument) in arguments.iter().enumerate() {
                    self.compile_expression(argument)?;
                    self.emit(Instruction::StoreRegister(
                        argument_range.first + index as i32,
                    ))?;
                }

                self.emit(Instruction::LoadRegister(callee_range.first))?;
                shape.borrow_mut().release_range(callee_range);
                self.emit(Instruction::Call(argument_range))?;
                shape.borrow_mut().release_range(argument_range);
                Ok(())
            }
            Expression::Prefix { .. } => {
                Err(CompileError::UnsupportedConstruct("prefix expression"))
            }
            Expression::Postfix { .. } => {
                Err(CompileError::UnsupportedConstruct("postfix expression"))
            }
            Expression::Subscript { .. } => {
                Err(CompileError::UnsupportedConstruct("subscript expression"))
            }
            Expression::MemberAccess { .. } => {
                Err(CompileError::UnsupportedConstruct("member access"))
            }
            Expression::FunctionDefinition(_) => Err(CompileError::UnsupportedConstruct(
                "function definition expression",
            )),
        }
    }

    fn compile_literal(&mut self, literal: &Literal) -> Result<(), CompileError> {
        match literal {
            Literal::Null => {
                self.emit(Instruction::LoadNull)?;
            }
            Literal::Bool(true) => {
                self.emit(Instruction::LoadTrue)?;
            }
            Literal::Bool(false) => {
                self.emit(Instruction::LoadFalse)?;
            }
            Literal::Number(number) => {
                self.emit(Instruction::LoadNumber(*number))?;
            }
            Literal::String(text) => {
                let string = self.heap.alloc_string(text)?;
                let index = self
                    .scope()?
                    .generator()
                    .borrow_mut()
                    .store_constant(string.erased());
                self.emit(Instruction::LoadConstant(index))?;
            }
            Literal::Identifier(name) => match self.scope()?.location(name)? {
                Location::Register(register) => {
                    if !self.scope()?.shape().borrow().is_declared(name) {
                        return Err(CompileError::UnresolvedName(name.clone()));
                    }
                    self.emit(Instruction::LoadRegister(register))?;
                }
                Location::Context(descriptor) => {
                    self.emit(Instruction::LoadContext(descriptor))?;
                }
            },
        }
        Ok(())
    }
}
