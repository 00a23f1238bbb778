// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Semantic analysis: builds the scope tree over the AST.
//!
//! Two passes. The *declare* pass creates a scope per scope-introducing
//! node, attaches it to the node's meta slot and registers every variable,
//! function and argument declaration. The *resolve* pass walks identifier
//! uses up the parent links; a use that crosses a non-weak boundary
//! promotes the name from a register to a context slot.

use std::rc::Rc;

use miren_ast::{Block, Expression, FunctionDefinition, Literal, MetaSlot, Module, Statement};

use crate::compiler::CompileError;
use crate::compiler::scope::Scope;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Declare,
    Resolve,
}

/// Run both analysis passes over a module.
pub(crate) fn analyse(module: &Module) -> Result<(), CompileError> {
    let mut analyser = SemanticAnalyser {
        pass: Pass::Declare,
        stack: Vec::new(),
    };
    analyser.visit_module(module)?;
    debug_assert!(analyser.stack.is_empty());

    analyser.pass = Pass::Resolve;
    analyser.visit_module(module)?;
    debug_assert!(analyser.stack.is_empty());
    Ok(())
}

struct SemanticAnalyser {
    pass: Pass,
    stack: Vec<Rc<Scope>>,
}

impl SemanticAnalyser {
    fn current(&self) -> Result<&Rc<Scope>, CompileError> {
        self.stack
            .last()
            .ok_or(CompileError::Internal("scope stack is empty"))
    }

    fn push_scope(&mut self, meta: &MetaSlot, weak: bool) -> Result<(), CompileError> {
        let scope = match self.pass {
            Pass::Declare => {
                let scope = match self.stack.last() {
                    Some(parent) => Scope::child(parent, weak),
                    None => Scope::root(),
                };
                meta.set(scope.clone());
                scope
            }
            Pass::Resolve => meta
                .get()
                .and_then(|any| any.downcast::<Scope>().ok())
                .ok_or(CompileError::Internal("scope missing from meta slot"))?,
        };
        self.stack.push(scope);
        Ok(())
    }

    fn pop_scope(&mut self) {
        self.stack.pop();
    }

    fn visit_module(&mut self, module: &Module) -> Result<(), CompileError> {
        self.push_scope(&module.meta, false)?;
        let result = module
            .statements
            .iter()
            .try_for_each(|statement| self.visit_statement(statement));
        self.pop_scope();
        result
    }

    fn visit_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::VariableDefinition { name, value } => {
                if self.pass == Pass::Declare {
                    self.current()?.declare_local(name)?;
                }
                if let Some(value) = value {
                    self.visit_expression(value)?;
                }
                Ok(())
            }
            Statement::FunctionDefinition(definition) => self.visit_function(definition),
            Statement::Expression(expression) => self.visit_expression(expression),
            Statement::Block(block) => self.visit_block(block),
            Statement::IfElse {
                condition,
                body,
                else_branch,
            } => {
                self.visit_expression(condition)?;
                self.visit_block(body)?;
                if let Some(else_branch) = else_branch {
                    self.visit_statement(else_branch)?;
                }
                Ok(())
            }
            Statement::While { condition, body } => {
                self.visit_expression(condition)?;
                self.visit_block(body)
            }
            Statement::Return(expression) => {
                if let Some(expression) = expression {
                    self.visit_expression(expression)?;
                }
                Ok(())
            }
            Statement::Break | Statement::Continue => Ok(()),
        }
    }

    fn visit_function(&mut self, definition: &FunctionDefinition) -> Result<(), CompileError> {
        if self.pass == Pass::Declare {
            self.current()?.declare_local(&definition.name)?;
        }

        self.push_scope(&definition.meta, false)?;
        let result = (|| {
            if self.pass == Pass::Declare {
                for (index, argument) in definition.arguments.iter().enumerate() {
                    self.current()?.declare_argument(argument, index as i32)?;
                }
            }
            self.visit_block(&definition.body)
        })();
        self.pop_scope();
        result
    }

    fn visit_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.push_scope(&block.meta, true)?;
        let result = block
            .statements
            .iter()
            .try_for_each(|statement| self.visit_statement(statement));
        self.pop_scope();
        result
    }

    fn visit_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Literal(Literal::Identifier(name)) => {
                if self.pass == Pass::Resolve {
                    self.current()?.touch(name, false)?;
                }
                Ok(())
            }
            Expression::Literal(_) => Ok(()),
            Expression::Parenthesized(inner) => self.visit_expression(inner),
            Expression::Binary { left, right, .. } => {
                self.visit_expression(left)?;
                self.visit_expression(right)
            }
            Expression::Assignment { target, value } => {
                self.visit_expression(value)?;
                if self.pass == Pass::Resolve {
                    self.current()?.touch(target, false)?;
                }
                Ok(())
            }
            Expression::FunctionCall { callee, arguments } => {
                self.visit_expression(callee)?;
                arguments
                    .iter()
                    .try_for_each(|argument| self.visit_expression(argument))
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
}
