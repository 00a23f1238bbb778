// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the AST compiler.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use super::{CompileError, compile};
use crate::bytecode::{Chunk, Instruction};
use crate::heap::Heap;
use crate::object::Function;
use miren_ast::{Block, Expression, FunctionDefinition, Literal, Module, Statement, Token};

fn compile_module(module: &Module) -> (Heap, Chunk) {
    let mut heap = Heap::new();
    let function = compile(&mut heap, module).unwrap();
    let chunk = clone_chunk(function.get().as_bytecode().unwrap().chunk());
    (heap, chunk)
}

fn clone_chunk(chunk: &Chunk) -> Chunk {
    Chunk {
        arguments_count: chunk.arguments_count,
        registers_count: chunk.registers_count,
        code: chunk.code.clone(),
        constants: chunk.constants.clone(),
    }
}

/// Check the quantified chunk invariants: register operands inside
/// `[-argc, registers)`, constant indices inside the pool, jump targets
/// inside the code, recursively through function constants.
fn assert_chunk_invariants(chunk: &Chunk) {
    let check_register = |r: i32| {
        assert!(r >= -chunk.arguments_count && r < chunk.registers_count, "register {r} out of range");
    };

    for (pc, instruction) in chunk.code.iter().enumerate() {
        match *instruction {
            Instruction::LoadRegister(r)
            | Instruction::StoreRegister(r)
            | Instruction::Add(r)
            | Instruction::Sub(r)
            | Instruction::Mul(r)
            | Instruction::Div(r)
            | Instruction::CheckEqual(r)
            | Instruction::CheckNotEqual(r)
            | Instruction::CheckLess(r)
            | Instruction::CheckGreater(r)
            | Instruction::CheckLessOrEqual(r)
            | Instruction::CheckGreaterOrEqual(r)
            | Instruction::CheckTypeEqual(r) => check_register(r),
            Instruction::Call(range) => {
                for r in range.first..range.first + range.count {
                    check_register(r);
                }
            }
            Instruction::LoadConstant(k) => {
                assert!((k as usize) < chunk.constants.len(), "constant k{k} out of range");
            }
            Instruction::Jump(offset)
            | Instruction::JumpIfTrue(offset)
            | Instruction::JumpIfFalse(offset) => {
                let target = pc as i32 + offset;
                assert!(
                    target >= 0 && (target as usize) < chunk.code.len(),
                    "jump target {target} out of range"
                );
            }
            _ => {}
        }
    }

    for constant in &chunk.constants {
        if constant.is::<Function>() {
            if let Some(function) = constant.cast::<Function>().get().as_bytecode() {
                assert_chunk_invariants(function.chunk());
            }
        }
    }
}

#[test]
fn arithmetic_expression_compiles_to_spill_and_apply() {
    let module = Module::new(vec![Statement::expression(Expression::binary(
        Token::Add,
        Expression::number(2.0),
        Expression::number(3.0),
    ))]);
    let (_heap, chunk) = compile_module(&module);

    assert_eq!(
        chunk.code,
        vec![
            Instruction::LoadNumber(2.0),
            Instruction::StoreRegister(0),
            Instruction::LoadNumber(3.0),
            Instruction::StoreRegister(1),
            Instruction::LoadRegister(0),
            Instruction::Add(1),
            Instruction::Return,
        ]
    );
    assert_eq!(chunk.registers_count, 2);
    assert_chunk_invariants(&chunk);
}

#[test]
fn variable_definition_and_use() {
    let module = Module::new(vec![
        Statement::variable("a", Expression::number(1.0)),
        Statement::expression(Expression::identifier("a")),
    ]);
    let (_heap, chunk) = compile_module(&module);

    assert_eq!(
        chunk.code,
        vec![
            Instruction::LoadNumber(1.0),
            Instruction::StoreRegister(0),
            Instruction::LoadRegister(0),
            Instruction::Return,
        ]
    );
    assert_chunk_invariants(&chunk);
}

#[test]
fn string_literals_go_to_the_constant_pool() {
    let module = Module::new(vec![Statement::expression(Expression::string("hi"))]);
    let (_heap, chunk) = compile_module(&module);

    assert_eq!(
        chunk.code,
        vec![Instruction::LoadConstant(0), Instruction::Return]
    );
    assert_eq!(chunk.constants.len(), 1);
    assert_chunk_invariants(&chunk);
}

#[test]
fn if_else_emits_patched_jumps() {
    let module = Module::new(vec![Statement::IfElse {
        condition: Expression::Literal(Literal::Bool(true)),
        body: Block::new(vec![Statement::expression(Expression::number(1.0))]),
        else_branch: Some(Box::new(Statement::Block(Block::new(vec![
            Statement::expression(Expression::number(2.0)),
        ])))),
    }]);
    let (_heap, chunk) = compile_module(&module);

    assert_eq!(
        chunk.code,
        vec![
            Instruction::LoadTrue,
            Instruction::JumpIfFalse(3),
            Instruction::LoadNumber(1.0),
            Instruction::Jump(2),
            Instruction::LoadNumber(2.0),
            Instruction::Return,
        ]
    );
    assert_chunk_invariants(&chunk);
}

#[test]
fn while_loop_emits_a_back_edge() {
    // let i = 0; while (i < 2) { i = i + 1 }
    let module = Module::new(vec![
        Statement::variable("i", Expression::number(0.0)),
        Statement::While {
            condition: Expression::binary(
                Token::Less,
                Expression::identifier("i"),
                Expression::number(2.0),
            ),
            body: Block::new(vec![Statement::expression(Expression::assign(
                "i",
                Expression::binary(
                    Token::Add,
                    Expression::identifier("i"),
                    Expression::number(1.0),
                ),
            ))]),
        },
    ]);
    let (_heap, chunk) = compile_module(&module);

    // The loop's closing jump targets the condition.
    let back_jump = chunk
        .code
        .iter()
        .enumerate()
        .find_map(|(pc, i)| match i {
            Instruction::Jump(offset) if *offset < 0 => Some((pc as i32, *offset)),
            _ => None,
        })
        .expect("loop should emit a backward jump");
    assert_eq!(back_jump.0 + back_jump.1, 2); // label of the condition
    assert_chunk_invariants(&chunk);
}

#[test]
fn break_jumps_to_loop_exit_and_continue_to_the_top() {
    let module = Module::new(vec![Statement::While {
        condition: Expression::Literal(Literal::Bool(true)),
        body: Block::new(vec![
            Statement::IfElse {
                condition: Expression::Literal(Literal::Bool(false)),
                body: Block::new(vec![Statement::Break]),
                else_branch: None,
            },
            Statement::Continue,
        ]),
    }]);
    let (_heap, chunk) = compile_module(&module);

    // Exactly one forward jump escapes the loop (the break), and the
    // continue's backward jump targets the condition at label 0.
    let exits: Vec<_> = chunk
        .code
        .iter()
        .enumerate()
        .filter_map(|(pc, i)| match i {
            Instruction::Jump(offset) => Some((pc as i32, *offset)),
            _ => None,
        })
        .collect();
    assert!(exits.iter().any(|(pc, off)| pc + off == 0));
    assert!(
        exits
            .iter()
            .any(|(pc, off)| *off > 0 && (pc + off) as usize == chunk.code.len() - 1)
    );
    assert_chunk_invariants(&chunk);
}

#[test]
fn break_outside_loop_is_rejected() {
    let module = Module::new(vec![Statement::Break]);
    let mut heap = Heap::new();
    assert_eq!(
        compile(&mut heap, &module),
        Err(CompileError::BreakOutsideLoop)
    );
}

#[test]
fn break_does_not_cross_function_boundaries() {
    // while (true) { fn f() { break } }
    let module = Module::new(vec![Statement::While {
        condition: Expression::Literal(Literal::Bool(true)),
        body: Block::new(vec![Statement::FunctionDefinition(FunctionDefinition::new(
            "f",
            vec![],
            Block::new(vec![Statement::Break]),
        ))]),
    }]);
    let mut heap = Heap::new();
    assert_eq!(
        compile(&mut heap, &module),
        Err(CompileError::BreakOutsideLoop)
    );
}

#[test]
fn function_definition_creates_a_closure_constant() {
    // fn f() { return 2 }  f()
    let module = Module::new(vec![
        Statement::FunctionDefinition(FunctionDefinition::new(
            "f",
            vec![],
            Block::new(vec![Statement::Return(Some(Expression::number(2.0)))]),
        )),
        Statement::expression(Expression::call("f", vec![])),
    ]);
    let (_heap, chunk) = compile_module(&module);

    // The outer chunk wraps the inner function as a constant.
    assert!(chunk.code.contains(&Instruction::LoadConstant(0)));
    assert!(chunk.code.contains(&Instruction::CreateClosure));
    assert_eq!(chunk.constants.len(), 1);
    assert!(chunk.constants[0].is::<Function>());

    // The inner chunk returns its literal.
    let inner = chunk.constants[0].cast::<Function>();
    let inner_chunk = inner.get().as_bytecode().unwrap().chunk();
    assert!(inner_chunk.code.contains(&Instruction::LoadNumber(2.0)));
    assert_eq!(inner_chunk.arguments_count, 0);
    assert_chunk_invariants(&chunk);
}

#[test]
fn captured_variables_move_to_context_slots() {
    // fn mk() { let x = 0; fn step() { x = x + 1; return x } return step }
    let step = FunctionDefinition::new(
        "step",
        vec![],
        Block::new(vec![
            Statement::expression(Expression::assign(
                "x",
                Expression::binary(
                    Token::Add,
                    Expression::identifier("x"),
                    Expression::number(1.0),
                ),
            )),
            Statement::Return(Some(Expression::identifier("x"))),
        ]),
    );
    let mk = FunctionDefinition::new(
        "mk",
        vec![],
        Block::new(vec![
            Statement::variable("x", Expression::number(0.0)),
            Statement::FunctionDefinition(step),
            Statement::Return(Some(Expression::identifier("step"))),
        ]),
    );
    let module = Module::new(vec![Statement::FunctionDefinition(mk)]);
    let (_heap, chunk) = compile_module(&module);
    assert_chunk_invariants(&chunk);

    // mk's body block pushes a context for the captured x.
    let mk_fn = chunk.constants[0].cast::<Function>();
    let mk_chunk = mk_fn.get().as_bytecode().unwrap().chunk();
    assert!(mk_chunk.code.iter().any(|i| matches!(i, Instruction::PushContext(1))));
    assert!(mk_chunk.code.iter().any(|i| matches!(i, Instruction::DeclareContext(_))));

    // step loads and stores x through the context.
    let step_fn = mk_chunk.constants[0].cast::<Function>();
    let step_chunk = step_fn.get().as_bytecode().unwrap().chunk();
    assert!(step_chunk.code.iter().any(|i| matches!(i, Instruction::LoadContext(d) if d.index == 0)));
    assert!(step_chunk.code.iter().any(|i| matches!(i, Instruction::StoreContext(_))));
}

#[test]
fn unresolved_names_fail_compilation() {
    let module = Module::new(vec![Statement::expression(Expression::identifier(
        "missing",
    ))]);
    let mut heap = Heap::new();
    assert!(matches!(
        compile(&mut heap, &module),
        Err(CompileError::UnresolvedName(name)) if name == "missing"
    ));
}

#[test]
fn use_before_declaration_fails_compilation() {
    let module = Module::new(vec![
        Statement::expression(Expression::identifier("late")),
        Statement::variable("late", Expression::number(1.0)),
    ]);
    let mut heap = Heap::new();
    assert!(matches!(
        compile(&mut heap, &module),
        Err(CompileError::UnresolvedName(_))
    ));
}

#[test]
fn redeclaration_fails_compilation() {
    let module = Module::new(vec![
        Statement::variable("a", Expression::number(1.0)),
        Statement::variable("a", Expression::number(2.0)),
    ]);
    let mut heap = Heap::new();
    assert!(matches!(
        compile(&mut heap, &module),
        Err(CompileError::Redeclaration(_))
    ));
}

#[test]
fn unsupported_constructs_fail_compilation() {
    let module = Module::new(vec![Statement::expression(Expression::Prefix {
        op: Token::Sub,
        expression: Box::new(Expression::number(1.0)),
    })]);
    let mut heap = Heap::new();
    assert!(matches!(
        compile(&mut heap, &module),
        Err(CompileError::UnsupportedConstruct(_))
    ));
}

#[test]
fn arguments_occupy_negative_registers() {
    // fn id(n) { return n }
    let module = Module::new(vec![Statement::FunctionDefinition(FunctionDefinition::new(
        "id",
        vec!["n".to_owned()],
        Block::new(vec![Statement::Return(Some(Expression::identifier("n")))]),
    ))]);
    let (_heap, chunk) = compile_module(&module);
    assert_chunk_invariants(&chunk);

    let inner = chunk.constants[0].cast::<Function>();
    let inner_chunk = inner.get().as_bytecode().unwrap().chunk();
    assert_eq!(inner_chunk.arguments_count, 1);
    assert!(inner_chunk.code.contains(&Instruction::LoadRegister(-1)));
}

#[test]
fn temporaries_are_released_between_statements() {
    // Two back-to-back binary statements reuse the same temporaries.
    let module = Module::new(vec![
        Statement::expression(Expression::binary(
            Token::Add,
            Expression::number(1.0),
            Expression::number(2.0),
        )),
        Statement::expression(Expression::binary(
            Token::Mul,
            Expression::number(3.0),
            Expression::number(4.0),
        )),
    ]);
    let (_heap, chunk) = compile_module(&module);
    assert_eq!(chunk.registers_count, 2);
    assert_chunk_invariants(&chunk);
}
