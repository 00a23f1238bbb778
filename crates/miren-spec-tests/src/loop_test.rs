// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! While loops, break and continue.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use crate::run_module;
use miren_ast::{Block, Expression, Literal, Module, Statement, Token};

/// The spec's tight loop: a million increments complete without heap
/// exhaustion, proving temporaries are released.
#[test]
fn counting_to_a_million() {
    // let i = 0; while (i < 1000000) { i = i + 1 }  i
    let module = Module::new(vec![
        Statement::variable("i", Expression::number(0.0)),
        Statement::While {
            condition: Expression::binary(
                Token::Less,
                Expression::identifier("i"),
                Expression::number(1_000_000.0),
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
        Statement::expression(Expression::identifier("i")),
    ]);

    let outcome = run_module(&module).unwrap();
    assert_eq!(outcome.result.unwrap().value().as_number(), 1_000_000.0);
}

#[test]
fn break_leaves_the_loop_and_continue_skips() {
    // let i = 0; let n = 0
    // while (true) {
    //     i = i + 1
    //     if (i > 5) { break }
    //     if (i > 2) { continue }
    //     n = n + i
    // }
    // n
    let module = Module::new(vec![
        Statement::variable("i", Expression::number(0.0)),
        Statement::variable("n", Expression::number(0.0)),
        Statement::While {
            condition: Expression::Literal(Literal::Bool(true)),
            body: Block::new(vec![
                Statement::expression(Expression::assign(
                    "i",
                    Expression::binary(
                        Token::Add,
                        Expression::identifier("i"),
                        Expression::number(1.0),
                    ),
                )),
                Statement::IfElse {
                    condition: Expression::binary(
                        Token::Greater,
                        Expression::identifier("i"),
                        Expression::number(5.0),
                    ),
                    body: Block::new(vec![Statement::Break]),
                    else_branch: None,
                },
                Statement::IfElse {
                    condition: Expression::binary(
                        Token::Greater,
                        Expression::identifier("i"),
                        Expression::number(2.0),
                    ),
                    body: Block::new(vec![Statement::Continue]),
                    else_branch: None,
                },
                Statement::expression(Expression::assign(
                    "n",
                    Expression::binary(
                        Token::Add,
                        Expression::identifier("n"),
                        Expression::identifier("i"),
                    ),
                )),
            ]),
        },
        Statement::expression(Expression::identifier("n")),
    ]);

    let outcome = run_module(&module).unwrap();
    // Only i = 1 and i = 2 accumulate.
    assert_eq!(outcome.result.unwrap().value().as_number(), 3.0);
}

#[test]
fn nested_loops_break_independently() {
    // let total = 0; let i = 0
    // while (i < 3) {
    //     i = i + 1
    //     let j = 0
    //     while (true) {
    //         j = j + 1
    //         if (j > 1) { break }
    //         total = total + 1
    //     }
    // }
    // total
    let module = Module::new(vec![
        Statement::variable("total", Expression::number(0.0)),
        Statement::variable("i", Expression::number(0.0)),
        Statement::While {
            condition: Expression::binary(
                Token::Less,
                Expression::identifier("i"),
                Expression::number(3.0),
            ),
            body: Block::new(vec![
                Statement::expression(Expression::assign(
                    "i",
                    Expression::binary(
                        Token::Add,
                        Expression::identifier("i"),
                        Expression::number(1.0),
                    ),
                )),
                Statement::variable("j", Expression::number(0.0)),
                Statement::While {
                    condition: Expression::Literal(Literal::Bool(true)),
                    body: Block::new(vec![
                        Statement::expression(Expression::assign(
                            "j",
                            Expression::binary(
                                Token::Add,
                                Expression::identifier("j"),
                                Expression::number(1.0),
                            ),
                        )),
                        Statement::IfElse {
                            condition: Expression::binary(
                                Token::Greater,
                                Expression::identifier("j"),
                                Expression::number(1.0),
                            ),
                            body: Block::new(vec![Statement::Break]),
                            else_branch: None,
                        },
                        Statement::expression(Expression::assign(
                            "total",
                            Expression::binary(
                                Token::Add,
                                Expression::identifier("total"),
                                Expression::number(1.0),
                            ),
                        )),
                    ]),
                },
            ]),
        },
        Statement::expression(Expression::identifier("total")),
    ]);

    let outcome = run_module(&module).unwrap();
    assert_eq!(outcome.result.unwrap().value().as_number(), 3.0);
}
