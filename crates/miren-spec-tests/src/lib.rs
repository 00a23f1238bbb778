// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # Miren end-to-end tests
//!
//! Complete programs built as ASTs, compiled and executed through the
//! embedding API, asserting on the thread's final accumulator. These tests
//! cover whole-language behaviour; the per-module unit tests live next to
//! their modules in `miren-vm`.

#[cfg(test)]
mod loop_test;

use miren_ast::Module;
use miren_vm::object::Closure;
use miren_vm::thread::ThreadOutcome;
use miren_vm::{CompileError, Heap, Thread, compile};

/// Compile a module on a fresh heap and run it on the calling thread.
///
/// # Errors
///
/// Returns the compile error; runtime errors travel in the outcome.
pub fn run_module(module: &Module) -> Result<ThreadOutcome, CompileError> {
    let mut heap = Heap::new();
    let function = compile(&mut heap, module)?;
    let closure = Closure::without_context(&mut heap, function)?;
    Ok(Thread::new(heap, closure, vec![]).run())
}

/// Like [`run_module`], but on a spawned OS thread.
///
/// # Errors
///
/// Returns the compile error; runtime errors travel in the outcome.
pub fn run_module_spawned(module: &Module) -> Result<ThreadOutcome, CompileError> {
    let mut heap = Heap::new();
    let function = compile(&mut heap, module)?;
    let closure = Closure::without_context(&mut heap, function)?;
    Ok(Thread::new(heap, closure, vec![]).spawn().join())
}
