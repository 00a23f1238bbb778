// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Debug helper: render a chunk as text.

use core::fmt::Write;

use crate::bytecode::{Chunk, Instruction};

/// Disassemble a chunk: header, one line per instruction, constant pool.
#[must_use]
pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "arguments: {} registers: {}",
        chunk.arguments_count, chunk.registers_count
    );

    for (index, instruction) in chunk.code.iter().enumerate() {
        let _ = write!(out, "{index:04}: ");
        let _ = match instruction {
            Instruction::NoOperation => writeln!(out, "NoOperation"),
            Instruction::LoadRegister(r) => writeln!(out, "LoadRegister        r{r}"),
            Instruction::StoreRegister(r) => writeln!(out, "StoreRegister       r{r}"),
            Instruction::Add(r) => writeln!(out, "Add                 r{r}"),
            Instruction::Sub(r) => writeln!(out, "Sub                 r{r}"),
            Instruction::Mul(r) => writeln!(out, "Mul                 r{r}"),
            Instruction::Div(r) => writeln!(out, "Div                 r{r}"),
            Instruction::CheckEqual(r) => writeln!(out, "CheckEqual          r{r}"),
            Instruction::CheckNotEqual(r) => writeln!(out, "CheckNotEqual       r{r}"),
            Instruction::CheckLess(r) => writeln!(out, "CheckLess           r{r}"),
            Instruction::CheckGreater(r) => writeln!(out, "CheckGreater        r{r}"),
            Instruction::CheckLessOrEqual(r) => writeln!(out, "CheckLessOrEqual    r{r}"),
            Instruction::CheckGreaterOrEqual(r) => writeln!(out, "CheckGreaterOrEqual r{r}"),
            Instruction::CheckTypeEqual(r) => writeln!(out, "CheckTypeEqual      r{r}"),
            Instruction::DeclareContext(d) => {
                writeln!(out, "DeclareContext      {} @{}", d.index, d.depth)
            }
            Instruction::LoadContext(d) => {
                writeln!(out, "LoadContext         {} @{}", d.index, d.depth)
            }
            Instruction::StoreContext(d) => {
                writeln!(out, "StoreContext        {} @{}", d.index, d.depth)
            }
            Instruction::LoadConstant(k) => writeln!(out, "LoadConstant        k{k}"),
            Instruction::Call(range) => {
                writeln!(out, "Call                r{} #{}", range.first, range.count)
            }
            Instruction::Jump(offset) => writeln!(out, "Jump                {offset:+}"),
            Instruction::JumpIfTrue(offset) => writeln!(out, "JumpIfTrue          {offset:+}"),
            Instruction::JumpIfFalse(offset) => writeln!(out, "JumpIfFalse         {offset:+}"),
            Instruction::PushContext(size) => writeln!(out, "PushContext         {size}"),
            Instruction::PopContext => writeln!(out, "PopContext"),
            Instruction::LoadNumber(n) => writeln!(out, "LoadNumber          {n}"),
            Instruction::LoadNull => writeln!(out, "LoadNull"),
            Instruction::LoadTrue => writeln!(out, "LoadTrue"),
            Instruction::LoadFalse => writeln!(out, "LoadFalse"),
            Instruction::CreateClosure => writeln!(out, "CreateClosure"),
            Instruction::Return => writeln!(out, "Return"),
        };
    }

    if !chunk.constants.is_empty() {
        let _ = writeln!(out, "\nconstants:");
        for (index, constant) in chunk.constants.iter().enumerate() {
            let _ = writeln!(out, "  k{index}: {constant:?}");
        }
    }

    out
}
