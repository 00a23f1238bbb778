// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The bytecode dispatch loop.
//!
//! A tight match keyed by opcode. The instruction pointer advances by one
//! at the bottom of the loop unless the opcode transfers control (`Call`,
//! the jumps, `Return`). Dispatch continues until `Return` pops the last
//! frame, at which point the accumulator carries the thread's result.
//!
//! There is no language-level exception mechanism: every runtime error is
//! fatal to the thread and surfaces through the thread's outcome.


use core::fmt;

use crate::bytecode::Instruction;
use crate::heap::HeapError;
use crate::object::{Closure, Context, ContextError, Function, HeapString};
use crate::thread::Thread;
use crate::value::{COMPARISON_ULP, Handle, Value, almost_equal};

/// Runtime failure kinds; all of them terminate the thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    /// An operand had the wrong type for an operation.
    TypeMismatch {
        /// The operation that failed.
        operation: &'static str,
        /// The offending operand's type name.
        found: &'static str,
    },
    /// `Call` on a value that is not a closure.
    NotCallable {
        /// The type name of the value in the accumulator.
        type_name: &'static str,
    },
    /// The heap could not allocate.
    HeapExhausted,
    /// The stack arena is full.
    StackOverflow,
    /// A native function reported failure.
    NativeError,
    /// A context slot operation failed.
    Context(ContextError),
    /// A constant-pool index was out of range.
    ConstantOutOfBounds(u32),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { operation, found } => {
                write!(f, "type mismatch: {operation} cannot take {found}")
            }
            Self::NotCallable { type_name } => write!(f, "{type_name} is not callable"),
            Self::HeapExhausted => f.write_str("heap exhausted"),
            Self::StackOverflow => f.write_str("stack overflow"),
            Self::NativeError => f.write_str("native function reported an error"),
            Self::Context(error) => write!(f, "{error}"),
            Self::ConstantOutOfBounds(index) => {
                write!(f, "constant index {index} out of range")
            }
        }
    }
}

impl core::error::Error for RuntimeError {}

impl From<HeapError> for RuntimeError {
    fn from(_: HeapError) -> Self {
        Self::HeapExhausted
    }
}

impl From<ContextError> for RuntimeError {
    fn from(error: ContextError) -> Self {
        Self::Context(error)
    }
}

/// The numeric payload of a handle, or a type mismatch naming the op.
fn number_operand(value: Handle<Value>, operation: &'static str) -> Result<f64, RuntimeError> {
    if value.value().is_number() {
        Ok(value.value().as_number())
    } else {
        Err(RuntimeError::TypeMismatch {
            operation,
            found: value.value_type().name(),
        })
    }
}

/// Render an `Add` operand for string concatenation.
fn concat_operand(value: Handle<Value>, out: &mut String) -> Result<(), RuntimeError> {
    let raw = value.value();
    if raw.is_number() {
        // Minimal-digit formatting: integral doubles print without a
        // fractional part.
        out.push_str(&raw.as_number().to_string());
        Ok(())
    } else if value.is::<HeapString>() {
        out.push_str(value.cast::<HeapString>().get().as_str());
        Ok(())
    } else {
        Err(RuntimeError::TypeMismatch {
            operation: "Add",
            found: value.value_type().name(),
        })
    }
}

/// `Add`: numeric addition, or concatenation when either side is a string.
fn execute_add(thread: &mut Thread, register: crate::bytecode::Register) -> Result<(), RuntimeError> {
    let rhs = thread.register(register);
    let lhs = thread.acc;
    if lhs.value().is_number() && rhs.value().is_number() {
        thread.acc = Handle::from_value(Value::number(
            lhs.value().as_number() + rhs.value().as_number(),
        ));
        return Ok(());
    }

    if lhs.is::<HeapString>() || rhs.is::<HeapString>() {
        // Collect before taking operand copies: both live in the root set
        // (accumulator and register file) and are re-read afterwards.
        thread.maybe_collect();
        let rhs = thread.register(register);
        let mut text = String::new();
        concat_operand(thread.acc, &mut text)?;
        concat_operand(rhs, &mut text)?;
        let string = thread.heap.store_string(HeapString::new(text))?;
        thread.acc = string.erased();
        return Ok(());
    }

    Err(RuntimeError::TypeMismatch {
        operation: "Add",
        found: if lhs.value().is_number() {
            rhs.value_type().name()
        } else {
            lhs.value_type().name()
        },
    })
}

/// Run the dispatch loop until the base frame returns.
///
/// The thread must have a frame pushed and `ip` pointing into its
/// function's code.
pub(crate) fn execute(thread: &mut Thread) -> Result<(), RuntimeError> {
    loop {
        debug_assert!(!thread.sp.is_null());
        debug_assert!(!thread.ip.is_null());

        // SAFETY: ip stays inside the running function's instruction array;
        // the compiler guarantees jump targets in range and a trailing
        // Return on every path.
        let instruction = unsafe { *thread.ip };

        match instruction {
            Instruction::NoOperation => {}

            Instruction::LoadRegister(register) => {
                thread.acc = thread.register(register);
            }

            Instruction::StoreRegister(register) => {
                thread.set_register(register, thread.acc);
            }

            Instruction::Add(register) => {
                execute_add(thread, register)?;
            }

            Instruction::Sub(register) => {
                let lhs = number_operand(thread.acc, "Sub")?;
                let rhs = number_operand(thread.register(register), "Sub")?;
                thread.acc = Handle::from_value(Value::number(lhs - rhs));
            }

            Instruction::Mul(register) => {
                let lhs = number_operand(thread.acc, "Mul")?;
                let rhs = number_operand(thread.register(register), "Mul")?;
                thread.acc = Handle::from_value(Value::number(lhs * rhs));
            }

            Instruction::Div(register) => {
                let lhs = number_operand(thread.acc, "Div")?;
                let rhs = number_operand(thread.register(register), "Div")?;
                thread.acc = Handle::from_value(Value::number(lhs / rhs));
            }

            Instruction::CheckEqual(register) => {
                let lhs = number_operand(thread.acc, "CheckEqual")?;
                let rhs = number_operand(thread.register(register), "CheckEqual")?;
                thread.acc =
                    Handle::from_value(Value::bool(almost_equal(lhs, rhs, COMPARISON_ULP)));
            }

            Instruction::CheckNotEqual(register) => {
                let lhs = number_operand(thread.acc, "CheckNotEqual")?;
                let rhs = number_operand(thread.register(register), "CheckNotEqual")?;
                thread.acc =
                    Handle::from_value(Value::bool(!almost_equal(lhs, rhs, COMPARISON_ULP)));
            }

            Instruction::CheckLess(register) => {
                let lhs = number_operand(thread.acc, "CheckLess")?;
                let rhs = number_operand(thread.register(register), "CheckLess")?;
                thread.acc = Handle::from_value(Value::bool(lhs < rhs));
            }

            Instruction::CheckGreater(register) => {
                let lhs = number_operand(thread.acc, "CheckGreater")?;
                let rhs = number_operand(thread.register(register), "CheckGreater")?;
                thread.acc = Handle::from_value(Value::bool(lhs > rhs));
            }

            Instruction::CheckLessOrEqual(register) => {
                let lhs = number_operand(thread.acc, "CheckLessOrEqual")?;
                let rhs = number_operand(thread.register(register), "CheckLessOrEqual")?;
                thread.acc = Handle::from_value(Value::bool(
                    almost_equal(lhs, rhs, COMPARISON_ULP) || lhs < rhs,
                ));
            }

            Instruction::CheckGreaterOrEqual(register) => {
                let lhs = number_operand(thread.acc, "CheckGreaterOrEqual")?;
                let rhs = number_operand(thread.register(register), "CheckGreaterOrEqual")?;
                thread.acc = Handle::from_value(Value::bool(
                    almost_equal(lhs, rhs, COMPARISON_ULP) || lhs > rhs,
                ));
            }

            Instruction::CheckTypeEqual(register) => {
                let rhs = thread.register(register);
                thread.acc = Handle::from_value(Value::bool(
                    thread.acc.value_type() == rhs.value_type(),
                ));
            }

            Instruction::DeclareContext(descriptor) => {
                Context::declare(thread.context(), descriptor)?;
            }

            Instruction::LoadContext(descriptor) => {
                thread.acc = Context::load(thread.context(), descriptor)?;
            }

            Instruction::StoreContext(descriptor) => {
                Context::store(thread.context(), descriptor, thread.acc)?;
            }

            Instruction::LoadConstant(index) => {
                let function = thread.function();
                let constant = function
                    .get()
                    .as_bytecode()
                    .and_then(|bytecode| bytecode.chunk().constants.get(index as usize))
                    .copied()
                    .ok_or(RuntimeError::ConstantOutOfBounds(index))?;
                thread.acc = constant;
            }

            Instruction::Call(range) => {
                // Collect before taking handle copies; the callee and its
                // arguments are rooted in the frame and the accumulator.
                thread.maybe_collect();
                if !thread.acc.is::<Closure>() {
                    return Err(RuntimeError::NotCallable {
                        type_name: thread.acc.value_type().name(),
                    });
                }
                let closure = thread.acc.cast::<Closure>();
                let args = thread.register_range(range.first, range.count);

                // The resume point is the instruction after the call.
                // SAFETY: a Return follows every Call in compiled code.
                thread.ip = unsafe { thread.ip.add(1) };
                thread.invoke(closure, &args)?;
                continue;
            }

            Instruction::Jump(offset) => {
                // SAFETY: the compiler keeps jump targets inside the chunk.
                thread.ip = unsafe { thread.ip.offset(offset as isize) };
                continue;
            }

            Instruction::JumpIfTrue(offset) => {
                if thread.acc.is_truthy() {
                    // SAFETY: jump targets stay inside the chunk.
                    thread.ip = unsafe { thread.ip.offset(offset as isize) };
                    continue;
                }
            }

            Instruction::JumpIfFalse(offset) => {
                if !thread.acc.is_truthy() {
                    // SAFETY: jump targets stay inside the chunk.
                    thread.ip = unsafe { thread.ip.offset(offset as isize) };
                    continue;
                }
            }

            Instruction::PushContext(size) => {
                thread.maybe_collect();
                let parent = thread.context();
                let context = thread.heap.alloc_context(parent, size as usize)?;
                thread.set_context(context);
            }

            Instruction::PopContext => {
                let context = thread.context();
                if context.is_empty() {
                    return Err(RuntimeError::Context(ContextError::DepthOutOfRange));
                }
                let parent = context.get().parent();
                thread.set_context(parent);
            }

            Instruction::LoadNumber(number) => {
                thread.acc = Handle::from_value(Value::number(number));
            }

            Instruction::LoadNull => {
                thread.acc = Handle::from_value(Value::null());
            }

            Instruction::LoadTrue => {
                thread.acc = Handle::from_value(Value::bool(true));
            }

            Instruction::LoadFalse => {
                thread.acc = Handle::from_value(Value::bool(false));
            }

            Instruction::CreateClosure => {
                if !thread.acc.is::<Function>() {
                    return Err(RuntimeError::TypeMismatch {
                        operation: "CreateClosure",
                        found: thread.acc.value_type().name(),
                    });
                }
                thread.maybe_collect();
                let function = thread.acc.cast::<Function>();
                let context = thread.context();
                let closure = thread.heap.alloc_closure(context, function)?;
                thread.acc = closure.erased();
            }

            Instruction::Return => {
                thread.pop_frame();
                if thread.sp.is_null() {
                    return Ok(());
                }
                continue;
            }
        }

        // SAFETY: every non-transfer instruction is followed by another
        // instruction; compiled chunks end in Return.
        thread.ip = unsafe { thread.ip.add(1) };
    }
}
