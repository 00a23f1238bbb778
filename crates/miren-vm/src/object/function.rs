// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Callable heap objects: bytecode functions, native functions, closures.

use core::fmt;

use crate::bytecode::Chunk;
use crate::object::Context;
use crate::thread::Thread;
use crate::value::{Handle, Value};

/// Host callback signature for native functions.
///
/// Receives the running thread, the call's context and the argument
/// handles; returns the result handle. Returning the empty handle signals
/// a native error and terminates the thread.
///
/// The callable crosses onto the VM thread, hence `Send`.
pub type NativeCallable =
    dyn Fn(&mut Thread, Handle<Context>, &[Handle<Value>]) -> Handle<Value> + Send;

/// A callable: compiled bytecode or a host-provided native.
pub enum Function {
    /// A function compiled from source.
    Bytecode(BytecodeFunction),
    /// A function provided by the embedder.
    Native(NativeFunction),
}

impl Function {
    /// Number of declared arguments.
    #[must_use]
    pub const fn arguments_count(&self) -> i32 {
        match self {
            Self::Bytecode(function) => function.chunk.arguments_count,
            Self::Native(_) => 0,
        }
    }

    /// Number of local and temporary registers.
    #[must_use]
    pub const fn registers_count(&self) -> i32 {
        match self {
            Self::Bytecode(function) => function.chunk.registers_count,
            Self::Native(_) => 0,
        }
    }

    /// The bytecode variant, if this is a compiled function.
    #[must_use]
    pub const fn as_bytecode(&self) -> Option<&BytecodeFunction> {
        match self {
            Self::Bytecode(function) => Some(function),
            Self::Native(_) => None,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytecode(function) => f
                .debug_struct("BytecodeFunction")
                .field("arguments", &function.chunk.arguments_count)
                .field("registers", &function.chunk.registers_count)
                .field("instructions", &function.chunk.code.len())
                .finish(),
            Self::Native(_) => f.write_str("NativeFunction"),
        }
    }
}

/// A function compiled from source: an immutable bytecode chunk.
pub struct BytecodeFunction {
    chunk: Chunk,
}

impl BytecodeFunction {
    /// Wrap a flushed chunk.
    #[must_use]
    pub const fn new(chunk: Chunk) -> Self {
        Self { chunk }
    }

    /// The function's chunk.
    #[must_use]
    pub const fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// Mutable access for the collector's reference traversal.
    pub(crate) const fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.chunk
    }
}

/// A function provided by the embedder.
pub struct NativeFunction {
    callable: Box<NativeCallable>,
}

impl NativeFunction {
    /// Wrap a host callback.
    #[must_use]
    pub fn new(callable: Box<NativeCallable>) -> Self {
        Self { callable }
    }

    /// Invoke the callback on the caller's thread.
    pub(crate) fn call(
        &self,
        thread: &mut Thread,
        context: Handle<Context>,
        args: &[Handle<Value>],
    ) -> Handle<Value> {
        (self.callable)(thread, context, args)
    }
}

/// A function bound to the context that was current when it was created.
#[derive(Debug, Clone, Copy)]
pub struct Closure {
    /// The captured context; empty for top-level closures.
    pub context: Handle<Context>,
    /// The underlying function.
    pub function: Handle<Function>,
}

impl Closure {
    /// Bind a function to a captured context.
    #[must_use]
    pub const fn new(context: Handle<Context>, function: Handle<Function>) -> Self {
        Self { context, function }
    }

    /// Allocate a closure with no captured context, for top-level
    /// functions handed to a thread.
    pub fn without_context(
        heap: &mut crate::heap::Heap,
        function: Handle<Function>,
    ) -> Result<Handle<Self>, crate::heap::HeapError> {
        heap.alloc_closure(Handle::empty(), function)
    }
}
