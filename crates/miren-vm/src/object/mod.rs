// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap object model.
//!
//! Anything too large for a NaN-boxed word lives on the heap as a
//! [`HeapObject`]: strings, functions (bytecode and native), closures and
//! lexical contexts. The object is a plain tagged variant; garbage
//! collection discovers references through [`HeapObject::for_each_reference`],
//! a match with one arm per variant.


mod context;
mod function;
mod string;

pub use context::{Context, ContextError};
pub use function::{BytecodeFunction, Closure, Function, NativeCallable, NativeFunction};
pub use string::HeapString;

use crate::value::{Handle, HandleType, HeapKind, Value};

/// A heap-allocated runtime value.
#[derive(Debug)]
pub enum HeapObject {
    /// An immutable string with a cached hash.
    String(HeapString),
    /// A callable function, bytecode or native.
    Function(Function),
    /// A function bound to its captured context.
    Closure(Closure),
    /// One lexical scope's bindings, linked to its parent.
    Context(Context),
}

impl HeapObject {
    /// The type name for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Closure(_) => "closure",
            Self::Context(_) => "context",
        }
    }

    /// Visit every handle stored inside this object.
    ///
    /// This is the traversal hook of the garbage collector: marking walks
    /// it to discover reachable objects, compaction walks it to rewrite
    /// forwarded handles.
    pub fn for_each_reference(&mut self, f: &mut dyn FnMut(&mut Handle<Value>)) {
        match self {
            Self::String(_) | Self::Function(Function::Native(_)) => {}
            Self::Function(Function::Bytecode(function)) => {
                for constant in function.chunk_mut().constants.iter_mut() {
                    f(constant);
                }
            }
            Self::Closure(closure) => {
                f(closure.context.erased_mut());
                f(closure.function.erased_mut());
            }
            Self::Context(context) => context.for_each_reference(f),
        }
    }
}

fn object_matches(handle: Handle<Value>, predicate: fn(&HeapObject) -> bool) -> bool {
    handle.resolved_slot().is_some_and(|slot| {
        // SAFETY: a non-empty pointer handle addresses a live slot owning
        // its object.
        predicate(unsafe { &*slot.as_ref().object_ptr() })
    })
}

impl HandleType for HeapString {
    fn matches(handle: Handle<Value>) -> bool {
        object_matches(handle, |object| matches!(object, HeapObject::String(_)))
    }
}

impl HeapKind for HeapString {
    fn select_ref(object: &HeapObject) -> Option<&Self> {
        match object {
            HeapObject::String(string) => Some(string),
            _ => None,
        }
    }

    fn select_mut(object: &mut HeapObject) -> Option<&mut Self> {
        match object {
            HeapObject::String(string) => Some(string),
            _ => None,
        }
    }
}

impl HandleType for Function {
    fn matches(handle: Handle<Value>) -> bool {
        object_matches(handle, |object| matches!(object, HeapObject::Function(_)))
    }
}

impl HeapKind for Function {
    fn select_ref(object: &HeapObject) -> Option<&Self> {
        match object {
            HeapObject::Function(function) => Some(function),
            _ => None,
        }
    }

    fn select_mut(object: &mut HeapObject) -> Option<&mut Self> {
        match object {
            HeapObject::Function(function) => Some(function),
            _ => None,
        }
    }
}

impl HandleType for Closure {
    fn matches(handle: Handle<Value>) -> bool {
        object_matches(handle, |object| matches!(object, HeapObject::Closure(_)))
    }
}

impl HeapKind for Closure {
    fn select_ref(object: &HeapObject) -> Option<&Self> {
        match object {
            HeapObject::Closure(closure) => Some(closure),
            _ => None,
        }
    }

    fn select_mut(object: &mut HeapObject) -> Option<&mut Self> {
        match object {
            HeapObject::Closure(closure) => Some(closure),
            _ => None,
        }
    }
}

impl HandleType for Context {
    fn matches(handle: Handle<Value>) -> bool {
        object_matches(handle, |object| matches!(object, HeapObject::Context(_)))
    }
}

impl HeapKind for Context {
    fn select_ref(object: &HeapObject) -> Option<&Self> {
        match object {
            HeapObject::Context(context) => Some(context),
            _ => None,
        }
    }

    fn select_mut(object: &mut HeapObject) -> Option<&mut Self> {
        match object {
            HeapObject::Context(context) => Some(context),
            _ => None,
        }
    }
}
