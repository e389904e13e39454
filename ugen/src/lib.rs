
//! Graph construction and code generation for per-sample audio programs.

mod code_generator;
pub mod compiler;
pub mod effects;
pub mod graph;
pub mod names;
pub mod primitives;

pub use crate::compiler::{compile, CompileError, Compiler, Message, MessageCategory};
pub use crate::graph::{Graph, GraphError, Node, NodeId, Operand};
pub use crate::primitives::{AccumOptions, Arity, BufferSource, NodeKind, ParamSpec, PeekOptions};

pub use program;
