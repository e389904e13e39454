
use std::fmt::{Display, Error, Formatter};
use std::sync::Arc;

use program::{BinOp, Bound, IndexMode, Interpolation};

/// What a node computes. Operands are held by the node itself.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
	Binary(BinOp),
	Memo,
	Counter,
	Accum(AccumOptions),
	Data(BufferSource),
	Peek(PeekOptions),
	Poke,
	Param(ParamSpec),
	Delay,
}

/// Number of operands a primitive takes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
	Exactly(usize),
	AtLeast(usize),
}

impl Arity {
	pub fn accepts(self, count: usize) -> bool {
		match self {
			Arity::Exactly(n) => count == n,
			Arity::AtLeast(n) => count >= n,
		}
	}
}

impl Display for Arity {
	fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
		match *self {
			Arity::Exactly(n) => write!(f, "exactly {}", n),
			Arity::AtLeast(n) => write!(f, "at least {}", n),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PeekOptions {
	pub interpolation: Interpolation,
	pub mode: IndexMode,
}

impl PeekOptions {
	/// Exact sample lookup, index in samples.
	pub fn exact() -> PeekOptions {
		PeekOptions { interpolation: Interpolation::None, mode: IndexMode::Samples }
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccumOptions {
	pub min: f64,
	pub max: f64,
	pub initial: f64,
	pub bound: Bound,
}

impl Default for AccumOptions {
	fn default() -> Self {
		AccumOptions {
			min: 0.0,
			max: 1.0,
			initial: 0.0,
			bound: Bound::Wrap,
		}
	}
}

impl AccumOptions {
	pub fn with_max(max: f64) -> AccumOptions {
		AccumOptions { max, ..AccumOptions::default() }
	}
}

/// Contents of a data node.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferSource {
	Zeroed(usize),
	Samples(Arc<[f32]>),
}

impl BufferSource {
	pub fn length(&self) -> usize {
		match self {
			BufferSource::Zeroed(length) => *length,
			BufferSource::Samples(samples) => samples.len(),
		}
	}

	pub fn contents(&self) -> Option<Arc<[f32]>> {
		match self {
			BufferSource::Zeroed(_) => None,
			BufferSource::Samples(samples) => Some(samples.clone()),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
	pub name: String,
	pub default: f64,
	pub min: f64,
	pub max: f64,
}

impl NodeKind {
	/// Prefix of the names given to nodes of this kind.
	pub fn tag(&self) -> &'static str {
		use NodeKind::*;
		match self {
			Binary(op) => op.tag(),
			Memo => "memo",
			Counter => "counter",
			Accum(..) => "accum",
			Data(..) => "data",
			Peek(..) => "peek",
			Poke => "poke",
			Param(..) => "param",
			Delay => "ssd",
		}
	}

	/// Operand count at construction. A delay gets its operand from `Graph::bind`.
	pub fn arity(&self) -> Arity {
		use NodeKind::*;
		match self {
			Binary(BinOp::Add) | Binary(BinOp::Mul) => Arity::AtLeast(2),
			Binary(_) => Arity::Exactly(2),
			Memo => Arity::Exactly(1),
			Counter => Arity::Exactly(3),
			Accum(..) => Arity::Exactly(2),
			Data(..) | Param(..) | Delay => Arity::Exactly(0),
			Peek(..) => Arity::Exactly(2),
			Poke => Arity::Exactly(3),
		}
	}

	/// Position of the operand that must refer to a data node.
	pub fn buffer_operand(&self) -> Option<usize> {
		match self {
			NodeKind::Peek(..) | NodeKind::Poke => Some(0),
			_ => None,
		}
	}

	pub fn is_buffer(&self) -> bool {
		matches!(self, NodeKind::Data(..))
	}

	/// Nodes with an effect but no value; compiled after all outputs.
	pub fn is_sink(&self) -> bool {
		matches!(self, NodeKind::Poke)
	}

	/// Nodes carrying state from one tick to the next.
	pub fn is_stateful(&self) -> bool {
		matches!(self, NodeKind::Counter | NodeKind::Accum(..) | NodeKind::Delay)
	}
}
