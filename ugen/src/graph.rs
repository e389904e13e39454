
use std::ops::Index;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use program::BinOp;

use crate::names::Names;
use crate::primitives::*;

/// Handle of a node inside the graph that created it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId {
	graph: u32,
	index: usize,
}

impl NodeId {
	#[cfg(test)]
	pub(crate) fn from_index(index: usize) -> NodeId {
		NodeId { graph: 0, index }
	}

	pub fn index(self) -> usize {
		self.index
	}
}

// Source of graph identities, so handles from one graph are rejected by another
static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Input of a node: a constant known while building the graph, or the output of another node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
	Literal(f64),
	Reference(NodeId),
}

impl Operand {
	pub fn is_literal(&self) -> bool {
		matches!(self, Operand::Literal(_))
	}

	pub fn as_literal(&self) -> Option<f64> {
		match *self {
			Operand::Literal(value) => Some(value),
			Operand::Reference(_) => None,
		}
	}
}

impl From<f64> for Operand {
	fn from(value: f64) -> Self {
		Operand::Literal(value)
	}
}

impl From<NodeId> for Operand {
	fn from(node: NodeId) -> Self {
		Operand::Reference(node)
	}
}

/// Build an operand list from literals and node ids.
#[macro_export]
macro_rules! operands {
	{ $($o:expr),* $(,)? } => {
		vec![$($crate::Operand::from($o)),*]
	};
}

#[derive(Clone, Debug)]
pub struct Node {
	name: String,
	kind: NodeKind,
	operands: Vec<Operand>,
}

impl Node {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> &NodeKind {
		&self.kind
	}

	pub fn operands(&self) -> &[Operand] {
		&self.operands
	}
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GraphError {
	#[error("'{tag}' takes {expected} operands, got {actual}")]
	Arity { tag: &'static str, expected: Arity, actual: usize },

	#[error("reference to unknown node #{0}")]
	UnknownNode(usize),

	#[error("'{tag}' expects a data node as its buffer operand")]
	ExpectedBuffer { tag: &'static str },

	#[error("buffer '{name}' cannot be used as a value")]
	BufferAsValue { name: String },

	#[error("'{name}' has no value")]
	NotAValue { name: String },

	#[error("division by literal zero")]
	DivisionByZero,

	#[error("a buffer must hold at least one sample")]
	EmptyBuffer,

	#[error("parameter '{0}' is already defined")]
	DuplicateParameter(String),

	#[error("parameter '{name}': default {default} must lie within [{min}, {max}]")]
	InvalidParameterRange { name: String, default: f64, min: f64, max: f64 },

	#[error("'{name}' is not a delay")]
	NotADelay { name: String },

	#[error("delay '{name}' is already bound")]
	AlreadyBound { name: String },
}

/// A compile session: the nodes built so far and the names given to them.
///
/// Every constructor checks its operands before adding anything, so a
/// failed call leaves the graph as it was. Composite builders get the
/// same guarantee through `Graph::atomically`.
#[derive(Clone, Debug)]
pub struct Graph {
	id: u32,
	nodes: Vec<Node>,
	names: Names,
	// Parameter nodes in declaration order
	parameters: Vec<NodeId>,
	// Nodes with side effects only, in construction order
	sinks: Vec<NodeId>,
}

impl Index<NodeId> for Graph {
	type Output = Node;

	fn index(&self, id: NodeId) -> &Node {
		debug_assert_eq!(id.graph, self.id, "node id from another graph");
		&self.nodes[id.index]
	}
}

impl Default for Graph {
	fn default() -> Self {
		Graph {
			id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
			nodes: vec![],
			names: Names::default(),
			parameters: vec![],
			sinks: vec![],
		}
	}
}

impl Graph {
	pub fn new() -> Graph {
		Graph::default()
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn get(&self, id: NodeId) -> Option<&Node> {
		if id.graph != self.id {
			return None;
		}
		self.nodes.get(id.index)
	}

	pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
		let graph = self.id;
		self.nodes.iter().enumerate().map(move |(index, node)| (NodeId { graph, index }, node))
	}

	/// Look up a node by its generated name.
	pub fn lookup(&self, name: &str) -> Option<NodeId> {
		self.names.lookup(name)
	}

	pub fn name(&self, id: NodeId) -> &str {
		self[id].name()
	}

	pub fn parameters(&self) -> &[NodeId] {
		&self.parameters
	}

	pub fn sinks(&self) -> &[NodeId] {
		&self.sinks
	}

	/// Number of samples held by a data node.
	pub fn buffer_length(&self, id: NodeId) -> Option<usize> {
		match self.get(id)?.kind() {
			NodeKind::Data(source) => Some(source.length()),
			_ => None,
		}
	}

	pub fn is_bound(&self, delay: NodeId) -> bool {
		self.get(delay).map_or(false, |node| {
			node.kind == NodeKind::Delay && !node.operands.is_empty()
		})
	}

	/// Add a node of any kind. All other constructors go through here.
	pub fn add_node(&mut self, kind: NodeKind, operands: Vec<Operand>) -> Result<NodeId, GraphError> {
		let expected = kind.arity();
		if !expected.accepts(operands.len()) {
			return Err(GraphError::Arity { tag: kind.tag(), expected, actual: operands.len() });
		}
		for (position, &operand) in operands.iter().enumerate() {
			if kind.buffer_operand() == Some(position) {
				self.check_buffer_operand(&kind, operand)?;
			} else {
				self.check_value_operand(operand)?;
			}
		}
		match &kind {
			NodeKind::Binary(BinOp::Div) if operands[1] == Operand::Literal(0.0) => {
				return Err(GraphError::DivisionByZero);
			},
			NodeKind::Data(source) if source.length() == 0 => {
				return Err(GraphError::EmptyBuffer);
			},
			NodeKind::Param(spec) => self.check_parameter(spec)?,
			_ => {},
		}

		let id = NodeId { graph: self.id, index: self.nodes.len() };
		let name = self.names.allocate(kind.tag(), id);
		trace!(node = %name, operands = operands.len(), "node created");
		if let NodeKind::Param(..) = kind {
			self.parameters.push(id);
		}
		if kind.is_sink() {
			self.sinks.push(id);
		}
		self.nodes.push(Node { name, kind, operands });
		Ok(id)
	}

	fn node_checked(&self, id: NodeId) -> Result<&Node, GraphError> {
		self.get(id).ok_or(GraphError::UnknownNode(id.index))
	}

	/// Run a composite builder. If it fails, every node it added is removed
	/// again, names included.
	pub fn atomically<T, F>(&mut self, build: F) -> Result<T, GraphError>
		where F: FnOnce(&mut Graph) -> Result<T, GraphError>
	{
		let saved = self.clone();
		let result = build(self);
		if result.is_err() {
			*self = saved;
		}
		result
	}

	fn check_value_operand(&self, operand: Operand) -> Result<(), GraphError> {
		if let Operand::Reference(id) = operand {
			let node = self.node_checked(id)?;
			if node.kind.is_buffer() {
				return Err(GraphError::BufferAsValue { name: node.name.clone() });
			}
			if node.kind.is_sink() {
				return Err(GraphError::NotAValue { name: node.name.clone() });
			}
		}
		Ok(())
	}

	fn check_buffer_operand(&self, kind: &NodeKind, operand: Operand) -> Result<(), GraphError> {
		match operand {
			Operand::Reference(id) if self.node_checked(id)?.kind.is_buffer() => Ok(()),
			_ => Err(GraphError::ExpectedBuffer { tag: kind.tag() }),
		}
	}

	fn check_parameter(&self, spec: &ParamSpec) -> Result<(), GraphError> {
		let duplicate = self.parameters.iter().any(|&id| match &self[id].kind {
			NodeKind::Param(existing) => existing.name == spec.name,
			_ => false,
		});
		if duplicate {
			return Err(GraphError::DuplicateParameter(spec.name.clone()));
		}
		let finite = spec.default.is_finite() && spec.min.is_finite() && spec.max.is_finite();
		if !finite || spec.min > spec.max || spec.default < spec.min || spec.default > spec.max {
			return Err(GraphError::InvalidParameterRange {
				name: spec.name.clone(),
				default: spec.default,
				min: spec.min,
				max: spec.max,
			});
		}
		Ok(())
	}

	pub fn binary(&mut self, op: BinOp, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Binary(op), vec![a.into(), b.into()])
	}

	/// Sum of two or more operands.
	pub fn add(&mut self, operands: Vec<Operand>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Binary(BinOp::Add), operands)
	}

	/// Product of two or more operands.
	pub fn mul(&mut self, operands: Vec<Operand>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Binary(BinOp::Mul), operands)
	}

	pub fn sub(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Sub, a, b)
	}

	pub fn div(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Div, a, b)
	}

	pub fn min(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Min, a, b)
	}

	pub fn max(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Max, a, b)
	}

	pub fn gt(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Greater, a, b)
	}

	pub fn gte(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::GreaterEq, a, b)
	}

	pub fn lt(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Less, a, b)
	}

	pub fn lte(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::LessEq, a, b)
	}

	pub fn eq(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Eq, a, b)
	}

	pub fn neq(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.binary(BinOp::Neq, a, b)
	}

	/// Give a value its own variable, so consumers share one computation.
	pub fn memo(&mut self, input: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Memo, vec![input.into()])
	}

	/// Index advancing by `increment` each tick, wrapping into `[min, max)`.
	pub fn counter(&mut self, increment: impl Into<Operand>,
			min: impl Into<Operand>, max: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Counter, vec![increment.into(), min.into(), max.into()])
	}

	/// Running sum; `reset` at or above 1 restarts from `options.min`.
	pub fn accum(&mut self, increment: impl Into<Operand>, reset: impl Into<Operand>,
			options: AccumOptions) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Accum(options), vec![increment.into(), reset.into()])
	}

	/// Zero-filled buffer.
	pub fn data(&mut self, length: usize) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Data(BufferSource::Zeroed(length)), vec![])
	}

	/// Buffer holding samples supplied by a loader.
	pub fn data_from_samples(&mut self, samples: impl Into<Arc<[f32]>>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Data(BufferSource::Samples(samples.into())), vec![])
	}

	pub fn peek(&mut self, buffer: NodeId, index: impl Into<Operand>,
			options: PeekOptions) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Peek(options), vec![buffer.into(), index.into()])
	}

	/// Write `value` at `index` at the end of every tick.
	pub fn poke(&mut self, buffer: NodeId, value: impl Into<Operand>,
			index: impl Into<Operand>) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Poke, vec![buffer.into(), value.into(), index.into()])
	}

	pub fn param(&mut self, name: &str, default: f64, min: f64, max: f64) -> Result<NodeId, GraphError> {
		let spec = ParamSpec { name: name.into(), default, min, max };
		self.add_node(NodeKind::Param(spec), vec![])
	}

	/// Single-sample delay with its input left open. Wire it with `bind`
	/// once the nodes computing the input exist.
	pub fn delay(&mut self) -> Result<NodeId, GraphError> {
		self.add_node(NodeKind::Delay, vec![])
	}

	pub fn bind(&mut self, delay: NodeId, input: impl Into<Operand>) -> Result<(), GraphError> {
		let input = input.into();
		let node = self.node_checked(delay)?;
		if node.kind != NodeKind::Delay {
			return Err(GraphError::NotADelay { name: node.name.clone() });
		}
		if !node.operands.is_empty() {
			return Err(GraphError::AlreadyBound { name: node.name.clone() });
		}
		self.check_value_operand(input)?;
		trace!(node = %node.name, "delay bound");
		self.nodes[delay.index].operands.push(input);
		Ok(())
	}
}
