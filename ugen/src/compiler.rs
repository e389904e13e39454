
use std::fmt::{Display, Error, Formatter};

use tracing::{info, warn};

use program::Program;

use crate::code_generator::generate_code;
use crate::graph::{Graph, NodeId};
use crate::primitives::NodeKind;

/// Compiles the nodes reachable from a set of outputs into a program.
pub struct Compiler<'graph> {
	graph: &'graph Graph,
	messages: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
	pub category: MessageCategory,
	/// Name of the node the message is about.
	pub node: Option<String>,
	pub text: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageCategory {
	Error,
	InternalError,
	Warning,
}

impl MessageCategory {
	fn as_text(self) -> &'static str {
		use MessageCategory::*;
		match self {
			Error => "Error",
			InternalError => "Internal error",
			Warning => "Warning",
		}
	}

	pub fn is_error(self) -> bool {
		self != MessageCategory::Warning
	}
}

impl Display for Message {
	fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
		match &self.node {
			Some(node) => write!(f, "{}: {}: {}", self.category.as_text(), node, self.text),
			None => write!(f, "{}: {}", self.category.as_text(), self.text),
		}
	}
}

/// All messages of a failed compilation, errors and warnings alike.
#[derive(Clone, Debug)]
pub struct CompileError {
	messages: Vec<Message>,
}

impl CompileError {
	pub fn messages(&self) -> &[Message] {
		&self.messages
	}

	pub fn errors(&self) -> impl Iterator<Item = &Message> {
		self.messages.iter().filter(|m| m.category.is_error())
	}
}

impl Display for CompileError {
	fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
		let mut first = true;
		for message in &self.messages {
			if !first {
				writeln!(f)?;
			}
			write!(f, "{}", message)?;
			first = false;
		}
		Ok(())
	}
}

impl std::error::Error for CompileError {}

impl IntoIterator for CompileError {
	type Item = Message;
	type IntoIter = std::vec::IntoIter<Message>;

	fn into_iter(self) -> Self::IntoIter {
		self.messages.into_iter()
	}
}

/// Compile `outputs` of `graph` in a fresh session.
pub fn compile(graph: &Graph, outputs: &[NodeId]) -> Result<Program, CompileError> {
	Compiler::new(graph).compile(outputs)
}

impl<'graph> Compiler<'graph> {
	pub fn new(graph: &'graph Graph) -> Compiler<'graph> {
		Compiler {
			graph,
			messages: vec![],
		}
	}

	pub fn graph(&self) -> &'graph Graph {
		self.graph
	}

	pub fn compile(&mut self, outputs: &[NodeId]) -> Result<Program, CompileError> {
		self.messages.clear();
		self.check_outputs(outputs);
		self.check_delays();
		self.check_errors()?;

		let program = generate_code(self, outputs);
		self.check_errors()?;

		info!(
			statements = program.statements.len(),
			cells = program.cells.len(),
			buffers = program.buffers.len(),
			parameters = program.parameters.len(),
			"compiled program"
		);
		Ok(program)
	}

	/// Warnings reported by the last compilation.
	pub fn warnings(&self) -> impl Iterator<Item = &Message> {
		self.messages.iter().filter(|m| !m.category.is_error())
	}

	fn check_outputs(&mut self, outputs: &[NodeId]) {
		if outputs.is_empty() {
			self.report_error(None, "No outputs requested.");
		}
		let graph = self.graph;
		for &out in outputs {
			match graph.get(out) {
				Some(node) if node.kind().is_buffer() || node.kind().is_sink() => {
					self.report_error(Some(node.name()), "Output has no value.");
				},
				Some(_) => {},
				None => {
					self.report_error(None, format!("Output refers to unknown node #{}.", out.index()));
				},
			}
		}
	}

	fn check_delays(&mut self) {
		let graph = self.graph;
		for (id, node) in graph.nodes() {
			if *node.kind() == NodeKind::Delay && !graph.is_bound(id) {
				self.report_error(Some(node.name()), "Delay is never bound to an input.");
			}
		}
	}

	fn report<S: Into<String>>(&mut self, category: MessageCategory, node: Option<&str>, text: S) {
		let message = Message {
			category,
			node: node.map(|n| n.to_string()),
			text: text.into(),
		};
		if category == MessageCategory::Warning {
			warn!("{}", message);
		}
		self.messages.push(message);
	}

	pub fn report_error<S: Into<String>>(&mut self, node: Option<&str>, text: S) {
		self.report(MessageCategory::Error, node, text)
	}

	pub fn report_internal_error<S: Into<String>>(&mut self, node: Option<&str>, text: S) {
		self.report(MessageCategory::InternalError, node, text)
	}

	pub fn report_warning<S: Into<String>>(&mut self, node: Option<&str>, text: S) {
		self.report(MessageCategory::Warning, node, text)
	}

	fn check_errors(&self) -> Result<(), CompileError> {
		if self.messages.iter().any(|m| m.category.is_error()) {
			Err(CompileError { messages: self.messages.clone() })
		} else {
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operands;

	#[test]
	fn unbound_delay_fails_before_generation() {
		let mut graph = Graph::new();
		let delay = graph.delay().unwrap();
		let out = graph.add(operands![delay, 1.0]).unwrap();
		let err = compile(&graph, &[out]).unwrap_err();
		let messages: Vec<String> = err.into_iter().map(|m| m.to_string()).collect();
		assert_eq!(messages, vec!["Error: ssd1: Delay is never bound to an input."]);
	}

	#[test]
	fn outputs_must_be_values() {
		let mut graph = Graph::new();
		let buffer = graph.data(4).unwrap();
		let poke = graph.poke(buffer, 1.0, 0.0).unwrap();
		let err = compile(&graph, &[buffer, poke]).unwrap_err();
		assert_eq!(err.errors().count(), 2);
		assert!(compile(&graph, &[]).is_err());
	}

	#[test]
	fn outputs_from_another_graph_are_rejected() {
		let mut graph = Graph::new();
		graph.gt(1.0, 2.0).unwrap();
		let mut other = Graph::new();
		let foreign = other.gt(3.0, 4.0).unwrap();
		let err = compile(&graph, &[foreign]).unwrap_err();
		let messages: Vec<String> = err.into_iter().map(|m| m.to_string()).collect();
		assert_eq!(messages, vec!["Error: Output refers to unknown node #0."]);
	}

	#[test]
	fn unused_parts_give_warnings() {
		let mut graph = Graph::new();
		graph.param("unused", 0.0, 0.0, 1.0).unwrap();
		let delay = graph.delay().unwrap();
		graph.bind(delay, 0.5).unwrap();
		let out = graph.gt(1.0, 2.0).unwrap();

		let mut compiler = Compiler::new(&graph);
		let program = compiler.compile(&[out]).unwrap();
		let warnings: Vec<String> = compiler.warnings().map(|m| m.to_string()).collect();
		assert_eq!(warnings, vec![
			"Warning: param1: Parameter 'unused' is never read.",
			"Warning: ssd2: Delay is never read.",
		]);
		assert_eq!(program.parameters.len(), 1);
		assert!(program.cells.is_empty());
	}
}
