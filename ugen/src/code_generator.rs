
use std::collections::{HashMap, VecDeque};
use std::mem::take;

use tracing::{debug, trace};

use program::{BinOp, Bound, Buffer, BufferId, Cell, CellId, Expr, ParamId, Parameter, Program, Statement, VarId};

use crate::compiler::Compiler;
use crate::graph::{Graph, Node, NodeId, Operand};
use crate::primitives::NodeKind;

pub fn generate_code(compiler: &mut Compiler, outputs: &[NodeId]) -> Program {
	let mut cg = CodeGenerator::new(compiler);
	cg.generate_code_for_outputs(outputs);
	cg.report_unused();
	cg.finish()
}

/// What a generated node stands for in the program.
#[derive(Clone, Copy, Debug)]
enum Resolved {
	Var(VarId),
	Buffer(BufferId),
}

#[derive(Clone, Copy, Debug)]
enum StateKind {
	Cell(CellId),
	Buffer,
}

struct CodeGenerator<'graph, 'comp> {
	graph: &'graph Graph,
	compiler: &'comp mut Compiler<'graph>,

	program: Program,
	/// Variable declarations in dependency order
	body: Vec<Statement>,
	/// State updates, run after the whole body
	stores: Vec<Statement>,

	// Nodes already generated, by name
	memo: HashMap<&'graph str, Resolved>,
	// Program parameter for each parameter node
	param_id: HashMap<NodeId, ParamId>,
	// Queue for stateful nodes and sinks whose stores are still to be generated
	update_queue: VecDeque<(StateKind, NodeId)>,
}

impl<'graph, 'comp> CodeGenerator<'graph, 'comp> {
	fn new(compiler: &'comp mut Compiler<'graph>) -> CodeGenerator<'graph, 'comp> {
		let graph = compiler.graph();
		let mut program = Program::default();
		let mut param_id = HashMap::new();
		// Every parameter is declared, so controllers see the same set
		// whichever outputs are compiled.
		for &id in graph.parameters() {
			if let NodeKind::Param(spec) = graph[id].kind() {
				param_id.insert(id, ParamId(program.parameters.len()));
				program.parameters.push(Parameter {
					name: spec.name.clone(),
					default: spec.default,
					min: spec.min,
					max: spec.max,
				});
			}
		}

		CodeGenerator {
			graph,
			compiler,
			program,
			body: vec![],
			stores: vec![],
			memo: HashMap::new(),
			param_id,
			update_queue: VecDeque::new(),
		}
	}

	fn generate_code_for_outputs(&mut self, outputs: &[NodeId]) {
		for &out in outputs {
			match self.generate(out) {
				Some(Resolved::Var(var)) => self.program.outputs.push(var),
				_ => {
					let name = self.graph.name(out);
					self.compiler.report_internal_error(Some(name), "Output did not produce a variable.");
				},
			}
		}

		for &sink in self.graph.sinks() {
			self.update_queue.push_back((StateKind::Buffer, sink));
		}
		while let Some((kind, id)) = self.update_queue.pop_front() {
			self.generate_update(kind, id);
		}
	}

	fn finish(mut self) -> Program {
		let mut statements = take(&mut self.body);
		statements.append(&mut self.stores);
		self.program.statements = statements;
		self.program
	}

	fn report_unused(&mut self) {
		let graph = self.graph;
		for (_, node) in graph.nodes() {
			if self.memo.contains_key(node.name()) {
				continue;
			}
			match node.kind() {
				NodeKind::Param(spec) => {
					let text = format!("Parameter '{}' is never read.", spec.name);
					self.compiler.report_warning(Some(node.name()), text);
				},
				NodeKind::Delay => {
					self.compiler.report_warning(Some(node.name()), "Delay is never read.");
				},
				_ => {},
			}
		}
	}

	/// Generate a node unless already generated, returning its handle.
	fn generate(&mut self, id: NodeId) -> Option<Resolved> {
		let graph = self.graph;
		let node = &graph[id];
		if let Some(&resolved) = self.memo.get(node.name()) {
			trace!(node = %node.name(), "memo hit");
			return Some(resolved);
		}

		let resolved = match node.kind() {
			NodeKind::Data(source) => {
				let buffer = BufferId(self.program.buffers.len());
				self.program.buffers.push(Buffer {
					name: node.name().to_string(),
					length: source.length(),
					contents: source.contents(),
				});
				debug!(node = %node.name(), length = source.length(), "buffer declared");
				Resolved::Buffer(buffer)
			},
			NodeKind::Poke => {
				self.compiler.report_internal_error(Some(node.name()), "Sink used as a value.");
				return None;
			},
			_ => {
				let expr = self.generate_expression(id, node);
				let var = self.declare(node.name(), expr);
				Resolved::Var(var)
			},
		};
		self.memo.insert(node.name(), resolved);
		Some(resolved)
	}

	fn declare(&mut self, name: &str, expr: Expr) -> VarId {
		let var = VarId(self.program.variables.len());
		self.program.variables.push(name.to_string());
		debug!(node = name, "{}", self.program.expression(&expr));
		self.body.push(Statement::Let { var, expr });
		var
	}

	fn declare_cell(&mut self, id: NodeId, initial: f64) -> CellId {
		let cell = CellId(self.program.cells.len());
		self.program.cells.push(Cell {
			name: self.graph.name(id).to_string(),
			initial,
		});
		self.update_queue.push_back((StateKind::Cell(cell), id));
		cell
	}

	fn generate_expression(&mut self, id: NodeId, node: &'graph Node) -> Expr {
		let operands = node.operands();
		match node.kind() {
			NodeKind::Binary(op) => {
				if operands.iter().all(Operand::is_literal) {
					// Known at compile time
					let mut values = operands.iter().filter_map(Operand::as_literal);
					let first = values.next().unwrap_or(0.0);
					return Expr::Constant(values.fold(first, |acc, v| op.apply(acc, v)));
				}
				let mut exprs = operands.iter().map(|&o| self.resolve(o)).collect::<Vec<_>>().into_iter();
				let first = exprs.next().unwrap_or(Expr::Constant(0.0));
				exprs.fold(first, |acc, e| Expr::binary(*op, acc, e))
			},
			NodeKind::Memo => self.resolve(operands[0]),
			NodeKind::Counter => {
				let initial = operands[1].as_literal().unwrap_or(0.0);
				Expr::Cell(self.declare_cell(id, initial))
			},
			NodeKind::Accum(options) => {
				let cell = Expr::Cell(self.declare_cell(id, options.initial));
				match operands[1] {
					Operand::Literal(reset) if reset >= 1.0 => Expr::Constant(options.min),
					Operand::Literal(_) => cell,
					reset => {
						let reset = self.resolve(reset);
						let condition = Expr::binary(BinOp::GreaterEq, reset, Expr::Constant(1.0));
						Expr::select(condition, Expr::Constant(options.min), cell)
					},
				}
			},
			NodeKind::Peek(options) => {
				let buffer = self.resolve_buffer(node, operands[0]);
				let index = self.resolve(operands[1]);
				Expr::BufferRead {
					buffer,
					index: Box::new(index),
					interpolation: options.interpolation,
					mode: options.mode,
				}
			},
			NodeKind::Param(..) => match self.param_id.get(&id) {
				Some(&param) => Expr::Param(param),
				None => {
					self.compiler.report_internal_error(Some(node.name()), "Undeclared parameter.");
					Expr::Constant(0.0)
				},
			},
			// The previous tick's value. The input is stored after the body.
			NodeKind::Delay => Expr::Cell(self.declare_cell(id, 0.0)),
			NodeKind::Data(..) | NodeKind::Poke => {
				self.compiler.report_internal_error(Some(node.name()), "Node has no expression.");
				Expr::Constant(0.0)
			},
		}
	}

	fn generate_update(&mut self, kind: StateKind, id: NodeId) {
		let graph = self.graph;
		let node = &graph[id];
		let operands = node.operands();
		let statement = match (kind, node.kind()) {
			(StateKind::Cell(cell), NodeKind::Counter) => {
				let current = self.resolve(Operand::Reference(id));
				let increment = self.resolve(operands[0]);
				let min = self.resolve(operands[1]);
				let max = self.resolve(operands[2]);
				let next = Expr::binary(BinOp::Add, current, increment);
				Statement::CellStore { cell, expr: Expr::bounded(Bound::Wrap, next, min, max) }
			},
			(StateKind::Cell(cell), NodeKind::Accum(options)) => {
				let current = self.resolve(Operand::Reference(id));
				let increment = self.resolve(operands[0]);
				let next = Expr::binary(BinOp::Add, current, increment);
				let expr = Expr::bounded(options.bound, next,
					Expr::Constant(options.min), Expr::Constant(options.max));
				Statement::CellStore { cell, expr }
			},
			(StateKind::Cell(cell), NodeKind::Delay) => match operands.first() {
				Some(&input) => Statement::CellStore { cell, expr: self.resolve(input) },
				None => {
					self.compiler.report_internal_error(Some(node.name()), "Unbound delay reached generation.");
					return;
				},
			},
			(StateKind::Buffer, NodeKind::Poke) => {
				let buffer = self.resolve_buffer(node, operands[0]);
				let value = self.resolve(operands[1]);
				let index = self.resolve(operands[2]);
				Statement::BufferStore { buffer, index, value }
			},
			_ => {
				self.compiler.report_internal_error(Some(node.name()), "Node has no state to store.");
				return;
			},
		};
		debug!(node = %node.name(), "{}", self.program.statement(&statement));
		self.stores.push(statement);
	}

	fn resolve(&mut self, operand: Operand) -> Expr {
		match operand {
			Operand::Literal(value) => Expr::Constant(value),
			Operand::Reference(id) => match self.generate(id) {
				Some(Resolved::Var(var)) => Expr::Var(var),
				_ => {
					let name = self.graph.name(id);
					self.compiler.report_internal_error(Some(name), "Expected a value.");
					Expr::Constant(0.0)
				},
			},
		}
	}

	fn resolve_buffer(&mut self, node: &Node, operand: Operand) -> BufferId {
		if let Operand::Reference(id) = operand {
			if let Some(Resolved::Buffer(buffer)) = self.generate(id) {
				return buffer;
			}
		}
		self.compiler.report_internal_error(Some(node.name()), "Expected a buffer.");
		BufferId(0)
	}
}

#[cfg(test)]
mod tests {
	use crate::compiler::compile;
	use crate::graph::Graph;
	use crate::operands;
	use crate::primitives::{AccumOptions, PeekOptions};
	use program::{Bound, Expr, IndexMode, Interpolation, Machine, Program, Statement, VarId};

	fn lines(program: &Program) -> Vec<String> {
		program.statements.iter().map(|s| program.statement(s).to_string()).collect()
	}

	#[test]
	fn literal_comparisons_fold() {
		let mut graph = Graph::new();
		let lower = graph.gt(3.0, 5.0).unwrap();
		let higher = graph.gt(7.0, 2.0).unwrap();
		let program = compile(&graph, &[lower, higher]).unwrap();
		assert_eq!(lines(&program), vec!["let gt1 = 0", "let gt2 = 1"]);
		assert_eq!(program.statements[0], Statement::Let { var: VarId(0), expr: Expr::Constant(0.0) });
	}

	#[test]
	fn references_defer_comparison() {
		let mut graph = Graph::new();
		let level = graph.param("level", 0.5, 0.0, 10.0).unwrap();
		let above = graph.gt(level, 3.0).unwrap();
		let program = compile(&graph, &[above]).unwrap();
		assert_eq!(lines(&program), vec![
			"let param1 = level",
			"let gt2 = (param1 > 3 ? 1 : 0)",
		]);
	}

	#[test]
	fn folding_is_per_node() {
		let mut graph = Graph::new();
		let constant = graph.mul(operands![2.0, 3.0, 4.0]).unwrap();
		let level = graph.param("level", 0.0, 0.0, 1.0).unwrap();
		let sum = graph.add(operands![constant, level, 1.0]).unwrap();
		let program = compile(&graph, &[sum]).unwrap();
		assert_eq!(lines(&program), vec![
			"let mul1 = 24",
			"let param2 = level",
			"let add3 = ((mul1 + param2) + 1)",
		]);
	}

	#[test]
	fn shared_node_is_emitted_once() {
		let mut graph = Graph::new();
		let level = graph.param("level", 0.0, 0.0, 1.0).unwrap();
		let shared = graph.mul(operands![level, 0.5]).unwrap();
		let left = graph.add(operands![shared, 1.0]).unwrap();
		let right = graph.sub(shared, 1.0).unwrap();
		let out = graph.mul(operands![left, right]).unwrap();
		let program = compile(&graph, &[out, shared]).unwrap();
		assert_eq!(lines(&program), vec![
			"let param1 = level",
			"let mul2 = (param1 * 0.5)",
			"let add3 = (mul2 + 1)",
			"let sub4 = (mul2 - 1)",
			"let mul5 = (add3 * sub4)",
		]);
		assert_eq!(program.outputs, vec![VarId(4), VarId(1)]);
	}

	#[test]
	fn delay_reads_before_it_stores() {
		// One-pole feedback: y = x + 0.5 * y[n-1]
		let mut graph = Graph::new();
		let input = graph.param("input", 0.0, -1.0, 1.0).unwrap();
		let last = graph.delay().unwrap();
		let scaled = graph.mul(operands![last, 0.5]).unwrap();
		let out = graph.add(operands![input, scaled]).unwrap();
		graph.bind(last, out).unwrap();

		let program = compile(&graph, &[out]).unwrap();
		assert_eq!(lines(&program), vec![
			"let param1 = input",
			"let ssd2 = cell ssd2",
			"let mul3 = (ssd2 * 0.5)",
			"let add4 = (param1 + mul3)",
			"store ssd2 <- add4",
		]);

		let mut machine = Machine::new(program);
		machine.set_parameter("input", 1.0).unwrap();
		assert_eq!(machine.render(3), vec![1.0, 1.5, 1.75]);
	}

	#[test]
	fn counter_and_accumulator_store_after_body() {
		let mut graph = Graph::new();
		let index = graph.counter(1.0, 0.0, 3.0).unwrap();
		let trigger = graph.param("trigger", 0.0, 0.0, 1.0).unwrap();
		let phase = graph.accum(0.25, trigger, AccumOptions::default()).unwrap();
		let out = graph.add(operands![index, phase]).unwrap();
		let program = compile(&graph, &[out]).unwrap();
		assert_eq!(lines(&program), vec![
			"let counter1 = cell counter1",
			"let param2 = trigger",
			"let accum3 = ((param2 >= 1 ? 1 : 0) ? 0 : cell accum3)",
			"let add4 = (counter1 + accum3)",
			"store counter1 <- wrap((counter1 + 1), 0, 3)",
			"store accum3 <- wrap((accum3 + 0.25), 0, 1)",
		]);

		let mut machine = Machine::new(program);
		assert_eq!(machine.render(4), vec![0.0, 1.25, 2.5, 0.75]);
		machine.set_parameter("trigger", 1.0).unwrap();
		assert_eq!(machine.render(1), vec![1.0]);
	}

	#[test]
	fn poke_comes_after_peek_of_same_buffer() {
		let mut graph = Graph::new();
		let buffer = graph.data(2).unwrap();
		let index = graph.counter(1.0, 0.0, 2.0).unwrap();
		let read = graph.peek(buffer, index, PeekOptions::exact()).unwrap();
		let next = graph.add(operands![read, 1.0]).unwrap();
		graph.poke(buffer, next, index).unwrap();

		let program = compile(&graph, &[read]).unwrap();
		assert_eq!(lines(&program), vec![
			"let counter2 = cell counter2",
			"let peek3 = peek(data1, counter2, none, samples)",
			"let add4 = (peek3 + 1)",
			"store counter2 <- wrap((counter2 + 1), 0, 2)",
			"poke data1[counter2] <- add4",
		]);
		assert_eq!(program.buffers.len(), 1);

		let mut machine = Machine::new(program);
		assert_eq!(machine.render(6), vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
	}

	#[test]
	fn clamped_accumulator_holds_at_max() {
		let mut graph = Graph::new();
		let options = AccumOptions { bound: Bound::Clamp, ..AccumOptions::default() };
		let level = graph.accum(0.25, 0.0, options).unwrap();
		let program = compile(&graph, &[level]).unwrap();
		assert_eq!(lines(&program), vec![
			"let accum1 = cell accum1",
			"store accum1 <- clamp((accum1 + 0.25), 0, 1)",
		]);

		let mut machine = Machine::new(program);
		assert_eq!(machine.render(6), vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0]);
	}

	#[test]
	fn linear_peek_blends_and_wraps() {
		let mut graph = Graph::new();
		let buffer = graph.data_from_samples(vec![0.0f32, 1.0, 2.0, 3.0]).unwrap();
		let index = graph.param("index", 0.0, -8.0, 8.0).unwrap();
		let read = graph.peek(buffer, index, PeekOptions::default()).unwrap();
		let program = compile(&graph, &[read]).unwrap();
		assert_eq!(lines(&program), vec![
			"let param2 = index",
			"let peek3 = peek(data1, param2, linear, samples)",
		]);

		let mut machine = Machine::new(program);
		for &(index, expected) in &[(1.5, 1.5), (0.25, 0.25), (3.5, 1.5), (-0.5, 1.5)] {
			machine.set_parameter("index", index).unwrap();
			assert_eq!(machine.tick()[0], expected, "index {}", index);
		}
	}

	#[test]
	fn phase_peek_scales_by_length() {
		let mut graph = Graph::new();
		let buffer = graph.data_from_samples(vec![0.0f32, 1.0, 2.0, 3.0]).unwrap();
		let phase = graph.param("phase", 0.0, -2.0, 2.0).unwrap();
		let options = PeekOptions { interpolation: Interpolation::None, mode: IndexMode::Phase };
		let read = graph.peek(buffer, phase, options).unwrap();
		let program = compile(&graph, &[read]).unwrap();
		assert_eq!(lines(&program)[1], "let peek3 = peek(data1, param2, none, phase)");

		let mut machine = Machine::new(program);
		for &(phase, expected) in &[(0.5, 2.0), (0.8, 3.0), (1.25, 1.0), (-0.25, 3.0)] {
			machine.set_parameter("phase", phase).unwrap();
			assert_eq!(machine.tick()[0], expected, "phase {}", phase);
		}
	}

	#[test]
	fn counter_with_parameter_bounds_starts_at_zero() {
		let mut graph = Graph::new();
		let lo = graph.param("lo", 2.0, 0.0, 8.0).unwrap();
		let hi = graph.param("hi", 5.0, 0.0, 8.0).unwrap();
		let index = graph.counter(1.0, lo, hi).unwrap();
		let program = compile(&graph, &[index]).unwrap();
		assert_eq!(lines(&program), vec![
			"let counter3 = cell counter3",
			"let param1 = lo",
			"let param2 = hi",
			"store counter3 <- wrap((counter3 + 1), param1, param2)",
		]);
		assert_eq!(program.cells[0].initial, 0.0);

		let mut machine = Machine::new(program);
		assert_eq!(machine.render(6), vec![0.0, 4.0, 2.0, 3.0, 4.0, 2.0]);
		machine.set_parameter("hi", 3.0).unwrap();
		assert_eq!(machine.render(3), vec![3.0, 2.0, 2.0]);
	}
}
