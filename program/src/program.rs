use std::fmt::{Display, Error, Formatter};
use std::sync::Arc;

use crate::expression::*;

/// A compiled per-sample program.
#[derive(Clone, Debug, Default)]
pub struct Program {
	// Externally controlled values
	pub parameters: Vec<Parameter>,
	// Sample buffers
	pub buffers: Vec<Buffer>,
	// State carried from one tick to the next
	pub cells: Vec<Cell>,
	// Variable names, indexed by VarId
	pub variables: Vec<String>,
	// Statements in execution order
	pub statements: Vec<Statement>,
	// Variables holding the output samples
	pub outputs: Vec<VarId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
	pub name: String,
	pub default: f64,
	pub min: f64,
	pub max: f64,
}

#[derive(Clone, Debug)]
pub struct Buffer {
	pub name: String,
	pub length: usize,
	/// Initial contents, zero-filled when absent.
	pub contents: Option<Arc<[f32]>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
	pub name: String,
	pub initial: f64,
}

impl Program {
	pub fn variable_name(&self, var: VarId) -> &str {
		&self.variables[var.0]
	}

	pub fn find_variable(&self, name: &str) -> Option<VarId> {
		self.variables.iter().position(|v| v == name).map(VarId)
	}

	pub fn find_parameter(&self, name: &str) -> Option<ParamId> {
		self.parameters.iter().position(|p| p.name == name).map(ParamId)
	}

	pub fn find_buffer(&self, name: &str) -> Option<BufferId> {
		self.buffers.iter().position(|b| b.name == name).map(BufferId)
	}

	/// Position of the `Let` statement declaring a variable.
	pub fn declaration_of(&self, name: &str) -> Option<usize> {
		let var = self.find_variable(name)?;
		self.statements.iter().position(|s| matches!(s, Statement::Let { var: v, .. } if *v == var))
	}

	pub fn expression<'p>(&'p self, expr: &'p Expr) -> ExprDisplay<'p> {
		ExprDisplay { program: self, expr }
	}

	pub fn statement<'p>(&'p self, statement: &'p Statement) -> StatementDisplay<'p> {
		StatementDisplay { program: self, statement }
	}
}

pub struct ExprDisplay<'p> {
	program: &'p Program,
	expr: &'p Expr,
}

pub struct StatementDisplay<'p> {
	program: &'p Program,
	statement: &'p Statement,
}

impl Display for Program {
	fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
		for p in &self.parameters {
			writeln!(f, "param {} = {} [{}, {}]", p.name, p.default, p.min, p.max)?;
		}
		for b in &self.buffers {
			writeln!(f, "buffer {}[{}]", b.name, b.length)?;
		}
		for c in &self.cells {
			writeln!(f, "cell {} = {}", c.name, c.initial)?;
		}
		for statement in &self.statements {
			writeln!(f, "{}", self.statement(statement))?;
		}
		for &out in &self.outputs {
			writeln!(f, "out {}", self.variable_name(out))?;
		}
		Ok(())
	}
}

impl<'p> Display for StatementDisplay<'p> {
	fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
		let p = self.program;
		match self.statement {
			Statement::Let { var, expr } => {
				write!(f, "let {} = {}", p.variable_name(*var), p.expression(expr))
			},
			Statement::CellStore { cell, expr } => {
				write!(f, "store {} <- {}", p.cells[cell.0].name, p.expression(expr))
			},
			Statement::BufferStore { buffer, index, value } => {
				write!(f, "poke {}[{}] <- {}",
					p.buffers[buffer.0].name, p.expression(index), p.expression(value))
			},
		}
	}
}

impl<'p> Display for ExprDisplay<'p> {
	fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
		let p = self.program;
		match self.expr {
			Expr::Constant(value) => write!(f, "{}", value),
			Expr::Var(var) => write!(f, "{}", p.variable_name(*var)),
			Expr::Param(param) => write!(f, "{}", p.parameters[param.0].name),
			Expr::Cell(cell) => write!(f, "cell {}", p.cells[cell.0].name),
			Expr::Binary { op, left, right } => {
				let (left, right) = (p.expression(left), p.expression(right));
				match op.symbol() {
					Some(symbol) if op.is_comparison() => {
						write!(f, "({} {} {} ? 1 : 0)", left, symbol, right)
					},
					Some(symbol) => write!(f, "({} {} {})", left, symbol, right),
					None => write!(f, "{}({}, {})", op.tag(), left, right),
				}
			},
			Expr::Select { condition, then, otherwise } => {
				write!(f, "({} ? {} : {})",
					p.expression(condition), p.expression(then), p.expression(otherwise))
			},
			Expr::Bounded { bound, value, min, max } => {
				let name: &'static str = bound.into();
				write!(f, "{}({}, {}, {})",
					name, p.expression(value), p.expression(min), p.expression(max))
			},
			Expr::BufferRead { buffer, index, interpolation, mode } => {
				let interpolation: &'static str = interpolation.into();
				let mode: &'static str = mode.into();
				write!(f, "peek({}, {}, {}, {})",
					p.buffers[buffer.0].name, p.expression(index), interpolation, mode)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_program() -> Program {
		Program {
			parameters: vec![Parameter { name: "wet".into(), default: 0.5, min: 0.0, max: 1.0 }],
			buffers: vec![Buffer { name: "data2".into(), length: 4, contents: None }],
			cells: vec![Cell { name: "counter1".into(), initial: 0.0 }],
			variables: vec!["counter1".into(), "gt3".into(), "peek4".into()],
			statements: vec![
				Statement::Let { var: VarId(0), expr: Expr::Cell(CellId(0)) },
				Statement::Let {
					var: VarId(1),
					expr: Expr::binary(BinOp::Greater, Expr::Param(ParamId(0)), Expr::Constant(3.0)),
				},
				Statement::Let {
					var: VarId(2),
					expr: Expr::BufferRead {
						buffer: BufferId(0),
						index: Box::new(Expr::Var(VarId(0))),
						interpolation: Interpolation::None,
						mode: IndexMode::Samples,
					},
				},
				Statement::CellStore {
					cell: CellId(0),
					expr: Expr::bounded(Bound::Wrap,
						Expr::binary(BinOp::Add, Expr::Var(VarId(0)), Expr::Constant(1.0)),
						Expr::Constant(0.0), Expr::Constant(4.0)),
				},
				Statement::BufferStore {
					buffer: BufferId(0),
					index: Expr::Var(VarId(0)),
					value: Expr::Var(VarId(1)),
				},
			],
			outputs: vec![VarId(2)],
		}
	}

	#[test]
	fn renders_every_line() {
		let text = sample_program().to_string();
		let lines: Vec<&str> = text.lines().collect();
		assert_eq!(lines, vec![
			"param wet = 0.5 [0, 1]",
			"buffer data2[4]",
			"cell counter1 = 0",
			"let counter1 = cell counter1",
			"let gt3 = (wet > 3 ? 1 : 0)",
			"let peek4 = peek(data2, counter1, none, samples)",
			"store counter1 <- wrap((counter1 + 1), 0, 4)",
			"poke data2[counter1] <- gt3",
			"out peek4",
		]);
	}

	#[test]
	fn finds_declarations() {
		let program = sample_program();
		assert_eq!(program.declaration_of("gt3"), Some(1));
		assert_eq!(program.declaration_of("missing"), None);
		assert_eq!(program.find_parameter("wet"), Some(ParamId(0)));
		assert_eq!(program.find_buffer("data2"), Some(BufferId(0)));
	}
}
