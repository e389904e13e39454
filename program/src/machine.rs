
use anyhow::{anyhow, bail, Result};
use tracing::{debug, warn};

use crate::expression::*;
use crate::program::Program;

/// Executes a compiled program once per tick.
pub struct Machine {
	program: Program,
	state: State,
	outputs: Vec<f64>,
}

struct State {
	variables: Vec<f64>,
	cells: Vec<f64>,
	buffers: Vec<Vec<f64>>,
	parameters: Vec<f64>,
}

impl Machine {
	pub fn new(program: Program) -> Machine {
		let state = State {
			variables: vec![0.0; program.variables.len()],
			cells: program.cells.iter().map(|c| c.initial).collect(),
			buffers: initial_buffers(&program),
			parameters: program.parameters.iter().map(|p| p.default).collect(),
		};
		let outputs = vec![0.0; program.outputs.len()];
		Machine { program, state, outputs }
	}

	/// Restore cells, buffers and variables to their initial contents.
	/// Parameter values are kept.
	pub fn reset(&mut self) {
		self.state.variables.iter_mut().for_each(|v| *v = 0.0);
		for (value, cell) in self.state.cells.iter_mut().zip(&self.program.cells) {
			*value = cell.initial;
		}
		self.state.buffers = initial_buffers(&self.program);
		self.outputs.iter_mut().for_each(|v| *v = 0.0);
	}

	/// Run all statements once and return the output samples.
	pub fn tick(&mut self) -> &[f64] {
		for statement in &self.program.statements {
			self.state.execute(statement);
		}
		for (out, var) in self.outputs.iter_mut().zip(&self.program.outputs) {
			*out = self.state.variables[var.0];
		}
		&self.outputs
	}

	/// Run `ticks` ticks, returning the outputs interleaved.
	pub fn render(&mut self, ticks: usize) -> Vec<f64> {
		let mut result = Vec::with_capacity(ticks * self.outputs.len());
		for _ in 0..ticks {
			result.extend_from_slice(self.tick());
		}
		result
	}

	pub fn parameter_index(&self, name: &str) -> Option<usize> {
		self.program.find_parameter(name).map(|p| p.0)
	}

	pub fn parameter(&self, name: &str) -> Option<f64> {
		self.parameter_index(name).map(|index| self.state.parameters[index])
	}

	/// Set a parameter, clamped to its range. Returns the value applied.
	pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<f64> {
		let index = self.parameter_index(name)
			.ok_or_else(|| anyhow!("Unknown parameter '{}'", name))?;
		self.set_parameter_at(index, value)
	}

	pub fn set_parameter_at(&mut self, index: usize, value: f64) -> Result<f64> {
		let param = self.program.parameters.get(index)
			.ok_or_else(|| anyhow!("Parameter index {} out of range", index))?;
		if value.is_nan() {
			bail!("Parameter '{}' set to NaN", param.name);
		}
		let applied = value.max(param.min).min(param.max);
		if applied != value {
			warn!(parameter = %param.name, value, applied, "parameter value clamped to range");
		}
		debug!(parameter = %param.name, applied, "parameter updated");
		self.state.parameters[index] = applied;
		Ok(applied)
	}

	/// Replace the contents of a buffer. The length must match the declaration.
	pub fn load_buffer(&mut self, name: &str, samples: &[f32]) -> Result<()> {
		let id = self.program.find_buffer(name)
			.ok_or_else(|| anyhow!("Unknown buffer '{}'", name))?;
		let length = self.program.buffers[id.0].length;
		if samples.len() != length {
			bail!("Buffer '{}' holds {} samples, got {}", name, length, samples.len());
		}
		self.state.buffers[id.0] = samples.iter().map(|&s| s as f64).collect();
		Ok(())
	}

	/// Value a variable got during the last tick.
	pub fn variable(&self, name: &str) -> Option<f64> {
		self.program.find_variable(name).map(|var| self.state.variables[var.0])
	}
}

fn initial_buffers(program: &Program) -> Vec<Vec<f64>> {
	program.buffers.iter().map(|b| match &b.contents {
		Some(contents) => contents.iter().map(|&s| s as f64).collect(),
		None => vec![0.0; b.length],
	}).collect()
}

impl State {
	fn execute(&mut self, statement: &Statement) {
		match statement {
			Statement::Let { var, expr } => {
				self.variables[var.0] = self.eval(expr);
			},
			Statement::CellStore { cell, expr } => {
				self.cells[cell.0] = self.eval(expr);
			},
			Statement::BufferStore { buffer, index, value } => {
				let index = self.eval(index);
				let value = self.eval(value);
				let samples = &mut self.buffers[buffer.0];
				if !samples.is_empty() {
					let len = samples.len();
					let slot = wrap(index.floor(), 0.0, len as f64) as usize % len;
					samples[slot] = value;
				}
			},
		}
	}

	fn eval(&self, expr: &Expr) -> f64 {
		match expr {
			Expr::Constant(value) => *value,
			Expr::Var(var) => self.variables[var.0],
			Expr::Param(param) => self.parameters[param.0],
			Expr::Cell(cell) => self.cells[cell.0],
			Expr::Binary { op, left, right } => op.apply(self.eval(left), self.eval(right)),
			Expr::Select { condition, then, otherwise } => {
				if self.eval(condition) != 0.0 {
					self.eval(then)
				} else {
					self.eval(otherwise)
				}
			},
			Expr::Bounded { bound, value, min, max } => {
				bound.apply(self.eval(value), self.eval(min), self.eval(max))
			},
			Expr::BufferRead { buffer, index, interpolation, mode } => {
				read_buffer(&self.buffers[buffer.0], self.eval(index), *interpolation, *mode)
			},
		}
	}
}

fn read_buffer(samples: &[f64], index: f64, interpolation: Interpolation, mode: IndexMode) -> f64 {
	let len = samples.len();
	if len == 0 {
		return 0.0;
	}
	let position = match mode {
		IndexMode::Samples => index,
		IndexMode::Phase => index * len as f64,
	};
	let position = wrap(position, 0.0, len as f64);
	let i = position.floor() as usize % len;
	match interpolation {
		Interpolation::None => samples[i],
		Interpolation::Linear => {
			let frac = position - position.floor();
			let next = samples[(i + 1) % len];
			samples[i] + (next - samples[i]) * frac
		},
	}
}
