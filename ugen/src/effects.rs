
//! Reverb building blocks composed from the primitive nodes.

use std::sync::Arc;

use crate::graph::{Graph, GraphError, NodeId, Operand};
use crate::operands;
use crate::primitives::{AccumOptions, PeekOptions};

/// Lowpass-feedback comb filter as used by Freeverb.
///
/// Returns the buffer read, which is the comb output. The filter state
/// lives in a single-sample delay fed by its own memoized output.
pub fn comb_filter(graph: &mut Graph, input: impl Into<Operand>, length: usize,
		damping: impl Into<Operand>, feedback: impl Into<Operand>) -> Result<NodeId, GraphError> {
	let (input, damping, feedback) = (input.into(), damping.into(), feedback.into());
	graph.atomically(|graph| {
		let last = graph.delay()?;
		let position = graph.counter(1.0, 0.0, length as f64)?;
		let buffer = graph.data(length)?;
		let out = graph.peek(buffer, position, PeekOptions::exact())?;

		let undamped = graph.sub(1.0, damping)?;
		let direct = graph.mul(operands![out, undamped])?;
		let damped = graph.mul(vec![Operand::Reference(last), damping])?;
		let sum = graph.add(operands![direct, damped])?;
		let filtered = graph.memo(sum)?;
		graph.bind(last, filtered)?;

		let fed_back = graph.mul(vec![Operand::Reference(filtered), feedback])?;
		let written = graph.add(vec![input, Operand::Reference(fed_back)])?;
		graph.poke(buffer, written, position)?;
		Ok(out)
	})
}

/// Schroeder allpass section.
pub fn all_pass(graph: &mut Graph, input: impl Into<Operand>, length: usize,
		feedback: impl Into<Operand>) -> Result<NodeId, GraphError> {
	let (input, feedback) = (input.into(), feedback.into());
	graph.atomically(|graph| {
		let position = graph.counter(1.0, 0.0, length as f64)?;
		let buffer = graph.data(length)?;
		let sample = graph.peek(buffer, position, PeekOptions::exact())?;

		let inverted = graph.mul(vec![Operand::Literal(-1.0), input])?;
		let sum = graph.add(operands![inverted, sample])?;
		let out = graph.memo(sum)?;

		let fed_back = graph.mul(vec![Operand::Reference(sample), feedback])?;
		let written = graph.add(vec![input, Operand::Reference(fed_back)])?;
		graph.poke(buffer, written, position)?;
		Ok(out)
	})
}

/// Plays a buffer of samples in a loop, one sample per tick.
pub fn sample_player(graph: &mut Graph, samples: impl Into<Arc<[f32]>>) -> Result<NodeId, GraphError> {
	let samples = samples.into();
	let length = samples.len();
	graph.atomically(|graph| {
		let buffer = graph.data_from_samples(samples)?;
		let position = graph.accum(1.0, 0.0, AccumOptions::with_max(length as f64))?;
		graph.peek(buffer, position, PeekOptions::exact())
	})
}

/// Constants of the Schroeder/Moorer reverb model.
#[derive(Clone, Debug, PartialEq)]
pub struct FreeverbTuning {
	pub comb_lengths: Vec<usize>,
	pub all_pass_lengths: Vec<usize>,
	pub all_pass_feedback: f64,
	pub fixed_gain: f64,
	pub scale_damping: f64,
	pub scale_room: f64,
	pub offset_room: f64,
}

impl Default for FreeverbTuning {
	fn default() -> Self {
		FreeverbTuning {
			comb_lengths: vec![1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617],
			all_pass_lengths: vec![225, 556, 441, 341],
			all_pass_feedback: 0.5,
			fixed_gain: 0.015,
			scale_damping: 0.4,
			scale_room: 0.28,
			offset_room: 0.7,
		}
	}
}

/// Handles of a built reverb: its output and its control parameters.
#[derive(Clone, Copy, Debug)]
pub struct Freeverb {
	pub output: NodeId,
	pub wet: NodeId,
	pub dry: NodeId,
	pub room_size: NodeId,
	pub damping: NodeId,
}

/// Eight parallel combs summed with the attenuated input, then four
/// allpasses in series, mixed with the dry input.
pub fn freeverb(graph: &mut Graph, input: impl Into<Operand>,
		tuning: &FreeverbTuning) -> Result<Freeverb, GraphError> {
	let input = input.into();
	graph.atomically(|graph| {
		let wet = graph.param("wet", 0.55, 0.01, 1.0)?;
		let dry = graph.param("dry", 0.5, 0.01, 1.0)?;
		let room_size = graph.param("roomSize", 0.84, 0.5, 1.0)?;
		let damping = graph.param("damping", 0.5, 0.01, 1.0)?;

		let gained = graph.mul(vec![input, Operand::Literal(tuning.fixed_gain)])?;
		let attenuated = graph.memo(gained)?;

		let comb_damping = graph.mul(operands![damping, tuning.scale_damping])?;
		let comb_feedback = graph.mul(operands![tuning.scale_room + tuning.offset_room, room_size])?;
		let mut mix = operands![attenuated];
		for &length in &tuning.comb_lengths {
			let comb = comb_filter(graph, attenuated, length, comb_damping, comb_feedback)?;
			mix.push(comb.into());
		}
		let mut out = graph.add(mix)?;

		for &length in &tuning.all_pass_lengths {
			out = all_pass(graph, out, length, tuning.all_pass_feedback)?;
		}

		let dry_part = graph.mul(vec![input, Operand::Reference(dry)])?;
		let wet_part = graph.mul(operands![out, wet])?;
		let output = graph.add(operands![dry_part, wet_part])?;
		Ok(Freeverb { output, wet, dry, room_size, damping })
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::compiler::compile;
	use program::Machine;

	fn impulse(length: usize) -> Vec<f32> {
		let mut samples = vec![0.0; length];
		samples[0] = 1.0;
		samples
	}

	#[test]
	fn sample_player_loops() {
		let mut graph = Graph::new();
		let player = sample_player(&mut graph, vec![0.25f32, 0.5, 0.75]).unwrap();
		let mut machine = Machine::new(compile(&graph, &[player]).unwrap());
		assert_eq!(machine.render(5), vec![0.25, 0.5, 0.75, 0.25, 0.5]);
	}

	#[test]
	fn comb_without_feedback_is_a_delay() {
		let mut graph = Graph::new();
		let input = sample_player(&mut graph, impulse(16)).unwrap();
		let comb = comb_filter(&mut graph, input, 4, 0.0, 0.0).unwrap();
		let mut machine = Machine::new(compile(&graph, &[comb]).unwrap());
		assert_eq!(machine.render(6), vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
	}

	#[test]
	fn comb_feedback_repeats() {
		let mut graph = Graph::new();
		let input = sample_player(&mut graph, impulse(16)).unwrap();
		let comb = comb_filter(&mut graph, input, 4, 0.0, 0.5).unwrap();
		let mut machine = Machine::new(compile(&graph, &[comb]).unwrap());
		assert_eq!(machine.render(9), vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.5]);
	}

	#[test]
	fn all_pass_passes_inverted_input_first() {
		let mut graph = Graph::new();
		let input = sample_player(&mut graph, impulse(16)).unwrap();
		let out = all_pass(&mut graph, input, 2, 0.5).unwrap();
		let mut machine = Machine::new(compile(&graph, &[out]).unwrap());
		// y[n] = -x[n] + b[n-2], b[n] = x[n] + 0.5 b[n-2]
		assert_eq!(machine.render(5), vec![-1.0, 0.0, 1.0, 0.0, 0.5]);
	}

	#[test]
	fn failed_filter_leaves_no_nodes_behind() {
		let mut graph = Graph::new();
		let input = sample_player(&mut graph, impulse(8)).unwrap();
		assert_eq!(comb_filter(&mut graph, input, 0, 0.2, 0.5), Err(GraphError::EmptyBuffer));
		assert_eq!(all_pass(&mut graph, input, 0, 0.5), Err(GraphError::EmptyBuffer));
		assert_eq!(graph.len(), 3);

		// The abandoned delay must not block unrelated compiles
		let out = graph.gt(7.0, 2.0).unwrap();
		let program = compile(&graph, &[out]).unwrap();
		assert_eq!(program.statements.len(), 1);
		assert_eq!(graph.name(out), "gt4");
	}

	#[test]
	fn failed_freeverb_can_be_retried() {
		let mut graph = Graph::new();
		let input = sample_player(&mut graph, impulse(64)).unwrap();
		let broken = FreeverbTuning { all_pass_lengths: vec![225, 0], ..FreeverbTuning::default() };
		assert_eq!(freeverb(&mut graph, input, &broken).unwrap_err(), GraphError::EmptyBuffer);
		assert!(graph.parameters().is_empty());

		let reverb = freeverb(&mut graph, input, &FreeverbTuning::default()).unwrap();
		assert!(compile(&graph, &[reverb.output]).is_ok());
	}

	#[test]
	fn freeverb_uses_every_tuning_length() {
		let mut graph = Graph::new();
		let input = sample_player(&mut graph, impulse(64)).unwrap();
		let tuning = FreeverbTuning::default();
		let reverb = freeverb(&mut graph, input, &tuning).unwrap();
		let program = compile(&graph, &[reverb.output]).unwrap();

		let mut lengths: Vec<usize> = program.buffers.iter().skip(1).map(|b| b.length).collect();
		let mut expected = tuning.comb_lengths.clone();
		expected.extend(&tuning.all_pass_lengths);
		lengths.sort_unstable();
		expected.sort_unstable();
		assert_eq!(lengths, expected);
		assert_eq!(program.parameters.len(), 4);
		assert_eq!(graph.name(reverb.room_size), "param6");
	}
}
