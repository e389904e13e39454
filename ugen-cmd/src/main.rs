
use program::Machine;
use ugen::effects::{freeverb, sample_player, FreeverbTuning};
use ugen::Graph;

use std::process;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::clap_app;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rodio::buffer::SamplesBuffer;
use rodio::Sink;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct RenderOptions {
	sample_rate: Option<f32>,
	duration: Duration,
	run: bool,
	play: bool,
	dump_program: bool,
	write_wav: Option<String>,
	parameters: Vec<(String, f64)>,
}

impl Default for RenderOptions {
	fn default() -> Self {
		RenderOptions {
			sample_rate: None,
			duration: Duration::from_secs(4),
			run: true,
			play: true,
			dump_program: false,
			write_wav: None,
			parameters: vec![],
		}
	}
}

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// Mono samples of a WAV file, channels averaged.
fn read_wav(filename: &str) -> Result<(Vec<f32>, f32)> {
	let mut reader = WavReader::open(filename)
		.with_context(|| format!("Error reading '{}'", filename))?;
	let spec = reader.spec();
	let interleaved = match spec.sample_format {
		SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
		SampleFormat::Int => {
			let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
			reader.samples::<i32>()
				.map(|s| s.map(|s| s as f32 * scale))
				.collect::<Result<Vec<_>, _>>()?
		},
	};
	let channels = spec.channels.max(1) as usize;
	let mono = interleaved.chunks(channels)
		.map(|frame| frame.iter().sum::<f32>() / channels as f32)
		.collect::<Vec<_>>();
	if mono.is_empty() {
		bail!("'{}' contains no samples", filename);
	}
	info!(file = filename, samples = mono.len(), sample_rate = spec.sample_rate, "loaded input");
	Ok((mono, spec.sample_rate as f32))
}

fn write_wav(filename: &str, sample_rate: f32, data: &[f32]) -> Result<(), hound::Error> {
	let spec = WavSpec {
		channels: 1,
		sample_rate: sample_rate as u32,
		bits_per_sample: 32,
		sample_format: SampleFormat::Float,
	};
	let mut writer = WavWriter::create(filename, spec)?;
	for &sample in data {
		writer.write_sample(sample)?;
	}
	writer.finalize()
}

fn play_sound(sample_rate: f32, data: &[f32]) -> Result<(), String> {
	let device = rodio::default_output_device().ok_or("Could not open default device.")?;
	let sink = Sink::new(&device);
	let buffer = SamplesBuffer::new(1, sample_rate as u32, data);
	sink.append(buffer);
	sink.sleep_until_end();
	Ok(())
}

fn parse_parameter(text: &str) -> Result<(String, f64)> {
	let (name, value) = text.split_once('=')
		.ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", text))?;
	let value = value.trim().parse::<f64>()
		.with_context(|| format!("Invalid value for parameter '{}'", name))?;
	Ok((name.trim().to_string(), value))
}

fn render(input: Option<&str>, options: &RenderOptions) -> Result<()> {
	let (samples, file_rate) = match input {
		Some(filename) => {
			let (samples, rate) = read_wav(filename)?;
			(samples, Some(rate))
		},
		None => (vec![], None),
	};
	let sample_rate = options.sample_rate.or(file_rate).unwrap_or(DEFAULT_SAMPLE_RATE);
	let n_samples = (options.duration.as_secs_f32() * sample_rate) as usize;
	let samples = if samples.is_empty() {
		// One impulse, long enough not to repeat
		let mut impulse = vec![0.0; n_samples.max(1)];
		impulse[0] = 1.0;
		impulse
	} else {
		samples
	};

	let mut graph = Graph::new();
	let source = sample_player(&mut graph, samples)?;
	let reverb = freeverb(&mut graph, source, &FreeverbTuning::default())?;
	let program = ugen::compile(&graph, &[reverb.output])?;

	if options.dump_program {
		print!("{}", program);
	}
	if !options.run {
		return Ok(());
	}

	let mut machine = Machine::new(program);
	for (name, value) in &options.parameters {
		let applied = machine.set_parameter(name, *value)?;
		info!(parameter = %name, value = applied, "parameter set");
	}
	let output = machine.render(n_samples).into_iter().map(|v| v as f32).collect::<Vec<f32>>();

	if let Some(ref wav_filename) = options.write_wav {
		if let Err(e) = write_wav(wav_filename, sample_rate, &output) {
			println!("Error writing wav file '{}': {}", wav_filename, e);
		}
	}

	if options.play {
		if let Err(e) = play_sound(sample_rate, &output) {
			println!("Error playing sound: {}", e);
		}
	}
	Ok(())
}

fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.init();

	let matches = clap_app!(ugen =>
		(version: "0.1.0")
		(@arg INPUT: "WAV file to run through the reverb. Plays an impulse if absent.")
		(@arg SAMPLE_RATE: -s --samplerate +takes_value "Sample rate to render at.")
		(@arg DURATION: -d --duration +takes_value "Duration of audio, in seconds.")
		(@arg WAV_FILE: -w --writewav +takes_value "Write WAV file.")
		(@arg COMPILE_ONLY: -c --compileonly "Don't run generated program.")
		(@arg SILENT: -n --noaudio "Don't play audio.")
		(@arg DUMP: -g --dump "Dump generated program.")
		(@arg PARAM: -p --param +takes_value +multiple "Set parameter, as NAME=VALUE.")
	).get_matches();

	let mut options = RenderOptions::default();
	if let Some(sample_rate) = matches.value_of("SAMPLE_RATE") {
		match sample_rate.parse::<f32>() {
			Ok(sample_rate) if sample_rate > 0.0 => {
				options.sample_rate = Some(sample_rate);
			},
			_ => {
				println!("Invalid sample rate: {}", sample_rate);
			},
		}
	}
	if let Some(duration) = matches.value_of("DURATION") {
		match duration.parse::<f32>() {
			Ok(duration) if duration >= 0.0 => {
				options.duration = Duration::from_secs_f32(duration);
			},
			_ => {
				println!("Invalid duration: {}", duration);
			},
		}
	}
	if matches.is_present("COMPILE_ONLY") {
		options.run = false;
	}
	if matches.is_present("SILENT") {
		options.play = false;
	}
	if matches.is_present("DUMP") {
		options.dump_program = true;
	}
	if let Some(wav_filename) = matches.value_of("WAV_FILE") {
		options.write_wav = Some(wav_filename.to_string());
	}
	if let Some(parameters) = matches.values_of("PARAM") {
		for text in parameters {
			match parse_parameter(text) {
				Ok(parameter) => options.parameters.push(parameter),
				Err(e) => println!("{:#}", e),
			}
		}
	}

	if let Err(e) = render(matches.value_of("INPUT"), &options) {
		println!("{:#}", e);
		process::exit(1);
	}
}
