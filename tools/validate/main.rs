//! Offline check of the real-time pipeline against a WAV capture.
//!
//! Usage: pipeline_validate [input.wav] [preset name | config.json] [model.weights]
//!
//! Feeds the file through the pipeline in quantum-sized callbacks, exactly as
//! an audio callback would, and prints latency, underrun and timing figures.
use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::PathBuf;
use voxframe::dsp::utils::{frame_rms, lin_to_db};
use voxframe::{DenoisePipeline, PipelineConfig, Preset};

fn load_config(arg: Option<String>) -> Result<PipelineConfig> {
    let arg = match arg {
        Some(arg) => arg,
        None => return Ok(Preset::default().config()),
    };
    if arg.ends_with(".json") {
        let json = std::fs::read_to_string(&arg)
            .with_context(|| format!("failed to read config '{}'", arg))?;
        return PipelineConfig::from_json(&json)
            .with_context(|| format!("invalid config '{}'", arg));
    }
    match Preset::from_name(&arg) {
        Some(preset) => Ok(preset.config()),
        None => bail!("unknown preset '{}'", arg),
    }
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("test_data/noisy_speech.wav"));
    let mut config = load_config(args.next())?;
    let model_path = args.next().map(PathBuf::from);

    let reader = WavReader::open(&input)
        .with_context(|| format!("failed to open validation WAV '{}'", input.display()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("validation only supports 16-bit integer WAV fixtures");
    }
    config.sample_rate = spec.sample_rate as f32;
    let quantum = config.quantum_size;

    // Mono downmix: first channel only
    let channels = spec.channels.max(1) as usize;
    let samples = reader
        .into_samples::<i16>()
        .step_by(channels)
        .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
        .collect::<Result<Vec<f32>, _>>()
        .context("failed to decode WAV samples")?;

    let (mut pipeline, mut handles) = DenoisePipeline::new(config)?;
    match model_path {
        Some(path) => {
            let blob = std::fs::read(&path)
                .with_context(|| format!("failed to read model '{}'", path.display()))?;
            if let Err(e) = handles.loader.load_blob(&blob) {
                println!("model load failed ({}), running in passthrough", e);
            }
        }
        None => handles.loader.load_builtin()?,
    }

    let mut output = vec![0.0f32; samples.len()];
    for (inp, out) in samples.chunks(quantum).zip(output.chunks_mut(quantum)) {
        pipeline.process(inp, out);
    }

    let lag = pipeline.latency_samples().min(output.len());
    let snap = handles.status.snapshot();
    let mut events = 0usize;
    handles.status.drain(|_| events += 1);

    println!("Validation summary for '{}':", input.display());
    println!("  samples processed : {}", samples.len());
    println!("  frames dispatched : {}", pipeline.frames_dispatched());
    println!("  latency (samples) : {}", pipeline.latency_samples());
    println!("  model state       : {:?}", snap.model_state);
    println!(
        "  underruns         : {} ({} samples)",
        snap.underruns, snap.underrun_samples
    );
    println!("  deadline misses   : {}", snap.deadline_misses);
    println!("  worst block       : {:.1} us", snap.max_block_ns as f64 / 1e3);
    println!("  events            : {}", events);
    println!(
        "  rms in / out      : {:.1} dB / {:.1} dB",
        lin_to_db(frame_rms(&samples)),
        lin_to_db(frame_rms(&output[lag..]))
    );
    Ok(())
}
