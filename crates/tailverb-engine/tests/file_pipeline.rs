//! End-to-end runs against real WAV files on disk.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tailverb_engine::{apply_reverb, Error, NoProgress, Pipeline, PipelineConfig, Stage};

const RATE: u32 = 44_100;

/// Stereo 16-bit sine burst, same signal on both channels.
fn write_fixture(path: &Path, frames: usize) {
    let spec = WavSpec { channels: 2, sample_rate: RATE, bits_per_sample: 16, sample_format: SampleFormat::Int };
    let mut w = WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / RATE as f32;
        let s = ((t * 440.0 * std::f32::consts::TAU).sin() * 16_000.0) as i16;
        w.write_sample(s).unwrap();
        w.write_sample(s).unwrap();
    }
    w.finalize().unwrap();
}

fn read_output(path: &Path) -> (WavSpec, Vec<f32>) {
    let mut reader = WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

fn config(cut: bool) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.stream.block_size = 4_096;
    cfg.stream.cut_reverb_tail = cut;
    cfg.stream.overwrite = true;
    cfg
}

#[test]
fn truncated_tail_matches_input_length() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_fixture(&input, 10_000);

    let report = apply_reverb(&input, &output, &config(true)).unwrap();
    assert_eq!(report.output_frames(), 10_000);

    let (spec, samples) = read_output(&output);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, RATE);
    assert_eq!(spec.sample_format, SampleFormat::Float);
    assert_eq!(samples.len(), 20_000);
}

#[test]
fn full_tail_extends_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_fixture(&input, 10_000);

    let report = apply_reverb(&input, &output, &config(false)).unwrap();
    assert!(report.tail_frames > 0);
    assert!(report.terminal_peak.unwrap() < 1e-4);

    let (_, samples) = read_output(&output);
    assert_eq!(samples.len() as u64, report.output_frames() * 2);
    let last_block = &samples[samples.len() - 4_096 * 2..];
    let peak = last_block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak >= 1e-4);
}

#[test]
fn creates_missing_directories_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("renders/2024/takes/out.wav");
    write_fixture(&input, 2_000);

    apply_reverb(&input, &output, &config(true)).unwrap();
    apply_reverb(&input, &output, &config(true)).unwrap();
    assert!(output.is_file());
    assert!(dir.path().join("renders/2024/takes").is_dir());
}

#[test]
fn identical_runs_produce_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    write_fixture(&input, 6_000);
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");

    let mut pipeline = Pipeline::new(config(false)).unwrap();
    pipeline.process_file(&input, &a, &mut NoProgress).unwrap();
    pipeline.process_file(&input, &b, &mut NoProgress).unwrap();

    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
}

#[test]
fn missing_source_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("nested/out.wav");
    let mut pipeline = Pipeline::new(config(false)).unwrap();

    let err = pipeline
        .process_file(&dir.path().join("nope.wav"), &output, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable { .. }));
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert!(!dir.path().join("nested").exists());
}

#[test]
fn existing_destination_is_kept_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_fixture(&input, 1_000);
    std::fs::write(&output, b"keep me").unwrap();

    let mut cfg = config(true);
    cfg.stream.overwrite = false;
    let err = apply_reverb(&input, &output, &cfg).unwrap_err();
    assert!(matches!(err, Error::DestinationUnavailable { .. }));
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
}

#[test]
fn empty_source_writes_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.wav");
    let output = dir.path().join("out.wav");
    write_fixture(&input, 0);

    let report = apply_reverb(&input, &output, &config(false)).unwrap();
    assert_eq!(report.output_frames(), 0);
    let (_, samples) = read_output(&output);
    assert!(samples.is_empty());
}

#[test]
fn truncated_data_chunk_yields_what_is_there() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("crashed.wav");
    let output = dir.path().join("out.wav");
    write_fixture(&input, 10_000);
    // drop the last 3,000 stereo 16-bit frames but keep the header's length
    let file = std::fs::OpenOptions::new().write(true).open(&input).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 3_000 * 4).unwrap();
    drop(file);

    let report = apply_reverb(&input, &output, &config(true)).unwrap();
    assert_eq!(report.input_frames, 10_000);
    assert_eq!(report.body_frames, 7_000);

    let (_, samples) = read_output(&output);
    assert_eq!(samples.len(), 14_000);
}

#[test]
fn undecodable_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("garbage.wav");
    std::fs::write(&input, b"definitely not RIFF").unwrap();
    let err = apply_reverb(&input, &dir.path().join("out.wav"), &config(true)).unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable { .. }));
}
