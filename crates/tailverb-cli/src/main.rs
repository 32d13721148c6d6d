mod progress;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tailverb_engine::batch::{run_batch, Job};
use tailverb_engine::{default_output_path, AudioReader, CancelToken, Pipeline, PipelineConfig, RunReport};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use progress::BarProgress;

#[derive(Parser)]
#[command(name = "tailverb", version, about = "Add reverb to audio files in bounded memory")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show sample rate, channels and length of an audio file
    Info { input: PathBuf },
    /// Add reverb to one file
    Apply {
        input: PathBuf,
        /// Defaults to `<INPUT>.reverb.wav`
        output: Option<PathBuf>,
        #[command(flatten)]
        opts: EffectArgs,
    },
    /// Add reverb to many files in parallel
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out_dir: PathBuf,
        /// Worker threads (default: available cores)
        #[arg(short, long)]
        jobs: Option<usize>,
        #[command(flatten)]
        opts: EffectArgs,
    },
}

/// Overrides applied on top of the config file.
#[derive(Args)]
struct EffectArgs {
    /// TOML file with [reverb] and [stream] tables
    #[arg(short, long, env = "TAILVERB_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    room_size: Option<f32>,
    #[arg(long)]
    damping: Option<f32>,
    #[arg(long)]
    wet_level: Option<f32>,
    #[arg(long)]
    dry_level: Option<f32>,
    #[arg(long)]
    width: Option<f32>,
    #[arg(long)]
    freeze_mode: Option<f32>,
    /// Frames per processing block
    #[arg(long)]
    block_size: Option<usize>,
    /// Tail flush stops once output peaks below this
    #[arg(long)]
    noise_floor: Option<f32>,
    /// Stop the tail flush after this many blocks
    #[arg(long)]
    max_tail_blocks: Option<usize>,
    /// Drop the reverb tail; output is exactly as long as the input
    #[arg(long)]
    cut_reverb_tail: bool,
    /// Overwrite existing output files
    #[arg(short = 'y', long)]
    overwrite: bool,
}

impl EffectArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        let r = &mut cfg.reverb;
        let overrides = [
            (&mut r.room_size, self.room_size),
            (&mut r.damping, self.damping),
            (&mut r.wet_level, self.wet_level),
            (&mut r.dry_level, self.dry_level),
            (&mut r.width, self.width),
            (&mut r.freeze_mode, self.freeze_mode),
        ];
        for (field, value) in overrides {
            if let Some(v) = value {
                *field = v;
            }
        }
        let s = &mut cfg.stream;
        if let Some(n) = self.block_size {
            s.block_size = n;
        }
        if let Some(f) = self.noise_floor {
            s.noise_floor = f;
        }
        if self.max_tail_blocks.is_some() {
            s.max_tail_blocks = self.max_tail_blocks;
        }
        s.cut_reverb_tail |= self.cut_reverb_tail;
        s.overwrite |= self.overwrite;
        cfg.validate().context("invalid effect settings")?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tailverb=info,tailverb_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Info { input } => info_cmd(&input),
        Command::Apply { input, output, opts } => {
            let output = output.unwrap_or_else(|| default_output_path(&input));
            apply_cmd(&input, &output, &opts)
        }
        Command::Batch { inputs, out_dir, jobs, opts } => batch_cmd(&inputs, &out_dir, jobs, &opts),
    }
}

fn info_cmd(input: &Path) -> Result<()> {
    let reader = AudioReader::open(input).with_context(|| format!("opening {}", input.display()))?;
    println!("file:        {}", input.display());
    println!("sample rate: {} Hz", reader.sample_rate());
    println!("channels:    {}", reader.channels());
    println!("frames:      {}", reader.frame_count());
    println!("duration:    {:.2} s", reader.duration_secs());
    Ok(())
}

/// Cancel flag tripped by SIGINT/SIGTERM; checked between blocks.
fn install_cancel() -> Result<CancelToken> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))
        .context("installing SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))
        .context("installing SIGTERM handler")?;
    Ok(CancelToken::from_flag(flag))
}

fn apply_cmd(input: &Path, output: &Path, opts: &EffectArgs) -> Result<()> {
    let cfg = opts.resolve()?;
    let cancel = install_cancel()?;
    let mut pipeline = Pipeline::new(cfg)?.with_cancel(cancel);
    let mut bar = BarProgress::new()?;

    let report = process_with_bar(&mut pipeline, input, output, &mut bar)
        .with_context(|| format!("adding reverb to {}", input.display()))?;

    info!(
        output = %output.display(),
        seconds = report.output_frames() as f64 / report.sample_rate as f64,
        tail_seconds = report.tail_frames as f64 / report.sample_rate as f64,
        "done"
    );
    Ok(())
}

/// The bar is cleared on failure and cancellation too.
fn process_with_bar(
    pipeline: &mut Pipeline,
    input: &Path,
    output: &Path,
    bar: &mut BarProgress,
) -> tailverb_engine::Result<RunReport> {
    let result = pipeline.process_file(input, output, bar);
    bar.finish();
    result
}

fn batch_cmd(inputs: &[PathBuf], out_dir: &Path, jobs: Option<usize>, opts: &EffectArgs) -> Result<()> {
    let cfg = opts.resolve()?;
    let cancel = install_cancel()?;
    let workers = jobs
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1);

    let jobs: Vec<Job> = inputs.iter().map(|i| Job::into_dir(i, out_dir)).collect();
    let outcomes = run_batch(jobs, &cfg, workers, &cancel)?;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "ok    {} -> {} ({:.2} s)",
                outcome.job.input.display(),
                outcome.job.output.display(),
                report.output_frames() as f64 / report.sample_rate as f64
            ),
            Err(e) => {
                failed += 1;
                println!("FAIL  {}: {e}", outcome.job.input.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} files failed", outcomes.len());
    }
    Ok(())
}
