use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::thread;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::progress::{CancelToken, NoProgress};
use crate::{Pipeline, RunReport};

/// One independent source/destination pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Job {
    /// Output goes to `out_dir/<file name>.reverb.wav`.
    pub fn into_dir(input: &Path, out_dir: &Path) -> Self {
        let mut name = input.file_name().unwrap_or(input.as_os_str()).to_os_string();
        name.push(".reverb.wav");
        Self { input: input.to_path_buf(), output: out_dir.join(name) }
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    pub result: Result<RunReport>,
}

/// Run independent jobs on up to `workers` threads.
///
/// Each job gets its own pipeline and effect state; the queue and the
/// result list are the only shared data. Outcomes come back in job order.
/// A failed job does not stop the others.
pub fn run_batch(
    jobs: Vec<Job>,
    cfg: &PipelineConfig,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<JobOutcome>> {
    cfg.validate()?;
    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(job.output.clone()) {
            return Err(Error::Config(format!(
                "two jobs write to {}",
                job.output.display()
            )));
        }
    }

    let total = jobs.len();
    let workers = workers.clamp(1, total.max(1));
    let queue = Mutex::new(jobs.into_iter().enumerate().collect::<VecDeque<_>>());
    let results = Mutex::new(Vec::with_capacity(total));
    info!(jobs = total, workers, "starting batch");

    thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| loop {
                let Some((idx, job)) = queue.lock().pop_front() else {
                    break;
                };
                let result = Pipeline::new(cfg.clone())
                    .map(|p| p.with_cancel(cancel.clone()))
                    .and_then(|mut p| p.process_file(&job.input, &job.output, &mut NoProgress));
                if let Err(e) = &result {
                    warn!(input = %job.input.display(), "job failed: {e}");
                }
                results.lock().push((idx, JobOutcome { job, result }));
            });
        }
    });

    let mut results = results.into_inner();
    results.sort_by_key(|(idx, _)| *idx);
    Ok(results.into_iter().map(|(_, outcome)| outcome).collect())
}
