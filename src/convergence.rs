//! Convergence reporting and run-time diagnostics.
//!
//! Solvers append one line per nonlinear iteration to a plain-text log so
//! long runs can be inspected while they execute. Failures to write the
//! log never interrupt a run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use rustc_hash::FxHashMap;

/// Streaming writer for per-iteration convergence values.
pub struct ConvergenceLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl ConvergenceLog {
    /// Create (truncate) the log file. On failure the log is disabled and
    /// a warning is emitted; recording becomes a no-op.
    pub fn create(path: &Path) -> Self {
        let writer = match File::create(path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(err) => {
                warn!("could not create convergence log {}: {err}", path.display());
                None
            }
        };
        Self {
            path: path.to_path_buf(),
            writer,
        }
    }

    /// A log that discards everything, for runs without a log file.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            writer: None,
        }
    }

    pub fn record(&mut self, time_step: usize, iteration: usize, criterion: &str, value: f64) {
        if let Some(writer) = &mut self.writer {
            if let Err(err) = writeln!(writer, "{time_step}\t{iteration}\t{criterion}\t{value:e}") {
                warn!("could not write convergence log {}: {err}", self.path.display());
                self.writer = None;
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = &mut self.writer {
            if let Err(err) = writer.flush() {
                warn!("could not flush convergence log {}: {err}", self.path.display());
                self.writer = None;
            }
        }
    }
}

/// Value below which `fraction` of the samples fall, by nearest-rank on a
/// sorted copy. Empty input yields NaN.
pub fn percentile(samples: &[f64], fraction: f64) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = ((fraction * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

/// Wall-clock timings of the named stages of a solver cycle, summarized at
/// the end of a run.
#[derive(Default)]
pub struct RunStatistics {
    durations: FxHashMap<String, Vec<f64>>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time `f` and file the duration under `stage`.
    pub fn measure<T>(&mut self, stage: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(stage, start.elapsed().as_secs_f64());
        result
    }

    pub fn record(&mut self, stage: &str, seconds: f64) {
        self.durations.entry(stage.to_string()).or_default().push(seconds);
    }

    /// Log one summary line per stage: call count, total, median and 90th
    /// percentile duration.
    pub fn log_summary(&self) {
        let mut stages: Vec<_> = self.durations.iter().collect();
        stages.sort_by(|a, b| {
            let ta: f64 = a.1.iter().sum();
            let tb: f64 = b.1.iter().sum();
            tb.total_cmp(&ta)
        });
        for (stage, samples) in stages {
            let total: f64 = samples.iter().sum();
            info!(
                "{stage}: {} calls, {:.3} s total, median {:.1} ms, p90 {:.1} ms",
                samples.len(),
                total,
                1e3 * percentile(samples, 0.5),
                1e3 * percentile(samples, 0.9),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let samples = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&samples, 0.5), 3.0);
        assert_eq!(percentile(&samples, 0.9), 5.0);
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 1.0), 5.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn statistics_accumulate_per_stage() {
        let mut stats = RunStatistics::new();
        stats.record("solve", 0.1);
        stats.record("solve", 0.3);
        let value = stats.measure("assemble", || 42);
        assert_eq!(value, 42);
        assert_eq!(stats.durations["solve"].len(), 2);
        assert_eq!(stats.durations["assemble"].len(), 1);
    }

    #[test]
    fn disabled_log_is_a_no_op() {
        let mut log = ConvergenceLog::disabled();
        log.record(0, 1, "heat", 1e-3);
        log.flush();
    }

    #[test]
    fn log_writes_one_line_per_record() {
        let dir = std::env::temp_dir();
        let path = dir.join("radfem_convergence_test.log");
        let mut log = ConvergenceLog::create(&path);
        log.record(0, 0, "heat", 0.5);
        log.record(0, 1, "heat", 0.05);
        log.flush();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().next().unwrap().contains("heat"));
        let _ = std::fs::remove_file(&path);
    }
}
