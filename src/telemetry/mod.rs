//! Stage timing for ragstation
//!
//! Records how long each pipeline stage took and prints a summary table at
//! the end of a command.

use colored::Colorize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Pipeline stages that get timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ModelLoad,
    SnapshotLoad,
    Chunk,
    Embed,
    IndexBuild,
    Save,
    EmbedAndSearch,
    Generate,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ModelLoad => "model load",
            Stage::SnapshotLoad => "snapshot load",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::IndexBuild => "index build",
            Stage::Save => "save",
            Stage::EmbedAndSearch => "embed + search",
            Stage::Generate => "generate",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collected stage timings of one command run
#[derive(Debug, Clone)]
pub struct StageTimings {
    entries: Vec<(Stage, Duration)>,
    start_time: Instant,
}

impl StageTimings {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Record a finished stage
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        debug!(stage = stage.as_str(), elapsed_ms = elapsed.as_millis() as u64, "stage finished");
        self.entries.push((stage, elapsed));
    }

    /// Run `f` and record its duration under `stage`
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = f();
        self.record(stage, start.elapsed());
        value
    }

    /// Total time recorded for `stage` (stages may repeat, e.g. per query)
    pub fn total(&self, stage: Stage) -> Duration {
        self.entries
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
            .sum()
    }

    pub fn entries(&self) -> &[(Stage, Duration)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time since collection started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Plain-text summary, one stage per line in first-seen order
    pub fn summary_lines(&self) -> Vec<String> {
        let mut seen: Vec<Stage> = Vec::new();
        for (stage, _) in &self.entries {
            if !seen.contains(stage) {
                seen.push(*stage);
            }
        }
        seen.into_iter()
            .map(|stage| format!("{:<16} {:>8.2}s", stage.as_str(), self.total(stage).as_secs_f64()))
            .collect()
    }

    /// Print the summary table
    pub fn display_summary(&self) {
        if self.is_empty() {
            return;
        }
        println!("\n{}", "⏱  Timings".bold());
        println!("─────────────────────────────");
        for line in self.summary_lines() {
            println!("{}", line.dimmed());
        }
        println!(
            "{:<16} {:>8.2}s",
            "total".bold(),
            self.elapsed().as_secs_f64()
        );
    }
}

impl Default for StageTimings {
    fn default() -> Self {
        Self::new()
    }
}
