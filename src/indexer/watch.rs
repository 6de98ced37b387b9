// SPDX-License-Identifier: MIT OR Apache-2.0

//! Docs directory watcher that rebuilds the snapshot with debouncing

use anyhow::Result;
use colored::Colorize;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::embedding::provider::EmbeddingProvider;
use crate::indexer::build::IndexBuilder;
use crate::indexer::scanner::DocumentScanner;

/// Default debounce interval in seconds
pub const DEFAULT_DEBOUNCE_SECS: u64 = 2;

/// Minimum time between rebuilds
const MIN_REBUILD_INTERVAL_SECS: u64 = 5;

/// Idle wait when nothing is pending
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Shortest wait while changes are pending, so `--debounce 0` never spins
const MIN_WAIT: Duration = Duration::from_millis(50);

/// Pending-change bookkeeping for the watch loop
#[derive(Debug)]
struct Debounce {
    quiet_period: Duration,
    min_interval: Duration,
    pending: HashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debounce {
    fn new(quiet_period: Duration, min_interval: Duration) -> Self {
        Self {
            quiet_period,
            min_interval,
            pending: HashSet::new(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn record(&mut self, paths: impl IntoIterator<Item = PathBuf>, now: Instant) {
        self.pending.extend(paths);
        self.last_event = Some(now);
    }

    /// How long to wait for events before checking `due` again
    fn timeout(&self, now: Instant) -> Duration {
        if self.pending.is_empty() {
            return IDLE_TIMEOUT;
        }
        let quiet = self.last_event.map_or(Duration::ZERO, |t| {
            self.quiet_period.saturating_sub(now.duration_since(t))
        });
        let spaced = self.last_rebuild.map_or(Duration::ZERO, |t| {
            self.min_interval.saturating_sub(now.duration_since(t))
        });
        quiet.max(spaced).max(MIN_WAIT)
    }

    /// Quiet long enough since the last event and since the last rebuild
    fn due(&self, now: Instant) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let quiet = self
            .last_event
            .is_some_and(|t| now.duration_since(t) >= self.quiet_period);
        let spaced = self
            .last_rebuild
            .map_or(true, |t| now.duration_since(t) >= self.min_interval);
        quiet && spaced
    }

    /// Clears pending changes, returning how many there were
    fn take(&mut self, now: Instant) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.last_event = None;
        self.last_rebuild = Some(now);
        count
    }
}

/// Docs directory watcher with debouncing
pub struct Watcher {
    builder: IndexBuilder,
    debounce_duration: Duration,
    min_rebuild_interval: Duration,
}

impl Watcher {
    pub fn new(builder: IndexBuilder) -> Self {
        Self::with_debounce(builder, DEFAULT_DEBOUNCE_SECS)
    }

    /// Create watcher with custom debounce interval
    pub fn with_debounce(builder: IndexBuilder, debounce_secs: u64) -> Self {
        Self {
            builder,
            debounce_duration: Duration::from_secs(debounce_secs),
            min_rebuild_interval: Duration::from_secs(MIN_REBUILD_INTERVAL_SECS.max(debounce_secs)),
        }
    }

    /// Builds once, then rebuilds whenever documents change
    pub fn watch(&self, provider: &mut dyn EmbeddingProvider) -> Result<()> {
        self.rebuild(provider);

        let (tx, rx) = channel();
        let config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));
        let mut watcher = RecommendedWatcher::new(tx, config)?;
        let docs_dir = self.builder.docs_dir().to_path_buf();
        watcher.watch(&docs_dir, RecursiveMode::Recursive)?;

        println!("{} Watching {} for changes...", "👁".cyan(), docs_dir.display());
        println!(
            "  Debounce: {}s, Min interval: {}s",
            self.debounce_duration.as_secs(),
            self.min_rebuild_interval.as_secs()
        );
        println!("Press Ctrl+C to stop\n");

        let mut state = Debounce::new(self.debounce_duration, self.min_rebuild_interval);

        loop {
            match rx.recv_timeout(state.timeout(Instant::now())) {
                Ok(Ok(event)) => {
                    if should_rebuild(&event, self.builder.scanner()) {
                        state.record(event.paths, Instant::now());
                    }
                }
                Ok(Err(e)) => {
                    eprintln!("{} Watch error: {}", "✗".red(), e);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if state.due(now) {
                let changed = state.take(now);
                println!("{} {} document(s) changed, rebuilding...", "🔄".yellow(), changed);
                self.rebuild(provider);
            }
        }

        Ok(())
    }

    fn rebuild(&self, provider: &mut dyn EmbeddingProvider) {
        let start = Instant::now();
        match self.builder.build(provider) {
            Ok(report) => println!(
                "{} Indexed {} chunks from {} documents in {:.1}s",
                "✓".green(),
                report.vectors,
                report.documents,
                start.elapsed().as_secs_f64()
            ),
            Err(e) => eprintln!("{} Rebuild failed: {}", "✗".red(), e),
        }
    }
}

/// Create, modify and remove events on document files trigger a rebuild
fn should_rebuild(event: &Event, scanner: &DocumentScanner) -> bool {
    use notify::EventKind::*;
    matches!(event.kind, Create(_) | Modify(_) | Remove(_))
        && event.paths.iter().any(|path| scanner.matches(path))
}
