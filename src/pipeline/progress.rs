use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Progress over the payload corpus: a bar for humans plus a log line at a
/// fixed cadence (every 5% of the corpus) with a throughput-based ETA.
pub struct ScanProgress {
    bar: ProgressBar,
    total: usize,
    done: usize,
    cadence: usize,
    start_time: Instant,
}

impl ScanProgress {
    pub fn new(total: usize, visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:30.cyan/dark_gray} {pos}/{len} ({percent}%) ETA {eta} | {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            total,
            done: 0,
            cadence: (total / 20).max(1),
            start_time: Instant::now(),
        }
    }

    /// Count one finished payload.
    pub fn advance(&mut self, confirmed: usize) {
        self.done += 1;
        self.bar.inc(1);
        self.bar.set_message(format!("{} confirmed", confirmed));
        if self.done % self.cadence == 0 || self.done == self.total {
            let eta = self.eta();
            info!(
                done = self.done,
                total = self.total,
                percent = %format!("{:.0}", self.percent()),
                eta = %format_duration(eta),
                "Progress"
            );
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done as f64 * 100.0 / self.total as f64
    }

    /// Remaining time at the throughput observed so far.
    pub fn eta(&self) -> Duration {
        estimate_eta(self.start_time.elapsed(), self.done, self.total)
    }

    /// Print above the bar without tearing it.
    pub fn println(&self, line: &str) {
        if self.bar.is_hidden() {
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }
}

pub fn estimate_eta(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 || done >= total {
        return Duration::ZERO;
    }
    let per_item = elapsed.as_secs_f64() / done as f64;
    Duration::from_secs_f64(per_item * (total - done) as f64)
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
