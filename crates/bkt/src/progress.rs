// AI
//! 📊 progress.rs — "Are we there yet?" — every probe, every time, forever.
//!
//! 🚀 One progress bar per phase. The write phase counts records as their
//! tasks settle; the read phase counts records as they're parsed. Rates come
//! from a sliding 5-second window so one slow put doesn't make the whole
//! dashboard look like a seismograph.
//!
//! ⚠️  Warning: Watching this progress bar will not make S3 go faster.
//! Neither will refreshing it. We've tried. Science says no.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

// -- 📏 one mebibyte — not a megabyte, pedants.
const MIB: f64 = 1024.0 * 1024.0;

/// 🔢 "1000000" → "1,000,000" — you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS if you should probably call your mom.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    records_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Tracks records, bytes and rates for one phase, and draws them.
///
/// # Ancient Proverb
/// "He who writes ten thousand objects without a progress bar, writes alone and in darkness."
pub(crate) struct ProgressMetrics {
    phase_name: String,
    expected_records: u64,
    total_bytes: u64,
    total_records: u64,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("phase_name", &self.phase_name)
            .field("expected_records", &self.expected_records)
            .field("total_bytes", &self.total_bytes)
            .field("total_records", &self.total_records)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 `expected_records` sizes the bar. `visible = false` keeps it off the terminal.
    pub(crate) fn new(phase_name: impl Into<String>, expected_records: u64, visible: bool) -> Self {
        let progress_bar = ProgressBar::new(expected_records);
        if !visible {
            progress_bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            phase_name: phase_name.into(),
            expected_records,
            total_bytes: 0,
            total_records: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    pub(crate) fn update(&mut self, bytes: u64, records: u64) {
        self.total_bytes += bytes;
        self.total_records += records;
        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.total_records);
    }

    #[cfg(test)]
    pub(crate) fn total_records(&self) -> u64 {
        self.total_records
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_records));

        if let Some(&(oldest_time, oldest_bytes, oldest_records)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let records_delta = self.total_records.saturating_sub(oldest_records);
                return Rates {
                    records_per_sec: records_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB,
                };
            }
        }

        // -- 💤 not enough elapsed time yet — return zeros and maintain composure
        Rates {
            records_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    /// 🎨 Two rows, two columns, no borders:
    /// ```text
    /// phase: <name>
    ///   <records/s>   <records done / expected>
    ///   <MiB/s>       <elapsed>
    /// ```
    fn render(&self, rates: Rates) {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new(format!("{} Records/s", format_number(rates.records_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} Records",
                format_number(self.total_records),
                format_number(self.expected_records)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} elapsed", format_duration(self.elapsed())))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("phase: {}\n{}", self.phase_name, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_grow_an_hour_column_only_when_needed() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn the_one_where_hidden_progress_still_counts() {
        let mut the_metrics = ProgressMetrics::new("write", 10, false);
        the_metrics.update(80, 8);
        the_metrics.update(20, 2);
        assert_eq!(the_metrics.total_records(), 10);
        the_metrics.finish();
    }
}
