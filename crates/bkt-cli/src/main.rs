//! 🚀 bkt-cli — the front door, the bouncer, the maitre d' of bkt.
//!
//! 🎬 *[narrator voice]* "It all started with a bucket key toggle..."
//! 📦 Loads config, sets up logging, runs the probe, prints a little table.
//! The real work happens in the library. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{Table, presets::UTF8_FULL};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🪣 Write encrypted objects, read them back, see what survives.
#[derive(Debug, Parser)]
#[command(name = "bkt-cli", version, about)]
struct Cli {
    /// 🔧 TOML config file. Skipped quietly if it doesn't exist.
    #[arg(default_value = "bkt.toml")]
    config: PathBuf,

    /// 🎯 Which phases to run. Overrides `write.enabled` / `read.enabled`.
    #[arg(long, value_enum)]
    phase: Option<Phase>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Phase {
    Write,
    Read,
    Both,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 🔒 Missing file means env vars only
    let config_file = cli.config.as_path();
    let config_file_that_exists = config_file
        .try_exists()
        .context(format!(
            "💀 Couldn't tell whether the configuration file exists. Relative paths are relative \
             to the cwd; an absolute path removes the guesswork. Was checking here: '{}'",
            config_file.display()
        ))?
        .then_some(config_file);

    let mut app_config = bkt::app_config::load_config(config_file_that_exists)
        .context("💀 In bkt-cli, main, we couldn't load the configuration. Check the file and the BKT_* env vars.")?;

    if let Some(phase) = cli.phase {
        app_config.write.enabled = matches!(phase, Phase::Write | Phase::Both);
        app_config.read.enabled = matches!(phase, Phase::Read | Phase::Both);
    }

    match bkt::run(app_config).await {
        Ok(report) => {
            println!("{}", summary_table(&report));
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("dispatch failure")
                    || cause_str.contains("error sending request")
                    || cause_str.contains("onnection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like S3 isn't reachable. Double-check the region, \
                     store.endpoint_url if you set one, and whether your network can see AWS \
                     at all. If it's a local MinIO, `docker ps` knows if it's up. ☕"
                );
            }

            std::process::exit(1);
        }
    }
}

/// 📊 One row per phase that ran. A short read gets flagged right in the table.
fn summary_table(report: &bkt::RunReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["phase", "tasks", "failed", "expected", "records", "pages"]);

    if let Some(write) = &report.write {
        table.add_row(vec![
            "write".to_string(),
            write.tasks_total.to_string(),
            write.tasks_failed.to_string(),
            write.records_expected.to_string(),
            write.records_written.to_string(),
            "-".to_string(),
        ]);
    }
    if let Some(read) = &report.read {
        let records = if report.read_shortfall() {
            format!("{} ⚠️ short", read.count)
        } else {
            read.count.to_string()
        };
        table.add_row(vec![
            "read".to_string(),
            "-".to_string(),
            "-".to_string(),
            report
                .read_expected
                .map_or_else(|| "-".to_string(), |expected| expected.to_string()),
            records,
            read.pages_fetched.to_string(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use bkt::{ReadReport, RunReport, WriteReport};

    fn report(written: u64, read: usize) -> RunReport {
        RunReport {
            write: Some(WriteReport {
                tasks_total: 3,
                records_expected: written,
                records_written: written,
                ..WriteReport::default()
            }),
            read: Some(ReadReport {
                count: read,
                pages_fetched: 1,
                ..ReadReport::default()
            }),
            read_expected: Some(written),
        }
    }

    #[test]
    fn the_one_where_the_table_says_what_was_expected() {
        let rendered = summary_table(&report(26, 26)).to_string();
        assert!(rendered.contains("expected"));
        assert!(rendered.contains("26"));
        assert!(!rendered.contains("short"));
    }

    #[test]
    fn the_one_where_a_short_read_shows_up_without_reading_the_logs() {
        let rendered = summary_table(&report(26, 20)).to_string();
        assert!(rendered.contains("20 ⚠️ short"));
    }
}
