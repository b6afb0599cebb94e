//! `conform sync` — bring the destination in line with the manifest.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use conform_core::config::DEFAULT_CONFIG_FILE;
use conform_core::format_bytes;
use conform_sync::{CancelToken, HttpTransport, SyncOptions, SyncOrchestrator, SyncReport};

use super::{kind_label, load_config};
use crate::donor::PlatformDonor;
use crate::logging;
use crate::progress::SyncProgressBar;
use crate::runtime::run_cancellable;

/// Arguments for `conform sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Config file to read.
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Override the configured destination.
    #[arg(long, short = 'd', value_name = "DIR")]
    pub destination: Option<PathBuf>,

    /// Copy verified files from this installation before downloading.
    #[arg(long, value_name = "DIR", conflicts_with = "no_donor")]
    pub donor_root: Option<PathBuf>,

    /// Never copy from another installation.
    #[arg(long)]
    pub no_donor: bool,

    /// Print the report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Also show info-level logs on stderr.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "problem")]
    kind: &'static str,
    #[tabled(rename = "detail")]
    reason: String,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let mut config = load_config(&self.config, self.destination)?;
        if let Some(donor_root) = self.donor_root {
            config.donor_root = Some(donor_root);
        }
        logging::init(Some(&config.destination), self.verbose)?;

        if !config.auto_update {
            tracing::info!("auto_update is disabled, skipping sync");
            println!("Auto-update is disabled in {}; nothing to do.", self.config.display());
            return Ok(());
        }

        let bar = if self.json {
            SyncProgressBar::hidden()
        } else {
            SyncProgressBar::new()
        };
        let cancel = CancelToken::new();
        let mut orchestrator = SyncOrchestrator::new(
            SyncOptions::from_config(&config),
            Arc::new(HttpTransport::new(&config.timeouts)),
            bar.clone(),
        )
        .with_cancel(cancel.clone());
        if !self.no_donor {
            orchestrator = orchestrator.with_donor(PlatformDonor::new(config.donor_root.clone()));
        }

        let outcome = run_cancellable(cancel, move || orchestrator.run());
        bar.finish();
        let report = outcome?.context("sync aborted")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_summary(&report);
        }

        if report.cancelled {
            bail!("sync cancelled; {} file(s) left unsynced", report.failures.len());
        }
        if !report.failures.is_empty() {
            bail!("{} file(s) could not be synced", report.failures.len());
        }
        Ok(())
    }
}

fn print_summary(report: &SyncReport) {
    let mark = if report.is_complete() {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{mark} {} of {} files in place ({} / {})",
        report.succeeded_count(),
        report.manifest_files,
        format_bytes(report.processed_bytes),
        format_bytes(report.total_bytes),
    );
    println!(
        "  {} already valid, {} copied from donor, {} downloaded",
        report.already_valid, report.from_donor, report.downloaded
    );
    if report.auxiliary_fetched > 0 {
        println!("  {} auxiliary file(s) refreshed", report.auxiliary_fetched);
    }

    if report.failures.is_empty() {
        return;
    }
    let rows: Vec<FailureRow> = report
        .failures
        .iter()
        .map(|failure| FailureRow {
            path: failure.path.to_string(),
            kind: kind_label(failure.kind),
            reason: failure.reason.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
