//! `conform verify` — report what a sync would fetch, without writing.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use conform_core::config::DEFAULT_CONFIG_FILE;
use conform_core::format_bytes;
use conform_sync::{CancelToken, HttpTransport, SyncOptions, SyncOrchestrator, VerifyReport};

use super::load_config;
use crate::logging;
use crate::runtime::run_cancellable;

/// Arguments for `conform verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Config file to read.
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Override the configured destination.
    #[arg(long, short = 'd', value_name = "DIR")]
    pub destination: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Also show info-level logs on stderr.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Tabled)]
struct PendingRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "reason")]
    reason: String,
}

impl VerifyArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(&self.config, self.destination)?;
        // Verification must not write into the destination, log file included.
        logging::init(None, self.verbose)?;

        let cancel = CancelToken::new();
        let orchestrator = SyncOrchestrator::new(
            SyncOptions::from_config(&config),
            Arc::new(HttpTransport::new(&config.timeouts)),
            (),
        )
        .with_cancel(cancel.clone());
        let report = run_cancellable(cancel, move || orchestrator.verify_only())?
            .context("verification aborted")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if report.cancelled {
            bail!("verification cancelled");
        }
        if !report.needs_fetch.is_empty() {
            bail!("{} file(s) out of date", report.needs_fetch.len());
        }
        Ok(())
    }
}

fn print_report(report: &VerifyReport) {
    if report.is_conformant() {
        println!(
            "{} all {} files valid ({})",
            "✓".green(),
            report.manifest_files,
            format_bytes(report.total_bytes)
        );
        return;
    }

    let pending_bytes: u64 = report.needs_fetch.iter().map(|p| p.size).sum();
    println!(
        "{} {} of {} files valid; {} file(s) to fetch ({})",
        "✗".red(),
        report.valid,
        report.manifest_files,
        report.needs_fetch.len(),
        format_bytes(pending_bytes)
    );
    let rows: Vec<PendingRow> = report
        .needs_fetch
        .iter()
        .map(|pending| PendingRow {
            path: pending.path.to_string(),
            size: format_bytes(pending.size),
            reason: pending.reason.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
