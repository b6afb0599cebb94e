//! `conform init --manifest-url <URL> --base-url <URL> [--destination DIR]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use conform_core::config::{self, Config, DEFAULT_CONFIG_FILE};

/// Write a new `conform.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// URL of the manifest JSON document.
    #[arg(long, value_name = "URL")]
    pub manifest_url: String,

    /// Base URL of the file store; entry paths are appended to it.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: String,

    /// Installation directory to keep in sync.
    #[arg(long, short = 'd', value_name = "DIR")]
    pub destination: Option<PathBuf>,

    /// Existing installation to copy verified files from.
    #[arg(long, value_name = "DIR")]
    pub donor_root: Option<PathBuf>,

    /// Where to write the config.
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        if self.config.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                self.config.display()
            );
        }

        let mut config = Config::new(self.manifest_url, self.base_url);
        if let Some(destination) = self.destination {
            config.destination = destination;
        }
        config.donor_root = self.donor_root;
        config.validate().context("refusing to write an invalid config")?;

        config::save_at(&self.config, &config)
            .with_context(|| format!("failed to write {}", self.config.display()))?;

        println!("{} Wrote {}", "✓".green(), self.config.display());
        println!("  manifest:    {}", config.manifest_url);
        println!("  files from:  {}", config.download_base_url);
        println!("  destination: {}", config.destination.display());
        if let Some(donor) = &config.donor_root {
            println!("  donor:       {}", donor.display());
        }
        Ok(())
    }
}
