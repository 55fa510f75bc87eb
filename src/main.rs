use anyhow::{Context, Result};
use billing_migrate::{
    config::Settings,
    migrate::{anchor::UnknownInterval, Stage},
    pipeline,
    table::join::DuplicateKeys,
};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line args; each setting overrides the config file.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Merge client and billing-provider exports and build a subscription import file"
)]
struct Args {
    /// Join the client and provider files into the merged file
    #[arg(long)]
    merge: bool,

    /// Transform the merged file into the import file
    #[arg(long)]
    migrate: bool,

    /// YAML settings file
    #[arg(long, env = "BILLING_MIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding input and output files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    client_file: Option<String>,

    #[arg(long)]
    provider_file: Option<String>,

    /// Merged file written by --merge
    #[arg(long)]
    output_file: Option<String>,

    /// Merged file read by --migrate
    #[arg(long)]
    migration_file: Option<String>,

    /// Import file written by --migrate
    #[arg(long)]
    migrate_output_file: Option<String>,

    /// IANA timezone name, e.g. America/Halifax
    #[arg(long, env = "BILLING_MIGRATE_TIMEZONE")]
    timezone: Option<String>,

    #[arg(long, value_enum, env = "BILLING_MIGRATE_STAGE")]
    stage: Option<Stage>,

    #[arg(long, value_enum)]
    duplicate_keys: Option<DuplicateKeys>,

    #[arg(long, value_enum)]
    unknown_interval: Option<UnknownInterval>,

    /// Threads for the row transform
    #[arg(long)]
    workers: Option<usize>,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        let mut s = match &self.config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => Settings::default(),
        };

        if let Some(v) = &self.data_dir {
            s.data_dir = v.clone();
        }
        if let Some(v) = &self.client_file {
            s.client_file = v.clone();
        }
        if let Some(v) = &self.provider_file {
            s.provider_file = v.clone();
        }
        if let Some(v) = &self.output_file {
            s.merge_output_file = v.clone();
        }
        if let Some(v) = &self.migration_file {
            s.migration_input_file = v.clone();
        }
        if let Some(v) = &self.migrate_output_file {
            s.migration_output_file = v.clone();
        }
        if let Some(v) = &self.timezone {
            s.timezone = v.clone();
        }
        if self.stage.is_some() {
            s.stage = self.stage;
        }
        if let Some(v) = self.duplicate_keys {
            s.duplicate_keys = v;
        }
        if let Some(v) = self.unknown_interval {
            s.unknown_interval = v;
        }
        if self.workers.is_some() {
            s.workers = self.workers;
        }
        Ok(s)
    }
}

fn run(args: &Args) -> Result<()> {
    let settings = args.settings()?;
    // fail on a bad timezone before touching any file
    settings.timezone()?;
    info!(data_dir = %settings.data_dir.display(), timezone = %settings.timezone, stage = ?settings.stage, "configuration");

    if !args.merge && !args.migrate {
        warn!("nothing to do; pass --merge and/or --migrate");
        return Ok(());
    }
    if args.merge {
        pipeline::merge(&settings).context("merge failed")?;
    }
    if args.migrate {
        pipeline::migrate(&settings, Utc::now()).context("migration failed")?;
    }
    Ok(())
}

fn main() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
    info!("all done");
}
