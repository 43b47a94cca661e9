mod service;

use anyhow::Context;
use clap::Parser;
use email_vetter_core::core::config::load_config_file;
use email_vetter_core::{dedup_emails, validate_batch, ConfigBuilder, ShutdownSignal, Validator};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use service::lists::{load_optional_list, read_email_list};
use service::tld::load_tlds;
use service::writer::ResultWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Bulk email validation: syntax, disposable domains, MX records and
/// optional SMTP mailbox probes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// File with one address per line.
    input: PathBuf,

    /// Directory for the result files.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long, env = "EMAIL_VETTER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    disposable_list: Option<PathBuf>,

    /// IANA TLD list; downloaded when absent unless --offline.
    #[arg(long)]
    tld_list: Option<PathBuf>,

    /// Domains that get their own file under valid/.
    #[arg(long)]
    well_known_list: Option<PathBuf>,

    #[arg(short = 'w', long)]
    max_workers: Option<usize>,

    /// Probe mailboxes over SMTP.
    #[arg(long, conflicts_with = "no_smtp")]
    smtp: bool,

    #[arg(long)]
    no_smtp: bool,

    #[arg(long)]
    no_catch_all: bool,

    /// Per-address time budget in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Comma-separated DNS servers, overriding the config file.
    #[arg(long, value_delimiter = ',')]
    dns_servers: Option<Vec<String>>,

    /// Also write every outcome to results.jsonl.
    #[arg(long)]
    json: bool,

    /// Never download the TLD list.
    #[arg(long)]
    offline: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn build_config(args: &Args) -> anyhow::Result<email_vetter_core::Config> {
    let (file, path) = load_config_file(args.config.as_deref())?;
    let mut builder = ConfigBuilder::new().with_file(&file, path.as_deref())?;

    if let Some(dir) = &args.output {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(p) = &args.disposable_list {
        builder = builder.disposable_domains_path(p.clone());
    }
    if let Some(p) = &args.tld_list {
        builder = builder.tld_list_path(p.clone());
    }
    if let Some(p) = &args.well_known_list {
        builder = builder.well_known_domains_path(p.clone());
    }
    if let Some(n) = args.max_workers {
        builder = builder.max_workers(n);
    }
    if args.smtp {
        builder = builder.smtp_enabled(true);
    }
    if args.no_smtp {
        builder = builder.smtp_enabled(false);
    }
    if args.no_catch_all {
        builder = builder.catchall_check_enabled(false);
    }
    if let Some(secs) = args.timeout {
        builder = builder.global_timeout(Duration::from_secs(secs));
    }
    if let Some(servers) = &args.dns_servers {
        builder = builder.dns_servers(servers.clone());
    }

    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = build_config(&args).context("loading configuration")?;
    tracing::debug!("Effective configuration: {:?}", config);

    let emails = dedup_emails(read_email_list(&args.input)?);
    if emails.is_empty() {
        tracing::warn!("No addresses in {}", args.input.display());
        return Ok(());
    }

    let disposable = load_optional_list(config.disposable_domains_path.as_deref(), "disposable domain")?;
    let well_known = load_optional_list(config.well_known_domains_path.as_deref(), "well-known domain")?;
    let tlds = load_tlds(config.tld_list_path.as_deref(), args.offline).await?;

    let mut writer = ResultWriter::new(&config.output_dir, well_known, args.json)
        .with_context(|| format!("preparing output directory {}", config.output_dir.display()))?;
    let validator = Arc::new(Validator::new(config, Arc::new(disposable), Arc::new(tlds))?);

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing in-flight addresses");
                shutdown.trigger();
            }
        });
    }

    let progress = ProgressBar::new(emails.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .context("progress bar template")?,
    );

    let mut outcomes = validate_batch(validator.clone(), emails, shutdown.clone());
    while let Some(outcome) = outcomes.next().await {
        tracing::debug!(target: "batch", "{} -> {} ({})", outcome.email, outcome.category, outcome.reason);
        writer.record(&outcome)?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    let summary = writer.finish()?;
    let dns = validator.dns_cache_stats();
    tracing::info!(
        "DNS cache: {} entries, {} hits, {} misses, {} evictions",
        dns.len,
        dns.hits,
        dns.misses,
        dns.evictions
    );
    let catch_all = validator.catch_all_stats();
    tracing::debug!("Catch-all registry: {} domains", catch_all.len);
    if shutdown.is_triggered() {
        tracing::warn!("Run interrupted after {} addresses", summary.total());
    }
    Ok(())
}
