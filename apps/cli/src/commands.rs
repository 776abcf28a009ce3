//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use mparchive_core::{
    CredentialProvider, EnvCredentials, JobHandle, JobOutcome, JobReport, JobRequest, ProgressReporter,
    StaticCredentials, Unmetered, job_control, run_authorized,
};
use mparchive_crawler::{Credentials, SessionContext};
use mparchive_shared::{
    AppConfig, ArchiveConfig, ArchivedArticle, DateRange, SelectionPolicy, Target, init_config, load_config,
    validate_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// mparchive: save public-account articles as offline HTML.
#[derive(Parser)]
#[command(
    name = "mparchive",
    version,
    about = "Archive public-account articles as self-contained offline HTML files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Archive articles of an account, given its name or a link to one of its articles.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Account name or article URL.
    target: String,

    /// Archive the newest N articles (defaults to `defaults.page_size`).
    #[arg(short = 'n', long, conflicts_with_all = ["from", "single"])]
    count: Option<u32>,

    /// First publish date to include (YYYY-MM-DD).
    #[arg(long, requires = "to", conflicts_with = "single")]
    from: Option<String>,

    /// Last publish date to include (YYYY-MM-DD).
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// Archive only the article the target URL points at.
    #[arg(long)]
    single: bool,

    /// Output directory (defaults to `defaults.output_dir`).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Browser cookie string; overrides the configured environment variable.
    #[arg(long, requires = "token")]
    cookie: Option<String>,

    /// Session token; overrides the configured environment variable.
    #[arg(long, requires = "cookie")]
    token: Option<String>,

    /// Minimum delay between requests, in milliseconds.
    #[arg(long)]
    min_delay_ms: Option<u64>,

    /// Maximum delay between requests, in milliseconds.
    #[arg(long)]
    max_delay_ms: Option<u64>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mparchive=info",
        1 => "mparchive=debug",
        _ => "mparchive=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(ms) = args.min_delay_ms {
        config.throttle.min_delay_ms = ms;
    }
    if let Some(ms) = args.max_delay_ms {
        config.throttle.max_delay_ms = ms;
    }
    validate_config(&config)?;

    let request = JobRequest {
        target: Target::parse(&args.target)?,
        policy: selection_policy(&args, &config)?,
        output_dir: args
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir)),
    };

    let credentials = match (args.cookie, args.token) {
        (Some(cookie), Some(token)) => StaticCredentials(Credentials::from_cookie_header(&cookie, token)).credentials()?,
        _ => EnvCredentials::from(&config.credentials).credentials()?,
    };
    let session = SessionContext::new(ArchiveConfig::from(&config), credentials);

    info!(target = %request.target, policy = %request.policy, "starting archive job");

    let (handle, token) = job_control();
    spawn_ctrl_c(handle.clone());
    if std::io::stdin().is_terminal() {
        spawn_stdin_control(handle.clone());
        println!("  Controls: p + Enter to pause, r + Enter to resume, c + Enter to cancel");
    }

    let reporter = CliProgress::new();
    let report = run_authorized(&Unmetered, &request, session, &token, &reporter).await;

    print_summary(&request, &report);

    match report.outcome {
        JobOutcome::Failed(reason) => Err(eyre!("job failed: {reason}")),
        JobOutcome::Completed | JobOutcome::Cancelled => Ok(()),
    }
}

fn selection_policy(args: &RunArgs, config: &AppConfig) -> Result<SelectionPolicy> {
    if args.single {
        return Ok(SelectionPolicy::Single);
    }
    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        return Ok(SelectionPolicy::DateRange(DateRange::parse(from, to)?));
    }
    Ok(SelectionPolicy::CountBound(args.count.unwrap_or(config.defaults.page_size)))
}

fn print_summary(request: &JobRequest, report: &JobReport) {
    println!();
    match &report.outcome {
        JobOutcome::Completed => println!("  Archive finished."),
        JobOutcome::Cancelled => println!("  Archive cancelled."),
        JobOutcome::Failed(_) => println!("  Archive stopped with an error."),
    }
    println!("  Job:      {}", report.job_id);
    println!("  Archived: {}", report.archived_count());
    println!(
        "  Skipped:  {}",
        report.articles.iter().filter(|a| a.stats.skipped).count()
    );
    println!("  Failed:   {}", report.failed_count());
    println!("  Output:   {}", request.output_dir.display());
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    for article in report.articles.iter().filter(|a| !a.is_archived()) {
        println!("  missing:  {} ({})", article.descriptor.title, article.descriptor.canonical_url);
    }
    println!();
}

/// Cancel the job on the first Ctrl-C.
fn spawn_ctrl_c(handle: JobHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
}

/// Read `p`/`r`/`c` commands from stdin on a plain thread.
///
/// The thread is left detached; it ends with the process.
fn spawn_stdin_control(handle: JobHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let applied = match line.trim() {
                "p" => handle.pause(),
                "r" => handle.resume(),
                "c" => handle.cancel(),
                "" => continue,
                other => {
                    eprintln!("  unknown command {other:?} (use p, r or c)");
                    continue;
                }
            };
            debug!(command = line.trim(), applied, state = %handle.state(), "control input");
        }
    });
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn message(&self, text: &str) {
        self.spinner.println(format!("  {text}"));
    }

    fn listed(&self, count: usize) {
        self.spinner.println(format!("  Found {count} article(s)"));
    }

    fn article_started(&self, current: usize, total: usize, title: &str) {
        self.spinner.set_message(format!("Archiving [{current}/{total}] {title}"));
    }

    fn article_finished(&self, current: usize, total: usize, article: &ArchivedArticle) {
        self.spinner.println(finished_line(current, total, article));
    }

    fn done(&self, _report: &JobReport) {
        self.spinner.finish_and_clear();
    }
}

/// One status line per finished article: date, title, and what happened.
fn finished_line(current: usize, total: usize, article: &ArchivedArticle) -> String {
    let date = article
        .descriptor
        .published_at()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let stats = &article.stats;
    let (mark, detail) = if !article.is_archived() {
        ("FAIL", "not saved".to_string())
    } else if stats.skipped {
        ("skip", "already archived".to_string())
    } else if stats.images_failed > 0 {
        (
            "ok  ",
            format!("{} image(s) saved, {} left remote", stats.images_saved, stats.images_failed),
        )
    } else {
        ("ok  ", format!("{} image(s) saved", stats.images_saved))
    };
    format!(
        "  {mark} [{current}/{total}] {date} {} ({detail})",
        article.descriptor.title
    )
}
