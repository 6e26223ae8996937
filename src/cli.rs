//! CLI parsing and orchestration. Parses args, runs a runner over an episode range, writes XML
//! and thumbnails. Maps errors to exit codes.

use crate::config::{self, Config, ConfigDocument, DEFAULT_SCRAPERS_CONFIG};
use crate::output::{
    download_thumbnail, episode_base_name, normalize_episode, write_episode, OutputError,
};
use crate::registry::{self, Registry};
use crate::runner::{RunOutput, RunnerError};
use crate::PoliteClient;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Runner(#[from] RunnerError),

    #[error("{0}")]
    Output(#[from] OutputError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Runner(_) => 2,
            CliRunError::Output(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "epscrape")]
#[command(about = "Scrape episode metadata with a named runner and write XML plus thumbnails")]
#[command(
    after_help = "App config keys (output_dir, scrapers_config, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs) are read from ./epscrape.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Runner name, e.g. 11eyes (see --list).
    #[arg(required_unless_present = "list")]
    pub runner: Option<String>,

    /// Output directory. Created if missing. Default: output_dir from config, else ".".
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// App config file (TOML). Default: ./epscrape.toml, then the user config dir.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Scrapers config document (JSON, or TOML for any other extension).
    #[arg(short = 'p', long)]
    pub scrapers_config: Option<PathBuf>,

    /// Scrape a single episode.
    #[arg(short, long, conflicts_with_all = ["start", "end"])]
    pub episode: Option<u32>,

    /// First episode of the range (inclusive). Needs --end.
    #[arg(short = 'S', long, requires = "end")]
    pub start: Option<u32>,

    /// Last episode of the range (inclusive). Needs --start.
    #[arg(short = 'E', long, requires = "start")]
    pub end: Option<u32>,

    /// List runners and scraper names, then exit.
    #[arg(long)]
    pub list: bool,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long)]
    pub verbose: bool,

    /// HTTP User-Agent for thumbnail downloads (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between thumbnail requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Thumbnail request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Install the tracing subscriber. `RUST_LOG` wins over the verbosity flags.
pub fn init_logging(args: &Args) {
    let default = if args.verbose {
        "epscrape=debug"
    } else if args.quiet {
        "epscrape=warn"
    } else {
        "epscrape=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Episode range from flags, or None when the user has to be asked.
fn episode_range(args: &Args) -> Result<Option<(u32, u32)>, CliRunError> {
    match (args.start, args.end, args.episode) {
        (Some(start), Some(end), _) if start > end => Err(CliRunError::InvalidInput(format!(
            "Invalid range: start ({}) must be <= end ({})",
            start, end
        ))),
        (Some(start), Some(end), _) => Ok(Some((start, end))),
        (_, _, Some(episode)) => Ok(Some((episode, episode))),
        _ => Ok(None),
    }
}

/// Number of episodes in an inclusive range with `start <= end`.
fn episode_count(start: u32, end: u32) -> u64 {
    u64::from(end) - u64::from(start) + 1
}

fn prompt_range() -> Result<(u32, u32), CliRunError> {
    let ask = |prompt: &str| {
        dialoguer::Input::<u32>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| CliRunError::InvalidInput(format!("Cannot read episode number: {}", e)))
    };
    let start = ask("Start episode")?;
    let end = ask("End episode")?;
    if start > end {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid range: start ({}) must be <= end ({})",
            start, end
        )));
    }
    Ok((start, end))
}

/// Load the scrapers config document. A path named on the CLI or in the app config must exist;
/// a missing default document means every scraper gets an empty section.
fn load_document(
    explicit: Option<&Path>,
    from_config: Option<&Path>,
) -> Result<ConfigDocument, CliRunError> {
    if let Some(path) = explicit.or(from_config) {
        return ConfigDocument::load(path).map_err(CliRunError::InvalidInput);
    }
    let default = Path::new(DEFAULT_SCRAPERS_CONFIG);
    if default.exists() {
        return ConfigDocument::load(default).map_err(CliRunError::InvalidInput);
    }
    warn!(
        path = DEFAULT_SCRAPERS_CONFIG,
        "scrapers config not found; scrapers get empty sections"
    );
    Ok(ConfigDocument::new())
}

fn thumbnail_client(args: &Args, config: Option<&Config>) -> Result<PoliteClient, CliRunError> {
    const DEFAULT_DELAY_SECS: u64 = 1;
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRY_COUNT: u32 = 3;
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let retry_backoff_secs = config
        .and_then(|c| c.retry_backoff_secs.clone())
        .unwrap_or_else(|| vec![1, 2, 4]);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()));

    let mut builder = PoliteClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count)
        .retry_backoff_secs(retry_backoff_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn progress_bar(total: u64) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total);
    let style = indicatif::ProgressStyle::default_bar()
        .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .progress_chars("█▉▊▋▌▍▎▏ ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn print_registry(registry: &Registry) {
    println!("Runners:");
    for runner in registry.runners() {
        println!(
            "  {} ({} season {}): {}",
            runner.name(),
            runner.series(),
            runner.season(),
            runner.scraper_names().join(", ")
        );
    }
    println!("Scrapers:");
    for name in registry.scraper_names() {
        println!("  {}", name);
    }
}

fn unknown_runner(name: &str, registry: &Registry) -> CliRunError {
    let available: Vec<&str> = registry.runners().map(|r| r.name()).collect();
    CliRunError::InvalidInput(format!(
        "Unknown runner '{}'. Available: {}",
        name,
        available.join(", ")
    ))
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let registry = registry::global();
    if args.list {
        print_registry(registry);
        return Ok(());
    }
    let runner_name = args.runner.as_deref().ok_or_else(|| {
        CliRunError::InvalidInput("A runner name is required (see --list).".to_string())
    })?;
    let runner = registry
        .runner(runner_name)
        .ok_or_else(|| unknown_runner(runner_name, registry))?;

    let config = config::load_config(args.config.as_deref()).map_err(CliRunError::InvalidInput)?;
    let document = load_document(
        args.scrapers_config.as_deref(),
        config.as_ref().and_then(|c| c.scrapers_config.as_deref()),
    )?;

    let output_dir: PathBuf = args
        .output
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir).map_err(|source| OutputError::Io {
        path: output_dir.clone(),
        source,
    })?;

    let (start, end) = match episode_range(args)? {
        Some(range) => range,
        None => prompt_range()?,
    };
    let mut client = thumbnail_client(args, config.as_ref())?;

    let progress = (!args.quiet).then(|| progress_bar(episode_count(start, end)));
    for episode_num in start..=end {
        if let Some(pb) = &progress {
            pb.set_message(format!("Episode {}", episode_num));
        }
        let RunOutput {
            mut episode,
            thumbnails,
        } = runner.run(episode_num, &document)?;
        let base = episode_base_name(runner.series(), runner.season(), episode.episode);
        episode.thumbnail = download_thumbnail(&mut client, &thumbnails, &output_dir, &base)?;
        if episode.thumbnail.is_none() && !thumbnails.is_empty() {
            warn!(episode = episode_num, "no thumbnail could be downloaded");
        }
        normalize_episode(&mut episode);
        let path = write_episode(&output_dir, &base, &episode)?;
        info!(path = %path.display(), "wrote episode");
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    if !args.quiet {
        eprintln!(
            "Wrote {} episode(s) to {}",
            episode_count(start, end),
            output_dir.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::ScraperError;

    fn args(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("epscrape").chain(argv.iter().copied()))
    }

    #[test]
    fn single_episode_range() -> Result<(), Box<dyn std::error::Error>> {
        let a = args(&["11eyes", "-e", "4"])?;
        assert_eq!(episode_range(&a)?, Some((4, 4)));
        Ok(())
    }

    #[test]
    fn start_end_range() -> Result<(), Box<dyn std::error::Error>> {
        let a = args(&["11eyes", "-S", "2", "-E", "12"])?;
        assert_eq!(episode_range(&a)?, Some((2, 12)));
        Ok(())
    }

    #[test]
    fn missing_range_means_prompt() -> Result<(), Box<dyn std::error::Error>> {
        let a = args(&["11eyes"])?;
        assert_eq!(episode_range(&a)?, None);
        Ok(())
    }

    #[test]
    fn episode_count_covers_full_u32_range() {
        assert_eq!(episode_count(4, 4), 1);
        assert_eq!(episode_count(1, 12), 12);
        assert_eq!(episode_count(0, u32::MAX), 1 << 32);
    }

    #[test]
    fn reversed_range_is_invalid_input() -> Result<(), clap::Error> {
        let a = args(&["11eyes", "-S", "5", "-E", "1"])?;
        assert!(matches!(episode_range(&a), Err(CliRunError::InvalidInput(_))));
        Ok(())
    }

    #[test]
    fn start_without_end_is_rejected_by_parser() {
        assert!(args(&["11eyes", "-S", "5"]).is_err());
        assert!(args(&["11eyes", "-e", "1", "-S", "1", "-E", "2"]).is_err());
    }

    #[test]
    fn runner_required_unless_listing() {
        assert!(args(&[]).is_err());
        assert!(args(&["--list"]).is_ok());
    }

    #[test]
    fn list_runs_without_runner() -> Result<(), Box<dyn std::error::Error>> {
        run(&args(&["--list"])?)?;
        Ok(())
    }

    #[test]
    fn unknown_runner_is_invalid_input() -> Result<(), clap::Error> {
        let result = run(&args(&["no-such-show", "-e", "1"])?);
        match result {
            Err(CliRunError::InvalidInput(msg)) => {
                assert!(msg.contains("no-such-show"));
                assert!(msg.contains("11eyes"));
            }
            other => panic!("expected invalid input, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn explicit_scrapers_config_must_exist() {
        let missing = PathBuf::from("/nonexistent_dir_epscrape_xyz/scrapers.json");
        assert!(matches!(
            load_document(Some(&missing), None),
            Err(CliRunError::InvalidInput(_))
        ));
    }

    #[test]
    fn scrapers_config_from_cli_wins() -> Result<(), Box<dyn std::error::Error>> {
        let path = std::env::temp_dir().join(format!("epscrape-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"wiki": {"table": 1}}"#)?;
        let missing = PathBuf::from("/nonexistent_dir_epscrape_xyz/other.toml");
        let doc = load_document(Some(&path), Some(&missing))?;
        assert!(doc.contains("wiki"));
        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn thumbnail_client_from_flags_and_config() -> Result<(), CliRunError> {
        let a = args(&["11eyes", "--delay", "0", "--user-agent", "UA/2"])
            .map_err(|e| CliRunError::InvalidInput(e.to_string()))?;
        let config = Config {
            timeout_secs: Some(5),
            retry_count: Some(0),
            ..Config::default()
        };
        thumbnail_client(&a, Some(&config))?;
        Ok(())
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Runner(RunnerError::UnrecognizedScraper {
                runner: "r".into(),
                name: "x".into(),
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Runner(RunnerError::Scraper {
                name: "x".into(),
                episode_num: 1,
                source: ScraperError::EpisodeNotFound {
                    season: 1,
                    episode: 1,
                },
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Output(OutputError::Xml {
                episode: 1,
                reason: "x".into(),
            })
            .exit_code(),
            3
        );
    }
}
