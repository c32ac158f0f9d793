//! Forum Harvester main entry point
//!
//! This is the command-line interface for the forum harvester.

use anyhow::Context;
use clap::{Parser, Subcommand};
use forum_harvester::config::{load_config_with_hash, Config};
use forum_harvester::model::{ScrapeResultBuilder, SortBy, TimeRange};
use forum_harvester::storage::open_storage;
use forum_harvester::{Harvester, Platform, ScrapeOptions, ScrapeResult};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Database used by `--store` when the config names none
const DEFAULT_DATABASE: &str = "forum-harvester.db";

/// Forum Harvester: a resilient multi-platform forum scraper
///
/// Collects posts, comment threads and user profiles from Reddit and
/// Hacker News while honouring each platform's rate limits.
#[derive(Parser, Debug)]
#[command(name = "forum-harvester")]
#[command(version)]
#[command(about = "A resilient multi-platform forum scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Platform to scrape
    #[arg(short, long, default_value = "reddit", global = true, value_parser = parse_platform)]
    platform: Platform,

    /// Number of items to collect
    #[arg(short, long, default_value_t = 25, global = true)]
    limit: usize,

    /// Listing sort order (hot, new, top, rising, controversial, relevance)
    #[arg(long, default_value = "hot", global = true, value_parser = parse_sort)]
    sort: SortBy,

    /// Time window for top/controversial listings and search
    #[arg(long, default_value = "day", global = true, value_parser = parse_time)]
    time: TimeRange,

    /// Fetch comment threads for every post
    #[arg(long, global = true)]
    comments: bool,

    /// Maximum comment depth (top-level comments are depth 0)
    #[arg(long, default_value_t = 10, global = true)]
    max_depth: u32,

    /// Store the result in the SQLite database
    #[arg(long, global = true)]
    store: bool,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a subreddit or a Hacker News story list
    Category { name: String },

    /// Fetch a single post
    Post { id: String },

    /// Fetch the comment thread of a post
    Comments { post_id: String },

    /// Fetch one or more user profiles
    User {
        #[arg(required = true)]
        usernames: Vec<String>,
    },

    /// Full-text search for posts
    Search { query: String },

    /// Trending posts across the platform
    Trending,

    /// Check connectivity and show platform capabilities
    Test,
}

impl Command {
    /// Label recorded with stored runs
    fn label(&self) -> String {
        match self {
            Self::Category { name } => format!("category {}", name),
            Self::Post { id } => format!("post {}", id),
            Self::Comments { post_id } => format!("comments {}", post_id),
            Self::User { usernames } => format!("user {}", usernames.join(",")),
            Self::Search { query } => format!("search {}", query),
            Self::Trending => "trending".to_string(),
            Self::Test => "test".to_string(),
        }
    }
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse()
}

fn parse_sort(s: &str) -> Result<SortBy, String> {
    s.parse()
}

fn parse_time(s: &str) -> Result<TimeRange, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, hash)
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            (Config::default(), "default".to_string())
        }
    };

    let mut harvester = Harvester::new(config)?.with_config_hash(config_hash);
    if cli.store {
        let path = harvester
            .config()
            .storage
            .database_path
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let storage = open_storage(Path::new(&path))
            .with_context(|| format!("failed to open database {}", path))?;
        tracing::info!("Storing results in {}", path);
        harvester = harvester.with_sink(Box::new(storage));
    }

    if let Err(e) = harvester.initialize(cli.platform).await {
        tracing::warn!("Failed to initialize {}: {}", cli.platform, e);
    }

    if let Command::Test = cli.command {
        return handle_test(&harvester, cli.platform).await;
    }

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with partial results");
            signal.cancel();
        }
    });

    let options = ScrapeOptions {
        limit: cli.limit,
        sort_by: cli.sort,
        time_range: cli.time,
        include_comments: cli.comments,
        max_depth: cli.max_depth,
        cancel,
        ..ScrapeOptions::default()
    };

    let result = run_command(&harvester, cli.platform, &cli.command, &options).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !cli.quiet {
        print_result(&result);
    }

    if let Some(run_id) = harvester.persist(&cli.command.label(), &result)? {
        tracing::info!("Stored as run {}", run_id);
    }

    for breaker in harvester.breaker_states() {
        tracing::debug!(
            name = %breaker.name,
            state = ?breaker.state,
            failures = breaker.consecutive_failures,
            "Circuit breaker"
        );
    }

    Ok(())
}

/// Sets up logging based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_harvester=info,warn"),
            1 => EnvFilter::new("forum_harvester=debug,info"),
            2 => EnvFilter::new("forum_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_command(
    harvester: &Harvester,
    platform: Platform,
    command: &Command,
    options: &ScrapeOptions,
) -> anyhow::Result<ScrapeResult> {
    let result = match command {
        Command::Category { name } => harvester.scrape_category(platform, name, options).await,
        Command::Trending => harvester.get_trending(platform, options).await,
        Command::Search { query } => harvester.search(platform, query, options).await,
        Command::Comments { post_id } => harvester.scrape_comments(platform, post_id, options).await,
        Command::User { usernames } => harvester.scrape_users(platform, usernames, options).await,
        Command::Post { id } => {
            let mut result = ScrapeResultBuilder::new(platform);
            match harvester.scrape_post(platform, id).await? {
                Some(post) => result.push_post(post),
                None => tracing::warn!("Post {} not found on {}", id, platform),
            }
            if options.include_comments {
                result.merge(harvester.scrape_comments(platform, id, options).await);
            }
            result.finish()
        }
        Command::Test => ScrapeResult::empty(platform),
    };
    Ok(result)
}

/// Handles the `test` command: connectivity and capabilities
async fn handle_test(harvester: &Harvester, platform: Platform) -> anyhow::Result<()> {
    let capabilities = harvester.capabilities(platform);
    println!("=== {} ===\n", platform);
    println!("Capabilities:");
    println!("  Comment threads: {}", capabilities.supports_comment_threads);
    println!("  User profiles: {}", capabilities.supports_user_profiles);
    println!("  Search: {}", capabilities.supports_search);
    println!("  Categories: {}", capabilities.supports_categories);
    println!("  Pagination: {}", capabilities.supports_pagination);
    println!("  Max items per request: {}", capabilities.max_items_per_request);
    println!();

    if harvester.test_connection(platform).await {
        println!("Connection: OK");
        Ok(())
    } else {
        println!("Connection: FAILED");
        anyhow::bail!("{} is not reachable", platform)
    }
}

/// Prints a human-readable summary of a result
fn print_result(result: &ScrapeResult) {
    let meta = result.metadata();

    for post in result.posts() {
        println!("[{:>6}] {} ({})", post.score, post.title, post.id);
        println!("         by {} | {} comments | {}", post.author, post.comment_count, post.url);
    }

    if !result.comments().is_empty() {
        println!();
        for comment in result.comments() {
            let indent = "  ".repeat(comment.depth as usize);
            let first_line = comment.content.lines().next().unwrap_or("");
            println!("{}- {} ({}): {}", indent, comment.author, comment.score, first_line);
        }
    }

    for user in result.users() {
        println!("{} | karma {} | id {}", user.username, user.karma, user.id);
    }

    if !result.errors().is_empty() {
        eprintln!();
        for error in result.errors() {
            eprintln!("error [{}]: {}", error.code.as_str(), error.message);
        }
    }

    println!();
    println!(
        "{}: {} posts, {} comments, {} users, {} errors in {} ms",
        meta.platform,
        meta.counts.posts,
        meta.counts.comments,
        meta.counts.users,
        meta.counts.errors,
        meta.duration_ms
    );
    if meta.has_more {
        if let Some(cursor) = &meta.next_cursor {
            println!("More available after cursor {}", cursor);
        }
    }
    if meta.cancelled {
        println!("Stopped early by interrupt");
    }
}
