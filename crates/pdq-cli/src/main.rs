#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pdq_core::{CacheOptions, Config, FeedDir};

use output::{CliError, OutputMode, render_error, resolve_output_mode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pdq: package dependency queries",
    long_about = "Query what a package depends on, what depends on it, and which\npackages nothing depends on, over a feed of package records."
)]
struct Cli {
    /// Feed directory of installed-package records.
    #[arg(long, global = true, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Output format (default: pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for --format json.
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress warnings and non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Cache directory (default: the platform cache dir).
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Skip cache reads and writes for this run.
    #[arg(long, global = true)]
    no_cache: bool,

    /// Reuse the cached snapshot even if it is stale.
    #[arg(long, global = true, conflicts_with = "no_cache")]
    force_cache: bool,

    /// Delete the cached snapshot before loading.
    #[arg(long, global = true, conflicts_with = "force_cache")]
    clear_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Queries",
        about = "What a package depends on",
        long_about = "List the dependencies of a package, optionally expanding require and\nrequire-any dependencies transitively.",
        after_help = "EXAMPLES:\n    # Direct dependencies\n    pdq depends web/server\n\n    # Full require closure, five levels deep\n    pdq depends web/server --recurse --max-depth 5\n\n    # Only require edges, as a flat name list\n    pdq depends web/server -r --type require --names\n\n    # Against a latest-package catalog\n    pdq depends web/server@2.4.1 --latest --catalog /var/db/pdq/catalog"
    )]
    Depends(cmd::depends::DependsArgs),

    #[command(
        next_help_heading = "Queries",
        about = "What depends on a package",
        long_about = "List the packages that depend on a package, optionally expanding the\nreverse require closure.",
        after_help = "EXAMPLES:\n    # Who requires zlib?\n    pdq dependants library/zlib\n\n    # The whole reverse closure\n    pdq dependants library/zlib --recurse\n\n    # Machine-readable\n    pdq dependants library/zlib --json"
    )]
    Dependants(cmd::dependants::DependantsArgs),

    #[command(
        next_help_heading = "Queries",
        about = "Packages nothing depends on",
        long_about = "List packages no other package requires. With --recurse, also list the\npackages that would become dependency-free if those were removed.",
        after_help = "EXAMPLES:\n    # All leaves\n    pdq no-dependants\n\n    # Check two specific packages\n    pdq no-dependants web/server cli/tool\n\n    # Leaves plus the ring-fence closure\n    pdq no-dependants --recurse"
    )]
    NoDependants(cmd::no_dependants::NoDependantsArgs),

    #[command(next_help_heading = "Maintenance", about = "Inspect or reset the catalog cache")]
    Cache(cmd::cache::CacheArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    pdq completions bash\n\n    # Generate zsh completions\n    pdq completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("PDQ_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "pdq_core=debug,pdq_cli=debug,info"
        } else if quiet {
            "error"
        } else {
            "pdq_core=info,warn"
        })
    });

    let format = env::var("PDQ_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = match Config::load_default() {
        Ok(config) => config,
        Err(e) => {
            let mode = resolve_output_mode(cli.format, cli.json, None);
            render_error(mode, &CliError::from(&e))?;
            anyhow::bail!("{e}");
        }
    };
    let output = resolve_output_mode(cli.format, cli.json, config.output.format.as_deref());

    let feed_dir = cli
        .source
        .clone()
        .unwrap_or_else(|| config.source.dir.clone());
    let cache_dir = cli.cache_dir.clone().unwrap_or_else(|| config.cache_dir());
    let ctx = cmd::Context {
        feed: FeedDir::new(feed_dir),
        catalog_dir: config.source.catalog.clone(),
        cache_dir,
        cache: CacheOptions {
            disabled: cli.no_cache || !config.cache.enabled,
            force: cli.force_cache,
            clear: cli.clear_cache,
        },
        output,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Depends(ref args) => cmd::depends::run_depends(args, &ctx),
        Commands::Dependants(ref args) => cmd::dependants::run_dependants(args, &ctx),
        Commands::NoDependants(ref args) => cmd::no_dependants::run_no_dependants(args, &ctx),
        Commands::Cache(ref args) => cmd::cache::run_cache(args, &ctx),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
