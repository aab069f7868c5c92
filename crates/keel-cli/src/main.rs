use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

/// Keel toolchain driver.
///
/// Resolves import identifiers across the configured source roots,
/// builds their dependency closure with content-addressed caching, and
/// links command packages into executables.
///
/// EXAMPLES:
///     keel build example.org/app     Build a package and its closure
///     keel get -u example.org/lib    Fetch or update a remote package
///     keel list example.org/app      Show resolved packages
///     keel env                       Print effective configuration
///
/// ENVIRONMENT VARIABLES:
///     KEEL_HOME   Distribution root (default ~/.keel)
///     KEEL_PATH   Ordered workspace roots (default ~/keel)
///     KEEL_OS     Target operating system
///     KEEL_ARCH   Target architecture
#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build packages and their dependency closures
    ///
    /// Compiles every package reachable from the given identifiers,
    /// reusing cached artifacts for packages whose sources and
    /// dependency interfaces are unchanged. Command packages are linked
    /// into the workspace bin directory.
    ///
    /// EXAMPLES:
    ///     keel build example.org/app            Build one root
    ///     keel build example.org/app --jobs 2   Cap parallelism
    ///     keel build example.org/app --update   Refetch remote deps
    #[command(visible_alias = "b")]
    Build {
        /// Import identifiers to build
        #[arg(required = true)]
        identifiers: Vec<String>,
        /// Refetch remote dependencies instead of reusing local copies
        #[arg(long)]
        update: bool,
        /// Number of parallel compile jobs
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Verbose output (per-package outcomes)
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Emit the build summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Fetch packages into the first workspace root
    ///
    /// EXAMPLES:
    ///     keel get example.org/lib       Fetch if absent
    ///     keel get -u example.org/lib    Refetch the latest sources
    Get {
        /// Import identifiers to fetch
        #[arg(required = true)]
        identifiers: Vec<String>,
        /// Refetch even when a local copy exists
        #[arg(long, short = 'u')]
        update: bool,
    },

    /// List resolved packages in a dependency closure
    ///
    /// Shows, per package in dependency order: identifier, kind,
    /// resolved directory, and direct dependencies.
    List {
        /// Import identifiers whose closures to list
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Print the effective configuration
    Env,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Build {
            identifiers,
            update,
            jobs,
            verbose,
            json,
        } => commands::build::run(commands::build::BuildArgs {
            identifiers,
            update,
            jobs,
            verbose,
            json,
        })?,
        Commands::Get {
            identifiers,
            update,
        } => commands::get::run(&identifiers, update)?,
        Commands::List { identifiers } => commands::list::run(&identifiers)?,
        Commands::Env => commands::env::run()?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
