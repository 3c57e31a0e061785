//! Oolong command-line driver
//!
//! Formats IR listings, runs the dependency analysis over a project manifest and
//! compiles projects to JavaScript or WebAssembly.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod manifest;
mod output;
mod report;

#[derive(Parser)]
#[command(name = "oolong")]
#[command(about = "Whole-program compiler from Oolong IR to JavaScript and WebAssembly", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// When to use colors: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a listing and print it in canonical form
    Fmt {
        /// Listing file
        listing: PathBuf,
        /// Fail if the file is not already formatted
        #[arg(long)]
        check: bool,
        /// Rewrite the file in place
        #[arg(short, long, conflicts_with = "check")]
        write: bool,
    },

    /// Run the dependency analysis and print what is reachable
    Analyze {
        /// Project manifest (oolong.toml)
        #[arg(default_value = "oolong.toml")]
        manifest: PathBuf,
        /// Print the type set of every variable
        #[arg(long)]
        types: bool,
    },

    /// Compile a project
    Build {
        /// Project manifest (oolong.toml)
        #[arg(default_value = "oolong.toml")]
        manifest: PathBuf,
        /// Output file (defaults to classes.js or classes.wasm)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format: js or wasm
        #[arg(long)]
        target: Option<String>,
        /// Write a source map next to the output
        #[arg(long)]
        source_map: bool,
        /// Optimization level: none, basic or full
        #[arg(short = 'O', long)]
        optimization: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let color = output::resolve_color_choice(cli.color.as_deref());

    let success = match cli.command {
        Commands::Fmt { listing, check, write } => commands::fmt::execute(&listing, check, write, color)?,
        Commands::Analyze { manifest, types } => commands::analyze::execute(&manifest, types, color)?,
        Commands::Build {
            manifest,
            output,
            target,
            source_map,
            optimization,
        } => commands::build::execute(
            &manifest,
            commands::build::BuildOverrides {
                output,
                target,
                source_map,
                optimization,
            },
            color,
        )?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
