//! Cheki CLI - Instant-photo print pipeline
//!
//! Command-line interface for the cheki compositor and generation pipeline.

use anyhow::Context;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use cheki::cli::commands::{self, CommandContext};
use cheki::cli::{Cli, Commands};
use cheki::{ChekiError, PipelineConfig, Session};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Cheki v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env_overrides(),
        None => PipelineConfig::from_env(),
    };
    config.validate()?;

    let session = match &cli.token {
        Some(token) => Session::with_token(token.clone()),
        None => Session::anonymous(),
    };
    let ctx = CommandContext {
        config,
        session,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Some(cmd) => handle_command(&ctx, cmd).map_err(report),
        None => {
            println!("Cheki v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn report(err: ChekiError) -> anyhow::Error {
    eprintln!("Error [{}]: {}", err.error_code(), err.user_message());
    for suggestion in err.recovery_suggestions() {
        eprintln!("  - {}", suggestion);
    }
    err.into()
}

fn handle_command(ctx: &CommandContext, cmd: Commands) -> cheki::Result<()> {
    match cmd {
        Commands::Generate {
            source,
            prompt,
            negative,
            seed,
            layers,
            no_hr,
            no_detail,
        } => commands::generate(
            ctx,
            &source,
            prompt.as_deref(),
            negative.as_deref(),
            seed,
            layers.as_deref(),
            no_hr,
            no_detail,
        ),
        Commands::Inpaint {
            image,
            steps,
            invert,
        } => commands::inpaint(ctx, &image, &steps, invert),
        Commands::Compose {
            images,
            dir,
            logo,
            font,
            label,
            regenerate,
            target,
        } => commands::compose(
            ctx,
            &images,
            dir.as_deref(),
            logo.as_deref(),
            font.as_deref(),
            label.as_deref(),
            regenerate,
            &target,
        ),
        Commands::Progress => commands::progress(ctx),
        Commands::Interrupt => commands::interrupt(ctx),
    }
}
