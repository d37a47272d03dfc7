//! CLI Module
//!
//! Command-line interface for the cheki print pipeline.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cheki - instant-photo print compositor with AI generation
#[derive(Parser, Debug)]
#[command(name = "cheki")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file (CHEKI_* variables still apply on top)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Bearer token forwarded to the WebUI and remote image hosts
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Use the in-process mock instead of the WebUI
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate an AI photo from a source photo
    #[command(name = "generate")]
    Generate {
        /// Source photo (path or URL)
        source: String,

        /// Prompt (defaults to the configured prompt)
        #[arg(short, long)]
        prompt: Option<String>,

        /// Negative prompt
        #[arg(short, long)]
        negative: Option<String>,

        /// Seed, -1 for random
        #[arg(long)]
        seed: Option<i64>,

        /// Conditioning layers to enable (canny, depth, lineart, tile)
        #[arg(long, value_delimiter = ',')]
        layers: Option<Vec<String>>,

        /// Generate at full size without the upscale pass
        #[arg(long)]
        no_hr: bool,

        /// Skip the face detail pass
        #[arg(long)]
        no_detail: bool,
    },

    /// Apply a chain of masked edits to an image
    #[command(name = "inpaint")]
    Inpaint {
        /// Image to edit (path or URL)
        image: String,

        /// JSON list of {"mask", "prompt", "negative_prompt"} steps
        #[arg(short, long)]
        steps: PathBuf,

        /// Repaint outside the masks instead of inside
        #[arg(long)]
        invert: bool,
    },

    /// Render the two print composites
    #[command(name = "compose")]
    Compose {
        /// Source images (paths or URLs)
        images: Vec<String>,

        /// Read source images from a directory instead
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Logo image (defaults to the configured logo)
        #[arg(long)]
        logo: Option<String>,

        /// Font for the label (defaults to the configured font)
        #[arg(long)]
        font: Option<String>,

        /// Label printed on the band, e.g. an order number
        #[arg(short, long)]
        label: Option<String>,

        /// Replace the AI image with a fresh generation from the photo
        #[arg(long)]
        regenerate: bool,

        /// Output subdirectory
        #[arg(short, long, default_value = "")]
        target: String,
    },

    /// Show progress of the running generation
    #[command(name = "progress")]
    Progress,

    /// Interrupt the running generation
    #[command(name = "interrupt")]
    Interrupt,
}
