//! Cheki - Instant-photo print pipeline
//!
//! Turns a small set of captured photos into a pair of print-ready "cheki"
//! composites, a real-photo variant and an AI variant, using a Stable
//! Diffusion WebUI for the generation step.
//!
//! # Architecture
//!
//! - `layout`: geometry, role assignment and the compositor (pure, deterministic)
//! - `synthesis`: request building and the submit/poll/decode client
//! - `orchestrator`: chains of masked edits, each feeding the next
//! - `assets`, `store`, `pipeline`: loading, persistence and the end-to-end run

pub mod assets;
pub mod cli;
pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod synthesis;

pub use assets::{BrandingAssets, ImageSource, SourceImage};
pub use config::PipelineConfig;
pub use error::{ChekiError, Result};
pub use layout::{compose, CompositeResult, RenderOptions, RoleAssignment};
pub use orchestrator::{ChainState, MaskOrchestrator, MaskStep};
pub use pipeline::{Pipeline, PipelineInputs};
pub use session::Session;
pub use synthesis::{GenerationRequest, SynthesisClient, SynthesisService};
