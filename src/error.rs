//! Error handling for Cheki
//!
//! Every error carries a stable code and, where it helps, recovery suggestions
//! that the CLI prints next to the message.

use thiserror::Error;

/// Result type alias for Cheki operations
pub type Result<T> = std::result::Result<T, ChekiError>;

/// Longest remote body kept inside an error message.
pub const MAX_REMOTE_BODY_CHARS: usize = 500;

/// Main error type for Cheki operations
#[derive(Error, Debug)]
pub enum ChekiError {
    // Input Errors
    #[error("Insufficient input: {required} source images required, {supplied} supplied")]
    InsufficientInput { required: usize, supplied: usize },

    #[error("Could not resolve the {role} role from the supplied images")]
    RoleResolution { role: String },

    #[error("Failed to load {origin}: {reason}")]
    Load { origin: String, reason: String },

    // Synthesis Errors
    #[error("Synthesis service error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Synthesis {
        status: Option<u16>,
        message: String,
    },

    #[error("Synthesis service unavailable: {reason}")]
    SynthesisUnavailable { reason: String },

    #[error("Synthesis request timed out after {timeout_ms}ms")]
    SynthesisTimeout { timeout_ms: u64 },

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Failed to decode image payload: {reason}")]
    Decode { reason: String },

    // Orchestration Errors
    #[error("Mask chain failed at step {failed_step_index}: {cause}")]
    Chain {
        failed_step_index: usize,
        #[source]
        cause: Box<ChekiError>,
    },

    // Rendering Errors
    #[error("Render failed: {reason}")]
    Render { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // Persistence Errors
    #[error("Failed to store {target}: {reason}")]
    Store { target: String, reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ChekiError {
    /// Build a synthesis error from a remote status and body, trimming long bodies.
    pub fn synthesis(status: Option<u16>, body: impl AsRef<str>) -> Self {
        ChekiError::Synthesis {
            status,
            message: truncate_body(body.as_ref()),
        }
    }

    /// Wrap a step failure into a chain error.
    pub fn chain(failed_step_index: usize, cause: ChekiError) -> Self {
        ChekiError::Chain {
            failed_step_index,
            cause: Box::new(cause),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ChekiError::InsufficientInput { .. } => "INSUFFICIENT_INPUT",
            ChekiError::RoleResolution { .. } => "ROLE_RESOLUTION",
            ChekiError::Load { .. } => "LOAD_ERROR",
            ChekiError::Synthesis { .. } => "SYNTHESIS_ERROR",
            ChekiError::SynthesisUnavailable { .. } => "SYNTHESIS_UNAVAILABLE",
            ChekiError::SynthesisTimeout { .. } => "SYNTHESIS_TIMEOUT",
            ChekiError::Cancelled => "CANCELLED",
            ChekiError::Decode { .. } => "DECODE_ERROR",
            ChekiError::Chain { .. } => "CHAIN_ERROR",
            ChekiError::Render { .. } => "RENDER_ERROR",
            ChekiError::Config { .. } => "CONFIG_ERROR",
            ChekiError::Store { .. } => "STORE_ERROR",
            ChekiError::Io(_) => "IO_ERROR",
            ChekiError::Serialization(_) => "SERIALIZATION_ERROR",
            ChekiError::Image(_) => "IMAGE_ERROR",
        }
    }

    /// Check if this error is recoverable by resubmitting or fixing input
    pub fn is_recoverable(&self) -> bool {
        match self {
            ChekiError::InsufficientInput { .. } => true,
            ChekiError::Load { .. } => true,
            ChekiError::Synthesis { .. } => true,
            ChekiError::SynthesisUnavailable { .. } => true,
            ChekiError::SynthesisTimeout { .. } => true,
            ChekiError::Cancelled => true,
            ChekiError::Store { .. } => true,
            ChekiError::Chain { cause, .. } => cause.is_recoverable(),
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ChekiError::InsufficientInput { .. } => vec![
                "Select three images: the photo, the AI image and the QR code",
            ],
            ChekiError::Load { .. } => vec![
                "Check the file path or URL is correct",
                "Verify the file is a PNG or JPEG image",
            ],
            ChekiError::Synthesis { .. } => vec![
                "Check the checkpoint and ControlNet models are installed in the WebUI",
                "Resubmit the request once the WebUI is idle",
            ],
            ChekiError::SynthesisUnavailable { .. } => vec![
                "Start the WebUI with the --api flag",
                "Set CHEKI_SD_URL to the WebUI address",
            ],
            ChekiError::SynthesisTimeout { .. } => vec![
                "Raise CHEKI_SD_TIMEOUT_MS",
                "Disable high-res mode or reduce the step count",
            ],
            ChekiError::Chain { .. } => vec![
                "Fix the failing mask step and rerun the chain from the first step",
            ],
            ChekiError::Store { .. } => vec![
                "Check the output directory exists and is writable",
                "The rendered composites are unaffected; retry storing them",
            ],
            _ => vec![],
        }
    }

    /// Message for end users, including the remote status and body where available
    pub fn user_message(&self) -> String {
        match self {
            ChekiError::Synthesis {
                status: Some(status),
                message,
            } => format!("The image service answered HTTP {}: {}", status, message),
            ChekiError::Chain {
                failed_step_index,
                cause,
            } => format!(
                "Mask step {} failed ({}): {}",
                failed_step_index + 1,
                cause.error_code(),
                cause.user_message()
            ),
            _ => self.to_string(),
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_REMOTE_BODY_CHARS {
        body.to_string()
    } else {
        body.chars().take(MAX_REMOTE_BODY_CHARS).collect()
    }
}
