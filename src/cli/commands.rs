//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::assets::{encode_png, load_one, AssetLoader, ImageSource};
use crate::config::PipelineConfig;
use crate::error::{ChekiError, Result};
use crate::orchestrator::{mask, MaskOrchestrator, MaskStep};
use crate::pipeline::{Pipeline, PipelineInputs};
use crate::session::Session;
use crate::store::{generated_name, now_millis, CompositeStore, DirectoryStore};
use crate::synthesis::{
    CancelToken, ConditioningConfigBuilder, ConditioningToggles, MockSynthesis, ProgressSample,
    SynthesisClient, SynthesisService, WebUiClient,
};

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: PipelineConfig,
    pub session: Session,
    pub dry_run: bool,
}

impl CommandContext {
    fn service(&self) -> Result<Arc<dyn SynthesisService>> {
        if self.dry_run {
            info!("Dry run: using the mock synthesis service");
            return Ok(Arc::new(MockSynthesis::new()));
        }
        Ok(Arc::new(WebUiClient::new(&self.config, &self.session)?))
    }

    fn client(&self) -> Result<SynthesisClient> {
        Ok(SynthesisClient::new(
            self.service()?,
            Duration::from_millis(self.config.poll_interval_ms),
        ))
    }

    fn store(&self) -> DirectoryStore {
        DirectoryStore::new(&self.config.output_dir)
    }
}

fn print_progress(sample: &ProgressSample) {
    print!("\r  {:>3}%  eta {:>5.1}s  {}", sample.percent(), sample.eta_relative, sample.status_text);
    let _ = std::io::stdout().flush();
}

/// Parse `--layers canny,tile` into toggles
pub fn parse_layers(names: &[String]) -> Result<ConditioningToggles> {
    let mut toggles = ConditioningToggles::none();
    for name in names {
        match name.trim().to_lowercase().as_str() {
            "canny" => toggles.canny = true,
            "depth" => toggles.depth = true,
            "lineart" => toggles.lineart = true,
            "tile" => toggles.tile = true,
            "" => {}
            other => {
                return Err(ChekiError::Config {
                    reason: format!("unknown conditioning layer '{}'", other),
                })
            }
        }
    }
    Ok(toggles)
}

/// Generate an AI photo from a source photo.
#[allow(clippy::too_many_arguments)]
pub fn generate(
    ctx: &CommandContext,
    source: &str,
    prompt: Option<&str>,
    negative: Option<&str>,
    seed: Option<i64>,
    layers: Option<&[String]>,
    no_hr: bool,
    no_detail: bool,
) -> Result<()> {
    info!("Generating from: {}", source);

    let loader = AssetLoader::for_session(&ctx.session);
    let photo = load_one(&loader, &ImageSource::parse(source))?;

    let mut builder = ConditioningConfigBuilder::from_defaults(&ctx.config.defaults)
        .reference(photo)
        .high_res(ctx.config.defaults.enable_hr && !no_hr)
        .detail_pass(ctx.config.defaults.detail_pass && !no_detail);
    if let Some(prompt) = prompt {
        builder = builder.prompt(prompt);
    }
    if let Some(negative) = negative {
        builder = builder.negative_prompt(negative);
    }
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    if let Some(layers) = layers {
        builder = builder.toggles(parse_layers(layers)?);
    }
    let request = builder.build()?;

    println!("=== Cheki Generate ===");
    println!("Source: {}", source);
    println!("Size: {}x{} (high-res: {})", request.width, request.height, request.enable_hr);
    println!("Conditioning layers: {}", request.conditioning_layers.len());

    let client = ctx.client()?;
    let image = client.generate(request, &CancelToken::new(), print_progress)?;
    println!();

    let name = generated_name(now_millis());
    let id = ctx.store().put(&ctx.session, "", &name, &encode_png(image.pixels())?)?;
    println!("Generated {}x{}: {}", image.width(), image.height(), id);

    Ok(())
}

#[derive(Debug, Deserialize)]
struct StepFile {
    mask: String,
    prompt: String,
    #[serde(default)]
    negative_prompt: String,
}

fn resolve_relative(base: &Path, raw: &str) -> String {
    match ImageSource::parse(raw) {
        ImageSource::Path(path) if path.is_relative() => base.join(path).display().to_string(),
        _ => raw.to_string(),
    }
}

/// Apply a chain of masked edits.
pub fn inpaint(ctx: &CommandContext, image: &str, steps_path: &Path, invert: bool) -> Result<()> {
    info!("Running mask chain from: {}", steps_path.display());

    let text = std::fs::read_to_string(steps_path)?;
    let entries: Vec<StepFile> = serde_json::from_str(&text)?;
    let base = steps_path.parent().unwrap_or_else(|| Path::new("."));

    let loader = AssetLoader::for_session(&ctx.session);
    let initial = load_one(&loader, &ImageSource::parse(image))?;

    let mut steps = Vec::with_capacity(entries.len());
    for entry in entries {
        let mask_image = load_one(&loader, &ImageSource::parse(&resolve_relative(base, &entry.mask)))?;
        let mut mask = mask::from_source(&mask_image);
        if invert {
            mask = mask::invert(&mask);
        }
        steps.push(MaskStep::new(mask, entry.prompt).with_negative(entry.negative_prompt));
    }
    if steps.is_empty() {
        warn!("No mask steps in {}", steps_path.display());
    }

    println!("=== Cheki Inpaint ===");
    println!("Image: {} ({}x{})", image, initial.width(), initial.height());
    println!("Steps: {}", steps.len());

    let client = ctx.client()?;
    let mut chain = MaskOrchestrator::new(&client, ctx.config.inpaint.clone());
    let mut current_step = usize::MAX;
    let result = chain.run_with_progress(&initial, &steps, |index, sample| {
        if index != current_step {
            if current_step != usize::MAX {
                println!();
            }
            println!("Step {}/{}", index + 1, steps.len());
            current_step = index;
        }
        print_progress(sample);
    });
    println!();

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            println!("Chain stopped: {}", e.user_message());
            return Err(e);
        }
    };

    let name = generated_name(now_millis());
    let id = ctx.store().put(&ctx.session, "", &name, &encode_png(output.pixels())?)?;
    println!("Chain complete ({}): {}", chain.state(), id);

    Ok(())
}

/// Image files directly inside `dir`, in name order
pub fn scan_image_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ChekiError::Load {
            origin: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_image = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_image {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Render the two print composites.
#[allow(clippy::too_many_arguments)]
pub fn compose(
    ctx: &CommandContext,
    images: &[String],
    dir: Option<&Path>,
    logo: Option<&str>,
    font: Option<&str>,
    label: Option<&str>,
    regenerate: bool,
    target: &str,
) -> Result<()> {
    let mut sources: Vec<ImageSource> = images.iter().map(|s| ImageSource::parse(s)).collect();
    if let Some(dir) = dir {
        info!("Scanning {} for images", dir.display());
        sources.extend(scan_image_dir(dir)?.into_iter().map(ImageSource::Path));
    }

    let logo = match (logo, &ctx.config.logo_path) {
        (Some(raw), _) => ImageSource::parse(raw),
        (None, Some(path)) => ImageSource::Path(path.clone()),
        (None, None) => {
            return Err(ChekiError::Config {
                reason: "no logo given; pass --logo or set CHEKI_LOGO_PATH".to_string(),
            })
        }
    };
    let font = match (font, &ctx.config.font_path) {
        (Some(raw), _) => Some(ImageSource::parse(raw)),
        (None, Some(path)) => Some(ImageSource::Path(path.clone())),
        (None, None) => None,
    };

    let mut inputs = PipelineInputs::new(sources, logo);
    inputs.font = font;
    inputs.label = label.map(str::to_string);
    inputs.regenerate_secondary = regenerate;
    inputs.target = target.to_string();

    println!("=== Cheki Compose ===");
    println!("Sources: {}", inputs.sources.len());
    for source in &inputs.sources {
        println!("  {}", source.describe());
    }

    let store: Arc<dyn CompositeStore> = Arc::new(ctx.store());
    let mut pipeline = Pipeline::new(ctx.config.clone(), ctx.session.clone(), store);
    if regenerate {
        pipeline = pipeline.with_service(ctx.service()?);
    }

    let outcome = pipeline.run(&inputs, &CancelToken::new())?;
    println!("Real: {}", outcome.stored.primary);
    println!("AI:   {}", outcome.stored.secondary);
    println!("Digest: {}", outcome.digest);

    Ok(())
}

/// Show progress of the running generation.
pub fn progress(ctx: &CommandContext) -> Result<()> {
    let sample = ctx.service()?.progress()?;
    println!("Progress: {}%", sample.percent());
    println!("ETA: {:.1}s", sample.eta_relative);
    if !sample.status_text.is_empty() {
        println!("Status: {}", sample.status_text);
    }
    if sample.interrupted {
        println!("Job was interrupted");
    }
    Ok(())
}

/// Interrupt the running generation.
pub fn interrupt(ctx: &CommandContext) -> Result<()> {
    ctx.service()?.interrupt()?;
    println!("Interrupt sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layers() {
        let toggles = parse_layers(&["Canny".to_string(), " tile".to_string()]).unwrap();
        assert!(toggles.canny && toggles.tile);
        assert!(!toggles.depth && !toggles.lineart);
        assert!(parse_layers(&["sketch".to_string()]).is_err());
    }

    #[test]
    fn test_scan_image_dir_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let files = scan_image_dir(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.jpeg"]);
    }

    #[test]
    fn test_resolve_relative_mask_path() {
        let base = Path::new("/jobs/42");
        assert_eq!(resolve_relative(base, "mask1.png"), "/jobs/42/mask1.png");
        assert_eq!(
            resolve_relative(base, "https://example.com/m.png"),
            "https://example.com/m.png"
        );
    }
}
