//! End-to-end pipeline invocation
//!
//! 1. Load every source image plus the branding assets concurrently and wait
//!    for all of them to settle.
//! 2. Assign roles.
//! 3. Optionally replace the secondary image with a generation conditioned on
//!    the primary one.
//! 4. Render both composites.
//! 5. Hand the encoded buffers to the store.
//!
//! Rendering finishes before storing starts; a store failure leaves the
//! rendered `CompositeResult` intact for a retry.

use std::sync::Arc;
use std::time::Duration;

use rusttype::Font;

use crate::assets::{
    load_all, parse_font, require_all, AssetLoader, BrandingAssets, ImageSource, SourceImage,
};
use crate::config::PipelineConfig;
use crate::error::{ChekiError, Result};
use crate::layout::{CompositeResult, Compositor, RenderOptions, RoleAssignment};
use crate::session::Session;
use crate::store::{store_composite, CompositeStore, StoredComposite};
use crate::synthesis::{
    CancelToken, ConditioningConfigBuilder, ProgressSample, SynthesisClient, SynthesisService,
    WebUiClient,
};

/// What one pipeline run works from
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub sources: Vec<ImageSource>,
    pub logo: ImageSource,
    pub font: Option<ImageSource>,
    pub label: Option<String>,
    /// Replace the secondary image with a generation from the primary one
    pub regenerate_secondary: bool,
    /// Store subdirectory
    pub target: String,
}

impl PipelineInputs {
    pub fn new(sources: Vec<ImageSource>, logo: ImageSource) -> Self {
        Self {
            sources,
            logo,
            font: None,
            label: None,
            regenerate_secondary: false,
            target: String::new(),
        }
    }
}

/// Everything loaded for one run
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub images: Vec<SourceImage>,
    pub branding: BrandingAssets,
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub composite: CompositeResult,
    pub stored: StoredComposite,
    pub digest: String,
}

pub struct Pipeline {
    config: PipelineConfig,
    session: Session,
    loader: AssetLoader,
    store: Arc<dyn CompositeStore>,
    synthesis: Option<SynthesisClient>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, session: Session, store: Arc<dyn CompositeStore>) -> Self {
        let loader = AssetLoader::for_session(&session);
        Self {
            config,
            session,
            loader,
            store,
            synthesis: None,
        }
    }

    /// Use `service` for generations
    pub fn with_service(mut self, service: Arc<dyn SynthesisService>) -> Self {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        self.synthesis = Some(SynthesisClient::new(service, interval));
        self
    }

    /// Use the configured WebUI for generations
    pub fn with_webui(self) -> Result<Self> {
        let client = WebUiClient::new(&self.config, &self.session)?;
        Ok(self.with_service(Arc::new(client)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn synthesis(&self) -> Option<&SynthesisClient> {
        self.synthesis.as_ref()
    }

    /// Load sources, logo and font concurrently; fails only after all settled
    pub async fn load_inputs(&self, inputs: &PipelineInputs) -> Result<LoadedInputs> {
        let (images, logo, font) = tokio::join!(
            load_all(&self.loader, &inputs.sources),
            self.loader.load(&inputs.logo),
            self.load_font(inputs.font.as_ref()),
        );

        let images = require_all(images)?;
        let mut branding = BrandingAssets::new(logo?);
        if let Some(font) = font? {
            branding = branding.with_font(font);
        }
        Ok(LoadedInputs { images, branding })
    }

    async fn load_font(&self, source: Option<&ImageSource>) -> Result<Option<Font<'static>>> {
        let Some(source) = source else {
            return Ok(None);
        };
        let bytes = self.loader.fetch_bytes(source).await?;
        parse_font(&source.describe(), bytes).map(Some)
    }

    /// [`Pipeline::load_inputs`] on a private current-thread runtime.
    ///
    /// Panics when called from inside a tokio runtime; async callers await
    /// [`Pipeline::load_inputs`] directly.
    pub fn load_inputs_blocking(&self, inputs: &PipelineInputs) -> Result<LoadedInputs> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.load_inputs(inputs))
    }

    /// Generate an image conditioned on `source`
    pub fn generate_from<F>(
        &self,
        source: &SourceImage,
        cancel: &CancelToken,
        on_progress: F,
    ) -> Result<SourceImage>
    where
        F: FnMut(&ProgressSample),
    {
        let client = self.synthesis.as_ref().ok_or_else(|| ChekiError::Config {
            reason: "no synthesis service configured".to_string(),
        })?;
        let request = ConditioningConfigBuilder::from_defaults(&self.config.defaults)
            .reference(source.clone())
            .build()?;
        client.generate(request, cancel, on_progress)
    }

    /// Assign roles, optionally regenerate the secondary image, and render
    pub fn render(
        &self,
        loaded: LoadedInputs,
        inputs: &PipelineInputs,
        cancel: &CancelToken,
    ) -> Result<CompositeResult> {
        let mut roles = RoleAssignment::assign(loaded.images)?;
        if inputs.regenerate_secondary {
            tracing::info!(source = roles.primary.origin(), "Generating secondary image");
            roles.secondary = self.generate_from(&roles.primary, cancel, |sample| {
                tracing::debug!(percent = sample.percent(), "Generation progress");
            })?;
        }

        let options = RenderOptions {
            label: inputs.label.clone(),
        };
        Compositor::new(&loaded.branding).render(&roles, &options)
    }

    /// Encode and store both variants
    pub fn persist(&self, composite: &CompositeResult, target: &str) -> Result<StoredComposite> {
        let encoded = composite.encode()?;
        store_composite(self.store.as_ref(), &self.session, target, &encoded)
    }

    /// Full run: load, render, persist.
    ///
    /// Loading goes through [`Pipeline::load_inputs_blocking`], which starts its
    /// own runtime, so this must not be called from async code. There, await
    /// [`Pipeline::load_inputs`] and then call [`Pipeline::render`] and
    /// [`Pipeline::persist`] (on a blocking task if the runtime must stay free).
    pub fn run(&self, inputs: &PipelineInputs, cancel: &CancelToken) -> Result<PipelineOutcome> {
        let loaded = self.load_inputs_blocking(inputs)?;
        let composite = self.render(loaded, inputs, cancel)?;
        let digest = composite.digest();
        let stored = self.persist(&composite, &inputs.target)?;
        tracing::info!(
            session = %self.session.id,
            primary = %stored.primary,
            secondary = %stored.secondary,
            "Pipeline run finished"
        );
        Ok(PipelineOutcome {
            composite,
            stored,
            digest,
        })
    }
}
