//! Sequential Mask Orchestrator
//!
//! Runs an ordered list of masked edits. Step `i + 1` always starts from the
//! image step `i` produced, so steps never overlap. The first failure stops
//! the chain and is reported with its step index.
//!
//! States: `Idle -> Running(0) -> ... -> Running(n-1) -> Completed`, with any
//! running step able to move to `Failed`. A finished chain can be run again;
//! it always restarts from step 0.

pub mod mask;

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::assets::SourceImage;
use crate::config::InpaintDefaults;
use crate::error::{ChekiError, Result};
use crate::synthesis::{inpaint_request, CancelToken, ConditioningToggles, ProgressSample, SynthesisClient};

/// One masked edit
#[derive(Debug, Clone)]
pub struct MaskStep {
    /// White = repaint
    pub mask: GrayImage,
    pub prompt: String,
    pub negative_prompt: String,
}

impl MaskStep {
    pub fn new(mask: GrayImage, prompt: impl Into<String>) -> Self {
        Self {
            mask,
            prompt: prompt.into(),
            negative_prompt: String::new(),
        }
    }

    pub fn with_negative(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = negative.into();
        self
    }
}

/// Where a chain is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChainState {
    #[default]
    Idle,
    Running(usize),
    Completed,
    Failed(usize),
}

impl ChainState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Idle => write!(f, "Idle"),
            ChainState::Running(i) => write!(f, "Running({})", i),
            ChainState::Completed => write!(f, "Completed"),
            ChainState::Failed(i) => write!(f, "Failed({})", i),
        }
    }
}

/// Drives a `SynthesisClient` through a chain of masked edits
pub struct MaskOrchestrator<'a> {
    client: &'a SynthesisClient,
    defaults: InpaintDefaults,
    toggles: ConditioningToggles,
    cancel: CancelToken,
    state: ChainState,
    history: Vec<ChainState>,
}

impl<'a> MaskOrchestrator<'a> {
    pub fn new(client: &'a SynthesisClient, defaults: InpaintDefaults) -> Self {
        Self {
            client,
            defaults,
            toggles: ConditioningToggles::none(),
            cancel: CancelToken::new(),
            state: ChainState::Idle,
            history: vec![ChainState::Idle],
        }
    }

    /// Conditioning layers sent with every step
    pub fn with_toggles(mut self, toggles: ConditioningToggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Token that cancels the step in flight
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Every state of the last run, starting with `Idle`
    pub fn history(&self) -> &[ChainState] {
        &self.history
    }

    fn transition(&mut self, next: ChainState) {
        tracing::info!(from = %self.state, to = %next, "Mask chain transition");
        self.state = next;
        self.history.push(next);
    }

    /// Run the whole chain from `initial`
    pub fn run(&mut self, initial: &SourceImage, steps: &[MaskStep]) -> Result<SourceImage> {
        self.run_with_progress(initial, steps, |_, _| {})
    }

    /// Run the chain, reporting `(step index, sample)` for every progress poll
    pub fn run_with_progress<F>(
        &mut self,
        initial: &SourceImage,
        steps: &[MaskStep],
        mut on_progress: F,
    ) -> Result<SourceImage>
    where
        F: FnMut(usize, &ProgressSample),
    {
        if self.state.is_finished() {
            tracing::debug!("Restarting mask chain from step 0");
        }
        self.state = ChainState::Idle;
        self.history = vec![ChainState::Idle];

        let mut current = initial.clone();
        for (index, step) in steps.iter().enumerate() {
            self.transition(ChainState::Running(index));
            match self.run_step(&current, step, index, &mut on_progress) {
                Ok(output) => current = output,
                Err(cause) => {
                    self.transition(ChainState::Failed(index));
                    tracing::warn!(step = index, "Mask step failed: {}", cause);
                    return Err(ChekiError::chain(index, cause));
                }
            }
        }

        self.transition(ChainState::Completed);
        Ok(current)
    }

    fn run_step<F>(
        &self,
        input: &SourceImage,
        step: &MaskStep,
        index: usize,
        on_progress: &mut F,
    ) -> Result<SourceImage>
    where
        F: FnMut(usize, &ProgressSample),
    {
        let mask = mask::fit(&step.mask, input.width(), input.height());
        if mask::coverage(&mask) == 0 {
            tracing::warn!(step = index, "Mask is empty, the step will not change anything");
        }
        let request = inpaint_request(
            &self.defaults,
            &self.toggles,
            &step.prompt,
            &step.negative_prompt,
            input,
            &mask,
        )?;
        self.client
            .generate(request, &self.cancel, |sample| on_progress(index, sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::MockSynthesis;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::Arc;
    use std::time::Duration;

    fn client(mock: MockSynthesis) -> (Arc<MockSynthesis>, SynthesisClient) {
        let mock = Arc::new(mock);
        let client = SynthesisClient::new(mock.clone(), Duration::from_millis(5));
        (mock, client)
    }

    fn photo() -> SourceImage {
        SourceImage::from_dynamic(
            "photo",
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]))),
        )
    }

    fn step() -> MaskStep {
        MaskStep::new(GrayImage::from_pixel(16, 16, mask::MASK_ON), "edit")
    }

    #[test]
    fn test_empty_chain_completes_with_initial_image() {
        let (mock, client) = client(MockSynthesis::new());
        let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());
        let result = chain.run(&photo(), &[]).unwrap();
        assert_eq!(result.pixels(), photo().pixels());
        assert_eq!(chain.state(), ChainState::Completed);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_history_records_each_step() {
        let (_mock, client) = client(MockSynthesis::new());
        let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());
        chain.run(&photo(), &[step(), step()]).unwrap();
        assert_eq!(
            chain.history(),
            &[
                ChainState::Idle,
                ChainState::Running(0),
                ChainState::Running(1),
                ChainState::Completed
            ]
        );
    }

    #[test]
    fn test_failure_reports_step_index() {
        let (mock, client) = client(MockSynthesis::new().fail_call(0, 500, "nope"));
        let mut chain = MaskOrchestrator::new(&client, InpaintDefaults::default());
        let err = chain.run(&photo(), &[step(), step()]).unwrap_err();
        match err {
            ChekiError::Chain {
                failed_step_index, ..
            } => assert_eq!(failed_step_index, 0),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(chain.state(), ChainState::Failed(0));
        assert_eq!(mock.call_count(), 1);
    }
}
