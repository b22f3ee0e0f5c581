//! Characteristic-function pipeline
//!
//! Turns one station's raw waveform into the series that gets migrated:
//!
//! 1. optional demean and taper of the raw segment
//! 2. the characteristic function itself (kurtosis, envelope, STA/LTA or none)
//! 3. optional taper of the result
//! 4. optional positive derivative (re-tapered when post-tapering is on)
//! 5. optional Gaussian re-weighting of triggers
//!
//! The sliding kurtosis is the only step that shortens the series; its output
//! start time is moved forward so every sample keeps its absolute time.

use crate::error::{CfError, Result};
use crate::filters::{envelope, positive_derivative, remove_mean, smooth, sta_lta, taper};
use crate::gaussian::gaussian_reweight;
use crate::kurtosis::{
    recursive_constant, recursive_kurtosis, sliding_kurtosis, sliding_output_len, window_samples,
};
use crate::waveform::{ProcessingTag, WaveformSample};
use tracing::debug;
use wloc_common::config::{CharacteristicConfig, GaussianConfig};
use wloc_common::CfKind;

/// One characteristic-function transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacteristicFunction {
    /// Pass the (pre-processed) samples through
    Raw,
    /// Smoothed sliding-window kurtosis
    SlidingKurtosis { window_s: f64 },
    /// Smoothed recursive kurtosis
    RecursiveKurtosis { window_s: f64 },
    Envelope,
    StaLta { sta_s: f64, lta_s: f64 },
}

impl CharacteristicFunction {
    /// Select the transform described by a configuration section
    ///
    /// # Errors
    /// `InvalidParameter` for non-positive window lengths or an LTA not longer
    /// than the STA.
    pub fn from_config(config: &CharacteristicConfig) -> Result<Self> {
        let function = match config.kind {
            CfKind::None => Self::Raw,
            CfKind::Kurtosis if config.recursive => Self::RecursiveKurtosis {
                window_s: config.window_s,
            },
            CfKind::Kurtosis => Self::SlidingKurtosis {
                window_s: config.window_s,
            },
            CfKind::Envelope => Self::Envelope,
            CfKind::StaLta => Self::StaLta {
                sta_s: config.sta_s,
                lta_s: config.lta_s,
            },
        };
        function.validate()?;
        Ok(function)
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Self::SlidingKurtosis { window_s } | Self::RecursiveKurtosis { window_s }
                if !(window_s > 0.0) =>
            {
                Err(CfError::InvalidParameter(format!(
                    "kurtosis window must be > 0 s, got {}",
                    window_s
                )))
            }
            Self::StaLta { sta_s, lta_s } if !(sta_s > 0.0 && lta_s > sta_s) => {
                Err(CfError::InvalidParameter(format!(
                    "STA/LTA windows must satisfy 0 < sta < lta, got sta={} lta={}",
                    sta_s, lta_s
                )))
            }
            _ => Ok(()),
        }
    }

    /// Tag carried by the output series
    pub fn tag(&self) -> ProcessingTag {
        match self {
            Self::Raw => ProcessingTag::None,
            Self::SlidingKurtosis { .. } | Self::RecursiveKurtosis { .. } => ProcessingTag::Kurtosis,
            Self::Envelope => ProcessingTag::Envelope,
            Self::StaLta { .. } => ProcessingTag::StaLta,
        }
    }

    /// Apply the transform to one waveform
    pub fn apply(&self, waveform: &WaveformSample) -> WaveformSample {
        let x = waveform.samples();
        let dt = waveform.delta();
        let tag = self.tag();

        match *self {
            Self::Raw => waveform.clone(),
            Self::SlidingKurtosis { window_s } => {
                let window = window_samples(window_s, dt);
                let out = sliding_kurtosis(x, window);
                let dropped = x.len() - sliding_output_len(x.len(), window);
                waveform.replaced(out, dropped, tag)
            }
            Self::RecursiveKurtosis { window_s } => waveform.map(tag, |x| {
                smooth(&recursive_kurtosis(x, recursive_constant(dt, window_s)))
            }),
            Self::Envelope => waveform.map(tag, envelope),
            Self::StaLta { sta_s, lta_s } => waveform.map(tag, |x| {
                sta_lta(x, window_samples(sta_s, dt), window_samples(lta_s, dt))
            }),
        }
    }
}

/// Full per-station processing chain
#[derive(Debug, Clone, PartialEq)]
pub struct CfPipeline {
    function: CharacteristicFunction,
    pre_rmean: bool,
    pre_taper: bool,
    post_taper: bool,
    positive_derivative: bool,
    gaussian: Option<GaussianConfig>,
}

impl CfPipeline {
    /// Pipeline running only `function`, with every optional step off
    pub fn new(function: CharacteristicFunction) -> Self {
        Self {
            function,
            pre_rmean: false,
            pre_taper: false,
            post_taper: false,
            positive_derivative: false,
            gaussian: None,
        }
    }

    /// Build the pipeline described by a configuration section
    ///
    /// # Errors
    /// Propagates parameter validation failures.
    pub fn from_config(config: &CharacteristicConfig) -> Result<Self> {
        let pipeline = Self::new(CharacteristicFunction::from_config(config)?)
            .with_pre_processing(config.pre_rmean, config.pre_taper)
            .with_post_taper(config.post_taper)
            .with_positive_derivative(config.positive_derivative);
        match config.gaussian {
            Some(g) => pipeline.with_gaussian(g),
            None => Ok(pipeline),
        }
    }

    /// Demean and/or taper the raw segment before the transform
    pub fn with_pre_processing(mut self, rmean: bool, taper: bool) -> Self {
        self.pre_rmean = rmean;
        self.pre_taper = taper;
        self
    }

    pub fn with_post_taper(mut self, enabled: bool) -> Self {
        self.post_taper = enabled;
        self
    }

    pub fn with_positive_derivative(mut self, enabled: bool) -> Self {
        self.positive_derivative = enabled;
        self
    }

    /// Enable Gaussian re-weighting as the last step
    ///
    /// # Errors
    /// `InvalidParameter` if sigma is not positive or the threshold is not finite.
    pub fn with_gaussian(mut self, gaussian: GaussianConfig) -> Result<Self> {
        if !(gaussian.sigma > 0.0) || !gaussian.threshold.is_finite() {
            return Err(CfError::InvalidParameter(format!(
                "gaussian re-weighting needs sigma > 0 and a finite threshold, got sigma={} threshold={}",
                gaussian.sigma, gaussian.threshold
            )));
        }
        self.gaussian = Some(gaussian);
        Ok(self)
    }

    pub fn function(&self) -> CharacteristicFunction {
        self.function
    }

    /// Run the chain on one station's waveform
    pub fn process(&self, waveform: &WaveformSample) -> WaveformSample {
        let dt = waveform.delta();
        let mut current = waveform.clone();

        if self.pre_rmean {
            current = current.map(current.tag(), remove_mean);
        }
        if self.pre_taper {
            current = current.map(current.tag(), taper);
        }

        current = self.function.apply(&current);

        if self.post_taper {
            current = current.map(current.tag(), taper);
        }
        if self.positive_derivative {
            current = current.map(current.tag(), |x| positive_derivative(x, dt));
            if self.post_taper {
                current = current.map(current.tag(), taper);
            }
        }
        if let Some(g) = self.gaussian {
            current = current.map(ProcessingTag::Gaussian, |x| {
                gaussian_reweight(x, dt, g.threshold, g.mu, g.sigma)
            });
        }

        debug!(
            input_samples = waveform.len(),
            output_samples = current.len(),
            tag = current.tag().label(),
            "Characteristic function computed"
        );
        current
    }
}
