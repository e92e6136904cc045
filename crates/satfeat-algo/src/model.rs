//! Random convolutional features (RCF).
//!
//! A fixed bank of `F/2` random filters is convolved over each patch. Each
//! filter response contributes two features: the spatial mean of its
//! positive part and the spatial mean of its negative part. Weights are never
//! trained; they are drawn once from a seeded generator so every period of a
//! run, and every rerun with the same seed, uses the same bank.
//!
//! Feature layout is `[pos_0, .., pos_{F/2-1}, neg_0, .., neg_{F/2-1}]`.

use rand::Rng;
use satfeat_core::{FeatureVector, Patch, PatchOutcome, SatfeatError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("feature count must be a positive even number, got {0}")]
    InvalidFeatureCount(usize),

    #[error("kernel size must be at least 1")]
    InvalidKernel,

    #[error("input channel count must be at least 1")]
    InvalidChannels,

    #[error("patch has {got} channels, model expects {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("patch {height}x{width} is smaller than the {kernel}x{kernel} kernel")]
    PatchTooSmall {
        height: usize,
        width: usize,
        kernel: usize,
    },
}

impl ModelError {
    /// Whether a retry of the same batch could succeed. Every CPU failure
    /// is a property of the input or config, so none are.
    pub fn is_transient(&self) -> bool {
        false
    }
}

impl From<ModelError> for SatfeatError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidFeatureCount(_)
            | ModelError::InvalidKernel
            | ModelError::InvalidChannels => SatfeatError::Config(err.to_string()),
            _ => SatfeatError::Compute(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub in_channels: usize,
    pub num_features: usize,
    pub kernel_size: usize,
    pub bias: f64,
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.num_features == 0 || self.num_features % 2 != 0 {
            return Err(ModelError::InvalidFeatureCount(self.num_features));
        }
        if self.kernel_size == 0 {
            return Err(ModelError::InvalidKernel);
        }
        if self.in_channels == 0 {
            return Err(ModelError::InvalidChannels);
        }
        Ok(())
    }

    pub fn num_filters(&self) -> usize {
        self.num_features / 2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomConvModel {
    config: ModelConfig,
    /// `[filter][channel][row][col]`, flattened.
    weights: Vec<f64>,
}

impl RandomConvModel {
    /// Draw the filter bank from `rng`. Two models built from generators with
    /// the same seed have bit-identical weights.
    pub fn new(config: ModelConfig, rng: &mut impl Rng) -> Result<Self, ModelError> {
        config.validate()?;
        let len = config.num_filters() * config.in_channels * config.kernel_size * config.kernel_size;
        let weights = (0..len).map(|_| standard_normal(rng)).collect();
        Ok(Self { config, weights })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn num_features(&self) -> usize {
        self.config.num_features
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Features for one extraction outcome; every non-valid outcome maps to
    /// the all-zero vector without computing.
    pub fn featurize(&self, outcome: &PatchOutcome) -> Result<FeatureVector, ModelError> {
        match outcome.patch() {
            Some(patch) => self.forward(patch),
            None => Ok(vec![0.0; self.config.num_features]),
        }
    }

    /// Features for a batch, in input order. One bad patch fails the batch.
    pub fn featurize_batch(
        &self,
        outcomes: &[PatchOutcome],
    ) -> Result<Vec<FeatureVector>, ModelError> {
        outcomes.iter().map(|o| self.featurize(o)).collect()
    }

    /// Valid convolution (stride 1), then two-sided ReLU and global mean.
    pub fn forward(&self, patch: &Patch) -> Result<FeatureVector, ModelError> {
        let k = self.config.kernel_size;
        let channels = self.config.in_channels;
        if patch.bands != channels {
            return Err(ModelError::ChannelMismatch {
                expected: channels,
                got: patch.bands,
            });
        }
        if patch.height < k || patch.width < k {
            return Err(ModelError::PatchTooSmall {
                height: patch.height,
                width: patch.width,
                kernel: k,
            });
        }

        let out_h = patch.height - k + 1;
        let out_w = patch.width - k + 1;
        let cells = (out_h * out_w) as f64;
        let filter_len = channels * k * k;
        let filters = self.config.num_filters();
        let mut features = vec![0.0; self.config.num_features];

        for f in 0..filters {
            let w = &self.weights[f * filter_len..(f + 1) * filter_len];
            let (mut pos, mut neg) = (0.0, 0.0);
            for r in 0..out_h {
                for c in 0..out_w {
                    let mut y = self.config.bias;
                    for ch in 0..channels {
                        for kr in 0..k {
                            for kc in 0..k {
                                y += w[(ch * k + kr) * k + kc] * patch.get(ch, r + kr, c + kc) as f64;
                            }
                        }
                    }
                    if y > 0.0 {
                        pos += y;
                    } else {
                        neg -= y;
                    }
                }
            }
            features[f] = pos / cells;
            features[filters + f] = neg / cells;
        }
        Ok(features)
    }
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-10);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn cpu_model_errors_are_not_transient() {
        assert!(!ModelError::PatchTooSmall {
            height: 2,
            width: 2,
            kernel: 3
        }
        .is_transient());
        assert!(!ModelError::InvalidFeatureCount(3).is_transient());
    }

    fn config(features: usize) -> ModelConfig {
        ModelConfig {
            in_channels: 2,
            num_features: features,
            kernel_size: 3,
            bias: -1.0,
        }
    }

    fn checker(bands: usize, side: usize) -> Patch {
        let data = (0..bands * side * side)
            .map(|i| if (i / side + i % side) % 2 == 0 { 1.0 } else { 0.0 })
            .collect();
        Patch::new(bands, side, side, data).unwrap()
    }

    #[test]
    fn odd_or_zero_feature_count_is_rejected() {
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(
            RandomConvModel::new(config(7), &mut rng).unwrap_err(),
            ModelError::InvalidFeatureCount(7)
        );
        assert!(RandomConvModel::new(config(0), &mut rng).is_err());
        let err: SatfeatError = ModelError::InvalidFeatureCount(7).into();
        assert!(err.is_config());
    }

    #[test]
    fn same_seed_gives_identical_weights_and_features() {
        let a = RandomConvModel::new(config(16), &mut StdRng::seed_from_u64(42)).unwrap();
        let b = RandomConvModel::new(config(16), &mut StdRng::seed_from_u64(42)).unwrap();
        let a_bits: Vec<u64> = a.weights().iter().map(|w| w.to_bits()).collect();
        let b_bits: Vec<u64> = b.weights().iter().map(|w| w.to_bits()).collect();
        assert_eq!(a_bits, b_bits);

        let patch = PatchOutcome::Valid(checker(2, 12));
        assert_eq!(a.featurize(&patch).unwrap(), b.featurize(&patch).unwrap());

        let c = RandomConvModel::new(config(16), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_ne!(a.weights(), c.weights());
    }

    #[test]
    fn output_has_configured_length_and_is_non_negative() {
        let model = RandomConvModel::new(config(20), &mut StdRng::seed_from_u64(1)).unwrap();
        let features = model.featurize(&PatchOutcome::Valid(checker(2, 10))).unwrap();
        assert_eq!(features.len(), 20);
        assert!(features.iter().all(|v| *v >= 0.0));
        assert!(features.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn invalid_outcomes_map_to_zero_vectors() {
        let model = RandomConvModel::new(config(8), &mut StdRng::seed_from_u64(1)).unwrap();
        for outcome in [
            PatchOutcome::Unmatched,
            PatchOutcome::Constant,
            PatchOutcome::Undersized { height: 3, width: 40 },
            PatchOutcome::Failed("boom".into()),
        ] {
            assert_eq!(model.featurize(&outcome).unwrap(), vec![0.0; 8]);
        }
    }

    #[test]
    fn single_pixel_kernel_matches_hand_computation() {
        let cfg = ModelConfig {
            in_channels: 1,
            num_features: 2,
            kernel_size: 1,
            bias: 0.0,
        };
        let model = RandomConvModel::new(cfg, &mut StdRng::seed_from_u64(3)).unwrap();
        let w = model.weights()[0];
        let patch = Patch::new(1, 1, 2, vec![1.0, 0.5]).unwrap();
        let features = model.forward(&patch).unwrap();
        let expected = (w * 1.0 + w * 0.5) / 2.0;
        if w > 0.0 {
            assert!((features[0] - expected).abs() < 1e-12);
            assert_eq!(features[1], 0.0);
        } else {
            assert_eq!(features[0], 0.0);
            assert!((features[1] + expected).abs() < 1e-12);
        }
    }

    #[test]
    fn shape_errors_fail_the_batch() {
        let model = RandomConvModel::new(config(4), &mut StdRng::seed_from_u64(1)).unwrap();
        let batch = vec![
            PatchOutcome::Valid(checker(2, 8)),
            PatchOutcome::Valid(checker(1, 8)),
        ];
        assert_eq!(
            model.featurize_batch(&batch).unwrap_err(),
            ModelError::ChannelMismatch { expected: 2, got: 1 }
        );
        let tiny = PatchOutcome::Valid(checker(2, 2));
        assert!(matches!(
            model.featurize(&tiny),
            Err(ModelError::PatchTooSmall { kernel: 3, .. })
        ));
    }
}
