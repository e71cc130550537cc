//! Convolutional embedding encoder for image-like few-shot inputs
//!
//! The encoder stacks identical blocks of
//! `3x3 conv (padding 1) → batch norm → ReLU → 2x2 max pool` and flattens the
//! final feature maps. With four 64-filter blocks a 28x28 grayscale image maps
//! to a 64-dimensional embedding and an 84x84 RGB image to 1600 dimensions.
//!
//! Only the forward pass is provided; parameters are randomly initialised and
//! batch norm runs in inference mode.

use std::ops::Range;

use ndarray::{s, Array1, Array2, Array4, Axis};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ensure_positive, FewShotError, Result};

const BATCH_NORM_EPS: f64 = 1e-5;

/// Configuration for the few-shot encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Number of input image channels
    pub in_channels: usize,
    /// Filters in every convolution
    pub filters: usize,
    /// Number of conv blocks
    pub num_blocks: usize,
    /// Convolution kernel size (odd, "same" padding)
    pub kernel_size: usize,
    /// Max pool window and stride
    pub pool_size: usize,
    /// Seed for parameter initialisation
    pub seed: Option<u64>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            filters: 64,
            num_blocks: 4,
            kernel_size: 3,
            pool_size: 2,
            seed: None,
        }
    }
}

impl EncoderConfig {
    /// Encoder for 28x28 single-channel images
    pub fn omniglot() -> Self {
        Self::default()
    }

    /// Encoder for 84x84 RGB images
    pub fn mini_imagenet() -> Self {
        Self {
            in_channels: 3,
            ..Default::default()
        }
    }

    /// Set the initialisation seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure_positive("in_channels", self.in_channels)?;
        ensure_positive("filters", self.filters)?;
        ensure_positive("num_blocks", self.num_blocks)?;
        ensure_positive("pool_size", self.pool_size)?;
        if self.kernel_size % 2 == 0 {
            return Err(FewShotError::InvalidParameter(format!(
                "kernel_size must be odd, got {}",
                self.kernel_size
            )));
        }
        Ok(())
    }

    /// Spatial size of the final feature maps
    pub fn output_spatial(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let (mut h, mut w) = (height, width);
        for block in 0..self.num_blocks {
            h /= self.pool_size;
            w /= self.pool_size;
            if h == 0 || w == 0 {
                return Err(FewShotError::InvalidParameter(format!(
                    "input of {}x{} collapses to zero after block {}",
                    height,
                    width,
                    block + 1
                )));
            }
        }
        Ok((h, w))
    }
}

/// One `conv → batch norm → ReLU → max pool` block
#[derive(Debug, Clone)]
pub struct ConvBlock {
    /// Convolution weights (out_channels, in_channels, kernel, kernel)
    pub weights: Array4<f64>,
    /// Convolution bias
    pub bias: Array1<f64>,
    /// Batch norm scale
    pub bn_gamma: Array1<f64>,
    /// Batch norm shift
    pub bn_beta: Array1<f64>,
    /// Running mean for batch norm
    pub bn_running_mean: Array1<f64>,
    /// Running variance for batch norm
    pub bn_running_var: Array1<f64>,
    pool_size: usize,
}

impl ConvBlock {
    /// Create a block with uniform(-1/sqrt(fan_in), 1/sqrt(fan_in)) weights
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        pool_size: usize,
        rng: &mut StdRng,
    ) -> Self {
        let fan_in = (in_channels * kernel_size * kernel_size) as f64;
        let bound = 1.0 / fan_in.sqrt();
        let dist = Uniform::new(-bound, bound);

        Self {
            weights: Array4::random_using(
                (out_channels, in_channels, kernel_size, kernel_size),
                dist,
                rng,
            ),
            bias: Array1::random_using(out_channels, dist, rng),
            bn_gamma: Array1::ones(out_channels),
            bn_beta: Array1::zeros(out_channels),
            bn_running_mean: Array1::zeros(out_channels),
            bn_running_var: Array1::ones(out_channels),
            pool_size,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.weights.dim().1
    }

    pub fn out_channels(&self) -> usize {
        self.weights.dim().0
    }

    /// Forward pass: (batch, in_channels, h, w) -> (batch, out_channels, h / pool, w / pool)
    pub fn forward(&self, input: &Array4<f64>) -> Array4<f64> {
        let mut x = self.convolve(input);
        self.batch_norm_relu(&mut x);
        self.max_pool(&x)
    }

    /// "Same" convolution built from shifted plane accumulations
    fn convolve(&self, input: &Array4<f64>) -> Array4<f64> {
        let (batch, in_channels, height, width) = input.dim();
        let (out_channels, _, kernel, _) = self.weights.dim();
        let padding = kernel / 2;

        let mut output = Array4::zeros((batch, out_channels, height, width));

        for b in 0..batch {
            for oc in 0..out_channels {
                let mut plane = output.slice_mut(s![b, oc, .., ..]);
                plane.fill(self.bias[oc]);

                for ic in 0..in_channels {
                    let channel = input.slice(s![b, ic, .., ..]);
                    for ki in 0..kernel {
                        let (dst_rows, src_rows) = shifted_range(height, ki, padding);
                        for kj in 0..kernel {
                            let (dst_cols, src_cols) = shifted_range(width, kj, padding);
                            let weight = self.weights[[oc, ic, ki, kj]];
                            plane
                                .slice_mut(s![dst_rows.clone(), dst_cols.clone()])
                                .scaled_add(weight, &channel.slice(s![src_rows.clone(), src_cols]));
                        }
                    }
                }
            }
        }

        output
    }

    fn batch_norm_relu(&self, x: &mut Array4<f64>) {
        for (c, mut channel) in x.axis_iter_mut(Axis(1)).enumerate() {
            let mean = self.bn_running_mean[c];
            let scale = self.bn_gamma[c] / (self.bn_running_var[c] + BATCH_NORM_EPS).sqrt();
            let beta = self.bn_beta[c];

            channel.mapv_inplace(|v| (scale * (v - mean) + beta).max(0.0));
        }
    }

    fn max_pool(&self, x: &Array4<f64>) -> Array4<f64> {
        let (batch, channels, height, width) = x.dim();
        let p = self.pool_size;
        let (out_h, out_w) = (height / p, width / p);

        let mut output = Array4::zeros((batch, channels, out_h, out_w));
        for ((b, c, i, j), out) in output.indexed_iter_mut() {
            let window = x.slice(s![b, c, i * p..(i + 1) * p, j * p..(j + 1) * p]);
            *out = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        }

        output
    }
}

/// Destination and source ranges for kernel tap `tap` with zero padding.
fn shifted_range(len: usize, tap: usize, padding: usize) -> (Range<usize>, Range<usize>) {
    if tap >= padding {
        let shift = (tap - padding).min(len);
        (0..len - shift, shift..len)
    } else {
        let shift = (padding - tap).min(len);
        (shift..len, 0..len - shift)
    }
}

/// Convolutional encoder mapping images to flat embeddings
#[derive(Debug, Clone)]
pub struct FewShotEncoder {
    config: EncoderConfig,
    blocks: Vec<ConvBlock>,
}

impl FewShotEncoder {
    /// Create a new encoder with random initialisation
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let blocks = (0..config.num_blocks)
            .map(|i| {
                let in_channels = if i == 0 { config.in_channels } else { config.filters };
                ConvBlock::new(
                    in_channels,
                    config.filters,
                    config.kernel_size,
                    config.pool_size,
                    &mut rng,
                )
            })
            .collect();

        Ok(Self { config, blocks })
    }

    /// Embed a batch of images shaped (batch, channels, height, width)
    pub fn forward(&self, input: &Array4<f64>) -> Result<Array2<f64>> {
        let (batch, channels, height, width) = input.dim();
        if channels != self.config.in_channels {
            return Err(FewShotError::shape(
                "encoder input channels",
                self.config.in_channels,
                channels,
            ));
        }
        let embed_dim = self.output_dim(height, width)?;

        let mut x = input.to_owned();
        for block in &self.blocks {
            x = block.forward(&x);
        }

        debug!(batch, height, width, embed_dim, "encoded image batch");
        x.into_shape((batch, embed_dim))
            .map_err(|e| FewShotError::InvalidValue(format!("cannot flatten feature maps: {}", e)))
    }

    /// Embedding dimension produced for images of the given size
    pub fn output_dim(&self, height: usize, width: usize) -> Result<usize> {
        let (h, w) = self.config.output_spatial(height, width)?;
        Ok(self.config.filters * h * w)
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn blocks(&self) -> &[ConvBlock] {
        &self.blocks
    }

    /// Total number of parameters (conv weights, bias and batch norm affine)
    pub fn parameter_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.weights.len() + b.bias.len() + b.bn_gamma.len() + b.bn_beta.len())
            .sum()
    }
}

/// Standard four-block, 64-filter encoder for the given number of input channels.
pub fn get_few_shot_encoder(num_input_channels: usize) -> Result<FewShotEncoder> {
    FewShotEncoder::new(EncoderConfig {
        in_channels: num_input_channels,
        ..Default::default()
    })
}
