//! Convolutional view encoder.
use crate::model::ViewEncoder;
use anyhow::{bail, Result};
use candle_core::{DType, Tensor};
use candle_nn::{conv::Conv2dConfig, conv2d, linear, Conv2d, Linear, Module, VarBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`CnnEncoder`].
pub struct CnnEncoderConfig {
    /// Output channels of the convolution layers.
    pub channels: Vec<usize>,

    /// Kernel size of the convolution layers.
    pub kernel_size: usize,

    /// Stride of the first convolution layer. Other layers have stride 1.
    pub first_stride: usize,

    /// Dimension of the feature vector of each view.
    pub out_dim: usize,
}

impl Default for CnnEncoderConfig {
    fn default() -> Self {
        Self {
            channels: vec![32, 32, 32, 32],
            kernel_size: 3,
            first_stride: 2,
            out_dim: 50,
        }
    }
}

impl CnnEncoderConfig {
    /// Sets the output channels of the convolution layers.
    pub fn channels(mut self, v: Vec<usize>) -> Self {
        self.channels = v;
        self
    }

    /// Sets the kernel size.
    pub fn kernel_size(mut self, v: usize) -> Self {
        self.kernel_size = v;
        self
    }

    /// Sets the stride of the first layer.
    pub fn first_stride(mut self, v: usize) -> Self {
        self.first_stride = v;
        self
    }

    /// Sets the feature dimension.
    pub fn out_dim(mut self, v: usize) -> Self {
        self.out_dim = v;
        self
    }
}

/// Convolutional encoder shared across camera views.
///
/// Pixels are scaled to `[-0.5, 0.5]`, passed through ReLU convolutions, flattened
/// and projected to `out_dim` features per view.
pub struct CnnEncoder {
    convs: Vec<Conv2d>,
    proj: Linear,
    input_shape: [usize; 4],
    out_dim: usize,
}

impl ViewEncoder for CnnEncoder {
    type Config = CnnEncoderConfig;

    fn build(vb: VarBuilder, config: Self::Config, input_shape: [usize; 4]) -> Result<Self> {
        let [_, mut c, mut h, mut w] = input_shape;
        let k = config.kernel_size;
        let mut convs = Vec::with_capacity(config.channels.len());

        for (i, &out_c) in config.channels.iter().enumerate() {
            let stride = if i == 0 { config.first_stride } else { 1 };
            if h < k || w < k {
                bail!(
                    "Image of {}x{} is too small for {} convolution layers",
                    input_shape[2],
                    input_shape[3],
                    config.channels.len()
                );
            }
            let conv_config = Conv2dConfig {
                stride,
                ..Default::default()
            };
            convs.push(conv2d(c, out_c, k, conv_config, vb.pp(format!("c{}", i)))?);
            c = out_c;
            h = (h - k) / stride + 1;
            w = (w - k) / stride + 1;
        }

        let proj = linear(c * h * w, config.out_dim, vb.pp("proj"))?;

        Ok(Self {
            convs,
            proj,
            input_shape,
            out_dim: config.out_dim,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (n, v, c, h, w) = xs.dims5()?;
        let mut xs = ((xs.to_dtype(DType::F32)?.reshape((n * v, c, h, w))? / 255.0)? - 0.5)?;
        for conv in &self.convs {
            xs = conv.forward(&xs)?.relu()?;
        }
        let xs = self.proj.forward(&xs.flatten_from(1)?)?;
        Ok(xs.reshape((n, v, self.out_dim))?)
    }

    fn output_shape(&self) -> [usize; 2] {
        [self.input_shape[0], self.out_dim]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn test_cnn_encoder_output_shape() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = CnnEncoderConfig::default().channels(vec![4, 4]).out_dim(7);
        let enc = CnnEncoder::build(vb, config, [2, 6, 16, 16])?;
        let xs = Tensor::ones((3, 2, 6, 16, 16), DType::F32, &Device::Cpu)?;

        assert_eq!(enc.forward(&xs)?.dims(), &[3, 2, 7]);
        assert_eq!(enc.output_shape(), [2, 7]);
        Ok(())
    }

    #[test]
    fn test_cnn_encoder_rejects_small_image() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = CnnEncoderConfig::default().channels(vec![4; 8]);
        assert!(CnnEncoder::build(vb, config, [1, 3, 8, 8]).is_err());
    }
}
