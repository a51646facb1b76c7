use super::{mlp_forward, MlpConfig};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{linear, Linear, VarBuilder};

/// Returns vector of linear modules from [`MlpConfig`].
fn create_linear_layers(vs: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let mut dims = vec![config.in_dim];
    dims.extend(config.units.iter().copied());
    dims.push(config.out_dim);

    dims.windows(2)
        .enumerate()
        .map(|(i, w)| -> Result<Linear> {
            Ok(linear(w[0], w[1], vs.pp(format!("ln{}", i)))?)
        })
        .collect()
}

/// Multilayer perceptron with ReLU activation function.
pub struct Mlp {
    config: MlpConfig,
    layers: Vec<Linear>,
}

impl Mlp {
    /// Builds the MLP with variables under the `mlp` prefix of `vs`.
    pub fn build(vs: VarBuilder, config: MlpConfig) -> Result<Self> {
        let layers = create_linear_layers(vs.pp("mlp"), &config)?;
        Ok(Self { config, layers })
    }

    /// Maps `(N, in_dim)` to `(N, out_dim)`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        mlp_forward(xs.clone(), &self.layers, &self.config.activation_out)
    }

    /// Returns the output dimension.
    pub fn out_dim(&self) -> usize {
        self.config.out_dim
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Activation;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_mlp_shapes() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mlp = Mlp::build(vb, MlpConfig::new(5, vec![8, 8], 3, Activation::Tanh))?;
        let xs = Tensor::randn(0f32, 1f32, (4, 5), &Device::Cpu)?;
        let ys = mlp.forward(&xs)?;

        assert_eq!(ys.dims(), &[4, 3]);
        assert_eq!(varmap.all_vars().len(), 6);
        let max = ys.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
        assert!(max < 1.0);
        Ok(())
    }
}
