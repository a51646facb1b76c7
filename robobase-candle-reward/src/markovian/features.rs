//! Extraction of per-timestep features from observation dictionaries.
use crate::{RewardError, TensorDict};
use anyhow::Result;
use candle_core::{DType, Tensor};
use robobase_core::{BoxSpace, DictSpace};

const LOW_DIM_KEY: &str = "low_dim_state";
const TIME_KEY: &str = "time";

/// Returns `true` for keys of camera views. Next-step copies (`tp1`) are not views.
fn is_rgb_key(key: &str) -> bool {
    key.starts_with("rgb") && !key.contains("tp1")
}

/// Modalities of an observation space, as seen by the reward model.
#[derive(Debug, Clone)]
pub struct ObsLayout {
    rgb_keys: Vec<String>,
    rgb_shape: Option<Vec<usize>>,
    low_dim_shape: Option<Vec<usize>>,
    time_shape: Option<Vec<usize>>,
    action_shape: Vec<usize>,
}

impl ObsLayout {
    /// Builds the layout from the observation and action spaces.
    ///
    /// Camera views are the `rgb*` keys in sorted order. Each view has shape `(C, H, W)`
    /// or `(stack, C, H, W)` and all views must have the same shape.
    pub fn new(obs_space: &DictSpace, act_space: &BoxSpace) -> Result<Self> {
        let rgb: Vec<(String, Vec<usize>)> = obs_space
            .iter()
            .filter(|(k, _)| is_rgb_key(k))
            .map(|(k, s)| (k.clone(), s.shape.clone()))
            .collect();

        let rgb_shape = match rgb.first() {
            None => None,
            Some((_, shape)) => {
                if rgb.iter().any(|(_, s)| s != shape) {
                    return Err(RewardError::ViewShapeMismatch(rgb).into());
                }
                if shape.len() != 3 && shape.len() != 4 {
                    anyhow::bail!(
                        "rgb observations must have shape (C, H, W) or (stack, C, H, W), got {:?}",
                        shape
                    );
                }
                Some(shape.clone())
            }
        };

        Ok(Self {
            rgb_keys: rgb.into_iter().map(|(k, _)| k).collect(),
            rgb_shape,
            low_dim_shape: obs_space.get(LOW_DIM_KEY).map(|s| s.shape.clone()),
            time_shape: obs_space.get(TIME_KEY).map(|s| s.shape.clone()),
            action_shape: act_space.shape.clone(),
        })
    }

    /// Keys of camera views.
    pub fn rgb_keys(&self) -> &[String] {
        &self.rgb_keys
    }

    /// Number of camera views.
    pub fn num_views(&self) -> usize {
        self.rgb_keys.len()
    }

    /// Observation keys read by the reward model.
    pub fn obs_keys(&self) -> Vec<String> {
        let mut keys = self.rgb_keys.clone();
        if self.low_dim_shape.is_some() {
            keys.push(LOW_DIM_KEY.to_string());
        }
        if self.time_shape.is_some() {
            keys.push(TIME_KEY.to_string());
        }
        keys
    }

    /// Input shape of the view encoder, `[views, stack * C, H, W]`.
    pub fn encoder_input_shape(&self) -> Option<[usize; 4]> {
        let v = self.num_views();
        self.rgb_shape.as_ref().map(|s| match s.as_slice() {
            [c, h, w] => [v, *c, *h, *w],
            [n, c, h, w] => [v, n * c, *h, *w],
            _ => unreachable!(),
        })
    }

    /// Dimension of the low-dimensional state feature.
    pub fn low_dim_size(&self) -> Option<usize> {
        self.low_dim_shape.as_ref().map(|s| frame_size(s))
    }

    /// Dimension of the time feature.
    pub fn time_size(&self) -> Option<usize> {
        self.time_shape.as_ref().map(|s| frame_size(s))
    }

    /// Dimension of the flattened action.
    pub fn action_size(&self) -> usize {
        self.action_shape.iter().product()
    }

    /// Extracts per-timestep features.
    ///
    /// Observations are read from `dict` under `prefix` followed by the observation key.
    /// Leading dimensions, either `(T)` or `(B, S)`, are the dimensions before the space
    /// shape and must agree across modalities. Stacked low-dimensional and time features
    /// contribute their latest frame, stacked images are merged into the channel axis.
    pub fn extract(&self, dict: &TensorDict, prefix: &str, action: &Tensor) -> Result<Features> {
        let mut lead: Option<Vec<usize>> = None;
        let mut check_lead = |key: &str, t: &Tensor, space_shape: &[usize]| -> Result<()> {
            let l = leading_dims(key, t.dims(), space_shape)?;
            if let Some(expected) = lead.as_ref() {
                if *expected != l {
                    return Err(RewardError::LeadingDims {
                        key: key.to_string(),
                        expected: expected.clone(),
                        actual: l,
                    }
                    .into());
                }
                return Ok(());
            }
            lead = Some(l);
            Ok(())
        };

        let low_dim = match &self.low_dim_shape {
            Some(shape) => {
                let t = get(dict, prefix, LOW_DIM_KEY)?;
                check_lead(LOW_DIM_KEY, t, shape.as_slice())?;
                Some((t, shape))
            }
            None => None,
        };
        let time = match &self.time_shape {
            Some(shape) => {
                let t = get(dict, prefix, TIME_KEY)?;
                check_lead(TIME_KEY, t, shape.as_slice())?;
                Some((t, shape))
            }
            None => None,
        };
        let rgb = match &self.rgb_shape {
            Some(shape) => {
                let mut views = Vec::with_capacity(self.num_views());
                for key in &self.rgb_keys {
                    let t = get(dict, prefix, key)?;
                    check_lead(key, t, shape.as_slice())?;
                    views.push(t);
                }
                Some((views, shape))
            }
            None => None,
        };

        let lead = match lead {
            Some(lead) => lead,
            None => action_leading_dims(action, &self.action_shape)?,
        };
        let n: usize = lead.iter().product();

        let action = {
            if action.rank() < lead.len() || action.dims()[..lead.len()] != lead[..] {
                return Err(RewardError::LeadingDims {
                    key: "action".to_string(),
                    expected: lead,
                    actual: action.dims().to_vec(),
                }
                .into());
            }
            action.to_dtype(DType::F32)?.reshape((n, ()))?
        };
        if action.dim(1)? != self.action_size() {
            return Err(RewardError::InputShape {
                key: "action".to_string(),
                expected: self.action_shape.clone(),
                actual: action.dims().to_vec(),
            }
            .into());
        }

        let latest_frame = |t: &Tensor, shape: &[usize]| -> Result<Tensor> {
            let t = t.to_dtype(DType::F32)?;
            let t = match shape.len() {
                1 => t,
                _ => t.narrow(lead.len(), shape[0] - 1, 1)?,
            };
            Ok(t.reshape((n, frame_size(shape)))?)
        };

        let low_dim = match low_dim {
            Some((t, shape)) => Some(latest_frame(t, shape.as_slice())?),
            None => None,
        };
        let time = match time {
            Some((t, shape)) => Some(latest_frame(t, shape.as_slice())?),
            None => None,
        };
        let rgb = match (rgb, self.encoder_input_shape()) {
            (Some((views, _)), Some([_, c, h, w])) => {
                let views = views
                    .into_iter()
                    .map(|t| -> Result<Tensor> {
                        Ok(t.to_dtype(DType::F32)?.reshape((n, c, h, w))?)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(Tensor::stack(&views, 1)?)
            }
            _ => None,
        };

        Ok(Features {
            lead,
            low_dim,
            rgb,
            time,
            action,
        })
    }
}

/// Per-timestep features with `N` rows, the product of the leading dimensions.
#[derive(Debug, Clone)]
pub struct Features {
    /// Leading dimensions, `(T)` or `(B, S)`.
    pub lead: Vec<usize>,

    /// Low-dimensional state, `(N, D)`.
    pub low_dim: Option<Tensor>,

    /// Images, `(N, views, C, H, W)`.
    pub rgb: Option<Tensor>,

    /// Time feature, `(N, K)`.
    pub time: Option<Tensor>,

    /// Flattened action, `(N, A)`.
    pub action: Tensor,
}

impl Features {
    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.lead.iter().product()
    }
}

/// Size of one frame of a possibly frame-stacked vector feature.
fn frame_size(shape: &[usize]) -> usize {
    match shape.len() {
        0 => 1,
        1 => shape[0],
        _ => shape[1..].iter().product(),
    }
}

fn get<'a>(dict: &'a TensorDict, prefix: &str, key: &str) -> Result<&'a Tensor> {
    let key = format!("{}{}", prefix, key);
    match dict.get(&key) {
        Some(t) => Ok(t),
        None => Err(RewardError::MissingKey(key).into()),
    }
}

fn leading_dims(key: &str, dims: &[usize], space_shape: &[usize]) -> Result<Vec<usize>> {
    let r = space_shape.len();
    if dims.len() < r + 1 || dims.len() > r + 2 || dims[dims.len() - r..] != *space_shape {
        return Err(RewardError::InputShape {
            key: key.to_string(),
            expected: space_shape.to_vec(),
            actual: dims.to_vec(),
        }
        .into());
    }
    Ok(dims[..dims.len() - r].to_vec())
}

/// Leading dimensions of an action when no observation is read.
///
/// An action-sequence axis of length 1 in front of a vector action is ignored.
fn action_leading_dims(action: &Tensor, action_shape: &[usize]) -> Result<Vec<usize>> {
    let dims = action.dims();
    let dims = if action_shape.len() == 1 && dims.len() > 2 && dims[dims.len() - 2] == 1 {
        [&dims[..dims.len() - 2], &dims[dims.len() - 1..]].concat()
    } else {
        dims.to_vec()
    };
    leading_dims("action", &dims, action_shape)
}
