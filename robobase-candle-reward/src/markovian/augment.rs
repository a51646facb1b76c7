//! Segment cropping and image augmentation.
use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use rand::Rng;

/// Samples `k` random contiguous windows for each of `batch_size` segments.
///
/// Returns a 0/1 mask of shape `(k * batch_size, seq_len, 1)`, ordered with the window
/// index major and the batch index minor. Window lengths are uniform in
/// `[floor(0.7 * seq_len), floor(0.9 * seq_len)]` and starts are uniform over the
/// positions where the window fits.
pub fn cropping_mask<R: Rng + ?Sized>(
    rng: &mut R,
    batch_size: usize,
    seq_len: usize,
    k: usize,
    device: &Device,
) -> Result<Tensor> {
    ensure!(seq_len > 0, "Cannot crop empty segments");
    let min_len = (0.7 * seq_len as f64) as usize;
    let max_len = (0.9 * seq_len as f64) as usize;
    let mut mask = vec![0f32; k * batch_size * seq_len];

    for row in mask.chunks_mut(seq_len) {
        let length = rng.gen_range(min_len..=max_len);
        let start = rng.gen_range(0..=seq_len - length);
        row[start..start + length].fill(1.0);
    }

    Ok(Tensor::from_vec(mask, (k * batch_size, seq_len, 1), device)?)
}

/// Reduces per-timestep rewards `(B, S, L)` to segment returns.
///
/// Without a mask this is the sum over time, `(B, L)`. With a mask from [`cropping_mask`]
/// the rewards are replicated `k` times and summed within each window, `(k * B, L)`.
pub fn crop_and_sum(r_hat: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
    match mask {
        None => Ok(r_hat.sum(1)?),
        Some(mask) => {
            let k = mask.dim(0)? / r_hat.dim(0)?;
            Ok(r_hat.repeat((k, 1, 1))?.broadcast_mul(mask)?.sum(1)?)
        }
    }
}

/// Random shifts of images, consistent over time.
///
/// Each image sequence is padded by replicating its border and cropped back to the
/// original size at a random integer offset. The offset is shared by all frames of a
/// sequence.
#[derive(Debug, Clone)]
pub struct RandomShiftsAug {
    pad: usize,
}

impl RandomShiftsAug {
    /// Constructs the augmentation with padding `pad`.
    pub fn new(pad: usize) -> Self {
        Self { pad }
    }

    /// Applies the augmentation to `(N, S, C, H, W)` images.
    pub fn forward<R: Rng + ?Sized>(&self, xs: &Tensor, rng: &mut R) -> Result<Tensor> {
        if self.pad == 0 {
            return Ok(xs.clone());
        }
        let (n, _, _, h, w) = xs.dims5()?;
        let padded = xs
            .pad_with_same(3, self.pad, self.pad)?
            .pad_with_same(4, self.pad, self.pad)?;

        let shifted = (0..n)
            .map(|i| -> Result<Tensor> {
                let dy = rng.gen_range(0..=2 * self.pad);
                let dx = rng.gen_range(0..=2 * self.pad);
                Ok(padded.narrow(0, i, 1)?.narrow(3, dy, h)?.narrow(4, dx, w)?)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Tensor::cat(&shifted, 0)?)
    }
}
