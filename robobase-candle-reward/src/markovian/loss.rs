//! Preference loss.
use anyhow::{ensure, Result};
use candle_core::{DType, Tensor, D};
use candle_nn::ops::log_softmax;

/// Statistics of one label dimension.
#[derive(Debug, Clone)]
pub struct LabelStats {
    /// Loss of this label dimension.
    pub loss: f32,

    /// Fraction of rows with a hard label where the preferred segment has the larger
    /// return. Zero if there is no such row.
    pub accuracy: f32,
}

/// Output of [`preference_loss`].
pub struct PreferenceLoss {
    /// Loss summed over label dimensions.
    pub loss: Tensor,

    /// Per-label statistics.
    pub per_label: Vec<LabelStats>,
}

/// Converts labels of shape `(B)` or `(B, L)` into rows of integers.
fn label_rows(labels: &Tensor) -> Result<Vec<Vec<i64>>> {
    let labels = match labels.rank() {
        1 => labels.unsqueeze(1)?,
        _ => labels.flatten_from(1)?,
    };
    Ok(labels.to_dtype(DType::F32)?.round()?.to_dtype(DType::I64)?.to_vec2::<i64>()?)
}

/// Soft cross-entropy between the returns of two segments.
///
/// * `r_hat_0`, `r_hat_1` - Returns of segment 0 and 1, `(B, L)` with `L` label dimensions.
/// * `labels` - `(B)` or `(B, L)`; `0` prefers segment 0, `1` prefers segment 1, anything else
///   is no preference.
/// * `label_margin` - Label smoothing; the hard target becomes `1 - margin` vs. `margin`.
///
/// For each label dimension the two returns form 2-way logits. Hard rows get the
/// one-hot target scaled by `1 - 2 * margin` plus `margin`, rows without preference get
/// exactly `[0.5, 0.5]`. The loss is `-sum(target * log_softmax(logits)) / B`, summed over
/// label dimensions.
pub fn preference_loss(
    r_hat_0: &Tensor,
    r_hat_1: &Tensor,
    labels: &Tensor,
    label_margin: f64,
) -> Result<PreferenceLoss> {
    let (batch_size, num_labels) = r_hat_0.dims2()?;
    ensure!(
        r_hat_1.dims() == r_hat_0.dims(),
        "Returns of the two segments differ in shape: {:?} vs {:?}",
        r_hat_0.dims(),
        r_hat_1.dims()
    );
    let rows = label_rows(labels)?;
    ensure!(
        rows.len() == batch_size && rows.iter().all(|r| r.len() == num_labels),
        "Labels of shape {:?} do not match returns of shape {:?}",
        labels.dims(),
        r_hat_0.dims()
    );

    let device = r_hat_0.device();
    let target_scale = 1.0 - 2.0 * label_margin;
    let mut loss = Tensor::zeros((), DType::F32, device)?;
    let mut per_label = Vec::with_capacity(num_labels);

    for l in 0..num_labels {
        // (B, 2)
        let logits = Tensor::cat(
            &[r_hat_0.narrow(1, l, 1)?, r_hat_1.narrow(1, l, 1)?],
            1,
        )?;

        let mut target = Vec::with_capacity(batch_size * 2);
        for row in rows.iter() {
            let t = match row[l] {
                0 => [target_scale + label_margin, label_margin],
                1 => [label_margin, target_scale + label_margin],
                _ => [0.5, 0.5],
            };
            target.extend(t.iter().map(|&v| v as f32));
        }
        let target = Tensor::from_vec(target, (batch_size, 2), device)?;

        let loss_l = ((target * log_softmax(&logits, D::Minus1)?)?.sum_all()?
            / -(batch_size as f64))?;

        // Ties predict segment 0.
        let logits_host = logits.to_vec2::<f32>()?;
        let (n_hard, n_correct) = rows
            .iter()
            .zip(logits_host.iter())
            .filter(|(row, _)| row[l] == 0 || row[l] == 1)
            .fold((0usize, 0usize), |(n, c), (row, logit)| {
                let pred = if logit[1] > logit[0] { 1 } else { 0 };
                (n + 1, c + (pred == row[l]) as usize)
            });
        let accuracy = match n_hard {
            0 => 0.0,
            n => n_correct as f32 / n as f32,
        };

        per_label.push(LabelStats {
            loss: loss_l.to_scalar::<f32>()?,
            accuracy,
        });
        loss = (loss + loss_l)?;
    }

    Ok(PreferenceLoss { loss, per_label })
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;

    fn t(v: &[f32]) -> Tensor {
        Tensor::from_slice(v, (v.len(), 1), &Device::Cpu).unwrap()
    }

    fn ce(r0: f32, r1: f32, target: [f32; 2]) -> f32 {
        let m = r0.max(r1);
        let lse = m + ((r0 - m).exp() + (r1 - m).exp()).ln();
        -(target[0] * (r0 - lse) + target[1] * (r1 - lse))
    }

    #[test]
    fn test_hard_labels() -> Result<()> {
        let r0 = t(&[2.0, 0.5]);
        let r1 = t(&[1.0, 1.5]);
        let labels = Tensor::new(&[0i64, 1], &Device::Cpu)?;
        let out = preference_loss(&r0, &r1, &labels, 0.0)?;

        let expected = (ce(2.0, 1.0, [1.0, 0.0]) + ce(0.5, 1.5, [0.0, 1.0])) / 2.0;
        assert!((out.loss.to_scalar::<f32>()? - expected).abs() < 1e-5);
        assert_eq!(out.per_label.len(), 1);
        assert_eq!(out.per_label[0].accuracy, 1.0);
        Ok(())
    }

    #[test]
    fn test_no_preference_is_uniform() -> Result<()> {
        let r0 = t(&[3.0]);
        let r1 = t(&[-1.0]);
        let expected = ce(3.0, -1.0, [0.5, 0.5]);

        // The placeholder index does not matter.
        for label in [-1i64, 2, 7] {
            let labels = Tensor::new(&[label], &Device::Cpu)?;
            let out = preference_loss(&r0, &r1, &labels, 0.1)?;
            assert!((out.loss.to_scalar::<f32>()? - expected).abs() < 1e-5);
            assert_eq!(out.per_label[0].accuracy, 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_label_margin() -> Result<()> {
        let r0 = t(&[0.3]);
        let r1 = t(&[0.1]);
        let labels = Tensor::new(&[1f32], &Device::Cpu)?;
        let out = preference_loss(&r0, &r1, &labels, 0.1)?;

        let expected = ce(0.3, 0.1, [0.1, 0.9]);
        assert!((out.loss.to_scalar::<f32>()? - expected).abs() < 1e-5);
        assert_eq!(out.per_label[0].accuracy, 0.0);
        Ok(())
    }

    #[test]
    fn test_multi_label() -> Result<()> {
        let r0 = Tensor::new(&[[1.0f32, 0.0], [0.0, 1.0]], &Device::Cpu)?;
        let r1 = Tensor::new(&[[0.0f32, 1.0], [1.0, 0.0]], &Device::Cpu)?;
        let labels = Tensor::new(&[[0i64, 1], [1, -1]], &Device::Cpu)?;
        let out = preference_loss(&r0, &r1, &labels, 0.0)?;

        let l0 = (ce(1.0, 0.0, [1.0, 0.0]) + ce(0.0, 1.0, [0.0, 1.0])) / 2.0;
        let l1 = (ce(0.0, 1.0, [0.0, 1.0]) + ce(1.0, 0.0, [0.5, 0.5])) / 2.0;
        assert!((out.per_label[0].loss - l0).abs() < 1e-5);
        assert!((out.per_label[1].loss - l1).abs() < 1e-5);
        assert!((out.loss.to_scalar::<f32>()? - (l0 + l1)).abs() < 1e-5);
        assert_eq!(out.per_label[0].accuracy, 1.0);
        assert_eq!(out.per_label[1].accuracy, 1.0);
        Ok(())
    }
}
