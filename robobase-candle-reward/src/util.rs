//! Utilities.
use anyhow::Result;
use candle_core::{Device, Tensor, WithDType};
use candle_nn::VarMap;
use ndarray::ArrayD;
use num_traits::AsPrimitive;
use robobase_core::record::{Record, RecordValue};

/// Returns the standard deviation of a tensor.
pub fn std(t: &Tensor) -> Result<f32> {
    Ok(t.broadcast_sub(&t.mean_all()?)?
        .powf(2f64)?
        .mean_all()?
        .sqrt()?
        .to_scalar::<f32>()?)
}

/// Returns the mean and standard deviation of the parameters.
pub fn param_stats(varmap: &VarMap) -> Result<Record> {
    let mut record = Record::empty();
    let data = varmap
        .data()
        .lock()
        .map_err(|e| anyhow::anyhow!("Failed to lock varmap: {}", e))?;

    for (k, v) in data.iter() {
        let m: f32 = v.mean_all()?.to_scalar()?;
        record.insert(format!("{}_mean", &k), RecordValue::Scalar(m));
        record.insert(format!("{}_std", &k), RecordValue::Scalar(std(v.as_tensor())?));
    }

    Ok(record)
}

/// Converts an array into a tensor on `device`.
pub fn arrayd_to_tensor<T1, T2>(a: &ArrayD<T1>, device: &Device) -> Result<Tensor>
where
    T1: AsPrimitive<T2>,
    T2: WithDType,
{
    let v = a.iter().map(|e| e.as_()).collect::<Vec<T2>>();
    Ok(Tensor::from_vec(v, a.shape(), device)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;
    use ndarray::arr2;

    #[test]
    fn test_array_conversion() -> Result<()> {
        let a = arr2(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn();
        let t = arrayd_to_tensor::<f32, f32>(&a, &Device::Cpu)?;
        assert_eq!(t.dims(), &[2, 3]);
        assert_eq!(
            t.to_vec2::<f32>()?,
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
        Ok(())
    }

    #[test]
    fn test_param_stats() -> Result<()> {
        let vm = VarMap::new();
        vm.get((4,), "w", Init::Const(2.0), DType::F32, &Device::Cpu)?;
        let record = param_stats(&vm)?;

        assert_eq!(record.get_scalar("w_mean")?, 2.0);
        assert_eq!(record.get_scalar("w_std")?, 0.0);
        Ok(())
    }
}
