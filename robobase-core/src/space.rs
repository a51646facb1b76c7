//! Observation and action spaces.
use crate::error::CoreError;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A box in `R^n` with element-wise bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    /// Lower bounds, flattened in row-major order.
    pub low: Vec<f32>,

    /// Upper bounds, flattened in row-major order.
    pub high: Vec<f32>,

    /// Shape of an element of the space.
    pub shape: Vec<usize>,
}

impl BoxSpace {
    /// Creates a box with per-element bounds.
    pub fn new(low: Vec<f32>, high: Vec<f32>, shape: Vec<usize>) -> Result<Self, CoreError> {
        let expected = shape.iter().product::<usize>();
        for actual in [low.len(), high.len()] {
            if actual != expected {
                return Err(CoreError::SpaceShapeMismatch {
                    shape,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self { low, high, shape })
    }

    /// Creates a box with the same bounds for all elements.
    pub fn uniform(low: f32, high: f32, shape: &[usize]) -> Self {
        let n = shape.iter().product::<usize>();
        Self {
            low: vec![low; n],
            high: vec![high; n],
            shape: shape.to_vec(),
        }
    }

    /// Creates the space of `u8` images with `0..=255` values.
    pub fn image(shape: &[usize]) -> Self {
        Self::uniform(0.0, 255.0, shape)
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Lower bounds as an array of the space's shape.
    pub fn low_array(&self) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.low.clone())
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&self.shape)))
    }

    /// Upper bounds as an array of the space's shape.
    pub fn high_array(&self) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.high.clone())
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&self.shape)))
    }

    /// Returns `true` if `x` has the shape of the space and lies within its bounds.
    pub fn contains(&self, x: &ArrayD<f32>) -> bool {
        x.shape() == self.shape.as_slice()
            && x.iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(v, (l, h))| l <= v && v <= h)
    }
}

/// A dictionary of named [`BoxSpace`]s, ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DictSpace(BTreeMap<String, BoxSpace>);

impl DictSpace {
    /// Creates an empty dictionary space.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a space.
    pub fn insert(&mut self, key: impl Into<String>, space: BoxSpace) {
        self.0.insert(key.into(), space);
    }

    /// Returns the space of the given key.
    pub fn get(&self, key: &str) -> Option<&BoxSpace> {
        self.0.get(key)
    }

    /// Returns a mutable reference to the space of the given key.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut BoxSpace> {
        self.0.get_mut(key)
    }

    /// Removes the space of the given key.
    pub fn remove(&mut self, key: &str) -> Option<BoxSpace> {
        self.0.remove(key)
    }

    /// Returns `true` if the space has the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over the spaces in key order.
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, String, BoxSpace> {
        self.0.iter()
    }

    /// Iterates over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of spaces.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is no space.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, BoxSpace)> for DictSpace {
    fn from_iter<I: IntoIterator<Item = (String, BoxSpace)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_box_space_new_checks_shape() {
        assert!(BoxSpace::new(vec![0.0; 6], vec![1.0; 6], vec![2, 3]).is_ok());
        assert!(matches!(
            BoxSpace::new(vec![0.0; 5], vec![1.0; 6], vec![2, 3]),
            Err(CoreError::SpaceShapeMismatch { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn test_box_space_contains() {
        let space = BoxSpace::new(vec![-1.0, 0.0], vec![1.0, 2.0], vec![2]).unwrap();
        assert!(space.contains(&arr1(&[0.5, 1.5]).into_dyn()));
        assert!(!space.contains(&arr1(&[0.5, 2.5]).into_dyn()));
        assert!(!space.contains(&arr1(&[0.5]).into_dyn()));
    }
}
