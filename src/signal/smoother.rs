use nalgebra::DVector;

use crate::error::{ArbError, Result};

/// Exponentially smoothed residual state:
/// `s_t = weight * e_t + (1 - weight) * s_{t-1}`.
///
/// The first observation seeds the state directly.
#[derive(Debug, Clone)]
pub struct ResidualSmoother {
    weight: f64,
    state: Option<DVector<f64>>,
}

impl ResidualSmoother {
    pub fn new(weight: f64) -> Result<Self> {
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(ArbError::config(format!(
                "smoothing weight {} outside (0, 1]",
                weight
            )));
        }
        Ok(Self {
            weight,
            state: None,
        })
    }

    /// Blend a raw residual into the state and return the smoothed value.
    pub fn push(&mut self, raw: &DVector<f64>) -> Result<&DVector<f64>> {
        let next = match self.state.take() {
            Some(prev) if prev.len() == raw.len() => raw * self.weight + prev * (1.0 - self.weight),
            Some(prev) => {
                let len = prev.len();
                self.state = Some(prev);
                return Err(ArbError::data(format!(
                    "residual has {} assets, smoothed state has {}",
                    raw.len(),
                    len
                )));
            }
            None => raw.clone(),
        };
        Ok(&*self.state.insert(next))
    }

    pub fn value(&self) -> Option<&DVector<f64>> {
        self.state.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
