use serde::Deserialize;

/// An exponentially decaying threshold `y = base^(x / width_scale) * height`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExponentialDecayThreshold {
    pub base: f64,
    pub width_scale: f64,
    pub height: f64,
}

impl Default for ExponentialDecayThreshold {
    fn default() -> Self {
        ExponentialDecayThreshold {
            base: 0.5,
            width_scale: 2.0,
            height: 0.3,
        }
    }
}

impl ExponentialDecayThreshold {
    pub fn calculate(&self, x: f64) -> f64 {
        self.base.powf(x / self.width_scale) * self.height
    }

    /// The same curve scaled down by `divisor`.
    pub fn scaled_down(&self, divisor: f64) -> Self {
        ExponentialDecayThreshold {
            height: self.height / divisor,
            ..*self
        }
    }
}

/// A threshold precomputed for every elapsed frame count below a horizon.
#[derive(Debug, Clone)]
pub struct ThresholdCurve {
    values: Box<[f64]>,
}

impl ThresholdCurve {
    /// Samples `threshold` at `t * time_scale` for `t` in `0..horizon`.
    pub fn sample(threshold: &ExponentialDecayThreshold, horizon: usize, time_scale: f64) -> Self {
        let values = (0..horizon)
            .map(|t| threshold.calculate(t as f64 * time_scale))
            .collect();
        ThresholdCurve { values }
    }

    /// Panics if `t` is outside the sampled horizon.
    #[inline]
    pub fn at(&self, t: usize) -> f64 {
        self.values[t]
    }

    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
