use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    threshold::ExponentialDecayThreshold,
};

const ENV_PREFIX: &str = "SYNCPRINT";

const WANG_SAMPLE_RATE: f64 = 11025.0;
const WANG_HOP_SIZE: f64 = 256.0;
const HK_SAMPLE_RATE: f64 = 5512.0;
const HK_FRAME_STEP: f64 = 64.0;

pub const DEFAULT_FINGERPRINT_SIZE: usize = 256;
pub const DEFAULT_BIT_ERROR_THRESHOLD: f32 = 0.35;

/// Which scoring procedure decides whether two colliding positions match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Bit error rate over a fixed number of consecutive hashes.
    FixedWindow,
    /// Hash match rate against time-decaying accept/reject thresholds.
    #[default]
    AdaptiveRate,
}

/// Matching configuration.
///
/// Curve parameters are expressed in seconds: the curves are sampled at
/// `elapsed_frames * frame_time_scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub strategy: StrategyKind,
    /// Seconds between two consecutive frames.
    pub frame_time_scale: f64,
    /// The accept curve. The reject curve is the same curve divided by
    /// `reject_divisor`.
    pub threshold: ExponentialDecayThreshold,
    pub reject_divisor: f64,
    /// Frames that must elapse before a candidate can be accepted.
    pub matching_min_frames: usize,
    /// Frames after which an unresolved candidate is rejected.
    pub matching_max_frames: usize,
    /// Number of consecutive hashes compared by the fixed window strategy.
    pub fingerprint_size: usize,
    pub bit_error_threshold: f32,
    /// Keep silent hashes out of the collision map. They are still stored in
    /// the track's sequence.
    pub suppress_silent_collisions: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::adaptive_rate()
    }
}

impl Profile {
    pub fn adaptive_rate() -> Self {
        let frames_per_second = WANG_SAMPLE_RATE / WANG_HOP_SIZE;
        Profile {
            name: "adaptive rate default".to_string(),
            strategy: StrategyKind::AdaptiveRate,
            frame_time_scale: WANG_HOP_SIZE / WANG_SAMPLE_RATE,
            threshold: ExponentialDecayThreshold::default(),
            reject_divisor: 6.0,
            matching_min_frames: 10,
            matching_max_frames: (frames_per_second * 30.0) as usize,
            fingerprint_size: DEFAULT_FINGERPRINT_SIZE,
            bit_error_threshold: DEFAULT_BIT_ERROR_THRESHOLD,
            suppress_silent_collisions: false,
        }
    }

    pub fn fixed_window() -> Self {
        Profile {
            name: "fixed window default".to_string(),
            strategy: StrategyKind::FixedWindow,
            frame_time_scale: HK_FRAME_STEP / HK_SAMPLE_RATE,
            ..Profile::adaptive_rate()
        }
    }

    /// Loads a profile from defaults, an optional TOML file and `SYNCPRINT_*`
    /// environment variables (nested keys joined with `__`), in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let conf = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let profile: Profile = conf.try_deserialize()?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fingerprint_size < 1 {
            return Err(invalid("the fingerprint size must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.bit_error_threshold) {
            return Err(invalid(format!(
                "the bit error threshold must be between 0 and 1, got {}",
                self.bit_error_threshold
            )));
        }
        if !(self.frame_time_scale.is_finite() && self.frame_time_scale > 0.0) {
            return Err(invalid(format!(
                "the frame time scale must be positive, got {}",
                self.frame_time_scale
            )));
        }
        // every frame index must map to a representable time
        if Duration::try_from_secs_f64(self.frame_time_scale * u32::MAX as f64).is_err() {
            return Err(invalid(format!(
                "the frame time scale {} is too large",
                self.frame_time_scale
            )));
        }

        let threshold = &self.threshold;
        for (name, value) in [("base", threshold.base), ("width_scale", threshold.width_scale)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("threshold {name} must be positive, got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&threshold.height) {
            return Err(invalid(format!(
                "threshold height must be between 0 and 1, got {}",
                threshold.height
            )));
        }
        // keeps the reject curve at or below the accept curve
        if !(self.reject_divisor.is_finite() && self.reject_divisor >= 1.0) {
            return Err(invalid(format!(
                "the reject divisor must be at least 1, got {}",
                self.reject_divisor
            )));
        }

        if self.matching_max_frames < 1 || self.matching_min_frames >= self.matching_max_frames {
            return Err(invalid(format!(
                "matching frames must satisfy min < max and max >= 1, got {}..{}",
                self.matching_min_frames, self.matching_max_frames
            )));
        }

        Ok(())
    }

    pub fn reject_threshold(&self) -> ExponentialDecayThreshold {
        self.threshold.scaled_down(self.reject_divisor)
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidProfile(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_presets_are_valid() {
        Profile::adaptive_rate().validate().unwrap();
        Profile::fixed_window().validate().unwrap();
        assert_eq!(Profile::default(), Profile::adaptive_rate());
    }

    #[test]
    fn test_adaptive_rate_preset() {
        let profile = Profile::adaptive_rate();
        assert_eq!(profile.matching_min_frames, 10);
        assert_eq!(profile.matching_max_frames, 1291);
        assert!((profile.reject_threshold().height - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_window_preset() {
        let profile = Profile::fixed_window();
        assert_eq!(profile.strategy, StrategyKind::FixedWindow);
        assert_eq!(profile.fingerprint_size, 256);
        assert_eq!(profile.bit_error_threshold, 0.35);
    }

    #[test]
    fn test_rejects_zero_fingerprint_size() {
        let profile = Profile {
            fingerprint_size: 0,
            ..Profile::fixed_window()
        };
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        for threshold in [-0.1, 1.1, f32::NAN] {
            let profile = Profile {
                bit_error_threshold: threshold,
                ..Profile::fixed_window()
            };
            assert!(profile.validate().is_err(), "accepted {threshold}");
        }
        let edge = Profile {
            bit_error_threshold: 1.0,
            ..Profile::fixed_window()
        };
        edge.validate().unwrap();
    }

    #[test]
    fn test_rejects_huge_frame_time_scale() {
        let profile = Profile {
            frame_time_scale: 1e30,
            ..Profile::default()
        };
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));

        let slow = Profile {
            frame_time_scale: 1.0,
            ..Profile::default()
        };
        slow.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_curves() {
        let divisor = Profile {
            reject_divisor: 0.5,
            ..Profile::default()
        };
        assert!(divisor.validate().is_err());

        let frames = Profile {
            matching_min_frames: 20,
            matching_max_frames: 20,
            ..Profile::default()
        };
        assert!(frames.validate().is_err());

        let width = Profile {
            threshold: ExponentialDecayThreshold {
                width_scale: 0.0,
                ..ExponentialDecayThreshold::default()
            },
            ..Profile::default()
        };
        assert!(width.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
name = "custom"
strategy = "fixed_window"
fingerprint_size = 128
bit_error_threshold = 0.3

[threshold]
height = 0.4
"#
        )
        .unwrap();

        let profile = Profile::load(Some(file.path())).unwrap();
        assert_eq!(profile.name, "custom");
        assert_eq!(profile.strategy, StrategyKind::FixedWindow);
        assert_eq!(profile.fingerprint_size, 128);
        assert_eq!(profile.threshold.height, 0.4);
        assert_eq!(profile.threshold.base, 0.5);
        assert_eq!(profile.matching_min_frames, 10);
        assert!(!profile.suppress_silent_collisions);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "bit_error_threshold = 2.0").unwrap();
        assert!(matches!(
            Profile::load(Some(file.path())),
            Err(Error::InvalidProfile(_))
        ));
    }
}
