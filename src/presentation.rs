//! Plotting settings.
//!
//! The sampling frequency and the axis range do not affect the acquisition.
//! They are stored here so that plotting clients can read and change them
//! through the HTTP API.

use anyhow::Result;
use std::sync::{Arc, Mutex};

/// Plotting settings.
///
/// This struct gives shared access to getters and setters for the settings
/// used by plotting clients. It is cheaply clonable and clones refer to the
/// same settings.
#[derive(Debug, Clone)]
pub struct PresentationConfig(Arc<Mutex<Config>>);

#[derive(Debug, Clone)]
struct Config {
    sampling_frequency: f64,
    axis_range: f64,
}

impl PresentationConfig {
    /// Creates the plotting settings.
    pub fn new(sampling_frequency: f64, axis_range: f64) -> Result<PresentationConfig> {
        check_positive("sampling frequency", sampling_frequency)?;
        check_positive("axis range", axis_range)?;
        Ok(PresentationConfig(Arc::new(Mutex::new(Config {
            sampling_frequency,
            axis_range,
        }))))
    }

    /// Returns the sampling frequency in samples per second.
    pub fn sampling_frequency(&self) -> f64 {
        self.0.lock().unwrap().sampling_frequency
    }

    /// Sets the sampling frequency in samples per second.
    pub fn set_sampling_frequency(&self, sampling_frequency: f64) -> Result<()> {
        check_positive("sampling frequency", sampling_frequency)?;
        self.0.lock().unwrap().sampling_frequency = sampling_frequency;
        Ok(())
    }

    /// Returns the axis range.
    pub fn axis_range(&self) -> f64 {
        self.0.lock().unwrap().axis_range
    }

    /// Sets the axis range.
    pub fn set_axis_range(&self, axis_range: f64) -> Result<()> {
        check_positive("axis range", axis_range)?;
        self.0.lock().unwrap().axis_range = axis_range;
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    anyhow::ensure!(
        value.is_finite() && value > 0.0,
        "{name} must be positive (got {value})"
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shared_between_clones() {
        let config = PresentationConfig::new(100e3, 1.0).unwrap();
        let clone = config.clone();
        clone.set_sampling_frequency(1e6).unwrap();
        clone.set_axis_range(0.25).unwrap();
        assert_eq!(config.sampling_frequency(), 1e6);
        assert_eq!(config.axis_range(), 0.25);
    }

    #[test]
    fn rejects_non_positive() {
        assert!(PresentationConfig::new(0.0, 1.0).is_err());
        let config = PresentationConfig::new(100e3, 1.0).unwrap();
        assert!(config.set_axis_range(-1.0).is_err());
        assert!(config.set_sampling_frequency(f64::NAN).is_err());
        assert_eq!(config.axis_range(), 1.0);
        assert_eq!(config.sampling_frequency(), 100e3);
    }
}
