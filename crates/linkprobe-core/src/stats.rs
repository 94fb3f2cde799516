//! Delay statistics

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::link::ProbeError;

/// Serialize a duration as fractional milliseconds
pub(crate) fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Minimum, mean and maximum of a set of delays
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelayStats {
    /// Number of samples reduced
    pub samples: usize,
    /// Shortest delay
    #[serde(rename = "min_ms", serialize_with = "as_millis")]
    pub min: Duration,
    /// Arithmetic mean
    #[serde(rename = "mean_ms", serialize_with = "as_millis")]
    pub mean: Duration,
    /// Longest delay
    #[serde(rename = "max_ms", serialize_with = "as_millis")]
    pub max: Duration,
}

impl DelayStats {
    /// Reduce `samples`, failing with [`ProbeError::EmptySample`] if there are none
    pub fn from_samples(samples: &[Duration]) -> Result<Self, ProbeError> {
        let (&first, rest) = samples.split_first().ok_or(ProbeError::EmptySample)?;

        let (min, max, total) = rest
            .iter()
            .fold((first, first, first), |(min, max, total), &d| {
                (min.min(d), max.max(d), total + d)
            });
        let mean = Duration::from_secs_f64(total.as_secs_f64() / samples.len() as f64);

        Ok(Self {
            samples: samples.len(),
            min,
            mean,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_error() {
        assert!(matches!(
            DelayStats::from_samples(&[]),
            Err(ProbeError::EmptySample)
        ));
    }

    #[test]
    fn test_single_sample() {
        let d = Duration::from_millis(12);
        let stats = DelayStats::from_samples(&[d]).unwrap();
        assert_eq!(stats.min, d);
        assert_eq!(stats.max, d);
        assert_eq!(stats.samples, 1);
        assert!((stats.mean.as_secs_f64() - 0.012).abs() < 1e-9);
    }

    #[test]
    fn test_min_mean_max() {
        let samples = [
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ];
        let stats = DelayStats::from_samples(&samples).unwrap();
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert!((stats.mean.as_secs_f64() - 0.020).abs() < 1e-9);
    }

    #[test]
    fn test_serializes_milliseconds() {
        let stats = DelayStats::from_samples(&[Duration::from_millis(5)]).unwrap();
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["samples"], 1);
        assert!((json["min_ms"].as_f64().unwrap() - 5.0).abs() < 1e-9);
    }
}
