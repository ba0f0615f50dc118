//! Configuration structs passed by value into the analytic components.
//!
//! Invalid thresholds are rejected by `validate` before any processing
//! starts; a `ConfigError` aborts the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("threat sensitivity out of range: {value} (expected 1..=10)")]
    ThreatSensitivity { value: u8 },
    #[error("anomaly z-score threshold must be positive: {value}")]
    AnomalyThreshold { value: f64 },
    #[error("{name} must be positive: {value}")]
    NonPositiveThreshold { name: &'static str, value: f64 },
    #[error("minimum sample size must be at least 1: {value}")]
    MinimumSampleSize { value: usize },
}

/// Tuning for the threat and anomaly detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Detection sensitivity, 1 (lenient) to 10 (strict).
    pub threat_sensitivity: u8,
    /// |z| threshold above which a behavioural deviation becomes an anomaly.
    pub anomaly_z_threshold: f64,
    /// Enables per-IP behavioural analysis (profiles, timing, enumeration).
    pub behavioural_analysis_enabled: bool,
    /// Enables known-scanner / threat-intel user-agent matching.
    pub threat_intel_enabled: bool,
    /// Enables mitigation advice on emitted threats.
    pub incident_response_enabled: bool,
    /// Enables the compliance section of security reports.
    pub compliance_reporting_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            threat_sensitivity: 7,
            anomaly_z_threshold: 2.5,
            behavioural_analysis_enabled: true,
            threat_intel_enabled: true,
            incident_response_enabled: true,
            compliance_reporting_enabled: false,
        }
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.threat_sensitivity) {
            return Err(ConfigError::ThreatSensitivity {
                value: self.threat_sensitivity,
            });
        }
        if !self.anomaly_z_threshold.is_finite() || self.anomaly_z_threshold <= 0.0 {
            return Err(ConfigError::AnomalyThreshold {
                value: self.anomaly_z_threshold,
            });
        }
        Ok(())
    }
}

/// Tuning for period-to-period trend comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Percent change in error rate that escalates a metric to critical.
    pub error_rate_threshold_pct: f64,
    /// Percent change in mean response size that escalates to critical.
    pub response_time_threshold_pct: f64,
    /// Percent traffic drop that escalates to critical.
    pub traffic_drop_threshold_pct: f64,
    /// Minimum record count required for degradation detection.
    pub minimum_sample_size: usize,
    /// Cooldown between repeated alerts for the same metric, in hours.
    pub alert_cooldown_hours: u32,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold_pct: 50.0,
            response_time_threshold_pct: 50.0,
            traffic_drop_threshold_pct: 50.0,
            minimum_sample_size: 100,
            alert_cooldown_hours: 4,
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("error rate threshold", self.error_rate_threshold_pct),
            ("response time threshold", self.response_time_threshold_pct),
            ("traffic drop threshold", self.traffic_drop_threshold_pct),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositiveThreshold { name, value });
            }
        }
        if self.minimum_sample_size == 0 {
            return Err(ConfigError::MinimumSampleSize {
                value: self.minimum_sample_size,
            });
        }
        Ok(())
    }
}

/// Latency and throughput proxies used by performance grading.
///
/// The log format carries no true response time; latency here is the
/// declared estimate derived from response sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    pub excellent_latency_ms: f64,
    pub good_latency_ms: f64,
    pub fair_latency_ms: f64,
    pub poor_latency_ms: f64,
    pub max_error_rate: f64,
    pub min_throughput_rps: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            excellent_latency_ms: 100.0,
            good_latency_ms: 300.0,
            fair_latency_ms: 1000.0,
            poor_latency_ms: 3000.0,
            max_error_rate: 0.05,
            min_throughput_rps: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SecurityConfig, TrendConfig};

    #[test]
    fn default_security_config_is_valid() {
        assert!(SecurityConfig::default().validate().is_ok());
    }

    #[test]
    fn sensitivity_out_of_range_is_rejected() {
        let config = SecurityConfig {
            threat_sensitivity: 11,
            ..SecurityConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sensitivity"));
    }

    #[test]
    fn non_positive_z_threshold_is_rejected() {
        let config = SecurityConfig {
            anomaly_z_threshold: 0.0,
            ..SecurityConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sample_size_is_rejected() {
        let config = TrendConfig {
            minimum_sample_size: 0,
            ..TrendConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
