//! Parameterized distributions for edge weights and timing latencies.
//!
//! Templates only *describe* distributions; sampling always goes through a
//! caller-supplied RNG so that generation stays reproducible for a seed.

use rand::Rng;
use rand_distr::{Beta, Distribution as _, Exp, LogNormal, Normal, Poisson};
use serde::{Deserialize, Serialize};

/// A one-dimensional distribution over `f64`.
///
/// Weight distributions are in major currency units (transfers) or relation
/// strength (ownership percentage, employment strength, ...). Latency
/// distributions are in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum Distribution {
    /// Always the same value.
    Fixed { value: f64 },
    /// Uniform on `[min, max]`.
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// Log-normal given by its median (`exp(mu)`) and log-space sigma.
    LogNormal { median: f64, sigma: f64 },
    Beta { alpha: f64, beta: f64 },
    /// Exponential given by its mean (`1 / lambda`).
    Exponential { mean: f64 },
    Poisson { lambda: f64 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {dist} distribution: {message}")]
pub struct DistributionError {
    pub dist: &'static str,
    pub message: String,
}

impl DistributionError {
    fn new(dist: &'static str, message: impl Into<String>) -> Self {
        Self {
            dist,
            message: message.into(),
        }
    }
}

enum Sampler {
    Fixed(f64),
    Uniform(f64, f64),
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Beta(Beta<f64>),
    Exponential(Exp<f64>),
    Poisson(Poisson<f64>),
}

impl Distribution {
    pub fn fixed(value: f64) -> Self {
        Self::Fixed { value }
    }

    pub fn uniform(min: f64, max: f64) -> Self {
        Self::Uniform { min, max }
    }

    pub fn exponential(mean: f64) -> Self {
        Self::Exponential { mean }
    }

    pub fn log_normal(median: f64, sigma: f64) -> Self {
        Self::LogNormal { median, sigma }
    }

    pub fn beta(alpha: f64, beta: f64) -> Self {
        Self::Beta { alpha, beta }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed { .. } => "fixed",
            Self::Uniform { .. } => "uniform",
            Self::Normal { .. } => "normal",
            Self::LogNormal { .. } => "log_normal",
            Self::Beta { .. } => "beta",
            Self::Exponential { .. } => "exponential",
            Self::Poisson { .. } => "poisson",
        }
    }

    /// Check the parameters without drawing anything.
    pub fn validate(&self) -> Result<(), DistributionError> {
        self.sampler().map(|_| ())
    }

    /// Draw one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistributionError> {
        Ok(match self.sampler()? {
            Sampler::Fixed(value) => value,
            Sampler::Uniform(min, max) => {
                if min == max {
                    min
                } else {
                    rng.gen_range(min..=max)
                }
            }
            Sampler::Normal(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Beta(d) => d.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Poisson(d) => d.sample(rng),
        })
    }

    fn sampler(&self) -> Result<Sampler, DistributionError> {
        let name = self.name();
        let finite = |label: &str, v: f64| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(DistributionError::new(name, format!("{label} must be finite")))
            }
        };
        let positive = |label: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(v)
            } else {
                Err(DistributionError::new(name, format!("{label} must be > 0, got {v}")))
            }
        };

        match *self {
            Self::Fixed { value } => Ok(Sampler::Fixed(finite("value", value)?)),
            Self::Uniform { min, max } => {
                let (min, max) = (finite("min", min)?, finite("max", max)?);
                if min > max {
                    return Err(DistributionError::new(name, format!("min {min} exceeds max {max}")));
                }
                Ok(Sampler::Uniform(min, max))
            }
            Self::Normal { mean, std_dev } => {
                let mean = finite("mean", mean)?;
                if !(std_dev.is_finite() && std_dev >= 0.0) {
                    return Err(DistributionError::new(name, "std_dev must be finite and >= 0"));
                }
                Normal::new(mean, std_dev)
                    .map(Sampler::Normal)
                    .map_err(|e| DistributionError::new(name, e.to_string()))
            }
            Self::LogNormal { median, sigma } => {
                let median = positive("median", median)?;
                if !(sigma.is_finite() && sigma >= 0.0) {
                    return Err(DistributionError::new(name, "sigma must be finite and >= 0"));
                }
                LogNormal::new(median.ln(), sigma)
                    .map(Sampler::LogNormal)
                    .map_err(|e| DistributionError::new(name, e.to_string()))
            }
            Self::Beta { alpha, beta } => {
                let (alpha, beta) = (positive("alpha", alpha)?, positive("beta", beta)?);
                Beta::new(alpha, beta)
                    .map(Sampler::Beta)
                    .map_err(|e| DistributionError::new(name, e.to_string()))
            }
            Self::Exponential { mean } => {
                let mean = positive("mean", mean)?;
                Exp::new(1.0 / mean)
                    .map(Sampler::Exponential)
                    .map_err(|e| DistributionError::new(name, e.to_string()))
            }
            Self::Poisson { lambda } => {
                let lambda = positive("lambda", lambda)?;
                Poisson::new(lambda)
                    .map(Sampler::Poisson)
                    .map_err(|e| DistributionError::new(name, e.to_string()))
            }
        }
    }
}
