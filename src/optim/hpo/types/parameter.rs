//! Parameter value and domain types

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::optim::hpo::error::{HPOError, Result};

/// Parameter value (sampled from domain)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> f64 {
        match self {
            ParameterValue::Float(v) => *v,
        }
    }
}

/// Parameter domain (search space)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterDomain {
    /// Continuous range [low, high], optionally log-scaled
    Continuous {
        low: f64,
        high: f64,
        log_scale: bool,
    },
}

impl ParameterDomain {
    /// Build a validated continuous domain
    pub fn continuous(name: &str, low: f64, high: f64, log_scale: bool) -> Result<Self> {
        let valid = low.is_finite() && high.is_finite() && low <= high && (!log_scale || low > 0.0);
        if !valid {
            return Err(HPOError::InvalidRange {
                name: name.to_string(),
                low,
                high,
                log: log_scale,
            });
        }
        Ok(ParameterDomain::Continuous {
            low,
            high,
            log_scale,
        })
    }

    /// Sample a random value from this domain
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            ParameterDomain::Continuous {
                low,
                high,
                log_scale,
            } => {
                let value = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    let log_val = log_low + rng.random::<f64>() * (log_high - log_low);
                    log_val.exp().clamp(*low, *high)
                } else {
                    low + rng.random::<f64>() * (high - low)
                };
                ParameterValue::Float(value)
            }
        }
    }

    /// Check if a value is valid for this domain
    pub fn is_valid(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (ParameterDomain::Continuous { low, high, .. }, ParameterValue::Float(v)) => {
                *v >= *low && *v <= *high
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_log_domain_samples_in_range() {
        let domain = ParameterDomain::continuous("tv", 1e-6, 1e-1, true).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let value = domain.sample(&mut rng);
            assert!(domain.is_valid(&value), "{value:?} out of range");
        }
    }

    #[test]
    fn test_log_domain_covers_decades() {
        let domain = ParameterDomain::continuous("tv", 1e-6, 1e-1, true).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<f64> = (0..2000).map(|_| domain.sample(&mut rng).as_float()).collect();
        // Log-uniform puts roughly a fifth of the mass in every decade
        assert!(samples.iter().any(|&v| v < 1e-5));
        assert!(samples.iter().any(|&v| v > 1e-2));
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(ParameterDomain::continuous("x", 0.0, 1.0, true).is_err());
        assert!(ParameterDomain::continuous("x", 2.0, 1.0, false).is_err());
        assert!(ParameterDomain::continuous("x", f64::NAN, 1.0, false).is_err());
    }
}
