use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use super::artifacts::{decode_json, ensure_all_finite, Artifact};

const MIN_SPREAD: f64 = 1e-12;

/// Fitted feature scaler shared by the tree models and trained scorers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FeatureScaler {
    MinMax { data_min: Vec<f64>, data_max: Vec<f64> },
    Standard { mean: Vec<f64>, std: Vec<f64> },
}

impl FeatureScaler {
    pub fn dim(&self) -> usize {
        match self {
            FeatureScaler::MinMax { data_min, .. } => data_min.len(),
            FeatureScaler::Standard { mean, .. } => mean.len(),
        }
    }

    /// Scale one feature row. Constant columns map to 0.
    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, String> {
        if features.len() != self.dim() {
            return Err(format!(
                "scaler expects {} features, got {}",
                self.dim(),
                features.len()
            ));
        }

        let x = Array1::from(features.to_vec());
        let (offset, spread) = match self {
            FeatureScaler::MinMax { data_min, data_max } => {
                let min = Array1::from(data_min.clone());
                let max = Array1::from(data_max.clone());
                let range = &max - &min;
                (min, range)
            }
            FeatureScaler::Standard { mean, std } => {
                (Array1::from(mean.clone()), Array1::from(std.clone()))
            }
        };

        let mut out = Array1::<f64>::zeros(x.len());
        Zip::from(&mut out)
            .and(&x)
            .and(&offset)
            .and(&spread)
            .for_each(|o, &xi, &off, &s| {
                *o = if s.abs() > MIN_SPREAD { (xi - off) / s } else { 0.0 };
            });

        Ok(out.to_vec())
    }

    fn validate(&self) -> Result<(), String> {
        let (a, b, names) = match self {
            FeatureScaler::MinMax { data_min, data_max } => (data_min, data_max, ("data_min", "data_max")),
            FeatureScaler::Standard { mean, std } => (mean, std, ("mean", "std")),
        };
        if a.is_empty() {
            return Err(format!("{} must not be empty", names.0));
        }
        if a.len() != b.len() {
            return Err(format!(
                "{} has {} entries but {} has {}",
                names.0,
                a.len(),
                names.1,
                b.len()
            ));
        }
        ensure_all_finite(names.0, a)?;
        ensure_all_finite(names.1, b)?;
        Ok(())
    }
}

impl Artifact for FeatureScaler {
    const LABEL: &'static str = "feature scaler";

    fn decode(bytes: &[u8]) -> Result<Self, String> {
        let scaler: FeatureScaler = decode_json(bytes)?;
        scaler.validate()?;
        Ok(scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_transform() {
        let scaler = FeatureScaler::MinMax {
            data_min: vec![0.0, 10.0, 5.0],
            data_max: vec![2.0, 20.0, 5.0],
        };
        let scaled = scaler.transform(&[1.0, 15.0, 7.0]).unwrap();
        assert_eq!(scaled, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_standard_transform() {
        let scaler = FeatureScaler::Standard {
            mean: vec![1.0, -1.0],
            std: vec![2.0, 0.5],
        };
        let scaled = scaler.transform(&[3.0, -2.0]).unwrap();
        assert_eq!(scaled, vec![1.0, -2.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = FeatureScaler::Standard { mean: vec![0.0; 3], std: vec![1.0; 3] };
        assert!(scaler.transform(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_decode_tagged_json() {
        let scaler = FeatureScaler::decode(
            br#"{"method": "min_max", "data_min": [0, 0], "data_max": [1, 4]}"#,
        )
        .unwrap();
        assert_eq!(scaler.dim(), 2);

        let mismatched = FeatureScaler::decode(br#"{"method": "standard", "mean": [0, 0], "std": [1]}"#);
        assert!(mismatched.is_err());

        let unknown = FeatureScaler::decode(br#"{"method": "robust", "center": [0]}"#);
        assert!(unknown.is_err());
    }
}
