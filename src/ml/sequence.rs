use ndarray::{Array1, Array2};
use serde::Deserialize;

use super::artifacts::{decode_json, ensure_all_finite, Artifact};
use super::{Forecaster, ModelKind};
use crate::error::{ForecastError, Result};

/// Serialized layout of the recurrent model
#[derive(Debug, Deserialize)]
struct SequenceWeights {
    input_mean: f64,
    input_std: f64,
    #[serde(default)]
    window: Option<usize>,
    w_input: Vec<f64>,
    w_hidden: Vec<Vec<f64>>,
    b_hidden: Vec<f64>,
    w_output: Vec<f64>,
    b_output: f64,
}

/// Single-layer recurrent network over a normalised price series.
#[derive(Debug, Clone)]
pub struct SequenceModel {
    input_mean: f64,
    input_std: f64,
    window: Option<usize>,
    /// Input weights (hidden)
    w_input: Array1<f64>,
    /// Recurrent weights (hidden x hidden)
    w_hidden: Array2<f64>,
    b_hidden: Array1<f64>,
    w_output: Array1<f64>,
    b_output: f64,
}

impl SequenceModel {
    pub fn hidden_size(&self) -> usize {
        self.w_input.len()
    }

    pub fn window(&self) -> Option<usize> {
        self.window
    }

    /// Run the series through the network and return the next value.
    pub fn predict_next(&self, series: &[f64]) -> std::result::Result<f64, String> {
        let steps = match self.window {
            Some(window) if series.len() < window => {
                return Err(format!(
                    "series has {} points, model window is {}",
                    series.len(),
                    window
                ));
            }
            Some(window) => &series[series.len() - window..],
            None => series,
        };

        let mut h = Array1::<f64>::zeros(self.hidden_size());
        for &x in steps {
            let xn = (x - self.input_mean) / self.input_std;
            let pre = &self.w_input * xn + self.w_hidden.dot(&h) + &self.b_hidden;
            h = pre.mapv(f64::tanh);
        }

        let y = self.w_output.dot(&h) + self.b_output;
        let value = y * self.input_std + self.input_mean;
        if value.is_finite() {
            Ok(value)
        } else {
            Err("network output is not finite".to_string())
        }
    }

    fn from_weights(w: SequenceWeights) -> std::result::Result<Self, String> {
        let n = w.w_input.len();
        if n == 0 {
            return Err("hidden size must be at least 1".to_string());
        }
        if w.b_hidden.len() != n || w.w_output.len() != n {
            return Err(format!(
                "hidden size mismatch: w_input {}, b_hidden {}, w_output {}",
                n,
                w.b_hidden.len(),
                w.w_output.len()
            ));
        }
        if w.w_hidden.len() != n || w.w_hidden.iter().any(|row| row.len() != n) {
            return Err(format!("w_hidden must be {}x{}", n, n));
        }
        if !(w.input_std.is_finite() && w.input_std > 0.0) {
            return Err("input_std must be positive".to_string());
        }
        if w.window == Some(0) {
            return Err("window must be at least 1".to_string());
        }

        ensure_all_finite("input_mean", &[w.input_mean])?;
        ensure_all_finite("w_input", &w.w_input)?;
        ensure_all_finite("b_hidden", &w.b_hidden)?;
        ensure_all_finite("w_output", &w.w_output)?;
        ensure_all_finite("b_output", &[w.b_output])?;

        let flat: Vec<f64> = w.w_hidden.into_iter().flatten().collect();
        ensure_all_finite("w_hidden", &flat)?;
        let w_hidden = Array2::from_shape_vec((n, n), flat).map_err(|e| e.to_string())?;

        Ok(Self {
            input_mean: w.input_mean,
            input_std: w.input_std,
            window: w.window,
            w_input: Array1::from(w.w_input),
            w_hidden,
            b_hidden: Array1::from(w.b_hidden),
            w_output: Array1::from(w.w_output),
            b_output: w.b_output,
        })
    }
}

impl Artifact for SequenceModel {
    const LABEL: &'static str = "sequence model";

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        Self::from_weights(decode_json(bytes)?)
    }
}

impl Forecaster for SequenceModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Lstm
    }

    fn forecast(&self, input: &[f64], _horizon: usize) -> Result<f64> {
        self.predict_next(input)
            .map_err(|reason| ForecastError::prediction(ModelKind::Lstm.as_str(), reason))
    }
}
