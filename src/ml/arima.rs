use serde::{Deserialize, Serialize};

use super::artifacts::{decode_json, ensure_all_finite, Artifact};
use super::{Forecaster, ModelKind};
use crate::error::{ForecastError, Result};

/// Seasonal block `(P, D, Q)_s`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalOrder {
    pub period: usize,
    #[serde(default)]
    pub ar: Vec<f64>,
    #[serde(default)]
    pub d: usize,
    #[serde(default)]
    pub ma: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ArimaWeights {
    #[serde(default)]
    ar: Vec<f64>,
    #[serde(default)]
    d: usize,
    #[serde(default)]
    ma: Vec<f64>,
    #[serde(default)]
    seasonal: Option<SeasonalOrder>,
    #[serde(default)]
    constant: f64,
    history: Vec<f64>,
    #[serde(default)]
    residuals: Vec<f64>,
}

/// Fitted (seasonal) ARIMA state that forecasts forward from its stored tail.
///
/// The lag polynomials are expanded once so that
/// `y_t = c + Σ a_i·y_{t-i} + e_t + Σ m_j·e_{t-j}` with future shocks set to zero.
#[derive(Debug, Clone)]
pub struct ArimaModel {
    kind: ModelKind,
    constant: f64,
    /// a_1..a_p of the expanded autoregressive side
    ar_lags: Vec<f64>,
    /// m_1..m_q of the expanded moving-average side
    ma_lags: Vec<f64>,
    history: Vec<f64>,
    residuals: Vec<f64>,
}

/// Multiply two polynomials in the backshift operator, coefficients in ascending order.
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 + sign·c_1·B^s + sign·c_2·B^2s + ...`
fn lag_poly(coefs: &[f64], step: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coefs.len() * step + 1];
    poly[0] = 1.0;
    for (k, c) in coefs.iter().enumerate() {
        poly[(k + 1) * step] = sign * c;
    }
    poly
}

/// `(1 - B^s)^d`
fn difference_poly(d: usize, step: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..d {
        poly = poly_mul(&poly, &lag_poly(&[1.0], step, -1.0));
    }
    poly
}

impl ArimaModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Re-tag the model for the dispatcher slot it was loaded into.
    pub fn with_kind(mut self, kind: ModelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn ar_order(&self) -> usize {
        self.ar_lags.len()
    }

    pub fn ma_order(&self) -> usize {
        self.ma_lags.len()
    }

    /// Forecast `steps` values past the end of the stored history.
    pub fn forecast_path(&self, steps: usize) -> Vec<f64> {
        let mut y = self.history.clone();
        let mut e = self.residuals.clone();
        let mut path = Vec::with_capacity(steps);

        for _ in 0..steps {
            let ar: f64 = self
                .ar_lags
                .iter()
                .enumerate()
                .map(|(i, a)| a * y[y.len() - 1 - i])
                .sum();
            let ma: f64 = self
                .ma_lags
                .iter()
                .enumerate()
                .map(|(j, m)| m * e[e.len() - 1 - j])
                .sum();
            let value = self.constant + ar + ma;
            y.push(value);
            e.push(0.0);
            path.push(value);
        }

        path
    }

    fn from_weights(w: ArimaWeights) -> std::result::Result<Self, String> {
        ensure_all_finite("ar", &w.ar)?;
        ensure_all_finite("ma", &w.ma)?;
        ensure_all_finite("constant", &[w.constant])?;
        ensure_all_finite("history", &w.history)?;
        ensure_all_finite("residuals", &w.residuals)?;

        let mut ar_poly = poly_mul(&lag_poly(&w.ar, 1, -1.0), &difference_poly(w.d, 1));
        let mut ma_poly = lag_poly(&w.ma, 1, 1.0);

        let kind = match &w.seasonal {
            Some(s) => {
                if s.period < 2 {
                    return Err(format!("seasonal period must be at least 2, got {}", s.period));
                }
                ensure_all_finite("seasonal.ar", &s.ar)?;
                ensure_all_finite("seasonal.ma", &s.ma)?;
                ar_poly = poly_mul(&ar_poly, &lag_poly(&s.ar, s.period, -1.0));
                ar_poly = poly_mul(&ar_poly, &difference_poly(s.d, s.period));
                ma_poly = poly_mul(&ma_poly, &lag_poly(&s.ma, s.period, 1.0));
                ModelKind::Sarima
            }
            None => ModelKind::Arima,
        };

        let ar_lags: Vec<f64> = ar_poly[1..].iter().map(|c| -c).collect();
        let ma_lags: Vec<f64> = ma_poly[1..].to_vec();

        if w.history.len() < ar_lags.len() {
            return Err(format!(
                "history has {} points, autoregressive order is {}",
                w.history.len(),
                ar_lags.len()
            ));
        }
        if w.history.is_empty() {
            return Err("history must not be empty".to_string());
        }

        let mut residuals = w.residuals;
        if residuals.len() < ma_lags.len() {
            let mut padded = vec![0.0; ma_lags.len() - residuals.len()];
            padded.extend(residuals);
            residuals = padded;
        }

        Ok(Self {
            kind,
            constant: w.constant,
            ar_lags,
            ma_lags,
            history: w.history,
            residuals,
        })
    }
}

impl Artifact for ArimaModel {
    const LABEL: &'static str = "ARIMA model";

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        Self::from_weights(decode_json(bytes)?)
    }
}

impl Forecaster for ArimaModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    /// The input series is ignored; the forecast runs from the stored state.
    fn forecast(&self, _input: &[f64], horizon: usize) -> Result<f64> {
        if horizon == 0 {
            return Err(ForecastError::validation("horizon must be at least 1"));
        }
        match self.forecast_path(horizon).last() {
            Some(v) if v.is_finite() => Ok(*v),
            _ => Err(ForecastError::prediction(
                self.kind.as_str(),
                format!("forecast at step {} is not finite", horizon),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(json: &str) -> ArimaModel {
        ArimaModel::decode(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_poly_mul() {
        // (1 - B)(1 - B) = 1 - 2B + B^2
        assert_eq!(difference_poly(2, 1), vec![1.0, -2.0, 1.0]);
        // (1 - 0.5B)(1 + 0.2B^2)
        assert_eq!(poly_mul(&[1.0, -0.5], &[1.0, 0.0, 0.2]), vec![1.0, -0.5, 0.2, -0.1]);
    }

    #[test]
    fn test_ar1_forecast() {
        let m = model(r#"{"ar": [0.5], "constant": 1.0, "history": [2.0, 4.0]}"#);
        assert_eq!(m.kind(), ModelKind::Arima);
        assert_eq!(m.forecast(&[], 1).unwrap(), 3.0);
        assert_eq!(m.forecast(&[], 2).unwrap(), 2.5);
        assert_eq!(m.forecast_path(3), vec![3.0, 2.5, 2.25]);
    }

    #[test]
    fn test_random_walk_with_drift() {
        let m = model(r#"{"d": 1, "constant": 0.5, "history": [10.0]}"#);
        assert_eq!(m.forecast_path(3), vec![10.5, 11.0, 11.5]);
    }

    #[test]
    fn test_ma_uses_last_residual_then_zero() {
        let m = model(r#"{"ma": [0.5], "constant": 2.0, "history": [1.0], "residuals": [4.0]}"#);
        assert_eq!(m.forecast_path(2), vec![4.0, 2.0]);
    }

    #[test]
    fn test_short_residuals_are_padded() {
        let m = model(r#"{"ma": [0.5, 0.25], "history": [1.0], "residuals": [4.0]}"#);
        assert_eq!(m.ma_order(), 2);
        // e_{t-1} = 4, e_{t-2} = 0
        assert_eq!(m.forecast_path(1), vec![2.0]);
    }

    #[test]
    fn test_seasonal_naive() {
        let m = model(
            r#"{"seasonal": {"period": 4, "d": 1}, "history": [1.0, 2.0, 3.0, 4.0]}"#,
        );
        assert_eq!(m.kind(), ModelKind::Sarima);
        assert_eq!(m.forecast_path(5), vec![1.0, 2.0, 3.0, 4.0, 1.0]);
        assert_eq!(m.forecast(&[99.0], 6).unwrap(), 2.0);
    }

    #[test]
    fn test_history_shorter_than_ar_order_is_rejected() {
        let result = ArimaModel::decode(br#"{"ar": [0.5, 0.2], "d": 1, "history": [1.0, 2.0]}"#);
        assert!(result.is_err());

        let bad_period = ArimaModel::decode(br#"{"seasonal": {"period": 1}, "history": [1.0]}"#);
        assert!(bad_period.is_err());
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let m = model(r#"{"ar": [0.5], "history": [1.0]}"#);
        assert!(matches!(m.forecast(&[], 0), Err(ForecastError::Validation(_))));
    }
}
