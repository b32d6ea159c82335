use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::normalize_symbol;

/// Error metrics over resolved predictions. Numeric fields are `None` when `count == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub count: usize,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    /// Percent; entries with a zero actual are left out
    pub mape: Option<f64>,
    pub max_error: Option<f64>,
    pub accuracy_percent: Option<f64>,
    pub mape_count: usize,
}

impl AccuracyReport {
    pub fn empty() -> Self {
        Self {
            count: 0,
            rmse: None,
            mae: None,
            mape: None,
            max_error: None,
            accuracy_percent: None,
            mape_count: 0,
        }
    }

    /// Fold `(predicted, actual)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut count = 0usize;
        let mut sq_sum = 0.0;
        let mut abs_sum = 0.0;
        let mut max_error = 0.0f64;
        let mut pct_sum = 0.0;
        let mut mape_count = 0usize;

        for (predicted, actual) in pairs {
            let err = (actual - predicted).abs();
            count += 1;
            sq_sum += err * err;
            abs_sum += err;
            max_error = max_error.max(err);
            if actual != 0.0 {
                pct_sum += err / actual.abs();
                mape_count += 1;
            }
        }

        if count == 0 {
            return Self::empty();
        }

        let n = count as f64;
        let mape = (mape_count > 0).then(|| pct_sum / mape_count as f64 * 100.0);

        Self {
            count,
            rmse: Some((sq_sum / n).sqrt()),
            mae: Some(abs_sum / n),
            mape,
            max_error: Some(max_error),
            accuracy_percent: mape.map(|m| (100.0 - m).max(0.0)),
            mape_count,
        }
    }
}

/// Optional model/symbol filter for accuracy queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyFilter {
    pub model_name: Option<String>,
    pub symbol: Option<String>,
}

impl AccuracyFilter {
    pub fn model(name: impl Into<String>) -> Self {
        Self { model_name: Some(name.into()), symbol: None }
    }

    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self { model_name: None, symbol: Some(symbol.into()) }
    }

    pub fn matches(&self, model_name: &str, symbol: &str) -> bool {
        self.model_name.as_deref().map_or(true, |m| m == model_name)
            && self.symbol.as_deref().map_or(true, |s| normalize_symbol(s) == symbol)
    }
}

/// Ledger totals with per-model and per-symbol breakdowns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_entries: usize,
    pub resolved: usize,
    pub pending: usize,
    pub overall: AccuracyReport,
    pub by_model: BTreeMap<String, AccuracyReport>,
    pub by_symbol: BTreeMap<String, AccuracyReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.map_or(false, |a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_empty_report() {
        let report = AccuracyReport::from_pairs(Vec::new());
        assert_eq!(report, AccuracyReport::empty());
        assert_eq!(report.count, 0);
        assert!(report.rmse.is_none() && report.mae.is_none());
        assert!(report.mape.is_none() && report.max_error.is_none());
    }

    #[test]
    fn test_metric_definitions() {
        // errors 1, 2, 3 against actuals 10, 20, 30
        let report = AccuracyReport::from_pairs(vec![(11.0, 10.0), (18.0, 20.0), (33.0, 30.0)]);
        assert_eq!(report.count, 3);
        assert!(close(report.mae, 2.0));
        assert!(close(report.rmse, (14.0f64 / 3.0).sqrt()));
        assert!(close(report.mape, 10.0));
        assert!(close(report.accuracy_percent, 90.0));
        assert_eq!(report.max_error, Some(3.0));
    }

    #[test]
    fn test_zero_actual_excluded_from_mape_only() {
        let report = AccuracyReport::from_pairs(vec![(1.0, 0.0), (9.0, 10.0)]);
        assert_eq!(report.count, 2);
        assert_eq!(report.mape_count, 1);
        assert!(close(report.mae, 1.0));
        assert!(close(report.mape, 10.0));

        let all_zero = AccuracyReport::from_pairs(vec![(1.0, 0.0)]);
        assert_eq!(all_zero.count, 1);
        assert!(all_zero.mape.is_none());
        assert!(close(all_zero.rmse, 1.0));
    }

    #[test]
    fn test_order_invariance() {
        let pairs = vec![(1.5, 1.0), (2.0, 4.0), (7.25, 7.0), (0.1, -3.0), (100.0, 90.0)];
        let forward = AccuracyReport::from_pairs(pairs.clone());
        let reversed = AccuracyReport::from_pairs(pairs.into_iter().rev());

        assert_eq!(forward.count, reversed.count);
        assert!(close(forward.rmse, reversed.rmse.unwrap()));
        assert!(close(forward.mae, reversed.mae.unwrap()));
        assert!(close(forward.mape, reversed.mape.unwrap()));
        assert_eq!(forward.max_error, reversed.max_error);
    }

    #[test]
    fn test_filter() {
        assert!(AccuracyFilter::default().matches("lstm", "AAPL"));
        assert!(AccuracyFilter::model("lstm").matches("lstm", "TSLA"));
        assert!(!AccuracyFilter::symbol("AAPL").matches("lstm", "TSLA"));
        assert!(AccuracyFilter::symbol(" aapl").matches("lstm", "AAPL"));
    }
}
