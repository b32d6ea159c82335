use serde::{Deserialize, Serialize};

use super::artifacts::{decode_json, Artifact};
use super::scaler::FeatureScaler;
use super::{Forecaster, ModelKind};
use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn validate(&self, num_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } if !value.is_finite() => {
                    return Err(format!("leaf {} is not finite", i));
                }
                TreeNode::Leaf { .. } => {}
                TreeNode::Split { feature, threshold, left, right } => {
                    if *feature >= num_features {
                        return Err(format!("node {} splits on feature {} of {}", i, feature, num_features));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} threshold is NaN", i));
                    }
                    // Children after their parent: traversal always terminates.
                    for child in [*left, *right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", i, child));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Additive regression tree ensemble: `base_score + Σ leaf(tree, x)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub num_features: usize,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn predict_raw(&self, features: &[f64]) -> std::result::Result<f64, String> {
        if features.len() != self.num_features {
            return Err(format!(
                "model expects {} features, got {}",
                self.num_features,
                features.len()
            ));
        }
        let value = self.base_score + self.trees.iter().map(|t| t.leaf_value(features)).sum::<f64>();
        if value.is_finite() {
            Ok(value)
        } else {
            Err("ensemble output is not finite".to_string())
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.num_features == 0 {
            return Err("num_features must be at least 1".to_string());
        }
        if !self.base_score.is_finite() {
            return Err("base_score is not finite".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.num_features).map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

impl Artifact for TreeEnsemble {
    const LABEL: &'static str = "tree ensemble";

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let model: TreeEnsemble = decode_json(bytes)?;
        model.validate()?;
        Ok(model)
    }
}

/// Boosted-tree forecaster over a feature vector, scaled first when a scaler is loaded.
#[derive(Debug, Clone)]
pub struct BoostedTreeForecaster {
    model: TreeEnsemble,
    scaler: Option<FeatureScaler>,
}

impl BoostedTreeForecaster {
    pub fn new(model: TreeEnsemble, scaler: Option<FeatureScaler>) -> Self {
        Self { model, scaler }
    }

    pub fn is_scaled(&self) -> bool {
        self.scaler.is_some()
    }
}

impl Forecaster for BoostedTreeForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::LightGbm
    }

    fn forecast(&self, input: &[f64], _horizon: usize) -> Result<f64> {
        let fail = |reason: String| ForecastError::prediction(ModelKind::LightGbm.as_str(), reason);

        let scaled;
        let features = match &self.scaler {
            Some(scaler) => {
                scaled = scaler.transform(input).map_err(fail)?;
                scaled.as_slice()
            }
            None => input,
        };

        self.model.predict_raw(features).map_err(fail)
    }
}
