use crate::error::{EplabError, Result};
use std::fmt;

pub const TOP_K: usize = 5;

const RULE: &str = "-------------------------------------------";

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    /// Softmax probability in [0, 1].
    pub confidence: f32,
}

/// Ranked predictions, most confident first.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    predictions: Vec<Prediction>,
}

impl PredictionResult {
    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Top Predictions:")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:<32} {:>10}", "Label", "Confidence")?;
        writeln!(f, "{RULE}")?;
        for p in self.predictions.iter() {
            writeln!(f, "{:<32} {:>10}", p.label, percent(p.confidence))?;
        }
        writeln!(f, "{RULE}")
    }
}

fn percent(confidence: f32) -> String {
    format!("{:.2}%", confidence * 100.)
}

/// Numerically stable softmax: the largest logit is subtracted before
/// exponentiating.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

#[derive(Debug, Clone)]
pub struct ResultFormatter {
    top_k: usize,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        ResultFormatter { top_k: TOP_K }
    }
}

impl ResultFormatter {
    pub fn with_top_k(top_k: usize) -> Self {
        ResultFormatter { top_k }
    }

    pub fn format(&self, logits: &[f32], labels: &[String]) -> Result<PredictionResult> {
        if labels.len() != logits.len() {
            return Err(EplabError::LabelCountMismatch {
                labels: labels.len(),
                outputs: logits.len(),
            });
        }
        if logits.is_empty() {
            return Err(EplabError::Inference {
                reason: "model produced an empty output".to_string(),
            });
        }

        let probs = softmax(logits);

        // sort_by is stable: equal probabilities keep ascending index order
        let mut ranked: Vec<usize> = (0..probs.len()).collect();
        ranked.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

        let predictions = ranked
            .into_iter()
            .take(self.top_k)
            .map(|index| Prediction {
                index,
                label: labels[index].clone(),
                confidence: probs[index],
            })
            .collect();

        Ok(PredictionResult { predictions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{i}")).collect()
    }

    #[test]
    fn test_cat_dog_bird() {
        let labels = vec!["cat".to_string(), "dog".to_string(), "bird".to_string()];
        let result = ResultFormatter::default()
            .format(&[1.0, 3.0, 2.0], &labels)
            .unwrap();

        let names: Vec<&str> = result.predictions().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(names, ["dog", "bird", "cat"]);

        let top = result.top().unwrap();
        assert_eq!(top.index, 1);
        assert!((top.confidence - 0.6652).abs() < 1e-4);
    }

    #[test]
    fn test_returns_at_most_five_sorted() {
        for n in [1, 3, 5, 6, 100] {
            let logits: Vec<f32> = (0..n).map(|i| ((i * 7919) % 113) as f32 / 10.).collect();
            let result = ResultFormatter::default().format(&logits, &labels(n)).unwrap();

            assert_eq!(result.len(), n.min(5));
            for pair in result.predictions().windows(2) {
                assert!(pair[0].confidence >= pair[1].confidence);
            }

            let total: f32 = softmax(&logits).iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "n={n} sum={total}");
        }
    }

    #[test]
    fn test_shift_invariance() {
        let logits = [0.5, -1.25, 4.0, 2.0, 2.0, -3.0, 0.0];
        let shifted: Vec<f32> = logits.iter().map(|l| l + 250.).collect();
        let formatter = ResultFormatter::default();

        let a = formatter.format(&logits, &labels(7)).unwrap();
        let b = formatter.format(&shifted, &labels(7)).unwrap();

        assert_eq!(a.len(), b.len());
        for (x, y) in a.predictions().iter().zip(b.predictions()) {
            assert_eq!(x.index, y.index);
            assert!((x.confidence - y.confidence).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ties_keep_index_order() {
        let result = ResultFormatter::default()
            .format(&[1.0, 2.0, 2.0, 1.0, 2.0, 0.0], &labels(6))
            .unwrap();

        let order: Vec<usize> = result.predictions().iter().map(|p| p.index).collect();
        assert_eq!(order, [1, 2, 4, 0, 3]);
    }

    #[test]
    fn test_large_logits_do_not_overflow() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert_eq!(probs, [0.5, 0.5]);
    }

    #[test]
    fn test_label_count_mismatch() {
        let err = ResultFormatter::default()
            .format(&[0.1, 0.2, 0.3, 0.4], &labels(3))
            .unwrap_err();

        assert!(matches!(
            err,
            EplabError::LabelCountMismatch {
                labels: 3,
                outputs: 4
            }
        ));
    }

    #[test]
    fn test_report_layout() {
        let labels = vec!["cat".to_string(), "dog".to_string(), "bird".to_string()];
        let report = ResultFormatter::default()
            .format(&[1.0, 3.0, 2.0], &labels)
            .unwrap()
            .to_string();

        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Top Predictions:");
        assert_eq!(lines[1], RULE);
        assert_eq!(lines[2], format!("{:<32} {:>10}", "Label", "Confidence"));
        assert_eq!(lines[4], format!("{:<32} {:>10}", "dog", "66.52%"));
        assert_eq!(lines[5], format!("{:<32} {:>10}", "bird", "24.47%"));
        assert_eq!(lines[6], format!("{:<32} {:>10}", "cat", "9.00%"));
        assert_eq!(lines[7], RULE);
    }
}
