use serde::{Deserialize, Serialize};

/// How a region's raw samples are folded into one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Median of every sample collected so far
    #[default]
    Median,
    /// Lower of the two most recent samples
    Minimum,
    /// Most recent sample only
    Latest,
}

impl Aggregation {
    /// Returns 0 when there are no samples.
    pub fn fold(self, samples: &[u64]) -> f64 {
        match self {
            Aggregation::Median => {
                let values: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
                median(&values)
            }
            Aggregation::Minimum => samples
                .iter()
                .rev()
                .take(2)
                .min()
                .map(|&s| s as f64)
                .unwrap_or(0.0),
            Aggregation::Latest => samples.last().map(|&s| s as f64).unwrap_or(0.0),
        }
    }
}

/// Middle value after a numeric sort; mean of the two middle values for even input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let half = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[half]
    } else {
        (sorted[half - 1] + sorted[half]) / 2.0
    }
}
