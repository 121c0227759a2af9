use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A metric as sent by a client, either a final value or it's per-epoch history.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMetric {
    Value(f64),
    History(Vec<f64>),
}

/// Named scalar metrics (e.g. `loss`, `accuracy`) attached to a submission.
///
/// They are recorded for observability only and never take part in the aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SubmissionMetrics(BTreeMap<String, f64>);

impl SubmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value of the metric `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Computes the per-name mean across many metric records.
    ///
    /// A name only averages over the records that contain it.
    ///
    /// # Arguments
    /// * `records` - The metrics to average.
    ///
    /// # Returns
    /// The averaged metrics.
    pub fn mean<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a SubmissionMetrics>,
    {
        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

        for (name, value) in records.into_iter().flat_map(|m| m.iter()) {
            let (sum, count) = sums.entry(name).or_default();
            *sum += value;
            *count += 1;
        }

        sums.into_iter()
            .map(|(name, (sum, count))| (name.to_string(), sum / count as f64))
            .collect()
    }
}

impl FromIterator<(String, f64)> for SubmissionMetrics {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for SubmissionMetrics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawMetric>::deserialize(deserializer)?;
        let metrics = raw
            .into_iter()
            .filter_map(|(name, metric)| match metric {
                RawMetric::Value(value) => Some((name, value)),
                RawMetric::History(history) => history.last().map(|&last| (name, last)),
            })
            .collect();

        Ok(metrics)
    }
}
