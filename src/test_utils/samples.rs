use std::sync::Arc;

use crate::constants::METRIC_NAME_LABEL;
use crate::Labels;
use crate::Sample;

/// Label map with `name` as metric name and the given extra pairs.
pub(crate) fn labels(
    name: &str,
    pairs: &[(&str, &str)],
) -> Arc<Labels> {
    let mut map = Labels::new();
    map.insert(METRIC_NAME_LABEL.to_string(), name.to_string());
    for (k, v) in pairs {
        map.insert(k.to_string(), v.to_string());
    }
    Arc::new(map)
}

pub(crate) fn sample(
    name: &str,
    pairs: &[(&str, &str)],
    value: f64,
    timestamp_ms: i64,
) -> Sample {
    Sample::new(labels(name, pairs), value, timestamp_ms)
}

/// `count` samples of one series, one second apart.
pub(crate) fn series(
    name: &str,
    pairs: &[(&str, &str)],
    count: usize,
) -> Vec<Sample> {
    let metric = labels(name, pairs);
    (0..count)
        .map(|i| Sample::new(metric.clone(), i as f64, 1_700_000_000_000 + (i as i64) * 1000))
        .collect()
}
