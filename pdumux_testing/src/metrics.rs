//! Local metrics capture.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Creates a debugging recorder and snapshotter for metrics testing.
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// One counter reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterSample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: u64,
}

/// Read every counter recorded so far.
#[must_use]
pub fn counters(snapshotter: &Snapshotter) -> Vec<CounterSample> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(key, _, _, value)| match value {
            DebugValue::Counter(value) => Some(CounterSample {
                name: key.key().name().to_owned(),
                labels: key
                    .key()
                    .labels()
                    .map(|l| (l.key().to_owned(), l.value().to_owned()))
                    .collect(),
                value,
            }),
            _ => None,
        })
        .collect()
}

/// Sum of every counter named `name`, restricted to those carrying `label`.
#[must_use]
pub fn counter_total(samples: &[CounterSample], name: &str, label: Option<(&str, &str)>) -> u64 {
    samples
        .iter()
        .filter(|s| {
            s.name == name
                && label.is_none_or(|(k, v)| s.labels.iter().any(|(lk, lv)| lk == k && lv == v))
        })
        .map(|s| s.value)
        .sum()
}
