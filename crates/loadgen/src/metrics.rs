//! Latency and fee aggregation with Prometheus exposition.
//!
//! The aggregator owns its own recorder instead of installing a global one,
//! so every controller renders only the series it recorded.

use std::{fmt, time::Duration};

use metrics::with_local_recorder;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusRecorder};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{constants::TX_DURATION_BUCKETS, state::Outcome};

/// Gauge: gas price in gwei, labelled with `type`.
pub const GAS_PRICE_GWEI: &str = "loadgen_gas_price_gwei";

/// Histogram: transaction duration in seconds, labelled with `type`.
pub const TX_DURATION_SECONDS: &str = "loadgen_tx_duration_seconds";

/// Counter: finished dispatch attempts, labelled with `outcome`.
pub const TRANSACTIONS_TOTAL: &str = "loadgen_transactions_total";

/// Gauge: slots currently running a dispatch.
pub const ACTIVE_SLOTS: &str = "loadgen_active_slots";

/// Gauge: requests waiting for a slot.
pub const PENDING_REQUESTS: &str = "loadgen_pending_requests";

/// Label key for the aggregation tag.
pub const LABEL_TYPE: &str = "type";

/// Label key for the attempt outcome.
pub const LABEL_OUTCOME: &str = "outcome";

const WEI_PER_GWEI: f64 = 1e9;

/// Aggregation tag attached to duration and gas price observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatTag {
    /// A single transaction.
    Current,
    /// Minimum over a batch.
    Min,
    /// Maximum over a batch.
    Max,
    /// Mean over a batch.
    Avg,
}

impl StatTag {
    /// Returns the label value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
        }
    }
}

/// One finished transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSample {
    /// Dispatch duration.
    pub duration: Duration,
    /// Gas price paid, in wei.
    pub gas_price: Option<u128>,
    /// When the sample was taken.
    pub at: Instant,
}

impl MetricSample {
    /// Creates a sample stamped now.
    pub fn new(duration: Duration, gas_price: Option<u128>) -> Self {
        Self { duration, gas_price, at: Instant::now() }
    }
}

/// Min, max and mean of a set of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread<T> {
    /// Smallest value.
    pub min: T,
    /// Largest value.
    pub max: T,
    /// Arithmetic mean.
    pub avg: T,
}

/// Statistics over the samples of one reporting window or batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    /// Number of samples.
    pub samples: usize,
    /// Duration spread.
    pub duration: Spread<Duration>,
    /// Gas price spread in gwei, if any sample carried one.
    pub gas_price_gwei: Option<Spread<f64>>,
}

impl WindowSummary {
    /// Summarises `samples`, returning `None` when empty.
    pub fn from_samples(samples: &[MetricSample]) -> Option<Self> {
        let count = u32::try_from(samples.len()).ok().filter(|n| *n > 0)?;

        let durations = samples.iter().map(|s| s.duration);
        let duration = Spread {
            min: durations.clone().min()?,
            max: durations.clone().max()?,
            avg: durations.sum::<Duration>() / count,
        };

        let prices: Vec<f64> =
            samples.iter().filter_map(|s| s.gas_price).map(|p| p as f64 / WEI_PER_GWEI).collect();
        let gas_price_gwei = (!prices.is_empty()).then(|| Spread {
            min: prices.iter().copied().fold(f64::INFINITY, f64::min),
            max: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg: prices.iter().sum::<f64>() / prices.len() as f64,
        });

        Some(Self { samples: samples.len(), duration, gas_price_gwei })
    }
}

/// Records per-transaction observations and exposes them for scraping.
pub struct MetricsAggregator {
    recorder: PrometheusRecorder,
    window: Mutex<Vec<MetricSample>>,
}

impl fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("window_samples", &self.window.lock().len())
            .finish_non_exhaustive()
    }
}

impl MetricsAggregator {
    /// Creates an aggregator with its own Prometheus recorder.
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(TX_DURATION_SECONDS.to_string()),
                TX_DURATION_BUCKETS,
            )?
            .build_recorder();

        let aggregator = Self { recorder, window: Mutex::new(Vec::new()) };
        aggregator.describe();
        Ok(aggregator)
    }

    fn describe(&self) {
        with_local_recorder(&self.recorder, || {
            metrics::describe_gauge!(GAS_PRICE_GWEI, "Gas price in gwei");
            metrics::describe_histogram!(
                TX_DURATION_SECONDS,
                metrics::Unit::Seconds,
                "Transaction duration from dispatch to confirmation"
            );
            metrics::describe_counter!(TRANSACTIONS_TOTAL, "Finished dispatch attempts");
            metrics::describe_gauge!(ACTIVE_SLOTS, "Slots currently running a dispatch");
            metrics::describe_gauge!(PENDING_REQUESTS, "Requests waiting for a free slot");
        });
    }

    /// Records a transaction duration under `tag`.
    pub fn record_duration(&self, duration: Duration, tag: StatTag) {
        with_local_recorder(&self.recorder, || {
            metrics::histogram!(TX_DURATION_SECONDS, LABEL_TYPE => tag.as_str())
                .record(duration.as_secs_f64());
        });
    }

    /// Records a gas price, given in wei, under `tag`.
    pub fn record_gas_price(&self, price_wei: u128, tag: StatTag) {
        self.record_gas_price_gwei(price_wei as f64 / WEI_PER_GWEI, tag);
    }

    fn record_gas_price_gwei(&self, gwei: f64, tag: StatTag) {
        with_local_recorder(&self.recorder, || {
            metrics::gauge!(GAS_PRICE_GWEI, LABEL_TYPE => tag.as_str()).set(gwei);
        });
    }

    /// Records a finished transaction in the window model.
    ///
    /// Publishes the sample under the `current` tag and keeps it for the
    /// rolling window statistics.
    pub fn observe(&self, sample: MetricSample) {
        self.record_duration(sample.duration, StatTag::Current);
        if let Some(price) = sample.gas_price {
            self.record_gas_price(price, StatTag::Current);
        }
        self.window.lock().push(sample);
    }

    /// Records the samples of one batch under the `min`, `max` and `avg` tags.
    pub fn record_batch(&self, samples: &[MetricSample]) -> Option<WindowSummary> {
        let summary = WindowSummary::from_samples(samples)?;
        for (tag, duration) in [
            (StatTag::Min, summary.duration.min),
            (StatTag::Max, summary.duration.max),
            (StatTag::Avg, summary.duration.avg),
        ] {
            self.record_duration(duration, tag);
        }
        if let Some(gas) = summary.gas_price_gwei {
            for (tag, gwei) in
                [(StatTag::Min, gas.min), (StatTag::Max, gas.max), (StatTag::Avg, gas.avg)]
            {
                self.record_gas_price_gwei(gwei, tag);
            }
        }
        self.window.lock().extend_from_slice(samples);
        Some(summary)
    }

    /// Counts a finished attempt.
    pub fn record_outcome(&self, outcome: Outcome) {
        with_local_recorder(&self.recorder, || {
            metrics::counter!(TRANSACTIONS_TOTAL, LABEL_OUTCOME => outcome.as_str()).increment(1);
        });
    }

    /// Publishes the slot occupancy.
    pub fn set_occupancy(&self, active: usize, pending: usize) {
        with_local_recorder(&self.recorder, || {
            metrics::gauge!(ACTIVE_SLOTS).set(active as f64);
            metrics::gauge!(PENDING_REQUESTS).set(pending as f64);
        });
    }

    /// Takes the samples collected since the last call and summarises them.
    pub fn drain_window(&self) -> Option<WindowSummary> {
        let samples = std::mem::take(&mut *self.window.lock());
        WindowSummary::from_samples(&samples)
    }

    /// Renders every series in the Prometheus text format.
    pub fn render(&self) -> String {
        self.recorder.handle().render()
    }
}
