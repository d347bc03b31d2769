//! Aggregation Buffer
//!
//! Raw environment samples accumulate per metric key between ticks. Each tick
//! reduces every non-empty buffer to its arithmetic mean and appends one point
//! to that metric's bounded series.
//!
//! A metric that received no samples during an interval gets no point for it,
//! so series timestamps are not evenly spaced when a sensor stalls.
//!
//! The ingestion loop (`record`) and the ticker (`tick`) share one mutex, so a
//! tick never observes a half-appended buffer.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One averaged point of a metric series
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct SeriesPoint {
    /// Tick time, Unix milliseconds
    pub timestamp: i64,
    pub value: f64,
}

/// Bounded FIFO of averaged points; the oldest point is evicted first
#[derive(Debug, Clone)]
pub struct MetricSeries {
    points: VecDeque<SeriesPoint>,
    capacity: usize,
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, point: SeriesPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<SeriesPoint> {
        self.points.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<SeriesPoint> {
        self.points.iter().copied().collect()
    }
}

/// Aggregation settings
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Time between ticks
    pub period: Duration,
    /// Maximum points kept per series
    pub capacity: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            // 12 hours at one point per minute
            capacity: 720,
        }
    }
}

/// Sample buffers and series, without any locking
#[derive(Debug)]
pub struct AggregationBuffer {
    samples: HashMap<String, Vec<f64>>,
    series: HashMap<String, MetricSeries>,
    capacity: usize,
}

impl AggregationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: HashMap::new(),
            series: HashMap::new(),
            capacity,
        }
    }

    /// Buffer one raw sample
    pub fn record(&mut self, key: &str, value: f64) {
        self.samples.entry(key.to_string()).or_default().push(value);
    }

    /// Number of samples waiting for the next tick
    pub fn pending(&self, key: &str) -> usize {
        self.samples.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Reduce every buffer to one point and clear all buffers
    ///
    /// Returns the points appended, sorted by metric key.
    pub fn tick(&mut self, timestamp: i64) -> Vec<(String, SeriesPoint)> {
        let drained = std::mem::take(&mut self.samples);
        let mut emitted = Vec::with_capacity(drained.len());

        for (key, values) in drained {
            if values.is_empty() {
                continue;
            }

            // Running mean; each term is scaled before adding so finite
            // samples never overflow
            let mean = values.iter().enumerate().fold(0.0, |mean, (i, v)| {
                let n = (i + 1) as f64;
                mean + v / n - mean / n
            });
            let point = SeriesPoint {
                timestamp,
                value: mean,
            };

            let capacity = self.capacity;
            self.series
                .entry(key.clone())
                .or_insert_with(|| MetricSeries::new(capacity))
                .push(point);

            emitted.push((key, point));
        }

        emitted.sort_by(|a, b| a.0.cmp(&b.0));
        emitted
    }

    pub fn series(&self, key: &str) -> Option<&MetricSeries> {
        self.series.get(key)
    }

    /// All metric keys that have at least one point, sorted
    pub fn metric_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.series.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Summary of one series, for listings
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub metric: String,
    pub points: usize,
    pub latest: Option<SeriesPoint>,
}

/// Key under which a device property is aggregated
pub fn metric_key(device_id: &str, property: &str) -> String {
    format!("{}/{}", device_id, property)
}

/// Shared, lock-protected aggregation buffer with a background ticker
pub struct Aggregator {
    inner: Mutex<AggregationBuffer>,
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            inner: Mutex::new(AggregationBuffer::new(config.capacity)),
            config,
        }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub async fn record(&self, key: &str, value: f64) {
        self.inner.lock().await.record(key, value);
    }

    pub async fn tick(&self, timestamp: i64) -> Vec<(String, SeriesPoint)> {
        self.inner.lock().await.tick(timestamp)
    }

    /// Copy of a series' points, oldest first
    pub async fn series(&self, key: &str) -> Option<Vec<SeriesPoint>> {
        self.inner.lock().await.series(key).map(MetricSeries::to_vec)
    }

    pub async fn summaries(&self) -> Vec<SeriesSummary> {
        let inner = self.inner.lock().await;
        inner
            .metric_keys()
            .into_iter()
            .filter_map(|key| {
                inner.series(&key).map(|s| SeriesSummary {
                    points: s.len(),
                    latest: s.latest(),
                    metric: key,
                })
            })
            .collect()
    }

    /// Start the periodic tick
    ///
    /// Spawns a tokio task that reduces the buffers once per period.
    pub fn start_background_tick(self: Arc<Self>) -> JoinHandle<()> {
        tracing::info!(
            period_secs = self.config.period.as_secs(),
            capacity = self.config.capacity,
            "Starting aggregation ticker"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let emitted = self.tick(Utc::now().timestamp_millis()).await;
                tracing::debug!(metrics = emitted.len(), "Aggregation tick");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AggregationConfig::default();
        assert_eq!(config.period, Duration::from_secs(60));
        assert_eq!(config.capacity, 720);
    }

    #[test]
    fn test_tick_averages_samples() {
        let mut buffer = AggregationBuffer::new(720);
        buffer.record("M5Stack2/scd40_co2", 10.0);
        buffer.record("M5Stack2/scd40_co2", 20.0);
        buffer.record("M5Stack2/scd40_co2", 30.0);

        let emitted = buffer.tick(1000);

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].1, SeriesPoint { timestamp: 1000, value: 20.0 });

        let series = buffer.series("M5Stack2/scd40_co2").unwrap();
        assert_eq!(series.to_vec(), vec![SeriesPoint { timestamp: 1000, value: 20.0 }]);
    }

    #[test]
    fn test_mean_of_huge_samples_stays_finite() {
        let mut buffer = AggregationBuffer::new(720);
        buffer.record("flux", 1e308);
        buffer.record("flux", 1e308);
        buffer.record("flux", -1e308);

        let emitted = buffer.tick(1000);
        let value = emitted[0].1.value;
        assert!(value.is_finite());
        assert!((value - 1e308 / 3.0).abs() < 1e295);

        let json = serde_json::to_value(emitted[0].1).unwrap();
        assert!(json["value"].is_f64());
    }

    #[test]
    fn test_silent_interval_leaves_gap() {
        let mut buffer = AggregationBuffer::new(720);
        buffer.record("co2", 400.0);
        buffer.tick(1000);

        // Nothing recorded before the next tick
        let emitted = buffer.tick(2000);
        assert!(emitted.is_empty());
        assert_eq!(buffer.series("co2").unwrap().len(), 1);

        buffer.record("co2", 500.0);
        buffer.tick(3000);

        let timestamps: Vec<_> = buffer.series("co2").unwrap().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 3000]);
    }

    #[test]
    fn test_tick_clears_buffers() {
        let mut buffer = AggregationBuffer::new(720);
        buffer.record("temp", 21.0);
        assert_eq!(buffer.pending("temp"), 1);

        buffer.tick(1000);
        assert_eq!(buffer.pending("temp"), 0);

        buffer.record("temp", 25.0);
        let emitted = buffer.tick(2000);
        assert_eq!(emitted[0].1.value, 25.0);
    }

    #[test]
    fn test_tick_is_per_metric() {
        let mut buffer = AggregationBuffer::new(720);
        buffer.record("b", 2.0);
        buffer.record("a", 1.0);
        buffer.record("a", 3.0);

        let emitted = buffer.tick(1000);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].0, "a");
        assert_eq!(emitted[0].1.value, 2.0);
        assert_eq!(emitted[1].0, "b");
        assert_eq!(emitted[1].1.value, 2.0);
        assert_eq!(buffer.metric_keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_series_is_bounded_fifo() {
        let mut series = MetricSeries::new(720);
        for i in 0..1000 {
            series.push(SeriesPoint {
                timestamp: i,
                value: i as f64,
            });
            assert!(series.len() <= 720);
        }

        assert_eq!(series.len(), 720);
        assert_eq!(series.iter().next().unwrap().timestamp, 280);
        assert_eq!(series.latest().unwrap().timestamp, 999);
    }

    #[test]
    fn test_buffer_respects_capacity() {
        let mut buffer = AggregationBuffer::new(3);
        for ts in 0..5 {
            buffer.record("co2", ts as f64);
            buffer.tick(ts);
        }

        let values: Vec<_> = buffer.series("co2").unwrap().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_metric_key() {
        assert_eq!(metric_key("M5Stack2", "scd40_co2"), "M5Stack2/scd40_co2");
    }

    #[tokio::test]
    async fn test_aggregator_shared_access() {
        let aggregator = Arc::new(Aggregator::new(AggregationConfig::default()));

        let mut handles = Vec::new();
        for i in 0..10 {
            let agg = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                agg.record("co2", i as f64).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let emitted = aggregator.tick(1000).await;
        assert_eq!(emitted.len(), 1);
        assert!((emitted[0].1.value - 4.5).abs() < 1e-9);

        let summaries = aggregator.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].points, 1);
        assert_eq!(aggregator.series("missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tick() {
        let aggregator = Arc::new(Aggregator::new(AggregationConfig {
            period: Duration::from_secs(60),
            capacity: 720,
        }));
        let handle = Arc::clone(&aggregator).start_background_tick();

        aggregator.record("co2", 400.0).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        let series = aggregator.series("co2").await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 400.0);

        handle.abort();
    }
}
