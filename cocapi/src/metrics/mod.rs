//! Per-call metrics over a sliding window.
//!
//! The [`MetricsRecorder`] keeps the most recent `metrics_window_size`
//! [`CallRecord`]s in a ring buffer. Every figure in a [`MetricsSummary`] is
//! computed over that window only, so old behaviour ages out as new calls
//! arrive. Lifetime totals are not kept here; enable the `metrics` feature
//! to export them through the `metrics` facade instead.
//!
//! Endpoints are grouped by a normalised form of their path: player and
//! clan tags become `%23{tag}` and numeric segments become `{id}`.

mod facade;
mod insights;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;

use crate::error::{ApiError, ErrorKind};

pub(crate) use facade::{record_call, record_rate_limit_wait, record_retry};
pub use insights::{
    FREQUENT_ERROR_SHARE, HIGH_CACHE_HIT_RATE, Insight, InsightCategory, LOW_CACHE_HIT_RATE,
    SLOW_AVERAGE_RESPONSE, SUCCESS_RATE_CRITICAL, SUCCESS_RATE_WARNING, Severity,
};

static TAG_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%23[0-9A-Za-z]+$").expect("valid tag regex"));
static ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid id regex"));

/// Collapses tags and numeric ids so calls to the same route group together.
///
/// ```
/// use cocapi::metrics::normalize_endpoint;
///
/// assert_eq!(normalize_endpoint("/clans/%232PP/members"), "/clans/%23{tag}/members");
/// assert_eq!(normalize_endpoint("/locations/32000006/rankings/clans"), "/locations/{id}/rankings/clans");
/// ```
pub fn normalize_endpoint(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    path.split('/')
        .map(|segment| {
            if TAG_SEGMENT.is_match(segment) {
                "%23{tag}"
            } else if ID_SEGMENT.is_match(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Final outcome of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Fresh response from the API.
    Success,
    /// The call failed.
    Error,
    /// Served from the cache.
    CacheHit,
}

impl CallOutcome {
    /// Returns the outcome as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Error => "error",
            CallOutcome::CacheHit => "cache_hit",
        }
    }
}

/// One entry of the metrics window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// Normalised endpoint path.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Wall time of the whole call, retries included.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Final outcome.
    pub outcome: CallOutcome,
    /// Status of the last response, if one was received.
    pub status: Option<u16>,
    /// Error classification for failed calls.
    pub error_kind: Option<ErrorKind>,
    /// Retries performed before the outcome.
    pub retries: u32,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    fn new(endpoint: &str, method: &str, duration: Duration, outcome: CallOutcome) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            method: method.to_owned(),
            duration,
            outcome,
            status: None,
            error_kind: None,
            retries: 0,
            timestamp: Utc::now(),
        }
    }

    /// A fresh successful response.
    pub fn success(endpoint: &str, method: &str, duration: Duration, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(endpoint, method, duration, CallOutcome::Success)
        }
    }

    /// A response served from the cache.
    pub fn cache_hit(endpoint: &str, method: &str, duration: Duration) -> Self {
        Self::new(endpoint, method, duration, CallOutcome::CacheHit)
    }

    /// A failed call.
    pub fn error(endpoint: &str, method: &str, duration: Duration, error: &ApiError) -> Self {
        Self {
            status: error.status(),
            error_kind: Some(error.kind()),
            ..Self::new(endpoint, method, duration, CallOutcome::Error)
        }
    }

    /// Sets the number of retries performed.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Response time distribution in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Percentiles {
    /// Median.
    pub p50: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Fastest call.
    pub min: f64,
    /// Slowest call.
    pub max: f64,
}

impl Percentiles {
    /// Linear interpolation between closest ranks. `sorted` must be ascending.
    fn from_sorted(sorted: &[f64]) -> Self {
        let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
            return Self::default();
        };
        let at = |p: f64| {
            let rank = (sorted.len() - 1) as f64 * p;
            let lower = rank.floor() as usize;
            let fraction = rank - lower as f64;
            let value = match sorted.get(lower + 1) {
                Some(upper) => sorted[lower] * (1.0 - fraction) + upper * fraction,
                None => sorted[lower],
            };
            round(value, 3)
        };
        Self {
            p50: at(0.50),
            p75: at(0.75),
            p90: at(0.90),
            p95: at(0.95),
            p99: at(0.99),
            min: round(min, 3),
            max: round(max, 3),
        }
    }
}

/// Per-endpoint aggregates inside a [`MetricsSummary`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointMetrics {
    /// Calls in the window.
    pub count: usize,
    /// Mean duration in seconds.
    pub avg_response_time: f64,
    /// Failed calls.
    pub errors: usize,
    /// Calls served from the cache.
    pub cache_hits: usize,
}

/// Start and end of the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timespan {
    /// Oldest record.
    pub start: DateTime<Utc>,
    /// Newest record.
    pub end: DateTime<Utc>,
    /// Seconds between the two.
    pub duration_seconds: f64,
}

/// Aggregates over the current window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Records in the window.
    pub total_requests: usize,
    /// Percentage of successes and cache hits.
    pub success_rate: f64,
    /// Percentage of failures.
    pub error_rate: f64,
    /// Percentage of cache hits.
    pub cache_hit_rate: f64,
    /// Mean duration in seconds.
    pub avg_response_time: f64,
    /// Duration distribution.
    pub response_time_percentiles: Percentiles,
    /// Aggregates keyed by normalised endpoint.
    pub endpoint_metrics: BTreeMap<String, EndpointMetrics>,
    /// Up to five endpoints with the most calls.
    pub most_used_endpoints: Vec<(String, usize)>,
    /// Calls per response status.
    pub status_code_breakdown: BTreeMap<u16, usize>,
    /// Failures per error kind.
    pub error_breakdown: BTreeMap<ErrorKind, usize>,
    /// Heuristic findings derived from the figures above.
    pub performance_insights: Vec<Insight>,
    /// First and last record time, absent for an empty window.
    pub timespan: Option<Timespan>,
}

/// Aggregates for a single endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSummary {
    /// Endpoint as requested.
    pub endpoint: String,
    /// Normalised form used for grouping.
    pub formatted_endpoint: String,
    /// Calls in the window.
    pub total_requests: usize,
    /// Percentage of successes and cache hits.
    pub success_rate: f64,
    /// Percentage of cache hits.
    pub cache_hit_rate: f64,
    /// Mean duration in seconds.
    pub avg_response_time: f64,
    /// Duration distribution.
    pub response_time_percentiles: Percentiles,
}

/// Bounded window of call records.
#[derive(Debug)]
pub struct MetricsRecorder {
    enabled: AtomicBool,
    capacity: usize,
    window: Mutex<VecDeque<CallRecord>>,
}

impl MetricsRecorder {
    /// Creates an enabled recorder keeping at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            enabled: AtomicBool::new(true),
            capacity,
            window: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    /// Starts accepting records.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Stops accepting records. The window is kept.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Whether records are accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Maximum records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently held.
    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.lock().is_empty()
    }

    /// Appends a record, evicting the oldest once full. Ignored when disabled.
    pub fn record(&self, record: CallRecord) {
        if !self.is_enabled() {
            return;
        }
        let mut window = self.window.lock();
        while window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(record);
    }

    /// Copy of the window, oldest first.
    pub fn records(&self) -> Vec<CallRecord> {
        self.window.lock().iter().cloned().collect()
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.window.lock().clear();
    }

    /// Aggregates over the current window.
    pub fn summary(&self) -> MetricsSummary {
        let records = self.records();
        if records.is_empty() {
            return MetricsSummary::default();
        }
        let total = records.len();
        let stats = Rates::of(records.iter());

        let mut endpoint_metrics: BTreeMap<String, EndpointMetrics> = BTreeMap::new();
        let mut status_code_breakdown = BTreeMap::new();
        let mut error_breakdown = BTreeMap::new();
        for record in &records {
            let entry = endpoint_metrics.entry(record.endpoint.clone()).or_default();
            entry.count += 1;
            entry.avg_response_time += record.duration.as_secs_f64();
            match record.outcome {
                CallOutcome::Error => entry.errors += 1,
                CallOutcome::CacheHit => entry.cache_hits += 1,
                CallOutcome::Success => {}
            }
            if let Some(status) = record.status {
                *status_code_breakdown.entry(status).or_insert(0) += 1;
            }
            if let Some(kind) = record.error_kind {
                *error_breakdown.entry(kind).or_insert(0) += 1;
            }
        }
        for metrics in endpoint_metrics.values_mut() {
            metrics.avg_response_time = round(metrics.avg_response_time / metrics.count as f64, 3);
        }

        let mut most_used_endpoints: Vec<_> = endpoint_metrics
            .iter()
            .map(|(endpoint, metrics)| (endpoint.clone(), metrics.count))
            .collect();
        most_used_endpoints.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_used_endpoints.truncate(5);

        let timespan = timespan(&records);
        let mut summary = MetricsSummary {
            total_requests: total,
            success_rate: stats.success_rate,
            error_rate: stats.error_rate,
            cache_hit_rate: stats.cache_hit_rate,
            avg_response_time: stats.avg_response_time,
            response_time_percentiles: stats.percentiles,
            endpoint_metrics,
            most_used_endpoints,
            status_code_breakdown,
            error_breakdown,
            performance_insights: Vec::new(),
            timespan,
        };
        summary.performance_insights = insights::analyze(&summary);
        summary
    }

    /// Aggregates for one endpoint, `None` when it has no records.
    pub fn endpoint_summary(&self, endpoint: &str) -> Option<EndpointSummary> {
        let formatted_endpoint = normalize_endpoint(endpoint);
        let records: Vec<_> = self
            .records()
            .into_iter()
            .filter(|record| record.endpoint == formatted_endpoint)
            .collect();
        if records.is_empty() {
            return None;
        }
        let stats = Rates::of(records.iter());
        Some(EndpointSummary {
            endpoint: endpoint.to_owned(),
            formatted_endpoint,
            total_requests: records.len(),
            success_rate: stats.success_rate,
            cache_hit_rate: stats.cache_hit_rate,
            avg_response_time: stats.avg_response_time,
            response_time_percentiles: stats.percentiles,
        })
    }

    /// Up to `limit` failed calls, newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<CallRecord> {
        self.window
            .lock()
            .iter()
            .rev()
            .filter(|record| record.outcome == CallOutcome::Error)
            .take(limit)
            .cloned()
            .collect()
    }

    /// The window as CSV, oldest first, header included.
    pub fn export_csv(&self) -> String {
        let mut out =
            String::from("endpoint,method,status_code,response_time,timestamp,outcome,error_type\n");
        for record in self.window.lock().iter() {
            let _ = writeln!(
                out,
                "{},{},{},{:.6},{},{},{}",
                record.endpoint,
                record.method,
                record.status.map(|s| s.to_string()).unwrap_or_default(),
                record.duration.as_secs_f64(),
                record.timestamp.to_rfc3339(),
                record.outcome.as_str(),
                record.error_kind.map(|k| k.as_str()).unwrap_or_default(),
            );
        }
        out
    }
}

struct Rates {
    success_rate: f64,
    error_rate: f64,
    cache_hit_rate: f64,
    avg_response_time: f64,
    percentiles: Percentiles,
}

impl Rates {
    fn of<'a>(records: impl Iterator<Item = &'a CallRecord>) -> Self {
        let mut counts: HashMap<CallOutcome, usize> = HashMap::new();
        let mut durations = Vec::new();
        for record in records {
            *counts.entry(record.outcome).or_insert(0) += 1;
            durations.push(record.duration.as_secs_f64());
        }
        let total = durations.len().max(1) as f64;
        let count = |outcome| counts.get(&outcome).copied().unwrap_or(0) as f64;
        let successes = count(CallOutcome::Success) + count(CallOutcome::CacheHit);
        let avg = durations.iter().sum::<f64>() / total;
        durations.sort_by(f64::total_cmp);
        Self {
            success_rate: round(successes / total * 100.0, 2),
            error_rate: round(count(CallOutcome::Error) / total * 100.0, 2),
            cache_hit_rate: round(count(CallOutcome::CacheHit) / total * 100.0, 2),
            avg_response_time: round(avg, 3),
            percentiles: Percentiles::from_sorted(&durations),
        }
    }
}

fn timespan(records: &[CallRecord]) -> Option<Timespan> {
    let start = records.iter().map(|r| r.timestamp).min()?;
    let end = records.iter().map(|r| r.timestamp).max()?;
    let duration_seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    Some(Timespan {
        start,
        end,
        duration_seconds,
    })
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
