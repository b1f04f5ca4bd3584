//! Heuristic findings over a [`MetricsSummary`].
//!
//! Thresholds are fixed constants and cannot be configured.

use std::time::Duration;

use serde::Serialize;

use super::MetricsSummary;

/// Cache hit rate (percent) below which caching is reported as ineffective.
pub const LOW_CACHE_HIT_RATE: f64 = 30.0;
/// Cache hit rate (percent) above which caching is reported as excellent.
pub const HIGH_CACHE_HIT_RATE: f64 = 80.0;
/// Success rate (percent) below which reliability is flagged.
pub const SUCCESS_RATE_WARNING: f64 = 95.0;
/// Success rate (percent) below which the reliability finding is high severity.
pub const SUCCESS_RATE_CRITICAL: f64 = 90.0;
/// Average call duration above which latency is flagged.
pub const SLOW_AVERAGE_RESPONSE: Duration = Duration::from_secs(2);
/// Share of the window one error kind may reach before it is flagged.
pub const FREQUENT_ERROR_SHARE: f64 = 0.10;

/// Area a finding concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    /// Latency and caching.
    Performance,
    /// Failures.
    Reliability,
}

/// How urgent a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Positive or neutral observation.
    Info,
    /// Worth looking at.
    Medium,
    /// Needs attention.
    High,
}

/// One finding with an actionable recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    /// Area the finding concerns.
    pub category: InsightCategory,
    /// Urgency.
    pub severity: Severity,
    /// What was observed.
    pub message: String,
    /// What to do about it.
    pub recommendation: String,
}

impl Insight {
    fn new(
        category: InsightCategory,
        severity: Severity,
        message: String,
        recommendation: &str,
    ) -> Self {
        Self {
            category,
            severity,
            message,
            recommendation: recommendation.to_owned(),
        }
    }
}

pub(super) fn analyze(summary: &MetricsSummary) -> Vec<Insight> {
    let mut insights = Vec::new();
    if summary.total_requests == 0 {
        return insights;
    }

    if summary.cache_hit_rate < LOW_CACHE_HIT_RATE {
        insights.push(Insight::new(
            InsightCategory::Performance,
            Severity::Medium,
            format!("Low cache hit rate ({}%)", summary.cache_hit_rate),
            "Consider increasing the cache TTL or enabling caching if it is disabled",
        ));
    } else if summary.cache_hit_rate > HIGH_CACHE_HIT_RATE {
        insights.push(Insight::new(
            InsightCategory::Performance,
            Severity::Info,
            format!("Excellent cache hit rate ({}%)", summary.cache_hit_rate),
            "Keep the current caching configuration",
        ));
    }

    if summary.success_rate < SUCCESS_RATE_WARNING {
        let severity = if summary.success_rate < SUCCESS_RATE_CRITICAL {
            Severity::High
        } else {
            Severity::Medium
        };
        insights.push(Insight::new(
            InsightCategory::Reliability,
            severity,
            format!("Success rate is {}%", summary.success_rate),
            "Review recent errors and tune retries for transient failures",
        ));
    }

    if summary.avg_response_time > SLOW_AVERAGE_RESPONSE.as_secs_f64() {
        insights.push(Insight::new(
            InsightCategory::Performance,
            Severity::Medium,
            format!("High average response time ({}s)", summary.avg_response_time),
            "Review call patterns and cache frequently requested resources",
        ));
    }

    let most_common = summary
        .error_breakdown
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));
    if let Some((kind, &count)) = most_common
        && count as f64 > summary.total_requests as f64 * FREQUENT_ERROR_SHARE
    {
        insights.push(Insight::new(
            InsightCategory::Reliability,
            Severity::High,
            format!("Frequent {kind} errors ({count} occurrences)"),
            "Add handling and monitoring for this error type and investigate the root cause",
        ));
    }

    insights
}
