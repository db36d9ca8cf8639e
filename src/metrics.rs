//! Aggregates over manually recorded performance metrics.

use crate::calendar::local_date;
use crate::model::{Appointment, PerformanceMetric};
use chrono::FixedOffset;
use serde::Serialize;

pub const MIN_FEEDBACK_SCORE: f64 = 1.0;
pub const MAX_FEEDBACK_SCORE: f64 = 5.0;
/// Upper bound for a single period's appointment or conversion count.
pub const MAX_PERIOD_COUNT: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub metric_count: usize,
    pub total_appointments: i64,
    pub conversions: i64,
    /// Percent, one decimal.
    pub conversion_rate: f64,
    /// Mean over metrics that carry a score; `None` when none do.
    pub average_feedback_score: Option<f64>,
    /// Appointments actually on the books inside the recorded periods, next
    /// to the hand-entered `total_appointments`.
    pub booked_appointments: usize,
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn conversion_rate(conversions: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round1(conversions as f64 / total as f64 * 100.0)
}

pub fn average_feedback(metrics: &[PerformanceMetric]) -> Option<f64> {
    let scores: Vec<f64> = metrics.iter().filter_map(|m| m.feedback_score).collect();
    if scores.is_empty() {
        return None;
    }
    Some(round1(scores.iter().sum::<f64>() / scores.len() as f64))
}

/// `appointments` should already be limited to the educators the metrics
/// belong to. Cancelled appointments are not counted as booked.
pub fn summarize(
    metrics: &[PerformanceMetric],
    appointments: &[Appointment],
    offset: FixedOffset,
) -> MetricSummary {
    let total_appointments = metrics
        .iter()
        .fold(0i64, |acc, m| acc.saturating_add(m.total_appointments));
    let conversions = metrics
        .iter()
        .fold(0i64, |acc, m| acc.saturating_add(m.conversions));

    let booked_appointments = appointments
        .iter()
        .filter(|a| a.occupies_slot())
        .filter(|a| {
            let day = local_date(a.scheduled_at, offset);
            metrics.iter().any(|m| {
                m.educator_id == a.educator_id && m.period_start <= day && day <= m.period_end
            })
        })
        .count();

    MetricSummary {
        metric_count: metrics.len(),
        total_appointments,
        conversions,
        conversion_rate: conversion_rate(conversions, total_appointments),
        average_feedback_score: average_feedback(metrics),
        booked_appointments,
    }
}
