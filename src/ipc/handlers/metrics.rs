use crate::ipc::helpers::{
    current_user, get_opt_f64, get_opt_i64, get_opt_str, get_required_date, get_required_str,
    offset_param, respond, store, store_mut, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{summarize, MAX_FEEDBACK_SCORE, MAX_PERIOD_COUNT, MIN_FEEDBACK_SCORE};
use crate::model::{
    timestamp_now, AppointmentFilter, AppointmentStatus, PerformanceMetric, Role, User,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

fn scoped_educator(me: &User, params: &Value) -> Option<String> {
    if me.role.is_supervisor() {
        get_opt_str(params, "educatorId")
    } else {
        Some(me.id.clone())
    }
}

fn period_count(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    let v = get_opt_i64(params, key)?.unwrap_or(0);
    if v < 0 {
        return Err(HandlerErr::bad_params(format!("{} must not be negative", key)));
    }
    if v > MAX_PERIOD_COUNT {
        return Err(HandlerErr::bad_params(format!(
            "{} must be at most {}",
            key, MAX_PERIOD_COUNT
        )));
    }
    Ok(v)
}

fn metrics_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let period_start = get_required_date(params, "periodStart")?;
    let period_end = get_required_date(params, "periodEnd")?;
    if period_end < period_start {
        return Err(HandlerErr::bad_params("periodEnd is before periodStart"));
    }
    let feedback_score = get_opt_f64(params, "feedbackScore")?;
    if let Some(score) = feedback_score {
        if !(MIN_FEEDBACK_SCORE..=MAX_FEEDBACK_SCORE).contains(&score) {
            return Err(HandlerErr::bad_params(format!(
                "feedbackScore must be between {} and {}",
                MIN_FEEDBACK_SCORE, MAX_FEEDBACK_SCORE
            )));
        }
    }

    let metric = PerformanceMetric {
        id: Uuid::new_v4().to_string(),
        educator_id: me.id.clone(),
        period_start,
        period_end,
        total_appointments: period_count(params, "totalAppointments")?,
        conversions: period_count(params, "conversions")?,
        feedback_score,
        notes: get_opt_str(params, "notes"),
        created_at: timestamp_now(),
    };
    store_mut(state)?.insert_metric(&metric)?;
    info!(metric_id = %metric.id, educator_id = %me.id, "metric recorded");
    Ok(json!({ "metric": metric }))
}

fn metrics_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let educator = scoped_educator(&me, params);
    let metrics = store(state)?.list_metrics(educator.as_deref())?;
    Ok(json!({ "metrics": metrics }))
}

fn metrics_delete(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let id = get_required_str(params, "metricId")?;
    let metric = store(state)?
        .get_metric(&id)?
        .ok_or_else(|| HandlerErr::not_found("metric not found"))?;
    if metric.educator_id != me.id && me.role != Role::Admin {
        return Err(HandlerErr::forbidden("only the owner or an admin may delete"));
    }
    store_mut(state)?.delete_metric(&id)?;
    Ok(json!({ "deleted": true, "metricId": id }))
}

fn metrics_summary(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let offset = offset_param(state, params)?;
    let educator = scoped_educator(&me, params);

    let store = store(state)?;
    let metrics = store.list_metrics(educator.as_deref())?;
    let appointments = store.list_appointments(&AppointmentFilter {
        educator_id: educator.clone(),
        ..AppointmentFilter::default()
    })?;
    let mut out = to_json(&summarize(&metrics, &appointments, offset))?;
    out["educatorId"] = json!(educator);
    Ok(out)
}

fn dashboard_stats(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let offset = offset_param(state, params)?;
    let store = store(state)?;

    let appointments = store.list_appointments(&AppointmentFilter {
        educator_id: Some(me.id.clone()),
        ..AppointmentFilter::default()
    })?;
    let completed = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Completed)
        .count();
    let metrics = store.list_metrics(Some(&me.id))?;
    let summary = summarize(&metrics, &appointments, offset);

    Ok(json!({
        "totalAppointments": appointments.len(),
        "completedAppointments": completed,
        "conversionRate": summary.conversion_rate,
        "averageFeedbackScore": summary.average_feedback_score,
        "unreadMessages": store.count_unread_for(&me.id)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "metrics.create" => metrics_create(state, &req.params),
        "metrics.list" => metrics_list(state, &req.params),
        "metrics.delete" => metrics_delete(state, &req.params),
        "metrics.summary" => metrics_summary(state, &req.params),
        "dashboard.stats" => dashboard_stats(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
