use crate::calendar::{grid_bounds_utc, local_date, month_grid, parse_month_key};
use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_i64, get_opt_str, get_patch_str, get_required_str,
    offset_param, respond, store, store_mut, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{timestamp_now, Appointment, AppointmentFilter, AppointmentStatus, User};
use crate::scheduling::{
    create_appointment, parse_scheduled_at, update_appointment, AppointmentPatch, NewAppointment,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{json, Value};
use tracing::info;

/// Educators are pinned to their own records whatever they ask for.
fn scoped_educator(me: &User, requested: Option<String>) -> Option<String> {
    if me.role.is_supervisor() {
        requested
    } else {
        Some(me.id.clone())
    }
}

fn parse_instant(
    params: &Value,
    key: &str,
    offset: FixedOffset,
) -> Result<Option<DateTime<Utc>>, HandlerErr> {
    get_opt_str(params, key)
        .map(|raw| {
            parse_scheduled_at(&raw, offset).ok_or_else(|| {
                HandlerErr::bad_params(format!(
                    "{} must be RFC 3339 or YYYY-MM-DDTHH:MM, got '{}'",
                    key, raw
                ))
            })
        })
        .transpose()
}

/// Loads an appointment the caller is allowed to see. Someone else's record
/// reads as missing to an educator.
fn visible_appointment(state: &AppState, me: &User, id: &str) -> Result<Appointment, HandlerErr> {
    store(state)?
        .get_appointment(id)?
        .filter(|a| me.role.is_supervisor() || a.educator_id == me.id)
        .ok_or_else(|| HandlerErr::not_found("appointment not found"))
}

fn appointments_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let offset = offset_param(state, params)?;
    let filter = AppointmentFilter {
        educator_id: scoped_educator(&me, get_opt_str(params, "educatorId")),
        status: get_opt_enum::<AppointmentStatus>(params, "status")?,
        from: parse_instant(params, "from", offset)?,
        to: parse_instant(params, "to", offset)?,
    };
    let appointments = store(state)?.list_appointments(&filter)?;
    Ok(json!({ "appointments": appointments }))
}

fn appointments_get(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let id = get_required_str(params, "appointmentId")?;
    let appointment = visible_appointment(state, &me, &id)?;
    Ok(json!({ "appointment": appointment }))
}

fn appointments_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let offset = offset_param(state, params)?;
    let new = NewAppointment {
        client_name: get_opt_str(params, "clientName"),
        client_email: get_opt_str(params, "clientEmail"),
        client_phone: get_opt_str(params, "clientPhone"),
        scheduled_at: parse_instant(params, "scheduledAt", offset)?,
        duration_minutes: get_opt_i64(params, "durationMinutes")?,
        notes: get_opt_str(params, "notes"),
    };
    let appointment = create_appointment(store_mut(state)?, &me.id, new, timestamp_now())?;
    info!(appointment_id = %appointment.id, educator_id = %me.id, "appointment created");
    Ok(json!({ "appointment": appointment }))
}

fn read_patch(patch: &Value, offset: FixedOffset) -> Result<AppointmentPatch, HandlerErr> {
    if !patch.is_object() {
        return Err(HandlerErr::bad_params("patch must be an object"));
    }
    // A null name or email is a request to blank a required field.
    let required = |key: &str| -> Result<Option<String>, HandlerErr> {
        Ok(get_patch_str(patch, key)?.map(Option::unwrap_or_default))
    };
    Ok(AppointmentPatch {
        status: get_opt_enum::<AppointmentStatus>(patch, "status")?,
        notes: get_patch_str(patch, "notes")?,
        outcome: get_patch_str(patch, "outcome")?,
        client_name: required("clientName")?,
        client_email: required("clientEmail")?,
        client_phone: get_patch_str(patch, "clientPhone")?,
        scheduled_at: parse_instant(patch, "scheduledAt", offset)?,
        duration_minutes: get_opt_i64(patch, "durationMinutes")?,
    })
}

fn appointments_update(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let id = get_required_str(params, "appointmentId")?;
    let offset = offset_param(state, params)?;
    let patch = read_patch(params.get("patch").unwrap_or(&Value::Null), offset)?;

    // Owner, trainer, or admin.
    visible_appointment(state, &me, &id)?;
    let appointment = update_appointment(store_mut(state)?, &id, patch)?;
    info!(appointment_id = %id, status = %appointment.status, "appointment updated");
    Ok(json!({ "appointment": appointment }))
}

fn appointments_delete(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let id = get_required_str(params, "appointmentId")?;
    let appointment = visible_appointment(state, &me, &id)?;
    if appointment.educator_id != me.id {
        return Err(HandlerErr::forbidden("only the owning educator may delete"));
    }
    store_mut(state)?.delete_appointment(&id)?;
    info!(appointment_id = %id, "appointment deleted");
    Ok(json!({ "deleted": true, "appointmentId": id }))
}

fn calendar_month(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let offset = offset_param(state, params)?;
    let raw = get_required_str(params, "month")?;
    let (year, month) = parse_month_key(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("month must be YYYY-MM, got '{}'", raw)))?;
    let (from, to) = grid_bounds_utc(year, month, offset)
        .ok_or_else(|| HandlerErr::bad_params(format!("month out of range: {}", raw)))?;

    let filter = AppointmentFilter {
        educator_id: scoped_educator(&me, get_opt_str(params, "educatorId")),
        status: None,
        from: Some(from),
        to: Some(to),
    };
    let appointments = store(state)?.list_appointments(&filter)?;
    let today = local_date(timestamp_now(), offset);
    let grid = month_grid(year, month, &appointments, offset, today)
        .ok_or_else(|| HandlerErr::bad_params(format!("month out of range: {}", raw)))?;
    to_json(&grid)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "appointments.list" => appointments_list(state, &req.params),
        "appointments.get" => appointments_get(state, &req.params),
        "appointments.create" => appointments_create(state, &req.params),
        "appointments.update" => appointments_update(state, &req.params),
        "appointments.delete" => appointments_delete(state, &req.params),
        "calendar.month" => calendar_month(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
