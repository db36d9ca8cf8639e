use crate::availability::{generate_slots, DEFAULT_SLOT_MINUTES};
use crate::booking::{BookingWizard, ContactInfo, SessionType};
use crate::error::StoreError;
use crate::ipc::helpers::{
    get_opt_i64, get_opt_str, get_required_date, get_required_str, offset_param, respond, store,
    to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{timestamp_now, Appointment, Role};
use crate::scheduling::{booked_on, create_appointment, validate_duration};
use crate::store::Store;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

fn no_workspace() -> HandlerErr {
    HandlerErr::new("no_workspace", "select a workspace first")
}

/// Public bookings only land on educator calendars.
fn ensure_educator(store: &dyn Store, educator_id: &str) -> Result<(), HandlerErr> {
    store
        .get_user(educator_id)?
        .filter(|u| u.role == Role::Educator)
        .map(|_| ())
        .ok_or_else(|| HandlerErr::not_found("educator not found"))
}

fn session_type_catalogue() -> Vec<Value> {
    SessionType::ALL
        .iter()
        .map(|t| {
            json!({
                "id": t.id(),
                "name": t.name(),
                "durationMinutes": t.duration_minutes(),
                "price": t.price(),
            })
        })
        .collect()
}

fn wizard_view(wizard: &BookingWizard) -> HandlerResult {
    let mut view = to_json(wizard)?;
    view["selectedSlot"] = to_json(&wizard.selected_slot())?;
    view["sessionTypes"] = Value::Array(session_type_catalogue());
    Ok(json!({ "wizard": view }))
}

/// Appointments relevant to `date`, or none when no date is chosen yet.
fn booked_for(
    store: &dyn Store,
    wizard: &BookingWizard,
    date: Option<NaiveDate>,
) -> Result<Vec<Appointment>, HandlerErr> {
    match date {
        Some(d) => Ok(booked_on(store, &wizard.educator_id, d, wizard.offset)?),
        None => Ok(Vec::new()),
    }
}

fn availability_slots(state: &mut AppState, params: &Value) -> HandlerResult {
    let educator_id = get_required_str(params, "educatorId")?;
    let date = get_required_date(params, "date")?;
    let offset = offset_param(state, params)?;
    let duration = validate_duration(
        get_opt_i64(params, "durationMinutes")?.unwrap_or(DEFAULT_SLOT_MINUTES),
    )?;

    let store = store(state)?;
    ensure_educator(store, &educator_id)?;
    let booked = booked_on(store, &educator_id, date, offset)?;
    let slots = generate_slots(date, offset, duration, &booked, timestamp_now());
    Ok(json!({
        "educatorId": educator_id,
        "date": date,
        "durationMinutes": duration,
        "slots": slots,
    }))
}

fn booking_start(state: &mut AppState, params: &Value) -> HandlerResult {
    let educator_id = get_required_str(params, "educatorId")?;
    let offset = offset_param(state, params)?;
    ensure_educator(store(state)?, &educator_id)?;

    let wizard = BookingWizard::new(Uuid::new_v4().to_string(), educator_id, offset);
    let view = wizard_view(&wizard)?;
    info!(wizard_id = %wizard.id, educator_id = %wizard.educator_id, "booking started");
    state.wizards.insert(wizard.id.clone(), wizard);
    Ok(view)
}

fn wizard_mut<'a>(
    wizards: &'a mut std::collections::HashMap<String, BookingWizard>,
    params: &Value,
) -> Result<&'a mut BookingWizard, HandlerErr> {
    let id = get_required_str(params, "wizardId")?;
    wizards
        .get_mut(&id)
        .ok_or_else(|| HandlerErr::not_found("booking not found"))
}

fn booking_get(state: &mut AppState, params: &Value) -> HandlerResult {
    let wizard = wizard_mut(&mut state.wizards, params)?;
    wizard_view(wizard)
}

fn booking_set_session_type(state: &mut AppState, params: &Value) -> HandlerResult {
    let raw = get_required_str(params, "sessionType")?;
    let session_type = SessionType::parse(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown session type: {}", raw)))?;
    let store = state.store.as_deref().ok_or_else(no_workspace)?;
    let wizard = wizard_mut(&mut state.wizards, params)?;
    let booked = booked_for(store, wizard, wizard.selected_date)?;
    wizard.set_session_type(session_type, &booked, timestamp_now())?;
    wizard_view(wizard)
}

fn booking_select_date(state: &mut AppState, params: &Value) -> HandlerResult {
    let date = get_required_date(params, "date")?;
    let store = state.store.as_deref().ok_or_else(no_workspace)?;
    let wizard = wizard_mut(&mut state.wizards, params)?;
    let booked = booked_for(store, wizard, Some(date))?;
    wizard.select_date(date, &booked, timestamp_now())?;
    wizard_view(wizard)
}

fn booking_select_slot(state: &mut AppState, params: &Value) -> HandlerResult {
    let time = get_required_str(params, "time")?;
    let wizard = wizard_mut(&mut state.wizards, params)?;
    wizard.select_time(&time)?;
    wizard_view(wizard)
}

fn booking_set_contact(state: &mut AppState, params: &Value) -> HandlerResult {
    let contact = ContactInfo {
        name: get_opt_str(params, "name").unwrap_or_default(),
        email: get_opt_str(params, "email").unwrap_or_default(),
        phone: get_opt_str(params, "phone"),
        notes: get_opt_str(params, "notes"),
    };
    let wizard = wizard_mut(&mut state.wizards, params)?;
    wizard.set_contact(contact)?;
    wizard_view(wizard)
}

fn booking_next(state: &mut AppState, params: &Value) -> HandlerResult {
    let wizard = wizard_mut(&mut state.wizards, params)?;
    wizard.next()?;
    wizard_view(wizard)
}

fn booking_back(state: &mut AppState, params: &Value) -> HandlerResult {
    let wizard = wizard_mut(&mut state.wizards, params)?;
    wizard.back()?;
    wizard_view(wizard)
}

/// Puts the wizard back on slot selection with fresh slots for its date.
fn refresh_after_conflict(
    store: &dyn Store,
    wizard: &mut BookingWizard,
    now: DateTime<Utc>,
) -> Result<(), HandlerErr> {
    wizard.slot_lost();
    if let Some(date) = wizard.selected_date {
        let booked = booked_for(store, wizard, Some(date))?;
        // A date that slipped into the past keeps its stale slots.
        let _ = wizard.select_date(date, &booked, now);
    }
    Ok(())
}

fn booking_submit(state: &mut AppState, params: &Value) -> HandlerResult {
    let now = timestamp_now();
    let store = state.store.as_deref_mut().ok_or_else(no_workspace)?;
    let wizard = wizard_mut(&mut state.wizards, params)?;

    let booked = booked_for(store, wizard, wizard.selected_date)?;
    let new = match wizard.prepare_submission(&booked, now) {
        Ok(new) => new,
        Err(e) => {
            let view = wizard_view(wizard)?;
            return Err(HandlerErr::from(e).with_details(view));
        }
    };

    let educator_id = wizard.educator_id.clone();
    match create_appointment(store, &educator_id, new, now) {
        Ok(appointment) => {
            wizard.mark_submitted(appointment.id.clone());
            info!(wizard_id = %wizard.id, appointment_id = %appointment.id, "booking submitted");
            let mut out = wizard_view(wizard)?;
            out["appointment"] = to_json(&appointment)?;
            // The final view is the last one this wizard serves.
            let wizard_id = wizard.id.clone();
            state.wizards.remove(&wizard_id);
            Ok(out)
        }
        Err(e @ StoreError::SlotUnavailable { .. }) => {
            warn!(wizard_id = %wizard.id, "slot taken before submission");
            refresh_after_conflict(store, wizard, now)?;
            let view = wizard_view(wizard)?;
            Err(HandlerErr::from(e).with_details(view))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "availability.slots" => availability_slots(state, &req.params),
        "booking.start" => booking_start(state, &req.params),
        "booking.get" => booking_get(state, &req.params),
        "booking.setSessionType" => booking_set_session_type(state, &req.params),
        "booking.selectDate" => booking_select_date(state, &req.params),
        "booking.selectSlot" => booking_select_slot(state, &req.params),
        "booking.setContact" => booking_set_contact(state, &req.params),
        "booking.next" => booking_next(state, &req.params),
        "booking.back" => booking_back(state, &req.params),
        "booking.submit" => booking_submit(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
