//! Appointment rules shared by the educator CRUD surface and the public
//! booking wizard.

use crate::calendar::local_to_utc;
use crate::error::StoreError;
use crate::model::{
    parse_ts, ts_in_range, Appointment, AppointmentFilter, AppointmentStatus, ALLOWED_DURATIONS,
    DEFAULT_DURATION_MINUTES,
};
use crate::store::Store;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct NewAppointment {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub notes: Option<String>,
}

/// `None` leaves a field untouched; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub notes: Option<Option<String>>,
    pub outcome: Option<Option<String>>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<Option<String>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

/// RFC 3339 with an offset, or a naive local `YYYY-MM-DDTHH:MM[:SS]` read on
/// the viewer's wall clock. The UTC result must stay inside the supported
/// year range.
pub fn parse_scheduled_at(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(ts) = parse_ts(raw) {
        return Some(ts);
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|local| local_to_utc(local, offset))
        .filter(ts_in_range)
}

/// Start and end must both be storable.
fn check_window(appt: &Appointment) -> Result<(), StoreError> {
    let end = appt
        .scheduled_at
        .checked_add_signed(Duration::minutes(appt.duration_minutes));
    if ts_in_range(&appt.scheduled_at) && end.is_some_and(|e| ts_in_range(&e)) {
        Ok(())
    } else {
        Err(StoreError::validation(
            "scheduledAt must start and end between years 0001 and 9999",
        ))
    }
}

pub fn validate_duration(minutes: i64) -> Result<i64, StoreError> {
    if ALLOWED_DURATIONS.contains(&minutes) {
        Ok(minutes)
    } else {
        Err(StoreError::validation(format!(
            "durationMinutes must be one of {:?}",
            ALLOWED_DURATIONS
        )))
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Validates and persists a new appointment owned by `educator_id`. Nothing
/// is written when validation fails.
pub fn create_appointment(
    store: &mut dyn Store,
    educator_id: &str,
    new: NewAppointment,
    now: DateTime<Utc>,
) -> Result<Appointment, StoreError> {
    let client_name = non_blank(new.client_name);
    let client_email = non_blank(new.client_email);

    let mut missing = Vec::new();
    if client_name.is_none() {
        missing.push("clientName");
    }
    if client_email.is_none() {
        missing.push("clientEmail");
    }
    if new.scheduled_at.is_none() {
        missing.push("scheduledAt");
    }
    let (Some(client_name), Some(client_email), Some(scheduled_at)) =
        (client_name, client_email, new.scheduled_at)
    else {
        return Err(StoreError::validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    };

    let duration_minutes =
        validate_duration(new.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES))?;

    let appt = Appointment {
        id: Uuid::new_v4().to_string(),
        educator_id: educator_id.to_string(),
        client_name,
        client_email,
        client_phone: non_blank(new.client_phone),
        scheduled_at,
        duration_minutes,
        status: AppointmentStatus::Scheduled,
        notes: non_blank(new.notes),
        outcome: None,
        created_at: now,
    };
    check_window(&appt)?;
    store.insert_appointment(&appt)?;
    Ok(appt)
}

/// Any status may follow any other; the dashboard never restricted the
/// lifecycle and neither does this.
pub fn apply_patch(appt: &mut Appointment, patch: AppointmentPatch) -> Result<(), StoreError> {
    if let Some(status) = patch.status {
        appt.status = status;
    }
    if let Some(notes) = patch.notes {
        appt.notes = non_blank(notes);
    }
    if let Some(outcome) = patch.outcome {
        appt.outcome = non_blank(outcome);
    }
    if let Some(name) = patch.client_name {
        appt.client_name =
            non_blank(Some(name)).ok_or_else(|| StoreError::validation("clientName must not be empty"))?;
    }
    if let Some(email) = patch.client_email {
        appt.client_email = non_blank(Some(email))
            .ok_or_else(|| StoreError::validation("clientEmail must not be empty"))?;
    }
    if let Some(phone) = patch.client_phone {
        appt.client_phone = non_blank(phone);
    }
    if let Some(at) = patch.scheduled_at {
        appt.scheduled_at = at;
    }
    if let Some(minutes) = patch.duration_minutes {
        appt.duration_minutes = validate_duration(minutes)?;
    }
    check_window(appt)
}

pub fn update_appointment(
    store: &mut dyn Store,
    id: &str,
    patch: AppointmentPatch,
) -> Result<Appointment, StoreError> {
    let mut appt = store
        .get_appointment(id)?
        .ok_or_else(|| StoreError::not_found("appointment"))?;
    apply_patch(&mut appt, patch)?;
    store.update_appointment(&appt)?;
    Ok(appt)
}

/// The educator's appointments that can touch the given local day. The window
/// opens early enough to catch a long session that started before midnight.
pub fn booked_on(
    store: &dyn Store,
    educator_id: &str,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<Vec<Appointment>, StoreError> {
    let longest = ALLOWED_DURATIONS.iter().copied().max().unwrap_or(DEFAULT_DURATION_MINUTES);
    let (Some(day_start), Some(next_day)) = (
        date.and_hms_opt(0, 0, 0),
        date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)),
    ) else {
        return Ok(Vec::new());
    };
    let (Some(from), Some(to)) = (
        local_to_utc(day_start, offset)
            .and_then(|t| t.checked_sub_signed(Duration::minutes(longest))),
        local_to_utc(next_day, offset),
    ) else {
        return Ok(Vec::new());
    };
    let filter = AppointmentFilter {
        educator_id: Some(educator_id.to_string()),
        status: None,
        from: Some(from),
        to: Some(to),
    };
    store.list_appointments(&filter)
}
