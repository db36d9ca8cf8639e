use crate::calendar::local_to_utc;
use crate::model::{ts_in_range, Appointment};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

pub const SLOT_STEP_MINUTES: i64 = 30;
pub const FIRST_SLOT_HOUR: u32 = 9;
/// The last offered start time is 17:00 sharp.
pub const LAST_SLOT_HOUR: u32 = 17;
pub const DEFAULT_SLOT_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Local `HH:MM`, the key used to select a slot.
    pub time: String,
    /// Local `h:mm AM`, for display.
    pub label: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub available: bool,
}

/// Local start times offered on any day: 09:00, 09:30, …, 17:00.
pub fn slot_times() -> Vec<NaiveTime> {
    let mut out = Vec::new();
    for hour in FIRST_SLOT_HOUR..=LAST_SLOT_HOUR {
        for minute in (0..60).step_by(SLOT_STEP_MINUTES as usize) {
            if hour == LAST_SLOT_HOUR && minute > 0 {
                continue;
            }
            if let Some(t) = NaiveTime::from_hms_opt(hour, minute, 0) {
                out.push(t);
            }
        }
    }
    out
}

/// Builds the day's slots. A slot is unavailable when it starts before `now`,
/// when `[start, start + duration)` intersects any occupying appointment in
/// `booked`, or when it would run outside the supported year range. Callers
/// pass the educator's appointments for the day.
pub fn generate_slots(
    date: NaiveDate,
    offset: FixedOffset,
    duration_minutes: i64,
    booked: &[Appointment],
    now: DateTime<Utc>,
) -> Vec<Slot> {
    slot_times()
        .into_iter()
        .filter_map(|time| {
            let starts_at = local_to_utc(date.and_time(time), offset)?;
            let ends_at = starts_at.checked_add_signed(Duration::minutes(duration_minutes))?;
            let is_past = starts_at < now;
            let in_range = ts_in_range(&starts_at) && ts_in_range(&ends_at);
            let taken = booked
                .iter()
                .any(|a| a.occupies_slot() && a.overlaps(starts_at, ends_at));
            Some(Slot {
                time: time.format("%H:%M").to_string(),
                label: time.format("%-I:%M %p").to_string(),
                starts_at,
                ends_at,
                available: in_range && !is_past && !taken,
            })
        })
        .collect()
}

pub fn find_slot<'a>(slots: &'a [Slot], time: &str) -> Option<&'a Slot> {
    let key = time.trim();
    slots.iter().find(|s| s.time == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn booked(at: DateTime<Utc>, minutes: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: "b".into(),
            educator_id: "e".into(),
            client_name: "Client".into(),
            client_email: "c@example.com".into(),
            client_phone: None,
            scheduled_at: at,
            duration_minutes: minutes,
            status,
            notes: None,
            outcome: None,
            created_at: at,
        }
    }

    #[test]
    fn seventeen_slots_from_nine_to_five() {
        let times = slot_times();
        assert_eq!(times.len(), 17);
        assert_eq!(times[0].format("%H:%M").to_string(), "09:00");
        assert_eq!(times[16].format("%H:%M").to_string(), "17:00");
    }

    #[test]
    fn labels_are_twelve_hour() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let slots = generate_slots(date, utc(), 30, &[], now);
        assert_eq!(slots[0].label, "9:00 AM");
        assert_eq!(slots[16].label, "5:00 PM");
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn past_slots_are_unavailable() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 5, 6, 12, 10, 0).unwrap();
        let slots = generate_slots(date, utc(), 30, &[], now);
        assert!(!find_slot(&slots, "12:00").unwrap().available);
        assert!(find_slot(&slots, "12:30").unwrap().available);
    }

    #[test]
    fn overlap_with_existing_appointment_blocks_slot_deterministically() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2030, 5, 6, 10, 0, 0).unwrap();
        let existing = vec![booked(ten, 60, AppointmentStatus::Scheduled)];

        for _ in 0..3 {
            let slots = generate_slots(date, utc(), 30, &existing, now);
            let unavailable: Vec<&str> = slots
                .iter()
                .filter(|s| !s.available)
                .map(|s| s.time.as_str())
                .collect();
            assert_eq!(unavailable, vec!["10:00", "10:30"]);
        }

        // A 60-minute session starting at 09:30 would run into the 10:00 booking.
        let long = generate_slots(date, utc(), 60, &existing, now);
        assert!(!find_slot(&long, "09:30").unwrap().available);
        assert!(find_slot(&long, "09:00").unwrap().available);
    }

    #[test]
    fn cancelled_appointments_do_not_block() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2030, 5, 6, 10, 0, 0).unwrap();
        let existing = vec![booked(ten, 60, AppointmentStatus::Cancelled)];
        let slots = generate_slots(date, utc(), 30, &existing, now);
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn last_supported_day_offers_no_slot_past_year_end() {
        // At UTC-12, an 11:30 local start ends at 00:00 UTC on 10000-01-01.
        let offset = FixedOffset::west_opt(12 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let slots = generate_slots(date, offset, 30, &[], now);
        assert_eq!(slots.len(), 17);
        assert!(find_slot(&slots, "11:00").unwrap().available);
        assert!(!find_slot(&slots, "11:30").unwrap().available);
        assert_eq!(slots.iter().filter(|s| s.available).count(), 5);

        let slots = generate_slots(date, utc(), 30, &[], now);
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn slots_follow_local_wall_clock() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let slots = generate_slots(date, offset, 30, &[], now);
        assert_eq!(
            slots[0].starts_at,
            Utc.with_ymd_and_hms(2030, 5, 6, 14, 0, 0).unwrap()
        );
    }
}
