use crate::model::{year_in_range, Appointment};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
pub const GRID_WEEKS: usize = 6;
pub const GRID_DAYS: usize = GRID_WEEKS * 7;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    pub weekday: &'static str,
    /// False for the leading/trailing days borrowed from adjacent months.
    pub in_month: bool,
    pub is_today: bool,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub month: String,
    /// `None` at the edges of the supported year range.
    pub prev_month: Option<String>,
    pub next_month: Option<String>,
    pub weekdays: [&'static str; 7],
    pub weeks: Vec<Vec<DayCell>>,
}

#[allow(dead_code)]
impl MonthGrid {
    pub fn cells(&self) -> impl Iterator<Item = &DayCell> {
        self.weeks.iter().flatten()
    }

    pub fn cell(&self, date: NaiveDate) -> Option<&DayCell> {
        self.cells().find(|c| c.date == date)
    }
}

/// Accepts `YYYY-MM` within the supported year range.
pub fn parse_month_key(raw: &str) -> Option<(i32, u32)> {
    let (y, m) = raw.trim().split_once('-')?;
    let year = y.parse::<i32>().ok().filter(|y| year_in_range(*y))?;
    let month = m.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?;
    Some((year, month))
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let idx = year * 12 + (month as i32 - 1) + delta;
    (idx.div_euclid(12), idx.rem_euclid(12) as u32 + 1)
}

fn neighbour_key(year: i32, month: u32, delta: i32) -> Option<String> {
    let (y, m) = shift_month(year, month, delta);
    year_in_range(y).then(|| month_key(y, m))
}

pub fn weekday_label(date: NaiveDate) -> &'static str {
    WEEKDAY_LABELS[date.weekday().num_days_from_sunday() as usize]
}

/// The Sunday on or before the first of the month.
pub fn grid_start(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_sub_signed(Duration::days(first.weekday().num_days_from_sunday() as i64))
}

/// `None` when the shifted instant is not representable.
pub fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let utc = local.checked_sub_signed(Duration::seconds(offset.local_minus_utc() as i64))?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc))
}

/// Calendar day of `ts` on the viewer's wall clock, not the UTC day.
pub fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// UTC instants bounding the whole 42-day grid, both inclusive.
pub fn grid_bounds_utc(
    year: i32,
    month: u32,
    offset: FixedOffset,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = grid_start(year, month)?;
    let end = start.checked_add_signed(Duration::days(GRID_DAYS as i64))?;
    let from = local_to_utc(start.and_hms_opt(0, 0, 0)?, offset)?;
    let to = local_to_utc(end.and_hms_opt(0, 0, 0)?, offset)?
        .checked_sub_signed(Duration::milliseconds(1))?;
    Some((from, to))
}

/// Projects `appointments` onto a fixed 6×7 grid for the month. Each
/// appointment lands in at most one cell: the one for its local date.
pub fn month_grid(
    year: i32,
    month: u32,
    appointments: &[Appointment],
    offset: FixedOffset,
    today: NaiveDate,
) -> Option<MonthGrid> {
    let start = grid_start(year, month)?;

    let mut by_day: HashMap<NaiveDate, Vec<Appointment>> = HashMap::new();
    for a in appointments {
        by_day
            .entry(local_date(a.scheduled_at, offset))
            .or_default()
            .push(a.clone());
    }

    let mut weeks = Vec::with_capacity(GRID_WEEKS);
    for w in 0..GRID_WEEKS {
        let mut week = Vec::with_capacity(7);
        for d in 0..7 {
            let date = start.checked_add_signed(Duration::days((w * 7 + d) as i64))?;
            let mut day_appts = by_day.remove(&date).unwrap_or_default();
            day_appts.sort_by_key(|a| a.scheduled_at);
            week.push(DayCell {
                date,
                weekday: weekday_label(date),
                in_month: date.year() == year && date.month() == month,
                is_today: date == today,
                appointments: day_appts,
            });
        }
        weeks.push(week);
    }

    Some(MonthGrid {
        month: month_key(year, month),
        prev_month: neighbour_key(year, month, -1),
        next_month: neighbour_key(year, month, 1),
        weekdays: WEEKDAY_LABELS,
        weeks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;
    use chrono::TimeZone;

    fn appt(id: &str, at: DateTime<Utc>) -> Appointment {
        Appointment {
            id: id.into(),
            educator_id: "e".into(),
            client_name: "Client".into(),
            client_email: "c@example.com".into(),
            client_phone: None,
            scheduled_at: at,
            duration_minutes: 60,
            status: AppointmentStatus::Scheduled,
            notes: None,
            outcome: None,
            created_at: at,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn every_month_tiles_42_cells_sunday_to_saturday() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for year in [2023, 2024, 2025, 2026] {
            for month in 1..=12 {
                let grid = month_grid(year, month, &[], utc(), today).unwrap();
                assert_eq!(grid.weeks.len(), 6);
                assert_eq!(grid.cells().count(), 42);
                for week in &grid.weeks {
                    assert_eq!(week[0].weekday, "Sun");
                    assert_eq!(week[6].weekday, "Sat");
                }
                let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
                assert!(grid.cell(first).map(|c| c.in_month).unwrap_or(false));
                let in_month = grid.cells().filter(|c| c.in_month).count();
                let (ny, nm) = shift_month(year, month, 1);
                let days = (NaiveDate::from_ymd_opt(ny, nm, 1).unwrap() - first).num_days();
                assert_eq!(in_month as i64, days);
            }
        }
    }

    #[test]
    fn june_2024_booking_lands_on_the_tenth_regardless_of_offset() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let tenth = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        // 09:00 local on June 10 in three different zones.
        for minutes in [-7 * 60, 0, 10 * 60] {
            let offset = FixedOffset::east_opt(minutes * 60).unwrap();
            let local = tenth.and_hms_opt(9, 0, 0).unwrap();
            let a = appt("x", local_to_utc(local, offset).unwrap());
            let grid = month_grid(2024, 6, &[a], offset, today).unwrap();
            let hits: Vec<NaiveDate> = grid
                .cells()
                .filter(|c| c.appointments.iter().any(|x| x.id == "x"))
                .map(|c| c.date)
                .collect();
            assert_eq!(hits, vec![tenth], "offset {} minutes", minutes);
        }
    }

    #[test]
    fn late_evening_utc_counts_toward_next_local_day() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 9, 23, 30, 0).unwrap();
        let grid = month_grid(
            2024,
            6,
            &[appt("late", at)],
            offset,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .unwrap();
        let tenth = grid.cell(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()).unwrap();
        assert_eq!(tenth.appointments.len(), 1);
    }

    #[test]
    fn cells_hold_each_appointment_once_in_time_order() {
        let day = Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap();
        let appts = vec![
            appt("b", day + Duration::hours(15)),
            appt("a", day + Duration::hours(9)),
            appt("outside", Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap()),
        ];
        let grid = month_grid(2024, 6, &appts, utc(), day.date_naive()).unwrap();
        let cell = grid.cell(day.date_naive()).unwrap();
        assert!(cell.is_today);
        let ids: Vec<&str> = cell.appointments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let total: usize = grid.cells().map(|c| c.appointments.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn month_keys_parse_and_wrap() {
        assert_eq!(parse_month_key("2024-06"), Some((2024, 6)));
        assert_eq!(parse_month_key("2024-13"), None);
        assert_eq!(parse_month_key("June"), None);
        assert_eq!(shift_month(2024, 1, -1), (2023, 12));
        assert_eq!(shift_month(2024, 12, 1), (2025, 1));
        let grid = month_grid(2024, 1, &[], utc(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .unwrap();
        assert_eq!(grid.prev_month.as_deref(), Some("2023-12"));
        assert_eq!(grid.next_month.as_deref(), Some("2024-02"));
    }

    #[test]
    fn edge_years_stay_in_range() {
        assert_eq!(parse_month_key("262142-12"), None);
        assert_eq!(parse_month_key("10000-01"), None);
        assert_eq!(parse_month_key("0000-12"), None);
        assert_eq!(parse_month_key("-5-01"), None);

        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let last = month_grid(9999, 12, &[], utc(), today).unwrap();
        assert_eq!(last.next_month, None);
        assert_eq!(last.prev_month.as_deref(), Some("9999-11"));
        let first = month_grid(1, 1, &[], utc(), today).unwrap();
        assert_eq!(first.prev_month, None);
        assert!(grid_bounds_utc(9999, 12, FixedOffset::west_opt(12 * 3600).unwrap()).is_some());
        assert!(grid_bounds_utc(1, 1, FixedOffset::east_opt(14 * 3600).unwrap()).is_some());
    }

    #[test]
    fn grid_bounds_cover_leading_and_trailing_days() {
        let (from, to) = grid_bounds_utc(2024, 6, utc()).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 5, 26, 0, 0, 0).unwrap());
        assert!(to < Utc.with_ymd_and_hms(2024, 7, 7, 0, 0, 0).unwrap());
        assert!(to > Utc.with_ymd_and_hms(2024, 7, 6, 23, 59, 0).unwrap());
    }
}
