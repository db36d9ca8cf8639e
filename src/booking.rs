//! Public booking wizard: SelectSlot → EnterInfo → Confirm → Submitted.
//!
//! The wizard is plain state; callers hand it the educator's booked
//! appointments whenever slots need (re)generating, and perform the actual
//! appointment insert themselves.

use crate::availability::{find_slot, generate_slots, Slot};
use crate::calendar::local_date;
use crate::model::Appointment;
use crate::scheduling::NewAppointment;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    SelectSlot,
    EnterInfo,
    Confirm,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Consultation,
    Education,
    Advanced,
}

impl SessionType {
    pub const ALL: [SessionType; 3] = [
        SessionType::Consultation,
        SessionType::Education,
        SessionType::Advanced,
    ];

    pub fn id(self) -> &'static str {
        match self {
            SessionType::Consultation => "consultation",
            SessionType::Education => "education",
            SessionType::Advanced => "advanced",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == raw.trim())
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionType::Consultation => "Initial Consultation",
            SessionType::Education => "Bitcoin Education Session",
            SessionType::Advanced => "Advanced Training",
        }
    }

    pub fn duration_minutes(self) -> i64 {
        match self {
            SessionType::Consultation => 30,
            SessionType::Education => 60,
            SessionType::Advanced => 90,
        }
    }

    /// Whole US dollars; 0 is free.
    pub fn price(self) -> u32 {
        match self {
            SessionType::Consultation => 0,
            SessionType::Education => 150,
            SessionType::Advanced => 225,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum WizardError {
    #[error("not allowed in step {0:?}")]
    WrongStep(BookingStep),
    #[error("date is in the past")]
    PastDate,
    #[error("select a date first")]
    NoDate,
    #[error("no slot at {0}")]
    UnknownSlot(String),
    #[error("slot {0} is not available")]
    SlotTaken(String),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWizard {
    pub id: String,
    pub educator_id: String,
    #[serde(skip)]
    pub offset: FixedOffset,
    pub step: BookingStep,
    pub session_type: SessionType,
    pub selected_date: Option<NaiveDate>,
    pub selected_time: Option<String>,
    pub slots: Vec<Slot>,
    pub contact: ContactInfo,
    pub appointment_id: Option<String>,
}

impl BookingWizard {
    pub fn new(id: String, educator_id: String, offset: FixedOffset) -> Self {
        Self {
            id,
            educator_id,
            offset,
            step: BookingStep::SelectSlot,
            session_type: SessionType::Consultation,
            selected_date: None,
            selected_time: None,
            slots: Vec::new(),
            contact: ContactInfo::default(),
            appointment_id: None,
        }
    }

    fn require_step(&self, step: BookingStep) -> Result<(), WizardError> {
        if self.step == step {
            Ok(())
        } else {
            Err(WizardError::WrongStep(self.step))
        }
    }

    fn regenerate(&mut self, booked: &[Appointment], now: DateTime<Utc>) {
        let Some(date) = self.selected_date else {
            self.slots.clear();
            return;
        };
        self.slots = generate_slots(
            date,
            self.offset,
            self.session_type.duration_minutes(),
            booked,
            now,
        );
        let still_free = self
            .selected_time
            .as_deref()
            .and_then(|t| find_slot(&self.slots, t))
            .map(|s| s.available)
            .unwrap_or(false);
        if !still_free {
            self.selected_time = None;
        }
    }

    pub fn set_session_type(
        &mut self,
        session_type: SessionType,
        booked: &[Appointment],
        now: DateTime<Utc>,
    ) -> Result<(), WizardError> {
        self.require_step(BookingStep::SelectSlot)?;
        self.session_type = session_type;
        self.regenerate(booked, now);
        Ok(())
    }

    pub fn select_date(
        &mut self,
        date: NaiveDate,
        booked: &[Appointment],
        now: DateTime<Utc>,
    ) -> Result<(), WizardError> {
        self.require_step(BookingStep::SelectSlot)?;
        if date < local_date(now, self.offset) {
            return Err(WizardError::PastDate);
        }
        self.selected_date = Some(date);
        self.selected_time = None;
        self.regenerate(booked, now);
        Ok(())
    }

    pub fn select_time(&mut self, time: &str) -> Result<(), WizardError> {
        self.require_step(BookingStep::SelectSlot)?;
        if self.selected_date.is_none() {
            return Err(WizardError::NoDate);
        }
        let slot = find_slot(&self.slots, time)
            .ok_or_else(|| WizardError::UnknownSlot(time.trim().to_string()))?;
        if !slot.available {
            return Err(WizardError::SlotTaken(slot.time.clone()));
        }
        self.selected_time = Some(slot.time.clone());
        Ok(())
    }

    pub fn set_contact(&mut self, contact: ContactInfo) -> Result<(), WizardError> {
        self.require_step(BookingStep::EnterInfo)?;
        self.contact = ContactInfo {
            name: contact.name.trim().to_string(),
            email: contact.email.trim().to_string(),
            phone: contact.phone.filter(|p| !p.trim().is_empty()),
            notes: contact.notes.filter(|n| !n.trim().is_empty()),
        };
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), WizardError> {
        match self.step {
            BookingStep::SelectSlot => {
                if self.selected_date.is_none() {
                    return Err(WizardError::Missing("date"));
                }
                if self.selected_time.is_none() {
                    return Err(WizardError::Missing("time"));
                }
                self.step = BookingStep::EnterInfo;
            }
            BookingStep::EnterInfo => {
                if self.contact.name.is_empty() {
                    return Err(WizardError::Missing("name"));
                }
                if self.contact.email.is_empty() {
                    return Err(WizardError::Missing("email"));
                }
                self.step = BookingStep::Confirm;
            }
            // Confirm only advances through submission.
            BookingStep::Confirm | BookingStep::Submitted => {
                return Err(WizardError::WrongStep(self.step));
            }
        }
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), WizardError> {
        self.step = match self.step {
            BookingStep::SelectSlot | BookingStep::EnterInfo => BookingStep::SelectSlot,
            BookingStep::Confirm => BookingStep::EnterInfo,
            BookingStep::Submitted => return Err(WizardError::WrongStep(self.step)),
        };
        Ok(())
    }

    pub fn selected_slot(&self) -> Option<&Slot> {
        self.selected_time
            .as_deref()
            .and_then(|t| find_slot(&self.slots, t))
    }

    /// The appointment this wizard would create, re-checked against `booked`.
    /// On a stale selection the wizard falls back to SelectSlot with fresh
    /// slots and the time cleared.
    pub fn prepare_submission(
        &mut self,
        booked: &[Appointment],
        now: DateTime<Utc>,
    ) -> Result<NewAppointment, WizardError> {
        self.require_step(BookingStep::Confirm)?;
        let time = self.selected_time.clone().ok_or(WizardError::Missing("time"))?;
        self.regenerate(booked, now);
        let Some(slot) = self.selected_slot().cloned() else {
            self.slot_lost();
            return Err(WizardError::SlotTaken(time));
        };
        Ok(NewAppointment {
            client_name: Some(self.contact.name.clone()),
            client_email: Some(self.contact.email.clone()),
            client_phone: self.contact.phone.clone(),
            scheduled_at: Some(slot.starts_at),
            duration_minutes: Some(self.session_type.duration_minutes()),
            notes: self.contact.notes.clone(),
        })
    }

    /// Called when the store refused the insert after a successful
    /// `prepare_submission` (someone else won the slot).
    pub fn slot_lost(&mut self) {
        self.selected_time = None;
        self.step = BookingStep::SelectSlot;
    }

    pub fn mark_submitted(&mut self, appointment_id: String) {
        self.appointment_id = Some(appointment_id);
        self.step = BookingStep::Submitted;
    }
}
