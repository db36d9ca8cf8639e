use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Durations an appointment may be booked for, in minutes.
pub const ALLOWED_DURATIONS: [i64; 5] = [30, 45, 60, 90, 120];
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Wall-clock "now" at the precision the stores persist (milliseconds), so a
/// value read back from SQLite compares equal to the one that was written.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Years every stored date and instant must fall in. Four-digit years keep
/// `fmt_ts` fixed-width and readable by RFC 3339 parsers.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

pub fn year_in_range(year: i32) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&year)
}

pub fn ts_in_range(ts: &DateTime<Utc>) -> bool {
    year_in_range(ts.year())
}

/// Pins `ts` into the supported range so it can bound a text comparison.
pub fn clamp_ts(ts: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(MIN_YEAR, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    let last = NaiveDate::from_ymd_opt(MAX_YEAR, 12, 31)
        .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999));
    match (first, last) {
        (Some(f), _) if ts.naive_utc() < f => DateTime::from_naive_utc_and_offset(f, Utc),
        (_, Some(l)) if ts.naive_utc() > l => DateTime::from_naive_utc_and_offset(l, Utc),
        _ => ts,
    }
}

/// Fixed-width RFC 3339 rendering. Within `MIN_YEAR..=MAX_YEAR`, lexical
/// order equals chronological order.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// RFC 3339 with any offset. Instants whose UTC year leaves
/// `MIN_YEAR..=MAX_YEAR` are rejected.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .filter(ts_in_range)
}

#[derive(Debug)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Educator,
    Trainer,
    Admin,
}

string_enum!(Role, "role", {
    Educator => "educator",
    Trainer => "trainer",
    Admin => "admin",
});

impl Role {
    /// Trainers and admins supervise educators and may read across them.
    pub fn is_supervisor(self) -> bool {
        matches!(self, Role::Trainer | Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

string_enum!(AppointmentStatus, "status", {
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub educator_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes)
    }

    /// Cancelled appointments free their slot.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    /// Half-open interval intersection with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.scheduled_at < end && start < self.ends_at()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub educator_id: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        if let Some(id) = &self.educator_id {
            if &a.educator_id != id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if a.status != status {
                return false;
            }
        }
        if let Some(from) = self.from {
            if a.scheduled_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if a.scheduled_at > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub id: String,
    pub educator_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_appointments: i64,
    pub conversions: i64,
    pub feedback_score: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Video,
    Link,
}

string_enum!(ResourceType, "resource type", {
    Document => "document",
    Video => "video",
    Link => "link",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingResource {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub file_url: String,
    pub category: String,
    pub uploaded_by: String,
    pub access_roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
}

impl TrainingResource {
    pub fn visible_to(&self, role: Role) -> bool {
        self.access_roles.contains(&role)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub category: Option<String>,
    pub resource_type: Option<ResourceType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Direct,
    Group,
}

string_enum!(ConversationType, "conversation type", {
    Direct => "direct",
    Group => "group",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participant_ids: Vec<String>,
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|p| p == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub content: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Lead,
    Contacted,
    Interested,
    Negotiating,
    Converted,
    Lost,
}

string_enum!(PipelineStage, "stage", {
    Lead => "lead",
    Contacted => "contacted",
    Interested => "interested",
    Negotiating => "negotiating",
    Converted => "converted",
    Lost => "lost",
});

impl PipelineStage {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Lead => "New Lead",
            PipelineStage::Contacted => "Contacted",
            PipelineStage::Interested => "Interested",
            PipelineStage::Negotiating => "Negotiating",
            PipelineStage::Converted => "Converted",
            PipelineStage::Lost => "Lost",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadKind {
    Customer,
    PotentialEducator,
}

string_enum!(LeadKind, "lead kind", {
    Customer => "customer",
    PotentialEducator => "potential_educator",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub educator_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub stage: PipelineStage,
    pub source: String,
    pub value: f64,
    pub notes: Option<String>,
    pub kind: LeadKind,
    pub last_contact: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Session,
    Package,
    Subscription,
}

string_enum!(PaymentType, "payment type", {
    Session => "session",
    Package => "package",
    Subscription => "subscription",
});

/// An invoice raised by an educator. `settled_at` is set once it leaves
/// `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub educator_id: String,
    pub client_name: String,
    pub client_email: String,
    pub amount: f64,
    pub description: String,
    pub status: PaymentStatus,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Contract,
    Agreement,
    Form,
    Template,
}

string_enum!(DocumentType, "document type", {
    Contract => "contract",
    Agreement => "agreement",
    Form => "form",
    Template => "template",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Sent,
    Signed,
    Expired,
}

string_enum!(DocumentStatus, "document status", {
    Draft => "draft",
    Sent => "sent",
    Signed => "signed",
    Expired => "expired",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedDocument {
    pub id: String,
    pub educator_id: String,
    pub template_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub recipient: String,
    pub recipient_email: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signed_by: Option<String>,
}
