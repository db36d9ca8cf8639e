//! Persistence seam. Handlers only talk to `dyn Store`; the workspace SQLite
//! file and the in-memory demo store are interchangeable behind it.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::model::{
    Appointment, AppointmentFilter, Conversation, Lead, Message, Payment, PaymentStatus,
    PerformanceMetric, PipelineStage, ResourceFilter, Role, SignedDocument, TrainingResource,
    User,
};
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

pub trait UserRepository {
    fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;
    fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    fn count_users(&self) -> StoreResult<usize>;
    /// Fails with `Validation` when the e-mail is already registered.
    fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    fn update_user(&mut self, user: &User) -> StoreResult<()>;
}

pub trait AppointmentRepository {
    /// Ascending by `scheduled_at`.
    fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>>;
    fn get_appointment(&self, id: &str) -> StoreResult<Option<Appointment>>;
    /// Rejects with `SlotUnavailable` when the appointment occupies a slot that
    /// overlaps another occupying appointment of the same educator.
    fn insert_appointment(&mut self, appt: &Appointment) -> StoreResult<()>;
    /// Same overlap rule as insert, ignoring the appointment itself.
    fn update_appointment(&mut self, appt: &Appointment) -> StoreResult<()>;
    fn delete_appointment(&mut self, id: &str) -> StoreResult<()>;
}

pub trait MetricRepository {
    /// Newest period first.
    fn list_metrics(&self, educator_id: Option<&str>) -> StoreResult<Vec<PerformanceMetric>>;
    fn get_metric(&self, id: &str) -> StoreResult<Option<PerformanceMetric>>;
    fn insert_metric(&mut self, metric: &PerformanceMetric) -> StoreResult<()>;
    fn delete_metric(&mut self, id: &str) -> StoreResult<()>;
}

pub trait ResourceRepository {
    /// Newest first. Role gating is applied by the caller.
    fn list_resources(&self, filter: &ResourceFilter) -> StoreResult<Vec<TrainingResource>>;
    fn insert_resource(&mut self, resource: &TrainingResource) -> StoreResult<()>;
    fn delete_resource(&mut self, id: &str) -> StoreResult<()>;
}

pub trait MessageRepository {
    fn list_conversations_for(&self, user_id: &str) -> StoreResult<Vec<Conversation>>;
    fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>>;
    fn insert_conversation(&mut self, conversation: &Conversation) -> StoreResult<()>;
    /// Ascending by creation; `since` is exclusive.
    fn list_messages(
        &self,
        conversation_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>>;
    fn insert_message(&mut self, message: &Message) -> StoreResult<()>;
    /// Marks every unread message not sent by `reader_id`; returns how many.
    fn mark_read(
        &mut self,
        conversation_id: &str,
        reader_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<usize>;
    fn count_unread_for(&self, user_id: &str) -> StoreResult<usize>;
}

pub trait LeadRepository {
    /// Oldest first within the owner.
    fn list_leads(&self, educator_id: &str, stage: Option<PipelineStage>) -> StoreResult<Vec<Lead>>;
    fn get_lead(&self, id: &str) -> StoreResult<Option<Lead>>;
    fn insert_lead(&mut self, lead: &Lead) -> StoreResult<()>;
    fn update_lead(&mut self, lead: &Lead) -> StoreResult<()>;
    fn delete_lead(&mut self, id: &str) -> StoreResult<()>;
}

pub trait PaymentRepository {
    /// Newest first.
    fn list_payments(
        &self,
        educator_id: &str,
        status: Option<PaymentStatus>,
    ) -> StoreResult<Vec<Payment>>;
    fn get_payment(&self, id: &str) -> StoreResult<Option<Payment>>;
    fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;
    fn update_payment(&mut self, payment: &Payment) -> StoreResult<()>;
}

pub trait DocumentRepository {
    /// Newest first.
    fn list_documents(&self, educator_id: &str) -> StoreResult<Vec<SignedDocument>>;
    fn get_document(&self, id: &str) -> StoreResult<Option<SignedDocument>>;
    fn insert_document(&mut self, doc: &SignedDocument) -> StoreResult<()>;
    fn update_document(&mut self, doc: &SignedDocument) -> StoreResult<()>;
    fn delete_document(&mut self, id: &str) -> StoreResult<()>;
}

pub trait Store:
    UserRepository
    + AppointmentRepository
    + MetricRepository
    + ResourceRepository
    + MessageRepository
    + LeadRepository
    + PaymentRepository
    + DocumentRepository
{
    /// "sqlite" or "memory"; reported by `health`.
    fn kind(&self) -> &'static str;
}
