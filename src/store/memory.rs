use super::{
    AppointmentRepository, DocumentRepository, LeadRepository, MessageRepository,
    MetricRepository, PaymentRepository, ResourceRepository, Store, StoreResult, UserRepository,
};
use crate::error::StoreError;
use crate::model::{
    timestamp_now, Appointment, AppointmentFilter, Conversation, Lead, Message, Payment,
    PaymentStatus, PerformanceMetric, PipelineStage, ResourceFilter, Role, SignedDocument,
    TrainingResource, User,
};
use chrono::{DateTime, Utc};

/// Demo-mode store. Vectors keep insertion order, which stands in for the
/// SQLite `rowid` tie-break.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Vec<User>,
    appointments: Vec<Appointment>,
    metrics: Vec<PerformanceMetric>,
    resources: Vec<TrainingResource>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    leads: Vec<Lead>,
    payments: Vec<Payment>,
    documents: Vec<SignedDocument>,
}

/// Users seeded into a fresh demo store, one per role.
pub const DEMO_USERS: [(&str, &str, Role); 3] = [
    ("demo.educator@example.com", "Demo Educator", Role::Educator),
    ("demo.trainer@example.com", "Demo Trainer", Role::Trainer),
    ("demo.admin@example.com", "Demo Admin", Role::Admin),
];

impl MemoryStore {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demo_users() -> Self {
        let now = timestamp_now();
        let users = DEMO_USERS
            .iter()
            .enumerate()
            .map(|(i, (email, name, role))| User {
                id: format!("demo-user-{}", i + 1),
                email: email.to_string(),
                full_name: name.to_string(),
                avatar_url: None,
                role: *role,
                created_at: now,
            })
            .collect();
        Self {
            users,
            ..Self::default()
        }
    }

    fn find_conflict(&self, appt: &Appointment) -> Option<String> {
        if !appt.occupies_slot() {
            return None;
        }
        let mut hits: Vec<&Appointment> = self
            .appointments
            .iter()
            .filter(|a| {
                a.educator_id == appt.educator_id
                    && a.id != appt.id
                    && a.occupies_slot()
                    && a.overlaps(appt.scheduled_at, appt.ends_at())
            })
            .collect();
        hits.sort_by_key(|a| a.scheduled_at);
        hits.first().map(|a| a.id.clone())
    }
}

fn replace_by_id<T, F>(items: &mut [T], id: &str, get_id: F, value: &T, entity: &'static str) -> StoreResult<()>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    match items.iter_mut().find(|it| get_id(it) == id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(StoreError::not_found(entity)),
    }
}

fn remove_by_id<T, F>(items: &mut Vec<T>, id: &str, get_id: F, entity: &'static str) -> StoreResult<()>
where
    F: Fn(&T) -> &str,
{
    let before = items.len();
    items.retain(|it| get_id(it) != id);
    if items.len() == before {
        Err(StoreError::not_found(entity))
    } else {
        Ok(())
    }
}

impl UserRepository for MemoryStore {
    fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let mut out: Vec<User> = self
            .users
            .iter()
            .filter(|u| role.map(|r| u.role == r).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.full_name, &a.email).cmp(&(&b.full_name, &b.email)));
        Ok(out)
    }

    fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let needle = email.trim();
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(needle))
            .cloned())
    }

    fn count_users(&self) -> StoreResult<usize> {
        Ok(self.users.len())
    }

    fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.find_user_by_email(&user.email)?.is_some() {
            return Err(StoreError::validation("email already registered"));
        }
        self.users.push(user.clone());
        Ok(())
    }

    fn update_user(&mut self, user: &User) -> StoreResult<()> {
        replace_by_id(&mut self.users, &user.id, |u| u.id.as_str(), user, "user")
    }
}

impl AppointmentRepository for MemoryStore {
    fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let mut out: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal start times.
        out.sort_by_key(|a| a.scheduled_at);
        Ok(out)
    }

    fn get_appointment(&self, id: &str) -> StoreResult<Option<Appointment>> {
        Ok(self.appointments.iter().find(|a| a.id == id).cloned())
    }

    fn insert_appointment(&mut self, appt: &Appointment) -> StoreResult<()> {
        if let Some(conflicting_id) = self.find_conflict(appt) {
            return Err(StoreError::SlotUnavailable { conflicting_id });
        }
        self.appointments.push(appt.clone());
        Ok(())
    }

    fn update_appointment(&mut self, appt: &Appointment) -> StoreResult<()> {
        if let Some(conflicting_id) = self.find_conflict(appt) {
            return Err(StoreError::SlotUnavailable { conflicting_id });
        }
        replace_by_id(
            &mut self.appointments,
            &appt.id,
            |a| a.id.as_str(),
            appt,
            "appointment",
        )
    }

    fn delete_appointment(&mut self, id: &str) -> StoreResult<()> {
        remove_by_id(&mut self.appointments, id, |a| a.id.as_str(), "appointment")
    }
}

impl MetricRepository for MemoryStore {
    fn list_metrics(&self, educator_id: Option<&str>) -> StoreResult<Vec<PerformanceMetric>> {
        let mut out: Vec<PerformanceMetric> = self
            .metrics
            .iter()
            .filter(|m| educator_id.map(|id| m.educator_id == id).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (b.period_start, b.created_at).cmp(&(a.period_start, a.created_at))
        });
        Ok(out)
    }

    fn get_metric(&self, id: &str) -> StoreResult<Option<PerformanceMetric>> {
        Ok(self.metrics.iter().find(|m| m.id == id).cloned())
    }

    fn insert_metric(&mut self, metric: &PerformanceMetric) -> StoreResult<()> {
        self.metrics.push(metric.clone());
        Ok(())
    }

    fn delete_metric(&mut self, id: &str) -> StoreResult<()> {
        remove_by_id(&mut self.metrics, id, |m| m.id.as_str(), "metric")
    }
}

impl ResourceRepository for MemoryStore {
    fn list_resources(&self, filter: &ResourceFilter) -> StoreResult<Vec<TrainingResource>> {
        let mut out: Vec<TrainingResource> = self
            .resources
            .iter()
            .rev()
            .filter(|r| {
                filter
                    .category
                    .as_ref()
                    .map(|c| &r.category == c)
                    .unwrap_or(true)
                    && filter
                        .resource_type
                        .map(|t| r.resource_type == t)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn insert_resource(&mut self, resource: &TrainingResource) -> StoreResult<()> {
        self.resources.push(resource.clone());
        Ok(())
    }

    fn delete_resource(&mut self, id: &str) -> StoreResult<()> {
        remove_by_id(&mut self.resources, id, |r| r.id.as_str(), "resource")
    }
}

impl MessageRepository for MemoryStore {
    fn list_conversations_for(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        Ok(self
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect())
    }

    fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        Ok(self.conversations.iter().find(|c| c.id == id).cloned())
    }

    fn insert_conversation(&mut self, conversation: &Conversation) -> StoreResult<()> {
        self.conversations.push(conversation.clone());
        Ok(())
    }

    fn list_messages(
        &self,
        conversation_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        let mut out: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| since.map(|t| m.created_at > t).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        Ok(out)
    }

    fn insert_message(&mut self, message: &Message) -> StoreResult<()> {
        self.messages.push(message.clone());
        Ok(())
    }

    fn mark_read(
        &mut self,
        conversation_id: &str,
        reader_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut n = 0;
        for m in self.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id && m.sender_id != reader_id && m.read_at.is_none()
        }) {
            m.read_at = Some(at);
            n += 1;
        }
        Ok(n)
    }

    fn count_unread_for(&self, user_id: &str) -> StoreResult<usize> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.sender_id != user_id && m.read_at.is_none())
            .filter(|m| {
                self.conversations
                    .iter()
                    .any(|c| c.id == m.conversation_id && c.has_participant(user_id))
            })
            .count())
    }
}

impl LeadRepository for MemoryStore {
    fn list_leads(&self, educator_id: &str, stage: Option<PipelineStage>) -> StoreResult<Vec<Lead>> {
        let mut out: Vec<Lead> = self
            .leads
            .iter()
            .filter(|l| l.educator_id == educator_id)
            .filter(|l| stage.map(|s| l.stage == s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|l| l.created_at);
        Ok(out)
    }

    fn get_lead(&self, id: &str) -> StoreResult<Option<Lead>> {
        Ok(self.leads.iter().find(|l| l.id == id).cloned())
    }

    fn insert_lead(&mut self, lead: &Lead) -> StoreResult<()> {
        self.leads.push(lead.clone());
        Ok(())
    }

    fn update_lead(&mut self, lead: &Lead) -> StoreResult<()> {
        replace_by_id(&mut self.leads, &lead.id, |l| l.id.as_str(), lead, "lead")
    }

    fn delete_lead(&mut self, id: &str) -> StoreResult<()> {
        remove_by_id(&mut self.leads, id, |l| l.id.as_str(), "lead")
    }
}

/// Newest first; later inserts win ties, as `rowid DESC` does in SQLite.
fn newest_first<T>(
    items: impl Iterator<Item = T>,
    created: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.reverse();
    out.sort_by_key(|it| std::cmp::Reverse(created(it)));
    out
}

impl PaymentRepository for MemoryStore {
    fn list_payments(
        &self,
        educator_id: &str,
        status: Option<PaymentStatus>,
    ) -> StoreResult<Vec<Payment>> {
        let mine = self
            .payments
            .iter()
            .filter(|p| p.educator_id == educator_id)
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned();
        Ok(newest_first(mine, |p| p.created_at))
    }

    fn get_payment(&self, id: &str) -> StoreResult<Option<Payment>> {
        Ok(self.payments.iter().find(|p| p.id == id).cloned())
    }

    fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.payments.push(payment.clone());
        Ok(())
    }

    fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        replace_by_id(&mut self.payments, &payment.id, |p| p.id.as_str(), payment, "payment")
    }
}

impl DocumentRepository for MemoryStore {
    fn list_documents(&self, educator_id: &str) -> StoreResult<Vec<SignedDocument>> {
        let mine = self
            .documents
            .iter()
            .filter(|d| d.educator_id == educator_id)
            .cloned();
        Ok(newest_first(mine, |d| d.created_at))
    }

    fn get_document(&self, id: &str) -> StoreResult<Option<SignedDocument>> {
        Ok(self.documents.iter().find(|d| d.id == id).cloned())
    }

    fn insert_document(&mut self, doc: &SignedDocument) -> StoreResult<()> {
        self.documents.push(doc.clone());
        Ok(())
    }

    fn update_document(&mut self, doc: &SignedDocument) -> StoreResult<()> {
        replace_by_id(&mut self.documents, &doc.id, |d| d.id.as_str(), doc, "document")
    }

    fn delete_document(&mut self, id: &str) -> StoreResult<()> {
        remove_by_id(&mut self.documents, id, |d| d.id.as_str(), "document")
    }
}

impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;
    use chrono::{Duration, TimeZone};

    fn appt(id: &str, educator: &str, start: DateTime<Utc>, minutes: i64) -> Appointment {
        Appointment {
            id: id.into(),
            educator_id: educator.into(),
            client_name: "Client".into(),
            client_email: "client@example.com".into(),
            client_phone: None,
            scheduled_at: start,
            duration_minutes: minutes,
            status: AppointmentStatus::Scheduled,
            notes: None,
            outcome: None,
            created_at: start,
        }
    }

    #[test]
    fn overlapping_insert_is_rejected_per_educator() {
        let mut store = MemoryStore::new();
        let nine = Utc.with_ymd_and_hms(2030, 3, 4, 9, 0, 0).unwrap();
        store.insert_appointment(&appt("a", "e1", nine, 60)).unwrap();

        let clash = store.insert_appointment(&appt("b", "e1", nine + Duration::minutes(30), 30));
        assert!(matches!(
            clash,
            Err(StoreError::SlotUnavailable { ref conflicting_id }) if conflicting_id == "a"
        ));

        // Another educator's calendar is independent.
        store.insert_appointment(&appt("c", "e2", nine, 60)).unwrap();
        // Back-to-back is fine.
        store
            .insert_appointment(&appt("d", "e1", nine + Duration::minutes(60), 30))
            .unwrap();
    }

    #[test]
    fn cancelled_appointments_release_their_slot() {
        let mut store = MemoryStore::new();
        let nine = Utc.with_ymd_and_hms(2030, 3, 4, 9, 0, 0).unwrap();
        let mut first = appt("a", "e1", nine, 60);
        store.insert_appointment(&first).unwrap();
        first.status = AppointmentStatus::Cancelled;
        store.update_appointment(&first).unwrap();

        store.insert_appointment(&appt("b", "e1", nine, 60)).unwrap();

        // Reactivating the cancelled one now collides.
        first.status = AppointmentStatus::Scheduled;
        assert!(matches!(
            store.update_appointment(&first),
            Err(StoreError::SlotUnavailable { .. })
        ));
    }

    #[test]
    fn list_is_ascending_and_filtered() {
        let mut store = MemoryStore::new();
        let base = Utc.with_ymd_and_hms(2030, 3, 4, 9, 0, 0).unwrap();
        store.insert_appointment(&appt("late", "e1", base + Duration::days(2), 30)).unwrap();
        store.insert_appointment(&appt("early", "e1", base, 30)).unwrap();
        store.insert_appointment(&appt("other", "e2", base + Duration::days(1), 30)).unwrap();

        let all = store.list_appointments(&AppointmentFilter::default()).unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "other", "late"]);

        let mine = store
            .list_appointments(&AppointmentFilter {
                educator_id: Some("e1".into()),
                to: Some(base + Duration::days(1)),
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "early");
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let mut store = MemoryStore::with_demo_users();
        assert_eq!(store.count_users().unwrap(), 3);
        assert!(matches!(
            store.delete_appointment("nope"),
            Err(StoreError::NotFound { entity: "appointment" })
        ));
    }

    #[test]
    fn payments_list_newest_first_per_owner() {
        use crate::model::PaymentType;
        let mut store = MemoryStore::new();
        let t = Utc.with_ymd_and_hms(2031, 1, 5, 9, 0, 0).unwrap();
        let rows = [
            ("old", "e1", t),
            ("new", "e1", t + Duration::days(1)),
            ("tie", "e1", t),
            ("x", "e2", t),
        ];
        for (id, owner, at) in rows {
            store
                .insert_payment(&Payment {
                    id: id.into(),
                    educator_id: owner.into(),
                    client_name: "Client".into(),
                    client_email: "c@example.com".into(),
                    amount: 150.0,
                    description: "Invoice".into(),
                    status: PaymentStatus::Pending,
                    payment_type: PaymentType::Session,
                    created_at: at,
                    settled_at: None,
                })
                .unwrap();
        }
        let ids: Vec<String> = store
            .list_payments("e1", None)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["new", "tie", "old"]);
        assert!(store.list_payments("e1", Some(PaymentStatus::Completed)).unwrap().is_empty());
        assert!(matches!(
            store.delete_document("nope"),
            Err(StoreError::NotFound { entity: "document" })
        ));
    }
}
