use super::{
    AppointmentRepository, DocumentRepository, LeadRepository, MessageRepository,
    MetricRepository, PaymentRepository, ResourceRepository, Store, StoreResult, UserRepository,
};
use crate::db;
use crate::error::StoreError;
use crate::model::{
    clamp_ts, fmt_ts, parse_ts, Appointment, AppointmentFilter, Conversation, ConversationType,
    Lead, Message, Payment, PaymentStatus, PerformanceMetric, PipelineStage, ResourceFilter, Role,
    SignedDocument, TrainingResource, User,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn participants(&self, conversation_id: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM conversation_participants
             WHERE conversation_id = ?
             ORDER BY position",
        )?;
        let ids = stmt
            .query_map([conversation_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => parse_ts(&s)
            .map(Some)
            .ok_or_else(|| conversion_err(idx, InvalidText(s))),
        None => Ok(None),
    }
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_err(idx, e))
}

fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_err(idx, e))
}

#[derive(Debug)]
struct InvalidText(String);

impl std::fmt::Display for InvalidText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unparseable value: {}", self.0)
    }
}

impl std::error::Error for InvalidText {}

fn encode_roles(roles: &[Role]) -> String {
    roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(",")
}

fn decode_roles(raw: &str) -> Result<Vec<Role>, crate::model::ParseEnumError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Role::from_str)
        .collect()
}

const USER_COLS: &str = "id, email, full_name, avatar_url, role, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        avatar_url: row.get(3)?,
        role: enum_col(row, 4)?,
        created_at: ts_col(row, 5)?,
    })
}

const APPOINTMENT_COLS: &str = "id, educator_id, client_name, client_email, client_phone,
    scheduled_at, duration_minutes, status, notes, outcome, created_at";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        educator_id: row.get(1)?,
        client_name: row.get(2)?,
        client_email: row.get(3)?,
        client_phone: row.get(4)?,
        scheduled_at: ts_col(row, 5)?,
        duration_minutes: row.get(6)?,
        status: enum_col(row, 7)?,
        notes: row.get(8)?,
        outcome: row.get(9)?,
        created_at: ts_col(row, 10)?,
    })
}

const METRIC_COLS: &str = "id, educator_id, period_start, period_end, total_appointments,
    conversions, feedback_score, notes, created_at";

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<PerformanceMetric> {
    Ok(PerformanceMetric {
        id: row.get(0)?,
        educator_id: row.get(1)?,
        period_start: date_col(row, 2)?,
        period_end: date_col(row, 3)?,
        total_appointments: row.get(4)?,
        conversions: row.get(5)?,
        feedback_score: row.get(6)?,
        notes: row.get(7)?,
        created_at: ts_col(row, 8)?,
    })
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<TrainingResource> {
    let roles_raw: String = row.get(7)?;
    Ok(TrainingResource {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        resource_type: enum_col(row, 3)?,
        file_url: row.get(4)?,
        category: row.get(5)?,
        uploaded_by: row.get(6)?,
        access_roles: decode_roles(&roles_raw).map_err(|e| conversion_err(7, e))?,
        created_at: ts_col(row, 8)?,
    })
}

const MESSAGE_COLS: &str =
    "id, conversation_id, sender_id, receiver_id, content, read_at, created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        content: row.get(4)?,
        read_at: opt_ts_col(row, 5)?,
        created_at: ts_col(row, 6)?,
    })
}

const LEAD_COLS: &str = "id, educator_id, name, email, phone, stage, source, value, notes,
    kind, last_contact, created_at";

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        educator_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        stage: enum_col(row, 5)?,
        source: row.get(6)?,
        value: row.get(7)?,
        notes: row.get(8)?,
        kind: enum_col(row, 9)?,
        last_contact: ts_col(row, 10)?,
        created_at: ts_col(row, 11)?,
    })
}

const PAYMENT_COLS: &str = "id, educator_id, client_name, client_email, amount, description,
    status, type, created_at, settled_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        educator_id: row.get(1)?,
        client_name: row.get(2)?,
        client_email: row.get(3)?,
        amount: row.get(4)?,
        description: row.get(5)?,
        status: enum_col(row, 6)?,
        payment_type: enum_col(row, 7)?,
        created_at: ts_col(row, 8)?,
        settled_at: opt_ts_col(row, 9)?,
    })
}

const DOCUMENT_COLS: &str = "id, educator_id, template_id, name, type, status, recipient,
    recipient_email, created_at, sent_at, expires_at, signed_at, signed_by";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<SignedDocument> {
    Ok(SignedDocument {
        id: row.get(0)?,
        educator_id: row.get(1)?,
        template_id: row.get(2)?,
        name: row.get(3)?,
        document_type: enum_col(row, 4)?,
        status: enum_col(row, 5)?,
        recipient: row.get(6)?,
        recipient_email: row.get(7)?,
        created_at: ts_col(row, 8)?,
        sent_at: opt_ts_col(row, 9)?,
        expires_at: opt_ts_col(row, 10)?,
        signed_at: opt_ts_col(row, 11)?,
        signed_by: row.get(12)?,
    })
}

/// Returns the id of an occupying appointment of `appt.educator_id` whose
/// interval intersects `appt`, ignoring `appt` itself.
fn find_conflict(conn: &Connection, appt: &Appointment) -> StoreResult<Option<String>> {
    if !appt.occupies_slot() {
        return Ok(None);
    }
    let conflict = conn
        .query_row(
            "SELECT id FROM appointments
             WHERE educator_id = ?1
               AND id != ?2
               AND status != 'cancelled'
               AND scheduled_at < ?3
               AND ends_at > ?4
             ORDER BY scheduled_at
             LIMIT 1",
            params![
                appt.educator_id,
                appt.id,
                fmt_ts(&appt.ends_at()),
                fmt_ts(&appt.scheduled_at)
            ],
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(conflict)
}

fn affected_or_not_found(n: usize, entity: &'static str) -> StoreResult<()> {
    if n == 0 {
        Err(StoreError::not_found(entity))
    } else {
        Ok(())
    }
}

impl UserRepository for SqliteStore {
    fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let mut sql = format!("SELECT {USER_COLS} FROM users");
        let mut binds: Vec<Value> = Vec::new();
        if let Some(r) = role {
            sql.push_str(" WHERE role = ?");
            binds.push(Value::Text(r.as_str().to_string()));
        }
        sql.push_str(" ORDER BY full_name, email");
        let mut stmt = self.conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(binds), user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM users WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], user_from_row).optional()?)
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM users WHERE lower(email) = lower(?)");
        Ok(self
            .conn
            .query_row(&sql, [email.trim()], user_from_row)
            .optional()?)
    }

    fn count_users(&self) -> StoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.find_user_by_email(&user.email)?.is_some() {
            return Err(StoreError::validation("email already registered"));
        }
        self.conn.execute(
            "INSERT INTO users(id, email, full_name, avatar_url, role, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            params![
                user.id,
                user.email,
                user.full_name,
                user.avatar_url,
                user.role.as_str(),
                fmt_ts(&user.created_at)
            ],
        )?;
        Ok(())
    }

    fn update_user(&mut self, user: &User) -> StoreResult<()> {
        let n = self.conn.execute(
            "UPDATE users SET full_name = ?, avatar_url = ?, role = ? WHERE id = ?",
            params![user.full_name, user.avatar_url, user.role.as_str(), user.id],
        )?;
        affected_or_not_found(n, "user")
    }
}

impl AppointmentRepository for SqliteStore {
    fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let mut sql = format!("SELECT {APPOINTMENT_COLS} FROM appointments WHERE 1 = 1");
        let mut binds: Vec<Value> = Vec::new();
        if let Some(id) = &filter.educator_id {
            sql.push_str(" AND educator_id = ?");
            binds.push(Value::Text(id.clone()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(Value::Text(status.as_str().to_string()));
        }
        // Text comparison only orders correctly for four-digit years.
        if let Some(from) = filter.from {
            sql.push_str(" AND scheduled_at >= ?");
            binds.push(Value::Text(fmt_ts(&clamp_ts(from))));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND scheduled_at <= ?");
            binds.push(Value::Text(fmt_ts(&clamp_ts(to))));
        }
        sql.push_str(" ORDER BY scheduled_at, rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), appointment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_appointment(&self, id: &str) -> StoreResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLS} FROM appointments WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [id], appointment_from_row)
            .optional()?)
    }

    fn insert_appointment(&mut self, appt: &Appointment) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        if let Some(conflicting_id) = find_conflict(&tx, appt)? {
            return Err(StoreError::SlotUnavailable { conflicting_id });
        }
        tx.execute(
            "INSERT INTO appointments(
                id, educator_id, client_name, client_email, client_phone,
                scheduled_at, ends_at, duration_minutes, status, notes, outcome, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                appt.id,
                appt.educator_id,
                appt.client_name,
                appt.client_email,
                appt.client_phone,
                fmt_ts(&appt.scheduled_at),
                fmt_ts(&appt.ends_at()),
                appt.duration_minutes,
                appt.status.as_str(),
                appt.notes,
                appt.outcome,
                fmt_ts(&appt.created_at)
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_appointment(&mut self, appt: &Appointment) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        if let Some(conflicting_id) = find_conflict(&tx, appt)? {
            return Err(StoreError::SlotUnavailable { conflicting_id });
        }
        let n = tx.execute(
            "UPDATE appointments SET
                client_name = ?, client_email = ?, client_phone = ?,
                scheduled_at = ?, ends_at = ?, duration_minutes = ?,
                status = ?, notes = ?, outcome = ?
             WHERE id = ?",
            params![
                appt.client_name,
                appt.client_email,
                appt.client_phone,
                fmt_ts(&appt.scheduled_at),
                fmt_ts(&appt.ends_at()),
                appt.duration_minutes,
                appt.status.as_str(),
                appt.notes,
                appt.outcome,
                appt.id
            ],
        )?;
        affected_or_not_found(n, "appointment")?;
        tx.commit()?;
        Ok(())
    }

    fn delete_appointment(&mut self, id: &str) -> StoreResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM appointments WHERE id = ?", [id])?;
        affected_or_not_found(n, "appointment")
    }
}

impl MetricRepository for SqliteStore {
    fn list_metrics(&self, educator_id: Option<&str>) -> StoreResult<Vec<PerformanceMetric>> {
        let mut sql = format!("SELECT {METRIC_COLS} FROM performance_metrics");
        let mut binds: Vec<Value> = Vec::new();
        if let Some(id) = educator_id {
            sql.push_str(" WHERE educator_id = ?");
            binds.push(Value::Text(id.to_string()));
        }
        sql.push_str(" ORDER BY period_start DESC, created_at DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), metric_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_metric(&self, id: &str) -> StoreResult<Option<PerformanceMetric>> {
        let sql = format!("SELECT {METRIC_COLS} FROM performance_metrics WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], metric_from_row).optional()?)
    }

    fn insert_metric(&mut self, m: &PerformanceMetric) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO performance_metrics(
                id, educator_id, period_start, period_end, total_appointments,
                conversions, feedback_score, notes, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                m.id,
                m.educator_id,
                m.period_start.format("%Y-%m-%d").to_string(),
                m.period_end.format("%Y-%m-%d").to_string(),
                m.total_appointments,
                m.conversions,
                m.feedback_score,
                m.notes,
                fmt_ts(&m.created_at)
            ],
        )?;
        Ok(())
    }

    fn delete_metric(&mut self, id: &str) -> StoreResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM performance_metrics WHERE id = ?", [id])?;
        affected_or_not_found(n, "metric")
    }
}

impl ResourceRepository for SqliteStore {
    fn list_resources(&self, filter: &ResourceFilter) -> StoreResult<Vec<TrainingResource>> {
        let mut sql = "SELECT id, title, description, type, file_url, category, uploaded_by,
                access_roles, created_at
             FROM training_resources WHERE 1 = 1"
            .to_string();
        let mut binds: Vec<Value> = Vec::new();
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            binds.push(Value::Text(category.clone()));
        }
        if let Some(t) = filter.resource_type {
            sql.push_str(" AND type = ?");
            binds.push(Value::Text(t.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), resource_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_resource(&mut self, r: &TrainingResource) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO training_resources(
                id, title, description, type, file_url, category, uploaded_by,
                access_roles, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                r.id,
                r.title,
                r.description,
                r.resource_type.as_str(),
                r.file_url,
                r.category,
                r.uploaded_by,
                encode_roles(&r.access_roles),
                fmt_ts(&r.created_at)
            ],
        )?;
        Ok(())
    }

    fn delete_resource(&mut self, id: &str) -> StoreResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM training_resources WHERE id = ?", [id])?;
        affected_or_not_found(n, "resource")
    }
}

impl MessageRepository for SqliteStore {
    fn list_conversations_for(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.type, c.name, c.created_at
             FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?
             ORDER BY c.created_at, c.rowid",
        )?;
        let heads = stmt
            .query_map([user_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    enum_col::<ConversationType>(r, 1)?,
                    r.get::<_, Option<String>>(2)?,
                    ts_col(r, 3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(heads.len());
        for (id, conversation_type, name, created_at) in heads {
            let participant_ids = self.participants(&id)?;
            out.push(Conversation {
                id,
                participant_ids,
                conversation_type,
                name,
                created_at,
            });
        }
        Ok(out)
    }

    fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let head = self
            .conn
            .query_row(
                "SELECT type, name, created_at FROM conversations WHERE id = ?",
                [id],
                |r| {
                    Ok((
                        enum_col::<ConversationType>(r, 0)?,
                        r.get::<_, Option<String>>(1)?,
                        ts_col(r, 2)?,
                    ))
                },
            )
            .optional()?;
        let Some((conversation_type, name, created_at)) = head else {
            return Ok(None);
        };
        Ok(Some(Conversation {
            id: id.to_string(),
            participant_ids: self.participants(id)?,
            conversation_type,
            name,
            created_at,
        }))
    }

    fn insert_conversation(&mut self, c: &Conversation) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO conversations(id, type, name, created_at) VALUES(?, ?, ?, ?)",
            params![
                c.id,
                c.conversation_type.as_str(),
                c.name,
                fmt_ts(&c.created_at)
            ],
        )?;
        for (i, user_id) in c.participant_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO conversation_participants(conversation_id, user_id, position)
                 VALUES(?, ?, ?)",
                params![c.id, user_id, i as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_messages(
        &self,
        conversation_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        let mut sql = format!("SELECT {MESSAGE_COLS} FROM messages WHERE conversation_id = ?");
        let mut binds: Vec<Value> = vec![Value::Text(conversation_id.to_string())];
        if let Some(t) = since {
            sql.push_str(" AND created_at > ?");
            binds.push(Value::Text(fmt_ts(&t)));
        }
        sql.push_str(" ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_message(&mut self, m: &Message) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO messages(
                id, conversation_id, sender_id, receiver_id, content, read_at, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            params![
                m.id,
                m.conversation_id,
                m.sender_id,
                m.receiver_id,
                m.content,
                m.read_at.as_ref().map(fmt_ts),
                fmt_ts(&m.created_at)
            ],
        )?;
        Ok(())
    }

    fn mark_read(
        &mut self,
        conversation_id: &str,
        reader_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let n = self.conn.execute(
            "UPDATE messages SET read_at = ?
             WHERE conversation_id = ? AND sender_id != ? AND read_at IS NULL",
            params![fmt_ts(&at), conversation_id, reader_id],
        )?;
        Ok(n)
    }

    fn count_unread_for(&self, user_id: &str) -> StoreResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM messages m
             JOIN conversation_participants p
               ON p.conversation_id = m.conversation_id AND p.user_id = ?1
             WHERE m.sender_id != ?1 AND m.read_at IS NULL",
            [user_id],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

impl LeadRepository for SqliteStore {
    fn list_leads(&self, educator_id: &str, stage: Option<PipelineStage>) -> StoreResult<Vec<Lead>> {
        let mut sql = format!("SELECT {LEAD_COLS} FROM leads WHERE educator_id = ?");
        let mut binds: Vec<Value> = vec![Value::Text(educator_id.to_string())];
        if let Some(s) = stage {
            sql.push_str(" AND stage = ?");
            binds.push(Value::Text(s.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), lead_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_lead(&self, id: &str) -> StoreResult<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLS} FROM leads WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], lead_from_row).optional()?)
    }

    fn insert_lead(&mut self, l: &Lead) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO leads(
                id, educator_id, name, email, phone, stage, source, value, notes,
                kind, last_contact, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                l.id,
                l.educator_id,
                l.name,
                l.email,
                l.phone,
                l.stage.as_str(),
                l.source,
                l.value,
                l.notes,
                l.kind.as_str(),
                fmt_ts(&l.last_contact),
                fmt_ts(&l.created_at)
            ],
        )?;
        Ok(())
    }

    fn update_lead(&mut self, l: &Lead) -> StoreResult<()> {
        let n = self.conn.execute(
            "UPDATE leads SET
                name = ?, email = ?, phone = ?, stage = ?, source = ?, value = ?,
                notes = ?, kind = ?, last_contact = ?
             WHERE id = ?",
            params![
                l.name,
                l.email,
                l.phone,
                l.stage.as_str(),
                l.source,
                l.value,
                l.notes,
                l.kind.as_str(),
                fmt_ts(&l.last_contact),
                l.id
            ],
        )?;
        affected_or_not_found(n, "lead")
    }

    fn delete_lead(&mut self, id: &str) -> StoreResult<()> {
        let n = self.conn.execute("DELETE FROM leads WHERE id = ?", [id])?;
        affected_or_not_found(n, "lead")
    }
}

impl PaymentRepository for SqliteStore {
    fn list_payments(
        &self,
        educator_id: &str,
        status: Option<PaymentStatus>,
    ) -> StoreResult<Vec<Payment>> {
        let mut sql = format!("SELECT {PAYMENT_COLS} FROM payments WHERE educator_id = ?");
        let mut binds: Vec<Value> = vec![Value::Text(educator_id.to_string())];
        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            binds.push(Value::Text(s.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), payment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_payment(&self, id: &str) -> StoreResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], payment_from_row).optional()?)
    }

    fn insert_payment(&mut self, p: &Payment) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO payments(
                id, educator_id, client_name, client_email, amount, description,
                status, type, created_at, settled_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                p.id,
                p.educator_id,
                p.client_name,
                p.client_email,
                p.amount,
                p.description,
                p.status.as_str(),
                p.payment_type.as_str(),
                fmt_ts(&p.created_at),
                p.settled_at.as_ref().map(fmt_ts)
            ],
        )?;
        Ok(())
    }

    fn update_payment(&mut self, p: &Payment) -> StoreResult<()> {
        let n = self.conn.execute(
            "UPDATE payments SET status = ?, settled_at = ? WHERE id = ?",
            params![p.status.as_str(), p.settled_at.as_ref().map(fmt_ts), p.id],
        )?;
        affected_or_not_found(n, "payment")
    }
}

impl DocumentRepository for SqliteStore {
    fn list_documents(&self, educator_id: &str) -> StoreResult<Vec<SignedDocument>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLS} FROM documents
             WHERE educator_id = ?
             ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([educator_id], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_document(&self, id: &str) -> StoreResult<Option<SignedDocument>> {
        let sql = format!("SELECT {DOCUMENT_COLS} FROM documents WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], document_from_row).optional()?)
    }

    fn insert_document(&mut self, d: &SignedDocument) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO documents(
                id, educator_id, template_id, name, type, status, recipient,
                recipient_email, created_at, sent_at, expires_at, signed_at, signed_by
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                d.id,
                d.educator_id,
                d.template_id,
                d.name,
                d.document_type.as_str(),
                d.status.as_str(),
                d.recipient,
                d.recipient_email,
                fmt_ts(&d.created_at),
                d.sent_at.as_ref().map(fmt_ts),
                d.expires_at.as_ref().map(fmt_ts),
                d.signed_at.as_ref().map(fmt_ts),
                d.signed_by
            ],
        )?;
        Ok(())
    }

    fn update_document(&mut self, d: &SignedDocument) -> StoreResult<()> {
        let n = self.conn.execute(
            "UPDATE documents SET
                status = ?, sent_at = ?, expires_at = ?, signed_at = ?, signed_by = ?
             WHERE id = ?",
            params![
                d.status.as_str(),
                d.sent_at.as_ref().map(fmt_ts),
                d.expires_at.as_ref().map(fmt_ts),
                d.signed_at.as_ref().map(fmt_ts),
                d.signed_by,
                d.id
            ],
        )?;
        affected_or_not_found(n, "document")
    }

    fn delete_document(&mut self, id: &str) -> StoreResult<()> {
        let n = self.conn.execute("DELETE FROM documents WHERE id = ?", [id])?;
        affected_or_not_found(n, "document")
    }
}

impl Store for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{timestamp_now, AppointmentStatus};
    use chrono::TimeZone;

    fn store_with_user(id: &str) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_user(&User {
                id: id.into(),
                email: format!("{id}@example.com"),
                full_name: id.into(),
                avatar_url: None,
                role: Role::Educator,
                created_at: timestamp_now(),
            })
            .unwrap();
        store
    }

    fn appt(id: &str, h: u32, m: u32, minutes: i64) -> Appointment {
        Appointment {
            id: id.into(),
            educator_id: "ed".into(),
            client_name: "Client".into(),
            client_email: "client@example.com".into(),
            client_phone: None,
            scheduled_at: Utc.with_ymd_and_hms(2030, 5, 6, h, m, 0).unwrap(),
            duration_minutes: minutes,
            status: AppointmentStatus::Scheduled,
            notes: None,
            outcome: None,
            created_at: timestamp_now(),
        }
    }

    #[test]
    fn overlapping_insert_is_rejected_and_nothing_is_written() {
        let mut store = store_with_user("ed");
        store.insert_appointment(&appt("a", 10, 0, 60)).unwrap();

        let err = store.insert_appointment(&appt("b", 10, 30, 30)).unwrap_err();
        match err {
            StoreError::SlotUnavailable { conflicting_id } => assert_eq!(conflicting_id, "a"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.get_appointment("b").unwrap().is_none());

        // Half-open intervals: back-to-back is fine.
        store.insert_appointment(&appt("c", 11, 0, 30)).unwrap();
    }

    #[test]
    fn cancelled_rows_free_the_slot_until_reactivated() {
        let mut store = store_with_user("ed");
        let mut first = appt("a", 9, 0, 30);
        store.insert_appointment(&first).unwrap();
        first.status = AppointmentStatus::Cancelled;
        store.update_appointment(&first).unwrap();

        store.insert_appointment(&appt("b", 9, 0, 30)).unwrap();

        first.status = AppointmentStatus::Scheduled;
        assert!(matches!(
            store.update_appointment(&first),
            Err(StoreError::SlotUnavailable { .. })
        ));
        let stored = store.get_appointment("a").unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn email_lookup_ignores_case_and_duplicates_are_refused() {
        let mut store = store_with_user("ed");
        assert!(store.find_user_by_email("ED@EXAMPLE.COM").unwrap().is_some());
        let dup = User {
            id: "other".into(),
            email: "ed@example.com".into(),
            full_name: "Other".into(),
            avatar_url: None,
            role: Role::Educator,
            created_at: timestamp_now(),
        };
        assert!(matches!(
            store.insert_user(&dup),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn conversations_keep_participant_order() {
        let mut store = store_with_user("ed");
        for id in ["tr", "ad"] {
            store
                .insert_user(&User {
                    id: id.into(),
                    email: format!("{id}@example.com"),
                    full_name: id.into(),
                    avatar_url: None,
                    role: Role::Trainer,
                    created_at: timestamp_now(),
                })
                .unwrap();
        }
        let conversation = Conversation {
            id: "c1".into(),
            participant_ids: vec!["tr".into(), "ed".into(), "ad".into()],
            conversation_type: ConversationType::Group,
            name: Some("Cohort".into()),
            created_at: timestamp_now(),
        };
        store.insert_conversation(&conversation).unwrap();

        assert_eq!(store.get_conversation("c1").unwrap(), Some(conversation));
        assert_eq!(store.list_conversations_for("ad").unwrap().len(), 1);
        assert!(store.list_conversations_for("nobody").unwrap().is_empty());
    }

    #[test]
    fn signed_documents_read_back_with_their_lifecycle() {
        use crate::documents::{draft, find_template, send, sign, NewDocument};
        let mut store = store_with_user("ed");
        let now = timestamp_now();
        let mut doc = draft(
            NewDocument {
                id: "d1".into(),
                educator_id: "ed",
                template: find_template("2").unwrap(),
                recipient: "Hal".into(),
                recipient_email: "hal@example.com".into(),
            },
            now,
        );
        store.insert_document(&doc).unwrap();
        send(&mut doc, now).unwrap();
        sign(&mut doc, "Hal F.".into(), now).unwrap();
        store.update_document(&doc).unwrap();

        assert_eq!(store.get_document("d1").unwrap(), Some(doc));
        store.delete_document("d1").unwrap();
        assert!(store.list_documents("ed").unwrap().is_empty());
        assert!(matches!(
            store.delete_document("d1"),
            Err(StoreError::NotFound { entity: "document" })
        ));
    }

    #[test]
    fn settled_payments_keep_their_status_filter() {
        use crate::model::PaymentType;
        let mut store = store_with_user("ed");
        let now = timestamp_now();
        let mut payment = Payment {
            id: "p1".into(),
            educator_id: "ed".into(),
            client_name: "Client".into(),
            client_email: "c@example.com".into(),
            amount: 675.0,
            description: "Starter Pack".into(),
            status: PaymentStatus::Pending,
            payment_type: PaymentType::Package,
            created_at: now,
            settled_at: None,
        };
        store.insert_payment(&payment).unwrap();
        payment.status = PaymentStatus::Completed;
        payment.settled_at = Some(now);
        store.update_payment(&payment).unwrap();

        let done = store.list_payments("ed", Some(PaymentStatus::Completed)).unwrap();
        assert_eq!(done, vec![payment]);
        assert!(store.list_payments("ed", Some(PaymentStatus::Pending)).unwrap().is_empty());
    }
}
