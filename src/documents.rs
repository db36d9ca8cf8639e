//! Template-based documents and their signing lifecycle:
//! Draft → Sent → Signed, with Sent lapsing to Expired after the signing
//! window.

use crate::model::{clamp_ts, DocumentStatus, DocumentType, SignedDocument};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

pub const SIGNING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub popular: bool,
}

pub const TEMPLATES: [DocumentTemplate; 6] = [
    DocumentTemplate {
        id: "1",
        name: "Client Service Agreement",
        description: "Standard agreement for Bitcoin education services",
        category: "Contracts",
        popular: true,
    },
    DocumentTemplate {
        id: "2",
        name: "BE Onboarding Contract",
        description: "Contract for new Bitcoin Educators joining the team",
        category: "Contracts",
        popular: true,
    },
    DocumentTemplate {
        id: "3",
        name: "Non-Disclosure Agreement",
        description: "Standard NDA for confidential information",
        category: "Legal",
        popular: false,
    },
    DocumentTemplate {
        id: "4",
        name: "Session Feedback Form",
        description: "Post-session feedback collection form",
        category: "Forms",
        popular: false,
    },
    DocumentTemplate {
        id: "5",
        name: "Client Intake Form",
        description: "Initial client information collection",
        category: "Forms",
        popular: true,
    },
    DocumentTemplate {
        id: "6",
        name: "Referral Agreement",
        description: "Agreement for referral partners",
        category: "Partnerships",
        popular: false,
    },
];

pub fn find_template(id: &str) -> Option<&'static DocumentTemplate> {
    TEMPLATES.iter().find(|t| t.id == id.trim())
}

impl DocumentTemplate {
    pub fn document_type(&self) -> DocumentType {
        if self.category == "Forms" {
            DocumentType::Form
        } else {
            DocumentType::Contract
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("cannot {action} a {status} document")]
    WrongStatus {
        action: &'static str,
        status: DocumentStatus,
    },
    #[error("signing window closed")]
    Expired,
}

pub struct NewDocument<'a> {
    pub id: String,
    pub educator_id: &'a str,
    pub template: &'a DocumentTemplate,
    pub recipient: String,
    pub recipient_email: String,
}

pub fn draft(new: NewDocument<'_>, now: DateTime<Utc>) -> SignedDocument {
    SignedDocument {
        id: new.id,
        educator_id: new.educator_id.to_string(),
        template_id: new.template.id.to_string(),
        name: format!("{} - {}", new.template.name, new.recipient),
        document_type: new.template.document_type(),
        status: DocumentStatus::Draft,
        recipient: new.recipient,
        recipient_email: new.recipient_email,
        created_at: now,
        sent_at: None,
        expires_at: None,
        signed_at: None,
        signed_by: None,
    }
}

/// Only drafts go out. The window is cut short at the end of year 9999.
pub fn send(doc: &mut SignedDocument, now: DateTime<Utc>) -> Result<(), DocumentError> {
    if doc.status != DocumentStatus::Draft {
        return Err(DocumentError::WrongStatus {
            action: "send",
            status: doc.status,
        });
    }
    let expires = now
        .checked_add_signed(Duration::days(SIGNING_WINDOW_DAYS))
        .map(clamp_ts)
        .unwrap_or(now);
    doc.status = DocumentStatus::Sent;
    doc.sent_at = Some(now);
    doc.expires_at = Some(expires);
    Ok(())
}

/// Flips a sent document past its window to `Expired`. Returns whether it
/// changed.
pub fn expire_if_due(doc: &mut SignedDocument, now: DateTime<Utc>) -> bool {
    let due = doc.status == DocumentStatus::Sent && doc.expires_at.is_some_and(|e| now > e);
    if due {
        doc.status = DocumentStatus::Expired;
    }
    due
}

/// Records the signature. A lapsed document is marked expired and refused.
pub fn sign(
    doc: &mut SignedDocument,
    signer: String,
    now: DateTime<Utc>,
) -> Result<(), DocumentError> {
    if expire_if_due(doc, now) {
        return Err(DocumentError::Expired);
    }
    match doc.status {
        DocumentStatus::Sent => {
            doc.status = DocumentStatus::Signed;
            doc.signed_at = Some(now);
            doc.signed_by = Some(signer);
            Ok(())
        }
        DocumentStatus::Expired => Err(DocumentError::Expired),
        status => Err(DocumentError::WrongStatus {
            action: "sign",
            status,
        }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCounts {
    pub signed: usize,
    /// Sent and awaiting a signature.
    pub pending: usize,
    pub drafts: usize,
    pub expired: usize,
}

pub fn count(docs: &[SignedDocument]) -> DocumentCounts {
    docs.iter().fold(DocumentCounts::default(), |mut c, d| {
        match d.status {
            DocumentStatus::Signed => c.signed += 1,
            DocumentStatus::Sent => c.pending += 1,
            DocumentStatus::Draft => c.drafts += 1,
            DocumentStatus::Expired => c.expired += 1,
        }
        c
    })
}

/// Case-insensitive substring match on the name; blank matches everything.
pub fn matches_query(doc: &SignedDocument, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    q.is_empty() || doc.name.to_lowercase().contains(&q)
}
