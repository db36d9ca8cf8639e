use crate::documents::{
    count, draft, expire_if_due, find_template, matches_query, send, sign, NewDocument, TEMPLATES,
};
use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_str, get_required_str, respond, store, store_mut,
    HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{timestamp_now, DocumentStatus, SignedDocument, User};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Documents are private to their owner. A sent document past its window is
/// persisted as expired before it is handed out.
fn own_document(
    state: &mut AppState,
    me: &User,
    params: &Value,
) -> Result<SignedDocument, HandlerErr> {
    let id = get_required_str(params, "documentId")?;
    let mut doc = store(state)?
        .get_document(&id)?
        .filter(|d| d.educator_id == me.id)
        .ok_or_else(|| HandlerErr::not_found("document not found"))?;
    if expire_if_due(&mut doc, timestamp_now()) {
        store_mut(state)?.update_document(&doc)?;
    }
    Ok(doc)
}

fn documents_templates(state: &mut AppState) -> HandlerResult {
    current_user(state)?;
    Ok(json!({ "templates": TEMPLATES }))
}

fn documents_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let template_id = get_required_str(params, "templateId")?;
    let template = find_template(&template_id)
        .ok_or_else(|| HandlerErr::not_found(format!("template {} not found", template_id)))?;
    let doc = draft(
        NewDocument {
            id: Uuid::new_v4().to_string(),
            educator_id: &me.id,
            template,
            recipient: get_required_str(params, "recipient")?,
            recipient_email: get_required_str(params, "recipientEmail")?,
        },
        timestamp_now(),
    );
    store_mut(state)?.insert_document(&doc)?;
    info!(document_id = %doc.id, template = template.id, "document drafted");
    Ok(json!({ "document": doc }))
}

fn documents_send(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let mut doc = own_document(state, &me, params)?;
    send(&mut doc, timestamp_now())?;
    store_mut(state)?.update_document(&doc)?;
    info!(document_id = %doc.id, "document sent for signature");
    Ok(json!({ "document": doc }))
}

fn documents_sign(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let mut doc = own_document(state, &me, params)?;
    let signer = get_required_str(params, "signerName")?;
    sign(&mut doc, signer, timestamp_now())?;
    store_mut(state)?.update_document(&doc)?;
    info!(document_id = %doc.id, "document signed");
    Ok(json!({ "document": doc }))
}

fn documents_delete(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let doc = own_document(state, &me, params)?;
    store_mut(state)?.delete_document(&doc.id)?;
    Ok(json!({ "deleted": true, "documentId": doc.id }))
}

fn documents_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let status = get_opt_enum::<DocumentStatus>(params, "status")?;
    let query = get_opt_str(params, "query").unwrap_or_default();

    let now = timestamp_now();
    let mut docs = store(state)?.list_documents(&me.id)?;
    for doc in docs.iter_mut() {
        if expire_if_due(doc, now) {
            store_mut(state)?.update_document(doc)?;
        }
    }
    // Counts cover every owned document, whatever the filters.
    let counts = count(&docs);
    let shown: Vec<&SignedDocument> = docs
        .iter()
        .filter(|d| status.map(|s| d.status == s).unwrap_or(true))
        .filter(|d| matches_query(d, &query))
        .collect();
    Ok(json!({ "documents": shown, "counts": counts }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "documents.templates" => documents_templates(state),
        "documents.create" => documents_create(state, &req.params),
        "documents.send" => documents_send(state, &req.params),
        "documents.sign" => documents_sign(state, &req.params),
        "documents.delete" => documents_delete(state, &req.params),
        "documents.list" => documents_list(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
