use crate::ipc::helpers::{
    current_user, get_opt_enum, get_opt_f64, get_opt_str, get_required_enum, get_required_str,
    offset_param, respond, store, store_mut, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{timestamp_now, Payment, PaymentStatus, PaymentType, User};
use crate::payments::{check_amount, settle, summarize, DEFAULT_INVOICE_DESCRIPTION, PACKAGES};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Invoices are private to the educator who raised them.
fn own_payment(state: &AppState, me: &User, params: &Value) -> Result<Payment, HandlerErr> {
    let id = get_required_str(params, "paymentId")?;
    store(state)?
        .get_payment(&id)?
        .filter(|p| p.educator_id == me.id)
        .ok_or_else(|| HandlerErr::not_found("payment not found"))
}

fn payments_packages(state: &mut AppState) -> HandlerResult {
    current_user(state)?;
    Ok(json!({ "packages": PACKAGES }))
}

fn payments_create(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let client_name = get_required_str(params, "clientName")?;
    let client_email = get_required_str(params, "clientEmail")?;
    let amount = get_opt_f64(params, "amount")?
        .ok_or_else(|| HandlerErr::bad_params("missing amount"))?;
    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        educator_id: me.id.clone(),
        client_name,
        client_email,
        amount: check_amount(amount)?,
        description: get_opt_str(params, "description")
            .unwrap_or_else(|| DEFAULT_INVOICE_DESCRIPTION.to_string()),
        status: PaymentStatus::Pending,
        payment_type: get_opt_enum::<PaymentType>(params, "type")?.unwrap_or(PaymentType::Session),
        created_at: timestamp_now(),
        settled_at: None,
    };
    store_mut(state)?.insert_payment(&payment)?;
    info!(payment_id = %payment.id, amount = payment.amount, "invoice raised");
    Ok(json!({ "payment": payment }))
}

fn payments_list(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let status = get_opt_enum::<PaymentStatus>(params, "status")?;
    let payments = store(state)?.list_payments(&me.id, status)?;
    Ok(json!({ "payments": payments }))
}

fn payments_update_status(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let mut payment = own_payment(state, &me, params)?;
    let to = get_required_enum::<PaymentStatus>(params, "status")?;
    settle(&mut payment, to, timestamp_now())?;
    store_mut(state)?.update_payment(&payment)?;
    info!(payment_id = %payment.id, status = %to, "invoice settled");
    Ok(json!({ "payment": payment }))
}

fn payments_summary(state: &mut AppState, params: &Value) -> HandlerResult {
    let me = current_user(state)?;
    let offset = offset_param(state, params)?;
    let payments = store(state)?.list_payments(&me.id, None)?;
    to_json(&summarize(&payments, timestamp_now(), offset))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "payments.packages" => payments_packages(state),
        "payments.create" => payments_create(state, &req.params),
        "payments.list" => payments_list(state, &req.params),
        "payments.updateStatus" => payments_update_status(state, &req.params),
        "payments.summary" => payments_summary(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
