use crate::insights::{AiProvider, InsightType};
use crate::ipc::helpers::{get_opt_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

fn ai_insights(state: &mut AppState, params: &Value) -> HandlerResult {
    let Some(session) = state.session.as_ref() else {
        return Err(HandlerErr::new("unauthorized", "sign in first"));
    };

    let raw_type = get_opt_str(params, "type");
    let data = params.get("data").filter(|d| !d.is_null());
    let (Some(raw_type), Some(data)) = (raw_type, data) else {
        return Err(HandlerErr::bad_params("missing required fields: type and data"));
    };
    let insight_type = InsightType::parse(&raw_type)
        .ok_or_else(|| HandlerErr::bad_params(format!("invalid insight type: {}", raw_type)))?;
    let provider = match get_opt_str(params, "provider") {
        None => AiProvider::Openai,
        Some(raw) => AiProvider::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("invalid AI provider: {}", raw)))?,
    };
    let context = get_opt_str(params, "context");

    info!(user_id = %session.user.id, provider = provider.as_str(), "generating insight");
    let insight = state
        .insights
        .generate(insight_type, data, context.as_deref(), provider)?;
    Ok(json!({
        "success": true,
        "insight": insight.content,
        "provider": insight.provider,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "ai.insights" => ai_insights(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
