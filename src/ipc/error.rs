use serde_json::json;

/// HTTP-equivalent status for an error code, carried on every failure line so
/// the dashboard can treat sidecar errors like its old API responses.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_params" | "bad_json" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "not_found" | "not_implemented" => 404,
        "slot_unavailable" | "no_workspace" | "document_expired" => 409,
        _ => 500,
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "status": status_for(code),
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure line for input that never parsed into a request, so has no id.
pub fn bad_json(message: impl Into<String>) -> serde_json::Value {
    json!({
        "ok": false,
        "error": {
            "code": "bad_json",
            "status": status_for("bad_json"),
            "message": message.into(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_codes() {
        assert_eq!(status_for("bad_params"), 400);
        assert_eq!(status_for("slot_unavailable"), 409);
        assert_eq!(status_for("document_expired"), 409);
        assert_eq!(status_for("db_insert_failed"), 500);
        assert_eq!(status_for("upstream_failed"), 500);
    }

    #[test]
    fn err_carries_status_and_details() {
        let v = err("7", "forbidden", "nope", Some(json!({ "role": "educator" })));
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["status"], 403);
        assert_eq!(v["error"]["details"]["role"], "educator");
    }
}
