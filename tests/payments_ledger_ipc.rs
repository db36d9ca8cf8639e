use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar(mode: Option<&str>) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_educatord");
    let mut cmd = Command::new(exe);
    cmd.env("RUST_LOG", "off")
        .env("EDUCATORD_UTC_OFFSET_MINUTES", "0")
        .env_remove("EDUCATORD_MODE")
        .env_remove("EDUCATORD_WORKSPACE");
    if let Some(mode) = mode {
        cmd.env("EDUCATORD_MODE", mode);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn educatord");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn error_code(value: &serde_json::Value) -> &str {
    value["error"]["code"].as_str().unwrap_or("")
}

fn sign_in(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, email: &str) {
    request_ok(stdin, reader, "signin", "session.signIn", json!({ "email": email }));
}

fn open_workspace(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, path: &Path) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": path.to_string_lossy() }),
    );
}

fn invoice(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    params: serde_json::Value,
) -> String {
    let created = request_ok(stdin, reader, id, "payments.create", params);
    created["payment"]["id"].as_str().expect("payment id").to_string()
}

#[test]
fn invoices_settle_once_and_roll_up_into_revenue() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some("demo"));

    let anonymous = request(&mut stdin, &mut reader, "0", "payments.list", json!({}));
    assert_eq!(error_code(&anonymous), "unauthorized");

    sign_in(&mut stdin, &mut reader, "demo.educator@example.com");
    let catalogue = request_ok(&mut stdin, &mut reader, "1", "payments.packages", json!({}));
    let packages = catalogue["packages"].as_array().expect("packages");
    assert_eq!(packages.len(), 4);
    assert_eq!(packages[1]["name"], "Starter Pack");
    assert_eq!(packages[1]["price"], 675.0);
    assert_eq!(packages[1]["popular"], true);
    assert_eq!(packages[3]["sessions"], 4);

    let base = json!({ "clientName": "John Smith", "clientEmail": "john@example.com" });
    for (i, bad) in [
        json!({}),
        json!({ "amount": 0 }),
        json!({ "amount": -5 }),
        json!({ "amount": "150" }),
        json!({ "amount": 2_000_000 }),
        json!({ "amount": 150, "type": "gift" }),
    ]
    .into_iter()
    .enumerate()
    {
        let mut params = base.clone();
        for (k, v) in bad.as_object().expect("object") {
            params[k] = v.clone();
        }
        let refused = request(&mut stdin, &mut reader, &format!("bad{}", i), "payments.create", params);
        assert_eq!(error_code(&refused), "bad_params", "case {}", i);
    }
    let no_email = request(
        &mut stdin,
        &mut reader,
        "2",
        "payments.create",
        json!({ "clientName": "John Smith", "amount": 150 }),
    );
    assert_eq!(error_code(&no_email), "bad_params");

    let single = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.create",
        json!({ "clientName": "John Smith", "clientEmail": "john@example.com", "amount": 150 }),
    );
    let payment = &single["payment"];
    assert_eq!(payment["status"], "pending");
    assert_eq!(payment["type"], "session");
    assert_eq!(payment["description"], "Invoice");
    assert_eq!(payment["settledAt"], serde_json::Value::Null);
    assert_eq!(payment["educatorId"], "demo-user-1");
    let single_id = payment["id"].as_str().expect("id").to_string();

    let pack = invoice(
        &mut stdin,
        &mut reader,
        "4",
        json!({
            "clientName": "Sarah Johnson",
            "clientEmail": "sarah@example.com",
            "amount": 675,
            "type": "package",
            "description": "Starter Pack - 5 sessions"
        }),
    );
    let monthly = invoice(
        &mut stdin,
        &mut reader,
        "5",
        json!({
            "clientName": "Mike Brown",
            "clientEmail": "mike@example.com",
            "amount": 500,
            "type": "subscription"
        }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "payments.list", json!({}));
    let ids: Vec<&str> = listed["payments"]
        .as_array()
        .expect("payments")
        .iter()
        .filter_map(|p| p["id"].as_str())
        .collect();
    assert_eq!(ids, vec![monthly.as_str(), pack.as_str(), single_id.as_str()]);

    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "payments.updateStatus",
        json!({ "paymentId": single_id, "status": "completed" }),
    );
    assert_eq!(paid["payment"]["status"], "completed");
    assert!(paid["payment"]["settledAt"].is_string());
    let twice = request(
        &mut stdin,
        &mut reader,
        "8",
        "payments.updateStatus",
        json!({ "paymentId": single_id, "status": "failed" }),
    );
    assert_eq!(error_code(&twice), "bad_params");
    assert_eq!(twice["error"]["details"]["status"], "completed");
    let back_to_pending = request(
        &mut stdin,
        &mut reader,
        "9",
        "payments.updateStatus",
        json!({ "paymentId": pack, "status": "pending" }),
    );
    assert_eq!(error_code(&back_to_pending), "bad_params");

    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "payments.updateStatus",
        json!({ "paymentId": pack, "status": "completed" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "payments.updateStatus",
        json!({ "paymentId": monthly, "status": "failed" }),
    );

    let completed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "payments.list",
        json!({ "status": "completed" }),
    );
    assert_eq!(completed["payments"].as_array().map(|p| p.len()), Some(2));

    let summary = request_ok(&mut stdin, &mut reader, "13", "payments.summary", json!({}));
    assert_eq!(summary["totalRevenue"], 825.0);
    assert_eq!(summary["pendingRevenue"], 0.0);
    assert_eq!(summary["thisMonthRevenue"], 825.0);
    assert_eq!(summary["completedCount"], 2);
    assert_eq!(summary["failedCount"], 1);
    assert_eq!(summary["averagePayment"], 412.5);
    let bad_offset = request(
        &mut stdin,
        &mut reader,
        "14",
        "payments.summary",
        json!({ "utcOffsetMinutes": 5000 }),
    );
    assert_eq!(error_code(&bad_offset), "bad_params");

    // Someone else's ledger is invisible.
    sign_in(&mut stdin, &mut reader, "demo.trainer@example.com");
    let theirs = request_ok(&mut stdin, &mut reader, "15", "payments.list", json!({}));
    assert_eq!(theirs["payments"], json!([]));
    let hidden = request(
        &mut stdin,
        &mut reader,
        "16",
        "payments.updateStatus",
        json!({ "paymentId": pack, "status": "failed" }),
    );
    assert_eq!(error_code(&hidden), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_ledger_survives_a_restart() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(None);
    open_workspace(&mut stdin, &mut reader, workspace.path());
    request_ok(
        &mut stdin,
        &mut reader,
        "su",
        "session.signUp",
        json!({ "email": "ed@example.com", "fullName": "Ed" }),
    );
    let kept = invoice(
        &mut stdin,
        &mut reader,
        "1",
        json!({ "clientName": "Ann", "clientEmail": "ann@example.com", "amount": 1200, "type": "package" }),
    );
    invoice(
        &mut stdin,
        &mut reader,
        "2",
        json!({ "clientName": "Ben", "clientEmail": "ben@example.com", "amount": 99.999 }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "payments.updateStatus",
        json!({ "paymentId": kept, "status": "completed" }),
    );
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar(None);
    open_workspace(&mut stdin, &mut reader, workspace.path());
    sign_in(&mut stdin, &mut reader, "ed@example.com");

    let pending = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "payments.list",
        json!({ "status": "pending" }),
    );
    let rows = pending["payments"].as_array().expect("payments");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["amount"], 100.0);
    assert_eq!(rows[0]["clientName"], "Ben");

    let summary = request_ok(&mut stdin, &mut reader, "5", "payments.summary", json!({}));
    assert_eq!(summary["totalRevenue"], 1200.0);
    assert_eq!(summary["pendingRevenue"], 100.0);
    assert_eq!(summary["averagePayment"], 1200.0);

    let again = request(
        &mut stdin,
        &mut reader,
        "6",
        "payments.updateStatus",
        json!({ "paymentId": kept, "status": "completed" }),
    );
    assert_eq!(error_code(&again), "bad_params");

    drop(stdin);
    let _ = child.wait();
}
