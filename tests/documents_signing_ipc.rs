use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_educatord");
    let mut child = Command::new(exe)
        .env("RUST_LOG", "off")
        .env_remove("EDUCATORD_MODE")
        .env_remove("EDUCATORD_WORKSPACE")
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

fn open_workspace(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, path: &Path) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": path.to_string_lossy() }),
    );
}

fn sign_in(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, email: &str) {
    request_ok(stdin, reader, "signin", "session.signIn", json!({ "email": email }));
}

fn draft(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    template_id: &str,
    recipient: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "documents.create",
        json!({
            "templateId": template_id,
            "recipient": recipient,
            "recipientEmail": "recipient@example.com"
        }),
    );
    created["document"]["id"].as_str().expect("document id").to_string()
}

#[test]
fn documents_move_from_draft_to_signed_and_lapse_when_unsigned() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, workspace.path());
    request_ok(
        &mut stdin,
        &mut reader,
        "su1",
        "session.signUp",
        json!({ "email": "owner@example.com", "fullName": "Owner" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "su2",
        "session.signUp",
        json!({ "email": "ed@example.com", "fullName": "Ed" }),
    );

    let catalogue = request_ok(&mut stdin, &mut reader, "1", "documents.templates", json!({}));
    let templates = catalogue["templates"].as_array().expect("templates");
    assert_eq!(templates.len(), 6);
    assert_eq!(templates[4]["name"], "Client Intake Form");
    assert_eq!(templates[4]["category"], "Forms");
    assert_eq!(templates[4]["popular"], true);

    let unknown = request(
        &mut stdin,
        &mut reader,
        "2",
        "documents.create",
        json!({ "templateId": "99", "recipient": "X", "recipientEmail": "x@example.com" }),
    );
    assert_eq!(error_code(&unknown), "not_found");
    let no_email = request(
        &mut stdin,
        &mut reader,
        "3",
        "documents.create",
        json!({ "templateId": "1", "recipient": "X" }),
    );
    assert_eq!(error_code(&no_email), "bad_params");

    let intake = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "documents.create",
        json!({ "templateId": "5", "recipient": "Emily Davis", "recipientEmail": "emily@example.com" }),
    );
    assert_eq!(intake["document"]["name"], "Client Intake Form - Emily Davis");
    assert_eq!(intake["document"]["type"], "form");
    assert_eq!(intake["document"]["status"], "draft");
    let intake_id = intake["document"]["id"].as_str().expect("id").to_string();

    let contract = draft(&mut stdin, &mut reader, "5", "1", "John Smith");
    let early = request(
        &mut stdin,
        &mut reader,
        "6",
        "documents.sign",
        json!({ "documentId": contract, "signerName": "John Smith" }),
    );
    assert_eq!(error_code(&early), "bad_params");
    assert_eq!(early["error"]["details"]["status"], "draft");

    let sent = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "documents.send",
        json!({ "documentId": contract }),
    );
    assert_eq!(sent["document"]["status"], "sent");
    assert_eq!(sent["document"]["type"], "contract");
    assert!(sent["document"]["sentAt"].is_string());
    assert!(sent["document"]["expiresAt"].is_string());
    let resend = request(
        &mut stdin,
        &mut reader,
        "8",
        "documents.send",
        json!({ "documentId": contract }),
    );
    assert_eq!(error_code(&resend), "bad_params");
    let unsigned = request(
        &mut stdin,
        &mut reader,
        "9",
        "documents.sign",
        json!({ "documentId": contract }),
    );
    assert_eq!(error_code(&unsigned), "bad_params");

    let signed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "documents.sign",
        json!({ "documentId": contract, "signerName": "John Smith" }),
    );
    assert_eq!(signed["document"]["status"], "signed");
    assert_eq!(signed["document"]["signedBy"], "John Smith");

    let nda = draft(&mut stdin, &mut reader, "11", "3", "Sarah Johnson");
    request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "documents.send",
        json!({ "documentId": nda }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "13", "documents.list", json!({}));
    assert_eq!(listed["documents"].as_array().map(|d| d.len()), Some(3));
    assert_eq!(listed["documents"][0]["id"], nda.as_str());
    assert_eq!(
        listed["counts"],
        json!({ "signed": 1, "pending": 1, "drafts": 1, "expired": 0 })
    );
    let searched = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "documents.list",
        json!({ "query": "INTAKE" }),
    );
    let hits = searched["documents"].as_array().expect("documents");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], intake_id.as_str());
    assert_eq!(searched["counts"]["signed"], 1);
    let only_signed = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "documents.list",
        json!({ "status": "signed" }),
    );
    assert_eq!(only_signed["documents"][0]["id"], contract.as_str());

    // Documents are private to whoever drafted them.
    sign_in(&mut stdin, &mut reader, "owner@example.com");
    let theirs = request_ok(&mut stdin, &mut reader, "16", "documents.list", json!({}));
    assert_eq!(theirs["documents"], json!([]));
    let hidden = request(
        &mut stdin,
        &mut reader,
        "17",
        "documents.delete",
        json!({ "documentId": intake_id }),
    );
    assert_eq!(error_code(&hidden), "not_found");

    drop(stdin);
    let _ = child.wait();

    // Push the NDA's window into the past while the sidecar is down.
    let conn = Connection::open(workspace.path().join("educatord.sqlite3")).expect("open db");
    let n = conn
        .execute(
            "UPDATE documents SET expires_at = '2001-01-01T00:00:00.000Z' WHERE id = ?",
            [&nda],
        )
        .expect("backdate window");
    assert_eq!(n, 1);
    drop(conn);

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, workspace.path());
    sign_in(&mut stdin, &mut reader, "ed@example.com");

    let late = request(
        &mut stdin,
        &mut reader,
        "18",
        "documents.sign",
        json!({ "documentId": nda, "signerName": "Sarah Johnson" }),
    );
    assert_eq!(error_code(&late), "document_expired");
    assert_eq!(late["error"]["status"], 409);

    let after = request_ok(&mut stdin, &mut reader, "19", "documents.list", json!({}));
    assert_eq!(
        after["counts"],
        json!({ "signed": 1, "pending": 0, "drafts": 1, "expired": 1 })
    );
    let expired = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "documents.list",
        json!({ "status": "expired" }),
    );
    assert_eq!(expired["documents"][0]["id"], nda.as_str());

    request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "documents.delete",
        json!({ "documentId": intake_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "22",
        "documents.delete",
        json!({ "documentId": intake_id }),
    );
    assert_eq!(error_code(&gone), "not_found");
    let remaining = request_ok(&mut stdin, &mut reader, "23", "documents.list", json!({}));
    assert_eq!(remaining["counts"]["drafts"], 0);

    drop(stdin);
    let _ = child.wait();
}
