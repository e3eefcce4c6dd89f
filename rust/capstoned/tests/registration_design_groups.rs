use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_capstoned");
    let mut child = Command::new(exe)
        .env("CAPSTONED_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn capstoned");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "expected failure: {value}");
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

fn group(name: &str, members: serde_json::Value) -> serde_json::Value {
    json!({
        "groupName": name,
        "supervisor": "Eng. Haufiku",
        "abstract": "A short design brief.",
        "members": members
    })
}

fn design_mark(group: &str, stage: &str, raw: f64) -> serde_json::Value {
    json!({
        "track": "design",
        "subjectId": group,
        "stage": stage,
        "rawScore": raw,
        "examiner": "Examiner X",
        "signature": "sig"
    })
}

#[test]
fn design_registration_enforces_group_rules() {
    let workspace = temp_dir("capstone-design-groups");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "registrations.design.create",
        group(
            "Team Alpha",
            json!([
                { "name": "Ama", "studentId": 1001.0 },
                { "name": "", "studentId": "" },
                { "name": "Ben", "studentId": "1002" }
            ]),
        ),
    );
    assert_eq!(created.get("subjectId").and_then(|v| v.as_str()), Some("Team Alpha"));
    assert_eq!(created.get("memberCount").and_then(|v| v.as_u64()), Some(2));

    let again = request(
        &mut stdin,
        &mut reader,
        "3",
        "registrations.design.create",
        group("team alpha", json!([{ "name": "Cia", "studentId": "1003" }])),
    );
    assert_eq!(error_code(&again), "duplicate");

    let crowded = request(
        &mut stdin,
        &mut reader,
        "4",
        "registrations.design.create",
        group(
            "Team Crowd",
            json!([
                { "name": "A", "studentId": "1" },
                { "name": "B", "studentId": "2" },
                { "name": "C", "studentId": "3" },
                { "name": "D", "studentId": "4" }
            ]),
        ),
    );
    assert_eq!(error_code(&crowded), "validation_error");

    let empty = request(
        &mut stdin,
        &mut reader,
        "5",
        "registrations.design.create",
        group("Team Empty", json!([{ "name": " ", "studentId": null }])),
    );
    assert_eq!(error_code(&empty), "validation_error");

    let half = request(
        &mut stdin,
        &mut reader,
        "6",
        "registrations.design.create",
        group("Team Half", json!([{ "name": "Dee", "studentId": "" }])),
    );
    assert_eq!(error_code(&half), "validation_error");

    let twins = request(
        &mut stdin,
        &mut reader,
        "7",
        "registrations.design.create",
        group(
            "Team Twins",
            json!([
                { "name": "E", "studentId": "77" },
                { "name": "F", "studentId": "77.0" }
            ]),
        ),
    );
    assert_eq!(error_code(&twins), "validation_error");

    let missing_members = request(
        &mut stdin,
        &mut reader,
        "8",
        "registrations.design.create",
        json!({ "groupName": "Team Ghost", "supervisor": "S", "abstract": "A" }),
    );
    assert_eq!(error_code(&missing_members), "bad_params");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "subjects.get",
        json!({ "track": "design", "subjectId": "TEAM ALPHA" }),
    );
    let members = fetched
        .pointer("/subject/members")
        .and_then(|v| v.as_array())
        .expect("members");
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].get("studentId").and_then(|v| v.as_str()), Some("1001"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "subjects.list",
        json!({ "track": "design" }),
    );
    assert_eq!(
        listed.get("subjects").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn research_registration_rejects_duplicates_and_long_abstracts() {
    let workspace = temp_dir("capstone-research-registration");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student = |id: serde_json::Value, abstract_text: String| {
        json!({
            "studentId": id,
            "name": "Hilma",
            "email": "hilma@example.edu",
            "supervisor": "Dr N",
            "title": "Soil moisture",
            "abstract": abstract_text
        })
    };

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "registrations.research.create",
        student(json!("5005"), "Irrigation scheduling.".to_string()),
    );
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "registrations.research.create",
        student(json!(5005.0), "Irrigation scheduling.".to_string()),
    );
    assert_eq!(error_code(&dup), "duplicate");

    let long = request(
        &mut stdin,
        &mut reader,
        "4",
        "registrations.research.create",
        student(json!("5006"), vec!["word"; 251].join(" ")),
    );
    assert_eq!(error_code(&long), "validation_error");

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "registrations.research.create",
        student(json!("5006"), vec!["word"; 250].join(" ")),
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.get",
        json!({ "track": "research", "subjectId": "9999" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn summary_ranks_groups_and_export_writes_csv() {
    let workspace = temp_dir("capstone-design-export");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, name) in ["Team Alpha", "Volt, Inc", "Zeta"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{i}"),
            "registrations.design.create",
            group(name, json!([{ "name": format!("Lead {i}"), "studentId": format!("9{i}") }])),
        );
    }

    request_ok(&mut stdin, &mut reader, "2", "marks.submit", design_mark("Team Alpha", "Presentation 1", 30.0));
    request_ok(&mut stdin, &mut reader, "3", "marks.submit", design_mark("Team Alpha", "Final Design Report", 50.0));
    request_ok(&mut stdin, &mut reader, "4", "marks.submit", design_mark("volt, inc", "Final Design Report", 90.0));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.summary",
        json!({ "track": "design" }),
    );
    let ranked: Vec<(String, f64)> = summary
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results")
        .iter()
        .map(|r| {
            (
                r.get("subjectId").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                r.get("finalPercent").and_then(|v| v.as_f64()).unwrap_or(-1.0),
            )
        })
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("Volt, Inc".to_string(), 54.0),
            ("Team Alpha".to_string(), 40.0),
            ("Zeta".to_string(), 0.0),
        ]
    );

    let out = workspace.join("exports").join("design.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.exportCsv",
        json!({ "track": "design", "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported.get("rowsExported").and_then(|v| v.as_u64()), Some(3));

    let csv = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "rank,subject_id,name,Presentation 1,Presentation 2,Presentation 3,Final Design Report,final_percent",
            "1,\"Volt, Inc\",\"Volt, Inc\",,,,90.0,54.0",
            "2,Team Alpha,Team Alpha,100.0,,,50.0,40.0",
            "3,Zeta,Zeta,,,,,0.0",
        ]
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn id_like_group_names_can_be_marked_and_graded() {
    let workspace = temp_dir("capstone-design-idlike");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, name) in ["Phase 2.0", "None"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{i}"),
            "registrations.design.create",
            group(name, json!([{ "name": format!("Lead {i}"), "studentId": format!("8{i}") }])),
        );
        assert_eq!(created.get("subjectId").and_then(|v| v.as_str()), Some(*name));
    }

    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.submit",
        design_mark("phase 2.0", "Final Design Report", 75.0),
    );
    assert_eq!(stored.get("subjectId").and_then(|v| v.as_str()), Some("Phase 2.0"));
    request_ok(&mut stdin, &mut reader, "3", "marks.submit", design_mark("None", "Final Design Report", 50.0));

    // A near miss is a different group.
    let near = request(&mut stdin, &mut reader, "4", "marks.submit", design_mark("Phase 2", "Final Design Report", 10.0));
    assert_eq!(error_code(&near), "not_found");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.get",
        json!({ "track": "design", "subjectId": "None" }),
    );
    assert_eq!(fetched.pointer("/subject/id").and_then(|v| v.as_str()), Some("None"));

    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.aggregate",
        json!({ "track": "design", "subjectId": "Phase 2.0" }),
    );
    assert_eq!(graded.get("finalPercent").and_then(|v| v.as_f64()), Some(45.0));
    assert_eq!(graded.get("registered").and_then(|v| v.as_bool()), Some(true));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "marks.list",
        json!({ "track": "design", "subjectId": "PHASE 2.0" }),
    );
    assert_eq!(
        listed.get("marks").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(1)
    );

    let summary = request_ok(&mut stdin, &mut reader, "8", "grades.summary", json!({ "track": "design" }));
    let rows: Vec<(String, String, f64)> = summary
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results")
        .iter()
        .map(|r| {
            (
                r.get("subjectId").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                r.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                r.get("finalPercent").and_then(|v| v.as_f64()).unwrap_or(-1.0),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("Phase 2.0".to_string(), "Phase 2.0".to_string(), 45.0),
            ("None".to_string(), "None".to_string(), 30.0),
        ]
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn design_presentation_accepts_criteria_breakdown() {
    let workspace = temp_dir("capstone-design-criteria");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "registrations.design.create",
        group("Team Rivet", json!([{ "name": "Ola", "studentId": "501" }])),
    );

    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.submit",
        json!({
            "track": "design",
            "subjectId": "Team Rivet",
            "stage": "Presentation 2 (10%)",
            "criteria": {
                "Design Concept": 9,
                "Implementation and Testing": 6.5,
                "Communication": 7.5
            },
            "examiner": "Examiner X",
            "signature": "sig"
        }),
    );
    assert_eq!(stored.get("rawScore").and_then(|v| v.as_f64()), Some(23.0));
    assert_eq!(
        stored.get("criteria").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(3)
    );

    drop(stdin);
    let _ = child.wait();
}
