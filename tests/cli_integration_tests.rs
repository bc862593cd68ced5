use std::io::Write;
use std::process::Command;

/// Environment variables the CLI reads; cleared so the host cannot leak into a test
const AGENT_ENV: &[&str] = &[
    "CONTROLLER_URL", "CONNECTOR_ID", "AUTH_TOKEN", "CONTROLLER_TIMEOUT_SECS",
    "DB_URL", "DB_BACKEND", "DB_SSL_MODE", "DB_MAX_CONNECTIONS",
    "DB_CONNECT_TIMEOUT_SECS", "DB_QUERY_TIMEOUT_SECS",
    "POLL_INTERVAL_SECS", "HEARTBEAT_INTERVAL_SECS", "LOG_FORMAT", "RUST_LOG",
];

/// Test helper to run CLI commands and capture output
fn run_cli_command(args: &[&str]) -> (String, String, i32) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sqlrunner-agent"));
    for name in AGENT_ENV {
        command.env_remove(name);
    }

    let output = command
        .env("NO_COLOR", "1")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

/// Test helper to check if output contains expected text
fn assert_output_contains(output: &str, expected: &str) {
    assert!(
        output.contains(expected),
        "Output did not contain expected text.\nExpected: {}\nActual output:\n{}",
        expected,
        output
    );
}

#[test]
fn test_cli_help_command() {
    let (stdout, _stderr, exit_code) = run_cli_command(&["--help"]);

    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "Remote SQL execution agent");
    assert_output_contains(&stdout, "Commands:");
    assert_output_contains(&stdout, "run");
    assert_output_contains(&stdout, "compile");
    assert_output_contains(&stdout, "probe");
}

#[test]
fn test_cli_version_command() {
    let (stdout, _stderr, exit_code) = run_cli_command(&["--version"]);

    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "0.1.0");
}

#[test]
fn test_cli_compile_table_output() {
    let payload = r#"{"table":"orders","conditions":[{"column":"status","type":"equal","value":"completed"},{"column":"total","type":"greater_than","value":100}],"limit":50}"#;
    let (stdout, stderr, exit_code) = run_cli_command(&["compile", payload]);

    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert_output_contains(&stdout, "SQL: SELECT * FROM orders WHERE status = $1 AND total > $2 LIMIT $3");
    assert_output_contains(&stdout, "'completed'");
    assert_output_contains(&stdout, "3 parameters");
    assert_output_contains(&stderr, "compiled for postgres");
}

#[test]
fn test_cli_compile_json_output() {
    let payload = r#"{"table":"users","conditions":[{"column":"id","type":"in","value":[1,2]}]}"#;
    let (stdout, stderr, exit_code) = run_cli_command(&["compile", "--dialect", "mysql", "--format", "json", payload]);

    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert_eq!(parsed["dialect"], "mysql");
    assert_eq!(parsed["text"], "SELECT * FROM users WHERE id IN (?, ?)");
    assert_eq!(parsed["parameters"], serde_json::json!([1, 2]));
}

#[test]
fn test_cli_compile_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"table":"users","select":"id, email"}}"#).unwrap();
    let argument = format!("@{}", file.path().display());

    let (stdout, _stderr, exit_code) = run_cli_command(&["compile", &argument]);

    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "SELECT id, email FROM users");
    assert_output_contains(&stdout, "No parameters.");
}

#[test]
fn test_cli_compile_unsupported_operator() {
    let (_stdout, stderr, exit_code) = run_cli_command(&[
        "compile", r#"{"table":"t","conditions":[{"column":"c","type":"bogus"}]}"#,
    ]);

    assert_eq!(exit_code, 1);
    assert_output_contains(&stderr, "Error:");
    assert_output_contains(&stderr, "unsupported condition type: bogus");
}

#[test]
fn test_cli_compile_malformed_payload() {
    let (_stdout, stderr, exit_code) = run_cli_command(&["compile", "[1, 2, 3]"]);

    assert_eq!(exit_code, 1);
    assert_output_contains(&stderr, "malformed payload");
}

#[test]
fn test_cli_unknown_dialect() {
    let (_stdout, stderr, exit_code) = run_cli_command(&["compile", "--dialect", "oracle", r#"{"table":"t"}"#]);

    assert_ne!(exit_code, 0);
    assert_output_contains(&stderr, "unknown dialect 'oracle'");
}

#[test]
fn test_cli_probe_mock_backend() {
    let (stdout, _stderr, exit_code) = run_cli_command(&["probe", "--backend", "mock"]);

    assert_eq!(exit_code, 0);
    assert_output_contains(&stdout, "Success: mock backend is reachable");
}

#[test]
fn test_cli_probe_requires_database_url() {
    let (_stdout, stderr, exit_code) = run_cli_command(&["probe", "--backend", "postgres"]);

    assert_eq!(exit_code, 1);
    assert_output_contains(&stderr, "database url is required for the postgres backend");
}

#[test]
fn test_cli_run_requires_credentials() {
    let (_stdout, stderr, exit_code) = run_cli_command(&["run", "--backend", "mock"]);

    assert_ne!(exit_code, 0);
    assert_output_contains(&stderr, "--connector-id");
}

#[test]
fn test_cli_run_rejects_bad_controller_url() {
    let (_stdout, stderr, exit_code) = run_cli_command(&[
        "run",
        "--backend", "mock",
        "--connector-id", "conn-1",
        "--auth-token", "secret",
        "--controller-url", "not a url",
    ]);

    assert_eq!(exit_code, 1);
    assert_output_contains(&stderr, "Invalid controller url");
}
