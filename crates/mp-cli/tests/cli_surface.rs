use std::path::PathBuf;
use std::process::{Command, Output};

/// Runs `mp` from an empty directory so no `.env` file leaks in.
fn run_mp(args: &[&str]) -> Output {
    let dir: PathBuf = std::env::temp_dir().join(format!("mp_cli_it_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    Command::new(env!("CARGO_BIN_EXE_mp"))
        .args(args)
        .current_dir(&dir)
        .env_remove("DATABASE_URL")
        .env_remove("MP_ADMIN_PASSWORD")
        .output()
        .expect("run mp")
}

#[test]
fn help_lists_every_subcommand() {
    let output = run_mp(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["user-api", "admin-api", "migrate", "config", "catalog", "admin"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn admin_bootstrap_requires_credentials() {
    let output = run_mp(&["admin", "bootstrap", "--username", "root"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--password"), "unexpected stderr:\n{stderr}");
}

#[test]
fn database_commands_fail_without_database_url() {
    let output = run_mp(&["migrate"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("DATABASE_URL"), "unexpected stderr:\n{stderr}");
}
