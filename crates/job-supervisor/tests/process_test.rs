//! Supervisor behaviour with child-process execution contexts.
//!
//! Contexts are small `/bin/sh` scripts speaking the stdin/stdout protocol.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use job_supervisor::{ProcessExecutor, Supervisor};
use relay_common::{ErrorCode, FailureReason, Job, TerminalState};

const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

fn sh(script: &str) -> Supervisor {
    let executor = ProcessExecutor::new("/bin/sh", vec!["-c".to_string(), script.to_string()]);
    Supervisor::new(Arc::new(executor), 4)
}

#[tokio::test]
async fn test_process_report_is_delivered() {
    let supervisor = sh(r#"read -r line
printf '%s\n' '{"status":"success","result":{"reference":"sig-1","amount":5000000,"duration_ms":4}}'"#);

    let outcome = supervisor.run(Job::deposit(5_000_000).unwrap()).await;

    let result = outcome.result().expect("process context should succeed");
    assert_eq!(result.reference, "sig-1");
    assert_eq!(result.amount, 5_000_000);
    assert_eq!(supervisor.stats().active, 0);
}

#[tokio::test]
async fn test_process_receives_job_on_stdin() {
    let supervisor = sh(r#"read -r line
case "$line" in
  *'"kind":"withdraw"'*) printf '%s\n' '{"status":"success","result":{"reference":"w","amount":1}}' ;;
  *) exit 7 ;;
esac"#);

    let outcome = supervisor
        .run(Job::withdraw(10_000_000, RECIPIENT).unwrap())
        .await;
    assert!(outcome.is_success(), "got {:?}", outcome.state);
}

#[tokio::test]
async fn test_process_failure_report() {
    let supervisor = sh(r#"read -r line
echo '{"status":"failure","reason":"insufficient_balance","detail":"need 10000000"}'"#);

    let outcome = supervisor.run(Job::deposit(10_000_000).unwrap()).await;

    match outcome.state {
        TerminalState::Failed(failure) => {
            assert_eq!(failure.reason, FailureReason::InsufficientBalance);
            assert_eq!(failure.detail, "need 10000000");
        }
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nonzero_exit_without_report_is_crash() {
    let supervisor = sh("read -r line; exit 3");

    let outcome = supervisor.run(Job::deposit(1).unwrap()).await;

    match &outcome.state {
        TerminalState::Crashed { detail } => assert!(detail.contains("code 3"), "{}", detail),
        other => panic!("expected Crashed, got {:?}", other),
    }
    assert_eq!(outcome.error_code(), Some(ErrorCode::AbnormalTermination));
}

#[tokio::test]
async fn test_clean_exit_without_report_is_crash() {
    let supervisor = sh("read -r line; exit 0");

    let outcome = supervisor.run(Job::deposit(1).unwrap()).await;
    assert!(matches!(outcome.state, TerminalState::Crashed { .. }));
}

#[tokio::test]
async fn test_malformed_report_is_crash() {
    let supervisor = sh("read -r line; echo 'proof generated!'; exit 0");

    let outcome = supervisor.run(Job::deposit(1).unwrap()).await;
    assert!(matches!(outcome.state, TerminalState::Crashed { .. }));
}

#[tokio::test]
async fn test_output_after_report_is_ignored() {
    let supervisor = sh(r#"read -r line
echo '{"status":"success","result":{"reference":"first","amount":1}}'
echo '{"status":"failure","reason":"internal","detail":"second"}'"#);

    let outcome = supervisor.run(Job::deposit(1).unwrap()).await;
    assert_eq!(outcome.result().map(|r| r.reference.as_str()), Some("first"));
}

#[tokio::test]
async fn test_missing_program_is_crash() {
    let executor = ProcessExecutor::new("/nonexistent/relay-context", Vec::new());
    let supervisor = Supervisor::new(Arc::new(executor), 1);

    let outcome = supervisor.run(Job::deposit(1).unwrap()).await;

    match &outcome.state {
        TerminalState::Crashed { detail } => assert!(detail.contains("spawn"), "{}", detail),
        other => panic!("expected Crashed, got {:?}", other),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_hung_process_is_killed_on_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("context.pid");
    let supervisor = sh(&format!(
        "echo $$ > '{}'; exec sleep 30",
        pid_file.display()
    ));

    let deadline = Duration::from_millis(300);
    let job = Job::deposit(1).unwrap().with_deadline(deadline).unwrap();
    let outcome = supervisor.run(job).await;

    assert_eq!(outcome.state, TerminalState::TimedOut { deadline });
    assert!(outcome.elapsed < Duration::from_secs(5));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let proc_path = format!("/proc/{}", pid.trim());
    assert!(
        !std::path::Path::new(&proc_path).exists(),
        "context process {} still alive after timeout",
        pid.trim()
    );
    assert_eq!(supervisor.stats().active, 0);
}
