//! Integration tests for session lifecycle, waiting and transcripts.
//!
//! These spawn real processes on a pseudo-terminal (`cat`, `sh`, `echo`), so
//! they only run on Unix.
#![cfg(unix)]

use promptline_core::{PromptlineError, RegistryConfig, SendOptions, SessionRegistry, StartOptions};
use promptline_types::SessionState;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const GENEROUS: Duration = Duration::from_secs(10);

fn registry() -> SessionRegistry {
    SessionRegistry::new(RegistryConfig {
        grace_period: Duration::from_millis(500),
    })
}

fn sh(script: &str) -> StartOptions {
    StartOptions::new("sh", vec!["-c".to_string(), script.to_string()])
}

fn prompts(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// START / REGISTRY
// ============================================================================

#[tokio::test]
async fn test_start_assigns_fresh_ids() {
    let reg = registry();
    let a = reg.start(StartOptions::new("cat", vec![])).unwrap();
    let b = reg.start(StartOptions::new("cat", vec![])).unwrap();

    assert_eq!(a, 1);
    assert_eq!(b, 2);
    assert_eq!(reg.get(a).unwrap().state(), SessionState::Running);
    assert_eq!(reg.get(b).unwrap().state(), SessionState::Running);

    reg.shutdown().await;
    assert_eq!(reg.get(a).unwrap().state(), SessionState::Terminated);
    assert_eq!(reg.get(b).unwrap().state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_spawn_failure_does_not_consume_id() {
    let reg = registry();
    let err = reg
        .start(StartOptions::new("/no/such/program-promptline", vec![]))
        .unwrap_err();
    assert!(matches!(err, PromptlineError::SpawnFailure(_)));
    assert!(reg.is_empty());

    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();
    assert_eq!(id, 1);
    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_list_is_ordered_snapshot() {
    let reg = registry();
    let first = reg.start(StartOptions::new("cat", vec![])).unwrap();
    let second = reg.start(sh("exit 3")).unwrap();

    let list = reg.list();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].0, first);
    assert_eq!(list[0].1.command, "cat");
    assert_eq!(list[1].0, second);
    assert_eq!(list[1].1.command, "sh -c \"exit 3\"");

    reg.shutdown().await;
}

#[tokio::test]
async fn test_unknown_session_errors() {
    let reg = registry();
    assert!(matches!(reg.exit_session(42).await, Err(PromptlineError::SessionNotFound(42))));
    assert!(matches!(
        reg.send_command(42, "x", SendOptions::default()).await,
        Err(PromptlineError::SessionNotFound(42))
    ));
    assert!(matches!(
        reg.wait_for_output(42, &[], Duration::ZERO).await,
        Err(PromptlineError::SessionNotFound(42))
    ));
    assert!(matches!(reg.remove(42), Err(PromptlineError::SessionNotFound(42))));
}

#[tokio::test]
async fn test_remove_requires_terminal_state() {
    let reg = registry();
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();

    assert!(matches!(reg.remove(id), Err(PromptlineError::SessionStillRunning(_))));

    reg.exit_session(id).await.unwrap();
    reg.remove(id).unwrap();
    assert!(matches!(reg.get(id), Err(PromptlineError::SessionNotFound(_))));

    // Ids are never reused after removal.
    let next = reg.start(StartOptions::new("cat", vec![])).unwrap();
    assert_eq!(next, id + 1);
    reg.shutdown().await;
}

// ============================================================================
// WAIT FOR OUTPUT
// ============================================================================

#[tokio::test]
async fn test_echo_output_detected() {
    let reg = registry();
    let id = reg
        .start(StartOptions::new("echo", vec!["Hello, World!".to_string()]))
        .unwrap();

    let outcome = reg
        .wait_for_output(id, &prompts(&["Hello, World!"]), GENEROUS)
        .await
        .unwrap();
    assert_eq!(outcome.matched.as_deref(), Some("Hello, World!"));
    assert!(outcome.text.contains("Hello, World!"));
    assert!(!outcome.timed_out);

    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_send_then_match() {
    let reg = registry();
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();

    reg.send_command(id, "marker-42", SendOptions::default()).await.unwrap();
    let outcome = reg
        .wait_for_output(id, &prompts(&["marker-42"]), GENEROUS)
        .await
        .unwrap();

    assert_eq!(outcome.matched.as_deref(), Some("marker-42"));
    assert!(outcome.text.ends_with("marker-42"));
    assert!(!outcome.process_ended);

    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_leftmost_prompt_wins() {
    let reg = registry();
    let id = reg.start(sh("printf 'aaa BETA bbb ALPHA\\n'; sleep 5")).unwrap();

    let outcome = reg
        .wait_for_output(id, &prompts(&["ALPHA", "BETA"]), GENEROUS)
        .await
        .unwrap();
    assert_eq!(outcome.matched.as_deref(), Some("BETA"));
    assert_eq!(outcome.text, "aaa BETA");

    let outcome = reg
        .wait_for_output(id, &prompts(&["ALPHA", "BETA"]), GENEROUS)
        .await
        .unwrap();
    assert_eq!(outcome.matched.as_deref(), Some("ALPHA"));
    assert_eq!(outcome.text, " bbb ALPHA");

    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_zero_timeout_returns_immediately_without_consuming() {
    let reg = registry();
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();
    reg.send_command(id, "ping", SendOptions::default()).await.unwrap();
    reg.wait_for_output(id, &prompts(&["ping"]), GENEROUS).await.unwrap();

    let before = reg.info(id).unwrap().unconsumed_bytes;
    let started = Instant::now();
    let outcome = reg
        .wait_for_output(id, &prompts(&["never-printed"]), Duration::ZERO)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(outcome.timed_out);
    assert!(outcome.matched.is_none());
    assert!(reg.info(id).unwrap().unconsumed_bytes >= before);
    assert_eq!(outcome.text.len(), outcome.remaining_bytes);

    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_repeated_timeouts_accumulate_without_loss() {
    let reg = registry();
    let id = reg
        .start(sh("for i in 1 2 3 4; do echo line$i; sleep 0.2; done; sleep 5"))
        .unwrap();

    let mut previous = String::new();
    for _ in 0..6 {
        let outcome = reg
            .wait_for_output(id, &prompts(&["never-printed"]), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(outcome.timed_out);
        // The cursor did not move, so each result extends the last one.
        assert!(outcome.text.starts_with(&previous));
        previous = outcome.text;
    }

    let drained = reg.wait_for_output(id, &[], Duration::from_millis(100)).await.unwrap();
    assert!(!drained.timed_out);
    assert!(drained.text.starts_with(&previous));
    for i in 1..=4 {
        assert_eq!(drained.text.matches(&format!("line{}", i)).count(), 1);
    }
    assert_eq!(drained.remaining_bytes, 0);

    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_empty_prompts_drain_after_timeout() {
    let reg = registry();
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();
    reg.send_command(id, "xyz", SendOptions::default()).await.unwrap();

    let started = Instant::now();
    let outcome = reg
        .wait_for_output(id, &[], Duration::from_millis(400))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert!(outcome.text.contains("xyz"));
    assert!(outcome.matched.is_none());
    assert!(!outcome.timed_out);
    assert_eq!(outcome.remaining_bytes, 0);
    assert_eq!(reg.info(id).unwrap().unconsumed_bytes, 0);

    reg.exit_session(id).await.unwrap();
}

#[tokio::test]
async fn test_process_exit_ends_wait_early() {
    let reg = registry();
    let id = reg.start(sh("sleep 0.3; echo done-now")).unwrap();

    let started = Instant::now();
    let outcome = reg
        .wait_for_output(id, &prompts(&["never-printed"]), Duration::from_secs(30))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.process_ended);
    assert!(outcome.text.contains("done-now"));

    let session = reg.get(id).unwrap();
    assert_eq!(session.state(), SessionState::Exited);
    assert_eq!(session.exit_code(), Some(0));

    match reg.wait_for_output(id, &prompts(&["x"]), Duration::ZERO).await {
        Err(PromptlineError::SessionNotRunning { state, exit_code, .. }) => {
            assert_eq!(state, SessionState::Exited);
            assert_eq!(exit_code, Some(0));
        }
        other => panic!("expected SessionNotRunning, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exit_code_recorded_on_natural_exit() {
    let reg = registry();
    let id = reg.start(sh("exit 7")).unwrap();

    let outcome = reg.wait_for_output(id, &[], GENEROUS).await;
    // Either the tail is returned or there was nothing to drain.
    if let Ok(outcome) = outcome {
        assert!(outcome.process_ended);
    }

    let session = reg.get(id).unwrap();
    let deadline = Instant::now() + GENEROUS;
    while session.state() != SessionState::Exited {
        assert!(Instant::now() < deadline, "session never exited");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(session.exit_code(), Some(7));
    assert_eq!(reg.exit_session(id).await.unwrap(), (SessionState::Exited, Some(7)));
}

#[tokio::test]
async fn test_split_utf8_output_is_decoded() {
    let reg = registry();
    // Emit the two bytes of "é" with a pause between them.
    let id = reg
        .start(sh("printf 'caf\\303'; sleep 0.2; printf '\\251 ok\\n'; sleep 5"))
        .unwrap();

    let outcome = reg
        .wait_for_output(id, &prompts(&["ok"]), GENEROUS)
        .await
        .unwrap();
    assert_eq!(outcome.text, "café ok");
    assert!(!outcome.text.contains('\u{FFFD}'));

    reg.exit_session(id).await.unwrap();
}

// ============================================================================
// ISOLATION
// ============================================================================

#[tokio::test]
async fn test_sessions_are_isolated() {
    let reg = registry();
    let a = reg.start(StartOptions::new("cat", vec![])).unwrap();
    let b = reg.start(StartOptions::new("cat", vec![])).unwrap();

    reg.send_command(a, "alpha-only", SendOptions::default()).await.unwrap();
    reg.send_command(b, "beta-only", SendOptions::default()).await.unwrap();

    let prompts_a = prompts(&["alpha-only"]);
    let prompts_b = prompts(&["beta-only"]);
    let (ra, rb) = tokio::join!(
        reg.wait_for_output(a, &prompts_a, GENEROUS),
        reg.wait_for_output(b, &prompts_b, GENEROUS),
    );
    assert_eq!(ra.unwrap().matched.as_deref(), Some("alpha-only"));
    assert_eq!(rb.unwrap().matched.as_deref(), Some("beta-only"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!reg.transcript(a).unwrap().contains("beta-only"));
    assert!(!reg.transcript(b).unwrap().contains("alpha-only"));

    reg.shutdown().await;
}

// ============================================================================
// EXIT
// ============================================================================

#[tokio::test]
async fn test_exit_is_idempotent_and_blocks_input() {
    let reg = registry();
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();

    let (state, code) = reg.exit_session(id).await.unwrap();
    assert_eq!(state, SessionState::Terminated);

    let again = reg.exit_session(id).await.unwrap();
    assert_eq!(again, (SessionState::Terminated, code));

    match reg.send_command(id, "late", SendOptions::default()).await {
        Err(PromptlineError::SessionNotRunning { state, .. }) => {
            assert_eq!(state, SessionState::Terminated)
        }
        other => panic!("expected SessionNotRunning, got {:?}", other),
    }

    // The buffer is frozen: nothing changes after exit returned.
    let frozen = reg.transcript(id).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(reg.transcript(id).unwrap(), frozen);
}

#[tokio::test]
async fn test_exit_escalates_to_kill() {
    let reg = SessionRegistry::new(RegistryConfig {
        grace_period: Duration::from_millis(200),
    });
    let id = reg
        .start(sh("trap '' HUP TERM; echo armed; while :; do sleep 1; done"))
        .unwrap();
    reg.wait_for_output(id, &prompts(&["armed"]), GENEROUS).await.unwrap();

    let started = Instant::now();
    let (state, code) = reg.exit_session(id).await.unwrap();
    assert_eq!(state, SessionState::Terminated);
    assert!(code.is_some());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_exit_wakes_blocked_waiter() {
    let reg = std::sync::Arc::new(registry());
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();

    let waiter = {
        let reg = reg.clone();
        tokio::spawn(async move {
            reg.wait_for_output(id, &prompts(&["never-printed"]), Duration::from_secs(60))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    reg.exit_session(id).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter still blocked after exit")
        .unwrap();

    match outcome {
        Ok(o) => {
            assert!(o.process_ended);
            assert!(!o.timed_out);
        }
        Err(PromptlineError::SessionNotRunning { .. }) => {}
        Err(e) => panic!("unexpected error: {}", e),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}

// ============================================================================
// TRANSCRIPTS
// ============================================================================

#[tokio::test]
async fn test_log_file_mirrors_returned_output() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("cat.log");
    let reg = registry();
    let id = reg
        .start(StartOptions::new("cat", vec![]).log_file(&log_path))
        .unwrap();
    assert_eq!(reg.info(id).unwrap().log_file.as_deref(), Some(log_path.as_path()));

    let mut observed = String::new();
    for word in ["one", "two", "three"] {
        reg.send_command(id, word, SendOptions::default()).await.unwrap();
        let outcome = reg.wait_for_output(id, &prompts(&[word]), GENEROUS).await.unwrap();
        observed.push_str(&outcome.text);
    }
    reg.exit_session(id).await.unwrap();

    // Drain whatever is left after exit.
    loop {
        match reg.wait_for_output(id, &[], Duration::ZERO).await {
            Ok(outcome) => observed.push_str(&outcome.text),
            Err(PromptlineError::SessionNotRunning { .. }) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let logged = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(logged, observed);
    assert_eq!(logged, reg.transcript(id).unwrap());
}

#[tokio::test]
async fn test_unwritable_log_file_fails_start() {
    let dir = TempDir::new().unwrap();
    // A directory cannot be opened as a log file.
    let reg = registry();
    let err = reg
        .start(StartOptions::new("cat", vec![]).log_file(dir.path()))
        .unwrap_err();
    assert!(matches!(err, PromptlineError::Io(_)));
    assert!(reg.is_empty());
}

#[tokio::test]
async fn test_preflush_skips_stale_output() {
    let reg = registry();
    let id = reg.start(StartOptions::new("cat", vec![])).unwrap();
    reg.send_command(id, "stale", SendOptions::default()).await.unwrap();
    // Let the echo land before flushing.
    reg.wait_for_output(id, &prompts(&["never-printed"]), Duration::from_millis(300))
        .await
        .unwrap();

    reg.send_command(
        id,
        "fresh",
        SendOptions {
            preflush: true,
            ..SendOptions::default()
        },
    )
    .await
    .unwrap();
    let outcome = reg.wait_for_output(id, &prompts(&["fresh"]), GENEROUS).await.unwrap();
    assert!(!outcome.text.contains("stale"));

    reg.exit_session(id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_waiters_split_output_exactly_once() {
    let reg = std::sync::Arc::new(registry());
    let id = reg
        .start(sh("i=1; while [ $i -le 40 ]; do echo \"<m$i>\"; i=$((i+1)); sleep 0.02; done; sleep 5"))
        .unwrap();

    let mut waiters = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let reg = reg.clone();
        waiters.spawn(async move {
            let mut pieces = Vec::new();
            loop {
                let outcome = reg
                    .wait_for_output(id, &prompts(&["\n"]), Duration::from_secs(1))
                    .await
                    .unwrap();
                if outcome.timed_out {
                    return pieces;
                }
                pieces.push(outcome.text);
            }
        });
    }

    let mut pieces = Vec::new();
    while let Some(result) = waiters.join_next().await {
        pieces.extend(result.unwrap());
    }

    let deadline = Instant::now() + GENEROUS;
    while !reg.transcript(id).unwrap().contains("<m40>") {
        assert!(Instant::now() < deadline, "script never finished printing");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let rest = reg.wait_for_output(id, &[], Duration::ZERO).await.unwrap();
    pieces.push(rest.text);

    let transcript = reg.transcript(id).unwrap();
    let returned: usize = pieces.iter().map(String::len).sum();
    assert_eq!(returned, transcript.len());

    let joined = pieces.concat();
    for i in 1..=40 {
        assert_eq!(joined.matches(&format!("<m{}>", i)).count(), 1, "marker {}", i);
    }

    reg.exit_session(id).await.unwrap();
}

// ============================================================================
// BLOCKED INPUT
// ============================================================================

/// Far more input than a terminal queue holds, for a child that never reads.
fn flood() -> String {
    vec!["x".repeat(200); 2000].join("\n")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stuck_write_times_out() {
    let reg = registry();
    let id = reg.start(StartOptions::new("sleep", vec!["30".to_string()])).unwrap();

    let opts = SendOptions {
        write_timeout: Duration::from_millis(300),
        ..SendOptions::default()
    };
    let started = Instant::now();
    let result = reg.send_command(id, &flood(), opts).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(result, Err(PromptlineError::WriteFailure { .. })), "{:?}", result);

    let (state, _) = reg.exit_session(id).await.unwrap();
    assert_eq!(state, SessionState::Terminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exit_not_held_up_by_blocked_write() {
    let reg = std::sync::Arc::new(registry());
    let id = reg.start(StartOptions::new("sleep", vec!["30".to_string()])).unwrap();

    let sender = {
        let reg = reg.clone();
        tokio::spawn(async move {
            let opts = SendOptions {
                write_timeout: Duration::from_secs(2),
                ..SendOptions::default()
            };
            reg.send_command(id, &flood(), opts).await
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (state, _) = tokio::time::timeout(Duration::from_secs(5), reg.exit_session(id))
        .await
        .expect("exit_session waited on the blocked write")
        .unwrap();
    assert_eq!(state, SessionState::Terminated);

    let sent = tokio::time::timeout(GENEROUS, sender)
        .await
        .expect("send_command never returned")
        .unwrap();
    assert!(
        matches!(
            sent,
            Err(PromptlineError::WriteFailure { .. }) | Err(PromptlineError::SessionNotRunning { .. })
        ),
        "{:?}",
        sent
    );

    // Shutdown after the exit has nothing left to wait for.
    tokio::time::timeout(Duration::from_secs(5), reg.shutdown())
        .await
        .expect("shutdown hung");
}

// ============================================================================
// IDLE REAPING
// ============================================================================

#[tokio::test]
async fn test_reap_idle_terminates_and_removes() {
    let reg = registry();
    let idle = reg.start(StartOptions::new("cat", vec![])).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let busy = reg.start(StartOptions::new("cat", vec![])).unwrap();

    let removed = reg.reap_idle(Duration::from_millis(250)).await;
    assert_eq!(removed, vec![idle]);
    assert!(reg.get(idle).is_err());
    assert_eq!(reg.get(busy).unwrap().state(), SessionState::Running);

    reg.shutdown().await;
}

// ============================================================================
// INTERPRETER
// ============================================================================

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("-c")
        .arg("pass")
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_python_repl_round_trip() {
    if !python3_available() {
        eprintln!("python3 not found, skipping");
        return;
    }
    let reg = registry();
    let id = reg
        .start(StartOptions::new("python3", vec!["-i".to_string(), "-q".to_string()]))
        .unwrap();

    let ready = reg.wait_for_output(id, &prompts(&[">>> "]), GENEROUS).await.unwrap();
    assert_eq!(ready.matched.as_deref(), Some(">>> "));

    reg.send_command(id, "print(1+1)", SendOptions::default()).await.unwrap();
    let outcome = reg.wait_for_output(id, &prompts(&[">>> "]), GENEROUS).await.unwrap();
    assert_eq!(outcome.matched.as_deref(), Some(">>> "));
    assert!(outcome.text.contains('2'));

    reg.exit_session(id).await.unwrap();
}
