// tests/command_bridge.rs
//
// Exercises the subprocess bridge against real shell commands.

use std::time::Duration;

use codeloom::exec::backend::{Backend, BackendErrorKind, BackendRequest};
use codeloom::exec::command::CommandBackend;
use codeloom_test_utils::{init_tracing, with_timeout};
use tokio::sync::watch;

fn request(subtask_id: &str, prompt: &str) -> BackendRequest {
    BackendRequest {
        subtask_id: subtask_id.to_string(),
        prompt: prompt.to_string(),
        deadline: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn successful_bridge_round_trip() {
    init_tracing();
    let backend = CommandBackend::new(
        "bridge",
        r#"cat > /dev/null; printf '{"ok":true,"text":"bridge says fn main() {}","usage":7}\n'"#,
    );
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let response = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect("bridge should answer");

    assert_eq!(response.text, "bridge says fn main() {}");
    assert_eq!(response.usage, Some(7));
}

#[tokio::test]
async fn request_frame_reaches_the_bridge_on_stdin() {
    init_tracing();
    // The bridge inspects its stdin frame and answers differently depending
    // on whether the prompt made it through.
    let backend = CommandBackend::new(
        "bridge",
        r#"line=$(cat); case "$line" in *"write me a parser"*) printf '{"ok":true,"text":"prompt received"}\n';; *) printf '{"ok":false,"error_kind":"server_error","message":"prompt missing"}\n';; esac"#,
    );
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let response = with_timeout(backend.invoke(request("t1", "write me a parser"), cancel_rx))
        .await
        .expect("bridge should see the prompt");

    assert_eq!(response.text, "prompt received");
    assert_eq!(response.usage, None);
}

#[tokio::test]
async fn error_frame_maps_onto_the_error_kind() {
    init_tracing();
    let backend = CommandBackend::new(
        "bridge",
        r#"cat > /dev/null; printf '{"ok":false,"error_kind":"rate_limited","message":"slow down"}\n'"#,
    );
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let err = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect_err("bridge reported an error");

    assert_eq!(err.kind, BackendErrorKind::RateLimited);
    assert_eq!(err.message, "slow down");
}

#[tokio::test]
async fn chatter_lines_are_skipped_until_a_frame_parses() {
    init_tracing();
    let backend = CommandBackend::new(
        "bridge",
        r#"cat > /dev/null; echo "progress: warming up"; printf '{"ok":true,"text":"done"}\n'; echo "progress: finished""#,
    );
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let response = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect("chatter should not break the frame scan");

    assert_eq!(response.text, "done");
}

#[tokio::test]
async fn clean_exit_without_a_frame_is_an_unknown_error() {
    init_tracing();
    let backend = CommandBackend::new("bridge", "cat > /dev/null; true");
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let err = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect_err("no frame was produced");

    assert_eq!(err.kind, BackendErrorKind::Unknown);
    assert_eq!(err.message, "bridge exited without a response frame");
}

#[tokio::test]
async fn nonzero_exit_without_a_frame_is_a_server_error() {
    init_tracing();
    let backend = CommandBackend::new("bridge", "cat > /dev/null; exit 3");
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let err = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect_err("bridge exited non-zero");

    assert_eq!(err.kind, BackendErrorKind::ServerError);
    assert!(err.message.contains("status 3"), "message: {}", err.message);
}

#[tokio::test]
async fn missing_inner_command_surfaces_the_shell_exit_status() {
    init_tracing();
    // `sh` itself spawns fine; the unknown command makes it exit 127 with no
    // frame on stdout.
    let backend = CommandBackend::new("bridge", "definitely-not-a-real-command-xyz");
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let err = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect_err("command does not exist");

    assert_eq!(err.kind, BackendErrorKind::ServerError);
    assert!(err.message.contains("127"), "message: {}", err.message);
}

#[tokio::test]
async fn cancellation_kills_a_running_bridge() {
    init_tracing();
    let backend = CommandBackend::new(
        "bridge",
        r#"cat > /dev/null; sleep 30; printf '{"ok":true,"text":"too late"}\n'"#,
    );
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = cancel_tx.send(true);
    });

    let err = with_timeout(backend.invoke(request("t1", "write main"), cancel_rx))
        .await
        .expect_err("cancellation should abort the call");

    assert_eq!(err.kind, BackendErrorKind::Unknown);
    assert!(err.message.contains("cancelled"), "message: {}", err.message);
}
