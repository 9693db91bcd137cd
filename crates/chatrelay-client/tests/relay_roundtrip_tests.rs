//! End-to-end tests: the stream consumer against a real relay server
//!
//! The relay runs on an ephemeral port with a scripted upstream, so the
//! whole path from upstream fragments to the committed reply is exercised.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use chatrelay_client::testing::{RecordingDelay, RecordingView};
use chatrelay_client::{Conversation, FailureKind, RetryPolicy, SendOutcome, StreamConsumer};
use chatrelay_server::message::{Message, Role};
use chatrelay_server::relay::{AppState, serve_with_listener};
use chatrelay_server::testing::ScriptedCompletionClient;
use chatrelay_server::upstream::UpstreamError;

const SYSTEM_PROMPT: &str = "You are a Steam support assistant.";

/// Relay serving on an ephemeral port until dropped
struct RunningRelay {
    url: Url,
    _shutdown: oneshot::Sender<()>,
}

async fn start_relay(upstream: &ScriptedCompletionClient) -> RunningRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(SYSTEM_PROMPT, Arc::new(upstream.clone())));

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(serve_with_listener(listener, state, async move {
        let _ = rx.await;
    }));

    RunningRelay {
        url: Url::parse(&format!("http://{addr}/api/chat")).unwrap(),
        _shutdown: tx,
    }
}

fn consumer(relay: &RunningRelay, delay: &RecordingDelay) -> StreamConsumer {
    StreamConsumer::with_delay(
        relay.url.clone(),
        RetryPolicy::default(),
        Arc::new(delay.clone()),
    )
}

fn conversation() -> Conversation {
    let mut conversation = Conversation::with_greeting("Hi! How can I help?");
    conversation
        .push(Message::user("How do I move my library?"))
        .unwrap();
    conversation
}

#[tokio::test]
async fn test_reply_equals_concatenated_fragments() {
    let fragments = ["Open ", "Settings → ", "Storage, ", "then add a drive. ", "🎮"];
    let upstream = ScriptedCompletionClient::new().with_fragments(fragments);
    let relay = start_relay(&upstream).await;

    let delay = RecordingDelay::new();
    let view = RecordingView::new();
    let mut conversation = conversation();

    let outcome = consumer(&relay, &delay)
        .send(&mut conversation, &view)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SendOutcome::Completed(Message::assistant(fragments.concat()))
    );

    // Every streamed update extends the previous one
    let partials = view.partial_replies();
    assert!(partials.windows(2).all(|w| w[1].starts_with(&w[0])));

    // The relay added its system message; the client never saw it
    let payload = &upstream.received_payloads()[0];
    assert_eq!(payload[0], Message::system(SYSTEM_PROMPT));
    assert_eq!(&payload[1..], &conversation.messages()[..2]);
    assert!(conversation.messages().iter().all(|m| m.role != Role::System));
}

#[tokio::test]
async fn test_upstream_rate_limit_retried_through_relay() {
    let rate_limited = UpstreamError::RateLimited {
        retry_after: Some(Duration::from_secs(1)),
        message: "free-models-per-day".into(),
    };
    let upstream = ScriptedCompletionClient::new()
        .with_failure(rate_limited.clone())
        .with_failure(rate_limited)
        .with_fragments(["Done ", "on the third try."]);
    let relay = start_relay(&upstream).await;

    let delay = RecordingDelay::new();
    let mut conversation = conversation();

    let outcome = consumer(&relay, &delay)
        .send(&mut conversation, &RecordingView::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SendOutcome::Completed(Message::assistant("Done on the third try."))
    );
    assert_eq!(upstream.call_count(), 3);
    assert_eq!(delay.waits(), vec![Duration::from_millis(5000); 2]);
}

#[tokio::test]
async fn test_upstream_rate_limit_exhausts_attempts() {
    let upstream = (0..4).fold(ScriptedCompletionClient::new(), |upstream, _| {
        upstream.with_failure(UpstreamError::RateLimited {
            retry_after: None,
            message: "quota".into(),
        })
    });
    let relay = start_relay(&upstream).await;

    let delay = RecordingDelay::new();
    let mut conversation = conversation();

    let outcome = consumer(&relay, &delay)
        .send(&mut conversation, &RecordingView::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SendOutcome::Failed {
            kind: FailureKind::RateLimited,
            ..
        }
    ));
    assert_eq!(upstream.call_count(), 3);
}

#[tokio::test]
async fn test_upstream_failure_is_generic_apology() {
    let upstream = ScriptedCompletionClient::new().with_failure(UpstreamError::Status {
        status: 401,
        body: "invalid api key".into(),
    });
    let relay = start_relay(&upstream).await;

    let delay = RecordingDelay::new();
    let mut conversation = conversation();

    let outcome = consumer(&relay, &delay)
        .send(&mut conversation, &RecordingView::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        SendOutcome::Failed {
            kind: FailureKind::Other,
            ..
        }
    ));
    assert_eq!(upstream.call_count(), 1);
    assert!(delay.waits().is_empty());
    assert_eq!(
        conversation.last().unwrap().content,
        "I'm sorry, but I encountered an error. Please try again later."
    );
}
