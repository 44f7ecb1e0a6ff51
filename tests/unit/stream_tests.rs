//! Unit tests for the stream adaptor: draft throttling, the sliding
//! window, and finalization.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_switchboard::stream::{extract_file_tags, StreamAdaptor, DRAFT_WINDOW};
use agent_switchboard::telegram::gateway::{Destination, Gateway, ParseMode, SendError};

// ── Recording gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Draft { draft_id: i64, text: String },
    Message { text: String, mode: ParseMode },
    Document { path: String },
}

#[derive(Default)]
struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    fail_html: AtomicBool,
    next_draft_error: Mutex<Option<SendError>>,
}

impl RecordingGateway {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    fn drafts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Draft { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn messages(&self) -> Vec<(String, ParseMode)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Message { text, mode } => Some((text, mode)),
                _ => None,
            })
            .collect()
    }
}

impl Gateway for RecordingGateway {
    fn send_draft<'a>(
        &'a self,
        _dest: Destination,
        draft_id: i64,
        text: &'a str,
        _mode: ParseMode,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<(), SendError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.calls.lock().expect("lock").push(Call::Draft {
                draft_id,
                text: text.to_owned(),
            });
            if let Some(err) = self.next_draft_error.lock().expect("lock").take() {
                return Err(err);
            }
            Ok(())
        })
    }

    fn send_message<'a>(
        &'a self,
        _dest: Destination,
        text: &'a str,
        mode: ParseMode,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<(), SendError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.calls.lock().expect("lock").push(Call::Message {
                text: text.to_owned(),
                mode,
            });
            if mode == ParseMode::Html && self.fail_html.load(Ordering::SeqCst) {
                return Err(SendError::BadMarkup("can't parse entities".into()));
            }
            Ok(())
        })
    }

    fn send_document<'a>(
        &'a self,
        _dest: Destination,
        path: &'a Path,
        _caption: Option<&'a str>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<(), SendError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.calls.lock().expect("lock").push(Call::Document {
                path: path.display().to_string(),
            });
            Ok(())
        })
    }

    fn download<'a>(
        &'a self,
        _file_id: &'a str,
        _dest_path: &'a Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<(), SendError>> + Send + 'a>,
    > {
        Box::pin(async move { Ok(()) })
    }
}

fn dest() -> Destination {
    Destination {
        chat_id: 1,
        topic_id: None,
    }
}

// ── Tag extraction ──────────────────────────────────────────────────────────

#[test]
fn extract_single_tag() {
    let (text, files) =
        extract_file_tags("done <send_file path=\"out/a.txt\">the result</send_file>");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "out/a.txt");
    assert_eq!(files[0].description, "the result");
    assert!(!text.contains("send_file"));
}

#[test]
fn extract_tag_with_multiline_description() {
    let (_, files) =
        extract_file_tags("<send_file path=\"a.bin\">line one\nline two</send_file>");
    assert_eq!(files[0].description, "line one\nline two");
}

#[test]
fn extract_multiple_tags_in_order() {
    let input = "<send_file path=\"a\">1</send_file> mid <send_file path=\"b\">2</send_file>";
    let (text, files) = extract_file_tags(input);
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "a");
    assert_eq!(files[1].path, "b");
    assert_eq!(text.trim(), "mid");
}

#[test]
fn no_tags_leaves_text_untouched() {
    let (text, files) = extract_file_tags("nothing to send here");
    assert!(files.is_empty());
    assert_eq!(text, "nothing to send here");
}

// ── Draft throttling ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_chunk_sends_a_draft_immediately() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor.push_chunk("hello").await;
    assert_eq!(gateway.drafts(), vec!["hello".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn chunks_within_the_interval_are_throttled() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor.push_chunk("a").await;
    adaptor.push_chunk("b").await;
    adaptor.push_chunk("c").await;
    assert_eq!(gateway.drafts(), vec!["a".to_owned()], "only the first send passes");

    tokio::time::advance(Duration::from_millis(150)).await;
    adaptor.push_chunk("d").await;
    assert_eq!(
        gateway.drafts(),
        vec!["a".to_owned(), "abcd".to_owned()],
        "the next send carries the whole buffer"
    );
}

#[tokio::test(start_paused = true)]
async fn draft_updates_reuse_one_draft_id() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());
    let expected = adaptor.draft_id();
    assert!(expected > 0, "draft ids are positive");

    adaptor.push_chunk("a").await;
    tokio::time::advance(Duration::from_millis(150)).await;
    adaptor.push_chunk("b").await;

    for call in gateway.calls() {
        if let Call::Draft { draft_id, .. } = call {
            assert_eq!(draft_id, expected);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_pushes_the_next_attempt_past_the_hint() {
    let gateway = Arc::new(RecordingGateway::default());
    *gateway.next_draft_error.lock().expect("lock") = Some(SendError::RateLimited {
        retry_after: Duration::from_secs(2),
    });
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor.push_chunk("a").await;
    assert_eq!(gateway.drafts().len(), 1, "the rate-limited attempt");

    tokio::time::advance(Duration::from_millis(500)).await;
    adaptor.push_chunk("b").await;
    assert_eq!(
        gateway.drafts().len(),
        1,
        "inside the hinted backoff no attempt is made"
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    adaptor.push_chunk("c").await;
    assert_eq!(gateway.drafts().len(), 2, "past the hint sends resume");
}

#[tokio::test(start_paused = true)]
async fn long_buffer_windows_to_the_tail_with_ellipsis() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    let long = "x".repeat(DRAFT_WINDOW + 500);
    adaptor.push_chunk(&long).await;

    let drafts = gateway.drafts();
    let window = drafts.first().expect("one draft");
    assert!(window.starts_with("\u{2026}\n"));
    assert_eq!(window.len(), DRAFT_WINDOW + "\u{2026}\n".len());
}

// ── Cancel ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancelled_adaptor_ignores_chunks_and_finalizes_to_nothing() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor.push_chunk("partial").await;
    adaptor.cancel();
    adaptor.push_chunk(" more").await;
    assert_eq!(adaptor.buffer(), "partial", "chunks after cancel are dropped");

    let files = adaptor.finalize().await;
    assert!(files.is_empty());
    // The partial draft stays; no ellipsis, no final message.
    assert_eq!(gateway.drafts(), vec!["partial".to_owned()]);
    assert!(gateway.messages().is_empty());
}

// ── Finalization ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn empty_buffer_finalizes_to_nothing() {
    let gateway = Arc::new(RecordingGateway::default());
    let adaptor = StreamAdaptor::new(gateway.clone(), dest());
    let files = adaptor.finalize().await;
    assert!(files.is_empty());
    assert!(gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn finalize_sends_ellipsis_draft_then_converted_message() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor.push_chunk("Hello **world**").await;
    let files = adaptor.finalize().await;
    assert!(files.is_empty());

    let drafts = gateway.drafts();
    assert_eq!(drafts.last().expect("closing draft"), "\u{2026}");

    let messages = gateway.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, ParseMode::Html);
    assert!(messages[0].0.contains("<b>world</b>"));
}

#[tokio::test(start_paused = true)]
async fn finalize_strips_file_tags_before_conversion() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor
        .push_chunk("Here you go <send_file path=\"out.txt\">the output</send_file> done")
        .await;
    let files = adaptor.finalize().await;

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "out.txt");
    let (text, _) = &gateway.messages()[0];
    assert!(!text.contains("send_file"));
    assert!(!text.contains("the output"));
}

#[tokio::test(start_paused = true)]
async fn tag_only_buffer_skips_the_text_send() {
    let gateway = Arc::new(RecordingGateway::default());
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor
        .push_chunk("<send_file path=\"only.bin\">binary</send_file>")
        .await;
    let files = adaptor.finalize().await;

    assert_eq!(files.len(), 1);
    assert!(gateway.messages().is_empty(), "no empty text message");
}

#[tokio::test(start_paused = true)]
async fn rejected_markup_is_retried_once_as_plain_text() {
    let gateway = Arc::new(RecordingGateway::default());
    gateway.fail_html.store(true, Ordering::SeqCst);
    let mut adaptor = StreamAdaptor::new(gateway.clone(), dest());

    adaptor.push_chunk("some **bold** text").await;
    adaptor.finalize().await;

    let messages = gateway.messages();
    assert_eq!(messages.len(), 2, "one HTML attempt, one plain retry");
    assert_eq!(messages[0].1, ParseMode::Html);
    assert_eq!(messages[1].1, ParseMode::Plain);
    assert_eq!(messages[0].0, messages[1].0, "the same segment is retried");
}
