//! End-to-end tests over the public server API with the in-memory host:
//! surfaces attach, submit structural edits, and observe the renders,
//! resyncs, and highlights the engine routes back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tandem_engine::{EditOp, EditRequest, EditTarget, ElementRange, TextEdit};
use tandem_markup::Span;
use tandem_workspace::{
    EngineMessage, FormatterService, HostError, MemoryHost, NoFormatter, PasteRequest,
    SelectionKind, SurfaceId, SurfaceMessage, SyncServer, TextHost, VersionedText,
};
use tokio::sync::mpsc;

fn make_server() -> (Arc<MemoryHost>, Arc<SyncServer>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let host = Arc::new(MemoryHost::new());
    let server = SyncServer::new(host.clone(), host.clone(), Arc::new(NoFormatter));
    (host, Arc::new(server))
}

async fn attach(server: &SyncServer, uri: &str) -> (SurfaceId, mpsc::Receiver<EngineMessage>) {
    let (tx, mut rx) = mpsc::channel(16);
    let id = server.attach_surface(uri, tx).await.expect("attach surface");
    match rx.recv().await {
        Some(EngineMessage::Render { .. }) => {}
        other => panic!("expected initial render, got {other:?}"),
    }
    (id, rx)
}

fn expect_render(msg: Option<EngineMessage>) -> String {
    match msg {
        Some(EngineMessage::Render { html }) => html,
        other => panic!("expected render, got {other:?}"),
    }
}

fn expect_code_ranges(msg: Option<EngineMessage>) -> Vec<ElementRange> {
    match msg {
        Some(EngineMessage::CodeRanges { data }) => data,
        other => panic!("expected codeRanges, got {other:?}"),
    }
}

#[tokio::test]
async fn test_style_edit_applies_and_resyncs_source() {
    let (host, server) = make_server();
    host.open("mem:page", r#"<div><p class="a">Hi</p></div>"#);
    let (a, mut rx_a) = attach(&server, "mem:page").await;
    let (_b, mut rx_b) = attach(&server, "mem:page").await;

    let target = EditTarget::new("p.a", Span::new(5, 24));
    let request = EditRequest::new(
        target,
        vec![EditOp::SetStyle {
            property: "color".to_string(),
            value: "red".to_string(),
        }],
    );
    server
        .handle_message("mem:page", a, SurfaceMessage::Edit { data: vec![request] })
        .await
        .expect("edit");

    let expected = r#"<div><p class="a" style="color:red">Hi</p></div>"#;
    assert_eq!(host.text_of("mem:page").unwrap(), expected);
    assert_eq!(host.version_of("mem:page"), Some(2));

    // the editing surface resyncs offsets; the other surface re-renders
    let ranges = expect_code_ranges(rx_a.recv().await);
    assert!(ranges
        .iter()
        .any(|r| r.short_name == "p.a" && r.start == 5 && r.end == 42));
    let html = expect_render(rx_b.recv().await);
    assert_eq!(html, expected);
}

#[tokio::test]
async fn test_external_change_renders_every_surface() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>hello</p></div>");
    let (_a, mut rx_a) = attach(&server, "mem:page").await;
    let (_b, mut rx_b) = attach(&server, "mem:page").await;

    host.external_edit("mem:page", &TextEdit::insert(0, "<!-- note -->"))
        .expect("external edit");
    server.document_changed("mem:page").await.expect("route");

    let html_a = expect_render(rx_a.recv().await);
    let html_b = expect_render(rx_b.recv().await);
    assert!(html_a.starts_with("<!-- note -->"));
    assert_eq!(html_a, html_b);
}

/// Host that simulates another author racing the engine: the first atomic
/// apply finds the document already moved.
struct RacingHost {
    inner: Arc<MemoryHost>,
    fired: AtomicBool,
}

#[async_trait]
impl TextHost for RacingHost {
    async fn read(&self, uri: &str) -> Result<VersionedText, HostError> {
        self.inner.read(uri).await
    }

    async fn apply_atomic(
        &self,
        uri: &str,
        edits: &[TextEdit],
        expected_version: u64,
    ) -> Result<u64, HostError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner
                .external_edit(uri, &TextEdit::insert(0, "X"))
                .expect("inject racing edit");
        }
        self.inner.apply_atomic(uri, edits, expected_version).await
    }

    async fn set_selections(&self, uri: &str, ranges: &[Span]) -> Result<(), HostError> {
        self.inner.set_selections(uri, ranges).await
    }
}

#[tokio::test]
async fn test_edit_retries_after_concurrent_prefix_insert() {
    let memory = Arc::new(MemoryHost::new());
    memory.open("mem:page", r#"<div><p class="a">Hi</p></div>"#);
    let racing = Arc::new(RacingHost {
        inner: memory.clone(),
        fired: AtomicBool::new(false),
    });
    let server = Arc::new(SyncServer::new(
        racing,
        memory.clone(),
        Arc::new(NoFormatter),
    ));
    let (a, mut rx) = attach(&server, "mem:page").await;

    let target = EditTarget::new("p.a", Span::new(5, 24)).with_path("div:0/p:0");
    let request = EditRequest::new(
        target,
        vec![EditOp::SetStyle {
            property: "color".to_string(),
            value: "red".to_string(),
        }],
    );
    server
        .handle_message("mem:page", a, SurfaceMessage::Edit { data: vec![request] })
        .await
        .expect("edit");

    // stale first attempt, re-resolved against the shifted text
    assert_eq!(
        memory.text_of("mem:page").unwrap(),
        r#"X<div><p class="a" style="color:red">Hi</p></div>"#
    );
    assert_eq!(memory.version_of("mem:page"), Some(3));
    let ranges = expect_code_ranges(rx.recv().await);
    assert!(ranges.iter().any(|r| r.short_name == "p.a"));
}

/// Host where every atomic apply loses the race.
struct ChurningHost {
    inner: Arc<MemoryHost>,
}

#[async_trait]
impl TextHost for ChurningHost {
    async fn read(&self, uri: &str) -> Result<VersionedText, HostError> {
        self.inner.read(uri).await
    }

    async fn apply_atomic(
        &self,
        uri: &str,
        edits: &[TextEdit],
        expected_version: u64,
    ) -> Result<u64, HostError> {
        self.inner
            .external_edit(uri, &TextEdit::insert(0, "Y"))
            .expect("inject churn");
        self.inner.apply_atomic(uri, edits, expected_version).await
    }

    async fn set_selections(&self, uri: &str, ranges: &[Span]) -> Result<(), HostError> {
        self.inner.set_selections(uri, ranges).await
    }
}

#[tokio::test]
async fn test_edit_gives_up_under_constant_churn() {
    let memory = Arc::new(MemoryHost::new());
    memory.open("mem:page", r#"<div><p class="a">Hi</p></div>"#);
    let server = Arc::new(SyncServer::new(
        Arc::new(ChurningHost {
            inner: memory.clone(),
        }),
        memory.clone(),
        Arc::new(NoFormatter),
    ));
    let ctx = server.context();
    let (a, mut rx) = attach(&server, "mem:page").await;

    let target = EditTarget::new("p.a", Span::new(5, 24)).with_path("div:0/p:0");
    let request = EditRequest::new(
        target,
        vec![EditOp::SetStyle {
            property: "color".to_string(),
            value: "red".to_string(),
        }],
    );
    server
        .handle_message("mem:page", a, SurfaceMessage::Edit { data: vec![request] })
        .await
        .expect("dropped edits are not errors");

    // one injected prefix per attempt, and the style never landed
    let text = memory.text_of("mem:page").unwrap();
    assert!(text.starts_with("YYY<div>"), "unexpected text: {text}");
    assert!(!text.contains("style"));
    assert_eq!(memory.version_of("mem:page"), Some(4));
    assert!(!ctx.registry.read().unwrap().edit_source("mem:page", a));
    assert!(rx.try_recv().is_err());
}

/// Host that rejects writes as stale without the version ever moving.
struct StuckHost {
    inner: Arc<MemoryHost>,
}

#[async_trait]
impl TextHost for StuckHost {
    async fn read(&self, uri: &str) -> Result<VersionedText, HostError> {
        self.inner.read(uri).await
    }

    async fn apply_atomic(
        &self,
        _uri: &str,
        _edits: &[TextEdit],
        expected_version: u64,
    ) -> Result<u64, HostError> {
        Err(HostError::Stale {
            expected: expected_version,
            current: expected_version,
        })
    }

    async fn set_selections(&self, uri: &str, ranges: &[Span]) -> Result<(), HostError> {
        self.inner.set_selections(uri, ranges).await
    }
}

#[tokio::test]
async fn test_stale_without_progress_drops_immediately() {
    let memory = Arc::new(MemoryHost::new());
    memory.open("mem:page", r#"<div><p class="a">Hi</p></div>"#);
    let server = Arc::new(SyncServer::new(
        Arc::new(StuckHost {
            inner: memory.clone(),
        }),
        memory.clone(),
        Arc::new(NoFormatter),
    ));
    let ctx = server.context();
    let (a, mut rx) = attach(&server, "mem:page").await;

    let request = EditRequest::new(
        EditTarget::new("p.a", Span::new(5, 24)),
        vec![EditOp::SetStyle {
            property: "color".to_string(),
            value: "red".to_string(),
        }],
    );
    server
        .handle_message("mem:page", a, SurfaceMessage::Edit { data: vec![request] })
        .await
        .expect("dropped edits are not errors");

    assert_eq!(
        memory.text_of("mem:page").unwrap(),
        r#"<div><p class="a">Hi</p></div>"#
    );
    assert!(!ctx.registry.read().unwrap().edit_source("mem:page", a));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_edits_all_land() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>x</p></div>");
    let (a, mut rx) = attach(&server, "mem:page").await;

    let mut order: Vec<usize> = (0..8).collect();
    order.shuffle(&mut rand::thread_rng());

    let mut joins = Vec::new();
    for i in order {
        let server = server.clone();
        joins.push(tokio::spawn(async move {
            let target = EditTarget::new("p", Span::new(5, 13)).with_path("div:0/p:0");
            let request = EditRequest::new(
                target,
                vec![EditOp::SetAttribute {
                    name: format!("data-i{i}"),
                    value: i.to_string(),
                }],
            );
            server
                .handle_message("mem:page", a, SurfaceMessage::Edit { data: vec![request] })
                .await
        }));
    }
    for join in joins {
        join.await.expect("task").expect("edit batch");
    }

    // serialized per document: no edit may be lost, whatever the order
    let text = host.text_of("mem:page").expect("text");
    for i in 0..8 {
        assert!(
            text.contains(&format!("data-i{i}=\"{i}\"")),
            "missing attribute {i} in {text}"
        );
    }
    assert_eq!(host.version_of("mem:page"), Some(9));

    let mut code_ranges = 0;
    while let Ok(msg) = rx.try_recv() {
        match msg {
            EngineMessage::CodeRanges { .. } => code_ranges += 1,
            other => panic!("unexpected message during suppressed edits: {other:?}"),
        }
    }
    assert_eq!(code_ranges, 8);
}

#[tokio::test]
async fn test_cut_copies_then_deletes_whole_lines() {
    let (host, server) = make_server();
    host.open("mem:page", "<div>\n  <p class=\"a\">Hi</p>\n</div>");
    let (a, mut rx) = attach(&server, "mem:page").await;

    let targets = vec![EditTarget::new("p.a", Span::new(8, 27))];
    server
        .handle_message("mem:page", a, SurfaceMessage::Cut { data: targets })
        .await
        .expect("cut");

    assert_eq!(host.clipboard_text(), "<p class=\"a\">Hi</p>");
    assert_eq!(host.text_of("mem:page").unwrap(), "<div>\n</div>");
    assert_eq!(host.version_of("mem:page"), Some(2));

    // the cutting surface keeps its visual and resyncs offsets
    let ranges = expect_code_ranges(rx.recv().await);
    assert!(ranges.iter().any(|r| r.short_name == "div"));
}

#[tokio::test]
async fn test_cut_on_shared_line_removes_element_only() {
    let (host, server) = make_server();
    host.open("mem:page", r#"<div><p class="a">Hi</p></div>"#);
    let (a, _rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Cut {
                data: vec![EditTarget::new("p.a", Span::new(5, 24))],
            },
        )
        .await
        .expect("cut");

    // nothing else shares the element's lines, so only the element goes
    assert_eq!(host.clipboard_text(), r#"<p class="a">Hi</p>"#);
    assert_eq!(host.text_of("mem:page").unwrap(), "<div></div>");
}

#[tokio::test]
async fn test_copy_dedents_nested_markup() {
    let (host, server) = make_server();
    let text = "<section>\n  <div class=\"card\">\n    <p>x</p>\n  </div>\n</section>";
    host.open("mem:page", text);
    let (a, mut rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Copy {
                data: vec![EditTarget::new("div.card", Span::new(12, 52))],
            },
        )
        .await
        .expect("copy");

    assert_eq!(
        host.clipboard_text(),
        "<div class=\"card\">\n  <p>x</p>\n</div>"
    );
    // copy mutates nothing and routes nothing
    assert_eq!(host.text_of("mem:page").unwrap(), text);
    assert_eq!(host.version_of("mem:page"), Some(1));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_paste_markup_lands_before_closing_tag() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>hello</p></div>");
    host.set_clipboard("<span>new</span>");
    let (a, mut rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Paste {
                data: PasteRequest {
                    target: EditTarget::new("div", Span::new(0, 23)),
                    is_markup: true,
                },
            },
        )
        .await
        .expect("paste");

    assert_eq!(
        host.text_of("mem:page").unwrap(),
        "<div><p>hello</p><span>new</span></div>"
    );
    let ranges = expect_code_ranges(rx.recv().await);
    assert!(ranges.iter().any(|r| r.short_name == "span"));
}

#[tokio::test]
async fn test_paste_plain_text_is_escaped() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>hello</p></div>");
    host.set_clipboard("a < b & c");
    let (a, _rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Paste {
                data: PasteRequest {
                    target: EditTarget::new("div", Span::new(0, 23)),
                    is_markup: false,
                },
            },
        )
        .await
        .expect("paste");

    assert_eq!(
        host.text_of("mem:page").unwrap(),
        "<div><p>hello</p>a &lt; b &amp; c</div>"
    );
}

/// Formatter that breaks the pasted block onto its own indented line.
struct IndentFormatter;

#[async_trait]
impl FormatterService for IndentFormatter {
    async fn format_range(
        &self,
        _uri: &str,
        range: Span,
        _text: &str,
    ) -> Result<Vec<TextEdit>, HostError> {
        Ok(vec![TextEdit::insert(range.start, "\n  ")])
    }
}

#[tokio::test]
async fn test_paste_runs_formatting_pass() {
    let host = Arc::new(MemoryHost::new());
    host.open("mem:page", "<div></div>");
    host.set_clipboard("<b>x</b>");
    let server = Arc::new(SyncServer::new(
        host.clone(),
        host.clone(),
        Arc::new(IndentFormatter),
    ));
    let (a, mut rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Paste {
                data: PasteRequest {
                    target: EditTarget::new("div", Span::new(0, 11)),
                    is_markup: true,
                },
            },
        )
        .await
        .expect("paste");

    assert_eq!(host.text_of("mem:page").unwrap(), "<div>\n  <b>x</b></div>");
    assert_eq!(host.version_of("mem:page"), Some(3));

    // one resync for the insert, one for the formatting pass
    let _ = expect_code_ranges(rx.recv().await);
    let ranges = expect_code_ranges(rx.recv().await);
    assert!(ranges
        .iter()
        .any(|r| r.short_name == "b" && r.start == 8 && r.end == 16));
}

#[tokio::test]
async fn test_resource_save_rerenders_and_keeps_flag() {
    let (host, server) = make_server();
    host.open(
        "mem:page",
        r#"<html><head><link rel="stylesheet" href="styles/main.css"></head></html>"#,
    );
    let ctx = server.context();
    let (a, mut rx) = attach(&server, "mem:page").await;

    ctx.registry.write().unwrap().mark_edit_source("mem:page", a);
    server
        .resource_saved("/proj/styles/main.css")
        .await
        .expect("resource save");

    // unconditional re-render, and the pending edit flag survives
    let _ = expect_render(rx.recv().await);
    assert!(ctx.registry.read().unwrap().edit_source("mem:page", a));

    server.document_changed("mem:page").await.expect("route");
    let _ = expect_code_ranges(rx.recv().await);
    assert!(!ctx.registry.read().unwrap().edit_source("mem:page", a));
}

#[tokio::test]
async fn test_watcher_rerenders_on_linked_save() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (host, server) = make_server();
    host.open(
        "mem:page",
        r#"<html><head><link rel="stylesheet" href="main.css"></head></html>"#,
    );
    let (_a, mut rx) = attach(&server, "mem:page").await;

    let handle = server.watch_resources(dir.path())?;
    // give the OS watcher a beat to register
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(dir.path().join("main.css"), "body { margin: 0 }")?;

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("save should reach the surface");
    let html = expect_render(msg);
    assert!(html.contains("main.css"));
    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_select_widens_to_whole_lines() {
    let (host, server) = make_server();
    host.open("mem:page", "<div>\n  <p>x</p>\n</div>");
    let (a, _rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Select {
                data: vec![Span::new(8, 16)],
            },
        )
        .await
        .expect("select");

    assert_eq!(host.selections_of("mem:page"), vec![Span::new(6, 17)]);
}

#[tokio::test]
async fn test_select_inside_multibyte_char_snaps_to_boundary() {
    let (host, server) = make_server();
    host.open("mem:page", "<p>héllo</p>");
    let (a, _rx) = attach(&server, "mem:page").await;

    // é occupies bytes 4..6; the surface's offset 5 splits it
    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Select {
                data: vec![Span::new(5, 9)],
            },
        )
        .await
        .expect("select");

    assert_eq!(host.selections_of("mem:page"), vec![Span::new(4, 9)]);
}

#[tokio::test]
async fn test_human_selection_projects_covering_element() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>hello</p></div>");
    let (_a, mut rx_a) = attach(&server, "mem:page").await;
    let (_b, mut rx_b) = attach(&server, "mem:page").await;

    server
        .selection_changed("mem:page", &[Span::new(9, 12)], SelectionKind::Keyboard)
        .await
        .expect("selection");

    for rx in [&mut rx_a, &mut rx_b] {
        match rx.recv().await {
            Some(EngineMessage::Select { data }) => {
                assert_eq!(data, vec![Span::new(5, 17)]);
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    // programmatic selections stay quiet
    server
        .selection_changed("mem:page", &[Span::new(9, 12)], SelectionKind::Command)
        .await
        .expect("selection");
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_state_relays_to_siblings_only() {
    let (host, server) = make_server();
    host.open("mem:page", "<div></div>");
    let (a, mut rx_a) = attach(&server, "mem:page").await;
    let (_b, mut rx_b) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::State {
                data: serde_json::json!({ "zoom": 2 }),
            },
        )
        .await
        .expect("state");

    match rx_b.recv().await {
        Some(EngineMessage::State { data }) => assert_eq!(data["zoom"], 2),
        other => panic!("expected state, got {other:?}"),
    }
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn test_refresh_renders_requesting_surface_only() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>hello</p></div>");
    let (a, mut rx_a) = attach(&server, "mem:page").await;
    let (_b, mut rx_b) = attach(&server, "mem:page").await;

    server
        .handle_message("mem:page", a, SurfaceMessage::Refresh)
        .await
        .expect("refresh");

    assert_eq!(expect_render(rx_a.recv().await), "<div><p>hello</p></div>");
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_delete_of_missing_target_drops_silently() {
    let (host, server) = make_server();
    host.open("mem:page", "<div><p>x</p></div>");
    let ctx = server.context();
    let (a, mut rx) = attach(&server, "mem:page").await;

    server
        .handle_message(
            "mem:page",
            a,
            SurfaceMessage::Delete {
                data: vec![EditTarget::new("span.gone", Span::new(100, 120))],
            },
        )
        .await
        .expect("dropped deletes are not errors");

    assert_eq!(host.text_of("mem:page").unwrap(), "<div><p>x</p></div>");
    assert_eq!(host.version_of("mem:page"), Some(1));
    assert!(!ctx.registry.read().unwrap().edit_source("mem:page", a));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_invalid_style_value_drops_edit() {
    let (host, server) = make_server();
    host.open("mem:page", r#"<div><p class="a">Hi</p></div>"#);
    let ctx = server.context();
    let (a, mut rx) = attach(&server, "mem:page").await;

    let request = EditRequest::new(
        EditTarget::new("p.a", Span::new(5, 24)),
        vec![EditOp::SetStyle {
            property: "color".to_string(),
            value: "red;}".to_string(),
        }],
    );
    server
        .handle_message("mem:page", a, SurfaceMessage::Edit { data: vec![request] })
        .await
        .expect("dropped edits are not errors");

    assert_eq!(
        host.text_of("mem:page").unwrap(),
        r#"<div><p class="a">Hi</p></div>"#
    );
    assert!(!ctx.registry.read().unwrap().edit_source("mem:page", a));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_close_document_stops_routing() {
    let (host, server) = make_server();
    host.open("mem:page", "<div></div>");
    let (_a, mut rx) = attach(&server, "mem:page").await;

    server.close_document("mem:page");
    server.document_changed("mem:page").await.expect("route");
    assert!(rx.try_recv().is_err());
}
