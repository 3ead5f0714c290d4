//! Integration tests for Embedwatch Core

use async_trait::async_trait;
use embedwatch_core::{
    sim::{MemoryHost, ScriptedApi},
    ApiGateway, ApiPlayer, DeferredHolder, EmbedConfig, EmbedController, EmbedFrame, EmbedHost, Error,
    FrameHandle, LoadRequest, Pending, PlayerEvent, PlayerStatus, StatusMonitor,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::sync::oneshot;

const SCRIPT_URL: &str = "https://www.youtube.com/iframe_api";
const CONTAINER: &str = "app";
const STATUS: &str = "music-detail";

struct Page {
    host: Arc<MemoryHost>,
    api: Arc<ScriptedApi>,
    gateway: Arc<ApiGateway>,
}

fn page(api: ScriptedApi) -> Page {
    let host = Arc::new(MemoryHost::new());
    let api = Arc::new(api);
    let gateway = Arc::new(ApiGateway::new(api.clone(), host.clone(), SCRIPT_URL));
    Page { host, api, gateway }
}

fn controller(page: &Page) -> EmbedController {
    EmbedController::new(EmbedConfig::default(), page.gateway.clone()).unwrap()
}

async fn settle<T>(pending: Pending<T>) -> embedwatch_core::Result<T> {
    tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("completion did not settle in time")
}

/// Ready event with an unmatched code, then a first state report: player usable
fn usable() -> Vec<PlayerEvent> {
    vec![PlayerEvent::Ready(Some(5)), PlayerEvent::StateChanged(5)]
}

/// Ready event reporting "unstarted": player failed to load
fn broken() -> Vec<PlayerEvent> {
    vec![PlayerEvent::Ready(Some(-1))]
}

// =============================================================================
// Controller: success and idempotence
// =============================================================================

#[tokio::test]
async fn test_single_item_resolves_when_ready() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    let controller = controller(&page);

    let frame = controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();

    let ready = settle(controller.pending()).await.unwrap();
    assert!(Arc::ptr_eq(&ready.frame, &frame));
    assert_eq!(ready.player.target_id(), frame.id());
    assert_eq!(frame.address(), "https://www.youtube.com/embed/abc12345678");
    assert_eq!(frame.src(), "https://www.youtube.com/embed/abc12345678?enablejsapi=1");
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Ready"));
    assert_eq!(controller.status().await, PlayerStatus::Ready);
    assert_eq!(controller.retry_count().await, 0);
}

#[tokio::test]
async fn test_unchanged_identifiers_keep_frame() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    let controller = controller(&page);
    let request = LoadRequest::item("abc12345678").with_collection("PL1");

    let first = controller.load(request.clone(), CONTAINER, STATUS).await.unwrap();
    settle(controller.pending()).await.unwrap();
    let second = controller.load(request, CONTAINER, STATUS).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(page.host.selector_waits(), 1);
    assert_eq!(page.api.players().len(), 1);
    assert!(controller.deferred().is_settled());
}

#[tokio::test]
async fn test_changed_identifiers_replace_frame() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    page.api.push_script(usable());
    let controller = controller(&page);

    let first = controller
        .load(LoadRequest::item("first000000"), CONTAINER, STATUS)
        .await
        .unwrap();
    settle(controller.pending()).await.unwrap();

    let second = controller
        .load(LoadRequest::item("second00000"), CONTAINER, STATUS)
        .await
        .unwrap();
    let ready = settle(controller.pending()).await.unwrap();

    assert!(Arc::ptr_eq(&ready.frame, &second));
    assert!(page.host.removed().contains(&first.id().to_string()));
    assert_eq!(page.host.frames(CONTAINER).len(), 1);
    assert!(page.api.players()[0].is_destroyed());
}

#[tokio::test]
async fn test_omitted_fields_are_retained() {
    let page = page(ScriptedApi::loaded());
    let controller = controller(&page);

    controller
        .load(LoadRequest::item("abc12345678").with_collection("PL1"), CONTAINER, STATUS)
        .await
        .unwrap();
    let frame = controller
        .load(LoadRequest::default().with_offset(42), CONTAINER, STATUS)
        .await
        .unwrap();

    assert_eq!(
        frame.address(),
        "https://www.youtube.com/embed/abc12345678?list=PL1&start=42"
    );
    let ids = controller.identifiers().await;
    assert_eq!(ids.collection_id.as_deref(), Some("PL1"));
}

#[tokio::test]
async fn test_missing_identifiers_fail_before_any_frame() {
    let page = page(ScriptedApi::loaded());
    let controller = controller(&page);

    let err = controller
        .load(LoadRequest::default().with_api_flag(true), CONTAINER, STATUS)
        .await
        .unwrap_err();

    assert_eq!(err, Error::MissingIdentifiers);
    assert!(page.host.frames(CONTAINER).is_empty());
    assert_eq!(page.host.selector_waits(), 0);
    assert!(controller.frame().await.is_none());
}

// =============================================================================
// Controller: retry policy
// =============================================================================

#[tokio::test]
async fn test_single_item_never_retries() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(broken());
    page.api.push_script(usable());
    let controller = controller(&page);

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::RetriesExhausted { retries: 0 });
    assert_eq!(page.api.players().len(), 1);
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Error"));
}

#[tokio::test]
async fn test_collection_retry_drops_collection() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(broken());
    page.api.push_script(usable());
    let controller = controller(&page);

    let first = controller
        .load(
            LoadRequest::item("abc12345678").with_collection("PL1"),
            CONTAINER,
            STATUS,
        )
        .await
        .unwrap();
    assert_eq!(
        first.address(),
        "https://www.youtube.com/embed/abc12345678?list=PL1"
    );

    let ready = settle(controller.pending()).await.unwrap();
    assert_eq!(ready.frame.address(), "https://www.youtube.com/embed/abc12345678");
    assert_eq!(controller.retry_count().await, 1);
    assert_eq!(page.api.players().len(), 2);
    assert!(page.api.players()[0].is_destroyed());
    assert!(page.host.removed().contains(&first.id().to_string()));

    // The retained session still knows its collection.
    let ids = controller.identifiers().await;
    assert_eq!(ids.collection_id.as_deref(), Some("PL1"));
}

#[tokio::test]
async fn test_collection_retry_is_bounded_to_one() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(broken());
    page.api.push_script(broken());
    page.api.push_script(usable());
    let controller = controller(&page);

    controller
        .load(
            LoadRequest::item("abc12345678").with_collection("PL1"),
            CONTAINER,
            STATUS,
        )
        .await
        .unwrap();

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::RetriesExhausted { retries: 1 });
    assert_eq!(page.api.players().len(), 2);
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Error"));
}

#[tokio::test]
async fn test_collection_only_retry_has_nothing_left() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(broken());
    let controller = controller(&page);

    let frame = controller
        .load(LoadRequest::collection("PLxyz"), CONTAINER, STATUS)
        .await
        .unwrap();
    assert_eq!(frame.address(), "https://www.youtube.com/embed/videoseries?list=PLxyz");

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::MissingIdentifiers);
    assert_eq!(page.api.players().len(), 1);
    assert!(page.host.frames(CONTAINER).is_empty());
}

#[tokio::test]
async fn test_raised_collection_limit_restores_collection() {
    let page = page(ScriptedApi::loaded());
    for _ in 0..3 {
        page.api.push_script(broken());
    }
    let config = EmbedConfig {
        collection_retry_limit: 2,
        ..Default::default()
    };
    let controller = EmbedController::new(config, page.gateway.clone()).unwrap();

    controller
        .load(
            LoadRequest::item("abc12345678").with_collection("PL1"),
            CONTAINER,
            STATUS,
        )
        .await
        .unwrap();

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::RetriesExhausted { retries: 2 });

    let addresses: Vec<String> = page
        .host
        .mounted()
        .iter()
        .map(|frame| frame.address().to_string())
        .collect();
    assert_eq!(
        addresses,
        vec![
            "https://www.youtube.com/embed/abc12345678?list=PL1",
            "https://www.youtube.com/embed/abc12345678",
            "https://www.youtube.com/embed/abc12345678?list=PL1",
        ]
    );
    assert_eq!(page.api.players().len(), 3);
    assert_eq!(controller.retry_count().await, 3);
}

#[tokio::test]
async fn test_raised_single_item_limit_allows_one_retry() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(broken());
    page.api.push_script(broken());
    page.api.push_script(usable());
    let config = EmbedConfig {
        single_item_retry_limit: 1,
        ..Default::default()
    };
    let controller = EmbedController::new(config, page.gateway.clone()).unwrap();

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::RetriesExhausted { retries: 1 });
    assert_eq!(page.api.players().len(), 2);

    let mounted = page.host.mounted();
    assert_eq!(mounted.len(), 2);
    assert_ne!(mounted[0].id(), mounted[1].id());
    for frame in &mounted {
        assert_eq!(frame.address(), "https://www.youtube.com/embed/abc12345678");
    }
}

#[tokio::test]
async fn test_fresh_load_after_failure_starts_over() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(broken());
    page.api.push_script(usable());
    let controller = controller(&page);
    let request = LoadRequest::item("abc12345678");

    controller.load(request.clone(), CONTAINER, STATUS).await.unwrap();
    assert!(settle(controller.pending()).await.is_err());

    let frame = controller.load(request, CONTAINER, STATUS).await.unwrap();
    let ready = settle(controller.pending()).await.unwrap();

    assert!(Arc::ptr_eq(&ready.frame, &frame));
    assert_eq!(controller.retry_count().await, 0);
}

#[tokio::test]
async fn test_player_creation_failure_is_a_playback_failure() {
    let page = page(ScriptedApi::loaded());
    page.api.fail_creation(true);
    let controller = controller(&page);

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::RetriesExhausted { retries: 0 });
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Error"));
}

#[tokio::test]
async fn test_frame_load_failure_when_wired() {
    let page = page(ScriptedApi::loaded());
    page.host.fail_loads(true);
    let config = EmbedConfig {
        load_failure_is_playback_error: true,
        ..Default::default()
    };
    let controller = EmbedController::new(config, page.gateway.clone()).unwrap();

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();

    let err = settle(controller.pending()).await.unwrap_err();
    assert_eq!(err, Error::RetriesExhausted { retries: 0 });
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Error"));
}

#[tokio::test]
async fn test_frame_load_failure_ignored_by_default() {
    let page = page(ScriptedApi::loaded());
    page.host.fail_loads(true);
    page.api.push_script(usable());
    let controller = controller(&page);

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();

    assert!(settle(controller.pending()).await.is_ok());
}

// =============================================================================
// Controller: hooks and teardown
// =============================================================================

#[tokio::test]
async fn test_playing_and_paused_hooks() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    let controller = controller(&page);

    let playing = Arc::new(AtomicUsize::new(0));
    let paused = Arc::new(AtomicUsize::new(0));
    let counter = playing.clone();
    controller.on_playing(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = paused.clone();
    controller.on_paused(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();
    let ready = settle(controller.pending()).await.unwrap();
    let mut status = ready.monitor.subscribe_status();

    let player = page.api.last_player().unwrap();
    for code in [1, 2, 1, 0] {
        assert!(player.emit(PlayerEvent::StateChanged(code)));
    }
    tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == PlayerStatus::Ended))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(playing.load(Ordering::SeqCst), 2);
    assert_eq!(paused.load(Ordering::SeqCst), 1);
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Ended"));
}

#[tokio::test]
async fn test_hook_registered_after_ready_fires() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    let controller = controller(&page);

    controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();
    let ready = settle(controller.pending()).await.unwrap();

    let playing = Arc::new(AtomicUsize::new(0));
    let counter = playing.clone();
    controller.on_playing(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut status = ready.monitor.subscribe_status();
    assert!(page.api.last_player().unwrap().emit(PlayerEvent::StateChanged(1)));
    tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == PlayerStatus::Playing))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(playing.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_monitor_hook_survives_reload() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    page.api.push_script(usable());
    let controller = controller(&page);

    controller
        .load(LoadRequest::item("first000000"), CONTAINER, STATUS)
        .await
        .unwrap();
    let ready = settle(controller.pending()).await.unwrap();

    let paused = Arc::new(AtomicUsize::new(0));
    let counter = paused.clone();
    ready.monitor.on_paused(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    controller
        .load(LoadRequest::item("second00000"), CONTAINER, STATUS)
        .await
        .unwrap();
    let ready = settle(controller.pending()).await.unwrap();

    let mut status = ready.monitor.subscribe_status();
    assert!(page.api.last_player().unwrap().emit(PlayerEvent::StateChanged(2)));
    tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| *s == PlayerStatus::Paused))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(paused.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_destroy_removes_frame_and_keeps_completion() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script(usable());
    let controller = controller(&page);

    let frame = controller
        .load(LoadRequest::item("abc12345678"), CONTAINER, STATUS)
        .await
        .unwrap();
    settle(controller.pending()).await.unwrap();

    controller.destroy().await;

    let player = page.api.last_player().unwrap();
    assert!(player.is_destroyed());
    assert!(!player.emit(PlayerEvent::StateChanged(1)));
    assert!(page.host.removed().contains(&frame.id().to_string()));
    assert!(controller.frame().await.is_none());
    assert!(settle(controller.pending()).await.is_ok());
    assert_eq!(page.host.status_text(STATUS).as_deref(), Some("Video: Ready"));
}

// =============================================================================
// Monitor and gateway
// =============================================================================

#[tokio::test]
async fn test_monitors_share_one_api_load() {
    let page = page(ScriptedApi::new());
    let first = controller(&page);
    let second = controller(&page);

    first
        .load(LoadRequest::item("first000000"), "left", "left-status")
        .await
        .unwrap();
    second
        .load(LoadRequest::item("second00000"), "right", "right-status")
        .await
        .unwrap();

    assert_eq!(page.host.scripts(), vec![SCRIPT_URL.to_string()]);
    assert_eq!(page.gateway.pending_hooks(), 2);
    assert!(page.api.players().is_empty());

    page.api.push_script(usable());
    page.api.push_script(usable());
    page.api.set_available(true);
    page.gateway.notify_api_ready();

    assert_eq!(page.api.players().len(), 2);
    settle(first.pending()).await.unwrap();
    settle(second.pending()).await.unwrap();
}

#[tokio::test]
async fn test_monitor_creates_one_player() {
    let page = page(ScriptedApi::loaded());
    let config = EmbedConfig::default();
    let frame = EmbedFrame::create("https://www.youtube.com/embed/abc12345678?enablejsapi=1", &config);
    let monitor = StatusMonitor::new(page.gateway.clone(), frame.clone(), STATUS, &config);

    monitor.attach();
    monitor.create_api_player();
    monitor.attach();

    assert_eq!(page.api.players().len(), 1);
    assert_eq!(frame.src(), "https://www.youtube.com/embed/abc12345678?enablejsapi=1");
}

#[tokio::test]
async fn test_monitor_reset_supersedes_previous_cycle() {
    let page = page(ScriptedApi::loaded());
    let config = EmbedConfig::default();
    let first = EmbedFrame::create("https://www.youtube.com/embed/a", &config);
    let monitor = StatusMonitor::new(page.gateway.clone(), first, STATUS, &config);
    monitor.attach();
    let stale = monitor.pending();

    page.api.push_script(usable());
    let second = EmbedFrame::create("https://www.youtube.com/embed/b", &config);
    monitor.reset(second.clone());

    assert_eq!(settle(stale).await.unwrap_err(), Error::Superseded);
    let player = settle(monitor.pending()).await.unwrap();
    assert_eq!(player.target_id(), second.id());
    assert!(page.api.players()[0].is_destroyed());
}

#[tokio::test]
async fn test_failed_initial_state_query_is_error() {
    let page = page(ScriptedApi::loaded());
    page.api.push_script([PlayerEvent::Ready(None)]);
    let config = EmbedConfig::default();
    let frame = EmbedFrame::create("https://www.youtube.com/embed/a", &config);
    let monitor = StatusMonitor::new(page.gateway.clone(), frame.clone(), STATUS, &config);
    monitor.attach();

    let err = settle(monitor.pending()).await.unwrap_err();
    assert_eq!(err, Error::PlaybackFailed { frame: frame.id().to_string() });
    assert_eq!(monitor.status(), PlayerStatus::Error);
}

// =============================================================================
// Controller: retry racing a fresh load
// =============================================================================

/// Host whose first frame removal blocks until the test releases it
struct GatedHost {
    inner: MemoryHost,
    entered: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

#[async_trait]
impl EmbedHost for GatedHost {
    fn mount(&self, container: &str, frame: FrameHandle) {
        self.inner.mount(container, frame);
    }

    fn unmount(&self, frame: &EmbedFrame) {
        if let Some(entered) = self.entered.lock().take() {
            let _ = entered.send(());
            if let Some(release) = self.release.lock().take() {
                let _ = release.recv();
            }
        }
        self.inner.unmount(frame);
    }

    async fn wait_for_selector(&self, selector: &str, root: &str) -> FrameHandle {
        self.inner.wait_for_selector(selector, root).await
    }

    async fn wait_for_load(&self, frame: &FrameHandle) -> embedwatch_core::Result<()> {
        self.inner.wait_for_load(frame).await
    }

    fn set_status_text(&self, target: &str, text: &str) {
        self.inner.set_status_text(target, text);
    }

    fn has_script(&self, src: &str) -> bool {
        self.inner.has_script(src)
    }

    fn inject_script(&self, src: &str) {
        self.inner.inject_script(src);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fresh_load_during_retry_wins() {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let host = Arc::new(GatedHost {
        inner: MemoryHost::new(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    });
    let api = Arc::new(ScriptedApi::loaded());
    api.push_script(broken());
    api.push_script(usable());
    api.push_script(usable());
    let gateway = Arc::new(ApiGateway::new(api.clone(), host.clone(), SCRIPT_URL));
    let controller = EmbedController::new(EmbedConfig::default(), gateway).unwrap();

    controller
        .load(
            LoadRequest::item("abc12345678").with_collection("PL1"),
            CONTAINER,
            STATUS,
        )
        .await
        .unwrap();

    // The retry decision is now blocked removing the failed frame.
    tokio::time::timeout(Duration::from_secs(2), entered_rx)
        .await
        .unwrap()
        .unwrap();

    let user = tokio::spawn({
        let controller = controller.clone();
        async move {
            controller
                .load(LoadRequest::item("XXXXXXXXXXX"), CONTAINER, STATUS)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    release_tx.send(()).unwrap();

    let frame = user.await.unwrap().unwrap();
    let ready = settle(controller.pending()).await.unwrap();

    assert_eq!(frame.address(), "https://www.youtube.com/embed/XXXXXXXXXXX?list=PL1");
    assert!(Arc::ptr_eq(&ready.frame, &frame));
    assert_eq!(controller.frame().await.unwrap().id(), frame.id());
    assert_eq!(
        controller.identifiers().await.primary_id.as_deref(),
        Some("XXXXXXXXXXX")
    );
    assert_eq!(controller.retry_count().await, 0);
    assert_eq!(host.inner.frames(CONTAINER).len(), 1);
}
