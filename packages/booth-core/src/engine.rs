//! Per-screen engines: lifecycle objects bound to a screen's active period.
//!
//! Engines are constructed once at startup and only the active screen's
//! engine is ever started. Background work runs on spawned tasks that
//! communicate exclusively through the machine's event channel; every
//! event carries the activation epoch, so anything raised after teardown
//! is discarded by the loop instead of reaching a screen that is no
//! longer live.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::registry::Screen;
use crate::session::{SessionSnapshot, FILTERS};
use crate::Notification;

/// Warm-up delay before the booth advances to the live camera screen.
const LOADING_DELAY: Duration = Duration::from_secs(2);
/// Refresh interval for the filter preview strip.
const PREVIEW_REFRESH: Duration = Duration::from_secs(5);
/// How long border-preview preparation runs before the frames screen.
const PROCESSING_DELAY: Duration = Duration::from_secs(3);

/// Control signals an engine may raise while active.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// Request a transition to the given screen id.
    ChangeScreen(u8),
    /// Push a notification through the active screen's subscriptions.
    Notify(Notification),
}

/// An engine signal stamped with the activation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub epoch: u64,
    pub signal: EngineSignal,
}

/// Handle given to an engine for the duration of one activation.
#[derive(Clone)]
pub struct EngineContext {
    epoch: u64,
    pub session: SessionSnapshot,
    events: mpsc::Sender<EngineEvent>,
}

impl EngineContext {
    pub fn new(epoch: u64, session: SessionSnapshot, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            epoch,
            session,
            events,
        }
    }

    pub fn notify(&self, notification: Notification) {
        self.send(EngineSignal::Notify(notification));
    }

    pub fn change_screen(&self, target: u8) {
        self.send(EngineSignal::ChangeScreen(target));
    }

    fn send(&self, signal: EngineSignal) {
        let event = EngineEvent {
            epoch: self.epoch,
            signal,
        };
        if self.events.try_send(event).is_err() {
            eprintln!("[engine] dropping event, machine queue unavailable");
        }
    }
}

/// Lifecycle hooks for one screen's background activity.
pub trait ScreenEngine: Send {
    fn start(&mut self, ctx: EngineContext);
    fn stop(&mut self);
}

/// Bookkeeping for engines whose work runs on a spawned task.
#[derive(Default)]
struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    fn run<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.abort();
        self.handle = Some(tokio::spawn(fut));
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ============================================
// Screen engines
// ============================================

/// Loading(0): warm up, then hand over to the live camera screen.
#[derive(Default)]
pub struct LoadingEngine {
    task: TaskSlot,
}

impl ScreenEngine for LoadingEngine {
    fn start(&mut self, ctx: EngineContext) {
        self.task.run(async move {
            ctx.notify(Notification::Status("Warming up...".to_string()));
            sleep(LOADING_DELAY).await;
            ctx.change_screen(Screen::Camera.id());
        });
    }

    fn stop(&mut self) {
        self.task.abort();
    }
}

/// Camera(1): refresh the filter preview strip while the user browses.
#[derive(Default)]
pub struct CameraEngine {
    task: TaskSlot,
}

impl ScreenEngine for CameraEngine {
    fn start(&mut self, ctx: EngineContext) {
        self.task.run(async move {
            ctx.notify(Notification::Status(
                "Pick a filter, then take your picture".to_string(),
            ));
            loop {
                sleep(PREVIEW_REFRESH).await;
                for (index, filter) in FILTERS.iter().enumerate() {
                    ctx.notify(Notification::FilterPreview {
                        index,
                        path: format!("thumbs/{}.jpg", filter.name()),
                    });
                }
            }
        });
    }

    fn stop(&mut self) {
        self.task.abort();
    }
}

/// Preview(2): no background work, just the prompt.
pub struct PreviewEngine;

impl ScreenEngine for PreviewEngine {
    fn start(&mut self, ctx: EngineContext) {
        ctx.notify(Notification::Status("Happy with your picture?".to_string()));
    }

    fn stop(&mut self) {}
}

/// Processing(3): bounded border-preview preparation, then auto-advance.
#[derive(Default)]
pub struct ProcessingEngine {
    task: TaskSlot,
}

impl ScreenEngine for ProcessingEngine {
    fn start(&mut self, ctx: EngineContext) {
        self.task.run(async move {
            ctx.notify(Notification::Status(
                "Preparing your border previews...".to_string(),
            ));
            sleep(PROCESSING_DELAY).await;
            ctx.change_screen(Screen::Frames.id());
        });
    }

    fn stop(&mut self) {
        self.task.abort();
    }
}

/// Frames(4): no background work, just the prompt.
pub struct FramesEngine;

impl ScreenEngine for FramesEngine {
    fn start(&mut self, ctx: EngineContext) {
        ctx.notify(Notification::Status("Pick a border for your picture".to_string()));
    }

    fn stop(&mut self) {}
}

/// PrintOptions(5): no background work, just the prompt.
pub struct PrintOptionsEngine;

impl ScreenEngine for PrintOptionsEngine {
    fn start(&mut self, ctx: EngineContext) {
        ctx.notify(Notification::Status("How many copies?".to_string()));
    }

    fn stop(&mut self) {}
}

/// Printing(6): announce the job the session is about to submit.
pub struct PrintingEngine;

impl ScreenEngine for PrintingEngine {
    fn start(&mut self, ctx: EngineContext) {
        ctx.notify(Notification::Status(format!(
            "Printing {} copies, collect them below",
            ctx.session.copy_count
        )));
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::NotificationKind;

    fn context(epoch: u64) -> (EngineContext, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (EngineContext::new(epoch, Session::new().snapshot(), tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_engine_advances_to_camera() {
        let (ctx, mut rx) = context(7);
        let mut engine = LoadingEngine::default();
        engine.start(ctx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.epoch, 7);
        assert!(matches!(
            first.signal,
            EngineSignal::Notify(Notification::Status(_))
        ));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.epoch, 7);
        assert_eq!(second.signal, EngineSignal::ChangeScreen(1));

        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_engine_raises_nothing() {
        let (ctx, mut rx) = context(1);
        let mut engine = LoadingEngine::default();
        engine.start(ctx);
        engine.stop();

        sleep(LOADING_DELAY * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_engine_refreshes_preview_strip() {
        let (ctx, mut rx) = context(3);
        let mut engine = CameraEngine::default();
        engine.start(ctx);

        // Skip the activation status line.
        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.signal,
            EngineSignal::Notify(Notification::Status(_))
        ));

        let mut previews = Vec::new();
        while previews.len() < 8 {
            let event = rx.recv().await.unwrap();
            if let EngineSignal::Notify(n @ Notification::FilterPreview { .. }) = event.signal {
                assert_eq!(n.kind(), NotificationKind::FilterPreview);
                previews.push(n);
            }
        }

        match &previews[3] {
            Notification::FilterPreview { index, path } => {
                assert_eq!(*index, 3);
                assert_eq!(path, "thumbs/cartoon.jpg");
            }
            other => panic!("Expected FilterPreview, got {:?}", other),
        }

        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_engine_auto_advances_to_frames() {
        let (ctx, mut rx) = context(5);
        let mut engine = ProcessingEngine::default();
        engine.start(ctx);

        loop {
            let event = rx.recv().await.unwrap();
            if let EngineSignal::ChangeScreen(target) = event.signal {
                assert_eq!(target, Screen::Frames.id());
                break;
            }
        }

        engine.stop();
    }

    #[tokio::test]
    async fn test_printing_engine_reads_session_snapshot() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = Session::new();
        session.copy_count = 4;
        let ctx = EngineContext::new(9, session.snapshot(), tx);

        PrintingEngine.start(ctx);

        let event = rx.recv().await.unwrap();
        match event.signal {
            EngineSignal::Notify(Notification::Status(text)) => {
                assert!(text.contains('4'), "status should mention the copy count: {}", text);
            }
            other => panic!("Expected a status, got {:?}", other),
        }
    }
}
