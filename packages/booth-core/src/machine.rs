//! Session state machine: the booth's single serial control loop.
//!
//! One loop owns the Session and the camera handle; exactly one command is
//! processed per iteration and the screen-entry side effects for the
//! current screen run before the next command is accepted. A screen
//! transition tears the outgoing screen down (engine stopped, its event
//! bindings revoked by bumping the activation epoch) before the incoming
//! screen is installed, so no notification ever reaches a screen that is
//! not fully live.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::camera::CameraAdapter;
use crate::channel::{self, CommandChannel, Inbound};
use crate::command::Command;
use crate::engine::{
    CameraEngine, EngineContext, EngineEvent, EngineSignal, FramesEngine, LoadingEngine,
    PreviewEngine, PrintOptionsEngine, PrintingEngine, ProcessingEngine, ScreenEngine,
};
use crate::print::PrintService;
use crate::registry::{self, Screen, ScreenSpec};
use crate::session::{Filter, Session, FRAME_NONE, MAX_COPIES, MIN_COPIES};
use crate::{Notification, UiEmitter, UiMessage};

/// Commands the embedding process can send to a running machine.
#[derive(Debug)]
pub enum MachineCommand {
    /// Finish the current iteration and exit the loop.
    Shutdown,
}

/// Handle for sending commands to a running machine.
pub type MachineCommandSender = mpsc::Sender<MachineCommand>;

const ENGINE_QUEUE: usize = 64;

pub struct BoothMachine {
    session: Session,
    camera: CameraAdapter,
    printer: Box<dyn PrintService>,
    emitter: Box<dyn UiEmitter>,
    capture_path: PathBuf,

    /// Registry row of the screen whose subscriptions are installed.
    active: &'static ScreenSpec,
    /// One engine per screen, constructed once; only the active one runs.
    engines: [Box<dyn ScreenEngine>; 7],
    /// Bumped on every transition; events from older activations are stale.
    epoch: u64,

    engine_tx: mpsc::Sender<EngineEvent>,
    engine_rx: mpsc::Receiver<EngineEvent>,
    command_rx: mpsc::Receiver<MachineCommand>,
    stop_requested: bool,
}

impl BoothMachine {
    /// Build a machine around the given hardware and presentation seams.
    /// Returns the machine and a sender for external control.
    pub fn new(
        camera: CameraAdapter,
        printer: Box<dyn PrintService>,
        emitter: Box<dyn UiEmitter>,
        capture_path: PathBuf,
    ) -> (Self, MachineCommandSender) {
        let (engine_tx, engine_rx) = mpsc::channel(ENGINE_QUEUE);
        let (command_tx, command_rx) = mpsc::channel(8);

        let engines: [Box<dyn ScreenEngine>; 7] = [
            Box::new(LoadingEngine::default()),
            Box::new(CameraEngine::default()),
            Box::new(PreviewEngine),
            Box::new(ProcessingEngine::default()),
            Box::new(FramesEngine),
            Box::new(PrintOptionsEngine),
            Box::new(PrintingEngine),
        ];

        let machine = Self {
            session: Session::new(),
            camera,
            printer,
            emitter,
            capture_path,
            active: registry::spec(Screen::Loading),
            engines,
            epoch: 0,
            engine_tx,
            engine_rx,
            command_rx,
            stop_requested: false,
        };

        (machine, command_tx)
    }

    /// Run until shutdown. Returns Err only for a fatal programming error
    /// (an internal transition naming an unregistered screen).
    pub async fn run(&mut self, channel: CommandChannel) -> Result<(), String> {
        // Install the initial screen through the same path as any
        // transition; the teardown half is a no-op on a never-started
        // engine.
        self.change_screen(self.session.current_screen.id())?;

        loop {
            self.tick_screen_entry();
            if self.stop_requested {
                break;
            }

            tokio::select! {
                inbound = channel.accept() => match inbound {
                    Inbound::Command { bytes, mut stream } => {
                        match Command::parse(&bytes) {
                            Some(cmd) => self.handle_command(&cmd)?,
                            None => eprintln!("[machine] ignoring empty command"),
                        }
                        // Echo the exact bytes regardless of whether the
                        // command was recognized.
                        channel::echo(&mut stream, &bytes).await;
                    }
                    Inbound::Idle => {}
                    Inbound::Closed => {
                        eprintln!("[machine] client requested shutdown");
                        self.stop_requested = true;
                    }
                },
                Some(event) = self.engine_rx.recv() => {
                    self.handle_engine_event(event)?;
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(MachineCommand::Shutdown) | None => {
                        self.stop_requested = true;
                    }
                },
            }
        }

        self.engines[self.session.current_screen as usize].stop();
        self.epoch += 1;
        eprintln!("[machine] loop stopped");
        Ok(())
    }

    /// Screen-entry side effects, evaluated every iteration before the
    /// next command is accepted.
    fn tick_screen_entry(&mut self) {
        let screen = self.session.current_screen;

        if screen.id() <= Screen::PrintOptions.id() {
            self.session.printed_this_cycle = false;
        }

        match screen {
            Screen::Camera => {
                if let Err(e) = self.camera.start_preview() {
                    eprintln!("[machine] preview start failed: {}", e);
                }
            }
            Screen::Printing if !self.session.printed_this_cycle => {
                if self.session.selected_frame == FRAME_NONE {
                    eprintln!("[machine] printing with no border selected");
                }
                self.printer
                    .print(self.session.selected_frame, self.session.copy_count);
                self.session.printed_this_cycle = true;
            }
            _ => {}
        }
    }

    /// Dispatch one command against the active screen's vocabulary.
    /// Anything that does not match is a no-op; the caller still echoes.
    fn handle_command(&mut self, cmd: &Command) -> Result<(), String> {
        match (self.session.current_screen, cmd.verb()) {
            (Screen::Camera, "filter") => {
                let name = match cmd.arg(0) {
                    Some(name) => name,
                    None => return Ok(()),
                };
                let filter = Filter::from_name(name);
                if let Err(e) = self.camera.set_effect(filter) {
                    eprintln!("[machine] effect change failed: {}", e);
                    return Ok(());
                }
                self.session.selected_filter = filter;
                self.notify(Notification::BorderImage {
                    index: filter.index() as u32,
                });
                Ok(())
            }
            (Screen::Camera, "takepic") => {
                if let Err(e) = self.camera.capture_still(&self.capture_path) {
                    eprintln!("[machine] capture failed: {}", e);
                    return Ok(());
                }
                self.change_screen(Screen::Preview.id())
            }
            (Screen::Preview, "accept") => self.change_screen(Screen::Processing.id()),
            (Screen::Preview, "retake") => self.change_screen(Screen::Camera.id()),
            (Screen::Frames, "border") => {
                if let Some(index) = cmd.uint_arg(0) {
                    self.notify(Notification::BorderImage { index });
                    self.session.selected_frame = index;
                }
                Ok(())
            }
            (Screen::Frames, "select") => self.change_screen(Screen::PrintOptions.id()),
            (Screen::PrintOptions, "copies") => {
                if let Some(count) = cmd.int_arg(0) {
                    if (MIN_COPIES as i64..=MAX_COPIES as i64).contains(&count) {
                        let count = count as u8;
                        self.notify(Notification::Copies { count });
                        self.session.copy_count = count;
                    }
                }
                Ok(())
            }
            (Screen::PrintOptions, "confirm") => self.change_screen(Screen::Printing.id()),
            _ => Ok(()),
        }
    }

    /// Process one engine event, discarding anything from a torn-down
    /// activation.
    fn handle_engine_event(&mut self, event: EngineEvent) -> Result<(), String> {
        if event.epoch != self.epoch {
            eprintln!("[machine] dropping event from a torn-down screen");
            return Ok(());
        }
        match event.signal {
            EngineSignal::Notify(notification) => {
                self.notify(notification);
                Ok(())
            }
            EngineSignal::ChangeScreen(target) => self.change_screen(target),
        }
    }

    /// Switch the active screen. Strictly ordered: teardown, state swap,
    /// presentation notice, install, start. An unknown target is fatal.
    fn change_screen(&mut self, target: u8) -> Result<(), String> {
        let spec = registry::lookup(target)?;
        let outgoing = self.session.current_screen;

        self.engines[outgoing as usize].stop();
        self.epoch += 1; // revokes the outgoing screen's event bindings

        self.session.current_screen = spec.screen;
        self.emitter.emit(UiMessage::Screen {
            url: spec.resource.to_string(),
        });

        self.active = spec;
        let ctx = EngineContext::new(self.epoch, self.session.snapshot(), self.engine_tx.clone());
        self.engines[spec.screen as usize].start(ctx);

        eprintln!("[machine] screen {} -> {}", outgoing.id(), spec.screen.id());
        Ok(())
    }

    /// Emit a notification if the active screen subscribes to its kind;
    /// otherwise drop it silently.
    fn notify(&self, notification: Notification) {
        if let Some(name) = self.active.wire_name(notification.kind()) {
            self.emitter.emit(UiMessage::Event {
                name: name.to_string(),
                payload: notification.payload(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::camera::CameraBackend;
    use crate::session::FILTERS;

    #[derive(Clone, Default)]
    struct TestEmitter {
        messages: Arc<Mutex<Vec<UiMessage>>>,
    }

    impl UiEmitter for TestEmitter {
        fn emit(&self, msg: UiMessage) {
            self.messages.lock().unwrap().push(msg);
        }
    }

    impl TestEmitter {
        fn events_named(&self, name: &str) -> Vec<serde_json::Value> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter_map(|msg| match msg {
                    UiMessage::Event {
                        name: event_name,
                        payload,
                    } if event_name == name => Some(payload.clone()),
                    _ => None,
                })
                .collect()
        }

        fn last_screen_url(&self) -> Option<String> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|msg| match msg {
                    UiMessage::Screen { url } => Some(url.clone()),
                    _ => None,
                })
        }

        fn clear(&self) {
            self.messages.lock().unwrap().clear();
        }
    }

    #[derive(Clone, Default)]
    struct TestBackend {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl TestBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl CameraBackend for TestBackend {
        fn apply_resolution(&mut self, width: u32, height: u32) -> Result<(), String> {
            self.push(format!("resolution {}x{}", width, height));
            Ok(())
        }

        fn apply_saturation(&mut self, value: u8) -> Result<(), String> {
            self.push(format!("saturation {}", value));
            Ok(())
        }

        fn apply_brightness(&mut self, value: u8) -> Result<(), String> {
            self.push(format!("brightness {}", value));
            Ok(())
        }

        fn apply_effect(&mut self, effect: Filter) -> Result<(), String> {
            self.push(format!("effect {}", effect.name()));
            Ok(())
        }

        fn preview_on(&mut self) -> Result<(), String> {
            self.push("preview on".to_string());
            Ok(())
        }

        fn preview_off(&mut self) -> Result<(), String> {
            self.push("preview off".to_string());
            Ok(())
        }

        fn capture(&mut self, path: &Path) -> Result<(), String> {
            self.push(format!("capture {}", path.display()));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct TestPrinter {
        jobs: Arc<Mutex<Vec<(u32, u8)>>>,
    }

    impl PrintService for TestPrinter {
        fn print(&self, frame: u32, copies: u8) {
            self.jobs.lock().unwrap().push((frame, copies));
        }
    }

    fn machine() -> (BoothMachine, TestEmitter, TestBackend, TestPrinter, MachineCommandSender) {
        let emitter = TestEmitter::default();
        let backend = TestBackend::default();
        let printer = TestPrinter::default();
        let camera = CameraAdapter::new(Box::new(backend.clone())).unwrap();
        let (machine, command_tx) = BoothMachine::new(
            camera,
            Box::new(printer.clone()),
            Box::new(emitter.clone()),
            PathBuf::from("booth_test_capture.jpg"),
        );
        (machine, emitter, backend, printer, command_tx)
    }

    fn parse(line: &str) -> Command {
        Command::parse(line.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_filter_names_map_to_border_indices() {
        let (mut m, emitter, backend, _, _) = machine();
        m.change_screen(Screen::Camera.id()).unwrap();

        for (position, filter) in FILTERS.iter().enumerate() {
            m.handle_command(&parse(&format!("filter,{}", filter.name())))
                .unwrap();
            let events = emitter.events_named("setBorderForImage");
            assert_eq!(
                events.last().unwrap(),
                &serde_json::json!({ "index": position })
            );
        }

        // Unrecognized names terminate in a defined effect: none, index 7.
        m.handle_command(&parse("filter,sparkle")).unwrap();
        let events = emitter.events_named("setBorderForImage");
        assert_eq!(events.last().unwrap(), &serde_json::json!({ "index": 7 }));
        assert_eq!(m.session.selected_filter, Filter::None);
        assert!(backend.calls().contains(&"effect none".to_string()));

        // Case-insensitive matching.
        m.handle_command(&parse("filter,CARTOON")).unwrap();
        assert_eq!(m.session.selected_filter, Filter::Cartoon);
    }

    #[tokio::test]
    async fn test_filter_without_name_is_noop() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::Camera.id()).unwrap();
        emitter.clear();

        m.handle_command(&parse("filter")).unwrap();
        assert!(emitter.events_named("setBorderForImage").is_empty());
    }

    #[tokio::test]
    async fn test_copies_in_range_are_recorded_and_echoed() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::PrintOptions.id()).unwrap();

        for n in 1..=6u8 {
            m.handle_command(&parse(&format!("copies,{}", n))).unwrap();
            assert_eq!(m.session.copy_count, n);
        }
        assert_eq!(emitter.events_named("setCopies").len(), 6);
    }

    #[tokio::test]
    async fn test_copies_out_of_range_are_ignored() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::PrintOptions.id()).unwrap();

        for out_of_range in ["0", "7", "-3", "100", "abc", ""] {
            m.handle_command(&parse(&format!("copies,{}", out_of_range)))
                .unwrap();
            assert_eq!(m.session.copy_count, 1);
        }
        assert!(emitter.events_named("setCopies").is_empty());
    }

    #[tokio::test]
    async fn test_border_records_frame_without_range_validation() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::Frames.id()).unwrap();

        m.handle_command(&parse("border,5")).unwrap();
        assert_eq!(m.session.selected_frame, 5);
        assert_eq!(
            emitter.events_named("setBorderForImage").last().unwrap(),
            &serde_json::json!({ "index": 5 })
        );

        // Out-of-range indices pass straight through.
        m.handle_command(&parse("border,42")).unwrap();
        assert_eq!(m.session.selected_frame, 42);

        // Non-integers are no-ops.
        m.handle_command(&parse("border,abc")).unwrap();
        assert_eq!(m.session.selected_frame, 42);
    }

    #[tokio::test]
    async fn test_takepic_captures_and_transitions() {
        let (mut m, _, backend, _, _) = machine();
        m.change_screen(Screen::Camera.id()).unwrap();
        m.tick_screen_entry(); // starts the preview

        m.handle_command(&parse("takepic")).unwrap();

        assert_eq!(m.session.current_screen, Screen::Preview);
        let calls = backend.calls();
        let capture_at = calls
            .iter()
            .position(|c| c.starts_with("capture"))
            .expect("capture happened");
        assert_eq!(calls[capture_at - 1], "resolution 486x648");
        assert_eq!(calls[capture_at - 2], "preview off");
    }

    #[tokio::test]
    async fn test_retake_returns_to_live_preview_resolution() {
        let (mut m, _, backend, _, _) = machine();
        m.change_screen(Screen::Camera.id()).unwrap();
        m.tick_screen_entry();
        m.handle_command(&parse("takepic")).unwrap();

        m.handle_command(&parse("retake")).unwrap();
        assert_eq!(m.session.current_screen, Screen::Camera);
        m.tick_screen_entry();

        let calls = backend.calls();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail, ["resolution 480x640", "preview on"]);
    }

    #[tokio::test]
    async fn test_preview_start_is_idempotent_across_iterations() {
        let (mut m, _, backend, _, _) = machine();
        m.change_screen(Screen::Camera.id()).unwrap();

        m.tick_screen_entry();
        m.tick_screen_entry();
        m.tick_screen_entry();

        let previews = backend
            .calls()
            .iter()
            .filter(|c| c.as_str() == "preview on")
            .count();
        assert_eq!(previews, 1);
    }

    #[tokio::test]
    async fn test_printing_screen_prints_exactly_once() {
        let (mut m, _, _, printer, _) = machine();
        m.session.selected_frame = 2;
        m.session.copy_count = 3;
        m.change_screen(Screen::Printing.id()).unwrap();

        m.tick_screen_entry();
        m.tick_screen_entry();
        m.tick_screen_entry();

        assert_eq!(printer.jobs.lock().unwrap().as_slice(), &[(2, 3)]);
    }

    #[tokio::test]
    async fn test_leaving_printing_screen_resets_print_latch() {
        let (mut m, _, _, printer, _) = machine();
        m.session.selected_frame = 2;
        m.change_screen(Screen::Printing.id()).unwrap();
        m.tick_screen_entry();
        assert!(m.session.printed_this_cycle);

        m.change_screen(Screen::PrintOptions.id()).unwrap();
        m.tick_screen_entry();
        assert!(!m.session.printed_this_cycle);

        m.change_screen(Screen::Printing.id()).unwrap();
        m.tick_screen_entry();
        assert_eq!(printer.jobs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribed_notifications_are_dropped() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::Preview.id()).unwrap();
        emitter.clear();

        // Preview subscribes to status only.
        m.notify(Notification::Copies { count: 3 });
        m.notify(Notification::FilterPreview {
            index: 0,
            path: "thumbs/negative.jpg".to_string(),
        });
        assert!(emitter.messages.lock().unwrap().is_empty());

        m.notify(Notification::Status("still here".to_string()));
        assert_eq!(emitter.events_named("status").len(), 1);
    }

    #[tokio::test]
    async fn test_stale_engine_events_are_discarded() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::Preview.id()).unwrap();
        let stale_epoch = m.epoch - 1;
        emitter.clear();

        m.handle_engine_event(EngineEvent {
            epoch: stale_epoch,
            signal: EngineSignal::Notify(Notification::Status("ghost".to_string())),
        })
        .unwrap();
        assert!(emitter.messages.lock().unwrap().is_empty());

        m.handle_engine_event(EngineEvent {
            epoch: stale_epoch,
            signal: EngineSignal::ChangeScreen(Screen::Printing.id()),
        })
        .unwrap();
        assert_eq!(m.session.current_screen, Screen::Preview);
    }

    #[tokio::test]
    async fn test_unknown_screen_target_is_fatal() {
        let (mut m, _, _, _, _) = machine();
        let current_epoch = m.epoch;
        let result = m.handle_engine_event(EngineEvent {
            epoch: current_epoch,
            signal: EngineSignal::ChangeScreen(9),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_commands_outside_vocabulary_are_noops() {
        let (mut m, emitter, _, printer, _) = machine();
        m.change_screen(Screen::Preview.id()).unwrap();
        emitter.clear();

        // Verbs from other screens do nothing here.
        m.handle_command(&parse("filter,cartoon")).unwrap();
        m.handle_command(&parse("copies,3")).unwrap();
        m.handle_command(&parse("confirm")).unwrap();
        m.handle_command(&parse("bogus")).unwrap();
        m.handle_command(&parse(",")).unwrap();

        assert_eq!(m.session.current_screen, Screen::Preview);
        assert_eq!(m.session.copy_count, 1);
        assert!(emitter.messages.lock().unwrap().is_empty());
        assert!(printer.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transition_emits_display_resource() {
        let (mut m, emitter, _, _, _) = machine();
        m.change_screen(Screen::Frames.id()).unwrap();
        assert_eq!(emitter.last_screen_url().unwrap(), "ui/frames.qml");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_booth_cycle() {
        let (mut m, emitter, backend, printer, _) = machine();
        m.change_screen(Screen::Camera.id()).unwrap();
        m.tick_screen_entry();

        // Filter selection highlights cartoon (index 3) and sets the effect.
        m.handle_command(&parse("filter,cartoon")).unwrap();
        assert!(backend.calls().contains(&"effect cartoon".to_string()));
        assert_eq!(
            emitter.events_named("setBorderForImage").last().unwrap(),
            &serde_json::json!({ "index": 3 })
        );

        m.handle_command(&parse("takepic")).unwrap();
        assert_eq!(m.session.current_screen, Screen::Preview);

        m.handle_command(&parse("accept")).unwrap();
        assert_eq!(m.session.current_screen, Screen::Processing);

        // Processing auto-advances: drain engine events (stale ones from
        // earlier screens are dropped by the epoch guard) until the frames
        // screen is live.
        while m.session.current_screen != Screen::Frames {
            let event = tokio::time::timeout(Duration::from_secs(30), m.engine_rx.recv())
                .await
                .expect("engine event before timeout")
                .expect("engine channel open");
            m.handle_engine_event(event).unwrap();
        }

        m.handle_command(&parse("border,5")).unwrap();
        assert_eq!(m.session.selected_frame, 5);

        m.handle_command(&parse("select")).unwrap();
        assert_eq!(m.session.current_screen, Screen::PrintOptions);

        m.handle_command(&parse("copies,3")).unwrap();
        assert_eq!(m.session.copy_count, 3);

        m.handle_command(&parse("confirm")).unwrap();
        assert_eq!(m.session.current_screen, Screen::Printing);

        // First idle tick submits exactly one job for (frame 5, 3 copies).
        m.tick_screen_entry();
        m.tick_screen_entry();
        assert_eq!(printer.jobs.lock().unwrap().as_slice(), &[(5, 3)]);
    }

    #[tokio::test]
    async fn test_run_echoes_and_shuts_down_on_empty_payload() {
        // The sender must stay alive: a closed command channel reads as a
        // shutdown request.
        let (mut m, _, _, _, _command_tx) = machine();
        let channel = CommandChannel::bind("127.0.0.1", 0).await.unwrap();
        let addr = channel.local_addr().unwrap();

        let runner = tokio::spawn(async move { m.run(channel).await });

        // Unknown verb for the loading screen: no effect, still echoed.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"filter,cartoon").await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"filter,cartoon");

        // Connect-and-close is a deliberate shutdown request.
        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        let result = tokio::time::timeout(Duration::from_secs(10), runner)
            .await
            .expect("loop exits after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_on_machine_command() {
        let (mut m, _, _, _, command_tx) = machine();
        let channel = CommandChannel::bind("127.0.0.1", 0).await.unwrap();

        let runner = tokio::spawn(async move { m.run(channel).await });

        command_tx.send(MachineCommand::Shutdown).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), runner)
            .await
            .expect("loop exits after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
