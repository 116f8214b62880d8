//! Application state and the handlers that mutate it. Only the UI loop owns
//! an `AppState`; other threads talk to it through `AppEvent`s.

use crate::capture::{Region, RegionSelector, ScreenPoint, SelectionOutcome, GRAB_DELAY};
use crate::clipboard::{self, CopyOutcome};
use crate::config::Config;
use crate::ocr::{self, OcrJob};
use crate::ollama::{BackendStatus, VisionBackend};
use crate::queue::{ScreenshotQueue, MAX_SCREENSHOTS};
use anyhow::Result;
use crossbeam_channel::Sender;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const TRANSIENT_STATUS: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum AppEvent {
    TakeScreenshot,
    ToggleMultiMode,
    ShowWindow,
    Quit,
    OcrFinished(String),
    Backend(BackendStatus),
}

impl AppEvent {
    /// Events the main window has to be on screen to act on.
    pub fn needs_window(&self) -> bool {
        matches!(self, AppEvent::TakeScreenshot | AppEvent::ShowWindow | AppEvent::Quit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Normal,
    Accent,
    Warning,
}

#[derive(Clone, Debug)]
pub struct Status {
    pub text: String,
    pub tone: Tone,
    expires: Option<Instant>,
}

impl Status {
    fn fixed(text: impl Into<String>, tone: Tone) -> Self {
        Self { text: text.into(), tone, expires: None }
    }

    /// Reverts to `Ready` after `TRANSIENT_STATUS`.
    fn transient(text: impl Into<String>, tone: Tone, now: Instant) -> Self {
        Self { text: text.into(), tone, expires: Some(now + TRANSIENT_STATUS) }
    }
}

/// An OCR run in flight. `taken` counts how many of the oldest queued images
/// belong to it; eviction and removal while it runs shrink that count.
struct OcrTask {
    handle: JoinHandle<()>,
    taken: usize,
}

pub struct AppState {
    pub config: Config,
    /// Selector entries, fixed at startup.
    pub model_choices: Vec<String>,
    pub queue: ScreenshotQueue,
    pub multi_mode: bool,
    pub selector: RegionSelector,
    pub result_text: String,
    pub dispatch_enabled: bool,
    /// Whether the main window should be on screen.
    pub window_visible: bool,
    /// Last inner size of the main window, stamped into the config on save.
    pub window_size: Option<(f32, f32)>,
    status: Status,
    ocr_task: Option<OcrTask>,
    backend: Arc<dyn VisionBackend>,
    events: Sender<AppEvent>,
    config_path: Option<PathBuf>,
    quitting: bool,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn VisionBackend>, events: Sender<AppEvent>) -> Self {
        let model_choices = config.model_choices();
        let window_visible = !config.ui.start_minimized;
        Self {
            config,
            model_choices,
            queue: ScreenshotQueue::new(),
            multi_mode: false,
            selector: RegionSelector::new(),
            result_text: String::new(),
            dispatch_enabled: false,
            window_visible,
            window_size: None,
            status: Status::fixed("Checking Ollama...", Tone::Normal),
            ocr_task: None,
            backend,
            events,
            config_path: None,
            quitting: false,
        }
    }

    /// Persist somewhere other than next to the executable.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status = Status::fixed(text, Tone::Normal);
    }

    pub fn tick(&mut self, now: Instant) {
        if matches!(self.status.expires, Some(at) if now >= at) {
            self.status = Status::fixed("Ready", Tone::Normal);
        }
    }

    pub fn is_processing(&self) -> bool {
        self.ocr_task.is_some()
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        log::debug!("Event: {:?}", event);
        match event {
            AppEvent::TakeScreenshot => {
                self.request_capture();
            }
            AppEvent::ToggleMultiMode => self.set_multi_mode(!self.multi_mode),
            AppEvent::ShowWindow => self.window_visible = true,
            AppEvent::Quit => self.quit(),
            AppEvent::OcrFinished(text) => self.on_ocr_finished(text),
            AppEvent::Backend(status) => {
                let tone = match status {
                    BackendStatus::Ready => Tone::Normal,
                    _ => Tone::Warning,
                };
                self.status = Status::fixed(status.message(), tone);
            }
        }
    }

    // ---- capture ----

    /// Starts a selection. No-op while one is running.
    ///
    /// The main window turns into the selection overlay, so it is brought on
    /// screen even when it sat in the tray.
    pub fn request_capture(&mut self) -> bool {
        if !self.selector.begin() {
            log::debug!("Capture already in progress");
            return false;
        }
        log::info!("Capture started");
        self.window_visible = true;
        self.set_status("Select area to capture... (Press ESC to cancel)");
        true
    }

    pub fn pointer_down(&mut self, p: ScreenPoint) {
        self.selector.pointer_down(p);
    }

    pub fn pointer_move(&mut self, p: ScreenPoint) {
        self.selector.pointer_move(p);
    }

    pub fn pointer_up(&mut self, p: ScreenPoint) {
        match self.selector.pointer_up(p) {
            Some(SelectionOutcome::TooSmall) => {
                log::info!("Capture cancelled: selection too small");
                self.window_visible = true;
                self.set_status("Capture cancelled - area too small");
            }
            Some(SelectionOutcome::Committed(region)) => {
                log::info!("Selection committed: {:?}", region);
            }
            None => {}
        }
    }

    pub fn cancel_capture(&mut self) {
        if self.selector.cancel() {
            log::info!("Capture cancelled");
            self.window_visible = true;
            self.set_status("Capture cancelled");
        }
    }

    /// Once the overlay has had time to disappear, grabs the committed region.
    /// Returns how long to wait when a grab is still pending.
    pub fn poll_grab(
        &mut self,
        now: Instant,
        grab: impl FnOnce(Region) -> Result<RgbImage>,
    ) -> Option<Duration> {
        if let Some(region) = self.selector.take_due_grab(now, GRAB_DELAY) {
            self.accept_capture(grab(region));
            return None;
        }
        self.selector.grab_pending_for(now, GRAB_DELAY)
    }

    pub fn accept_capture(&mut self, grabbed: Result<RgbImage>) {
        self.window_visible = true;
        let image = match grabbed {
            Ok(image) => image,
            Err(e) => {
                log::error!("Capture failed: {:#}", e);
                self.set_status(format!("Error capturing screenshot: {:#}", e));
                return;
            }
        };
        if self.queue.append(image).is_some() {
            self.forget_dispatched(0);
        }
        if self.multi_mode {
            self.dispatch_enabled = true;
            self.set_status(format!(
                "Screenshot captured ({}/{})",
                self.queue.len(),
                MAX_SCREENSHOTS
            ));
        } else if self.is_processing() {
            self.set_status(format!(
                "Screenshot queued ({}/{}) - OCR already running",
                self.queue.len(),
                MAX_SCREENSHOTS
            ));
        } else {
            self.dispatch();
        }
    }

    /// The image at `index` left the queue; keep the in-flight count aligned.
    fn forget_dispatched(&mut self, index: usize) {
        if let Some(task) = self.ocr_task.as_mut() {
            if index < task.taken {
                task.taken -= 1;
            }
        }
    }

    // ---- queue ----

    pub fn remove_screenshot(&mut self, index: usize) {
        if self.queue.remove_at(index).is_none() {
            return;
        }
        self.forget_dispatched(index);
        if self.queue.is_empty() {
            self.dispatch_enabled = false;
        }
        self.set_status(format!(
            "Screenshot removed ({}/{})",
            self.queue.len(),
            MAX_SCREENSHOTS
        ));
    }

    pub fn set_multi_mode(&mut self, on: bool) {
        self.multi_mode = on;
        self.dispatch_enabled = on && !self.queue.is_empty();
        log::info!("Multi mode {}", if on { "on" } else { "off" });
    }

    // ---- OCR ----

    /// Sends the whole queue through the pipeline on a worker thread.
    pub fn dispatch(&mut self) -> bool {
        self.start_ocr(true)
    }

    fn start_ocr(&mut self, clear_result: bool) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        if self.is_processing() {
            self.set_status("OCR already running");
            return false;
        }
        let job = OcrJob {
            images: self.queue.images().to_vec(),
            model: self.config.active_model().to_string(),
            prompt: self.config.ocr.prompt.clone(),
            multi_mode: self.multi_mode,
        };
        let taken = job.images.len();
        log::info!("Dispatching {} screenshot(s) to {}", taken, job.model);
        match ocr::spawn_worker(job, Arc::clone(&self.backend), self.events.clone(), AppEvent::OcrFinished) {
            Ok(handle) => {
                self.ocr_task = Some(OcrTask { handle, taken });
                if clear_result {
                    self.result_text.clear();
                }
                self.set_status("Processing OCR...");
                true
            }
            Err(e) => {
                log::error!("{:#}", e);
                self.set_status(format!("OCR Error: {:#}", e));
                false
            }
        }
    }

    /// Shows the result and drops the images that run consumed. Captures
    /// made while it ran stay queued; in single mode they go out right away.
    pub fn on_ocr_finished(&mut self, text: String) {
        let taken = match self.ocr_task.take() {
            Some(task) => {
                if task.handle.join().is_err() {
                    log::error!("OCR worker panicked");
                }
                task.taken
            }
            None => 0,
        };
        self.result_text = text;
        self.queue.drain_front(taken);
        self.dispatch_enabled = self.multi_mode && !self.queue.is_empty();
        self.set_status("OCR complete - text ready to copy");
        if !self.multi_mode && !self.queue.is_empty() {
            log::info!("{} screenshot(s) captured during OCR, processing next", self.queue.len());
            self.start_ocr(false);
        }
    }

    // ---- presentation ----

    pub fn copy_result(&mut self, now: Instant) -> CopyOutcome {
        let outcome = clipboard::copy_text(&self.result_text);
        self.report_copy(&outcome, now);
        outcome
    }

    fn report_copy(&mut self, outcome: &CopyOutcome, now: Instant) {
        self.status = match outcome {
            CopyOutcome::Copied => Status::transient("✓ Copied to clipboard!", Tone::Normal, now),
            CopyOutcome::NothingToCopy => Status::fixed("No text to copy", Tone::Normal),
            CopyOutcome::Failed => Status::fixed("Failed to write clipboard", Tone::Warning),
        };
    }

    /// Switches the backend model; the previous one stays selectable.
    pub fn select_model(&mut self, name: &str, now: Instant) {
        if name == self.config.active_model() {
            return;
        }
        self.config.set_model(name);
        log::info!("Model changed to {}", name);
        self.persist_config();
        self.status = Status::transient(format!("Model changed to: {}", name), Tone::Accent, now);
    }

    // ---- lifecycle ----

    pub fn persist_config(&mut self) {
        if let Some((w, h)) = self.window_size {
            self.config.set_window_size(w, h);
        }
        let res = match &self.config_path {
            Some(path) => self.config.save_to(path),
            None => self.config.save(),
        };
        match res {
            Ok(()) => log::info!("Config saved"),
            Err(e) => log::warn!("Failed to save config: {:#}", e),
        }
    }

    /// Window close minimizes to tray. Returns true when the close may proceed.
    pub fn on_close_requested(&mut self) -> bool {
        if self.quitting {
            return true;
        }
        self.persist_config();
        self.window_visible = false;
        false
    }

    pub fn quit(&mut self) {
        if self.quitting {
            return;
        }
        log::info!("Quit requested");
        self.persist_config();
        self.quitting = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::NO_TEXT_PLACEHOLDER;
    use crossbeam_channel::Receiver;
    use image::Rgb;
    use std::sync::Mutex;
    use std::time::SystemTime;

    enum Mode {
        Echo(&'static str),
        /// Replies `reply N` for the Nth call.
        Counting,
        Down,
    }

    struct FakeBackend {
        mode: Mode,
        calls: Mutex<usize>,
    }

    impl VisionBackend for FakeBackend {
        fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["minicpm-v:2b".into()])
        }
        fn generate(&self, _model: &str, _prompt: &str, _png: &[u8]) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            match self.mode {
                Mode::Echo(s) => Ok(s.to_string()),
                Mode::Counting => Ok(format!("reply {}", *calls)),
                Mode::Down => Err(anyhow::anyhow!("connection refused")),
            }
        }
    }

    fn temp_config() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("pcor-app-{}-{}.json", std::process::id(), nanos))
    }

    fn setup(mode: Mode) -> (AppState, Receiver<AppEvent>, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend { mode, calls: Mutex::new(0) });
        let (tx, rx) = crossbeam_channel::unbounded();
        let state = AppState::new(Config::default(), backend.clone(), tx).with_config_path(temp_config());
        (state, rx, backend)
    }

    fn shot(tag: u8) -> RgbImage {
        RgbImage::from_pixel(16, 16, Rgb([tag, tag, tag]))
    }

    fn pump_one(state: &mut AppState, rx: &Receiver<AppEvent>) {
        let ev = rx.recv_timeout(Duration::from_secs(10)).expect("worker result");
        state.handle_event(ev);
    }

    fn select(state: &mut AppState, from: (i32, i32), to: (i32, i32)) {
        assert!(state.request_capture());
        state.pointer_down(ScreenPoint::new(from.0, from.1));
        state.pointer_move(ScreenPoint::new(to.0, to.1));
        state.pointer_up(ScreenPoint::new(to.0, to.1));
    }

    fn grab_now(state: &mut AppState, tag: u8) {
        let later = Instant::now() + GRAB_DELAY + Duration::from_millis(1);
        assert_eq!(state.poll_grab(later, |_| Ok(shot(tag))), None);
    }

    #[test]
    fn single_mode_capture_dispatches_and_drains() {
        let (mut state, rx, _) = setup(Mode::Echo("# Invoice\n**Total** 12"));
        select(&mut state, (10, 10), (200, 120));
        grab_now(&mut state, 1);

        assert!(state.window_visible);
        assert_eq!(state.queue.len(), 1);
        assert!(state.is_processing());
        assert_eq!(state.status().text, "Processing OCR...");

        pump_one(&mut state, &rx);
        assert!(state.queue.is_empty());
        assert!(!state.is_processing());
        assert!(!state.dispatch_enabled);
        assert_eq!(state.result_text, "Invoice\nTotal 12");
        assert_eq!(state.status().text, "OCR complete - text ready to copy");
    }

    #[test]
    fn capture_brings_hidden_window_on_screen() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        assert!(!state.on_close_requested());
        assert!(!state.window_visible);

        state.handle_event(AppEvent::TakeScreenshot);
        assert!(state.selector.is_selecting());
        assert!(state.window_visible, "the window hosts the selection overlay");

        state.pointer_down(ScreenPoint::new(0, 0));
        state.pointer_up(ScreenPoint::new(80, 60));
        assert!(state.window_visible);
        grab_now(&mut state, 1);
        assert!(state.window_visible);
    }

    #[test]
    fn tray_actions_that_need_the_window_are_flagged() {
        assert!(AppEvent::TakeScreenshot.needs_window());
        assert!(AppEvent::ShowWindow.needs_window());
        assert!(AppEvent::Quit.needs_window());
        assert!(!AppEvent::ToggleMultiMode.needs_window());
        assert!(!AppEvent::OcrFinished(String::new()).needs_window());
    }

    #[test]
    fn capture_during_running_ocr_is_processed_next() {
        let (mut state, rx, backend) = setup(Mode::Counting);
        state.accept_capture(Ok(shot(1)));
        assert!(state.is_processing());
        state.accept_capture(Ok(shot(2)));
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.status().text, "Screenshot queued (2/3) - OCR already running");

        pump_one(&mut state, &rx);
        assert_eq!(state.result_text, "reply 1");
        let tags: Vec<u8> = state.queue.images().iter().map(|i| i.get_pixel(0, 0)[0]).collect();
        assert_eq!(tags, vec![2]);
        assert!(state.is_processing(), "queued capture goes out without another click");

        pump_one(&mut state, &rx);
        assert_eq!(state.result_text, "reply 2");
        assert!(state.queue.is_empty());
        assert!(!state.is_processing());
        assert_eq!(*backend.calls.lock().unwrap(), 2);
    }

    #[test]
    fn eviction_during_ocr_keeps_undispatched_images() {
        let (mut state, rx, _) = setup(Mode::Counting);
        state.set_multi_mode(true);
        state.accept_capture(Ok(shot(1)));
        state.accept_capture(Ok(shot(2)));
        assert!(state.dispatch());
        // Two more captures push shot 1 out while its run is in flight.
        state.accept_capture(Ok(shot(3)));
        state.accept_capture(Ok(shot(4)));
        pump_one(&mut state, &rx);

        let tags: Vec<u8> = state.queue.images().iter().map(|i| i.get_pixel(0, 0)[0]).collect();
        assert_eq!(tags, vec![3, 4]);
        assert!(state.dispatch_enabled);
        assert!(!state.is_processing());
    }

    #[test]
    fn multi_mode_keeps_last_three_and_labels() {
        let (mut state, rx, backend) = setup(Mode::Echo("text"));
        state.set_multi_mode(true);
        assert!(!state.dispatch_enabled);

        for tag in 1..=4u8 {
            select(&mut state, (0, 0), (50, 50));
            grab_now(&mut state, tag);
        }
        let tags: Vec<u8> = state.queue.images().iter().map(|i| i.get_pixel(0, 0)[0]).collect();
        assert_eq!(tags, vec![2, 3, 4]);
        assert!(state.dispatch_enabled);
        assert!(!state.is_processing());
        assert_eq!(state.status().text, "Screenshot captured (3/3)");

        assert!(state.dispatch());
        pump_one(&mut state, &rx);
        assert_eq!(*backend.calls.lock().unwrap(), 3);
        assert_eq!(state.result_text.matches("--- Screenshot ").count(), 3);
        assert!(state.queue.is_empty());
    }

    #[test]
    fn backend_down_shows_error_with_model_and_clears() {
        let (mut state, rx, _) = setup(Mode::Down);
        state.set_multi_mode(true);
        for tag in 1..=2u8 {
            select(&mut state, (0, 0), (40, 40));
            grab_now(&mut state, tag);
        }
        assert!(state.dispatch());
        pump_one(&mut state, &rx);

        assert!(state.result_text.starts_with("OCR Error:"));
        assert!(state.result_text.contains("minicpm-v:2b"));
        assert!(state.queue.is_empty());
        assert!(!state.dispatch_enabled);
    }

    #[test]
    fn small_selection_cancels_without_queueing() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        select(&mut state, (100, 100), (105, 300));
        assert!(state.window_visible);
        assert!(!state.selector.is_busy());
        assert!(state.queue.is_empty());
        assert_eq!(state.status().text, "Capture cancelled - area too small");
        assert_eq!(state.poll_grab(Instant::now() + Duration::from_secs(1), |_| Ok(shot(9))), None);
        assert!(state.queue.is_empty());
    }

    #[test]
    fn escape_cancels_without_queueing() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        assert!(state.request_capture());
        state.pointer_down(ScreenPoint::new(0, 0));
        state.pointer_move(ScreenPoint::new(300, 300));
        state.cancel_capture();
        assert!(state.window_visible);
        assert!(!state.selector.is_busy());
        assert!(state.queue.is_empty());
        assert_eq!(state.status().text, "Capture cancelled");
    }

    #[test]
    fn second_capture_request_is_ignored() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        assert!(state.request_capture());
        assert!(!state.request_capture());
        state.handle_event(AppEvent::TakeScreenshot);
        assert!(state.selector.is_selecting());
    }

    #[test]
    fn grab_failure_restores_window() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        select(&mut state, (0, 0), (50, 50));
        let later = Instant::now() + GRAB_DELAY;
        state.poll_grab(later, |_| Err(anyhow::anyhow!("permission denied")));
        assert!(state.window_visible);
        assert!(state.queue.is_empty());
        assert!(state.status().text.starts_with("Error capturing screenshot:"));
        assert!(state.request_capture());
    }

    #[test]
    fn removing_last_screenshot_disables_dispatch() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        state.set_multi_mode(true);
        state.accept_capture(Ok(shot(1)));
        assert!(state.dispatch_enabled);
        state.remove_screenshot(7);
        assert_eq!(state.queue.len(), 1);
        state.remove_screenshot(0);
        assert!(state.queue.is_empty());
        assert!(!state.dispatch_enabled);
        assert_eq!(state.status().text, "Screenshot removed (0/3)");
    }

    #[test]
    fn toggling_multi_mode_tracks_queue() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        state.set_multi_mode(true);
        state.accept_capture(Ok(shot(1)));
        state.handle_event(AppEvent::ToggleMultiMode);
        assert!(!state.multi_mode);
        assert!(!state.dispatch_enabled);
        state.handle_event(AppEvent::ToggleMultiMode);
        assert!(state.dispatch_enabled);
    }

    #[test]
    fn dispatch_refused_while_running() {
        let (mut state, rx, _) = setup(Mode::Echo("x"));
        state.set_multi_mode(true);
        state.accept_capture(Ok(shot(1)));
        assert!(state.dispatch());
        state.accept_capture(Ok(shot(2)));
        assert!(!state.dispatch());
        assert_eq!(state.status().text, "OCR already running");
        pump_one(&mut state, &rx);

        assert_eq!(state.queue.len(), 1, "only the dispatched image is consumed");
        assert!(state.dispatch_enabled);
        assert!(!state.is_processing());
    }

    #[test]
    fn blank_response_shows_placeholder_and_copy_is_refused() {
        let (mut state, rx, _) = setup(Mode::Echo("   \n"));
        state.accept_capture(Ok(shot(1)));
        pump_one(&mut state, &rx);
        assert_eq!(state.result_text, NO_TEXT_PLACEHOLDER);

        let now = Instant::now();
        assert_eq!(state.copy_result(now), CopyOutcome::NothingToCopy);
        assert_eq!(state.status().text, "No text to copy");
    }

    #[test]
    fn transient_status_reverts_to_ready() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        let now = Instant::now();
        state.report_copy(&CopyOutcome::Copied, now);
        state.tick(now + Duration::from_millis(500));
        assert_eq!(state.status().text, "✓ Copied to clipboard!");
        state.tick(now + TRANSIENT_STATUS);
        assert_eq!(state.status().text, "Ready");
    }

    #[test]
    fn backend_status_sets_warning() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        assert_eq!(state.status().text, "Checking Ollama...");
        state.handle_event(AppEvent::Backend(BackendStatus::Unreachable));
        assert_eq!(state.status().tone, Tone::Warning);
        state.handle_event(AppEvent::Backend(BackendStatus::Ready));
        assert_eq!(state.status().text, "Ready");
        assert_eq!(state.status().tone, Tone::Normal);
    }

    #[test]
    fn model_change_is_persisted_and_previous_kept() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        let path = state.config_path.clone().unwrap();
        let now = Instant::now();
        state.select_model("minicpm-v:8b", now);

        assert_eq!(state.config.active_model(), "minicpm-v:8b");
        assert_eq!(state.config.model.alternatives, vec!["minicpm-v:2b"]);
        assert_eq!(state.status().tone, Tone::Accent);

        let saved = Config::load_from(&path);
        assert_eq!(saved.model.name, "minicpm-v:8b");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn env_model_is_used_but_not_persisted() {
        let (mut state, rx, _) = setup(Mode::Down);
        let path = state.config_path.clone().unwrap();
        state.config.overrides.model = Some("llava:13b".into());

        state.accept_capture(Ok(shot(1)));
        pump_one(&mut state, &rx);
        assert!(state.result_text.contains("Model 'llava:13b'"));

        state.persist_config();
        assert_eq!(Config::load_from(&path).model.name, "minicpm-v:2b");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn close_hides_and_stamps_size_but_quit_allows_close() {
        let (mut state, _rx, _) = setup(Mode::Echo("x"));
        let path = state.config_path.clone().unwrap();
        state.window_size = Some((720.0, 810.0));

        assert!(!state.on_close_requested());
        assert!(!state.window_visible);
        assert_eq!(Config::load_from(&path).ui.window_size, "720x810");

        state.handle_event(AppEvent::ShowWindow);
        assert!(state.window_visible);
        state.handle_event(AppEvent::Quit);
        assert!(state.is_quitting());
        assert!(state.on_close_requested());
        let _ = std::fs::remove_file(path);
    }
}
