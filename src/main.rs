#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

mod app;
mod capture;
mod clipboard;
mod config;
mod logger;
mod ocr;
mod ollama;
mod queue;
mod ui;
mod wake;

use app::{AppEvent, AppState};
use ollama::{BackendStatus, OllamaBackend, VisionBackend};

#[cfg(windows)]
mod win_hotkey {
    use crate::app::AppEvent;
    use crossbeam_channel::Sender;
    use std::thread;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse as km;
    use windows::Win32::UI::WindowsAndMessaging as wm;

    pub const HOTKEY_ID: i32 = 1;

    /// Alt+F3 starts a region capture from anywhere.
    pub fn spawn_hotkey_listener(tx: Sender<AppEvent>) {
        thread::spawn(move || unsafe {
            let modifiers = km::HOT_KEY_MODIFIERS(km::MOD_ALT.0 as u32);
            if km::RegisterHotKey(HWND(std::ptr::null_mut()), HOTKEY_ID, modifiers, km::VK_F3.0 as u32).is_err() {
                log::warn!("RegisterHotKey Alt+F3 failed (in use?)");
                return;
            }
            log::info!("RegisterHotKey Alt+F3 OK");
            loop {
                let mut msg = wm::MSG::default();
                let got = wm::GetMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0);
                if got.0 == -1 || got.0 == 0 {
                    break;
                }
                if msg.message == wm::WM_HOTKEY {
                    log::info!("Hotkey: capture requested");
                    if !crate::wake::post(&tx, AppEvent::TakeScreenshot) {
                        break;
                    }
                }
                let _ = wm::TranslateMessage(&msg);
                wm::DispatchMessageW(&msg);
            }
            let _ = km::UnregisterHotKey(HWND(std::ptr::null_mut()), HOTKEY_ID);
            log::info!("UnregisterHotKey Alt+F3");
        });
    }
}

#[cfg(not(windows))]
mod win_hotkey {
    pub fn spawn_hotkey_listener(_tx: crossbeam_channel::Sender<crate::app::AppEvent>) {
        // Global hotkeys are Windows-only; use the tray menu elsewhere.
    }
}

mod tray {
    use crate::app::AppEvent;
    use crossbeam_channel::{Receiver, Sender};

    use tray_icon as tri;
    use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

    pub struct TrayHandle {
        #[allow(dead_code)]
        tray: TrayIcon,
        menu_event_rx: Receiver<MenuEvent>,
        tray_event_rx: Receiver<tri::TrayIconEvent>,
        capture_item: MenuItem,
        multi_item: MenuItem,
        show_item: MenuItem,
        quit_item: MenuItem,
        events: Sender<AppEvent>,
    }

    /// 32x32 green square with a white frame, like a viewfinder.
    fn icon_rgba() -> (Vec<u8>, u32, u32) {
        let size = 32usize;
        let mut rgba = vec![0u8; size * size * 4];
        for y in 0..size {
            for x in 0..size {
                let i = (y * size + x) * 4;
                let frame = (5..27).contains(&x)
                    && (5..27).contains(&y)
                    && (x < 8 || x > 23 || y < 8 || y > 23);
                let (r, g, b) = if frame { (0xFF, 0xFF, 0xFF) } else { (0x4C, 0xAF, 0x50) };
                rgba[i] = r;
                rgba[i + 1] = g;
                rgba[i + 2] = b;
                rgba[i + 3] = 0xFF;
            }
        }
        (rgba, size as u32, size as u32)
    }

    impl TrayHandle {
        pub fn new(events: Sender<AppEvent>) -> anyhow::Result<Self> {
            let menu = Menu::new();
            let capture = MenuItem::new("Take Screenshot", true, None);
            let multi = MenuItem::new("Toggle Multi Mode", true, None);
            let show = MenuItem::new("Show Window", true, None);
            let quit = MenuItem::new("Quit", true, None);
            let sep = PredefinedMenuItem::separator();
            menu.append_items(&[&capture, &multi, &show, &sep, &quit])?;

            let (rgba, w, h) = icon_rgba();
            let icon = Icon::from_rgba(rgba, w, h)?;

            let tray = TrayIconBuilder::new()
                .with_tooltip("PCOR - Screenshot OCR")
                .with_menu(Box::new(menu))
                .with_icon(icon)
                .build()?;

            let menu_event_rx = MenuEvent::receiver().clone();
            let tray_event_rx = tri::TrayIconEvent::receiver().clone();

            Ok(Self {
                tray,
                menu_event_rx,
                tray_event_rx,
                capture_item: capture,
                multi_item: multi,
                show_item: show,
                quit_item: quit,
                events,
            })
        }

        fn send(&self, event: AppEvent) {
            if !crate::wake::post(&self.events, event) {
                log::warn!("Tray: UI loop is gone");
            }
        }

        pub fn pump(&self) {
            // Non-blocking poll of tray menu events
            while let Ok(event) = self.menu_event_rx.try_recv() {
                let id = event.id;
                if id == self.capture_item.id() {
                    log::info!("Tray: Take Screenshot clicked");
                    self.send(AppEvent::TakeScreenshot);
                } else if id == self.multi_item.id() {
                    log::info!("Tray: Toggle Multi Mode clicked");
                    self.send(AppEvent::ToggleMultiMode);
                } else if id == self.show_item.id() {
                    log::info!("Tray: Show Window clicked");
                    self.send(AppEvent::ShowWindow);
                } else if id == self.quit_item.id() {
                    log::info!("Tray: Quit clicked");
                    self.send(AppEvent::Quit);
                }
            }
            while let Ok(event) = self.tray_event_rx.try_recv() {
                match event.click_type {
                    tri::ClickType::Left | tri::ClickType::Double => {
                        self.send(AppEvent::ShowWindow);
                    }
                    _ => {}
                }
            }
        }
    }
}

fn toast(title: &str, body: &str) {
    #[cfg(windows)]
    {
        let _ = winrt_notification::Toast::new(winrt_notification::Toast::POWERSHELL_APP_ID)
            .title(title)
            .text1(body)
            .show();
    }
    #[cfg(not(windows))]
    {
        log::debug!("toast suppressed: {} - {}", title, body);
    }
}

/// Tray icon and its pump on a dedicated thread (keeps non-Send types on one thread).
fn spawn_tray(events: Sender<AppEvent>, shutdown: Arc<AtomicBool>) {
    thread::spawn(move || {
        let tray = match tray::TrayHandle::new(events) {
            Ok(tray) => tray,
            Err(e) => {
                log::error!("Tray failed: {:#}", e);
                return;
            }
        };
        log::info!("Tray created");
        while !shutdown.load(Ordering::SeqCst) {
            // Windows message pump on the tray thread so clicks/menus work
            #[cfg(windows)]
            unsafe {
                use windows::Win32::Foundation::HWND;
                use windows::Win32::UI::WindowsAndMessaging as wm;
                let mut msg = wm::MSG::default();
                while wm::PeekMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0, wm::PM_REMOVE).into() {
                    let _ = wm::TranslateMessage(&msg);
                    wm::DispatchMessageW(&msg);
                }
            }
            tray.pump();
            thread::sleep(Duration::from_millis(25));
        }
        log::info!("Tray stopped");
    });
}

fn spawn_readiness_check(backend: Arc<dyn VisionBackend>, model: String, notify: bool, events: Sender<AppEvent>) {
    thread::spawn(move || {
        let status = ollama::check_readiness(backend.as_ref(), &model);
        log::info!("Ollama readiness: {:?}", status);
        if notify {
            match &status {
                BackendStatus::Ready => toast("PCOR", "Ready. Use the tray icon to capture."),
                other => toast("PCOR", &other.message()),
            }
        }
        let _ = events.send(AppEvent::Backend(status));
    });
}

fn main() {
    // Init logger first
    logger::init();
    log::info!("App starting");

    let cfg = config::Config::load();
    let ollama = OllamaBackend::new(cfg.active_host());
    log::info!("Config loaded: model {} at {}", cfg.active_model(), ollama.host());

    let (tx, rx) = crossbeam_channel::unbounded::<AppEvent>();
    let shutdown = Arc::new(AtomicBool::new(false));
    let backend: Arc<dyn VisionBackend> = Arc::new(ollama);

    spawn_tray(tx.clone(), Arc::clone(&shutdown));
    win_hotkey::spawn_hotkey_listener(tx.clone());
    spawn_readiness_check(
        Arc::clone(&backend),
        cfg.active_model().to_string(),
        cfg.ui.start_minimized,
        tx.clone(),
    );

    let state = AppState::new(cfg, backend, tx);

    // Run UI on main thread (blocks)
    ui::run_ui_main_thread(state, rx, Arc::clone(&shutdown));
    shutdown.store(true, Ordering::SeqCst);
    log::info!("App exiting");
}
