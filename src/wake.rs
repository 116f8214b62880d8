//! Getting the main window back from other threads.
//!
//! A hidden eframe window is not repainted on Windows, so `update()` cannot
//! drain the event inbox until something outside eframe shows it again. The
//! tray and hotkey threads post through here instead of sending directly.

use crate::app::AppEvent;
use crossbeam_channel::Sender;
use eframe::egui;
use once_cell::sync::OnceCell;

#[cfg(windows)]
use std::sync::atomic::{AtomicIsize, Ordering};

static UI_CONTEXT: OnceCell<egui::Context> = OnceCell::new();

#[cfg(windows)]
static MAIN_HWND: AtomicIsize = AtomicIsize::new(0);

/// Records the main window once eframe has created it.
pub fn remember(cc: &eframe::CreationContext<'_>) {
    let _ = UI_CONTEXT.set(cc.egui_ctx.clone());
    #[cfg(windows)]
    {
        use raw_window_handle::{HasWindowHandle, RawWindowHandle};
        match cc.window_handle().map(|h| h.as_raw()) {
            Ok(RawWindowHandle::Win32(h)) => {
                MAIN_HWND.store(h.hwnd.get(), Ordering::SeqCst);
                log::info!("Main window handle recorded");
            }
            Ok(_) => log::warn!("Main window is not a Win32 window"),
            Err(e) => log::warn!("No main window handle: {}", e),
        }
    }
}

/// Sends `event` to the UI loop and makes sure the loop gets to see it.
pub fn post(events: &Sender<AppEvent>, event: AppEvent) -> bool {
    let needs_window = event.needs_window();
    if events.send(event).is_err() {
        return false;
    }
    if needs_window {
        show_main_window();
    }
    if let Some(ctx) = UI_CONTEXT.get() {
        ctx.request_repaint();
    }
    true
}

#[cfg(windows)]
fn show_main_window() {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging as wm;

    let raw = MAIN_HWND.load(Ordering::SeqCst);
    if raw == 0 {
        return;
    }
    // Async so a busy UI thread cannot stall the tray pump.
    unsafe {
        let _ = wm::ShowWindowAsync(HWND(raw as *mut core::ffi::c_void), wm::SW_SHOWNOACTIVATE);
    }
}

#[cfg(not(windows))]
fn show_main_window() {
    // Other platforms keep delivering repaints to hidden windows.
}
