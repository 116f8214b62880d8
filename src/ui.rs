use crate::app::{AppEvent, AppState, Tone};
use crate::capture::{self, ScreenPoint};
use crate::wake;
use eframe::egui;
use egui_phosphor::regular as icons;
use crossbeam_channel::Receiver;
use image::RgbImage;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const THUMB_MAX: (u32, u32) = (120, 80);
const OVERLAY_ALPHA: u8 = 77;
/// Far enough off every monitor that the grab cannot see the window.
const PARKED_AT: egui::Pos2 = egui::pos2(-20_000.0, -20_000.0);

/// What the main window is currently doing. During a capture it becomes the
/// fullscreen overlay, then leaves the screen until the grab is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Normal,
    Overlay,
    Parked,
}

struct PcorApp {
    state: AppState,
    rx: Receiver<AppEvent>,
    shutdown: Arc<AtomicBool>,
    thumbs: Vec<egui::TextureHandle>,
    thumbs_rev: Option<u64>,
    shown: bool,
    fonts_set: bool,
    layout: Layout,
    /// Outer position and inner size to go back to after a capture.
    restore: Option<(egui::Pos2, egui::Vec2)>,
    close_sent: bool,
}

fn install_fonts(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();
    egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);

    // OCR output is often CJK; fall back to a system font that covers it.
    let candidates = [
        r"C:\Windows\Fonts\msyh.ttc",
        r"C:\Windows\Fonts\msyh.ttf",
        r"C:\Windows\Fonts\simsun.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        "/System/Library/Fonts/PingFang.ttc",
    ];
    let loaded = candidates
        .iter()
        .find_map(|path| fs::read(path).ok().map(|bytes| (path, bytes)));
    match loaded {
        Some((path, bytes)) => {
            log::info!("Loaded CJK font: {}", path);
            fonts.font_data.insert("cjk".to_owned(), egui::FontData::from_owned(bytes));
            for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
                fonts.families.entry(family).or_default().push("cjk".to_owned());
            }
        }
        None => log::info!("No CJK font found; CJK text may render as squares"),
    }
    ctx.set_fonts(fonts);
}

/// Fits `(w, h)` inside the thumbnail box, never upscaling.
pub fn thumbnail_size(w: u32, h: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (1, 1);
    }
    let scale = (THUMB_MAX.0 as f32 / w as f32)
        .min(THUMB_MAX.1 as f32 / h as f32)
        .min(1.0);
    (
        ((w as f32 * scale).round() as u32).max(1),
        ((h as f32 * scale).round() as u32).max(1),
    )
}

fn thumbnail_texture(ctx: &egui::Context, idx: usize, img: &RgbImage) -> egui::TextureHandle {
    let (tw, th) = thumbnail_size(img.width(), img.height());
    let small = image::imageops::thumbnail(img, tw, th);
    let color = egui::ColorImage::from_rgb([tw as usize, th as usize], small.as_raw());
    ctx.load_texture(format!("thumb-{}", idx), color, egui::TextureOptions::LINEAR)
}

fn tone_color(tone: Tone) -> egui::Color32 {
    match tone {
        Tone::Normal => egui::Color32::from_rgb(0x66, 0x66, 0x66),
        Tone::Accent => egui::Color32::from_rgb(0x21, 0x96, 0xF3),
        Tone::Warning => egui::Color32::RED,
    }
}

impl PcorApp {
    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.state.handle_event(event);
        }
    }

    fn refresh_thumbnails(&mut self, ctx: &egui::Context) {
        let rev = self.state.queue.revision();
        if self.thumbs_rev == Some(rev) {
            return;
        }
        self.thumbs = self
            .state
            .queue
            .images()
            .iter()
            .enumerate()
            .map(|(idx, img)| thumbnail_texture(ctx, idx, img))
            .collect();
        self.thumbs_rev = Some(rev);
    }

    fn sync_window(&mut self, ctx: &egui::Context) {
        if self.state.is_quitting() {
            if !self.close_sent {
                self.close_sent = true;
                self.shutdown.store(true, Ordering::SeqCst);
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
            return;
        }
        if ctx.input(|i| i.viewport().close_requested()) {
            if self.state.selector.is_selecting() {
                self.state.cancel_capture();
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            } else if !self.state.on_close_requested() {
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            }
        }
        if self.state.window_visible && self.layout == Layout::Normal {
            if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
                self.state.window_size = Some((rect.width(), rect.height()));
            }
        }
        if self.state.window_visible != self.shown {
            self.shown = self.state.window_visible;
            ctx.send_viewport_cmd(egui::ViewportCommand::Visible(self.shown));
            if self.shown {
                ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
            }
        }
    }

    fn wanted_layout(&self) -> Layout {
        if self.state.selector.is_selecting() {
            Layout::Overlay
        } else if self.state.selector.is_busy() {
            Layout::Parked
        } else {
            Layout::Normal
        }
    }

    /// Reshapes the root window when the capture phase changes.
    fn apply_layout(&mut self, ctx: &egui::Context) {
        use egui::ViewportCommand as Cmd;

        let wanted = self.wanted_layout();
        if wanted == self.layout {
            return;
        }
        log::debug!("Window layout {:?} -> {:?}", self.layout, wanted);
        if self.layout == Layout::Normal {
            self.restore = ctx.input(|i| {
                let vp = i.viewport();
                Some((vp.outer_rect?.min, vp.inner_rect?.size()))
            });
        }
        match wanted {
            Layout::Overlay => {
                ctx.send_viewport_cmd(Cmd::Decorations(false));
                ctx.send_viewport_cmd(Cmd::WindowLevel(egui::WindowLevel::AlwaysOnTop));
                ctx.send_viewport_cmd(Cmd::Fullscreen(true));
                ctx.send_viewport_cmd(Cmd::Focus);
            }
            Layout::Parked => {
                ctx.send_viewport_cmd(Cmd::Fullscreen(false));
                ctx.send_viewport_cmd(Cmd::OuterPosition(PARKED_AT));
            }
            Layout::Normal => {
                ctx.send_viewport_cmd(Cmd::Fullscreen(false));
                ctx.send_viewport_cmd(Cmd::WindowLevel(egui::WindowLevel::Normal));
                ctx.send_viewport_cmd(Cmd::Decorations(true));
                if let Some((pos, size)) = self.restore.take() {
                    ctx.send_viewport_cmd(Cmd::InnerSize(size));
                    ctx.send_viewport_cmd(Cmd::OuterPosition(pos));
                }
                ctx.send_viewport_cmd(Cmd::Focus);
            }
        }
        self.layout = wanted;
        ctx.request_repaint();
    }

    fn overlay_frame(&mut self, ctx: &egui::Context) {
        ctx.set_cursor_icon(egui::CursorIcon::Crosshair);

        let ppp = ctx.pixels_per_point();
        let origin = ctx.input(|i| {
            i.viewport()
                .inner_rect
                .or(i.viewport().outer_rect)
                .map(|r| r.min)
                .unwrap_or(egui::Pos2::ZERO)
        });
        let to_screen = |p: egui::Pos2| {
            ScreenPoint::new(((origin.x + p.x) * ppp).round() as i32, ((origin.y + p.y) * ppp).round() as i32)
        };
        let to_local = |p: ScreenPoint| egui::pos2(p.x as f32 / ppp - origin.x, p.y as f32 / ppp - origin.y);

        let (escape, pressed, down, released, pos) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Escape),
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.pointer.interact_pos(),
            )
        });

        if escape {
            self.state.cancel_capture();
        } else if let Some(pos) = pos {
            let p = to_screen(pos);
            if pressed {
                self.state.pointer_down(p);
            }
            if released {
                self.state.pointer_up(p);
            } else if down && !pressed {
                self.state.pointer_move(p);
            }
        }

        let band = self.state.selector.rubber_band();
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::from_black_alpha(OVERLAY_ALPHA)))
            .show(ctx, |ui| {
                if let Some((anchor, corner)) = band {
                    let rect = egui::Rect::from_two_pos(to_local(anchor), to_local(corner));
                    ui.painter().rect_stroke(rect, 0.0, egui::Stroke::new(2.0, egui::Color32::RED));
                }
            });
    }

    fn header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Screenshots:").strong());
            if ui
                .button(egui::RichText::new(icons::PLUS).size(18.0))
                .on_hover_text("Take screenshot")
                .clicked()
            {
                self.state.request_capture();
            }
            ui.add_space(20.0);
            ui.label("Model:");
            let mut chosen = None;
            let active = self.state.config.active_model().to_string();
            egui::ComboBox::from_id_source("model-selector")
                .selected_text(active.as_str())
                .width(150.0)
                .show_ui(ui, |ui| {
                    for name in &self.state.model_choices {
                        if ui
                            .selectable_label(*name == active, name.as_str())
                            .clicked()
                        {
                            chosen = Some(name.clone());
                        }
                    }
                });
            if let Some(name) = chosen {
                self.state.select_model(&name, Instant::now());
            }
        });
    }

    fn thumbnail_strip(&mut self, ui: &mut egui::Ui) {
        let mut remove = None;
        ui.horizontal(|ui| {
            ui.set_min_height(100.0);
            for (idx, tex) in self.thumbs.iter().enumerate() {
                ui.group(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.image((tex.id(), tex.size_vec2()));
                        if ui
                            .small_button(egui::RichText::new(icons::X).color(egui::Color32::RED))
                            .on_hover_text("Remove")
                            .clicked()
                        {
                            remove = Some(idx);
                        }
                    });
                });
            }
        });
        if let Some(idx) = remove {
            self.state.remove_screenshot(idx);
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let mut multi = self.state.multi_mode;
            if ui.checkbox(&mut multi, "Multi Mode").changed() {
                self.state.set_multi_mode(multi);
            }
            let can_send = self.state.dispatch_enabled && !self.state.is_processing();
            let send = egui::Button::new(format!("{} Send to OCR", icons::PAPER_PLANE_TILT));
            if ui.add_enabled(can_send, send).clicked() {
                self.state.dispatch();
            }
            if self.state.is_processing() {
                ui.spinner();
            }
        });
    }

    fn copy_button(&mut self, ui: &mut egui::Ui) {
        if ui.button(format!("{} Copy Text", icons::COPY)).clicked() {
            self.state.copy_result(Instant::now());
        }
    }

    fn result_view(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("OCR Result:").strong());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                self.copy_button(ui);
            });
        });
        let footer = ui.spacing().interact_size.y + ui.spacing().item_spacing.y * 2.0;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .max_height((ui.available_height() - footer).max(60.0))
            .show(ui, |ui| {
                let mut view = self.state.result_text.as_str();
                ui.add(
                    egui::TextEdit::multiline(&mut view)
                        .font(egui::TextStyle::Monospace)
                        .desired_rows(20)
                        .desired_width(f32::INFINITY),
                );
            });
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            self.copy_button(ui);
        });
    }
}

impl eframe::App for PcorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Wake up periodically so we can poll the channel even without user events
        ctx.request_repaint_after(Duration::from_millis(120));
        if !self.fonts_set {
            self.fonts_set = true;
            install_fonts(ctx);
        }

        self.drain_events();
        let now = Instant::now();
        self.state.tick(now);
        if let Some(wait) = self.state.poll_grab(now, capture::grab_region) {
            ctx.request_repaint_after(wait);
        }
        self.sync_window(ctx);
        self.apply_layout(ctx);

        match self.layout {
            Layout::Overlay => {
                self.overlay_frame(ctx);
                return;
            }
            // Off screen until the grab lands.
            Layout::Parked => return,
            Layout::Normal => {}
        }

        self.refresh_thumbnails(ctx);

        egui::TopBottomPanel::top("tray").show(ctx, |ui| {
            self.header(ui);
            self.thumbnail_strip(ui);
        });
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            self.controls(ui);
        });
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            let status = self.state.status();
            ui.label(egui::RichText::new(&status.text).color(tone_color(status.tone)));
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.result_view(ui);
        });
    }

    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        // The root doubles as the capture overlay; panels paint their own fill.
        [0.0, 0.0, 0.0, 0.0]
    }
}

// Run the UI event loop on the main thread (blocking)
pub fn run_ui_main_thread(state: AppState, rx: Receiver<AppEvent>, shutdown: Arc<AtomicBool>) {
    let (w, h) = state.config.window_size();
    let visible = state.window_visible;
    let app = PcorApp {
        state,
        rx,
        shutdown,
        thumbs: Vec::new(),
        thumbs_rev: None,
        shown: visible,
        fonts_set: false,
        layout: Layout::Normal,
        restore: None,
        close_sent: false,
    };
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("PCOR - Screenshot OCR")
            .with_inner_size([w, h])
            .with_min_inner_size([500.0, 600.0])
            .with_transparent(true)
            .with_visible(visible),
        ..Default::default()
    };
    log::info!("Main UI: starting event loop");
    match eframe::run_native(
        "PCOR - Screenshot OCR",
        native_options,
        Box::new(|cc| {
            wake::remember(cc);
            Box::new(app)
        }),
    ) {
        Ok(_) => log::info!("Main UI: event loop exited"),
        Err(e) => log::error!("Main UI error: {}", e),
    }
}
