use anyhow::{anyhow, Context, Result};
use image::{imageops, DynamicImage, RgbImage};
use std::time::{Duration, Instant};

/// Selections narrower or shorter than this are treated as accidental clicks.
pub const MIN_SELECTION_PX: i32 = 10;

/// Time for the overlay to vanish from the screen before grabbing pixels.
pub const GRAB_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in physical screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn from_corners(a: ScreenPoint, b: ScreenPoint) -> Self {
        let x1 = a.x.min(b.x);
        let y1 = a.y.min(b.y);
        let x2 = a.x.max(b.x);
        let y2 = a.y.max(b.y);
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        }
    }

    pub fn is_big_enough(&self) -> bool {
        self.width >= MIN_SELECTION_PX as u32 && self.height >= MIN_SELECTION_PX as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    Committed(Region),
    TooSmall,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Idle,
    Selecting {
        anchor: Option<ScreenPoint>,
        current: Option<ScreenPoint>,
    },
    /// Overlay is gone; waiting for the screen to repaint before grabbing.
    Grabbing { region: Region, since: Instant },
}

/// Rubber-band selection over the full-screen overlay.
///
/// A capture counts as in progress from `begin` until the region is handed
/// out by `take_due_grab`, or the selection is cancelled.
#[derive(Debug)]
pub struct RegionSelector {
    state: State,
}

impl Default for RegionSelector {
    fn default() -> Self {
        Self { state: State::Idle }
    }
}

impl RegionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a capture is already in progress.
    pub fn begin(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.state = State::Selecting { anchor: None, current: None };
        true
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    /// True while the overlay should be on screen.
    pub fn is_selecting(&self) -> bool {
        matches!(self.state, State::Selecting { .. })
    }

    pub fn pointer_down(&mut self, p: ScreenPoint) {
        if let State::Selecting { anchor, current } = &mut self.state {
            *anchor = Some(p);
            *current = Some(p);
        }
    }

    pub fn pointer_move(&mut self, p: ScreenPoint) {
        if let State::Selecting { anchor: Some(_), current } = &mut self.state {
            *current = Some(p);
        }
    }

    /// `None` when no press was seen on the overlay.
    pub fn pointer_up(&mut self, p: ScreenPoint) -> Option<SelectionOutcome> {
        let anchor = match self.state {
            State::Selecting { anchor: Some(a), .. } => a,
            _ => return None,
        };
        let region = Region::from_corners(anchor, p);
        if region.is_big_enough() {
            self.state = State::Grabbing { region, since: Instant::now() };
            Some(SelectionOutcome::Committed(region))
        } else {
            self.state = State::Idle;
            Some(SelectionOutcome::TooSmall)
        }
    }

    /// Escape while selecting. Returns whether anything was cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.is_selecting() {
            self.state = State::Idle;
            true
        } else {
            false
        }
    }

    /// Anchor and far corner of the rectangle being drawn.
    pub fn rubber_band(&self) -> Option<(ScreenPoint, ScreenPoint)> {
        match self.state {
            State::Selecting { anchor: Some(a), current: Some(c) } => Some((a, c)),
            _ => None,
        }
    }

    /// Hands out the committed region once `delay` has passed, returning to idle.
    pub fn take_due_grab(&mut self, now: Instant, delay: Duration) -> Option<Region> {
        match self.state {
            State::Grabbing { region, since } if now.saturating_duration_since(since) >= delay => {
                self.state = State::Idle;
                Some(region)
            }
            _ => None,
        }
    }

    /// Time left before a committed region is due.
    pub fn grab_pending_for(&self, now: Instant, delay: Duration) -> Option<Duration> {
        match self.state {
            State::Grabbing { since, .. } => Some(delay.saturating_sub(now.saturating_duration_since(since))),
            _ => None,
        }
    }
}

/// Intersects `region` with a monitor whose top-left is `origin` and whose
/// captured image is `size`, returning `(x, y, w, h)` relative to the image.
pub fn crop_bounds(region: Region, origin: ScreenPoint, size: (u32, u32)) -> Option<(u32, u32, u32, u32)> {
    let left = (region.x - origin.x).max(0) as i64;
    let top = (region.y - origin.y).max(0) as i64;
    let right = ((region.x - origin.x) as i64 + region.width as i64).min(size.0 as i64);
    let bottom = ((region.y - origin.y) as i64 + region.height as i64).min(size.1 as i64);
    if right <= left || bottom <= top {
        return None;
    }
    Some((left as u32, top as u32, (right - left) as u32, (bottom - top) as u32))
}

/// Grabs `region` from the live screen of the monitor under its top-left corner.
pub fn grab_region(region: Region) -> Result<RgbImage> {
    let monitor = xcap::Monitor::from_point(region.x, region.y)
        .with_context(|| format!("no monitor at ({}, {})", region.x, region.y))?;
    let origin = ScreenPoint::new(monitor.x()?, monitor.y()?);
    let shot = monitor.capture_image().context("screen grab failed")?;

    let (x, y, w, h) = crop_bounds(region, origin, (shot.width(), shot.height()))
        .ok_or_else(|| anyhow!("selection lies outside the screen"))?;
    let cropped = imageops::crop_imm(&shot, x, y, w, h).to_image();
    log::info!("Grabbed {}x{} at ({}, {})", w, h, region.x, region.y);
    Ok(DynamicImage::ImageRgba8(cropped).to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> ScreenPoint {
        ScreenPoint::new(x, y)
    }

    #[test]
    fn begin_is_single_flight() {
        let mut sel = RegionSelector::new();
        assert!(sel.begin());
        assert!(!sel.begin());
        assert!(sel.cancel());
        assert!(sel.begin());
    }

    #[test]
    fn drag_in_any_direction_normalizes_box() {
        let mut sel = RegionSelector::new();
        sel.begin();
        sel.pointer_down(p(200, 150));
        sel.pointer_move(p(120, 90));
        assert_eq!(sel.rubber_band(), Some((p(200, 150), p(120, 90))));

        let out = sel.pointer_up(p(100, 50));
        assert_eq!(
            out,
            Some(SelectionOutcome::Committed(Region { x: 100, y: 50, width: 100, height: 100 }))
        );
        assert!(sel.is_busy());
        assert!(!sel.is_selecting());
    }

    #[test]
    fn move_does_not_touch_anchor() {
        let mut sel = RegionSelector::new();
        sel.begin();
        sel.pointer_down(p(10, 10));
        sel.pointer_move(p(50, 60));
        sel.pointer_move(p(70, 80));
        assert_eq!(sel.rubber_band(), Some((p(10, 10), p(70, 80))));
    }

    #[test]
    fn small_selection_returns_to_idle() {
        let mut sel = RegionSelector::new();
        sel.begin();
        sel.pointer_down(p(0, 0));
        assert_eq!(sel.pointer_up(p(500, 9)), Some(SelectionOutcome::TooSmall));
        assert!(!sel.is_busy());

        sel.begin();
        sel.pointer_down(p(0, 0));
        assert_eq!(sel.pointer_up(p(9, 500)), Some(SelectionOutcome::TooSmall));
        assert!(!sel.is_busy());
    }

    #[test]
    fn exactly_threshold_is_accepted() {
        let mut sel = RegionSelector::new();
        sel.begin();
        sel.pointer_down(p(0, 0));
        assert!(matches!(sel.pointer_up(p(10, 10)), Some(SelectionOutcome::Committed(_))));
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut sel = RegionSelector::new();
        assert_eq!(sel.pointer_up(p(5, 5)), None);
        sel.begin();
        sel.pointer_move(p(40, 40));
        assert_eq!(sel.rubber_band(), None);
        assert_eq!(sel.pointer_up(p(50, 50)), None);
        assert!(sel.is_selecting());
    }

    #[test]
    fn grab_is_due_only_after_delay() {
        let mut sel = RegionSelector::new();
        sel.begin();
        sel.pointer_down(p(0, 0));
        sel.pointer_up(p(40, 40));
        let start = Instant::now();
        assert_eq!(sel.take_due_grab(start, Duration::from_secs(3600)), None);
        assert!(sel.grab_pending_for(start, Duration::from_secs(3600)).is_some());
        assert!(!sel.cancel(), "escape after release must not drop the grab");

        let later = start + Duration::from_millis(150);
        let region = sel.take_due_grab(later, GRAB_DELAY).unwrap();
        assert_eq!(region.width, 40);
        assert!(!sel.is_busy());
    }

    #[test]
    fn crop_is_clamped_to_monitor() {
        let region = Region { x: 1900, y: -20, width: 200, height: 100 };
        let bounds = crop_bounds(region, p(0, 0), (1920, 1080));
        assert_eq!(bounds, Some((1900, 0, 20, 80)));
    }

    #[test]
    fn crop_on_secondary_monitor_is_relative() {
        let region = Region { x: 2000, y: 100, width: 50, height: 40 };
        assert_eq!(crop_bounds(region, p(1920, 0), (2560, 1440)), Some((80, 100, 50, 40)));
    }

    #[test]
    fn crop_outside_monitor_is_none() {
        let region = Region { x: 5000, y: 5000, width: 50, height: 50 };
        assert_eq!(crop_bounds(region, p(0, 0), (1920, 1080)), None);
    }
}
