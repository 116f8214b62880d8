use image::RgbImage;

pub const MAX_SCREENSHOTS: usize = 3;

/// Captured regions waiting for OCR. Appending past capacity drops the oldest.
///
/// `revision` bumps on every mutation so the thumbnail strip knows when to
/// rebuild its textures.
#[derive(Default)]
pub struct ScreenshotQueue {
    images: Vec<RgbImage>,
    revision: u64,
}

impl ScreenshotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the evicted image, if any.
    pub fn append(&mut self, image: RgbImage) -> Option<RgbImage> {
        let evicted = if self.images.len() >= MAX_SCREENSHOTS {
            Some(self.images.remove(0))
        } else {
            None
        };
        self.images.push(image);
        self.revision += 1;
        evicted
    }

    /// Out-of-range indices are ignored.
    pub fn remove_at(&mut self, index: usize) -> Option<RgbImage> {
        if index >= self.images.len() {
            return None;
        }
        self.revision += 1;
        Some(self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.revision += 1;
    }

    /// Drops the `count` oldest images, e.g. the ones an OCR run consumed.
    pub fn drain_front(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        if count >= self.images.len() {
            self.clear();
            return;
        }
        self.images.drain(..count);
        self.revision += 1;
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[RgbImage] {
        &self.images
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
