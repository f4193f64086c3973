use crate::backend::ImageHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// One image at an area pixel position. `depth` orders drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub image: ImageHandle,
    pub x: f32,
    pub y: f32,
    pub depth: f32,
}

/// Everything one frame draws, handed to the image backend after `draw`.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    items: Vec<DrawItem>,
    offset: (f32, f32),
    color_overlay: Option<Color>,
}

impl DisplayList {
    pub fn clear(&mut self) {
        self.items.clear();
        self.offset = (0.0, 0.0);
        self.color_overlay = None;
    }

    pub fn push(&mut self, item: DrawItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Scroll offset subtracted from every item when presenting.
    pub fn set_offset(&mut self, offset: (f32, f32)) {
        self.offset = offset;
    }

    pub fn offset(&self) -> (f32, f32) {
        self.offset
    }

    pub fn set_color_overlay(&mut self, color: Option<Color>) {
        self.color_overlay = color;
    }

    pub fn color_overlay(&self) -> Option<Color> {
        self.color_overlay
    }

    /// Stable, so items sharing a depth keep insertion order.
    pub fn sort_by_depth(&mut self) {
        self.items.sort_by(|a, b| a.depth.total_cmp(&b.depth));
    }
}
