use crate::tiles::PixelRect;

/// Scroll offset of the virtual screen over the focused area, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: f32,
    height: f32,
    x: f32,
    y: f32,
    area_width: f32,
    area_height: f32,
    loop_x: bool,
    loop_y: bool,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            x: 0.0,
            y: 0.0,
            area_width: width,
            area_height: height,
            loop_x: false,
            loop_y: false,
        }
    }

    /// Pixel extent of the area being shown. Looping axes are never clamped.
    pub fn set_bounds(&mut self, area_width: f32, area_height: f32, loop_x: bool, loop_y: bool) {
        self.area_width = area_width;
        self.area_height = area_height;
        self.loop_x = loop_x;
        self.loop_y = loop_y;
    }

    /// Sets the offset directly, without clamping.
    pub fn jump_to(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Centers on a pixel position.
    pub fn track(&mut self, center_x: f32, center_y: f32) {
        self.x = follow_axis(center_x, self.width, self.area_width, self.loop_x);
        self.y = follow_axis(center_y, self.height, self.area_height, self.loop_y);
    }

    pub fn offset(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn resolution(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn pixel_rect(&self) -> PixelRect {
        PixelRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

fn follow_axis(center: f32, view: f32, area: f32, looping: bool) -> f32 {
    let wanted = center - view / 2.0;
    if looping {
        wanted
    } else if area <= view {
        (area - view) / 2.0
    } else {
        wanted.clamp(0.0, area - view)
    }
}
