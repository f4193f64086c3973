use tracing::debug;

use crate::tiles::TileSize;

/// A single drawable frame owned by the image backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

/// A sheet of equally-sized frames, addressed left-to-right, top-to-bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TiledImageHandle(pub u32);

pub trait ImageBackend {
    fn load_tiled_image(
        &mut self,
        path: &str,
        tile_size: TileSize,
        across: u32,
        high: u32,
    ) -> Option<TiledImageHandle>;

    fn image_at(&self, sheet: TiledImageHandle, index: u32) -> Option<ImageHandle>;

    fn draw_image(&mut self, image: ImageHandle, x: f32, y: f32, depth: f32);
}

#[derive(Debug, Clone, Copy)]
struct SheetSlot {
    first_image: u32,
    frame_count: u32,
}

/// Image backend that hands out sequential handles and counts draws.
#[derive(Debug, Default)]
pub struct NullImages {
    sheets: Vec<SheetSlot>,
    next_image: u32,
    draw_count: u64,
}

impl NullImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }
}

impl ImageBackend for NullImages {
    fn load_tiled_image(
        &mut self,
        path: &str,
        tile_size: TileSize,
        across: u32,
        high: u32,
    ) -> Option<TiledImageHandle> {
        let frame_count = across.checked_mul(high)?;
        let handle = TiledImageHandle(self.sheets.len() as u32);
        self.sheets.push(SheetSlot {
            first_image: self.next_image,
            frame_count,
        });
        self.next_image = self.next_image.saturating_add(frame_count);
        debug!(
            path,
            tile_width = tile_size.width,
            tile_height = tile_size.height,
            frame_count,
            "null_image_sheet_loaded"
        );
        Some(handle)
    }

    fn image_at(&self, sheet: TiledImageHandle, index: u32) -> Option<ImageHandle> {
        let slot = self.sheets.get(sheet.0 as usize)?;
        (index < slot.frame_count).then(|| ImageHandle(slot.first_image + index))
    }

    fn draw_image(&mut self, _image: ImageHandle, _x: f32, _y: f32, _depth: f32) {
        self.draw_count = self.draw_count.saturating_add(1);
    }
}
