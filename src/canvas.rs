use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use uuid::Uuid;

use crate::error::EditorError;
use crate::ops::fill;

/// Canvas size used when no settings override it.
pub const DEFAULT_CANVAS_WIDTH: u32 = 64;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 32;

/// A pixel with zero alpha.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Name of the layer every stack starts with.
pub const BASE_LAYER_NAME: &str = "Base";

// ============================================================================
// PIXEL BUFFER – fixed-size RGBA raster with drawing primitives
// ============================================================================

/// A fixed-size RGBA raster. Dimensions never change after creation.
///
/// Coordinates are signed so that brush squares centred near an edge can be
/// expressed directly; every write outside the raster is silently skipped and
/// every read outside it returns `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: RgbaImage,
}

impl PixelBuffer {
    // ---- construction -------------------------------------------------------

    /// Create a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    /// Wrap an existing image. The image dimensions become the buffer's.
    pub fn from_rgba_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Row-major RGBA bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    // ---- pixel access -------------------------------------------------------

    #[inline]
    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width() as i64 && y < self.height() as i64
    }

    /// Read a pixel, `None` outside the raster.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        if self.in_bounds(x as i64, y as i64) {
            Some(*self.pixels.get_pixel(x as u32, y as u32))
        } else {
            None
        }
    }

    /// Write a pixel; no-op outside the raster.
    #[inline]
    pub fn put(&mut self, x: i32, y: i32, pixel: Rgba<u8>) {
        if self.in_bounds(x as i64, y as i64) {
            self.pixels.put_pixel(x as u32, y as u32, pixel);
        }
    }

    /// Color-sampler read. Callers guard against `None` themselves.
    pub fn sample(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        self.get(x, y)
    }

    // ---- drawing primitives -------------------------------------------------

    /// Stamp an opaque `size`×`size` square centred on `(cx, cy)`.
    ///
    /// The square spans `[cx - size/2, cx - size/2 + size)` on both axes.
    /// The color's alpha is ignored: brush pixels are always fully opaque.
    pub fn paint_square(&mut self, cx: i32, cy: i32, size: u32, color: Rgba<u8>) {
        let opaque = Rgba([color[0], color[1], color[2], 255]);
        self.fill_square(cx, cy, size, opaque);
    }

    /// Clear the same square `paint_square` would have covered.
    pub fn erase_square(&mut self, cx: i32, cy: i32, size: u32) {
        self.fill_square(cx, cy, size, TRANSPARENT);
    }

    fn fill_square(&mut self, cx: i32, cy: i32, size: u32, pixel: Rgba<u8>) {
        if size == 0 {
            return;
        }
        let half = (size / 2) as i64;
        let x0 = cx as i64 - half;
        let y0 = cy as i64 - half;
        let x_start = x0.max(0);
        let y_start = y0.max(0);
        let x_end = (x0 + size as i64).min(self.width() as i64);
        let y_end = (y0 + size as i64).min(self.height() as i64);
        for y in y_start..y_end {
            for x in x_start..x_end {
                self.pixels.put_pixel(x as u32, y as u32, pixel);
            }
        }
    }

    /// 4-connected exact-match flood fill from `(x, y)`.
    /// Returns `true` when at least one pixel changed.
    pub fn flood_fill(&mut self, x: i32, y: i32, color: Rgba<u8>) -> bool {
        fill::flood_fill(&mut self.pixels, x, y, color) > 0
    }

    /// Make every pixel fully transparent.
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// True when every pixel has zero alpha.
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p[3] == 0)
    }

    /// Composite `src` on top of this buffer ("source over").
    /// Fully transparent source pixels leave the destination untouched.
    pub fn draw_over(&mut self, src: &PixelBuffer) {
        if self.dimensions() == src.dimensions() {
            let dst: &mut [u8] = &mut self.pixels;
            dst.par_chunks_exact_mut(4)
                .zip(src.as_raw().par_chunks_exact(4))
                .for_each(|(d, s)| {
                    let out = blend_over(Rgba([d[0], d[1], d[2], d[3]]), Rgba([s[0], s[1], s[2], s[3]]));
                    d.copy_from_slice(&out.0);
                });
            return;
        }
        // Mismatched sizes only composite the overlapping region.
        let w = self.width().min(src.width());
        let h = self.height().min(src.height());
        for y in 0..h {
            for x in 0..w {
                let base = *self.pixels.get_pixel(x, y);
                let top = *src.pixels.get_pixel(x, y);
                self.pixels.put_pixel(x, y, blend_over(base, top));
            }
        }
    }

    /// Left↔right mirror image of this buffer.
    pub fn flipped_horizontal(&self) -> PixelBuffer {
        PixelBuffer::from_rgba_image(image::imageops::flip_horizontal(&self.pixels))
    }

    /// Top↔bottom mirror image of this buffer.
    pub fn flipped_vertical(&self) -> PixelBuffer {
        PixelBuffer::from_rgba_image(image::imageops::flip_vertical(&self.pixels))
    }
}

/// Non-premultiplied source-over blend of a single pixel.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    // Fully transparent top: nothing to blend
    if top[3] == 0 {
        return base;
    }
    // Opaque top, or nothing underneath: top wins as-is
    if top[3] == 255 || base[3] == 0 {
        return top;
    }

    let top_a = top[3] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    let channel = |t: u8, b: u8| -> u8 {
        let v = (t as f32 * top_a + b as f32 * base_a * (1.0 - top_a)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(top[0], base[0]),
        channel(top[1], base[1]),
        channel(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug)]
pub struct Layer {
    /// Stable identity, used to match snapshot slots back to live layers.
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    pub pixels: PixelBuffer,
}

impl Layer {
    /// New, visible, fully transparent layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            pixels: PixelBuffer::new(width, height),
        }
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers (bottom to top) plus the active index.
///
/// Invariants: there is always at least one layer and `active_index()` is
/// always a valid index.
#[derive(Clone, Debug)]
pub struct LayerStack {
    layers: Vec<Layer>,
    active_layer_index: usize,
    width: u32,
    height: u32,
}

impl LayerStack {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            layers: vec![Layer::new(BASE_LAYER_NAME, width, height)],
            active_layer_index: 0,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false; kept for the `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn active_index(&self) -> usize {
        self.active_layer_index
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer_index]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.active_layer_index]
    }

    fn check_index(&self, index: usize, what: &str) -> Result<(), EditorError> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(EditorError::invalid(format!(
                "cannot {} layer {}: only {} layer(s)",
                what,
                index,
                self.layers.len()
            )))
        }
    }

    pub fn select_layer(&mut self, index: usize) -> Result<(), EditorError> {
        self.check_index(index, "select")?;
        self.active_layer_index = index;
        Ok(())
    }

    /// Default name for the next added layer ("Layer N", N = new length).
    pub fn next_layer_name(&self) -> String {
        format!("Layer {}", self.layers.len() + 1)
    }

    /// Append an empty layer and make it active. Returns its index.
    pub fn add_layer(&mut self, name: impl Into<String>) -> usize {
        self.layers.push(Layer::new(name, self.width, self.height));
        self.active_layer_index = self.layers.len() - 1;
        self.active_layer_index
    }

    /// Whether `delete_layer(index)` would succeed.
    pub fn can_delete(&self, index: usize) -> Result<(), EditorError> {
        if self.layers.len() <= 1 {
            return Err(EditorError::invalid("need at least one layer"));
        }
        self.check_index(index, "delete")
    }

    /// Remove a layer. The last remaining layer can never be removed.
    pub fn delete_layer(&mut self, index: usize) -> Result<Layer, EditorError> {
        self.can_delete(index)?;
        let removed = self.layers.remove(index);
        if index <= self.active_layer_index {
            self.active_layer_index = self.active_layer_index.saturating_sub(1);
        }
        self.active_layer_index = self.active_layer_index.min(self.layers.len() - 1);
        Ok(removed)
    }

    /// Flip a layer's visibility. Returns the new flag.
    pub fn toggle_visibility(&mut self, index: usize) -> Result<bool, EditorError> {
        self.check_index(index, "toggle")?;
        let layer = &mut self.layers[index];
        layer.visible = !layer.visible;
        Ok(layer.visible)
    }

    /// Move a layer to a new position; the active index keeps following the
    /// active layer.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<(), EditorError> {
        self.check_index(from, "move")?;
        self.check_index(to, "move")?;
        if from == to {
            return Ok(());
        }
        let active_id = self.active_layer().id;
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        self.active_layer_index = self.position_of(active_id).unwrap_or(0);
        Ok(())
    }

    /// Draw the top layer onto the one beneath it and drop it.
    /// Returns `false` (no-op) with fewer than two layers.
    pub fn merge_top(&mut self) -> bool {
        if self.layers.len() < 2 {
            return false;
        }
        let Some(top) = self.layers.pop() else {
            return false;
        };
        let last = self.layers.len() - 1;
        self.layers[last].pixels.draw_over(&top.pixels);
        self.active_layer_index = last;
        true
    }

    /// Erase every layer; layer count, names and ids are unchanged.
    pub fn clear_all(&mut self) {
        for layer in &mut self.layers {
            layer.pixels.clear();
        }
    }

    /// Draw-over composite of the stack, bottom to top.
    pub fn composite(&self, only_visible: bool) -> PixelBuffer {
        let mut out = PixelBuffer::new(self.width, self.height);
        for layer in self.layers.iter().filter(|l| l.visible || !only_visible) {
            out.draw_over(&layer.pixels);
        }
        out
    }

    /// Swap in a whole new layer list (snapshot restore). An empty list falls
    /// back to a single base layer so the stack invariants hold.
    pub(crate) fn replace_layers(&mut self, layers: Vec<Layer>, active: usize) {
        self.layers = layers;
        if self.layers.is_empty() {
            self.layers.push(Layer::new(BASE_LAYER_NAME, self.width, self.height));
        }
        self.active_layer_index = active.min(self.layers.len() - 1);
    }
}
