use crate::canvas::PixelBuffer;

/// Mirror applied to the active layer after each brush or eraser application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SymmetryMode {
    #[default]
    None,
    /// Mirror across the vertical centre line (left↔right).
    Vertical,
    /// Mirror across the horizontal centre line (top↔bottom).
    Horizontal,
}

impl SymmetryMode {
    pub fn all() -> &'static [SymmetryMode] {
        &[SymmetryMode::None, SymmetryMode::Vertical, SymmetryMode::Horizontal]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SymmetryMode::None => "none",
            SymmetryMode::Vertical => "vertical",
            SymmetryMode::Horizontal => "horizontal",
        }
    }

    pub fn is_active(self) -> bool {
        self != SymmetryMode::None
    }
}

/// Mirror `pixels` and draw the mirrored copy back over the original.
///
/// Opaque mirrored pixels overwrite; transparent mirrored pixels leave the
/// original untouched, so symmetry never erases existing paint.
pub fn apply_symmetry(pixels: &mut PixelBuffer, mode: SymmetryMode) {
    let mirrored = match mode {
        SymmetryMode::None => return,
        SymmetryMode::Vertical => pixels.flipped_horizontal(),
        SymmetryMode::Horizontal => pixels.flipped_vertical(),
    };
    pixels.draw_over(&mirrored);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::TRANSPARENT;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    #[test]
    fn none_is_noop() {
        let mut buf = PixelBuffer::new(8, 4);
        buf.paint_square(1, 1, 1, RED);
        let before = buf.clone();
        apply_symmetry(&mut buf, SymmetryMode::None);
        assert_eq!(buf, before);
    }

    #[test]
    fn vertical_mirrors_left_to_right() {
        let mut buf = PixelBuffer::new(8, 4);
        buf.paint_square(1, 2, 1, RED);
        apply_symmetry(&mut buf, SymmetryMode::Vertical);
        assert_eq!(buf.get(1, 2), Some(RED));
        assert_eq!(buf.get(6, 2), Some(RED));
        assert_eq!(buf.get(1, 1), Some(TRANSPARENT));
    }

    #[test]
    fn horizontal_mirrors_top_to_bottom() {
        let mut buf = PixelBuffer::new(8, 4);
        buf.paint_square(5, 0, 1, RED);
        apply_symmetry(&mut buf, SymmetryMode::Horizontal);
        assert_eq!(buf.get(5, 0), Some(RED));
        assert_eq!(buf.get(5, 3), Some(RED));
        assert_eq!(buf.get(2, 3), Some(TRANSPARENT));
    }

    #[test]
    fn transparent_mirror_does_not_erase() {
        let mut buf = PixelBuffer::new(8, 4);
        buf.paint_square(0, 0, 1, RED);
        buf.paint_square(3, 3, 1, GREEN);
        apply_symmetry(&mut buf, SymmetryMode::Vertical);
        // (3,3) mirrors to (4,3); the transparent source at (4,3) leaves (3,3) alone.
        assert_eq!(buf.get(3, 3), Some(GREEN));
        assert_eq!(buf.get(4, 3), Some(GREEN));
        assert_eq!(buf.get(7, 0), Some(RED));
    }

    #[test]
    fn vertical_twice_is_idempotent_for_one_sided_paint() {
        let mut buf = PixelBuffer::new(8, 4);
        buf.paint_square(1, 1, 2, RED);
        buf.paint_square(2, 3, 1, GREEN);
        apply_symmetry(&mut buf, SymmetryMode::Vertical);
        let once = buf.clone();
        apply_symmetry(&mut buf, SymmetryMode::Vertical);
        assert_eq!(buf, once);
    }
}
