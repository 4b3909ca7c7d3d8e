use image::Rgba;

use crate::ops::symmetry::SymmetryMode;

/// Accent purple the editor starts with.
pub const DEFAULT_COLOR: Rgba<u8> = Rgba([0x7C, 0x3A, 0xED, 255]);

/// Quick palette shown next to the color picker.
pub const QUICK_PALETTE: [&str; 8] = [
    "#000000", "#ffffff", "#7C3AED", "#00FFE1", "#FF2EC9", "#FF7A00", "#00A1FF", "#7cffb2",
];

/// Largest brush the tool panel offers.
pub const MAX_BRUSH_SIZE: u32 = 16;

// ============================================================================
// TOOL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    PixelBrush,
    Eraser,
    Fill,
    ColorSampler,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[Tool::PixelBrush, Tool::Eraser, Tool::Fill, Tool::ColorSampler]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::PixelBrush => "Pixel",
            Tool::Eraser => "Eraser",
            Tool::Fill => "Fill",
            Tool::ColorSampler => "Eyedropper",
        }
    }

    /// Whether a stroke with this tool changes layer pixels.
    pub fn mutates_pixels(&self) -> bool {
        !matches!(self, Tool::ColorSampler)
    }

    /// Brush and eraser re-mirror after every application; fill does not.
    pub fn uses_symmetry(&self) -> bool {
        matches!(self, Tool::PixelBrush | Tool::Eraser)
    }
}

// ============================================================================
// EDITOR STATE – the current tool settings of the single editor instance
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct EditorState {
    pub tool: Tool,
    brush_size: u32,
    pub color: Rgba<u8>,
    pub symmetry: SymmetryMode,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            tool: Tool::PixelBrush,
            brush_size: 1,
            color: DEFAULT_COLOR,
            symmetry: SymmetryMode::None,
        }
    }
}

impl EditorState {
    pub fn new(brush_size: u32, color: Rgba<u8>) -> Self {
        let mut state = Self {
            color,
            ..Self::default()
        };
        state.set_brush_size(brush_size);
        state
    }

    pub fn brush_size(&self) -> u32 {
        self.brush_size
    }

    /// Brush sizes are at least one pixel.
    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.max(1);
    }

    /// Hex form of the active color, as shown in the picker.
    pub fn color_hex(&self) -> String {
        to_hex_color(self.color)
    }
}

// ============================================================================
// COLOR HELPERS
// ============================================================================

/// Parse `#RRGGBB` (or `RRGGBB`) into an opaque color.
pub fn parse_hex_color(hex: &str) -> Option<Rgba<u8>> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let n = u32::from_str_radix(digits, 16).ok()?;
    Some(Rgba([(n >> 16) as u8, (n >> 8) as u8, n as u8, 255]))
}

/// Format the RGB part of a color as lowercase `#rrggbb`.
pub fn to_hex_color(color: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_color("#7C3AED"), Some(DEFAULT_COLOR));
        assert_eq!(parse_hex_color("00ffe1"), Some(Rgba([0, 255, 225, 255])));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
        assert_eq!(to_hex_color(Rgba([255, 122, 0, 10])), "#ff7a00");
    }

    #[test]
    fn palette_entries_all_parse() {
        assert!(QUICK_PALETTE.iter().all(|c| parse_hex_color(c).is_some()));
    }

    #[test]
    fn brush_size_never_zero() {
        let mut state = EditorState::new(0, DEFAULT_COLOR);
        assert_eq!(state.brush_size(), 1);
        state.set_brush_size(5);
        assert_eq!(state.brush_size(), 5);
    }

    #[test]
    fn sampler_is_read_only() {
        assert!(!Tool::ColorSampler.mutates_pixels());
        assert!(Tool::Fill.mutates_pixels());
        assert!(!Tool::Fill.uses_symmetry());
        assert!(Tool::Eraser.uses_symmetry());
    }
}
