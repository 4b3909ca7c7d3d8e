use image::Rgba;

use crate::canvas::PixelBuffer;
use crate::components::tools::Tool;
use crate::ops::symmetry::SymmetryMode;

/// Every user intent the editor understands. [`Project::dispatch`] is the
/// only way state changes.
///
/// [`Project::dispatch`]: crate::project::Project::dispatch
#[derive(Clone, Debug, PartialEq)]
pub enum EditorCommand {
    /// Pointer pressed on the canvas at a pixel coordinate.
    StrokeBegin { x: i32, y: i32 },
    /// Pointer dragged while pressed.
    StrokeMove { x: i32, y: i32 },
    StrokeEnd,

    SelectLayer(usize),
    AddLayer,
    DeleteLayer(usize),
    ToggleVisibility(usize),
    MoveLayer { from: usize, to: usize },
    MergeTop,
    ClearAll,
    /// Replace the active layer's content with an already canvas-sized image.
    Import(PixelBuffer),

    Undo,
    Redo,

    SetTool(Tool),
    SetColor(Rgba<u8>),
    SetBrushSize(u32),
    SetSymmetry(SymmetryMode),
}

impl EditorCommand {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            EditorCommand::StrokeBegin { .. } => "stroke-begin",
            EditorCommand::StrokeMove { .. } => "stroke-move",
            EditorCommand::StrokeEnd => "stroke-end",
            EditorCommand::SelectLayer(_) => "select-layer",
            EditorCommand::AddLayer => "add-layer",
            EditorCommand::DeleteLayer(_) => "delete-layer",
            EditorCommand::ToggleVisibility(_) => "toggle-visibility",
            EditorCommand::MoveLayer { .. } => "move-layer",
            EditorCommand::MergeTop => "merge-top",
            EditorCommand::ClearAll => "clear-all",
            EditorCommand::Import(_) => "import",
            EditorCommand::Undo => "undo",
            EditorCommand::Redo => "redo",
            EditorCommand::SetTool(_) => "set-tool",
            EditorCommand::SetColor(_) => "set-color",
            EditorCommand::SetBrushSize(_) => "set-brush-size",
            EditorCommand::SetSymmetry(_) => "set-symmetry",
        }
    }

    /// Whether the command takes a history snapshot before it applies.
    /// Stroke starts only do so for pixel-mutating tools.
    pub fn records_history(&self, tool: Tool) -> bool {
        match self {
            EditorCommand::StrokeBegin { .. } => tool.mutates_pixels(),
            EditorCommand::AddLayer
            | EditorCommand::DeleteLayer(_)
            | EditorCommand::MoveLayer { .. }
            | EditorCommand::MergeTop
            | EditorCommand::ClearAll
            | EditorCommand::Import(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_recording_table() {
        let begin = EditorCommand::StrokeBegin { x: 0, y: 0 };
        assert!(begin.records_history(Tool::PixelBrush));
        assert!(begin.records_history(Tool::Fill));
        assert!(!begin.records_history(Tool::ColorSampler));
        assert!(!EditorCommand::StrokeMove { x: 0, y: 0 }.records_history(Tool::PixelBrush));
        assert!(!EditorCommand::ToggleVisibility(0).records_history(Tool::PixelBrush));
        assert!(!EditorCommand::SelectLayer(0).records_history(Tool::PixelBrush));
        assert!(!EditorCommand::Undo.records_history(Tool::PixelBrush));
        assert!(EditorCommand::MergeTop.records_history(Tool::ColorSampler));
    }
}
