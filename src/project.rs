use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::Rgba;
use uuid::Uuid;

use crate::canvas::{LayerStack, PixelBuffer};
use crate::command::EditorCommand;
use crate::components::history::HistoryManager;
use crate::components::tools::{EditorState, Tool};
use crate::error::EditorError;
use crate::io::{self, LocalStore};
use crate::ops::symmetry::apply_symmetry;
use crate::render::{ConsumerHandle, RenderPipeline};
use crate::settings::EditorSettings;

/// The single open cape: its layers, history, tool state and render output.
pub struct Project {
    pub id: Uuid,
    /// Display name.
    pub name: String,
    stack: LayerStack,
    history: HistoryManager,
    state: EditorState,
    pipeline: RenderPipeline,
    /// A pointer stroke is in progress.
    stroke_active: bool,
    pub is_dirty: bool,
}

impl Project {
    pub fn new(settings: &EditorSettings) -> Self {
        let stack = LayerStack::new(settings.canvas_width, settings.canvas_height);
        let pipeline = RenderPipeline::new(&stack, settings.refresh_interval());
        Self {
            id: Uuid::new_v4(),
            name: "Untitled cape".to_string(),
            stack,
            history: HistoryManager::new(settings.max_undo_steps),
            state: EditorState::new(settings.brush_size, settings.color),
            pipeline,
            stroke_active: false,
            is_dirty: false,
        }
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn is_stroke_active(&self) -> bool {
        self.stroke_active
    }

    /// Latest published composite of the visible layers.
    pub fn composite(&self) -> Arc<PixelBuffer> {
        self.pipeline.latest()
    }

    pub fn generation(&self) -> u64 {
        self.pipeline.generation()
    }

    pub fn register_consumer(&mut self, consumer: &ConsumerHandle) {
        self.pipeline.register(consumer);
    }

    /// Timer hook, see [`RenderPipeline::tick`].
    pub fn tick(&mut self, now: Instant) -> bool {
        self.pipeline.tick(&self.stack, now)
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Apply one command. Commands that change layer content take a history
    /// snapshot first; rejected commands leave no history entry.
    pub fn dispatch(&mut self, command: EditorCommand) -> Result<(), EditorError> {
        let label = command.label();
        let result = self.apply(command);
        match &result {
            Ok(()) => log::debug!("{} applied", label),
            Err(e) if e.is_invalid_operation() => log::warn!("{} rejected: {}", label, e),
            Err(e) => log::error!("{} failed: {}", label, e),
        }
        result
    }

    fn apply(&mut self, command: EditorCommand) -> Result<(), EditorError> {
        if command == EditorCommand::MergeTop && self.stack.len() < 2 {
            log::debug!("merge skipped, only one layer");
            return Ok(());
        }
        if command.records_history(self.state.tool) {
            self.validate(&command)?;
            self.history.record(&self.stack)?;
        }

        match command {
            EditorCommand::StrokeBegin { x, y } => {
                self.stroke_active = true;
                self.apply_tool(x, y);
            }
            EditorCommand::StrokeMove { x, y } => {
                if self.stroke_active {
                    self.apply_tool(x, y);
                }
            }
            EditorCommand::StrokeEnd => {
                self.stroke_active = false;
            }
            EditorCommand::SelectLayer(index) => {
                self.stack.select_layer(index)?;
            }
            EditorCommand::AddLayer => {
                let name = self.stack.next_layer_name();
                self.stack.add_layer(name);
                self.changed();
            }
            EditorCommand::DeleteLayer(index) => {
                let removed = self.stack.delete_layer(index)?;
                log::info!("Deleted layer '{}'", removed.name);
                self.changed();
            }
            EditorCommand::ToggleVisibility(index) => {
                self.stack.toggle_visibility(index)?;
                self.pipeline.recomposite(&self.stack);
            }
            EditorCommand::MoveLayer { from, to } => {
                self.stack.move_layer(from, to)?;
                self.changed();
            }
            EditorCommand::MergeTop => {
                if self.stack.merge_top() {
                    self.changed();
                }
            }
            EditorCommand::ClearAll => {
                self.stack.clear_all();
                self.changed();
            }
            EditorCommand::Import(buffer) => {
                let layer = self.stack.active_layer_mut();
                layer.pixels.clear();
                layer.pixels.draw_over(&buffer);
                self.changed();
            }
            EditorCommand::Undo => self.step_history(true)?,
            EditorCommand::Redo => self.step_history(false)?,
            EditorCommand::SetTool(tool) => {
                self.stroke_active = false;
                self.state.tool = tool;
            }
            EditorCommand::SetColor(color) => self.state.color = color,
            EditorCommand::SetBrushSize(size) => self.state.set_brush_size(size),
            EditorCommand::SetSymmetry(mode) => self.state.symmetry = mode,
        }
        Ok(())
    }

    /// Reject commands that would fail, before a snapshot is taken.
    fn validate(&self, command: &EditorCommand) -> Result<(), EditorError> {
        match command {
            EditorCommand::DeleteLayer(index) => self.stack.can_delete(*index),
            EditorCommand::MoveLayer { from, to } => {
                let len = self.stack.len();
                if *from >= len || *to >= len {
                    return Err(EditorError::invalid(format!(
                        "cannot move layer {} to {} with {} layers",
                        from, to, len
                    )));
                }
                Ok(())
            }
            EditorCommand::Import(buffer) if buffer.dimensions() != (self.stack.width(), self.stack.height()) => {
                let (w, h) = buffer.dimensions();
                Err(EditorError::decode(format!(
                    "imported image is {}×{}, canvas is {}×{}",
                    w,
                    h,
                    self.stack.width(),
                    self.stack.height()
                )))
            }
            _ => Ok(()),
        }
    }

    fn apply_tool(&mut self, x: i32, y: i32) {
        let EditorState { tool, color, symmetry, .. } = self.state;
        let size = self.state.brush_size();
        if tool == Tool::ColorSampler {
            if let Some(p) = self.pipeline.latest().sample(x, y) {
                self.state.color = Rgba([p[0], p[1], p[2], 255]);
            }
            return;
        }

        let pixels = &mut self.stack.active_layer_mut().pixels;
        let touched = match tool {
            Tool::PixelBrush => {
                pixels.paint_square(x, y, size, color);
                true
            }
            Tool::Eraser => {
                pixels.erase_square(x, y, size);
                true
            }
            Tool::Fill | Tool::ColorSampler => pixels.flood_fill(x, y, color),
        };
        if !touched {
            log::debug!("fill at ({}, {}) changed nothing", x, y);
            return;
        }
        if tool.uses_symmetry() && symmetry.is_active() {
            apply_symmetry(pixels, symmetry);
        }
        self.changed();
    }

    /// Restore the previous (`undo`) or next snapshot. The restore resolves
    /// fully before anything touches the stack.
    fn step_history(&mut self, undo: bool) -> Result<(), EditorError> {
        self.stroke_active = false;
        let pending = if undo {
            self.history.undo(&self.stack)?
        } else {
            self.history.redo(&self.stack)?
        };
        let Some(pending) = pending else {
            log::debug!("nothing to {}", if undo { "undo" } else { "redo" });
            return Ok(());
        };
        let restored = pending.wait()?;
        restored.apply_to(&mut self.stack);
        self.changed();
        Ok(())
    }

    fn changed(&mut self) {
        self.pipeline.recomposite(&self.stack);
        self.is_dirty = true;
    }

    // ========================================================================
    // FILES
    // ========================================================================

    /// Decode an image file and import it into the active layer. Decoding
    /// happens first; a bad file changes nothing.
    pub fn import_file(&mut self, path: &Path) -> Result<(), EditorError> {
        let buffer = io::load_image_file(path, self.stack.width(), self.stack.height())
            .inspect_err(|e| log::error!("Import of {} failed: {}", path.display(), e))?;
        self.dispatch(EditorCommand::Import(buffer))
    }

    /// Write the visible composite as a PNG file.
    pub fn export_png(&mut self, path: &Path) -> Result<(), EditorError> {
        let composite = self.pipeline.recomposite(&self.stack);
        io::export_png(&composite, path)?;
        self.mark_clean();
        Ok(())
    }

    /// Store the visible composite in the local store. Returns its key.
    pub fn save_local(&mut self, store: &mut LocalStore) -> Result<String, EditorError> {
        let composite = self.pipeline.recomposite(&self.stack);
        let key = store.save_png(io::encode_png(&composite)?)?;
        self.mark_clean();
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::symmetry::SymmetryMode;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn project() -> Project {
        Project::new(&EditorSettings::default())
    }

    fn stroke(p: &mut Project, points: &[(i32, i32)]) {
        let (x, y) = points[0];
        p.dispatch(EditorCommand::StrokeBegin { x, y }).unwrap();
        for &(x, y) in &points[1..] {
            p.dispatch(EditorCommand::StrokeMove { x, y }).unwrap();
        }
        p.dispatch(EditorCommand::StrokeEnd).unwrap();
    }

    #[test]
    fn one_snapshot_per_stroke() {
        let mut p = project();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        stroke(&mut p, &[(1, 1), (2, 1), (3, 1)]);
        assert_eq!(p.history().undo_count(), 1);
        assert_eq!(p.composite().get(3, 1), Some(RED));
        assert!(p.is_dirty);
    }

    #[test]
    fn moves_without_a_stroke_are_ignored() {
        let mut p = project();
        p.dispatch(EditorCommand::StrokeMove { x: 4, y: 4 }).unwrap();
        assert!(p.stack().active_layer().pixels.is_blank());
        assert_eq!(p.history().undo_count(), 0);
    }

    #[test]
    fn every_application_recomposites() {
        let mut p = project();
        let g0 = p.generation();
        stroke(&mut p, &[(1, 1), (2, 2)]);
        assert_eq!(p.generation(), g0 + 2);
    }

    #[test]
    fn sampler_reads_composite_without_history() {
        let mut p = project();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        stroke(&mut p, &[(5, 5)]);
        p.dispatch(EditorCommand::AddLayer).unwrap();
        p.dispatch(EditorCommand::SetColor(Rgba([0, 0, 0, 255]))).unwrap();
        let recorded = p.history().undo_count();

        p.dispatch(EditorCommand::SetTool(Tool::ColorSampler)).unwrap();
        stroke(&mut p, &[(5, 5)]);
        assert_eq!(p.state().color, RED);
        stroke(&mut p, &[(-1, 500)]);
        assert_eq!(p.state().color, RED);
        assert_eq!(p.history().undo_count(), recorded);
    }

    #[test]
    fn brush_stroke_mirrors_with_symmetry() {
        let mut p = project();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        p.dispatch(EditorCommand::SetSymmetry(SymmetryMode::Vertical)).unwrap();
        stroke(&mut p, &[(0, 3)]);
        let pixels = &p.stack().active_layer().pixels;
        assert_eq!(pixels.get(0, 3), Some(RED));
        assert_eq!(pixels.get(63, 3), Some(RED));
    }

    #[test]
    fn fill_ignores_symmetry() {
        let mut p = project();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        stroke(&mut p, &[(0, 0), (0, 1), (0, 2)]);
        p.dispatch(EditorCommand::SetSymmetry(SymmetryMode::Vertical)).unwrap();
        p.dispatch(EditorCommand::SetTool(Tool::Fill)).unwrap();
        p.dispatch(EditorCommand::SetColor(Rgba([0, 0, 255, 255]))).unwrap();
        stroke(&mut p, &[(0, 0)]);
        let pixels = &p.stack().active_layer().pixels;
        assert_eq!(pixels.get(0, 2), Some(Rgba([0, 0, 255, 255])));
        assert_eq!(pixels.get(63, 0), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn visibility_toggle_skips_history_but_recomposites() {
        let mut p = project();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        stroke(&mut p, &[(0, 0)]);
        let recorded = p.history().undo_count();
        p.dispatch(EditorCommand::ToggleVisibility(0)).unwrap();
        assert_eq!(p.history().undo_count(), recorded);
        assert!(p.composite().is_blank());
    }

    #[test]
    fn merge_with_one_layer_is_silent_noop() {
        let mut p = project();
        let g0 = p.generation();
        p.dispatch(EditorCommand::MergeTop).unwrap();
        assert_eq!(p.history().undo_count(), 0);
        assert_eq!(p.generation(), g0);
    }

    #[test]
    fn wrong_sized_import_is_rejected() {
        let mut p = project();
        let err = p.dispatch(EditorCommand::Import(PixelBuffer::new(3, 3))).unwrap_err();
        assert!(matches!(err, EditorError::DecodeFailure(_)));
        assert!(!p.history().can_undo());
    }

    #[test]
    fn repeated_fill_does_not_republish() {
        let mut p = project();
        p.dispatch(EditorCommand::SetTool(Tool::Fill)).unwrap();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        stroke(&mut p, &[(0, 0)]);
        let g1 = p.generation();
        p.mark_clean();

        stroke(&mut p, &[(0, 0)]);
        assert_eq!(p.generation(), g1);
        assert!(!p.is_dirty);
        assert_eq!(p.history().undo_count(), 2);
    }

    #[test]
    fn failed_undo_leaves_canvas_untouched() {
        let mut p = project();
        p.dispatch(EditorCommand::SetColor(RED)).unwrap();
        stroke(&mut p, &[(2, 2)]);
        p.history.corrupt_newest_undo();
        p.mark_clean();
        let before = p.stack().active_layer().pixels.clone();
        let generation = p.generation();

        let err = p.dispatch(EditorCommand::Undo).unwrap_err();
        assert!(matches!(err, EditorError::DecodeFailure(_)));
        assert_eq!(p.stack().active_layer().pixels, before);
        assert_eq!(p.generation(), generation);
        assert!(!p.is_dirty);
        assert_eq!(p.history().undo_count(), 0);
        assert_eq!(p.history().redo_count(), 1);
    }

    #[test]
    fn undo_on_fresh_project_is_noop() {
        let mut p = project();
        p.dispatch(EditorCommand::Undo).unwrap();
        p.dispatch(EditorCommand::Redo).unwrap();
        assert_eq!(p.stack().len(), 1);
    }

    #[test]
    fn display_title_marks_dirty() {
        let mut p = project();
        assert_eq!(p.display_title(), "Untitled cape");
        p.dispatch(EditorCommand::AddLayer).unwrap();
        assert_eq!(p.display_title(), "Untitled cape*");
    }
}
