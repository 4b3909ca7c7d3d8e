use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use eframe::egui;
use egui::{Color32, ColorImage, TextureHandle, TextureOptions};
use image::Rgba;

use crate::canvas::PixelBuffer;
use crate::command::EditorCommand;
use crate::components::tools::{MAX_BRUSH_SIZE, QUICK_PALETTE, Tool, parse_hex_color};
use crate::io::{IMPORT_EXTENSIONS, LocalStore};
use crate::ops::symmetry::SymmetryMode;
use crate::project::Project;
use crate::render::{ConsumerHandle, PreviewSurface, SharedTexture};
use crate::settings::EditorSettings;

/// Canvas backdrop, so transparent pixels stay visible.
const CANVAS_BACKDROP: Color32 = Color32::from_rgb(40, 40, 48);

pub struct NexusCapeApp {
    project: Project,
    settings: EditorSettings,

    // Composite consumers, owned here and registered weakly with the pipeline.
    canvas_feed: Rc<RefCell<SharedTexture>>,
    preview: Rc<RefCell<PreviewSurface>>,

    canvas_texture: Option<TextureHandle>,
    preview_texture: Option<TextureHandle>,

    /// Last pixel a stroke was applied at, so drags don't restamp in place.
    last_stroke_pixel: Option<(i32, i32)>,
    /// Opened on first local save.
    store: Option<LocalStore>,
    /// Last user-visible outcome (errors and saves).
    status: Option<String>,
}

impl NexusCapeApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: EditorSettings) -> Self {
        let mut project = Project::new(&settings);

        let canvas_feed = Rc::new(RefCell::new(SharedTexture::new()));
        let preview = Rc::new(RefCell::new(PreviewSurface::new(settings.preview_scale)));
        let feed_handle: ConsumerHandle = canvas_feed.clone();
        let preview_handle: ConsumerHandle = preview.clone();
        project.register_consumer(&feed_handle);
        project.register_consumer(&preview_handle);

        log::info!(
            "Editor ready: {}×{} canvas, {} undo steps",
            settings.canvas_width,
            settings.canvas_height,
            settings.max_undo_steps
        );

        Self {
            project,
            settings,
            canvas_feed,
            preview,
            canvas_texture: None,
            preview_texture: None,
            last_stroke_pixel: None,
            store: None,
            status: None,
        }
    }

    fn run(&mut self, command: EditorCommand) {
        if let Err(e) = self.project.dispatch(command) {
            self.status = Some(e.to_string());
        }
    }

    // ========================================================================
    // TEXTURES
    // ========================================================================

    fn sync_textures(&mut self, ctx: &egui::Context) {
        if let Some(composite) = self.canvas_feed.borrow_mut().take_update() {
            upload(ctx, &mut self.canvas_texture, "cape_canvas", to_color_image(&composite));
        }
        let mut preview = self.preview.borrow_mut();
        if preview.is_dirty() {
            let img = preview.image();
            let color_image =
                ColorImage::from_rgba_unmultiplied([img.width() as usize, img.height() as usize], img.as_raw());
            upload(ctx, &mut self.preview_texture, "cape_preview", color_image);
            preview.mark_clean();
        }
    }

    // ========================================================================
    // PANELS
    // ========================================================================

    fn tools_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Tools");
        let current = self.project.state().tool;
        for &tool in Tool::all() {
            if ui.selectable_label(current == tool, tool.label()).clicked() && current != tool {
                self.run(EditorCommand::SetTool(tool));
            }
        }

        ui.separator();
        let mut size = self.project.state().brush_size();
        if ui.add(egui::Slider::new(&mut size, 1..=MAX_BRUSH_SIZE).text("Brush")).changed() {
            self.run(EditorCommand::SetBrushSize(size));
        }

        ui.label("Symmetry");
        let symmetry = self.project.state().symmetry;
        ui.horizontal(|ui| {
            for &mode in SymmetryMode::all() {
                if ui.selectable_label(symmetry == mode, mode.name()).clicked() && symmetry != mode {
                    self.run(EditorCommand::SetSymmetry(mode));
                }
            }
        });

        ui.separator();
        let c = self.project.state().color;
        let mut color = Color32::from_rgb(c[0], c[1], c[2]);
        ui.horizontal(|ui| {
            if egui::color_picker::color_edit_button_srgba(ui, &mut color, egui::color_picker::Alpha::Opaque)
                .changed()
            {
                self.run(EditorCommand::SetColor(Rgba([color.r(), color.g(), color.b(), 255])));
            }
            ui.monospace(self.project.state().color_hex());
        });
        ui.horizontal_wrapped(|ui| {
            for hex in QUICK_PALETTE {
                let Some(swatch) = parse_hex_color(hex) else { continue };
                let fill = Color32::from_rgb(swatch[0], swatch[1], swatch[2]);
                if ui
                    .add(egui::Button::new("").fill(fill).min_size(egui::vec2(18.0, 18.0)))
                    .on_hover_text(hex)
                    .clicked()
                {
                    self.run(EditorCommand::SetColor(swatch));
                }
            }
        });

        ui.separator();
        ui.horizontal(|ui| {
            if ui.add_enabled(self.project.history().can_undo(), egui::Button::new("Undo")).clicked() {
                self.run(EditorCommand::Undo);
            }
            if ui.add_enabled(self.project.history().can_redo(), egui::Button::new("Redo")).clicked() {
                self.run(EditorCommand::Redo);
            }
        });
        let history = self.project.history();
        ui.small(format!(
            "History {}/{} ({:.1} KiB)",
            history.undo_count(),
            history.max_history_size(),
            history.memory_usage() as f64 / 1024.0
        ));
        if ui.button("Clear all").clicked() {
            self.run(EditorCommand::ClearAll);
        }

        ui.separator();
        if ui.button("Import image…").clicked() {
            self.import_dialog();
        }
        if ui.button("Export PNG…").clicked() {
            self.export_dialog();
        }
        if ui.button("Save locally").clicked() {
            self.save_local();
        }

        if let Some(store) = &self.store
            && !store.is_empty()
        {
            ui.collapsing(format!("Saved capes ({})", store.len()), |ui| {
                for key in store.keys() {
                    ui.label(key);
                }
            });
        }

        if let Some(status) = &self.status {
            ui.separator();
            ui.label(status.as_str());
        }
    }

    fn layers_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Layers");
        let stack = self.project.stack();
        let active = stack.active_index();
        let can_delete = stack.len() > 1;
        let mut action = None;

        // Top layer first, as it stacks visually.
        for (index, layer) in stack.layers().iter().enumerate().rev() {
            ui.horizontal(|ui| {
                let eye = if layer.visible { "👁" } else { "–" };
                if ui.small_button(eye).on_hover_text("Toggle visibility").clicked() {
                    action = Some(EditorCommand::ToggleVisibility(index));
                }
                if ui.selectable_label(index == active, layer.name.as_str()).clicked() {
                    action = Some(EditorCommand::SelectLayer(index));
                }
                if ui.add_enabled(can_delete, egui::Button::new("🗑").small()).clicked() {
                    action = Some(EditorCommand::DeleteLayer(index));
                }
            });
        }

        let len = stack.len();
        ui.horizontal(|ui| {
            if ui.button("Add").clicked() {
                action = Some(EditorCommand::AddLayer);
            }
            if ui.add_enabled(len > 1, egui::Button::new("Merge top")).clicked() {
                action = Some(EditorCommand::MergeTop);
            }
        });
        ui.horizontal(|ui| {
            if ui.add_enabled(active + 1 < len, egui::Button::new("Move up")).clicked() {
                action = Some(EditorCommand::MoveLayer { from: active, to: active + 1 });
            }
            if ui.add_enabled(active > 0, egui::Button::new("Move down")).clicked() {
                action = Some(EditorCommand::MoveLayer { from: active, to: active.saturating_sub(1) });
            }
        });

        if let Some(command) = action {
            self.run(command);
        }

        ui.separator();
        ui.label("Preview");
        if let Some(tex) = &self.preview_texture {
            let size = tex.size_vec2();
            let width = ui.available_width().min(size.x);
            ui.image((tex.id(), egui::vec2(width, width * size.y / size.x)));
        }
    }

    fn canvas_panel(&mut self, ui: &mut egui::Ui) {
        let (w, h) = (self.project.stack().width() as f32, self.project.stack().height() as f32);
        let avail = ui.available_size();
        let fit = (avail.x / w).min(avail.y / h).floor().max(1.0);
        let zoom = (self.settings.canvas_zoom as f32).min(fit);

        let (rect, response) = ui.allocate_exact_size(egui::vec2(w * zoom, h * zoom), egui::Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, CANVAS_BACKDROP);
        if let Some(tex) = &self.canvas_texture {
            let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            painter.image(tex.id(), rect, uv, Color32::WHITE);
        }

        let pressed = response.is_pointer_button_down_on();
        let pixel = response.interact_pointer_pos().map(|pos| {
            let local = (pos - rect.min) / zoom;
            (local.x.floor() as i32, local.y.floor() as i32)
        });

        match (pressed, pixel) {
            (true, Some((x, y))) if !self.project.is_stroke_active() => {
                self.last_stroke_pixel = Some((x, y));
                self.run(EditorCommand::StrokeBegin { x, y });
            }
            (true, Some((x, y))) => {
                if self.last_stroke_pixel != Some((x, y)) {
                    self.last_stroke_pixel = Some((x, y));
                    self.run(EditorCommand::StrokeMove { x, y });
                }
            }
            (false, _) if self.project.is_stroke_active() => {
                self.last_stroke_pixel = None;
                self.run(EditorCommand::StrokeEnd);
            }
            _ => {}
        }
    }

    // ========================================================================
    // FILES
    // ========================================================================

    fn import_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", IMPORT_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        self.status = match self.project.import_file(&path) {
            Ok(()) => None,
            Err(e) => Some(format!("Import failed: {}", e)),
        };
    }

    fn export_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(&self.settings.export_file_name)
            .add_filter("PNG", &["png"])
            .save_file()
        else {
            return;
        };
        self.status = Some(match self.project.export_png(&path) {
            Ok(()) => format!("Exported {}", path.display()),
            Err(e) => format!("Export failed: {}", e),
        });
    }

    fn save_local(&mut self) {
        if self.store.is_none() {
            match LocalStore::open(&self.settings.store_path) {
                Ok(store) => self.store = Some(store),
                Err(e) => {
                    log::error!("Could not open local store: {}", e);
                    self.status = Some(format!("Local store unavailable: {}", e));
                    return;
                }
            }
        }
        let Some(store) = self.store.as_mut() else { return };
        self.status = Some(match self.project.save_local(store) {
            Ok(key) => format!("Saved as {}", key),
            Err(e) => format!("Save failed: {}", e),
        });
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let (undo, redo) = ctx.input(|i| {
            let cmd = i.modifiers.command;
            (
                cmd && !i.modifiers.shift && i.key_pressed(egui::Key::Z),
                cmd && (i.key_pressed(egui::Key::Y) || (i.modifiers.shift && i.key_pressed(egui::Key::Z))),
            )
        });
        if undo {
            self.run(EditorCommand::Undo);
        } else if redo {
            self.run(EditorCommand::Redo);
        }
    }
}

impl eframe::App for NexusCapeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(format!(
            "NexusCape - {}",
            self.project.display_title()
        )));

        self.handle_shortcuts(ctx);
        self.project.tick(Instant::now());
        self.sync_textures(ctx);

        egui::SidePanel::left("tools_panel")
            .resizable(false)
            .show(ctx, |ui| self.tools_panel(ui));

        egui::SidePanel::right("layers_panel")
            .default_width(220.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.layers_panel(ui));
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| self.canvas_panel(ui));
        });

        // Strokes and commands above may have republished; show them this frame.
        self.sync_textures(ctx);
        ctx.request_repaint_after(self.settings.refresh_interval());
    }
}

fn to_color_image(buffer: &PixelBuffer) -> ColorImage {
    let (w, h) = buffer.dimensions();
    ColorImage::from_rgba_unmultiplied([w as usize, h as usize], buffer.as_raw())
}

fn upload(ctx: &egui::Context, slot: &mut Option<TextureHandle>, name: &str, image: ColorImage) {
    match slot {
        Some(tex) => tex.set(image, TextureOptions::NEAREST),
        None => *slot = Some(ctx.load_texture(name, image, TextureOptions::NEAREST)),
    }
}
