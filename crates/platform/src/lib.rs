//! Platform layer: window + event loop, the orbit camera, the model
//! picker UI, and the transactional model swap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use asset::model::{discover_models, load_model};
use corelib::camera::Camera;
use corelib::transform::Transform;
use corelib::{vec3, Vec3};
use renderer::{EguiFrame, GpuState, SceneModel};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

pub struct ViewerOptions {
    pub backends: wgpu::Backends,
    pub show_fps: bool,
    pub width: u32,
    pub height: u32,
    /// Directory scanned (recursively) for model presets.
    pub assets_dir: PathBuf,
}

/// Orbit camera state: yaw/pitch around a target, zoom along the view
/// ray. Pitch is clamped shy of the poles so `up` stays well-defined.
struct OrbitCamera {
    target: Vec3,
    yaw: f32,
    pitch: f32,
    distance: f32,
}

impl OrbitCamera {
    const MIN_DISTANCE: f32 = 0.2;
    const MAX_DISTANCE: f32 = 200.0;

    fn new() -> Self {
        Self {
            target: Vec3::ZERO,
            yaw: 0.6,
            pitch: 0.4,
            distance: 5.0,
        }
    }

    fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * 0.01;
        self.pitch = (self.pitch + dy * 0.01).clamp(-1.54, 1.54);
    }

    fn zoom(&mut self, amount: f32) {
        self.distance =
            (self.distance * (1.0 - amount * 0.1)).clamp(Self::MIN_DISTANCE, Self::MAX_DISTANCE);
    }

    fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        self.target + vec3(cp * sy, sp, cp * cy) * self.distance
    }

    fn camera(&self, aspect: f32) -> Camera {
        Camera::new_perspective(
            self.eye(),
            self.target,
            Vec3::Y,
            60f32.to_radians(),
            0.1,
            1000.0,
            aspect,
        )
    }
}

enum UiAction {
    Load(usize),
    Unload,
}

struct ViewerApp {
    options: ViewerOptions,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    egui_ctx: egui::Context,
    egui_state: Option<egui_winit::State>,

    camera: OrbitCamera,
    object: Transform,
    scene: SceneModel,
    presets: Vec<PathBuf>,
    selected: Option<usize>,
    status: String,

    dragging: bool,
    last_cursor: Option<(f64, f64)>,

    frames: u32,
    fps_timer: Instant,
}

impl ViewerApp {
    fn new(options: ViewerOptions) -> Self {
        let presets = discover_models(&options.assets_dir);
        log::info!(
            "Found {} model preset(s) under {}",
            presets.len(),
            options.assets_dir.display()
        );
        Self {
            options,
            window: None,
            gpu: None,
            egui_ctx: egui::Context::default(),
            egui_state: None,
            camera: OrbitCamera::new(),
            object: Transform::identity(),
            scene: SceneModel::Empty,
            presets,
            selected: None,
            status: String::from("No model loaded"),
            dragging: false,
            last_cursor: None,
            frames: 0,
            fps_timer: Instant::now(),
        }
    }

    /// Load-then-swap: the current model survives any failure here.
    fn load_preset(&mut self, index: usize) {
        let Some(gpu) = &self.gpu else { return };
        let Some(path) = self.presets.get(index).cloned() else {
            return;
        };
        if !path.exists() {
            log::error!("Preset vanished: {}", path.display());
            self.status = format!("Missing: {}", path.display());
            return;
        }
        match load_model(&path) {
            Ok(data) => {
                let uploaded = gpu.upload_model(&data);
                self.scene = SceneModel::from_parts(data.kind, uploaded);
                self.selected = Some(index);
                self.status = format!(
                    "{} ({} meshes)",
                    path.file_name().and_then(|n| n.to_str()).unwrap_or("?"),
                    self.scene.mesh_count()
                );
            }
            Err(e) => {
                log::error!("Failed to load {}: {e}", path.display());
                self.status = format!("Load failed: {e}");
            }
        }
    }

    fn run_ui(&self, raw_input: egui::RawInput) -> (egui::FullOutput, Option<UiAction>) {
        let mut action = None;
        let presets = &self.presets;
        let selected = self.selected;
        let scene_empty = self.scene.is_empty();
        let status = self.status.clone();

        let ctx = self.egui_ctx.clone();
        let output = ctx.run(raw_input, |ctx| {
            egui::Window::new("Models")
                .default_width(260.0)
                .show(ctx, |ui| {
                    if presets.is_empty() {
                        ui.label("No .gltf/.glb/.fbx files found");
                    }
                    for (i, path) in presets.iter().enumerate() {
                        let name = path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("<invalid name>");
                        if ui.selectable_label(selected == Some(i), name).clicked() {
                            action = Some(UiAction::Load(i));
                        }
                    }
                    ui.separator();
                    if ui
                        .add_enabled(!scene_empty, egui::Button::new("Unload"))
                        .clicked()
                    {
                        action = Some(UiAction::Unload);
                    }
                    ui.label(&status);
                });
        });
        (output, action)
    }

    fn redraw(&mut self) {
        let Some(window) = self.window.clone() else {
            return;
        };

        let (full_output, action) = {
            let Some(state) = &mut self.egui_state else {
                return;
            };
            let raw_input = state.take_egui_input(&window);
            self.run_ui(raw_input)
        };
        match action {
            Some(UiAction::Load(i)) => self.load_preset(i),
            Some(UiAction::Unload) => {
                self.scene = SceneModel::Empty;
                self.selected = None;
                self.status = String::from("No model loaded");
            }
            None => {}
        }

        if let Some(state) = &mut self.egui_state {
            state.handle_platform_output(&window, full_output.platform_output);
        }
        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let egui_frame = EguiFrame {
            primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point: full_output.pixels_per_point,
        };

        let Some(gpu) = &mut self.gpu else { return };
        let camera = self.camera.camera(gpu.aspect());
        match gpu.render(&self.scene, &camera, &self.object, Some(egui_frame)) {
            Ok(()) => {}
            Err(e) if GpuState::is_surface_lost(&e) => {
                log::warn!("Surface lost/outdated; reconfiguring");
                gpu.recreate_surface();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of GPU memory; shutting down");
            }
            Err(e) => log::warn!("Frame error: {e:?}"),
        }

        self.frames += 1;
        if self.options.show_fps {
            let elapsed = self.fps_timer.elapsed().as_secs_f32();
            if elapsed >= 1.0 {
                let fps = self.frames as f32 / elapsed;
                let shown = match self.selected.and_then(|i| self.presets.get(i)) {
                    Some(path) => path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("model")
                        .to_string(),
                    None => String::from("no model"),
                };
                window.set_title(&format!("Veles3D | {shown} | {fps:.0} FPS"));
                self.frames = 0;
                self.fps_timer = Instant::now();
            }
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title("Veles3D")
            .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .expect("Failed to create window"),
        );
        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let gpu = pollster::block_on(GpuState::new(window.clone(), self.options.backends));
        let egui_state = egui_winit::State::new(
            self.egui_ctx.clone(),
            self.egui_ctx.viewport_id(),
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        self.gpu = Some(gpu);
        self.egui_state = Some(egui_state);
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if let Some(state) = &mut self.egui_state {
            let response = state.on_window_event(&window, &event);
            if response.repaint {
                window.request_redraw();
            }
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.dragging = state == ElementState::Pressed;
                    if !self.dragging {
                        self.last_cursor = None;
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.dragging && !self.egui_ctx.wants_pointer_input() {
                    if let Some((lx, ly)) = self.last_cursor {
                        self.camera
                            .rotate((position.x - lx) as f32, (position.y - ly) as f32);
                    }
                    self.last_cursor = Some((position.x, position.y));
                } else {
                    self.last_cursor = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if !self.egui_ctx.wants_pointer_input() {
                    let amount = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                    };
                    self.camera.zoom(amount);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Run the viewer; returns when the window is closed.
pub fn run(options: ViewerOptions) -> Result<()> {
    let event_loop: EventLoop<()> =
        EventLoop::new().map_err(|e| anyhow::anyhow!("Failed to create event loop: {e}"))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(options);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow::anyhow!("Event loop error: {e:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_pitch_is_clamped() {
        let mut cam = OrbitCamera::new();
        for _ in 0..10_000 {
            cam.rotate(0.0, 100.0);
        }
        assert!(cam.pitch <= 1.54);
        let eye = cam.eye();
        assert!(eye.is_finite());
    }

    #[test]
    fn zoom_respects_distance_bounds() {
        let mut cam = OrbitCamera::new();
        for _ in 0..1_000 {
            cam.zoom(10.0);
        }
        assert!(cam.distance >= OrbitCamera::MIN_DISTANCE);
        for _ in 0..1_000 {
            cam.zoom(-10.0);
        }
        assert!(cam.distance <= OrbitCamera::MAX_DISTANCE);
    }
}
