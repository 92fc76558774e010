use anyhow::{Context as _, Result};
use cafescene_assets::{apply_model, model_transform, ModelRequest};
use cafescene_common::{ModelConfig, SceneConfig};
use cafescene_input::{Gesture, PointerButton, PointerTracker};
use cafescene_kernel::{FrameLoop, FrameReport, Stage};
use cafescene_render::DrawList;
use cafescene_render_wgpu::WgpuRenderer;
use cafescene_tools::{SceneInspector, StageSummary};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec2;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "cafescene-desktop", about = "Animated coffee shop viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene configuration file (YAML); defaults reproduce the stock scene
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Surface size for a window, with the display scale factor capped at
/// `max_ratio`.
fn surface_size(physical: PhysicalSize<u32>, scale_factor: f64, max_ratio: f32) -> (u32, u32) {
    let scale = scale_factor.max(f64::EPSILON);
    let ratio = scale.min(max_ratio.max(1.0) as f64);
    let fit = |px: u32| ((px as f64 / scale * ratio).round() as u32).max(1);
    (fit(physical.width), fit(physical.height))
}

fn pointer_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

/// Everything bound to the window surface.
struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    renderer: WgpuRenderer,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

/// One live display area: window, surface, stage and frame loop.
///
/// Dropping a viewport tears it down; no frame runs after that.
struct Viewport {
    gpu: Option<Gpu>,
    window: Arc<Window>,
    egui_ctx: EguiContext,
    stage: Stage,
    frame_loop: FrameLoop,
    model_request: Option<ModelRequest>,
    model_config: ModelConfig,
    max_pixel_ratio: f32,
    pointer: PointerTracker,
    show_inspector: bool,
}

impl Viewport {
    fn activate(event_loop: &ActiveEventLoop, config: &SceneConfig) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(config.viewport.title.clone())
            .with_inner_size(PhysicalSize::new(config.viewport.width, config.viewport.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no compatible GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("cafescene_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;

        let (width, height) = surface_size(
            window.inner_size(),
            window.scale_factor(),
            config.viewport.max_pixel_ratio,
        );
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let renderer = WgpuRenderer::new(&device, &queue, surface_format, width, height);

        let egui_ctx = EguiContext::default();
        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let mut stage = Stage::from_config(config);
        let physical = window.inner_size();
        stage.camera.resize(physical.width, physical.height);

        let model_request = if config.model.enabled {
            match ModelRequest::spawn(&config.model.path) {
                Ok(request) => Some(request),
                Err(e) => {
                    tracing::warn!("could not start model load: {e}");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            width,
            height,
            backend = adapter.get_info().backend.to_str(),
            "viewport activated"
        );

        let viewport = Self {
            gpu: Some(Gpu {
                surface,
                device,
                queue,
                config: surface_config,
                renderer,
                egui_winit,
                egui_renderer,
            }),
            window,
            egui_ctx,
            stage,
            frame_loop: FrameLoop::new(config.max_frame_delta),
            model_request,
            model_config: config.model.clone(),
            max_pixel_ratio: config.viewport.max_pixel_ratio,
            pointer: PointerTracker::new(),
            show_inspector: false,
        };
        viewport.window.request_redraw();
        Ok(viewport)
    }

    /// Stop the frame loop and release the model request and every GPU
    /// resource. Safe to call more than once.
    fn teardown(&mut self) {
        if self.gpu.is_none() {
            return;
        }
        self.frame_loop.stop();
        self.model_request = None;
        self.pointer.reset();
        self.gpu = None;
        tracing::info!(frames = self.stage.clock.frame(), "viewport torn down");
    }

    fn resize(&mut self, physical: PhysicalSize<u32>) {
        if physical.width == 0 || physical.height == 0 {
            return;
        }
        let (width, height) =
            surface_size(physical, self.window.scale_factor(), self.max_pixel_ratio);
        if let Some(gpu) = &mut self.gpu {
            gpu.config.width = width;
            gpu.config.height = height;
            gpu.surface.configure(&gpu.device, &gpu.config);
            gpu.renderer.resize(&gpu.device, width, height);
        }
        self.stage.camera.resize(physical.width, physical.height);
        tracing::debug!(width, height, "surface resized");
    }

    fn gesture(&mut self, gesture: Option<Gesture>) {
        if let Some(gesture) = gesture {
            self.stage.camera.apply(gesture);
        }
    }

    /// Returns true when the viewport asks to be closed.
    fn handle_event(&mut self, event: &WindowEvent) -> bool {
        if let Some(gpu) = &mut self.gpu {
            if gpu.egui_winit.on_window_event(&self.window, event).consumed {
                return false;
            }
        }

        match event {
            WindowEvent::Resized(size) => self.resize(*size),
            WindowEvent::ScaleFactorChanged { .. } => self.resize(self.window.inner_size()),
            WindowEvent::Focused(false) => self.pointer.reset(),
            WindowEvent::MouseInput { button, state, .. } => {
                if let Some(button) = pointer_button(*button) {
                    self.pointer.button(button, *state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let gesture = self
                    .pointer
                    .cursor_moved(Vec2::new(position.x as f32, position.y as f32));
                self.gesture(gesture);
            }
            WindowEvent::CursorLeft { .. } => self.pointer.cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let gesture = match delta {
                    MouseScrollDelta::LineDelta(_, y) => self.pointer.wheel_lines(*y),
                    MouseScrollDelta::PixelDelta(p) => self.pointer.wheel_pixels(p.y as f32),
                };
                self.gesture(gesture);
            }
            WindowEvent::PinchGesture { delta, .. } => {
                self.gesture(Some(Gesture::Pinch {
                    scale: 1.0 + *delta as f32,
                }));
            }
            WindowEvent::Touch(touch) => {
                let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                match touch.phase {
                    TouchPhase::Started => self.pointer.touch_start(touch.id, position),
                    TouchPhase::Moved => {
                        let gesture = self.pointer.touch_moved(touch.id, position);
                        self.gesture(gesture);
                    }
                    TouchPhase::Ended | TouchPhase::Cancelled => self.pointer.touch_end(touch.id),
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key {
                KeyCode::F1 => self.show_inspector = !self.show_inspector,
                KeyCode::Escape => return true,
                _ => {}
            },
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
        false
    }

    fn poll_model(&mut self) {
        let Some(request) = &mut self.model_request else {
            return;
        };
        let Some(result) = request.poll() else {
            return;
        };
        let path = request.path().to_path_buf();
        self.model_request = None;
        let transform = model_transform(&self.model_config);
        apply_model(&mut self.stage, &path, result, transform);
    }

    fn redraw(&mut self) {
        self.poll_model();

        let Some(report) = self.frame_loop.tick(&mut self.stage, Instant::now()) else {
            return;
        };
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                self.window.request_redraw();
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                self.window.request_redraw();
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let frame = DrawList::collect(&self.stage);
        gpu.renderer
            .render(&gpu.device, &gpu.queue, &view, &self.stage.graph, &frame);

        let summary = self.show_inspector.then(|| SceneInspector::summary(&self.stage));
        let raw_input = gpu.egui_winit.take_egui_input(&self.window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if let Some(summary) = &summary {
                draw_overlay(ctx, summary, &report);
            }
        });
        gpu.egui_winit
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        // The surface may be smaller than the window when the pixel ratio is
        // capped; egui measures in window pixels.
        let window_width = self.window.inner_size().width.max(1) as f32;
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point * gpu.config.width as f32
                / window_width,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(&gpu.device, &gpu.queue, *id, image_delta);
        }
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
        gpu.egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        tracing::trace!(frame = report.frame, dt = report.dt, "frame presented");

        if self.frame_loop.is_running() {
            self.window.request_redraw();
        }
    }
}

impl Drop for Viewport {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn draw_overlay(ctx: &EguiContext, summary: &StageSummary, report: &FrameReport) {
    egui::SidePanel::left("inspector")
        .default_width(260.0)
        .show(ctx, |ui| {
            ui.heading("Coffee Mama");
            ui.separator();
            ui.label(format!(
                "Frame: {}  t={:.1}s  dt={:.1}ms",
                report.frame,
                report.elapsed,
                report.dt * 1000.0
            ));
            ui.label(format!(
                "Nodes: {} ({} meshes, {} groups)",
                summary.nodes, summary.meshes, summary.groups
            ));
            ui.label(format!(
                "Snow: {}  Steam: {}  Particles: {}  Cups: {}",
                summary.snowflakes, summary.steam_puffs, summary.particles, summary.cups
            ));
            ui.label(format!(
                "Camera: distance {:.2} eye ({:.1}, {:.1}, {:.1})",
                summary.camera_distance,
                summary.camera_eye[0],
                summary.camera_eye[1],
                summary.camera_eye[2]
            ));
            ui.label(format!(
                "Model: {}",
                if summary.model_loaded { "loaded" } else { "none" }
            ));
            if summary.out_of_band > 0 {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    format!("{} entities out of band", summary.out_of_band),
                );
            }

            ui.separator();
            ui.heading("Lights");
            for light in &summary.lights {
                let marker = if light.pulsing { " ~" } else { "" };
                ui.label(format!(
                    "{:<12} {:>6.3}{marker}",
                    light.name, light.intensity
                ));
            }

            ui.separator();
            ui.small("F1: Toggle Inspector | LMB: Orbit | RMB: Pan | Wheel: Zoom");
        });
}

struct App {
    config: SceneConfig,
    viewport: Option<Viewport>,
}

impl App {
    fn new(config: SceneConfig) -> Self {
        Self {
            config,
            viewport: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewport.is_some() {
            return;
        }
        match Viewport::activate(event_loop, &self.config) {
            Ok(viewport) => self.viewport = Some(viewport),
            Err(e) => {
                tracing::error!("failed to activate viewport: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.viewport = None;
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if matches!(event, WindowEvent::CloseRequested) {
            self.viewport = None;
            event_loop.exit();
            return;
        }
        let Some(viewport) = &mut self.viewport else {
            return;
        };
        if viewport.handle_event(&event) {
            self.viewport = None;
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.viewport = None;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match &cli.config {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };

    tracing::info!("cafescene-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_ratio_is_capped() {
        // 1280x720 logical at 3x
        let size = surface_size(PhysicalSize::new(3840, 2160), 3.0, 2.0);
        assert_eq!(size, (2560, 1440));
    }

    #[test]
    fn low_ratios_pass_through() {
        let size = surface_size(PhysicalSize::new(1920, 1080), 1.5, 2.0);
        assert_eq!(size, (1920, 1080));
    }

    #[test]
    fn surface_is_never_empty() {
        assert_eq!(surface_size(PhysicalSize::new(0, 0), 1.0, 2.0), (1, 1));
    }

    #[test]
    fn mouse_buttons_map_to_pointer_buttons() {
        assert_eq!(pointer_button(MouseButton::Left), Some(PointerButton::Primary));
        assert_eq!(pointer_button(MouseButton::Right), Some(PointerButton::Secondary));
        assert_eq!(pointer_button(MouseButton::Back), None);
    }
}
