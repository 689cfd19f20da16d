// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod pause;
mod scene;

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use vesuv_core::{init_tracing, FrameCounter};
use vesuv_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::WindowId,
};
use vesuv_platform::PlatformWindow;
use vesuv_render::{FrameBackend, FrameLoop, FrameStatus, FramebufferSource, MAX_FRAMES_IN_FLIGHT};
use vesuv_render_vk::{
    vk, ContextOptions, DrawItem, FrameDescriptors, GraphicsPipeline, Mesh, PresenterOptions,
    RenderError, Texture, UniformBufferObject, UniformBuffers, VkPresenter,
};

use crate::config::{AppCfg, Args};
use crate::pause::PauseState;

/// GPU objects the demo scene draws with.
struct Scene {
    descriptors: FrameDescriptors,
    uniforms: UniformBuffers<UniformBufferObject, MAX_FRAMES_IN_FLIGHT>,
    texture: Texture,
    triangle: Mesh,
    quad: Mesh,
    pipeline: GraphicsPipeline,
}

/// Field order is teardown order: the backend drains the device when it is
/// dropped, so the scene's objects are never released while still in use.
struct Renderer<B: FrameBackend = VkPresenter<PlatformWindow>, S = Scene> {
    frames: FrameLoop<B>,
    scene: S,
}

impl<B: FrameBackend, S> Renderer<B, S> {
    /// Waits for the GPU, frees the scene, then tears down the backend.
    fn shutdown(mut self) -> Result<(), B::Error> {
        self.frames.backend_mut().wait_idle()?;
        let Self { frames, scene } = self;
        drop(scene);
        frames.cleanup()
    }
}

impl Renderer {
    fn new(window: PlatformWindow, cfg: &AppCfg) -> Result<Self> {
        let opts = PresenterOptions {
            context: ContextOptions {
                app_name: cfg.window.title.clone(),
                validation: cfg.render.validation,
            },
            prefer_mailbox: cfg.render.prefer_mailbox,
        };
        let presenter = VkPresenter::new(window, &opts)?;

        let ctx = presenter.context();
        let device = ctx.device();
        let pipeline = GraphicsPipeline::new(device, presenter.render_pass())?;
        let quad = Mesh::upload(
            ctx,
            presenter.command_pool(),
            &scene::QUAD_VERTICES,
            Some(&scene::QUAD_INDICES[..]),
        )?;
        let triangle = Mesh::upload(ctx, presenter.command_pool(), &scene::TRIANGLE_VERTICES, None)?;
        let pixels = scene::texture_pixels(cfg.render.texture.as_deref());
        let texture = Texture::upload(ctx, presenter.command_pool(), &pixels)?;
        let uniforms = UniformBuffers::new(device, &ctx.memory_properties())?;
        let descriptors = FrameDescriptors::new(device, pipeline.set_layout(), &uniforms, &texture)?;

        Ok(Self {
            frames: FrameLoop::new(presenter),
            scene: Scene {
                descriptors,
                uniforms,
                texture,
                triangle,
                quad,
                pipeline,
            },
        })
    }

    fn window(&self) -> &PlatformWindow {
        self.frames.backend().window()
    }

    fn draw(&mut self, elapsed_secs: f32) -> Result<FrameStatus, RenderError> {
        let scene = &mut self.scene;
        let binding = scene.descriptors.binding();
        let draws = [
            DrawItem {
                vertices: scene.quad.vertex_slice(),
                indices: scene.quad.index_slice(),
                descriptors: Some(binding),
            },
            DrawItem::new(scene.triangle.vertex_slice()).with_descriptors(binding),
        ];
        let pipeline = scene.pipeline.pipeline_ref();
        let extent: vk::Extent2D = self.frames.backend().swapchain().extent();
        let ubo = scene::transforms(elapsed_secs, extent.width, extent.height);

        let uniforms = &mut scene.uniforms;
        self.frames
            .draw_frame_with(&draws, &pipeline, |slot| uniforms.write(slot, &ubo))
    }
}

struct App {
    cfg: AppCfg,
    renderer: Option<Renderer>,
    started: Instant,
    fps: FrameCounter,
    pause: PauseState,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        let now = Instant::now();
        Self {
            cfg,
            renderer: None,
            started: now,
            fps: FrameCounter::new(now),
            pause: PauseState::default(),
            failure: None,
        }
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                error!("cleanup failed: {e}");
            } else {
                info!("renderer shut down");
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        let spec = self.cfg.window_spec();
        let built = PlatformWindow::create(event_loop, &spec)
            .and_then(|window| Renderer::new(window, &self.cfg));
        match built {
            Ok(renderer) => {
                info!(
                    "renderer ready (mailbox preferred={}, validation={})",
                    self.cfg.render.prefer_mailbox, self.cfg.render.validation
                );
                let size = renderer.window().framebuffer_size();
                self.pause.resized(size.width, size.height);
                info!("resumed → paused={}", self.pause.paused());
                if !self.pause.paused() {
                    renderer.window().request_redraw();
                }
                self.renderer = Some(renderer);
                self.started = Instant::now();
                self.fps.reset(self.started);
            }
            Err(e) => self.fail(event_loop, e.context("renderer init")),
        }
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if window_id != renderer.window().winit().id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                // Also retries a rebuild deferred while the window had no area.
                renderer.frames.notify_resized();
                let changed = self.pause.resized(new_size.width, new_size.height);
                info!(
                    "Resized → {}x{} (paused={}{})",
                    new_size.width,
                    new_size.height,
                    self.pause.paused(),
                    if changed { "" } else { ", unchanged" }
                );
                if self.pause.paused() {
                    self.fps.reset(Instant::now());
                } else {
                    renderer.window().request_redraw();
                }
            }

            WindowEvent::Occluded(occluded) => {
                if self.pause.occluded(occluded) {
                    info!("Occluded={occluded} → paused={}", self.pause.paused());
                    if !self.pause.paused() {
                        renderer.window().request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.pause.paused() {
                    return;
                }
                let elapsed = self.started.elapsed().as_secs_f32();
                match renderer.draw(elapsed) {
                    Ok(FrameStatus::Skipped) => {}
                    Ok(_) => {
                        if let Some(drawn) = self.fps.tick(Instant::now()) {
                            info!("fps ~ {drawn}");
                        }
                    }
                    Err(e) => {
                        let phase = renderer.frames.context().phase();
                        let err = anyhow::Error::new(e)
                            .context(format!("draw_frame failed while {phase:?}"));
                        self.fail(event_loop, err);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.pause.paused() {
            // Minimised or covered: sleep until the window system wakes us.
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        if let Some(renderer) = &self.renderer {
            renderer.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = AppCfg::load(&args.config).apply_args(&args);
    if cfg.render.validation && !cfg!(debug_assertions) {
        warn!("validation enabled in a release build");
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
