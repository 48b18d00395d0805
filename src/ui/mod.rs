use std::num::NonZeroU32;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use softbuffer::Surface;

use crate::render_cache::Viewport;
use crate::viewer::{Frame, Viewer};
use crate::ui::render::{Canvas, BG_COLOR};

pub mod render;

pub const INITIAL_SIZE: (u32, u32) = (1280, 720);

const WHITE: (u8, u8, u8, u8) = (254, 254, 254, 255);
const ERROR_RED: (u8, u8, u8, u8) = (255, 80, 80, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Next,
    Prev,
    First,
    Last,
    ToggleProtection,
    Retry,
    ToggleInfo,
}

pub fn command_for(key: &Key) -> Option<Command> {
    match key {
        Key::Named(NamedKey::Escape) => Some(Command::Quit),
        Key::Named(NamedKey::ArrowRight) | Key::Named(NamedKey::Space) => Some(Command::Next),
        Key::Named(NamedKey::ArrowLeft) => Some(Command::Prev),
        Key::Named(NamedKey::Home) => Some(Command::First),
        Key::Named(NamedKey::End) => Some(Command::Last),
        Key::Character(s) => match s.chars().next()?.to_ascii_lowercase() {
            'q' => Some(Command::Quit),
            'l' => Some(Command::Next),
            'h' => Some(Command::Prev),
            'p' => Some(Command::ToggleProtection),
            'r' => Some(Command::Retry),
            'i' => Some(Command::ToggleInfo),
            _ => None,
        },
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Application handler (winit 0.30 style)
// ---------------------------------------------------------------------------

pub struct App {
    pub viewer: Viewer,
    pub frame: Option<Frame>,
    pub show_info: bool,
    pub window: Option<Arc<Window>>,
    pub context: Option<softbuffer::Context<Arc<Window>>>,
    pub surface: Option<Surface<Arc<Window>, Arc<Window>>>,
}

impl App {
    pub fn new(viewer: Viewer, frame: Option<Frame>) -> Self {
        Self {
            viewer,
            frame,
            show_info: false,
            window: None,
            context: None,
            surface: None,
        }
    }

    /// Returns true if the app should quit.
    fn apply(&mut self, cmd: Command) -> bool {
        let shown = match cmd {
            Command::Quit => return true,
            Command::Next => self.viewer.next(),
            Command::Prev => self.viewer.prev(),
            Command::First => self.viewer.first(),
            Command::Last => self.viewer.last(),
            Command::Retry => self.viewer.retry_current(),
            Command::ToggleInfo => {
                self.show_info = !self.show_info;
                None
            }
            Command::ToggleProtection => {
                match self.viewer.toggle_protection() {
                    Ok(Some(protected)) => {
                        if let Some(frame) = self.frame.as_mut() {
                            frame.protected = protected;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("{}", e),
                }
                None
            }
        };
        if shown.is_some() {
            self.frame = shown;
        }
        false
    }
}

pub fn paint(canvas: &mut Canvas, frame: Option<&Frame>, show_info: bool) {
    canvas.clear(BG_COLOR);
    let Some(frame) = frame else {
        canvas.draw_text("No photos", 20, 20, 3, WHITE);
        return;
    };

    match &frame.image {
        Some(img) => canvas.blit_centered(img),
        None => {
            let msg = frame.error.as_deref().unwrap_or("Could not load");
            canvas.draw_text(msg, 20, 60, 2, ERROR_RED);
        }
    }

    if frame.protected {
        canvas.draw_text("  P", 0, 8, 4, (0, 0, 0, 160));
        canvas.draw_text("  P", 2, 6, 4, WHITE);
    }

    if show_info {
        let line = format!("[{}/{}] {}", frame.index + 1, frame.count, frame.filename);
        let info = match &frame.image {
            Some(img) => format!("{}  {}x{} {}", line, img.width(), img.height(), img.format_name),
            None => line,
        };
        canvas.fill_rect(0, 40, (info.len() as u32 + 2) * 12, 22, (0, 0, 0, 178));
        canvas.draw_text(&info, 12, 44, 2, WHITE);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title("photoview")
            .with_inner_size(LogicalSize::new(INITIAL_SIZE.0, INITIAL_SIZE.1));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Could not create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        let surface = softbuffer::Context::new(Arc::clone(&window)).and_then(|context| {
            let surface = Surface::new(&context, Arc::clone(&window))?;
            Ok((context, surface))
        });
        match surface {
            Ok((context, surface)) => {
                self.context = Some(context);
                self.surface = Some(surface);
            }
            Err(e) => {
                log::error!("Could not create drawing surface: {}", e);
                event_loop.exit();
                return;
            }
        }

        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                let w = width.max(1);
                let h = height.max(1);
                if let (Some(surface), Some(nw), Some(nh)) =
                    (self.surface.as_mut(), NonZeroU32::new(w), NonZeroU32::new(h))
                {
                    let _ = surface.resize(nw, nh);
                }
                log::debug!("Resizing {} {}", w, h);
                if let Some(frame) = self.viewer.resize(Viewport::new(w, h)) {
                    self.frame = Some(frame);
                }
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let Some(cmd) = command_for(&event.logical_key) else { return };
                // Held navigation keys repeat; toggles do not.
                if event.repeat && !matches!(cmd, Command::Next | Command::Prev) {
                    return;
                }
                if self.apply(cmd) {
                    event_loop.exit();
                    return;
                }
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(window) = self.window.as_ref() else { return };
                let size = window.inner_size();
                let fb_w = size.width.max(1);
                let fb_h = size.height.max(1);
                let frame = self.frame.as_ref();
                if let Some(surface) = self.surface.as_mut() {
                    if let Ok(mut buffer) = surface.buffer_mut() {
                        paint(&mut Canvas::new(&mut buffer, fb_w, fb_h), frame, self.show_info);
                        let _ = buffer.present();
                    }
                }
            }

            _ => {}
        }
    }
}
