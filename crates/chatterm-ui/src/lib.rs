mod keymap;
mod render;
mod runtime;
mod session;
mod state_machine;
mod surface;
mod viewport;

pub use keymap::{
    BindingScope, KeyBindingConfig, KeyDispatch, KeyStroke, Keymap, KeymapCompileError,
    KeymapConfig, StateKeymapConfig, UiCommand, default_keymap_config, key_stroke_from_event,
};
pub use render::{
    MIN_HEIGHT, MIN_WIDTH, MessageBlock, SPINNER_FRAMES, ScreenView, content_height, render_screen,
};
pub use runtime::Ui;
pub use session::{Banner, BannerLevel, Session, SessionCache, SessionSettings, SessionState};
pub use state_machine::{AppState, StateData, StateListener, StateMachine};
pub use surface::{BufferSurface, Palette, Surface, StyleToken};
pub use viewport::{
    ScrollbarGeometry, Viewport, compute_viewport, display_width, first_visible_index,
    rendered_count, scrollbar_geometry, truncate_to_width, wrap_text,
};
