use crate::keymap::key_stroke_from_event;
use crate::session::Session;
use crate::surface::{BufferSurface, Palette};
use crossterm::ExecutableCommand;
use crossterm::cursor::Show;
use crossterm::event::{self, Event};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Position;
use std::io::{self, Stdout};
use std::time::Duration;
use tracing::debug;

/// Owns the terminal for the lifetime of the interactive session. Dropping
/// it restores the terminal.
pub struct Ui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    palette: Palette,
}

impl Ui {
    pub fn init(palette: Palette) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal, palette })
    }

    /// Runs until the session stops. Each pass waits up to `tick` for a key,
    /// settles finished background work and redraws.
    pub fn run(&mut self, session: &mut Session, tick: Duration) -> io::Result<()> {
        session.start();
        while session.is_running() {
            session.tick();
            if session.take_redraw_request() {
                self.terminal.clear()?;
            }

            let palette = self.palette;
            self.terminal.draw(|frame| {
                let cursor = {
                    let mut surface = BufferSurface::new(frame.buffer_mut(), &palette);
                    session.render(&mut surface);
                    surface.cursor()
                };
                if let Some((row, col)) = cursor {
                    frame.set_cursor_position(Position::new(col, row));
                }
            })?;

            if event::poll(tick)? {
                match event::read()? {
                    Event::Key(key) => {
                        if let Some(stroke) = key_stroke_from_event(key) {
                            session.handle_key(stroke);
                        }
                    }
                    Event::Resize(width, height) => {
                        debug!(width, height, "terminal resized");
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

impl Drop for Ui {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = io::stdout().execute(Show);
    }
}
