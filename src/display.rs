use std::io;

use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

use crate::frame::Frame;

/// Presenter is the sink for published frames. It should abstract the
/// rendering details, so a variety of kinds of screen would work.
pub trait Presenter {
    /// paint one frame onto whatever surface this presenter drives
    fn paint(&mut self, frame: &Frame) -> Result<(), io::Error>;
}

/// expand a frame's plane into x, y float coords suitable for rendering
/// with TUI, picking either the lit or the unlit pixels
fn plane_points(frame: &Frame, lit: bool) -> impl Iterator<Item = (f64, f64)> + '_ {
    let w = frame.width();
    let mut count = frame.plane().len();
    std::iter::from_fn(move || {
        while count > 0 {
            count -= 1;
            if (frame.plane()[count] > 0) == lit {
                return Some((
                    (count % w) as f64,        // x
                    -1.0 * (count / w) as f64, // y
                ));
            }
        }
        None
    })
}

/// monochrome display in a terminal, rendered using TUI over crossterm
pub struct MonoTermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    width: usize,
    height: usize,
}

impl MonoTermDisplay {
    pub fn new(width: usize, height: usize) -> Result<MonoTermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(MonoTermDisplay {
            terminal,
            width,
            height,
        })
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.width - 1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * (self.height - 1) as f64, 0.0]
    }
}

impl Presenter for MonoTermDisplay {
    fn paint(&mut self, frame: &Frame) -> Result<(), io::Error> {
        // the channel was opened at our plane size, so anything else is a
        // wiring mistake
        assert_eq!(
            (frame.width(), frame.height()),
            (self.width, self.height),
            "MonoTermDisplay must be given frames of its own size"
        );

        // for now this assumes a 1:1 ratio between terminal cells and
        // emulated pixels
        let (width, height) = (self.width, self.height);
        let (x_bounds, y_bounds) = (self.x_bounds(), self.y_bounds());
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + width as u16, 2 + height as u16);

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title("CHIP-8")
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(x_bounds)
                .y_bounds(y_bounds)
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &plane_points(frame, false).collect::<Vec<_>>(),
                        color: Color::Black,
                    });
                    ctx.draw(&Points {
                        coords: &plane_points(frame, true).collect::<Vec<_>>(),
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }
}

/// useful for testing non-display routines
pub struct NullPresenter;

impl NullPresenter {
    pub fn new() -> NullPresenter {
        NullPresenter {}
    }
}

impl Default for NullPresenter {
    fn default() -> Self {
        NullPresenter::new()
    }
}

impl Presenter for NullPresenter {
    fn paint(&mut self, _frame: &Frame) -> Result<(), io::Error> {
        Ok(())
    }
}

/// a test pattern for checking display routines: full border with an
/// alternating checker inside
pub fn test_card(width: usize, height: usize) -> Frame {
    let mut card = Frame::new(width, height).expect("test card plane");
    for y in 0..height {
        for x in 0..width {
            let edge = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            let checker = (x + y) % 2 == 0;
            card.plane_mut()[x + y * width] = u8::from(edge || checker);
        }
    }
    card
}
