//! Terminal video preview: ASCII-rendered frames with face boxes and name strips.

use crate::live::{LabeledFace, PreviewSurface, SurfaceEvent};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::{cursor, execute, queue, terminal};
use gazeguard_hw::Frame;
use std::io::{self, Write};
use std::time::Duration;

const ASCII_RAMP: &[char] = &[' ', '.', '·', ':', ';', '+', '=', 'x', 'X', '#', '@'];
const DEFAULT_COLUMNS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;
/// Rows kept free below the picture for the status line.
const STATUS_ROWS: u16 = 1;
const STATUS_LINE: &str = " GazeGuard: press q to quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CharCell {
    ch: char,
    /// Part of a filled label strip.
    strip: bool,
}

/// Character grid a frame is rendered into.
pub struct AsciiCanvas {
    width: usize,
    height: usize,
    cells: Vec<CharCell>,
}

impl AsciiCanvas {
    /// Sample the frame's luma onto a `width` x `height` grid.
    pub fn from_frame(frame: &Frame, width: usize, height: usize) -> Self {
        let luma = frame.to_luma();
        let fw = frame.width as usize;
        let fh = frame.height as usize;

        let mut cells = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                let x = col * fw / width.max(1);
                let y = row * fh / height.max(1);
                let brightness = luma.get(y * fw + x).copied().unwrap_or(0) as usize;
                let ch = ASCII_RAMP[brightness * (ASCII_RAMP.len() - 1) / 255];
                cells.push(CharCell { ch, strip: false });
            }
        }

        Self { width, height, cells }
    }

    fn set(&mut self, col: usize, row: usize, ch: char, strip: bool) {
        if col < self.width && row < self.height {
            self.cells[row * self.width + col] = CharCell { ch, strip };
        }
    }

    /// Draw a box around the face with a filled name strip along its bottom edge.
    pub fn draw_face(&mut self, face: &LabeledFace, frame_width: u32, frame_height: u32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let to_col = |x: f32| -> usize {
            let col = x / frame_width as f32 * self.width as f32;
            (col.max(0.0) as usize).min(self.width - 1)
        };
        let to_row = |y: f32| -> usize {
            let row = y / frame_height as f32 * self.height as f32;
            (row.max(0.0) as usize).min(self.height - 1)
        };

        let (left, right) = (to_col(face.bbox.x), to_col(face.bbox.right()));
        let (top, bottom) = (to_row(face.bbox.y), to_row(face.bbox.bottom()));

        for col in left..=right {
            self.set(col, top, '─', false);
            self.set(col, bottom, '─', false);
        }
        for row in top..=bottom {
            self.set(left, row, '│', false);
            self.set(right, row, '│', false);
        }
        self.set(left, top, '┌', false);
        self.set(right, top, '┐', false);

        // Label strip fills the box's bottom row, name starts one cell in.
        for col in left..=right {
            self.set(col, bottom, ' ', true);
        }
        for (i, ch) in face.label.chars().enumerate() {
            let col = left + 1 + i;
            if col >= right {
                break;
            }
            self.set(col, bottom, ch, true);
        }
    }

    /// Rows as plain text, strips rendered as their characters only.
    #[cfg(test)]
    fn plain_rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| row.iter().map(|c| c.ch).collect())
            .collect()
    }

    /// Rows with label strips highlighted in white-on-red.
    fn styled_rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| {
                let mut line = String::new();
                let mut run = String::new();
                let mut in_strip = false;
                for cell in row {
                    if cell.strip != in_strip {
                        flush_run(&mut line, &mut run, in_strip);
                        in_strip = cell.strip;
                    }
                    run.push(cell.ch);
                }
                flush_run(&mut line, &mut run, in_strip);
                line
            })
            .collect()
    }
}

fn flush_run(line: &mut String, run: &mut String, strip: bool) {
    if run.is_empty() {
        return;
    }
    if strip {
        line.push_str(&run.as_str().white().on_red().to_string());
    } else {
        line.push_str(run);
    }
    run.clear();
}

/// Full-screen terminal preview. Raw mode and the alternate screen are left
/// again when this is dropped, on every exit path.
pub struct TerminalPreview {
    stdout: io::Stdout,
}

impl TerminalPreview {
    pub fn open() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        tracing::debug!("terminal preview opened");
        Ok(Self { stdout })
    }

    fn canvas_size() -> (usize, usize) {
        let (cols, rows) = terminal::size().unwrap_or((DEFAULT_COLUMNS, DEFAULT_ROWS));
        (cols as usize, rows.saturating_sub(STATUS_ROWS) as usize)
    }
}

impl PreviewSurface for TerminalPreview {
    fn present(&mut self, frame: &Frame, faces: &[LabeledFace]) -> io::Result<SurfaceEvent> {
        let (width, height) = Self::canvas_size();
        let mut canvas = AsciiCanvas::from_frame(frame, width, height);
        for face in faces {
            canvas.draw_face(face, frame.width, frame.height);
        }

        queue!(self.stdout, cursor::MoveTo(0, 0))?;
        for (row, line) in canvas.styled_rows().into_iter().enumerate() {
            queue!(self.stdout, cursor::MoveTo(0, row as u16))?;
            self.stdout.write_all(line.as_bytes())?;
        }
        queue!(
            self.stdout,
            cursor::MoveTo(0, height as u16),
            terminal::Clear(terminal::ClearType::CurrentLine)
        )?;
        self.stdout.write_all(STATUS_LINE.as_bytes())?;
        self.stdout.flush()?;

        poll_viewer()
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
        tracing::debug!("terminal preview closed");
    }
}

/// Drain pending terminal events without blocking.
fn poll_viewer() -> io::Result<SurfaceEvent> {
    while event::poll(Duration::from_millis(1))? {
        if let Event::Key(key) = event::read()? {
            let outcome = key_event(&key);
            if outcome != SurfaceEvent::Continue {
                return Ok(outcome);
            }
        }
    }
    Ok(SurfaceEvent::Continue)
}

fn key_event(key: &KeyEvent) -> SurfaceEvent {
    if key.kind == KeyEventKind::Release {
        return SurfaceEvent::Continue;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => SurfaceEvent::Quit,
        // Raw mode swallows SIGINT; treat Ctrl-C as quit.
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => SurfaceEvent::Quit,
        // Ctrl-D: the viewer is done with the terminal.
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => SurfaceEvent::Closed,
        _ => SurfaceEvent::Continue,
    }
}
