// SPDX-License-Identifier: GPL-3.0-only

//! Terminal keyboard viewer
//!
//! Renders the depth image with Unicode half-block characters (two image
//! rows per terminal row), a strip showing the state of every key, and a
//! status bar. The depth preview doubles as the picking surface: move the
//! cursor onto a corner of the surface and press Enter to record it. The
//! calibrated keys are outlined on top of the preview, green while pressed.

use crate::backends::sensor::DepthFrame;
use crate::constants::sensor::{FRAME_HEIGHT, FRAME_WIDTH, NO_RETURN};
use crate::constants::ui::{
    FAST_CURSOR_STEP, KEYBOARD_STRIP_HEIGHT, PREVIEW_FAR_CODE, PREVIEW_NEAR_CODE,
};
use crate::errors::{AppError, AppResult, SensorError};
use crate::pipelines::calibration::Calibration;
use crate::pipelines::depth::image_coords;
use crate::pipelines::keyboard::Key;
use crate::pipelines::picking::{CORNER_LABELS, CornerSet};
use crate::pipelines::session::{FrameView, Renderer, Session};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use nalgebra::Point2;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};
use std::io::{Stdout, stdout};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Run the terminal viewer until the user quits
pub fn run(
    session: &mut Session,
    frame_period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut viewer = TerminalViewer {
        terminal: Terminal::new(backend)?,
        state: ViewerState::new(),
    };

    // Run the app
    let result = run_app(&mut viewer, session, frame_period);

    // Restore terminal
    disable_raw_mode()?;
    execute!(viewer.terminal.backend_mut(), LeaveAlternateScreen)?;
    viewer.terminal.show_cursor()?;

    result
}

fn run_app(
    viewer: &mut TerminalViewer,
    session: &mut Session,
    frame_period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut next_tick = Instant::now();
    let mut sensor_alive = true;

    loop {
        if sensor_alive && Instant::now() >= next_tick {
            match session.tick() {
                Ok(stats) => {
                    for event in &stats.events {
                        info!(?event, "Note");
                    }
                }
                Err(SensorError::Disconnected) => {
                    error!("Depth sensor disconnected");
                    viewer.state.status = "Sensor disconnected | 'q' quit".to_string();
                    sensor_alive = false;
                }
                Err(e) => {
                    warn!("Frame skipped: {}", e);
                }
            }
            // A late pass delays the next one instead of bunching up
            next_tick = Instant::now().max(next_tick + frame_period);
        }

        viewer.render(&session.view())?;

        // Handle input until the next tick is due
        let timeout = next_tick.saturating_duration_since(Instant::now());
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && let Some(command) = command_for_key(&key)
            && viewer.state.apply(command, session) == Flow::Quit
        {
            break;
        }
    }

    Ok(())
}

/// Terminal-backed [`Renderer`]
pub struct TerminalViewer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: ViewerState,
}

impl Renderer for TerminalViewer {
    fn render(&mut self, view: &FrameView<'_>) -> AppResult<()> {
        let state = &self.state;
        self.terminal
            .draw(|f| {
                let area = f.area();
                let strip_height = KEYBOARD_STRIP_HEIGHT.min(area.height.saturating_sub(2));

                let preview_area = Rect {
                    x: area.x,
                    y: area.y,
                    width: area.width,
                    height: area.height.saturating_sub(strip_height + 1),
                };
                let strip_area = Rect {
                    x: area.x,
                    y: area.y + preview_area.height,
                    width: area.width,
                    height: strip_height,
                };
                let status_area = Rect {
                    x: area.x,
                    y: area.height.saturating_sub(1),
                    width: area.width,
                    height: 1,
                };

                f.render_widget(
                    DepthPreview {
                        frame: view.frame,
                        cursor: state.cursor,
                        keys: view.keys,
                        calibration: view.calibration,
                    },
                    preview_area,
                );
                f.render_widget(KeyboardStrip { keys: view.keys }, strip_area);

                let message = if state.show_help {
                    HELP_MESSAGE.to_string()
                } else {
                    status_line(view, state)
                };
                f.render_widget(StatusBar { message: &message }, status_area);
            })
            .map_err(|e| AppError::Other(format!("Terminal draw failed: {}", e)))?;
        Ok(())
    }
}

const HELP_MESSAGE: &str = "arrows: move (Shift x8) | 1/2/3: corner | Enter: pick | z/Z: shift | +/-: roll | r: reset | h: help | q: quit";

/// User commands understood by the viewer
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Quit,
    MoveCursor { du: i32, dv: i32 },
    SelectCorner(usize),
    Pick,
    NudgeZ(f64),
    NudgeRoll(f64),
    Reset,
    ToggleHelp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn command_for_key(key: &KeyEvent) -> Option<Command> {
    let step = if key.modifiers.contains(KeyModifiers::SHIFT) {
        FAST_CURSOR_STEP as i32
    } else {
        1
    };

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Left => Some(Command::MoveCursor { du: -step, dv: 0 }),
        KeyCode::Right => Some(Command::MoveCursor { du: step, dv: 0 }),
        // v counts from the bottom of the image
        KeyCode::Up => Some(Command::MoveCursor { du: 0, dv: step }),
        KeyCode::Down => Some(Command::MoveCursor { du: 0, dv: -step }),
        KeyCode::Char(c @ '1'..='3') => Some(Command::SelectCorner(c as usize - '1' as usize)),
        KeyCode::Enter => Some(Command::Pick),
        KeyCode::Char('z') => Some(Command::NudgeZ(1.0)),
        KeyCode::Char('Z') => Some(Command::NudgeZ(-1.0)),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Command::NudgeRoll(1.0)),
        KeyCode::Char('-') => Some(Command::NudgeRoll(-1.0)),
        KeyCode::Char('r') => Some(Command::Reset),
        KeyCode::Char('h') => Some(Command::ToggleHelp),
        _ => None,
    }
}

/// Interactive state that lives only in the viewer
struct ViewerState {
    /// Cursor in image coordinates, v counted from the bottom
    cursor: (u32, u32),
    corners: CornerSet,
    show_help: bool,
    status: String,
}

impl ViewerState {
    fn new() -> Self {
        Self {
            cursor: (FRAME_WIDTH / 2, FRAME_HEIGHT / 2),
            corners: CornerSet::new(),
            show_help: false,
            status: format!("Move to the {} corner, Enter to pick | 'h' help", CORNER_LABELS[0]),
        }
    }

    fn move_cursor(&mut self, du: i32, dv: i32) {
        let (u, v) = self.cursor;
        self.cursor = (
            (u as i32 + du).clamp(0, FRAME_WIDTH as i32 - 1) as u32,
            (v as i32 + dv).clamp(0, FRAME_HEIGHT as i32 - 1) as u32,
        );
    }

    fn apply(&mut self, command: Command, session: &mut Session) -> Flow {
        if command != Command::ToggleHelp {
            self.show_help = false;
        }

        match command {
            Command::Quit => return Flow::Quit,
            Command::MoveCursor { du, dv } => self.move_cursor(du, dv),
            Command::SelectCorner(slot) => {
                self.corners.select(slot);
                self.status = format!(
                    "Move to the {} corner, Enter to pick",
                    self.corners.active_label()
                );
            }
            Command::Pick => self.pick(session),
            Command::NudgeZ(sign) => {
                self.status = match session.nudge_z(sign) {
                    Ok(()) => format!("Shifted keyboard {}Z", if sign > 0.0 { "+" } else { "-" }),
                    Err(e) => format!("Error: {}", e),
                };
            }
            Command::NudgeRoll(sign) => {
                self.status = match session.nudge_roll(sign) {
                    Ok(()) => format!("Rolled keyboard {}Y", if sign > 0.0 { "+" } else { "-" }),
                    Err(e) => format!("Error: {}", e),
                };
            }
            Command::Reset => {
                session.reset();
                self.corners.clear();
                self.status = "Keyboard transform reset".to_string();
            }
            Command::ToggleHelp => self.show_help = !self.show_help,
        }

        Flow::Continue
    }

    fn pick(&mut self, session: &mut Session) {
        let (u, v) = self.cursor;
        let Some(point) = session.pick(u, v) else {
            self.status = "No depth under the cursor".to_string();
            return;
        };

        let label = self.corners.active_label();
        self.corners.set(point);
        info!(corner = label, x = point.x, y = point.y, z = point.z, "Corner picked");

        let Some(points) = self.corners.complete() else {
            self.status = format!("{} corner set", label);
            return;
        };

        self.status = match session.calibrate(points) {
            Ok(()) => format!("{} corner set, keyboard calibrated", label),
            Err(e) => {
                error!("Calibration failed: {}", e);
                format!("Error: {}", e)
            }
        };
    }
}

fn status_line(view: &FrameView<'_>, state: &ViewerState) -> String {
    let (u, v) = state.cursor;
    let depth = view
        .frame
        .map(|frame| frame.raw(u, FRAME_HEIGHT - 1 - v))
        .filter(|&code| code != NO_RETURN)
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());

    let slots: String = (0..3)
        .map(|slot| {
            let mark = if state.corners.get(slot).is_some() { 'x' } else { ' ' };
            if slot == state.corners.active() {
                format!("<{}>", mark)
            } else {
                format!("[{}]", mark)
            }
        })
        .collect();

    format!(
        "{} | {} | pts {}/{} | ({},{}) d={} | {} {} | notes {} | {}",
        view.source_name,
        view.sink_name,
        view.sensor_cloud.len(),
        view.local_cloud.len(),
        u,
        v,
        depth,
        state.corners.active_label(),
        slots,
        view.counters.notes_played,
        state.status,
    )
}

/// Grey level for a raw depth code: near is bright, no return is black
fn depth_color(code: u16) -> Color {
    if code == NO_RETURN {
        return Color::Black;
    }
    let clamped = code.clamp(PREVIEW_NEAR_CODE, PREVIEW_FAR_CODE);
    let t = (PREVIEW_FAR_CODE - clamped) as f32 / (PREVIEW_FAR_CODE - PREVIEW_NEAR_CODE) as f32;
    let level = (32.0 + t * 223.0) as u8;
    Color::Rgb(level, level, level)
}

/// MIDI note name with C4 = 60
fn note_name(note: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    format!("{}{}", NAMES[(note % 12) as usize], note as i32 / 12 - 1)
}

/// Outline segments longer than this many half-cells are skipped
const MAX_OUTLINE_STEPS: f64 = 4096.0;

fn key_color([r, g, b, _]: [f32; 4]) -> Color {
    Color::Rgb((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

/// Edges of every key box in image coordinates (`v` from the bottom)
fn key_outlines(keys: &[Key], calibration: &Calibration) -> Vec<([Point2<f32>; 2], Color)> {
    let mut segments = Vec::with_capacity(keys.len() * 24);

    for key in keys {
        let color = key_color(key.display_color());
        for face in key.quads().chunks_exact(4) {
            for i in 0..4 {
                let ends = [face[i], face[(i + 1) % 4]].map(|p| {
                    let sensor = calibration.to_sensor(&p.cast::<f64>()).cast::<f32>();
                    image_coords(&sensor)
                });
                if let [Some(a), Some(b)] = ends {
                    segments.push(([a, b], color));
                }
            }
        }
    }

    segments
}

/// Depth image with the pick cursor and key outlines, drawn with
/// half-block characters
struct DepthPreview<'a> {
    frame: Option<&'a DepthFrame>,
    cursor: (u32, u32),
    keys: &'a [Key],
    calibration: &'a Calibration,
}

impl DepthPreview<'_> {
    /// Key outline colour per display half-cell, row-major
    fn outline_overlay(
        &self,
        width: usize,
        half_rows: usize,
        x_scale: f64,
        y_scale: f64,
    ) -> Vec<Option<Color>> {
        let mut overlay = vec![None; width * half_rows];
        let last_row = FRAME_HEIGHT as f64 - 1.0;
        let to_display =
            |p: Point2<f32>| (p.x as f64 / x_scale, (last_row - p.y as f64) / y_scale);

        for ([a, b], color) in key_outlines(self.keys, self.calibration) {
            let (x0, y0) = to_display(a);
            let (x1, y1) = to_display(b);
            let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil();
            if !steps.is_finite() || steps > MAX_OUTLINE_STEPS {
                continue;
            }

            let steps = steps as usize;
            for i in 0..=steps {
                let t = if steps == 0 { 0.0 } else { i as f64 / steps as f64 };
                let x = x0 + (x1 - x0) * t;
                let y = y0 + (y1 - y0) * t;
                if x < 0.0 || y < 0.0 {
                    continue;
                }
                let (x, y) = (x as usize, y as usize);
                if x < width && y < half_rows {
                    overlay[y * width + x] = Some(color);
                }
            }
        }

        overlay
    }
}

impl Widget for DepthPreview<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let Some(frame) = self.frame else {
            // No frame yet - show placeholder
            let msg = "Waiting for depth sensor...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            buf.set_string(x, y, msg, Style::default());
            return;
        };

        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let w = term_height * frame_aspect;
            (w as u16, area.height)
        } else {
            // Terminal is taller - fit to width
            let h = term_width / frame_aspect;
            (area.width, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height * 2) as f64;

        // Cursor position in display half-rows (image row 0 is at the top)
        let (u, v) = self.cursor;
        let cursor_x = (u as f64 / x_scale) as u16;
        let cursor_half = ((frame.height() - 1 - v) as f64 / y_scale) as u16;

        let width = display_width as usize;
        let overlay = self.outline_overlay(width, display_height as usize * 2, x_scale, y_scale);

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = ((tx as f64 * x_scale) as u32).min(frame.width() - 1);
                let src_y_top = ((ty as f64 * 2.0 * y_scale) as u32).min(frame.height() - 1);
                let src_y_bottom =
                    (((ty as f64 * 2.0 + 1.0) * y_scale) as u32).min(frame.height() - 1);

                let mut top_color = depth_color(frame.raw(src_x, src_y_top));
                let mut bottom_color = depth_color(frame.raw(src_x, src_y_bottom));
                let top_half = ty as usize * 2;
                if let Some(color) = overlay[top_half * width + tx as usize] {
                    top_color = color;
                }
                if let Some(color) = overlay[(top_half + 1) * width + tx as usize] {
                    bottom_color = color;
                }
                if tx == cursor_x {
                    if cursor_half == ty * 2 {
                        top_color = Color::Red;
                    } else if cursor_half == ty * 2 + 1 {
                        bottom_color = Color::Red;
                    }
                }

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

/// One box per key: note name and point count, green while pressed
struct KeyboardStrip<'a> {
    keys: &'a [Key],
}

impl Widget for KeyboardStrip<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.keys.is_empty() || area.width == 0 || area.height == 0 {
            return;
        }

        let count = self.keys.len() as u32;
        for (i, key) in self.keys.iter().enumerate() {
            let x0 = area.x + (i as u32 * area.width as u32 / count) as u16;
            let x1 = area.x + ((i as u32 + 1) * area.width as u32 / count) as u16;
            // Leave one column between keys
            let right = x1.saturating_sub(1).max(x0);

            let style = if key.is_pressed() {
                Style::default().fg(Color::Black).bg(Color::Green)
            } else {
                Style::default().fg(Color::Black).bg(Color::White)
            };

            for y in area.y..area.y + area.height {
                for x in x0..right {
                    if let Some(cell) = buf.cell_mut((x, y)) {
                        cell.set_char(' ');
                        cell.set_style(style);
                    }
                }
            }

            let width = (right - x0) as usize;
            if width == 0 {
                continue;
            }
            let name: String = note_name(key.note()).chars().take(width).collect();
            buf.set_string(x0, area.y, &name, style);
            if area.height > 1 {
                let inside: String = key.inside().to_string().chars().take(width).collect();
                buf.set_string(x0, area.y + area.height - 1, &inside, style);
            }
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}
