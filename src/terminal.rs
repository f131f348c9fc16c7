// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based scanner view
//!
//! Renders the camera preview with Unicode half-block characters and drives
//! the scanner from the keyboard.

use crate::backends::camera::{CameraFrame, PixelFormat, V4l2Provider};
use crate::config::ScannerConfig;
use crate::decode::{DecodedResult, GtinEngine};
use crate::scanner::{Scanner, SessionState};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};
use std::io::{self, stdout};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;

/// Run the interactive scanner until a code is found or the user quits
pub fn run(
    rt: &Runtime,
    config: ScannerConfig,
) -> Result<Option<DecodedResult>, Box<dyn std::error::Error>> {
    // Scanner operations spawn tasks on this runtime
    let _guard = rt.enter();

    let found = Arc::new(Mutex::new(None));
    let provider = Arc::new(V4l2Provider::new((&config).into()));
    let engine = Arc::new(GtinEngine::with_max_dimension(config.max_decode_dimension));
    let scanner = {
        let found = Arc::clone(&found);
        Scanner::builder(provider, engine)
            .config(config)
            .on_scan(move |result| {
                *found.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            })
            .build()
    };

    let starter = scanner.clone();
    rt.spawn(async move { starter.start().await });

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, rt, &scanner, &found);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    scanner.stop();
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    rt: &Runtime,
    scanner: &Scanner,
    found: &Mutex<Option<DecodedResult>>,
) -> Result<Option<DecodedResult>, Box<dyn std::error::Error>> {
    loop {
        if let Some(result) = found.lock().unwrap_or_else(PoisonError::into_inner).take() {
            info!(text = %result.text, "Scan complete");
            return Ok(Some(result));
        }

        let state = scanner.state();
        let frame = match state {
            SessionState::Paused => scanner.frozen_frame().map(|f| f.to_camera_frame()),
            _ => scanner.preview_frame(),
        };
        let frame_widget = FrameWidget {
            frame: frame.as_ref(),
            placeholder: placeholder_for(state),
        };
        let status_message = build_status_message(scanner);

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                height: area.height.saturating_sub(1),
                ..area
            };
            f.render_widget(&frame_widget, camera_area);

            let status_area = Rect {
                y: area.height.saturating_sub(1),
                height: 1,
                ..area
            };
            f.render_widget(
                StatusBar {
                    message: &status_message,
                },
                status_area,
            );
        })?;

        // Handle input with timeout for frame updates
        if event::poll(Duration::from_millis(33))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Char('p') | KeyCode::Char(' ') => match state {
                    SessionState::Scanning => {
                        let scanner = scanner.clone();
                        rt.spawn(async move { scanner.pause().await });
                    }
                    SessionState::Paused => scanner.resume(),
                    _ => {}
                },
                KeyCode::Char('s') if scanner.can_switch_camera() => {
                    let scanner = scanner.clone();
                    rt.spawn(async move { scanner.switch_camera().await });
                }
                KeyCode::Char('r') if matches!(state, SessionState::Idle | SessionState::Error) => {
                    let scanner = scanner.clone();
                    rt.spawn(async move { scanner.start().await });
                }
                _ => {}
            }
        }
    }

    Ok(None)
}

fn placeholder_for(state: SessionState) -> &'static str {
    match state {
        SessionState::Initializing => "Waiting for camera...",
        SessionState::Error => "Camera unavailable",
        SessionState::Idle => "Camera stopped",
        SessionState::Scanning | SessionState::Paused => "Waiting for frames...",
    }
}

fn build_status_message(scanner: &Scanner) -> String {
    let state = scanner.state();
    let mut msg = match scanner.active_device() {
        Some(device) => format!("[{}] {}", state, device.label),
        None => format!("[{}]", state),
    };

    if let Some(error) = scanner.scan_error() {
        msg.push_str(" | ");
        msg.push_str(&error);
    }

    match state {
        SessionState::Scanning => msg.push_str(" | 'p' freeze"),
        SessionState::Paused => msg.push_str(" | 'p' resume"),
        SessionState::Idle | SessionState::Error => msg.push_str(" | 'r' retry"),
        SessionState::Initializing => {}
    }
    if scanner.can_switch_camera() {
        msg.push_str(" | 's' switch camera");
    }
    msg.push_str(" | 'q' quit");
    msg
}

/// Widget that renders a camera frame using half-block characters
struct FrameWidget<'a> {
    frame: Option<&'a CameraFrame>,
    placeholder: &'static str,
}

impl Widget for &FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.filter(|f| f.is_well_formed()) else {
            let msg = self.placeholder;
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };

        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &CameraFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width - 1);
    let y = y.min(frame.height - 1);

    match frame.format {
        PixelFormat::RGBA => {
            let idx = (y * frame.stride + x * 4) as usize;
            match frame.data.get(idx..idx + 3) {
                Some(px) => Color::Rgb(px[0], px[1], px[2]),
                None => Color::Black,
            }
        }
        PixelFormat::Gray8 => {
            let v = frame.luma_at(x, y);
            Color::Rgb(v, v, v)
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_widget_renders_half_blocks() {
        let data: Vec<u8> = [[255, 0, 0, 255], [0, 0, 255, 255]]
            .iter()
            .flatten()
            .copied()
            .collect();
        // 1x2 frame: red over blue
        let frame = CameraFrame::from_rgba(1, 2, data);
        let widget = FrameWidget {
            frame: Some(&frame),
            placeholder: "",
        };
        let area = Rect::new(0, 0, 1, 1);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);

        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 0, 0));
        assert_eq!(cell.bg, Color::Rgb(0, 0, 255));
    }

    #[test]
    fn test_placeholder_without_frame() {
        let widget = FrameWidget {
            frame: None,
            placeholder: "Camera stopped",
        };
        let area = Rect::new(0, 0, 20, 3);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);
        let row: String = (0..20).map(|x| buf[(x, 1)].symbol().to_string()).collect();
        assert!(row.contains("Camera stopped"));
    }

    #[test]
    fn test_status_bar_truncates() {
        let area = Rect::new(0, 0, 5, 1);
        let mut buf = Buffer::empty(area);
        StatusBar {
            message: "[Scanning] camera",
        }
        .render(area, &mut buf);
        let row: String = (0..5).map(|x| buf[(x, 0)].symbol().to_string()).collect();
        assert_eq!(row, "[Scan");
    }
}
