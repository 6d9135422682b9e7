//! # UI Common Components
//!
//! Colors, frames and the inline notice shown after each operator action.

use eframe::egui::{self, Color32, Frame, RichText, Stroke};
use std::fmt;

use crate::session::controller::SessionError;
use crate::session::session_worker::ActionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Inline message shown at the point of action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn from_error(error: &SessionError) -> Self {
        // Precondition failures are warnings, everything else is an error.
        let level = match error {
            SessionError::NotConnected | SessionError::Busy => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        Self {
            level,
            text: error.to_string(),
        }
    }

    pub fn color(&self) -> Color32 {
        match self.level {
            NoticeLevel::Success => UiColors::ACTIVE,
            NoticeLevel::Warning => UiColors::WARNING,
            NoticeLevel::Error => UiColors::INACTIVE,
        }
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        create_frame(UiColors::INNER_BG, self.color()).show(ui, |ui| {
            ui.label(RichText::new(self.text.as_str()).color(self.color()));
        });
    }
}

impl From<ActionResult> for Notice {
    fn from(result: ActionResult) -> Self {
        match result {
            Ok(text) => Notice::success(text),
            Err(e) => Notice::from_error(&e),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

pub fn create_frame(bg_color: Color32, border_color: Color32) -> Frame {
    Frame::new()
        .stroke(Stroke::new(1.0, border_color))
        .fill(bg_color)
        .inner_margin(4)
        .outer_margin(2)
}

/// Dark theme palette.
pub struct UiColors;

impl UiColors {
    pub const INNER_BG: Color32 = Color32::from_rgb(25, 25, 25);
    pub const EXTREME_BG: Color32 = Color32::from_rgb(20, 20, 20);
    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 60);

    /// Connected / success
    pub const ACTIVE: Color32 = Color32::from_rgb(50, 200, 20);
    /// Disconnected / error
    pub const INACTIVE: Color32 = Color32::from_rgb(200, 50, 20);
    pub const WARNING: Color32 = Color32::from_rgb(220, 170, 30);
}
