//! Session state owned by the controller loop.
//!
//! Exactly one loop thread mutates a [`Session`]; screen engines only ever
//! see a [`SessionSnapshot`].

use crate::registry::Screen;

/// Fixed filter vocabulary. List order doubles as the highlight index the
/// presentation layer uses, so it must not be reordered.
pub const FILTERS: [Filter; 8] = [
    Filter::Negative,
    Filter::Sketch,
    Filter::Colorswap,
    Filter::Cartoon,
    Filter::Oilpaint,
    Filter::Emboss,
    Filter::Watercolor,
    Filter::None,
];

/// Sentinel recorded before any border has been chosen (outside the 0-7
/// index range the presentation layer knows).
pub const FRAME_NONE: u32 = 8;

pub const MIN_COPIES: u8 = 1;
pub const MAX_COPIES: u8 = 6;

/// On-camera visual effect selected on the live screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Negative,
    Sketch,
    Colorswap,
    Cartoon,
    Oilpaint,
    Emboss,
    Watercolor,
    None,
}

impl Filter {
    /// Total mapping from a submitted name: matching is case-insensitive
    /// and anything unrecognized selects `Filter::None`.
    pub fn from_name(name: &str) -> Filter {
        match name.trim().to_lowercase().as_str() {
            "negative" => Filter::Negative,
            "sketch" => Filter::Sketch,
            "colorswap" => Filter::Colorswap,
            "cartoon" => Filter::Cartoon,
            "oilpaint" => Filter::Oilpaint,
            "emboss" => Filter::Emboss,
            "watercolor" => Filter::Watercolor,
            _ => Filter::None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Filter::Negative => "negative",
            Filter::Sketch => "sketch",
            Filter::Colorswap => "colorswap",
            Filter::Cartoon => "cartoon",
            Filter::Oilpaint => "oilpaint",
            Filter::Emboss => "emboss",
            Filter::Watercolor => "watercolor",
            Filter::None => "none",
        }
    }

    /// Position in [`FILTERS`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// The mutable per-run state of one booth cycle.
#[derive(Debug, Clone)]
pub struct Session {
    pub current_screen: Screen,
    pub selected_filter: Filter,
    pub selected_frame: u32,
    pub copy_count: u8,
    /// True only while on the Printing screen, after the single print
    /// submission for this visit has happened.
    pub printed_this_cycle: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            current_screen: Screen::Loading,
            selected_filter: Filter::None,
            selected_frame: FRAME_NONE,
            copy_count: MIN_COPIES,
            printed_this_cycle: false,
        }
    }

    /// Read-only view handed to screen engines.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            screen: self.current_screen,
            selected_filter: self.selected_filter,
            selected_frame: self.selected_frame,
            copy_count: self.copy_count,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable view of the session, taken at screen activation.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub screen: Screen,
    pub selected_filter: Filter,
    pub selected_frame: u32,
    pub copy_count: u8,
}
