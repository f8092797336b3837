//! Static screen table, one entry per booth screen.
//!
//! Each screen declares the presentation resource it displays and the
//! notification kinds it subscribes to, paired with the wire names the
//! presentation layer expects. The table is authored once and read-only
//! process-wide; install/uninstall of a screen is handled by the machine,
//! not by any subscribe/unsubscribe machinery here.

use crate::NotificationKind;

/// The seven booth screens in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Screen {
    Loading,
    Camera,
    Preview,
    Processing,
    Frames,
    PrintOptions,
    Printing,
}

impl Screen {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Screen> {
        match id {
            0 => Some(Screen::Loading),
            1 => Some(Screen::Camera),
            2 => Some(Screen::Preview),
            3 => Some(Screen::Processing),
            4 => Some(Screen::Frames),
            5 => Some(Screen::PrintOptions),
            6 => Some(Screen::Printing),
            _ => None,
        }
    }
}

/// One row of the screen table.
pub struct ScreenSpec {
    pub screen: Screen,
    /// Display resource the presentation layer loads for this screen.
    pub resource: &'static str,
    /// Subscribed notification kinds with their outbound wire names.
    pub notifications: &'static [(NotificationKind, &'static str)],
}

impl ScreenSpec {
    /// Wire name for `kind`, or None when this screen is not subscribed.
    pub fn wire_name(&self, kind: NotificationKind) -> Option<&'static str> {
        self.notifications
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, name)| *name)
    }
}

static SCREENS: [ScreenSpec; 7] = [
    ScreenSpec {
        screen: Screen::Loading,
        resource: "ui/loading.qml",
        notifications: &[(NotificationKind::Status, "status")],
    },
    ScreenSpec {
        screen: Screen::Camera,
        resource: "ui/camera.qml",
        notifications: &[
            (NotificationKind::Status, "status"),
            (NotificationKind::FilterPreview, "updateImageFilterPreview"),
            (NotificationKind::BorderImage, "setBorderForImage"),
        ],
    },
    ScreenSpec {
        screen: Screen::Preview,
        resource: "ui/preview.qml",
        notifications: &[(NotificationKind::Status, "status")],
    },
    ScreenSpec {
        screen: Screen::Processing,
        resource: "ui/processing.qml",
        notifications: &[(NotificationKind::Status, "status")],
    },
    ScreenSpec {
        screen: Screen::Frames,
        resource: "ui/frames.qml",
        notifications: &[
            (NotificationKind::Status, "status"),
            (NotificationKind::BorderImage, "setBorderForImage"),
        ],
    },
    ScreenSpec {
        screen: Screen::PrintOptions,
        resource: "ui/printopt.qml",
        notifications: &[
            (NotificationKind::Status, "status"),
            (NotificationKind::Copies, "setCopies"),
        ],
    },
    ScreenSpec {
        screen: Screen::Printing,
        resource: "ui/printing.qml",
        notifications: &[(NotificationKind::Status, "status")],
    },
];

/// Table entry for a known screen.
pub fn spec(screen: Screen) -> &'static ScreenSpec {
    &SCREENS[screen as usize]
}

/// Look up a screen by raw id. Ids outside 0..=6 indicate a broken
/// invariant; callers treat the error as fatal rather than continuing on
/// an undefined screen.
pub fn lookup(id: u8) -> Result<&'static ScreenSpec, String> {
    Screen::from_id(id)
        .map(spec)
        .ok_or_else(|| format!("unknown screen id: {}", id))
}
