//! Camera adapter: one process-lifetime camera, reconfigured in place.
//!
//! The adapter owns preview bookkeeping (starting an already-running
//! preview is a no-op) and pins the booth's fixed tuning; backends do the
//! actual hardware work. The real backend drives the Pi camera stack
//! through `raspistill`, whose `-ifx` vocabulary matches the booth's
//! filter list one to one; the fake backend stands in when developing
//! without booth hardware.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use crate::session::Filter;

/// Live preview resolution.
pub const PREVIEW_RESOLUTION: (u32, u32) = (480, 640);
/// Still capture resolution, slightly larger than the live preview.
pub const CAPTURE_RESOLUTION: (u32, u32) = (486, 648);
pub const SATURATION: u8 = 50;
pub const BRIGHTNESS: u8 = 50;

/// Default location of the captured still; a new capture overwrites it.
pub fn default_capture_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("booth_capture.jpg")
}

/// Hardware operations the adapter delegates to.
pub trait CameraBackend: Send {
    fn apply_resolution(&mut self, width: u32, height: u32) -> Result<(), String>;
    fn apply_saturation(&mut self, value: u8) -> Result<(), String>;
    fn apply_brightness(&mut self, value: u8) -> Result<(), String>;
    fn apply_effect(&mut self, effect: Filter) -> Result<(), String>;
    fn preview_on(&mut self) -> Result<(), String>;
    fn preview_off(&mut self) -> Result<(), String>;
    fn capture(&mut self, path: &Path) -> Result<(), String>;
}

/// Thin stateful wrapper around the single camera resource.
pub struct CameraAdapter {
    backend: Box<dyn CameraBackend>,
    previewing: bool,
    resolution: (u32, u32),
}

impl CameraAdapter {
    /// Wrap a backend and apply the booth's fixed tuning.
    pub fn new(backend: Box<dyn CameraBackend>) -> Result<Self, String> {
        let mut adapter = Self {
            backend,
            previewing: false,
            resolution: (0, 0),
        };
        adapter.set_resolution(PREVIEW_RESOLUTION)?;
        adapter.backend.apply_saturation(SATURATION)?;
        adapter.backend.apply_brightness(BRIGHTNESS)?;
        Ok(adapter)
    }

    pub fn set_resolution(&mut self, resolution: (u32, u32)) -> Result<(), String> {
        let (width, height) = resolution;
        self.backend.apply_resolution(width, height)?;
        self.resolution = resolution;
        Ok(())
    }

    /// Start the live preview. Idempotent: a second call while previewing
    /// touches nothing. Preview always runs at the live resolution, which
    /// restores it after a capture raised it.
    pub fn start_preview(&mut self) -> Result<(), String> {
        if self.previewing {
            return Ok(());
        }
        if self.resolution != PREVIEW_RESOLUTION {
            self.set_resolution(PREVIEW_RESOLUTION)?;
        }
        self.backend.preview_on()?;
        self.previewing = true;
        Ok(())
    }

    pub fn stop_preview(&mut self) -> Result<(), String> {
        if !self.previewing {
            return Ok(());
        }
        self.backend.preview_off()?;
        self.previewing = false;
        Ok(())
    }

    /// Apply a visual effect. Total over the vocabulary: unknown names
    /// have already been mapped to `Filter::None` by the caller.
    pub fn set_effect(&mut self, effect: Filter) -> Result<(), String> {
        self.backend.apply_effect(effect)
    }

    /// Stop the preview, switch to the still resolution and write `path`.
    pub fn capture_still(&mut self, path: &Path) -> Result<(), String> {
        self.stop_preview()?;
        self.set_resolution(CAPTURE_RESOLUTION)?;
        self.backend.capture(path)
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }
}

// ============================================
// Raspistill backend
// ============================================

/// Drives the Pi camera through `raspistill`.
///
/// The preview is a spawned `raspistill -t 0` child killed on
/// `preview_off`; setting changes while previewing respawn it with the new
/// flags, since the tool reads its configuration only at startup.
pub struct RaspistillCamera {
    resolution: (u32, u32),
    saturation: u8,
    brightness: u8,
    effect: Filter,
    preview: Option<Child>,
}

impl RaspistillCamera {
    pub fn new() -> Self {
        Self {
            resolution: PREVIEW_RESOLUTION,
            saturation: SATURATION,
            brightness: BRIGHTNESS,
            effect: Filter::None,
            preview: None,
        }
    }

    /// raspistill spells one effect differently from the booth vocabulary.
    fn ifx_name(effect: Filter) -> &'static str {
        match effect {
            Filter::Watercolor => "watercolour",
            other => other.name(),
        }
    }

    fn respawn_preview(&mut self) -> Result<(), String> {
        self.kill_preview();
        let (width, height) = self.resolution;
        let child = Command::new("raspistill")
            .args(["-t", "0"])
            .args(["-p", &format!("0,0,{},{}", width, height)])
            .args(["-ifx", Self::ifx_name(self.effect)])
            .args(["-sa", &self.saturation.to_string()])
            .args(["-br", &self.brightness.to_string()])
            .spawn()
            .map_err(|e| format!("Failed to start camera preview: {}", e))?;
        self.preview = Some(child);
        Ok(())
    }

    fn kill_preview(&mut self) {
        if let Some(mut child) = self.preview.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Default for RaspistillCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for RaspistillCamera {
    fn apply_resolution(&mut self, width: u32, height: u32) -> Result<(), String> {
        self.resolution = (width, height);
        if self.preview.is_some() {
            self.respawn_preview()?;
        }
        Ok(())
    }

    fn apply_saturation(&mut self, value: u8) -> Result<(), String> {
        self.saturation = value;
        if self.preview.is_some() {
            self.respawn_preview()?;
        }
        Ok(())
    }

    fn apply_brightness(&mut self, value: u8) -> Result<(), String> {
        self.brightness = value;
        if self.preview.is_some() {
            self.respawn_preview()?;
        }
        Ok(())
    }

    fn apply_effect(&mut self, effect: Filter) -> Result<(), String> {
        self.effect = effect;
        if self.preview.is_some() {
            self.respawn_preview()?;
        }
        Ok(())
    }

    fn preview_on(&mut self) -> Result<(), String> {
        self.respawn_preview()
    }

    fn preview_off(&mut self) -> Result<(), String> {
        self.kill_preview();
        Ok(())
    }

    fn capture(&mut self, path: &Path) -> Result<(), String> {
        let (width, height) = self.resolution;
        let output = Command::new("raspistill")
            .arg("-o")
            .arg(path)
            .args(["-w", &width.to_string()])
            .args(["-h", &height.to_string()])
            .args(["-ifx", Self::ifx_name(self.effect)])
            .args(["-sa", &self.saturation.to_string()])
            .args(["-br", &self.brightness.to_string()])
            .args(["-t", "1"])
            .output()
            .map_err(|e| format!("Failed to run raspistill: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("raspistill error: {}", stderr));
        }
        Ok(())
    }
}

impl Drop for RaspistillCamera {
    fn drop(&mut self) {
        self.kill_preview();
    }
}

// ============================================
// Fake backend (development without hardware)
// ============================================

/// Logs every call and writes a placeholder file on capture.
pub struct FakeCamera;

impl CameraBackend for FakeCamera {
    fn apply_resolution(&mut self, width: u32, height: u32) -> Result<(), String> {
        eprintln!("[camera] fake: resolution {}x{}", width, height);
        Ok(())
    }

    fn apply_saturation(&mut self, value: u8) -> Result<(), String> {
        eprintln!("[camera] fake: saturation {}", value);
        Ok(())
    }

    fn apply_brightness(&mut self, value: u8) -> Result<(), String> {
        eprintln!("[camera] fake: brightness {}", value);
        Ok(())
    }

    fn apply_effect(&mut self, effect: Filter) -> Result<(), String> {
        eprintln!("[camera] fake: effect {}", effect.name());
        Ok(())
    }

    fn preview_on(&mut self) -> Result<(), String> {
        eprintln!("[camera] fake: preview on");
        Ok(())
    }

    fn preview_off(&mut self) -> Result<(), String> {
        eprintln!("[camera] fake: preview off");
        Ok(())
    }

    fn capture(&mut self, path: &Path) -> Result<(), String> {
        std::fs::write(path, b"fake capture\n")
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        eprintln!("[camera] fake: captured to {}", path.display());
        Ok(())
    }
}
