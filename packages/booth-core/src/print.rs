//! Print service: fire-and-forget submission of the framed still.

use std::path::PathBuf;
use std::process::Command;

/// Submission of a print job. The controller never consumes a result; a
/// failed submission is logged and the booth carries on.
pub trait PrintService: Send {
    fn print(&self, frame: u32, copies: u8);
}

/// Sends jobs to CUPS via `lp`.
pub struct LpPrinter {
    queue: Option<String>,
    spool_dir: PathBuf,
}

impl LpPrinter {
    /// `queue` of None uses the system default printer.
    pub fn new(queue: Option<String>, spool_dir: PathBuf) -> Self {
        Self { queue, spool_dir }
    }

    /// The framed image the processing stage wrote for `frame`.
    fn framed_path(&self, frame: u32) -> PathBuf {
        self.spool_dir.join(format!("framed_{}.jpg", frame))
    }
}

impl PrintService for LpPrinter {
    fn print(&self, frame: u32, copies: u8) {
        let path = self.framed_path(frame);
        let mut cmd = Command::new("lp");
        if let Some(queue) = &self.queue {
            cmd.args(["-d", queue]);
        }
        cmd.args(["-n", &copies.to_string()]).arg(&path);

        // lp returns as soon as the job is queued; nothing downstream
        // waits on the physical print.
        match cmd.status() {
            Ok(status) if status.success() => {
                eprintln!("[printer] submitted {} copies of {}", copies, path.display());
            }
            Ok(status) => {
                eprintln!("[printer] lp exited with {} for {}", status, path.display());
            }
            Err(e) => {
                eprintln!("[printer] failed to run lp: {}", e);
            }
        }
    }
}

/// Logs jobs instead of printing (development without a printer attached).
pub struct LogPrinter;

impl PrintService for LogPrinter {
    fn print(&self, frame: u32, copies: u8) {
        eprintln!("[printer] fake: would print {} copies of frame {}", copies, frame);
    }
}
