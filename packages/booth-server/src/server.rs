//! Wiring: hardware selection, sockets, machine lifetime and shutdown.

use std::path::PathBuf;

use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use booth_core::camera::{self, CameraAdapter, CameraBackend, FakeCamera, RaspistillCamera};
use booth_core::channel::CommandChannel;
use booth_core::machine::{BoothMachine, MachineCommand};
use booth_core::print::{LogPrinter, LpPrinter, PrintService};

use crate::push;

#[derive(Args)]
pub struct ServerArgs {
    /// Port for the touchscreen command socket
    #[arg(long, default_value = "12345")]
    pub port: u16,

    /// Host to bind both sockets to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the presentation-layer notification stream
    #[arg(long, default_value = "12346")]
    pub ui_port: u16,

    /// Where the captured still is written (defaults to ~/booth_capture.jpg)
    #[arg(long)]
    pub capture_path: Option<PathBuf>,

    /// Printer queue name handed to lp (system default queue when omitted)
    #[arg(long)]
    pub printer: Option<String>,

    /// Log hardware actions instead of driving the camera and printer
    #[arg(long)]
    pub fake_hardware: bool,
}

pub async fn run(args: ServerArgs) {
    let fake = args.fake_hardware || std::env::var("BOOTH_FAKE_HARDWARE").is_ok();
    let capture_path = args.capture_path.unwrap_or_else(camera::default_capture_path);
    let spool_dir = capture_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    // Presentation stream first, so the UI can attach before the booth
    // starts cycling.
    let (ui_tx, _) = broadcast::channel(256);
    let ui_addr = format!("{}:{}", args.host, args.ui_port);
    match TcpListener::bind(&ui_addr).await {
        Ok(listener) => {
            tokio::spawn(push::serve(listener, ui_tx.clone()));
        }
        Err(e) => {
            eprintln!("[server] failed to bind presentation socket {}: {}", ui_addr, e);
            std::process::exit(1);
        }
    }

    let backend: Box<dyn CameraBackend> = if fake {
        eprintln!("[server] using fake hardware");
        Box::new(FakeCamera)
    } else {
        Box::new(RaspistillCamera::new())
    };
    let camera = match CameraAdapter::new(backend) {
        Ok(camera) => camera,
        Err(e) => {
            eprintln!("[server] camera init failed: {}", e);
            std::process::exit(1);
        }
    };
    let printer: Box<dyn PrintService> = if fake {
        Box::new(LogPrinter)
    } else {
        Box::new(LpPrinter::new(args.printer, spool_dir))
    };
    let emitter = Box::new(push::BroadcastEmitter::new(ui_tx));

    let channel = match CommandChannel::bind(&args.host, args.port).await {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("[server] failed to bind command socket: {}", e);
            std::process::exit(1);
        }
    };

    println!("booth controller listening on {}:{}", args.host, args.port);
    println!("presentation stream on {}", ui_addr);

    let (mut machine, command_tx) = BoothMachine::new(camera, printer, emitter, capture_path);
    let mut runner = tokio::spawn(async move { machine.run(channel).await });

    tokio::select! {
        result = &mut runner => report(result),
        _ = signal::ctrl_c() => {
            println!("shutting down");
            let _ = command_tx.send(MachineCommand::Shutdown).await;
            report(runner.await);
        }
    }
}

fn report(result: Result<Result<(), String>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => eprintln!("[server] controller failed: {}", e),
        Err(e) => eprintln!("[server] controller task panicked: {}", e),
    }
}
