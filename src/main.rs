//! Camera QR scanner binary: scan from a live camera or an image file.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use qr_cam_capture::{
    CameraEngine, Facing, ScanConfig, ScanController, V4l2Backend,
};

/// Exit code when no QR code was detected.
const EXIT_NO_CODE: i32 = 2;
/// Exit code when the scan was interrupted (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "qr-cam-capture",
    about = "Scan QR codes from a camera or an image file",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the camera and scan until a code is detected
    Scan(ScanArgs),
    /// Decode a QR code from an image file
    File {
        /// Image file to scan
        path: PathBuf,
        /// Copy the decoded text to the clipboard
        #[arg(long)]
        copy: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Camera facing to start with ("back" or "front")
    #[arg(long, default_value = "back", value_parser = parse_facing)]
    facing: Facing,
    /// Give up after this many seconds (0 scans until interrupted)
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Decode attempts per second
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Try the opposite camera once if nothing was found in time
    #[arg(long)]
    switch_on_timeout: bool,
    /// Copy the decoded text to the clipboard
    #[arg(long)]
    copy: bool,
    /// Directory to save the captured frame into
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,
    /// V4L2 device index for the back camera
    #[arg(long, default_value_t = 0, env = "QR_CAM_BACK")]
    device_back: u32,
    /// V4L2 device index for the front camera
    #[arg(long, default_value_t = 1, env = "QR_CAM_FRONT")]
    device_front: u32,
}

fn parse_facing(value: &str) -> Result<Facing, String> {
    value.parse()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => run_scan(&args),
        Command::File { path, copy } => run_file(&path, copy),
    }
}

fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    let config = ScanConfig::default()
        .with_fps(args.fps)
        .with_scan_timeout((args.timeout > 0).then(|| Duration::from_secs(args.timeout)));
    let backend = V4l2Backend::new(args.device_back, args.device_front);
    let mut controller =
        ScanController::new(CameraEngine::new(backend), config).with_facing(args.facing);

    let interrupted = controller.interrupt_handle();
    let handler_flag = controller.interrupt_handle();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupted, stopping the camera...");
    })
    .context("failed to install the Ctrl+C handler")?;

    controller.open_camera()?;
    let mut found = controller.start_scanning()?;

    if found.is_none() && args.switch_on_timeout && !interrupted.load(Ordering::SeqCst) {
        log::info!(
            "nothing on the {} camera, trying the other side",
            controller.facing()
        );
        controller.switch_camera()?;
        found = controller.start_scanning()?;
    }

    match found {
        Some(text) => {
            println!("{text}");
            if args.copy {
                notice(controller.copy_result());
            }
            if let Some(dir) = &args.save_dir {
                match controller.save_capture(dir) {
                    Ok(path) => eprintln!("Saved capture to {}", path.display()),
                    Err(err) => eprintln!("Notice: {err}"),
                }
            }
            Ok(0)
        }
        None if interrupted.load(Ordering::SeqCst) => Ok(EXIT_INTERRUPTED),
        None => {
            eprintln!("No QR code detected.");
            Ok(EXIT_NO_CODE)
        }
    }
}

fn run_file(path: &Path, copy: bool) -> anyhow::Result<i32> {
    let engine = CameraEngine::new(V4l2Backend::default());
    let mut controller = ScanController::new(engine, ScanConfig::default());

    let text = controller.scan_from_file(path)?;
    println!("{text}");
    if copy {
        notice(controller.copy_result());
    }
    Ok(0)
}

fn notice(outcome: qr_cam_capture::traits::Result<()>) {
    if let Err(err) = outcome {
        eprintln!("Notice: {err}");
    }
}
