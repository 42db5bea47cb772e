// GUI-subsystem binary: no console window is allocated on Windows.
#![windows_subsystem = "windows"]

use clap::Parser;
use eframe::egui;
use maskpad::app::MaskpadApp;
use maskpad::settings::AppSettings;
use maskpad::{cli, log_err, logger};

fn main() -> Result<(), eframe::Error> {
    // Initialize session log (overwrites previous session log)
    logger::init();

    // Settings from disk, then per-launch CLI overrides
    let args = cli::CliArgs::parse();
    let mut settings = AppSettings::load();
    args.apply_to(&mut settings);

    if let Err(e) = settings.validate() {
        log_err!("Refusing to start: {}", e);
        eprintln!("maskpad: {}", e);
        std::process::exit(2);
    }
    if args.resume.is_some() && !settings.caps.upload {
        let msg = "--resume requires the upload capability";
        log_err!("Refusing to start: {}", msg);
        eprintln!("maskpad: {}", msg);
        std::process::exit(2);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("Maskpad"),
        ..Default::default()
    };

    eframe::run_native(
        "Maskpad",
        options,
        Box::new(move |cc| Box::new(MaskpadApp::new(cc, settings, args.image, args.resume))),
    )
}
