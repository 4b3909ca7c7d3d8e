use std::process::ExitCode;

use eframe::egui;

use nexuscape::app::NexusCapeApp;
use nexuscape::cli;
use nexuscape::logger;
use nexuscape::settings::EditorSettings;

fn main() -> ExitCode {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        return cli::run(args);
    }

    // -- GUI mode -----------------------------------------------------
    let settings = EditorSettings::load();

    // Initialize session log (overwrites previous session log)
    logger::init(settings.log_level);

    // First launch: write the defaults so they can be edited by hand.
    if EditorSettings::settings_path().is_some_and(|p| !p.exists()) {
        settings.save();
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 640.0])
            .with_min_inner_size([720.0, 420.0])
            .with_title("NexusCape"),
        ..Default::default()
    };

    let result = eframe::run_native(
        "NexusCape",
        options,
        Box::new(move |cc| Box::new(NexusCapeApp::new(cc, settings))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Window closed with error: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
