/*!
Edge IE mode site list configurator
*/

use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, Command, crate_version};
use sitelist_engine::{AssumeElevated, Collaborators, Elevator, Reconciler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::config::{PolicyBackend, SiteListConfig};
use crate::core::elevation::SystemElevator;
use crate::core::menu::{Menu, MenuOutcome};
use crate::core::notifier::NotificationManager;

mod core;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("IE Mode Site List")
        .version(crate_version!())
        .about("Manages the Microsoft Edge IE mode site list and its policy values")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a TOML configuration file")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .help("Directory for the site list, deletion history and policy backup")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("policy-file")
                .long("policy-file")
                .help("Write policy values to this JSON file instead of the registry")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Log filter used when RUST_LOG is not set")
                .value_name("LEVEL")
                .default_value("info"),
        )
        .arg(
            Arg::new("skip-elevation")
                .long("skip-elevation")
                .help("Do not check for or request administrator rights")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .help("Skip the notice shown before editing")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = SiteListConfig::discover(matches.get_one::<String>("config").map(Path::new))?;
    if let Some(dir) = matches.get_one::<String>("config-dir") {
        config.storage.config_dir = PathBuf::from(dir);
    }
    if let Some(path) = matches.get_one::<String>("policy-file") {
        config.policy.backend = PolicyBackend::JsonFile {
            path: PathBuf::from(path),
        };
    }

    let elevator: Box<dyn Elevator> = if matches.get_flag("skip-elevation") || !config.policy.needs_elevation() {
        Box::new(AssumeElevated)
    } else {
        Box::new(SystemElevator)
    };
    if !elevator.is_elevated() {
        println!("Administrator rights are required to change the Edge policy; requesting them...");
        elevator.relaunch_elevated()?;
        return Ok(());
    }

    let layout = config.layout();
    std::fs::create_dir_all(&config.storage.config_dir)?;

    let mut menu = Menu::stdio();
    if !matches.get_flag("yes") {
        menu.show_security_notice(&layout, &config.policy.key)?;
    }

    let collaborators = Collaborators {
        policy: config.policy.build_store(),
        elevator,
        notifier: Box::new(NotificationManager::new(&config.effective_notifications())),
    };
    let mut driver = Reconciler::load(&layout, config.policy.values.clone(), collaborators)?;
    info!("🚀 Editing {}", layout.document.display());

    if menu.run(&mut driver)? == MenuOutcome::Abort {
        warn!("Input closed before finishing; site list and policy left unchanged");
        return Ok(());
    }

    let converged = driver.finish();
    if !converged.report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
