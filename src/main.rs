//! USB Link Speed Tray - CLI entry point.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use usb_link_speed_tray::config::{Config, example_config, generate_config};
use usb_link_speed_tray::logging::setup_logging;
use usb_link_speed_tray::sysfs::SysfsScanner;
use usb_link_speed_tray::tray::{Presenter, SpeedIndicator, TrayHandle};

#[derive(Parser)]
#[command(name = "usb-link-speed-tray")]
#[command(about = "Tray indicator for USB storage link speed")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (default: auto-detect)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging to stderr
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan once and print attached USB storage devices
    List,

    /// Print blank example config file
    InitConfig,

    /// Generate config from currently attached devices
    GenerateConfig {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions early (doesn't need config or logging)
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "usb-link-speed-tray", &mut std::io::stdout());
        return Ok(());
    }

    setup_logging(if cli.debug { "debug" } else { "info" })?;
    debug!("debug logging enabled");

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };

    let scanner = SysfsScanner::new();

    match cli.command {
        Some(Commands::List) => {
            print_device_list(&scanner, config);
        }
        Some(Commands::InitConfig) => {
            print!("{}", example_config());
        }
        Some(Commands::GenerateConfig { output }) => {
            let content = generate_config(&scanner.scan());
            match output {
                Some(path) => {
                    std::fs::write(&path, &content)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Config written to {}", path.display());
                    eprintln!("Edit the file to customize labels, then copy to one of:");
                    eprintln!("  ./usb-link-speed-tray.toml");
                    eprintln!("  ~/.config/usb-link-speed-tray/config.toml");
                    eprintln!("  /etc/usb-link-speed-tray.toml");
                }
                None => print!("{}", content),
            }
        }
        Some(Commands::Completions { .. }) => {
            // Handled above before loading config
            unreachable!()
        }
        None => {
            // Default: run the tray
            run_tray(scanner, config).await?;
        }
    }

    Ok(())
}

fn print_device_list(scanner: &SysfsScanner, config: Config) {
    let snapshot = scanner.scan();
    let presenter = Presenter::new(config);

    if snapshot.is_empty() {
        println!("No USB storage");
        return;
    }

    for record in &snapshot {
        let generation = record
            .usb_speed()
            .map(|speed| speed.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "[{}] {}  {}",
            record.usb_path,
            presenter.row_text(record),
            generation
        );
        if let Some(vid_pid) = record.vid_pid() {
            println!("    ID: {}", vid_pid);
        }
        if let Some(serial) = &record.serial {
            println!("    Serial: {}", serial);
        }
    }
}

async fn run_tray(scanner: SysfsScanner, config: Config) -> Result<()> {
    let interval = config.settings.refresh_interval();
    info!("tray app starting, refresh interval {} ms", interval.as_millis());

    let (quit_tx, mut quit_rx) = mpsc::unbounded_channel();
    let indicator = SpeedIndicator::new(config.settings.icon_name.clone(), quit_tx);
    let tray = TrayHandle::spawn(indicator)
        .await
        .context("failed to start tray")?;

    let mut presenter = Presenter::new(config);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let scan = scanner.clone();
                let snapshot = match tokio::task::spawn_blocking(move || scan.scan()).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!("scan task failed: {}", e);
                        continue;
                    }
                };
                if let Some(view) = presenter.observe(snapshot) {
                    tray.show(view).await.context("failed to update tray")?;
                }
            }
            _ = quit_rx.recv() => {
                info!("quit requested from tray menu");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = sigterm.recv() => {
                info!("terminated");
                break;
            }
        }
    }

    tray.shutdown().await;
    Ok(())
}
