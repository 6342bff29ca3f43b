//! # Candela CLI
//!
//! Command-line interface for thermal receipt printing over USB and BLE.
//!
//! ## Usage
//!
//! ```bash
//! # Discover printers on all transports
//! candela scan
//!
//! # Discover only BLE printers, as JSON
//! candela scan --ble --json
//!
//! # Print an image to a printer found by scan, cut afterwards
//! candela print receipt.png --address usb:001-004 --cut
//!
//! # List built-in capability profiles
//! candela profiles
//!
//! # Show Bluetooth radio state / request enable
//! candela bluetooth
//! candela bluetooth --turn-on
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use candela::{
    CandelaError, CapabilityProfile, ConnectionManager, ConnectionType, RasterImage, Transport,
    job::{PrintOptions, RenderOptions},
    protocol::commands,
    transport::{BleTransport, UsbTransport},
};

/// Candela - thermal receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "candela")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover printers
    Scan {
        /// Scan duration in seconds
        #[arg(long, default_value = "4")]
        duration: u64,

        /// Scan USB only
        #[arg(long)]
        usb: bool,

        /// Scan BLE only
        #[arg(long)]
        ble: bool,

        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print an image file to a printer
    Print {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,

        /// Printer address as reported by scan (first found if omitted)
        #[arg(long)]
        address: Option<String>,

        /// Paper width profile: 58mm or 80mm
        #[arg(long, default_value = "80mm")]
        paper: String,

        /// Resize to this width in dots before printing
        #[arg(long)]
        width: Option<u32>,

        /// Cut the paper after printing
        #[arg(long)]
        cut: bool,

        /// Transmission chunk size in bytes (transport default if omitted)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Band height in rows for vertical image banding
        #[arg(long)]
        band_height: Option<u32>,

        /// Scan duration in seconds before printing
        #[arg(long, default_value = "4")]
        duration: u64,
    },

    /// List built-in capability profiles
    Profiles,

    /// Show Bluetooth radio state
    Bluetooth {
        /// Request the radio be enabled (fire-and-forget)
        #[arg(long)]
        turn_on: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), CandelaError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            duration,
            usb,
            ble,
            json,
        } => scan(duration, requested_types(usb, ble), json).await,
        Commands::Print {
            image,
            address,
            paper,
            width,
            cut,
            chunk_size,
            band_height,
            duration,
        } => {
            print_image(
                image,
                address,
                paper,
                width,
                cut,
                chunk_size,
                band_height,
                duration,
            )
            .await
        }
        Commands::Profiles => {
            let profiles = CapabilityProfile::built_in();
            println!("{}", serde_json::to_string_pretty(&profiles)?);
            Ok(())
        }
        Commands::Bluetooth { turn_on } => bluetooth(turn_on).await,
    }
}

fn requested_types(usb: bool, ble: bool) -> Vec<ConnectionType> {
    match (usb, ble) {
        (true, false) => vec![ConnectionType::Usb],
        (false, true) => vec![ConnectionType::Ble],
        _ => vec![ConnectionType::Usb, ConnectionType::Ble],
    }
}

/// Build a manager over whichever transports this host supports.
async fn build_manager(types: &[ConnectionType]) -> Result<Arc<ConnectionManager>, CandelaError> {
    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();

    if types.contains(&ConnectionType::Usb) {
        match UsbTransport::new() {
            Ok(t) => transports.push(Arc::new(t)),
            Err(e) => eprintln!("USB unavailable: {}", e),
        }
    }
    if types.contains(&ConnectionType::Ble) {
        match BleTransport::new().await {
            Ok(t) => transports.push(Arc::new(t)),
            Err(e) => eprintln!("BLE unavailable: {}", e),
        }
    }

    if transports.is_empty() {
        return Err(CandelaError::Transport(
            "No usable transport on this host".to_string(),
        ));
    }
    Ok(Arc::new(ConnectionManager::new(transports)))
}

async fn scan(
    duration: u64,
    types: Vec<ConnectionType>,
    json: bool,
) -> Result<(), CandelaError> {
    let manager = build_manager(&types).await?;
    // A scan over a missing transport is an error; filter upfront
    let types: Vec<ConnectionType> = types
        .into_iter()
        .filter(|t| manager.has_transport(*t))
        .collect();

    eprintln!("Scanning for {}s...", duration);
    let printers = manager
        .get_printers(Duration::from_secs(duration), &types, false)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&printers)?);
    } else if printers.is_empty() {
        println!("No printers found.");
    } else {
        for printer in &printers {
            println!(
                "{}  {}  [{}]",
                printer.address,
                printer.name.as_deref().unwrap_or("(unnamed)"),
                printer.connection_type,
            );
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn print_image(
    image: PathBuf,
    address: Option<String>,
    paper: String,
    width: Option<u32>,
    cut: bool,
    chunk_size: Option<usize>,
    band_height: Option<u32>,
    duration: u64,
) -> Result<(), CandelaError> {
    let profile = CapabilityProfile::parse(&paper).map_err(CandelaError::Transport)?;
    let bitmap = RasterImage::decode(&std::fs::read(&image)?)?;

    let manager = build_manager(&[ConnectionType::Usb, ConnectionType::Ble]).await?;
    let types: Vec<ConnectionType> = [ConnectionType::Usb, ConnectionType::Ble]
        .into_iter()
        .filter(|t| manager.has_transport(*t))
        .collect();

    eprintln!("Scanning for {}s...", duration);
    let printers = manager
        .get_printers(Duration::from_secs(duration), &types, false)
        .await?;

    let target = match address {
        Some(address) => address,
        None => printers
            .first()
            .map(|p| p.address.clone())
            .ok_or_else(|| CandelaError::Transport("No printers found".to_string()))?,
    };
    manager.set_printer_profile(&target, profile);

    eprintln!("Connecting to {}...", target);
    if !manager.connect(&target).await? {
        return Err(CandelaError::Transport(format!(
            "Could not connect to {}",
            target
        )));
    }

    // Reset the printer, then send the rendered job
    manager.print_data(&target, &commands::init(), false, None).await?;

    let options = PrintOptions {
        render: RenderOptions {
            custom_width: width,
            cut_after_printed: cut,
            band_height,
            ..Default::default()
        },
        long_data: true,
        chunk_size,
    };
    candela::print_rendered(&manager, &target, &bitmap, &options).await?;

    manager.disconnect(&target).await?;
    println!("Printed {} to {}", image.display(), target);
    Ok(())
}

async fn bluetooth(turn_on: bool) -> Result<(), CandelaError> {
    let manager = build_manager(&[ConnectionType::Ble]).await?;
    if turn_on {
        manager.turn_on_bluetooth();
        println!("Radio enable requested.");
        // Fire-and-forget: give the spawned request a moment to land
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!(
        "Bluetooth radio: {}",
        if manager.is_ble_turned_on().await { "on" } else { "off" }
    );
    Ok(())
}
