//! `mixstore`: prepare and inspect MIX device media.
//!
//! The emulator core keeps device contents in versioned stores
//! behind a key-value seam; this tool works those stores from the
//! command line so that tape and disk images can be installed, card
//! decks loaded, and the version chain a program produced examined
//! afterwards.  The media live in a directory, one file per device
//! version.
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use vm::{DeviceConfig, DeviceCursor, DeviceRegistry, VersionId};

mod dirstore;
mod dump;

use dirstore::DirStore;

#[derive(Debug, Parser)]
#[command(name = "mixstore", about = "Prepare and inspect MIX device media")]
struct Cli {
    /// Directory holding the device media.
    #[arg(long, default_value = "devices")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install a raw image file as the initial contents of a block
    /// device (tape, disk, paper tape).
    SaveBlock { device: u8, file: PathBuf },

    /// Install a text file as the data a line-input device will
    /// supply (the card deck).
    SaveLines { device: u8, file: PathBuf },

    /// Print all data of one device state.
    Dump {
        device: u8,
        /// Version to show; defaults to the latest.
        #[arg(long)]
        version: Option<u32>,
    },

    /// List a device's version chain.
    Versions { device: u8 },

    /// Adopt every device's latest state as the new baseline,
    /// discarding the version history.
    Accept,
}

fn open_registry(store: &Path) -> DeviceRegistry {
    DeviceRegistry::new(
        DeviceConfig::mix_standard(),
        Box::new(DirStore::new(&store.join("block"))),
        Box::new(DirStore::new(&store.join("line-out"))),
        Box::new(DirStore::new(&store.join("line-in"))),
    )
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = open_registry(&cli.store);
    match cli.command {
        Command::SaveBlock { device, file } => {
            let raw = std::fs::read(&file)?;
            let words = bytes_to_words(&raw, raw.len().div_ceil(WORD_BYTES));
            registry.save_block_device(DeviceId::from(device), &words)?;
            event!(
                Level::INFO,
                "device {}: installed {} words from {}",
                device,
                words.len(),
                file.display()
            );
        }
        Command::SaveLines { device, file } => {
            let text = std::fs::read_to_string(&file)?;
            registry.save_line_device(DeviceId::from(device), text.trim_end_matches('\n'))?;
            event!(
                Level::INFO,
                "device {}: installed input from {}",
                device,
                file.display()
            );
        }
        Command::Dump { device, version } => {
            let device = DeviceId::from(device);
            let version = match version {
                Some(number) => VersionId::new(number),
                None => registry
                    .list_versions(device)?
                    .last()
                    .copied()
                    .unwrap_or(VersionId::ZERO),
            };
            let snapshot = registry.snapshot_data(
                device,
                DeviceCursor {
                    version,
                    read_position: 0,
                },
            )?;
            dump::print_snapshot(&snapshot)?;
        }
        Command::Versions { device } => {
            for version in registry.list_versions(DeviceId::from(device))? {
                println!("{version}");
            }
        }
        Command::Accept => {
            registry.accept_current_all()?;
            event!(Level::INFO, "all device chains rebased to version 0");
        }
    }
    Ok(())
}

fn main() {
    // See
    // https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match run(Cli::parse()) {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
