//! `modelt-sim`: host tool for the Model-T boot and update core.
//!
//! ```text
//! modelt-sim pack --input app.bin --output app.img --version 1.2.0
//! modelt-sim inspect app.img
//! modelt-sim simulate --update app.img --declare-size
//! ```
//!
//! `simulate` runs the real bootloader and OTA task against an in-memory
//! NOR flash: first boot, a complete download fed through the OTA command
//! channel as postcard frames, then the reboot that installs the update.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use futures_lite::future;
use log::{info, warn};

use modelt::adapters::flash_store::FlashPartitionStore;
use modelt::adapters::log_sink::LogEventSink;
use modelt::adapters::platform::{SimPlatform, StdDelay};
use modelt::adapters::sim_flash::SimFlash;
use modelt::app::ports::{NetworkError, PartitionStore, StorageError, UpdateSource};
use modelt::boot::{BootOutcome, Bootloader, bootloader_version};
use modelt::bus::{BusAdapter, OTA_COMMANDS, SYSTEM_EVENTS};
use modelt::config::SystemConfig;
use modelt::image::{self, HEADER_SLOT_SIZE, Version, pack_image};
use modelt::ota::frame::{self, MAX_FRAME_LEN, OtaBeginPacket, OtaDataPacket, OtaMessage};
use modelt::ota::{OtaPorts, OtaTask};
use modelt::partition::{PartitionId, PartitionLayout};

#[derive(Parser)]
#[command(name = "modelt-sim", version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wrap a raw application binary with an image header
    Pack {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Image version in MAJOR.MINOR.PATCH form
        #[arg(long, default_value = "1.0.0")]
        version: Version,
    },

    /// Print and verify the header of an image file
    Inspect { file: PathBuf },

    /// Boot, update over the air and reboot a simulated device
    Simulate {
        /// JSON file overriding the default configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Image to install; a generated one is used if omitted
        #[arg(long)]
        update: Option<PathBuf>,

        /// Announce the image size in the Begin frame
        #[arg(long, default_value_t = false)]
        declare_size: bool,

        /// Flip a payload bit of the update before sending it
        #[arg(long, default_value_t = false)]
        corrupt_update: bool,

        /// Leave the active partition erased before the first boot
        #[arg(long, default_value_t = false)]
        blank_active: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()
        .context("installing logger")?;

    match cli.command {
        Commands::Pack {
            input,
            output,
            version,
        } => pack(&input, &output, version),
        Commands::Inspect { file } => inspect(&file),
        Commands::Simulate {
            config,
            update,
            declare_size,
            corrupt_update,
            blank_active,
        } => simulate(&SimulateArgs {
            config,
            update,
            declare_size,
            corrupt_update,
            blank_active,
        }),
    }
}

// ── pack / inspect ────────────────────────────────────────────

fn pack(input: &Path, output: &Path, version: Version) -> Result<()> {
    let payload = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if payload.len() < 8 {
        bail!("payload must start with a vector table (at least 8 bytes)");
    }
    let img = pack_image(version, &payload);
    fs::write(output, &img).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Packed v{} ({} payload bytes, crc 0x{:08x}) into {}",
        version,
        payload.len(),
        image::crc32(&payload),
        output.display()
    );
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    match image::AppImageHeader::parse(&bytes) {
        Some(h) if h.has_valid_magic() => println!(
            "{}: v{} img_size={} crc=0x{:08x}",
            file.display(),
            h.version(),
            h.img_size(),
            h.crc()
        ),
        _ => println!("{}: no image header", file.display()),
    }
    match image::check_bytes(&bytes) {
        Ok(_) => {
            println!("VALID");
            Ok(())
        }
        Err(e) => bail!("INVALID: {e}"),
    }
}

// ── simulate ──────────────────────────────────────────────────

struct SimulateArgs {
    config: Option<PathBuf>,
    update: Option<PathBuf>,
    declare_size: bool,
    corrupt_update: bool,
    blank_active: bool,
}

/// Network collaborator that is always connected.
struct SimNetwork;

impl UpdateSource for SimNetwork {
    fn request_image(&mut self, current: Version) -> Result<(), NetworkError> {
        info!("sim: API server asked for an image newer than v{}", current);
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<SystemConfig> {
    let config = match path {
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => SystemConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Image with a plausible vector table followed by filler.
fn demo_image(layout: &PartitionLayout, version: Version, len: usize) -> Vec<u8> {
    let entry = layout.xip_address(PartitionId::Active, HEADER_SLOT_SIZE + 0x40) | 1;
    let mut payload = Vec::with_capacity(len.max(8));
    payload.extend_from_slice(&0x2002_0000u32.to_le_bytes());
    payload.extend_from_slice(&entry.to_le_bytes());
    payload.extend((8..len).map(|i| (i as u8) ^ version.minor));
    pack_image(version, &payload)
}

fn provision(
    store: &mut impl PartitionStore,
    id: PartitionId,
    bytes: &[u8],
) -> Result<(), StorageError> {
    store.clear(id)?;
    let mut w = store.open_for_write(id)?;
    store.write(&mut w, bytes)?;
    store.flush(&mut w)
}

fn build_frames(img: &[u8], chunk: usize, declare_size: bool) -> Result<Vec<Vec<u8>>> {
    let mut buf = [0u8; MAX_FRAME_LEN];
    let mut frames = Vec::new();

    let begin = OtaMessage::Begin(OtaBeginPacket {
        image_size: declare_size.then_some(img.len() as u32),
    });
    frames.push(frame::encode(&begin, &mut buf)?.to_vec());

    let count = img.len().div_ceil(chunk);
    for (i, part) in img.chunks(chunk).enumerate() {
        let data = heapless::Vec::from_slice(part).map_err(|()| anyhow!("chunk too large"))?;
        let msg = OtaMessage::Data(OtaDataPacket {
            data,
            last: i + 1 == count,
        });
        frames.push(frame::encode(&msg, &mut buf)?.to_vec());
    }
    Ok(frames)
}

fn corrupt_last_byte(img: &mut [u8]) -> Result<()> {
    let Some(last) = img.last_mut() else {
        bail!("update image is empty, nothing to corrupt");
    };
    *last ^= 0x01;
    Ok(())
}

fn report(label: &str, outcome: BootOutcome) {
    match outcome {
        BootOutcome::Execute(entry) => println!(
            "{label}: executing image at 0x{:08x} (sp=0x{:08x} pc=0x{:08x})",
            entry.vector_table, entry.stack_pointer, entry.reset_vector
        ),
        BootOutcome::Halt => println!("{label}: HALT, no bootable image"),
    }
}

fn simulate(args: &SimulateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let layout = config.layout.clone();
    info!("bootloader v{}", bootloader_version());

    let flash = SimFlash::new(layout.flash_size() as usize);
    let mut store =
        FlashPartitionStore::new(flash, layout.clone()).context("building partition store")?;

    provision(
        &mut store,
        PartitionId::Recovery,
        &demo_image(&layout, Version::new(0, 9, 0), 2048),
    )
    .context("provisioning recovery")?;
    if !args.blank_active {
        provision(
            &mut store,
            PartitionId::Active,
            &demo_image(&layout, config.firmware_version, 4096),
        )
        .context("provisioning active")?;
    }

    let mut platform = SimPlatform::new();
    let mut sink = LogEventSink::new();
    let mut bootloader = Bootloader::new(&config);

    let first = bootloader.run(&mut store, &mut platform, &mut sink);
    report("first boot", first);
    if first == BootOutcome::Halt {
        return Ok(());
    }

    // ── OTA download ──────────────────────────────────────────
    let mut update = match &args.update {
        Some(p) => fs::read(p).with_context(|| format!("reading {}", p.display()))?,
        None => {
            let next = Version::new(
                config.firmware_version.major,
                config.firmware_version.minor.wrapping_add(1),
                0,
            );
            demo_image(&layout, next, 6000)
        }
    };
    if args.corrupt_update {
        corrupt_last_byte(&mut update)?;
    }
    let frames = build_frames(&update, config.max_chunk_size as usize, args.declare_size)?;

    let bus = BusAdapter::new(&SYSTEM_EVENTS).context("no free publisher slot")?;
    let mut listener = SYSTEM_EVENTS
        .subscriber()
        .map_err(|_| anyhow!("no free subscriber slot"))?;

    let task = OtaTask::new(
        OtaPorts {
            store: &mut store,
            network: SimNetwork,
            bus,
            delay: StdDelay,
            platform: &mut platform,
            sink: LogEventSink::new(),
        },
        &config,
    );

    let ota = async {
        task.run(OTA_COMMANDS.receiver()).await;
        Ok::<bool, frame::FrameError>(true)
    };
    let transport = async {
        for f in &frames {
            OTA_COMMANDS.send(frame::decode(f)?).await;
        }
        // Every queued command has been handled once the queue drains.
        while !OTA_COMMANDS.is_empty() {
            future::yield_now().await;
        }
        Ok::<bool, frame::FrameError>(false)
    };
    let rebooted = future::block_on(future::or(ota, transport))?;

    if !rebooted {
        warn!("update was not installed; device keeps running the current image");
        return Ok(());
    }
    if listener.try_next_message_pure().is_some() {
        info!("sim: subscribers saw the shutdown broadcast");
    }

    // ── Reboot ────────────────────────────────────────────────
    let second = bootloader.run(&mut store, &mut platform, &mut sink);
    report("after update", second);
    if let Ok(h) = image::read_header(&mut store, PartitionId::Active) {
        println!("active image is now v{}", h.version());
    }
    Ok(())
}
