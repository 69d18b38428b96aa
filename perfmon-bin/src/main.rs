//! Command-line interface for i915-perfmon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use i915_perfmon::prelude::*;
use serde::Serialize;
use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "perfmon")]
#[command(version = i915_perfmon::VERSION)]
#[command(about = "Issue i915 perfmon control calls", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// DRM device node (auto-detect if not specified)
    #[arg(short, long, global = true, env = "PERFMON_DEVICE")]
    device: Option<PathBuf>,

    /// JSON device configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// List DRM device nodes
    Devices,

    /// Open a perfmon session
    Open,

    /// Close the perfmon session
    Close,

    /// Enable the loaded configuration
    Enable,

    /// Disable the loaded configuration
    Disable,

    /// Upload OA/GP register configurations
    SetConfig {
        /// What the configuration applies to
        #[arg(long, value_enum, default_value_t = Target::All)]
        target: Target,

        /// Process id for `--target pid`
        #[arg(long, default_value_t = 0)]
        pid: u32,

        /// JSON array of {"offset", "value"} OA register writes
        #[arg(long)]
        oa_file: Option<PathBuf>,

        /// OA configuration id
        #[arg(long, default_value_t = 0)]
        oa_id: u32,

        /// JSON array of {"offset", "value"} GP register writes
        #[arg(long)]
        gp_file: Option<PathBuf>,

        /// GP configuration id
        #[arg(long, default_value_t = 0)]
        gp_id: u32,
    },

    /// Load configurations into a context
    LoadConfig {
        /// GEM context id (device default if not specified)
        #[arg(long)]
        ctx: Option<u32>,

        /// Requested OA configuration id
        #[arg(long, default_value_t = 0)]
        oa_id: u32,

        /// Requested GP configuration id
        #[arg(long, default_value_t = 0)]
        gp_id: u32,
    },

    /// Query the hardware id of a context
    HwCtxId {
        /// GEM context id (device default if not specified)
        #[arg(long)]
        ctx: Option<u32>,
    },

    /// Query the hardware context ids of a process
    HwCtxIds {
        /// Process id
        #[arg(long)]
        pid: i32,

        /// Maximum number of ids to fetch, 1-1024 (config default if not specified)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_HW_CTX_IDS))]
        capacity: Option<u32>,
    },

    /// Show version information
    Version,
}

const MAX_HW_CTX_IDS: i64 = i915_perfmon::abi::I915_PERFMON_MAX_HW_CTX_IDS as i64;

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Target {
    Ctx,
    Pid,
    All,
}

impl From<Target> for ConfigTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Ctx => ConfigTarget::Ctx,
            Target::Pid => ConfigTarget::Pid,
            Target::All => ConfigTarget::All,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct LoadedConfig {
    ctx_id: u32,
    oa_id: u32,
    gp_id: u32,
}

#[derive(Serialize)]
struct HwCtxIdReport {
    ctx_id: u32,
    hw_ctx_id: u32,
}

#[derive(Serialize)]
struct HwCtxIdsReport {
    pid: i32,
    hw_ctx_ids: Vec<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DeviceConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    if cli.device.is_some() {
        config.device_path = cli.device.clone();
    }

    match &cli.command {
        Commands::Devices => {
            let devices = find_render_nodes();
            if devices.is_empty() {
                println!("No DRM devices found.");
            } else {
                println!("Found {} DRM device(s):", devices.len());
                for device in devices {
                    println!("  {}", device);
                }
            }
        }

        Commands::Version => {
            println!("perfmon v{}", i915_perfmon::version());
            println!("i915 perfmon ioctl 0x{:08x}", i915_perfmon::abi::DRM_IOCTL_I915_PERFMON);
        }

        command => {
            let file = config.open_device().context("opening DRM device")?;
            let device = DrmDevice::with_config(file.as_raw_fd(), &config);
            run(command, &device, &config, cli.format)?;
        }
    }

    Ok(())
}

fn run(
    command: &Commands,
    device: &DrmDevice,
    config: &DeviceConfig,
    format: OutputFormat,
) -> Result<()> {
    match command {
        Commands::Open => report_status("open", i915_perfmon::open(device))?,
        Commands::Close => report_status("close", i915_perfmon::close(device))?,
        Commands::Enable => report_status("enable", i915_perfmon::enable_config(device, true))?,
        Commands::Disable => report_status("disable", i915_perfmon::enable_config(device, false))?,

        Commands::SetConfig { target, pid, oa_file, oa_id, gp_file, gp_id } => {
            let oa = read_entries(oa_file.as_deref())?;
            let gp = read_entries(gp_file.as_deref())?;
            let result = i915_perfmon::set_config(
                device,
                (*target).into(),
                *pid,
                ConfigEntries::new(&oa, *oa_id),
                ConfigEntries::new(&gp, *gp_id),
            );
            report_status("set-config", result)?;
        }

        Commands::LoadConfig { ctx, oa_id, gp_id } => {
            let ctx = ctx.map(GemContext::new);
            let (mut oa_id, mut gp_id) = (*oa_id, *gp_id);
            i915_perfmon::load_config(device, ctx.as_ref(), &mut oa_id, &mut gp_id)?;
            let loaded = LoadedConfig {
                ctx_id: i915_perfmon::bufmgr::context_id(ctx.as_ref()),
                oa_id,
                gp_id,
            };
            match format {
                OutputFormat::Text => {
                    println!("Loaded OA config {} and GP config {}", oa_id, gp_id)
                }
                OutputFormat::Json => print_json(&loaded)?,
            }
        }

        Commands::HwCtxId { ctx } => {
            let ctx = ctx.map(GemContext::new);
            let mut hw_ctx_id = 0;
            i915_perfmon::get_hw_ctx_id(device, ctx.as_ref(), &mut hw_ctx_id)?;
            let report = HwCtxIdReport {
                ctx_id: i915_perfmon::bufmgr::context_id(ctx.as_ref()),
                hw_ctx_id,
            };
            match format {
                OutputFormat::Text => {
                    println!("Context {} -> hw ctx 0x{:x}", report.ctx_id, hw_ctx_id)
                }
                OutputFormat::Json => print_json(&report)?,
            }
        }

        Commands::HwCtxIds { pid, capacity } => {
            let capacity = capacity.unwrap_or(config.max_hw_ctx_ids);
            let mut ids = vec![0u32; capacity as usize];
            let mut count = capacity;
            i915_perfmon::get_hw_ctx_ids(device, *pid, &mut ids, &mut count)?;
            ids.truncate(count as usize);

            let report = HwCtxIdsReport { pid: *pid, hw_ctx_ids: ids };
            match format {
                OutputFormat::Text => {
                    println!("Process {} has {} hw context(s):", pid, report.hw_ctx_ids.len());
                    for id in &report.hw_ctx_ids {
                        println!("  0x{:x}", id);
                    }
                }
                OutputFormat::Json => print_json(&report)?,
            }
        }

        // Handled in main without opening a device
        Commands::Devices | Commands::Version => {}
    }

    Ok(())
}

fn report_status(what: &str, result: PerfmonResult<()>) -> Result<()> {
    result.with_context(|| format!("{} failed", what))?;
    println!("{}: ok", what);
    Ok(())
}

fn read_entries(path: Option<&Path>) -> Result<Vec<ConfigEntry>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let json =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
