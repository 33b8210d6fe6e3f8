//! aie-ctl: bring up, tear down and inspect AI Engine array partitions

use std::env;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use aie_ctl::backend::cdo::{find_cdo_offset, Cdo, CdoBackend};
use aie_ctl::backend::txn::{TxnBackend, TxnStream};
use aie_ctl::backend::{BackendKind, BackendRegistry};
use aie_ctl::config::Config;
use aie_ctl::control::InitOptions;
use aie_ctl::device::{DeviceInstance, TileLoc};

const USAGE: &str = "\
usage: aie-ctl <command> [args]

commands:
  init [COL,ROW ...]     initialize the partition, requesting the given tiles
  teardown               reset, clear and gate the partition
  request COL,ROW ...    ungate clocks for the given tiles
  plan                   list the init and teardown steps for this partition
  inspect FILE           decode a captured CDO or transaction file
  sample-config          print a sample configuration file

The partition and backend come from aie-ctl.toml or AIE_CTL_* variables.";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[2..];

    match command.as_str() {
        "init" => {
            let tiles = parse_tiles(rest)?;
            let opts = if tiles.is_empty() {
                InitOptions::default()
            } else {
                InitOptions::default().with_tiles(tiles)
            };
            run_on_partition(|dev| Ok(dev.init_part(Some(&opts))?))
        }
        "teardown" => run_on_partition(|dev| Ok(dev.teardown_part()?)),
        "request" => {
            if rest.is_empty() {
                bail!("request needs at least one COL,ROW tile");
            }
            let tiles = parse_tiles(rest)?;
            run_on_partition(|dev| Ok(dev.request_tiles(&tiles)?))
        }
        "plan" => print_plan(),
        "inspect" => {
            let Some(path) = rest.first() else {
                bail!("inspect needs a FILE");
            };
            inspect(Path::new(path))
        }
        "sample-config" => {
            print!("{}", Config::sample_config());
            if let Some(path) = Config::user_config_path() {
                eprintln!("# user config location: {}", path.display());
            }
            Ok(())
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("{}", USAGE);
            bail!("unknown command '{}'", other)
        }
    }
}

/// Parse `COL,ROW` arguments.
fn parse_tiles(args: &[String]) -> anyhow::Result<Vec<TileLoc>> {
    args.iter()
        .map(|arg| arg.parse::<TileLoc>().map_err(|e| anyhow!("bad tile '{}': {}", arg, e)))
        .collect()
}

/// Bind the configured backend, run `op`, then save any capture.
fn run_on_partition<F>(op: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut DeviceInstance) -> anyhow::Result<()>,
{
    let config = Config::get();
    let kind = config.backend();
    let device_config = config.device_config();
    println!(
        "{} partition: columns {}..{}, {} rows, {} backend",
        device_config.generation,
        device_config.start_col,
        device_config.start_col as u16 + device_config.num_cols as u16,
        device_config.num_rows,
        kind
    );

    let registry = BackendRegistry::builtin();
    let mut dev = DeviceInstance::io_init(device_config, &registry, kind, &config.backend_options())
        .with_context(|| format!("binding {} backend", kind))?;
    op(&mut dev)?;

    let output = config.output();
    match kind {
        BackendKind::Cdo => {
            if let Some(capture) = dev.backend_as::<CdoBackend>() {
                capture
                    .write_to(&output)
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("CDO written to {}", output.display());
            }
        }
        BackendKind::Txn => {
            if let Some(capture) = dev.backend_as::<TxnBackend>() {
                capture
                    .write_to(&output)
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("Transaction stream written to {}", output.display());
            }
        }
        _ => {}
    }

    let in_use = dev.tiles_in_use().count_ones();
    println!("{} tiles in use", in_use);
    Ok(())
}

fn print_plan() -> anyhow::Result<()> {
    let config = Config::get();
    let registry = BackendRegistry::builtin();
    // Planning never touches registers; bind the simulator regardless of config
    let dev = DeviceInstance::io_init(
        config.device_config(),
        &registry,
        BackendKind::Sim,
        &config.backend_options(),
    )?;

    println!("Init steps:");
    for (i, step) in dev.init_plan(&InitOptions::default()).iter().enumerate() {
        println!("  {:2}. {}", i + 1, step);
    }
    println!();
    println!("Teardown steps:");
    for (i, step) in dev.teardown_plan().iter().enumerate() {
        println!("  {:2}. {}", i + 1, step);
    }
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    println!("Loading: {} ({} bytes)", path.display(), data.len());
    println!();

    if let Some(offset) = find_cdo_offset(&data) {
        if offset != 0 {
            println!("CDO found at offset 0x{:X}", offset);
        }
        let cdo = Cdo::parse(&data[offset..]).context("parsing CDO")?;
        cdo.print_summary();
    } else {
        let stream = TxnStream::parse(&data).context("parsing transaction stream")?;
        stream.print_summary();
    }
    Ok(())
}
