#![forbid(unsafe_code)]

mod config;
mod output;
mod profile;

use anyhow::{anyhow, bail, Context};
use cxl_mem::{EmulatedMemdev, Memdev};
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config, GetLogArgs, ListArgs, RawArgs};
use crate::output::{hex_dump, print_json, print_json_list, CommandJson, MemdevJson, RawJson};
use crate::profile::{memdev_matches, MemdevProfile, Profile};

fn main() -> anyhow::Result<()> {
    let config = Config::load();

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(config)
}

fn run(config: Config) -> anyhow::Result<()> {
    let profile = match &config.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    match config.command {
        Command::List(args) => cmd_list(&profile, &args),
        Command::Query { memdev } => cmd_query(&profile, &memdev),
        Command::GetLog(args) => cmd_get_log(&profile, &args),
        Command::Raw(args) => cmd_raw(&profile, &args),
    }
}

fn open(memdev: &MemdevProfile) -> anyhow::Result<Memdev<EmulatedMemdev>> {
    let device = memdev.to_device()?;
    Memdev::open(memdev.name.as_str(), device)
        .with_context(|| format!("{}: query supported commands", memdev.name))
}

fn open_by_name(profile: &Profile, name: &str) -> anyhow::Result<Memdev<EmulatedMemdev>> {
    let memdev = profile
        .memdevs
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| anyhow!("no memdev named {name:?}"))?;
    open(memdev)
}

fn cmd_list(profile: &Profile, args: &ListArgs) -> anyhow::Result<()> {
    // Emulated memdevs are always enabled, so there is nothing idle to filter out.
    tracing::debug!(memdevs = args.memdevs, idle = args.idle, "listing memdevs");
    let mut listed = Vec::new();
    let mut failed = 0usize;

    for memdev in profile
        .memdevs
        .iter()
        .filter(|m| memdev_matches(&m.name, args.memdev.as_deref()))
    {
        let entry = open(memdev).and_then(|mut dev| {
            let identify = dev
                .identify()
                .with_context(|| format!("{}: identify", memdev.name))?;
            let mut json = MemdevJson::new(dev.name(), &identify, args.human);
            if args.verbose {
                json.commands = Some(dev.supported().iter().map(CommandJson::from).collect());
            }
            Ok(json)
        });
        match entry {
            Ok(json) => listed.push(json),
            Err(err) => {
                tracing::error!("{err:#}");
                failed += 1;
            }
        }
    }

    if !listed.is_empty() {
        print_json_list(&listed)?;
    }
    if failed > 0 {
        bail!("failed to list {failed} memdev(s)");
    }
    Ok(())
}

fn cmd_query(profile: &Profile, name: &str) -> anyhow::Result<()> {
    let dev = open_by_name(profile, name)?;
    let commands: Vec<CommandJson> = dev.supported().iter().map(CommandJson::from).collect();
    print_json(&commands)
}

fn cmd_get_log(profile: &Profile, args: &GetLogArgs) -> anyhow::Result<()> {
    let mut dev = open_by_name(profile, &args.memdev)?;

    let length = match args.length {
        Some(length) => length,
        None => {
            let logs = dev
                .get_supported_logs()
                .with_context(|| format!("{}: get supported logs", args.memdev))?;
            let log = logs
                .iter()
                .find(|log| log.uuid == args.uuid)
                .ok_or_else(|| anyhow!("{}: log {} is not supported", args.memdev, args.uuid))?;
            log.size.checked_sub(args.offset).ok_or_else(|| {
                anyhow!(
                    "offset {} is past the end of log {} ({} bytes)",
                    args.offset,
                    args.uuid,
                    log.size
                )
            })?
        }
    };

    let data = dev
        .get_log(args.uuid, args.offset, length)
        .with_context(|| format!("{}: get log {}", args.memdev, args.uuid))?;
    print!("{}", hex_dump(args.offset, &data));
    Ok(())
}

fn cmd_raw(profile: &Profile, args: &RawArgs) -> anyhow::Result<()> {
    let payload_in = match &args.input {
        Some(text) => hex::decode(text.trim()).context("--input is not valid hex")?,
        None => Vec::new(),
    };

    let mut dev = open_by_name(profile, &args.memdev)?;
    let result = dev
        .raw(args.opcode, payload_in, args.out_size)
        .with_context(|| format!("{}: raw opcode {:#06x}", args.memdev, args.opcode))?;
    print_json(&RawJson::new(dev.name(), args.opcode, &result))
}
