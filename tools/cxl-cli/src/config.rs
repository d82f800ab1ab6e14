use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Parser)]
#[command(name = "cxl", version, about = "Query and drive CXL memory device mailboxes")]
struct Args {
    /// JSON profile describing the emulated memory devices.
    ///
    /// Without a profile a single default device, `mem0`, is available.
    ///
    /// Environment variable: `CXL_MEMDEV_PROFILE`.
    #[arg(long, global = true, env = "CXL_MEMDEV_PROFILE", value_name = "PATH")]
    profile: Option<PathBuf>,

    /// Log filter (tracing-subscriber EnvFilter syntax).
    ///
    /// Environment variable: `CXL_LOG`.
    #[arg(long, global = true, env = "CXL_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List memory devices with their Identify data
    List(ListArgs),

    /// Show the commands a memory device supports
    Query {
        memdev: String,
    },

    /// Read a device log and print it as a hex dump
    GetLog(GetLogArgs),

    /// Send a raw mailbox opcode, bypassing command validation
    Raw(RawArgs),
}

#[derive(Debug, Clone, ClapArgs)]
pub struct ListArgs {
    /// Filter by memory device name (`memN`, `N`, or `all`)
    #[arg(short = 'd', long = "memdev", value_name = "NAME")]
    pub memdev: Option<String>,

    /// Include memory devices in the listing (implied; memdevs are the only object listed)
    #[arg(short = 'D', long)]
    pub memdevs: bool,

    /// Include idle (disabled) devices
    #[arg(short = 'i', long)]
    pub idle: bool,

    /// Use human friendly number formats
    #[arg(short = 'u', long)]
    pub human: bool,

    /// Include supported commands and enable debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct GetLogArgs {
    pub memdev: String,

    /// Log identifier
    #[arg(long)]
    pub uuid: Uuid,

    /// Byte offset into the log
    #[arg(long, default_value_t = 0, value_parser = parse_u32)]
    pub offset: u32,

    /// Bytes to read (defaults to the rest of the log)
    #[arg(long, value_parser = parse_u32)]
    pub length: Option<u32>,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct RawArgs {
    pub memdev: String,

    /// Mailbox opcode (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_u16)]
    pub opcode: u16,

    /// Input payload as hex bytes
    #[arg(long, value_name = "HEX")]
    pub input: Option<String>,

    /// Output buffer size in bytes
    #[arg(long, default_value_t = 0)]
    pub out_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub profile: Option<PathBuf>,
    pub log_level: String,
    pub command: Command,
}

impl Config {
    pub fn load() -> Self {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Self {
        let verbose = matches!(&args.command, Command::List(list) if list.verbose);
        let log_level = args.log_level.unwrap_or_else(|| {
            if verbose {
                "debug".to_string()
            } else {
                DEFAULT_LOG_LEVEL.to_string()
            }
        });

        Self {
            profile: args.profile,
            log_level,
            command: args.command,
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    parse_int(s).and_then(|v| u32::try_from(v).map_err(|_| format!("{s} does not fit in 32 bits")))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    parse_int(s).and_then(|v| u16::try_from(v).map_err(|_| format!("{s} does not fit in 16 bits")))
}

fn parse_int(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|err| format!("invalid number {s:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Config {
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn verbose_list_raises_log_level() {
        let cfg = parse(&["cxl", "list", "-v"]);
        assert_eq!(cfg.log_level, "debug");

        let cfg = parse(&["cxl", "list", "-v", "--log-level", "trace"]);
        assert_eq!(cfg.log_level, "trace");

        let cfg = parse(&["cxl", "query", "mem0"]);
        assert_eq!(cfg.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn list_accepts_object_and_idle_filters() {
        let Command::List(list) = parse(&["cxl", "list", "-D", "-i", "-d", "mem0"]).command else {
            panic!("expected list");
        };
        assert!(list.memdevs);
        assert!(list.idle);
        assert_eq!(list.memdev.as_deref(), Some("mem0"));

        let Command::List(list) = parse(&["cxl", "list", "--memdevs", "--idle"]).command else {
            panic!("expected list");
        };
        assert!(list.memdevs && list.idle);

        let Command::List(list) = parse(&["cxl", "list"]).command else {
            panic!("expected list");
        };
        assert!(!list.memdevs && !list.idle);
    }

    #[test]
    fn numbers_accept_hex() {
        assert_eq!(parse_u16("0x1234"), Ok(0x1234));
        assert_eq!(parse_u16("17"), Ok(17));
        assert!(parse_u16("0x10000").is_err());
        assert!(parse_u32("zz").is_err());
    }

    #[test]
    fn raw_arguments() {
        let cfg = parse(&[
            "cxl", "raw", "mem0", "--opcode", "0x4000", "--out-size", "67",
        ]);
        match cfg.command {
            Command::Raw(raw) => {
                assert_eq!(raw.opcode, 0x4000);
                assert_eq!(raw.out_size, 67);
                assert!(raw.input.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
