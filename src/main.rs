use anyhow::anyhow;
use clap::Parser;
use lldb_bridge::debugger::SessionOptions;
use lldb_bridge::ui::config::BridgeConfig;
use lldb_bridge::ui::console::{AppBuilder, LOGGER_ONCE};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file, `~/.config/lldb-bridge/config.toml` by default
    #[clap(long, env = "LLDB_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// LLDB executable, may be given several times to probe in order
    #[clap(long)]
    lldb: Vec<PathBuf>,

    /// Root used to resolve source files reported by LLDB
    #[clap(long)]
    project_root: Option<PathBuf>,

    /// Stop at the program entry point
    #[clap(long)]
    stop_at_entry: bool,

    /// Breakpoint as `file:line`, may be given several times
    #[clap(short, long = "break")]
    breakpoint: Vec<String>,

    /// Program to debug
    program: PathBuf,

    /// Program arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn parse_breakpoint(location: &str) -> anyhow::Result<(PathBuf, u32)> {
    let (file, line) = location
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("breakpoint `{location}`: `file:line` expected"))?;
    let line = line
        .parse()
        .map_err(|e| anyhow!("breakpoint `{location}`: {e}"))?;
    Ok((PathBuf::from(file), line))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    LOGGER_ONCE.call_once(|| {
        env_logger::init();
    });

    let config = BridgeConfig::from_file(args.config.as_deref());
    let mut options = SessionOptions::from(&config);
    if !args.lldb.is_empty() {
        options.lldb_candidates = args.lldb;
    }
    if args.project_root.is_some() {
        options.project_root = args.project_root;
    }
    options.stop_at_entry |= args.stop_at_entry;

    let mut builder = AppBuilder::new(options);
    for location in &args.breakpoint {
        let (file, line) = parse_breakpoint(location)?;
        builder = builder.breakpoint(file, line);
    }

    let app = builder.build()?;
    app.run(&args.program, &args.args)
}
