use std::net::{IpAddr, SocketAddr};

use anyhow::{Result, bail};
use clap::{Parser, builder::PossibleValuesParser};
use log::LevelFilter;
use once_cell::sync::OnceCell;
use tokio::runtime;

mod context;
mod error;
mod logger;
mod origin;
mod proxy;
mod reader;
mod request;
mod response;
mod tcp;
mod url;

use crate::logger::Logger;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(
        long,
        value_parser=PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]),
        default_value = "info",
        help = "Log level",
    )]
    pub(crate) log_level: String,
    #[arg(long, default_value = "::", help = "IP address to listen on")]
    address: IpAddr,
    #[arg(help = "TCP port to listen on")]
    port: u16,
}

fn main() -> Result<()> {
    // Start by parsing the cli arguments.
    let args = Args::parse();

    // Set the log level.
    let log_level = match args.log_level.as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        x => bail!("Invalid log_level: {}", x),
    };
    Logger::init(log_level)?;

    // Only returns if the listener could not be set up.
    let listener = tcp::listen(SocketAddr::new(args.address, args.port))?;
    tcp::serve(listener)
}

static RUNTIME: OnceCell<runtime::Runtime> = OnceCell::new();

#[macro_export]
macro_rules! runtime {
    () => {
        RUNTIME.get_or_try_init(|| runtime::Builder::new_multi_thread().enable_io().build())
    };
}
