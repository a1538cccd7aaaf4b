use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use raspbootcom::{
    cancel,
    terminal::{LocalInput, RawMode},
    uploader::{SerialConnector, Shutdown, Uploader, DEFAULT_RETRY_DELAY},
};
use std::{io, path::PathBuf, process::ExitCode, time::Duration};

const BANNER: &str = "Raspbootcom V1.0";
const LOG_ENV: &str = "RASPBOOTCOM_LOG";

#[derive(Parser)]
#[command(
    name = "raspbootcom",
    version,
    about = "Upload kernel.img via serial port to raspbootin",
    after_help = "Example: raspbootcom /dev/ttyUSB0 kernel/kernel.img"
)]
struct Opts {
    /// Serial device the Raspberry Pi is attached to
    device: PathBuf,
    /// Kernel image to send whenever the loader asks for one
    kernel: PathBuf,
    /// Line speed
    #[arg(long, default_value_t = 115_200)]
    baud: usize,
    /// Milliseconds between attempts to open a missing device
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64)]
    retry_ms: u64,
}

fn init_logging() {
    let mut builder = env_logger::Builder::from_env(Env::new().filter_or(LOG_ENV, "warn"));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn run(opts: Opts) -> Result<Shutdown> {
    let cancel = cancel::install_signal_handlers().context("installing signal handlers")?;
    let mut input = LocalInput::stdin();
    let _raw_mode = RawMode::enable(input.fd()).context("configuring terminal")?;

    let connector = SerialConnector::new(&opts.device, opts.baud, input.fd());
    let mut uploader = Uploader::new(connector, &opts.kernel, cancel)
        .retry_delay(Duration::from_millis(opts.retry_ms));
    let shutdown = uploader.run(&mut input, &mut io::stdout())?;
    Ok(shutdown)
}

fn main() -> ExitCode {
    println!("{}", BANNER);
    let opts = Opts::parse();
    init_logging();

    match run(opts) {
        Ok(shutdown) => {
            log::info!("shutting down: {:?}", shutdown);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
