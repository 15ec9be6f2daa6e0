//! Send UDP pings and print the timestamps the kernel reports for them.

mod config;
mod output;
mod session;

use std::error::Error;

use config::{Command, Config, USAGE};

/// Run `tstamp-ping` with the given command line
pub fn main(args: impl IntoIterator<Item = String>) -> Result<(), Box<dyn Error>> {
    let path = match Command::from_args(args)? {
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Run(path) => path,
    };

    let config = Config::load(path.as_deref())?;

    tracing_subscriber::fmt()
        .with_max_level(config.output.log_level)
        .with_writer(std::io::stderr)
        .init();

    config.check();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(session::run(&config, std::io::stdout().lock()))?;

    Ok(())
}
