use chm_runner::{init_logging, install_interrupt_handler, run, Cli};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = Arc::new(AtomicBool::new(false));
    if let Err(err) = install_interrupt_handler(Arc::clone(&cancel)) {
        warn!("{}", err);
    }

    match run(cli, cancel) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
