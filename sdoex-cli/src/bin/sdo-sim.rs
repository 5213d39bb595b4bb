use std::process::ExitCode;

use clap::Parser;
use sdoex_cli::{
    signals::spawn_signal_handler,
    sim::{self, SimArgs},
};
use sdoex_client::{common::open_socketcan, eds::ObjectDictionary};
use sdoex_sim::SimulatedSlave;
use snafu::Report;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = SimArgs::parse();

    let od = match ObjectDictionary::load(&args.model, Some(args.node_id)) {
        Ok(od) => od,
        Err(e) => {
            log::error!("{}", Report::from_error(e));
            return ExitCode::FAILURE;
        }
    };

    let (sender, receiver) = match open_socketcan(&args.interface) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("Failed to connect to interface {}: {e}", args.interface);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    if let Err(e) = spawn_signal_handler(shutdown.clone()) {
        log::error!("Failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let mut slave = SimulatedSlave::from_eds(args.node_id, &od, sender, receiver);
    sim::configure(&mut slave, &args);
    log::info!(
        "Simulating node {} on {} with {} objects from {}",
        args.node_id,
        args.interface,
        slave.objects().len(),
        args.model.display()
    );

    match slave.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", Report::from_error(e));
            ExitCode::FAILURE
        }
    }
}
