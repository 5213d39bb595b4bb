use std::process::ExitCode;

use clap::Parser;
use sdoex_cli::{exit_status, signals::spawn_signal_handler, CounterArgs};
use sdoex_client::{exerciser, SocketCanProvider};
use snafu::Report;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CounterArgs::parse();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", Report::from_error(e));
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    if let Err(e) = spawn_signal_handler(shutdown.clone()) {
        log::error!("Failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let provider = SocketCanProvider::new().with_sdo_timeout(config.sdo_timeout);
    let result = match exerciser::initialize(
        &provider,
        &config.interface,
        config.node_id,
        &config.eds_file,
    ) {
        Ok(handle) => exerciser::run(handle, &config.counter, shutdown).await,
        Err(e) => Err(e),
    };

    let status = exit_status(&result);
    match result {
        Ok(summary) => log::info!("Stopped: {summary}"),
        Err(e) => log::error!("{}", Report::from_error(e)),
    }
    ExitCode::from(status)
}
