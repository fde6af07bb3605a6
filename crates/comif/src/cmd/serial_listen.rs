use std::sync::atomic::Ordering;

use comif_serial::SerialCobsComIF;
use comif_transport::ComInterface;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, print_incoming, SerialListenArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: SerialListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.line.to_config()?;
    let poll = config.polling_interval;

    let mut com = SerialCobsComIF::new(config);
    com.initialize()
        .map_err(|err| transport_error("initialize failed", err))?;
    com.open().map_err(|err| transport_error("open failed", err))?;

    let running = install_ctrlc_handler()?;
    let result = print_incoming(&mut com, poll, args.count, format, || {
        running.load(Ordering::SeqCst)
    });

    info!(
        id = %com.id(),
        dropped = com.parsing_error_count(),
        "listen finished"
    );
    com.close();
    result.map(|_| SUCCESS)
}
