use std::time::Instant;

use comif_serial::SerialCobsComIF;
use comif_transport::ComInterface;
use tracing::info;

use crate::cmd::{parse_duration, print_incoming, SerialSendArgs};
use crate::exit::{send_error, transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: SerialSendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = args.wait.as_deref().map(parse_duration).transpose()?;
    let payload = args.payload.resolve()?;
    let config = args.line.to_config()?;
    let poll = config.polling_interval;

    let mut com = SerialCobsComIF::new(config);
    com.initialize()
        .map_err(|err| transport_error("initialize failed", err))?;
    com.open().map_err(|err| transport_error("open failed", err))?;

    com.send(&payload)
        .map_err(|err| send_error("send failed", err))?;
    info!(id = %com.id(), bytes = payload.len(), "packet sent");

    if let Some(wait) = wait {
        let deadline = Instant::now() + wait;
        print_incoming(&mut com, poll, None, format, || Instant::now() < deadline)?;
    }

    let dropped = com.parsing_error_count();
    if dropped > 0 {
        info!(id = %com.id(), dropped, "malformed frames dropped");
    }
    com.close();
    Ok(SUCCESS)
}
