use std::time::{Duration, Instant};

use comif_transport::{ComInterface, UdpClient, UdpConfig};
use tracing::info;

use crate::cmd::{parse_duration, print_incoming, UdpSendArgs};
use crate::exit::{send_error, transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

const WAIT_POLL: Duration = Duration::from_millis(20);

pub fn run(args: UdpSendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = args.wait.as_deref().map(parse_duration).transpose()?;
    let payload = args.payload.resolve()?;

    let mut config = UdpConfig::new("comif-udp", args.target);
    config.recv_addr = args.bind;

    let mut client = UdpClient::new(config);
    client
        .open()
        .map_err(|err| transport_error("open failed", err))?;
    client
        .send(&payload)
        .map_err(|err| send_error("send failed", err))?;
    info!(
        dest = %client.config().send_addr,
        bytes = payload.len(),
        "datagram sent"
    );

    if let Some(wait) = wait {
        let deadline = Instant::now() + wait;
        print_incoming(&mut client, WAIT_POLL, None, format, || {
            Instant::now() < deadline
        })?;
    }

    client.close();
    Ok(SUCCESS)
}
