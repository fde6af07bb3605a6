use std::sync::atomic::Ordering;

use comif_transport::{ComInterface, UdpClient, UdpConfig};

use crate::cmd::{install_ctrlc_handler, parse_duration, print_incoming, UdpListenArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: UdpListenArgs, format: OutputFormat) -> CliResult<i32> {
    let poll = parse_duration(&args.poll_interval)?;

    // Replies, if any were sent, would go back to the bound address.
    let config = UdpConfig::new("comif-udp", args.bind.clone()).with_recv_addr(args.bind);
    let mut client = UdpClient::new(config);
    client
        .open()
        .map_err(|err| transport_error("bind failed", err))?;

    let running = install_ctrlc_handler()?;
    let result = print_incoming(&mut client, poll, args.count, format, || {
        running.load(Ordering::SeqCst)
    });

    client.close();
    result.map(|_| SUCCESS)
}
