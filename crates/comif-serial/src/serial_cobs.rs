use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;
use comif_frame::{encode_frame, CobsDeframer};
use comif_transport::{ComInterface, ReceptionDecodeError, SendError, TransportError};
use tracing::{debug, info, warn};

use crate::config::{FramingScheme, SerialConfig};
use crate::ingest::Ingestor;

/// Reader half (for the reception thread) and writer half (for `send`) of a line.
pub type PortHalves = (Box<dyn Read + Send>, Box<dyn Write + Send>);

/// Opens the byte-level line beneath a [`SerialCobsComIF`].
pub type PortOpener =
    Box<dyn FnMut(&SerialConfig) -> comif_transport::Result<PortHalves> + Send>;

/// Serial communication interface framing packets with COBS.
///
/// `open` starts a reception thread that stages raw bytes from the line. Frames
/// are resolved only when [`ComInterface::receive`] or
/// [`ComInterface::packets_available`] is called.
///
/// `close` waits up to [`SerialConfig::effective_close_timeout`] for the thread and
/// then drops the writer half. A thread that misses the deadline is detached and
/// keeps its reader half, so the device stays open until its pending read returns.
///
/// Malformed frames are dropped and counted in [`SerialCobsComIF::parsing_error_count`];
/// they never surface as errors. A read error that stops the thread does: once the
/// packets decoded before it are taken, `receive` and `packets_available` return
/// [`ReceptionDecodeError::Io`] until the interface is reopened.
pub struct SerialCobsComIF {
    config: SerialConfig,
    opener: PortOpener,
    writer: Option<Box<dyn Write + Send>>,
    ingestor: Option<Ingestor>,
    deframer: CobsDeframer,
    line_error: Option<std::io::Error>,
}

impl SerialCobsComIF {
    /// Create an interface over the tty device named in `config`.
    pub fn new(config: SerialConfig) -> Self {
        Self::with_port_opener(config, Box::new(open_tty))
    }

    /// Create an interface over a caller-provided line, e.g. a socket bridge.
    pub fn with_port_opener(config: SerialConfig, opener: PortOpener) -> Self {
        let deframer = match config.max_frame_size {
            Some(max) => CobsDeframer::new().with_max_frame_size(max),
            None => CobsDeframer::new(),
        };
        Self {
            config,
            opener,
            writer: None,
            ingestor: None,
            deframer,
            line_error: None,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Wrap `data` in a wire frame: `00 ++ cobs(data) ++ 00`.
    pub fn encode_data(&self, data: &[u8]) -> Bytes {
        match self.config.framing {
            FramingScheme::Cobs => encode_frame(data),
        }
    }

    /// Frames that failed to decode since creation or the last clear.
    pub fn parsing_error_count(&self) -> u64 {
        self.deframer.parsing_error_count()
    }

    /// Drop staged bytes, any partial frame, and every unread packet.
    pub fn clear(&mut self) {
        if let Some(ingestor) = &self.ingestor {
            let dropped = ingestor.discard_staged();
            if dropped > 0 {
                debug!(id = %self.config.id, bytes = dropped, "discarded staged bytes");
            }
        }
        self.deframer.clear();
    }

    fn parse_for_packets(&mut self) -> Result<(), ReceptionDecodeError> {
        let Some(ingestor) = self.ingestor.as_mut() else {
            return Err(ReceptionDecodeError::NotOpen(self.config.id.clone()));
        };
        if let Some(err) = ingestor.take_failure() {
            self.line_error = Some(err);
        }
        ingestor.drain_into(&mut self.deframer);
        self.deframer.parse();

        match &self.line_error {
            Some(err) if self.deframer.is_empty() => Err(ReceptionDecodeError::Io(
                std::io::Error::new(err.kind(), err.to_string()),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn open_tty(config: &SerialConfig) -> comif_transport::Result<PortHalves> {
    let port = comif_transport::TtyPort::open(&config.port, config.baud_rate)?;
    let reader = port.try_clone()?;
    Ok((Box::new(reader), Box::new(port)))
}

#[cfg(not(unix))]
fn open_tty(config: &SerialConfig) -> comif_transport::Result<PortHalves> {
    Err(TransportError::Open {
        target: config.port.display().to_string(),
        source: std::io::Error::new(
            ErrorKind::Unsupported,
            "tty serial ports require a Unix platform",
        ),
    })
}

impl ComInterface for SerialCobsComIF {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn open(&mut self) -> comif_transport::Result<()> {
        if self.is_open() {
            return Err(TransportError::AlreadyOpen(self.config.id.clone()));
        }

        let (reader, writer) = (self.opener)(&self.config)?;
        let ingestor = Ingestor::spawn(
            format!("comif-rx-{}", self.config.id),
            reader,
            self.config.polling_interval,
        )
        .map_err(|source| TransportError::ThreadSpawn {
            id: self.config.id.clone(),
            source,
        })?;

        self.deframer.clear();
        self.line_error = None;
        self.writer = Some(writer);
        self.ingestor = Some(ingestor);
        info!(
            id = %self.config.id,
            port = ?self.config.port,
            framing = ?self.config.framing,
            "serial interface open"
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn close(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };

        if let Some(mut ingestor) = self.ingestor.take() {
            ingestor.stop(self.config.effective_close_timeout());
        }
        drop(writer);
        self.deframer.clear();
        self.line_error = None;
        info!(id = %self.config.id, "serial interface closed");
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SendError> {
        let frame = self.encode_data(data);
        let Some(writer) = self.writer.as_mut() else {
            return Err(SendError::NotOpen(self.config.id.clone()));
        };

        let mut offset = 0usize;
        while offset < frame.len() {
            match writer.write(&frame[offset..]) {
                Ok(0) => {
                    return Err(SendError::Incomplete {
                        written: offset,
                        expected: frame.len(),
                    })
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(SendError::Io(err)),
            }
        }

        loop {
            match writer.flush() {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(SendError::Io(err)),
            }
        }

        debug!(id = %self.config.id, payload = data.len(), frame = frame.len(), "sent frame");
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<Bytes>, ReceptionDecodeError> {
        self.parse_for_packets()?;
        Ok(self.deframer.drain())
    }

    fn packets_available(&mut self) -> Result<usize, ReceptionDecodeError> {
        self.parse_for_packets()?;
        Ok(self.deframer.len())
    }
}

impl Drop for SerialCobsComIF {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(id = %self.config.id, "serial interface dropped while open; closing");
            self.close();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    const POLL: Duration = Duration::from_millis(10);

    fn config() -> SerialConfig {
        SerialConfig::new("pseudo_ser_cobs", "/dev/null").with_polling_interval(POLL)
    }

    /// Returns the far end of a socket pair and an opener for the near end.
    fn line() -> (UnixStream, PortOpener) {
        let (remote, local) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let opener: PortOpener = Box::new(move |_cfg| {
            let reader: Box<dyn Read + Send> = Box::new(local.try_clone()?);
            let writer: Box<dyn Write + Send> = Box::new(local.try_clone()?);
            Ok((reader, writer))
        });
        (remote, opener)
    }

    fn open_com() -> (UnixStream, SerialCobsComIF) {
        let (remote, opener) = line();
        let mut com = SerialCobsComIF::with_port_opener(config(), opener);
        com.initialize().unwrap();
        com.open().unwrap();
        (remote, com)
    }

    fn wait_for_packets(com: &mut SerialCobsComIF, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let available = com.packets_available().unwrap();
            if available >= expected || Instant::now() > deadline {
                return available;
            }
            thread::sleep(POLL);
        }
    }

    #[test]
    fn state_after_open() {
        let (_remote, mut com) = open_com();
        assert!(com.is_open());
        assert_eq!(com.packets_available().unwrap(), 0);
        assert_eq!(com.id(), "pseudo_ser_cobs");
        assert!(matches!(com.open(), Err(TransportError::AlreadyOpen(_))));
        com.close();
        assert!(!com.is_open());
    }

    #[test]
    fn send_writes_delimited_frame() {
        let (mut remote, mut com) = open_com();
        com.send(&[0x01, 0x02, 0x03]).unwrap();

        let mut wire = [0u8; 6];
        remote.read_exact(&mut wire).unwrap();
        assert_eq!(wire[0], 0x00);
        assert_eq!(wire[5], 0x00);
        assert!(!wire[1..5].contains(&0x00));
        assert_eq!(
            comif_frame::decode(&wire[1..5]).unwrap().as_ref(),
            &[0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn receives_single_frame() {
        let (mut remote, mut com) = open_com();
        remote.write_all(&encode_frame(&[0x02, 0x03, 0x04])).unwrap();

        assert_eq!(wait_for_packets(&mut com, 1), 1);
        let packets = com.receive().unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].as_ref(), &[0x02, 0x03, 0x04]);
        assert!(com.receive().unwrap().is_empty());
    }

    #[test]
    fn receives_consecutive_frames_in_order() {
        let (mut remote, mut com) = open_com();
        let mut wire = encode_frame(&[0x02, 0x03, 0x04]).to_vec();
        wire.extend_from_slice(&encode_frame(&[0x04, 0x02, 0x01]));
        remote.write_all(&wire).unwrap();

        assert_eq!(wait_for_packets(&mut com, 2), 2);
        let packets = com.receive().unwrap();
        assert_eq!(
            packets,
            vec![
                Bytes::from_static(&[0x02, 0x03, 0x04]),
                Bytes::from_static(&[0x04, 0x02, 0x01]),
            ]
        );
    }

    #[test]
    fn frame_split_across_writes() {
        let (mut remote, mut com) = open_com();
        let frame = encode_frame(b"split across reads");
        let (head, tail) = frame.split_at(7);

        remote.write_all(head).unwrap();
        thread::sleep(POLL * 3);
        assert_eq!(com.packets_available().unwrap(), 0);

        remote.write_all(tail).unwrap();
        assert_eq!(wait_for_packets(&mut com, 1), 1);
        assert_eq!(com.receive().unwrap()[0].as_ref(), b"split across reads");
    }

    #[test]
    fn malformed_frame_is_counted_not_raised() {
        let (mut remote, mut com) = open_com();
        let mut wire = encode_frame(b"good-1").to_vec();
        wire.extend_from_slice(&[0x00, 0x07, 0x41, 0x00]);
        wire.extend_from_slice(&encode_frame(b"good-2"));
        remote.write_all(&wire).unwrap();

        assert_eq!(wait_for_packets(&mut com, 2), 2);
        assert_eq!(com.parsing_error_count(), 1);
        let packets = com.receive().unwrap();
        assert_eq!(packets[0].as_ref(), b"good-1");
        assert_eq!(packets[1].as_ref(), b"good-2");
    }

    #[test]
    fn clear_drops_staged_and_decoded() {
        let (mut remote, mut com) = open_com();
        remote.write_all(&encode_frame(b"first")).unwrap();
        assert_eq!(wait_for_packets(&mut com, 1), 1);

        remote.write_all(&encode_frame(b"staged")).unwrap();
        thread::sleep(POLL * 5);

        com.clear();
        assert_eq!(com.packets_available().unwrap(), 0);
        assert!(com.receive().unwrap().is_empty());
        assert_eq!(com.parsing_error_count(), 0);
    }

    #[test]
    fn reopen_starts_empty() {
        let (mut remote, mut com) = open_com();
        remote.write_all(&encode_frame(b"unread")).unwrap();
        assert_eq!(wait_for_packets(&mut com, 1), 1);

        com.close();
        com.open().unwrap();
        assert_eq!(com.packets_available().unwrap(), 0);

        remote.write_all(&encode_frame(b"after reopen")).unwrap();
        assert_eq!(wait_for_packets(&mut com, 1), 1);
        assert_eq!(com.receive().unwrap()[0].as_ref(), b"after reopen");
    }

    #[test]
    fn operations_fail_when_closed() {
        let (_remote, opener) = line();
        let mut com = SerialCobsComIF::with_port_opener(config(), opener);

        assert!(!com.is_open());
        assert!(matches!(com.send(b"x"), Err(SendError::NotOpen(_))));
        assert!(matches!(com.receive(), Err(ReceptionDecodeError::NotOpen(_))));
        assert!(matches!(
            com.packets_available(),
            Err(ReceptionDecodeError::NotOpen(_))
        ));
        com.close();
    }

    #[test]
    fn open_failure_leaves_interface_closed() {
        let opener: PortOpener = Box::new(|cfg| {
            Err(TransportError::Open {
                target: cfg.port.display().to_string(),
                source: std::io::Error::from(ErrorKind::ResourceBusy),
            })
        });
        let mut com = SerialCobsComIF::with_port_opener(config(), opener);

        assert!(matches!(com.open(), Err(TransportError::Open { .. })));
        assert!(!com.is_open());
    }

    #[test]
    fn close_returns_while_read_is_blocked() {
        let (remote, local) = UnixStream::pair().unwrap();
        let opener: PortOpener = Box::new(move |_cfg| {
            let reader: Box<dyn Read + Send> = Box::new(local.try_clone()?);
            let writer: Box<dyn Write + Send> = Box::new(local.try_clone()?);
            Ok((reader, writer))
        });
        let cfg = config().with_close_timeout(Duration::from_millis(50));
        let mut com = SerialCobsComIF::with_port_opener(cfg, opener);
        com.open().unwrap();
        thread::sleep(POLL * 2);

        let start = Instant::now();
        com.close();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!com.is_open());

        drop(remote);
    }

    /// Serves one chunk, then fails the way an unplugged device does.
    struct FailingLine {
        first: Option<Vec<u8>>,
    }

    impl Read for FailingLine {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.first.take() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(std::io::Error::from(ErrorKind::BrokenPipe)),
            }
        }
    }

    fn failing_opener(first: Option<Vec<u8>>) -> PortOpener {
        let mut first = Some(first);
        Box::new(move |_cfg| {
            let reader: Box<dyn Read + Send> = Box::new(FailingLine {
                first: first.take().flatten(),
            });
            let writer: Box<dyn Write + Send> = Box::new(std::io::sink());
            Ok((reader, writer))
        })
    }

    #[test]
    fn dead_line_is_reported_on_receive() {
        let mut com = SerialCobsComIF::with_port_opener(config(), failing_opener(None));
        com.open().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let err = loop {
            match com.receive() {
                Err(err) => break err,
                Ok(packets) => assert!(packets.is_empty()),
            }
            assert!(Instant::now() < deadline, "read error was never reported");
            thread::sleep(POLL);
        };
        assert!(
            matches!(err, ReceptionDecodeError::Io(ref e) if e.kind() == ErrorKind::BrokenPipe)
        );
        assert!(matches!(
            com.packets_available(),
            Err(ReceptionDecodeError::Io(_))
        ));

        com.close();
        assert!(matches!(com.receive(), Err(ReceptionDecodeError::NotOpen(_))));
    }

    #[test]
    fn packets_read_before_line_failure_are_delivered() {
        let opener = failing_opener(Some(encode_frame(b"last words").to_vec()));
        let mut com = SerialCobsComIF::with_port_opener(config(), opener);
        com.open().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let packets = loop {
            let packets = com.receive().expect("decoded packets come before the error");
            if !packets.is_empty() {
                break packets;
            }
            assert!(Instant::now() < deadline, "frame never arrived");
            thread::sleep(POLL);
        };
        assert_eq!(packets, vec![Bytes::from_static(b"last words")]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while com.receive().is_ok() {
            assert!(Instant::now() < deadline, "read error was never reported");
            thread::sleep(POLL);
        }
    }

    #[test]
    fn short_write_is_reported() {
        struct Stalled;
        impl Write for Stalled {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        struct Idle;
        impl Read for Idle {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Ok(0)
            }
        }

        let opener: PortOpener = Box::new(|_cfg| {
            let reader: Box<dyn Read + Send> = Box::new(Idle);
            let writer: Box<dyn Write + Send> = Box::new(Stalled);
            Ok((reader, writer))
        });
        let mut com = SerialCobsComIF::with_port_opener(config(), opener);
        com.open().unwrap();

        let err = com.send(&[0x01]).unwrap_err();
        assert!(matches!(
            err,
            SendError::Incomplete {
                written: 0,
                expected: 4
            }
        ));
        assert!(com.is_open());
    }
}
