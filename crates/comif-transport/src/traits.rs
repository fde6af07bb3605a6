use bytes::Bytes;

use crate::error::{ReceptionDecodeError, Result, SendError};

/// Uniform contract for opening, closing, sending and receiving discrete packets.
///
/// Every transport variant implements this independently. A variant that needs
/// to poll in the background starts its thread in [`ComInterface::open`] and
/// stops it in [`ComInterface::close`].
///
/// `receive` and `packets_available` assume a single consumer thread.
pub trait ComInterface: Send {
    /// Identifier of this configured interface, stable for its lifetime.
    fn id(&self) -> &str;

    /// Setup that cannot happen in the constructor. Must be callable before `open`.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Open the interface.
    fn open(&mut self) -> Result<()>;

    /// Whether `open` completed. Does not block.
    fn is_open(&self) -> bool;

    /// Release all held resources. Failures are logged, never raised.
    fn close(&mut self);

    /// Send one packet.
    fn send(&mut self, data: &[u8]) -> std::result::Result<(), SendError>;

    /// Return every packet that is ready, oldest first.
    fn receive(&mut self) -> std::result::Result<Vec<Bytes>, ReceptionDecodeError>;

    /// Number of packets ready for [`ComInterface::receive`]. Does not block on I/O.
    ///
    /// Transports that can only report readiness return 0 or 1.
    fn packets_available(&mut self) -> std::result::Result<usize, ReceptionDecodeError>;
}

impl<T: ComInterface + ?Sized> ComInterface for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn send(&mut self, data: &[u8]) -> std::result::Result<(), SendError> {
        (**self).send(data)
    }

    fn receive(&mut self) -> std::result::Result<Vec<Bytes>, ReceptionDecodeError> {
        (**self).receive()
    }

    fn packets_available(&mut self) -> std::result::Result<usize, ReceptionDecodeError> {
        (**self).packets_available()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// In-memory interface that loops sent packets back to the receive side.
    struct Loopback {
        open: bool,
        queue: VecDeque<Bytes>,
    }

    impl ComInterface for Loopback {
        fn id(&self) -> &str {
            "loopback"
        }

        fn open(&mut self) -> Result<()> {
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) {
            self.open = false;
            self.queue.clear();
        }

        fn send(&mut self, data: &[u8]) -> std::result::Result<(), SendError> {
            if !self.open {
                return Err(SendError::NotOpen(self.id().to_string()));
            }
            self.queue.push_back(Bytes::copy_from_slice(data));
            Ok(())
        }

        fn receive(&mut self) -> std::result::Result<Vec<Bytes>, ReceptionDecodeError> {
            Ok(self.queue.drain(..).collect())
        }

        fn packets_available(&mut self) -> std::result::Result<usize, ReceptionDecodeError> {
            Ok(self.queue.len())
        }
    }

    #[test]
    fn boxed_interface_dispatches() {
        let mut com: Box<dyn ComInterface> = Box::new(Loopback {
            open: false,
            queue: VecDeque::new(),
        });

        com.initialize().unwrap();
        assert!(matches!(com.send(b"x"), Err(SendError::NotOpen(_))));

        com.open().unwrap();
        assert!(com.is_open());
        com.send(b"one").unwrap();
        com.send(b"two").unwrap();
        assert_eq!(com.packets_available().unwrap(), 2);

        let packets = com.receive().unwrap();
        assert_eq!(packets, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);

        com.close();
        assert!(!com.is_open());
    }
}
