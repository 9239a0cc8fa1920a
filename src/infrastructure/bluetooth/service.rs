//! UART Service Module
//!
//! Channel-backed emulation of a BLE UART peripheral. The device loop owns
//! the [`UartService`]; whatever plays the central (a console bridge, a test,
//! an embedding harness) holds the matching [`UartHandle`].

use crate::domain::models::LinkEvent;
use crate::infrastructure::bluetooth::protocol::{Transport, TransportError};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::trace;

/// Something the central delivered to the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UartInput {
    /// A burst of bytes written to the RX characteristic
    Bytes(Vec<u8>),
    Link(LinkEvent),
}

/// Central-side end of the emulated link
pub struct UartHandle {
    pub input: mpsc::UnboundedSender<UartInput>,
    pub frames: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Peripheral-side end of the emulated link
pub struct UartService {
    input_rx: mpsc::UnboundedReceiver<UartInput>,
    frame_tx: mpsc::UnboundedSender<Vec<u8>>,
    rx_bytes: VecDeque<u8>,
    link_events: VecDeque<LinkEvent>,
    connected: bool,
}

impl UartService {
    /// Create a connected pair of service and handle
    pub fn new() -> (Self, UartHandle) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let service = Self {
            input_rx,
            frame_tx,
            rx_bytes: VecDeque::new(),
            link_events: VecDeque::new(),
            connected: false,
        };
        let handle = UartHandle {
            input: input_tx,
            frames: frame_rx,
        };
        (service, handle)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Move everything the central sent so far into the local queues
    fn pump(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            match input {
                UartInput::Bytes(bytes) => {
                    trace!("RX {} bytes", bytes.len());
                    self.rx_bytes.extend(bytes);
                }
                UartInput::Link(event) => {
                    self.connected = matches!(event, LinkEvent::Connected { .. });
                    self.link_events.push_back(event);
                }
            }
        }
    }
}

impl Transport for UartService {
    fn available(&mut self) -> bool {
        self.pump();
        !self.rx_bytes.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx_bytes.is_empty() {
            self.pump();
        }
        self.rx_bytes.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.frame_tx
            .send(bytes.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn poll_link_event(&mut self) -> Option<LinkEvent> {
        self.pump();
        self.link_events.pop_front()
    }
}
