pub mod ble;
pub mod serial;

use std::future::Future;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::models::TransportKind;

pub use ble::BleSession;
pub use serial::SerialSession;

/// Raw data handed over by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// One BLE characteristic notification, carrying exactly one record
    Notification(Vec<u8>),
    /// An arbitrary slice of the serial byte stream
    Chunk(Vec<u8>),
}

/// An open link to the device
pub trait Transport: Send + 'static {
    fn kind(&self) -> TransportKind;

    /// Suspend until the next payload arrives.
    ///
    /// `Ok(None)` means the remote end closed the link. Dropping the returned
    /// future must leave the transport usable for `release`.
    fn next_payload(&mut self) -> impl Future<Output = Result<Option<Payload>, IngestError>> + Send;

    /// Release the device handle or port. Called exactly once per session.
    fn release(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens transports on behalf of the session controller
pub trait Connector: Send + Sync + 'static {
    type Session: Transport;

    /// Fail with `UnsupportedTransport` when the platform cannot provide `kind`
    fn check_support(
        &self,
        kind: TransportKind,
    ) -> impl Future<Output = Result<(), IngestError>> + Send;

    fn open(
        &self,
        kind: TransportKind,
    ) -> impl Future<Output = Result<Self::Session, IngestError>> + Send;
}

/// The two concrete transports behind one interface
pub enum TransportSession {
    Ble(BleSession),
    Serial(SerialSession),
}

impl Transport for TransportSession {
    fn kind(&self) -> TransportKind {
        match self {
            TransportSession::Ble(_) => TransportKind::Ble,
            TransportSession::Serial(_) => TransportKind::Serial,
        }
    }

    async fn next_payload(&mut self) -> Result<Option<Payload>, IngestError> {
        match self {
            TransportSession::Ble(session) => session.next_notification().await,
            TransportSession::Serial(session) => session.next_chunk().await,
        }
    }

    async fn release(&mut self) {
        match self {
            TransportSession::Ble(session) => session.release().await,
            TransportSession::Serial(session) => session.release().await,
        }
    }
}

/// Opens real BLE and serial links from configuration
#[derive(Debug, Clone)]
pub struct DeviceConnector {
    config: IngestConfig,
}

impl DeviceConnector {
    pub fn new(config: IngestConfig) -> Self {
        DeviceConnector { config }
    }
}

impl Connector for DeviceConnector {
    type Session = TransportSession;

    async fn check_support(&self, kind: TransportKind) -> Result<(), IngestError> {
        match kind {
            TransportKind::Ble => ble::check_support().await,
            TransportKind::Serial => serial::check_support(),
        }
    }

    async fn open(&self, kind: TransportKind) -> Result<TransportSession, IngestError> {
        match kind {
            TransportKind::Ble => BleSession::connect(&self.config.ble)
                .await
                .map(TransportSession::Ble),
            TransportKind::Serial => {
                SerialSession::open(&self.config.serial).map(TransportSession::Serial)
            }
        }
    }
}
