/// Serial transport: a continuously open byte stream at a fixed baud rate
use log::{debug, info};
use tokio::io::AsyncReadExt;
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits,
};

use crate::config::SerialConfig;
use crate::error::IngestError;
use crate::models::TransportKind;
use crate::transport::Payload;

const KIND: TransportKind = TransportKind::Serial;
const READ_BUFFER_BYTES: usize = 256;

/// Serial ports are usable when the platform can enumerate them
pub fn check_support() -> Result<(), IngestError> {
    tokio_serial::available_ports()
        .map(|_| ())
        .map_err(|e| IngestError::UnsupportedTransport {
            kind: KIND,
            reason: e.to_string(),
        })
}

pub struct SerialSession {
    path: String,
    port: Option<SerialStream>,
    buffer: Vec<u8>,
}

impl SerialSession {
    /// Open the configured port, or the first one found, as 8N1 without flow control
    pub fn open(config: &SerialConfig) -> Result<Self, IngestError> {
        let path = match &config.port {
            Some(path) => path.clone(),
            None => first_available_port()?,
        };

        let port = tokio_serial::new(&path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| IngestError::connect(KIND, format!("{}: {}", path, e)))?;

        info!("Opened {} at {} baud", path, config.baud_rate);

        Ok(SerialSession {
            path,
            port: Some(port),
            buffer: vec![0; READ_BUFFER_BYTES],
        })
    }

    /// Wait for the next chunk of bytes; `None` once the port has closed
    pub async fn next_chunk(&mut self) -> Result<Option<Payload>, IngestError> {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return Ok(None),
        };

        match port.read(&mut self.buffer).await {
            Ok(0) => {
                info!("Serial port {} closed", self.path);
                Ok(None)
            }
            Ok(n) => Ok(Some(Payload::Chunk(self.buffer[..n].to_vec()))),
            Err(e) => Err(IngestError::read(KIND, e)),
        }
    }

    /// Close the port
    pub async fn release(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.path);
        }
    }
}

fn first_available_port() -> Result<String, IngestError> {
    let ports =
        tokio_serial::available_ports().map_err(|e| IngestError::connect(KIND, e))?;
    ports
        .into_iter()
        .next()
        .map(|p| p.port_name)
        .ok_or_else(|| IngestError::connect(KIND, "no serial port available"))
}
