/// Bluetooth Low Energy transport: discovery, connection and notifications
use bluer::gatt::remote::Characteristic;
use bluer::gatt::CharacteristicReader;
use bluer::{Adapter, AdapterEvent, Device, DiscoveryFilter, DiscoveryTransport, Session, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use tokio::time::{interval, timeout, Duration};

use crate::config::BleConfig;
use crate::error::IngestError;
use crate::models::TransportKind;
use crate::transport::Payload;

const KIND: TransportKind = TransportKind::Ble;
// Advertised services can resolve after a device is first seen
const RECHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Verify that a powered Bluetooth adapter can be reached
pub async fn check_support() -> Result<(), IngestError> {
    let unsupported = |e: bluer::Error| IngestError::UnsupportedTransport {
        kind: KIND,
        reason: e.to_string(),
    };
    let session = Session::new().await.map_err(unsupported)?;
    session.default_adapter().await.map_err(unsupported)?;
    Ok(())
}

/// A connected device with an active notification subscription
pub struct BleSession {
    // Keeps the D-Bus connection alive for as long as the device is used
    _session: Session,
    device: Device,
    reader: Option<CharacteristicReader>,
}

impl BleSession {
    /// Discover a device advertising the service, connect, and subscribe to
    /// the data characteristic
    pub async fn connect(config: &BleConfig) -> Result<Self, IngestError> {
        let session = Session::new()
            .await
            .map_err(|e| IngestError::connect(KIND, e))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| IngestError::connect(KIND, e))?;

        // Ensure Bluetooth adapter is powered on
        if let Err(e) = adapter.set_powered(true).await {
            error!("Failed to power on adapter: {}", e);
            return Err(IngestError::connect(KIND, e));
        }

        let device = discover(&adapter, config).await?;
        info!("Connecting to {}", device.address());

        if !device.is_connected().await.unwrap_or(false) {
            device
                .connect()
                .await
                .map_err(|e| IngestError::connect(KIND, e))?;
        }

        let characteristic = match find_characteristic(&device, config).await {
            Ok(characteristic) => characteristic,
            Err(e) => {
                let _ = device.disconnect().await;
                return Err(e);
            }
        };

        let reader = match characteristic.notify_io().await {
            Ok(reader) => reader,
            Err(e) => {
                let _ = device.disconnect().await;
                return Err(IngestError::connect(KIND, e));
            }
        };
        info!(
            "Subscribed to notifications from {} (mtu {})",
            device.address(),
            reader.mtu()
        );

        Ok(BleSession {
            _session: session,
            device,
            reader: Some(reader),
        })
    }

    /// Wait for the next notification; `None` once the link has dropped
    pub async fn next_notification(&mut self) -> Result<Option<Payload>, IngestError> {
        let reader = match self.reader.as_ref() {
            Some(reader) => reader,
            None => return Ok(None),
        };

        match reader.recv().await {
            Ok(value) => match notification_payload(value) {
                Some(payload) => Ok(Some(payload)),
                None => {
                    info!(
                        "Notification stream from {} closed",
                        self.device.address()
                    );
                    Ok(None)
                }
            },
            Err(e) => {
                if self.device.is_connected().await.unwrap_or(false) {
                    Err(IngestError::read(KIND, e))
                } else {
                    info!("Device {} disconnected", self.device.address());
                    Ok(None)
                }
            }
        }
    }

    /// Stop notifications and drop the link
    pub async fn release(&mut self) {
        // Dropping the reader closes the notification socket
        if self.reader.take().is_some() {
            debug!("Stopped notifications from {}", self.device.address());
        }
        if let Err(e) = self.device.disconnect().await {
            warn!("BLE disconnect error: {}", e);
        }
    }
}

async fn discover(adapter: &Adapter, config: &BleConfig) -> Result<Device, IngestError> {
    // Configure discovery filter for Low Energy devices advertising the service
    let filter = DiscoveryFilter {
        uuids: HashSet::from([config.service_uuid]),
        transport: DiscoveryTransport::Le,
        duplicate_data: false,
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    let events = adapter
        .discover_devices()
        .await
        .map_err(|e| IngestError::connect(KIND, e))?;
    let mut events = Box::pin(events);

    let search = async {
        // Devices already known to the adapter, then anything discovered later
        let mut candidates: Vec<Device> = adapter
            .device_addresses()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|addr| adapter.device(addr).ok())
            .collect();
        let mut recheck = interval(RECHECK_INTERVAL);

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        if let Ok(device) = adapter.device(addr) {
                            if advertises(&device, config.service_uuid).await {
                                return Some(device);
                            }
                            candidates.push(device);
                        }
                    }
                    Some(AdapterEvent::DeviceRemoved(addr)) => {
                        candidates.retain(|d| d.address() != addr);
                    }
                    Some(_) => {}
                    None => return None,
                },
                _ = recheck.tick() => {
                    for device in &candidates {
                        if advertises(device, config.service_uuid).await {
                            return Some(device.clone());
                        }
                    }
                }
            }
        }
    };

    // Discovery stops when the event stream is dropped
    match timeout(Duration::from_secs(config.scan_secs), search).await {
        Ok(Some(device)) => Ok(device),
        Ok(None) => Err(IngestError::connect(KIND, "discovery ended unexpectedly")),
        Err(_) => Err(IngestError::connect(
            KIND,
            format!(
                "no device advertising {} found within {} s",
                config.service_uuid, config.scan_secs
            ),
        )),
    }
}

/// An empty read means the notification socket reached end of stream
fn notification_payload(value: Vec<u8>) -> Option<Payload> {
    if value.is_empty() {
        None
    } else {
        Some(Payload::Notification(value))
    }
}

fn offers_service(uuids: Option<&HashSet<Uuid>>, service: Uuid) -> bool {
    uuids.map(|u| u.contains(&service)).unwrap_or(false)
}

async fn advertises(device: &Device, service: Uuid) -> bool {
    match device.uuids().await {
        Ok(uuids) => offers_service(uuids.as_ref(), service),
        Err(e) => {
            debug!("Failed to read services of {}: {}", device.address(), e);
            false
        }
    }
}

async fn find_characteristic(
    device: &Device,
    config: &BleConfig,
) -> Result<Characteristic, IngestError> {
    let services = device
        .services()
        .await
        .map_err(|e| IngestError::connect(KIND, e))?;

    for service in services {
        match service.uuid().await {
            Ok(uuid) if uuid == config.service_uuid => {}
            _ => continue,
        }
        let characteristics = service
            .characteristics()
            .await
            .map_err(|e| IngestError::connect(KIND, e))?;
        for characteristic in characteristics {
            if let Ok(uuid) = characteristic.uuid().await {
                if uuid == config.characteristic_uuid {
                    return Ok(characteristic);
                }
            }
        }
    }

    Err(IngestError::connect(
        KIND,
        format!(
            "characteristic {} not found in service {}",
            config.characteristic_uuid, config.service_uuid
        ),
    ))
}
