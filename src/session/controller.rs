/// Session lifecycle: connect, ingest, disconnect
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::IngestConfig;
use crate::decoding::{Decoded, RecordPipeline};
use crate::error::IngestError;
use crate::models::{Signal, TransportKind};
use crate::series::{RollingSeriesStore, SignalSeries};
use crate::session::state::{IngestStats, LatestValues, SessionSnapshot, SessionState};
use crate::transport::{Connector, DeviceConnector, Transport};

#[derive(Debug, Default)]
struct Live {
    latest: LatestValues,
    stats: IngestStats,
    last_error: Option<String>,
}

/// State shared between the controller and the read loop task
struct Shared {
    live: RwLock<Live>,
    store: RollingSeriesStore,
    state: watch::Sender<SessionState>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn read_live(&self) -> std::sync::RwLockReadGuard<'_, Live> {
        self.live.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_live(&self) -> std::sync::RwLockWriteGuard<'_, Live> {
        self.live.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Session state: {} -> {}", previous, state);
        }
    }

    fn set_error(&self, err: &IngestError) {
        self.write_live().last_error = Some(err.to_string());
    }

    /// Forget every reading of the previous session
    fn clear_readings(&self) {
        self.write_live().latest = LatestValues::default();
        self.store.reset();
    }

    fn ingest(&self, decoded: Decoded) {
        {
            let mut live = self.write_live();
            live.stats.records_rejected += decoded.rejected as u64;
            live.stats.lines_filtered += decoded.filtered as u64;
            live.stats.overflows += decoded.overflows as u64;
        }

        for reading in decoded.readings {
            let updates = {
                let mut live = self.write_live();
                live.stats.records_applied += 1;
                if reading.is_partial() {
                    live.stats.partial_records += 1;
                }
                live.latest.apply(&reading)
            };
            for (signal, value) in updates {
                self.store.record(signal, value);
            }
            self.revision.send_modify(|revision| *revision += 1);
        }
    }
}

struct ActiveSession {
    kind: TransportKind,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the single active transport session and everything derived from it
pub struct SessionController<C: Connector> {
    connector: C,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveSession>>,
    max_line_bytes: usize,
}

impl SessionController<DeviceConnector> {
    pub fn from_config(config: &IngestConfig) -> Self {
        SessionController::new(
            DeviceConnector::new(config.clone()),
            config.history_capacity,
            config.max_line_bytes,
        )
    }
}

impl<C: Connector> SessionController<C> {
    pub fn new(connector: C, history_capacity: usize, max_line_bytes: usize) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (revision, _) = watch::channel(0);
        SessionController {
            connector,
            shared: Arc::new(Shared {
                live: RwLock::new(Live::default()),
                store: RollingSeriesStore::new(history_capacity),
                state,
                revision,
            }),
            active: Mutex::new(None),
            max_line_bytes,
        }
    }

    /// Open a session on `kind` and start ingesting from it
    pub async fn connect(&self, kind: TransportKind) -> Result<(), IngestError> {
        let mut active = self.active.lock().await;

        if let Some(session) = active.as_ref() {
            if !session.task.is_finished() {
                return Err(IngestError::AlreadyConnected(session.kind));
            }
        }
        // A session that ended on its own has already cleaned up
        if let Some(finished) = active.take() {
            let _ = finished.task.await;
        }

        if let Err(e) = self.connector.check_support(kind).await {
            warn!("{}", e);
            self.shared.set_error(&e);
            return Err(e);
        }

        self.shared.write_live().last_error = None;
        self.shared.set_state(SessionState::Connecting);
        info!("Connecting over {}", kind);

        let transport = match self.connector.open(kind).await {
            Ok(transport) => transport,
            Err(e) => {
                error!("{}", e);
                self.shared.clear_readings();
                self.shared.set_error(&e);
                self.shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        self.shared.clear_readings();
        self.shared.write_live().stats = IngestStats::default();
        self.shared.set_state(SessionState::Connected(kind));
        info!("Connected over {}", kind);

        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            transport,
            cancelled,
            self.max_line_bytes,
        ));
        *active = Some(ActiveSession { kind, cancel, task });

        Ok(())
    }

    /// End the active session, if any, and wait until its transport is released
    pub async fn disconnect(&self) {
        let session = match self.active.lock().await.take() {
            Some(session) => session,
            None => return,
        };

        info!("Disconnecting {} device", session.kind);
        // The loop may already be finishing on its own; that is fine.
        let _ = session.cancel.send(());
        if let Err(e) = session.task.await {
            error!("Session task failed: {}", e);
            self.shared.clear_readings();
            self.shared.set_state(SessionState::Disconnected);
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.read_live().last_error.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        let live = self.shared.read_live();
        SessionSnapshot {
            state,
            latest: live.latest.clone(),
            stats: live.stats,
            last_error: live.last_error.clone(),
        }
    }

    pub fn series(&self, signal: Signal) -> SignalSeries {
        self.shared.store.snapshot(signal)
    }

    pub fn series_snapshot(&self) -> HashMap<Signal, SignalSeries> {
        self.shared.store.snapshot_all()
    }

    pub fn plot_window(&self, signal: Signal, width: u64) -> (u64, u64) {
        self.shared.store.plot_window(signal, width)
    }

    /// Clear the plotting series without touching history or latest values
    pub fn reset_plots(&self) {
        self.shared.store.reset_plots();
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Revision counter bumped after every applied record
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }
}

impl<C: Connector> Drop for SessionController<C> {
    fn drop(&mut self) {
        // The read loop still releases the transport after the controller is gone
        if let Some(session) = self.active.get_mut().take() {
            let _ = session.cancel.send(());
        }
    }
}

async fn read_loop<T: Transport>(
    shared: Arc<Shared>,
    mut transport: T,
    mut cancelled: oneshot::Receiver<()>,
    max_line_bytes: usize,
) {
    let kind = transport.kind();
    let mut pipeline = RecordPipeline::new(max_line_bytes);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => break Ok("disconnect requested"),
            result = transport.next_payload() => match result {
                Ok(Some(payload)) => shared.ingest(pipeline.process(&payload)),
                Ok(None) => break Ok("remote end closed the link"),
                Err(e) => break Err(e),
            },
        }
    };

    // Release before anyone can observe Disconnected
    transport.release().await;

    match outcome {
        Ok(reason) => info!("{} session ended: {}", kind, reason),
        Err(e) => {
            error!("{}", e);
            shared.set_error(&e);
        }
    }

    let stats = shared.read_live().stats;
    info!(
        "{} session totals: {} applied, {} rejected, {} partial, {} filtered, {} overflows",
        kind,
        stats.records_applied,
        stats.records_rejected,
        stats.partial_records,
        stats.lines_filtered,
        stats.overflows
    );

    shared.clear_readings();
    shared.set_state(SessionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Payload;
    use base64::{engine::general_purpose, Engine as _};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    type Feed = mpsc::UnboundedSender<Result<Option<Payload>, IngestError>>;

    struct StubTransport {
        kind: TransportKind,
        feed: mpsc::UnboundedReceiver<Result<Option<Payload>, IngestError>>,
        released: Arc<AtomicUsize>,
    }

    impl Transport for StubTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn next_payload(&mut self) -> Result<Option<Payload>, IngestError> {
            self.feed.recv().await.unwrap_or(Ok(None))
        }

        async fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubConnector {
        unsupported: bool,
        fail_open: bool,
        links: std::sync::Mutex<Vec<StubTransport>>,
        opened: AtomicUsize,
    }

    struct Link {
        feed: Feed,
        released: Arc<AtomicUsize>,
    }

    impl StubConnector {
        fn with_link(self, kind: TransportKind) -> (Self, Link) {
            let (feed, rx) = mpsc::unbounded_channel();
            let released = Arc::new(AtomicUsize::new(0));
            self.links.lock().unwrap().insert(
                0,
                StubTransport {
                    kind,
                    feed: rx,
                    released: Arc::clone(&released),
                },
            );
            (self, Link { feed, released })
        }
    }

    impl Connector for StubConnector {
        type Session = StubTransport;

        async fn check_support(&self, kind: TransportKind) -> Result<(), IngestError> {
            if self.unsupported {
                Err(IngestError::UnsupportedTransport {
                    kind,
                    reason: "no adapter".to_string(),
                })
            } else {
                Ok(())
            }
        }

        async fn open(&self, kind: TransportKind) -> Result<StubTransport, IngestError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(IngestError::connect(kind, "device not found"));
            }
            let link = self.links.lock().unwrap().pop();
            link.ok_or_else(|| IngestError::connect(kind, "no stub link left"))
        }
    }

    const RECORD: &str = "30,30,30,0,0,0.1,0,3,4,45.75,21.23,90.5,7,-2.5,-70";

    fn chunk(text: &str) -> Result<Option<Payload>, IngestError> {
        Ok(Some(Payload::Chunk(text.as_bytes().to_vec())))
    }

    async fn wait_for_revision(controller: &SessionController<StubConnector>, revision: u64) {
        let mut updates = controller.subscribe_updates();
        timeout(Duration::from_secs(2), updates.wait_for(|r| *r >= revision))
            .await
            .expect("timed out waiting for records")
            .expect("revision channel closed");
    }

    async fn wait_for_disconnect(controller: &SessionController<StubConnector>) {
        let mut state = controller.subscribe_state();
        timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == SessionState::Disconnected),
        )
        .await
        .expect("timed out waiting for disconnect")
        .expect("state channel closed");
    }

    fn assert_cleared(controller: &SessionController<StubConnector>) {
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, SessionState::Disconnected);
        assert!(snapshot.latest.is_unknown());
        assert!(controller
            .series_snapshot()
            .values()
            .all(|s| s.history.is_empty() && s.plot.is_empty()));
    }

    #[tokio::test]
    async fn serial_chunks_update_latest_values_and_series() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);

        controller.connect(TransportKind::Serial).await.unwrap();
        assert_eq!(controller.state(), SessionState::Connected(TransportKind::Serial));

        let (head, tail) = RECORD.split_at(17);
        link.feed.send(chunk(&format!("ESP-ROM boot\n{}", head))).unwrap();
        link.feed.send(chunk(&format!("{}\n", tail))).unwrap();
        wait_for_revision(&controller, 1).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.latest.finger_temperature, Some(-2.5));
        assert_eq!(snapshot.latest.wrist_temperature, Some(2.02));
        assert_eq!(snapshot.latest.frostbite_risk, Some(crate::models::FrostbiteRisk::Medium));
        assert_eq!(snapshot.latest.magnetometer.map(|m| m.resultant), Some(51.96));
        assert_eq!(snapshot.latest.accelerometer.map(|a| a.resultant), Some(5.0));
        assert_eq!(snapshot.latest.satellites, Some(7));
        assert_eq!(snapshot.stats.lines_filtered, 1);
        assert_eq!(snapshot.stats.records_applied, 1);

        for signal in Signal::ALL {
            let series = controller.series(signal);
            assert_eq!(series.history.len(), 1);
            assert_eq!(series.plot[0].index, 0);
        }

        controller.disconnect().await;
    }

    #[tokio::test]
    async fn ble_notifications_are_base64_records() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Ble);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Ble).await.unwrap();

        let encoded = general_purpose::STANDARD.encode(RECORD).into_bytes();
        link.feed.send(Ok(Some(Payload::Notification(encoded.clone())))).unwrap();
        link.feed.send(Ok(Some(Payload::Notification(encoded)))).unwrap();
        wait_for_revision(&controller, 2).await;

        let series = controller.series(Signal::Temperature);
        assert_eq!(series.plot.len(), 2);
        assert_eq!(series.plot[1].index, 1);

        controller.disconnect().await;
    }

    #[tokio::test]
    async fn short_record_updates_nothing_and_garbled_gps_is_partial() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();

        link.feed.send(chunk(&format!("{}\n", RECORD))).unwrap();
        link.feed.send(chunk("1,2,3,4\n")).unwrap();
        link.feed
            .send(chunk("30,30,30,0,0,0.1,0,3,4,??,21.23,90.5,7,5,-70\n"))
            .unwrap();
        wait_for_revision(&controller, 2).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.stats.records_rejected, 1);
        assert_eq!(snapshot.stats.partial_records, 1);
        assert_eq!(snapshot.latest.finger_temperature, Some(5.0));
        assert_eq!(snapshot.latest.gps.map(|g| g.latitude), Some(45.75));
        assert_eq!(controller.series(Signal::Temperature).plot.len(), 2);

        controller.disconnect().await;
    }

    #[tokio::test]
    async fn explicit_disconnect_releases_and_clears() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();

        link.feed.send(chunk(&format!("{}\n", RECORD))).unwrap();
        wait_for_revision(&controller, 1).await;

        controller.disconnect().await;
        assert_eq!(link.released.load(Ordering::SeqCst), 1);
        assert_cleared(&controller);
        assert_eq!(controller.last_error(), None);

        // a second disconnect is a no-op
        controller.disconnect().await;
        assert_eq!(link.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_drop_releases_and_clears() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Ble);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Ble).await.unwrap();

        let encoded = general_purpose::STANDARD.encode(RECORD).into_bytes();
        link.feed.send(Ok(Some(Payload::Notification(encoded)))).unwrap();
        wait_for_revision(&controller, 1).await;

        link.feed.send(Ok(None)).unwrap();
        wait_for_disconnect(&controller).await;

        assert_eq!(link.released.load(Ordering::SeqCst), 1);
        assert_cleared(&controller);
        assert_eq!(controller.last_error(), None);
    }

    #[tokio::test]
    async fn read_error_forces_disconnect_with_message() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();

        link.feed.send(chunk(&format!("{}\n", RECORD))).unwrap();
        link.feed
            .send(Err(IngestError::read(TransportKind::Serial, "device unplugged")))
            .unwrap();
        wait_for_disconnect(&controller).await;

        assert_eq!(link.released.load(Ordering::SeqCst), 1);
        assert_cleared(&controller);
        assert_eq!(
            controller.last_error().as_deref(),
            Some("Serial read error: device unplugged")
        );
    }

    #[tokio::test]
    async fn unsupported_transport_leaves_state_untouched() {
        let connector = StubConnector {
            unsupported: true,
            ..Default::default()
        };
        let controller = SessionController::new(connector, 50, 1024);

        let err = controller.connect(TransportKind::Ble).await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedTransport { .. }));
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert_eq!(controller.connector.opened.load(Ordering::SeqCst), 0);
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn failed_open_returns_to_disconnected() {
        let connector = StubConnector {
            fail_open: true,
            ..Default::default()
        };
        let controller = SessionController::new(connector, 50, 1024);

        let err = controller.connect(TransportKind::Ble).await.unwrap_err();
        assert_eq!(err.to_string(), "BLE error: device not found");
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert_eq!(
            controller.last_error().as_deref(),
            Some("BLE error: device not found")
        );
    }

    #[tokio::test]
    async fn second_connect_while_active_is_rejected() {
        let (connector, _link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();

        let err = controller.connect(TransportKind::Ble).await.unwrap_err();
        assert_eq!(err, IngestError::AlreadyConnected(TransportKind::Serial));
        assert_eq!(controller.state(), SessionState::Connected(TransportKind::Serial));

        controller.disconnect().await;
    }

    #[tokio::test]
    async fn reconnect_starts_from_empty_buffers() {
        let (connector, first) = StubConnector::default().with_link(TransportKind::Serial);
        let (connector, second) = connector.with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);

        controller.connect(TransportKind::Serial).await.unwrap();
        first.feed.send(chunk(&format!("{}\n{}\n", RECORD, RECORD))).unwrap();
        wait_for_revision(&controller, 2).await;
        first.feed.send(Ok(None)).unwrap();
        wait_for_disconnect(&controller).await;

        controller.connect(TransportKind::Serial).await.unwrap();
        let snapshot = controller.snapshot();
        assert!(snapshot.latest.is_unknown());
        assert_eq!(snapshot.stats, IngestStats::default());

        second.feed.send(chunk(&format!("{}\n", RECORD))).unwrap();
        wait_for_revision(&controller, 3).await;
        assert_eq!(controller.series(Signal::Gyroscope).plot[0].index, 0);
        assert_eq!(controller.series(Signal::Gyroscope).plot.len(), 1);

        controller.disconnect().await;
        assert_eq!(first.released.load(Ordering::SeqCst), 1);
        assert_eq!(second.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_plots_keeps_latest_values() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();

        link.feed.send(chunk(&format!("{}\n", RECORD))).unwrap();
        wait_for_revision(&controller, 1).await;

        controller.reset_plots();
        assert!(controller.series(Signal::Temperature).plot.is_empty());
        assert_eq!(controller.series(Signal::Temperature).history.len(), 1);
        assert_eq!(controller.snapshot().latest.finger_temperature, Some(-2.5));
        assert_eq!(controller.plot_window(Signal::Temperature, 30), (0, 30));

        controller.disconnect().await;
    }

    #[tokio::test]
    async fn displayed_temperature_drives_risk() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();

        link.feed
            .send(chunk("30,30,30,0,0,0.1,0,3,4,45.75,21.23,90.5,7,-3.96,-70\n"))
            .unwrap();
        wait_for_revision(&controller, 1).await;

        let latest = controller.snapshot().latest;
        assert_eq!(latest.finger_temperature, Some(-4.0));
        assert_eq!(latest.frostbite_risk, Some(crate::models::FrostbiteRisk::High));
        assert_eq!(latest.wrist_temperature, Some(0.59));
        assert_eq!(controller.series(Signal::Temperature).plot[0].value, -4.0);

        controller.disconnect().await;
    }

    #[tokio::test]
    async fn dropping_the_controller_releases_the_transport() {
        let (connector, link) = StubConnector::default().with_link(TransportKind::Serial);
        let controller = SessionController::new(connector, 50, 1024);
        controller.connect(TransportKind::Serial).await.unwrap();
        let mut state = controller.subscribe_state();

        drop(controller);

        timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == SessionState::Disconnected),
        )
        .await
        .expect("session outlived its controller")
        .expect("state channel closed");
        assert_eq!(link.released.load(Ordering::SeqCst), 1);
    }
}
