use log::{error, info, warn};
use time::OffsetDateTime;
use tokio::time::{interval, sleep, Duration};

use hike_alert_ingest::config::IngestConfig;
use hike_alert_ingest::error::IngestError;
use hike_alert_ingest::series::DEFAULT_PLOT_WINDOW;
use hike_alert_ingest::session::{SessionController, SessionSnapshot, SessionState};
use hike_alert_ingest::transport::DeviceConnector;
use hike_alert_ingest::utils::{
    format_datetime, format_gps, format_risk, format_temperature, format_vector,
    format_wrist_temperature,
};
use hike_alert_ingest::Signal;

type Controller = SessionController<DeviceConnector>;

fn log_summary(controller: &Controller, snapshot: &SessionSnapshot) {
    let latest = &snapshot.latest;
    info!(
        "Summary at {} ({}):",
        format_datetime(&OffsetDateTime::now_utc()),
        snapshot.state
    );
    info!("  Frostbite risk: {}", format_risk(latest.frostbite_risk));
    info!(
        "  Finger temperature: {}",
        format_temperature(latest.finger_temperature)
    );
    info!(
        "  Wrist temperature: {}",
        format_wrist_temperature(latest.wrist_temperature)
    );
    info!(
        "  Magnetometer (μT): {}",
        format_vector(latest.magnetometer.as_ref())
    );
    info!(
        "  Gyroscope (°/s): {}",
        format_vector(latest.gyroscope.as_ref())
    );
    info!(
        "  Accelerometer (m/s²): {}",
        format_vector(latest.accelerometer.as_ref())
    );
    info!("  GPS: {}", format_gps(latest.gps.as_ref()));
    info!(
        "  Satellites: {}",
        latest
            .satellites
            .map(|s| s.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    );

    for signal in Signal::ALL {
        let series = controller.series(signal);
        let (min, max) = controller.plot_window(signal, DEFAULT_PLOT_WINDOW);
        info!(
            "  {} series: {} recent, {} plotted, window {}..{}",
            signal.name(),
            series.history.len(),
            series.plot.len(),
            min,
            max
        );
    }

    let stats = &snapshot.stats;
    info!(
        "  Records: {} applied, {} rejected, {} partial",
        stats.records_applied, stats.records_rejected, stats.partial_records
    );
}

/// Log a summary periodically until the session ends
async fn monitor(controller: &Controller, config: &IngestConfig) {
    let mut state = controller.subscribe_state();
    let mut ticker = interval(Duration::from_secs(config.summary_secs.max(1)));
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => log_summary(controller, &controller.snapshot()),
            _ = state.wait_for(|s| *s == SessionState::Disconnected) => break,
        }
    }
}

async fn main_loop(
    controller: &Controller,
    config: &IngestConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Hike Alert ingestion over {}", config.transport);

    loop {
        match controller.connect(config.transport).await {
            Ok(()) => {
                monitor(controller, config).await;
                match controller.last_error() {
                    Some(e) => warn!("Session ended: {}", e),
                    None => info!("Session ended"),
                }
            }
            Err(e @ IngestError::UnsupportedTransport { .. }) => return Err(e.into()),
            Err(e) => error!("Connection failed: {}", e),
        }

        info!("Reconnecting in {} seconds", config.reconnect_secs);
        sleep(Duration::from_secs(config.reconnect_secs)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match IngestConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let controller = SessionController::from_config(&config);

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                // keep `tx` alive so the main loop is not mistaken for cancelled
                std::future::pending::<()>().await;
            }
        }
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(&controller, &config) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    controller.disconnect().await;

    Ok(())
}
