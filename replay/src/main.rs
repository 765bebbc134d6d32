mod codec;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use qr_capture_common::config::Config;
use qr_capture_engine::service::CaptureService;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("failed to read detection log {0}: {1}")]
    ReadLog(String, std::io::Error),
}

#[tokio::main]
async fn main() {
    let log_path = match std::env::args().nth(1).map(PathBuf::from) {
        Some(p) => p,
        None => {
            eprintln!("usage: qr-capture-replay <detections.log> [config.toml]");
            std::process::exit(1);
        }
    };
    let config = match std::env::args().nth(2).map(PathBuf::from) {
        Some(path) => match Config::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        log = %log_path.display(),
        interval_ms = config.replay.frame_interval_ms,
        "starting qr-capture replay"
    );

    let detections = match read_detections(&log_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    if detections.is_empty() {
        warn!("detection log is empty, nothing to replay");
        return;
    }

    let service = CaptureService::spawn(
        codec::TextFrameProbe,
        Arc::new(codec::TextFrameDecoder),
        &config,
    );
    let interval = Duration::from_millis(config.replay.frame_interval_ms);

    for (line_no, detection) in &detections {
        service.ingest(detection);
        let progress = service.progress();
        if let Some(total) = progress.total {
            debug!(
                line = *line_no,
                captured = progress.captured,
                total,
                "capture progress"
            );
        }
        tokio::time::sleep(interval).await;
    }

    // Let any in-flight decode land before draining.
    tokio::time::sleep(interval.max(Duration::from_millis(50))).await;

    let payloads = service.drain_pending();
    if payloads.is_empty() {
        warn!(
            detections = detections.len(),
            "replay produced no complete payloads"
        );
    } else {
        info!(
            detections = detections.len(),
            payloads = payloads.len(),
            "replay complete"
        );
        let report: Vec<serde_json::Value> = payloads
            .iter()
            .map(|p| {
                serde_json::json!({
                    "bytes": p.size(),
                    "frames": p.frames_used(),
                    "decoded_at": p.decoded_at().to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(report));
    }

    service.shutdown().await;
}

/// Read one detection per line; blank lines and `#` comments are skipped
/// (recorded logs carry operator notes between captures).
fn read_detections(path: &Path) -> Result<Vec<(usize, String)>, ReplayError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ReplayError::ReadLog(path.display().to_string(), e))?;
    Ok(content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim().to_string()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect())
}
