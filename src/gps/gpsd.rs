// src/gps/gpsd.rs
//! GPSD client implementation

use super::{
    data::RawFix,
    sampler::{runtime_handle, FixSink, GeoSampler, SamplingPolicy, Throttle},
};
use crate::error::{RecorderError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    task::JoinHandle,
};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(format!("{}:{}", host, port))
        .await
        .map_err(|e| RecorderError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e)))?;

    // Send WATCH command to start receiving JSON data
    let watch_cmd = "?WATCH={\"enable\":true,\"json\":true}\n";
    stream
        .write_all(watch_cmd.as_bytes())
        .await
        .map_err(|e| RecorderError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data.
///
/// Returns a fix for TPV reports that carry a 2D/3D position, `None` for
/// everything else.
pub fn parse_gpsd_json(line: &str) -> Result<Option<RawFix>> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| RecorderError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    match msg.class.as_str() {
        "TPV" => Ok(parse_tpv_message(&msg.data)),
        "VERSION" => {
            if let Some(version) = msg.data.get("release").and_then(|v| v.as_str()) {
                log::info!("Connected to gpsd version: {}", version);
            }
            Ok(None)
        }
        "DEVICES" => {
            if let Some(devices) = msg.data.get("devices").and_then(|v| v.as_array()) {
                log::info!("gpsd managing {} device(s)", devices.len());
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(msg_data: &HashMap<String, serde_json::Value>) -> Option<RawFix> {
    let number = |key: &str| msg_data.get(key).and_then(|v| v.as_f64());

    // mode 0/1 means no fix yet
    let mode = msg_data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    if mode < 2 {
        return None;
    }

    let latitude = number("lat")?;
    let longitude = number("lon")?;

    let timestamp = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    // Prefer the horizontal error estimate, fall back to the worse axis
    let accuracy = number("eph").or_else(|| match (number("epx"), number("epy")) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    });

    Some(RawFix {
        latitude,
        longitude,
        timestamp,
        accuracy,
        speed: number("speed"), // already m/s
        heading: number("track"),
    })
}

/// Location source backed by a gpsd daemon.
pub struct GpsdSampler {
    host: String,
    port: u16,
    policy: SamplingPolicy,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl GpsdSampler {
    pub fn new(host: impl Into<String>, port: u16, policy: SamplingPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

impl GeoSampler for GpsdSampler {
    fn name(&self) -> &str {
        "gpsd"
    }

    fn start(&mut self, sink: FixSink) -> Result<()> {
        let runtime = runtime_handle("gpsd sampler")?;
        self.stop();

        let host = self.host.clone();
        let port = self.port;
        let mut throttle = Throttle::new(self.policy);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Relaxed);

        self.task = Some(runtime.spawn(async move {
            log::info!("Connecting to gpsd at {}:{}...", host, port);
            let mut reader = match connect_gpsd(&host, port).await {
                Ok(reader) => reader,
                Err(e) => {
                    log::warn!("{}", e);
                    return;
                }
            };

            let mut line = String::new();
            while running.load(Ordering::Relaxed) && !sink.is_closed() {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        log::warn!("gpsd closed the connection");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_gpsd_json(line) {
                            Ok(Some(fix)) if throttle.admit(&fix) => {
                                sink.deliver(fix);
                            }
                            Ok(_) => {}
                            Err(e) => log::debug!("{}", e),
                        }
                    }
                    Err(e) => {
                        log::warn!("Error reading from gpsd: {}", e);
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}

impl Drop for GpsdSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::sampler::fix_channel;
    use tokio::net::TcpListener;

    #[test]
    fn test_tpv_parsing() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"2023-01-01T12:00:00.000Z","ept":0.005,"lat":48.117,"lon":11.517,"alt":545.4,"epx":15.319,"epy":17.054,"epv":124.484,"track":10.3797,"speed":0.091,"climb":10.7,"eps":34.11,"epc":248.97}"#;

        let fix = parse_gpsd_json(json).unwrap().unwrap();

        assert_eq!(fix.latitude, 48.117);
        assert_eq!(fix.longitude, 11.517);
        assert_eq!(fix.speed, Some(0.091));
        assert_eq!(fix.heading, Some(10.3797));
        assert_eq!(fix.accuracy, Some(17.054));
        assert_eq!(fix.timestamp, 1_672_574_400_000);
    }

    #[test]
    fn test_tpv_prefers_eph() {
        let json = r#"{"class":"TPV","mode":2,"lat":1.0,"lon":2.0,"eph":3.5,"epx":9.0,"epy":9.0}"#;
        let fix = parse_gpsd_json(json).unwrap().unwrap();
        assert_eq!(fix.accuracy, Some(3.5));
    }

    #[test]
    fn test_tpv_without_fix() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":1}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_non_tpv_messages() {
        let sky = r#"{"class":"SKY","hdop":1.2,"satellites":[{"PRN":1,"ss":42,"used":true}]}"#;
        assert!(parse_gpsd_json(sky).unwrap().is_none());

        let version = r#"{"class":"VERSION","release":"3.25","proto_major":3}"#;
        assert!(parse_gpsd_json(version).unwrap().is_none());
    }

    #[test]
    fn test_invalid_json() {
        let invalid_json = r#"{"invalid": json"#;
        assert!(parse_gpsd_json(invalid_json).is_err());
    }

    #[tokio::test]
    async fn test_sampler_streams_from_daemon() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut watch = vec![0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut watch).await;
            let reports = concat!(
                r#"{"class":"VERSION","release":"3.25"}"#, "\n",
                r#"{"class":"TPV","mode":3,"time":"2023-01-01T12:00:00.000Z","lat":48.1170,"lon":11.517,"eph":4.0}"#, "\n",
                r#"{"class":"TPV","mode":3,"time":"2023-01-01T12:00:01.000Z","lat":48.1171,"lon":11.517,"eph":4.0}"#, "\n",
                r#"{"class":"TPV","mode":3,"time":"2023-01-01T12:00:05.000Z","lat":48.1172,"lon":11.517,"eph":4.0}"#, "\n",
            );
            socket.write_all(reports.as_bytes()).await.unwrap();
        });

        let (mut channel, mut rx) = fix_channel();
        let mut sampler = GpsdSampler::new("127.0.0.1", port, SamplingPolicy::default());
        sampler.start(channel.subscribe()).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        sampler.stop();
        daemon.await.unwrap();

        // The 1 s report is throttled away
        assert_eq!(first.fix.latitude, 48.1170);
        assert_eq!(second.fix.latitude, 48.1172);
        assert_eq!(second.epoch, 1);
        assert!(!sampler.is_active());
    }
}
