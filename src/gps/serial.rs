// src/gps/serial.rs
//! NMEA receiver on a serial port

use super::{
    data::{PermissionStatus, RawFix},
    nmea::NmeaFixBuilder,
    sampler::{runtime_handle, FixSink, GeoSampler, SamplingPolicy, Throttle},
};
use crate::error::{RecorderError, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;

/// Location source reading NMEA 0183 from a GPS receiver.
pub struct SerialSampler {
    port: String,
    baudrate: u32,
    policy: SamplingPolicy,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SerialSampler {
    pub fn new(port: impl Into<String>, baudrate: u32, policy: SamplingPolicy) -> Self {
        Self {
            port: port.into(),
            baudrate,
            policy,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

impl GeoSampler for SerialSampler {
    fn name(&self) -> &str {
        "Serial GPS"
    }

    /// Device nodes the user may not open count as a denied permission
    fn permission(&self) -> PermissionStatus {
        match std::fs::OpenOptions::new().read(true).open(&self.port) {
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionStatus::Denied,
            _ => PermissionStatus::Granted,
        }
    }

    fn start(&mut self, sink: FixSink) -> Result<()> {
        if !self.permission().is_granted() {
            return Err(RecorderError::PermissionDenied);
        }
        let runtime = runtime_handle("serial sampler")?;
        self.stop();

        log::info!("Connecting to GPS on {} at {} baud...", self.port, self.baudrate);
        let serial = {
            let _guard = runtime.enter();
            tokio_serial::new(&self.port, self.baudrate)
                .timeout(Duration::from_millis(1000))
                .open_native_async()
                .map_err(open_error)?
        };
        log::info!("Connected to {}", self.port);

        let mut throttle = Throttle::new(self.policy);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Relaxed);

        self.task = Some(runtime.spawn(async move {
            let reader = BufReader::new(serial);
            read_sentences(reader, &running, |fix| {
                if throttle.admit(&fix) {
                    sink.deliver(fix)
                } else {
                    !sink.is_closed()
                }
            })
            .await;
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

impl Drop for SerialSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Only an access error on the device maps to a denied permission
fn open_error(error: tokio_serial::Error) -> RecorderError {
    match error.kind {
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => RecorderError::PermissionDenied,
        _ => RecorderError::Serial(error),
    }
}

/// Feed NMEA lines to `on_fix` until EOF, a read error, `running` clearing,
/// or `on_fix` returning false.
///
/// Line noise that is not valid UTF-8 is decoded lossily; the checksum then
/// rejects the sentence.
async fn read_sentences<R, F>(mut reader: R, running: &AtomicBool, mut on_fix: F)
where
    R: AsyncBufRead + Unpin,
    F: FnMut(RawFix) -> bool,
{
    let mut builder = NmeaFixBuilder::new();
    let mut buf = Vec::new();

    while running.load(Ordering::Relaxed) {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Some(fix) = builder.feed(&line) {
                    if !on_fix(fix) {
                        break;
                    }
                }
            }
            Err(e) => {
                log::warn!("Error reading from serial port: {}", e);
                break;
            }
        }
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| RecorderError::Other(format!("Failed to list serial ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|port| format!("{} - {:?}", port.port_name, port.port_type))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::sampler::fix_channel;

    #[test]
    fn test_missing_device_is_not_a_permission_problem() {
        let sampler = SerialSampler::new("/dev/does-not-exist-gps0", 9600, SamplingPolicy::default());
        assert_eq!(sampler.permission(), PermissionStatus::Granted);
    }

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_reading() {
        let mut input = b"\xff\xfe\x81 line noise\r\n".to_vec();
        input.extend_from_slice(RMC.as_bytes());
        input.extend_from_slice(b"\r\n");

        let running = AtomicBool::new(true);
        let mut fixes = Vec::new();
        read_sentences(&input[..], &running, |fix| {
            fixes.push(fix);
            true
        })
        .await;

        assert_eq!(fixes.len(), 1);
        assert!((fixes[0].latitude - 48.1173).abs() < 1e-4);
    }

    #[test]
    fn test_only_access_errors_mean_permission_denied() {
        let denied = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "EACCES",
        );
        assert!(matches!(open_error(denied), RecorderError::PermissionDenied));

        let missing = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "no device");
        assert!(matches!(open_error(missing), RecorderError::Serial(_)));
    }

    #[tokio::test]
    async fn test_missing_device_fails_to_start() {
        let (mut channel, _rx) = fix_channel();
        let mut sampler = SerialSampler::new("/dev/does-not-exist-gps0", 9600, SamplingPolicy::default());
        assert!(sampler.start(channel.subscribe()).is_err());
        assert!(!sampler.is_active());
    }
}
