// src/gps/nmea.rs
//! NMEA sentence parsing

use super::data::RawFix;
use chrono::{NaiveDate, NaiveTime, Utc};

/// Rough user-equivalent range error used to turn HDOP into meters
pub const NMEA_UERE_M: f64 = 5.0;

const KNOTS_TO_MPS: f64 = 0.514_444;

/// Assembles fixes from a stream of NMEA sentences.
///
/// GGA sentences only update the dilution of precision; every valid RMC
/// sentence produces one fix.
#[derive(Debug, Default)]
pub struct NmeaFixBuilder {
    hdop: Option<f64>,
}

impl NmeaFixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single NMEA sentence, returning a fix when one is complete
    pub fn feed(&mut self, line: &str) -> Option<RawFix> {
        let line = line.trim();
        if !line.starts_with('$') || !verify_checksum(line) {
            return None;
        }

        let body = line.split('*').next().unwrap_or(line);
        let parts: Vec<&str> = body.split(',').collect();
        match parts[0].get(3..6) {
            Some("GGA") => {
                self.parse_gga(&parts);
                None
            }
            Some("RMC") => self.parse_rmc(&parts),
            _ => None,
        }
    }

    pub fn hdop(&self) -> Option<f64> {
        self.hdop
    }

    /// GGA (Global Positioning System Fix Data)
    fn parse_gga(&mut self, parts: &[&str]) {
        if parts.len() < 9 {
            return;
        }

        // Fix quality (field 6), 0 = invalid
        let quality = parts[6].parse::<u8>().unwrap_or(0);
        if quality == 0 {
            self.hdop = None;
            return;
        }

        // HDOP (field 8)
        if let Ok(hdop) = parts[8].parse::<f64>() {
            self.hdop = Some(hdop);
        }
    }

    /// RMC (Recommended Minimum Course)
    fn parse_rmc(&self, parts: &[&str]) -> Option<RawFix> {
        if parts.len() < 10 {
            return None;
        }

        // Status (field 2): A = valid, V = warning
        if parts[2] != "A" {
            return None;
        }

        let latitude = parse_coordinate(parts[3], parts[4])?;
        let longitude = parse_coordinate(parts[5], parts[6])?;

        let timestamp = parse_timestamp(parts[1], parts[9])
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        Some(RawFix {
            latitude,
            longitude,
            timestamp,
            accuracy: self.hdop.map(|hdop| hdop * NMEA_UERE_M),
            speed: parts[7].parse::<f64>().ok().map(|knots| knots * KNOTS_TO_MPS),
            heading: parts[8].parse::<f64>().ok(),
        })
    }
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed degrees
fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// `hhmmss(.ss)` + `ddmmyy` into milliseconds since epoch
fn parse_timestamp(time: &str, date: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date, "%d%m%y").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H%M%S"))
        .ok()?;
    Some(date.and_time(time).and_utc().timestamp_millis())
}

/// Sentences without a checksum are accepted as-is
fn verify_checksum(line: &str) -> bool {
    let Some((body, checksum)) = line[1..].split_once('*') else {
        return true;
    };
    let Ok(expected) = u8::from_str_radix(checksum.trim(), 16) else {
        return false;
    };
    body.bytes().fold(0u8, |acc, b| acc ^ b) == expected
}
