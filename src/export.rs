// src/export.rs
//! Completed session export to GPX, GeoJSON and CSV

use crate::error::{RecorderError, Result};
use crate::session::CompletedSession;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportFormat {
    GPX,
    GeoJSON,
    CSV,
}

impl ExportFormat {
    pub fn extension(&self) -> &str {
        match self {
            ExportFormat::GPX => "gpx",
            ExportFormat::GeoJSON => "geojson",
            ExportFormat::CSV => "csv",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            ExportFormat::GPX => "GPX (GPS Exchange)",
            ExportFormat::GeoJSON => "GeoJSON",
            ExportFormat::CSV => "CSV",
        }
    }

    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "gpx" => Some(ExportFormat::GPX),
            "geojson" | "json" => Some(ExportFormat::GeoJSON),
            "csv" => Some(ExportFormat::CSV),
            _ => None,
        }
    }
}

pub struct SessionExporter<'a> {
    session: &'a CompletedSession,
}

impl<'a> SessionExporter<'a> {
    pub fn new(session: &'a CompletedSession) -> Self {
        Self { session }
    }

    pub fn point_count(&self) -> usize {
        self.session.track.len()
    }

    pub fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<()> {
        if self.session.track.is_empty() {
            return Err(RecorderError::Other("No track points to export".to_string()));
        }

        let content = self.render(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;

        log::info!(
            "Exported {} points as {} to {}",
            self.point_count(),
            format.display_name(),
            path.display()
        );
        Ok(())
    }

    pub fn render(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::GPX => Ok(self.to_gpx()),
            ExportFormat::GeoJSON => self.to_geojson(),
            ExportFormat::CSV => Ok(self.to_csv()),
        }
    }

    fn to_gpx(&self) -> String {
        let mut gpx = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Activity Recorder" xmlns="http://www.topografix.com/GPX/1/1">
"#,
        );

        gpx.push_str("  <metadata>\n");
        gpx.push_str(&format!("    <time>{}</time>\n", self.session.started_at.to_rfc3339()));
        gpx.push_str("  </metadata>\n");
        gpx.push_str("  <trk>\n");
        gpx.push_str(&format!("    <name>{}</name>\n", Self::escape_xml(&self.session.id)));
        gpx.push_str("    <trkseg>\n");

        for point in &self.session.track {
            gpx.push_str(&format!(
                "      <trkpt lat=\"{}\" lon=\"{}\">\n",
                point.latitude, point.longitude
            ));
            if let Some(time) = point.time() {
                gpx.push_str(&format!("        <time>{}</time>\n", time.to_rfc3339()));
            }
            if let Some(accuracy) = point.accuracy {
                gpx.push_str(&format!("        <hdop>{:.1}</hdop>\n", accuracy));
            }
            gpx.push_str("      </trkpt>\n");
        }

        gpx.push_str("    </trkseg>\n");
        gpx.push_str("  </trk>\n");
        gpx.push_str("</gpx>\n");
        gpx
    }

    fn to_geojson(&self) -> Result<String> {
        let coordinates: Vec<serde_json::Value> = self
            .session
            .track
            .iter()
            .map(|p| serde_json::json!([p.longitude, p.latitude]))
            .collect();
        let timestamps: Vec<i64> = self.session.track.iter().map(|p| p.timestamp).collect();

        let feature_collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": coordinates
                },
                "properties": {
                    "id": self.session.id,
                    "startedAt": self.session.started_at.to_rfc3339(),
                    "stoppedAt": self.session.stopped_at.to_rfc3339(),
                    "distanceMeters": self.session.distance_meters,
                    "durationSeconds": self.session.duration_seconds,
                    "timestamps": timestamps
                }
            }]
        });

        Ok(serde_json::to_string_pretty(&feature_collection)?)
    }

    fn to_csv(&self) -> String {
        let mut csv = String::from("timestamp,latitude,longitude,accuracy,speed,heading\n");

        for point in &self.session.track {
            let time = point
                .time()
                .map_or_else(|| point.timestamp.to_string(), |t| t.to_rfc3339());
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                Self::escape_csv(&time),
                point.latitude,
                point.longitude,
                optional(point.accuracy),
                optional(point.speed),
                optional(point.heading),
            ));
        }

        csv
    }

    fn escape_xml(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }

    fn escape_csv(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or(String::new(), |v| v.to_string())
}
