use crate::types::{SampleRecord, SamplingError, SamplingResult};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const TABLE_HEADER: [&str; 8] = [
    "Longitude (WGS84)",
    "Latitude (WGS84)",
    "Filtered Value",
    "Correlation Value",
    "Solar Elevation",
    "REMA Elevation",
    "REMA Slope Magnitude",
    "REMA Slope Direction",
];

/// Writes one scene's records as CSV
#[derive(Debug, Clone)]
pub struct ResultTableWriter {
    coordinate_precision: usize,
}

impl ResultTableWriter {
    pub fn new(coordinate_precision: usize) -> Self {
        Self { coordinate_precision }
    }

    fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else {
            value.to_string()
        }
    }

    fn to_row(&self, record: &SampleRecord) -> [String; 8] {
        let p = self.coordinate_precision;
        [
            format!("{:.*}", p, record.longitude),
            format!("{:.*}", p, record.latitude),
            Self::format_value(record.filtered_value),
            Self::format_value(record.correlation_value),
            Self::format_value(record.solar_elevation),
            Self::format_value(record.elevation),
            Self::format_value(record.slope_magnitude),
            Self::format_value(record.slope_direction),
        ]
    }

    /// Serialize to any writer
    pub fn write_to<W: Write>(&self, writer: W, records: &[SampleRecord]) -> SamplingResult<()> {
        let persistence = |e: csv::Error| SamplingError::Persistence(e.to_string());

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(TABLE_HEADER).map_err(persistence)?;
        for record in records {
            csv_writer.write_record(self.to_row(record)).map_err(persistence)?;
        }
        csv_writer
            .flush()
            .map_err(|e| SamplingError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Write next to the destination, then rename into place so a failed
    /// write never leaves a partial table.
    pub fn write<P: AsRef<Path>>(&self, path: P, records: &[SampleRecord]) -> SamplingResult<()> {
        let path = path.as_ref();
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let describe = |e: std::io::Error| {
            SamplingError::Persistence(format!("Cannot write {}: {}", path.display(), e))
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(describe)?;
        self.write_to(temp.as_file_mut(), records)?;
        temp.as_file().sync_all().map_err(describe)?;
        temp.persist(path).map_err(|e| describe(e.error))?;

        log::info!("Data saved to {} ({} rows)", path.display(), records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MISSING_VALUE;
    use tempfile::TempDir;

    fn record(longitude: f64, latitude: f64, filtered: f64) -> SampleRecord {
        SampleRecord {
            longitude,
            latitude,
            filtered_value: filtered,
            correlation_value: 0.5,
            solar_elevation: 21.25,
            elevation: 1500.0,
            slope_magnitude: 2.0,
            slope_direction: 180.0,
        }
    }

    #[test]
    fn test_csv_layout() {
        let writer = ResultTableWriter::new(2);
        let mut out = Vec::new();
        writer
            .write_to(&mut out, &[record(-85.0, -74.5, 3.0), record(-85.5049, -74.999, MISSING_VALUE)])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TABLE_HEADER.join(","));
        assert_eq!(lines[1], "-85.00,-74.50,3,0.5,21.25,1500,2,180");
        assert_eq!(lines[2], "-85.50,-75.00,NaN,0.5,21.25,1500,2,180");
    }

    #[test]
    fn test_write_file_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("P001R113_2020045.csv");
        std::fs::write(&path, "stale").unwrap();

        ResultTableWriter::new(2).write(&path, &[record(-85.0, -74.5, 1.0)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Longitude (WGS84),"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing_dir").join("out.csv");
        let err = ResultTableWriter::new(2).write(&path, &[]).unwrap_err();
        assert!(matches!(err, SamplingError::Persistence(_)));
    }
}
