use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;

use chrono::Utc;

use super::error::{Result, ScrapeError};
use super::types::{CatalogRecord, DataFormat, Support};

pub const CSV_HEADERS: [&str; 7] = [
    "name",
    "url",
    "description",
    "duration",
    "test_type",
    "remote_support",
    "adaptive_support",
];

const REQUIRED_CSV_HEADERS: [&str; 2] = ["name", "url"];

fn record_to_row(rec: &CatalogRecord) -> [&str; 7] {
    [
        rec.name.as_str(),
        rec.url.as_str(),
        rec.description.as_str(),
        rec.duration.as_str(),
        rec.test_type.as_str(),
        rec.remote_support.as_str(),
        rec.adaptive_support.as_str(),
    ]
}

pub fn write_catalog(path: &str, format: DataFormat, records: &[CatalogRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(ScrapeError::EmptyCatalog);
    }

    match format {
        DataFormat::Csv => {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(CSV_HEADERS)?;
            for rec in records {
                writer.write_record(record_to_row(rec))?;
            }
            writer.flush()?;
        }
        DataFormat::Json => {
            let mut file = File::create(path)?;
            serde_json::to_writer_pretty(&mut file, records)?;
            file.write_all(b"\n")?;
            file.flush()?;
        }
    }
    Ok(())
}

fn load_catalog_from_csv(path: &str) -> Result<Vec<CatalogRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut index = HashMap::<String, usize>::new();
    for (idx, header) in headers.iter().enumerate() {
        index.insert(header.trim().to_ascii_lowercase(), idx);
    }
    let missing = REQUIRED_CSV_HEADERS
        .iter()
        .filter(|name| !index.contains_key(**name))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ScrapeError::InvalidInput(format!(
            "{path} is missing catalog column(s): {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |name: &str| -> String {
            index
                .get(name)
                .and_then(|idx| record.get(*idx))
                .map(ToString::to_string)
                .unwrap_or_default()
        };

        let name = get("name");
        if name.trim().is_empty() {
            continue;
        }
        rows.push(CatalogRecord {
            name,
            url: get("url"),
            description: get("description"),
            duration: get("duration"),
            test_type: get("test_type"),
            remote_support: Support::from_label(&get("remote_support")),
            adaptive_support: Support::from_label(&get("adaptive_support")),
        });
    }
    Ok(rows)
}

fn load_catalog_from_json(path: &str) -> Result<Vec<CatalogRecord>> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

pub fn load_catalog(path: &str) -> Result<Vec<CatalogRecord>> {
    match detect_data_format(path, DataFormat::Csv) {
        DataFormat::Csv => load_catalog_from_csv(path),
        DataFormat::Json => load_catalog_from_json(path),
    }
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

pub fn default_output_path(format: DataFormat) -> String {
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    match format {
        DataFormat::Csv => format!("assessments_{ts}.csv"),
        DataFormat::Json => format!("assessments_{ts}.json"),
    }
}
