use crate::error::ScanError;
use crate::models::ScoreRecord;
use crate::ranking::{AllocationDecision, RankedScan};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

const FILE_PREFIX: &str = "stock_scan_";
const CSV_HEADER: [&str; 6] = ["Rank", "Symbol", "Momentum", "Volatility", "FITP", "Score"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFile {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
struct ScanReport<'a> {
    generated_at: String,
    scan: &'a RankedScan,
    #[serde(skip_serializing_if = "Option::is_none")]
    allocation: Option<&'a AllocationDecision>,
}

pub fn scan_file_name(generated_at: NaiveDateTime, strategy: &str) -> String {
    format!("{}{}_{}.csv", FILE_PREFIX, generated_at.format("%Y%m%d_%H%M%S"), strategy)
}

/// One ranking row. Numbers are written with six decimals, missing ones blank.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    rank: usize,
    symbol: &'a str,
    momentum: String,
    volatility: Option<String>,
    fitp: Option<String>,
    score: String,
}

impl<'a> CsvRow<'a> {
    fn new(rank: usize, record: &'a ScoreRecord) -> Self {
        let fixed = |v: f64| format!("{:.6}", v);
        Self {
            rank,
            symbol: &record.symbol,
            momentum: fixed(record.momentum),
            volatility: record.volatility.map(fixed),
            fitp: record.fitp.map(fixed),
            score: fixed(record.score),
        }
    }
}

/// Header plus one row per record, rank starting at 1.
pub fn write_records<W: Write>(writer: W, records: &[ScoreRecord]) -> Result<(), ScanError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for (i, record) in records.iter().enumerate() {
        wtr.serialize(CsvRow::new(i + 1, record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the ranking as CSV plus a JSON report with the same stem. Returns
/// the CSV file name.
pub fn write_scan(
    output_dir: impl AsRef<Path>,
    scan: &RankedScan,
    allocation: Option<&AllocationDecision>,
    generated_at: NaiveDateTime,
) -> Result<String, ScanError> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let name = scan_file_name(generated_at, scan.params.strategy.as_str());
    let file = std::fs::File::create(output_dir.join(&name))?;
    write_records(std::io::BufWriter::new(file), &scan.records)?;

    let report = ScanReport {
        generated_at: generated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        scan,
        allocation,
    };
    let json_name = name.replace(".csv", ".json");
    std::fs::write(output_dir.join(&json_name), serde_json::to_string_pretty(&report)?)?;

    info!(file = %name, records = scan.records.len(), "scan exported");
    Ok(name)
}

/// Saved scan CSVs, newest first.
pub fn list_scan_files(output_dir: impl AsRef<Path>) -> Result<Vec<ScanFile>, ScanError> {
    let output_dir = output_dir.as_ref();
    if !output_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !name.starts_with(FILE_PREFIX) || !name.ends_with(".csv") {
            continue;
        }
        let display_name = display_name(&name).unwrap_or_else(|| name.clone());
        files.push(ScanFile { name, display_name });
    }

    files.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(files)
}

fn display_name(name: &str) -> Option<String> {
    let stamp = name.strip_prefix(FILE_PREFIX)?.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
        .ok()
        .map(|dt| dt.format("%m/%d %H:%M").to_string())
}

/// Contents of a saved scan. `None` for unknown files or names that are
/// not a bare file name.
pub fn read_scan_file(output_dir: impl AsRef<Path>, name: &str) -> Result<Option<String>, ScanError> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && (name.ends_with(".csv") || name.ends_with(".json"));
    if !plain {
        return Ok(None);
    }

    let path = output_dir.as_ref().join(name);
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}
