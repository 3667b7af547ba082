//! Price history and ground-truth loading.
//!
//! A dataset directory holds a `positions.toml` manifest plus one CSV price
//! history per position:
//!
//! ```text
//! dataset/
//!   positions.toml      [[positions]] id, entry_price, entry_time, exit_price?, exit_time?, history?
//!   <id>.csv            timestamp,price   (RFC 3339, chronological)
//! ```
//!
//! Histories are supplied to the engine already loaded; nothing here touches
//! the network. Out-of-order histories are rejected rather than sorted.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use exitlab_core::domain::{first_out_of_order, PositionId, PricePoint};

pub const MANIFEST_FILE: &str = "positions.toml";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: invalid timestamp '{value}'")]
    Timestamp { line: usize, value: String },
    #[error("line {line}: invalid price '{value}'")]
    Price { line: usize, value: String },
    #[error("price history is not chronological at point {index}")]
    OutOfOrder { index: usize },
    #[error("manifest parse error: {0}")]
    Manifest(#[from] toml::de::Error),
    #[error("duplicate position id '{0}' in manifest")]
    DuplicatePosition(PositionId),
    #[error("position '{id}': {source}")]
    Position {
        id: PositionId,
        #[source]
        source: Box<LoadError>,
    },
}

// ─── Price history CSV ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PriceRow {
    timestamp: String,
    price: String,
}

/// Parse a `timestamp,price` CSV with a header row.
pub fn parse_price_history<R: Read>(reader: R) -> Result<Vec<PricePoint>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut points = Vec::new();

    for (i, row) in rdr.deserialize::<PriceRow>().enumerate() {
        let row = row?;
        // Header is line 1
        let line = i + 2;
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|_| LoadError::Timestamp {
                line,
                value: row.timestamp.clone(),
            })?
            .with_timezone(&Utc);
        let price = row
            .price
            .parse::<Decimal>()
            .ok()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| LoadError::Price {
                line,
                value: row.price.clone(),
            })?;
        points.push(PricePoint::new(timestamp, price));
    }

    if let Some(index) = first_out_of_order(&points) {
        return Err(LoadError::OutOfOrder { index });
    }
    Ok(points)
}

pub fn load_price_history(path: &Path) -> Result<Vec<PricePoint>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_price_history(file)
}

// ─── Ground truth ───────────────────────────────────────────────────

/// What actually happened to a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: PositionId,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    /// When the tracked source wallet exited, if it did.
    #[serde(default)]
    pub mirror_exit_at: Option<DateTime<Utc>>,
    /// History CSV relative to the dataset directory; defaults to `<id>.csv`.
    #[serde(default)]
    pub history: Option<String>,
}

impl PositionRecord {
    pub fn new(id: impl Into<String>, entry_price: Decimal, entry_time: DateTime<Utc>) -> Self {
        Self {
            id: PositionId::new(id),
            entry_price,
            entry_time,
            exit_price: None,
            exit_time: None,
            mirror_exit_at: None,
            history: None,
        }
    }

    pub fn with_exit(mut self, price: Decimal, at: DateTime<Utc>) -> Self {
        self.exit_price = Some(price);
        self.exit_time = Some(at);
        self
    }

    /// Realized P&L in percent, if the position was actually exited.
    pub fn actual_pnl_pct(&self) -> Option<Decimal> {
        if self.entry_price <= Decimal::ZERO {
            return None;
        }
        self.exit_price
            .map(|exit| (exit / self.entry_price - Decimal::ONE) * Decimal::ONE_HUNDRED)
    }

    fn history_file(&self) -> String {
        self.history
            .clone()
            .unwrap_or_else(|| format!("{}.csv", self.id))
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Manifest {
    #[serde(default)]
    positions: Vec<PositionRecord>,
}

/// Parse a ground-truth file (`[[positions]]` array).
pub fn parse_ground_truth(input: &str) -> Result<Vec<PositionRecord>, LoadError> {
    let manifest: Manifest = toml::from_str(input)?;
    let mut seen = std::collections::HashSet::new();
    for record in &manifest.positions {
        if !seen.insert(record.id.clone()) {
            return Err(LoadError::DuplicatePosition(record.id.clone()));
        }
    }
    Ok(manifest.positions)
}

pub fn load_ground_truth(path: &Path) -> Result<Vec<PositionRecord>, LoadError> {
    let input = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_ground_truth(&input)
}

// ─── Dataset ────────────────────────────────────────────────────────

/// Positions with their price histories, ready for backtesting.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    positions: Vec<PositionRecord>,
    histories: HashMap<PositionId, Vec<PricePoint>>,
    /// BLAKE3 over ground truth and every history, in manifest order.
    pub dataset_hash: String,
}

impl Dataset {
    /// Build from already-loaded parts. Positions without a history are kept
    /// so lookups can report the gap.
    pub fn from_parts(
        positions: Vec<PositionRecord>,
        histories: HashMap<PositionId, Vec<PricePoint>>,
    ) -> Self {
        let dataset_hash = dataset_hash(&positions, &histories);
        Self {
            positions,
            histories,
            dataset_hash,
        }
    }

    /// Load `positions.toml` and each position's CSV from `dir`.
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        let positions = load_ground_truth(&dir.join(MANIFEST_FILE))?;
        let mut histories = HashMap::with_capacity(positions.len());
        for record in &positions {
            let history = load_price_history(&dir.join(record.history_file())).map_err(|e| {
                LoadError::Position {
                    id: record.id.clone(),
                    source: Box::new(e),
                }
            })?;
            histories.insert(record.id.clone(), history);
        }
        tracing::info!(
            dir = %dir.display(),
            positions = positions.len(),
            "dataset loaded"
        );
        Ok(Self::from_parts(positions, histories))
    }

    pub fn positions(&self) -> &[PositionRecord] {
        &self.positions
    }

    pub fn position(&self, id: &PositionId) -> Option<&PositionRecord> {
        self.positions.iter().find(|p| &p.id == id)
    }

    pub fn history(&self, id: &PositionId) -> Option<&[PricePoint]> {
        self.histories.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn dataset_hash(
    positions: &[PositionRecord],
    histories: &HashMap<PositionId, Vec<PricePoint>>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for record in positions {
        if let Ok(json) = serde_json::to_vec(record) {
            hasher.update(&json);
        }
        if let Some(history) = histories.get(&record.id) {
            for point in history {
                hasher.update(point.timestamp.to_rfc3339().as_bytes());
                hasher.update(point.price.to_string().as_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
