use std::collections::BTreeMap;
use std::fmt;

use crate::domain::ResultRecord;
use crate::error::{GammaError, Result};

pub const COLUMN_COUNT: usize = 7;

/// The fixed results schema, in persisted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Timestamp,
    PatientId,
    Location,
    Threshold,
    Gamma,
    Normalization,
    ExternalGamma,
}

impl Column {
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::Timestamp,
        Column::PatientId,
        Column::Location,
        Column::Threshold,
        Column::Gamma,
        Column::Normalization,
        Column::ExternalGamma,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Timestamp => "Timestamp",
            Column::PatientId => "Patient ID",
            Column::Location => "Location",
            Column::Threshold => "Threshold (%)",
            Column::Gamma => "Gamma (%)",
            Column::Normalization => "Normalization",
            Column::ExternalGamma => "Gamma Octavius 4D (%)",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Column::ALL.into_iter().find(|c| c.header() == header)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A stored value. `Empty` is the absent-value marker (a blank cell on disk).
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                write!(f, "{v:.1}")
            }
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl Cell {
    /// Display length in characters.
    pub fn display_len(&self) -> usize {
        self.to_string().chars().count()
    }
}

pub type Row = [Cell; COLUMN_COUNT];

impl ResultRecord {
    pub fn to_row(&self) -> Row {
        [
            Cell::Text(self.timestamp_text()),
            Cell::Text(self.patient_id.clone()),
            Cell::Text(self.location.clone()),
            Cell::Number(self.threshold_percent),
            Cell::Number(self.gamma_percent),
            Cell::Text(self.normalization.label().to_string()),
            Cell::Number(self.external_gamma_percent),
        ]
    }
}

/// Map rows stored under `headers` onto the fixed schema: columns are matched
/// by header, unknown ones dropped, missing ones left empty. Row order is
/// preserved.
pub fn reconcile_rows(headers: &[String], rows: Vec<Vec<Cell>>) -> Vec<Row> {
    let positions: [Option<usize>; COLUMN_COUNT] = std::array::from_fn(|i| {
        headers
            .iter()
            .position(|h| Column::from_header(h) == Some(Column::ALL[i]))
    });
    rows.into_iter()
        .map(|mut raw| {
            std::array::from_fn(|i| {
                positions[i]
                    .and_then(|p| raw.get_mut(p))
                    .map(std::mem::take)
                    .unwrap_or_default()
            })
        })
        .collect()
}

/// Configured width per column; unset columns are auto-sized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnWidths([Option<u16>; COLUMN_COUNT]);

impl ColumnWidths {
    pub fn from_headers(map: &BTreeMap<String, u16>) -> Result<Self> {
        let mut out = Self::default();
        for (header, width) in map {
            let col = Column::from_header(header).ok_or_else(|| {
                GammaError::Config(format!("column width for unknown column {header:?}"))
            })?;
            out.0[col.index()] = Some(*width);
        }
        Ok(out)
    }

    pub fn with(mut self, column: Column, width: u16) -> Self {
        self.0[column.index()] = Some(width);
        self
    }

    pub fn get(&self, column: Column) -> Option<u16> {
        self.0[column.index()]
    }
}

/// `max(header length, longest value) + 1`, in characters.
pub fn auto_width(column: Column, rows: &[Row]) -> u16 {
    let longest = rows
        .iter()
        .map(|r| r[column.index()].display_len())
        .max()
        .unwrap_or(0)
        .max(column.header().chars().count());
    u16::try_from(longest + 1).unwrap_or(u16::MAX)
}

pub fn resolve_widths(configured: Option<&ColumnWidths>, rows: &[Row]) -> [u16; COLUMN_COUNT] {
    std::array::from_fn(|i| {
        let col = Column::ALL[i];
        configured
            .and_then(|w| w.get(col))
            .unwrap_or_else(|| auto_width(col, rows))
    })
}
