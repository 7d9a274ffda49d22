//! Append-only results log.
//!
//! The store is an xlsx workbook with one worksheet per category. Every
//! append loads the whole workbook, reconciles each sheet to the fixed
//! schema, appends one row and rewrites the file atomically (temp file in the
//! same directory, then rename). The rewritten file keeps the permissions of
//! the one it replaces.
//!
//! History that cannot be read is never silently dropped: before the rewrite
//! the unreadable original is copied next to it as
//! `<name>.unreadable-<YYYYMMDD-HHMMSS>` and the warning names that copy.
//!
//! There is no locking. Two processes appending at once can interleave their
//! read-modify-write cycles and lose one update; callers that need several
//! writers must serialize them (single writer process or an advisory lock).

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, Xlsx, open_workbook};
use tempfile::NamedTempFile;
use time::PrimitiveDateTime;
use time::macros::{datetime, format_description};
use tracing::{info, warn};

use crate::domain::{ResultRecord, format_timestamp, now_timestamp};
use crate::error::StoreError;
use crate::store::schema::{
    COLUMN_COUNT, Cell, Column, ColumnWidths, Row, reconcile_rows, resolve_widths,
};

/// One category of records, already reconciled to the fixed schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub widths: [u16; COLUMN_COUNT],
    pub rows: Vec<Row>,
}

impl Sheet {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            widths: resolve_widths(None, &[]),
            rows: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    fn sheet_mut(&mut self, name: &str) -> &mut Sheet {
        let idx = match self.sheets.iter().position(|s| s.name == name) {
            Some(i) => i,
            None => {
                self.sheets.push(Sheet::empty(name));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx]
    }
}

/// Existing history could not be read; the append proceeds without it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreReadWarning {
    pub path: PathBuf,
    /// `None` when the workbook itself could not be opened.
    pub sheet: Option<String>,
    pub reason: String,
    /// Where the unreadable original was copied before the rewrite.
    pub backup: Option<PathBuf>,
}

impl fmt::Display for StoreReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(s) => write!(
                f,
                "could not read sheet {s:?} of {} (other sheets are kept), continuing with empty history for it: {}",
                self.path.display(),
                self.reason
            )?,
            None => write!(
                f,
                "could not open {}, continuing with empty history: {}",
                self.path.display(),
                self.reason
            )?,
        }
        if let Some(b) = &self.backup {
            write!(f, "; original kept at {}", b.display())?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub workbook: Workbook,
    pub warnings: Vec<StoreReadWarning>,
}

#[derive(Clone, Debug)]
pub struct AppendReport {
    pub sheet: String,
    pub rows_in_sheet: usize,
    pub warnings: Vec<StoreReadWarning>,
}

/// A worksheet as read from disk: its name and raw grid, or why it failed.
type RawSheet = (String, std::result::Result<Vec<Vec<Cell>>, String>);

pub struct ResultStore {
    path: PathBuf,
    widths: Option<ColumnWidths>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            widths: None,
        }
    }

    /// Use fixed widths instead of auto-sizing for the configured columns.
    pub fn with_column_widths(mut self, widths: Option<ColumnWidths>) -> Self {
        self.widths = widths;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and reconcile the current state. Never fails: unreadable parts
    /// come back empty with a warning.
    pub fn load(&self) -> Snapshot {
        if !self.path.exists() {
            return Snapshot::default();
        }
        match read_raw(&self.path) {
            Ok(raw) => self.assemble(raw),
            Err(reason) => Snapshot {
                workbook: Workbook::default(),
                warnings: vec![self.warning(None, reason)],
            },
        }
    }

    /// Append `record` as the last row of `sheet` and rewrite the store.
    pub fn append(
        &self,
        sheet: &str,
        record: &ResultRecord,
    ) -> std::result::Result<AppendReport, StoreError> {
        if std::fs::metadata(&self.path).is_ok_and(|md| md.permissions().readonly()) {
            return Err(StoreError::PermissionDenied {
                path: self.path.clone(),
            });
        }
        let Snapshot {
            mut workbook,
            mut warnings,
        } = self.load();

        if !warnings.is_empty() {
            let backup = self.set_aside()?;
            for w in &mut warnings {
                w.backup = Some(backup.clone());
            }
        }
        for w in &warnings {
            warn!("{w}");
        }

        let rows_in_sheet = self.push_record(&mut workbook, sheet, record);
        self.persist(&workbook)?;
        info!(
            path = %self.path.display(),
            sheet,
            rows = rows_in_sheet,
            "result appended"
        );
        Ok(AppendReport {
            sheet: sheet.to_string(),
            rows_in_sheet,
            warnings,
        })
    }

    fn assemble(&self, raw: Vec<RawSheet>) -> Snapshot {
        let mut snap = Snapshot::default();
        for (name, grid) in raw {
            match grid {
                Ok(mut grid) => {
                    grid.retain(|r| r.iter().any(|c| *c != Cell::Empty));
                    let headers: Vec<String> = if grid.is_empty() {
                        Vec::new()
                    } else {
                        grid.remove(0).iter().map(Cell::to_string).collect()
                    };
                    let rows = reconcile_rows(&headers, grid);
                    snap.workbook.sheet_mut(&name).rows.extend(rows);
                }
                Err(reason) => {
                    snap.workbook.sheet_mut(&name);
                    snap.warnings.push(self.warning(Some(name), reason));
                }
            }
        }
        for s in &mut snap.workbook.sheets {
            s.widths = resolve_widths(self.widths.as_ref(), &s.rows);
        }
        snap
    }

    fn push_record(&self, workbook: &mut Workbook, sheet: &str, record: &ResultRecord) -> usize {
        let target = workbook.sheet_mut(sheet);
        target.rows.push(record.to_row());
        let rows_in_sheet = target.rows.len();
        for s in &mut workbook.sheets {
            s.widths = resolve_widths(self.widths.as_ref(), &s.rows);
        }
        rows_in_sheet
    }

    /// Copy the current file aside so unreadable history survives the rewrite.
    fn set_aside(&self) -> std::result::Result<PathBuf, StoreError> {
        let fmt = format_description!("[year][month][day]-[hour][minute][second]");
        let stamp = now_timestamp()
            .format(&fmt)
            .map_err(|e| StoreError::from_io(&self.path, std::io::Error::other(e.to_string())))?;
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());

        let mut backup = self.path.with_file_name(format!("{name}.unreadable-{stamp}"));
        let mut n = 1;
        while backup.exists() {
            backup = self
                .path
                .with_file_name(format!("{name}.unreadable-{stamp}-{n}"));
            n += 1;
        }
        std::fs::copy(&self.path, &backup).map_err(|e| StoreError::from_io(&backup, e))?;
        warn!(backup = %backup.display(), "unreadable results history copied aside");
        Ok(backup)
    }

    fn persist(&self, workbook: &Workbook) -> std::result::Result<(), StoreError> {
        let err = |e: std::io::Error| StoreError::from_io(&self.path, e);

        let existing = std::fs::metadata(&self.path).ok().map(|md| md.permissions());
        let bytes =
            write_xlsx(workbook).map_err(|e| err(std::io::Error::other(e.to_string())))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(err)?;
        tmp.write_all(&bytes).map_err(err)?;
        if let Some(perms) = existing {
            tmp.as_file().set_permissions(perms).map_err(err)?;
        }
        tmp.as_file().sync_all().map_err(err)?;
        tmp.persist(&self.path).map_err(|e| err(e.error))?;
        Ok(())
    }

    fn warning(&self, sheet: Option<String>, reason: String) -> StoreReadWarning {
        StoreReadWarning {
            path: self.path.clone(),
            sheet,
            reason,
            backup: None,
        }
    }
}

fn read_raw(path: &Path) -> std::result::Result<Vec<RawSheet>, String> {
    let mut book: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| e.to_string())?;
    let names = book.sheet_names();
    Ok(names
        .into_iter()
        .map(|name| {
            let grid = book
                .worksheet_range(&name)
                .map(|range| {
                    range
                        .rows()
                        .map(|r| r.iter().map(cell_from_data).collect())
                        .collect()
                })
                .map_err(|e| e.to_string());
            (name, grid)
        })
        .collect())
}

fn cell_from_data(d: &Data) -> Cell {
    match d {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::DateTime(dt) => match from_excel_serial(dt.as_f64()) {
            Some(ts) => Cell::Text(format_timestamp(ts)),
            None => Cell::Number(dt.as_f64()),
        },
        other => Cell::Text(other.to_string()),
    }
}

/// Excel serial day number (1900 system) to a wall-clock timestamp.
fn from_excel_serial(serial: f64) -> Option<PrimitiveDateTime> {
    let secs = (serial * 86_400.0).round();
    if !secs.is_finite() || secs.abs() > i64::MAX as f64 {
        return None;
    }
    datetime!(1899-12-30 0:00).checked_add(time::Duration::seconds(secs as i64))
}

fn write_xlsx(workbook: &Workbook) -> std::result::Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    let mut book = rust_xlsxwriter::Workbook::new();
    for sheet in &workbook.sheets {
        let ws = book.add_worksheet();
        ws.set_name(&sheet.name)?;
        for col in Column::ALL {
            let c = col.index() as u16;
            ws.write_string(0, c, col.header())?;
            ws.set_column_width(c, sheet.widths[col.index()])?;
        }
        for (i, row) in sheet.rows.iter().enumerate() {
            let r = u32::try_from(i + 1)
                .map_err(|_| rust_xlsxwriter::XlsxError::RowColumnLimitError)?;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    Cell::Empty => {}
                    Cell::Number(v) => {
                        ws.write_number(r, c, *v)?;
                    }
                    Cell::Text(s) => {
                        ws.write_string(r, c, s)?;
                    }
                }
            }
        }
    }
    book.save_to_buffer()
}
