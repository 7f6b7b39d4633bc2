//! Export - write a query result to CSV or XLSX under the output directory
//!
//! CSV files start with a UTF-8 byte order mark so spreadsheet tools pick the
//! right encoding for accented names.

use crate::error::{AgentError, Result};
use crate::executor::{CellValue, QueryResult};
use crate::intent::ExportFormat;
use chrono::Local;
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Export in the requested format with a timestamped file name
    pub fn export(&self, result: &QueryResult, format: ExportFormat) -> Result<PathBuf> {
        match format {
            ExportFormat::Csv => self.export_csv(result, None),
            ExportFormat::Excel => self.export_xlsx(result, None),
        }
    }

    pub fn export_csv(&self, result: &QueryResult, name: Option<&str>) -> Result<PathBuf> {
        let path = self.target_path(name, "csv")?;
        write_csv(&path, result)
            .map_err(|e| AgentError::ArtifactWrite(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), rows = result.row_count, "Exported CSV");
        Ok(path)
    }

    pub fn export_xlsx(&self, result: &QueryResult, name: Option<&str>) -> Result<PathBuf> {
        let path = self.target_path(name, "xlsx")?;
        write_xlsx(&path, result)
            .map_err(|e| AgentError::ArtifactWrite(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), rows = result.row_count, "Exported spreadsheet");
        Ok(path)
    }

    fn target_path(&self, name: Option<&str>, extension: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            AgentError::ArtifactWrite(format!("cannot create {}: {}", self.output_dir.display(), e))
        })?;
        let file_name = artifact_name("export", name, extension);
        Ok(self.output_dir.join(file_name))
    }
}

/// `<prefix>_YYYYMMDD_HHMMSS.<ext>`, or `name` with the extension appended when missing
pub fn artifact_name(prefix: &str, name: Option<&str>, extension: &str) -> String {
    let suffix = format!(".{}", extension);
    match name {
        Some(n) if n.ends_with(&suffix) => n.to_string(),
        Some(n) => format!("{}{}", n, suffix),
        None => format!("{}_{}{}", prefix, Local::now().format("%Y%m%d_%H%M%S"), suffix),
    }
}

fn write_csv(path: &Path, result: &QueryResult) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(path: &Path, result: &QueryResult) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, name) in result.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name.as_str(), &header)?;
    }
    for (r, row) in result.rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let excel_col = c as u16;
            match cell {
                CellValue::Integer(i) => {
                    worksheet.write_number(excel_row, excel_col, *i as f64)?;
                }
                CellValue::Real(f) => {
                    worksheet.write_number(excel_row, excel_col, *f)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(excel_row, excel_col, s.as_str())?;
                }
                CellValue::Null => {}
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// Read back a CSV export: header and rows as text
pub fn read_csv_export(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;
    let body = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw);

    let mut reader = csv::Reader::from_reader(body);
    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(|v| v.to_string()).collect());
    }
    Ok((columns, rows))
}
