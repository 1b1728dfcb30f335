// src/services/core/infrastructure/analytics_module/exporter.rs

//! Exporter - renders a report payload as JSON, an xlsx workbook or a PDF table.

use crate::log_debug;
use crate::types::ExportFormat;
use crate::utils::{AnalyticsError, AnalyticsResult};
use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde_json::{json, Map, Number, Value};
use std::io::Cursor;
use std::str::FromStr;
use umya_spreadsheet::{Spreadsheet, Worksheet};

/// Rendered report, ready to hand to a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportArtifact {
    Json(Value),
    Excel(Vec<u8>),
    Pdf(Vec<u8>),
}

impl ExportArtifact {
    pub fn format(&self) -> ExportFormat {
        match self {
            ExportArtifact::Json(_) => ExportFormat::Json,
            ExportArtifact::Excel(_) => ExportFormat::Excel,
            ExportArtifact::Pdf(_) => ExportFormat::Pdf,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportArtifact::Json(_) => "application/json",
            ExportArtifact::Excel(_) => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportArtifact::Pdf(_) => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportArtifact::Json(_) => "json",
            ExportArtifact::Excel(_) => "xlsx",
            ExportArtifact::Pdf(_) => "pdf",
        }
    }

    /// `report_YYYYmmdd_HHMMSS.<ext>`
    pub fn filename(&self, at: DateTime<Utc>) -> String {
        format!("report_{}.{}", at.format("%Y%m%d_%H%M%S"), self.extension())
    }

    pub fn to_bytes(&self) -> AnalyticsResult<Vec<u8>> {
        match self {
            ExportArtifact::Json(value) => Ok(serde_json::to_vec(value)?),
            ExportArtifact::Excel(bytes) | ExportArtifact::Pdf(bytes) => Ok(bytes.clone()),
        }
    }
}

// Landscape letter, in points
const PAGE_WIDTH: i64 = 792;
const PAGE_HEIGHT: i64 = 612;
const MARGIN: i64 = 40;
const ROW_HEIGHT: i64 = 22;
const METRIC_COLUMN_WIDTH: i64 = 280;
const VALUE_COLUMN_WIDTH: i64 = 432;
const TITLE: &str = "Analytics Report";
const MAX_CELL_CHARS: usize = 70;

#[derive(Debug, Clone, Default)]
pub struct Exporter;

impl Exporter {
    pub fn new() -> Self {
        Exporter
    }

    pub fn export_report(&self, data: &Value, format: ExportFormat) -> AnalyticsResult<ExportArtifact> {
        log_debug!("Exporting report", json!({"format": format.as_str()}));
        match format {
            ExportFormat::Json => Ok(ExportArtifact::Json(data.clone())),
            ExportFormat::Excel => {
                let book = self.build_workbook(data)?;
                Ok(ExportArtifact::Excel(write_workbook(&book)?))
            }
            ExportFormat::Pdf => Ok(ExportArtifact::Pdf(self.render_pdf(data)?)),
        }
    }

    /// Export by format name; unknown names fail with a validation error naming them.
    pub fn export_report_as(&self, data: &Value, format: &str) -> AnalyticsResult<ExportArtifact> {
        let format = ExportFormat::from_str(format)?;
        self.export_report(data, format)
    }

    /// "Report" sheet of metric/value rows, plus a "Trends" sheet when the payload has
    /// a trends section.
    pub fn build_workbook(&self, data: &Value) -> AnalyticsResult<Spreadsheet> {
        let summary = summary_section(data)?;
        let mut book = umya_spreadsheet::new_file_empty_worksheet();

        let report = book
            .new_sheet("Report")
            .map_err(|e| AnalyticsError::export_error(format!("Failed to create sheet: {}", e)))?;
        report.get_cell_mut((1, 1)).set_value("Metric");
        report.get_cell_mut((2, 1)).set_value("Value");
        for (index, (metric, value)) in summary.iter().enumerate() {
            let row = index as u32 + 2;
            report.get_cell_mut((1, row)).set_value(metric.as_str());
            write_value(report, 2, row, value);
        }

        if let Some(trends) = data.get("trends").and_then(Value::as_object) {
            let table = TrendTable::from_section(trends);
            let sheet = book.new_sheet("Trends").map_err(|e| {
                AnalyticsError::export_error(format!("Failed to create sheet: {}", e))
            })?;
            sheet.get_cell_mut((1, 1)).set_value("Date");
            for (index, name) in table.series_names.iter().enumerate() {
                sheet
                    .get_cell_mut((index as u32 + 2, 1))
                    .set_value(name.as_str());
            }
            for (row_index, label) in table.labels.iter().enumerate() {
                let row = row_index as u32 + 2;
                sheet.get_cell_mut((1, row)).set_value(label.as_str());
                for (col_index, series) in table.series.iter().enumerate() {
                    if let Some(value) = series.get(row_index) {
                        write_value(sheet, col_index as u32 + 2, row, value);
                    }
                }
            }
        }

        Ok(book)
    }

    /// Title and a gridded metric/value table, paginated across landscape pages.
    pub fn render_pdf(&self, data: &Value) -> AnalyticsResult<Vec<u8>> {
        let summary = summary_section(data)?;
        let rows: Vec<(String, String)> = summary
            .iter()
            .map(|(metric, value)| (metric.clone(), display_value(value)))
            .collect();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        let mut page_ids: Vec<ObjectId> = Vec::new();
        for (page_index, chunk) in paginate(&rows).into_iter().enumerate() {
            let content = table_page(page_index == 0, chunk);
            let encoded = content
                .encode()
                .map_err(|e| AnalyticsError::export_error(format!("PDF encoding failed: {}", e)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| AnalyticsError::export_error(format!("PDF write failed: {}", e)))?;
        Ok(buffer)
    }
}

fn summary_section(data: &Value) -> AnalyticsResult<&Map<String, Value>> {
    data.get("summary")
        .and_then(Value::as_object)
        .ok_or_else(|| AnalyticsError::export_error("Report payload has no summary section"))
}

fn write_workbook(book: &Spreadsheet) -> AnalyticsResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(book, &mut out)
        .map_err(|e| AnalyticsError::export_error(format!("Failed to serialize workbook: {}", e)))?;
    Ok(out.into_inner())
}

fn write_value(sheet: &mut Worksheet, col: u32, row: u32, value: &Value) {
    let cell = sheet.get_cell_mut((col, row));
    match value {
        Value::Number(n) => match exact_f64(n) {
            Some(number) => {
                cell.set_value_number(number);
            }
            None => {
                cell.set_value_string(n.to_string());
            }
        },
        Value::String(s) => {
            cell.set_value(s.as_str());
        }
        Value::Null => {}
        other => {
            cell.set_value(other.to_string());
        }
    }
}

/// Integers beyond 2^53 have no exact f64 and are written as text.
fn exact_f64(n: &Number) -> Option<f64> {
    const MAX_EXACT: u64 = 1 << 53;
    if let Some(u) = n.as_u64() {
        (u <= MAX_EXACT).then_some(u as f64)
    } else if let Some(i) = n.as_i64() {
        (i.unsigned_abs() <= MAX_EXACT).then_some(i as f64)
    } else {
        n.as_f64()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Trends in either layout: `{labels, datasets: [{label, data}]}` or
/// `{labels, <series>: [...]}`.
struct TrendTable<'a> {
    labels: Vec<String>,
    series_names: Vec<String>,
    series: Vec<&'a Vec<Value>>,
}

impl<'a> TrendTable<'a> {
    fn from_section(trends: &'a Map<String, Value>) -> Self {
        let labels = trends
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| labels.iter().map(display_value).collect())
            .unwrap_or_default();

        let mut series_names = Vec::new();
        let mut series = Vec::new();
        match trends.get("datasets").and_then(Value::as_array) {
            Some(datasets) => {
                for dataset in datasets {
                    if let Some(data) = dataset.get("data").and_then(Value::as_array) {
                        let name = dataset
                            .get("label")
                            .map(display_value)
                            .unwrap_or_default();
                        series_names.push(name);
                        series.push(data);
                    }
                }
            }
            None => {
                for (name, values) in trends {
                    if name == "labels" {
                        continue;
                    }
                    if let Some(values) = values.as_array() {
                        series_names.push(name.clone());
                        series.push(values);
                    }
                }
            }
        }

        Self {
            labels,
            series_names,
            series,
        }
    }
}

fn rows_per_page(first_page: bool) -> usize {
    let title_space = if first_page { 50 } else { 0 };
    let usable = PAGE_HEIGHT - 2 * MARGIN - title_space - ROW_HEIGHT;
    (usable / ROW_HEIGHT).max(1) as usize
}

fn paginate(rows: &[(String, String)]) -> Vec<&[(String, String)]> {
    let mut pages = Vec::new();
    let mut rest = rows;
    let mut first = true;
    loop {
        let take = rows_per_page(first).min(rest.len());
        let (page, tail) = rest.split_at(take);
        pages.push(page);
        rest = tail;
        first = false;
        if rest.is_empty() {
            break;
        }
    }
    pages
}

fn pdf_text(text: &str) -> Object {
    let mut clean: String = text
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    if clean.len() > MAX_CELL_CHARS {
        clean.truncate(MAX_CELL_CHARS - 3);
        clean.push_str("...");
    }
    Object::String(clean.into_bytes(), StringFormat::Literal)
}

fn text_ops(ops: &mut Vec<Operation>, font: &str, size: i64, x: i64, y: i64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![pdf_text(text)]));
    ops.push(Operation::new("ET", vec![]));
}

fn cell_border(ops: &mut Vec<Operation>, x: i64, y: i64, width: i64) {
    ops.push(Operation::new(
        "re",
        vec![x.into(), y.into(), width.into(), ROW_HEIGHT.into()],
    ));
    ops.push(Operation::new("S", vec![]));
}

fn table_page(with_title: bool, rows: &[(String, String)]) -> Content {
    let mut ops = Vec::new();
    let left = MARGIN;
    let value_left = left + METRIC_COLUMN_WIDTH;
    let table_width = METRIC_COLUMN_WIDTH + VALUE_COLUMN_WIDTH;
    let mut top = PAGE_HEIGHT - MARGIN;

    if with_title {
        text_ops(&mut ops, "F2", 20, left, top - 24, TITLE);
        top -= 50;
    }

    // Header row: grey fill, white bold text
    let header_y = top - ROW_HEIGHT;
    ops.push(Operation::new("g", vec![Object::Real(0.5)]));
    ops.push(Operation::new(
        "re",
        vec![left.into(), header_y.into(), table_width.into(), ROW_HEIGHT.into()],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("g", vec![Object::Real(1.0)]));
    text_ops(&mut ops, "F2", 14, left + 6, header_y + 6, "Metric");
    text_ops(&mut ops, "F2", 14, value_left + 6, header_y + 6, "Value");
    ops.push(Operation::new("g", vec![Object::Real(0.0)]));

    ops.push(Operation::new("w", vec![Object::Real(1.0)]));
    ops.push(Operation::new("G", vec![Object::Real(0.0)]));
    cell_border(&mut ops, left, header_y, METRIC_COLUMN_WIDTH);
    cell_border(&mut ops, value_left, header_y, VALUE_COLUMN_WIDTH);

    for (index, (metric, value)) in rows.iter().enumerate() {
        let y = header_y - (index as i64 + 1) * ROW_HEIGHT;
        text_ops(&mut ops, "F1", 12, left + 6, y + 6, metric);
        text_ops(&mut ops, "F1", 12, value_left + 6, y + 6, value);
        cell_border(&mut ops, left, y, METRIC_COLUMN_WIDTH);
        cell_border(&mut ops, value_left, y, VALUE_COLUMN_WIDTH);
    }

    Content { operations: ops }
}
