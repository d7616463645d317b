// Table Exporter - FIX client table spreadsheet
//
// Layout (1-based rows and columns, as in the template):
// - data rows start at row 3
// - FIX block: columns 1..=9, one value per FixColumn
// - column 10 is a spacer
// - cost blocks from column 11, five columns each:
//   6 × "FIX and Line", then one block each for Line, OMS, EMS, IOI

use std::io::Cursor;
use std::path::Path;

use tracing::{debug, info};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::entities::{CostCategory, CostLine};
use crate::error::ExportError;
use crate::rows::ClientRow;

pub const CLIENT_TABLE_FILE_NAME: &str = "FIXClientTable.xlsx";
pub const FIRST_DATA_ROW: u32 = 3;
pub const FIRST_COST_COLUMN: u32 = 11;

/// Columns of the FIX block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixColumn {
    No = 1,
    ConnectionStart = 2,
    Oms = 3,
    ClientName = 4,
    View = 5,
    Session = 6,
    FixCode = 7,
    TradeTypes = 8,
    LimitTradeTypes = 9,
}

/// Offsets inside one cost block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostColumn {
    Vendor = 0,
    ProductHandlInst = 1,
    ChangeType = 2,
    Change = 3,
    Currency = 4,
}

impl CostColumn {
    pub const WIDTH: u32 = 5;
}

/// Anything cells can be written to.
pub trait CellSink {
    fn write_text(&mut self, column: u32, row: u32, value: &str);
    fn write_number(&mut self, column: u32, row: u32, value: f64);
}

impl CellSink for Worksheet {
    fn write_text(&mut self, column: u32, row: u32, value: &str) {
        self.get_cell_mut((column, row)).set_value(value);
    }

    fn write_number(&mut self, column: u32, row: u32, value: f64) {
        self.get_cell_mut((column, row)).set_value_number(value);
    }
}

/// First column of the `slot`-th block of a category.
fn block_column(category: CostCategory, slot: usize) -> u32 {
    let preceding: usize = CostCategory::ALL
        .iter()
        .take_while(|c| **c != category)
        .map(CostCategory::slots)
        .sum();
    FIRST_COST_COLUMN + ((preceding + slot) as u32) * CostColumn::WIDTH
}

fn write_optional_text(sink: &mut dyn CellSink, column: u32, row: u32, value: Option<&str>) {
    sink.write_text(column, row, value.unwrap_or(""));
}

fn write_cost_block(sink: &mut dyn CellSink, column: u32, row: u32, cost: &CostLine) {
    write_optional_text(sink, column + CostColumn::Vendor as u32, row, cost.vendor.as_deref());
    sink.write_text(column + CostColumn::ProductHandlInst as u32, row, &cost.product_handlinst());
    write_optional_text(sink, column + CostColumn::ChangeType as u32, row, cost.change_type.as_deref());
    if let Some(change) = cost.change {
        sink.write_number(column + CostColumn::Change as u32, row, change);
    }
    write_optional_text(sink, column + CostColumn::Currency as u32, row, cost.currency.as_deref());
}

/// Write one client row at spreadsheet row `row`. `number` is the 1-based row number.
pub fn write_client_row(sink: &mut dyn CellSink, row: u32, number: usize, client_row: &ClientRow) {
    sink.write_number(FixColumn::No as u32, row, number as f64);
    let start = client_row
        .connection_start_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    sink.write_text(FixColumn::ConnectionStart as u32, row, &start);
    sink.write_text(FixColumn::Oms as u32, row, "");
    sink.write_text(FixColumn::ClientName as u32, row, &client_row.client_name);
    sink.write_text(FixColumn::View as u32, row, &client_row.view);
    sink.write_text(FixColumn::Session as u32, row, &client_row.session);
    sink.write_text(FixColumn::FixCode as u32, row, &client_row.code);
    sink.write_text(FixColumn::TradeTypes as u32, row, &client_row.trade_types);
    sink.write_text(FixColumn::LimitTradeTypes as u32, row, &client_row.limit_trade_types);

    for category in CostCategory::ALL {
        let costs = client_row
            .costs
            .iter()
            .filter(|cost| cost.category() == Some(category));

        // Extra costs beyond the category's slots are dropped
        for (slot, cost) in costs.take(category.slots()).enumerate() {
            write_cost_block(sink, block_column(category, slot), row, cost);
        }
    }
}

/// Write every row starting at `FIRST_DATA_ROW`.
pub fn populate_client_table(sink: &mut dyn CellSink, rows: &[ClientRow]) {
    for (index, client_row) in rows.iter().enumerate() {
        write_client_row(sink, FIRST_DATA_ROW + index as u32, index + 1, client_row);
    }
    debug!(rows = rows.len(), "Populated client table");
}

/// Load the template and fill it. The workbook is returned unsaved
/// together with the download file name.
pub fn create_client_table(
    template_path: &Path,
    rows: &[ClientRow],
) -> Result<(Spreadsheet, &'static str), ExportError> {
    let mut book = umya_spreadsheet::reader::xlsx::read(template_path).map_err(|e| ExportError::Template {
        path: template_path.display().to_string(),
        message: e.to_string(),
    })?;

    populate_client_table(book.get_active_sheet_mut(), rows);
    info!(rows = rows.len(), template = %template_path.display(), "Created client table workbook");

    Ok((book, CLIENT_TABLE_FILE_NAME))
}

/// Serialize a workbook to xlsx bytes.
pub fn workbook_bytes(book: &Spreadsheet) -> Result<Vec<u8>, ExportError> {
    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(book, &mut cursor)
        .map_err(|e| ExportError::Write(e.to_string()))?;
    Ok(cursor.into_inner())
}
