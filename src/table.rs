// Client table columns
//
// A static, ordered list of (name, group, extractor). The web table and the
// TUI both render rows through it, so a column is added in one place.

use serde::Serialize;

use crate::entities::LimitSlot;
use crate::rows::ClientRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnGroup {
    Client,
    Fix,
    Limits,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCell {
    pub text: String,
    /// Relative URL the cell links to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TableCell {
    fn text(text: impl Into<String>) -> Self {
        TableCell {
            text: text.into(),
            link: None,
        }
    }
}

pub struct ClientTableColumn {
    pub name: &'static str,
    pub group: ColumnGroup,
    pub extract: fn(&ClientRow) -> TableCell,
}

fn limit_cell(row: &ClientRow, index: usize) -> TableCell {
    let value = LimitSlot::all()
        .nth(index)
        .and_then(|slot| row.limits.get(slot))
        .map(format_amount)
        .unwrap_or_default();
    TableCell::text(value)
}

/// Whole numbers print without a fraction.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        amount.to_string()
    }
}

pub const COLUMNS: &[ClientTableColumn] = &[
    ClientTableColumn {
        name: "Client Name",
        group: ColumnGroup::Client,
        extract: |row| TableCell {
            text: row.client_name.clone(),
            link: Some(format!("/clients/{}", row.client_id)),
        },
    },
    ClientTableColumn {
        name: "View",
        group: ColumnGroup::Client,
        extract: |row| TableCell::text(row.view.clone()),
    },
    ClientTableColumn {
        name: "Session",
        group: ColumnGroup::Fix,
        extract: |row| TableCell::text(row.session.clone()),
    },
    ClientTableColumn {
        name: "Session Start End",
        group: ColumnGroup::Fix,
        extract: |row| TableCell::text(row.session_start_end.clone()),
    },
    ClientTableColumn {
        name: "Code",
        group: ColumnGroup::Fix,
        extract: |row| TableCell::text(row.code.clone()),
    },
    ClientTableColumn {
        name: "Products",
        group: ColumnGroup::Fix,
        extract: |row| TableCell::text(row.products.clone()),
    },
    ClientTableColumn {
        name: "Trade Types",
        group: ColumnGroup::Fix,
        extract: |row| TableCell::text(row.trade_types.clone()),
    },
    ClientTableColumn {
        name: "Limit Trade Types",
        group: ColumnGroup::Limits,
        extract: |row| TableCell::text(row.limit_trade_types.clone()),
    },
    ClientTableColumn { name: "EQ Daily Disc", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 0) },
    ClientTableColumn { name: "EQ Daily DMA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 1) },
    ClientTableColumn { name: "EQ Daily DSA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 2) },
    ClientTableColumn { name: "EQ 1Shot Disc", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 3) },
    ClientTableColumn { name: "EQ 1Shot DMA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 4) },
    ClientTableColumn { name: "EQ 1Shot DSA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 5) },
    ClientTableColumn { name: "FU Daily Disc", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 6) },
    ClientTableColumn { name: "FU Daily DMA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 7) },
    ClientTableColumn { name: "FU Daily DSA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 8) },
    ClientTableColumn { name: "FU 1Shot Disc", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 9) },
    ClientTableColumn { name: "FU 1Shot DMA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 10) },
    ClientTableColumn { name: "FU 1Shot DSA", group: ColumnGroup::Limits, extract: |row| limit_cell(row, 11) },
];

#[derive(Debug, Clone, Serialize)]
pub struct ColumnHeader {
    pub name: &'static str,
    pub group: ColumnGroup,
}

/// Headers plus eagerly evaluated cells, as served to the web table.
#[derive(Debug, Clone, Serialize)]
pub struct ClientTable {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Vec<TableCell>>,
}

pub fn render_row(row: &ClientRow) -> Vec<TableCell> {
    COLUMNS.iter().map(|column| (column.extract)(row)).collect()
}

pub fn client_table(rows: &[ClientRow]) -> ClientTable {
    ClientTable {
        columns: COLUMNS
            .iter()
            .map(|column| ColumnHeader {
                name: column.name,
                group: column.group,
            })
            .collect(),
        rows: rows.iter().map(render_row).collect(),
    }
}
