// Per-session cost schedule

use serde::{Deserialize, Serialize};

/// Cost type categories, in spreadsheet block order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostCategory {
    FixAndLine,
    Line,
    Oms,
    Ems,
    Ioi,
}

impl CostCategory {
    pub const ALL: [CostCategory; 5] = [
        CostCategory::FixAndLine,
        CostCategory::Line,
        CostCategory::Oms,
        CostCategory::Ems,
        CostCategory::Ioi,
    ];

    /// Name of the cost_type row.
    pub fn name(&self) -> &'static str {
        match self {
            CostCategory::FixAndLine => "FIX and Line",
            CostCategory::Line => "Line",
            CostCategory::Oms => "OMS",
            CostCategory::Ems => "EMS",
            CostCategory::Ioi => "IOI",
        }
    }

    /// Number of 5-column blocks the category owns in the client table.
    pub fn slots(&self) -> usize {
        match self {
            CostCategory::FixAndLine => 6,
            _ => 1,
        }
    }

    pub fn from_name(name: &str) -> Option<CostCategory> {
        CostCategory::ALL
            .into_iter()
            .find(|category| category.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// A cost row with every reference resolved to its display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub id: i64,
    pub code_session_id: i64,
    pub cost_type: String,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub handlinst: Option<String>,
    pub change_type: Option<String>,
    pub change: Option<f64>,
    pub currency: Option<String>,
}

impl CostLine {
    pub fn category(&self) -> Option<CostCategory> {
        CostCategory::from_name(&self.cost_type)
    }

    /// `"P(H)"`, `"P"`, `"H"` or `""` depending on which references are set.
    pub fn product_handlinst(&self) -> String {
        match (self.product.as_deref(), self.handlinst.as_deref()) {
            (Some(product), Some(handlinst)) => format!("{}({})", product, handlinst),
            (Some(product), None) => product.to_string(),
            (None, Some(handlinst)) => handlinst.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCost {
    pub vendor_id: i64,
    pub cost_type_id: i64,
    pub change_type_id: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub handlinst_id: Option<i64>,
    #[serde(default)]
    pub currency_id: Option<i64>,
    #[serde(default)]
    pub change: Option<f64>,
}
