// Small reference tables: products, handling instructions, vendors,
// currencies, cost types and change types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
}

/// Order handling instruction. `value` is the FIX tag 21 value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlInst {
    pub id: i64,
    pub name: String,
    pub value: i64,
}

/// Row of any single-name reference table (vendor, currency, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

// ============================================================================
// PRODUCT KIND
// ============================================================================

/// The four products that make up the trade-type grid, in summary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductKind {
    Equity,
    Future,
    Option,
    Spread,
}

impl ProductKind {
    pub const ALL: [ProductKind; 4] = [
        ProductKind::Equity,
        ProductKind::Future,
        ProductKind::Option,
        ProductKind::Spread,
    ];

    /// Name of the product row in the reference table.
    pub fn name(&self) -> &'static str {
        match self {
            ProductKind::Equity => "Equity",
            ProductKind::Future => "Future",
            ProductKind::Option => "Option",
            ProductKind::Spread => "Spread",
        }
    }

    /// Two-letter key used in form fields (`eq_dma`) and summaries (`EQ(DMA)`).
    pub fn key(&self) -> &'static str {
        match self {
            ProductKind::Equity => "eq",
            ProductKind::Future => "fu",
            ProductKind::Option => "op",
            ProductKind::Spread => "sp",
        }
    }

    /// Matches either the full name or the two-letter key, ignoring case.
    pub fn from_name(name: &str) -> Option<ProductKind> {
        let name = name.trim();
        ProductKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name) || kind.key().eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// HANDLING KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandlingKind {
    Disc,
    Dma,
    Dsa,
}

impl HandlingKind {
    pub const ALL: [HandlingKind; 3] = [HandlingKind::Disc, HandlingKind::Dma, HandlingKind::Dsa];

    pub fn name(&self) -> &'static str {
        match self {
            HandlingKind::Disc => "DISC",
            HandlingKind::Dma => "DMA",
            HandlingKind::Dsa => "DSA",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            HandlingKind::Disc => "disc",
            HandlingKind::Dma => "dma",
            HandlingKind::Dsa => "dsa",
        }
    }

    /// FIX tag 21 (HandlInst) value.
    pub fn fix_value(&self) -> i64 {
        match self {
            HandlingKind::Dma => 1,
            HandlingKind::Dsa => 2,
            HandlingKind::Disc => 3,
        }
    }

    /// Label used in the `&`-joined trade-type summaries. Discretionary is "CD".
    pub fn summary_label(&self) -> &'static str {
        match self {
            HandlingKind::Disc => "CD",
            HandlingKind::Dma => "DMA",
            HandlingKind::Dsa => "DSA",
        }
    }

    pub fn from_name(name: &str) -> Option<HandlingKind> {
        let name = name.trim();
        HandlingKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// REFERENCE KIND
// ============================================================================

/// Tables whose rows can be deleted through the admin surface.
/// Deletion is blocked while any row references them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Session,
    Product,
    HandlInst,
    Vendor,
    Currency,
    CostType,
    ChangeType,
}

impl ReferenceKind {
    pub fn table(&self) -> &'static str {
        match self {
            ReferenceKind::Session => "session",
            ReferenceKind::Product => "product",
            ReferenceKind::HandlInst => "handlinst",
            ReferenceKind::Vendor => "vendor",
            ReferenceKind::Currency => "currency",
            ReferenceKind::CostType => "cost_type",
            ReferenceKind::ChangeType => "change_type",
        }
    }

    pub fn entity(&self) -> &'static str {
        match self {
            ReferenceKind::Session => "Session",
            ReferenceKind::Product => "Product",
            ReferenceKind::HandlInst => "HandlInst",
            ReferenceKind::Vendor => "Vendor",
            ReferenceKind::Currency => "Currency",
            ReferenceKind::CostType => "CostType",
            ReferenceKind::ChangeType => "ChangeType",
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(ReferenceKind::Session),
            "product" => Ok(ReferenceKind::Product),
            "handlinst" => Ok(ReferenceKind::HandlInst),
            "vendor" => Ok(ReferenceKind::Vendor),
            "currency" => Ok(ReferenceKind::Currency),
            "cost_type" => Ok(ReferenceKind::CostType),
            "change_type" => Ok(ReferenceKind::ChangeType),
            other => Err(format!("Unknown reference table: {}", other)),
        }
    }
}
