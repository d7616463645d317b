// Limit store entities
//
// These tables are populated by the risk system and keyed by the string
// client identifier. This crate only ever reads them.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::reference::HandlingKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub view: String,
    pub code: String,
}

/// Trading permissions as recorded by the risk system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTrade {
    pub client_id: String,
    pub is_disc: bool,
    pub is_dma: bool,
    pub is_dsa: bool,
    pub is_fu_disc: bool,
    pub is_fu_dma: bool,
    pub is_fu_dsa: bool,
}

impl ClientTrade {
    fn flags(&self) -> [(bool, &'static str, &'static str); 6] {
        [
            (self.is_disc, "DISC", "CD"),
            (self.is_dma, "DMA", "DMA"),
            (self.is_dsa, "DSA", "DSA"),
            (self.is_fu_disc, "FU DISC", "FUCD"),
            (self.is_fu_dma, "FU DMA", "FUDMA"),
            (self.is_fu_dsa, "FU DSA", "FUDSA"),
        ]
    }

    /// Labels shown by the admin lookup: `"DISC, DMA, FU DSA"`.
    pub fn lookup_labels(&self) -> String {
        self.flags()
            .iter()
            .filter(|(set, _, _)| *set)
            .map(|(_, label, _)| *label)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Compact summary used in the client table: `"CD&DMA&FUCD"`.
    pub fn summary(&self) -> String {
        self.flags()
            .iter()
            .filter(|(set, _, _)| *set)
            .map(|(_, _, short)| *short)
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientLimit {
    pub client_id: String,
    pub product: String,
    pub handlinst: String,
    pub limit_type: String,
    pub amount: f64,
}

/// Limit listing shown on the client detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientView {
    pub client_id: String,
    pub product: String,
    pub handlinst: String,
    pub limit_type: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub updated_at: Option<String>,
}

// ============================================================================
// ORDER LIMIT SLOTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LimitProduct {
    Equity,
    Future,
}

impl LimitProduct {
    pub fn key(&self) -> &'static str {
        match self {
            LimitProduct::Equity => "eq",
            LimitProduct::Future => "fu",
        }
    }

    pub fn parse(value: &str) -> Option<LimitProduct> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EQ" | "EQUITY" => Some(LimitProduct::Equity),
            "FU" | "FUTURE" => Some(LimitProduct::Future),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LimitPeriod {
    Daily,
    OneShot,
}

impl LimitPeriod {
    pub fn key(&self) -> &'static str {
        match self {
            LimitPeriod::Daily => "daily",
            LimitPeriod::OneShot => "1shot",
        }
    }

    pub fn parse(value: &str) -> Option<LimitPeriod> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Some(LimitPeriod::Daily),
            "1SHOT" | "ONESHOT" | "1 SHOT" => Some(LimitPeriod::OneShot),
            _ => None,
        }
    }
}

/// One of the 12 order-limit fields (EQ/FU × Daily/1Shot × Disc/DMA/DSA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LimitSlot {
    pub product: LimitProduct,
    pub period: LimitPeriod,
    pub handling: HandlingKind,
}

impl LimitSlot {
    pub const COUNT: usize = 12;

    /// All slots in display order.
    pub fn all() -> impl Iterator<Item = LimitSlot> {
        [LimitProduct::Equity, LimitProduct::Future]
            .into_iter()
            .flat_map(|product| {
                [LimitPeriod::Daily, LimitPeriod::OneShot]
                    .into_iter()
                    .flat_map(move |period| {
                        HandlingKind::ALL.into_iter().map(move |handling| LimitSlot {
                            product,
                            period,
                            handling,
                        })
                    })
            })
    }

    /// Slot a limit row belongs to, or None for rows outside the grid.
    pub fn for_limit(limit: &ClientLimit) -> Option<LimitSlot> {
        Some(LimitSlot {
            product: LimitProduct::parse(&limit.product)?,
            period: LimitPeriod::parse(&limit.limit_type)?,
            handling: HandlingKind::from_name(&limit.handlinst)?,
        })
    }

    /// `"eq_daily_disc"`
    pub fn field_name(&self) -> String {
        format!("{}_{}_{}", self.product.key(), self.period.key(), self.handling.key())
    }

    fn index(&self) -> usize {
        let product = match self.product {
            LimitProduct::Equity => 0,
            LimitProduct::Future => 1,
        };
        let period = match self.period {
            LimitPeriod::Daily => 0,
            LimitPeriod::OneShot => 1,
        };
        let handling = match self.handling {
            HandlingKind::Disc => 0,
            HandlingKind::Dma => 1,
            HandlingKind::Dsa => 2,
        };
        product * 6 + period * 3 + handling
    }
}

/// The 12 order-limit values of a client row; unmatched slots stay blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderLimits {
    values: [Option<f64>; LimitSlot::COUNT],
}

impl OrderLimits {
    /// Fill slots from limit rows. Rows that match no slot are ignored;
    /// a later row for the same slot overwrites an earlier one.
    pub fn from_limits(limits: &[ClientLimit]) -> Self {
        let mut order_limits = OrderLimits::default();
        for limit in limits {
            if let Some(slot) = LimitSlot::for_limit(limit) {
                order_limits.set(slot, limit.amount);
            }
        }
        order_limits
    }

    pub fn get(&self, slot: LimitSlot) -> Option<f64> {
        self.values[slot.index()]
    }

    pub fn set(&mut self, slot: LimitSlot, amount: f64) {
        self.values[slot.index()] = Some(amount);
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

impl Serialize for OrderLimits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LimitSlot::COUNT))?;
        for slot in LimitSlot::all() {
            map.serialize_entry(&slot.field_name(), &self.get(slot))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(product: &str, handlinst: &str, limit_type: &str, amount: f64) -> ClientLimit {
        ClientLimit {
            client_id: "AC1".to_string(),
            product: product.to_string(),
            handlinst: handlinst.to_string(),
            limit_type: limit_type.to_string(),
            amount,
        }
    }

    #[test]
    fn test_all_slots_are_distinct() {
        let slots: Vec<LimitSlot> = LimitSlot::all().collect();
        assert_eq!(slots.len(), LimitSlot::COUNT);

        let mut indexes: Vec<usize> = slots.iter().map(|s| s.index()).collect();
        indexes.sort();
        indexes.dedup();
        assert_eq!(indexes, (0..LimitSlot::COUNT).collect::<Vec<_>>());
        assert_eq!(slots[0].field_name(), "eq_daily_disc");
        assert_eq!(slots[11].field_name(), "fu_1shot_dsa");
    }

    #[test]
    fn test_order_limits_match_product_handlinst_type() {
        let limits = vec![
            limit("EQ", "DMA", "DAILY", 5_000_000.0),
            limit("Future", "DISC", "1SHOT", 200.0),
            limit("OP", "DMA", "DAILY", 1.0), // no option slots
            limit("EQ", "CARE", "DAILY", 1.0),
        ];

        let order_limits = OrderLimits::from_limits(&limits);

        let eq_daily_dma = LimitSlot {
            product: LimitProduct::Equity,
            period: LimitPeriod::Daily,
            handling: HandlingKind::Dma,
        };
        let fu_shot_disc = LimitSlot {
            product: LimitProduct::Future,
            period: LimitPeriod::OneShot,
            handling: HandlingKind::Disc,
        };
        assert_eq!(order_limits.get(eq_daily_dma), Some(5_000_000.0));
        assert_eq!(order_limits.get(fu_shot_disc), Some(200.0));
        assert_eq!(LimitSlot::all().filter(|s| order_limits.get(*s).is_some()).count(), 2);
    }

    #[test]
    fn test_client_trade_strings() {
        let trade = ClientTrade {
            client_id: "AC1".to_string(),
            is_disc: true,
            is_dma: true,
            is_fu_disc: true,
            ..Default::default()
        };

        assert_eq!(trade.lookup_labels(), "DISC, DMA, FU DISC");
        assert_eq!(trade.summary(), "CD&DMA&FUCD");
        assert_eq!(ClientTrade::default().summary(), "");
    }

    #[test]
    fn test_order_limits_serialize_all_fields() {
        let order_limits = OrderLimits::from_limits(&[limit("EQ", "DSA", "DAILY", 10.0)]);
        let json = serde_json::to_value(&order_limits).unwrap();

        assert_eq!(json.as_object().unwrap().len(), LimitSlot::COUNT);
        assert_eq!(json["eq_daily_dsa"], serde_json::json!(10.0));
        assert!(json["fu_daily_dsa"].is_null());
    }
}
