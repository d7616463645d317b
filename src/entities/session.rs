// Trading sessions and the per-classifier session links

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const SESSION_NAME_MAX_LEN: usize = 30;

/// A named trading window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl Session {
    /// `"09:00:00-15:00:00"`
    pub fn start_end(&self) -> String {
        format!("{}-{}", self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Link between a classifier and a session, with the FIX connection window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSession {
    pub id: i64,
    pub classifier_id: i64,
    pub session: Session,
    pub connection_start_date: Option<NaiveDate>,
    pub connection_end_date: Option<NaiveDate>,
}

/// Permitted product × handling instruction for one code session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeType {
    pub id: i64,
    pub code_session_id: i64,
    pub product: String,
    pub handlinst: String,
}

impl TradeType {
    /// `"Equity(DMA)"`
    pub fn label(&self) -> String {
        format!("{}({})", self.product, self.handlinst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_start_end() {
        let session = Session {
            id: 1,
            name: "Tokyo Day".to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        };

        assert_eq!(session.start_end(), "09:00:00-15:00:00");
    }

    #[test]
    fn test_trade_type_label() {
        let trade_type = TradeType {
            id: 1,
            code_session_id: 1,
            product: "Future".to_string(),
            handlinst: "Disc".to_string(),
        };

        assert_eq!(trade_type.label(), "Future(Disc)");
    }
}
