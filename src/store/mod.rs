// Repository interfaces
//
// Two stores with different capabilities:
// - ClientStore: the primary, read-write store owned by this application
// - LimitStore: the risk system's database, read-only by construction
//
// Handlers, the row builder and the add-client workflow receive these as
// trait objects instead of choosing a connection themselves.

pub mod sqlite;
pub mod limit;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::entities::{
    Client, ClientClassifier, ClientInfo, ClientLimit, ClientTrade, ClientView, CodeSession,
    CostLine, HandlInst, NamedRef, NewCost, NewSession, Product, ReferenceKind, Session, TradeType,
};
use crate::error::StoreResult;

pub use limit::SqliteLimitStore;
pub use sqlite::SqliteClientStore;

/// Read-write access to the primary store.
pub trait ClientStore {
    /// All clients ordered by name.
    fn list_clients(&self) -> StoreResult<Vec<Client>>;
    fn get_client(&self, id: i64) -> StoreResult<Option<Client>>;
    /// Exact, case-sensitive name match. The first client by id wins.
    fn find_client_by_name(&self, name: &str) -> StoreResult<Option<Client>>;

    fn classifiers_for_client(&self, client_id: i64) -> StoreResult<Vec<ClientClassifier>>;
    /// Every classifier registered under `identifier`, by id.
    fn classifiers_with_identifier(&self, identifier: &str) -> StoreResult<Vec<ClientClassifier>>;
    fn find_classifier_by_view_code(&self, view: &str, code: &str) -> StoreResult<Option<ClientClassifier>>;

    fn code_sessions_for_classifier(&self, classifier_id: i64) -> StoreResult<Vec<CodeSession>>;
    fn code_session_exists(&self, classifier_id: i64, session_id: i64) -> StoreResult<bool>;
    fn trade_types_for(&self, code_session_id: i64) -> StoreResult<Vec<TradeType>>;
    fn costs_for(&self, code_session_id: i64) -> StoreResult<Vec<CostLine>>;

    fn list_sessions(&self) -> StoreResult<Vec<Session>>;
    fn get_session(&self, id: i64) -> StoreResult<Option<Session>>;
    fn find_session_by_name(&self, name: &str) -> StoreResult<Option<Session>>;
    fn find_product(&self, name: &str) -> StoreResult<Option<Product>>;
    fn find_handlinst(&self, name: &str) -> StoreResult<Option<HandlInst>>;

    fn create_session(&self, session: &NewSession) -> StoreResult<Session>;
    /// Insert into a name-only reference table (vendor, currency, ...).
    fn create_reference(&self, kind: ReferenceKind, name: &str) -> StoreResult<NamedRef>;
    fn create_cost(&self, code_session_id: i64, cost: &NewCost) -> StoreResult<CostLine>;

    /// Write a validated add-client bundle atomically.
    fn persist_client_bundle(&self, bundle: &ClientBundle) -> StoreResult<PersistedBundle>;

    /// Fails with `StoreError::Protected` while other rows reference the target.
    fn delete_reference(&self, kind: ReferenceKind, id: i64) -> StoreResult<()>;
}

/// Read-only access to the limit store.
pub trait LimitStore {
    /// At most one identity for an exact key match.
    fn find_identity(&self, key: LookupKey, value: &str) -> StoreResult<Option<ClientInfo>>;
    fn client_trade(&self, client_id: &str) -> StoreResult<Option<ClientTrade>>;
    fn client_limits(&self, client_id: &str) -> StoreResult<Vec<ClientLimit>>;
    fn client_view(&self, client_id: &str) -> StoreResult<Vec<ClientView>>;
}

/// Which limit-store column a lookup value is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    ClientId,
    View,
    Code,
}

impl LookupKey {
    pub fn column(&self) -> &'static str {
        match self {
            LookupKey::ClientId => "client_id",
            LookupKey::View => "view",
            LookupKey::Code => "code",
        }
    }
}

impl FromStr for LookupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_id" => Ok(LookupKey::ClientId),
            "view" => Ok(LookupKey::View),
            "code" => Ok(LookupKey::Code),
            other => Err(format!("Unknown lookup key: {}", other)),
        }
    }
}

// ============================================================================
// ADD-CLIENT BUNDLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierPlan {
    /// Reuse a classifier; the session attaches to its owner.
    Existing { id: i64, client_id: i64 },
    /// `client_id` is set when the identifier already has an owner.
    New {
        identifier: String,
        view: String,
        code: String,
        client_id: Option<i64>,
    },
}

impl ClassifierPlan {
    /// Client the bundle must attach to, if already decided.
    pub fn owner(&self) -> Option<i64> {
        match self {
            ClassifierPlan::Existing { client_id, .. } => Some(*client_id),
            ClassifierPlan::New { client_id, .. } => *client_id,
        }
    }
}

/// Everything the add-client workflow writes, resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientBundle {
    pub client_name: String,
    pub classifier: ClassifierPlan,
    pub session_id: i64,
    pub connection_start_date: Option<NaiveDate>,
    pub connection_end_date: Option<NaiveDate>,
    /// (product_id, handlinst_id) per checked flag.
    pub trade_types: Vec<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedBundle {
    pub client_id: i64,
    pub client_created: bool,
    pub classifier_id: i64,
    pub classifier_created: bool,
    pub code_session_id: i64,
    pub trade_type_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_key_parse() {
        assert_eq!("view".parse::<LookupKey>(), Ok(LookupKey::View));
        assert_eq!("client_id".parse::<LookupKey>(), Ok(LookupKey::ClientId));
        assert!("name".parse::<LookupKey>().is_err());
        assert_eq!(LookupKey::Code.column(), "code");
    }
}
