// Lookup Endpoints
//
// Key → value translations against the limit store for the admin forms.
// Unknown keys and unresolved identities are "no data", never errors.

use serde::Serialize;
use tracing::{debug, warn};

use crate::entities::ClientInfo;
use crate::error::StoreResult;
use crate::store::{LimitStore, LookupKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeTypeLookup {
    pub trade_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IdentityLookup {
    Found {
        exists: bool,
        client_id: String,
        view: String,
        code: String,
    },
    Missing {
        exists: bool,
    },
}

impl From<Option<ClientInfo>> for IdentityLookup {
    fn from(info: Option<ClientInfo>) -> Self {
        match info {
            Some(info) => IdentityLookup::Found {
                exists: true,
                client_id: info.client_id,
                view: info.view,
                code: info.code,
            },
            None => IdentityLookup::Missing { exists: false },
        }
    }
}

fn parse_key(key: Option<&str>) -> Option<LookupKey> {
    let key = key?;
    match key.parse() {
        Ok(key) => Some(key),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

/// Resolve the limit-store client id for a key. `client_id` is taken as is.
fn resolve_client_id(limits: &dyn LimitStore, key: LookupKey, value: &str) -> StoreResult<Option<String>> {
    match key {
        LookupKey::ClientId => Ok(Some(value.to_string())),
        LookupKey::View | LookupKey::Code => {
            Ok(limits.find_identity(key, value)?.map(|info| info.client_id))
        }
    }
}

fn try_trade_type(limits: &dyn LimitStore, key: LookupKey, value: &str) -> StoreResult<String> {
    let Some(client_id) = resolve_client_id(limits, key, value)? else {
        return Ok(String::new());
    };
    Ok(limits
        .client_trade(&client_id)?
        .map(|trade| trade.lookup_labels())
        .unwrap_or_default())
}

/// `{trade_type: "DISC, DMA"}`; empty string whenever nothing resolves.
pub fn lookup_trade_type(limits: &dyn LimitStore, key: Option<&str>, value: Option<&str>) -> TradeTypeLookup {
    let trade_type = match (parse_key(key), value) {
        (Some(key), Some(value)) => try_trade_type(limits, key, value).unwrap_or_else(|e| {
            warn!(error = %e, "Trade type lookup failed");
            String::new()
        }),
        _ => String::new(),
    };
    TradeTypeLookup { trade_type }
}

/// `{exists: true, client_id, view, code}` or `{exists: false}`.
pub fn lookup_identity(limits: &dyn LimitStore, key: Option<&str>, value: Option<&str>) -> IdentityLookup {
    let info = match (parse_key(key), value) {
        (Some(key), Some(value)) => limits.find_identity(key, value).unwrap_or_else(|e| {
            warn!(error = %e, "Identity lookup failed");
            None
        }),
        _ => None,
    };
    info.into()
}
