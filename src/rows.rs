// Row Builder
//
// Flattens Client → ClientClassifier → CodeSession → TradeType/Cost, plus
// the limit store's permissions and limits, into one row per
// (client, classifier, session).

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::entities::{
    Client, ClientClassifier, ClientView, CodeSession, CostLine, HandlingKind, OrderLimits,
    ProductKind, TradeType,
};
use crate::error::StoreResult;
use crate::store::{ClientStore, LimitStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRow {
    pub client_id: i64,
    pub client_name: String,
    pub identifier: String,
    pub view: String,
    pub code: String,
    pub session: String,
    pub session_start_end: String,
    pub connection_start_date: Option<NaiveDate>,
    pub connection_end_date: Option<NaiveDate>,
    /// `"Equity(DMA), Future(Disc)"`
    pub products: String,
    /// `"EQ(DMA)&FU(CD)"`
    pub trade_types: String,
    /// Permissions recorded in the limit store, `"CD&DMA"`
    pub limit_trade_types: String,
    pub limits: OrderLimits,
    pub costs: Vec<CostLine>,
}

/// Build every client table row.
///
/// Clients come sorted by name; within a client, classifiers and sessions
/// keep insertion order. Clients without classifiers produce nothing.
pub fn build_client_rows(store: &dyn ClientStore, limits: &dyn LimitStore) -> StoreResult<Vec<ClientRow>> {
    let mut rows = Vec::new();

    for client in store.list_clients()? {
        for classifier in store.classifiers_for_client(client.id)? {
            rows.extend(rows_for_classifier(store, limits, &client, &classifier)?);
        }
    }

    debug!(rows = rows.len(), "Built client rows");
    Ok(rows)
}

fn rows_for_classifier(
    store: &dyn ClientStore,
    limits: &dyn LimitStore,
    client: &Client,
    classifier: &ClientClassifier,
) -> StoreResult<Vec<ClientRow>> {
    let code_sessions = store.code_sessions_for_classifier(classifier.id)?;
    if code_sessions.is_empty() {
        return Ok(Vec::new());
    }

    // Limit data is per identifier, shared by every session of the classifier
    let limit_trade_types = limits
        .client_trade(&classifier.identifier)?
        .map(|trade| trade.summary())
        .unwrap_or_default();
    let order_limits = OrderLimits::from_limits(&limits.client_limits(&classifier.identifier)?);

    let mut rows = Vec::with_capacity(code_sessions.len());
    for code_session in code_sessions {
        let trade_types = store.trade_types_for(code_session.id)?;
        let costs = store.costs_for(code_session.id)?;

        rows.push(ClientRow {
            client_id: client.id,
            client_name: client.name.clone(),
            identifier: classifier.identifier.clone(),
            view: classifier.view.clone(),
            code: classifier.code.clone(),
            session: code_session.session.name.clone(),
            session_start_end: code_session.session.start_end(),
            connection_start_date: code_session.connection_start_date,
            connection_end_date: code_session.connection_end_date,
            products: products_string(&trade_types),
            trade_types: trade_types_summary(&trade_types),
            limit_trade_types: limit_trade_types.clone(),
            limits: order_limits.clone(),
            costs,
        });
    }

    Ok(rows)
}

/// `"Equity(DMA), Future(Disc)"`
pub fn products_string(trade_types: &[TradeType]) -> String {
    trade_types
        .iter()
        .map(TradeType::label)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Abbreviated summary grouped by product in EQ, FU, OP, SP order:
/// `"EQ(CD&DMA)&FU(DSA)"`. Trade types on other products are left out.
pub fn trade_types_summary(trade_types: &[TradeType]) -> String {
    let mut groups = Vec::new();

    for product in ProductKind::ALL {
        let labels: Vec<&str> = trade_types
            .iter()
            .filter(|t| ProductKind::from_name(&t.product) == Some(product))
            .map(|t| match HandlingKind::from_name(&t.handlinst) {
                Some(handling) => handling.summary_label(),
                None => t.handlinst.as_str(),
            })
            .collect();

        if !labels.is_empty() {
            groups.push(format!("{}({})", product.key().to_uppercase(), labels.join("&")));
        }
    }

    groups.join("&")
}

// ============================================================================
// DETAIL VIEW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientDetail {
    pub client: Client,
    pub classifiers: Vec<ClassifierDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierDetail {
    pub classifier: ClientClassifier,
    pub sessions: Vec<SessionDetail>,
    /// Limit listing from the limit store for this identifier.
    pub limits: Vec<ClientView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDetail {
    pub code_session: CodeSession,
    pub products: String,
    pub trade_types: Vec<TradeType>,
    pub costs: Vec<CostLine>,
}

/// Everything the detail page shows for one client, or None if the id is unknown.
pub fn client_detail(
    store: &dyn ClientStore,
    limits: &dyn LimitStore,
    client_id: i64,
) -> StoreResult<Option<ClientDetail>> {
    let Some(client) = store.get_client(client_id)? else {
        return Ok(None);
    };

    let mut classifiers = Vec::new();
    for classifier in store.classifiers_for_client(client.id)? {
        let mut sessions = Vec::new();
        for code_session in store.code_sessions_for_classifier(classifier.id)? {
            let trade_types = store.trade_types_for(code_session.id)?;
            sessions.push(SessionDetail {
                products: products_string(&trade_types),
                costs: store.costs_for(code_session.id)?,
                trade_types,
                code_session,
            });
        }

        classifiers.push(ClassifierDetail {
            limits: limits.client_view(&classifier.identifier)?,
            classifier,
            sessions,
        });
    }

    Ok(Some(ClientDetail { client, classifiers }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{seed_reference_data, setup_database, setup_limit_database};
    use crate::entities::{LimitPeriod, LimitProduct, LimitSlot, NewSession};
    use crate::store::{SqliteClientStore, SqliteLimitStore};
    use chrono::NaiveTime;
    use rusqlite::Connection;

    fn stores() -> (Connection, Connection) {
        let primary = Connection::open_in_memory().unwrap();
        setup_database(&primary).unwrap();
        seed_reference_data(&primary).unwrap();

        let limit = Connection::open_in_memory().unwrap();
        setup_limit_database(&limit).unwrap();
        (primary, limit)
    }

    fn trade_type(product: &str, handlinst: &str) -> TradeType {
        TradeType {
            id: 0,
            code_session_id: 0,
            product: product.to_string(),
            handlinst: handlinst.to_string(),
        }
    }

    /// Acme / AC1 / Tokyo Day with Equity×DMA and Future×Disc.
    fn insert_acme(primary: &Connection) {
        let store = SqliteClientStore::new(primary);
        store
            .create_session(&NewSession {
                name: "Tokyo Day".to_string(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            })
            .unwrap();
        // Products render with the stored handlinst name. The seeded row is
        // 'DISC' and would show as "Future(DISC)"; rename it to get "Future(Disc)".
        primary
            .execute_batch(
                "UPDATE handlinst SET name = 'Disc' WHERE name = 'DISC';
                 INSERT INTO client (name) VALUES ('Acme');
                 INSERT INTO client_classifier (client_id, identifier, view, code) VALUES (1, 'AC1', 'ACV', 'ACC');
                 INSERT INTO code_session (classifier_id, session_id, connection_start_date) VALUES (1, 1, '2024-04-01');
                 INSERT INTO trade_type (code_session_id, product_id, handlinst_id) VALUES (1, 1, 2);
                 INSERT INTO trade_type (code_session_id, product_id, handlinst_id) VALUES (1, 2, 1);",
            )
            .unwrap();
    }

    #[test]
    fn test_acme_example_row() {
        let (primary, limit) = stores();
        insert_acme(&primary);

        let rows = build_client_rows(&SqliteClientStore::new(&primary), &SqliteLimitStore::new(&limit)).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.client_name, "Acme");
        assert_eq!(row.view, "ACV");
        assert_eq!(row.code, "ACC");
        assert_eq!(row.session, "Tokyo Day");
        assert_eq!(row.session_start_end, "09:00:00-15:00:00");
        assert_eq!(row.products, "Equity(DMA), Future(Disc)");
        assert_eq!(row.trade_types, "EQ(DMA)&FU(CD)");
        assert_eq!(row.limit_trade_types, "");
        assert!(row.limits.is_empty());
    }

    #[test]
    fn test_client_without_classifiers_has_no_rows() {
        let (primary, limit) = stores();
        insert_acme(&primary);
        primary.execute("INSERT INTO client (name) VALUES ('Beta')", []).unwrap();

        let rows = build_client_rows(&SqliteClientStore::new(&primary), &SqliteLimitStore::new(&limit)).unwrap();

        assert!(rows.iter().all(|r| r.client_name != "Beta"));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rows_sorted_by_client_name() {
        let (primary, limit) = stores();
        insert_acme(&primary);
        primary
            .execute_batch(
                "INSERT INTO client (name) VALUES ('AAA Securities');
                 INSERT INTO client_classifier (client_id, identifier, view, code) VALUES (2, 'AA1', 'AAV', 'AAC');
                 INSERT INTO code_session (classifier_id, session_id) VALUES (2, 1);",
            )
            .unwrap();

        let rows = build_client_rows(&SqliteClientStore::new(&primary), &SqliteLimitStore::new(&limit)).unwrap();

        let names: Vec<&str> = rows.iter().map(|r| r.client_name.as_str()).collect();
        assert_eq!(names, vec!["AAA Securities", "Acme"]);
        assert_eq!(rows[0].products, "");
    }

    #[test]
    fn test_limits_filled_from_limit_store() {
        let (primary, limit) = stores();
        insert_acme(&primary);
        limit
            .execute_batch(
                "INSERT INTO client_trade (client_id, is_disc, is_dma, is_fu_dma) VALUES ('AC1', 1, 1, 1);
                 INSERT INTO client_limit VALUES ('AC1', 'EQ', 'DMA', 'DAILY', 300000000.0);
                 INSERT INTO client_limit VALUES ('AC1', 'FU', 'DSA', '1SHOT', 50.0);
                 INSERT INTO client_limit VALUES ('OTHER', 'EQ', 'DISC', 'DAILY', 1.0);",
            )
            .unwrap();

        let rows = build_client_rows(&SqliteClientStore::new(&primary), &SqliteLimitStore::new(&limit)).unwrap();
        let row = &rows[0];

        assert_eq!(row.limit_trade_types, "CD&DMA&FUDMA");
        let eq_daily_dma = LimitSlot {
            product: LimitProduct::Equity,
            period: LimitPeriod::Daily,
            handling: HandlingKind::Dma,
        };
        let eq_daily_disc = LimitSlot {
            handling: HandlingKind::Disc,
            ..eq_daily_dma
        };
        assert_eq!(row.limits.get(eq_daily_dma), Some(300_000_000.0));
        assert_eq!(row.limits.get(eq_daily_disc), None);
    }

    #[test]
    fn test_trade_types_summary_order_and_labels() {
        let trade_types = vec![
            trade_type("Spread", "DMA"),
            trade_type("Equity", "DISC"),
            trade_type("Equity", "DSA"),
            trade_type("Bond", "DMA"),
        ];

        assert_eq!(trade_types_summary(&trade_types), "EQ(CD&DSA)&SP(DMA)");
        assert_eq!(trade_types_summary(&[]), "");
    }

    #[test]
    fn test_client_detail() {
        let (primary, limit) = stores();
        insert_acme(&primary);
        limit
            .execute("INSERT INTO client_view VALUES ('AC1', 'EQ', 'DMA', 'DAILY', 10.0, 'JPY', NULL)", [])
            .unwrap();

        let store = SqliteClientStore::new(&primary);
        let limit_store = SqliteLimitStore::new(&limit);

        let detail = client_detail(&store, &limit_store, 1).unwrap().unwrap();
        assert_eq!(detail.client.name, "Acme");
        assert_eq!(detail.classifiers.len(), 1);
        assert_eq!(detail.classifiers[0].sessions[0].products, "Equity(DMA), Future(Disc)");
        assert_eq!(detail.classifiers[0].limits.len(), 1);

        assert!(client_detail(&store, &limit_store, 99).unwrap().is_none());
    }
}
