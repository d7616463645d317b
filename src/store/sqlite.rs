use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{ClassifierPlan, ClientBundle, ClientStore, PersistedBundle};
use crate::db::{insert_event, Event};
use crate::entities::{
    Client, ClientClassifier, CodeSession, CostLine, HandlInst, NamedRef, NewCost, NewSession,
    Product, ReferenceKind, Session, TradeType,
};
use crate::error::{StoreError, StoreResult};

const ACTOR: &str = "fix_clients";

/// Primary store over a borrowed SQLite connection.
pub struct SqliteClientStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteClientStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn classifier_from_row(row: &Row<'_>) -> rusqlite::Result<ClientClassifier> {
    Ok(ClientClassifier {
        id: row.get(0)?,
        client_id: row.get(1)?,
        identifier: row.get(2)?,
        view: row.get(3)?,
        code: row.get(4)?,
    })
}

fn session_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        start_time: row.get(offset + 2)?,
        end_time: row.get(offset + 3)?,
    })
}

const CLASSIFIER_COLUMNS: &str = "id, client_id, identifier, view, code";

const COST_SELECT: &str = "SELECT c.id, c.code_session_id, ct.name, v.name, p.name, h.name, ch.name, c.change, cur.name
     FROM cost c
     JOIN cost_type ct ON ct.id = c.cost_type_id
     LEFT JOIN vendor v ON v.id = c.vendor_id
     LEFT JOIN product p ON p.id = c.product_id
     LEFT JOIN handlinst h ON h.id = c.handlinst_id
     LEFT JOIN change_type ch ON ch.id = c.change_type_id
     LEFT JOIN currency cur ON cur.id = c.currency_id";

fn cost_from_row(row: &Row<'_>) -> rusqlite::Result<CostLine> {
    Ok(CostLine {
        id: row.get(0)?,
        code_session_id: row.get(1)?,
        cost_type: row.get(2)?,
        vendor: row.get(3)?,
        product: row.get(4)?,
        handlinst: row.get(5)?,
        change_type: row.get(6)?,
        change: row.get(7)?,
        currency: row.get(8)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl ClientStore for SqliteClientStore<'_> {
    fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM client ORDER BY name, id")?;
        let clients = stmt
            .query_map([], client_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    fn get_client(&self, id: i64) -> StoreResult<Option<Client>> {
        let client = self
            .conn
            .query_row("SELECT id, name FROM client WHERE id = ?1", params![id], client_from_row)
            .optional()?;
        Ok(client)
    }

    fn find_client_by_name(&self, name: &str) -> StoreResult<Option<Client>> {
        let client = self
            .conn
            .query_row(
                "SELECT id, name FROM client WHERE name = ?1 ORDER BY id LIMIT 1",
                params![name],
                client_from_row,
            )
            .optional()?;
        Ok(client)
    }

    fn classifiers_for_client(&self, client_id: i64) -> StoreResult<Vec<ClientClassifier>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM client_classifier WHERE client_id = ?1 ORDER BY id",
            CLASSIFIER_COLUMNS
        ))?;
        let classifiers = stmt
            .query_map(params![client_id], classifier_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classifiers)
    }

    fn classifiers_with_identifier(&self, identifier: &str) -> StoreResult<Vec<ClientClassifier>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM client_classifier WHERE identifier = ?1 ORDER BY id",
            CLASSIFIER_COLUMNS
        ))?;
        let classifiers = stmt
            .query_map(params![identifier], classifier_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classifiers)
    }

    fn find_classifier_by_view_code(&self, view: &str, code: &str) -> StoreResult<Option<ClientClassifier>> {
        let classifier = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM client_classifier WHERE view = ?1 AND code = ?2",
                    CLASSIFIER_COLUMNS
                ),
                params![view, code],
                classifier_from_row,
            )
            .optional()?;
        Ok(classifier)
    }

    fn code_sessions_for_classifier(&self, classifier_id: i64) -> StoreResult<Vec<CodeSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT cs.id, cs.classifier_id, cs.connection_start_date, cs.connection_end_date,
                    s.id, s.name, s.start_time, s.end_time
             FROM code_session cs
             JOIN session s ON s.id = cs.session_id
             WHERE cs.classifier_id = ?1
             ORDER BY cs.id",
        )?;
        let code_sessions = stmt
            .query_map(params![classifier_id], |row| {
                Ok(CodeSession {
                    id: row.get(0)?,
                    classifier_id: row.get(1)?,
                    connection_start_date: row.get(2)?,
                    connection_end_date: row.get(3)?,
                    session: session_from_row(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(code_sessions)
    }

    fn code_session_exists(&self, classifier_id: i64, session_id: i64) -> StoreResult<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM code_session WHERE classifier_id = ?1 AND session_id = ?2)",
            params![classifier_id, session_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn trade_types_for(&self, code_session_id: i64) -> StoreResult<Vec<TradeType>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.code_session_id, p.name, h.name
             FROM trade_type t
             JOIN product p ON p.id = t.product_id
             JOIN handlinst h ON h.id = t.handlinst_id
             WHERE t.code_session_id = ?1
             ORDER BY t.id",
        )?;
        let trade_types = stmt
            .query_map(params![code_session_id], |row| {
                Ok(TradeType {
                    id: row.get(0)?,
                    code_session_id: row.get(1)?,
                    product: row.get(2)?,
                    handlinst: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trade_types)
    }

    fn costs_for(&self, code_session_id: i64) -> StoreResult<Vec<CostLine>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE c.code_session_id = ?1 ORDER BY c.id", COST_SELECT))?;
        let costs = stmt
            .query_map(params![code_session_id], cost_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(costs)
    }

    fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, start_time, end_time FROM session ORDER BY name, id")?;
        let sessions = stmt
            .query_map([], |row| session_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn get_session(&self, id: i64) -> StoreResult<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, name, start_time, end_time FROM session WHERE id = ?1",
                params![id],
                |row| session_from_row(row, 0),
            )
            .optional()?;
        Ok(session)
    }

    fn find_session_by_name(&self, name: &str) -> StoreResult<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, name, start_time, end_time FROM session WHERE name = ?1 ORDER BY id LIMIT 1",
                params![name],
                |row| session_from_row(row, 0),
            )
            .optional()?;
        Ok(session)
    }

    fn find_product(&self, name: &str) -> StoreResult<Option<Product>> {
        let product = self
            .conn
            .query_row(
                "SELECT id, name FROM product WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |row| {
                    Ok(Product {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(product)
    }

    fn find_handlinst(&self, name: &str) -> StoreResult<Option<HandlInst>> {
        let handlinst = self
            .conn
            .query_row(
                "SELECT id, name, value FROM handlinst WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |row| {
                    Ok(HandlInst {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        value: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(handlinst)
    }

    fn create_session(&self, session: &NewSession) -> StoreResult<Session> {
        self.conn.execute(
            "INSERT INTO session (name, start_time, end_time) VALUES (?1, ?2, ?3)",
            params![session.name, session.start_time, session.end_time],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, name = %session.name, "Created session");

        Ok(Session {
            id,
            name: session.name.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
        })
    }

    fn create_reference(&self, kind: ReferenceKind, name: &str) -> StoreResult<NamedRef> {
        if matches!(kind, ReferenceKind::Session | ReferenceKind::HandlInst) {
            return Err(StoreError::InvalidData(format!(
                "{} rows need more than a name",
                kind.entity()
            )));
        }

        self.conn.execute(
            &format!("INSERT INTO {} (name) VALUES (?1)", kind.table()),
            params![name],
        )?;

        Ok(NamedRef {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn create_cost(&self, code_session_id: i64, cost: &NewCost) -> StoreResult<CostLine> {
        self.conn.execute(
            "INSERT INTO cost (
                code_session_id, vendor_id, cost_type_id, change_type_id,
                product_id, handlinst_id, currency_id, change
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                code_session_id,
                cost.vendor_id,
                cost.cost_type_id,
                cost.change_type_id,
                cost.product_id,
                cost.handlinst_id,
                cost.currency_id,
                cost.change,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        let line = self
            .conn
            .query_row(&format!("{} WHERE c.id = ?1", COST_SELECT), params![id], cost_from_row)?;
        Ok(line)
    }

    fn persist_client_bundle(&self, bundle: &ClientBundle) -> StoreResult<PersistedBundle> {
        let tx = self.conn.unchecked_transaction()?;

        // 1. Client: the identifier's owner, else reuse by exact name, else create
        let existing_client: Option<i64> = match bundle.classifier.owner() {
            Some(owner) => Some(owner),
            None => tx
                .query_row(
                    "SELECT id FROM client WHERE name = ?1 ORDER BY id LIMIT 1",
                    params![bundle.client_name],
                    |row| row.get(0),
                )
                .optional()?,
        };
        let (client_id, client_created) = match existing_client {
            Some(id) => (id, false),
            None => {
                tx.execute("INSERT INTO client (name) VALUES (?1)", params![bundle.client_name])?;
                (tx.last_insert_rowid(), true)
            }
        };

        // 2. Classifier
        let (classifier_id, classifier_created) = match &bundle.classifier {
            ClassifierPlan::Existing { id, .. } => (*id, false),
            ClassifierPlan::New { identifier, view, code, .. } => {
                tx.execute(
                    "INSERT INTO client_classifier (client_id, identifier, view, code)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![client_id, identifier, view, code],
                )?;
                (tx.last_insert_rowid(), true)
            }
        };

        // 3. Session link
        tx.execute(
            "INSERT INTO code_session (classifier_id, session_id, connection_start_date, connection_end_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                classifier_id,
                bundle.session_id,
                bundle.connection_start_date,
                bundle.connection_end_date,
            ],
        )?;
        let code_session_id = tx.last_insert_rowid();

        // 4. One trade type per checked flag
        let mut trade_type_ids = Vec::with_capacity(bundle.trade_types.len());
        for (product_id, handlinst_id) in &bundle.trade_types {
            tx.execute(
                "INSERT INTO trade_type (code_session_id, product_id, handlinst_id) VALUES (?1, ?2, ?3)",
                params![code_session_id, product_id, handlinst_id],
            )?;
            trade_type_ids.push(tx.last_insert_rowid());
        }

        let event = Event::new(
            "client_session_added",
            "client",
            &client_id.to_string(),
            serde_json::json!({
                "name": bundle.client_name,
                "client_created": client_created,
                "classifier_id": classifier_id,
                "classifier_created": classifier_created,
                "code_session_id": code_session_id,
                "trade_types": trade_type_ids.len(),
            }),
            ACTOR,
        );
        insert_event(&tx, &event)?;

        tx.commit()?;

        info!(
            client_id,
            classifier_id,
            code_session_id,
            trade_types = trade_type_ids.len(),
            "Persisted client bundle"
        );

        Ok(PersistedBundle {
            client_id,
            client_created,
            classifier_id,
            classifier_created,
            code_session_id,
            trade_type_ids,
        })
    }

    fn delete_reference(&self, kind: ReferenceKind, id: i64) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let result = tx.execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), params![id]);

        match result {
            Ok(0) => Err(StoreError::not_found(kind.entity(), id)),
            Ok(_) => {
                let event = Event::new(
                    "reference_deleted",
                    kind.table(),
                    &id.to_string(),
                    serde_json::json!({}),
                    ACTOR,
                );
                insert_event(&tx, &event)?;
                tx.commit()?;
                info!(entity = kind.entity(), id, "Deleted reference row");
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => Err(StoreError::Protected {
                entity: kind.entity(),
                id,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, get_events_for_entity, seed_reference_data, setup_database};
    use chrono::{NaiveDate, NaiveTime};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_reference_data(&conn).unwrap();
        conn
    }

    fn tokyo_day(store: &SqliteClientStore<'_>) -> Session {
        store
            .create_session(&NewSession {
                name: "Tokyo Day".to_string(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            })
            .unwrap()
    }

    fn bundle(name: &str, session_id: i64) -> ClientBundle {
        ClientBundle {
            client_name: name.to_string(),
            classifier: ClassifierPlan::New {
                identifier: "AC1".to_string(),
                view: "ACV".to_string(),
                code: "ACC".to_string(),
                client_id: None,
            },
            session_id,
            connection_start_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            connection_end_date: None,
            trade_types: vec![(1, 2), (2, 1)],
        }
    }

    #[test]
    fn test_persist_bundle_creates_hierarchy() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let session = tokyo_day(&store);

        let persisted = store.persist_client_bundle(&bundle("Acme", session.id)).unwrap();

        assert!(persisted.client_created);
        assert!(persisted.classifier_created);
        assert_eq!(persisted.trade_type_ids.len(), 2);

        let code_sessions = store.code_sessions_for_classifier(persisted.classifier_id).unwrap();
        assert_eq!(code_sessions.len(), 1);
        assert_eq!(code_sessions[0].session, session);
        assert_eq!(code_sessions[0].connection_start_date, NaiveDate::from_ymd_opt(2024, 4, 1));

        let trade_types = store.trade_types_for(persisted.code_session_id).unwrap();
        assert_eq!(trade_types[0].label(), "Equity(DMA)");
        assert_eq!(trade_types[1].label(), "Future(DISC)");

        let events = get_events_for_entity(&conn, "client", &persisted.client_id.to_string()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_persist_bundle_reuses_client_by_exact_name() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let session = tokyo_day(&store);
        let first = store.persist_client_bundle(&bundle("Acme", session.id)).unwrap();

        let night = store
            .create_session(&NewSession {
                name: "Tokyo Night".to_string(),
                start_time: NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            })
            .unwrap();
        let mut second_bundle = bundle("Acme", night.id);
        second_bundle.classifier = ClassifierPlan::Existing {
            id: first.classifier_id,
            client_id: first.client_id,
        };
        let second = store.persist_client_bundle(&second_bundle).unwrap();

        assert!(!second.client_created);
        assert!(!second.classifier_created);
        assert_eq!(second.client_id, first.client_id);
        assert_eq!(count_rows(&conn, "client").unwrap(), 1);
        assert_eq!(count_rows(&conn, "code_session").unwrap(), 2);
    }

    #[test]
    fn test_persist_bundle_rolls_back_on_failure() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let session = tokyo_day(&store);

        let mut broken = bundle("Acme", session.id);
        broken.trade_types = vec![(1, 1), (999, 1)]; // unknown product id

        assert!(store.persist_client_bundle(&broken).is_err());
        assert_eq!(count_rows(&conn, "client").unwrap(), 0);
        assert_eq!(count_rows(&conn, "client_classifier").unwrap(), 0);
        assert_eq!(count_rows(&conn, "trade_type").unwrap(), 0);
    }

    #[test]
    fn test_delete_reference_is_protected() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let session = tokyo_day(&store);
        store.persist_client_bundle(&bundle("Acme", session.id)).unwrap();

        let result = store.delete_reference(ReferenceKind::Session, session.id);
        assert!(matches!(result, Err(StoreError::Protected { entity: "Session", .. })));

        let spread = store.find_product("Spread").unwrap().unwrap();
        store.delete_reference(ReferenceKind::Product, spread.id).unwrap();
        assert!(store.find_product("Spread").unwrap().is_none());

        let missing = store.delete_reference(ReferenceKind::Vendor, 42);
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_delete_reference_keeps_row_when_audit_fails() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let vendor = store.create_reference(ReferenceKind::Vendor, "NTT").unwrap();
        conn.execute("DROP TABLE events", []).unwrap();

        assert!(store.delete_reference(ReferenceKind::Vendor, vendor.id).is_err());
        assert_eq!(count_rows(&conn, "vendor").unwrap(), 1);
    }

    #[test]
    fn test_persist_bundle_uses_classifier_owner() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let session = tokyo_day(&store);
        conn.execute_batch(
            "INSERT INTO client (name) VALUES ('Acme');
             INSERT INTO client (name) VALUES ('Acme');
             INSERT INTO client_classifier (client_id, identifier, view, code) VALUES (2, 'AC1', 'ACV', 'ACC');",
        )
        .unwrap();

        let mut owned = bundle("Acme", session.id);
        owned.classifier = ClassifierPlan::Existing { id: 1, client_id: 2 };
        let persisted = store.persist_client_bundle(&owned).unwrap();

        assert_eq!(persisted.client_id, 2);
        assert!(!persisted.client_created);
        assert_eq!(get_events_for_entity(&conn, "client", "2").unwrap().len(), 1);
    }

    #[test]
    fn test_create_cost_resolves_names() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let session = tokyo_day(&store);
        let persisted = store.persist_client_bundle(&bundle("Acme", session.id)).unwrap();

        let vendor = store.create_reference(ReferenceKind::Vendor, "NTT").unwrap();
        let change_type = store.create_reference(ReferenceKind::ChangeType, "Monthly").unwrap();
        let currency = store.create_reference(ReferenceKind::Currency, "JPY").unwrap();
        let equity = store.find_product("equity").unwrap().unwrap();

        let line = store
            .create_cost(
                persisted.code_session_id,
                &NewCost {
                    vendor_id: vendor.id,
                    cost_type_id: 2,
                    change_type_id: change_type.id,
                    product_id: Some(equity.id),
                    handlinst_id: None,
                    currency_id: Some(currency.id),
                    change: Some(50_000.0),
                },
            )
            .unwrap();

        assert_eq!(line.cost_type, "Line");
        assert_eq!(line.vendor.as_deref(), Some("NTT"));
        assert_eq!(line.product_handlinst(), "Equity");
        assert_eq!(store.costs_for(persisted.code_session_id).unwrap(), vec![line]);
    }

    #[test]
    fn test_create_reference_rejects_multi_column_tables() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);

        assert!(store.create_reference(ReferenceKind::HandlInst, "CARE").is_err());
    }

    #[test]
    fn test_list_clients_sorted_by_name() {
        let conn = test_conn();
        conn.execute_batch("INSERT INTO client (name) VALUES ('Zeta'), ('Acme'), ('Mori');")
            .unwrap();
        let store = SqliteClientStore::new(&conn);

        let names: Vec<String> = store.list_clients().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Acme", "Mori", "Zeta"]);
    }
}
