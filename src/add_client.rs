// Add-Client Workflow
//
// Four sub-forms (client, view/code, session, trade-type grid) are validated
// field by field first. Only when every field is clean do the cross-entity
// checks run, and only when those pass is anything written.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::entities::client::{CLASSIFIER_FIELD_MAX_LEN, CLIENT_NAME_MAX_LEN};
use crate::entities::{HandlingKind, ProductKind, Session};
use crate::error::StoreError;
use crate::store::{ClassifierPlan, ClientBundle, ClientStore, PersistedBundle};

// ============================================================================
// FORMS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientForm {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCodeForm {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub view: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionForm {
    #[serde(default)]
    pub session: Option<i64>,
    /// `YYYY-MM-DD`, blank for none
    #[serde(default)]
    pub connection_start_date: Option<String>,
    #[serde(default)]
    pub connection_end_date: Option<String>,
}

/// EQ/FU/OP/SP × DISC/DMA/DSA permission flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeTypeGrid {
    pub eq_disc: bool,
    pub eq_dma: bool,
    pub eq_dsa: bool,
    pub fu_disc: bool,
    pub fu_dma: bool,
    pub fu_dsa: bool,
    pub op_disc: bool,
    pub op_dma: bool,
    pub op_dsa: bool,
    pub sp_disc: bool,
    pub sp_dma: bool,
    pub sp_dsa: bool,
}

impl TradeTypeGrid {
    pub fn is_checked(&self, product: ProductKind, handling: HandlingKind) -> bool {
        match (product, handling) {
            (ProductKind::Equity, HandlingKind::Disc) => self.eq_disc,
            (ProductKind::Equity, HandlingKind::Dma) => self.eq_dma,
            (ProductKind::Equity, HandlingKind::Dsa) => self.eq_dsa,
            (ProductKind::Future, HandlingKind::Disc) => self.fu_disc,
            (ProductKind::Future, HandlingKind::Dma) => self.fu_dma,
            (ProductKind::Future, HandlingKind::Dsa) => self.fu_dsa,
            (ProductKind::Option, HandlingKind::Disc) => self.op_disc,
            (ProductKind::Option, HandlingKind::Dma) => self.op_dma,
            (ProductKind::Option, HandlingKind::Dsa) => self.op_dsa,
            (ProductKind::Spread, HandlingKind::Disc) => self.sp_disc,
            (ProductKind::Spread, HandlingKind::Dma) => self.sp_dma,
            (ProductKind::Spread, HandlingKind::Dsa) => self.sp_dsa,
        }
    }

    /// Checked cells in product-major order.
    pub fn checked(&self) -> Vec<(ProductKind, HandlingKind)> {
        ProductKind::ALL
            .into_iter()
            .flat_map(|product| HandlingKind::ALL.into_iter().map(move |handling| (product, handling)))
            .filter(|(product, handling)| self.is_checked(*product, *handling))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddClientRequest {
    #[serde(default)]
    pub client: ClientForm,
    #[serde(default)]
    pub view_code: ViewCodeForm,
    #[serde(default)]
    pub session: SessionForm,
    #[serde(default)]
    pub trade_types: TradeTypeGrid,
}

// ============================================================================
// ERRORS
// ============================================================================

/// A validation failure attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub form: &'static str,
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(form: &'static str, field: &str, message: impl Into<String>) -> Self {
        FieldError {
            form,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.form, self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum AddClientError {
    #[error("{} validation error(s): {}", .0.len(), join_errors(.0))]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

const REQUIRED: &str = "This field is required.";

// ============================================================================
// FIELD-LEVEL VALIDATION
// ============================================================================

/// A submission whose every field passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSubmission {
    pub name: String,
    pub identifier: String,
    pub view: String,
    pub code: String,
    pub session: Session,
    pub connection_start_date: Option<NaiveDate>,
    pub connection_end_date: Option<NaiveDate>,
    /// (product_id, handlinst_id) per checked flag
    pub trade_types: Vec<(i64, i64)>,
}

fn clean_text(
    errors: &mut Vec<FieldError>,
    form: &'static str,
    field: &str,
    value: &str,
    max_len: usize,
) -> String {
    let value = value.trim();
    let len = value.chars().count();
    if value.is_empty() {
        errors.push(FieldError::new(form, field, REQUIRED));
    } else if len > max_len {
        errors.push(FieldError::new(
            form,
            field,
            format!("Ensure this value has at most {} characters (it has {}).", max_len, len),
        ));
    }
    value.to_string()
}

fn clean_date(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>) -> Option<NaiveDate> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(FieldError::new("session", field, "Enter a valid date (YYYY-MM-DD)."));
            None
        }
    }
}

/// Run every sub-form's own validation, collecting all errors.
pub fn validate_fields(
    store: &dyn ClientStore,
    request: &AddClientRequest,
) -> Result<CleanSubmission, AddClientError> {
    let mut errors = Vec::new();

    let name = clean_text(&mut errors, "client", "name", &request.client.name, CLIENT_NAME_MAX_LEN);

    let view_code = &request.view_code;
    let identifier = clean_text(&mut errors, "view_code", "identifier", &view_code.identifier, CLASSIFIER_FIELD_MAX_LEN);
    let view = clean_text(&mut errors, "view_code", "view", &view_code.view, CLASSIFIER_FIELD_MAX_LEN);
    let code = clean_text(&mut errors, "view_code", "code", &view_code.code, CLASSIFIER_FIELD_MAX_LEN);

    let session = match request.session.session {
        None => {
            errors.push(FieldError::new("session", "session", REQUIRED));
            None
        }
        Some(id) => {
            let session = store.get_session(id)?;
            if session.is_none() {
                errors.push(FieldError::new(
                    "session",
                    "session",
                    "Select a valid choice. That choice is not one of the available choices.",
                ));
            }
            session
        }
    };

    let start = clean_date(&mut errors, "connection_start_date", request.session.connection_start_date.as_deref());
    let end = clean_date(&mut errors, "connection_end_date", request.session.connection_end_date.as_deref());
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            errors.push(FieldError::new(
                "session",
                "connection_end_date",
                "Connection end date is before the start date.",
            ));
        }
    }

    let mut trade_types = Vec::new();
    for (product, handling) in request.trade_types.checked() {
        let field = format!("{}_{}", product.key(), handling.key());
        let product_row = store.find_product(product.name())?;
        let handlinst_row = store.find_handlinst(handling.name())?;
        match (product_row, handlinst_row) {
            (Some(p), Some(h)) => trade_types.push((p.id, h.id)),
            (None, _) => errors.push(FieldError::new(
                "trade_types",
                &field,
                format!("Product {} is not configured.", product.name()),
            )),
            (_, None) => errors.push(FieldError::new(
                "trade_types",
                &field,
                format!("Handling instruction {} is not configured.", handling.name()),
            )),
        }
    }

    match session {
        Some(session) if errors.is_empty() => Ok(CleanSubmission {
            name,
            identifier,
            view,
            code,
            session,
            connection_start_date: start,
            connection_end_date: end,
            trade_types,
        }),
        _ => Err(AddClientError::Validation(errors)),
    }
}

// ============================================================================
// CROSS-ENTITY VALIDATION
// ============================================================================

/// Checks that span several entities. Decides whether the classifier is
/// reused or created.
pub fn check_cross_entity(
    store: &dyn ClientStore,
    clean: &CleanSubmission,
) -> Result<ClassifierPlan, AddClientError> {
    let mut errors = Vec::new();

    let registered = store.classifiers_with_identifier(&clean.identifier)?;
    let owner_id = registered.first().map(|c| c.client_id);

    if let Some(owner_id) = owner_id {
        let owner = store.get_client(owner_id)?;
        if let Some(owner) = owner.filter(|owner| owner.name != clean.name) {
            errors.push(FieldError::new(
                "view_code",
                "identifier",
                format!("Identifier {} already belongs to client {}.", clean.identifier, owner.name),
            ));
        }
    }

    let exact = registered.iter().find(|c| c.same_view_code(&clean.view, &clean.code));
    let plan = match exact {
        Some(existing) => {
            if store.code_session_exists(existing.id, clean.session.id)? {
                errors.push(FieldError::new(
                    "session",
                    "session",
                    format!("{} is already linked to session {}.", clean.identifier, clean.session.name),
                ));
            }
            ClassifierPlan::Existing {
                id: existing.id,
                client_id: existing.client_id,
            }
        }
        None => {
            // A new view/code under a known identifier is a new classifier,
            // as long as no pair of (identifier, view, code) repeats.
            if let Some(same_view) = registered.iter().find(|c| c.view == clean.view) {
                errors.push(FieldError::new(
                    "view_code",
                    "view",
                    format!(
                        "Identifier {} already uses view {} with code {}.",
                        clean.identifier, same_view.view, same_view.code
                    ),
                ));
            }
            if let Some(same_code) = registered.iter().find(|c| c.code == clean.code) {
                errors.push(FieldError::new(
                    "view_code",
                    "code",
                    format!(
                        "Identifier {} already uses code {} with view {}.",
                        clean.identifier, same_code.code, same_code.view
                    ),
                ));
            }
            if let Some(taken) = store.find_classifier_by_view_code(&clean.view, &clean.code)? {
                errors.push(FieldError::new(
                    "view_code",
                    "view",
                    format!(
                        "View {} and code {} are already used by identifier {}.",
                        clean.view, clean.code, taken.identifier
                    ),
                ));
            }
            ClassifierPlan::New {
                identifier: clean.identifier.clone(),
                view: clean.view.clone(),
                code: clean.code.clone(),
                client_id: owner_id,
            }
        }
    };

    if errors.is_empty() {
        Ok(plan)
    } else {
        Err(AddClientError::Validation(errors))
    }
}

// ============================================================================
// WORKFLOW
// ============================================================================

/// Validate and persist a new client/classifier/session/trade-type bundle.
pub fn add_client(
    store: &dyn ClientStore,
    request: &AddClientRequest,
) -> Result<PersistedBundle, AddClientError> {
    let clean = validate_fields(store, request).map_err(log_rejection)?;
    let classifier = check_cross_entity(store, &clean).map_err(log_rejection)?;

    let bundle = ClientBundle {
        client_name: clean.name,
        classifier,
        session_id: clean.session.id,
        connection_start_date: clean.connection_start_date,
        connection_end_date: clean.connection_end_date,
        trade_types: clean.trade_types,
    };

    let persisted = store.persist_client_bundle(&bundle)?;
    info!(
        client_id = persisted.client_id,
        code_session_id = persisted.code_session_id,
        "Added client session"
    );
    Ok(persisted)
}

fn log_rejection(err: AddClientError) -> AddClientError {
    if let AddClientError::Validation(errors) = &err {
        warn!(errors = errors.len(), "Add-client request rejected: {}", join_errors(errors));
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, seed_reference_data, setup_database};
    use crate::entities::NewSession;
    use crate::store::SqliteClientStore;
    use chrono::NaiveTime;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_reference_data(&conn).unwrap();
        for (name, start, end) in [("Tokyo Day", 9, 15), ("Tokyo Night", 16, 23)] {
            SqliteClientStore::new(&conn)
                .create_session(&NewSession {
                    name: name.to_string(),
                    start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
                })
                .unwrap();
        }
        conn
    }

    fn request(name: &str, identifier: &str, session: i64) -> AddClientRequest {
        AddClientRequest {
            client: ClientForm {
                name: name.to_string(),
            },
            view_code: ViewCodeForm {
                identifier: identifier.to_string(),
                view: "ACV".to_string(),
                code: "ACC".to_string(),
            },
            session: SessionForm {
                session: Some(session),
                connection_start_date: Some("2024-04-01".to_string()),
                connection_end_date: None,
            },
            trade_types: TradeTypeGrid {
                eq_dma: true,
                fu_disc: true,
                ..Default::default()
            },
        }
    }

    fn snapshot(conn: &Connection) -> Vec<i64> {
        ["client", "client_classifier", "code_session", "trade_type", "events"]
            .iter()
            .map(|table| count_rows(conn, table).unwrap())
            .collect()
    }

    fn fields(err: AddClientError) -> Vec<String> {
        match err {
            AddClientError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_add_client_persists_bundle() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);

        let persisted = add_client(&store, &request("Acme", "AC1", 1)).unwrap();

        assert!(persisted.client_created);
        assert!(persisted.classifier_created);
        assert_eq!(persisted.trade_type_ids.len(), 2);
        let labels: Vec<String> = store
            .trade_types_for(persisted.code_session_id)
            .unwrap()
            .iter()
            .map(|t| t.label())
            .collect();
        assert_eq!(labels, vec!["Equity(DMA)", "Future(DISC)"]);
    }

    #[test]
    fn test_same_client_new_session_reuses_classifier() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let first = add_client(&store, &request("Acme", "AC1", 1)).unwrap();

        let second = add_client(&store, &request("Acme", "AC1", 2)).unwrap();

        assert!(!second.client_created);
        assert!(!second.classifier_created);
        assert_eq!(second.classifier_id, first.classifier_id);
    }

    #[test]
    fn test_identifier_owned_by_other_client_rejected() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        add_client(&store, &request("Acme", "AC1", 1)).unwrap();
        let before = snapshot(&conn);

        let err = add_client(&store, &request("Other Corp", "AC1", 2)).unwrap_err();

        assert!(fields(err).contains(&"identifier".to_string()));
        assert_eq!(snapshot(&conn), before, "Rejected request must not write");
    }

    #[test]
    fn test_existing_classifier_session_pair_rejected() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        add_client(&store, &request("Acme", "AC1", 1)).unwrap();
        let before = snapshot(&conn);

        let err = add_client(&store, &request("Acme", "AC1", 1)).unwrap_err();

        assert_eq!(fields(err), vec!["session"]);
        assert_eq!(snapshot(&conn), before);
    }

    #[test]
    fn test_session_attaches_to_identifier_owner_when_names_repeat() {
        let conn = test_conn();
        conn.execute_batch(
            "INSERT INTO client (name) VALUES ('Acme');
             INSERT INTO client (name) VALUES ('Acme');
             INSERT INTO client_classifier (client_id, identifier, view, code) VALUES (2, 'AC1', 'ACV', 'ACC');",
        )
        .unwrap();
        let store = SqliteClientStore::new(&conn);

        let persisted = add_client(&store, &request("Acme", "AC1", 1)).unwrap();

        assert_eq!(persisted.client_id, 2);
        assert!(!persisted.client_created);
        assert!(!persisted.classifier_created);
        assert_eq!(count_rows(&conn, "client").unwrap(), 2);
        let events = crate::db::get_events_for_entity(&conn, "client", "2").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_known_identifier_with_new_view_code_adds_classifier() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        let first = add_client(&store, &request("Acme", "AC1", 1)).unwrap();

        let mut second = request("Acme", "AC1", 2);
        second.view_code.view = "ACV2".to_string();
        second.view_code.code = "ACC2".to_string();
        let persisted = add_client(&store, &second).unwrap();

        assert!(persisted.classifier_created);
        assert_ne!(persisted.classifier_id, first.classifier_id);
        assert_eq!(persisted.client_id, first.client_id);
        assert_eq!(store.classifiers_with_identifier("AC1").unwrap().len(), 2);
    }

    #[test]
    fn test_known_identifier_reusing_one_half_rejected() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        add_client(&store, &request("Acme", "AC1", 1)).unwrap();
        let before = snapshot(&conn);

        let mut same_view = request("Acme", "AC1", 2);
        same_view.view_code.code = "ACC2".to_string();
        assert_eq!(fields(add_client(&store, &same_view).unwrap_err()), vec!["view"]);

        let mut same_code = request("Acme", "AC1", 2);
        same_code.view_code.view = "ACV2".to_string();
        assert_eq!(fields(add_client(&store, &same_code).unwrap_err()), vec!["code"]);

        assert_eq!(snapshot(&conn), before);
    }

    #[test]
    fn test_view_code_taken_by_other_identifier_rejected() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        add_client(&store, &request("Acme", "AC1", 1)).unwrap();

        let err = add_client(&store, &request("Acme", "AC2", 1)).unwrap_err();

        assert_eq!(fields(err), vec!["view"]);
    }

    #[test]
    fn test_field_errors_block_cross_checks() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);
        add_client(&store, &request("Acme", "AC1", 1)).unwrap();

        // Identifier conflict would also fail, but field errors come first
        let mut bad = request("", "AC1", 99);
        bad.session.connection_end_date = Some("2024-03-01".to_string());
        let err = add_client(&store, &bad).unwrap_err();

        let fields = fields(err);
        assert!(fields.contains(&"name".to_string()));
        assert!(fields.contains(&"session".to_string()));
        assert!(fields.contains(&"connection_end_date".to_string()));
        assert!(!fields.contains(&"identifier".to_string()));
    }

    #[test]
    fn test_field_validation_messages() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);

        let mut long = request(&"x".repeat(31), "AC1", 1);
        long.view_code.code = "  ".to_string();
        long.session.connection_start_date = Some("01/04/2024".to_string());
        long.session.session = None;

        let err = validate_fields(&store, &long).unwrap_err();
        let AddClientError::Validation(errors) = err else {
            panic!("expected validation errors");
        };

        assert_eq!(errors.len(), 4);
        assert!(errors[0].message.contains("at most 30 characters (it has 31)"));
        assert_eq!(errors[1].field, "code");
        assert_eq!(errors[1].message, REQUIRED);
    }

    #[test]
    fn test_missing_reference_product_is_field_error() {
        let conn = test_conn();
        conn.execute("DELETE FROM product WHERE name = 'Spread'", []).unwrap();
        let store = SqliteClientStore::new(&conn);

        let mut req = request("Acme", "AC1", 1);
        req.trade_types.sp_dsa = true;

        assert_eq!(fields(add_client(&store, &req).unwrap_err()), vec!["sp_dsa"]);
        assert_eq!(count_rows(&conn, "client").unwrap(), 0);
    }

    #[test]
    fn test_names_are_trimmed() {
        let conn = test_conn();
        let store = SqliteClientStore::new(&conn);

        let persisted = add_client(&store, &request("  Acme  ", " AC1 ", 1)).unwrap();

        assert_eq!(store.get_client(persisted.client_id).unwrap().unwrap().name, "Acme");
        assert_eq!(store.classifiers_with_identifier("AC1").unwrap().len(), 1);
    }

    #[test]
    fn test_grid_checked_order() {
        let grid = TradeTypeGrid {
            sp_disc: true,
            eq_dsa: true,
            ..Default::default()
        };

        assert_eq!(
            grid.checked(),
            vec![(ProductKind::Equity, HandlingKind::Dsa), (ProductKind::Spread, HandlingKind::Disc)]
        );
    }

    #[test]
    fn test_request_from_json_with_missing_flags() {
        let json = r#"{
            "client": {"name": "Acme"},
            "view_code": {"identifier": "AC1", "view": "ACV", "code": "ACC"},
            "session": {"session": 1},
            "trade_types": {"eq_dma": true}
        }"#;

        let req: AddClientRequest = serde_json::from_str(json).unwrap();
        assert!(req.trade_types.eq_dma);
        assert!(!req.trade_types.fu_dma);
        assert_eq!(req.session.connection_start_date, None);
    }
}
