// CSV import of add-client submissions
//
// Each CSV line is one add-client request (sessions referenced by name) and
// goes through the same validation as the web form. A bad line is reported
// and skipped; the rest of the file still loads.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::{info, warn};

use crate::add_client::{add_client, AddClientRequest, ClientForm, SessionForm, TradeTypeGrid, ViewCodeForm};
use crate::store::ClientStore;

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub name: String,
    pub identifier: String,
    pub view: String,
    pub code: String,
    pub session: String,
    #[serde(default)]
    pub connection_start_date: Option<String>,
    #[serde(default)]
    pub connection_end_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub eq_disc: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub eq_dma: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub eq_dsa: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub fu_disc: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub fu_dma: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub fu_dsa: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub op_disc: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub op_dma: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub op_dsa: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub sp_disc: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub sp_dma: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub sp_dsa: bool,
}

/// Spreadsheet-style flags: "1", "true", "x", "y" and "yes" are set; blank is unset.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "n" | "no" => Ok(false),
        "1" | "true" | "x" | "y" | "yes" => Ok(true),
        other => Err(serde::de::Error::custom(format!("invalid flag value: {}", other))),
    }
}

impl ImportRecord {
    fn into_request(self, session_id: i64) -> AddClientRequest {
        AddClientRequest {
            client: ClientForm { name: self.name },
            view_code: ViewCodeForm {
                identifier: self.identifier,
                view: self.view,
                code: self.code,
            },
            session: SessionForm {
                session: Some(session_id),
                connection_start_date: self.connection_start_date,
                connection_end_date: self.connection_end_date,
            },
            trade_types: TradeTypeGrid {
                eq_disc: self.eq_disc,
                eq_dma: self.eq_dma,
                eq_dsa: self.eq_dsa,
                fu_disc: self.fu_disc,
                fu_dma: self.fu_dma,
                fu_dsa: self.fu_dsa,
                op_disc: self.op_disc,
                op_dma: self.op_dma,
                op_dsa: self.op_dsa,
                sp_disc: self.sp_disc,
                sp_dma: self.sp_dma,
                sp_dsa: self.sp_dsa,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub added: usize,
    /// (CSV line number, reason)
    pub rejected: Vec<(u64, String)>,
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<(u64, ImportRecord)>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;

    let mut records = Vec::new();
    for (idx, result) in rdr.deserialize().enumerate() {
        // header is line 1
        let line = idx as u64 + 2;
        let record: ImportRecord =
            result.with_context(|| format!("Failed to deserialize client record on line {}", line))?;
        records.push((line, record));
    }

    Ok(records)
}

/// Run every record through the add-client workflow.
pub fn import_clients(store: &dyn ClientStore, records: Vec<(u64, ImportRecord)>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (line, record) in records {
        let Some(session) = store.find_session_by_name(record.session.trim())? else {
            warn!(line, session = %record.session, "Unknown session");
            summary
                .rejected
                .push((line, format!("Unknown session: {}", record.session)));
            continue;
        };

        match add_client(store, &record.into_request(session.id)) {
            Ok(_) => summary.added += 1,
            Err(e) => {
                warn!(line, error = %e, "Rejected client record");
                summary.rejected.push((line, e.to_string()));
            }
        }
    }

    info!(added = summary.added, rejected = summary.rejected.len(), "Client import finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, seed_reference_data, setup_database};
    use crate::entities::NewSession;
    use crate::store::SqliteClientStore;
    use chrono::NaiveTime;
    use rusqlite::Connection;
    use std::io::Write;

    const CSV: &str = "\
name,identifier,view,code,session,connection_start_date,connection_end_date,eq_disc,eq_dma,eq_dsa,fu_disc,fu_dma,fu_dsa,op_disc,op_dma,op_dsa,sp_disc,sp_dma,sp_dsa
Acme,AC1,ACV,ACC,Tokyo Day,2024-04-01,,,1,,x,,,,,,,,
Acme,AC1,ACV,ACC,Tokyo Day,2024-04-01,,,1,,,,,,,,,,
Beta,AC1,BTV,BTC,Tokyo Day,,,,,,,,,,,,,,
Gamma,GM1,GMV,GMC,London,,,,,,,,,,,,,,
";

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_csv_flags() {
        let file = write_csv(CSV);
        let records = load_csv(file.path()).unwrap();

        assert_eq!(records.len(), 4);
        let (_, first) = &records[0];
        assert!(first.eq_dma && first.fu_disc);
        assert!(!first.eq_disc);
        assert_eq!(first.connection_start_date.as_deref(), Some("2024-04-01"));
        assert_eq!(first.connection_end_date, None);
    }

    #[test]
    fn test_import_reports_rejected_lines() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_reference_data(&conn).unwrap();
        let store = SqliteClientStore::new(&conn);
        store
            .create_session(&NewSession {
                name: "Tokyo Day".to_string(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            })
            .unwrap();

        let file = write_csv(CSV);
        let summary = import_clients(&store, load_csv(file.path()).unwrap()).unwrap();

        // duplicate pair, foreign identifier, unknown session
        assert_eq!(summary.added, 1);
        assert_eq!(summary.rejected.len(), 3);
        assert!(summary.rejected[2].1.contains("Unknown session"));
        assert_eq!(count_rows(&conn, "trade_type").unwrap(), 2);
    }

    #[test]
    fn test_invalid_flag_fails_load() {
        let file = write_csv("name,identifier,view,code,session,eq_dma\nAcme,AC1,ACV,ACC,Tokyo Day,maybe\n");

        assert!(load_csv(file.path()).is_err());
    }
}
