use rusqlite::{params, Connection, OptionalExtension};

use super::{LimitStore, LookupKey};
use crate::entities::{ClientInfo, ClientLimit, ClientTrade, ClientView};
use crate::error::StoreResult;

/// Limit store over a borrowed connection. Only SELECTs are issued.
pub struct SqliteLimitStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteLimitStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl LimitStore for SqliteLimitStore<'_> {
    fn find_identity(&self, key: LookupKey, value: &str) -> StoreResult<Option<ClientInfo>> {
        let info = self
            .conn
            .query_row(
                &format!(
                    "SELECT client_id, view, code FROM client_info WHERE {} = ?1 LIMIT 1",
                    key.column()
                ),
                params![value],
                |row| {
                    Ok(ClientInfo {
                        client_id: row.get(0)?,
                        view: row.get(1)?,
                        code: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    fn client_trade(&self, client_id: &str) -> StoreResult<Option<ClientTrade>> {
        let trade = self
            .conn
            .query_row(
                "SELECT client_id, is_disc, is_dma, is_dsa, is_fu_disc, is_fu_dma, is_fu_dsa
                 FROM client_trade WHERE client_id = ?1 LIMIT 1",
                params![client_id],
                |row| {
                    Ok(ClientTrade {
                        client_id: row.get(0)?,
                        is_disc: row.get(1)?,
                        is_dma: row.get(2)?,
                        is_dsa: row.get(3)?,
                        is_fu_disc: row.get(4)?,
                        is_fu_dma: row.get(5)?,
                        is_fu_dsa: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(trade)
    }

    fn client_limits(&self, client_id: &str) -> StoreResult<Vec<ClientLimit>> {
        let mut stmt = self.conn.prepare(
            "SELECT client_id, product, handlinst, limit_type, amount
             FROM client_limit WHERE client_id = ?1 ORDER BY rowid",
        )?;
        let limits = stmt
            .query_map(params![client_id], |row| {
                Ok(ClientLimit {
                    client_id: row.get(0)?,
                    product: row.get(1)?,
                    handlinst: row.get(2)?,
                    limit_type: row.get(3)?,
                    amount: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(limits)
    }

    fn client_view(&self, client_id: &str) -> StoreResult<Vec<ClientView>> {
        let mut stmt = self.conn.prepare(
            "SELECT client_id, product, handlinst, limit_type, amount, currency, updated_at
             FROM client_view WHERE client_id = ?1 ORDER BY product, handlinst, limit_type",
        )?;
        let rows = stmt
            .query_map(params![client_id], |row| {
                Ok(ClientView {
                    client_id: row.get(0)?,
                    product: row.get(1)?,
                    handlinst: row.get(2)?,
                    limit_type: row.get(3)?,
                    amount: row.get(4)?,
                    currency: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_limit_database;

    fn limit_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_limit_database(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO client_info (client_id, view, code) VALUES ('AC1', 'ACV', 'ACC');
             INSERT INTO client_trade (client_id, is_disc, is_dma) VALUES ('AC1', 1, 1);
             INSERT INTO client_limit VALUES ('AC1', 'EQ', 'DMA', 'DAILY', 1000000.0);
             INSERT INTO client_view VALUES ('AC1', 'EQ', 'DMA', 'DAILY', 1000000.0, 'JPY', NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_find_identity_by_each_key() {
        let conn = limit_conn();
        let store = SqliteLimitStore::new(&conn);

        for (key, value) in [
            (LookupKey::ClientId, "AC1"),
            (LookupKey::View, "ACV"),
            (LookupKey::Code, "ACC"),
        ] {
            let info = store.find_identity(key, value).unwrap().unwrap();
            assert_eq!(info.client_id, "AC1");
        }

        assert!(store.find_identity(LookupKey::View, "NOPE").unwrap().is_none());
    }

    #[test]
    fn test_client_trade_flags() {
        let conn = limit_conn();
        let store = SqliteLimitStore::new(&conn);

        let trade = store.client_trade("AC1").unwrap().unwrap();
        assert!(trade.is_disc && trade.is_dma && !trade.is_dsa);
        assert!(store.client_trade("ZZ9").unwrap().is_none());
    }

    #[test]
    fn test_limits_and_view_rows() {
        let conn = limit_conn();
        let store = SqliteLimitStore::new(&conn);

        assert_eq!(store.client_limits("AC1").unwrap().len(), 1);
        let view = store.client_view("AC1").unwrap();
        assert_eq!(view[0].currency.as_deref(), Some("JPY"));
        assert!(store.client_view("ZZ9").unwrap().is_empty());
    }
}
