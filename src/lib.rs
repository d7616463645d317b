// FIX Client Back-Office - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod db;
pub mod error;
pub mod config;
pub mod entities;
pub mod store;
pub mod rows;       // Row Builder
pub mod table;      // Column Table
pub mod export;     // Spreadsheet export
pub mod add_client; // Add-Client Workflow
pub mod lookup;     // Limit-store lookups
pub mod import;

// Re-export commonly used types
pub use db::{
    Event, open_primary, open_limit_read_only, setup_database, setup_limit_database,
    seed_reference_data, insert_event, get_events_for_entity,
};
pub use error::{ExportError, StoreError, StoreResult};
pub use config::AppConfig;
pub use store::{ClientStore, LimitStore, LookupKey, SqliteClientStore, SqliteLimitStore};
pub use rows::{build_client_rows, client_detail, ClientDetail, ClientRow};
pub use table::{client_table, ClientTable, COLUMNS};
pub use export::{create_client_table, workbook_bytes, CLIENT_TABLE_FILE_NAME};
pub use add_client::{add_client, AddClientError, AddClientRequest, FieldError};
pub use lookup::{lookup_identity, lookup_trade_type, IdentityLookup, TradeTypeLookup};
pub use import::{import_clients, load_csv, ImportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
