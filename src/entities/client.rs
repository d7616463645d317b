// Client identity and its classifiers (view code / FIX code pairs)

use serde::{Deserialize, Serialize};

pub const CLIENT_NAME_MAX_LEN: usize = 30;
pub const CLASSIFIER_FIELD_MAX_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
}

/// A client's identifying triple.
///
/// `identifier` is the key the limit store uses for the same client;
/// `view` and `code` are the view code and the FIX code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientClassifier {
    pub id: i64,
    pub client_id: i64,
    pub identifier: String,
    pub view: String,
    pub code: String,
}

impl ClientClassifier {
    /// True when `view` and `code` match this classifier exactly.
    pub fn same_view_code(&self, view: &str, code: &str) -> bool {
        self.view == view && self.code == code
    }
}
