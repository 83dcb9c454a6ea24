use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Zoho ids exceed 2^53, so they are only ever handled as strings.
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tasklist {
    pub id: String,
    pub project_id: String,
    pub name: String,
}
