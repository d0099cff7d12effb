//! Parameter types for SQL gateway tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunQueryParams {
    #[schemars(description = "A single read-only SELECT statement. A trailing ';' is allowed; anything after it is not.")]
    pub sql: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TableParams {
    #[schemars(description = "Exact, case-sensitive table name as listed by list_tables")]
    pub table: String,
}
