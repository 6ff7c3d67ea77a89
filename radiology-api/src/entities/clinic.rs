use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Columns of a clinic row; `id` may be omitted and is taken from the path
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct StoreRowRequest(#[schema(value_type = Object)] pub Map<String, Value>);

/// A stored clinic row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredRowResponse {
    pub table: String,
    #[schema(value_type = Object)]
    pub row: Map<String, Value>,
}
