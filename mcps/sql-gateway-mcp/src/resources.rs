//! Schema resources
//!
//! The schema is readable as MCP resources as well as through tools:
//! `schema://tables` holds every table, `schema://table/<name>` one table
//! with its DDL. Both are JSON, identical to the matching tool payloads.

use mcp_common::{McpError, McpResult, ResultExt};
use rmcp::model::{AnnotateAble, RawResource, ReadResourceResult, Resource, ResourceContents};

use crate::gateway::Gateway;
use crate::types::GatewayError;

pub const TABLES_URI: &str = "schema://tables";
pub const TABLE_URI_PREFIX: &str = "schema://table/";

const JSON_MIME_TYPE: &str = "application/json";

/// A resource the server knows how to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaResource {
    Tables,
    Table(String),
}

impl SchemaResource {
    pub fn parse(uri: &str) -> Option<Self> {
        if uri == TABLES_URI {
            return Some(SchemaResource::Tables);
        }
        match uri.strip_prefix(TABLE_URI_PREFIX) {
            Some(name) if !name.is_empty() => Some(SchemaResource::Table(name.to_string())),
            _ => None,
        }
    }

    pub fn uri(&self) -> String {
        match self {
            SchemaResource::Tables => TABLES_URI.to_string(),
            SchemaResource::Table(name) => format!("{}{}", TABLE_URI_PREFIX, name),
        }
    }

    fn describe(&self) -> Resource {
        let (name, description) = match self {
            SchemaResource::Tables => (
                "tables".to_string(),
                "Every user table with its columns".to_string(),
            ),
            SchemaResource::Table(table) => {
                (table.clone(), format!("Columns and DDL of table '{}'", table))
            }
        };
        let mut resource = RawResource::new(self.uri(), name);
        resource.description = Some(description);
        resource.mime_type = Some(JSON_MIME_TYPE.to_string());
        resource.no_annotation()
    }
}

/// The tables resource followed by one resource per table
pub async fn list(gateway: &Gateway) -> McpResult<Vec<Resource>> {
    let tables = gateway.list_tables().await.map_err(resource_error)?;

    let mut resources = Vec::with_capacity(tables.len() + 1);
    resources.push(SchemaResource::Tables.describe());
    resources.extend(
        tables
            .iter()
            .map(|t| SchemaResource::Table(t.name().to_string()).describe()),
    );
    Ok(resources)
}

pub async fn read(gateway: &Gateway, uri: &str) -> McpResult<ReadResourceResult> {
    let resource = SchemaResource::parse(uri)
        .ok_or_else(|| McpError::resource_not_found(format!("Unknown resource '{}'", uri), None))?;

    let body = match &resource {
        SchemaResource::Tables => {
            let schema = gateway.get_tables_schema().await.map_err(resource_error)?;
            serde_json::to_string_pretty(&schema).to_mcp_err()?
        }
        SchemaResource::Table(name) => {
            let table = gateway.get_table_schema(name).await.map_err(resource_error)?;
            serde_json::to_string_pretty(&table).to_mcp_err()?
        }
    };

    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(body, uri)],
    })
}

/// Protocol error for a failed resource read; the payload rides along as data
fn resource_error(err: GatewayError) -> McpError {
    let payload = serde_json::to_value(err.to_payload()).ok();
    match &err {
        GatewayError::NotFound(_) => McpError::resource_not_found(err.to_string(), payload),
        GatewayError::Internal(detail) => {
            tracing::error!(error = %detail, "Resource read failed");
            McpError::internal_error(err.to_payload().message, payload)
        }
        _ => McpError::internal_error(err.to_string(), payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uris() {
        assert_eq!(SchemaResource::parse("schema://tables"), Some(SchemaResource::Tables));
        assert_eq!(
            SchemaResource::parse("schema://table/Artist"),
            Some(SchemaResource::Table("Artist".to_string()))
        );
        assert_eq!(
            SchemaResource::parse("schema://table/Odd/Name"),
            Some(SchemaResource::Table("Odd/Name".to_string()))
        );
        assert_eq!(SchemaResource::parse("schema://table/"), None);
        assert_eq!(SchemaResource::parse("schema://chinook/tables"), None);
        assert_eq!(SchemaResource::parse("file:///etc/passwd"), None);
    }

    #[test]
    fn test_uri_matches_parse() {
        let resource = SchemaResource::Table("Invoice Line".to_string());
        assert_eq!(resource.uri(), "schema://table/Invoice Line");
        assert_eq!(SchemaResource::parse(&resource.uri()), Some(resource));
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let err = resource_error(GatewayError::NotFound("Nope".to_string()));
        assert_eq!(err.code, McpError::resource_not_found("", None).code);
        assert_eq!(err.data.unwrap()["reason"], "NotFound");
    }

    #[test]
    fn test_internal_detail_stays_in_logs() {
        let err = resource_error(GatewayError::Internal("disk I/O error".to_string()));
        assert!(!err.message.contains("disk"));
    }
}
