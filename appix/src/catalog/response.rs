//! Catalog response body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Link relation holding the published artifact location.
pub const UPLOAD_RELATION: &str = "upload";

/// Body returned by the catalog upload endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResponse {
    /// Human-readable messages.
    #[serde(default)]
    pub messages: Vec<String>,
    /// Relation name to URI.
    #[serde(default)]
    pub links: HashMap<String, String>,
}

impl CatalogResponse {
    /// Returns the URI of the `upload` relation, if present and non-empty.
    #[must_use]
    pub fn upload_link(&self) -> Option<&str> {
        self.links
            .get(UPLOAD_RELATION)
            .map(String::as_str)
            .filter(|uri| !uri.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_link() {
        let response: CatalogResponse = serde_json::from_str(
            r#"{ "messages": [ "success" ], "links": { "upload": "http://localhost:3001" } }"#,
        )
        .unwrap();

        assert_eq!(response.messages, vec!["success".to_string()]);
        assert_eq!(response.upload_link(), Some("http://localhost:3001"));
    }

    #[test]
    fn test_other_relations_are_not_upload() {
        let response: CatalogResponse = serde_json::from_str(
            r#"{ "messages": [ "success" ], "links": { "acc:query": "http://localhost:3001" } }"#,
        )
        .unwrap();

        assert_eq!(response.upload_link(), None);
    }

    #[test]
    fn test_empty_body_fields_default() {
        let response: CatalogResponse = serde_json::from_str("{}").unwrap();
        assert!(response.messages.is_empty());
        assert_eq!(response.upload_link(), None);
    }

    #[test]
    fn test_blank_upload_link_ignored() {
        let response: CatalogResponse =
            serde_json::from_str(r#"{ "links": { "upload": " " } }"#).unwrap();
        assert_eq!(response.upload_link(), None);
    }
}
