//! OpenAPI 3.0 document synthesis from the route table.
//!
//! Route paths in this crate use the Express-style `:param` convention
//! (chosen so the Router stays adapter-agnostic); this module is the one
//! place that convention is translated, into the OpenAPI/JSON-Schema
//! `{param}` form.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use super::Route;

/// Rewrite `:param` path segments to `{param}`, leaving everything else
/// (including a literal path with no params) untouched.
pub fn translate_path_params(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Document-level metadata supplied by the caller (title/version are not
/// derivable from the route table itself).
#[derive(Debug, Clone)]
pub struct OpenApiOptions {
    pub title: String,
    pub version: String,
}

/// Build a minimal OpenAPI 3.0 document over `routes`: one path item per
/// distinct translated path, one operation per method, `security:
/// [{bearerAuth: []}]` attached iff the route was registered with
/// `auth: true`, and a deduplicated top-level `tags` array.
pub fn generate_openapi_doc(routes: &[Route], options: &OpenApiOptions) -> Value {
    let mut paths = serde_json::Map::new();
    let mut all_tags: BTreeSet<String> = BTreeSet::new();

    for route in routes {
        let translated = translate_path_params(&route.path);
        let path_item = paths.entry(translated).or_insert_with(|| json!({})).as_object_mut().unwrap();

        let mut operation = json!({
            "summary": route.options.summary.clone().unwrap_or_default(),
            "tags": route.options.tags.clone(),
            "responses": { "200": { "description": "successful response" } },
        });
        if route.options.auth {
            operation["security"] = json!([{ "bearerAuth": [] }]);
        }
        for tag in &route.options.tags {
            all_tags.insert(tag.clone());
        }

        path_item.insert(route.method.as_str().to_ascii_lowercase(), operation);
    }

    json!({
        "openapi": "3.0.0",
        "info": { "title": options.title, "version": options.version },
        "paths": Value::Object(paths),
        "tags": all_tags.into_iter().map(|t| json!({ "name": t })).collect::<Vec<_>>(),
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" }
            }
        },
    })
}
