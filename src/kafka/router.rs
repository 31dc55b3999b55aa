//! Dynamic-topic routing.
//!
//! A destination may carry a topic template with `{schema}` and
//! `{table}` placeholders. Each record resolves its own topic name from
//! the template; records that cannot resolve fall back to the static
//! topic. Grouping is stable: records are visited in source order and
//! groups appear in first-seen order.

use std::collections::HashMap;

use tracing::debug;

use crate::batch::RowChangeRecord;
use crate::config::Destination;

const SCHEMA_PLACEHOLDER: &str = "{schema}";
const TABLE_PLACEHOLDER: &str = "{table}";

/// Resolves one record's topic name from a template, sanitizing the
/// result. Falls back to the static topic when the template has no
/// placeholders or the record has nothing to substitute.
pub fn resolve_topic(expression: &str, schema: &str, table: &str, static_topic: &str) -> String {
    let has_placeholder =
        expression.contains(SCHEMA_PLACEHOLDER) || expression.contains(TABLE_PLACEHOLDER);
    if !has_placeholder || (schema.is_empty() && table.is_empty()) {
        debug!(
            expression,
            schema, table, "dynamic topic did not resolve, using static topic"
        );
        return static_topic.to_string();
    }

    let name = expression
        .replace(SCHEMA_PLACEHOLDER, schema)
        .replace(TABLE_PLACEHOLDER, table);
    sanitize_topic(&name)
}

/// Replaces characters illegal in a topic name (notably `.`) with `_`.
fn sanitize_topic(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Groups records by destination topic.
///
/// Without a dynamic-topic expression this is the identity grouping onto
/// the static topic. Every record lands in exactly one group; relative
/// order within a group mirrors the source batch.
pub fn route(
    records: Vec<RowChangeRecord>,
    destination: &Destination,
) -> Vec<(String, Vec<RowChangeRecord>)> {
    let expression = match destination
        .dynamic_topic_expression
        .as_deref()
        .filter(|e| !e.is_empty())
    {
        None => return vec![(destination.topic.clone(), records)],
        Some(expression) => expression,
    };

    let mut groups: Vec<(String, Vec<RowChangeRecord>)> = Vec::new();
    let mut index_by_topic: HashMap<String, usize> = HashMap::new();

    for record in records {
        let topic = resolve_topic(expression, &record.schema, &record.table, &destination.topic);
        match index_by_topic.get(&topic) {
            Some(&index) => groups[index].1.push(record),
            None => {
                index_by_topic.insert(topic.clone(), groups.len());
                groups.push((topic, vec![record]));
            }
        }
    }

    groups
}
