//! Node extraction: turning one source record into typed nodes with evaluated fields.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    context::ResolutionContext,
    error::WeaveError,
    graph::ResolvedNode,
    pipeline::{evaluate, select_items, Scope},
    record::SourceRecord,
    vector::VectorSet,
};

/// A node extracted from a record whose embeds may still be pending.
#[derive(Debug, Clone)]
pub struct DraftNode<'r> {
    pub item: &'r Value,
    pub fields: BTreeMap<String, Value>,
    pub vectors: BTreeMap<String, VectorSet>,
}

/// Every node one record produces, grouped by type. This is the scope within which embed refs
/// (including cross-type ones) resolve.
#[derive(Debug, Clone)]
pub struct RecordNodes<'r> {
    pub record: &'r SourceRecord,
    pub position: usize,
    pub by_type: BTreeMap<String, Vec<DraftNode<'r>>>,
}

impl<'r> RecordNodes<'r> {
    pub fn source_key(&self) -> String {
        self.record.meta.source_key()
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach ids and provenance. Types are emitted in declaration order, nodes in item order.
    pub fn into_resolved(self) -> Vec<ResolvedNode> {
        let record = self.record;
        let meta = &record.meta;
        let position = self.position;
        self.by_type
            .into_iter()
            .flat_map(move |(node_type, drafts)| {
                drafts.into_iter().enumerate().map(move |(index, draft)| ResolvedNode {
                    id: ResolvedNode::make_id(meta, &node_type, index),
                    node_type: node_type.clone(),
                    fields: draft.fields,
                    vectors: draft.vectors,
                    meta: meta.clone(),
                    record: position,
                    index,
                    community: None,
                })
            })
            .collect()
    }
}

/// Extract every declared node type from `record`. A `from` path that is absent on the record
/// yields no nodes of that type; a declared field missing from an item is an extraction error
/// unless the field carries a default.
pub fn extract_nodes<'r>(
    ctx: &ResolutionContext<'_>,
    record: &'r SourceRecord,
    position: usize,
) -> Result<RecordNodes<'r>, WeaveError> {
    let source_key = record.meta.source_key();
    let mut by_type = BTreeMap::new();
    for (node_type, spec) in ctx.config.nodes.iter() {
        let path = format!("nodes.{node_type}");
        let items = select_items(&record.data, &spec.from, &spec.filter, &path)?;
        if items.is_empty() {
            tracing::debug!(
                "[extract_nodes] {}: no '{}' items at '{}'",
                source_key,
                node_type,
                spec.from
            );
        }
        let mut drafts = Vec::with_capacity(items.len());
        for item in items {
            let mut fields = BTreeMap::new();
            for (name, pipeline) in spec.fields.iter() {
                let field_path = format!("{path}.fields.{name}");
                let scope = Scope {
                    path: &field_path,
                    record: &source_key,
                };
                fields.insert(name.clone(), evaluate(pipeline, item, scope)?);
            }
            drafts.push(DraftNode {
                item,
                fields,
                vectors: BTreeMap::new(),
            });
        }
        by_type.insert(node_type.clone(), drafts);
    }
    Ok(RecordNodes {
        record,
        position,
        by_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GraphConfig, providers::ProviderRegistry, record::Provenance,
    };
    use serde_json::json;

    const CONFIG: &str = r#"
nodes:
  conversation:
    fields:
      title: title
  turn:
    from: turns
    where: { role: user }
    fields:
      text: content
      tags: { from: tags, default: [] }
"#;

    #[test]
    fn test_extracts_filtered_items_with_ids() {
        let config = GraphConfig::from_yaml_str(CONFIG).unwrap();
        let registry = ProviderRegistry::create();
        let ctx = ResolutionContext::new(&config, &registry).unwrap();
        let record = SourceRecord::new(
            json!({
                "title": "Planning",
                "turns": [
                    {"role": "user", "content": "first", "tags": ["a"]},
                    {"role": "assistant", "content": "reply"},
                    {"role": "user", "content": "second"}
                ]
            }),
            Provenance::new("chat.json"),
        );
        let extracted = extract_nodes(&ctx, &record, 0).unwrap();
        assert_eq!(extracted.len(), 3);
        let nodes = extracted.into_resolved();
        let ids = nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["chat.json:conversation:0", "chat.json:turn:0", "chat.json:turn:1"]
        );
        assert_eq!(nodes[2].fields["text"], json!("second"));
        assert_eq!(nodes[2].fields["tags"], json!([]));
    }

    #[test]
    fn test_missing_field_names_path_and_record() {
        let config = GraphConfig::from_yaml_str(CONFIG).unwrap();
        let registry = ProviderRegistry::create();
        let ctx = ResolutionContext::new(&config, &registry).unwrap();
        let record = SourceRecord::new(
            json!({"turns": [{"role": "user", "content": "x"}]}),
            Provenance::new("broken.json"),
        );
        match extract_nodes(&ctx, &record, 0) {
            Err(WeaveError::Extraction { path, record, .. }) => {
                assert_eq!(path, "nodes.conversation.fields.title");
                assert_eq!(record, "broken.json");
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }
}
