//! Tests for embed resolution through full builds

use super::helpers::*;
use crate::{error::WeaveError, vector::VectorSet};
use serde_json::json;
use test_log::test;

fn table() -> Vec<(&'static str, Vec<f64>)> {
    vec![
        ("alpha", vec![1.0, 0.0]),
        ("beta", vec![0.0, 1.0]),
        ("gamma", vec![1.0, 1.0]),
        ("a b", vec![2.0, 0.0]),
        ("c d", vec![0.0, 4.0]),
        ("wide", vec![1.0, 0.0, 0.0]),
    ]
}

#[test]
fn test_simple_and_list_patterns() {
    let config = r#"
defaults: { model: stub }
nodes:
  doc:
    fields:
      title: title
      tags: tags
    embed:
      title_vec: { field: title }
      tag_vec: { field: tags }
      tag_seq: { field: tags, aggregate: none }
"#;
    let records = vec![record("d.json", json!({"title": "alpha", "tags": ["alpha", "beta"]}))];
    let graph = build_yaml(config, &records, &stub_registry(table())).unwrap();
    let node = &graph.nodes[0];
    assert_eq!(node.vectors["title_vec"], VectorSet::Single(vec![1.0, 0.0]));
    assert_eq!(node.vectors["tag_vec"], VectorSet::Single(vec![0.5, 0.5]));
    assert_eq!(
        node.vectors["tag_seq"],
        VectorSet::Multi(vec![vec![1.0, 0.0], vec![0.0, 1.0]])
    );
}

#[test]
fn test_chunked_pattern_aggregates_pieces() {
    let config = r#"
nodes:
  doc:
    fields:
      body: body
    embed:
      field: body
      model: stub
      chunking: { method: tokens, max_tokens: 2, overlap: 0 }
      aggregate: max
"#;
    let records = vec![record("d.json", json!({"body": "a b c d"}))];
    let graph = build_yaml(config, &records, &stub_registry(table())).unwrap();
    assert_eq!(
        graph.nodes[0].vectors["default"],
        VectorSet::Single(vec![2.0, 4.0])
    );
}

#[test]
fn test_chunking_a_list_pools_every_item() {
    let config = r#"
nodes:
  doc:
    fields:
      parts: parts
    embed:
      field: parts
      model: stub
      chunking: { max_tokens: 2 }
      aggregate: none
"#;
    let records = vec![record("d.json", json!({"parts": ["a b", "c d alpha"]}))];
    let graph = build_yaml(config, &records, &stub_registry(table())).unwrap();
    assert_eq!(
        graph.nodes[0].vectors["default"],
        VectorSet::Multi(vec![vec![2.0, 0.0], vec![0.0, 4.0], vec![1.0, 0.0]])
    );
}

#[test]
fn test_combine_blends_by_weight() {
    let config = r#"
defaults: { model: stub }
nodes:
  doc:
    fields:
      title: title
      body: body
    embed:
      title: { field: title }
      body: { field: body }
      blend:
        combine:
          - { ref: title, weight: 1 }
          - { ref: body, weight: 3 }
"#;
    let records = vec![record("d.json", json!({"title": "alpha", "body": "beta"}))];
    let graph = build_yaml(config, &records, &stub_registry(table())).unwrap();
    assert_eq!(
        graph.nodes[0].vectors["blend"],
        VectorSet::Single(vec![0.25, 0.75])
    );
}

const CROSS_TYPE: &str = r#"
defaults: { model: stub }
nodes:
  conversation:
    fields:
      title: title
    embed:
      title: { field: title }
      summary:
        combine:
          - { ref: title, weight: 1 }
          - { ref: turn.default, weight: 1, aggregate: mean }
  turn:
    from: turns
    fields:
      text: content
    embed:
      field: text
"#;

#[test]
fn test_cross_type_combine_pools_record_nodes() {
    let records = vec![record(
        "c.json",
        json!({"title": "gamma", "turns": [{"content": "alpha"}, {"content": "beta"}]}),
    )];
    let graph = build_yaml(CROSS_TYPE, &records, &stub_registry(table())).unwrap();
    let conversation = graph.node("c.json:conversation:0").unwrap();
    // mean(turns) = (0.5, 0.5); blended equally with (1, 1)
    assert_eq!(
        conversation.vectors["summary"],
        VectorSet::Single(vec![0.75, 0.75])
    );
}

#[test]
fn test_cross_type_ref_without_nodes_is_extraction_error() {
    let records = vec![record("c.json", json!({"title": "gamma", "turns": []}))];
    match build_yaml(CROSS_TYPE, &records, &stub_registry(table())) {
        Err(WeaveError::Extraction { path, record, .. }) => {
            assert_eq!(path, "nodes.conversation.embed.summary.combine.1");
            assert_eq!(record, "c.json");
        }
        other => panic!("expected extraction error, got {other:?}"),
    }
}

#[test]
fn test_uncollapsed_ref_needs_aggregate() {
    let config = r#"
defaults: { model: stub }
nodes:
  doc:
    fields:
      tags: tags
    embed:
      seq: { field: tags, aggregate: none }
      blend:
        combine:
          - { ref: seq, weight: 1 }
"#;
    let err = build_yaml(config, &[], &stub_registry(table())).unwrap_err();
    assert_eq!(err.kind(), "config");

    let fixed = config.replace("{ ref: seq, weight: 1 }", "{ ref: seq, weight: 1, aggregate: first }");
    let records = vec![record("d.json", json!({"tags": ["beta", "alpha"]}))];
    let graph = build_yaml(&fixed, &records, &stub_registry(table())).unwrap();
    assert_eq!(graph.nodes[0].vectors["blend"], VectorSet::Single(vec![0.0, 1.0]));
}

#[test]
fn test_embed_cycle_fails_before_records() {
    let config = r#"
nodes:
  doc:
    embed:
      a: { combine: [{ ref: b }] }
      b: { combine: [{ ref: a }] }
"#;
    // The record would fail extraction if it were ever touched.
    let records = vec![record("d.json", json!(null))];
    let err = build_yaml(config, &records, &stub_registry(vec![])).unwrap_err();
    assert_eq!(err.kind(), "config_reference");
}

#[test]
fn test_dimension_mismatch_is_shape_error() {
    let config = r#"
nodes:
  doc:
    fields:
      tags: tags
    embed: { field: tags, model: stub }
"#;
    let records = vec![record("d.json", json!({"tags": ["alpha", "wide"]}))];
    let err = build_yaml(config, &records, &stub_registry(table())).unwrap_err();
    assert_eq!(err.kind(), "shape");
}

#[test]
fn test_empty_list_yields_empty_set() {
    let config = r#"
nodes:
  doc:
    fields:
      tags: tags
    embed: { field: tags, model: stub }
"#;
    let records = vec![record("d.json", json!({"tags": []}))];
    let graph = build_yaml(config, &records, &stub_registry(table())).unwrap();
    assert_eq!(graph.nodes[0].vectors["default"], VectorSet::Multi(vec![]));
}

#[test]
fn test_unknown_model_fails_before_records() {
    init_logging();
    let config = r#"
nodes:
  doc:
    embed: { field: title, model: openai }
"#;
    match build_yaml(config, &[], &stub_registry(vec![])) {
        Err(WeaveError::Provider { kind, name, .. }) => {
            assert_eq!(kind, "embedding");
            assert_eq!(name, "openai");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}
