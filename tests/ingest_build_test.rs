use serde_json::{json, Value};
use std::fs;
use test_log::test;

use weave_core::{
    config::GraphConfig,
    engine,
    export::{self, Format},
    ingest::read_sources,
    providers::ProviderRegistry,
};

mod common;
use common::*;

const CONFIG_YAML: &str = r#"
schema: { name: notes }
defaults:
  model: hashing
  chunking: { method: sentences, max_tokens: 32, overlap: 0 }
nodes:
  note:
    fields:
      content: content
    embed:
      field: content
      chunking: {}
links:
  related:
    between: [note, note]
    method: cosine
    min: 0.3
network:
  community: components
"#;

const CONFIG_TOML: &str = r#"
[schema]
name = "tasks"

[nodes.task]
from = "."

[nodes.task.fields]
owner = "owner"
labels = "labels"

[links.same_owner]
between = ["task", "task"]
method = "exact"
field = "owner"

[links.shared_labels]
between = ["task", "task"]
method = "overlap"
field = "labels"
"#;

#[test]
fn yaml_config_over_text_sources() {
    init_logging();
    let (temp_dir, sources) = write_sources(&[
        ("a.md", "Rust ownership keeps memory safe. Borrowing rules are checked."),
        ("b.txt", "Ownership and borrowing in Rust keep memory safe."),
        ("nested/c.md", "Sourdough needs a long cold proof."),
        (".hidden/d.md", "Never read."),
        ("ignored.csv", "a,b"),
    ]);
    let config_path = temp_dir.path().join("weave.yaml");
    fs::write(&config_path, CONFIG_YAML).unwrap();

    let config = GraphConfig::from_path(&config_path).unwrap();
    let records = read_sources(&[&sources]).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[0].meta.source_path.ends_with("a.md"));
    assert!(records[2].meta.source_path.ends_with("c.md"));
    assert!(records.iter().all(|r| r.meta.modified.is_some() && r.meta.hash.len() == 64));

    let graph = engine::build(&config, &records, &ProviderRegistry::create()).unwrap();
    assert_eq!(graph.nodes.len(), 3);
    let related = graph.edges_of_link("related").collect::<Vec<_>>();
    assert_eq!(related.len(), 2);
    assert!(related.iter().all(|e| !e.source.ends_with("c.md:note:0")));
    assert_eq!(graph.nodes[0].community, graph.nodes[1].community);
    assert_ne!(graph.nodes[0].community, graph.nodes[2].community);

    let out_path = temp_dir.path().join("graph.json");
    export::write(&graph, Format::Json, fs::File::create(&out_path).unwrap()).unwrap();
    let written: Value = serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(written["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(written["edges"][0]["method"], json!("cosine"));
}

#[test]
fn toml_config_over_jsonl_and_yaml_sources() {
    let (temp_dir, sources) = write_sources(&[
        (
            "tasks.jsonl",
            "{\"owner\": \"ana\", \"labels\": [\"db\", \"perf\"]}\n{\"owner\": \"bo\", \"labels\": [\"perf\"]}\n",
        ),
        ("more.yaml", "owner: ana\nlabels: [ui]\n---\nowner: cy\nlabels: []\n"),
    ]);
    let config_path = temp_dir.path().join("weave.toml");
    fs::write(&config_path, CONFIG_TOML).unwrap();

    let config = GraphConfig::from_path(&config_path).unwrap();
    let records = read_sources(&[&sources]).unwrap();
    let keys = records
        .iter()
        .map(|r| {
            let key = r.meta.source_key();
            key[key.rfind('/').map(|i| i + 1).unwrap_or(0)..].to_string()
        })
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["more.yaml#0", "more.yaml#1", "tasks.jsonl#0", "tasks.jsonl#1"]);
    assert_eq!(records[3].meta.line, Some(2));

    let graph = engine::build(&config, &records, &ProviderRegistry::create()).unwrap();
    assert_eq!(graph.nodes.len(), 4);
    // ana (yaml #0) and ana (jsonl #0)
    assert_eq!(graph.edges_of_link("same_owner").count(), 2);
    // {db, perf} and {perf}
    let overlap = graph.edges_of_link("shared_labels").collect::<Vec<_>>();
    assert_eq!(overlap.len(), 2);
    assert!(overlap.iter().all(|e| e.weight == 1.0));

    let edgelist = export::to_string(&graph, Format::EdgeList).unwrap();
    assert_eq!(edgelist.lines().count(), 4);
    let graphml = export::to_string(&graph, Format::GraphMl).unwrap();
    assert!(graphml.contains(r#"attr.name="owner""#));
}

#[test]
fn missing_source_is_not_found() {
    let err = read_sources(&["/definitely/not/here"]).unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
