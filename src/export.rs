//! Serializing a built [`Graph`].

use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    io::Write,
    str::FromStr,
};

use crate::{error::WeaveError, graph::Graph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// `{"nodes": [...], "edges": [...]}` with node attributes flattened.
    #[default]
    Json,
    /// `source<TAB>target<TAB>weight<TAB>link_type`, one edge per line.
    EdgeList,
    GraphMl,
}

impl FromStr for Format {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "edgelist" | "tsv" => Ok(Format::EdgeList),
            "graphml" => Ok(Format::GraphMl),
            other => Err(WeaveError::Config(format!(
                "unknown export format '{other}', expected json, edgelist or graphml"
            ))),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::Json => "json",
            Format::EdgeList => "edgelist",
            Format::GraphMl => "graphml",
        };
        write!(f, "{name}")
    }
}

pub fn write<W: Write>(graph: &Graph, format: Format, mut out: W) -> Result<(), WeaveError> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, &to_json(graph))?;
            writeln!(out)?;
        }
        Format::EdgeList => {
            for edge in graph.edges.iter() {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    edge.source, edge.target, edge.weight, edge.link_type
                )?;
            }
        }
        Format::GraphMl => write_graphml(graph, &mut out)?,
    }
    Ok(())
}

pub fn to_string(graph: &Graph, format: Format) -> Result<String, WeaveError> {
    let mut buf = Vec::new();
    write(graph, format, &mut buf)?;
    String::from_utf8(buf).map_err(|e| WeaveError::Serialization(e.to_string()))
}

/// Nodes as `{id, ...attributes}` and edges as flat objects.
pub fn to_json(graph: &Graph) -> Value {
    let nodes = graph
        .nodes
        .iter()
        .map(|node| {
            let mut attrs = serde_json::Map::new();
            attrs.extend(node.attributes());
            // A declared field named `id` never replaces the node id edges refer to.
            attrs.insert("id".to_string(), Value::String(node.id.clone()));
            Value::Object(attrs)
        })
        .collect::<Vec<_>>();
    let edges = graph
        .edges
        .iter()
        .map(|edge| serde_json::to_value(edge).unwrap_or(Value::Null))
        .collect::<Vec<_>>();
    serde_json::json!({ "nodes": nodes, "edges": edges })
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn graphml_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_graphml<W: Write>(graph: &Graph, out: &mut W) -> Result<(), WeaveError> {
    // Node attribute keys are the union over all nodes; numbers are typed as doubles only when
    // every present value is numeric.
    let mut node_keys: BTreeMap<String, bool> = BTreeMap::new();
    let attributes = graph.nodes.iter().map(|n| n.attributes()).collect::<Vec<_>>();
    for attrs in attributes.iter() {
        for (key, value) in attrs.iter() {
            let numeric = value.is_number();
            node_keys
                .entry(key.clone())
                .and_modify(|all| *all &= numeric)
                .or_insert(numeric);
        }
    }

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns">"#
    )?;
    let ids = node_keys
        .iter()
        .enumerate()
        .map(|(i, (key, numeric))| {
            let kind = if *numeric { "double" } else { "string" };
            (key.clone(), (format!("n{i}"), kind))
        })
        .collect::<BTreeMap<_, _>>();
    for (key, (id, kind)) in ids.iter() {
        writeln!(
            out,
            r#"  <key id="{id}" for="node" attr.name="{}" attr.type="{kind}"/>"#,
            escape(key)
        )?;
    }
    writeln!(out, r#"  <key id="weight" for="edge" attr.name="weight" attr.type="double"/>"#)?;
    writeln!(out, r#"  <key id="link_type" for="edge" attr.name="link_type" attr.type="string"/>"#)?;
    writeln!(out, r#"  <key id="method" for="edge" attr.name="method" attr.type="string"/>"#)?;
    writeln!(out, r#"  <graph id="G" edgedefault="directed">"#)?;
    for (node, attrs) in graph.nodes.iter().zip(attributes.iter()) {
        writeln!(out, r#"    <node id="{}">"#, escape(&node.id))?;
        for (key, value) in attrs.iter() {
            if let Some((id, _)) = ids.get(key) {
                writeln!(
                    out,
                    r#"      <data key="{id}">{}</data>"#,
                    escape(&graphml_text(value))
                )?;
            }
        }
        writeln!(out, "    </node>")?;
    }
    for (i, edge) in graph.edges.iter().enumerate() {
        writeln!(
            out,
            r#"    <edge id="e{i}" source="{}" target="{}">"#,
            escape(&edge.source),
            escape(&edge.target)
        )?;
        writeln!(out, r#"      <data key="weight">{}</data>"#, edge.weight)?;
        writeln!(
            out,
            r#"      <data key="link_type">{}</data>"#,
            escape(&edge.link_type)
        )?;
        writeln!(out, r#"      <data key="method">{}</data>"#, escape(&edge.method))?;
        writeln!(out, "    </edge>")?;
    }
    writeln!(out, "  </graph>")?;
    writeln!(out, "</graphml>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{ResolvedEdge, ResolvedNode},
        record::Provenance,
    };

    fn sample() -> Graph {
        let nodes = ["a", "b"]
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let meta = Provenance::new("chat.json");
                let mut node = ResolvedNode {
                    id: ResolvedNode::make_id(&meta, "turn", i),
                    node_type: "turn".into(),
                    fields: Default::default(),
                    vectors: Default::default(),
                    meta,
                    record: 0,
                    index: i,
                    community: None,
                };
                node.fields.insert("text".into(), Value::from(format!("<{text}>")));
                node
            })
            .collect::<Vec<_>>();
        let edges = vec![ResolvedEdge::between(
            (0, &nodes[0]),
            (1, &nodes[1]),
            0.75,
            "similar",
            "cosine",
        )];
        Graph::assemble(nodes, edges, None).unwrap()
    }

    #[test]
    fn test_edgelist_lines() {
        let out = to_string(&sample(), Format::EdgeList).unwrap();
        assert_eq!(out, "chat.json:turn:0\tchat.json:turn:1\t0.75\tsimilar\n");
    }

    #[test]
    fn test_json_flattens_attributes() {
        let value = to_json(&sample());
        assert_eq!(value["nodes"][0]["id"], "chat.json:turn:0");
        assert_eq!(value["nodes"][0]["_type"], "turn");
        assert_eq!(value["edges"][0]["link_type"], "similar");
        assert_eq!(value["edges"][0]["weight"], 0.75);
    }

    #[test]
    fn test_json_id_field_keeps_node_id() {
        let mut graph = sample();
        graph.nodes[0].fields.insert("id".into(), Value::from("p1"));
        let value = to_json(&graph);
        assert_eq!(value["nodes"][0]["id"], "chat.json:turn:0");
        assert_eq!(value["nodes"][0]["id"], value["edges"][0]["source"]);
    }

    #[test]
    fn test_graphml_escapes_text() {
        let out = to_string(&sample(), Format::GraphMl).unwrap();
        assert!(out.contains("&lt;a&gt;"));
        assert!(out.contains(r#"<edge id="e0" source="chat.json:turn:0" target="chat.json:turn:1">"#));
        assert_eq!("GraphML".parse::<Format>().unwrap(), Format::GraphMl);
        assert!("dot".parse::<Format>().is_err());
    }
}
