//! Declarative build configuration.
//!
//! A [`GraphConfig`] mirrors the five sections of a configuration file:
//!
//! ```yaml
//! schema: { name: conversations, version: 1 }
//! defaults: { model: hashing, min: 0.0 }
//! nodes:
//!   user_turn:
//!     from: turns
//!     where: { role: user }
//!     fields:
//!       text: content
//!     embed:
//!       field: text
//! links:
//!   similar:
//!     between: [user_turn, user_turn]
//!     method: cosine
//!     min: 0.3
//! network:
//!   min: 0.0
//!   community: components
//! ```
//!
//! Files are read with serde_yaml (`.yaml`/`.yml`), toml (`.toml`) or serde_json (`.json`).
//! Structural validation of names and refs happens when a
//! [`ResolutionContext`](crate::context::ResolutionContext) is created.

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    fs::read_to_string,
    path::Path,
};

use crate::{
    error::WeaveError,
    pipeline::{PipelineSpec, WHOLE_RECORD},
    providers::builtin,
    vector::Aggregate,
};

/// Name given to an embed declared without a name.
pub const UNNAMED_EMBED: &str = "default";

/// Top-level keys that mark an embed block as a single unnamed embed.
const EMBED_KEYS: &[&str] = &["field", "model", "chunking", "aggregate", "combine"];

pub const DEFAULT_MAX_TOKENS: usize = 256;

fn whole_record() -> String {
    WHOLE_RECORD.to_string()
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub schema: SchemaSection,
    pub nodes: BTreeMap<String, NodeTypeSpec>,
    #[serde(default)]
    pub links: BTreeMap<String, LinkSpec>,
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub defaults: Defaults,
}

impl GraphConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<GraphConfig, WeaveError> {
        let path = path.as_ref();
        tracing::debug!("Reading graph config from: {:?}", path);
        let content = read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => GraphConfig::from_yaml_str(&content),
            Some("toml") => GraphConfig::from_toml_str(&content),
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(WeaveError::Config(format!(
                "unsupported config format {other:?} for {path:?}"
            ))),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<GraphConfig, WeaveError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<GraphConfig, WeaveError> {
        Ok(toml::from_str(content)?)
    }

    pub fn node(&self, name: &str) -> Result<&NodeTypeSpec, WeaveError> {
        self.nodes
            .get(name)
            .ok_or_else(|| WeaveError::reference(format!("nodes.{name}"), "node type is not declared"))
    }

    pub fn link_min(&self, link: &LinkSpec) -> Option<f64> {
        link.min.or(self.defaults.min)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub chunking: Option<ChunkingSpec>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub min: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Edges below this weight are dropped after every link type is computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Name of a registered community detector to run on the finished graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeTypeSpec {
    #[serde(default = "whole_record")]
    pub from: String,
    #[serde(default, rename = "where", skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, Value>,
    #[serde(default)]
    pub fields: BTreeMap<String, PipelineSpec>,
    #[serde(default)]
    pub embed: EmbedBlock,
}

impl Default for NodeTypeSpec {
    fn default() -> Self {
        NodeTypeSpec {
            from: whole_record(),
            filter: BTreeMap::new(),
            fields: BTreeMap::new(),
            embed: EmbedBlock::default(),
        }
    }
}

impl NodeTypeSpec {
    /// Whether nodes of this type stand for the whole record, which makes them the implicit
    /// parent of every other node extracted from the same record.
    pub fn is_record_level(&self) -> bool {
        self.from.trim() == WHOLE_RECORD
    }
}

/// The named embeds of a node type. An unnamed block is stored under [`UNNAMED_EMBED`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbedBlock(pub BTreeMap<String, EmbedSpec>);

impl<'de> Deserialize<'de> for EmbedBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        if raw.keys().any(|key| EMBED_KEYS.contains(&key.as_str())) {
            let spec: EmbedSpec = serde_json::from_value(Value::Object(raw.into_iter().collect()))
                .map_err(|e| D::Error::custom(format!("embed: {e}")))?;
            return Ok(EmbedBlock(BTreeMap::from([(
                UNNAMED_EMBED.to_string(),
                spec,
            )])));
        }
        raw.into_iter()
            .map(|(name, body)| {
                serde_json::from_value::<EmbedSpec>(body)
                    .map(|spec| (name.clone(), spec))
                    .map_err(|e| D::Error::custom(format!("embed '{name}': {e}")))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(EmbedBlock)
    }
}

impl EmbedBlock {
    pub fn get(&self, name: &str) -> Option<&EmbedSpec> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking: Option<ChunkingSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combine: Vec<CombineRef>,
}

impl EmbedSpec {
    pub fn is_combine(&self) -> bool {
        !self.combine.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingSpec {
    /// Name of the chunking provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap: Option<usize>,
}

/// Chunking parameters after falling back to `defaults.chunking`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingParams {
    pub method: String,
    pub max_tokens: usize,
    pub overlap: usize,
}

impl ChunkingSpec {
    pub fn resolve(&self, defaults: Option<&ChunkingSpec>) -> ChunkingParams {
        ChunkingParams {
            method: self
                .method
                .clone()
                .or_else(|| defaults.and_then(|d| d.method.clone()))
                .unwrap_or_else(|| builtin::TOKENS.to_string()),
            max_tokens: self
                .max_tokens
                .or_else(|| defaults.and_then(|d| d.max_tokens))
                .unwrap_or(DEFAULT_MAX_TOKENS),
            overlap: self
                .overlap
                .or_else(|| defaults.and_then(|d| d.overlap))
                .unwrap_or(0),
        }
    }
}

/// One weighted entry of a `combine` list, for embeds and links alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombineRef {
    #[serde(rename = "ref")]
    pub target: String,
    #[serde(default = "unit_weight")]
    pub weight: f64,
    /// Collapses an uncollapsed embed before blending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregate>,
    /// Link scores below this floor contribute 0 but keep their weight in the denominator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
    Cosine,
    Jaccard,
    Dice,
    Overlap,
    Exact,
    Numeric,
    Parent,
    Reference,
    Combine,
    /// Any other name resolves against the metric registry and scores the selected embeds.
    Metric(String),
}

impl From<String> for Method {
    fn from(name: String) -> Self {
        match name.as_str() {
            "cosine" => Method::Cosine,
            "jaccard" => Method::Jaccard,
            "dice" => Method::Dice,
            "overlap" => Method::Overlap,
            "exact" => Method::Exact,
            "numeric" => Method::Numeric,
            "parent" => Method::Parent,
            "reference" => Method::Reference,
            "combine" => Method::Combine,
            _ => Method::Metric(name),
        }
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.to_string()
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::Cosine => "cosine",
            Method::Jaccard => "jaccard",
            Method::Dice => "dice",
            Method::Overlap => "overlap",
            Method::Exact => "exact",
            Method::Numeric => "numeric",
            Method::Parent => "parent",
            Method::Reference => "reference",
            Method::Combine => "combine",
            Method::Metric(name) => name,
        };
        write!(f, "{name}")
    }
}

impl Method {
    /// Symmetric methods emit an edge in each direction per qualifying pair.
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, Method::Parent | Method::Reference)
    }

    /// Methods that score a pair of embeds.
    pub fn uses_embeds(&self) -> bool {
        matches!(self, Method::Cosine | Method::Metric(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedSelector {
    /// The same embed name on both sides.
    Same(String),
    /// First name for the first `between` type, second for the second.
    Pair([String; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSpec {
    pub between: [String; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combine: Vec<CombineRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedSelector>,
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_strategy: Option<MatchStrategy>,
}

impl LinkSpec {
    /// The effective method: `combine` when refs are present, else the declared method.
    pub fn resolved_method(&self, path: &str) -> Result<Method, WeaveError> {
        match (&self.method, self.combine.is_empty()) {
            (None | Some(Method::Combine), false) => Ok(Method::Combine),
            (Some(Method::Combine), true) => Err(WeaveError::requirement(
                path,
                "combine",
                "a non-empty `combine` list",
            )),
            (Some(method), true) => Ok(method.clone()),
            (Some(method), false) => Err(WeaveError::Config(format!(
                "{path}: method '{method}' cannot also declare `combine` refs"
            ))),
            (None, true) => Err(WeaveError::requirement(
                path,
                "(none)",
                "a `method` or `combine` refs",
            )),
        }
    }

    /// Embed names selected on each side; the unnamed embed when no selector is given.
    pub fn selected_embeds(&self) -> (&str, &str) {
        match &self.embed {
            None => (UNNAMED_EMBED, UNNAMED_EMBED),
            Some(EmbedSelector::Same(name)) => (name.as_str(), name.as_str()),
            Some(EmbedSelector::Pair([a, b])) => (a.as_str(), b.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONVERSATIONS: &str = r#"
schema:
  name: conversations
  version: 1
defaults:
  model: hashing
nodes:
  conversation:
    fields:
      title: title
    embed:
      summary:
        field: title
      blended:
        combine:
          - { ref: summary, weight: 1 }
          - { ref: user_turn.default, weight: 2, aggregate: mean }
  user_turn:
    from: turns
    where: { role: user }
    fields:
      text: content
    embed:
      field: text
      model: hashing
      chunking: { max_tokens: 64, overlap: 8 }
links:
  similar:
    between: [user_turn, user_turn]
    method: cosine
    min: 0.3
  blend:
    between: [user_turn, user_turn]
    combine:
      - { ref: similar, weight: 2, min: 0.5 }
network:
  min: 0.1
  community: components
"#;

    #[test]
    fn test_yaml_config_sections() {
        let config = GraphConfig::from_yaml_str(CONVERSATIONS).unwrap();
        assert_eq!(config.schema.name.as_deref(), Some("conversations"));
        assert_eq!(config.defaults.model.as_deref(), Some("hashing"));
        assert_eq!(config.network.min, Some(0.1));
        assert_eq!(config.network.community.as_deref(), Some("components"));

        let turn = config.node("user_turn").unwrap();
        assert!(!turn.is_record_level());
        assert!(config.node("conversation").unwrap().is_record_level());
        assert!(config.node("missing").is_err());
    }

    #[test]
    fn test_embed_block_auto_detection() {
        let config = GraphConfig::from_yaml_str(CONVERSATIONS).unwrap();
        let turn = config.node("user_turn").unwrap();
        assert_eq!(turn.embed.names().collect::<Vec<_>>(), vec![UNNAMED_EMBED]);
        let chunking = turn.embed.get(UNNAMED_EMBED).unwrap().chunking.clone().unwrap();
        assert_eq!(
            chunking.resolve(None),
            ChunkingParams {
                method: "tokens".to_string(),
                max_tokens: 64,
                overlap: 8
            }
        );

        let conversation = config.node("conversation").unwrap();
        assert_eq!(
            conversation.embed.names().collect::<Vec<_>>(),
            vec!["blended", "summary"]
        );
        let blended = conversation.embed.get("blended").unwrap();
        assert!(blended.is_combine());
        assert_eq!(blended.combine[1].aggregate, Some(Aggregate::Mean));
        assert_eq!(blended.combine[0].weight, 1.0);
    }

    #[test]
    fn test_link_methods_and_combine() {
        let config = GraphConfig::from_yaml_str(CONVERSATIONS).unwrap();
        let similar = &config.links["similar"];
        assert_eq!(similar.resolved_method("links.similar").unwrap(), Method::Cosine);
        assert_eq!(similar.selected_embeds(), ("default", "default"));

        let blend = &config.links["blend"];
        assert_eq!(blend.resolved_method("links.blend").unwrap(), Method::Combine);
        assert_eq!(blend.combine[0].min, Some(0.5));
    }

    #[test]
    fn test_plugin_method_names() {
        assert_eq!(Method::from("manhattan".to_string()), Method::Metric("manhattan".into()));
        assert!(Method::Cosine.is_symmetric());
        assert!(!Method::Reference.is_symmetric());
        assert_eq!(String::from(Method::Parent), "parent");
    }

    #[test]
    fn test_toml_config() {
        let config = GraphConfig::from_toml_str(
            r#"
[nodes.paper]
fields = { year = { from = "year", type = "number" }, tags = "keywords" }

[links.era]
between = ["paper", "paper"]
method = "numeric"
field = "year"
scale = 5.0
"#,
        )
        .unwrap();
        let era = &config.links["era"];
        assert_eq!(era.scale, Some(5.0));
        assert_eq!(
            config.nodes["paper"].fields["tags"],
            PipelineSpec::path("keywords")
        );
    }

    #[test]
    fn test_unknown_link_keys_rejected() {
        let bad = GraphConfig::from_yaml_str(
            "nodes: {a: {}}\nlinks:\n  l:\n    between: [a, a]\n    methd: cosine\n",
        );
        assert!(bad.is_err());
    }
}
