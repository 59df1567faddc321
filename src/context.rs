//! Per-build resolution context.
//!
//! [`ResolutionContext::new`] performs every check that does not need record data: combine ref
//! graphs for embeds and links (undeclared names, self refs, cycles), provider names, and method
//! requirements. A configuration that passes is guaranteed to fail only on data-dependent
//! problems (missing fields, shape mismatches) afterwards.
//!
//! The context is created once per build and threaded through every component call. It holds
//! the topological evaluation orders, the providers resolved from the registry, and, once
//! records are resolved, the corpus index of nodes by type.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::{
    community::CommunityDetector,
    config::{EmbedSpec, GraphConfig, LinkSpec, Method, NodeTypeSpec, UNNAMED_EMBED},
    error::WeaveError,
    graph::ResolvedNode,
    pipeline::FieldType,
    providers::{
        builtin, ChunkingProvider, EmbeddingProvider, MetricProvider, ProviderRegistry,
    },
    refgraph::RefGraph,
    vector::Aggregate,
};

/// Qualified embed name, `node_type.name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmbedKey {
    pub node_type: String,
    pub name: String,
}

impl EmbedKey {
    pub fn new<T: Into<String>, N: Into<String>>(node_type: T, name: N) -> Self {
        EmbedKey {
            node_type: node_type.into(),
            name: name.into(),
        }
    }

    /// Resolve a combine ref written on `owner`: `name` is an embed of the same type and
    /// `type.name` an embed of another type produced from the same record.
    pub fn parse_ref(owner: &str, target: &str) -> Self {
        match target.split_once('.') {
            Some((node_type, name)) => EmbedKey::new(node_type, name),
            None => EmbedKey::new(owner, target),
        }
    }

    pub fn path(&self) -> String {
        format!("nodes.{}.embed.{}", self.node_type, self.name)
    }
}

impl Display for EmbedKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node_type, self.name)
    }
}

pub struct ResolutionContext<'a> {
    pub config: &'a GraphConfig,
    pub registry: &'a ProviderRegistry,
    embed_order: Vec<EmbedKey>,
    link_order: Vec<String>,
    methods: BTreeMap<String, Method>,
    embedders: BTreeMap<String, Arc<dyn EmbeddingProvider>>,
    chunkers: BTreeMap<String, Arc<dyn ChunkingProvider>>,
    metrics: BTreeMap<String, Arc<dyn MetricProvider>>,
    community: Option<Arc<dyn CommunityDetector>>,
    nodes_by_type: BTreeMap<String, Vec<usize>>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        config: &'a GraphConfig,
        registry: &'a ProviderRegistry,
    ) -> Result<ResolutionContext<'a>, WeaveError> {
        let mut ctx = ResolutionContext {
            config,
            registry,
            embed_order: Vec::new(),
            link_order: Vec::new(),
            methods: BTreeMap::new(),
            embedders: BTreeMap::new(),
            chunkers: BTreeMap::new(),
            metrics: BTreeMap::new(),
            community: None,
            nodes_by_type: BTreeMap::new(),
        };
        ctx.plan_embeds()?;
        ctx.plan_links()?;
        if let Some(name) = &config.network.community {
            ctx.community = Some(registry.community(name)?);
        }
        tracing::debug!(
            "[ResolutionContext::new] embed order: {:?}, link order: {:?}",
            ctx.embed_order.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            ctx.link_order
        );
        Ok(ctx)
    }

    fn plan_embeds(&mut self) -> Result<(), WeaveError> {
        let config = self.config;
        let mut refs = RefGraph::new(config.nodes.iter().flat_map(|(node_type, spec)| {
            spec.embed
                .names()
                .map(move |name| EmbedKey::new(node_type.as_str(), name.as_str()))
        }));
        for (node_type, node_spec) in config.nodes.iter() {
            for (name, spec) in node_spec.embed.0.iter() {
                let key = EmbedKey::new(node_type.as_str(), name.as_str());
                let path = key.path();
                if spec.is_combine() {
                    if spec.field.is_some() || spec.model.is_some() || spec.chunking.is_some() {
                        return Err(WeaveError::Config(format!(
                            "{path}: `combine` cannot be mixed with field, model or chunking"
                        )));
                    }
                    check_weights(spec.combine.iter().map(|r| r.weight), &path)?;
                    for (i, combine_ref) in spec.combine.iter().enumerate() {
                        let target = EmbedKey::parse_ref(node_type, &combine_ref.target);
                        let ref_path = format!("{path}.combine.{i}");
                        refs.add_ref(&key, &target, &ref_path)?;
                        let target_spec = self.embed_spec(&target)?;
                        if self.aggregate_of(target_spec) == Aggregate::None
                            && combine_ref.aggregate.unwrap_or(Aggregate::None) == Aggregate::None
                        {
                            return Err(WeaveError::Config(format!(
                                "{ref_path}: ref '{}' is uncollapsed and needs an explicit `aggregate`",
                                combine_ref.target
                            )));
                        }
                    }
                    continue;
                }
                if spec.field.is_none() {
                    return Err(WeaveError::Config(format!(
                        "{path}: an embed needs either `field` or `combine`"
                    )));
                }
                let model = self.model_of(spec).ok_or_else(|| {
                    WeaveError::Config(format!(
                        "{path}: no `model` given and no `defaults.model` configured"
                    ))
                })?;
                if !self.embedders.contains_key(model) {
                    let embedder = self.registry.embedding(model)?;
                    self.embedders.insert(model.to_string(), embedder);
                }
                if let Some(chunking) = &spec.chunking {
                    let params = chunking.resolve(config.defaults.chunking.as_ref());
                    if params.max_tokens == 0 || params.overlap >= params.max_tokens {
                        return Err(WeaveError::Config(format!(
                            "{path}.chunking: need 0 <= overlap < max_tokens, got overlap {} and max_tokens {}",
                            params.overlap, params.max_tokens
                        )));
                    }
                    if !self.chunkers.contains_key(&params.method) {
                        let chunker = self.registry.chunking(&params.method)?;
                        self.chunkers.insert(params.method.clone(), chunker);
                    }
                }
            }
        }
        self.embed_order = refs.order("nodes")?;
        Ok(())
    }

    fn plan_links(&mut self) -> Result<(), WeaveError> {
        let config = self.config;
        for (name, spec) in config.links.iter() {
            let path = format!("links.{name}");
            let method = spec.resolved_method(&path)?;
            self.check_link(&path, spec, &method)?;
            self.methods.insert(name.clone(), method);
        }

        let mut refs = RefGraph::new(config.links.keys().cloned());
        for (name, spec) in config.links.iter() {
            let path = format!("links.{name}");
            if !spec.combine.is_empty() {
                check_weights(spec.combine.iter().map(|r| r.weight), &path)?;
            }
            for (i, combine_ref) in spec.combine.iter().enumerate() {
                let ref_path = format!("{path}.combine.{i}");
                refs.add_ref(name, &combine_ref.target, &ref_path)?;
                let target = &config.links[&combine_ref.target];
                if !self.methods[&combine_ref.target].is_symmetric() {
                    return Err(WeaveError::reference(
                        ref_path,
                        format!(
                            "ref '{}' uses the asymmetric method '{}', only pairwise scores can be combined",
                            combine_ref.target, self.methods[&combine_ref.target]
                        ),
                    ));
                }
                if !same_pair(&spec.between, &target.between) {
                    return Err(WeaveError::reference(
                        ref_path,
                        format!(
                            "ref '{}' links {:?}, which differs from {:?}",
                            combine_ref.target, target.between, spec.between
                        ),
                    ));
                }
            }
        }
        self.link_order = refs.order("links")?;
        Ok(())
    }

    fn check_link(&mut self, path: &str, spec: &LinkSpec, method: &Method) -> Result<(), WeaveError> {
        let [source, target] = &spec.between;
        let source_spec = self.node_for_link(path, source)?;
        let target_spec = self.node_for_link(path, target)?;
        let require = |value: bool, requirement: &str| {
            if value {
                Ok(())
            } else {
                Err(WeaveError::requirement(path, method.to_string(), requirement))
            }
        };

        match method {
            Method::Cosine | Method::Metric(_) => {
                let metric_name = match method {
                    Method::Metric(name) => name.as_str(),
                    _ => builtin::COSINE,
                };
                if !self.metrics.contains_key(metric_name) {
                    let metric = self.registry.metric(metric_name)?;
                    self.metrics.insert(metric_name.to_string(), metric);
                }
                let (source_embed, target_embed) = spec.selected_embeds();
                let mut uncollapsed = false;
                for (node_type, node_spec, embed) in [
                    (source, source_spec, source_embed),
                    (target, target_spec, target_embed),
                ] {
                    let Some(embed_spec) = node_spec.embed.get(embed) else {
                        let message = if embed == UNNAMED_EMBED {
                            format!("node type '{node_type}' has no unnamed embed; select one with `embed`")
                        } else {
                            format!("embed '{embed}' is not declared on node type '{node_type}'")
                        };
                        return Err(WeaveError::reference(path, message));
                    };
                    uncollapsed |= self.aggregate_of(embed_spec) == Aggregate::None;
                }
                if uncollapsed {
                    require(
                        spec.match_strategy.is_some(),
                        "`match: max` because a selected embed is uncollapsed (aggregate: none)",
                    )?;
                }
            }
            Method::Jaccard | Method::Dice | Method::Overlap | Method::Exact | Method::Numeric => {
                let Some(field) = &spec.field else {
                    return require(false, "a `field`");
                };
                let expected = match method {
                    Method::Numeric => Some(FieldType::Number),
                    Method::Exact => None,
                    _ => Some(FieldType::List),
                };
                for (node_type, node_spec) in [(source, source_spec), (target, target_spec)] {
                    let declared = declared_field(path, node_type, node_spec, field)?;
                    let found = declared.static_type();
                    if let Some(expected) = expected {
                        if found != FieldType::Auto && found != expected {
                            return Err(WeaveError::shape(
                                path,
                                format!(
                                    "method '{method}' needs a {expected} field, but {node_type}.{field} is {found}"
                                ),
                            ));
                        }
                    }
                }
                if matches!(method, Method::Numeric) {
                    require(
                        spec.scale.map(|s| s.is_finite() && s > 0.0).unwrap_or(false),
                        "a positive `scale`",
                    )?;
                }
            }
            Method::Parent => {
                require(
                    source_spec.is_record_level() && !target_spec.is_record_level(),
                    "a record-level parent type (`from: .`) followed by a nested child type",
                )?;
                if let Some(weight_field) = &spec.weight_field {
                    declared_field(path, target, target_spec, weight_field)?;
                }
            }
            Method::Reference => {
                let Some(field) = &spec.field else {
                    return require(false, "a `field` listing target identifiers");
                };
                let Some(target_field) = &spec.target_field else {
                    return require(false, "a `target_field`");
                };
                declared_field(path, source, source_spec, field)?;
                declared_field(path, target, target_spec, target_field)?;
                if let Some(weight_field) = &spec.weight_field {
                    declared_field(path, source, source_spec, weight_field)?;
                }
            }
            Method::Combine => {}
        }
        Ok(())
    }

    fn node_for_link(&self, path: &str, node_type: &str) -> Result<&'a NodeTypeSpec, WeaveError> {
        self.config.nodes.get(node_type).ok_or_else(|| {
            WeaveError::reference(
                format!("{path}.between"),
                format!("node type '{node_type}' is not declared"),
            )
        })
    }

    pub fn embed_spec(&self, key: &EmbedKey) -> Result<&'a EmbedSpec, WeaveError> {
        self.config
            .nodes
            .get(&key.node_type)
            .and_then(|node| node.embed.get(&key.name))
            .ok_or_else(|| WeaveError::reference(key.path(), "embed is not declared"))
    }

    pub fn model_of(&self, spec: &'a EmbedSpec) -> Option<&'a str> {
        let config: &'a GraphConfig = self.config;
        spec.model.as_deref().or(config.defaults.model.as_deref())
    }

    /// The aggregate rule applied to an embed's vectors: declared, else `defaults.aggregate`,
    /// else `mean`.
    pub fn aggregate_of(&self, spec: &EmbedSpec) -> Aggregate {
        spec.aggregate
            .or(self.config.defaults.aggregate)
            .unwrap_or(Aggregate::Mean)
    }

    pub fn embed_order(&self) -> &[EmbedKey] {
        &self.embed_order
    }

    pub fn link_order(&self) -> &[String] {
        &self.link_order
    }

    pub fn method(&self, link: &str) -> Result<&Method, WeaveError> {
        self.methods
            .get(link)
            .ok_or_else(|| WeaveError::reference(format!("links.{link}"), "link is not declared"))
    }

    pub fn embedder(&self, model: &str) -> Result<&Arc<dyn EmbeddingProvider>, WeaveError> {
        self.embedders
            .get(model)
            .ok_or_else(|| crate::providers::ProviderKind::Embedding.error(model, "not resolved"))
    }

    pub fn chunker(&self, method: &str) -> Result<&Arc<dyn ChunkingProvider>, WeaveError> {
        self.chunkers
            .get(method)
            .ok_or_else(|| crate::providers::ProviderKind::Chunking.error(method, "not resolved"))
    }

    pub fn metric(&self, name: &str) -> Result<&Arc<dyn MetricProvider>, WeaveError> {
        self.metrics
            .get(name)
            .ok_or_else(|| crate::providers::ProviderKind::Metric.error(name, "not resolved"))
    }

    pub fn community(&self) -> Option<&Arc<dyn CommunityDetector>> {
        self.community.as_ref()
    }

    /// Build the corpus index once every record has been resolved.
    pub fn index_corpus(&mut self, nodes: &[ResolvedNode]) {
        self.nodes_by_type.clear();
        for node_type in self.config.nodes.keys() {
            self.nodes_by_type.insert(node_type.clone(), Vec::new());
        }
        for (idx, node) in nodes.iter().enumerate() {
            self.nodes_by_type
                .entry(node.node_type.clone())
                .or_default()
                .push(idx);
        }
    }

    /// Indices (into the build's node list) of every node of `node_type`, in record order.
    pub fn nodes_of(&self, node_type: &str) -> &[usize] {
        self.nodes_by_type
            .get(node_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn check_weights<I: Iterator<Item = f64>>(weights: I, path: &str) -> Result<(), WeaveError> {
    let mut total = 0.0;
    for weight in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(WeaveError::Config(format!(
                "{path}: combine weights must be finite and non-negative, got {weight}"
            )));
        }
        total += weight;
    }
    if total <= 0.0 {
        return Err(WeaveError::Config(format!(
            "{path}: combine weights sum to zero"
        )));
    }
    Ok(())
}

fn same_pair(a: &[String; 2], b: &[String; 2]) -> bool {
    a == b || (a[0] == b[1] && a[1] == b[0])
}

fn declared_field<'s>(
    path: &str,
    node_type: &str,
    node_spec: &'s NodeTypeSpec,
    field: &str,
) -> Result<&'s crate::pipeline::PipelineSpec, WeaveError> {
    node_spec.fields.get(field).ok_or_else(|| {
        WeaveError::reference(
            path,
            format!("field '{field}' is not declared on node type '{node_type}'"),
        )
    })
}
