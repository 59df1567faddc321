//! Build orchestration: configuration and records in, assembled graph out.
//!
//! A build runs in four phases:
//!
//! 1. static validation ([`ResolutionContext::new`]), before any record is touched
//! 2. per-record resolution (node extraction, then embeds in topological order), parallel across
//!    records
//! 3. link computation over the whole corpus, one pass per linked pair of node types
//! 4. assembly (id uniqueness, network `min`) and optional community detection
//!
//! Every failure aborts the build; nothing is partially emitted. Given identical configuration,
//! records and deterministic providers, the output is identical down to node and edge order.

use rayon::prelude::*;

use crate::{
    config::GraphConfig,
    context::ResolutionContext,
    embed::resolve_embeds,
    error::WeaveError,
    extract::extract_nodes,
    graph::{Graph, ResolvedNode},
    link::compute_links,
    providers::ProviderRegistry,
    record::SourceRecord,
};

/// Resolve `records` against `config` into a [`Graph`].
pub fn build(
    config: &GraphConfig,
    records: &[SourceRecord],
    registry: &ProviderRegistry,
) -> Result<Graph, WeaveError> {
    let mut ctx = ResolutionContext::new(config, registry)?;
    tracing::info!(
        "[build] resolving {} records against {} node types and {} links",
        records.len(),
        config.nodes.len(),
        config.links.len()
    );

    let nodes = records
        .par_iter()
        .enumerate()
        .map(|(position, record)| resolve_record(&ctx, record, position))
        .collect::<Result<Vec<_>, WeaveError>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    ctx.index_corpus(&nodes);
    for node_type in config.nodes.keys() {
        if ctx.nodes_of(node_type).is_empty() {
            tracing::warn!("[build] node type '{}' matched no items", node_type);
        }
    }

    let edges = compute_links(&ctx, &nodes)?;

    let mut graph = Graph::assemble(nodes, edges, config.network.min)?;
    if let Some(detector) = ctx.community() {
        let communities = detector.detect(&graph)?;
        graph.attach_communities(communities)?;
    }
    tracing::info!(
        "[build] graph '{}': {} nodes, {} edges",
        config
            .network
            .name
            .as_deref()
            .or(config.schema.name.as_deref())
            .unwrap_or("unnamed"),
        graph.nodes.len(),
        graph.edges.len()
    );
    Ok(graph)
}

/// Extract and embed every node of one record.
pub fn resolve_record(
    ctx: &ResolutionContext<'_>,
    record: &SourceRecord,
    position: usize,
) -> Result<Vec<ResolvedNode>, WeaveError> {
    let mut nodes = extract_nodes(ctx, record, position)?;
    resolve_embeds(ctx, &mut nodes)?;
    tracing::trace!("[resolve_record] {}: {} nodes", record, nodes.len());
    Ok(nodes.into_resolved())
}

/// Run only the static checks, returning the embed and link evaluation orders.
pub fn check(
    config: &GraphConfig,
    registry: &ProviderRegistry,
) -> Result<(Vec<String>, Vec<String>), WeaveError> {
    let ctx = ResolutionContext::new(config, registry)?;
    Ok((
        ctx.embed_order().iter().map(ToString::to_string).collect(),
        ctx.link_order().to_vec(),
    ))
}
