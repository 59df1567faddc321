//! Link computation: scoring node pairs and emitting weighted edges.
//!
//! Symmetric methods (`cosine`, a plugin metric, `jaccard`, `dice`, `overlap`, `exact`,
//! `numeric`, and `combine` over those) score unordered pairs and emit both directions with the
//! same weight. `parent` and `reference` are directional and never combinable.
//!
//! Symmetric links are grouped by their unordered `between` pair. Each group walks its node pairs
//! once, evaluating every link of the group in topological order against a per-pair memo, so a
//! link referenced by several `combine` links is still scored once per pair for the whole build.
//! Pairs are scored in parallel with rayon, sharded by the left node; shard results are collected
//! in order, so edge order does not depend on scheduling.

use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::{LinkSpec, MatchStrategy, Method},
    context::ResolutionContext,
    error::WeaveError,
    graph::{ResolvedEdge, ResolvedNode},
    pipeline::{canonical_key, type_name, values_equal},
    providers::builtin,
    vector::VectorSet,
};

/// Compute the edges of every declared link over `nodes`, each link's `min` applied. Edges are
/// grouped by link, in declaration order.
pub fn compute_links(
    ctx: &ResolutionContext<'_>,
    nodes: &[ResolvedNode],
) -> Result<Vec<ResolvedEdge>, WeaveError> {
    let mut by_link: BTreeMap<&str, Vec<ResolvedEdge>> = BTreeMap::new();
    let mut groups: BTreeMap<[&str; 2], Vec<&str>> = BTreeMap::new();
    for name in ctx.link_order() {
        let spec = link_spec(ctx, name)?;
        match ctx.method(name)? {
            Method::Parent => {
                by_link.insert(name.as_str(), parent_edges(ctx, name, spec, nodes)?);
            }
            Method::Reference => {
                by_link.insert(name.as_str(), reference_edges(ctx, name, spec, nodes)?);
            }
            _ => groups.entry(unordered(&spec.between)).or_default().push(name.as_str()),
        }
    }
    for (pair, links) in groups.iter() {
        for (&name, edges) in links.iter().zip(pair_edges(ctx, pair, links, nodes)?) {
            by_link.insert(name, edges);
        }
    }

    let mut edges = Vec::new();
    for (name, spec) in ctx.config.links.iter() {
        let Some(mut link_edges) = by_link.remove(name.as_str()) else {
            continue;
        };
        if let Some(min) = ctx.config.link_min(spec) {
            link_edges.retain(|edge| edge.weight >= min);
        }
        tracing::debug!(
            "[compute_links] {} ({}) produced {} edges",
            name,
            ctx.method(name)?,
            link_edges.len()
        );
        edges.extend(link_edges);
    }
    Ok(edges)
}

fn link_spec<'a>(ctx: &ResolutionContext<'a>, name: &str) -> Result<&'a LinkSpec, WeaveError> {
    ctx.config
        .links
        .get(name)
        .ok_or_else(|| WeaveError::reference(format!("links.{name}"), "link is not declared"))
}

fn unordered(between: &[String; 2]) -> [&str; 2] {
    let [a, b] = between;
    if a <= b {
        [a.as_str(), b.as_str()]
    } else {
        [b.as_str(), a.as_str()]
    }
}

/// `(x, y)` oriented the way `spec` declares its `between`.
fn oriented<'n>(
    spec: &LinkSpec,
    x: (usize, &'n ResolvedNode),
    y: (usize, &'n ResolvedNode),
) -> ((usize, &'n ResolvedNode), (usize, &'n ResolvedNode)) {
    if x.1.node_type == spec.between[0] && y.1.node_type == spec.between[1] {
        (x, y)
    } else {
        (y, x)
    }
}

/// Edges of every link in `links` (all sharing the unordered pair `pair`, listed in evaluation
/// order), one vector per link.
fn pair_edges(
    ctx: &ResolutionContext<'_>,
    pair: &[&str; 2],
    links: &[&str],
    nodes: &[ResolvedNode],
) -> Result<Vec<Vec<ResolvedEdge>>, WeaveError> {
    let specs = links
        .iter()
        .map(|name| Ok((*name, link_spec(ctx, name)?, ctx.method(name)?)))
        .collect::<Result<Vec<_>, WeaveError>>()?;
    let [left_type, right_type] = pair;
    let left = ctx.nodes_of(left_type);
    let right = ctx.nodes_of(right_type);
    let same_type = left_type == right_type;

    let shards = left
        .par_iter()
        .enumerate()
        .map(|(pos, &i)| {
            // Same-type links score each unordered pair once and never a node against itself.
            let candidates = if same_type { &left[pos + 1..] } else { right };
            let mut edges: Vec<Vec<ResolvedEdge>> = specs.iter().map(|_| Vec::new()).collect();
            for &j in candidates {
                let scores = score_pair(&specs, &nodes[i], &nodes[j], ctx)?;
                for (k, (name, spec, method)) in specs.iter().enumerate() {
                    let score = scores[k];
                    if !score.is_finite() {
                        tracing::warn!(
                            "[compute_links] {}: non-finite score for {} / {}, skipped",
                            name,
                            nodes[i].id,
                            nodes[j].id
                        );
                        continue;
                    }
                    if score == 0.0 {
                        continue;
                    }
                    let method_name = method.to_string();
                    let (x, y) = oriented(spec, (i, &nodes[i]), (j, &nodes[j]));
                    edges[k].push(ResolvedEdge::between(x, y, score, name, &method_name));
                    edges[k].push(ResolvedEdge::between(y, x, score, name, &method_name));
                }
            }
            Ok::<_, WeaveError>(edges)
        })
        .collect::<Result<Vec<_>, WeaveError>>()?;

    let mut merged: Vec<Vec<ResolvedEdge>> = specs.iter().map(|_| Vec::new()).collect();
    for shard in shards {
        for (acc, edges) in merged.iter_mut().zip(shard) {
            acc.extend(edges);
        }
    }
    Ok(merged)
}

/// Raw scores of `links` for the pair `(a, b)`, in the order given. Links must be listed in
/// evaluation order; a `combine` link reads its refs from the scores already computed for this
/// pair, so every link is scored exactly once.
fn score_pair(
    links: &[(&str, &LinkSpec, &Method)],
    a: &ResolvedNode,
    b: &ResolvedNode,
    ctx: &ResolutionContext<'_>,
) -> Result<Vec<f64>, WeaveError> {
    let mut memo: BTreeMap<&str, f64> = BTreeMap::new();
    let mut scores = Vec::with_capacity(links.len());
    for &(link, spec, method) in links {
        let score = match method {
            Method::Combine => combine_score(link, spec, &memo)?,
            method => {
                let ((_, x), (_, y)) = oriented(spec, (0, a), (0, b));
                direct_score(ctx, link, spec, method, x, y)?
            }
        };
        memo.insert(link, score);
        scores.push(score);
    }
    Ok(scores)
}

fn combine_score(
    name: &str,
    spec: &LinkSpec,
    memo: &BTreeMap<&str, f64>,
) -> Result<f64, WeaveError> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for combine_ref in spec.combine.iter() {
        let score = memo.get(combine_ref.target.as_str()).copied().ok_or_else(|| {
            WeaveError::reference(
                format!("links.{name}.combine"),
                format!("ref '{}' was not evaluated", combine_ref.target),
            )
        })?;
        let score = match combine_ref.min {
            Some(floor) if score < floor => 0.0,
            _ => score,
        };
        weighted += combine_ref.weight * score;
        total += combine_ref.weight;
    }
    if total == 0.0 {
        return Err(WeaveError::Config(format!(
            "links.{name}: combine weights sum to zero"
        )));
    }
    Ok(weighted / total)
}

fn direct_score(
    ctx: &ResolutionContext<'_>,
    name: &str,
    spec: &LinkSpec,
    method: &Method,
    a: &ResolvedNode,
    b: &ResolvedNode,
) -> Result<f64, WeaveError> {
    let path = format!("links.{name}");
    match method {
        Method::Cosine | Method::Metric(_) => {
            let metric_name = match method {
                Method::Metric(metric) => metric.as_str(),
                _ => builtin::COSINE,
            };
            let metric = ctx.metric(metric_name)?;
            let (embed_a, embed_b) = spec.selected_embeds();
            let set_a = node_vectors(a, embed_a, &path)?;
            let set_b = node_vectors(b, embed_b, &path)?;
            let (Some(first_a), Some(first_b)) = (set_a.vectors().first(), set_b.vectors().first())
            else {
                return Ok(0.0);
            };
            if first_a.len() != first_b.len() {
                return Err(WeaveError::shape(
                    path,
                    format!(
                        "embed '{embed_a}' of {} has {} dimensions, embed '{embed_b}' of {} has {}",
                        a.id,
                        first_a.len(),
                        b.id,
                        first_b.len()
                    ),
                ));
            }
            match (set_a, set_b) {
                (VectorSet::Single(x), VectorSet::Single(y)) => metric.score(x, y),
                _ => match spec.match_strategy {
                    Some(MatchStrategy::Max) => {
                        let mut best: Option<f64> = None;
                        for x in set_a.vectors() {
                            for y in set_b.vectors() {
                                let score = metric.score(x, y)?;
                                best = Some(best.map_or(score, |prev| prev.max(score)));
                            }
                        }
                        Ok(best.unwrap_or(0.0))
                    }
                    None => Err(WeaveError::requirement(
                        path,
                        method.to_string(),
                        "`match: max` to compare uncollapsed vector sets",
                    )),
                },
            }
        }
        Method::Jaccard | Method::Dice | Method::Overlap => {
            let field = required_field(spec, method, &path)?;
            let x = value_set(a, field, &path)?;
            let y = value_set(b, field, &path)?;
            if x.is_empty() || y.is_empty() {
                return Ok(0.0);
            }
            let common = x.intersection(&y).count() as f64;
            Ok(match method {
                Method::Jaccard => common / x.union(&y).count() as f64,
                Method::Dice => 2.0 * common / (x.len() + y.len()) as f64,
                _ => common / x.len().min(y.len()) as f64,
            })
        }
        Method::Exact => {
            let field = required_field(spec, method, &path)?;
            let x = node_field(a, field, &path)?;
            let y = node_field(b, field, &path)?;
            Ok(if values_equal(x, y) { 1.0 } else { 0.0 })
        }
        Method::Numeric => {
            let field = required_field(spec, method, &path)?;
            let scale = spec
                .scale
                .filter(|s| s.is_finite() && *s > 0.0)
                .ok_or_else(|| WeaveError::requirement(&path, method.to_string(), "a positive `scale`"))?;
            let x = numeric_field(a, field, &path)?;
            let y = numeric_field(b, field, &path)?;
            let d = x - y;
            Ok((-(d * d) / (2.0 * scale * scale)).exp())
        }
        Method::Parent | Method::Reference | Method::Combine => Err(WeaveError::reference(
            path,
            format!("method '{method}' cannot score an isolated pair"),
        )),
    }
}

fn required_field<'s>(spec: &'s LinkSpec, method: &Method, path: &str) -> Result<&'s str, WeaveError> {
    spec.field
        .as_deref()
        .ok_or_else(|| WeaveError::requirement(path, method.to_string(), "a `field`"))
}

fn node_vectors<'n>(node: &'n ResolvedNode, embed: &str, path: &str) -> Result<&'n VectorSet, WeaveError> {
    node.vectors.get(embed).ok_or_else(|| {
        WeaveError::reference(
            path,
            format!("node {} has no embed '{embed}'", node.id),
        )
    })
}

fn node_field<'n>(node: &'n ResolvedNode, field: &str, path: &str) -> Result<&'n Value, WeaveError> {
    node.fields.get(field).ok_or_else(|| {
        WeaveError::reference(path, format!("node {} has no field '{field}'", node.id))
    })
}

fn value_set(node: &ResolvedNode, field: &str, path: &str) -> Result<BTreeSet<String>, WeaveError> {
    match node_field(node, field, path)? {
        Value::Array(items) => Ok(items.iter().map(canonical_key).collect()),
        other => Err(WeaveError::shape(
            path,
            format!(
                "{}.{field} of {} is a {}, set methods need a sequence",
                node.node_type,
                node.id,
                type_name(other)
            ),
        )),
    }
}

fn numeric_field(node: &ResolvedNode, field: &str, path: &str) -> Result<f64, WeaveError> {
    let value = node_field(node, field, path)?;
    value.as_f64().ok_or_else(|| {
        WeaveError::shape(
            path,
            format!(
                "{}.{field} of {} is a {}, expected a number",
                node.node_type,
                node.id,
                type_name(value)
            ),
        )
    })
}

fn edge_weight(node: &ResolvedNode, weight_field: Option<&str>, path: &str) -> Result<f64, WeaveError> {
    match weight_field {
        Some(field) => numeric_field(node, field, path),
        None => Ok(1.0),
    }
}

/// One edge from each record-level parent to every child extracted from the same record.
fn parent_edges(
    ctx: &ResolutionContext<'_>,
    name: &str,
    spec: &LinkSpec,
    nodes: &[ResolvedNode],
) -> Result<Vec<ResolvedEdge>, WeaveError> {
    let path = format!("links.{name}");
    let [parent_type, child_type] = &spec.between;
    let mut parents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &idx in ctx.nodes_of(parent_type) {
        parents.entry(nodes[idx].record).or_default().push(idx);
    }
    let mut edges = Vec::new();
    for &child in ctx.nodes_of(child_type) {
        let Some(record_parents) = parents.get(&nodes[child].record) else {
            continue;
        };
        let weight = edge_weight(&nodes[child], spec.weight_field.as_deref(), &path)?;
        for &parent in record_parents {
            edges.push(ResolvedEdge::between(
                (parent, &nodes[parent]),
                (child, &nodes[child]),
                weight,
                name,
                "parent",
            ));
        }
    }
    Ok(edges)
}

/// One edge from each source node to every target node whose `target_field` matches one of the
/// identifiers listed in the source's `field`.
fn reference_edges(
    ctx: &ResolutionContext<'_>,
    name: &str,
    spec: &LinkSpec,
    nodes: &[ResolvedNode],
) -> Result<Vec<ResolvedEdge>, WeaveError> {
    let path = format!("links.{name}");
    let method = Method::Reference;
    let [source_type, target_type] = &spec.between;
    let field = required_field(spec, &method, &path)?;
    let target_field = spec
        .target_field
        .as_deref()
        .ok_or_else(|| WeaveError::requirement(&path, method.to_string(), "a `target_field`"))?;

    let mut index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &idx in ctx.nodes_of(target_type) {
        match node_field(&nodes[idx], target_field, &path)? {
            Value::Null => {}
            Value::Array(keys) => {
                for key in keys {
                    index.entry(canonical_key(key)).or_default().push(idx);
                }
            }
            key => index.entry(canonical_key(key)).or_default().push(idx),
        }
    }

    let mut edges = Vec::new();
    for &source in ctx.nodes_of(source_type) {
        let keys = match node_field(&nodes[source], field, &path)? {
            Value::Null => continue,
            Value::Array(keys) => keys.iter().collect::<Vec<_>>(),
            key => vec![key],
        };
        let mut targets = BTreeSet::new();
        for key in keys {
            if let Some(found) = index.get(&canonical_key(key)) {
                targets.extend(found.iter().copied().filter(|&t| t != source));
            }
        }
        if targets.is_empty() {
            continue;
        }
        let weight = edge_weight(&nodes[source], spec.weight_field.as_deref(), &path)?;
        for target in targets {
            edges.push(ResolvedEdge::between(
                (source, &nodes[source]),
                (target, &nodes[target]),
                weight,
                name,
                "reference",
            ));
        }
    }
    Ok(edges)
}
