//! Embed resolution: turning node text into vector sets.
//!
//! Three patterns are supported:
//!
//! - simple: one text, one vector (`field` + `model`)
//! - chunked: long text split by a chunking provider, one vector per piece, then aggregated
//! - list: a list-valued field, one vector per element, then aggregated
//!
//! plus `combine`, a weighted blend of previously resolved embeds. Embeds of one record are
//! resolved in the global topological order computed by [`ResolutionContext`], so a combine
//! always sees the sets it refers to, whether they belong to the same node or to another node
//! type extracted from the same record.

use serde_json::Value;

use crate::{
    config::{CombineRef, EmbedSpec},
    context::{EmbedKey, ResolutionContext},
    error::WeaveError,
    extract::{DraftNode, RecordNodes},
    pipeline::{evaluate, text_of, PipelineSpec, Scope},
    providers::ProviderKind,
    vector::{weighted_blend, Aggregate, Vector, VectorSet},
};

/// Resolve every declared embed for every node of `nodes`, storing the sets on the drafts.
pub fn resolve_embeds(
    ctx: &ResolutionContext<'_>,
    nodes: &mut RecordNodes<'_>,
) -> Result<(), WeaveError> {
    for key in ctx.embed_order() {
        let spec = ctx.embed_spec(key)?;
        let count = nodes.by_type.get(&key.node_type).map(Vec::len).unwrap_or(0);
        let mut resolved = Vec::with_capacity(count);
        for idx in 0..count {
            let set = if spec.is_combine() {
                resolve_combine(ctx, key, spec, nodes, idx)?
            } else {
                let draft = &nodes.by_type[&key.node_type][idx];
                resolve_direct(ctx, key, spec, draft, &nodes.source_key())?
            };
            resolved.push(set);
        }
        if let Some(drafts) = nodes.by_type.get_mut(&key.node_type) {
            for (draft, set) in drafts.iter_mut().zip(resolved) {
                draft.vectors.insert(key.name.clone(), set);
            }
        }
    }
    Ok(())
}

/// Texts fed to the embedding provider for one node, before chunking.
fn embed_inputs(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(text_of).collect(),
        other => vec![text_of(other)],
    }
}

fn resolve_direct<'a>(
    ctx: &ResolutionContext<'a>,
    key: &EmbedKey,
    spec: &'a EmbedSpec,
    draft: &DraftNode<'_>,
    source_key: &str,
) -> Result<VectorSet, WeaveError> {
    let path = key.path();
    let field = spec.field.as_deref().unwrap_or_default();
    let value = match draft.fields.get(field) {
        Some(value) => value.clone(),
        None => evaluate(
            &PipelineSpec::path(field),
            draft.item,
            Scope {
                path: &format!("{path}.field"),
                record: source_key,
            },
        )?,
    };

    let mut texts = embed_inputs(&value);
    if let Some(chunking) = &spec.chunking {
        let params = chunking.resolve(ctx.config.defaults.chunking.as_ref());
        let chunker = ctx.chunker(&params.method)?;
        let mut pieces = Vec::new();
        for text in texts.iter() {
            pieces.extend(chunker.chunk(text, params.max_tokens, params.overlap)?);
        }
        texts = pieces;
    }

    let model = ctx.model_of(spec).unwrap_or_default();
    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        let vectors = ctx.embedder(model)?.embed(&texts)?;
        if vectors.len() != texts.len() {
            return Err(ProviderKind::Embedding.error(
                model,
                format!(
                    "returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                ),
            ));
        }
        vectors
    };
    ctx.aggregate_of(spec).apply(vectors, &path)
}

fn resolve_combine(
    ctx: &ResolutionContext<'_>,
    key: &EmbedKey,
    spec: &EmbedSpec,
    nodes: &RecordNodes<'_>,
    idx: usize,
) -> Result<VectorSet, WeaveError> {
    let path = key.path();
    let mut parts: Vec<(f64, Vector)> = Vec::with_capacity(spec.combine.len());
    for (i, combine_ref) in spec.combine.iter().enumerate() {
        let ref_path = format!("{path}.combine.{i}");
        let target = EmbedKey::parse_ref(&key.node_type, &combine_ref.target);
        let set = referenced_set(nodes, &key.node_type, &target, idx, &ref_path)?;
        parts.push((combine_ref.weight, collapse(combine_ref, set, &ref_path)?));
    }
    let borrowed = parts.iter().map(|(w, v)| (*w, v)).collect::<Vec<_>>();
    Ok(VectorSet::Single(weighted_blend(&borrowed, &path)?))
}

/// The set a combine ref points at. Same-type refs read the node's own set; cross-type refs read
/// the nodes of that type extracted from the same record, pooling their vectors when there are
/// several.
fn referenced_set(
    nodes: &RecordNodes<'_>,
    owner: &str,
    target: &EmbedKey,
    idx: usize,
    ref_path: &str,
) -> Result<VectorSet, WeaveError> {
    let drafts = nodes
        .by_type
        .get(&target.node_type)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let lookup = |draft: &DraftNode<'_>| {
        draft.vectors.get(&target.name).cloned().ok_or_else(|| {
            WeaveError::reference(ref_path, format!("embed '{target}' was not resolved"))
        })
    };
    if target.node_type == owner {
        return drafts
            .get(idx)
            .ok_or_else(|| WeaveError::reference(ref_path, format!("no node {idx} of '{owner}'")))
            .and_then(lookup);
    }
    match drafts {
        [] => Err(WeaveError::Extraction {
            path: ref_path.to_string(),
            record: nodes.source_key(),
            message: format!("record has no '{}' node to take '{target}' from", target.node_type),
        }),
        [only] => lookup(only),
        many => {
            let mut pooled = Vec::new();
            for draft in many {
                pooled.extend(lookup(draft)?.into_vectors());
            }
            Ok(VectorSet::Multi(pooled))
        }
    }
}

fn collapse(
    combine_ref: &CombineRef,
    set: VectorSet,
    ref_path: &str,
) -> Result<Vector, WeaveError> {
    let set = match (set, combine_ref.aggregate) {
        (VectorSet::Single(v), _) => return Ok(v),
        (VectorSet::Multi(vectors), _) if vectors.is_empty() => VectorSet::Multi(vectors),
        (VectorSet::Multi(vectors), Some(aggregate)) if aggregate != Aggregate::None => {
            aggregate.apply(vectors, ref_path)?
        }
        (VectorSet::Multi(_), _) => {
            return Err(WeaveError::Config(format!(
                "{ref_path}: ref '{}' is uncollapsed and needs an explicit `aggregate`",
                combine_ref.target
            )))
        }
    };
    match set {
        VectorSet::Single(v) => Ok(v),
        VectorSet::Multi(_) => Err(WeaveError::shape(
            ref_path,
            format!("ref '{}' has no vectors to blend", combine_ref.target),
        )),
    }
}
