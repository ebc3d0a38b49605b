//! Representation probing over the initial round's encoder dumps.
//!
//! The generate step of the initial round can dump encoder states as JSON,
//! bucketed by padded source length:
//!
//! - `{lang}_embeddings.json`: length → `[position][item][dim]`
//! - `{lang}_src_tokens.json`: length → `[item][position]`
//! - `{lang}_ids.json`: length → `[item]`
//!
//! Probing groups the encoder vector of every source position under its
//! token id, for gold test items only, and writes
//! `{lang}_token_id_to_embeds.json`.

use crate::models::{AugmentError, Result};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type Embeddings = BTreeMap<String, Vec<Vec<Vec<f32>>>>;
type TokenIds = BTreeMap<String, Vec<Vec<u32>>>;
type ItemIds = BTreeMap<String, Vec<usize>>;

/// Encoder vectors grouped by source token id.
pub type TokenEmbeddings = BTreeMap<u32, Vec<Vec<f32>>>;

/// Summary of one probing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSummary {
    pub items: usize,
    pub tokens: usize,
    pub vectors: usize,
    pub output: PathBuf,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| AugmentError::io(format!("reading {}", path.display()), e))?;
    serde_json::from_str(&content)
        .map_err(|e| AugmentError::ParseError(format!("{}: {e}", path.display())))
}

fn shape_error(bucket: &str, reason: String) -> AugmentError {
    AugmentError::InvalidInput(format!("encoder dump bucket '{bucket}': {reason}"))
}

/// Group encoder vectors by token id for items with id `< gold_count`.
///
/// Fails if the dumps disagree on shapes or if item 0 never appears.
pub fn group_by_token(
    embeddings: &Embeddings,
    token_ids: &TokenIds,
    item_ids: &ItemIds,
    gold_count: usize,
) -> Result<(TokenEmbeddings, BTreeSet<usize>)> {
    let mut grouped = TokenEmbeddings::new();
    let mut processed = BTreeSet::new();

    for (bucket, states) in embeddings {
        let tokens = token_ids
            .get(bucket)
            .ok_or_else(|| shape_error(bucket, "missing from token dump".to_string()))?;
        let items = item_ids
            .get(bucket)
            .ok_or_else(|| shape_error(bucket, "missing from id dump".to_string()))?;
        if tokens.len() != items.len() {
            return Err(shape_error(
                bucket,
                format!("{} token rows but {} item ids", tokens.len(), items.len()),
            ));
        }

        for (i, (&item, row)) in items.iter().zip(tokens).enumerate() {
            if item >= gold_count {
                continue;
            }
            processed.insert(item);
            for (j, &token) in row.iter().enumerate() {
                let vector = states
                    .get(j)
                    .and_then(|position| position.get(i))
                    .ok_or_else(|| {
                        shape_error(bucket, format!("no encoder state at position {j}, item {i}"))
                    })?;
                grouped.entry(token).or_default().push(vector.clone());
            }
        }
        debug!(bucket = %bucket, items = items.len(), "Probed bucket");
    }

    if !processed.contains(&0) {
        return Err(AugmentError::InvalidInput(
            "gold test item 0 not present in encoder dumps".to_string(),
        ));
    }
    Ok((grouped, processed))
}

/// Run probing over the dumps in `round_dir` and write the grouped vectors.
pub fn probe_representations(
    round_dir: &Path,
    language: &str,
    gold_count: usize,
) -> Result<ProbeSummary> {
    let embeddings: Embeddings = read_json(&round_dir.join(format!("{language}_embeddings.json")))?;
    let token_ids: TokenIds = read_json(&round_dir.join(format!("{language}_src_tokens.json")))?;
    let item_ids: ItemIds = read_json(&round_dir.join(format!("{language}_ids.json")))?;

    let (grouped, processed) = group_by_token(&embeddings, &token_ids, &item_ids, gold_count)?;

    let output = round_dir.join(format!("{language}_token_id_to_embeds.json"));
    let content = serde_json::to_string(&grouped)
        .map_err(|e| AugmentError::Internal(format!("Serializing token embeddings: {e}")))?;
    fs::write(&output, content).map_err(|e| AugmentError::io("writing token embeddings", e))?;

    let summary = ProbeSummary {
        items: processed.len(),
        tokens: grouped.len(),
        vectors: grouped.values().map(Vec::len).sum(),
        output,
    };
    info!(
        language,
        items = summary.items,
        tokens = summary.tokens,
        vectors = summary.vectors,
        "Grouped encoder states by token"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dumps() -> (Embeddings, TokenIds, ItemIds) {
        // One bucket of length 2 holding items 0 (gold) and 5 (candidate).
        let embeddings = BTreeMap::from([(
            "2".to_string(),
            vec![
                vec![vec![0.1, 0.2], vec![9.0, 9.0]],
                vec![vec![0.3, 0.4], vec![9.0, 9.0]],
            ],
        )]);
        let token_ids = BTreeMap::from([("2".to_string(), vec![vec![7, 8], vec![7, 7]])]);
        let item_ids = BTreeMap::from([("2".to_string(), vec![0, 5])]);
        (embeddings, token_ids, item_ids)
    }

    #[test]
    fn test_groups_gold_items_only() {
        let (embeddings, token_ids, item_ids) = dumps();
        let (grouped, processed) = group_by_token(&embeddings, &token_ids, &item_ids, 3).unwrap();

        assert_eq!(processed.into_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(grouped[&7], vec![vec![0.1, 0.2]]);
        assert_eq!(grouped[&8], vec![vec![0.3, 0.4]]);
    }

    #[test]
    fn test_missing_item_zero_fails() {
        let (embeddings, token_ids, _) = dumps();
        let item_ids = BTreeMap::from([("2".to_string(), vec![1, 5])]);
        let err = group_by_token(&embeddings, &token_ids, &item_ids, 3).unwrap_err();
        assert!(matches!(err, AugmentError::InvalidInput(_)));
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let (embeddings, _, item_ids) = dumps();
        let token_ids = BTreeMap::from([("2".to_string(), vec![vec![7, 8, 9], vec![7, 7]])]);
        let err = group_by_token(&embeddings, &token_ids, &item_ids, 3).unwrap_err();
        assert!(matches!(err, AugmentError::InvalidInput(_)));
    }

    #[test]
    fn test_probe_writes_output() {
        let dir = TempDir::new().unwrap();
        let (embeddings, token_ids, item_ids) = dumps();
        fs::write(dir.path().join("kat_embeddings.json"), serde_json::to_string(&embeddings).unwrap()).unwrap();
        fs::write(dir.path().join("kat_src_tokens.json"), serde_json::to_string(&token_ids).unwrap()).unwrap();
        fs::write(dir.path().join("kat_ids.json"), serde_json::to_string(&item_ids).unwrap()).unwrap();

        let summary = probe_representations(dir.path(), "kat", 3).unwrap();
        assert_eq!(summary.items, 1);
        assert_eq!(summary.tokens, 2);
        assert_eq!(summary.vectors, 2);

        let written: TokenEmbeddings =
            serde_json::from_str(&fs::read_to_string(&summary.output).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
    }
}
