//! Gold corpus loading.
//!
//! Corpus files are tab-separated `source<TAB>target<TAB>tag`, no header,
//! one file per split per language: `{lang}-train-low`, `{lang}-dev`,
//! `{lang}-test`. The hallucinated candidate pool uses the same format in
//! `{lang}-{pool_suffix}`.

use super::tokenize::is_lossy_form;
use crate::models::{AugmentError, Config, Example, GoldSplits, Provenance, Result, Split, SplitName};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const COLUMNS: usize = 3;

/// Reads gold splits and the candidate pool for a language.
pub struct CorpusLoader {
    data_root: PathBuf,
    pool_suffix: String,
}

impl CorpusLoader {
    pub fn new(data_root: impl Into<PathBuf>, pool_suffix: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            pool_suffix: pool_suffix.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.data_root.clone(),
            config.augmentation.pool_suffix.clone(),
        )
    }

    fn path(&self, language: &str, suffix: &str) -> PathBuf {
        self.data_root.join(format!("{language}-{suffix}"))
    }

    /// Load `train-low`, `valid` (from `-dev`) and `test` for a language.
    pub fn load_gold_splits(&self, language: &str) -> Result<GoldSplits> {
        let train = self.load_split(language, SplitName::TrainLow)?;
        let valid = self.load_split(language, SplitName::Valid)?;
        let test = self.load_split(language, SplitName::Test)?;

        info!(
            language,
            train = train.len(),
            valid = valid.len(),
            test = test.len(),
            "Loaded gold splits"
        );
        Ok(GoldSplits { train, valid, test })
    }

    /// Load one gold split.
    pub fn load_split(&self, language: &str, name: SplitName) -> Result<Split> {
        let path = self.path(language, name.corpus_suffix());
        let examples = read_examples(&path, Provenance::Gold)?;
        Ok(Split::new(name, examples))
    }

    /// Number of gold test examples; ids below this are the evaluation set.
    pub fn gold_test_count(&self, language: &str) -> Result<usize> {
        Ok(self.load_split(language, SplitName::Test)?.len())
    }

    /// Load the hallucinated candidate pool.
    pub fn load_pool(&self, language: &str) -> Result<Vec<Example>> {
        let path = self.path(language, &self.pool_suffix);
        read_examples(&path, Provenance::Hallucinated)
    }

    /// The split decoded by the initial round: gold test rows followed by
    /// the candidate pool. Row index equals generation id.
    pub fn load_generation_frame(&self, language: &str) -> Result<Split> {
        let gold = self.load_split(language, SplitName::Test)?;
        let gold_count = gold.len();
        let pool = self.load_pool(language)?;
        let pool_count = pool.len();

        let frame = gold.extended(pool);
        info!(
            language,
            gold = gold_count,
            candidates = pool_count,
            "Built initial generation frame"
        );
        Ok(frame)
    }
}

/// Parse a corpus file into examples.
///
/// Blank lines are skipped; every other line must be valid UTF-8 with
/// exactly three non-empty tab-separated columns.
pub fn read_examples(path: &Path, provenance: Provenance) -> Result<Vec<Example>> {
    let bytes = fs::read(path)
        .map_err(|e| AugmentError::io(format!("reading corpus file {}", path.display()), e))?;

    let mut examples = Vec::new();
    for (idx, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_num = idx + 1;
        let line = std::str::from_utf8(raw).map_err(|e| AugmentError::CorpusFormat {
            path: path.to_owned(),
            line: line_num,
            reason: format!("invalid UTF-8: {e}"),
        })?;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }

        examples.push(parse_row(line, provenance).map_err(|reason| {
            AugmentError::CorpusFormat {
                path: path.to_owned(),
                line: line_num,
                reason,
            }
        })?);
    }

    let lossy = examples
        .iter()
        .filter(|e| is_lossy_form(&e.source) || is_lossy_form(&e.target))
        .count();
    if lossy > 0 {
        warn!(
            path = %path.display(),
            rows = lossy,
            "Forms containing whitespace lose it when tokenized"
        );
    }

    debug!(path = %path.display(), rows = examples.len(), "Read corpus file");
    Ok(examples)
}

fn parse_row(line: &str, provenance: Provenance) -> std::result::Result<Example, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != COLUMNS {
        return Err(format!(
            "expected {COLUMNS} tab-separated columns, found {}",
            fields.len()
        ));
    }
    if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
        return Err(format!("column {} is empty", pos + 1));
    }
    Ok(Example::new(fields[0], fields[1], fields[2], provenance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_corpus(dir: &Path, name: &str, content: &[u8]) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_corpus(
            dir.path(),
            "kat-train-low",
            "ყვავილი\tყვავილები\tN;NOM;PL\nwalk\twalked\tV;PST\n".as_bytes(),
        );
        write_corpus(dir.path(), "kat-dev", b"go\twent\tV;PST\n");
        write_corpus(dir.path(), "kat-test", b"sing\tsang\tV;PST\r\n\nrun\tran\tV;PST\n");
        write_corpus(dir.path(), "kat-hall", b"blip\tblipped\tV;PST\n");
        dir
    }

    #[test]
    fn test_load_gold_splits() {
        let dir = fixture();
        let loader = CorpusLoader::new(dir.path(), "hall");
        let splits = loader.load_gold_splits("kat").unwrap();

        assert_eq!(splits.train.len(), 2);
        assert_eq!(splits.train.examples[0].source, "ყვავილი");
        assert_eq!(splits.valid.name, SplitName::Valid);
        assert_eq!(splits.test.len(), 2);
        assert_eq!(splits.test.examples[0].tag, "V;PST");
        assert!(splits
            .test
            .examples
            .iter()
            .all(|e| e.provenance == Provenance::Gold));
    }

    #[test]
    fn test_generation_frame_orders_gold_first() {
        let dir = fixture();
        let loader = CorpusLoader::new(dir.path(), "hall");
        let frame = loader.load_generation_frame("kat").unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(loader.gold_test_count("kat").unwrap(), 2);
        assert_eq!(frame.examples[2].source, "blip");
        assert_eq!(frame.examples[2].provenance, Provenance::Hallucinated);
    }

    #[test]
    fn test_wrong_column_count() {
        let dir = TempDir::new().unwrap();
        write_corpus(dir.path(), "bad", b"ok\tok\tV\nmissing\ttag\n");

        let err = read_examples(&dir.path().join("bad"), Provenance::Gold).unwrap_err();
        match err {
            AugmentError::CorpusFormat { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("found 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        write_corpus(dir.path(), "bad", b"a\tb\tV\n\xff\xfe\tb\tV\n");

        let err = read_examples(&dir.path().join("bad"), Provenance::Gold).unwrap_err();
        assert!(matches!(err, AugmentError::CorpusFormat { line: 2, .. }));
    }

    #[test]
    fn test_empty_column_rejected() {
        let dir = TempDir::new().unwrap();
        write_corpus(dir.path(), "bad", b"a\t\tV\n");

        let err = read_examples(&dir.path().join("bad"), Provenance::Gold).unwrap_err();
        assert!(matches!(err, AugmentError::CorpusFormat { line: 1, .. }));
    }

    #[test]
    fn test_multi_word_forms_still_load() {
        let dir = TempDir::new().unwrap();
        write_corpus(dir.path(), "kat-train-low", b"look up	looked up	V;PST
");

        let examples = read_examples(&dir.path().join("kat-train-low"), Provenance::Gold).unwrap();
        assert_eq!(examples[0].target, "looked up");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = CorpusLoader::new("/nonexistent", "hall");
        let err = loader.load_split("kat", SplitName::TrainLow).unwrap_err();
        assert!(matches!(err, AugmentError::Io { .. }));
    }
}
