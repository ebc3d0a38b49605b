//! Generation log parsing.
//!
//! The external generate step writes one block per decoded example:
//!
//! ```text
//! S-<id>\t<source tokens>
//! T-<id>\t<gold tokens>
//! H-<id>\t<score>\t<hypothesis tokens>
//! D-<id>\t<score>\t<detokenized hypothesis>
//! P-<id>\t<per-token scores>
//! ```
//!
//! Blocks repeat until a line starting with `Generate` (the summary line).
//! Blocks arrive in decode order, not id order. Every block is validated:
//! line prefixes, one shared id per block, no duplicate ids, and at the
//! summary line the ids seen must be exactly `0..N`.

use crate::corpus::tokenize::detokenize;
use crate::models::{AugmentError, GenerationRecord, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::{debug, info};

const END_MARKER: &str = "Generate";
const PROGRESS_EVERY: usize = 10;

/// Lazy, single-pass reader over a generation log.
///
/// Yields one `GenerationRecord` per block; stops after the summary line or
/// after the first error.
pub struct GenerationLogReader<R> {
    lines: Lines<R>,
    line_num: usize,
    seen: HashSet<usize>,
    max_id: Option<usize>,
    finished: bool,
}

impl GenerationLogReader<BufReader<File>> {
    /// Open a generation log file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            AugmentError::io(format!("opening generation log {}", path.display()), e)
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> GenerationLogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
            seen: HashSet::new(),
            max_id: None,
            finished: false,
        }
    }

    fn misaligned(&self, reason: impl Into<String>) -> AugmentError {
        AugmentError::ParseAlignment {
            line: self.line_num,
            reason: reason.into(),
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_num += 1;
                line.map(Some)
                    .map_err(|e| AugmentError::io("reading generation log", e))
            }
            None => Ok(None),
        }
    }

    fn expect_line(&mut self, prefix: char) -> Result<String> {
        match self.next_line()? {
            Some(line) => Ok(line),
            None => Err(self.misaligned(format!(
                "log ended inside a block, expected a '{prefix}-' line"
            ))),
        }
    }

    /// Split a `<prefix>-<id>\t...` line into id and remaining fields.
    fn tagged_fields<'a>(&self, line: &'a str, prefix: char) -> Result<(usize, Vec<&'a str>)> {
        let mut fields = line.split('\t');
        let head = fields.next().unwrap_or_default();

        let mut chars = head.chars();
        if chars.next() != Some(prefix) || chars.next() != Some('-') {
            return Err(self.misaligned(format!(
                "expected a '{prefix}-' line, found '{}'",
                truncate(line)
            )));
        }
        let id = head[2..].parse::<usize>().map_err(|_| {
            self.misaligned(format!("invalid example id in '{}'", truncate(head)))
        })?;
        Ok((id, fields.collect()))
    }

    fn check_id(&self, block_id: usize, id: usize, prefix: char) -> Result<()> {
        if id != block_id {
            return Err(self.misaligned(format!(
                "'{prefix}-{id}' inside the block of example {block_id}"
            )));
        }
        Ok(())
    }

    /// At the summary line, every id in `0..N` must have been seen once.
    fn check_dense(&self) -> Result<()> {
        let expected = match self.max_id {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                self.misaligned(format!("example id {max} is out of range"))
            })?,
            None => 0,
        };
        if self.seen.len() != expected {
            let missing = (0..expected)
                .find(|id| !self.seen.contains(id))
                .unwrap_or(expected);
            return Err(self.misaligned(format!(
                "example ids are not contiguous: {} blocks, highest id {}, id {missing} missing",
                self.seen.len(),
                expected.saturating_sub(1)
            )));
        }
        Ok(())
    }

    fn read_block(&mut self) -> Result<Option<GenerationRecord>> {
        let first = match self.next_line()? {
            Some(line) => line,
            None => {
                return Err(self.misaligned(format!(
                    "log ended without a '{END_MARKER}' summary line"
                )))
            }
        };
        if first.starts_with(END_MARKER) {
            self.check_dense()?;
            info!(blocks = self.seen.len(), "Reached end of generation log");
            return Ok(None);
        }

        let (id, _) = self.tagged_fields(&first, 'S')?;
        if !self.seen.insert(id) {
            return Err(self.misaligned(format!("duplicate example id {id}")));
        }
        self.max_id = Some(self.max_id.map_or(id, |max| max.max(id)));

        let gold_line = self.expect_line('T')?;
        let (gold_id, gold_fields) = self.tagged_fields(&gold_line, 'T')?;
        self.check_id(id, gold_id, 'T')?;
        let gold = match gold_fields.first() {
            Some(tokens) => detokenize(tokens),
            None => {
                return Err(self.misaligned(format!(
                    "gold line of example {id} has no token field"
                )))
            }
        };

        let hyp_line = self.expect_line('H')?;
        let (hyp_id, hyp_fields) = self.tagged_fields(&hyp_line, 'H')?;
        self.check_id(id, hyp_id, 'H')?;
        if hyp_fields.len() < 2 {
            return Err(self.misaligned(format!(
                "hypothesis line of example {id} needs a score and tokens"
            )));
        }
        let confidence = hyp_fields[0].trim().parse::<f64>().map_err(|_| {
            self.misaligned(format!(
                "invalid score '{}' for example {id}",
                truncate(hyp_fields[0])
            ))
        })?;
        let hypothesis = detokenize(hyp_fields[1]);

        let detok_line = self.expect_line('D')?;
        let (detok_id, _) = self.tagged_fields(&detok_line, 'D')?;
        self.check_id(id, detok_id, 'D')?;

        let token_line = self.expect_line('P')?;
        let (token_id, _) = self.tagged_fields(&token_line, 'P')?;
        self.check_id(id, token_id, 'P')?;

        if self.seen.len() % PROGRESS_EVERY == 0 {
            debug!(blocks = self.seen.len(), "Extracted hypotheses");
        }

        Ok(Some(GenerationRecord {
            id,
            gold,
            hypothesis,
            confidence,
        }))
    }
}

impl<R: BufRead> Iterator for GenerationLogReader<R> {
    type Item = Result<GenerationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_block() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(60) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// A fully read and validated generation log, ordered by id.
#[derive(Debug, Clone)]
pub struct GenerationLog {
    records: Vec<GenerationRecord>,
}

impl GenerationLog {
    /// Read and validate a whole log.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::collect(GenerationLogReader::new(reader))
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::collect(GenerationLogReader::open(path)?)
    }

    fn collect<R: BufRead>(reader: GenerationLogReader<R>) -> Result<Self> {
        let mut records = reader.collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.id);
        Ok(Self { records })
    }

    fn gold_len(&self, gold_count: usize) -> usize {
        self.records
            .iter()
            .take_while(|r| r.is_gold(gold_count))
            .count()
    }

    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of the gold evaluation set (ids `< gold_count`).
    ///
    /// Fails unless exactly `gold_count` such records exist.
    pub fn gold(&self, gold_count: usize) -> Result<&[GenerationRecord]> {
        // Ids are dense, so the gold records are a prefix.
        let found = self.gold_len(gold_count);
        if found != gold_count {
            return Err(AugmentError::count_mismatch(
                "gold test records in generation log",
                gold_count,
                found,
            ));
        }
        Ok(&self.records[..gold_count])
    }

    /// Augmentation candidates (ids `>= gold_count`).
    pub fn candidates(&self, gold_count: usize) -> &[GenerationRecord] {
        &self.records[self.gold_len(gold_count)..]
    }
}
