//! Tokenized split persistence.
//!
//! Each split becomes `{lang}-{split}.src` and `{lang}-{split}.tgt` inside
//! the round directory. Line `i` of both files describes example `i`; the
//! generation log's ids index into this order.

use super::tokenize::{source_line, target_line};
use crate::models::{AugmentError, Result, Split};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Paths and line count of one written split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSplit {
    pub src_path: PathBuf,
    pub tgt_path: PathBuf,
    pub lines: usize,
}

/// Writes tokenized splits into one round directory.
pub struct SplitWriter {
    round_dir: PathBuf,
}

impl SplitWriter {
    pub fn new(round_dir: impl Into<PathBuf>) -> Self {
        Self {
            round_dir: round_dir.into(),
        }
    }

    pub fn round_dir(&self) -> &Path {
        &self.round_dir
    }

    /// Write `split`, overwriting existing files and creating the directory.
    pub fn write(&self, language: &str, split: &Split) -> Result<WrittenSplit> {
        fs::create_dir_all(&self.round_dir)
            .map_err(|e| AugmentError::io("creating round directory", e))?;

        let stem = format!("{language}-{}", split.name);
        let src_path = self.round_dir.join(format!("{stem}.src"));
        let tgt_path = self.round_dir.join(format!("{stem}.tgt"));

        let mut src = open_writer(&src_path)?;
        let mut tgt = open_writer(&tgt_path)?;

        for example in &split.examples {
            writeln!(src, "{}", source_line(example))
                .map_err(|e| AugmentError::io("writing source split", e))?;
            writeln!(tgt, "{}", target_line(example))
                .map_err(|e| AugmentError::io("writing target split", e))?;
        }

        src.flush()
            .map_err(|e| AugmentError::io("flushing source split", e))?;
        tgt.flush()
            .map_err(|e| AugmentError::io("flushing target split", e))?;

        info!(
            split = %split.name,
            lines = split.len(),
            dir = %self.round_dir.display(),
            "Wrote split"
        );

        Ok(WrittenSplit {
            src_path,
            tgt_path,
            lines: split.len(),
        })
    }

    /// Write several splits in order.
    pub fn write_all<'a>(
        &self,
        language: &str,
        splits: impl IntoIterator<Item = &'a Split>,
    ) -> Result<Vec<WrittenSplit>> {
        splits
            .into_iter()
            .map(|split| self.write(language, split))
            .collect()
    }
}

fn open_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .map_err(|e| AugmentError::io(format!("creating {}", path.display()), e))?;
    Ok(BufWriter::new(file))
}
