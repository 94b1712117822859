//! Newline-delimited JSON persistence for stage outputs.
//!
//! Each pipeline stage writes one file with one JSON object per line, so any
//! stage can be re-run from the previous stage's file. Whole-file writes are
//! atomic (temp file in the destination directory, then rename); the
//! incremental [`JsonlWriter`] flushes every line so a long extraction run
//! leaves a usable prefix behind if it is interrupted.

use crate::error::KgError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Write `records` to `path`, one JSON object per line, replacing any
/// existing file atomically.
pub fn write_jsonl<'a, T, I>(path: &Path, records: I) -> Result<usize, KgError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| KgError::io(dir, e))?;

    let tmp = NamedTempFile::new_in(dir).map_err(|e| KgError::io(dir, e))?;
    let mut out = BufWriter::new(tmp);
    let mut count = 0usize;
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n").map_err(|e| KgError::io(path, e))?;
        count += 1;
    }
    let tmp = out
        .into_inner()
        .map_err(|e| KgError::io(path, e.into_error()))?;
    tmp.persist(path).map_err(|e| KgError::io(path, e.error))?;

    debug!("Wrote {} records to {}", count, path.display());
    Ok(count)
}

/// Read every record of a JSONL file. Blank lines are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, KgError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => KgError::NotFound {
            path: path.to_path_buf(),
        },
        _ => KgError::io(path, e),
    })?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| KgError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| KgError::RecordDecode {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Line-at-a-time JSONL writer that truncates its target on creation.
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self, KgError> {
        let dir = parent_dir(path);
        std::fs::create_dir_all(dir).map_err(|e| KgError::io(dir, e))?;
        let file = File::create(path).map_err(|e| KgError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        })
    }

    /// Append one record and flush it to disk.
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), KgError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out
            .write_all(b"\n")
            .and_then(|_| self.out.flush())
            .map_err(|e| KgError::io(self.path.as_path(), e))?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and sync; returns the number of records written.
    pub fn finish(mut self) -> Result<usize, KgError> {
        self.out
            .flush()
            .map_err(|e| KgError::io(self.path.as_path(), e))?;
        self.out
            .get_ref()
            .sync_all()
            .map_err(|e| KgError::io(self.path.as_path(), e))?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, ExtractionResult};

    fn chunk(id: &str) -> Chunk {
        Chunk {
            chunk_id: id.into(),
            source_document: "书.pdf".into(),
            page: 1,
            text: "第一行\n第二行".into(),
            image_refs: vec!["img/书_p1_1.png".into()],
            formula_candidates: vec!["a = b".into()],
        }
    }

    #[test]
    fn write_then_read_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/chunks.jsonl");
        let chunks = vec![chunk("x-p1-c1"), chunk("x-p1-c2")];

        assert_eq!(write_jsonl(&path, &chunks).unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("书.pdf"), "non-ASCII kept verbatim");

        let back: Vec<Chunk> = read_jsonl(&path).unwrap();
        assert_eq!(back, chunks);
    }

    #[test]
    fn rewrite_replaces_previous_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.jsonl");
        write_jsonl(&path, &[chunk("a"), chunk("b"), chunk("c")]).unwrap();
        write_jsonl(&path, &[chunk("d")]).unwrap();
        let back: Vec<Chunk> = read_jsonl(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].chunk_id, "d");
    }

    #[test]
    fn decode_error_reports_line_number() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.jsonl");
        std::fs::write(
            &path,
            "{\"chunk_id\":\"a\",\"entities\":[],\"relations\":[]}\n\n{oops}\n",
        )
        .unwrap();
        match read_jsonl::<ExtractionResult>(&path).unwrap_err() {
            KgError::RecordDecode { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_jsonl::<Chunk>(Path::new("/no/such/file.jsonl")).unwrap_err();
        assert!(matches!(err, KgError::NotFound { .. }));
    }

    #[test]
    fn incremental_writer_flushes_each_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out/extractions.jsonl");
        let mut writer = JsonlWriter::create(&path).unwrap();
        writer.write(&ExtractionResult::empty("a-p1-c1")).unwrap();
        // Visible before finish().
        let partial: Vec<ExtractionResult> = read_jsonl(&path).unwrap();
        assert_eq!(partial.len(), 1);
        writer.write(&ExtractionResult::empty("a-p1-c2")).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
        let all: Vec<ExtractionResult> = read_jsonl(&path).unwrap();
        assert_eq!(all[1].chunk_id, "a-p1-c2");
    }
}
