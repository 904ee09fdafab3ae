//! Product sinks
//!
//! [`JsonLinesSink`] appends one JSON object per product to a file and
//! recovers its checkpoint from the last line on reopen. [`MemorySink`]
//! collects products in memory behind a shared handle.

use crate::output::traits::{OutputResult, ProductMatch, ProductSink};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Appends products to a JSON-lines file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
    checkpoint: u64,
}

impl JsonLinesSink {
    /// Opens (or creates) the file at `path` for appending
    ///
    /// The checkpoint is the highest `seq` found in the existing file.
    /// Lines that do not parse, such as a partial last line left by a crash,
    /// are skipped.
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let checkpoint = if path.exists() {
            read_checkpoint(path)?
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!("Opened product sink {} at checkpoint {}", path.display(), checkpoint);

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            checkpoint,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_checkpoint(path: &Path) -> OutputResult<u64> {
    let reader = BufReader::new(File::open(path)?);
    let mut checkpoint = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ProductMatch>(&line) {
            Ok(product) => checkpoint = checkpoint.max(product.seq),
            Err(e) => tracing::warn!("Skipping unreadable line in {}: {}", path.display(), e),
        }
    }

    Ok(checkpoint)
}

impl ProductSink for JsonLinesSink {
    fn emit(&mut self, product: &ProductMatch) -> OutputResult<()> {
        // Already written before a restart
        if product.seq <= self.checkpoint {
            return Ok(());
        }

        let line = serde_json::to_string(product)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.checkpoint = product.seq;
        Ok(())
    }

    fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::error!("Failed to flush {}: {}", self.path.display(), e);
        }
    }
}

/// Collects products in memory
///
/// Clones share the same buffer, so a test can keep one clone and hand the
/// other to the controller.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    products: Arc<Mutex<Vec<ProductMatch>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn products(&self) -> Vec<ProductMatch> {
        self.products.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.products.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.lock().is_empty()
    }
}

impl ProductSink for MemorySink {
    fn emit(&mut self, product: &ProductMatch) -> OutputResult<()> {
        let mut products = self.products.lock();
        if products.last().map_or(true, |last| product.seq > last.seq) {
            products.push(product.clone());
        }
        Ok(())
    }

    fn checkpoint(&self) -> u64 {
        self.products.lock().last().map_or(0, |last| last.seq)
    }

    fn flush(&mut self) -> OutputResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::{CanonicalUrl, Domain};
    use chrono::Utc;
    use tempfile::TempDir;

    fn product(seq: u64, path: &str) -> ProductMatch {
        ProductMatch {
            seq,
            url: CanonicalUrl::restore(&format!("https://shop.com{}", path)).unwrap(),
            domain: Domain::new("shop.com"),
            pattern: "/p/".to_string(),
            found_on: CanonicalUrl::restore("https://shop.com/").ok(),
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_jsonl_sink_writes_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");

        let mut sink = JsonLinesSink::open(&path).unwrap();
        assert_eq!(sink.checkpoint(), 0);
        sink.emit(&product(1, "/p/1")).unwrap();
        sink.emit(&product(2, "/p/2")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.checkpoint(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ProductMatch = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.url.as_str(), "https://shop.com/p/1");
    }

    #[test]
    fn test_jsonl_sink_reopen_restores_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");

        {
            let mut sink = JsonLinesSink::open(&path).unwrap();
            sink.emit(&product(1, "/p/1")).unwrap();
            sink.emit(&product(2, "/p/2")).unwrap();
        }

        let mut sink = JsonLinesSink::open(&path).unwrap();
        assert_eq!(sink.checkpoint(), 2);

        // Replayed products are not written twice
        sink.emit(&product(2, "/p/2")).unwrap();
        sink.emit(&product(3, "/p/3")).unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_jsonl_sink_skips_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");

        let mut content = serde_json::to_string(&product(4, "/p/4")).unwrap();
        content.push_str("\n{\"seq\":5,\"url\":\"https://sh");
        std::fs::write(&path, content).unwrap();

        let sink = JsonLinesSink::open(&path).unwrap();
        assert_eq!(sink.checkpoint(), 4);
    }

    #[test]
    fn test_jsonl_sink_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/products.jsonl");
        let sink = JsonLinesSink::open(&path).unwrap();
        assert_eq!(sink.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut boxed: Box<dyn ProductSink> = Box::new(sink.clone());

        boxed.emit(&product(1, "/p/1")).unwrap();
        boxed.emit(&product(1, "/p/1")).unwrap();
        boxed.emit(&product(2, "/p/2")).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(boxed.checkpoint(), 2);
    }
}
