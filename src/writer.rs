//! Tile artifact persistence
//!
//! Artifacts live in a flat `data/` directory under the configured output
//! root, keyed by node code: `<output>/data/<node_code>.bin`. The directory
//! layout is the only contract; artifact bytes are produced elsewhere.

use crate::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes encoded tile artifacts under an output root
#[derive(Debug)]
pub struct TileWriter {
    data_dir: PathBuf,
}

impl TileWriter {
    /// Ensure `<output>/data/` exists and return a writer over it
    ///
    /// Creation is idempotent; concurrent writers over the same root are
    /// fine as long as their node codes differ.
    pub fn new(output_root: &Path) -> Result<Self> {
        let data_dir = output_root.join("data");
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// Write one artifact, replacing any previous artifact of the same node
    pub fn write(&self, node_code: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.data_dir.join(format!("{node_code}.bin"));
        let mut file = File::create(&path)?;
        file.write_all(bytes)?;
        file.flush()?;
        debug!(node_code, bytes = bytes.len(), path = %path.display(), "wrote tile artifact");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cloud_tiler_writer_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_creates_data_directory() {
        let root = temp_root("create");
        let _writer = TileWriter::new(&root).unwrap();
        assert!(root.join("data").is_dir());

        // Idempotent over an existing tree
        let _writer = TileWriter::new(&root).unwrap();
        assert!(root.join("data").is_dir());
    }

    #[test]
    fn test_write_and_overwrite() {
        let root = temp_root("write");
        let writer = TileWriter::new(&root).unwrap();

        let path = writer.write("R01", b"first").unwrap();
        assert_eq!(path, root.join("data").join("R01.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        let path = writer.write("R01", b"second artifact").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second artifact");
    }
}
