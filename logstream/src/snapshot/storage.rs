use super::*;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "snapshot-";

/// Directory of `snapshot-<position>` files.
#[derive(Clone, Debug)]
pub struct SnapshotStorage {
    dir: PathBuf,
}

impl SnapshotStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_owned();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_of(&self, position: Position) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{position:020}"))
    }

    /// Write a snapshot reflecting `position`.
    /// The file appears under its final name only after its content is durable.
    pub fn write(&self, position: Position, composed: &ComposedSnapshot) -> Result<PathBuf> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-snapshot")
            .tempfile_in(&self.dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            composed.write_snapshot(&mut w)?;
            w.flush()?;
        }
        tmp.as_file().sync_all()?;

        let path = self.path_of(position);
        tmp.persist(&path).map_err(|e| e.error)?;
        File::open(&self.dir)?.sync_all()?;
        Ok(path)
    }

    pub fn open_snapshot(&self, position: Position) -> Result<File> {
        let path = self.path_of(position);
        let f = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(f)
    }

    /// Positions of the stored snapshots in ascending order.
    pub fn list(&self) -> Result<Vec<Position>> {
        let mut out = vec![];
        for e in std::fs::read_dir(&self.dir)? {
            let e = e?;
            let name = e.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(position) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|x| x.parse::<Position>().ok())
            {
                out.push(position);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Delete the snapshots before `position`.
    pub fn delete_before(&self, position: Position) -> Result<()> {
        for p in self.list()? {
            if p < position {
                std::fs::remove_file(self.path_of(p))?;
                debug!("deleted snapshot at {p}");
            }
        }
        Ok(())
    }
}
