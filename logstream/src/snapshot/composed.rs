use super::*;

use bytes::{Buf, BufMut};
use std::io::{Read, Write};

// count, total length
const HEADER_LENGTH: usize = 4 + 8;
// name length, body length, checksum
const PART_HEADER_LENGTH: usize = 2 + 8 + 4;

/// A component of the materialized state that can be saved to and restored from bytes.
pub trait SnapshotSupport: Send + Sync + 'static {
    /// Unique name of the part within a composed snapshot.
    fn name(&self) -> &str;

    fn write_snapshot(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Replace the state with the snapshot.
    fn recover_from_snapshot(&self, data: &[u8]) -> Result<()>;

    /// Back to the initial (empty) state.
    fn reset(&self);
}

/// Several `SnapshotSupport`s saved together as a single snapshot.
///
/// Layout: `{count: u32, total_length: u64}` followed by `count` parts of
/// `{name_length: u16, name, body_length: u64, crc32c: u32, body}`.
/// Every part is validated before any of them is restored.
#[derive(Clone, Default)]
pub struct ComposedSnapshot {
    parts: Vec<Arc<dyn SnapshotSupport>>,
}

impl ComposedSnapshot {
    pub fn new(parts: Vec<Arc<dyn SnapshotSupport>>) -> Self {
        Self { parts }
    }

    pub fn add(&mut self, part: Arc<dyn SnapshotSupport>) {
        self.parts.push(part);
    }

    /// Write all the parts and return the number of bytes written.
    pub fn write_snapshot(&self, sink: &mut impl Write) -> Result<u64> {
        let mut body = vec![];
        for part in &self.parts {
            let mut data = vec![];
            part.write_snapshot(&mut data)
                .with_context(|| format!("failed to write snapshot of {}", part.name()))?;

            let name = part.name().as_bytes();
            ensure!(
                name.len() <= u16::MAX as usize,
                Error::InvalidArgument(format!("snapshot part name is too long: {}", part.name()))
            );
            body.put_u16_le(name.len() as u16);
            body.put_slice(name);
            body.put_u64_le(data.len() as u64);
            body.put_u32_le(crc32c::crc32c(&data));
            body.put_slice(&data);
        }

        let mut header = Vec::with_capacity(HEADER_LENGTH);
        header.put_u32_le(self.parts.len() as u32);
        header.put_u64_le(body.len() as u64);

        sink.write_all(&header)?;
        sink.write_all(&body)?;
        Ok((header.len() + body.len()) as u64)
    }

    /// Restore all the parts from a snapshot.
    /// A snapshot failing validation leaves every part untouched.
    pub fn read_snapshot(&self, source: &mut impl Read) -> Result<()> {
        let mut bin = vec![];
        source.read_to_end(&mut bin)?;
        let parts = self.validate(&bin)?;

        for (part, data) in &parts {
            if let Err(e) = part.recover_from_snapshot(data) {
                // Don't leave some parts recovered and others not.
                self.reset();
                bail!(Error::CorruptSnapshot(format!(
                    "failed to recover {}: {e:#}",
                    part.name()
                )));
            }
        }
        Ok(())
    }

    fn validate<'a>(&self, bin: &'a [u8]) -> Result<Vec<(Arc<dyn SnapshotSupport>, &'a [u8])>> {
        let corrupt = |msg: String| Error::CorruptSnapshot(msg);

        ensure!(
            bin.len() >= HEADER_LENGTH,
            corrupt(format!("header needs {HEADER_LENGTH} bytes but got {}", bin.len()))
        );
        let mut cur = bin;
        let count = cur.get_u32_le() as usize;
        let total_length = cur.get_u64_le();
        ensure!(
            total_length == cur.len() as u64,
            corrupt(format!(
                "body should be {total_length} bytes but is {}",
                cur.len()
            ))
        );
        ensure!(
            count == self.parts.len(),
            corrupt(format!(
                "snapshot has {count} parts but {} are expected",
                self.parts.len()
            ))
        );

        let mut out = vec![];
        for _ in 0..count {
            ensure!(
                cur.len() >= PART_HEADER_LENGTH,
                corrupt("part header is truncated".to_owned())
            );
            let name_length = cur.get_u16_le() as usize;
            ensure!(
                cur.len() >= name_length,
                corrupt("part name is truncated".to_owned())
            );
            let (name, rest) = cur.split_at(name_length);
            cur = rest;
            let name = std::str::from_utf8(name)
                .map_err(|_| corrupt("part name is not utf-8".to_owned()))?;
            ensure!(
                cur.len() >= 8 + 4,
                corrupt(format!("header of part {name} is truncated"))
            );
            let body_length = cur.get_u64_le();
            let checksum = cur.get_u32_le();
            ensure!(
                body_length <= cur.len() as u64,
                corrupt(format!("body of part {name} is truncated"))
            );
            let (data, rest) = cur.split_at(body_length as usize);
            cur = rest;
            ensure!(
                crc32c::crc32c(data) == checksum,
                corrupt(format!("checksum mismatch in part {name}"))
            );
            let Some(part) = self.parts.iter().find(|p| p.name() == name) else {
                bail!(corrupt(format!("unknown part {name}")));
            };
            ensure!(
                !out.iter().any(|(p, _): &(Arc<dyn SnapshotSupport>, &[u8])| p.name() == name),
                corrupt(format!("duplicate part {name}"))
            );
            out.push((part.clone(), data));
        }
        ensure!(cur.is_empty(), corrupt("trailing bytes after the last part".to_owned()));
        Ok(out)
    }

    pub fn reset(&self) {
        for part in &self.parts {
            part.reset();
        }
    }
}
