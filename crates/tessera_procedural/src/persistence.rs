//! # Overlay Persistence
//!
//! Binary codec for the durable part of the mutation overlay, written to a
//! flat key-value store.
//!
//! ## Format
//!
//! Each record is LZ4-compressed (size prepended) and decompresses to:
//!
//! ```text
//! [4 bytes: magic "TSDC" | "TSST"]
//! [4 bytes: format version]
//!
//! destroyed cells ("TSDC"):
//! [4 bytes: count N]
//! [N x 12 bytes: (x, y, z) i32 LE]
//!
//! structures ("TSST"):
//! [4 bytes: anchor count A]
//! [A x 12 bytes: anchor (x, y, z) i32 LE]
//! [4 bytes: template count T]
//! [T x 4 bytes: template id u32 LE]
//!
//! [4 bytes: CRC32 of everything above]
//! ```
//!
//! Any damage is fatal. Resuming with a partial overlay would silently
//! resurrect removed tiles.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::chunk::WorldCell;
use crate::error::{WorldError, WorldResult};
use crate::overlay::MutationOverlay;
use crate::structure::{StructureCatalog, StructureInstance, TemplateId};

/// Storage key of the destroyed-cell record.
pub const DESTROYED_KEY: &str = "tessera.destroyed_cells";

/// Storage key of the structure registry record.
pub const STRUCTURES_KEY: &str = "tessera.structures";

/// Magic bytes of the destroyed-cell record.
const DESTROYED_MAGIC: &[u8; 4] = b"TSDC";

/// Magic bytes of the structure registry record.
const STRUCTURES_MAGIC: &[u8; 4] = b"TSST";

/// Current record format version.
const FORMAT_VERSION: u32 = 1;

/// Magic + version.
const HEADER_LEN: usize = 8;

/// Trailing CRC32.
const CRC_LEN: usize = 4;

/// Flat blob storage.
pub trait KeyValueStore {
    /// Reads the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn get(&self, key: &str) -> WorldResult<Option<Vec<u8>>>;

    /// Stores `blob` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn set(&mut self, key: &str, blob: &[u8]) -> WorldResult<()>;
}

/// In-memory store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> WorldResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &[u8]) -> WorldResult<()> {
        self.entries.insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

/// Directory-backed store, one file per key.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// target, so a crash leaves either the old or the new record on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> WorldResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> WorldResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, blob: &[u8]) -> WorldResult<()> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.bin.tmp"));

        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(blob)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

/// One persisted cell, as laid out on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct CellRecord {
    x: i32,
    y: i32,
    z: i32,
}

impl CellRecord {
    const SIZE: usize = std::mem::size_of::<Self>();

    fn from_cell(cell: WorldCell) -> Self {
        Self {
            x: cell.x.to_le(),
            y: cell.y.to_le(),
            z: cell.z.to_le(),
        }
    }

    fn to_cell(self) -> WorldCell {
        WorldCell::from_triple(i32::from_le(self.x), i32::from_le(self.y), i32::from_le(self.z))
    }
}

/// Overlay state decoded from storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedOverlay {
    /// Destroyed cells.
    pub destroyed: Vec<WorldCell>,
    /// Registered structures, rebuilt against the catalog.
    pub structures: Vec<StructureInstance>,
}

impl PersistedOverlay {
    /// Moves the decoded state into `overlay`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CorruptPersistence`] if restored structures
    /// overlap.
    pub fn restore_into(self, overlay: &mut MutationOverlay) -> WorldResult<()> {
        overlay.restore(self.destroyed, self.structures)
    }
}

/// Sequential reader over a record payload.
struct Reader<'a> {
    key: &'a str,
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> WorldResult<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(WorldError::corrupt(self.key, format!("truncated {what}")));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn u32(&mut self, what: &str) -> WorldResult<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn cells(&mut self, count: usize, what: &str) -> WorldResult<Vec<WorldCell>> {
        let len = count
            .checked_mul(CellRecord::SIZE)
            .ok_or_else(|| WorldError::corrupt(self.key, format!("{what} count overflows")))?;
        let bytes = self.take(len, what)?;
        Ok(bytes
            .chunks_exact(CellRecord::SIZE)
            .map(|raw| bytemuck::pod_read_unaligned::<CellRecord>(raw).to_cell())
            .collect())
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn finish(self) -> WorldResult<()> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(WorldError::corrupt(
                self.key,
                format!("{} trailing bytes", self.bytes.len()),
            ))
        }
    }
}

/// Wraps a payload in magic, version and CRC, then compresses it.
fn seal(magic: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    body.extend_from_slice(magic);
    body.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    body.extend_from_slice(payload);
    let crc = crc32fast::hash(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    compress_prepend_size(&body)
}

/// Decompresses and checks a record, returning its payload.
fn unseal(key: &str, magic: &[u8; 4], blob: &[u8]) -> WorldResult<Vec<u8>> {
    let body = decompress_size_prepended(blob)
        .map_err(|e| WorldError::corrupt(key, format!("lz4: {e}")))?;

    if body.len() < HEADER_LEN + CRC_LEN {
        return Err(WorldError::corrupt(key, "record shorter than its header"));
    }
    if &body[0..4] != magic {
        return Err(WorldError::corrupt(key, "bad magic"));
    }
    let version = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    if version != FORMAT_VERSION {
        return Err(WorldError::corrupt(key, format!("unsupported version {version}")));
    }

    let (content, crc_bytes) = body.split_at(body.len() - CRC_LEN);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = crc32fast::hash(content);
    if stored != computed {
        return Err(WorldError::corrupt(
            key,
            format!("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"),
        ));
    }

    Ok(content[HEADER_LEN..].to_vec())
}

/// Encoder/decoder for the durable overlay.
pub struct PersistenceCodec;

impl PersistenceCodec {
    /// Encodes a destroyed-cell set.
    #[must_use]
    pub fn encode_destroyed(cells: &[WorldCell]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(4 + cells.len() * CellRecord::SIZE);
        payload.extend_from_slice(&(cells.len() as u32).to_le_bytes());
        for cell in cells {
            payload.extend_from_slice(bytemuck::bytes_of(&CellRecord::from_cell(*cell)));
        }
        seal(DESTROYED_MAGIC, &payload)
    }

    /// Decodes a destroyed-cell set.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CorruptPersistence`] on any damage.
    pub fn decode_destroyed(blob: &[u8]) -> WorldResult<Vec<WorldCell>> {
        let payload = unseal(DESTROYED_KEY, DESTROYED_MAGIC, blob)?;
        let mut reader = Reader {
            key: DESTROYED_KEY,
            bytes: &payload,
        };

        let count = reader.u32("cell count")? as usize;
        if reader.remaining() % CellRecord::SIZE != 0 {
            return Err(WorldError::corrupt(DESTROYED_KEY, "unparsable coordinate triples"));
        }
        if reader.remaining() / CellRecord::SIZE != count {
            return Err(WorldError::corrupt(
                DESTROYED_KEY,
                format!(
                    "header declares {count} cells, payload holds {}",
                    reader.remaining() / CellRecord::SIZE
                ),
            ));
        }

        let cells = reader.cells(count, "cells")?;
        reader.finish()?;
        Ok(cells)
    }

    /// Encodes a structure registry.
    #[must_use]
    pub fn encode_structures<'a>(instances: impl IntoIterator<Item = &'a StructureInstance>) -> Vec<u8> {
        let (anchors, templates): (Vec<WorldCell>, Vec<TemplateId>) = instances
            .into_iter()
            .map(|instance| (instance.anchor, instance.template))
            .unzip();

        let mut payload = Vec::with_capacity(8 + anchors.len() * (CellRecord::SIZE + 4));
        payload.extend_from_slice(&(anchors.len() as u32).to_le_bytes());
        for anchor in &anchors {
            payload.extend_from_slice(bytemuck::bytes_of(&CellRecord::from_cell(*anchor)));
        }
        payload.extend_from_slice(&(templates.len() as u32).to_le_bytes());
        for template in &templates {
            payload.extend_from_slice(&template.0.to_le_bytes());
        }
        seal(STRUCTURES_MAGIC, &payload)
    }

    /// Decodes a structure registry and rebuilds each instance's footprint
    /// from `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CorruptPersistence`] on any damage, on a count
    /// mismatch or on a template id the catalog does not know.
    pub fn decode_structures(blob: &[u8], catalog: &StructureCatalog) -> WorldResult<Vec<StructureInstance>> {
        let payload = unseal(STRUCTURES_KEY, STRUCTURES_MAGIC, blob)?;
        let mut reader = Reader {
            key: STRUCTURES_KEY,
            bytes: &payload,
        };

        let anchor_count = reader.u32("anchor count")? as usize;
        let anchors = reader.cells(anchor_count, "anchors")?;
        let template_count = reader.u32("template count")? as usize;
        if template_count != anchor_count {
            return Err(WorldError::corrupt(
                STRUCTURES_KEY,
                format!("{anchor_count} anchors but {template_count} template ids"),
            ));
        }

        let mut instances = Vec::with_capacity(anchor_count);
        for anchor in anchors {
            let id = TemplateId(reader.u32("template ids")?);
            let template = catalog.get(id).ok_or_else(|| {
                WorldError::corrupt(
                    STRUCTURES_KEY,
                    format!("template id {} outside catalog of {}", id.0, catalog.len()),
                )
            })?;
            instances.push(StructureInstance::new(anchor, id, template));
        }
        reader.finish()?;
        Ok(instances)
    }

    /// Writes both durable records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn save<K: KeyValueStore>(store: &mut K, overlay: &MutationOverlay) -> WorldResult<()> {
        let destroyed = overlay.destroyed_cells();
        store.set(DESTROYED_KEY, &Self::encode_destroyed(&destroyed))?;
        store.set(STRUCTURES_KEY, &Self::encode_structures(overlay.structures()))?;

        tracing::info!(
            "Saved overlay: {} destroyed cells, {} structures",
            destroyed.len(),
            overlay.structure_count()
        );
        Ok(())
    }

    /// Reads both durable records. Absent keys decode as empty.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CorruptPersistence`] if either record is
    /// damaged, or an I/O error from the store.
    pub fn load<K: KeyValueStore>(store: &K, catalog: &StructureCatalog) -> WorldResult<PersistedOverlay> {
        let decoded = Self::decode_all(store, catalog);
        match decoded {
            Ok(persisted) => {
                tracing::info!(
                    "Restored overlay: {} destroyed cells, {} structures",
                    persisted.destroyed.len(),
                    persisted.structures.len()
                );
                Ok(persisted)
            }
            Err(e) => {
                if let WorldError::CorruptPersistence { key, reason } = &e {
                    tracing::warn!("Refusing corrupt record `{}`: {}", key, reason);
                }
                Err(e)
            }
        }
    }

    fn decode_all<K: KeyValueStore>(store: &K, catalog: &StructureCatalog) -> WorldResult<PersistedOverlay> {
        let destroyed = match store.get(DESTROYED_KEY)? {
            Some(blob) => Self::decode_destroyed(&blob)?,
            None => Vec::new(),
        };
        let structures = match store.get(STRUCTURES_KEY)? {
            Some(blob) => Self::decode_structures(&blob, catalog)?,
            None => Vec::new(),
        };
        Ok(PersistedOverlay { destroyed, structures })
    }
}
