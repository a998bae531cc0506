//! Export and import of engine state.
//!
//! The layout is little-endian and fully self-describing: a header with the
//! banding/shingling parameters and the seed, fixed-width signature records
//! keyed by document id, retained token sets when the engine keeps them, and
//! the per-band bucket tables. Records are written in sorted id/key order so
//! an export-import-export cycle is byte-identical.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;

use crate::engine::{Engine, EngineConfig};
use crate::errors::{EngineError, Result};
use crate::shingle::ShingleMode;
use crate::DocId;

const MAGIC: &[u8; 4] = b"NDUP";
const FORMAT_VERSION: u32 = 1;

const FLAG_FOLD_CASE: u8 = 1;
const FLAG_COLLAPSE_WHITESPACE: u8 = 1 << 1;
const FLAG_RETAIN_TOKENS: u8 = 1 << 2;

impl Engine {
    /// Serializes the engine state into a writer.
    ///
    /// # Errors
    ///
    /// [`EngineError::Persist`] on any I/O failure; the engine is untouched.
    pub fn export<W: Write>(&self, wtr: &mut W) -> Result<()> {
        wtr.write_all(MAGIC)?;
        wtr.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        wtr.write_u64::<LittleEndian>(self.config.num_bands as u64)?;
        wtr.write_u64::<LittleEndian>(self.config.rows_per_band as u64)?;
        wtr.write_u64::<LittleEndian>(self.config.window as u64)?;
        wtr.write_u8(match self.config.mode {
            ShingleMode::Chars => 0,
            ShingleMode::Words => 1,
        })?;
        let mut flags = 0;
        if self.config.fold_case {
            flags |= FLAG_FOLD_CASE;
        }
        if self.config.collapse_whitespace {
            flags |= FLAG_COLLAPSE_WHITESPACE;
        }
        if self.config.retain_tokens {
            flags |= FLAG_RETAIN_TOKENS;
        }
        wtr.write_u8(flags)?;
        wtr.write_u64::<LittleEndian>(self.seed)?;

        let mut ids: Vec<DocId> = self.index.ids().collect();
        ids.sort_unstable();
        wtr.write_u64::<LittleEndian>(ids.len() as u64)?;
        for &id in &ids {
            wtr.write_u64::<LittleEndian>(id)?;
            for &component in self.index.signature(id).unwrap() {
                wtr.write_u64::<LittleEndian>(component)?;
            }
        }

        if self.config.retain_tokens {
            for &id in &ids {
                let tokens = self
                    .tokens
                    .get(&id)
                    .ok_or_else(|| EngineError::persist(format!("No token set for id={id}")))?;
                wtr.write_u64::<LittleEndian>(tokens.len() as u64)?;
                for &token in tokens {
                    wtr.write_u64::<LittleEndian>(token)?;
                }
            }
        }

        for table in &self.index.tables {
            let mut keys: Vec<u64> = table.keys().copied().collect();
            keys.sort_unstable();
            wtr.write_u64::<LittleEndian>(keys.len() as u64)?;
            for key in keys {
                let mut members: Vec<DocId> = table[&key].iter().copied().collect();
                members.sort_unstable();
                wtr.write_u64::<LittleEndian>(key)?;
                wtr.write_u64::<LittleEndian>(members.len() as u64)?;
                for member in members {
                    wtr.write_u64::<LittleEndian>(member)?;
                }
            }
        }
        Ok(())
    }

    /// Deserializes an engine from a reader.
    ///
    /// The stored bucket tables are checked against the tables reproduced
    /// from the stored seed and signatures, so a corrupted or inconsistent
    /// dump is rejected rather than silently repaired.
    ///
    /// # Errors
    ///
    /// [`EngineError::Persist`] on I/O failure, unrecognized format, or
    /// inconsistent state.
    pub fn import<R: Read>(rdr: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        rdr.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(EngineError::persist("Unrecognized magic number."));
        }
        let version = rdr.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(EngineError::persist(format!(
                "Unsupported format version: {version}"
            )));
        }
        let num_bands = rdr.read_u64::<LittleEndian>()? as usize;
        let rows_per_band = rdr.read_u64::<LittleEndian>()? as usize;
        let window = rdr.read_u64::<LittleEndian>()? as usize;
        let mode = match rdr.read_u8()? {
            0 => ShingleMode::Chars,
            1 => ShingleMode::Words,
            m => {
                return Err(EngineError::persist(format!("Unrecognized mode byte: {m}")));
            }
        };
        let flags = rdr.read_u8()?;
        let seed = rdr.read_u64::<LittleEndian>()?;

        let config = EngineConfig {
            num_bands,
            rows_per_band,
            window,
            mode,
            fold_case: flags & FLAG_FOLD_CASE != 0,
            collapse_whitespace: flags & FLAG_COLLAPSE_WHITESPACE != 0,
            seed: Some(seed),
            retain_tokens: flags & FLAG_RETAIN_TOKENS != 0,
        };
        let mut engine = Engine::from_seed(config, seed)
            .map_err(|_| EngineError::persist("Invalid header parameters."))?;
        let k = engine.signature_len();

        let num_docs = rdr.read_u64::<LittleEndian>()? as usize;
        let mut ids = Vec::with_capacity(num_docs);
        let mut sig = vec![0u64; k];
        for _ in 0..num_docs {
            let id = rdr.read_u64::<LittleEndian>()?;
            for component in sig.iter_mut() {
                *component = rdr.read_u64::<LittleEndian>()?;
            }
            engine
                .index
                .insert(id, &sig, false)
                .map_err(|_| EngineError::persist(format!("Duplicate record for id={id}")))?;
            ids.push(id);
        }

        if config.retain_tokens {
            let mut tokens = HashMap::with_capacity(num_docs);
            for &id in &ids {
                let len = rdr.read_u64::<LittleEndian>()? as usize;
                let mut set = Vec::with_capacity(len);
                for _ in 0..len {
                    set.push(rdr.read_u64::<LittleEndian>()?);
                }
                tokens.insert(id, set);
            }
            engine.tokens = tokens;
        }

        for (band, table) in engine.index.tables.iter().enumerate() {
            let num_buckets = rdr.read_u64::<LittleEndian>()? as usize;
            if num_buckets != table.len() {
                return Err(EngineError::persist(format!(
                    "Bucket table of band {band} does not match the signatures."
                )));
            }
            for _ in 0..num_buckets {
                let key = rdr.read_u64::<LittleEndian>()?;
                let num_members = rdr.read_u64::<LittleEndian>()? as usize;
                let bucket = table.get(&key).ok_or_else(|| {
                    EngineError::persist(format!(
                        "Bucket table of band {band} does not match the signatures."
                    ))
                })?;
                if bucket.len() != num_members {
                    return Err(EngineError::persist(format!(
                        "Bucket table of band {band} does not match the signatures."
                    )));
                }
                for _ in 0..num_members {
                    let member = rdr.read_u64::<LittleEndian>()?;
                    if !bucket.contains(&member) {
                        return Err(EngineError::persist(format!(
                            "Bucket table of band {band} does not match the signatures."
                        )));
                    }
                }
            }
        }
        Ok(engine)
    }
}
