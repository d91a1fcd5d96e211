//! On-disk layout of a [`PqIndex`].
//!
//! ```text
//! magic "PQX1" | u32 version                                  (header)
//! u32 dim | u32 subspace_num | u8 code_bytes | u64 vectors    (body, CRC32)
//! per subspace: u32 clusters | u32 sub_dim | f32 centers...
//! codes: vectors * subspace_num little-endian integers
//! u32 crc32 of body                                           (trailer)
//! ```

use std::convert::TryFrom;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crc32fast::Hasher;
use tempfile::NamedTempFile;

use crate::codebook::Codebook;
use crate::codes::{CodeView, CodeWidth, PqCodes};
use crate::config::MAX_CLUSTERS;
use crate::pq::PqIndex;
use crate::PqError;

const PERSIST_MAGIC: [u8; 4] = *b"PQX1";
const PERSIST_VERSION: u32 = 1;

fn write_bytes<W: Write>(
    writer: &mut W,
    bytes: &[u8],
    hasher: Option<&mut Hasher>,
) -> io::Result<()> {
    if let Some(h) = hasher {
        h.update(bytes);
    }
    writer.write_all(bytes)
}

fn write_u32<W: Write>(writer: &mut W, value: u32, hasher: Option<&mut Hasher>) -> io::Result<()> {
    write_bytes(writer, &value.to_le_bytes(), hasher)
}

fn write_u64<W: Write>(writer: &mut W, value: u64, hasher: Option<&mut Hasher>) -> io::Result<()> {
    write_bytes(writer, &value.to_le_bytes(), hasher)
}

fn read_array<R: Read, const N: usize>(
    reader: &mut R,
    hasher: Option<&mut Hasher>,
) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    if let Some(h) = hasher {
        h.update(&buf);
    }
    Ok(buf)
}

fn read_u8<R: Read>(reader: &mut R, hasher: Option<&mut Hasher>) -> io::Result<u8> {
    Ok(read_array::<R, 1>(reader, hasher)?[0])
}

fn read_u32<R: Read>(reader: &mut R, hasher: Option<&mut Hasher>) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader, hasher)?))
}

fn read_u64<R: Read>(reader: &mut R, hasher: Option<&mut Hasher>) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_array(reader, hasher)?))
}

/// Read exactly `len` bytes without trusting `len` for the allocation size.
fn read_section<R: Read>(
    reader: &mut R,
    len: u64,
    hasher: &mut Hasher,
) -> Result<Vec<u8>, PqError> {
    let mut buf = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(PqError::InvalidPersistence("unexpected end of index data"));
    }
    hasher.update(&buf);
    Ok(buf)
}

fn to_u32(value: usize, what: &'static str) -> Result<u32, PqError> {
    u32::try_from(value).map_err(|_| PqError::InvalidPersistence(what))
}

impl PqIndex {
    /// Persist the index to `path`.
    ///
    /// Bytes go to a temporary file in the same directory which is renamed
    /// over `path` only after everything has been written and synced. A
    /// failed save leaves any previous file at `path` untouched.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), PqError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        self.save_to_writer(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| PqError::Io(err.error))?;
        log::info!("Saved PQ index ({} vectors) to {}", self.len(), path.display());
        Ok(())
    }

    /// Persist the index using the supplied writer.
    pub fn save_to_writer<W: Write>(&self, writer: W) -> Result<(), PqError> {
        let mut writer = BufWriter::new(writer);
        writer.write_all(&PERSIST_MAGIC)?;
        write_u32(&mut writer, PERSIST_VERSION, None)?;

        let mut hasher = Hasher::new();
        write_u32(
            &mut writer,
            to_u32(self.dim, "dimension exceeds persistence limits")?,
            Some(&mut hasher),
        )?;
        write_u32(
            &mut writer,
            to_u32(self.codebooks.len(), "subspace count exceeds persistence limits")?,
            Some(&mut hasher),
        )?;
        write_bytes(&mut writer, &[self.codes.width().bytes() as u8], Some(&mut hasher))?;
        let vector_count = u64::try_from(self.len())
            .map_err(|_| PqError::InvalidPersistence("vector count exceeds persistence limits"))?;
        write_u64(&mut writer, vector_count, Some(&mut hasher))?;

        for codebook in &self.codebooks {
            write_u32(
                &mut writer,
                to_u32(codebook.clusters, "cluster count exceeds persistence limits")?,
                Some(&mut hasher),
            )?;
            write_u32(
                &mut writer,
                to_u32(codebook.dim, "sub-dimension exceeds persistence limits")?,
                Some(&mut hasher),
            )?;
            for center in &codebook.centers {
                let bytes: Vec<u8> = center.iter().flat_map(|v| v.to_le_bytes()).collect();
                write_bytes(&mut writer, &bytes, Some(&mut hasher))?;
            }
        }

        match self.codes.view() {
            CodeView::U8(codes) => write_bytes(&mut writer, codes, Some(&mut hasher))?,
            CodeView::U16(codes) => {
                let bytes: Vec<u8> = codes.iter().flat_map(|c| c.to_le_bytes()).collect();
                write_bytes(&mut writer, &bytes, Some(&mut hasher))?;
            }
        }

        write_u32(&mut writer, hasher.finalize(), None)?;
        writer.flush()?;
        Ok(())
    }

    /// Load an index from the provided filesystem path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, PqError> {
        let file = File::open(path)?;
        Self::load_from_reader(BufReader::new(file))
    }

    /// Load an index from a persisted byte stream.
    pub fn load_from_reader<R: Read>(reader: R) -> Result<Self, PqError> {
        let mut reader = BufReader::new(reader);
        Self::read_persisted(&mut reader).map_err(|err| match err {
            PqError::Io(io) if io.kind() == ErrorKind::UnexpectedEof => {
                PqError::InvalidPersistence("unexpected end of index data")
            }
            other => other,
        })
    }

    fn read_persisted<R: Read>(reader: &mut R) -> Result<Self, PqError> {
        let magic: [u8; 4] = read_array(reader, None)?;
        if magic != PERSIST_MAGIC {
            return Err(PqError::InvalidPersistence("unrecognized file header"));
        }
        if read_u32(reader, None)? != PERSIST_VERSION {
            return Err(PqError::InvalidPersistence(
                "unsupported index format version",
            ));
        }

        let mut hasher = Hasher::new();
        let dim = read_u32(reader, Some(&mut hasher))? as usize;
        if dim == 0 {
            return Err(PqError::InvalidPersistence("dimension must be positive"));
        }
        let subspace_num = read_u32(reader, Some(&mut hasher))? as usize;
        if subspace_num == 0 || subspace_num > dim || dim % subspace_num != 0 {
            return Err(PqError::InvalidPersistence(
                "subspace count does not divide the dimension",
            ));
        }
        let width = CodeWidth::from_bytes(read_u8(reader, Some(&mut hasher))?)
            .ok_or(PqError::InvalidPersistence("unknown code width"))?;
        let vector_count = read_u64(reader, Some(&mut hasher))?;

        let sub_dim = dim / subspace_num;
        let mut codebooks = Vec::with_capacity(subspace_num);
        for _ in 0..subspace_num {
            let clusters = read_u32(reader, Some(&mut hasher))? as usize;
            if clusters == 0 || clusters > MAX_CLUSTERS {
                return Err(PqError::InvalidPersistence("cluster count out of range"));
            }
            if read_u32(reader, Some(&mut hasher))? as usize != sub_dim {
                return Err(PqError::InvalidPersistence(
                    "codebook dimension does not match the subspace width",
                ));
            }
            let section_len = (clusters * sub_dim * 4) as u64;
            let raw = read_section(reader, section_len, &mut hasher)?;
            let centers: Vec<Vec<f32>> = raw
                .chunks_exact(sub_dim * 4)
                .map(|row| {
                    row.chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect()
                })
                .collect();
            codebooks.push(Codebook {
                clusters,
                dim: sub_dim,
                centers,
            });
        }

        let code_bytes = vector_count
            .checked_mul(subspace_num as u64)
            .and_then(|n| n.checked_mul(width.bytes() as u64))
            .ok_or(PqError::InvalidPersistence("code section too large"))?;
        let raw = read_section(reader, code_bytes, &mut hasher)?;
        let codes = match width {
            CodeWidth::U8 => PqCodes::from_u8(subspace_num, raw)?,
            CodeWidth::U16 => PqCodes::from_u16(
                subspace_num,
                raw.chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            )?,
        };

        let stored_checksum = read_u32(reader, None)?;
        if hasher.finalize() != stored_checksum {
            return Err(PqError::InvalidPersistence("checksum mismatch"));
        }

        Self::from_parts(dim, codebooks, codes).map_err(|_| {
            PqError::InvalidPersistence("codes reference clusters missing from the codebook")
        })
    }
}
