//! TEXMEX `.fvecs` / `.ivecs` files.
//!
//! Each record is a little-endian `i32` element count followed by that many
//! 4-byte little-endian elements. A file ends cleanly only on a record
//! boundary.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

/// A 4-byte element of a `vecs` record.
pub trait VecsElement: Sized {
    fn from_le(bytes: [u8; 4]) -> Self;
    fn to_le(&self) -> [u8; 4];
}

impl VecsElement for f32 {
    fn from_le(bytes: [u8; 4]) -> Self {
        f32::from_le_bytes(bytes)
    }

    fn to_le(&self) -> [u8; 4] {
        self.to_le_bytes()
    }
}

impl VecsElement for i32 {
    fn from_le(bytes: [u8; 4]) -> Self {
        i32::from_le_bytes(bytes)
    }

    fn to_le(&self) -> [u8; 4] {
        self.to_le_bytes()
    }
}

/// Streams the records of a `vecs` file one at a time.
pub struct VecsRecords<R, T> {
    reader: R,
    done: bool,
    _element: PhantomData<T>,
}

impl<R: Read, T: VecsElement> VecsRecords<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
            _element: PhantomData,
        }
    }

    fn next_record(&mut self) -> io::Result<Option<Vec<T>>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            match self.reader.read(&mut header[filled..])? {
                0 if filled == 0 => return Ok(None),
                0 => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "truncated record header",
                    ))
                }
                n => filled += n,
            }
        }

        let len = usize::try_from(i32::from_le_bytes(header)).map_err(|_| {
            io::Error::new(ErrorKind::InvalidData, "negative record length")
        })?;
        let mut body = vec![0u8; len * 4];
        self.reader.read_exact(&mut body)?;
        Ok(Some(
            body.chunks_exact(4)
                .map(|b| T::from_le([b[0], b[1], b[2], b[3]]))
                .collect(),
        ))
    }
}

impl<R: Read, T: VecsElement> Iterator for VecsRecords<R, T> {
    type Item = io::Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = self.next_record().transpose();
        if !matches!(record, Some(Ok(_))) {
            self.done = true;
        }
        record
    }
}

fn collect_records<R: Read, T: VecsElement>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<T>>> {
    VecsRecords::new(reader)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Read float vectors, stopping after `limit` records when given.
pub fn read_fvecs_from_reader<R: Read>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<f32>>> {
    collect_records(reader, limit)
}

pub fn read_ivecs_from_reader<R: Read>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<i32>>> {
    collect_records(reader, limit)
}

pub fn read_fvecs<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<Vec<f32>>> {
    read_fvecs_from_reader(BufReader::new(File::open(path)?), limit)
}

/// Read neighbour ids; negative entries are rejected.
pub fn read_groundtruth_from_reader<R: Read>(
    reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<usize>>> {
    VecsRecords::<R, i32>::new(reader)
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(row, record)| -> io::Result<Vec<usize>> {
            record?
                .into_iter()
                .map(|id| {
                    usize::try_from(id).map_err(|_| {
                        io::Error::new(
                            ErrorKind::InvalidData,
                            format!("neighbour id {id} in row {row} is negative"),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

pub fn read_groundtruth<P: AsRef<Path>>(
    path: P,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<usize>>> {
    read_groundtruth_from_reader(BufReader::new(File::open(path)?), limit)
}

fn write_record<W: Write, T: VecsElement>(writer: &mut W, row: &[T]) -> io::Result<()> {
    let len = i32::try_from(row.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "record too long"))?;
    writer.write_all(&len.to_le_bytes())?;
    for value in row {
        writer.write_all(&value.to_le())?;
    }
    Ok(())
}

pub fn write_fvecs_to_writer<W: Write>(mut writer: W, rows: &[Vec<f32>]) -> io::Result<()> {
    for row in rows {
        write_record(&mut writer, row)?;
    }
    writer.flush()
}

/// Write neighbour ids, e.g. search results or generated ground truth.
pub fn write_ids_to_writer<W: Write>(mut writer: W, rows: &[Vec<usize>]) -> io::Result<()> {
    for row in rows {
        let ids = row
            .iter()
            .map(|&id| i32::try_from(id))
            .collect::<Result<Vec<i32>, _>>()
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "id does not fit in i32"))?;
        write_record(&mut writer, &ids)?;
    }
    writer.flush()
}

pub fn write_fvecs<P: AsRef<Path>>(path: P, rows: &[Vec<f32>]) -> io::Result<()> {
    write_fvecs_to_writer(BufWriter::new(File::create(path)?), rows)
}

pub fn write_ids<P: AsRef<Path>>(path: P, rows: &[Vec<usize>]) -> io::Result<()> {
    write_ids_to_writer(BufWriter::new(File::create(path)?), rows)
}

/// Dimension shared by every vector, or an error for empty or ragged input.
pub fn uniform_dim(vectors: &[Vec<f32>]) -> io::Result<usize> {
    let dim = vectors
        .first()
        .map(Vec::len)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "no vectors loaded"))?;
    match vectors.iter().position(|v| v.len() != dim) {
        Some(idx) => Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "vector {idx} has dimension {}, expected {dim}",
                vectors[idx].len()
            ),
        )),
        None => Ok(dim),
    }
}
