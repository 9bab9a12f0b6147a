//! Binary result streams.
//!
//! Layout (little-endian):
//!
//! ```text
//! +-----------------------------+
//! | ASCII title, byte 7         |
//! | i32 nodes, edges, elements  |
//! | f32 reserved x2             |
//! | i32 3, i32 mask, i32 0      |
//! +-----------------------------+
//! | i32 x3 per element          |
//! | i32 count, i32 x count      |  boundary nodes
//! | f64 x3 per node             |  x, y, z
//! +-----------------------------+
//! | f32 time                    |  record 0
//! | per node, per set field:    |
//! |   f32 x components          |
//! +-----------------------------+
//! | ...                         |
//! ```
//!
//! Every record has the same size, so the reader seeks to record `k` directly.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tw_core::clamp_non_negative;
use tw_mesh::Mesh;

use crate::field::{Field, FieldMask};
use crate::{ResultsError, ResultsResult};

/// Terminates the ASCII title block.
pub const TITLE_TERMINATOR: u8 = 7;

/// Marker following the reserved header floats.
const HEADER_MARKER: i32 = 3;

/// Upper bound on the title length accepted by the reader.
const MAX_TITLE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultHeader {
    pub title: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub elements: Vec<[i32; 3]>,
    pub boundary: Vec<i32>,
    pub coordinates: Vec<[f64; 3]>,
    pub mask: FieldMask,
}

impl ResultHeader {
    pub fn from_mesh(title: impl Into<String>, mesh: &Mesh, mask: FieldMask) -> Self {
        let elements = mesh
            .elements()
            .iter()
            .map(|e| {
                let [a, b, c] = e.nodes();
                [a as i32, b as i32, c as i32]
            })
            .collect();
        let boundary = mesh.boundary_dofs().iter().map(|d| d.idx() as i32).collect();
        let coordinates = mesh.dofs().iter().map(|d| [d.x, d.y, d.z]).collect();
        Self {
            title: title.into(),
            node_count: mesh.dof_count(),
            edge_count: mesh.edge_count(),
            elements,
            boundary,
            coordinates,
            mask,
        }
    }

    /// Bytes occupied by one time record.
    pub fn record_stride(&self) -> u64 {
        4 + 4 * (self.node_count * self.mask.components_per_node()) as u64
    }

    fn write<W: Write>(&self, w: &mut W) -> ResultsResult<()> {
        if self.title.bytes().any(|b| b == TITLE_TERMINATOR) || !self.title.is_ascii() {
            return Err(ResultsError::MalformedStream {
                message: "title must be ASCII without byte 7".to_string(),
            });
        }
        if self.coordinates.len() != self.node_count {
            return Err(ResultsError::MalformedStream {
                message: format!(
                    "{} coordinates for {} nodes",
                    self.coordinates.len(),
                    self.node_count
                ),
            });
        }
        w.write_all(self.title.as_bytes())?;
        w.write_all(&[TITLE_TERMINATOR])?;

        write_count(w, self.node_count)?;
        write_count(w, self.edge_count)?;
        write_count(w, self.elements.len())?;
        w.write_all(&0f32.to_le_bytes())?;
        w.write_all(&0f32.to_le_bytes())?;
        w.write_all(&HEADER_MARKER.to_le_bytes())?;
        w.write_all(&self.mask.bits().to_le_bytes())?;
        w.write_all(&0i32.to_le_bytes())?;

        for tri in &self.elements {
            for v in tri {
                w.write_all(&v.to_le_bytes())?;
            }
        }
        write_count(w, self.boundary.len())?;
        for b in &self.boundary {
            w.write_all(&b.to_le_bytes())?;
        }
        for xyz in &self.coordinates {
            for v in xyz {
                w.write_all(&v.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Parse a header from a stream of `len` bytes.
    ///
    /// Counts that could not fit in `len` are rejected before anything is
    /// allocated for them.
    fn read<R: Read>(r: &mut R, len: u64) -> ResultsResult<Self> {
        let mut title = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            r.read_exact(&mut byte)?;
            if byte[0] == TITLE_TERMINATOR {
                break;
            }
            if title.len() >= MAX_TITLE_BYTES {
                return Err(malformed("title block is not terminated"));
            }
            title.push(byte[0]);
        }
        let title = String::from_utf8(title).map_err(|_| malformed("title is not ASCII"))?;

        let node_count = read_count(r, "node count")?;
        let edge_count = read_count(r, "edge count")?;
        let element_count = read_count(r, "element count")?;
        let _ = read_f32(r)?;
        let _ = read_f32(r)?;
        let marker = read_i32(r)?;
        if marker != HEADER_MARKER {
            return Err(ResultsError::MalformedStream {
                message: format!("expected header marker {HEADER_MARKER}, found {marker}"),
            });
        }
        let mask = FieldMask::from_bits(read_i32(r)? as u32);
        if mask.unknown_bits() != 0 {
            return Err(ResultsError::MalformedStream {
                message: format!("unknown field bits {:#x}", mask.unknown_bits()),
            });
        }
        let _ = read_i32(r)?;

        fits(element_count, 12, len, "element count")?;
        fits(node_count, 24, len, "node count")?;
        let mut elements = Vec::with_capacity(element_count);
        for _ in 0..element_count {
            elements.push([read_i32(r)?, read_i32(r)?, read_i32(r)?]);
        }
        let boundary_count = read_count(r, "boundary count")?;
        fits(boundary_count, 4, len, "boundary count")?;
        let mut boundary = Vec::with_capacity(boundary_count);
        for _ in 0..boundary_count {
            boundary.push(read_i32(r)?);
        }
        let mut coordinates = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            coordinates.push([read_f64(r)?, read_f64(r)?, read_f64(r)?]);
        }

        Ok(Self {
            title,
            node_count,
            edge_count,
            elements,
            boundary,
            coordinates,
            mask,
        })
    }
}

/// Appends time records to a result stream.
pub struct ResultWriter<W: Write> {
    writer: W,
    node_count: usize,
    mask: FieldMask,
    records: usize,
    buffer: Vec<u8>,
}

impl ResultWriter<BufWriter<File>> {
    /// Create (truncate) a result file and write its header.
    pub fn create(path: &Path, header: &ResultHeader) -> ResultsResult<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn new(mut writer: W, header: &ResultHeader) -> ResultsResult<Self> {
        header.write(&mut writer)?;
        Ok(Self {
            writer,
            node_count: header.node_count,
            mask: header.mask,
            records: 0,
            buffer: Vec::with_capacity(header.record_stride() as usize),
        })
    }

    pub fn mask(&self) -> FieldMask {
        self.mask
    }

    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Write one time record.
    ///
    /// `values` must supply every field of the mask, each with
    /// `nodes * components` entries laid out node-major. Non-negative fields
    /// are clamped at zero; NaN is written as NaN.
    pub fn write_record(&mut self, time: f64, values: &[(Field, &[f64])]) -> ResultsResult<()> {
        let mut columns: Vec<(Field, &[f64])> = Vec::new();
        for field in self.mask.fields() {
            let data = values
                .iter()
                .find(|(f, _)| *f == field)
                .map(|(_, d)| *d)
                .ok_or(ResultsError::FieldNotPresent { field })?;
            let expected = self.node_count * field.components();
            if data.len() != expected {
                return Err(ResultsError::FieldLength {
                    field,
                    expected,
                    got: data.len(),
                });
            }
            columns.push((field, data));
        }

        self.buffer.clear();
        self.buffer.extend_from_slice(&(time as f32).to_le_bytes());
        for node in 0..self.node_count {
            for (field, data) in &columns {
                let n = field.components();
                for &v in &data[node * n..(node + 1) * n] {
                    let v = if field.is_non_negative() {
                        clamp_non_negative(v)
                    } else {
                        v
                    };
                    self.buffer.extend_from_slice(&(v as f32).to_le_bytes());
                }
            }
        }
        self.writer.write_all(&self.buffer)?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> ResultsResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> ResultsResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Random access to the records of a result stream.
pub struct ResultReader<R: Read + Seek> {
    reader: R,
    header: ResultHeader,
    data_offset: u64,
    record_count: usize,
}

impl ResultReader<BufReader<File>> {
    pub fn open(path: &Path) -> ResultsResult<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ResultReader<R> {
    pub fn new(mut reader: R) -> ResultsResult<Self> {
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = ResultHeader::read(&mut reader, end)?;
        let data_offset = reader.stream_position()?;
        // A trailing partial record from an interrupted run is ignored.
        let record_count = ((end - data_offset) / header.record_stride()) as usize;
        Ok(Self {
            reader,
            header,
            data_offset,
            record_count,
        })
    }

    pub fn header(&self) -> &ResultHeader {
        &self.header
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    fn read_raw(&mut self, record: usize) -> ResultsResult<Vec<u8>> {
        if record >= self.record_count {
            return Err(ResultsError::RecordOutOfRange {
                record,
                count: self.record_count,
            });
        }
        let stride = self.header.record_stride();
        self.reader
            .seek(SeekFrom::Start(self.data_offset + record as u64 * stride))?;
        let mut buf = vec![0u8; stride as usize];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Time stamp of record `record`.
    pub fn read_time(&mut self, record: usize) -> ResultsResult<f64> {
        let buf = self.read_raw(record)?;
        Ok(f32_at(&buf, 0) as f64)
    }

    /// Time and values of one field, node-major.
    pub fn read_field(&mut self, record: usize, field: Field) -> ResultsResult<(f64, Vec<f64>)> {
        let offset = self
            .header
            .mask
            .offset_of(field)
            .ok_or(ResultsError::FieldNotPresent { field })?;
        let per_node = self.header.mask.components_per_node();
        let n = field.components();
        let buf = self.read_raw(record)?;

        let time = f32_at(&buf, 0) as f64;
        let mut values = Vec::with_capacity(self.header.node_count * n);
        for node in 0..self.header.node_count {
            let base = 4 + 4 * (node * per_node + offset);
            for c in 0..n {
                values.push(f32_at(&buf, base + 4 * c) as f64);
            }
        }
        Ok((time, values))
    }
}

/// Load the state of one field from a previous run's result stream.
///
/// Fails when the file's node count differs from the live mesh.
pub fn read_start_state(
    path: &Path,
    mesh_nodes: usize,
    record: usize,
    field: Field,
) -> ResultsResult<Vec<f64>> {
    let mut reader = ResultReader::open(path)?;
    let file = reader.header().node_count;
    if file != mesh_nodes {
        return Err(ResultsError::NodeCountMismatch {
            file,
            mesh: mesh_nodes,
        });
    }
    Ok(reader.read_field(record, field)?.1)
}

fn malformed(message: &str) -> ResultsError {
    ResultsError::MalformedStream {
        message: message.to_string(),
    }
}

/// Reject `count` items of `size` bytes that cannot fit in `len` bytes.
fn fits(count: usize, size: u64, len: u64, what: &str) -> ResultsResult<()> {
    if (count as u64).saturating_mul(size) > len {
        return Err(ResultsError::MalformedStream {
            message: format!("{what} {count} exceeds the stream length of {len} bytes"),
        });
    }
    Ok(())
}

fn write_count<W: Write>(w: &mut W, n: usize) -> ResultsResult<()> {
    let v = i32::try_from(n).map_err(|_| malformed("count exceeds i32 range"))?;
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_count<R: Read>(r: &mut R, what: &str) -> ResultsResult<usize> {
    let v = read_i32(r)?;
    usize::try_from(v).map_err(|_| ResultsError::MalformedStream {
        message: format!("negative {what}: {v}"),
    })
}

fn read_i32<R: Read>(r: &mut R) -> ResultsResult<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> ResultsResult<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> ResultsResult<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn f32_at(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tw_mesh::MeshBuilder;

    fn unit_square() -> Mesh {
        MeshBuilder::rectangle(1, 1, 1.0, 1.0, -2.0).build().unwrap()
    }

    #[test]
    fn header_roundtrip() {
        let mesh = unit_square();
        let mask = FieldMask::EMPTY.with(Field::Velocity).with(Field::Scalar);
        let header = ResultHeader::from_mesh("salt", &mesh, mask);

        let bytes = ResultWriter::new(Vec::new(), &header)
            .unwrap()
            .into_inner()
            .unwrap();
        let reader = ResultReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header(), &header);
        assert_eq!(reader.record_count(), 0);
    }

    #[test]
    fn record_size_follows_mask() {
        let mesh = unit_square();
        let mask = FieldMask::EMPTY.with(Field::Velocity).with(Field::Scalar);
        let header = ResultHeader::from_mesh("t", &mesh, mask);
        // 4 nodes x 3 values x 4 bytes + time
        assert_eq!(header.record_stride(), 52);
    }

    #[test]
    fn records_are_random_access() {
        let mesh = unit_square();
        let mask = FieldMask::EMPTY.with(Field::Velocity).with(Field::Scalar);
        let header = ResultHeader::from_mesh("t", &mesh, mask);
        let mut writer = ResultWriter::new(Vec::new(), &header).unwrap();

        let velocity = [0.5, -0.5, 0.25, 0.0, 1.0, 1.0, -1.0, 2.0];
        for k in 0..3 {
            let scalar: Vec<f64> = (0..4).map(|i| (k * 10 + i) as f64).collect();
            writer
                .write_record(
                    k as f64 * 60.0,
                    &[(Field::Scalar, &scalar[..]), (Field::Velocity, &velocity[..])],
                )
                .unwrap();
        }
        let bytes = writer.into_inner().unwrap();
        let mut reader = ResultReader::new(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.record_count(), 3);
        let (t, scalar) = reader.read_field(2, Field::Scalar).unwrap();
        assert_eq!(t, 120.0);
        assert_eq!(scalar, vec![20.0, 21.0, 22.0, 23.0]);
        let (_, v) = reader.read_field(0, Field::Velocity).unwrap();
        assert_eq!(v, velocity.to_vec());
        assert!(matches!(
            reader.read_field(3, Field::Scalar),
            Err(ResultsError::RecordOutOfRange { record: 3, count: 3 })
        ));
        assert!(matches!(
            reader.read_field(0, Field::Depth),
            Err(ResultsError::FieldNotPresent { .. })
        ));
    }

    #[test]
    fn negative_scalars_are_clamped_but_nan_survives() {
        let mesh = unit_square();
        let mask = FieldMask::EMPTY.with(Field::Scalar);
        let header = ResultHeader::from_mesh("t", &mesh, mask);
        let mut writer = ResultWriter::new(Vec::new(), &header).unwrap();
        writer
            .write_record(0.0, &[(Field::Scalar, &[-1.0, 2.0, f64::NAN, 0.0][..])])
            .unwrap();
        let bytes = writer.into_inner().unwrap();
        let mut reader = ResultReader::new(Cursor::new(bytes)).unwrap();
        let (_, v) = reader.read_field(0, Field::Scalar).unwrap();
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 2.0);
        assert!(v[2].is_nan());
    }

    #[test]
    fn missing_or_short_field_is_rejected() {
        let mesh = unit_square();
        let mask = FieldMask::EMPTY.with(Field::Scalar).with(Field::Depth);
        let header = ResultHeader::from_mesh("t", &mesh, mask);
        let mut writer = ResultWriter::new(Vec::new(), &header).unwrap();
        assert!(matches!(
            writer.write_record(0.0, &[(Field::Scalar, &[0.0; 4][..])]),
            Err(ResultsError::FieldNotPresent { field: Field::Depth })
        ));
        assert!(matches!(
            writer.write_record(0.0, &[(Field::Scalar, &[0.0; 3][..]), (Field::Depth, &[0.0; 4][..])]),
            Err(ResultsError::FieldLength { .. })
        ));
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn truncated_record_is_ignored() {
        let mesh = unit_square();
        let header = ResultHeader::from_mesh("t", &mesh, FieldMask::EMPTY.with(Field::Scalar));
        let mut writer = ResultWriter::new(Vec::new(), &header).unwrap();
        writer.write_record(0.0, &[(Field::Scalar, &[1.0; 4][..])]).unwrap();
        let mut bytes = writer.into_inner().unwrap();
        bytes.extend_from_slice(&[0u8; 7]);
        let reader = ResultReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.record_count(), 1);
    }

    #[test]
    fn garbage_is_not_a_stream() {
        let mut bytes = b"title".to_vec();
        bytes.push(TITLE_TERMINATOR);
        bytes.extend_from_slice(&4i32.to_le_bytes());
        bytes.extend_from_slice(&5i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&9i32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            ResultReader::new(Cursor::new(bytes)),
            Err(ResultsError::MalformedStream { .. })
        ));
    }

    #[test]
    fn oversized_counts_are_malformed() {
        let mesh = unit_square();
        let header = ResultHeader::from_mesh("t", &mesh, FieldMask::EMPTY.with(Field::Scalar));
        let bytes = ResultWriter::new(Vec::new(), &header)
            .unwrap()
            .into_inner()
            .unwrap();
        // title "t" + terminator, then node, edge and element counts
        for at in [2, 10] {
            let mut corrupt = bytes.clone();
            corrupt[at..at + 4].copy_from_slice(&i32::MAX.to_le_bytes());
            assert!(matches!(
                ResultReader::new(Cursor::new(corrupt)),
                Err(ResultsError::MalformedStream { .. })
            ));
        }
    }
}
