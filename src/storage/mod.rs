// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Binary persistence of graphs and their preparations.
//!
//! Every blob is laid out as:
//!
//! | field          | type     |
//! |----------------|----------|
//! | magic          | `b"RRNK"`|
//! | format version | u16      |
//! | kind           | u16      |
//! | layout hash    | u64      |
//! | payload length | u64      |
//! | payload        | bytes    |
//! | CRC-64         | u64      |
//!
//! All integers are little-endian. The checksum covers the header and the payload.
//! Files with a `.gz` extension are gzip-compressed.

mod payload;

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crc::{Crc, CRC_64_GO_ISO};

pub(crate) const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

const MAGIC: [u8; 4] = *b"RRNK";
const HEADER_LEN: usize = 24;
const TRAILER_LEN: usize = 8;

/// Version of the blob layout written by this library.
pub const FORMAT_VERSION: u16 = 1;

/// What a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlobKind {
    Graph = 1,
    ContractionHierarchy = 2,
    Landmarks = 3,
}

impl BlobKind {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::Graph),
            2 => Some(Self::ContractionHierarchy),
            3 => Some(Self::Landmarks),
            _ => None,
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph => f.write_str("graph"),
            Self::ContractionHierarchy => f.write_str("contraction hierarchy"),
            Self::Landmarks => f.write_str("landmarks"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("not a roadrank blob")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("expected a {expected} blob, got kind {found}")]
    WrongKind { expected: BlobKind, found: u16 },

    #[error("blob built for encoding layout {found:016x}, expected {expected:016x}")]
    LayoutMismatch { expected: u64, found: u64 },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("blob truncated")]
    Truncated,

    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// A structure which can be stored in a blob.
pub trait Persist: Sized {
    const KIND: BlobKind;

    /// What has to be loaded first: the encoding for a graph, the graph for its preparations.
    type Context;

    /// Layout hash of the encoding the structure depends on.
    fn layout_hash(context: &Self::Context) -> u64;

    fn write_payload(&self, w: &mut BlobWriter);

    fn read_payload(r: &mut BlobReader<'_>, context: &Self::Context) -> Result<Self, StorageError>;
}

/// Serializes a structure into a complete blob.
pub fn to_bytes<T: Persist>(value: &T, context: &T::Context) -> Vec<u8> {
    let mut payload = BlobWriter::default();
    value.write_payload(&mut payload);
    let payload = payload.into_inner();

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(T::KIND as u16).to_le_bytes());
    buf.extend_from_slice(&T::layout_hash(context).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);
    let checksum = CRC64.checksum(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// Parses a complete blob, validating its header and checksum.
pub fn from_bytes<T: Persist>(bytes: &[u8], context: &T::Context) -> Result<T, StorageError> {
    if bytes.len() < MAGIC.len() {
        return Err(StorageError::Truncated);
    }
    if bytes[..4] != MAGIC {
        return Err(StorageError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::Truncated);
    }

    let mut header = BlobReader::new(&bytes[4..HEADER_LEN]);
    let version = header.u16()?;
    let kind = header.u16()?;
    let layout = header.u64()?;
    let payload_len = header.u64()?;

    if version != FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }

    let end = usize::try_from(payload_len)
        .ok()
        .and_then(|l| l.checked_add(HEADER_LEN))
        .ok_or(StorageError::Truncated)?;
    let total = end.checked_add(TRAILER_LEN).ok_or(StorageError::Truncated)?;
    if bytes.len() < total {
        return Err(StorageError::Truncated);
    }

    let mut trailer = BlobReader::new(&bytes[end..total]);
    if CRC64.checksum(&bytes[..end]) != trailer.u64()? {
        return Err(StorageError::ChecksumMismatch);
    }

    if BlobKind::from_u16(kind) != Some(T::KIND) {
        return Err(StorageError::WrongKind {
            expected: T::KIND,
            found: kind,
        });
    }
    let expected = T::layout_hash(context);
    if layout != expected {
        return Err(StorageError::LayoutMismatch {
            expected,
            found: layout,
        });
    }

    let mut r = BlobReader::new(&bytes[HEADER_LEN..end]);
    let value = T::read_payload(&mut r, context)?;
    if !r.is_empty() {
        return Err(StorageError::Malformed("trailing bytes after payload"));
    }
    Ok(value)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

/// Writes a blob to a file, gzip-compressing it if the path ends with `.gz`.
pub fn save<T: Persist, P: AsRef<Path>>(
    path: P,
    value: &T,
    context: &T::Context,
) -> Result<(), StorageError> {
    let path = path.as_ref();
    let bytes = to_bytes(value, context);
    let f = BufWriter::new(File::create(path)?);

    if is_gzip(path) {
        let mut e = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        e.write_all(&bytes)?;
        e.finish()?.flush()?;
    } else {
        let mut f = f;
        f.write_all(&bytes)?;
        f.flush()?;
    }

    log::debug!("saved {} ({} bytes) to {}", T::KIND, bytes.len(), path.display());
    Ok(())
}

/// Reads a blob written by [save].
pub fn load<T: Persist, P: AsRef<Path>>(path: P, context: &T::Context) -> Result<T, StorageError> {
    let path = path.as_ref();
    let f = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();

    if is_gzip(path) {
        flate2::read::MultiGzDecoder::new(f).read_to_end(&mut bytes)?;
    } else {
        let mut f = f;
        f.read_to_end(&mut bytes)?;
    }

    log::debug!("loading {} ({} bytes) from {}", T::KIND, bytes.len(), path.display());
    from_bytes(&bytes, context)
}

/// Little-endian payload serializer.
#[derive(Debug, Default)]
pub struct BlobWriter {
    buf: Vec<u8>,
}

impl BlobWriter {
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed sequence length.
    pub fn seq_len(&mut self, len: usize) {
        self.u64(len as u64);
    }

    pub fn str(&mut self, s: &str) {
        self.seq_len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }
}

/// Little-endian payload deserializer. Running out of bytes is [StorageError::Truncated].
#[derive(Debug)]
pub struct BlobReader<'a> {
    data: &'a [u8],
}

impl<'a> BlobReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], StorageError> {
        let (head, rest) = self.data.split_first_chunk::<N>().ok_or(StorageError::Truncated)?;
        self.data = rest;
        Ok(*head)
    }

    pub fn u8(&mut self) -> Result<u8, StorageError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, StorageError> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, StorageError> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, StorageError> {
        self.take().map(u64::from_le_bytes)
    }

    pub fn f32(&mut self) -> Result<f32, StorageError> {
        self.take().map(f32::from_le_bytes)
    }

    pub fn f64(&mut self) -> Result<f64, StorageError> {
        self.take().map(f64::from_le_bytes)
    }

    /// Reads a sequence length, checking that at least `len * item_size` bytes remain.
    pub fn seq_len(&mut self, item_size: usize) -> Result<usize, StorageError> {
        let len = usize::try_from(self.u64()?).map_err(|_| StorageError::Truncated)?;
        match len.checked_mul(item_size) {
            Some(bytes) if bytes <= self.data.len() => Ok(len),
            _ => Err(StorageError::Truncated),
        }
    }

    pub fn str(&mut self) -> Result<String, StorageError> {
        let len = self.seq_len(1)?;
        let (s, rest) = self.data.split_at(len);
        self.data = rest;
        String::from_utf8(s.to_vec()).map_err(|_| StorageError::Malformed("invalid utf-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{BooleanEncodedValue, DecimalEncodedValue, EncodingManager};
    use crate::routing::ch::{ChConfig, ContractionHierarchy};
    use crate::routing::landmark::{LandmarkConfig, LandmarkStorage};
    use crate::testing::{five_node_graph, random_graph};
    use crate::weighting::ShortestWeighting;
    use crate::{Graph, Node};
    use std::sync::Arc;

    fn assert_same_graph(a: &Graph, b: &Graph) {
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.edge_records(), b.edge_records());
        assert_eq!(a.raw_flags(), b.raw_flags());
        assert_eq!(a.turn_costs(), b.turn_costs());
        for n in 0..a.node_count() as u32 {
            assert_eq!(a.degree(n), b.degree(n));
        }
    }

    fn graph_with_extras() -> Graph {
        let g = five_node_graph();
        let mut b = Graph::builder(g.encoding().clone());
        for (i, n) in g.nodes().iter().enumerate() {
            let mut n = *n;
            if i % 2 == 0 {
                n.ele = Some(100.5 + i as f32);
            }
            b.add_node(n);
        }
        for e in 0..g.edge_count() as u32 {
            let s = g.edge(e);
            let flags = crate::encoding::EdgeFlags(s.flags().to_vec());
            b.add_edge(s.base(), s.adj(), s.distance(), &flags).unwrap();
        }
        b.set_turn_cost(0, 1, 1, 5.0).unwrap();
        b.set_turn_cost(2, 3, 4, f64::INFINITY).unwrap();
        b.build()
    }

    #[test]
    fn graph_round_trip() {
        let g = graph_with_extras();
        let bytes = to_bytes(&g, g.encoding());
        let loaded: Graph = from_bytes(&bytes, g.encoding()).unwrap();
        assert_same_graph(&g, &loaded);
        assert_eq!(loaded.node(0).and_then(|n| n.ele), Some(100.5));
        assert_eq!(loaded.turn_costs().get(2, 3, 4), f64::INFINITY);
    }

    #[test]
    fn preparations_round_trip() {
        let g = random_graph(3, 120, 150);
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();

        let ch = ContractionHierarchy::prepare(&g, &w, &ChConfig::default()).unwrap();
        let loaded: ContractionHierarchy = from_bytes(&to_bytes(&ch, &g), &g).unwrap();
        assert_eq!(ch, loaded);

        let config = LandmarkConfig {
            landmarks: 4,
            active_landmarks: 2,
            minimum_nodes: 10,
        };
        let lm = LandmarkStorage::prepare(&g, &w, &config).unwrap();
        let loaded: LandmarkStorage = from_bytes(&to_bytes(&lm, &g), &g).unwrap();
        assert_eq!(lm, loaded);
    }

    #[test]
    fn layout_mismatch() {
        let g = five_node_graph();
        let bytes = to_bytes(&g, g.encoding());

        let other = Arc::new(
            EncodingManager::builder()
                .add(BooleanEncodedValue::new("car_access", true).unwrap())
                .unwrap()
                .add(DecimalEncodedValue::new("car_average_speed", 5, 5.0, true).unwrap())
                .unwrap()
                .build()
                .unwrap(),
        );
        assert!(matches!(
            from_bytes::<Graph>(&bytes, &other),
            Err(StorageError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_blobs() {
        let g = five_node_graph();
        let bytes = to_bytes(&g, g.encoding());

        let mut flipped = bytes.clone();
        flipped[HEADER_LEN + 3] ^= 0x40;
        assert!(matches!(
            from_bytes::<Graph>(&flipped, g.encoding()),
            Err(StorageError::ChecksumMismatch)
        ));

        assert!(matches!(
            from_bytes::<Graph>(&bytes[..bytes.len() - 1], g.encoding()),
            Err(StorageError::Truncated)
        ));
        assert!(matches!(
            from_bytes::<Graph>(&bytes[..10], g.encoding()),
            Err(StorageError::Truncated)
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            from_bytes::<Graph>(&bad_magic, g.encoding()),
            Err(StorageError::BadMagic)
        ));

        let mut version = bytes.clone();
        version[4] = 9;
        assert!(matches!(
            from_bytes::<Graph>(&version, g.encoding()),
            Err(StorageError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn oversized_payload_length() {
        let g = five_node_graph();
        let bytes = to_bytes(&g, g.encoding());

        for len in [u64::MAX, u64::MAX - 27, u64::MAX - HEADER_LEN as u64, 1 << 40] {
            let mut corrupted = bytes.clone();
            corrupted[16..HEADER_LEN].copy_from_slice(&len.to_le_bytes());
            assert!(
                matches!(
                    from_bytes::<Graph>(&corrupted, g.encoding()),
                    Err(StorageError::Truncated)
                ),
                "payload length {}",
                len
            );
        }
    }

    #[test]
    fn wrong_kind() {
        let g = five_node_graph();
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let ch = ContractionHierarchy::prepare(&g, &w, &ChConfig::default()).unwrap();
        let bytes = to_bytes(&ch, &g);

        match from_bytes::<Graph>(&bytes, g.encoding()) {
            Err(StorageError::WrongKind { expected, found }) => {
                assert_eq!(expected, BlobKind::Graph);
                assert_eq!(found, BlobKind::ContractionHierarchy as u16);
            }
            other => panic!("expected WrongKind, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn preparation_for_another_graph() {
        let g = five_node_graph();
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let ch = ContractionHierarchy::prepare(&g, &w, &ChConfig::default()).unwrap();
        let bytes = to_bytes(&ch, &g);

        let mut b = Graph::builder(g.encoding().clone());
        b.add_node(Node::ZERO);
        let tiny = b.build();
        assert!(matches!(
            from_bytes::<ContractionHierarchy>(&bytes, &tiny),
            Err(StorageError::Malformed(_))
        ));
    }

    #[test_log::test]
    fn files_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph_with_extras();

        for name in ["graph.bin", "graph.bin.gz"] {
            let path = dir.path().join(name);
            save(&path, &g, g.encoding()).unwrap();
            let loaded: Graph = load(&path, g.encoding()).unwrap();
            assert_same_graph(&g, &loaded);
        }

        let plain = std::fs::read(dir.path().join("graph.bin")).unwrap();
        let gz = std::fs::read(dir.path().join("graph.bin.gz")).unwrap();
        assert_eq!(&plain[..4], b"RRNK");
        assert_eq!(&gz[..2], &[0x1f, 0x8b]);

        assert!(matches!(
            load::<Graph, _>(dir.path().join("missing.bin"), g.encoding()),
            Err(StorageError::Io(_))
        ));
    }
}
