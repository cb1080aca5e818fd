//! Serialized layout of the index.
//!
//! A built index persists as a keyed set of byte buffers:
//!
//! - `INDEX_NUM_ROWS`: 8-byte little-endian row count.
//! - `INDEX_NULL_OFFSETS`: packed 8-byte little-endian null row offsets,
//!   ascending.
//! - `INDEX_DATA`: per cell, an 8-byte cell id and a 4-byte list length, then
//!   per offset a 4-byte row offset, a 4-byte WKB length, and the WKB payload.
//!
//! The layout is self-describing and streams: no terminator depends on string
//! contents, so the persistence layer can split `INDEX_DATA` into fixed-size
//! shards and reassemble them byte-for-byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use h3o::CellIndex;
use rustc_hash::FxHashMap;

use crate::error::{GeoCellError, Result};

/// Key of the cell-to-rows payload buffer.
pub const INDEX_DATA_KEY: &str = "INDEX_DATA";
/// Key of the packed null offsets buffer.
pub const INDEX_NULL_OFFSETS_KEY: &str = "INDEX_NULL_OFFSETS";
/// Key of the row count buffer.
pub const INDEX_NUM_ROWS_KEY: &str = "INDEX_NUM_ROWS";

/// Shard size used when disassembling large buffers for upload.
pub const DEFAULT_SHARD_SIZE: usize = 16 * 1024 * 1024;

const CELL_ID_LEN: usize = 8;
const LIST_LEN_LEN: usize = 4;
const OFFSET_LEN: usize = 4;
const WKB_LEN_LEN: usize = 4;

/// Keyed set of byte buffers exchanged with the persistence layer.
#[derive(Debug, Clone, Default)]
pub struct BinarySet {
    entries: FxHashMap<String, Bytes>,
}

impl BinarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a buffer under a key, replacing any previous entry.
    pub fn append(&mut self, key: impl Into<String>, data: Bytes) {
        self.entries.insert(key.into(), data);
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

/// Exact byte length of the `INDEX_DATA` buffer.
///
/// This is the same accounting the encoder performs, record by record, so the
/// buffer is sized exactly rather than estimated.
pub fn index_data_size(cells: &FxHashMap<CellIndex, Vec<u32>>, raw: &[Bytes]) -> usize {
    let mut size = 0;
    for offsets in cells.values() {
        size += CELL_ID_LEN + LIST_LEN_LEN;
        for &offset in offsets {
            size += OFFSET_LEN + WKB_LEN_LEN + raw[offset as usize].len();
        }
    }
    size
}

/// Encode the cell map and raw payloads into the `INDEX_DATA` layout.
///
/// Cell order is unspecified; the per-cell offset lists keep their stored
/// order.
pub fn encode_index_data(cells: &FxHashMap<CellIndex, Vec<u32>>, raw: &[Bytes]) -> Bytes {
    let size = index_data_size(cells, raw);
    let mut buf = BytesMut::with_capacity(size);
    for (cell, offsets) in cells {
        buf.put_u64_le(u64::from(*cell));
        buf.put_u32_le(offsets.len() as u32);
        for &offset in offsets {
            let wkb = &raw[offset as usize];
            buf.put_u32_le(offset);
            buf.put_u32_le(wkb.len() as u32);
            buf.put_slice(wkb);
        }
    }
    debug_assert_eq!(buf.len(), size);
    buf.freeze()
}

/// Decode an `INDEX_DATA` buffer back into the cell map and raw payloads.
pub fn decode_index_data(
    data: &[u8],
    total_rows: usize,
) -> Result<(FxHashMap<CellIndex, Vec<u32>>, Vec<Bytes>)> {
    let mut cells: FxHashMap<CellIndex, Vec<u32>> = FxHashMap::default();
    let mut raw = vec![Bytes::new(); total_rows];
    let mut buf = data;
    while buf.has_remaining() {
        if buf.remaining() < CELL_ID_LEN + LIST_LEN_LEN {
            return Err(GeoCellError::CorruptIndex(
                "truncated cell record header".to_string(),
            ));
        }
        let cell = CellIndex::try_from(buf.get_u64_le())
            .map_err(|e| GeoCellError::CorruptIndex(e.to_string()))?;
        let list_len = buf.get_u32_le() as usize;
        let offsets = cells.entry(cell).or_default();
        offsets.reserve(list_len);
        for _ in 0..list_len {
            if buf.remaining() < OFFSET_LEN + WKB_LEN_LEN {
                return Err(GeoCellError::CorruptIndex(
                    "truncated offset record".to_string(),
                ));
            }
            let offset = buf.get_u32_le();
            let wkb_len = buf.get_u32_le() as usize;
            if offset as usize >= total_rows {
                return Err(GeoCellError::CorruptIndex(format!(
                    "row offset {offset} out of range for {total_rows} rows"
                )));
            }
            if buf.remaining() < wkb_len {
                return Err(GeoCellError::CorruptIndex(
                    "truncated WKB payload".to_string(),
                ));
            }
            raw[offset as usize] = buf.copy_to_bytes(wkb_len);
            offsets.push(offset);
        }
    }
    Ok((cells, raw))
}

/// Encode the null row offsets as packed 8-byte little-endian values.
pub fn encode_null_offsets(null_offsets: &[u64]) -> Bytes {
    let mut buf = BytesMut::with_capacity(null_offsets.len() * 8);
    for &offset in null_offsets {
        buf.put_u64_le(offset);
    }
    buf.freeze()
}

/// Decode packed null offsets.
pub fn decode_null_offsets(data: &[u8]) -> Result<Vec<u64>> {
    if data.len() % 8 != 0 {
        return Err(GeoCellError::CorruptIndex(format!(
            "null offsets buffer length {} is not a multiple of 8",
            data.len()
        )));
    }
    let mut buf = data;
    let mut offsets = Vec::with_capacity(data.len() / 8);
    while buf.has_remaining() {
        offsets.push(buf.get_u64_le());
    }
    Ok(offsets)
}

/// Encode the total row count.
pub fn encode_num_rows(total_rows: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64_le(total_rows as u64);
    buf.freeze()
}

/// Decode the total row count.
pub fn decode_num_rows(data: &[u8]) -> Result<usize> {
    if data.len() != 8 {
        return Err(GeoCellError::CorruptIndex(format!(
            "row count buffer has {} bytes, expected 8",
            data.len()
        )));
    }
    let mut buf = data;
    Ok(buf.get_u64_le() as usize)
}

/// Split oversized buffers into fixed-size shards keyed `{key}#{n}`.
///
/// Buffers at or below the shard size pass through untouched. The inverse is
/// [`assemble`].
pub fn disassemble(set: BinarySet, shard_size: usize) -> BinarySet {
    let mut out = BinarySet::new();
    for (key, data) in set.entries {
        if data.len() <= shard_size {
            out.append(key, data);
            continue;
        }
        let mut part = 0;
        let mut rest = data;
        while !rest.is_empty() {
            let take = rest.len().min(shard_size);
            out.append(format!("{key}#{part}"), rest.split_to(take));
            part += 1;
        }
    }
    out
}

/// Reassemble shards produced by [`disassemble`] into whole buffers.
pub fn assemble(set: BinarySet) -> Result<BinarySet> {
    let mut whole = BinarySet::new();
    let mut sharded: FxHashMap<String, Vec<(usize, Bytes)>> = FxHashMap::default();

    for (key, data) in set.entries {
        match key.rsplit_once('#') {
            Some((base, part)) => {
                let part: usize = part.parse().map_err(|_| {
                    GeoCellError::CorruptIndex(format!("bad shard suffix in key {key:?}"))
                })?;
                sharded.entry(base.to_string()).or_default().push((part, data));
            }
            None => whole.append(key, data),
        }
    }

    for (base, mut parts) in sharded {
        parts.sort_by_key(|(part, _)| *part);
        for (expected, (part, _)) in parts.iter().enumerate() {
            if *part != expected {
                return Err(GeoCellError::CorruptIndex(format!(
                    "missing shard {expected} of buffer {base:?}"
                )));
            }
        }
        let total: usize = parts.iter().map(|(_, data)| data.len()).sum();
        let mut buf = BytesMut::with_capacity(total);
        for (_, data) in parts {
            buf.put_slice(&data);
        }
        whole.append(base, buf.freeze());
    }

    Ok(whole)
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3o::{LatLng, Resolution};

    fn sample_cells() -> (FxHashMap<CellIndex, Vec<u32>>, Vec<Bytes>) {
        let cell_a = LatLng::new(40.7128, -74.0060)
            .unwrap()
            .to_cell(Resolution::Nine);
        let cell_b = LatLng::new(51.5074, -0.1278)
            .unwrap()
            .to_cell(Resolution::Nine);
        let mut cells = FxHashMap::default();
        cells.insert(cell_a, vec![0, 2]);
        cells.insert(cell_b, vec![3]);
        let raw = vec![
            Bytes::from_static(b"wkb-zero"),
            Bytes::new(),
            Bytes::from_static(b"wkb-two"),
            Bytes::from_static(b"wkb-three"),
        ];
        (cells, raw)
    }

    #[test]
    fn test_index_data_round_trip() {
        let (cells, raw) = sample_cells();
        let encoded = encode_index_data(&cells, &raw);
        assert_eq!(encoded.len(), index_data_size(&cells, &raw));

        let (decoded_cells, decoded_raw) = decode_index_data(&encoded, raw.len()).unwrap();
        assert_eq!(decoded_cells, cells);
        assert_eq!(decoded_raw, raw);
    }

    #[test]
    fn test_truncated_data_is_corrupt() {
        let (cells, raw) = sample_cells();
        let encoded = encode_index_data(&cells, &raw);
        for cut in [1, 9, 13, encoded.len() - 1] {
            let result = decode_index_data(&encoded[..cut], raw.len());
            assert!(
                matches!(result, Err(GeoCellError::CorruptIndex(_))),
                "cut at {cut} should be corrupt"
            );
        }
    }

    #[test]
    fn test_out_of_range_offset_is_corrupt() {
        let (cells, raw) = sample_cells();
        let encoded = encode_index_data(&cells, &raw);
        // Fewer declared rows than the stored offsets reference.
        assert!(matches!(
            decode_index_data(&encoded, 1),
            Err(GeoCellError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_null_offsets_round_trip() {
        let offsets = vec![1u64, 3, 7];
        let decoded = decode_null_offsets(&encode_null_offsets(&offsets)).unwrap();
        assert_eq!(decoded, offsets);

        assert!(decode_null_offsets(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_num_rows_round_trip() {
        assert_eq!(decode_num_rows(&encode_num_rows(12345)).unwrap(), 12345);
        assert!(decode_num_rows(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_disassemble_assemble_round_trip() {
        let mut set = BinarySet::new();
        set.append(INDEX_DATA_KEY, Bytes::from(vec![7u8; 100]));
        set.append(INDEX_NUM_ROWS_KEY, encode_num_rows(4));

        let sharded = disassemble(set, 33);
        assert!(sharded.get(INDEX_DATA_KEY).is_none());
        assert!(sharded.get("INDEX_DATA#0").is_some());
        assert!(sharded.get("INDEX_DATA#3").is_some());
        // Small buffers pass through unsharded.
        assert!(sharded.get(INDEX_NUM_ROWS_KEY).is_some());

        let assembled = assemble(sharded).unwrap();
        assert_eq!(assembled.get(INDEX_DATA_KEY).unwrap().as_ref(), &[7u8; 100][..]);
        assert_eq!(decode_num_rows(assembled.get(INDEX_NUM_ROWS_KEY).unwrap()).unwrap(), 4);
    }

    #[test]
    fn test_assemble_missing_shard_is_corrupt() {
        let mut set = BinarySet::new();
        set.append("INDEX_DATA#0", Bytes::from_static(b"aaa"));
        set.append("INDEX_DATA#2", Bytes::from_static(b"ccc"));
        assert!(matches!(
            assemble(set),
            Err(GeoCellError::CorruptIndex(_))
        ));
    }
}
