//! H3 cell-based scalar index over a geospatial column.
//!
//! The index maps every non-null row to one representative cell and keeps the
//! raw WKB per row. Queries walk the cell hierarchy to produce a candidate
//! bitmap; the two-phase evaluator then runs the exact predicate over the
//! candidates only.
//!
//! An index is built exactly once (from values, batches, or config) or loaded
//! from its serialized form, then serves reads. All query methods take
//! `&self` over immutable state, so a built index can be shared across
//! threads freely; build and load take `&mut self` and therefore cannot race
//! a reader.

use bitvec::prelude::*;
use bytes::Bytes;
use h3o::{CellIndex, Resolution};
use rustc_hash::FxHashMap;

use crate::config::{FieldType, IndexConfig, H3_INDEX_TYPE};
use crate::digest::representative_cell;
use crate::error::{GeoCellError, Result};
use crate::format::{self, BinarySet};
use crate::geometry::Geometry;
use crate::operator::{GisOp, OpType};
use crate::storage::{FieldBatch, FileManager};

/// Row-aligned bitmap of query matches.
pub type RowBitmap = BitVec;

/// Operations every scalar index over a geospatial column provides.
///
/// The H3 cell index is one concrete implementation; future index kinds slot
/// in as further variants of [`SegmentGeoIndex`].
pub trait ScalarGeoIndex {
    fn build(&mut self, values: &[Bytes]) -> Result<()>;
    fn load(&mut self, set: BinarySet) -> Result<()>;
    fn serialize(&self) -> Result<BinarySet>;
    fn upload(&mut self) -> Result<Vec<(String, u64)>>;
    fn is_in(&self, values: &[Bytes]) -> Result<RowBitmap>;
    fn not_in(&self, values: &[Bytes]) -> Result<RowBitmap>;
    fn is_null(&self) -> Result<RowBitmap>;
    fn is_not_null(&self) -> Result<RowBitmap>;
    fn reverse_lookup(&self, offset: usize) -> Result<&Bytes>;
    fn count(&self) -> usize;
}

/// Scalar index variants a segment can carry for a geospatial column.
pub enum SegmentGeoIndex {
    H3(GeoCellIndex),
}

impl SegmentGeoIndex {
    /// Construct the index kind selected by `config.index_type`.
    pub fn from_config(
        file_manager: Option<Box<dyn FileManager>>,
        config: &IndexConfig,
    ) -> Result<Self> {
        match config.index_type.as_str() {
            H3_INDEX_TYPE => Ok(Self::H3(GeoCellIndex::new(file_manager, config)?)),
            other => Err(GeoCellError::InvalidConfig(format!(
                "unknown geospatial index type {other:?}"
            ))),
        }
    }

    pub fn as_scalar(&self) -> &dyn ScalarGeoIndex {
        match self {
            Self::H3(index) => index,
        }
    }

    pub fn as_scalar_mut(&mut self) -> &mut dyn ScalarGeoIndex {
        match self {
            Self::H3(index) => index,
        }
    }

    /// Two-phase predicate evaluation on the underlying index.
    pub fn exec_geo_relations(&self, values: &[Bytes], op: GisOp) -> Result<RowBitmap> {
        match self {
            Self::H3(index) => index.exec_geo_relations(values, op),
        }
    }
}

/// H3 cell index over one geospatial column of a segment.
pub struct GeoCellIndex {
    resolution: Resolution,
    built: bool,
    total_rows: usize,
    /// Representative cell to ascending row offsets.
    cells: FxHashMap<CellIndex, Vec<u32>>,
    /// Raw WKB per row offset; empty bytes mark null rows.
    raw: Vec<Bytes>,
    /// Ascending offsets of rows whose input was empty.
    null_offsets: Vec<u64>,
    file_manager: Option<Box<dyn FileManager>>,
}

impl GeoCellIndex {
    /// Create an empty index.
    ///
    /// Fails with [`GeoCellError::InvalidConfig`] when the resolution is
    /// outside [0, 15] or the column is not geospatial. The file manager is
    /// kept for config-driven build, load, and upload; a plain in-memory
    /// build never touches it.
    pub fn new(
        file_manager: Option<Box<dyn FileManager>>,
        config: &IndexConfig,
    ) -> Result<Self> {
        let resolution = Resolution::try_from(config.resolution).map_err(|_| {
            GeoCellError::InvalidConfig(format!(
                "H3 resolution must be in [0, 15], got {}",
                config.resolution
            ))
        })?;
        if config.field_type != FieldType::Geospatial {
            return Err(GeoCellError::InvalidConfig(format!(
                "H3 index requires a geospatial column, got {:?}",
                config.field_type
            )));
        }
        Ok(Self {
            resolution,
            built: false,
            total_rows: 0,
            cells: FxHashMap::default(),
            raw: Vec::new(),
            null_offsets: Vec::new(),
            file_manager,
        })
    }

    /// Index without a file manager, for purely in-memory use.
    pub fn in_memory(resolution: u8) -> Result<Self> {
        Self::new(None, &IndexConfig::with_resolution(resolution))
    }

    /// Maximum resolution representative cells are digested at.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Number of indexed rows, null rows included.
    pub fn count(&self) -> usize {
        self.total_rows
    }

    /// Number of distinct representative cells.
    pub fn cardinality(&self) -> usize {
        self.cells.len()
    }

    /// The index keeps every row's WKB and can serve it back.
    pub fn has_raw_data(&self) -> bool {
        true
    }

    fn ensure_built(&self) -> Result<()> {
        if self.built {
            Ok(())
        } else {
            Err(GeoCellError::NotBuilt)
        }
    }

    /// Build from one WKB value per row; empty bytes mark null rows.
    ///
    /// Any row failure aborts the build and leaves the index un-built: state
    /// is staged locally and committed only after the last row succeeded.
    pub fn build(&mut self, values: &[Bytes]) -> Result<()> {
        if self.built {
            return Err(GeoCellError::AlreadyBuilt);
        }
        if values.len() > u32::MAX as usize {
            return Err(GeoCellError::InvalidConfig(format!(
                "segment of {} rows exceeds the u32 offset space",
                values.len()
            )));
        }

        let mut cells: FxHashMap<CellIndex, Vec<u32>> = FxHashMap::default();
        let mut raw = Vec::with_capacity(values.len());
        let mut null_offsets = Vec::new();

        for (offset, value) in values.iter().enumerate() {
            if value.is_empty() {
                null_offsets.push(offset as u64);
                raw.push(Bytes::new());
                continue;
            }
            let geometry = Geometry::from_wkb(value)?;
            let cell = representative_cell(geometry.geo(), self.resolution)?;
            cells.entry(cell).or_default().push(offset as u32);
            raw.push(value.clone());
        }

        self.cells = cells;
        self.raw = raw;
        self.null_offsets = null_offsets;
        self.total_rows = values.len();
        self.built = true;
        log::info!(
            "built H3 index: rows={}, cells={}, nulls={}",
            self.total_rows,
            self.cells.len(),
            self.null_offsets.len()
        );
        Ok(())
    }

    /// Build from field batches, mapping invalid rows to nulls.
    pub fn build_with_batches(&mut self, batches: &[FieldBatch]) -> Result<()> {
        let mut values = Vec::new();
        for batch in batches {
            if batch.field_type() != FieldType::Geospatial {
                return Err(GeoCellError::InvalidConfig(format!(
                    "H3 index expects geospatial batches, got {:?}",
                    batch.field_type()
                )));
            }
            values.reserve(batch.num_rows());
            for row in 0..batch.num_rows() {
                if batch.is_valid(row) {
                    values.push(batch.value(row).clone());
                } else {
                    values.push(Bytes::new());
                }
            }
        }
        self.build(&values)
    }

    /// Build from the raw-data blobs named by `config.insert_files`.
    pub fn build_from_config(&mut self, config: &IndexConfig) -> Result<()> {
        if self.built {
            return Err(GeoCellError::AlreadyBuilt);
        }
        if config.insert_files.is_empty() {
            return Err(GeoCellError::InvalidConfig(
                "insert_files is empty".to_string(),
            ));
        }
        let batches = match self.file_manager.as_ref() {
            Some(manager) => manager.cache_raw_data_to_memory(&config.insert_files)?,
            None => {
                return Err(GeoCellError::InvalidConfig(
                    "no file manager attached; cannot read insert files".to_string(),
                ))
            }
        };
        self.build_with_batches(&batches)
    }

    /// Serialize the built index into its three keyed buffers.
    pub fn serialize(&self) -> Result<BinarySet> {
        self.ensure_built()?;
        let mut set = BinarySet::new();
        set.append(
            format::INDEX_NUM_ROWS_KEY,
            format::encode_num_rows(self.total_rows),
        );
        set.append(
            format::INDEX_NULL_OFFSETS_KEY,
            format::encode_null_offsets(&self.null_offsets),
        );
        set.append(
            format::INDEX_DATA_KEY,
            format::encode_index_data(&self.cells, &self.raw),
        );
        Ok(set)
    }

    /// Restore an index from its keyed buffers, assembling shards first.
    pub fn load(&mut self, set: BinarySet) -> Result<()> {
        if self.built {
            return Err(GeoCellError::AlreadyBuilt);
        }
        let set = format::assemble(set)?;

        let num_rows_buf = set.get(format::INDEX_NUM_ROWS_KEY).ok_or_else(|| {
            GeoCellError::CorruptIndex("missing INDEX_NUM_ROWS buffer".to_string())
        })?;
        let total_rows = format::decode_num_rows(num_rows_buf)?;

        let null_buf = set.get(format::INDEX_NULL_OFFSETS_KEY).ok_or_else(|| {
            GeoCellError::CorruptIndex("missing INDEX_NULL_OFFSETS buffer".to_string())
        })?;
        let null_offsets = format::decode_null_offsets(null_buf)?;
        for &offset in &null_offsets {
            if offset as usize >= total_rows {
                return Err(GeoCellError::CorruptIndex(format!(
                    "null offset {offset} out of range for {total_rows} rows"
                )));
            }
        }

        let data_buf = set.get(format::INDEX_DATA_KEY).ok_or_else(|| {
            GeoCellError::CorruptIndex("missing INDEX_DATA buffer".to_string())
        })?;
        let (cells, raw) = format::decode_index_data(data_buf, total_rows)?;

        // Every row must land in exactly one offset list or the null set.
        let indexed: usize = cells.values().map(Vec::len).sum();
        if indexed + null_offsets.len() != total_rows {
            return Err(GeoCellError::CorruptIndex(format!(
                "{indexed} indexed rows + {} nulls != {total_rows} total",
                null_offsets.len()
            )));
        }

        self.cells = cells;
        self.raw = raw;
        self.null_offsets = null_offsets;
        self.total_rows = total_rows;
        self.built = true;
        log::info!(
            "loaded H3 index: rows={}, cells={}",
            self.total_rows,
            self.cells.len()
        );
        Ok(())
    }

    /// Load from the index blobs named by `config.index_files`.
    pub fn load_from_config(&mut self, config: &IndexConfig) -> Result<()> {
        if self.built {
            return Err(GeoCellError::AlreadyBuilt);
        }
        if config.index_files.is_empty() {
            return Err(GeoCellError::InvalidConfig(
                "index_files is empty".to_string(),
            ));
        }
        let set = match self.file_manager.as_ref() {
            Some(manager) => manager.load_index_to_memory(&config.index_files)?,
            None => {
                return Err(GeoCellError::InvalidConfig(
                    "no file manager attached; cannot read index files".to_string(),
                ))
            }
        };
        self.load(set)
    }

    /// Serialize, shard, and hand everything to the file manager.
    ///
    /// Returns the remote paths and sizes the manager reports back.
    pub fn upload(&mut self) -> Result<Vec<(String, u64)>> {
        let set = self.serialize()?;
        let sharded = format::disassemble(set, format::DEFAULT_SHARD_SIZE);
        match self.file_manager.as_mut() {
            Some(manager) => {
                manager.add_file(&sharded)?;
                Ok(manager.remote_paths_to_size())
            }
            None => Err(GeoCellError::InvalidConfig(
                "no file manager attached; cannot upload".to_string(),
            )),
        }
    }

    /// Mark every row whose representative cell is the query's representative,
    /// one of its ancestors, or one of its descendants.
    fn mark_candidates(
        &self,
        values: &[Bytes],
        bits: &mut RowBitmap,
        value: bool,
    ) -> Result<()> {
        for query in values {
            let geometry = Geometry::from_wkb(query)?;
            let rep = representative_cell(geometry.geo(), self.resolution)?;
            let rep_res = rep.resolution();

            // The representative cell itself.
            if let Some(offsets) = self.cells.get(&rep) {
                for &offset in offsets {
                    bits.set(offset as usize, value);
                }
            }

            // Every proper ancestor up to resolution 0.
            for level in (0..u8::from(rep_res)).rev() {
                let coarser = Resolution::try_from(level)
                    .map_err(|e| GeoCellError::InvalidGeometry(e.to_string()))?;
                let Some(ancestor) = rep.parent(coarser) else {
                    continue;
                };
                if let Some(offsets) = self.cells.get(&ancestor) {
                    for &offset in offsets {
                        bits.set(offset as usize, value);
                    }
                }
            }

            // Descendants: an indexed cell at a finer resolution matches iff
            // its ancestor at the query resolution is the query cell. One walk
            // over the cell map, instead of enumerating 7^(r*-rq) children.
            for (cell, offsets) in &self.cells {
                if cell.resolution() > rep_res && cell.parent(rep_res) == Some(rep) {
                    for &offset in offsets {
                        bits.set(offset as usize, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Candidate test: rows whose representative cell is related to any
    /// query's representative cell along the ancestor/descendant axis.
    pub fn is_in(&self, values: &[Bytes]) -> Result<RowBitmap> {
        self.ensure_built()?;
        let mut bits = bitvec![0; self.total_rows];
        self.mark_candidates(values, &mut bits, true)?;
        Ok(bits)
    }

    /// Complement of [`GeoCellIndex::is_in`] over all rows.
    pub fn not_in(&self, values: &[Bytes]) -> Result<RowBitmap> {
        self.ensure_built()?;
        let mut bits = bitvec![1; self.total_rows];
        self.mark_candidates(values, &mut bits, false)?;
        Ok(bits)
    }

    /// Rows whose input was empty.
    pub fn is_null(&self) -> Result<RowBitmap> {
        self.ensure_built()?;
        let mut bits = bitvec![0; self.total_rows];
        for &offset in &self.null_offsets {
            bits.set(offset as usize, true);
        }
        Ok(bits)
    }

    /// Rows holding a geometry.
    pub fn is_not_null(&self) -> Result<RowBitmap> {
        self.ensure_built()?;
        let mut bits = bitvec![1; self.total_rows];
        for &offset in &self.null_offsets {
            bits.set(offset as usize, false);
        }
        Ok(bits)
    }

    /// Geospatial values are unordered; range queries cannot be served.
    pub fn range(&self, _value: &[u8], _op: OpType) -> Result<RowBitmap> {
        Err(GeoCellError::NotSupported(
            "geospatial values are unordered; range queries are not supported".to_string(),
        ))
    }

    /// Bounded form of [`GeoCellIndex::range`]; equally unsupported.
    pub fn range_between(
        &self,
        _lower: &[u8],
        _lower_inclusive: bool,
        _upper: &[u8],
        _upper_inclusive: bool,
    ) -> Result<RowBitmap> {
        Err(GeoCellError::NotSupported(
            "geospatial values are unordered; range queries are not supported".to_string(),
        ))
    }

    /// Raw WKB bytes stored for a row offset.
    pub fn reverse_lookup(&self, offset: usize) -> Result<&Bytes> {
        self.ensure_built()?;
        if offset >= self.total_rows {
            return Err(GeoCellError::OutOfRange {
                offset,
                rows: self.total_rows,
            });
        }
        Ok(&self.raw[offset])
    }

    /// Two-phase predicate evaluation.
    ///
    /// Candidate rows come from [`GeoCellIndex::is_in`]; each candidate's
    /// stored geometry is then tested against the query values with the exact
    /// predicate, short-circuiting on the first matching value per row. Null
    /// rows are never candidates and never set.
    pub fn exec_geo_relations(&self, values: &[Bytes], op: GisOp) -> Result<RowBitmap> {
        let candidates = self.is_in(values)?;
        let queries = values
            .iter()
            .map(|value| Geometry::from_wkb(value))
            .collect::<Result<Vec<_>>>()?;
        let predicate = op.predicate();

        let mut bits = bitvec![0; self.total_rows];
        for offset in candidates.iter_ones() {
            let row = Geometry::from_wkb(&self.raw[offset])?;
            if queries.iter().any(|query| predicate(&row, query)) {
                bits.set(offset, true);
            }
        }
        Ok(bits)
    }
}

impl ScalarGeoIndex for GeoCellIndex {
    fn build(&mut self, values: &[Bytes]) -> Result<()> {
        GeoCellIndex::build(self, values)
    }

    fn load(&mut self, set: BinarySet) -> Result<()> {
        GeoCellIndex::load(self, set)
    }

    fn serialize(&self) -> Result<BinarySet> {
        GeoCellIndex::serialize(self)
    }

    fn upload(&mut self) -> Result<Vec<(String, u64)>> {
        GeoCellIndex::upload(self)
    }

    fn is_in(&self, values: &[Bytes]) -> Result<RowBitmap> {
        GeoCellIndex::is_in(self, values)
    }

    fn not_in(&self, values: &[Bytes]) -> Result<RowBitmap> {
        GeoCellIndex::not_in(self, values)
    }

    fn is_null(&self) -> Result<RowBitmap> {
        GeoCellIndex::is_null(self)
    }

    fn is_not_null(&self) -> Result<RowBitmap> {
        GeoCellIndex::is_not_null(self)
    }

    fn reverse_lookup(&self, offset: usize) -> Result<&Bytes> {
        GeoCellIndex::reverse_lookup(self, offset)
    }

    fn count(&self) -> usize {
        GeoCellIndex::count(self)
    }
}
