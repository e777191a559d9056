/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, ReadBytesExt};

use flate2::read::ZlibDecoder;

use crate::error::{BbiError, Result};
use crate::genome::Genome;

/* -------------------------------------------------------------------------- */

pub const BIGWIG_MAGIC : u32 = 0x888FFC26;
pub const BIGBED_MAGIC : u32 = 0x8789F2EB;
pub const CIRTREE_MAGIC: u32 = 0x78CA8C91;
pub const IDX_MAGIC    : u32 = 0x2468ACE0;

pub const BBI_TYPE_BED_GRAPH: u8 = 1;
pub const BBI_TYPE_VARIABLE : u8 = 2;
pub const BBI_TYPE_FIXED    : u8 = 3;

// Files below this version predate the 64-byte header parsed here
const BBI_MIN_VERSION: u16 = 3;

/* -------------------------------------------------------------------------- */

fn uncompress_slice(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut buffer  = Vec::new();
    decoder
        .read_to_end(&mut buffer)
        .map_err(|_| BbiError::Corrupt(String::from("failed to inflate data block")))?;
    Ok(buffer)
}

/* -------------------------------------------------------------------------- */

/// Header of a single zoom level. On disk the record is 24 bytes with
/// 4 bytes of padding between `reduction_level` and `data_offset`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BbiHeaderZoom {
    pub reduction_level: u32,
    pub data_offset    : u64,
    pub index_offset   : u64,
}

impl BbiHeaderZoom {

    fn read<E: ByteOrder, R: Read + Seek>(reader: &mut R) -> Result<BbiHeaderZoom> {
        let reduction_level = reader.read_u32::<E>()?;
        let _padding        = reader.read_u32::<E>()?;
        let data_offset     = reader.read_u64::<E>()?;
        let index_offset    = reader.read_u64::<E>()?;

        Ok(BbiHeaderZoom {
            reduction_level,
            data_offset,
            index_offset,
        })
    }

}

/* -------------------------------------------------------------------------- */

/// File-wide aggregate over all full-resolution records.
#[derive(Clone, Copy, Debug, Default)]
pub struct BbiTotalSummary {
    pub n_bases_covered: u64,
    pub min_val        : f64,
    pub max_val        : f64,
    pub sum_data       : f64,
    pub sum_squared    : f64,
}

impl BbiTotalSummary {

    fn read<E: ByteOrder, R: Read + Seek>(reader: &mut R) -> Result<BbiTotalSummary> {
        Ok(BbiTotalSummary {
            n_bases_covered: reader.read_u64::<E>()?,
            min_val        : reader.read_f64::<E>()?,
            max_val        : reader.read_f64::<E>()?,
            sum_data       : reader.read_f64::<E>()?,
            sum_squared    : reader.read_f64::<E>()?,
        })
    }

}

/* -------------------------------------------------------------------------- */

/// The fixed 64-byte header at the start of every bbi file, together with
/// the zoom-level table and the optional total summary.
#[derive(Clone, Debug, Default)]
pub struct BbiHeader {
    pub magic              : u32,
    pub version            : u16,
    pub zoom_levels        : u16,
    pub ct_offset          : u64,
    pub data_offset        : u64,
    pub index_offset       : u64,
    pub field_count        : u16,
    pub defined_field_count: u16,
    pub sql_offset         : u64,
    pub summary_offset     : u64,
    pub uncompress_buf_size: u32,
    pub extension_offset   : u64,
    pub zoom_headers       : Vec<BbiHeaderZoom>,
    pub summary            : Option<BbiTotalSummary>,
}

impl BbiHeader {

    pub fn read<E: ByteOrder, R: Read + Seek>(reader: &mut R, expected_magic: u32) -> Result<BbiHeader> {

        reader.seek(SeekFrom::Start(0))?;

        let magic = reader.read_u32::<E>()?;

        if magic != expected_magic {
            if magic == BIGWIG_MAGIC || magic == BIGBED_MAGIC {
                let expected = if expected_magic == BIGWIG_MAGIC { "bigWig" } else { "bigBed" };
                return Err(BbiError::WrongFileType { expected });
            }
            return Err(BbiError::BadMagic { found: magic, expected: expected_magic });
        }

        let mut header = BbiHeader {
            magic,
            version            : reader.read_u16::<E>()?,
            zoom_levels        : reader.read_u16::<E>()?,
            ct_offset          : reader.read_u64::<E>()?,
            data_offset        : reader.read_u64::<E>()?,
            index_offset       : reader.read_u64::<E>()?,
            field_count        : reader.read_u16::<E>()?,
            defined_field_count: reader.read_u16::<E>()?,
            sql_offset         : reader.read_u64::<E>()?,
            summary_offset     : reader.read_u64::<E>()?,
            uncompress_buf_size: reader.read_u32::<E>()?,
            extension_offset   : reader.read_u64::<E>()?,
            zoom_headers       : Vec::new(),
            summary            : None,
        };

        if header.version < BBI_MIN_VERSION {
            return Err(BbiError::UnsupportedVersion(header.version));
        }

        for _ in 0..header.zoom_levels {
            header.zoom_headers.push(BbiHeaderZoom::read::<E, R>(reader)?);
        }

        if header.summary_offset != 0 {
            reader.seek(SeekFrom::Start(header.summary_offset))?;
            header.summary = Some(BbiTotalSummary::read::<E, R>(reader)?);
        }

        Ok(header)
    }

    pub fn is_bigwig(&self) -> bool {
        self.magic == BIGWIG_MAGIC
    }

    pub fn is_bigbed(&self) -> bool {
        self.magic == BIGBED_MAGIC
    }

    /// Number of bases covered by at least one record, zero when the file
    /// carries no summary.
    pub fn n_bases_covered(&self) -> u64 {
        self.summary.map(|s| s.n_bases_covered).unwrap_or(0)
    }

}

/* -------------------------------------------------------------------------- */

// The chromosome B+-tree maps names to (id, length) pairs. Ids must be
// dense on [0, item_count), names shorter than key_size are NUL-padded.
fn read_chrom_node<E: ByteOrder, R: Read + Seek>(
    reader  : &mut R,
    key_size: usize,
    names   : &mut Vec<Option<String>>,
    lengths : &mut Vec<usize>,
) -> Result<()> {

    let is_leaf  = reader.read_u8()?;
    let _padding = reader.read_u8()?;
    let n_items  = reader.read_u16::<E>()?;

    if is_leaf != 0 {
        let mut key = vec![0u8; key_size];

        for _ in 0..n_items {
            reader.read_exact(&mut key)?;

            let idx = reader.read_u32::<E>()? as usize;
            let len = reader.read_u32::<E>()? as usize;

            if idx >= names.len() {
                return Err(BbiError::Corrupt(String::from("chromosome index out of range")));
            }
            if names[idx].is_some() {
                return Err(BbiError::Corrupt(String::from("duplicate chromosome index")));
            }
            let name = String::from_utf8_lossy(&key).trim_end_matches('\x00').to_string();

            names  [idx] = Some(name);
            lengths[idx] = len;
        }
    } else {
        let mut key     = vec![0u8; key_size];
        let mut offsets = Vec::with_capacity(n_items as usize);

        for _ in 0..n_items {
            reader.read_exact(&mut key)?;
            offsets.push(reader.read_u64::<E>()?);
        }
        for offset in offsets {
            reader.seek(SeekFrom::Start(offset))?;
            read_chrom_node::<E, R>(reader, key_size, names, lengths)?;
        }
    }
    Ok(())
}

fn read_chrom_list<E: ByteOrder, R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Genome> {

    reader.seek(SeekFrom::Start(offset))?;

    let magic = reader.read_u32::<E>()?;

    if magic != CIRTREE_MAGIC {
        return Err(BbiError::BadMagic { found: magic, expected: CIRTREE_MAGIC });
    }

    let _block_size = reader.read_u32::<E>()?;
    let key_size    = reader.read_u32::<E>()? as usize;
    let value_size  = reader.read_u32::<E>()?;
    let item_count  = reader.read_u64::<E>()? as usize;
    let _reserved   = reader.read_u64::<E>()?;

    if value_size != 8 {
        return Err(BbiError::Corrupt(String::from("invalid chromosome list value size")));
    }

    let mut names  : Vec<Option<String>> = vec![None; item_count];
    let mut lengths: Vec<usize>          = vec![0; item_count];

    if item_count > 0 {
        read_chrom_node::<E, R>(reader, key_size, &mut names, &mut lengths)?;
    }

    let seqnames = names
        .into_iter()
        .collect::<Option<Vec<String>>>()
        .ok_or_else(|| BbiError::Corrupt(String::from("chromosome indices are not dense")))?;

    Ok(Genome::new(seqnames, lengths))
}

/* -------------------------------------------------------------------------- */

/// Location of one compressed data block within the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BbiBlockLocation {
    pub offset: u64,
    pub size  : u64,
}

/* -------------------------------------------------------------------------- */

// A node covers the genomic range [(chr_idx_start[i], base_start[i]),
// (chr_idx_end[i], base_end[i])) for each of its children; positions are
// compared lexicographically on the (chrom index, base) pair since one
// node may span several chromosomes.
#[derive(Clone, Debug, Default)]
pub struct RVertex {
    pub is_leaf      : u8,
    pub chr_idx_start: Vec<u32>,
    pub base_start   : Vec<u32>,
    pub chr_idx_end  : Vec<u32>,
    pub base_end     : Vec<u32>,
    pub child_offset : Vec<u64>,
    pub data_offset  : Vec<u64>,
    pub data_size    : Vec<u64>,
    pub children     : Vec<RVertex>,
}

impl RVertex {

    fn read<E: ByteOrder, R: Read + Seek>(reader: &mut R, min_data_offset: u64) -> Result<RVertex> {

        let mut vertex = RVertex::default();

        vertex.is_leaf = reader.read_u8()?;

        let _padding = reader.read_u8()?;
        let n_items  = reader.read_u16::<E>()?;

        for _ in 0..n_items {
            vertex.chr_idx_start.push(reader.read_u32::<E>()?);
            vertex.base_start   .push(reader.read_u32::<E>()?);
            vertex.chr_idx_end  .push(reader.read_u32::<E>()?);
            vertex.base_end     .push(reader.read_u32::<E>()?);

            if vertex.is_leaf != 0 {
                let data_offset = reader.read_u64::<E>()?;
                let data_size   = reader.read_u64::<E>()?;

                if data_size == 0 {
                    return Err(BbiError::Corrupt(String::from("index references an empty data block")));
                }
                if data_offset < min_data_offset {
                    return Err(BbiError::Corrupt(String::from("index references a block before the data section")));
                }
                vertex.data_offset.push(data_offset);
                vertex.data_size  .push(data_size);
            } else {
                vertex.child_offset.push(reader.read_u64::<E>()?);
            }
        }

        if vertex.is_leaf == 0 {
            for i in 0..n_items as usize {
                reader.seek(SeekFrom::Start(vertex.child_offset[i]))?;
                vertex.children.push(RVertex::read::<E, R>(reader, min_data_offset)?);
            }
        }

        Ok(vertex)
    }

    fn overlaps(&self, i: usize, chrom_id: u32, from: u32, to: u32) -> bool {
        (self.chr_idx_end  [i], self.base_end  [i]) > (chrom_id, from) &&
        (self.chr_idx_start[i], self.base_start[i]) < (chrom_id, to)
    }

    fn collect_blocks(&self, chrom_id: u32, from: u32, to: u32, blocks: &mut Vec<BbiBlockLocation>) {
        for i in 0..self.chr_idx_start.len() {
            if !self.overlaps(i, chrom_id, from, to) {
                continue;
            }
            if self.is_leaf != 0 {
                blocks.push(BbiBlockLocation {
                    offset: self.data_offset[i],
                    size  : self.data_size  [i],
                });
            } else {
                self.children[i].collect_blocks(chrom_id, from, to, blocks);
            }
        }
    }

}

/* -------------------------------------------------------------------------- */

/// Spatial index over data blocks, mapping genomic bounding boxes to block
/// locations.
#[derive(Clone, Debug, Default)]
pub struct RTree {
    pub block_size      : u32,
    pub n_items         : u64,
    pub chr_idx_start   : u32,
    pub base_start      : u32,
    pub chr_idx_end     : u32,
    pub base_end        : u32,
    pub idx_size        : u64,
    pub n_items_per_slot: u32,
    pub root            : RVertex,
}

impl RTree {

    pub fn read<E: ByteOrder, R: Read + Seek>(reader: &mut R, offset: u64, min_data_offset: u64) -> Result<RTree> {

        reader.seek(SeekFrom::Start(offset))?;

        let magic = reader.read_u32::<E>()?;

        if magic != IDX_MAGIC {
            return Err(BbiError::BadMagic { found: magic, expected: IDX_MAGIC });
        }

        let block_size       = reader.read_u32::<E>()?;
        let n_items          = reader.read_u64::<E>()?;
        let chr_idx_start    = reader.read_u32::<E>()?;
        let base_start       = reader.read_u32::<E>()?;
        let chr_idx_end      = reader.read_u32::<E>()?;
        let base_end         = reader.read_u32::<E>()?;
        let idx_size         = reader.read_u64::<E>()?;
        let n_items_per_slot = reader.read_u32::<E>()?;
        let _reserved        = reader.read_u32::<E>()?;

        let root = RVertex::read::<E, R>(reader, min_data_offset)?;

        Ok(RTree {
            block_size,
            n_items,
            chr_idx_start,
            base_start,
            chr_idx_end,
            base_end,
            idx_size,
            n_items_per_slot,
            root,
        })
    }

    /// Locations of all data blocks whose bounding box overlaps the query,
    /// in file order. Blocks may contain records outside the query range;
    /// the per-record overlap filter is authoritative.
    pub fn query_blocks(&self, chrom_id: u32, from: u32, to: u32) -> Vec<BbiBlockLocation> {
        let mut blocks = Vec::new();
        self.root.collect_blocks(chrom_id, from, to, &mut blocks);
        blocks
    }

}

/* -------------------------------------------------------------------------- */

/// The 24-byte header at the start of every inflated bigWig data block.
#[derive(Clone, Copy, Debug, Default)]
pub struct BbiDataHeader {
    pub chrom_id  : u32,
    pub start     : u32,
    pub end       : u32,
    pub step      : u32,
    pub span      : u32,
    pub kind      : u8,
    pub reserved  : u8,
    pub item_count: u16,
}

impl BbiDataHeader {

    pub fn read_buffer<E: ByteOrder>(buffer: &[u8]) -> BbiDataHeader {
        BbiDataHeader {
            chrom_id  : E::read_u32(&buffer[ 0.. 4]),
            start     : E::read_u32(&buffer[ 4.. 8]),
            end       : E::read_u32(&buffer[ 8..12]),
            step      : E::read_u32(&buffer[12..16]),
            span      : E::read_u32(&buffer[16..20]),
            kind      : buffer[20],
            reserved  : buffer[21],
            item_count: E::read_u16(&buffer[22..24]),
        }
    }

}

/* -------------------------------------------------------------------------- */

/// One full-resolution record, materialized to an explicit interval
/// regardless of the on-disk encoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BbiRawRecord {
    pub chrom_id: u32,
    pub from    : u32,
    pub to      : u32,
    pub value   : f32,
}

/// One record of a zoom level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BbiZoomRecord {
    pub chrom_id   : u32,
    pub from       : u32,
    pub to         : u32,
    pub valid      : u32,
    pub min        : f32,
    pub max        : f32,
    pub sum        : f32,
    pub sum_squares: f32,
}

/// One bigBed row: an interval plus the remaining tab-separated columns.
#[derive(Clone, Debug, PartialEq)]
pub struct BbiBedEntry {
    pub chrom_id: u32,
    pub from    : u32,
    pub to      : u32,
    pub rest    : String,
}

/* -------------------------------------------------------------------------- */

/// Decodes an inflated bigWig data block into explicit intervals. The
/// three encodings share the 24-byte header; variable-step records carry
/// their own start, fixed-step records are placed at `start + i*step`,
/// both cover `span` bases.
pub fn decode_wig_block<E: ByteOrder>(buffer: &[u8]) -> Result<Vec<BbiRawRecord>> {

    if buffer.len() < 24 {
        return Err(BbiError::Truncated);
    }
    let header = BbiDataHeader::read_buffer::<E>(buffer);

    let record_size = match header.kind {
        BBI_TYPE_BED_GRAPH => 12,
        BBI_TYPE_VARIABLE  =>  8,
        BBI_TYPE_FIXED     =>  4,
        _ => return Err(BbiError::Corrupt(format!("unknown data block type {}", header.kind))),
    };
    let n = header.item_count as usize;

    if buffer.len() < 24 + n * record_size {
        return Err(BbiError::Truncated);
    }

    let mut records = Vec::with_capacity(n);

    for i in 0..n {
        let p = 24 + i * record_size;

        let record = match header.kind {
            BBI_TYPE_BED_GRAPH => {
                BbiRawRecord {
                    chrom_id: header.chrom_id,
                    from    : E::read_u32(&buffer[p    ..p +  4]),
                    to      : E::read_u32(&buffer[p + 4..p +  8]),
                    value   : E::read_f32(&buffer[p + 8..p + 12]),
                }
            }
            BBI_TYPE_VARIABLE => {
                let from = E::read_u32(&buffer[p..p + 4]);
                BbiRawRecord {
                    chrom_id: header.chrom_id,
                    from,
                    to      : from + header.span,
                    value   : E::read_f32(&buffer[p + 4..p + 8]),
                }
            }
            _ => {
                let from = header.start + i as u32 * header.step;
                BbiRawRecord {
                    chrom_id: header.chrom_id,
                    from,
                    to      : from + header.span,
                    value   : E::read_f32(&buffer[p..p + 4]),
                }
            }
        };
        if record.to <= record.from {
            return Err(BbiError::Corrupt(String::from("data block record has non-positive length")));
        }
        records.push(record);
    }

    Ok(records)
}

/* -------------------------------------------------------------------------- */

/// Decodes an inflated zoom data block, a plain array of 32-byte summary
/// records.
pub fn decode_zoom_block<E: ByteOrder>(buffer: &[u8]) -> Result<Vec<BbiZoomRecord>> {

    if buffer.len() % 32 != 0 {
        return Err(BbiError::Corrupt(String::from("zoom data block has invalid length")));
    }

    let mut records = Vec::with_capacity(buffer.len() / 32);

    for chunk in buffer.chunks_exact(32) {
        records.push(BbiZoomRecord {
            chrom_id   : E::read_u32(&chunk[ 0.. 4]),
            from       : E::read_u32(&chunk[ 4.. 8]),
            to         : E::read_u32(&chunk[ 8..12]),
            valid      : E::read_u32(&chunk[12..16]),
            min        : E::read_f32(&chunk[16..20]),
            max        : E::read_f32(&chunk[20..24]),
            sum        : E::read_f32(&chunk[24..28]),
            sum_squares: E::read_f32(&chunk[28..32]),
        });
    }

    Ok(records)
}

/* -------------------------------------------------------------------------- */

/// Decodes an inflated bigBed data block, a sequence of interval records
/// each followed by a NUL-terminated rest-of-line string.
pub fn decode_bed_block<E: ByteOrder>(buffer: &[u8]) -> Result<Vec<BbiBedEntry>> {

    let mut entries = Vec::new();
    let mut p       = 0;

    while p < buffer.len() {
        if p + 12 > buffer.len() {
            return Err(BbiError::Truncated);
        }
        let chrom_id = E::read_u32(&buffer[p    ..p +  4]);
        let from     = E::read_u32(&buffer[p + 4..p +  8]);
        let to       = E::read_u32(&buffer[p + 8..p + 12]);

        if to <= from {
            return Err(BbiError::Corrupt(String::from("bed entry has non-positive length")));
        }

        let tail = &buffer[p + 12..];
        let nul  = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(BbiError::Truncated)?;

        entries.push(BbiBedEntry {
            chrom_id,
            from,
            to,
            rest: String::from_utf8_lossy(&tail[..nul]).into_owned(),
        });

        p += 12 + nul + 1;
    }

    Ok(entries)
}

/* -------------------------------------------------------------------------- */

/// Parsed state of one bbi container: the header, the eagerly-loaded
/// full-resolution index, and one lazily-populated index per zoom level.
#[derive(Clone, Debug, Default)]
pub struct BbiFile {
    pub header    : BbiHeader,
    pub index     : Option<RTree>,
    pub index_zoom: Vec<Option<RTree>>,
}

impl BbiFile {

    pub fn open<E: ByteOrder, R: Read + Seek>(reader: &mut R, expected_magic: u32) -> Result<BbiFile> {

        let header = BbiHeader::read::<E, R>(reader, expected_magic)?;

        let index = if header.index_offset != 0 {
            Some(RTree::read::<E, R>(reader, header.index_offset, header.data_offset)?)
        } else {
            None
        };

        let index_zoom = vec![None; header.zoom_headers.len()];

        Ok(BbiFile {
            header,
            index,
            index_zoom,
        })
    }

    /// Reads the chromosome B+-tree into a dense id-indexed table.
    pub fn read_genome<E: ByteOrder, R: Read + Seek>(&self, reader: &mut R) -> Result<Genome> {
        read_chrom_list::<E, R>(reader, self.header.ct_offset)
    }

    // Zoom indices are loaded on first use; remote files pay one range
    // request per level at most
    fn zoom_index<E: ByteOrder, R: Read + Seek>(&mut self, reader: &mut R, level: usize) -> Result<&RTree> {
        if self.index_zoom[level].is_none() {
            let zoom = self.header.zoom_headers[level];
            let tree = RTree::read::<E, R>(reader, zoom.index_offset, zoom.data_offset)?;
            self.index_zoom[level] = Some(tree);
        }
        Ok(self.index_zoom[level].as_ref().unwrap())
    }

    fn read_block<E: ByteOrder, R: Read + Seek>(&self, reader: &mut R, location: BbiBlockLocation) -> Result<Vec<u8>> {

        reader.seek(SeekFrom::Start(location.offset))?;

        let mut buffer = vec![0u8; location.size as usize];
        reader.read_exact(&mut buffer)?;

        if self.header.uncompress_buf_size != 0 {
            uncompress_slice(&buffer)
        } else {
            Ok(buffer)
        }
    }

    /// Candidate block locations for a query against the full-resolution
    /// index, in file order.
    pub fn query_blocks(&self, chrom_id: u32, from: u32, to: u32) -> Vec<BbiBlockLocation> {
        match &self.index {
            Some(index) => index.query_blocks(chrom_id, from, to),
            None        => Vec::new(),
        }
    }

    /// Reads, inflates, and decodes one full-resolution data block.
    pub fn read_block_records<E: ByteOrder, R: Read + Seek>(
        &self,
        reader  : &mut R,
        location: BbiBlockLocation,
    ) -> Result<Vec<BbiRawRecord>> {

        let buffer = self.read_block::<E, R>(reader, location)?;

        decode_wig_block::<E>(&buffer)
    }

    /// All full-resolution records overlapping the query, materialized and
    /// filtered, in file order.
    pub fn query_records<E: ByteOrder, R: Read + Seek>(
        &mut self,
        reader  : &mut R,
        chrom_id: u32,
        from    : u32,
        to      : u32,
    ) -> Result<Vec<BbiRawRecord>> {

        let mut records = Vec::new();

        for location in self.query_blocks(chrom_id, from, to) {
            for record in self.read_block_records::<E, R>(reader, location)? {
                if record.chrom_id == chrom_id && record.to > from && record.from < to {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// All zoom records of the given level overlapping the query.
    pub fn query_zoom_records<E: ByteOrder, R: Read + Seek>(
        &mut self,
        reader  : &mut R,
        level   : usize,
        chrom_id: u32,
        from    : u32,
        to      : u32,
    ) -> Result<Vec<BbiZoomRecord>> {

        let locations = self.zoom_index::<E, R>(reader, level)?.query_blocks(chrom_id, from, to);

        let mut records = Vec::new();

        for location in locations {
            let buffer = self.read_block::<E, R>(reader, location)?;

            for record in decode_zoom_block::<E>(&buffer)? {
                if record.chrom_id == chrom_id && record.to > from && record.from < to {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// All bigBed entries overlapping the query, in file order.
    pub fn query_entries<E: ByteOrder, R: Read + Seek>(
        &mut self,
        reader  : &mut R,
        chrom_id: u32,
        from    : u32,
        to      : u32,
    ) -> Result<Vec<BbiBedEntry>> {

        let mut entries = Vec::new();

        for location in self.query_blocks(chrom_id, from, to) {
            let buffer = self.read_block::<E, R>(reader, location)?;

            for entry in decode_bed_block::<E>(&buffer)? {
                if entry.chrom_id == chrom_id && entry.to > from && entry.from < to {
                    entries.push(entry);
                }
            }
        }

        Ok(entries)
    }

    /// The autoSql schema string of a bigBed file, if present.
    pub fn read_sql<E: ByteOrder, R: Read + Seek>(&self, reader: &mut R) -> Result<Option<String>> {

        if self.header.sql_offset == 0 {
            return Ok(None);
        }

        reader.seek(SeekFrom::Start(self.header.sql_offset))?;

        let mut bytes = Vec::new();
        let mut chunk = [0u8; 256];

        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                return Err(BbiError::Truncated);
            }
            if let Some(nul) = chunk[..n].iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);

            if bytes.len() > (1 << 20) {
                return Err(BbiError::Corrupt(String::from("sql schema is not NUL-terminated")));
            }
        }

        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
