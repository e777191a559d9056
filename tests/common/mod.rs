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

// Serializes minimal but structurally complete bigWig and bigBed images
// for the reader tests: fixed header, chromosome B+-tree, data blocks,
// R-tree index, zoom levels, and total summary.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::ops::Range;

use byteorder::{LittleEndian, WriteBytesExt};

use flate2::Compression;
use flate2::write::ZlibEncoder;

/* -------------------------------------------------------------------------- */

const BIGWIG_MAGIC : u32 = 0x888FFC26;
const BIGBED_MAGIC : u32 = 0x8789F2EB;
const CIRTREE_MAGIC: u32 = 0x78CA8C91;
const IDX_MAGIC    : u32 = 0x2468ACE0;

/* -------------------------------------------------------------------------- */

/// One full-resolution interval: (chrom id, from, to, value).
pub type Interval = (u32, u32, u32, f32);

/// One bigBed row: (chrom id, from, to, rest-of-line).
pub type BedRow = (u32, u32, u32, &'static str);

#[derive(Clone)]
pub struct BigWigFixture {
    pub chroms           : Vec<(&'static str, u32)>,
    pub intervals        : Vec<Interval>,
    pub zoom_levels      : Vec<u32>,
    pub compressed       : bool,
    pub records_per_block: usize,
    pub max_leaf_items   : usize,
}

impl Default for BigWigFixture {
    fn default() -> Self {
        BigWigFixture {
            chroms           : reference_chroms(),
            intervals        : reference_intervals(),
            zoom_levels      : vec![10],
            compressed       : true,
            records_per_block: 2,
            max_leaf_items   : 256,
        }
    }
}

#[derive(Clone)]
pub struct BigBedFixture {
    pub chroms        : Vec<(&'static str, u32)>,
    pub rows          : Vec<BedRow>,
    pub sql           : Option<&'static str>,
    pub compressed    : bool,
    pub rows_per_block: usize,
}

impl Default for BigBedFixture {
    fn default() -> Self {
        BigBedFixture {
            chroms        : reference_chroms(),
            rows          : reference_rows(),
            sql           : Some(REFERENCE_SQL),
            compressed    : true,
            rows_per_block: 2,
        }
    }
}

/* -------------------------------------------------------------------------- */

pub fn reference_chroms() -> Vec<(&'static str, u32)> {
    vec![("1", 195471971), ("10", 130694993)]
}

pub fn reference_intervals() -> Vec<Interval> {
    vec![
        (0,   0,   1, 0.1),
        (0,   1,   2, 0.2),
        (0,   2,   3, 0.3),
        (0, 100, 150, 1.4),
        (0, 150, 151, 1.5),
    ]
}

pub fn reference_rows() -> Vec<BedRow> {
    vec![
        (0,   0, 1000, "first\t0\t+"),
        (0, 100, 1100, "second\t100\t-"),
        (0, 100, 1500, "third\t300\t+"),
        (1,  50,  500, "other\t42\t-"),
    ]
}

pub const REFERENCE_SQL: &str = "table bed6\n\"Browser extensible data\"\n(\nstring chrom;\nuint chromStart;\nuint chromEnd;\nstring name;\nuint score;\nchar[1] strand;\n)\n";

/* -------------------------------------------------------------------------- */

fn compress(data: &[u8], compressed: bool) -> Vec<u8> {
    if compressed {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    } else {
        data.to_vec()
    }
}

/* -------------------------------------------------------------------------- */

// Bounding box plus location of one written data block
struct BlockEntry {
    chrom_id: u32,
    from    : u32,
    to      : u32,
    offset  : u64,
    size    : u64,
}

fn write_chrom_tree(buf: &mut Vec<u8>, chroms: &[(&'static str, u32)]) {
    let key_size = chroms.iter().map(|(name, _)| name.len()).max().unwrap_or(0) + 1;

    buf.write_u32::<LittleEndian>(CIRTREE_MAGIC).unwrap();
    buf.write_u32::<LittleEndian>(256).unwrap();
    buf.write_u32::<LittleEndian>(key_size as u32).unwrap();
    buf.write_u32::<LittleEndian>(8).unwrap();
    buf.write_u64::<LittleEndian>(chroms.len() as u64).unwrap();
    buf.write_u64::<LittleEndian>(0).unwrap();

    // Single leaf node with entries in key order
    let mut order: Vec<usize> = (0..chroms.len()).collect();
    order.sort_by_key(|&i| chroms[i].0);

    buf.write_u8(1).unwrap();
    buf.write_u8(0).unwrap();
    buf.write_u16::<LittleEndian>(chroms.len() as u16).unwrap();

    for i in order {
        let (name, length) = chroms[i];
        let mut key = vec![0u8; key_size];
        key[..name.len()].copy_from_slice(name.as_bytes());

        buf.write_all(&key).unwrap();
        buf.write_u32::<LittleEndian>(i as u32).unwrap();
        buf.write_u32::<LittleEndian>(length).unwrap();
    }
}

fn write_rtree(buf: &mut Vec<u8>, blocks: &[BlockEntry], max_leaf_items: usize) {
    let (chrom_from, base_from, chrom_to, base_to) = if blocks.is_empty() {
        (0, 0, 0, 0)
    } else {
        (
            blocks.first().unwrap().chrom_id,
            blocks.first().unwrap().from,
            blocks.last().unwrap().chrom_id,
            blocks.last().unwrap().to,
        )
    };

    buf.write_u32::<LittleEndian>(IDX_MAGIC).unwrap();
    buf.write_u32::<LittleEndian>(256).unwrap();
    buf.write_u64::<LittleEndian>(blocks.len() as u64).unwrap();
    buf.write_u32::<LittleEndian>(chrom_from).unwrap();
    buf.write_u32::<LittleEndian>(base_from).unwrap();
    buf.write_u32::<LittleEndian>(chrom_to).unwrap();
    buf.write_u32::<LittleEndian>(base_to).unwrap();
    buf.write_u64::<LittleEndian>(buf.len() as u64).unwrap();
    buf.write_u32::<LittleEndian>(1024).unwrap();
    buf.write_u32::<LittleEndian>(0).unwrap();

    if blocks.len() <= max_leaf_items {
        write_rtree_leaf(buf, blocks);
    } else {
        // Two levels: an internal root over leaf nodes of max_leaf_items
        let groups: Vec<&[BlockEntry]> = blocks.chunks(max_leaf_items).collect();

        let root_size    = 4 + groups.len() * 24;
        let mut child_at = buf.len() as u64 + root_size as u64;

        buf.write_u8(0).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_u16::<LittleEndian>(groups.len() as u16).unwrap();

        for group in &groups {
            buf.write_u32::<LittleEndian>(group.first().unwrap().chrom_id).unwrap();
            buf.write_u32::<LittleEndian>(group.first().unwrap().from).unwrap();
            buf.write_u32::<LittleEndian>(group.last().unwrap().chrom_id).unwrap();
            buf.write_u32::<LittleEndian>(group.last().unwrap().to).unwrap();
            buf.write_u64::<LittleEndian>(child_at).unwrap();

            child_at += 4 + group.len() as u64 * 32;
        }
        for group in &groups {
            write_rtree_leaf(buf, group);
        }
    }
}

fn write_rtree_leaf(buf: &mut Vec<u8>, blocks: &[BlockEntry]) {
    buf.write_u8(1).unwrap();
    buf.write_u8(0).unwrap();
    buf.write_u16::<LittleEndian>(blocks.len() as u16).unwrap();

    for block in blocks {
        buf.write_u32::<LittleEndian>(block.chrom_id).unwrap();
        buf.write_u32::<LittleEndian>(block.from).unwrap();
        buf.write_u32::<LittleEndian>(block.chrom_id).unwrap();
        buf.write_u32::<LittleEndian>(block.to).unwrap();
        buf.write_u64::<LittleEndian>(block.offset).unwrap();
        buf.write_u64::<LittleEndian>(block.size).unwrap();
    }
}

/* -------------------------------------------------------------------------- */

// Aggregates intervals into fixed-width summary bins of one zoom level
fn zoom_records(intervals: &[Interval], reduction: u32) -> Vec<(u32, u32, u32, u32, f32, f32, f32, f32)> {
    let mut bins: BTreeMap<(u32, u32), (u32, f64, f64, f64, f64)> = BTreeMap::new();

    for &(chrom_id, from, to, value) in intervals {
        for k in from / reduction..=(to - 1) / reduction {
            let bin_from = k * reduction;
            let bin_to   = bin_from + reduction;
            let overlap  = to.min(bin_to) - from.max(bin_from);

            let bin = bins.entry((chrom_id, k)).or_insert((0, f64::INFINITY, f64::NEG_INFINITY, 0.0, 0.0));

            bin.0 += overlap;
            bin.1  = bin.1.min(value as f64);
            bin.2  = bin.2.max(value as f64);
            bin.3 += value as f64 * overlap as f64;
            bin.4 += (value as f64) * (value as f64) * overlap as f64;
        }
    }

    bins.into_iter()
        .map(|((chrom_id, k), (valid, min, max, sum, sum_squares))| {
            (
                chrom_id,
                k * reduction,
                (k + 1) * reduction,
                valid,
                min as f32,
                max as f32,
                sum as f32,
                sum_squares as f32,
            )
        })
        .collect()
}

/* -------------------------------------------------------------------------- */

pub fn build_bigwig(fixture: &BigWigFixture) -> Vec<u8> {
    let mut buf = vec![0u8; 64 + fixture.zoom_levels.len() * 24];

    // Total summary
    let summary_offset = buf.len() as u64;
    {
        let mut n_bases = 0u64;
        let mut min_val = f64::INFINITY;
        let mut max_val = f64::NEG_INFINITY;
        let mut sum     = 0.0f64;
        let mut sum_sq  = 0.0f64;

        for &(_, from, to, value) in &fixture.intervals {
            let bases = (to - from) as f64;
            n_bases += (to - from) as u64;
            min_val  = min_val.min(value as f64);
            max_val  = max_val.max(value as f64);
            sum     += value as f64 * bases;
            sum_sq  += (value as f64) * (value as f64) * bases;
        }
        if fixture.intervals.is_empty() {
            min_val = 0.0;
            max_val = 0.0;
        }
        buf.write_u64::<LittleEndian>(n_bases).unwrap();
        buf.write_f64::<LittleEndian>(min_val).unwrap();
        buf.write_f64::<LittleEndian>(max_val).unwrap();
        buf.write_f64::<LittleEndian>(sum).unwrap();
        buf.write_f64::<LittleEndian>(sum_sq).unwrap();
    }

    // Chromosome B+-tree
    let ct_offset = buf.len() as u64;
    write_chrom_tree(&mut buf, &fixture.chroms);

    // Data section: block count, then bedGraph blocks split at chromosome
    // boundaries
    let data_offset = buf.len() as u64;

    let mut chunks: Vec<&[Interval]> = Vec::new();
    {
        let mut rest = &fixture.intervals[..];
        while !rest.is_empty() {
            let mut n = 1;
            while n < rest.len() && n < fixture.records_per_block && rest[n].0 == rest[0].0 {
                n += 1;
            }
            chunks.push(&rest[..n]);
            rest = &rest[n..];
        }
    }

    buf.write_u64::<LittleEndian>(chunks.len() as u64).unwrap();

    let mut blocks = Vec::new();

    for chunk in &chunks {
        let mut payload = Vec::new();

        payload.write_u32::<LittleEndian>(chunk[0].0).unwrap();
        payload.write_u32::<LittleEndian>(chunk.first().unwrap().1).unwrap();
        payload.write_u32::<LittleEndian>(chunk.last().unwrap().2).unwrap();
        payload.write_u32::<LittleEndian>(0).unwrap();
        payload.write_u32::<LittleEndian>(0).unwrap();
        payload.write_u8(1).unwrap();
        payload.write_u8(0).unwrap();
        payload.write_u16::<LittleEndian>(chunk.len() as u16).unwrap();

        for &(_, from, to, value) in *chunk {
            payload.write_u32::<LittleEndian>(from).unwrap();
            payload.write_u32::<LittleEndian>(to).unwrap();
            payload.write_f32::<LittleEndian>(value).unwrap();
        }

        let compressed = compress(&payload, fixture.compressed);

        blocks.push(BlockEntry {
            chrom_id: chunk[0].0,
            from    : chunk.first().unwrap().1,
            to      : chunk.last().unwrap().2,
            offset  : buf.len() as u64,
            size    : compressed.len() as u64,
        });
        buf.write_all(&compressed).unwrap();
    }

    // Full-resolution index
    let index_offset = buf.len() as u64;
    write_rtree(&mut buf, &blocks, fixture.max_leaf_items);

    // Zoom levels: one data block and one index each
    let mut zoom_offsets = Vec::new();

    for &reduction in &fixture.zoom_levels {
        let records = zoom_records(&fixture.intervals, reduction);

        let zoom_data_offset = buf.len() as u64;
        buf.write_u32::<LittleEndian>(1).unwrap();

        let mut payload = Vec::new();
        for &(chrom_id, from, to, valid, min, max, sum, sum_squares) in &records {
            payload.write_u32::<LittleEndian>(chrom_id).unwrap();
            payload.write_u32::<LittleEndian>(from).unwrap();
            payload.write_u32::<LittleEndian>(to).unwrap();
            payload.write_u32::<LittleEndian>(valid).unwrap();
            payload.write_f32::<LittleEndian>(min).unwrap();
            payload.write_f32::<LittleEndian>(max).unwrap();
            payload.write_f32::<LittleEndian>(sum).unwrap();
            payload.write_f32::<LittleEndian>(sum_squares).unwrap();
        }

        let compressed  = compress(&payload, fixture.compressed);
        let zoom_blocks = if records.is_empty() {
            Vec::new()
        } else {
            vec![BlockEntry {
                chrom_id: records.first().unwrap().0,
                from    : records.first().unwrap().1,
                to      : records.last().unwrap().2,
                offset  : buf.len() as u64,
                size    : compressed.len() as u64,
            }]
        };
        buf.write_all(&compressed).unwrap();

        let zoom_index_offset = buf.len() as u64;
        write_rtree(&mut buf, &zoom_blocks, 256);

        zoom_offsets.push((reduction, zoom_data_offset, zoom_index_offset));
    }

    // Patch the fixed header and the zoom table
    let mut cursor = Cursor::new(&mut buf);

    cursor.write_u32::<LittleEndian>(BIGWIG_MAGIC).unwrap();
    cursor.write_u16::<LittleEndian>(4).unwrap();
    cursor.write_u16::<LittleEndian>(zoom_offsets.len() as u16).unwrap();
    cursor.write_u64::<LittleEndian>(ct_offset).unwrap();
    cursor.write_u64::<LittleEndian>(data_offset).unwrap();
    cursor.write_u64::<LittleEndian>(index_offset).unwrap();
    cursor.write_u16::<LittleEndian>(0).unwrap();
    cursor.write_u16::<LittleEndian>(0).unwrap();
    cursor.write_u64::<LittleEndian>(0).unwrap();
    cursor.write_u64::<LittleEndian>(summary_offset).unwrap();
    cursor.write_u32::<LittleEndian>(if fixture.compressed { 32768 } else { 0 }).unwrap();
    cursor.write_u64::<LittleEndian>(0).unwrap();

    for (reduction, zoom_data_offset, zoom_index_offset) in zoom_offsets {
        cursor.write_u32::<LittleEndian>(reduction).unwrap();
        cursor.write_u32::<LittleEndian>(0).unwrap();
        cursor.write_u64::<LittleEndian>(zoom_data_offset).unwrap();
        cursor.write_u64::<LittleEndian>(zoom_index_offset).unwrap();
    }

    buf
}

/* -------------------------------------------------------------------------- */

pub fn build_bigbed(fixture: &BigBedFixture) -> Vec<u8> {
    let mut buf = vec![0u8; 64];

    // Total summary over row coverage
    let summary_offset = buf.len() as u64;
    {
        let n_bases: u64 = fixture.rows.iter().map(|&(_, from, to, _)| (to - from) as u64).sum();

        buf.write_u64::<LittleEndian>(n_bases).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
    }

    let ct_offset = buf.len() as u64;
    write_chrom_tree(&mut buf, &fixture.chroms);

    let sql_offset = if let Some(sql) = fixture.sql {
        let offset = buf.len() as u64;
        buf.write_all(sql.as_bytes()).unwrap();
        buf.write_u8(0).unwrap();
        offset
    } else {
        0
    };

    let data_offset = buf.len() as u64;

    let mut chunks: Vec<&[BedRow]> = Vec::new();
    {
        let mut rest = &fixture.rows[..];
        while !rest.is_empty() {
            let mut n = 1;
            while n < rest.len() && n < fixture.rows_per_block && rest[n].0 == rest[0].0 {
                n += 1;
            }
            chunks.push(&rest[..n]);
            rest = &rest[n..];
        }
    }

    buf.write_u64::<LittleEndian>(chunks.len() as u64).unwrap();

    let mut blocks = Vec::new();

    for chunk in &chunks {
        let mut payload = Vec::new();

        for &(chrom_id, from, to, rest) in *chunk {
            payload.write_u32::<LittleEndian>(chrom_id).unwrap();
            payload.write_u32::<LittleEndian>(from).unwrap();
            payload.write_u32::<LittleEndian>(to).unwrap();
            payload.write_all(rest.as_bytes()).unwrap();
            payload.write_u8(0).unwrap();
        }

        let compressed = compress(&payload, fixture.compressed);
        let max_to     = chunk.iter().map(|&(_, _, to, _)| to).max().unwrap();

        blocks.push(BlockEntry {
            chrom_id: chunk[0].0,
            from    : chunk.first().unwrap().1,
            to      : max_to,
            offset  : buf.len() as u64,
            size    : compressed.len() as u64,
        });
        buf.write_all(&compressed).unwrap();
    }

    let index_offset = buf.len() as u64;
    write_rtree(&mut buf, &blocks, 256);

    let mut cursor = Cursor::new(&mut buf);

    cursor.write_u32::<LittleEndian>(BIGBED_MAGIC).unwrap();
    cursor.write_u16::<LittleEndian>(4).unwrap();
    cursor.write_u16::<LittleEndian>(0).unwrap();
    cursor.write_u64::<LittleEndian>(ct_offset).unwrap();
    cursor.write_u64::<LittleEndian>(data_offset).unwrap();
    cursor.write_u64::<LittleEndian>(index_offset).unwrap();
    cursor.write_u16::<LittleEndian>(3).unwrap();
    cursor.write_u16::<LittleEndian>(3).unwrap();
    cursor.write_u64::<LittleEndian>(sql_offset).unwrap();
    cursor.write_u64::<LittleEndian>(summary_offset).unwrap();
    cursor.write_u32::<LittleEndian>(if fixture.compressed { 32768 } else { 0 }).unwrap();
    cursor.write_u64::<LittleEndian>(0).unwrap();

    buf
}

/* -------------------------------------------------------------------------- */

/// Wraps an in-memory image and fails any read that touches a forbidden
/// byte range, to simulate transport failures after a successful open.
pub struct FaultyReader {
    inner    : Cursor<Vec<u8>>,
    forbidden: Range<u64>,
}

impl FaultyReader {

    pub fn new(data: Vec<u8>, forbidden: Range<u64>) -> Self {
        FaultyReader {
            inner: Cursor::new(data),
            forbidden,
        }
    }

}

impl Read for FaultyReader {

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let position = self.inner.position();
        let end      = position + buf.len() as u64;

        if position < self.forbidden.end && end > self.forbidden.start {
            return Err(io::Error::new(io::ErrorKind::Other, "injected transport error"));
        }
        self.inner.read(buf)
    }

}

impl Seek for FaultyReader {

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

}
