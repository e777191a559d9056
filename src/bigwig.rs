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

use std::fmt;
use std::io;
use std::io::{Read, Seek};

use async_stream::stream;
use futures::executor::block_on_stream;
use futures::executor::BlockingStream;
use futures_core::stream::Stream;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::bbi::{BbiFile, BbiHeader, BbiTotalSummary, BIGWIG_MAGIC};
use crate::error::{BbiError, Result};
use crate::genome::Genome;
use crate::netfile::{NetFile, TransportCallback, DEFAULT_BUFFER_SIZE};
use crate::stats::{StatType, select_zoom_level, stats_from_records, stats_from_zoom_records};

/* -------------------------------------------------------------------------- */

pub fn is_bigwig_file(filename: &str) -> Result<bool> {

    let mut file = NetFile::open(filename)?;

    let magic = file.read_u32::<LittleEndian>()?;

    Ok(BIGWIG_MAGIC == magic)

}

/* -------------------------------------------------------------------------- */

pub enum OptionBigWig {
    BufferSize(usize),
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct BigWigParameters {
    pub buf_size: usize,
}

/* -------------------------------------------------------------------------- */

impl BigWigParameters {
    pub fn insert_option(&mut self, option: OptionBigWig) {
        match option {
            OptionBigWig::BufferSize(x) => self.buf_size = x,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl Default for BigWigParameters {
    fn default() -> Self {
        BigWigParameters {
            buf_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/* -------------------------------------------------------------------------- */

/// One interval with its signal value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BigWigInterval {
    pub from : u32,
    pub to   : u32,
    pub value: f32,
}

impl fmt::Display for BigWigInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(from={}, to={}, value={})", self.from, self.to, self.value)
    }
}

/* -------------------------------------------------------------------------- */

/// One interval produced by a regex query, carrying the sequence name it
/// was found on.
#[derive(Clone, Debug)]
pub struct BigWigQueryRecord {
    pub seqname: String,
    pub from   : u32,
    pub to     : u32,
    pub value  : f32,
}

impl fmt::Display for BigWigQueryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(seqname={}, from={}, to={}, value={})",
            self.seqname,
            self.from,
            self.to,
            self.value)
    }
}

/* -------------------------------------------------------------------------- */

pub enum BigWigFile {}

/* -------------------------------------------------------------------------- */

impl BigWigFile {

    pub fn new_reader(filename: &str) -> Result<BigWigReader<NetFile>> {

        let file = NetFile::open(filename)?;

        BigWigReader::new(file)

    }

    pub fn new_reader_with(
        filename      : &str,
        options       : Vec<OptionBigWig>,
        callback      : Option<TransportCallback>,
    ) -> Result<BigWigReader<NetFile>> {

        let mut parameters = BigWigParameters::default();

        for option in options {
            parameters.insert_option(option);
        }

        let file = NetFile::open_with(filename, parameters.buf_size, callback)?;

        BigWigReader::new(file)

    }

}

/* -------------------------------------------------------------------------- */

#[derive(Debug)]
pub struct BigWigReader<R: Read + Seek> {
    reader  : R,
    bwf     : BbiFile,
    genome  : Genome,
    closed  : bool,
    poisoned: bool,
}

/* -------------------------------------------------------------------------- */

// An i/o error leaves the byte source in an undefined state; the handle
// refuses further transport afterwards
fn poison_on_io<T>(poisoned: &mut bool, result: Result<T>) -> Result<T> {
    if matches!(result, Err(BbiError::Io(_)) | Err(BbiError::Truncated)) {
        *poisoned = true;
    }
    result
}

/* -------------------------------------------------------------------------- */

impl<R: Read + Seek> BigWigReader<R> {

    pub fn new(mut reader: R) -> Result<Self> {

        let bwf    = BbiFile::open::<LittleEndian, R>(&mut reader, BIGWIG_MAGIC)?;
        let genome = bwf.read_genome::<LittleEndian, R>(&mut reader)?;

        Ok(BigWigReader {
            reader,
            bwf,
            genome,
            closed  : false,
            poisoned: false,
        })
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn header(&self) -> &BbiHeader {
        &self.bwf.header
    }

    /// Total summary over the whole file, absent when the file carries
    /// none.
    pub fn summary(&self) -> Option<&BbiTotalSummary> {
        self.bwf.header.summary.as_ref()
    }

    /// Marks the handle closed. Never fails; subsequent queries return
    /// `NotOpen`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    fn check_state(&self) -> Result<()> {
        if self.closed {
            return Err(BbiError::NotOpen);
        }
        if self.poisoned {
            return Err(BbiError::Io(io::Error::new(io::ErrorKind::Other, "file handle is poisoned by a previous i/o error")));
        }
        Ok(())
    }

    fn validate_query(&self, seqname: &str, from: u32, to: u32) -> Result<u32> {
        let idx = self.genome.get_idx(seqname).ok_or_else(
            || BbiError::NoSuchChromosome(seqname.to_string())
        )?;

        if from >= to || to as usize > self.genome.lengths[idx] {
            return Err(BbiError::InvalidInterval { from, to });
        }
        Ok(idx as u32)
    }

    /// All records overlapping `[from, to)` on `seqname`, in genomic
    /// order. Records are not clipped to the query range.
    pub fn intervals(&mut self, seqname: &str, from: u32, to: u32) -> Result<Vec<BigWigInterval>> {

        self.check_state()?;

        let chrom_id = self.validate_query(seqname, from, to)?;

        let result = self.bwf.query_records::<LittleEndian, R>(&mut self.reader, chrom_id, from, to);
        let records = poison_on_io(&mut self.poisoned, result)?;

        Ok(records
            .into_iter()
            .map(|r| BigWigInterval { from: r.from, to: r.to, value: r.value })
            .collect())
    }

    /// The signal value at every base of `[from, to)`; bases covered by no
    /// record are NaN.
    pub fn values(&mut self, seqname: &str, from: u32, to: u32) -> Result<Vec<f64>> {

        self.check_state()?;

        let chrom_id = self.validate_query(seqname, from, to)?;

        let result = self.bwf.query_records::<LittleEndian, R>(&mut self.reader, chrom_id, from, to);
        let records = poison_on_io(&mut self.poisoned, result)?;

        let mut values = vec![f64::NAN; (to - from) as usize];

        for record in records {
            let lo = record.from.max(from);
            let hi = record.to  .min(to);

            for p in lo..hi {
                values[(p - from) as usize] = record.value as f64;
            }
        }

        Ok(values)
    }

    /// Per-bin summary statistics over `[from, to)` split into `n_bins`
    /// bins. The default mode descends to the coarsest zoom level that
    /// still resolves half a bin; `exact` forces full-resolution data.
    pub fn stats(
        &mut self,
        seqname  : &str,
        from     : u32,
        to       : u32,
        stat_type: StatType,
        n_bins   : u32,
        exact    : bool,
    ) -> Result<Vec<f64>> {

        self.check_state()?;

        let chrom_id = self.validate_query(seqname, from, to)?;
        let n_bins   = n_bins.max(1);

        let zoom_level = if exact {
            None
        } else {
            select_zoom_level(&self.bwf.header.zoom_headers, from, to, n_bins)
        };

        match zoom_level {
            Some(level) => {
                let result = self.bwf.query_zoom_records::<LittleEndian, R>(&mut self.reader, level, chrom_id, from, to);
                let records = poison_on_io(&mut self.poisoned, result)?;

                Ok(stats_from_zoom_records(&records, from, to, n_bins, stat_type))
            }
            None => {
                let result = self.bwf.query_records::<LittleEndian, R>(&mut self.reader, chrom_id, from, to);
                let records = poison_on_io(&mut self.poisoned, result)?;

                Ok(stats_from_records(&records, from, to, n_bins, stat_type))
            }
        }
    }

    /// Streams raw intervals from every sequence whose name matches the
    /// anchored regular expression, lazily one data block at a time.
    /// Query bounds are clamped to each sequence length.
    pub fn query_stream<'a>(
        &'a mut self,
        seq_regex: &'a str,
        from     : u32,
        to       : u32,
    ) -> impl Stream<Item = Result<BigWigQueryRecord>> + 'a {

        stream! {

            let re = regex::Regex::new(&format!("^{}$", seq_regex)).unwrap();

            for idx in 0..self.genome.len() {
                if !re.is_match(&self.genome.seqnames[idx]) {
                    continue;
                }
                let seqname = self.genome.seqnames[idx].clone();
                let length  = self.genome.lengths [idx] as u32;

                let from = from.min(length);
                let to   = to  .min(length);

                if from >= to {
                    continue;
                }

                for location in self.bwf.query_blocks(idx as u32, from, to) {

                    let block = self.bwf.read_block_records::<LittleEndian, R>(&mut self.reader, location);

                    match block {
                        Ok(records) => {
                            for r in records {
                                if r.chrom_id == idx as u32 && r.to > from && r.from < to {
                                    yield Ok(BigWigQueryRecord {
                                        seqname: seqname.clone(),
                                        from   : r.from,
                                        to     : r.to,
                                        value  : r.value,
                                    });
                                }
                            }
                        }
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }
        }
    }

    pub fn query<'a>(
        &'a mut self,
        seq_regex: &'a str,
        from     : u32,
        to       : u32,
    ) -> BlockingStream<impl Stream<Item = Result<BigWigQueryRecord>> + 'a> {

        let s = Box::pin(self.query_stream(seq_regex, from, to));

        block_on_stream(s)
    }

}

/* Utility functions
 * -------------------------------------------------------------------------- */

pub fn bigwig_read_genome<R: Read + Seek>(file: R) -> Result<Genome> {
    let reader = BigWigReader::new(file)?;
    Ok(reader.genome().clone())
}

pub fn bigwig_import_genome(filename: &str) -> Result<Genome> {
    let file = NetFile::open(filename)?;
    bigwig_read_genome(file)
}
