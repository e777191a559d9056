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

use byteorder::{LittleEndian, ReadBytesExt};

use crate::bbi::{BbiFile, BbiHeader, BbiTotalSummary, BIGBED_MAGIC};
use crate::error::{BbiError, Result};
use crate::genome::Genome;
use crate::netfile::{NetFile, TransportCallback, DEFAULT_BUFFER_SIZE};

/* -------------------------------------------------------------------------- */

pub fn is_bigbed_file(filename: &str) -> Result<bool> {

    let mut file = NetFile::open(filename)?;

    let magic = file.read_u32::<LittleEndian>()?;

    Ok(BIGBED_MAGIC == magic)

}

/* -------------------------------------------------------------------------- */

pub enum OptionBigBed {
    BufferSize(usize),
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct BigBedParameters {
    pub buf_size: usize,
}

/* -------------------------------------------------------------------------- */

impl BigBedParameters {
    pub fn insert_option(&mut self, option: OptionBigBed) {
        match option {
            OptionBigBed::BufferSize(x) => self.buf_size = x,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl Default for BigBedParameters {
    fn default() -> Self {
        BigBedParameters {
            buf_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/* -------------------------------------------------------------------------- */

/// One bigBed row. The rest-of-line string is omitted when a query asks
/// for coordinates only.
#[derive(Clone, Debug, PartialEq)]
pub struct BigBedEntry {
    pub from: u32,
    pub to  : u32,
    pub rest: Option<String>,
}

impl fmt::Display for BigBedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rest {
            Some(rest) => write!(f, "(from={}, to={}, rest={})", self.from, self.to, rest),
            None       => write!(f, "(from={}, to={})", self.from, self.to),
        }
    }
}

/* -------------------------------------------------------------------------- */

pub enum BigBedFile {}

/* -------------------------------------------------------------------------- */

impl BigBedFile {

    pub fn new_reader(filename: &str) -> Result<BigBedReader<NetFile>> {

        let file = NetFile::open(filename)?;

        BigBedReader::new(file)

    }

    pub fn new_reader_with(
        filename: &str,
        options : Vec<OptionBigBed>,
        callback: Option<TransportCallback>,
    ) -> Result<BigBedReader<NetFile>> {

        let mut parameters = BigBedParameters::default();

        for option in options {
            parameters.insert_option(option);
        }

        let file = NetFile::open_with(filename, parameters.buf_size, callback)?;

        BigBedReader::new(file)

    }

}

/* -------------------------------------------------------------------------- */

#[derive(Debug)]
pub struct BigBedReader<R: Read + Seek> {
    reader  : R,
    bbf     : BbiFile,
    genome  : Genome,
    closed  : bool,
    poisoned: bool,
}

/* -------------------------------------------------------------------------- */

impl<R: Read + Seek> BigBedReader<R> {

    pub fn new(mut reader: R) -> Result<Self> {

        let bbf    = BbiFile::open::<LittleEndian, R>(&mut reader, BIGBED_MAGIC)?;
        let genome = bbf.read_genome::<LittleEndian, R>(&mut reader)?;

        Ok(BigBedReader {
            reader,
            bbf,
            genome,
            closed  : false,
            poisoned: false,
        })
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn header(&self) -> &BbiHeader {
        &self.bbf.header
    }

    pub fn summary(&self) -> Option<&BbiTotalSummary> {
        self.bbf.header.summary.as_ref()
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

    /// All rows overlapping `[from, to)` on `seqname`, in genomic order.
    /// With `with_string` the remaining BED columns are attached to each
    /// entry.
    pub fn entries(&mut self, seqname: &str, from: u32, to: u32, with_string: bool) -> Result<Vec<BigBedEntry>> {

        self.check_state()?;

        let chrom_id = self.validate_query(seqname, from, to)?;

        let result = self.bbf.query_entries::<LittleEndian, R>(&mut self.reader, chrom_id, from, to);

        let entries = match result {
            Ok(entries) => entries,
            Err(err)    => {
                if matches!(err, BbiError::Io(_) | BbiError::Truncated) {
                    self.poisoned = true;
                }
                return Err(err);
            }
        };

        Ok(entries
            .into_iter()
            .map(|e| BigBedEntry {
                from: e.from,
                to  : e.to,
                rest: if with_string { Some(e.rest) } else { None },
            })
            .collect())
    }

    /// The autoSql schema describing the BED columns, if the file carries
    /// one.
    pub fn sql(&mut self) -> Result<Option<String>> {

        self.check_state()?;

        let result = self.bbf.read_sql::<LittleEndian, R>(&mut self.reader);

        if matches!(result, Err(BbiError::Io(_)) | Err(BbiError::Truncated)) {
            self.poisoned = true;
        }

        result
    }

}

/* Utility functions
 * -------------------------------------------------------------------------- */

pub fn bigbed_read_genome<R: Read + Seek>(file: R) -> Result<Genome> {
    let reader = BigBedReader::new(file)?;
    Ok(reader.genome().clone())
}

pub fn bigbed_import_genome(filename: &str) -> Result<Genome> {
    let file = NetFile::open(filename)?;
    bigbed_read_genome(file)
}
