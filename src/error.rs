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

use std::io;

use thiserror::Error;

/* -------------------------------------------------------------------------- */

/// Errors produced while opening or querying a bigWig/bigBed file.
#[derive(Debug, Error)]
pub enum BbiError {
    #[error("i/o error: {0}")]
    Io(io::Error),

    #[error("bad magic number {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },

    #[error("unsupported bbi file version {0}")]
    UnsupportedVersion(u16),

    #[error("unexpected end of file")]
    Truncated,

    #[error("corrupt file: {0}")]
    Corrupt(String),

    #[error("sequence `{0}` not found")]
    NoSuchChromosome(String),

    #[error("invalid interval [{from}, {to})")]
    InvalidInterval { from: u32, to: u32 },

    #[error("invalid summary statistic `{0}`")]
    BadStatType(String),

    #[error("operation requires a {expected} file")]
    WrongFileType { expected: &'static str },

    #[error("file handle is closed")]
    NotOpen,
}

/* -------------------------------------------------------------------------- */

// Truncation is classified once, here, so that byte-level readers can
// propagate plain io::Error with `?`
impl From<io::Error> for BbiError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            BbiError::Truncated
        } else {
            BbiError::Io(err)
        }
    }
}

/* -------------------------------------------------------------------------- */

pub type Result<T> = std::result::Result<T, BbiError>;

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
