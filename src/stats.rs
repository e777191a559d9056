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

use std::f64;
use std::str::FromStr;

use crate::bbi::{BbiHeaderZoom, BbiRawRecord, BbiZoomRecord};
use crate::error::BbiError;

/* -------------------------------------------------------------------------- */

/// Summary statistic computed per bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatType {
    Mean,
    Std,
    Max,
    Min,
    Coverage,
    Sum,
}

impl FromStr for StatType {

    type Err = BbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" | "average"      => Ok(StatType::Mean),
            "std"  | "stdev" | "dev" => Ok(StatType::Std),
            "max"                   => Ok(StatType::Max),
            "min"                   => Ok(StatType::Min),
            "cov"  | "coverage"     => Ok(StatType::Coverage),
            "sum"                   => Ok(StatType::Sum),
            _                       => Err(BbiError::BadStatType(s.to_string())),
        }
    }

}

/* -------------------------------------------------------------------------- */

/// Accumulates per-bin summary contributions in double precision. Single
/// precision loses too much across large chromosomes; the total-summary
/// record stores 64-bit values for the same reason.
#[derive(Clone, Copy, Debug)]
pub struct SummaryAccumulator {
    pub valid      : f64,
    pub min        : f64,
    pub max        : f64,
    pub sum        : f64,
    pub sum_squares: f64,
}

impl Default for SummaryAccumulator {
    fn default() -> Self {
        SummaryAccumulator {
            valid      : 0.0,
            min        : f64::INFINITY,
            max        : f64::NEG_INFINITY,
            sum        : 0.0,
            sum_squares: 0.0,
        }
    }
}

impl SummaryAccumulator {

    pub fn reset(&mut self) {
        *self = SummaryAccumulator::default();
    }

    /// A full-resolution record contributing `bases` bases of `value`.
    pub fn add_interval(&mut self, value: f64, bases: f64) {
        if value.is_nan() || bases <= 0.0 {
            return;
        }
        self.valid       += bases;
        self.min          = self.min.min(value);
        self.max          = self.max.max(value);
        self.sum         += value * bases;
        self.sum_squares += value * value * bases;
    }

    /// A zoom record contributing `overlap` of its bases; counts and sums
    /// scale with the covered fraction, min and max do not.
    pub fn add_zoom_record(&mut self, record: &BbiZoomRecord, overlap: u32) {
        if overlap == 0 || record.valid == 0 {
            return;
        }
        let frac = overlap as f64 / (record.to - record.from) as f64;

        self.valid       += record.valid as f64 * frac;
        self.min          = self.min.min(record.min as f64);
        self.max          = self.max.max(record.max as f64);
        self.sum         += record.sum as f64 * frac;
        self.sum_squares += record.sum_squares as f64 * frac;
    }

    /// Final per-bin value; NaN marks a bin without any valid bases.
    pub fn value(&self, stat_type: StatType, bin_width: f64) -> f64 {
        if self.valid <= 0.0 {
            return f64::NAN;
        }
        match stat_type {
            StatType::Mean     => self.sum / self.valid,
            StatType::Sum      => self.sum,
            StatType::Min      => self.min,
            StatType::Max      => self.max,
            StatType::Coverage => self.valid / bin_width,
            StatType::Std      => {
                if self.valid > 1.0 {
                    ((self.sum_squares - self.sum * self.sum / self.valid) / (self.valid - 1.0))
                        .max(0.0)
                        .sqrt()
                } else {
                    0.0
                }
            }
        }
    }

}

/* -------------------------------------------------------------------------- */

/// Boundaries of bin `i` when `[from, to)` is split into `n_bins` bins;
/// remainders are spread by the floor rule.
pub fn bin_range(from: u32, to: u32, n_bins: u32, i: u32) -> (u32, u32) {
    let l = (to - from) as u64;
    let n = n_bins as u64;

    let bin_from = from as u64 + (i as u64)       * l / n;
    let bin_to   = from as u64 + (i as u64 + 1)   * l / n;

    (bin_from as u32, bin_to as u32)
}

/* -------------------------------------------------------------------------- */

/// Picks the coarsest zoom level usable for `n_bins` bins over `[from, to)`:
/// the first level, scanning coarsest to finest, whose reduction level does
/// not exceed half a bin. Returns None when the full-resolution data must
/// be used.
pub fn select_zoom_level(zoom_headers: &[BbiHeaderZoom], from: u32, to: u32, n_bins: u32) -> Option<usize> {

    let target = (to - from) as u64 / (2 * n_bins as u64);

    let mut best: Option<usize> = None;

    for (i, zoom) in zoom_headers.iter().enumerate() {
        if zoom.index_offset == 0 {
            continue;
        }
        if zoom.reduction_level as u64 > target {
            continue;
        }
        match best {
            Some(j) if zoom_headers[j].reduction_level >= zoom.reduction_level => {}
            _ => best = Some(i),
        }
    }

    best
}

/* -------------------------------------------------------------------------- */

// Records are sorted by start position, so a single cursor over them is
// advanced together with the bins
fn overlap(rec_from: u32, rec_to: u32, bin_from: u32, bin_to: u32) -> u32 {
    let lo = rec_from.max(bin_from);
    let hi = rec_to  .min(bin_to);

    hi.saturating_sub(lo)
}

/// Per-bin statistics from full-resolution records (exact mode).
pub fn stats_from_records(
    records  : &[BbiRawRecord],
    from     : u32,
    to       : u32,
    n_bins   : u32,
    stat_type: StatType,
) -> Vec<f64> {

    let mut result      = Vec::with_capacity(n_bins as usize);
    let mut accumulator = SummaryAccumulator::default();
    let mut first       = 0;

    for i in 0..n_bins {
        let (bin_from, bin_to) = bin_range(from, to, n_bins, i);

        accumulator.reset();

        while first < records.len() && records[first].to <= bin_from {
            first += 1;
        }
        for record in &records[first..] {
            if record.from >= bin_to {
                break;
            }
            let o = overlap(record.from, record.to, bin_from, bin_to);

            accumulator.add_interval(record.value as f64, o as f64);
        }

        result.push(accumulator.value(stat_type, (bin_to - bin_from) as f64));
    }

    result
}

/// Per-bin statistics from zoom records (approximate mode).
pub fn stats_from_zoom_records(
    records  : &[BbiZoomRecord],
    from     : u32,
    to       : u32,
    n_bins   : u32,
    stat_type: StatType,
) -> Vec<f64> {

    let mut result      = Vec::with_capacity(n_bins as usize);
    let mut accumulator = SummaryAccumulator::default();
    let mut first       = 0;

    for i in 0..n_bins {
        let (bin_from, bin_to) = bin_range(from, to, n_bins, i);

        accumulator.reset();

        while first < records.len() && records[first].to <= bin_from {
            first += 1;
        }
        for record in &records[first..] {
            if record.from >= bin_to {
                break;
            }
            let o = overlap(record.from, record.to, bin_from, bin_to);

            accumulator.add_zoom_record(record, o);
        }

        result.push(accumulator.value(stat_type, (bin_to - bin_from) as f64));
    }

    result
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
