// SPDX-License-Identifier: GPL-3.0-only

//! EAN-13 and UPC-A reader
//!
//! Scans a handful of rows (then columns) of a luma plane, binarises each
//! line around its mid-grey, and matches the resulting run lengths against
//! the EAN-13 layout: start guard, six left digits, centre guard, six right
//! digits, end guard. That is 59 runs over 95 modules.
//!
//! The first digit is not drawn; it is implied by the L/G parity of the six
//! left digits. A leading zero makes the symbol a UPC-A, which is reported
//! with its 12 digits.

use super::DecodedResult;
use super::luma::LumaPlane;
use tracing::trace;

/// Runs in one symbol
const SYMBOL_RUNS: usize = 59;
/// Modules in one symbol
const SYMBOL_MODULES: f32 = 95.0;
/// Light modules required before the start guard
const QUIET_MODULES: f32 = 3.0;
/// Summed deviation (in modules) tolerated when matching one digit
const MAX_DIGIT_ERROR: f32 = 1.5;
/// Lines tried in each direction
const SCAN_LINES: usize = 15;

/// Space/bar/space/bar widths of the L code per digit; R codes use the same
/// widths starting with a bar, G codes are the L widths reversed
const L_WIDTHS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// G-code positions of the left half (bit 5 = first left digit), per
/// implied leading digit
const FIRST_DIGIT_PARITY: [u8; 10] = [
    0b000000, 0b001011, 0b001101, 0b001110, 0b010011, 0b011001, 0b011100, 0b010101, 0b010110,
    0b011010,
];

/// Look for an EAN-13 or UPC-A symbol anywhere in the plane
pub fn read_ean(plane: &LumaPlane) -> Option<DecodedResult> {
    if plane.width == 0 || plane.height == 0 {
        return None;
    }

    for y in line_order(plane.height) {
        if let Some(result) = read_line(plane.row(y)) {
            trace!(row = y, "EAN symbol found on row");
            return Some(result);
        }
    }
    for x in line_order(plane.width) {
        if let Some(result) = read_line(&plane.column(x)) {
            trace!(column = x, "EAN symbol found on column");
            return Some(result);
        }
    }
    None
}

/// Evenly spaced line indices, centre first
fn line_order(len: usize) -> Vec<usize> {
    let count = SCAN_LINES.min(len);
    let mut lines: Vec<usize> = (0..count).map(|i| (2 * i + 1) * len / (2 * count)).collect();
    let centre = len / 2;
    lines.sort_by_key(|&i| i.abs_diff(centre));
    lines
}

/// Try one line left-to-right, then right-to-left
pub(crate) fn read_line(line: &[u8]) -> Option<DecodedResult> {
    if let Some(digits) = decode_runs(&run_lengths(line)?) {
        return Some(to_result(&digits));
    }
    let reversed: Vec<u8> = line.iter().rev().copied().collect();
    decode_runs(&run_lengths(&reversed)?).map(|digits| to_result(&digits))
}

/// Alternating run lengths, light first
///
/// A line that starts dark gets a zero-length light run in front so that
/// bars always sit at odd indices.
fn run_lengths(line: &[u8]) -> Option<Vec<u32>> {
    let (min, max) = line
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    // Not enough contrast to hold bars
    if max.saturating_sub(min) < 32 {
        return None;
    }
    let threshold = ((min as u16 + max as u16) / 2) as u8;

    let mut runs = Vec::new();
    let mut dark = false;
    let mut length = 0u32;
    for &value in line {
        let is_dark = value < threshold;
        if is_dark == dark {
            length += 1;
        } else {
            runs.push(length);
            dark = is_dark;
            length = 1;
        }
    }
    runs.push(length);
    Some(runs)
}

/// Find a symbol starting at any bar in the run list
fn decode_runs(runs: &[u32]) -> Option<[u8; 13]> {
    (1..runs.len())
        .step_by(2)
        .take_while(|&start| start + SYMBOL_RUNS <= runs.len())
        .find_map(|start| decode_symbol(&runs[start..start + SYMBOL_RUNS], runs[start - 1]))
}

fn decode_symbol(runs: &[u32], quiet: u32) -> Option<[u8; 13]> {
    let total: u32 = runs.iter().sum();
    let module = total as f32 / SYMBOL_MODULES;
    if (quiet as f32) < module * QUIET_MODULES {
        return None;
    }
    if !is_guard(&runs[0..3], module)
        || !is_guard(&runs[27..32], module)
        || !is_guard(&runs[56..59], module)
    {
        return None;
    }

    let mut digits = [0u8; 13];
    let mut parity = 0u8;
    for i in 0..6 {
        let (digit, is_g) = match_left(&runs[3 + 4 * i..7 + 4 * i], module)?;
        digits[i + 1] = digit;
        parity = (parity << 1) | u8::from(is_g);
    }
    for i in 0..6 {
        digits[i + 7] = match_digit(&runs[32 + 4 * i..36 + 4 * i], module, false)?.0;
    }
    digits[0] = FIRST_DIGIT_PARITY.iter().position(|&p| p == parity)? as u8;

    is_valid_checksum(&digits).then_some(digits)
}

/// Every guard bar and space is one module wide
fn is_guard(runs: &[u32], module: f32) -> bool {
    runs.iter().all(|&r| {
        let modules = r as f32 / module;
        (0.5..=1.6).contains(&modules)
    })
}

/// Best L or G match; returns the digit and whether it was a G code
fn match_left(runs: &[u32], module: f32) -> Option<(u8, bool)> {
    let l = match_digit(runs, module, false);
    let g = match_digit(runs, module, true);
    match (l, g) {
        (Some((ld, le)), Some((gd, ge))) => Some(if ge < le { (gd, true) } else { (ld, false) }),
        (Some((ld, _)), None) => Some((ld, false)),
        (None, Some((gd, _))) => Some((gd, true)),
        (None, None) => None,
    }
}

/// Closest digit for four runs, with its matching error
fn match_digit(runs: &[u32], module: f32, reversed: bool) -> Option<(u8, f32)> {
    let sum: u32 = runs.iter().sum();
    // A digit always spans seven modules
    if !(5.0..=9.0).contains(&(sum as f32 / module)) {
        return None;
    }
    let unit = sum as f32 / 7.0;

    let (digit, error) = L_WIDTHS
        .iter()
        .enumerate()
        .map(|(digit, widths)| {
            let error: f32 = (0..4)
                .map(|k| {
                    let expected = if reversed { widths[3 - k] } else { widths[k] };
                    (runs[k] as f32 / unit - expected as f32).abs()
                })
                .sum();
            (digit as u8, error)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    (error <= MAX_DIGIT_ERROR).then_some((digit, error))
}

/// GTIN-13 mod-10 check digit
pub fn is_valid_checksum(digits: &[u8; 13]) -> bool {
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, &d)| d as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    (10 - sum % 10) % 10 == digits[12] as u32
}

fn to_result(digits: &[u8; 13]) -> DecodedResult {
    let text: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
    match text.strip_prefix('0') {
        Some(upc) => DecodedResult::new(upc, "UPC-A"),
        None => DecodedResult::new(text, "EAN-13"),
    }
}
