//! SRF6DCC chain-code compression for 2D polygons.
//!
//! A polygon given as absolute integer coordinates is turned into a start
//! point plus a sequence of relative moves. Moves are expressed against the
//! previous direction (so straight runs become runs of `0`) and long runs of
//! `0` are then shortened with two counting symbols.
//!
//! Directions are numbered clockwise:
//!
//! ```text
//! 5 6 7
//! 4 X 0
//! 3 2 1
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Runs of `0` of at least this length are shortened.
pub const LOW_SIMPLIFIER: usize = 3;
/// Run length represented by one [`HIGH_SYMBOL`].
pub const HIGH_SIMPLIFIER: usize = 15;
/// Symbol standing for [`LOW_SIMPLIFIER`] forward moves.
pub const LOW_SYMBOL: u8 = 6;
/// Symbol standing for [`HIGH_SIMPLIFIER`] forward moves.
pub const HIGH_SYMBOL: u8 = 7;
/// Backward move; always followed by the move taken after turning around.
pub const REVERSE_SYMBOL: u8 = 5;

/// Bits used per symbol when packing a chain code into text.
pub const CHAIN_CODE_BITS: u32 = 3;

/// Longest segment, in unit steps, that an attribute will encode.
pub const MAX_SEGMENT_STEPS: u128 = 1 << 32;

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// New absolute direction after moving by `(sign(dy), sign(dx))`.
const STATIC_DIRECTION: [[u8; 3]; 3] = [[5, 6, 7], [4, 9, 0], [3, 2, 1]];

/// Relative move symbol, indexed by previous direction, then `sign(dy) + 1`,
/// then `sign(dx) + 1`. `5` means the move points backwards; `9` is never
/// reached because a zero move produces no steps.
const KERNEL: [[[u8; 3]; 3]; 8] = [
    [[5, 4, 2], [5, 9, 0], [5, 3, 1]],
    [[5, 5, 4], [5, 9, 2], [3, 1, 0]],
    [[5, 5, 5], [3, 9, 4], [1, 0, 2]],
    [[3, 5, 5], [1, 9, 5], [0, 2, 4]],
    [[1, 3, 5], [0, 9, 5], [2, 4, 5]],
    [[0, 1, 3], [2, 9, 5], [4, 5, 5]],
    [[2, 0, 1], [4, 9, 3], [5, 5, 5]],
    [[4, 2, 0], [5, 9, 1], [5, 5, 3]],
];

/// The contour always starts heading down.
const INITIAL_DIRECTION: usize = 2;

/// Start point and simplified chain code of a polygon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCode {
    /// Column of the first vertex.
    pub xinit: i64,
    /// Row of the first vertex.
    pub yinit: i64,
    /// Direction symbols, with reversal markers.
    pub distances: Vec<u8>,
}

/// Encodes absolute coordinates `[x0, y0, x1, y1, ...]` as SRF6DCC.
///
/// A trailing unpaired value is ignored.
///
/// # Examples
///
/// ```
/// use openlabel::poly2d::compute_srf6dcc;
///
/// // Twenty steps straight down from the initial heading.
/// let code = compute_srf6dcc(&[0, 0, 0, 20]);
/// assert_eq!((code.xinit, code.yinit), (0, 0));
/// assert_eq!(code.distances, vec![7, 6, 0, 0]);
/// ```
#[must_use]
pub fn compute_srf6dcc(coords: &[i64]) -> ChainCode {
    let mut points = coords.chunks_exact(2).map(|p| (p[0], p[1]));
    let Some((xinit, yinit)) = points.next() else {
        return ChainCode::default();
    };

    let mut code = ChainCode {
        xinit,
        yinit,
        distances: Vec::new(),
    };
    let (mut x0, mut y0) = (xinit, yinit);
    let mut prev_dir = INITIAL_DIRECTION;

    for (x, y) in points {
        let (dx, dy) = delta((x0, y0), (x, y));
        let steps = dx.unsigned_abs().max(dy.unsigned_abs());
        let row = sign_index(dy);
        let col = sign_index(dx);

        for _ in 0..steps {
            let mv = KERNEL[prev_dir][row][col];
            if mv < REVERSE_SYMBOL {
                code.distances.push(mv);
            } else if mv == REVERSE_SYMBOL {
                code.distances.push(REVERSE_SYMBOL);
                prev_dir = (prev_dir + 4) % 8;
                code.distances.push(KERNEL[prev_dir][row][col]);
            } else {
                continue;
            }
            prev_dir = usize::from(STATIC_DIRECTION[row][col]);
        }

        x0 = x;
        y0 = y;
        simplify(
            &mut code.distances,
            LOW_SIMPLIFIER,
            HIGH_SIMPLIFIER,
            LOW_SYMBOL,
            HIGH_SYMBOL,
        );
    }
    code
}

/// Offset between two points. Computed in `i128` so that no pair of `i64`
/// coordinates overflows.
fn delta(from: (i64, i64), to: (i64, i64)) -> (i128, i128) {
    (
        i128::from(to.0) - i128::from(from.0),
        i128::from(to.1) - i128::from(from.1),
    )
}

/// Unit steps of the longest segment in `coords`.
#[must_use]
pub fn longest_segment(coords: &[i64]) -> u128 {
    let points: Vec<(i64, i64)> = coords.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    points
        .windows(2)
        .map(|w| {
            let (dx, dy) = delta(w[0], w[1]);
            dx.unsigned_abs().max(dy.unsigned_abs())
        })
        .max()
        .unwrap_or(0)
}

const fn sign_index(delta: i128) -> usize {
    match delta.signum() {
        -1 => 0,
        0 => 1,
        _ => 2,
    }
}

/// Replaces every run of at least `low` zeros with counting symbols.
///
/// A run of length `c` becomes `c / high` copies of `high_symbol`, then
/// `(c % high) / low` copies of `low_symbol`, then the remaining zeros.
pub fn simplify(codes: &mut Vec<u8>, low: usize, high: usize, low_symbol: u8, high_symbol: u8) {
    let mut out = Vec::with_capacity(codes.len());
    let mut run = 0usize;
    for &symbol in codes.iter() {
        if symbol == 0 {
            run += 1;
            continue;
        }
        flush_run(&mut out, run, low, high, low_symbol, high_symbol);
        run = 0;
        out.push(symbol);
    }
    flush_run(&mut out, run, low, high, low_symbol, high_symbol);
    *codes = out;
}

fn flush_run(out: &mut Vec<u8>, run: usize, low: usize, high: usize, low_symbol: u8, high_symbol: u8) {
    if run < low {
        out.extend(std::iter::repeat(0).take(run));
        return;
    }
    let rem = run % high;
    out.extend(std::iter::repeat(high_symbol).take(run / high));
    out.extend(std::iter::repeat(low_symbol).take(rem / low));
    out.extend(std::iter::repeat(0).take(rem % low));
}

/// Packs chain-code symbols into base64 text.
///
/// Every `6 / bits` symbols form one 6-bit value, most significant first.
/// The code is padded with zeros to a whole number of characters; the
/// returned count says how many padding symbols were added.
///
/// # Errors
///
/// Returns `ValidationError::InvalidAttribute` if `bits` does not divide 6 or
/// a symbol does not fit in `bits`.
pub fn pack_chain_code(codes: &[u8], bits: u32) -> Result<(String, usize), ValidationError> {
    let per_char = symbols_per_char(bits)?;
    let limit = 1u16 << bits;
    if let Some(bad) = codes.iter().find(|&&c| u16::from(c) >= limit) {
        return Err(ValidationError::InvalidAttribute {
            name: "chain_code".to_string(),
            reason: format!("symbol {bad} does not fit in {bits} bits"),
        });
    }

    let rest = (per_char - codes.len() % per_char) % per_char;
    let mut text = String::with_capacity((codes.len() + rest) / per_char);
    let padded = codes.iter().copied().chain(std::iter::repeat(0).take(rest));
    let mut value = 0usize;
    for (i, symbol) in padded.enumerate() {
        value = (value << bits) | usize::from(symbol);
        if i % per_char == per_char - 1 {
            text.push(char::from(BASE64_ALPHABET[value]));
            value = 0;
        }
    }
    Ok((text, rest))
}

/// Reverses [`pack_chain_code`].
///
/// # Errors
///
/// Returns `ValidationError::InvalidAttribute` for characters outside the
/// base64 alphabet or a padding count larger than the decoded code.
pub fn unpack_chain_code(text: &str, bits: u32, rest: usize) -> Result<Vec<u8>, ValidationError> {
    let per_char = symbols_per_char(bits)?;
    let mask = (1usize << bits) - 1;
    let mut codes = Vec::with_capacity(text.len() * per_char);
    for ch in text.bytes() {
        let value = BASE64_ALPHABET
            .iter()
            .position(|&b| b == ch)
            .ok_or_else(|| ValidationError::InvalidAttribute {
                name: "chain_code".to_string(),
                reason: format!("'{}' is not a base64 character", char::from(ch)),
            })?;
        for j in (0..per_char).rev() {
            #[allow(clippy::cast_possible_truncation)]
            codes.push(((value >> (j * bits as usize)) & mask) as u8);
        }
    }
    if rest > codes.len() {
        return Err(ValidationError::InvalidAttribute {
            name: "chain_code".to_string(),
            reason: format!("padding {rest} exceeds decoded length {}", codes.len()),
        });
    }
    codes.truncate(codes.len() - rest);
    Ok(codes)
}

fn symbols_per_char(bits: u32) -> Result<usize, ValidationError> {
    match bits {
        1 | 2 | 3 | 6 => Ok(6 / bits as usize),
        _ => Err(ValidationError::InvalidAttribute {
            name: "chain_code".to_string(),
            reason: format!("{bits} bits per symbol does not divide 6"),
        }),
    }
}
