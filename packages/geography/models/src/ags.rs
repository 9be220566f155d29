//! Official municipality key (AGS) normalization.
//!
//! Boundary files, commuting statistics and census tables spell the same
//! administrative unit in different ways: 8-digit municipality keys next to
//! 5-digit district keys, numbers that lost their leading zero on a trip
//! through a spreadsheet, `9161000.0` float serializations and German
//! thousands grouping. [`AgsNormalizer`] folds all of these into one
//! fixed-width join key.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Width of a district-level (Kreis) AGS: state, government region, district.
pub const KREIS_WIDTH: usize = 5;

/// Digit widths of the AGS hierarchy, coarsest first: Land, Regierungsbezirk,
/// Kreis, Gemeinde, Gemeindeverband, Regionalschlüssel.
pub const LEVEL_WIDTHS: &[usize] = &[2, 3, 5, 8, 9, 12];

/// `9161000.0`, `9161000,00`
static FLOAT_ARTIFACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)[.,]0+$").expect("valid regex"));

/// `9.161.000` or `9,161,000`, never mixed.
static GROUPED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{1,3}(\.[0-9]{3})+$|^[0-9]{1,3}(,[0-9]{3})+$").expect("valid regex")
});

/// `9.161e6`, `9.161E+06`
static SCIENTIFIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?[eE]\+?[0-9]+$").expect("valid regex"));

/// Why a raw identifier could not be turned into a canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Nothing left after trimming.
    #[error("identifier is empty")]
    Empty,

    /// Characters other than digits survived cleaning.
    #[error("identifier '{raw}' is not numeric after cleaning")]
    NonNumeric {
        /// The identifier as it appeared in the source.
        raw: String,
    },
}

/// Normalizes raw administrative identifiers to a fixed-width AGS prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgsNormalizer {
    width: usize,
    levels: Vec<usize>,
}

impl Default for AgsNormalizer {
    fn default() -> Self {
        Self::new(KREIS_WIDTH)
    }
}

impl AgsNormalizer {
    /// Creates a normalizer producing codes of `width` digits.
    ///
    /// The target width is always treated as a hierarchy level so that
    /// canonical codes pass through unchanged.
    #[must_use]
    pub fn new(width: usize) -> Self {
        let mut levels = LEVEL_WIDTHS.to_vec();
        levels.push(width);
        levels.sort_unstable();
        levels.dedup();
        Self { width, levels }
    }

    /// Returns the canonical code width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Normalizes `raw` into a canonical code.
    ///
    /// Codes finer than the target level are truncated to their prefix,
    /// coarser or zero-stripped codes are left-padded. Normalizing an
    /// already canonical code returns it unchanged.
    ///
    /// # Errors
    ///
    /// * [`IdentifierError::Empty`] if nothing is left after trimming
    /// * [`IdentifierError::NonNumeric`] if the cleaned value is not all digits
    pub fn normalize(&self, raw: &str) -> Result<String, IdentifierError> {
        let digits = clean(raw)?;

        // Numeric serialization drops leading zeros; pad back up to the
        // nearest level that can hold the remaining digits.
        let level = self
            .levels
            .iter()
            .copied()
            .find(|&w| w >= digits.len())
            .unwrap_or(digits.len());
        let restored = format!("{digits:0>level$}");

        if restored.len() >= self.width {
            Ok(restored[..self.width].to_string())
        } else {
            Ok(format!("{restored:0>width$}", width = self.width))
        }
    }
}

/// Normalizes `raw` to a 5-digit Kreis code.
///
/// # Errors
///
/// See [`AgsNormalizer::normalize`].
pub fn normalize_ags(raw: &str) -> Result<String, IdentifierError> {
    AgsNormalizer::default().normalize(raw)
}

/// Reduces a raw identifier to its bare digit string.
///
/// A single all-zero group such as `9.000` matches both a float artifact and
/// locale grouping. The float reading wins, so `9.000` cleans to `9`, not
/// `9000`. Grouping only applies when at least one group carries a non-zero
/// digit or there are several groups (`9.161.000`, `9.000.000`).
fn clean(raw: &str) -> Result<String, IdentifierError> {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::Empty);
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\'' | '_'))
        .collect();

    let digits = if SCIENTIFIC_RE.is_match(&compact) {
        scientific_to_integer(&compact).ok_or_else(|| non_numeric(raw))?
    } else if let Some(caps) = FLOAT_ARTIFACT_RE.captures(&compact) {
        caps[1].to_string()
    } else if GROUPED_RE.is_match(&compact) {
        compact.replace(['.', ','], "")
    } else {
        compact
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(non_numeric(raw));
    }

    Ok(digits)
}

/// Accepts scientific notation only when it denotes a non-negative integer.
fn scientific_to_integer(value: &str) -> Option<String> {
    let parsed: f64 = value.parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 || parsed.fract().abs() > f64::EPSILON || parsed >= 1e15
    {
        return None;
    }
    Some(format!("{parsed:.0}"))
}

fn non_numeric(raw: &str) -> IdentifierError {
    IdentifierError::NonNumeric {
        raw: raw.to_string(),
    }
}
