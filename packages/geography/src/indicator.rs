//! Tabular commuting indicator loading.
//!
//! Two layouts are understood: a plain two-column `pairs` table, and the
//! `wide` statistical-office export with one column per year, a leading
//! title row and German decimal commas.

use std::io::Read;
use std::path::Path;

use commute_air_geography_models::IndicatorRecord;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::GeoError;
use crate::parsing::{clean_cell, find_column, parse_decimal};

const INPUT: &str = "commute indicator";

/// Layout of the indicator table.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndicatorFormat {
    /// Header row with named id and value columns.
    #[default]
    Pairs,
    /// Identifier in column 0, one value column per year.
    Wide,
}

/// Options for reading the indicator table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorOptions {
    /// Table layout.
    pub format: IndicatorFormat,
    /// Field delimiter. Defaults to `;` for wide tables and `,` otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    /// Identifier column of a pairs table.
    pub id_column: String,
    /// Value column of a pairs table.
    pub value_column: String,
    /// Leading rows dropped before the header. Defaults to 1 for wide
    /// tables and 0 otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_rows: Option<usize>,
    /// Preferred year column of a wide table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

impl Default for IndicatorOptions {
    fn default() -> Self {
        Self {
            format: IndicatorFormat::default(),
            delimiter: None,
            id_column: "AGS5".to_string(),
            value_column: "commute_value".to_string(),
            skip_rows: None,
            year: None,
        }
    }
}

impl IndicatorOptions {
    fn effective_delimiter(&self) -> Result<u8, GeoError> {
        let delimiter = self.delimiter.unwrap_or(match self.format {
            IndicatorFormat::Pairs => ',',
            IndicatorFormat::Wide => ';',
        });
        u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| GeoError::Conversion {
                message: format!("delimiter {delimiter:?} is not a single ASCII character"),
            })
    }

    fn effective_skip_rows(&self) -> usize {
        self.skip_rows.unwrap_or(match self.format {
            IndicatorFormat::Pairs => 0,
            IndicatorFormat::Wide => 1,
        })
    }
}

/// Records read from an indicator table.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorLoad {
    /// One record per data row, identifiers still raw.
    pub records: Vec<IndicatorRecord>,
    /// Header of the column the values were taken from.
    pub value_column: String,
    /// Non-empty cells that could not be parsed as numbers.
    pub unparsed_values: usize,
}

/// Loads an indicator table from a CSV file.
///
/// # Errors
///
/// * [`GeoError::Io`] if the file cannot be opened
/// * see [`parse_indicator`]
pub fn load_indicator(path: &Path, options: &IndicatorOptions) -> Result<IndicatorLoad, GeoError> {
    let file = std::fs::File::open(path)?;
    let load = parse_indicator(file, options)?;
    log::info!(
        "Loaded {} indicator rows from {} (column '{}')",
        load.records.len(),
        path.display(),
        load.value_column
    );
    Ok(load)
}

/// Parses an indicator table from any CSV source.
///
/// # Errors
///
/// * [`GeoError::Csv`] on malformed CSV
/// * [`GeoError::Conversion`] if the delimiter is not ASCII
/// * [`GeoError::AmbiguousSchema`] if the id or value column cannot be found
/// * [`GeoError::EmptyInput`] if there is no header or no data row
pub fn parse_indicator(
    reader: impl Read,
    options: &IndicatorOptions,
) -> Result<IndicatorLoad, GeoError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.effective_delimiter()?)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = csv_reader
        .records()
        .skip(options.effective_skip_rows())
        .filter(|row| !row.as_ref().is_ok_and(is_blank));

    let headers: Vec<String> = match rows.next() {
        Some(row) => row?.iter().map(|c| clean_cell(c).to_string()).collect(),
        None => {
            return Err(GeoError::EmptyInput {
                input: INPUT.to_string(),
            });
        }
    };

    let (id_idx, value_idx) = match options.format {
        IndicatorFormat::Pairs => pair_columns(&headers, options)?,
        IndicatorFormat::Wide => (0, year_column(&headers, options.year)?),
    };

    let mut records = Vec::new();
    let mut unparsed_values = 0;
    for row in rows {
        let row = row?;
        let raw_id = row.get(id_idx).map(clean_cell).unwrap_or_default();
        let cell = row.get(value_idx).map(clean_cell).unwrap_or_default();
        let value = parse_decimal(cell);
        if value.is_none() && !cell.is_empty() {
            log::trace!("Unparseable indicator value {cell:?} for {raw_id:?}");
            unparsed_values += 1;
        }
        records.push(IndicatorRecord {
            raw_id: raw_id.to_string(),
            value,
        });
    }

    if records.is_empty() {
        return Err(GeoError::EmptyInput {
            input: INPUT.to_string(),
        });
    }
    if unparsed_values > 0 {
        log::warn!("{unparsed_values} indicator values could not be parsed and are treated as absent");
    }

    Ok(IndicatorLoad {
        records,
        value_column: headers[value_idx].clone(),
        unparsed_values,
    })
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|c| clean_cell(c).is_empty())
}

fn pair_columns(headers: &[String], options: &IndicatorOptions) -> Result<(usize, usize), GeoError> {
    find_column(headers, &options.id_column)
        .zip(find_column(headers, &options.value_column))
        .ok_or_else(|| GeoError::AmbiguousSchema {
            input: INPUT.to_string(),
            available: headers.to_vec(),
        })
}

/// Picks the value column of a wide table: the preferred year if present,
/// else the most recent year, else the last column.
fn year_column(headers: &[String], preferred: Option<u16>) -> Result<usize, GeoError> {
    if headers.len() < 2 {
        return Err(GeoError::AmbiguousSchema {
            input: INPUT.to_string(),
            available: headers.to_vec(),
        });
    }

    let years: Vec<(usize, u16)> = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, header)| parse_year(header).map(|year| (idx, year)))
        .collect();

    if let Some(&(idx, year)) = preferred.and_then(|wanted| years.iter().find(|(_, y)| *y == wanted)) {
        log::info!("Using indicator year column {year}");
        return Ok(idx);
    }

    if let Some(&(idx, year)) = years.iter().max_by_key(|(_, y)| *y) {
        match preferred {
            Some(wanted) => log::warn!("Year {wanted} not in indicator table, using {year}"),
            None => log::info!("Using most recent indicator year column {year}"),
        }
        return Ok(idx);
    }

    let last = headers.len() - 1;
    log::warn!(
        "No year columns in indicator table, using last column '{}'",
        headers[last]
    );
    Ok(last)
}

fn parse_year(header: &str) -> Option<u16> {
    let header = header.trim();
    if header.len() == 4 && header.bytes().all(|b| b.is_ascii_digit()) {
        header.parse().ok()
    } else {
        None
    }
}
