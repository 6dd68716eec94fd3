use crate::data::features::{FeatureSet, REQUIRED_FEATURES, SENTIMENT_FEATURES};
use crate::error::{AlphaMinerError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

pub const DATE_COLUMN: &str = "date";
pub const INSTRUMENT_COLUMN: &str = "instrument";
/// Optional column holding explicit forward returns.
pub const FORWARD_RETURN_COLUMN: &str = "fwd_ret";

/// Loads long-format panels (`date, instrument, <feature>...`, one row per
/// observation) into aligned feature tensors.
pub struct PanelCsvConnector;

impl PanelCsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .map_err(|e| AlphaMinerError::DataLoading(format!("Failed to read CSV: {}", e)))?;

        Ok(df)
    }

    pub fn load_feature_set<P: AsRef<Path>>(path: P) -> Result<FeatureSet> {
        let df = Self::load(&path)?;
        log::info!(
            "Loaded {} rows from {}",
            df.height(),
            path.as_ref().display()
        );
        Self::to_feature_set(&df)
    }

    /// Pivot a long-format frame into `(date, instrument)` tensors. Periods
    /// and instruments are ordered by their textual value; absent cells are
    /// NaN.
    pub fn to_feature_set(df: &DataFrame) -> Result<FeatureSet> {
        let date_col = Self::find_column(df, DATE_COLUMN)
            .ok_or_else(|| AlphaMinerError::DataLoading("missing date column".to_string()))?;
        let instrument_col = Self::find_column(df, INSTRUMENT_COLUMN).ok_or_else(|| {
            AlphaMinerError::DataLoading("missing instrument column".to_string())
        })?;

        let dates = Self::string_values(df, &date_col)?;
        let instruments = Self::string_values(df, &instrument_col)?;

        let date_index = Self::index(&dates);
        let instrument_index = Self::index(&instruments);
        let shape = (date_index.len(), instrument_index.len());

        let cells: Vec<Option<(usize, usize)>> = dates
            .iter()
            .zip(&instruments)
            .map(|(d, i)| match (d, i) {
                (Some(d), Some(i)) => Some((date_index[d.as_str()], instrument_index[i.as_str()])),
                _ => None,
            })
            .collect();

        let mut set = FeatureSet::new(shape.0, shape.1);
        for name in REQUIRED_FEATURES.iter().chain(SENTIMENT_FEATURES.iter()) {
            if let Some(column) = Self::find_column(df, name) {
                let tensor = Self::pivot(df, &column, &cells, shape)?;
                set.insert(name, tensor)?;
            }
        }

        if let Some(column) = Self::find_column(df, FORWARD_RETURN_COLUMN) {
            let tensor = Self::pivot(df, &column, &cells, shape)?;
            set.set_forward_returns(tensor)?;
        }

        let skipped = cells.iter().filter(|c| c.is_none()).count();
        if skipped > 0 {
            log::warn!("Skipped {} rows without date or instrument", skipped);
        }

        set.require(&REQUIRED_FEATURES)
            .map_err(|e| AlphaMinerError::DataLoading(format!("Panel incomplete: {}", e)))?;
        Ok(set)
    }

    fn find_column(df: &DataFrame, wanted: &str) -> Option<String> {
        df.get_column_names()
            .iter()
            .find(|col| col.as_str().eq_ignore_ascii_case(wanted))
            .map(|col| col.to_string())
    }

    fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
        let series = df.column(name)?.cast(&DataType::String)?;
        let values = series.str()?;
        Ok((0..df.height())
            .map(|i| values.get(i).map(|v| v.to_string()))
            .collect())
    }

    fn index(values: &[Option<String>]) -> BTreeMap<&str, usize> {
        let mut index: BTreeMap<&str, usize> = values
            .iter()
            .flatten()
            .map(|v| (v.as_str(), 0))
            .collect();
        for (i, slot) in index.values_mut().enumerate() {
            *slot = i;
        }
        index
    }

    fn pivot(
        df: &DataFrame,
        name: &str,
        cells: &[Option<(usize, usize)>],
        shape: (usize, usize),
    ) -> Result<Array2<f64>> {
        let series = df.column(name)?.cast(&DataType::Float64)?;
        let values = series.f64()?;
        let mut tensor = Array2::from_elem(shape, f64::NAN);
        for (row, cell) in cells.iter().enumerate() {
            if let (Some(cell), Some(v)) = (cell, values.get(row)) {
                tensor[*cell] = v;
            }
        }
        Ok(tensor)
    }
}
