//! Merge independently indexed daily series onto one calendar.
//!
//! Futures settle on one exchange calendar and the equity trades on
//! another, so a plain outer join leaves holes on every holiday. The
//! forward-fill method bridges short holes with the last settlement but
//! refuses to bridge gaps longer than `max_gap` calendar days, and only
//! keeps the days the reference market was open.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::{Error, OhlcvField, PriceSeries, Result};

use crate::rolling::FeatureSeries;

/// Calendar gaps wider than this many days are counted by
/// [`validate_alignment`] as likely calendar bugs (a weekend is 3 days).
pub const SUSPICIOUS_GAP_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMethod {
    /// Dates present in every non-empty series.
    Inner,
    /// Every date present in any series, without filling.
    Outer,
    /// Union of dates, bounded forward fill, restricted to the reference
    /// series' calendar.
    #[default]
    ForwardFill,
}

/// A defined table cell together with the date the value was observed.
/// `observed < date` means the value was carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    pub value: f64,
    pub observed: NaiveDate,
}

/// Dates (ascending) × named columns of optional cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignedTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    /// Column-major: `cells[column][row]`.
    cells: Vec<Vec<Option<Cell>>>,
}

impl AlignedTable {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cells(&self, name: &str) -> Option<&[Option<Cell>]> {
        self.index_of(name).map(|i| self.cells[i].as_slice())
    }

    /// Values of a column; `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Option<FeatureSeries> {
        self.cells(name)
            .map(|cells| cells.iter().map(|c| c.map(|c| c.value)).collect())
    }

    pub fn value(&self, name: &str, date: NaiveDate) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        self.cells(name)?[row].map(|c| c.value)
    }

    /// Days each value has been carried forward (0 for same-day values).
    pub fn staleness(&self, name: &str) -> Option<Vec<Option<i64>>> {
        self.cells(name).map(|cells| {
            cells
                .iter()
                .zip(&self.dates)
                .map(|(c, d)| c.map(|c| (*d - c.observed).num_days()))
                .collect()
        })
    }

    /// Rows where both columns are defined, as parallel vectors.
    pub fn dense_pair(&self, a: &str, b: &str) -> Result<(Vec<NaiveDate>, Vec<f64>, Vec<f64>)> {
        let ca = self.cells(a).ok_or_else(|| missing_column(a))?;
        let cb = self.cells(b).ok_or_else(|| missing_column(b))?;
        let mut dates = Vec::new();
        let mut va = Vec::new();
        let mut vb = Vec::new();
        for ((d, x), y) in self.dates.iter().zip(ca).zip(cb) {
            if let (Some(x), Some(y)) = (x, y) {
                dates.push(*d);
                va.push(x.value);
                vb.push(y.value);
            }
        }
        Ok((dates, va, vb))
    }

    /// Keep only rows where every `required` column is defined.
    pub fn drop_incomplete(&self, required: &[&str]) -> Result<Self> {
        let idx: Vec<usize> = required
            .iter()
            .map(|name| self.index_of(name).ok_or_else(|| missing_column(name)))
            .collect::<Result<_>>()?;
        let keep: Vec<usize> = (0..self.len())
            .filter(|&row| idx.iter().all(|&c| self.cells[c][row].is_some()))
            .collect();
        Ok(Self {
            dates: keep.iter().map(|&r| self.dates[r]).collect(),
            columns: self.columns.clone(),
            cells: self
                .cells
                .iter()
                .map(|col| keep.iter().map(|&r| col[r]).collect())
                .collect(),
        })
    }

    /// Rows dated on or before `last`.
    pub fn until(&self, last: NaiveDate) -> Self {
        let rows = self.dates.partition_point(|d| *d <= last);
        Self {
            dates: self.dates[..rows].to_vec(),
            columns: self.columns.clone(),
            cells: self.cells.iter().map(|col| col[..rows].to_vec()).collect(),
        }
    }

    /// Append a derived column computed row-by-row from this table. Values
    /// are stamped as observed on their own row date.
    pub fn with_column(mut self, name: impl Into<String>, values: FeatureSeries) -> Result<Self> {
        let name = name.into();
        if self.index_of(&name).is_some() {
            return Err(Error::config(format!("column '{name}' already exists")));
        }
        if values.len() != self.len() {
            return Err(Error::config(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.len()
            )));
        }
        let cells = values
            .into_iter()
            .zip(&self.dates)
            .map(|(v, d)| {
                v.filter(|v| v.is_finite())
                    .map(|value| Cell { value, observed: *d })
            })
            .collect();
        self.columns.push(name);
        self.cells.push(cells);
        Ok(self)
    }
}

fn missing_column(name: &str) -> Error {
    Error::config(format!("column '{name}' not found in aligned table"))
}

/// One named column's observations, ascending by date.
struct Column {
    name: String,
    points: Vec<(NaiveDate, f64)>,
}

/// A group of columns sharing one observation calendar.
struct Source {
    key: String,
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl Source {
    fn from_series(key: &str, series: &PriceSeries) -> Self {
        // an observation without a usable price is not an observation
        let observed: Vec<_> = series
            .observations()
            .iter()
            .filter(|o| o.price.is_finite())
            .collect();

        let mut columns = vec![Column {
            name: key.to_string(),
            points: observed.iter().map(|o| (o.date, o.price)).collect(),
        }];
        for field in OhlcvField::ALL {
            if !series.has_field(field) {
                continue;
            }
            columns.push(Column {
                name: format!("{key}_{}", field.suffix()),
                points: observed
                    .iter()
                    .filter_map(|o| {
                        o.field(field)
                            .filter(|v| v.is_finite())
                            .map(|v| (o.date, v))
                    })
                    .collect(),
            });
        }

        Self {
            key: key.to_string(),
            dates: observed.iter().map(|o| o.date).collect(),
            columns,
        }
    }

    fn from_table_column(name: &str, cells: &[Option<Cell>]) -> Self {
        let distinct: BTreeMap<NaiveDate, f64> = cells
            .iter()
            .flatten()
            .map(|c| (c.observed, c.value))
            .collect();
        Self {
            key: name.to_string(),
            dates: distinct.keys().copied().collect(),
            columns: vec![Column {
                name: name.to_string(),
                points: distinct.into_iter().collect(),
            }],
        }
    }
}

/// Align named price series onto one daily index.
///
/// Each series contributes a price column named after its key plus a
/// `<key>_<field>` column for every OHLCV field it carries. An empty series
/// contributes an entirely absent price column. `reference_key` must name
/// one of the series; `max_gap` is in calendar days and only affects
/// [`AlignMethod::ForwardFill`].
pub fn align(
    series: &BTreeMap<String, PriceSeries>,
    method: AlignMethod,
    reference_key: &str,
    max_gap: u32,
) -> Result<AlignedTable> {
    if !series.contains_key(reference_key) {
        return Err(Error::config(format!(
            "reference series '{reference_key}' is not among the inputs"
        )));
    }
    let sources: Vec<Source> = series
        .iter()
        .map(|(key, s)| Source::from_series(key, s))
        .collect();
    build(&sources, method, reference_key, max_gap)
}

/// Re-align an existing table, treating every column as its own series
/// and the carried-forward cells by their original observation date.
/// For [`AlignMethod::Inner`] the columns share the table's calendar (every
/// observed date) instead, since a sparse OHLCV column must not narrow the
/// rows of the series it belongs to. Aligning a table again with the method
/// and parameters that produced it returns an identical table.
pub fn align_table(
    table: &AlignedTable,
    method: AlignMethod,
    reference_key: &str,
    max_gap: u32,
) -> Result<AlignedTable> {
    if table.index_of(reference_key).is_none() {
        return Err(Error::config(format!(
            "reference column '{reference_key}' is not in the table"
        )));
    }
    let mut sources: Vec<Source> = table
        .columns
        .iter()
        .zip(&table.cells)
        .map(|(name, cells)| Source::from_table_column(name, cells))
        .collect();
    if method == AlignMethod::Inner {
        let calendar = union(&sources);
        for source in &mut sources {
            source.dates = calendar.clone();
        }
    }
    build(&sources, method, reference_key, max_gap)
}

fn build(sources: &[Source], method: AlignMethod, reference_key: &str, max_gap: u32) -> Result<AlignedTable> {
    let mut names = BTreeSet::new();
    for column in sources.iter().flat_map(|s| &s.columns) {
        if !names.insert(column.name.as_str()) {
            return Err(Error::config(format!(
                "column name '{}' produced by more than one series",
                column.name
            )));
        }
    }

    let dates: Vec<NaiveDate> = match method {
        AlignMethod::Inner => {
            let mut non_empty = sources.iter().filter(|s| !s.dates.is_empty());
            match non_empty.next() {
                None => Vec::new(),
                Some(first) => {
                    let mut shared: BTreeSet<NaiveDate> = first.dates.iter().copied().collect();
                    for s in non_empty {
                        let other: BTreeSet<NaiveDate> = s.dates.iter().copied().collect();
                        shared = &shared & &other;
                    }
                    shared.into_iter().collect()
                }
            }
        }
        AlignMethod::Outer => union(sources),
        AlignMethod::ForwardFill => {
            let reference: BTreeSet<NaiveDate> = sources
                .iter()
                .find(|s| s.key == reference_key)
                .map(|s| s.dates.iter().copied().collect())
                .unwrap_or_default();
            union(sources)
                .into_iter()
                .filter(|d| reference.contains(d))
                .collect()
        }
    };

    let fill = match method {
        AlignMethod::ForwardFill => i64::from(max_gap),
        AlignMethod::Inner | AlignMethod::Outer => 0,
    };

    let mut columns = Vec::new();
    let mut cells = Vec::new();
    for column in sources.iter().flat_map(|s| &s.columns) {
        columns.push(column.name.clone());
        cells.push(fill_column(&column.points, &dates, fill));
    }

    Ok(AlignedTable { dates, columns, cells })
}

fn union(sources: &[Source]) -> Vec<NaiveDate> {
    sources
        .iter()
        .flat_map(|s| s.dates.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Latest point at or before each row date, if it is at most `max_gap`
/// calendar days old. Both inputs are ascending.
fn fill_column(points: &[(NaiveDate, f64)], dates: &[NaiveDate], max_gap: i64) -> Vec<Option<Cell>> {
    let mut next = 0;
    let mut last: Option<(NaiveDate, f64)> = None;
    dates
        .iter()
        .map(|&date| {
            while next < points.len() && points[next].0 <= date {
                last = Some(points[next]);
                next += 1;
            }
            let (observed, value) = last?;
            ((date - observed).num_days() <= max_gap).then_some(Cell { value, observed })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Quality summary of an aligned table, meant for the caller's logs and
/// monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentDiagnostics {
    pub total_rows: usize,
    pub date_range: Option<DateRange>,
    /// Percentage of absent cells per column, rounded to 2 decimals.
    pub missing_pct: BTreeMap<String, f64>,
    /// Consecutive rows more than [`SUSPICIOUS_GAP_DAYS`] apart.
    pub date_gaps: usize,
}

impl AlignmentDiagnostics {
    /// Column with the highest missing percentage.
    pub fn worst_column(&self) -> Option<(&str, f64)> {
        self.missing_pct
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, v)| (k.as_str(), *v))
    }
}

pub fn validate_alignment(table: &AlignedTable) -> AlignmentDiagnostics {
    let rows = table.len();
    let missing_pct = table
        .columns
        .iter()
        .zip(&table.cells)
        .map(|(name, cells)| {
            let pct = if rows == 0 {
                0.0
            } else {
                let missing = cells.iter().filter(|c| c.is_none()).count();
                missing as f64 / rows as f64 * 100.0
            };
            (name.clone(), (pct * 100.0).round() / 100.0)
        })
        .collect();

    let date_gaps = table
        .dates
        .windows(2)
        .filter(|w| (w[1] - w[0]).num_days() > SUSPICIOUS_GAP_DAYS)
        .count();

    AlignmentDiagnostics {
        total_rows: rows,
        date_range: table
            .dates
            .first()
            .zip(table.dates.last())
            .map(|(&start, &end)| DateRange { start, end }),
        missing_pct,
        date_gaps,
    }
}
