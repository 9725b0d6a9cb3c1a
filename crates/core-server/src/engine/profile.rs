//! Column profiling: null rates, distinct-value estimates, and for
//! numeric columns, distribution summaries (quantiles, skew/kurtosis,
//! IQR outlier bounds) plus an optional equal-width histogram.

use std::path::Path;

use duckdb::{params, Connection};
use serde::Serialize;

use crate::error::AppError;

use super::{get_columns, open_readonly, sql, DATA_TABLE};

#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct NumericProfile {
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub q01: Option<f64>,
    pub q05: Option<f64>,
    pub q25: Option<f64>,
    pub q50: Option<f64>,
    pub q75: Option<f64>,
    pub q95: Option<f64>,
    pub q99: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub outlier_lower_bound: Option<f64>,
    pub outlier_upper_bound: Option<f64>,
    pub outlier_count: Option<i64>,
    pub histogram: Option<Vec<HistogramBucket>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub r#type: String,
    pub null_count: i64,
    pub null_fraction: f64,
    pub approx_distinct_count: i64,
    pub min: Option<String>,
    pub max: Option<String>,
    pub numeric: Option<NumericProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResult {
    pub row_count: i64,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    pub columns: Option<Vec<String>>,
    pub include_histogram: bool,
    pub histogram_buckets: u32,
}

fn is_numeric_type(type_name: &str) -> bool {
    const NUMERIC_PREFIXES: &[&str] = &[
        "TINYINT", "SMALLINT", "INTEGER", "BIGINT", "HUGEINT", "UTINYINT", "USMALLINT", "UINTEGER", "UBIGINT",
        "FLOAT", "DOUBLE", "DECIMAL", "REAL",
    ];
    let upper = type_name.to_uppercase();
    NUMERIC_PREFIXES.iter().any(|p| upper.starts_with(p))
}

fn scalar_opt_f64(conn: &Connection, expr: &str) -> Result<Option<f64>, AppError> {
    conn.query_row(expr, params![], |r| r.get::<_, Option<f64>>(0)).map_err(AppError::from)
}

pub fn build_histogram(conn: &Connection, column: &str, buckets: u32, min: f64, max: f64) -> Result<Vec<HistogramBucket>, AppError> {
    let quoted = sql::quote_ident(column);
    let buckets = buckets.max(1);
    if (max - min).abs() < f64::EPSILON {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {DATA_TABLE} WHERE {quoted} IS NOT NULL"),
            params![],
            |r| r.get(0),
        )?;
        return Ok(vec![HistogramBucket { lower: min, upper: max, count }]);
    }
    let width = (max - min) / buckets as f64;
    let mut out = Vec::with_capacity(buckets as usize);
    for i in 0..buckets {
        let lower = min + width * i as f64;
        let upper = if i == buckets - 1 { max } else { min + width * (i as f64 + 1.0) };
        let predicate = if i == buckets - 1 {
            format!("{quoted} >= {lower} AND {quoted} <= {upper}")
        } else {
            format!("{quoted} >= {lower} AND {quoted} < {upper}")
        };
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {DATA_TABLE} WHERE {predicate}"),
            params![],
            |r| r.get(0),
        )?;
        out.push(HistogramBucket { lower, upper, count });
    }
    Ok(out)
}

fn profile_numeric(conn: &Connection, column: &str, options: &ProfileOptions) -> Result<NumericProfile, AppError> {
    let quoted = sql::quote_ident(column);
    let stats_row = conn.query_row(
        &format!(
            "SELECT avg({quoted}), stddev_samp({quoted}), \
             quantile_cont({quoted}, 0.01), quantile_cont({quoted}, 0.05), quantile_cont({quoted}, 0.25), \
             quantile_cont({quoted}, 0.50), quantile_cont({quoted}, 0.75), quantile_cont({quoted}, 0.95), \
             quantile_cont({quoted}, 0.99), skewness({quoted}), kurtosis({quoted}) \
             FROM {DATA_TABLE} WHERE {quoted} IS NOT NULL"
        ),
        params![],
        |row| {
            Ok((
                row.get::<_, Option<f64>>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
                row.get::<_, Option<f64>>(7)?,
                row.get::<_, Option<f64>>(8)?,
                row.get::<_, Option<f64>>(9)?,
                row.get::<_, Option<f64>>(10)?,
            ))
        },
    )?;
    let (mean, stddev, q01, q05, q25, q50, q75, q95, q99, skewness, kurtosis) = stats_row;

    let (outlier_lower_bound, outlier_upper_bound, outlier_count) = match (q25, q75) {
        (Some(q25), Some(q75)) => {
            let iqr = q75 - q25;
            let lower = q25 - 1.5 * iqr;
            let upper = q75 + 1.5 * iqr;
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {DATA_TABLE} WHERE {quoted} < {lower} OR {quoted} > {upper}"),
                params![],
                |r| r.get(0),
            )?;
            (Some(lower), Some(upper), Some(count))
        },
        _ => (None, None, None),
    };

    let histogram = if options.include_histogram {
        let min = scalar_opt_f64(conn, &format!("SELECT min({quoted}) FROM {DATA_TABLE}"))?;
        let max = scalar_opt_f64(conn, &format!("SELECT max({quoted}) FROM {DATA_TABLE}"))?;
        match (min, max) {
            (Some(min), Some(max)) => Some(build_histogram(conn, column, options.histogram_buckets.max(1), min, max)?),
            _ => None,
        }
    } else {
        None
    };

    Ok(NumericProfile {
        mean,
        stddev,
        q01,
        q05,
        q25,
        q50,
        q75,
        q95,
        q99,
        skewness,
        kurtosis,
        outlier_lower_bound,
        outlier_upper_bound,
        outlier_count,
        histogram,
    })
}

pub fn profile(path: &Path, options: &ProfileOptions) -> Result<ProfileResult, AppError> {
    let conn = open_readonly(path)?;
    let all_columns = get_columns(&conn)?;
    let targets: Vec<_> = match &options.columns {
        Some(names) => all_columns.into_iter().filter(|c| names.contains(&c.name)).collect(),
        None => all_columns,
    };

    let row_count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {DATA_TABLE}"), params![], |r| r.get(0))?;

    let mut columns = Vec::with_capacity(targets.len());
    for col in targets {
        let quoted = sql::quote_ident(&col.name);
        let null_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {DATA_TABLE} WHERE {quoted} IS NULL"),
            params![],
            |r| r.get(0),
        )?;
        let approx_distinct_count: i64 = conn.query_row(
            &format!("SELECT approx_count_distinct({quoted}) FROM {DATA_TABLE}"),
            params![],
            |r| r.get(0),
        )?;
        let (min, max): (Option<String>, Option<String>) = conn.query_row(
            &format!("SELECT min({quoted})::VARCHAR, max({quoted})::VARCHAR FROM {DATA_TABLE}"),
            params![],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let numeric = if is_numeric_type(&col.r#type) {
            Some(profile_numeric(&conn, &col.name, options)?)
        } else {
            None
        };

        let null_fraction = if row_count > 0 { null_count as f64 / row_count as f64 } else { 0.0 };

        columns.push(ColumnProfile {
            name: col.name,
            r#type: col.r#type,
            null_count,
            null_fraction,
            approx_distinct_count,
            min,
            max,
            numeric,
        });
    }

    Ok(ProfileResult { row_count, column_count: columns.len(), columns })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_numeric_type_names() {
        assert!(is_numeric_type("BIGINT"));
        assert!(is_numeric_type("DECIMAL(10,2)"));
        assert!(!is_numeric_type("VARCHAR"));
        assert!(!is_numeric_type("TIMESTAMP"));
    }

    #[test]
    fn profile_options_default_has_no_histogram() {
        let options = ProfileOptions::default();
        assert!(!options.include_histogram);
        assert_eq!(options.histogram_buckets, 0);
    }
}
