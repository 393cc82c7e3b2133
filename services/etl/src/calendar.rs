//! Synthetic calendar dimension (`dim_time`).

use crate::error::{EtlError, Result};
use crate::table::{ColumnData, Table};
use chrono::{Datelike, NaiveDate, Weekday};
use tracing::info;

/// First day of the default calendar range.
pub const CALENDAR_START: &str = "2020-01-01";

/// Last day (inclusive) of the default calendar range.
pub const CALENDAR_END: &str = "2030-12-31";

pub const TIME_TABLE: &str = "dim_time";

/// Build one row per day in `[start, end]`.
///
/// Week numbers follow ISO-8601; Saturday and Sunday are weekend days.
pub fn build_calendar_dimension(start: NaiveDate, end: NaiveDate) -> Result<Table> {
    if end < start {
        return Err(EtlError::transform(format!(
            "calendar range is inverted: {start} is after {end}"
        )));
    }

    let days: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();

    let mut day_of_week = Vec::with_capacity(days.len());
    let mut day_of_week_number = Vec::with_capacity(days.len());
    let mut day_of_month = Vec::with_capacity(days.len());
    let mut day_of_year = Vec::with_capacity(days.len());
    let mut week_of_year = Vec::with_capacity(days.len());
    let mut month = Vec::with_capacity(days.len());
    let mut month_name = Vec::with_capacity(days.len());
    let mut quarter = Vec::with_capacity(days.len());
    let mut year = Vec::with_capacity(days.len());
    let mut is_weekend = Vec::with_capacity(days.len());

    for day in &days {
        let weekday = day.weekday();
        day_of_week.push(Some(day.format("%A").to_string()));
        day_of_week_number.push(Some(weekday.number_from_monday() as i32));
        day_of_month.push(Some(day.day() as i32));
        day_of_year.push(Some(day.ordinal() as i32));
        week_of_year.push(Some(day.iso_week().week() as i32));
        month.push(Some(day.month() as i32));
        month_name.push(Some(day.format("%B").to_string()));
        quarter.push(Some(((day.month() - 1) / 3 + 1) as i32));
        year.push(Some(day.year()));
        is_weekend.push(Some(matches!(weekday, Weekday::Sat | Weekday::Sun)));
    }

    let rows = days.len();
    let table = Table::new(TIME_TABLE)
        .with_column("date", ColumnData::Date(days.into_iter().map(Some).collect()))
        .with_column("day_of_week", ColumnData::Utf8(day_of_week))
        .with_column("day_of_week_number", ColumnData::Int32(day_of_week_number))
        .with_column("day_of_month", ColumnData::Int32(day_of_month))
        .with_column("day_of_year", ColumnData::Int32(day_of_year))
        .with_column("week_of_year", ColumnData::Int32(week_of_year))
        .with_column("month", ColumnData::Int32(month))
        .with_column("month_name", ColumnData::Utf8(month_name))
        .with_column("quarter", ColumnData::Int32(quarter))
        .with_column("year", ColumnData::Int32(year))
        .with_column("is_weekend", ColumnData::Boolean(is_weekend));

    info!(rows, %start, %end, "time dimension built");
    Ok(table)
}
