//! CSV ingest of the three input series.
//!
//! All files are headerless, comma separated:
//!
//! - daily:       `y,m,d,v1..vN`
//! - hourly:      `y,m,d,h,v1..vN`, 24 consecutive rows (hours 0..=23) per day
//! - circulation: `y,m,d,cp`
//!
//! Errors name the file and the 1-based line. Dates must be strictly
//! increasing in the daily and hourly series.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use log::info;
use nalgebra::DMatrix;

use crate::classify::CirculationSeries;
use crate::domain::{DailyRecord, HOURS_PER_DAY, HourlyRecord, Variable};
use crate::error::AppError;

pub fn read_daily(path: &Path, n_stations: usize) -> Result<Vec<DailyRecord>, AppError> {
    let records = parse_daily(open(path)?, n_stations).map_err(|e| in_file(e, path))?;
    info!(
        "read {} daily records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

pub fn read_hourly(
    path: &Path,
    n_stations: usize,
    variable: Variable,
) -> Result<Vec<HourlyRecord>, AppError> {
    let records = parse_hourly(open(path)?, n_stations, variable).map_err(|e| in_file(e, path))?;
    info!(
        "read {} hourly days from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

pub fn read_circulation(path: &Path) -> Result<CirculationSeries, AppError> {
    let series = parse_circulation(open(path)?).map_err(|e| in_file(e, path))?;
    info!(
        "read {} circulation patterns ({} classes) from {}",
        series.len(),
        series.class_count(),
        path.display()
    );
    Ok(series)
}

pub fn parse_daily<R: Read>(input: R, n_stations: usize) -> Result<Vec<DailyRecord>, AppError> {
    let mut out: Vec<DailyRecord> = Vec::new();
    for row in rows(input) {
        let (line, record) = row?;
        expect_columns(&record, 3 + n_stations, line)?;
        let date = parse_date(&record, line)?;
        let values = parse_values(&record, 3, line)?;
        if let Some(prev) = out.last() {
            ensure_increasing(prev.date, date, line)?;
        }
        out.push(DailyRecord::new(date, values));
    }
    if out.is_empty() {
        return Err(AppError::data("daily series is empty"));
    }
    Ok(out)
}

pub fn parse_hourly<R: Read>(
    input: R,
    n_stations: usize,
    variable: Variable,
) -> Result<Vec<HourlyRecord>, AppError> {
    let mut out: Vec<HourlyRecord> = Vec::new();
    let mut current: Option<DayBuffer> = None;

    for row in rows(input) {
        let (line, record) = row?;
        expect_columns(&record, 4 + n_stations, line)?;
        let date = parse_date(&record, line)?;
        let hour: usize = field(&record, 3, line)?
            .parse()
            .map_err(|_| AppError::data(format!("line {line}: invalid hour '{}'", &record[3])))?;
        if hour >= HOURS_PER_DAY {
            return Err(AppError::data(format!(
                "line {line}: hour {hour} is outside 0..=23"
            )));
        }
        let values = parse_values(&record, 4, line)?;

        let starts_new_day = current.as_ref().is_none_or(|buf| buf.date != date);
        if starts_new_day {
            if let Some(done) = current.take() {
                let prev = done.date;
                out.push(done.finish(variable)?);
                ensure_increasing(prev, date, line)?;
            }
            current = Some(DayBuffer::new(date, n_stations, line));
        }
        if let Some(buf) = current.as_mut() {
            buf.set(hour, &values, line)?;
        }
    }
    if let Some(done) = current.take() {
        out.push(done.finish(variable)?);
    }
    if out.is_empty() {
        return Err(AppError::data("hourly series is empty"));
    }
    Ok(out)
}

pub fn parse_circulation<R: Read>(input: R) -> Result<CirculationSeries, AppError> {
    let mut entries = Vec::new();
    for row in rows(input) {
        let (line, record) = row?;
        expect_columns(&record, 4, line)?;
        let date = parse_date(&record, line)?;
        let cp: u32 = field(&record, 3, line)?.parse().map_err(|_| {
            AppError::data(format!(
                "line {line}: circulation pattern '{}' is not a positive integer",
                &record[3]
            ))
        })?;
        entries.push((date, cp));
    }
    CirculationSeries::new(entries)
}

/// Hours of one day collected before it becomes an `HourlyRecord`.
struct DayBuffer {
    date: NaiveDate,
    first_line: usize,
    hourly: DMatrix<f64>,
    seen: [bool; HOURS_PER_DAY],
}

impl DayBuffer {
    fn new(date: NaiveDate, n_stations: usize, first_line: usize) -> Self {
        Self {
            date,
            first_line,
            hourly: DMatrix::zeros(n_stations, HOURS_PER_DAY),
            seen: [false; HOURS_PER_DAY],
        }
    }

    fn set(&mut self, hour: usize, values: &[f64], line: usize) -> Result<(), AppError> {
        if self.seen[hour] {
            return Err(AppError::data(format!(
                "line {line}: hour {hour} of {} appears twice",
                self.date
            )));
        }
        self.seen[hour] = true;
        for (j, v) in values.iter().enumerate() {
            self.hourly[(j, hour)] = *v;
        }
        Ok(())
    }

    fn finish(self, variable: Variable) -> Result<HourlyRecord, AppError> {
        let missing = self.seen.iter().filter(|s| !**s).count();
        if missing > 0 {
            return Err(AppError::data(format!(
                "line {}: {} has {} of 24 hours",
                self.first_line,
                self.date,
                HOURS_PER_DAY - missing
            )));
        }
        Ok(HourlyRecord::new(
            self.date,
            self.hourly,
            variable.aggregation(),
        ))
    }
}

fn open(path: &Path) -> Result<File, AppError> {
    File::open(path)
        .map_err(|e| AppError::io(format!("failed to open '{}': {e}", path.display())))
}

fn in_file(err: AppError, path: &Path) -> AppError {
    AppError::new(
        err.kind(),
        format!("{}: {}", path.display(), err.message()),
    )
}

/// Non-empty records with their 1-based line numbers.
fn rows<R: Read>(input: R) -> impl Iterator<Item = Result<(usize, StringRecord), AppError>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input);

    reader.into_records().filter_map(|result| match result {
        Ok(record) => {
            let line = record.position().map_or(0, |p| p.line() as usize);
            if record.iter().all(str::is_empty) {
                None
            } else {
                Some(Ok((line, record)))
            }
        }
        Err(e) => {
            let line = e.position().map_or(0, |p| p.line() as usize);
            Some(Err(AppError::data(format!("line {line}: CSV parse error: {e}"))))
        }
    })
}

fn expect_columns(record: &StringRecord, expected: usize, line: usize) -> Result<(), AppError> {
    if record.len() != expected {
        return Err(AppError::data(format!(
            "line {line}: expected {expected} columns, found {}",
            record.len()
        )));
    }
    Ok(())
}

fn field<'r>(record: &'r StringRecord, idx: usize, line: usize) -> Result<&'r str, AppError> {
    record
        .get(idx)
        .ok_or_else(|| AppError::data(format!("line {line}: missing column {}", idx + 1)))
}

fn parse_date(record: &StringRecord, line: usize) -> Result<NaiveDate, AppError> {
    let part = |idx: usize| -> Result<i64, AppError> {
        let raw = field(record, idx, line)?;
        raw.parse::<i64>()
            .map_err(|_| AppError::data(format!("line {line}: invalid date component '{raw}'")))
    };
    let (y, m, d) = (part(0)?, part(1)?, part(2)?);
    i32::try_from(y)
        .ok()
        .zip(u32::try_from(m).ok())
        .zip(u32::try_from(d).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| AppError::data(format!("line {line}: invalid date {y}-{m}-{d}")))
}

fn parse_values(record: &StringRecord, start: usize, line: usize) -> Result<Vec<f64>, AppError> {
    record
        .iter()
        .skip(start)
        .enumerate()
        .map(|(j, raw)| {
            raw.parse::<f64>().map_err(|_| {
                AppError::data(format!(
                    "line {line}: station {} value '{raw}' is not numeric",
                    j + 1
                ))
            })
        })
        .collect()
}

fn ensure_increasing(prev: NaiveDate, next: NaiveDate, line: usize) -> Result<(), AppError> {
    if next <= prev {
        return Err(AppError::data(format!(
            "line {line}: date {next} does not follow {prev}; dates must be strictly increasing"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn hourly_text(dates: &[(i32, u32, u32)], stations: usize) -> String {
        let mut s = String::new();
        for (y, m, d) in dates {
            for h in 0..24 {
                s.push_str(&format!("{y},{m},{d},{h}"));
                for j in 0..stations {
                    s.push_str(&format!(",{}", h as f64 + j as f64));
                }
                s.push('\n');
            }
        }
        s
    }

    #[test]
    fn daily_rows_are_parsed() {
        let text = "2020,1,1,1.5,2.0\n2020,1,2,0,-9999\n\n2020,1,4, 3 ,4\n";
        let recs = parse_daily(text.as_bytes(), 2).unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[1].values, vec![0.0, -9999.0]);
        assert_eq!(recs[2].date, NaiveDate::from_ymd_opt(2020, 1, 4).unwrap());
    }

    #[test]
    fn daily_column_mismatch_names_the_line() {
        let text = "2020,1,1,1.5,2.0\n2020,1,2,0\n";
        let err = parse_daily(text.as_bytes(), 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(err.message().contains("line 2"), "{}", err.message());
    }

    #[test]
    fn daily_dates_must_increase() {
        let text = "2020,1,2,1\n2020,1,1,1\n";
        assert!(parse_daily(text.as_bytes(), 1).is_err());
        let text = "2020,2,30,1\n";
        assert!(parse_daily(text.as_bytes(), 1).is_err());
    }

    #[test]
    fn hourly_days_are_grouped_and_aggregated() {
        let text = hourly_text(&[(2020, 6, 1), (2020, 6, 2)], 2);
        let recs = parse_hourly(text.as_bytes(), 2, Variable::Temperature).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].hourly[(1, 5)], 6.0);
        // mean of 0..23 = 11.5
        assert!((recs[0].daily[0] - 11.5).abs() < 1e-12);
        assert!((recs[0].daily[1] - 12.5).abs() < 1e-12);
    }

    #[test]
    fn incomplete_hourly_day_is_rejected() {
        let mut text = hourly_text(&[(2020, 6, 1)], 1);
        text.push_str("2020,6,2,0,1.0\n");
        let err = parse_hourly(text.as_bytes(), 1, Variable::Wind).unwrap_err();
        assert!(err.message().contains("1 of 24"), "{}", err.message());
    }

    #[test]
    fn duplicate_hour_is_rejected() {
        let text = hourly_text(&[(2020, 6, 1)], 1).replacen("2020,6,1,1,", "2020,6,1,0,", 1);
        let err = parse_hourly(text.as_bytes(), 1, Variable::Wind).unwrap_err();
        assert!(err.message().contains("appears twice"));
    }

    #[test]
    fn circulation_rows_are_parsed() {
        let text = "2020,1,1,3\n2020,1,2,1\n";
        let series = parse_circulation(text.as_bytes()).unwrap();
        assert_eq!(series.class_count(), 3);
        assert_eq!(series.lookup(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()).unwrap(), 1);
        assert!(parse_circulation("2020,1,1,-1\n".as_bytes()).is_err());
    }

    #[test]
    fn file_errors_carry_the_path() {
        let err = read_daily(Path::new("/nonexistent/daily.csv"), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.message().contains("daily.csv"));
    }
}
