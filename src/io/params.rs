//! Parameter file parsing.
//!
//! The file is a list of `KEY,VALUE` lines:
//!
//! ```text
//! # air temperature, 3 stations
//! VAR,0
//! N_STATION,3
//! FP_DAILY,daily.csv
//! FP_HOURLY,hourly.csv
//! FP_OUT,out.csv
//! SEASON,TRUE
//! CONTINUITY,3
//! SSIM_K,0.01,0.03,0.03
//! ```
//!
//! Blank lines are ignored and `#` starts a comment. Relative paths resolve
//! against the directory of the parameter file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::domain::{
    ClassificationConfig, DisaggConfig, GlobalParams, IoPaths, Preprocess, SsimParams, Variable,
};
use crate::error::AppError;

const KNOWN_KEYS: &[&str] = &[
    "VAR",
    "N_STATION",
    "FP_DAILY",
    "FP_HOURLY",
    "FP_CP",
    "FP_OUT",
    "FP_LOG",
    "FP_SSIM",
    "T_CP",
    "MONTH",
    "SEASON",
    "SUMMER_FROM",
    "SUMMER_TO",
    "CONTINUITY",
    "SSIM_K",
    "SSIM_POWER",
    "NODATA",
    "RUN",
    "PREPROCESS",
    "SEED",
];

/// Read and validate a parameter file.
pub fn load_params(path: &Path) -> Result<GlobalParams, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::io(format!("failed to read parameter file '{}': {e}", path.display()))
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse_params(&text, base)
}

/// Parse parameter text; relative paths are joined onto `base`.
pub fn parse_params(text: &str, base: &Path) -> Result<GlobalParams, AppError> {
    let entries = parse_entries(text)?;
    let p = Entries { entries: &entries };

    let variable = {
        let (line, raw) = p.required("VAR")?;
        Variable::parse(raw).ok_or_else(|| {
            AppError::config(format!("line {line}: VAR '{raw}' is not a known variable (0-6)"))
        })?
    };
    let n_stations = p.parse_required::<usize>("N_STATION")?;

    let classification = ClassificationConfig {
        by_month: p.flag("MONTH")?.unwrap_or(false),
        by_season: p.flag("SEASON")?.unwrap_or(false),
        summer_from: p.parse_optional::<u32>("SUMMER_FROM")?.unwrap_or(5),
        summer_to: p.parse_optional::<u32>("SUMMER_TO")?.unwrap_or(9),
        circulation: p.flag("T_CP")?.unwrap_or(false),
    };

    let defaults = SsimParams::default();
    let ssim = SsimParams {
        k: p.triple("SSIM_K")?.unwrap_or(defaults.k),
        power: p.triple("SSIM_POWER")?.unwrap_or(defaults.power),
        nodata: p.parse_optional::<f64>("NODATA")?.unwrap_or(defaults.nodata),
    };

    let preprocess = match p.parse_optional::<i64>("PREPROCESS")? {
        None => Preprocess::None,
        Some(code) => Preprocess::from_code(code).ok_or_else(|| {
            AppError::config(format!("PREPROCESS must be 0, 1 or 2 (got {code})"))
        })?,
    };

    let mut config = DisaggConfig::new(variable, n_stations);
    config.classification = classification;
    config.continuity = p.parse_optional::<usize>("CONTINUITY")?.unwrap_or(1);
    config.ssim = ssim;
    config.runs = p.parse_optional::<usize>("RUN")?.unwrap_or(1);
    config.preprocess = preprocess;
    if let Some(seed) = p.parse_optional::<u64>("SEED")? {
        config.seed = seed;
    }
    config.validate()?;

    let resolve = |raw: &str| -> PathBuf {
        let path = PathBuf::from(raw);
        if path.is_absolute() { path } else { base.join(path) }
    };
    let required_path = |key: &str| -> Result<PathBuf, AppError> {
        p.required(key).map(|(_, raw)| resolve(raw))
    };
    let optional_path = |key: &str| -> Option<PathBuf> {
        p.get(key)
            .filter(|(_, raw)| !raw.is_empty() && !raw.eq_ignore_ascii_case("FALSE"))
            .map(|(_, raw)| resolve(raw))
    };

    let paths = IoPaths {
        daily: required_path("FP_DAILY")?,
        hourly: required_path("FP_HOURLY")?,
        circulation: optional_path("FP_CP"),
        output: required_path("FP_OUT")?,
        log: optional_path("FP_LOG"),
        diagnostics: optional_path("FP_SSIM"),
    };

    if config.classification.circulation && paths.circulation.is_none() {
        return Err(AppError::config(
            "T_CP is TRUE but no circulation pattern file (FP_CP) is given",
        ));
    }

    debug!("parsed {} parameter entries", entries.len());
    Ok(GlobalParams { paths, config })
}

/// `KEY -> (line, raw value)`; the value keeps any embedded commas.
fn parse_entries(text: &str) -> Result<HashMap<String, (usize, String)>, AppError> {
    let mut entries = HashMap::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let content = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        }
        .trim();
        if content.is_empty() {
            continue;
        }

        let Some((key, value)) = content.split_once(',') else {
            return Err(AppError::config(format!(
                "line {line}: expected KEY,VALUE but found '{content}'"
            )));
        };
        let key = key.trim();
        if !KNOWN_KEYS.contains(&key) {
            return Err(AppError::config(format!("line {line}: unknown key '{key}'")));
        }
        if entries
            .insert(key.to_string(), (line, value.trim().to_string()))
            .is_some()
        {
            return Err(AppError::config(format!("line {line}: key '{key}' is given twice")));
        }
    }
    Ok(entries)
}

struct Entries<'a> {
    entries: &'a HashMap<String, (usize, String)>,
}

impl<'a> Entries<'a> {
    fn get(&self, key: &str) -> Option<(usize, &'a str)> {
        self.entries.get(key).map(|(l, v)| (*l, v.as_str()))
    }

    fn required(&self, key: &str) -> Result<(usize, &'a str), AppError> {
        self.get(key)
            .ok_or_else(|| AppError::config(format!("missing required key {key}")))
    }

    fn parse_optional<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.get(key) {
            None => Ok(None),
            Some((line, raw)) => raw.parse::<T>().map(Some).map_err(|_| {
                AppError::config(format!("line {line}: {key} has invalid value '{raw}'"))
            }),
        }
    }

    fn parse_required<T: std::str::FromStr>(&self, key: &str) -> Result<T, AppError> {
        self.parse_optional(key)?
            .ok_or_else(|| AppError::config(format!("missing required key {key}")))
    }

    /// `TRUE` / `FALSE` (case-insensitive); `1` / `0` also accepted.
    fn flag(&self, key: &str) -> Result<Option<bool>, AppError> {
        let Some((line, raw)) = self.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_uppercase().as_str() {
            "TRUE" | "1" => Ok(Some(true)),
            "FALSE" | "0" => Ok(Some(false)),
            _ => Err(AppError::config(format!(
                "line {line}: {key} must be TRUE or FALSE (got '{raw}')"
            ))),
        }
    }

    fn triple(&self, key: &str) -> Result<Option<[f64; 3]>, AppError> {
        let Some((line, raw)) = self.get(key) else {
            return Ok(None);
        };
        let values: Vec<f64> = raw
            .split(',')
            .map(|s| s.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| AppError::config(format!("line {line}: {key} has invalid value '{raw}'")))?;
        match values.as_slice() {
            [a, b, c] => Ok(Some([*a, *b, *c])),
            _ => Err(AppError::config(format!(
                "line {line}: {key} needs exactly 3 values (got {})",
                values.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const MINIMAL: &str = "\
VAR,2
N_STATION,3
FP_DAILY,daily.csv
FP_HOURLY,/data/hourly.csv
FP_OUT,out/result.csv
";

    #[test]
    fn minimal_file_gets_defaults() {
        let p = parse_params(MINIMAL, Path::new("/work")).unwrap();
        assert_eq!(p.config.variable, Variable::Pressure);
        assert_eq!(p.config.n_stations, 3);
        assert_eq!(p.config.continuity, 1);
        assert_eq!(p.config.runs, 1);
        assert_eq!(p.config.seed, 42);
        assert_eq!(p.config.ssim, SsimParams::default());
        assert_eq!(p.config.classification, ClassificationConfig::default());
        assert_eq!(p.paths.daily, PathBuf::from("/work/daily.csv"));
        assert_eq!(p.paths.hourly, PathBuf::from("/data/hourly.csv"));
        assert_eq!(p.paths.output, PathBuf::from("/work/out/result.csv"));
        assert!(p.paths.diagnostics.is_none());
    }

    #[test]
    fn full_file_is_parsed() {
        let text = format!(
            "{MINIMAL}\
# conditioning
SEASON,TRUE   # summer = May..Aug
SUMMER_FROM,5
SUMMER_TO,8
T_CP,TRUE
FP_CP,cp.csv
CONTINUITY,5
SSIM_K,0.02, 0.04 ,0.05
SSIM_POWER,1,0.5,2
NODATA,-999
RUN,10
PREPROCESS,2
SEED,7
FP_SSIM,FALSE
FP_LOG,run.log
"
        );
        let p = parse_params(&text, Path::new("base")).unwrap();
        let c = &p.config;
        assert!(c.classification.by_season && c.classification.circulation);
        assert_eq!(c.classification.summer_to, 8);
        assert_eq!(c.skip(), 2);
        assert_eq!(c.ssim.k, [0.02, 0.04, 0.05]);
        assert_eq!(c.ssim.power, [1.0, 0.5, 2.0]);
        assert_eq!(c.ssim.nodata, -999.0);
        assert_eq!(c.runs, 10);
        assert_eq!(c.preprocess, Preprocess::Standardize);
        assert_eq!(c.seed, 7);
        assert_eq!(p.paths.circulation, Some(PathBuf::from("base/cp.csv")));
        assert_eq!(p.paths.log, Some(PathBuf::from("base/run.log")));
        assert!(p.paths.diagnostics.is_none());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = parse_params(&format!("{MINIMAL}FOO,1\n"), Path::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().contains("line 6"));
    }

    #[test]
    fn month_and_season_together_is_rejected() {
        let text = format!("{MINIMAL}MONTH,TRUE\nSEASON,TRUE\n");
        let err = parse_params(&text, Path::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn circulation_without_file_is_rejected() {
        let err = parse_params(&format!("{MINIMAL}T_CP,TRUE\n"), Path::new("")).unwrap_err();
        assert!(err.message().contains("FP_CP"));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let err = parse_params("VAR,1\nN_STATION,2\n", Path::new("")).unwrap_err();
        assert!(err.message().contains("FP_DAILY"));
    }

    #[test]
    fn ssim_k_needs_three_values() {
        let err = parse_params(&format!("{MINIMAL}SSIM_K,0.1,0.2\n"), Path::new("")).unwrap_err();
        assert!(err.message().contains("exactly 3"));
    }

    #[test]
    fn bad_variable_code_is_rejected() {
        let text = MINIMAL.replace("VAR,2", "VAR,9");
        assert!(parse_params(&text, Path::new("")).is_err());
    }
}
