//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays free of layout
//! concerns and output changes stay local.

use crate::domain::GlobalParams;
use crate::mof::{HourlyMaxima, RunStats};

use super::SeriesSummary;

/// Parameters in effect, one per line.
pub fn format_params(params: &GlobalParams) -> String {
    let c = &params.config;
    let p = &params.paths;
    let mut out = String::new();

    out.push_str("=== mof - method-of-fragments disaggregation ===\n");
    out.push_str(&format!(
        "Variable: {} (VAR={})\n",
        c.variable.display_name(),
        c.variable.code()
    ));
    out.push_str(&format!("Stations: {}\n", c.n_stations));
    out.push_str(&format!("Classes: {}\n", describe_classes(params)));
    out.push_str(&format!(
        "Continuity: {} day(s) (radius {})\n",
        c.continuity,
        c.skip()
    ));
    out.push_str(&format!(
        "SSIM: k={} power={} nodata={}\n",
        fmt_vec(&c.ssim.k),
        fmt_vec(&c.ssim.power),
        c.ssim.nodata
    ));
    out.push_str(&format!(
        "Runs: {} | seed: {} | preprocess: {:?} | parallel: {}\n",
        c.runs, c.seed, c.preprocess, c.parallel
    ));

    out.push_str("\nFiles:\n");
    out.push_str(&format!("- daily : {}\n", p.daily.display()));
    out.push_str(&format!("- hourly: {}\n", p.hourly.display()));
    if let Some(cp) = &p.circulation {
        out.push_str(&format!("- cp    : {}\n", cp.display()));
    }
    out.push_str(&format!("- output: {}\n", p.output.display()));
    if let Some(ssim) = &p.diagnostics {
        out.push_str(&format!("- ssim  : {}\n", ssim.display()));
    }
    if let Some(log) = &p.log {
        out.push_str(&format!("- log   : {}\n", log.display()));
    }
    out
}

fn describe_classes(params: &GlobalParams) -> String {
    let cls = &params.config.classification;
    let mut parts = Vec::new();
    if cls.by_month {
        parts.push("month".to_string());
    }
    if cls.by_season {
        parts.push(format!("season (summer {}..={})", cls.summer_from, cls.summer_to));
    }
    if cls.circulation {
        parts.push("circulation pattern".to_string());
    }
    if parts.is_empty() {
        "none (single class)".to_string()
    } else {
        parts.join(" x ")
    }
}

/// One block per series: extent and a class-count table.
pub fn format_series(series: &[SeriesSummary]) -> String {
    let mut out = String::new();
    for s in series {
        let range = match (s.first, s.last) {
            (Some(a), Some(b)) => format!("{a} .. {b}"),
            _ => "-".to_string(),
        };
        out.push_str(&format!(
            "{}: {} days, {} | {} of {} classes populated\n",
            s.label,
            s.days,
            range,
            s.populated_classes(),
            s.class_counts.len()
        ));
    }

    if series.is_empty() {
        return out;
    }

    out.push('\n');
    let mut header = format!("{:>6}", "class");
    for s in series {
        header.push_str(&format!(" {:>8}", s.label));
    }
    out.push_str(header.trim_end());
    out.push('\n');

    let n_classes = series.iter().map(|s| s.class_counts.len()).max().unwrap_or(0);
    for class in 0..n_classes {
        let counts: Vec<usize> = series
            .iter()
            .map(|s| s.class_counts.get(class).copied().unwrap_or(0))
            .collect();
        if counts.iter().all(|c| *c == 0) {
            continue;
        }
        let mut row = format!("{class:>6}");
        for c in counts {
            row.push_str(&format!(" {c:>8}"));
        }
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// First `max_classes` columns of the station x class maxima table.
pub fn format_maxima_preview(maxima: &HourlyMaxima, max_classes: usize) -> String {
    let shown = maxima.n_classes().min(max_classes);
    let mut out = String::new();
    out.push_str(&format!(
        "Hourly maxima ({} stations x {} classes, first {} shown):\n",
        maxima.n_stations(),
        maxima.n_classes(),
        shown
    ));

    let mut header = format!("{:>8}", "station");
    for class in 0..shown {
        header.push_str(&format!(" {class:>8}"));
    }
    out.push_str(&header);
    out.push('\n');

    for j in 0..maxima.n_stations() {
        let mut row = format!("{:>8}", j + 1);
        for class in 0..shown {
            let v = maxima.get(j, class).unwrap_or(0.0);
            row.push_str(&format!(" {v:>8.1}"));
        }
        out.push_str(&row);
        out.push('\n');
    }
    out
}

pub fn format_run_stats(stats: &RunStats, runs: usize) -> String {
    let pools = match (stats.min_pool, stats.max_pool) {
        (Some(lo), Some(hi)) => format!("{lo}..{hi}"),
        _ => "-".to_string(),
    };
    format!(
        "Disaggregated {} days ({} dark) x {} runs -> {} rows | candidate pool size {}\n",
        stats.days, stats.dark_days, runs, stats.rows, pools
    )
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x}")).collect();
    format!("[{}]", parts.join(", "))
}
