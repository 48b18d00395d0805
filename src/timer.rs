//! Per-operation timing. A `Span` is carried through one operation and handed
//! to `Timings`, which aggregates samples by segment name.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

pub struct Span {
    start: Instant,
    last: Instant,
    segments: Vec<(&'static str, Duration)>,
}

impl Span {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            segments: Vec::new(),
        }
    }

    /// Close the segment running since the previous call (or since start).
    pub fn segment(&mut self, name: &'static str) {
        let now = Instant::now();
        self.segments.push((name, now - self.last));
        self.last = now;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN below two samples.
    pub stdev: f64,
    pub first: Vec<f64>,
    pub last: Vec<f64>,
}

impl fmt::Display for SegmentStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |v: &[f64]| v.iter().map(|s| format!("{:.2}s", s)).collect::<Vec<_>>().join(", ");
        write!(
            f,
            "{}: [{} ... {}] {} calls, {:.2}s mean, {:.2}s stdev",
            self.name,
            join(&self.first),
            join(&self.last),
            self.count,
            self.mean,
            self.stdev
        )
    }
}

#[derive(Default)]
pub struct Timings {
    quiet: bool,
    records: HashMap<&'static str, Vec<f64>>,
    order: Vec<&'static str>,
}

impl Timings {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            ..Self::default()
        }
    }

    pub fn record(&mut self, span: Span) {
        let total = span.elapsed();
        for (name, taken) in span.segments.into_iter().chain(std::iter::once(("total", total))) {
            let secs = taken.as_secs_f64();
            if self.quiet {
                log::trace!("{:.3}s {}", secs, name);
            } else {
                log::debug!("{:.3}s {}", secs, name);
            }
            if !self.records.contains_key(name) {
                self.order.push(name);
            }
            self.records.entry(name).or_default().push(secs);
        }
    }

    pub fn report(&self) -> Vec<SegmentStats> {
        let mut order: Vec<&'static str> = self.order.iter().copied().filter(|n| *n != "total").collect();
        if self.records.contains_key("total") {
            order.push("total");
        }
        order
            .into_iter()
            .map(|name| {
                let samples = &self.records[name];
                let count = samples.len();
                let mean = samples.iter().sum::<f64>() / count as f64;
                let stdev = if count > 1 {
                    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
                    var.sqrt()
                } else {
                    f64::NAN
                };
                SegmentStats {
                    name: name.to_string(),
                    count,
                    mean,
                    stdev,
                    first: samples.iter().take(5).copied().collect(),
                    last: samples[count.saturating_sub(5)..].to_vec(),
                }
            })
            .collect()
    }

    pub fn log_report(&self) {
        for stats in self.report() {
            log::info!("{}", stats);
        }
    }
}
