use lexmask_core::{Lexicality, TrialRecord, TrialResult, duration_from_secs};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Inclusive bounds, in seconds, for a plausible reaction time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanWindow {
    pub min: f64,
    pub max: f64,
}

impl CleanWindow {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, rt: f64) -> bool {
        rt >= self.min && rt <= self.max
    }
}

impl Default for CleanWindow {
    fn default() -> Self {
        Self::new(0.2, 2.0)
    }
}

impl From<(f64, f64)> for CleanWindow {
    fn from((min, max): (f64, f64)) -> Self {
        Self::new(min, max)
    }
}

/// The part of a trial the aggregator looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub lexicality: Lexicality,
    pub duration: Duration,
    pub responded: bool,
    /// Seconds.
    pub rt: Option<f64>,
    pub correct: bool,
}

impl Observation {
    pub fn is_clean(&self, window: &CleanWindow) -> bool {
        self.responded && self.rt.is_some_and(|rt| window.contains(rt))
    }
}

impl From<&TrialResult> for Observation {
    fn from(result: &TrialResult) -> Self {
        Self {
            lexicality: result.lexicality,
            duration: result.duration,
            responded: result.decision.is_some(),
            rt: result.rt_secs(),
            correct: result.is_correct(),
        }
    }
}

impl From<&TrialRecord> for Observation {
    fn from(record: &TrialRecord) -> Self {
        Self {
            lexicality: record.lexicality,
            duration: duration_from_secs(record.duration),
            responded: record.decision.is_some(),
            rt: record.rt,
            correct: record.accuracy == 1,
        }
    }
}

/// Sample size, accuracy and reaction time of one partition. Accuracy and RT
/// are `None` when there is nothing to average.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SummaryCell {
    pub n: usize,
    pub accuracy: Option<f64>,
    /// Mean RT of accurate trials, seconds.
    pub mean_rt: Option<f64>,
    pub median_rt: Option<f64>,
}

impl SummaryCell {
    pub fn from_observations<'a>(observations: impl IntoIterator<Item = &'a Observation>) -> Self {
        let mut n = 0;
        let mut correct = 0;
        let mut rts = Vec::new();
        for obs in observations {
            n += 1;
            if obs.correct {
                correct += 1;
                rts.extend(obs.rt);
            }
        }
        if n == 0 {
            return Self::default();
        }
        Self {
            n,
            accuracy: Some(correct as f64 / n as f64),
            mean_rt: mean(&rts),
            median_rt: median(&mut rts),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    pub cells: BTreeMap<(Lexicality, Duration), SummaryCell>,
    pub by_lexicality: BTreeMap<Lexicality, SummaryCell>,
    pub by_duration: BTreeMap<Duration, SummaryCell>,
    /// Observations given, before filtering.
    pub total: usize,
    /// Observations dropped by the clean window.
    pub excluded: usize,
}

/// One flattened summary line. A missing key means the cell collapses over it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub lexicality: Option<Lexicality>,
    /// Seconds.
    pub duration: Option<f64>,
    #[serde(flatten)]
    pub cell: SummaryCell,
}

impl Summary {
    pub fn cell(&self, lexicality: Lexicality, duration: Duration) -> Option<&SummaryCell> {
        self.cells.get(&(lexicality, duration))
    }

    /// Cross-product cells first, then lexicality marginals, then duration
    /// marginals.
    pub fn rows(&self) -> Vec<SummaryRow> {
        let cells = self.cells.iter().map(|(&(lex, dur), cell)| SummaryRow {
            lexicality: Some(lex),
            duration: Some(dur.as_secs_f64()),
            cell: *cell,
        });
        let by_lex = self.by_lexicality.iter().map(|(&lex, cell)| SummaryRow {
            lexicality: Some(lex),
            duration: None,
            cell: *cell,
        });
        let by_dur = self.by_duration.iter().map(|(&dur, cell)| SummaryRow {
            lexicality: None,
            duration: Some(dur.as_secs_f64()),
            cell: *cell,
        });
        cells.chain(by_lex).chain(by_dur).collect()
    }
}

/// The one aggregation routine every consumer calls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregator {
    window: Option<CleanWindow>,
    durations: Vec<Duration>,
}

impl Aggregator {
    pub fn new(window: Option<CleanWindow>) -> Self {
        Self {
            window,
            durations: Vec::new(),
        }
    }

    /// Design durations that get a cell even when nothing was observed.
    pub fn with_durations(mut self, durations: impl IntoIterator<Item = Duration>) -> Self {
        self.durations.extend(durations);
        self
    }

    pub fn window(&self) -> Option<CleanWindow> {
        self.window
    }

    pub fn summarize<'a>(&self, observations: impl IntoIterator<Item = &'a Observation>) -> Summary {
        let all: Vec<&Observation> = observations.into_iter().collect();
        let durations: BTreeSet<Duration> = all
            .iter()
            .map(|o| o.duration)
            .chain(self.durations.iter().copied())
            .collect();
        let kept: Vec<&Observation> = match &self.window {
            Some(window) => all.iter().copied().filter(|o| o.is_clean(window)).collect(),
            None => all.clone(),
        };

        let mut summary = Summary {
            total: all.len(),
            excluded: all.len() - kept.len(),
            ..Summary::default()
        };
        for lex in Lexicality::ALL {
            for &dur in &durations {
                let cell = SummaryCell::from_observations(
                    kept.iter().copied().filter(|o| o.lexicality == lex && o.duration == dur),
                );
                summary.cells.insert((lex, dur), cell);
            }
            summary.by_lexicality.insert(
                lex,
                SummaryCell::from_observations(kept.iter().copied().filter(|o| o.lexicality == lex)),
            );
        }
        for &dur in &durations {
            summary.by_duration.insert(
                dur,
                SummaryCell::from_observations(kept.iter().copied().filter(|o| o.duration == dur)),
            );
        }
        summary
    }
}
