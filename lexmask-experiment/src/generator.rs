use crate::config::ExperimentConfig;
use lexmask_core::{Lexicality, StimulusItem, TrialSpec};
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, warn};

/// Shuffle constraints for the main block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Design {
    pub repetitions: usize,
    pub max_run: usize,
    pub max_attempts: usize,
}

impl Design {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            repetitions: config.design.repetitions,
            max_run: config.design.max_run,
            max_attempts: config.design.shuffle_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialSequence {
    pub trials: Vec<TrialSpec>,
    /// Shuffles performed, including the accepted one.
    pub attempts: usize,
    pub constraint_satisfied: bool,
}

/// Builds the full factorial `repetitions x durations x catalog` and shuffles
/// it until no lexicality run exceeds `design.max_run`, giving up after
/// `design.max_attempts` and keeping the last order.
pub fn generate_main<R: Rng + ?Sized>(
    catalog: &[StimulusItem],
    durations: &[Duration],
    design: Design,
    rng: &mut R,
) -> TrialSequence {
    let mut trials: Vec<TrialSpec> = Vec::with_capacity(catalog.len() * durations.len() * design.repetitions);
    for _ in 0..design.repetitions {
        for &duration in durations {
            for item in catalog {
                trials.push(TrialSpec {
                    index: 0,
                    stimulus: item.text.clone(),
                    lexicality: item.lexicality,
                    duration,
                });
            }
        }
    }

    let max_attempts = design.max_attempts.max(1);
    let mut attempts = 0;
    let mut satisfied = false;
    while attempts < max_attempts {
        attempts += 1;
        trials.shuffle(rng);
        if satisfies_run_limit(&trials, design.max_run) {
            satisfied = true;
            break;
        }
    }

    if satisfied {
        debug!(attempts, trials = trials.len(), "main sequence generated");
    } else {
        warn!(
            attempts,
            max_run = design.max_run,
            longest = longest_run(&trials),
            "run-length constraint not met, keeping last shuffle"
        );
    }

    assign_indices(&mut trials);
    TrialSequence {
        trials,
        attempts,
        constraint_satisfied: satisfied,
    }
}

/// Practice sequence: first half of the catalog at the shortest duration,
/// second half at the longest, shuffled without run constraints.
pub fn generate_practice<R: Rng + ?Sized>(
    catalog: &[StimulusItem],
    durations: &[Duration],
    rng: &mut R,
) -> Vec<TrialSpec> {
    let (Some(&shortest), Some(&longest)) = (durations.iter().min(), durations.iter().max()) else {
        return Vec::new();
    };
    let half = catalog.len() / 2;
    let mut trials: Vec<TrialSpec> = catalog
        .iter()
        .enumerate()
        .map(|(i, item)| TrialSpec {
            index: 0,
            stimulus: item.text.clone(),
            lexicality: item.lexicality,
            duration: if i < half { shortest } else { longest },
        })
        .collect();
    trials.shuffle(rng);
    assign_indices(&mut trials);
    trials
}

fn assign_indices(trials: &mut [TrialSpec]) {
    for (index, trial) in trials.iter_mut().enumerate() {
        trial.index = index;
    }
}

/// Length of the longest run of consecutive trials sharing a lexicality.
pub fn longest_run(trials: &[TrialSpec]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut last: Option<Lexicality> = None;
    for trial in trials {
        if last == Some(trial.lexicality) {
            current += 1;
        } else {
            current = 1;
            last = Some(trial.lexicality);
        }
        longest = longest.max(current);
    }
    longest
}

pub fn satisfies_run_limit(trials: &[TrialSpec], max_run: usize) -> bool {
    longest_run(trials) <= max_run
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn catalog(words: usize, pseudowords: usize) -> Vec<StimulusItem> {
        (0..words)
            .map(|i| StimulusItem::word(format!("w{i}")))
            .chain((0..pseudowords).map(|i| StimulusItem::pseudoword(format!("p{i}"))))
            .collect()
    }

    fn durations() -> Vec<Duration> {
        vec![Duration::from_millis(40), Duration::from_millis(200)]
    }

    fn design(repetitions: usize) -> Design {
        Design {
            repetitions,
            max_run: 3,
            max_attempts: 1000,
        }
    }

    #[test]
    fn default_catalog_yields_forty_trials() {
        let config = ExperimentConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let seq = generate_main(&config.catalog(), &config.durations, Design::from_config(&config), &mut rng);
        assert_eq!(seq.trials.len(), 40);
        assert!(seq.constraint_satisfied);
        assert!(longest_run(&seq.trials) <= 3);
        let indices: Vec<usize> = seq.trials.iter().map(|t| t.index).collect();
        assert_eq!(indices, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn impossible_constraint_is_accepted_after_cap() {
        let mut rng = StdRng::seed_from_u64(1);
        let seq = generate_main(
            &catalog(5, 0),
            &durations(),
            Design {
                repetitions: 1,
                max_run: 2,
                max_attempts: 25,
            },
            &mut rng,
        );
        assert!(!seq.constraint_satisfied);
        assert_eq!(seq.attempts, 25);
        assert_eq!(seq.trials.len(), 10);
    }

    #[test]
    fn practice_splits_durations_by_catalog_half() {
        let config = ExperimentConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let practice = generate_practice(&config.practice_catalog(), &config.durations, &mut rng);
        assert_eq!(practice.len(), 6);
        for trial in &practice {
            let expected = if ["house", "river", "bread"].contains(&trial.stimulus.as_str()) {
                Duration::from_millis(40)
            } else {
                Duration::from_millis(200)
            };
            assert_eq!(trial.duration, expected, "{}", trial.stimulus);
        }
    }

    #[test]
    fn run_length_counts_consecutive_lexicality() {
        let lex = [
            Lexicality::Word,
            Lexicality::Word,
            Lexicality::Pseudoword,
            Lexicality::Pseudoword,
            Lexicality::Pseudoword,
            Lexicality::Word,
        ];
        let trials: Vec<TrialSpec> = lex
            .iter()
            .enumerate()
            .map(|(index, &lexicality)| TrialSpec {
                index,
                stimulus: format!("s{index}"),
                lexicality,
                duration: Duration::from_millis(40),
            })
            .collect();
        assert_eq!(longest_run(&trials), 3);
        assert!(satisfies_run_limit(&trials, 3));
        assert!(!satisfies_run_limit(&trials, 2));
        assert_eq!(longest_run(&[]), 0);
    }

    proptest! {
        #[test]
        fn factorial_is_complete(words in 1usize..8, pseudowords in 1usize..8, reps in 1usize..4, seed: u64) {
            let items = catalog(words, pseudowords);
            let mut rng = StdRng::seed_from_u64(seed);
            let seq = generate_main(&items, &durations(), design(reps), &mut rng);

            prop_assert_eq!(seq.trials.len(), (words + pseudowords) * 2 * reps);
            let mut counts: HashMap<(String, Duration), usize> = HashMap::new();
            for trial in &seq.trials {
                *counts.entry((trial.stimulus.clone(), trial.duration)).or_default() += 1;
            }
            prop_assert_eq!(counts.len(), (words + pseudowords) * 2);
            prop_assert!(counts.values().all(|&n| n == reps));
            if seq.constraint_satisfied {
                prop_assert!(longest_run(&seq.trials) <= 3);
            }
        }
    }
}
