use statrs::distribution::{Beta, Continuous};

use crate::config::{DENSITY_SAMPLES, REWARD_THRESHOLD};
use crate::log_reader::Observation;

/// Beta(α, β) pseudo-counts, starting from the uniform prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetaState {
    pub alpha: u64,
    pub beta: u64,
}

impl Default for BetaState {
    fn default() -> Self {
        BetaState { alpha: 1, beta: 1 }
    }
}

impl BetaState {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn update(&mut self, reward: f64, threshold: f64) {
        if reward >= threshold {
            self.alpha += 1;
        } else {
            self.beta += 1;
        }
    }

    pub fn from_rewards(rewards: impl IntoIterator<Item = f64>, threshold: f64) -> Self {
        let mut state = Self::new();
        for reward in rewards {
            state.update(reward, threshold);
        }
        state
    }

    pub fn mean(&self) -> f64 {
        self.alpha as f64 / (self.alpha + self.beta) as f64
    }

    /// Density sampled at `samples` evenly spaced points over [0, 1].
    pub fn density(&self, samples: usize) -> Vec<(f64, f64)> {
        let dist = match Beta::new(self.alpha as f64, self.beta as f64) {
            Ok(dist) => dist,
            Err(err) => {
                log::warn!("invalid Beta({}, {}): {}", self.alpha, self.beta, err);
                return Vec::new();
            }
        };
        let last = samples.saturating_sub(1).max(1) as f64;
        (0..samples)
            .map(|i| {
                let x = i as f64 / last;
                let y = dist.pdf(x);
                (x, if y.is_finite() { y } else { 0.0 })
            })
            .collect()
    }
}

/// What the renderer draws for one (key, value) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSeries {
    Density { state: BetaState, points: Vec<(f64, f64)> },
    Trajectory { points: Vec<(f64, f64)> },
}

impl RenderSeries {
    pub fn points(&self) -> &[(f64, f64)] {
        match self {
            RenderSeries::Density { points, .. } => points,
            RenderSeries::Trajectory { points } => points,
        }
    }
}

/// Turns the observations of one (key, value) pair into something drawable.
pub trait UpdateRule {
    fn series(&self, observations: &[&Observation]) -> RenderSeries;
}

/// Replays rewards through the Beta update and keeps only the final density.
#[derive(Debug, Clone)]
pub struct DensityUpdateRule {
    pub threshold: f64,
    pub samples: usize,
}

impl Default for DensityUpdateRule {
    fn default() -> Self {
        DensityUpdateRule {
            threshold: REWARD_THRESHOLD,
            samples: DENSITY_SAMPLES,
        }
    }
}

impl UpdateRule for DensityUpdateRule {
    fn series(&self, observations: &[&Observation]) -> RenderSeries {
        // a missing reward never reaches the threshold
        let rewards = observations.iter().map(|o| o.reward.unwrap_or(f64::NAN));
        let state = BetaState::from_rewards(rewards, self.threshold);
        RenderSeries::Density {
            state,
            points: state.density(self.samples),
        }
    }
}

/// Which iteration counter an EMA trajectory is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationAxis {
    /// Row position in the whole log.
    Global,
    /// Row position among rows of the same key.
    PerKey,
}

/// Exposes the logged EMA values unchanged.
#[derive(Debug, Clone)]
pub struct SeriesPassthroughRule {
    pub axis: IterationAxis,
    /// Inclusive upper bound on the iteration.
    pub max_iter: Option<u64>,
    /// Plot unparsable priors as 0.0 instead of dropping them.
    pub fill_missing: bool,
}

impl UpdateRule for SeriesPassthroughRule {
    fn series(&self, observations: &[&Observation]) -> RenderSeries {
        let points = observations
            .iter()
            .filter_map(|o| {
                let iter = match self.axis {
                    IterationAxis::Global => o.global_iter,
                    IterationAxis::PerKey => o.key_iter,
                };
                if self.max_iter.is_some_and(|max| iter > max) {
                    return None;
                }
                let prior = match o.new_prior {
                    Some(p) => p,
                    None if self.fill_missing => 0.0,
                    None => return None,
                };
                Some((iter as f64, prior))
            })
            .collect();
        RenderSeries::Trajectory { points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(reward: Option<f64>, prior: Option<f64>, global_iter: u64, key_iter: u64) -> Observation {
        Observation {
            key: "k".into(),
            value: "v".into(),
            reward,
            new_prior: prior,
            mode: "ema".into(),
            timestamp: global_iter.to_string(),
            global_iter,
            key_iter,
        }
    }

    #[test]
    fn rewards_update_counts() {
        let state = BetaState::from_rewards([0.9, 0.1, 0.6], 0.5);
        assert_eq!(state, BetaState { alpha: 3, beta: 2 });
    }

    #[test]
    fn threshold_is_inclusive() {
        let state = BetaState::from_rewards([0.5], 0.5);
        assert_eq!(state, BetaState { alpha: 2, beta: 1 });
    }

    #[test]
    fn final_counts_ignore_order() {
        let a = BetaState::from_rewards([0.9, 0.1, 0.6, 0.2], 0.5);
        let b = BetaState::from_rewards([0.2, 0.6, 0.1, 0.9], 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn missing_reward_counts_as_failure() {
        let rows = [obs(None, None, 0, 0), obs(Some(0.8), None, 1, 1)];
        let refs: Vec<&Observation> = rows.iter().collect();
        let RenderSeries::Density { state, .. } = DensityUpdateRule::default().series(&refs) else {
            panic!("expected density");
        };
        assert_eq!(state, BetaState { alpha: 2, beta: 2 });
    }

    #[test]
    fn no_observations_is_uniform() {
        let series = DensityUpdateRule::default().series(&[]);
        let RenderSeries::Density { state, points } = series else {
            panic!("expected density");
        };
        assert_eq!(state, BetaState::new());
        assert_eq!(points.len(), DENSITY_SAMPLES);
        assert!(points.iter().all(|&(_, y)| (y - 1.0).abs() < 1e-9));
        assert_eq!(points.first().map(|p| p.0), Some(0.0));
        assert_eq!(points.last().map(|p| p.0), Some(1.0));
    }

    #[test]
    fn density_peaks_near_mode() {
        let state = BetaState { alpha: 8, beta: 3 };
        let points = state.density(101);
        let (x_peak, _) = points
            .iter()
            .copied()
            .fold((0.0, f64::MIN), |best, p| if p.1 > best.1 { p } else { best });
        // mode of Beta(8, 3) is 7/9
        assert!((x_peak - 7.0 / 9.0).abs() < 0.02);
        assert!((state.mean() - 8.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn passthrough_truncates_and_fills() {
        let rows = [
            obs(None, Some(0.2), 0, 0),
            obs(None, None, 3, 1),
            obs(None, Some(0.6), 7, 2),
        ];
        let refs: Vec<&Observation> = rows.iter().collect();

        let snapshot = SeriesPassthroughRule {
            axis: IterationAxis::Global,
            max_iter: Some(5),
            fill_missing: true,
        };
        assert_eq!(snapshot.series(&refs).points(), &[(0.0, 0.2), (3.0, 0.0)]);

        let live = SeriesPassthroughRule {
            axis: IterationAxis::PerKey,
            max_iter: None,
            fill_missing: false,
        };
        assert_eq!(live.series(&refs).points(), &[(0.0, 0.2), (2.0, 0.6)]);
    }
}
