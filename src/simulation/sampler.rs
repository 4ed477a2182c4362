// src/simulation/sampler.rs

use crate::model::instance::Instance;
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Scenario indices, one per stage, root first.
pub type ScenarioPath = Vec<usize>;

/// Conditional scenario probabilities of every stage.
#[derive(Debug, Clone)]
pub struct ScenarioTree {
    probabilities: Vec<Vec<f64>>,
}

impl ScenarioTree {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            probabilities: instance
                .stages
                .iter()
                .map(|stage| stage.scenarios.iter().map(|s| s.probability).collect())
                .collect(),
        }
    }

    pub fn horizon(&self) -> usize {
        self.probabilities.len()
    }

    pub fn branching(&self, t: usize) -> usize {
        self.probabilities[t].len()
    }

    /// `Π g_t`, or `None` if it does not fit in `usize`.
    pub fn total_paths(&self) -> Option<usize> {
        self.probabilities
            .iter()
            .try_fold(1usize, |acc, stage| acc.checked_mul(stage.len()))
    }

    /// Unconditional probability of `path`.
    pub fn path_probability(&self, path: &[usize]) -> f64 {
        path.iter()
            .enumerate()
            .map(|(t, &s)| self.probabilities[t][s])
            .product()
    }

    /// Every root-to-leaf path in lexicographic order, the last stage
    /// varying fastest.
    pub fn enumerate(&self) -> Vec<ScenarioPath> {
        let horizon = self.horizon();
        let total = self.total_paths().unwrap_or(usize::MAX);
        let mut paths = Vec::with_capacity(total.min(1 << 16));
        if horizon == 0 || self.probabilities.iter().any(|p| p.is_empty()) {
            return paths;
        }

        let mut current = vec![0; horizon];
        loop {
            paths.push(current.clone());
            // Odometer step from the last stage backwards.
            let mut t = horizon;
            loop {
                if t == 0 {
                    return paths;
                }
                t -= 1;
                current[t] += 1;
                if current[t] < self.branching(t) {
                    break;
                }
                current[t] = 0;
            }
        }
    }

    /// One scenario of stage `t` by inverse-CDF sampling.
    fn draw<R: Rng + ?Sized>(&self, t: usize, rng: &mut R) -> usize {
        let u: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (s, p) in self.probabilities[t].iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return s;
            }
        }
        // Rounding left the cumulative sum just below one.
        self.branching(t) - 1
    }

    /// Builds the paths for one iteration.
    ///
    /// `requested == 0`, or a request at least as large as the tree,
    /// enumerates every path. Otherwise distinct paths are drawn with
    /// duplicate rejection; if `attempts_per_path * requested` draws are not
    /// enough the whole tree is enumerated instead.
    pub fn sample<R: Rng + ?Sized>(&self, requested: usize, attempts_per_path: usize, rng: &mut R) -> SampleSet {
        let total = self.total_paths();
        let covers_tree = total.map_or(false, |total| requested >= total);
        if requested == 0 || covers_tree {
            if requested > 0 {
                log::info!(
                    "{} paths requested but the tree only has {}, enumerating",
                    requested,
                    total.unwrap_or(0)
                );
            }
            return SampleSet::new(self, self.enumerate(), true);
        }

        let max_attempts = requested.saturating_mul(attempts_per_path.max(1));
        let mut seen = HashSet::with_capacity(requested);
        let mut paths = Vec::with_capacity(requested);
        let mut attempts = 0;
        while paths.len() < requested {
            if attempts == max_attempts {
                log::warn!(
                    "only {} distinct paths after {} draws, enumerating the tree",
                    paths.len(),
                    attempts
                );
                return SampleSet::new(self, self.enumerate(), true);
            }
            attempts += 1;
            let path: ScenarioPath = (0..self.horizon()).map(|t| self.draw(t, rng)).collect();
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
        SampleSet::new(self, paths, false)
    }
}

/// The paths of one iteration with their probabilities and shared-prefix
/// owners.
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub paths: Vec<ScenarioPath>,
    /// Unconditional probability of each path.
    pub probabilities: Vec<f64>,
    /// Whether the set is the whole tree.
    pub exhaustive: bool,
    /// `owners[m][t]` is the first path with the same scenarios as `m` on
    /// stages `0..=t`.
    owners: Vec<Vec<usize>>,
}

impl SampleSet {
    pub fn new(tree: &ScenarioTree, paths: Vec<ScenarioPath>, exhaustive: bool) -> Self {
        let probabilities = paths.iter().map(|p| tree.path_probability(p)).collect();
        let horizon = tree.horizon();
        let mut owners = vec![vec![0; horizon]; paths.len()];
        for t in 0..horizon {
            let mut first: HashMap<&[usize], usize> = HashMap::new();
            for (m, path) in paths.iter().enumerate() {
                owners[m][t] = *first.entry(&path[..=t]).or_insert(m);
            }
        }
        Self {
            paths,
            probabilities,
            exhaustive,
            owners,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn owner(&self, m: usize, t: usize) -> usize {
        self.owners[m][t]
    }

    /// True when no earlier path shares `m`'s prefix through stage `t`.
    pub fn is_first_visit(&self, m: usize, t: usize) -> bool {
        self.owners[m][t] == m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::fixtures::small_instance;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn enumeration_is_the_cartesian_product() {
        let tree = ScenarioTree::from_instance(&small_instance());
        let paths = tree.enumerate();
        assert_eq!(
            paths,
            vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1]]
        );
        let total: f64 = paths.iter().map(|p| tree.path_probability(p)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn owners_point_at_first_shared_prefix() {
        let tree = ScenarioTree::from_instance(&small_instance());
        let set = SampleSet::new(&tree, tree.enumerate(), true);
        assert_eq!(set.owner(3, 0), 0);
        assert_eq!(set.owner(3, 1), 2);
        assert_eq!(set.owner(3, 2), 3);
        assert!(set.is_first_visit(1, 2));
        assert!(!set.is_first_visit(1, 1));
    }

    #[test]
    fn sampled_paths_are_distinct() {
        let tree = ScenarioTree::from_instance(&small_instance());
        let mut rng = StdRng::seed_from_u64(7);
        let set = tree.sample(3, 1000, &mut rng);
        assert_eq!(set.len(), 3);
        assert!(!set.exhaustive);
        let unique: HashSet<_> = set.paths.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(set.paths.iter().all(|p| p[0] == 0));
    }

    #[test]
    fn oversized_request_enumerates() {
        let tree = ScenarioTree::from_instance(&small_instance());
        let mut rng = StdRng::seed_from_u64(1);
        let set = tree.sample(50, 1000, &mut rng);
        assert!(set.exhaustive);
        assert_eq!(set.paths, tree.enumerate());
    }

    #[test]
    fn exhausted_retries_fall_back_to_enumeration() {
        let mut instance = small_instance();
        // Make one leaf certain so only two distinct paths can ever be drawn.
        instance.stages[2].scenarios[0].probability = 1.0;
        instance.stages[2].scenarios[1].probability = 0.0;
        let tree = ScenarioTree::from_instance(&instance);
        let mut rng = StdRng::seed_from_u64(3);
        let set = tree.sample(3, 10, &mut rng);
        assert!(set.exhaustive);
        assert_eq!(set.len(), 4);
    }
}
