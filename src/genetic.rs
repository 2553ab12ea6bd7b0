//! Genetic-algorithm route sequencing.
//!
//! Candidates are permutations of waypoint indices. Each generation is
//! bred entirely from the previous one: roulette-wheel parents, segment
//! crossover, swap mutation. Fitness is `1 / tour distance`.
//!
//! By default the answer is the shortest tour in the final population,
//! which can be worse than a tour seen in an earlier generation.
//! [`ResultSelection::BestEver`] keeps the best tour across all
//! generations instead.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::SequencingError;
use crate::model::Coordinate;
use crate::solver::{LegMatrix, SequencedRoute};
use crate::traits::RouteStrategy;

/// Floor for tour length so coincident waypoints don't divide by zero.
const MIN_TOUR_M: f64 = 1e-6;

/// Which individual the search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSelection {
    /// Shortest tour of the last generation only.
    #[default]
    FinalPopulation,
    /// Shortest tour seen in any generation.
    BestEver,
}

#[derive(Debug, Clone)]
pub struct GeneticOptions {
    pub population_size: usize,
    pub generations: usize,
    /// Probability that an offspring gets a swap mutation.
    pub mutation_rate: f64,
    pub selection: ResultSelection,
    /// Fixed RNG seed for reproducible runs; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for GeneticOptions {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            selection: ResultSelection::FinalPopulation,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneticStrategy {
    options: GeneticOptions,
}

impl GeneticStrategy {
    pub const NAME: &'static str = "genetic";

    pub fn new(options: GeneticOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneticOptions {
        &self.options
    }

    fn rng(&self) -> SmallRng {
        match self.options.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        }
    }

    /// Rates outside `[0, 1]` are clamped; NaN never mutates.
    fn mutates(&self, rng: &mut SmallRng) -> bool {
        let rate = self.options.mutation_rate;
        rate > 0.0 && rng.gen_bool(rate.min(1.0))
    }

    fn evolve(&self, legs: &LegMatrix, rng: &mut SmallRng) -> Vec<usize> {
        let n = legs.waypoint_count();
        if n < 2 {
            return (0..n).collect();
        }

        let size = self.options.population_size.max(1);
        let mut population: Vec<Vec<usize>> = (0..size)
            .map(|_| {
                let mut candidate: Vec<usize> = (0..n).collect();
                candidate.shuffle(rng);
                candidate
            })
            .collect();

        let mut best_ever: Option<(Vec<usize>, f64)> = None;

        for _ in 0..self.options.generations {
            let distances = tour_distances(legs, &population);
            if self.options.selection == ResultSelection::BestEver {
                track_best(&mut best_ever, &population, &distances);
            }

            let fitness: Vec<f64> = distances.iter().copied().map(fitness).collect();
            let total: f64 = fitness.iter().sum();

            population = (0..size)
                .map(|_| {
                    let first = roulette_select(&population, &fitness, total, rng);
                    let second = roulette_select(&population, &fitness, total, rng);
                    let mut child = crossover(first, second, rng);
                    if self.mutates(rng) {
                        swap_mutation(&mut child, rng);
                    }
                    child
                })
                .collect();
        }

        let distances = tour_distances(legs, &population);
        track_best(&mut best_ever, &population, &distances);

        match best_ever {
            Some((order, _)) => order,
            None => (0..n).collect(),
        }
    }
}

impl RouteStrategy for GeneticStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn sequence(
        &self,
        waypoints: &[Coordinate],
        end: &Coordinate,
    ) -> Result<SequencedRoute, SequencingError> {
        let legs = LegMatrix::build(waypoints, end)?;
        let mut rng = self.rng();
        let order = self.evolve(&legs, &mut rng);
        let distance = legs.tour_distance(&order);
        debug!(
            waypoints = waypoints.len(),
            generations = self.options.generations,
            distance_m = distance,
            "genetic sequence"
        );
        Ok(SequencedRoute::new(order, distance))
    }
}

fn fitness(distance: f64) -> f64 {
    1.0 / distance.max(MIN_TOUR_M)
}

fn tour_distances(legs: &LegMatrix, population: &[Vec<usize>]) -> Vec<f64> {
    population
        .iter()
        .map(|candidate| legs.tour_distance(candidate))
        .collect()
}

// Keeps the first strictly shorter tour.
fn track_best(
    best: &mut Option<(Vec<usize>, f64)>,
    population: &[Vec<usize>],
    distances: &[f64],
) {
    for (candidate, &distance) in population.iter().zip(distances) {
        if best.as_ref().is_none_or(|(_, best_distance)| distance < *best_distance) {
            *best = Some((candidate.clone(), distance));
        }
    }
}

/// Fitness-proportional pick: subtract fitness values from a uniform draw
/// in `[0, total)` until it goes non-positive. Falls through to the last
/// candidate when the draw never reaches zero (NaN fitness).
fn roulette_select<'a, R: Rng>(
    population: &'a [Vec<usize>],
    fitness: &[f64],
    total: f64,
    rng: &mut R,
) -> &'a [usize] {
    let mut remaining = rng.gen_range(0.0..1.0_f64) * total;
    for (candidate, &score) in population.iter().zip(fitness) {
        remaining -= score;
        if remaining <= 0.0 {
            return candidate;
        }
    }
    population.last().map(Vec::as_slice).unwrap_or_default()
}

/// Copies `first[start..end]` into the same positions of the child, then
/// fills the other positions in order with `second`'s genes that are not
/// in the copied segment. The child is always a permutation.
fn crossover<R: Rng>(first: &[usize], second: &[usize], rng: &mut R) -> Vec<usize> {
    let n = first.len();
    if n == 0 {
        return Vec::new();
    }

    let start = rng.gen_range(0..n);
    let end = rng.gen_range(start + 1..=n);

    let mut in_segment = vec![false; n];
    for &gene in &first[start..end] {
        in_segment[gene] = true;
    }

    let mut filler = second.iter().copied().filter(|&gene| !in_segment[gene]);
    let mut child = Vec::with_capacity(n);
    for position in 0..n {
        if (start..end).contains(&position) {
            child.push(first[position]);
        } else if let Some(gene) = filler.next() {
            child.push(gene);
        }
    }
    child
}

fn swap_mutation<R: Rng>(candidate: &mut [usize], rng: &mut R) {
    if candidate.len() < 2 {
        return;
    }
    let i = rng.gen_range(0..candidate.len());
    let j = rng.gen_range(0..candidate.len());
    candidate.swap(i, j);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::is_permutation;

    fn scattered(n: usize, rng: &mut SmallRng) -> Vec<Coordinate> {
        (0..n)
            .map(|_| {
                let lat = 36.0 + rng.gen_range(-0.1..0.1);
                let lng = -115.0 + rng.gen_range(-0.1..0.1);
                Coordinate::new(lat, lng)
            })
            .collect()
    }

    /// True when `child` is `first[start..end]` in place, with the other
    /// positions holding the rest of `second` in `second`'s order.
    fn is_segment_child(child: &[usize], first: &[usize], second: &[usize]) -> bool {
        let n = first.len();
        (0..n).any(|start| {
            (start + 1..=n).any(|end| {
                let segment = &first[start..end];
                if child[start..end] != *segment {
                    return false;
                }
                let outside: Vec<usize> = child[..start]
                    .iter()
                    .chain(&child[end..])
                    .copied()
                    .collect();
                let filler: Vec<usize> = second
                    .iter()
                    .copied()
                    .filter(|gene| !segment.contains(gene))
                    .collect();
                outside == filler
            })
        })
    }

    #[test]
    fn test_crossover_yields_permutation() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut first: Vec<usize> = (0..9).collect();
            let mut second: Vec<usize> = (0..9).collect();
            first.shuffle(&mut rng);
            second.shuffle(&mut rng);

            let child = crossover(&first, &second, &mut rng);
            assert!(is_permutation(&child, 9), "child {:?} is not a permutation", child);
        }
    }

    #[test]
    fn test_crossover_copies_one_parent_segment_in_place() {
        let mut rng = SmallRng::seed_from_u64(11);
        let first = vec![4, 3, 2, 1, 0];
        let second = vec![0, 1, 2, 3, 4];

        for _ in 0..100 {
            let child = crossover(&first, &second, &mut rng);
            assert!(
                is_segment_child(&child, &first, &second),
                "child {:?} is not a segment of {:?} filled from {:?}",
                child,
                first,
                second
            );
        }
    }

    #[test]
    fn test_segment_child_rejects_split_segments() {
        // Positions 0 and 2 come from the first parent but not as one run.
        assert!(!is_segment_child(&[4, 0, 2, 1, 3], &[4, 3, 2, 1, 0], &[0, 1, 2, 3, 4]));
    }

    #[test]
    fn test_roulette_falls_back_to_last() {
        let population = vec![vec![0, 1], vec![1, 0]];
        let mut rng = SmallRng::seed_from_u64(3);
        // Zero total fitness never goes non-positive before the first
        // subtraction, so the first candidate wins.
        let zero = roulette_select(&population, &[0.0, 0.0], 0.0, &mut rng);
        assert_eq!(zero, &[0, 1][..]);
        // NaN never compares non-positive: fall through to the last one.
        let nan = roulette_select(&population, &[f64::NAN, f64::NAN], f64::NAN, &mut rng);
        assert_eq!(nan, &[1, 0][..]);
    }

    #[test]
    fn test_swap_mutation_keeps_permutation() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut candidate: Vec<usize> = (0..6).collect();
        for _ in 0..50 {
            swap_mutation(&mut candidate, &mut rng);
            assert!(is_permutation(&candidate, 6));
        }
    }

    #[test]
    fn test_out_of_range_mutation_rates() {
        let mut rng = SmallRng::seed_from_u64(9);
        let waypoints = scattered(6, &mut rng);
        let end = Coordinate::new(36.2, -115.2);

        for mutation_rate in [0.0, 1.0, 2.5, -1.0, f64::NAN] {
            let strategy = GeneticStrategy::new(GeneticOptions {
                generations: 10,
                mutation_rate,
                seed: Some(4),
                ..GeneticOptions::default()
            });
            let route = strategy.sequence(&waypoints, &end).unwrap();
            assert!(is_permutation(&route.order, 6), "rate {}", mutation_rate);
        }
    }

    #[test]
    fn test_genetic_output_is_always_permutation() {
        let mut rng = SmallRng::seed_from_u64(42);
        let strategy = GeneticStrategy::new(GeneticOptions {
            generations: 20,
            ..GeneticOptions::default()
        });

        for n in [0, 1, 2, 3, 7, 12] {
            for _ in 0..5 {
                let waypoints = scattered(n, &mut rng);
                let end = Coordinate::new(36.2, -115.2);
                let route = strategy.sequence(&waypoints, &end).unwrap();
                assert!(is_permutation(&route.order, n), "n={} order={:?}", n, route.order);
            }
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut rng = SmallRng::seed_from_u64(1);
        let waypoints = scattered(8, &mut rng);
        let end = Coordinate::new(36.2, -115.2);
        let options = GeneticOptions {
            seed: Some(99),
            ..GeneticOptions::default()
        };

        let first = GeneticStrategy::new(options.clone())
            .sequence(&waypoints, &end)
            .unwrap();
        let second = GeneticStrategy::new(options)
            .sequence(&waypoints, &end)
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_best_ever_never_worse_than_final_population() {
        let mut rng = SmallRng::seed_from_u64(2);
        let waypoints = scattered(10, &mut rng);
        let end = Coordinate::new(36.2, -115.2);

        let final_only = GeneticStrategy::new(GeneticOptions {
            seed: Some(17),
            ..GeneticOptions::default()
        })
        .sequence(&waypoints, &end)
        .unwrap();
        let best_ever = GeneticStrategy::new(GeneticOptions {
            seed: Some(17),
            selection: ResultSelection::BestEver,
            ..GeneticOptions::default()
        })
        .sequence(&waypoints, &end)
        .unwrap();

        assert!(best_ever.total_distance_meters <= final_only.total_distance_meters);
    }

    #[test]
    fn test_best_ever_finds_optimum_on_a_line() {
        // Waypoints on a line ending east: the west-to-east sweep is optimal.
        let waypoints = vec![
            Coordinate::new(0.0, 0.02),
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
        ];
        let end = Coordinate::new(0.0, 0.03);
        let strategy = GeneticStrategy::new(GeneticOptions {
            selection: ResultSelection::BestEver,
            seed: Some(8),
            ..GeneticOptions::default()
        });

        let route = strategy.sequence(&waypoints, &end).unwrap();

        assert_eq!(route.order, vec![1, 2, 0]);
    }
}
