//! Next-step resolution for each playback direction.

use stepclock_types::Direction;

/// Small LCG used for the Random direction. Deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct StepRng {
    state: u64,
}

impl StepRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 33) as u32
    }

    /// Uniform in `0..bound`. `bound` must be non-zero.
    pub fn below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        ((self.next_u32() as u64 * bound as u64) >> 31) as usize
    }
}

impl Default for StepRng {
    fn default() -> Self {
        Self::new(12345)
    }
}

/// Compute the step after `current` and the bounce flag for the following call.
///
/// `length` must be at least 1 and `current` is clamped into `0..length`.
/// The bounce flag is only read and written by `Direction::Bounce`; every
/// other direction passes it through untouched.
pub fn next_step(
    current: usize,
    length: usize,
    direction: Direction,
    bounce_forward: bool,
    rng: &mut StepRng,
) -> (usize, bool) {
    debug_assert!(length > 0, "pattern length must be validated before playback");
    if length <= 1 {
        return (0, bounce_forward);
    }
    let current = current.min(length - 1);

    match direction {
        Direction::Forward => ((current + 1) % length, bounce_forward),
        Direction::Backward => ((current + length - 1) % length, bounce_forward),
        Direction::Bounce => {
            if bounce_forward {
                let next = (current + 1).min(length - 1);
                (next, next < length - 1)
            } else {
                let next = current.saturating_sub(1);
                (next, next == 0)
            }
        }
        Direction::Random => {
            // Draw from the other length-1 steps so the same step never repeats back to back
            let r = rng.below(length - 1);
            let next = if r >= current { r + 1 } else { r };
            (next, bounce_forward)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(direction: Direction, length: usize, count: usize) -> Vec<usize> {
        let mut rng = StepRng::default();
        let mut current = 0;
        let mut bounce_forward = true;
        let mut seq = vec![current];
        for _ in 1..count {
            let (next, flag) = next_step(current, length, direction, bounce_forward, &mut rng);
            current = next;
            bounce_forward = flag;
            seq.push(current);
        }
        seq
    }

    #[test]
    fn forward_wraps() {
        assert_eq!(walk(Direction::Forward, 4, 7), vec![0, 1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn backward_wraps() {
        assert_eq!(walk(Direction::Backward, 4, 6), vec![0, 3, 2, 1, 0, 3]);
    }

    #[test]
    fn bounce_reverses_at_both_ends() {
        assert_eq!(
            walk(Direction::Bounce, 4, 11),
            vec![0, 1, 2, 3, 2, 1, 0, 1, 2, 3, 2]
        );
    }

    #[test]
    fn bounce_length_two_alternates() {
        assert_eq!(walk(Direction::Bounce, 2, 5), vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn bounce_flag_flips_on_reaching_boundary() {
        let mut rng = StepRng::default();
        assert_eq!(next_step(2, 4, Direction::Bounce, true, &mut rng), (3, false));
        assert_eq!(next_step(1, 4, Direction::Bounce, false, &mut rng), (0, true));
        assert_eq!(next_step(1, 4, Direction::Bounce, true, &mut rng), (2, true));
    }

    #[test]
    fn bounce_backward_at_zero_clamps() {
        let mut rng = StepRng::default();
        assert_eq!(next_step(0, 4, Direction::Bounce, false, &mut rng), (0, true));
    }

    #[test]
    fn random_never_repeats_immediately() {
        for length in 2..=16 {
            let seq = walk(Direction::Random, length, 500);
            assert!(seq.iter().all(|&s| s < length));
            for pair in seq.windows(2) {
                assert_ne!(pair[0], pair[1], "repeat at length {}", length);
            }
        }
    }

    #[test]
    fn random_reaches_every_step() {
        let seq = walk(Direction::Random, 8, 400);
        for step in 0..8 {
            assert!(seq.contains(&step), "step {} never drawn", step);
        }
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let mut a = StepRng::new(7);
        let mut b = StepRng::new(7);
        let xs: Vec<usize> = (0..20).map(|_| a.below(10)).collect();
        let ys: Vec<usize> = (0..20).map(|_| b.below(10)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn single_step_pattern_stays_put() {
        let mut rng = StepRng::default();
        for direction in Direction::ALL {
            assert_eq!(next_step(0, 1, direction, true, &mut rng).0, 0);
        }
    }

    #[test]
    fn out_of_range_current_is_clamped() {
        let mut rng = StepRng::default();
        // pattern shrank from 16 to 4 while on step 9
        assert_eq!(next_step(9, 4, Direction::Forward, true, &mut rng).0, 0);
        assert_eq!(next_step(9, 4, Direction::Backward, true, &mut rng).0, 2);
    }
}
