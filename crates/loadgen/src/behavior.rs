//! Weighted selection of transaction behaviors.
//!
//! A complexity level in `0..=100` maps to a distribution over the three
//! behavior kinds. Low levels favor plain value transfers, high levels favor
//! deployments and oversized payloads, and token transfers peak in the middle.

use std::fmt;

use rand::{Rng, seq::SliceRandom};

/// Transaction kind chosen for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Plain value transfer.
    NativeTransfer,
    /// Token transfer, minting from the faucet first when needed.
    TokenTransfer,
    /// Contract deployment or oversized calldata, decided at dispatch time.
    ComplexOp,
}

impl Behavior {
    /// All behaviors, in weight order.
    pub const ALL: [Self; 3] = [Self::NativeTransfer, Self::TokenTransfer, Self::ComplexOp];

    /// Returns the behavior name used in logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NativeTransfer => "native_transfer",
            Self::TokenTransfer => "token_transfer",
            Self::ComplexOp => "complex_op",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chain action a behavior resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Self-transfer of native value.
    NativeTransfer,
    /// Token transfer to a receiver.
    TokenTransfer,
    /// Contract creation.
    ContractDeploy,
    /// Oversized random calldata sent to a receiver.
    HugeCalldata,
}

impl Action {
    /// Resolves a behavior, flipping a fair coin for [`Behavior::ComplexOp`].
    pub fn resolve<R: Rng + ?Sized>(behavior: Behavior, rng: &mut R) -> Self {
        match behavior {
            Behavior::NativeTransfer => Self::NativeTransfer,
            Behavior::TokenTransfer => Self::TokenTransfer,
            Behavior::ComplexOp if rng.random_bool(0.5) => Self::ContractDeploy,
            Behavior::ComplexOp => Self::HugeCalldata,
        }
    }

    /// Returns the action name used in logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NativeTransfer => "native_transfer",
            Self::TokenTransfer => "token_transfer",
            Self::ContractDeploy => "contract_deploy",
            Self::HugeCalldata => "huge_calldata",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentages for `[NativeTransfer, TokenTransfer, ComplexOp]`.
pub type Weights = [u32; 3];

/// Rounds `part / total * 100` half up.
const fn share_of_hundred(part: u32, total: u32) -> u32 {
    (part * 200 + total) / (total * 2)
}

/// Maps a complexity level to behavior weights summing to 100.
///
/// Levels above 100 are clamped. The rounding residual is folded into the
/// larger of the native and complex buckets so the token weight stays
/// symmetric around 50.
pub fn weights(level: u8) -> Weights {
    let level = u32::from(level.min(100));
    match level {
        0 => [100, 0, 0],
        100 => [0, 0, 100],
        _ => {
            let native = 100 - level;
            let token = 50 - 50u32.abs_diff(level);
            let complex = level;
            let total = native + token + complex;

            let mut out = [
                share_of_hundred(native, total),
                share_of_hundred(token, total),
                share_of_hundred(complex, total),
            ];
            let sum: u32 = out.iter().sum();
            let bucket = if out[0] > out[2] { 0 } else { 2 };
            out[bucket] = (out[bucket] + 100).saturating_sub(sum);
            out
        }
    }
}

/// Draws one behavior from `weights`.
///
/// Walks the cumulative weights and returns the first bucket whose running
/// sum exceeds a uniform draw in `[0, total)`. Falls back to the first bucket
/// when every weight is zero.
pub fn sample<R: Rng + ?Sized>(weights: &Weights, rng: &mut R) -> Behavior {
    let total: u32 = weights.iter().sum();
    if total == 0 {
        return Behavior::ALL[0];
    }
    let draw = rng.random_range(0..total);
    let mut cumulative = 0;
    for (behavior, weight) in Behavior::ALL.iter().zip(weights) {
        cumulative += weight;
        if draw < cumulative {
            return *behavior;
        }
    }
    Behavior::ALL[0]
}

/// Splits `n` slots between behaviors according to `weights`.
///
/// Native and token shares are rounded; whatever remains goes to
/// [`Behavior::ComplexOp`].
pub fn plan_counts(weights: &Weights, n: usize) -> [usize; 3] {
    let total = weights.iter().sum::<u32>().max(1) as usize;
    let round_share = |w: u32| (w as usize * n * 2 + total) / (total * 2);

    let native = round_share(weights[0]).min(n);
    let token = round_share(weights[1]).min(n - native);
    [native, token, n - native - token]
}

/// Builds a shuffled multiset of `n` behaviors following [`plan_counts`].
pub fn plan<R: Rng + ?Sized>(weights: &Weights, n: usize, rng: &mut R) -> Vec<Behavior> {
    let counts = plan_counts(weights, n);
    let mut deck: Vec<Behavior> = Behavior::ALL
        .iter()
        .zip(counts)
        .flat_map(|(behavior, count)| std::iter::repeat_n(*behavior, count))
        .collect();
    deck.shuffle(rng);
    deck
}

/// A refillable stack of planned behaviors.
///
/// Slots draw from the deck; once it runs dry it is refilled with a freshly
/// shuffled plan of `size` cards.
#[derive(Debug, Clone)]
pub struct BehaviorDeck {
    weights: Weights,
    size: usize,
    cards: Vec<Behavior>,
}

impl BehaviorDeck {
    /// Creates an empty deck that plans `size` cards per refill.
    pub fn new(weights: Weights, size: usize) -> Self {
        Self { weights, size: size.max(1), cards: Vec::new() }
    }

    /// Takes the next behavior, refilling the deck when exhausted.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Behavior {
        if self.cards.is_empty() {
            self.cards = plan(&self.weights, self.size, rng);
        }
        self.cards.pop().unwrap_or_else(|| sample(&self.weights, rng))
    }

    /// Number of cards left before the next refill.
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_weights_sum_to_hundred_for_every_level() {
        for level in 0..=100u8 {
            let w = weights(level);
            assert_eq!(w.iter().sum::<u32>(), 100, "level {level}: {w:?}");
        }
    }

    #[rstest]
    #[case(0, [100, 0, 0])]
    #[case(100, [0, 0, 100])]
    #[case(255, [0, 0, 100])]
    #[case(25, [60, 20, 20])]
    #[case(75, [20, 20, 60])]
    #[case(50, [33, 33, 34])]
    fn test_weights_known_levels(#[case] level: u8, #[case] expected: Weights) {
        assert_eq!(weights(level), expected);
    }

    #[test]
    fn test_token_weight_peaks_at_fifty_and_is_symmetric() {
        let peak = weights(50)[1];
        for d in 1..50u8 {
            let low = weights(50 - d)[1];
            let high = weights(50 + d)[1];
            assert_eq!(low, high, "asymmetric at d={d}");
            assert!(low <= peak);
        }
    }

    #[test]
    fn test_sample_respects_zero_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert_eq!(sample(&[100, 0, 0], &mut rng), Behavior::NativeTransfer);
            assert_eq!(sample(&[0, 0, 100], &mut rng), Behavior::ComplexOp);
            assert_eq!(sample(&[0, 100, 0], &mut rng), Behavior::TokenTransfer);
        }
        assert_eq!(sample(&[0, 0, 0], &mut rng), Behavior::NativeTransfer);
    }

    #[rstest]
    #[case([100, 0, 0], 15, [15, 0, 0])]
    #[case([0, 0, 100], 15, [0, 0, 15])]
    #[case([60, 20, 20], 15, [9, 3, 3])]
    #[case([33, 33, 34], 4, [1, 1, 2])]
    #[case([50, 50, 0], 1, [1, 0, 0])]
    fn test_plan_counts(#[case] w: Weights, #[case] n: usize, #[case] expected: [usize; 3]) {
        let counts = plan_counts(&w, n);
        assert_eq!(counts, expected);
        assert_eq!(counts.iter().sum::<usize>(), n);
    }

    #[test]
    fn test_plan_is_a_permutation_of_counts() {
        let mut rng = StdRng::seed_from_u64(1);
        let deck = plan(&[60, 20, 20], 15, &mut rng);
        assert_eq!(deck.len(), 15);
        assert_eq!(deck.iter().filter(|b| **b == Behavior::NativeTransfer).count(), 9);
        assert_eq!(deck.iter().filter(|b| **b == Behavior::TokenTransfer).count(), 3);
        assert_eq!(deck.iter().filter(|b| **b == Behavior::ComplexOp).count(), 3);
    }

    #[test]
    fn test_deck_refills_when_exhausted() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut deck = BehaviorDeck::new(weights(0), 3);
        for _ in 0..10 {
            assert_eq!(deck.draw(&mut rng), Behavior::NativeTransfer);
            assert!(deck.remaining() < 3);
        }
    }

    #[test]
    fn test_complex_op_resolves_to_both_actions() {
        let mut rng = StdRng::seed_from_u64(11);
        let actions: Vec<Action> =
            (0..200).map(|_| Action::resolve(Behavior::ComplexOp, &mut rng)).collect();
        assert!(actions.contains(&Action::ContractDeploy));
        assert!(actions.contains(&Action::HugeCalldata));
        assert!(
            actions.iter().all(|a| matches!(a, Action::ContractDeploy | Action::HugeCalldata))
        );
        assert_eq!(Action::resolve(Behavior::NativeTransfer, &mut rng), Action::NativeTransfer);
        assert_eq!(Action::resolve(Behavior::TokenTransfer, &mut rng), Action::TokenTransfer);
    }
}
