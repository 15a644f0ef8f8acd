//! Mathematical utilities

/// Linear interpolation between two values
#[inline(always)]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// Check if a number is a power of two
#[inline(always)]
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Largest power of two less than or equal to `n`. Returns `None` for zero.
#[inline(always)]
pub fn previous_power_of_two(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    Some(1usize << (usize::BITS - 1 - n.leading_zeros()))
}

/// Best rational approximation `numerator / denominator` of a positive ratio,
/// with the denominator bounded.
///
/// Walks the continued-fraction convergents of `ratio` and stops before the
/// denominator exceeds `max_denominator`. Exact ratios (e.g. 22050 / 44100)
/// terminate early on their exact fraction.
pub fn rational_approximation(ratio: f64, max_denominator: u64) -> (u64, u64) {
    debug_assert!(ratio > 0.0);
    debug_assert!(max_denominator > 0);

    let mut numerator: u64 = 0;
    let mut denominator: u64 = 1;
    let mut prev_numerator: u64 = 1;
    let mut prev_denominator: u64 = 0;

    let mut x = ratio;
    loop {
        let whole = x.floor();
        if whole > u64::MAX as f64 {
            break;
        }
        let term = whole as u64;

        let next_numerator = term.saturating_mul(numerator).saturating_add(prev_numerator);
        let next_denominator = term.saturating_mul(denominator).saturating_add(prev_denominator);
        if next_denominator > max_denominator {
            break;
        }

        prev_numerator = numerator;
        prev_denominator = denominator;
        numerator = next_numerator;
        denominator = next_denominator;

        let fraction = x - whole;
        if fraction < 1e-12 {
            break;
        }
        x = 1.0 / fraction;
    }

    // A zero numerator only happens for ratios below 1/max_denominator
    if numerator == 0 {
        (1, max_denominator)
    } else {
        (numerator, denominator)
    }
}
