use once_cell::sync::OnceCell;
use tracing::warn;

/// Operator and heuristic costs. Non-negative everywhere; see
/// [`MAX_COST_VALUE`] for the overflow policy.
pub type Cost = i32;

/// Clamp bound for relaxed cost sums. Kept well below `Cost::MAX` so that
/// adding two clamped values can never wrap.
pub const MAX_COST_VALUE: Cost = 100_000_000;

/// Sentinel for "unreachable" in distance tables. Never used in arithmetic.
pub const INFINITY: Cost = Cost::MAX;

static COST_CLAMP_WARNING: OnceCell<()> = OnceCell::new();

/// Saturating addition for relaxed cost sums, clamped to [`MAX_COST_VALUE`].
/// The clamp is reported once per process.
pub fn clamped_add(a: Cost, b: Cost) -> Cost {
    debug_assert!(a >= 0 && b >= 0);
    let sum = a.saturating_add(b);
    if sum > MAX_COST_VALUE {
        COST_CLAMP_WARNING.get_or_init(|| {
            warn!("cost sum exceeded {MAX_COST_VALUE}; clamping from now on");
        });
        MAX_COST_VALUE
    } else {
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping() {
        assert_eq!(clamped_add(2, 3), 5);
        assert_eq!(clamped_add(MAX_COST_VALUE, 1), MAX_COST_VALUE);
        assert_eq!(
            clamped_add(MAX_COST_VALUE, MAX_COST_VALUE),
            MAX_COST_VALUE
        );
    }
}
