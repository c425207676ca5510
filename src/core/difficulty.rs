use crate::core::Block;
use crate::error::{ChainError, Result};
use log::debug;

// Retarget constants
const BLOCK_TIME_STEP: i64 = 10; // Seconds of delay worth one adjustment step
const ADJUSTMENT_DIVISOR: f64 = 2048.0; // Each step moves difficulty by parent/2048
const MAX_DOWNWARD_STEPS: i64 = -99; // Floor on the step multiplier
pub const DEFAULT_DIFFICULTY: f64 = 1.0; // Used when a chain config leaves difficulty at zero

/// Per-block difficulty retargeting against the parent block.
///
/// `x = max(1 - floor((block_time - parent.timestamp) / 10), -99)` and the new
/// difficulty is `parent.difficulty + (parent.difficulty / 2048) * x`. Blocks found
/// within 10 seconds of their parent push difficulty up, blocks 10 to 19 seconds
/// out leave it alone, and anything slower pulls it down by up to 99 steps.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    pub fn calculate_difficulty(parent: &Block, block_time: i64) -> f64 {
        let elapsed = block_time.saturating_sub(parent.get_timestamp());
        let steps = (1 - elapsed.div_euclid(BLOCK_TIME_STEP)).max(MAX_DOWNWARD_STEPS);

        let parent_difficulty = parent.get_difficulty();
        let difficulty = parent_difficulty + (parent_difficulty / ADJUSTMENT_DIVISOR) * steps as f64;

        debug!("Retarget after {elapsed}s: {parent_difficulty} -> {difficulty} ({steps} steps)");
        difficulty
    }

    /// Difficulty a chain starts from when its config asks for `configured`.
    pub fn initial_difficulty(configured: f64) -> f64 {
        if configured == 0.0 {
            DEFAULT_DIFFICULTY
        } else {
            configured
        }
    }

    /// Validate that a difficulty value can produce a proof-of-work target
    pub fn validate_difficulty(difficulty: f64) -> Result<()> {
        if !difficulty.is_finite() {
            return Err(ChainError::Fatal(format!(
                "Difficulty {difficulty} is not finite"
            )));
        }
        if difficulty < 0.0 {
            return Err(ChainError::Config(format!(
                "Difficulty {difficulty} must not be negative"
            )));
        }
        Ok(())
    }
}
