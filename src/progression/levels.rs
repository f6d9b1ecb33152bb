use crate::db::models::UserLevel;

/// XP granted for every won pick.
pub const PICK_WON_XP: u64 = 20;

const BASE_XP: f64 = 100.0;
const GROWTH: f64 = 1.5;

/// XP needed to reach level `n` from the level before it: ⌊100 × 1.5^(n−1)⌋.
pub fn xp_for_level(n: u32) -> u64 {
    let exp = n.saturating_sub(1).min(i32::MAX as u32) as i32;
    (BASE_XP * GROWTH.powi(exp)).floor() as u64
}

/// XP required to advance past `level`.
pub fn xp_to_advance(level: u32) -> u64 {
    xp_for_level(level.saturating_add(1))
}

/// Add XP, carrying overflow across as many level-ups as it pays for.
/// Returns the previous level when at least one level was gained.
pub fn apply_xp(level: &mut UserLevel, amount: u64) -> Option<u32> {
    let before = level.level;
    level.total_xp = level.total_xp.saturating_add(amount);
    level.current_xp = level.current_xp.saturating_add(amount);
    loop {
        let need = xp_to_advance(level.level);
        if level.current_xp < need {
            break;
        }
        level.current_xp -= need;
        level.level += 1;
    }
    (level.level > before).then_some(before)
}
