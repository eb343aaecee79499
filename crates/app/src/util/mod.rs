pub mod streaks;
pub mod time;
