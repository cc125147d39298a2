pub mod focus_mirror;
pub mod screen_time;
