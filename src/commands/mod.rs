pub mod params;
pub mod runs;
pub mod show;
