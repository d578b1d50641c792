#![forbid(unsafe_code)]

pub mod answer;
pub mod badges;
pub mod difficulty;
pub mod model;
pub mod scoring;
pub mod time;

pub use time::Clock;
