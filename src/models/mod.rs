pub mod item;
pub mod sample;

pub use item::{DashboardRow, TrackedItem};
pub use sample::{FetchStatus, NewSample, PriceSample};
