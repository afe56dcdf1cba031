//! Vehicle state model

pub mod lane;
mod model;

pub use lane::{lane_band, shift_lane, MAX_LANE, MIN_LANE};
pub use model::{LaneState, ModelCar, ModelSettings, SpeedState, TurnState};
