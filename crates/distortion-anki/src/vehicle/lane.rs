//! Lane bands
//!
//! The road is split into seven bands around the center line. Band 0 is
//! `(-w/2, w/2]`, band `n > 0` is `(w/2 + w(n-1), w/2 + wn]`, negative bands
//! mirror that, and the outermost bands are open-ended.

pub const MIN_LANE: i8 = -3;
pub const MAX_LANE: i8 = 3;

/// Band containing a lateral offset, for lanes `lane_width` millimetres wide
pub fn lane_band(offset: f32, lane_width: f32) -> i8 {
    let half = lane_width / 2.0;
    for lane in (MIN_LANE + 1..=MAX_LANE).rev() {
        let lower_edge = half + lane_width * f32::from(lane - 1);
        if offset > lower_edge {
            return lane;
        }
    }
    MIN_LANE
}

/// Move `delta` bands from `lane`, staying on the road
pub fn shift_lane(lane: i8, delta: i8) -> i8 {
    lane.saturating_add(delta).clamp(MIN_LANE, MAX_LANE)
}
