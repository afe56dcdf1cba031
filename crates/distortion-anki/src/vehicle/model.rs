//! Per-vehicle state model
//!
//! Holds what was requested of a vehicle (speed, lane, turn), the
//! perturbation flags applied to it, and the latest telemetry. Request
//! setters recompute the derived command right away, issue it through the
//! [`VehicleController`] and return the new derived state.
//!
//! Commands are issued while the state lock is held, so the order in which
//! commands reach the link matches the order of the state changes. Issuing
//! never blocks and the controller never calls back into the model.

use std::sync::Arc;

use chrono::Utc;
use distortion_core::{
    DrivingData, EventSink, TelemetrySnapshot, TrackGeometry, TurnKind, TurnTrigger,
    VehicleController, VehicleIdentity,
};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::lane::{lane_band, shift_lane};
use crate::config::{ControllerConfig, ModelConfig};
use crate::controller::VehicleEvent;
use crate::protocol::{BatteryLevel, LocationUpdate, OffsetUpdate, TransitionUpdate, VersionInfo};
use crate::tracker::PositionTracker;

/// Fixed parameters of the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSettings {
    /// Effective speed (percent) at or below which the vehicle is stopped
    pub min_speed_threshold: f32,
    pub lane_width_mm: f32,
    pub acceleration: u16,
    pub respect_speed_limit: bool,
}

impl ModelSettings {
    pub fn new(model: &ModelConfig, controller: &ControllerConfig) -> Self {
        Self {
            min_speed_threshold: model.min_speed_threshold,
            lane_width_mm: controller.lane_offset_mm,
            acceleration: controller.default_acceleration,
            respect_speed_limit: controller.respect_speed_limit,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::new(&ModelConfig::default(), &ControllerConfig::default())
    }
}

/// Result of a speed request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedState {
    pub request: f32,
    pub factor: f32,
    /// Commanded speed in percent, zero below the threshold
    pub speed: f32,
    /// Whether the link accepted the command
    pub sent: bool,
}

/// Result of a lane change request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneState {
    /// Target band, unchanged when blocked
    pub lane: i8,
    pub blocked: bool,
    pub sent: bool,
}

/// Result of a turn request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnState {
    pub blocked: bool,
    pub sent: bool,
}

#[derive(Debug)]
struct CarState {
    player: Option<String>,
    active_hacking_scenario: Option<String>,

    speed_request: f32,
    speed_factor: f32,
    speed: f32,

    lane: i8,
    lane_change_request: i8,
    lane_change_blocked: bool,

    turn_request: i32,
    turn_blocked: bool,

    is_light_on: bool,
    is_safemode_on: bool,

    telemetry: TelemetrySnapshot,
}

impl Default for CarState {
    fn default() -> Self {
        Self {
            player: None,
            active_hacking_scenario: None,
            speed_request: 0.0,
            speed_factor: 1.0,
            speed: 0.0,
            lane: 0,
            lane_change_request: 0,
            lane_change_blocked: false,
            turn_request: 0,
            turn_blocked: false,
            is_light_on: false,
            is_safemode_on: true,
            telemetry: TelemetrySnapshot::default(),
        }
    }
}

/// State model of one vehicle
pub struct ModelCar {
    vehicle: VehicleIdentity,
    controller: Arc<dyn VehicleController>,
    sink: Arc<dyn EventSink>,
    settings: ModelSettings,
    state: Mutex<CarState>,
    tracker: Mutex<PositionTracker>,
}

impl ModelCar {
    pub fn new(
        vehicle: VehicleIdentity,
        controller: Arc<dyn VehicleController>,
        geometry: Arc<dyn TrackGeometry>,
        sink: Arc<dyn EventSink>,
        settings: ModelSettings,
    ) -> Self {
        let tracker = PositionTracker::new(vehicle.clone(), geometry, sink.clone());
        Self {
            vehicle,
            controller,
            sink,
            settings,
            state: Mutex::new(CarState::default()),
            tracker: Mutex::new(tracker),
        }
    }

    pub fn vehicle(&self) -> &VehicleIdentity {
        &self.vehicle
    }

    pub fn controller(&self) -> &Arc<dyn VehicleController> {
        &self.controller
    }

    pub fn player(&self) -> Option<String> {
        self.state.lock().player.clone()
    }

    pub fn set_player(&self, player: Option<String>) {
        self.state.lock().player = player;
    }

    pub fn set_active_hacking_scenario(&self, scenario: Option<String>) {
        self.state.lock().active_hacking_scenario = scenario;
    }

    // ---------------------------------------------------------------------
    // Speed
    // ---------------------------------------------------------------------

    pub fn set_speed_request(&self, request: f32) -> SpeedState {
        let mut s = self.state.lock();
        s.speed_request = request;
        self.apply_speed(s)
    }

    pub fn set_speed_factor(&self, factor: f32) -> SpeedState {
        let mut s = self.state.lock();
        s.speed_factor = factor;
        self.apply_speed(s)
    }

    /// Currently commanded speed in percent
    pub fn speed(&self) -> f32 {
        self.state.lock().speed
    }

    fn apply_speed(&self, mut s: MutexGuard<'_, CarState>) -> SpeedState {
        let computed = s.speed_request * s.speed_factor;
        let stopped = computed <= self.settings.min_speed_threshold;
        if stopped {
            s.speed = 0.0;
            s.telemetry.speed_actual = 0;
        } else {
            s.speed = computed;
        }

        let sent = self.controller.change_speed(
            s.speed,
            self.settings.acceleration,
            self.settings.respect_speed_limit,
        );
        let state = SpeedState {
            request: s.speed_request,
            factor: s.speed_factor,
            speed: s.speed,
            sent,
        };
        let stopped = stopped.then(|| self.snapshot(&s));
        drop(s);

        if let Some(data) = stopped {
            self.sink.emit_driving_data(&data);
        }
        debug!(vehicle = %self.vehicle, speed = state.speed, sent, "Speed applied");
        state
    }

    // ---------------------------------------------------------------------
    // Lane
    // ---------------------------------------------------------------------

    /// Move `delta` bands from the band the vehicle is currently in
    pub fn set_lane_change_request(&self, delta: i8) -> LaneState {
        let mut s = self.state.lock();
        s.lane_change_request = delta;
        if s.lane_change_blocked {
            return LaneState {
                lane: s.lane,
                blocked: true,
                sent: false,
            };
        }
        let current = lane_band(s.telemetry.offset_from_center, self.settings.lane_width_mm);
        s.lane = shift_lane(current, delta);
        let lane = s.lane;
        let sent = self
            .controller
            .change_lane(lane, s.speed, self.settings.acceleration);
        drop(s);

        debug!(vehicle = %self.vehicle, lane, sent, "Lane change applied");
        LaneState {
            lane,
            blocked: false,
            sent,
        }
    }

    /// Last commanded lane band
    pub fn lane(&self) -> i8 {
        self.state.lock().lane
    }

    // ---------------------------------------------------------------------
    // Turn
    // ---------------------------------------------------------------------

    /// Issue an immediate U-turn unless turning is blocked
    ///
    /// Every call issues a new turn; callers debounce.
    pub fn set_turn_request(&self, request: i32) -> TurnState {
        let mut s = self.state.lock();
        s.turn_request = request;
        if s.turn_blocked {
            return TurnState {
                blocked: true,
                sent: false,
            };
        }
        let sent = self.controller.turn(TurnKind::UTurn, TurnTrigger::Immediate);
        drop(s);

        debug!(vehicle = %self.vehicle, sent, "U-turn requested");
        TurnState {
            blocked: false,
            sent,
        }
    }

    // ---------------------------------------------------------------------
    // Perturbations
    // ---------------------------------------------------------------------

    pub fn lock_lane_change(&self, blocked: bool) {
        self.state.lock().lane_change_blocked = blocked;
    }

    pub fn lock_turn(&self, blocked: bool) {
        self.state.lock().turn_blocked = blocked;
    }

    pub fn set_safemode(&self, on: bool) {
        self.state.lock().is_safemode_on = on;
    }

    pub fn switch_lights(&self, on: bool) {
        self.state.lock().is_light_on = on;
    }

    // ---------------------------------------------------------------------
    // Telemetry
    // ---------------------------------------------------------------------

    /// Apply one event from the controller
    pub fn handle_event(&self, event: VehicleEvent) {
        trace!(vehicle = %self.vehicle, ?event, "Vehicle event");
        match event {
            VehicleEvent::Version(v) => self.on_version(v),
            VehicleEvent::Battery(b) => self.on_battery(b),
            VehicleEvent::Location(l) => self.on_location(l),
            VehicleEvent::Transition(t) => self.on_transition(t),
            VehicleEvent::OffsetUpdate(o) => self.on_offset_update(o),
            VehicleEvent::Unreachable(message) => self.on_unreachable(&message),
        }
    }

    /// Apply events from `events` until the channel closes
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<VehicleEvent>,
    ) -> JoinHandle<()> {
        let car = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                car.handle_event(event);
            }
            debug!(vehicle = %car.vehicle, "Event dispatch stopped");
        })
    }

    fn on_location(&self, update: LocationUpdate) {
        self.tracker.lock().on_location(&update);

        let data = {
            let mut s = self.state.lock();
            let t = &mut s.telemetry;
            t.road_location = update.location;
            t.road_piece = update.piece;
            t.offset_from_center = update.offset;
            t.direction = update.direction;
            let stopped = s.speed == 0.0;
            s.telemetry.speed_actual = if stopped { 0 } else { update.speed };
            self.snapshot(&s)
        };
        self.sink.emit_driving_data(&data);
    }

    fn on_transition(&self, update: TransitionUpdate) {
        self.tracker.lock().on_transition(&update);

        let mut s = self.state.lock();
        s.telemetry.road_piece = update.piece;
        s.telemetry.prev_road_piece = update.prev_piece;
        s.telemetry.offset_from_center = update.offset;
        s.telemetry.direction = update.direction;
    }

    fn on_offset_update(&self, update: OffsetUpdate) {
        self.state.lock().telemetry.offset_from_center = update.offset;
    }

    fn on_version(&self, version: VersionInfo) {
        self.state.lock().telemetry.firmware_version = version.to_string();
    }

    fn on_battery(&self, battery: BatteryLevel) {
        let data = {
            let mut s = self.state.lock();
            s.telemetry.battery = battery.millivolts.to_string();
            self.snapshot(&s)
        };
        self.sink.emit_driving_data(&data);
    }

    fn on_unreachable(&self, message: &str) {
        let player = self.player();
        self.sink
            .emit_unreachable(&self.vehicle, player.as_deref(), message);
    }

    /// Full driving-data snapshot
    pub fn driving_data(&self) -> DrivingData {
        self.snapshot(&self.state.lock())
    }

    fn snapshot(&self, s: &CarState) -> DrivingData {
        DrivingData {
            vehicle_id: self.vehicle.clone(),
            player: s.player.clone(),
            speed_request: s.speed_request,
            lane_change_blocked: s.lane_change_blocked,
            turn_blocked: s.turn_blocked,
            is_light_on: s.is_light_on,
            is_safemode_on: s.is_safemode_on,
            active_hacking_scenario: s.active_hacking_scenario.clone(),
            telemetry: s.telemetry.clone(),
            timestamp: Utc::now(),
        }
    }
}
