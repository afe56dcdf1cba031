//! Active vehicle set
//!
//! Owns every connected vehicle: its controller, state model and event
//! dispatch task. Vehicles stay in the set when their link fails; they
//! leave only through [`Fleet::remove`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use distortion_core::{
    ConnectionError, EventSink, TrackGeometry, VehicleController, VehicleIdentity,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ControllerConfig, LinkConfig, VehicleConfig};
use crate::controller::AnkiController;
use crate::transport::{create_adapter, GattAdapter, LinkTransport, MockGattAdapter, TransportError};
use crate::vehicle::{ModelCar, ModelSettings};

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Vehicle {0} is already active")]
    Duplicate(VehicleIdentity),

    #[error("Vehicle {0} not found")]
    NotFound(VehicleIdentity),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// One connected vehicle
pub struct ActiveVehicle {
    car: Arc<ModelCar>,
    controller: Arc<AnkiController>,
    dispatch: JoinHandle<()>,
    mock: Option<Arc<MockGattAdapter>>,
}

impl ActiveVehicle {
    pub fn vehicle(&self) -> &VehicleIdentity {
        self.car.vehicle()
    }

    pub fn car(&self) -> &Arc<ModelCar> {
        &self.car
    }

    pub fn controller(&self) -> &Arc<AnkiController> {
        &self.controller
    }

    /// Simulated peripheral, for vehicles on a mock link
    pub fn mock(&self) -> Option<&Arc<MockGattAdapter>> {
        self.mock.as_ref()
    }
}

/// Set of active vehicles sharing one sink and one track geometry
pub struct Fleet {
    controller_config: ControllerConfig,
    settings: ModelSettings,
    geometry: Arc<dyn TrackGeometry>,
    sink: Arc<dyn EventSink>,
    vehicles: RwLock<HashMap<VehicleIdentity, Arc<ActiveVehicle>>>,
    /// Identities with a connect in progress
    connecting: Mutex<HashSet<VehicleIdentity>>,
}

impl Fleet {
    pub fn new(
        controller_config: ControllerConfig,
        settings: ModelSettings,
        geometry: Arc<dyn TrackGeometry>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            controller_config,
            settings,
            geometry,
            sink,
            vehicles: RwLock::new(HashMap::new()),
            connecting: Mutex::new(HashSet::new()),
        }
    }

    /// Connect a vehicle and add it to the set
    pub async fn add(&self, config: &VehicleConfig) -> Result<Arc<ActiveVehicle>, FleetError> {
        let id = VehicleIdentity::new(config.address.as_str());
        {
            let vehicles = self.vehicles.read();
            let mut connecting = self.connecting.lock();
            if vehicles.contains_key(&id) || !connecting.insert(id.clone()) {
                return Err(FleetError::Duplicate(id));
            }
        }

        let result = self.connect(id.clone(), config).await;
        self.connecting.lock().remove(&id);

        let vehicle = Arc::new(result?);
        self.vehicles.write().insert(id.clone(), vehicle.clone());
        info!(vehicle = %id, player = ?config.player, "Vehicle added");
        Ok(vehicle)
    }

    async fn connect(
        &self,
        id: VehicleIdentity,
        config: &VehicleConfig,
    ) -> Result<ActiveVehicle, FleetError> {
        let (adapter, mock) = match &config.link {
            LinkConfig::Mock(cfg) => {
                let mock = Arc::new(MockGattAdapter::new(cfg, config.address.as_str()));
                let adapter: Arc<dyn GattAdapter> = mock.clone();
                (adapter, Some(mock))
            }
            link => (create_adapter(link, &config.address).await?, None),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Arc::new(AnkiController::new(
            id.clone(),
            LinkTransport::spawn(adapter),
            self.controller_config.clone(),
            events_tx,
        ));

        if let Err(e) = controller.connect(config.start_notifications).await {
            if let Err(close_err) = controller.close().await {
                warn!(vehicle = %id, error = %close_err, "Release after failed connect");
            }
            return Err(e.into());
        }

        let car = Arc::new(ModelCar::new(
            id,
            controller.clone() as Arc<dyn VehicleController>,
            self.geometry.clone(),
            self.sink.clone(),
            self.settings,
        ));
        car.set_player(config.player.clone());
        let dispatch = car.spawn_dispatch(events_rx);

        Ok(ActiveVehicle {
            car,
            controller,
            dispatch,
            mock,
        })
    }

    pub fn get(&self, id: &VehicleIdentity) -> Option<Arc<ActiveVehicle>> {
        self.vehicles.read().get(id).cloned()
    }

    /// Identities of all active vehicles, sorted
    pub fn list(&self) -> Vec<VehicleIdentity> {
        let mut ids: Vec<_> = self.vehicles.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.vehicles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.read().is_empty()
    }

    /// Disconnect a vehicle and stop its tasks
    pub async fn remove(&self, id: &VehicleIdentity) -> Result<(), FleetError> {
        let vehicle = self
            .vehicles
            .write()
            .remove(id)
            .ok_or_else(|| FleetError::NotFound(id.clone()))?;

        if let Err(e) = vehicle.controller.close().await {
            warn!(vehicle = %id, error = %e, "Disconnect failed");
        }
        vehicle.dispatch.abort();
        info!(vehicle = %id, "Vehicle removed");
        Ok(())
    }

    /// Remove every vehicle
    pub async fn shutdown(&self) {
        for id in self.list() {
            if let Err(e) = self.remove(&id).await {
                warn!(vehicle = %id, error = %e, "Remove failed during shutdown");
            }
        }
    }
}
