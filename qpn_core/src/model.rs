//! In-memory representation of a queueing-Petri-net simulation model.
//!
//! A model is given by:
//!
//! - a finite set of _stations_ (places, transitions, queues, forks, joins, etc.);
//! - a finite set of _job classes_, open or closed, whose tokens circulate among stations;
//! - a set of directed _connections_ between stations;
//! - for each transition station, an ordered list of _firing modes_,
//!   each carrying timing, priority, weight and token conditions;
//! - per-station parameter tables (preloaded jobs, service times, fork out-paths,
//!   semaphore thresholds);
//! - a set of observation _measures_.
//!
//! The model is defined through a [`QpnModel`] by adding, one at a time,
//! new stations, classes, modes, connections and measures.
//! Stations and classes are referred to by the opaque handles
//! [`StationId`] and [`ClassId`] returned at creation;
//! the handles index into internal arenas and remain valid for the whole
//! life of the model.
//!
//! ```
//! # use qpn_core::{QpnModel, StationKind, ClassKind, ServerCount, Distribution};
//! let mut model = QpnModel::new();
//!
//! // Stations and classes are created through the model and referred to by handle
//! let place = model.add_station("P1", StationKind::Place);
//! let transition = model.add_station("T1", StationKind::Transition);
//! let class = model.add_class("Token", ClassKind::Closed, 2, None);
//!
//! // A transition is created with a single default immediate mode at index 0
//! assert_eq!(model.mode_count(transition).unwrap(), 1);
//!
//! // Connections are idempotent
//! model.set_connected(place, transition).unwrap();
//! model.set_connected(place, transition).unwrap();
//! assert_eq!(model.connection_count(), 1);
//!
//! // Mode parameters are assigned through the model
//! model
//!     .set_enabling_condition(transition, 0, place, class, 1)
//!     .unwrap();
//! ```

use hashbrown::HashMap;
use std::collections::BTreeMap;
use thiserror::Error;

/// An indexing object for stations in a model.
///
/// These cannot be directly created or manipulated,
/// but have to be provided by a [`QpnModel`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StationId(u16);

impl StationId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An indexing object for job classes in a model.
///
/// These cannot be directly created or manipulated,
/// but have to be provided by a [`QpnModel`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassId(u16);

/// Prefix of all generated mode names; the default mode a transition
/// station is created with is named `Mode0`.
pub const MODE_NAME: &str = "Mode";

/// The kind of a station, immutable once the station is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationKind {
    Place,
    Transition,
    Delay,
    Fork,
    Join,
    Semaphore,
    Server,
    Scaler,
    Source,
    Sink,
}

/// Whether a job class is open (jobs arrive from outside)
/// or closed (a fixed population circulates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Open,
    Closed,
}

/// A firing-time or service-time distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    /// Immediate, zero-time.
    Zero,
    /// Exponential with the given rate.
    Exponential(f64),
}

/// Number of servers of a transition mode.
///
/// The archive encodes [`ServerCount::Infinite`] as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCount {
    Finite(u32),
    Infinite,
}

/// A token condition or outcome of a firing mode:
/// the station it refers to, the class of the tokens and their count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub station: StationId,
    pub class: ClassId,
    pub tokens: u32,
}

/// One firing mode of a transition station.
///
/// Mode indices are contiguous starting at 0;
/// deleting a mode shifts all subsequent modes down.
#[derive(Debug, Clone)]
pub struct TransitionMode {
    pub name: String,
    pub servers: ServerCount,
    pub distribution: Distribution,
    /// Priority among co-enabled modes; `-1` marks a timed mode.
    pub priority: i32,
    pub weight: f64,
    pub enabling: Vec<Condition>,
    pub inhibiting: Vec<Condition>,
    pub outcomes: Vec<Condition>,
}

impl TransitionMode {
    fn immediate(name: String) -> Self {
        Self {
            name,
            servers: ServerCount::Finite(1),
            distribution: Distribution::Zero,
            priority: 0,
            weight: 1.0,
            enabling: Vec::new(),
            inhibiting: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

/// A station of the model.
#[derive(Debug, Clone)]
pub struct Station {
    pub name: String,
    pub kind: StationKind,
    pub(crate) modes: Vec<TransitionMode>,
}

/// A job class of the model.
#[derive(Debug, Clone)]
pub struct JobClass {
    pub name: String,
    pub kind: ClassKind,
    pub population: u32,
    /// Inter-arrival distribution of an open class.
    pub arrival: Option<Distribution>,
    pub reference: Option<StationId>,
}

/// One out-path entry of a fork station for a given class and target:
/// how many tokens are emitted toward the target and with what probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkPath {
    pub tokens: u32,
    pub probability: f64,
}

/// An observation measure on the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    /// Queue length of a class at a station.
    QueueLength(StationId, ClassId),
    /// Throughput of a class at a station.
    Throughput(StationId, ClassId),
    /// Firing throughput of a named mode of a transition station.
    FiringThroughput(StationId, String),
}

/// The error type for operations on a [`QpnModel`].
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// There is no such station in the model.
    #[error("station {0:?} does not belong to this model")]
    MissingStation(StationId),
    /// There is no such class in the model.
    #[error("class {0:?} does not belong to this model")]
    MissingClass(ClassId),
    /// The station has no mode with this index.
    #[error("station {0:?} has no mode with index {1}")]
    MissingMode(StationId, usize),
    /// The station is not a transition.
    #[error("station {0:?} is not a transition")]
    NotTransition(StationId),
    /// The station is not a fork.
    #[error("station {0:?} is not a fork")]
    NotFork(StationId),
    /// The station is not a semaphore.
    #[error("station {0:?} is not a semaphore")]
    NotSemaphore(StationId),
}

/// A queueing-Petri-net simulation model under construction.
///
/// Stations and classes are held in arenas indexed by [`StationId`] and [`ClassId`];
/// keyed parameter tables are ordered so that serialization is deterministic.
#[derive(Debug, Clone, Default)]
pub struct QpnModel {
    pub(crate) stations: Vec<Station>,
    pub(crate) classes: Vec<JobClass>,
    pub(crate) connections: Vec<(StationId, StationId)>,
    pub(crate) measures: Vec<Measure>,
    pub(crate) preloads: BTreeMap<(StationId, ClassId), u32>,
    pub(crate) service_times: BTreeMap<(StationId, ClassId), Distribution>,
    pub(crate) fork_paths: BTreeMap<(StationId, ClassId), BTreeMap<StationId, ForkPath>>,
    pub(crate) thresholds: BTreeMap<(StationId, ClassId), u32>,
    pub(crate) station_servers: BTreeMap<StationId, u32>,
    station_names: HashMap<String, StationId>,
    class_names: HashMap<String, ClassId>,
}

impl QpnModel {
    /// Creates a new, empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new station of the given kind to the model.
    ///
    /// A station of kind [`StationKind::Transition`] is created with a single
    /// default immediate mode at index 0 (1 server, zero firing time,
    /// priority 0, weight 1.0).
    pub fn add_station(&mut self, name: &str, kind: StationKind) -> StationId {
        let idx = self.stations.len();
        let modes = if kind == StationKind::Transition {
            vec![TransitionMode::immediate(format!("{MODE_NAME}0"))]
        } else {
            Vec::new()
        };
        self.stations.push(Station {
            name: name.to_owned(),
            kind,
            modes,
        });
        let id = StationId(idx as u16);
        self.station_names.insert(name.to_owned(), id);
        id
    }

    /// Adds a new job class to the model.
    pub fn add_class(
        &mut self,
        name: &str,
        kind: ClassKind,
        population: u32,
        arrival: Option<Distribution>,
    ) -> ClassId {
        let idx = self.classes.len();
        self.classes.push(JobClass {
            name: name.to_owned(),
            kind,
            population,
            arrival,
            reference: None,
        });
        let id = ClassId(idx as u16);
        self.class_names.insert(name.to_owned(), id);
        id
    }

    fn station(&self, station: StationId) -> Result<&Station, ModelError> {
        self.stations
            .get(station.0 as usize)
            .ok_or(ModelError::MissingStation(station))
    }

    fn station_mut(&mut self, station: StationId) -> Result<&mut Station, ModelError> {
        self.stations
            .get_mut(station.0 as usize)
            .ok_or(ModelError::MissingStation(station))
    }

    fn check_class(&self, class: ClassId) -> Result<(), ModelError> {
        if (class.0 as usize) < self.classes.len() {
            Ok(())
        } else {
            Err(ModelError::MissingClass(class))
        }
    }

    fn mode_mut(
        &mut self,
        station: StationId,
        index: usize,
    ) -> Result<&mut TransitionMode, ModelError> {
        let s = self
            .stations
            .get_mut(station.0 as usize)
            .ok_or(ModelError::MissingStation(station))?;
        if s.kind != StationKind::Transition {
            return Err(ModelError::NotTransition(station));
        }
        s.modes
            .get_mut(index)
            .ok_or(ModelError::MissingMode(station, index))
    }

    /// Sets the population of a closed class.
    pub fn set_class_population(
        &mut self,
        class: ClassId,
        population: u32,
    ) -> Result<(), ModelError> {
        let c = self
            .classes
            .get_mut(class.0 as usize)
            .ok_or(ModelError::MissingClass(class))?;
        c.population = population;
        Ok(())
    }

    /// Sets the reference station of a class.
    pub fn set_class_ref_station(
        &mut self,
        class: ClassId,
        station: StationId,
    ) -> Result<(), ModelError> {
        self.station(station)?;
        let c = self
            .classes
            .get_mut(class.0 as usize)
            .ok_or(ModelError::MissingClass(class))?;
        c.reference = Some(station);
        Ok(())
    }

    /// Connects two stations with a directed edge.
    ///
    /// Re-asserting an existing connection has no additional effect.
    pub fn set_connected(
        &mut self,
        source: StationId,
        target: StationId,
    ) -> Result<(), ModelError> {
        self.station(source)?;
        self.station(target)?;
        if !self.connections.contains(&(source, target)) {
            self.connections.push((source, target));
        }
        Ok(())
    }

    /// Appends a new mode with default immediate parameters to a transition station,
    /// returning its index.
    pub fn add_transition_mode(
        &mut self,
        station: StationId,
        name: &str,
    ) -> Result<usize, ModelError> {
        let s = self.station_mut(station)?;
        if s.kind != StationKind::Transition {
            return Err(ModelError::NotTransition(station));
        }
        let index = s.modes.len();
        s.modes.push(TransitionMode::immediate(name.to_owned()));
        Ok(index)
    }

    /// Deletes the mode with the given index from a transition station.
    /// All subsequent modes shift down by one index.
    pub fn delete_transition_mode(
        &mut self,
        station: StationId,
        index: usize,
    ) -> Result<(), ModelError> {
        let s = self.station_mut(station)?;
        if s.kind != StationKind::Transition {
            return Err(ModelError::NotTransition(station));
        }
        if index >= s.modes.len() {
            return Err(ModelError::MissingMode(station, index));
        }
        s.modes.remove(index);
        Ok(())
    }

    pub fn set_number_of_servers(
        &mut self,
        station: StationId,
        index: usize,
        servers: ServerCount,
    ) -> Result<(), ModelError> {
        self.mode_mut(station, index)?.servers = servers;
        Ok(())
    }

    pub fn set_firing_time_distribution(
        &mut self,
        station: StationId,
        index: usize,
        distribution: Distribution,
    ) -> Result<(), ModelError> {
        self.mode_mut(station, index)?.distribution = distribution;
        Ok(())
    }

    pub fn set_firing_priority(
        &mut self,
        station: StationId,
        index: usize,
        priority: i32,
    ) -> Result<(), ModelError> {
        self.mode_mut(station, index)?.priority = priority;
        Ok(())
    }

    pub fn set_firing_weight(
        &mut self,
        station: StationId,
        index: usize,
        weight: f64,
    ) -> Result<(), ModelError> {
        self.mode_mut(station, index)?.weight = weight;
        Ok(())
    }

    /// Adds an enabling condition to a firing mode:
    /// the mode requires `tokens` tokens of `class` at `source` to fire.
    pub fn set_enabling_condition(
        &mut self,
        station: StationId,
        index: usize,
        source: StationId,
        class: ClassId,
        tokens: u32,
    ) -> Result<(), ModelError> {
        self.station(source)?;
        self.check_class(class)?;
        self.mode_mut(station, index)?.enabling.push(Condition {
            station: source,
            class,
            tokens,
        });
        Ok(())
    }

    /// Adds an inhibiting condition to a firing mode:
    /// the mode is disabled while `tokens` tokens of `class` sit at `source`.
    pub fn set_inhibiting_condition(
        &mut self,
        station: StationId,
        index: usize,
        source: StationId,
        class: ClassId,
        tokens: u32,
    ) -> Result<(), ModelError> {
        self.station(source)?;
        self.check_class(class)?;
        self.mode_mut(station, index)?.inhibiting.push(Condition {
            station: source,
            class,
            tokens,
        });
        Ok(())
    }

    /// Adds a firing outcome to a firing mode:
    /// firing produces `tokens` tokens of `class` at `target`.
    pub fn set_firing_outcome(
        &mut self,
        station: StationId,
        index: usize,
        target: StationId,
        class: ClassId,
        tokens: u32,
    ) -> Result<(), ModelError> {
        self.station(target)?;
        self.check_class(class)?;
        self.mode_mut(station, index)?.outcomes.push(Condition {
            station: target,
            class,
            tokens,
        });
        Ok(())
    }

    /// Preloads a number of jobs of a class at a station.
    pub fn set_preloaded_jobs(
        &mut self,
        station: StationId,
        class: ClassId,
        jobs: u32,
    ) -> Result<(), ModelError> {
        self.station(station)?;
        self.check_class(class)?;
        self.preloads.insert((station, class), jobs);
        Ok(())
    }

    /// Sets the per-class service-time distribution of a station.
    pub fn set_service_time_distribution(
        &mut self,
        station: StationId,
        class: ClassId,
        distribution: Distribution,
    ) -> Result<(), ModelError> {
        self.station(station)?;
        self.check_class(class)?;
        self.service_times.insert((station, class), distribution);
        Ok(())
    }

    /// Sets one out-path entry of a fork station for a class:
    /// toward `target`, emit `tokens` tokens with the given probability.
    pub fn set_fork_out_path(
        &mut self,
        fork: StationId,
        class: ClassId,
        target: StationId,
        tokens: u32,
        probability: f64,
    ) -> Result<(), ModelError> {
        if self.station(fork)?.kind != StationKind::Fork {
            return Err(ModelError::NotFork(fork));
        }
        self.station(target)?;
        self.check_class(class)?;
        self.fork_paths.entry((fork, class)).or_default().insert(
            target,
            ForkPath {
                tokens,
                probability,
            },
        );
        Ok(())
    }

    /// Sets the per-class token threshold of a semaphore station.
    pub fn set_semaphore_threshold(
        &mut self,
        station: StationId,
        class: ClassId,
        tokens: u32,
    ) -> Result<(), ModelError> {
        if self.station(station)?.kind != StationKind::Semaphore {
            return Err(ModelError::NotSemaphore(station));
        }
        self.check_class(class)?;
        self.thresholds.insert((station, class), tokens);
        Ok(())
    }

    /// Sets the station-level number of servers (fork or scaler degree).
    pub fn set_station_servers(
        &mut self,
        station: StationId,
        servers: u32,
    ) -> Result<(), ModelError> {
        self.station(station)?;
        self.station_servers.insert(station, servers);
        Ok(())
    }

    /// Adds an observation measure.
    pub fn add_measure(&mut self, measure: Measure) -> Result<(), ModelError> {
        match &measure {
            Measure::QueueLength(station, class) | Measure::Throughput(station, class) => {
                self.station(*station)?;
                self.check_class(*class)?;
            }
            Measure::FiringThroughput(station, _) => {
                if self.station(*station)?.kind != StationKind::Transition {
                    return Err(ModelError::NotTransition(*station));
                }
            }
        }
        self.measures.push(measure);
        Ok(())
    }

    /// Returns the name of a station.
    pub fn station_name(&self, station: StationId) -> Result<&str, ModelError> {
        self.station(station).map(|s| s.name.as_str())
    }

    /// Returns the kind of a station.
    pub fn station_kind(&self, station: StationId) -> Result<StationKind, ModelError> {
        self.station(station).map(|s| s.kind)
    }

    /// Looks up a station by name.
    pub fn station_by_name(&self, name: &str) -> Option<StationId> {
        self.station_names.get(name).copied()
    }

    /// Looks up a class by name.
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    pub fn class(&self, class: ClassId) -> Result<&JobClass, ModelError> {
        self.classes
            .get(class.0 as usize)
            .ok_or(ModelError::MissingClass(class))
    }

    pub fn class_name(&self, class: ClassId) -> Result<&str, ModelError> {
        self.class(class).map(|c| c.name.as_str())
    }

    pub fn class_population(&self, class: ClassId) -> Result<u32, ModelError> {
        self.class(class).map(|c| c.population)
    }

    /// Returns the number of modes of a transition station.
    pub fn mode_count(&self, station: StationId) -> Result<usize, ModelError> {
        let s = self.station(station)?;
        if s.kind != StationKind::Transition {
            return Err(ModelError::NotTransition(station));
        }
        Ok(s.modes.len())
    }

    /// Returns a mode of a transition station.
    pub fn mode(&self, station: StationId, index: usize) -> Result<&TransitionMode, ModelError> {
        let s = self.station(station)?;
        if s.kind != StationKind::Transition {
            return Err(ModelError::NotTransition(station));
        }
        s.modes
            .get(index)
            .ok_or(ModelError::MissingMode(station, index))
    }

    /// Returns the name of a mode of a transition station.
    pub fn mode_name(&self, station: StationId, index: usize) -> Result<&str, ModelError> {
        self.mode(station, index).map(|m| m.name.as_str())
    }

    /// Iterates over all station handles in creation order.
    pub fn stations(&self) -> impl Iterator<Item = StationId> + '_ {
        (0..self.stations.len()).map(|idx| StationId(idx as u16))
    }

    /// Iterates over all class handles in creation order.
    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len()).map(|idx| ClassId(idx as u16))
    }

    /// Returns the handles of all stations of the given kind, in creation order.
    pub fn stations_of_kind(&self, kind: StationKind) -> Vec<StationId> {
        self.stations()
            .filter(|id| self.stations[id.0 as usize].kind == kind)
            .collect()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> &[(StationId, StationId)] {
        &self.connections
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn preloaded_jobs(&self, station: StationId, class: ClassId) -> u32 {
        self.preloads.get(&(station, class)).copied().unwrap_or(0)
    }

    pub fn service_time_distribution(
        &self,
        station: StationId,
        class: ClassId,
    ) -> Option<Distribution> {
        self.service_times.get(&(station, class)).copied()
    }

    pub fn fork_out_path(
        &self,
        fork: StationId,
        class: ClassId,
        target: StationId,
    ) -> Option<ForkPath> {
        self.fork_paths
            .get(&(fork, class))
            .and_then(|paths| paths.get(&target))
            .copied()
    }

    pub fn semaphore_threshold(&self, station: StationId, class: ClassId) -> Option<u32> {
        self.thresholds.get(&(station, class)).copied()
    }

    pub fn station_server_count(&self, station: StationId) -> Option<u32> {
        self.station_servers.get(&station).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_default_mode() {
        let mut model = QpnModel::new();
        let t = model.add_station("T1", StationKind::Transition);
        assert_eq!(model.mode_count(t).unwrap(), 1);
        let mode = model.mode(t, 0).unwrap();
        assert_eq!(mode.name, "Mode0");
        assert_eq!(mode.servers, ServerCount::Finite(1));
        assert_eq!(mode.distribution, Distribution::Zero);
        assert_eq!(mode.priority, 0);
        assert_eq!(mode.weight, 1.0);
    }

    #[test]
    fn mode_indices_stay_contiguous() {
        let mut model = QpnModel::new();
        let t = model.add_station("T1", StationKind::Transition);
        assert_eq!(model.add_transition_mode(t, "Mode0").unwrap(), 1);
        assert_eq!(model.add_transition_mode(t, "Mode1").unwrap(), 2);
        model.delete_transition_mode(t, 0).unwrap();
        assert_eq!(model.mode_count(t).unwrap(), 2);
        assert_eq!(model.mode_name(t, 0).unwrap(), "Mode0");
        assert_eq!(model.mode_name(t, 1).unwrap(), "Mode1");
        model
            .delete_transition_mode(t, 2)
            .expect_err("index out of range");
    }

    #[test]
    fn connections_are_idempotent() {
        let mut model = QpnModel::new();
        let a = model.add_station("A", StationKind::Place);
        let b = model.add_station("B", StationKind::Transition);
        model.set_connected(a, b).unwrap();
        model.set_connected(a, b).unwrap();
        model.set_connected(b, a).unwrap();
        assert_eq!(model.connection_count(), 2);
    }

    #[test]
    fn non_transition_has_no_modes() {
        let mut model = QpnModel::new();
        let p = model.add_station("P1", StationKind::Place);
        assert!(matches!(
            model.add_transition_mode(p, "Mode0"),
            Err(ModelError::NotTransition(_))
        ));
        assert!(matches!(
            model.mode_count(p),
            Err(ModelError::NotTransition(_))
        ));
    }

    #[test]
    fn fork_path_requires_fork() {
        let mut model = QpnModel::new();
        let p = model.add_station("P1", StationKind::Place);
        let f = model.add_station("F1", StationKind::Fork);
        let c = model.add_class("Job0", ClassKind::Closed, 1, None);
        model.set_fork_out_path(f, c, p, 3, 1.0).unwrap();
        assert_eq!(
            model.fork_out_path(f, c, p),
            Some(ForkPath {
                tokens: 3,
                probability: 1.0
            })
        );
        assert!(matches!(
            model.set_fork_out_path(p, c, f, 3, 1.0),
            Err(ModelError::NotFork(_))
        ));
    }

    #[test]
    fn lookup_by_name() {
        let mut model = QpnModel::new();
        let p = model.add_station("JobQueue", StationKind::Place);
        let c = model.add_class("Job0", ClassKind::Closed, 4, None);
        assert_eq!(model.station_by_name("JobQueue"), Some(p));
        assert_eq!(model.class_by_name("Job0"), Some(c));
        assert_eq!(model.station_by_name("NoSuch"), None);
    }
}
