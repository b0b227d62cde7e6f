//! Translation of an imported PNML document into a simulation model.
//!
//! Every place and transition becomes a station carrying the document
//! id as its name, a single closed `Token` class aggregates all initial
//! markings, and each arc contributes a connection plus a token
//! condition on firing mode 0.

use crate::annotation::AnnotationParam;
use crate::parser::{PnmlArc, PnmlDocument};
use log::{info, trace, warn};
use qpn_core::{
    ClassId, ClassKind, Distribution, Measure, QpnModel, ServerCount, StationId, StationKind,
};
use std::collections::HashMap;

const CLASS_NAME: &str = "Token";

/// Builds a [`QpnModel`] out of an imported [`PnmlDocument`].
pub struct ModelBuilder {
    model: QpnModel,
    class: ClassId,
    nodes: HashMap<String, StationId>,
}

impl ModelBuilder {
    /// Translates the document into a simulation model.
    ///
    /// When an index list is given, its entries select which stations
    /// are observed; otherwise (or when no entry resolves) every place
    /// gets a queue-length measure and every transition a
    /// firing-throughput measure.
    pub fn visit(document: &PnmlDocument, index: Option<&[String]>) -> anyhow::Result<QpnModel> {
        info!(target: "builder", "building GSPN model");
        let mut model = QpnModel::new();
        let class = model.add_class(CLASS_NAME, ClassKind::Closed, 0, None);
        let mut builder = ModelBuilder {
            model,
            class,
            nodes: HashMap::new(),
        };
        builder.build_places(document)?;
        builder.build_transitions(document)?;
        builder.set_reference_station()?;
        for arc in &document.arcs {
            builder.build_arc(arc)?;
        }
        builder.build_measures(index)?;
        info!(
            target: "builder",
            "GSPN model built: {} stations, {} connections",
            builder.model.station_count(),
            builder.model.connection_count(),
        );
        Ok(builder.model)
    }

    fn build_places(&mut self, document: &PnmlDocument) -> anyhow::Result<()> {
        let population: u32 = document.places.iter().map(|p| p.marking).sum();
        self.model.set_class_population(self.class, population)?;
        for place in &document.places {
            let station = self.model.add_station(&place.id, StationKind::Place);
            self.nodes.insert(place.id.clone(), station);
            self.model
                .set_preloaded_jobs(station, self.class, place.marking)?;
            // No place grammar is recognized, but malformed payloads still surface.
            for specific in &place.specifics {
                AnnotationParam::decode(specific)?;
            }
        }
        Ok(())
    }

    fn build_transitions(&mut self, document: &PnmlDocument) -> anyhow::Result<()> {
        for transition in &document.transitions {
            let station = self.model.add_station(&transition.id, StationKind::Transition);
            self.nodes.insert(transition.id.clone(), station);
            for specific in &transition.specifics {
                match AnnotationParam::decode(specific)? {
                    AnnotationParam::InfiniteServers => {
                        self.model
                            .set_number_of_servers(station, 0, ServerCount::Infinite)?;
                    }
                    AnnotationParam::ExponentialFiring(rate) => {
                        self.model.set_firing_time_distribution(
                            station,
                            0,
                            Distribution::Exponential(rate),
                        )?;
                        self.model.set_firing_priority(station, 0, -1)?;
                        self.model.set_firing_weight(station, 0, 1.0)?;
                    }
                    AnnotationParam::FiringPriority(priority) => {
                        self.model.set_firing_priority(station, 0, priority)?;
                    }
                    AnnotationParam::FiringWeight(weight) => {
                        self.model.set_firing_weight(station, 0, weight)?;
                    }
                    param => {
                        trace!(target: "builder", "skipping transition annotation {param:?}");
                    }
                }
            }
        }
        Ok(())
    }

    // The reference station is the first place, or the first transition
    // of a net without places.
    fn set_reference_station(&mut self) -> anyhow::Result<()> {
        let reference = self
            .model
            .stations_of_kind(StationKind::Place)
            .first()
            .copied()
            .or_else(|| {
                self.model
                    .stations_of_kind(StationKind::Transition)
                    .first()
                    .copied()
            });
        if let Some(station) = reference {
            self.model.set_class_ref_station(self.class, station)?;
        }
        Ok(())
    }

    fn build_arc(&mut self, arc: &PnmlArc) -> anyhow::Result<()> {
        let (Some(&source), Some(&target)) =
            (self.nodes.get(&arc.source), self.nodes.get(&arc.target))
        else {
            warn!(
                target: "builder",
                "dropping arc '{}': unresolved endpoint '{}' or '{}'",
                arc.id, arc.source, arc.target,
            );
            return Ok(());
        };
        self.model.set_connected(source, target)?;
        let mut inhibitor = false;
        for specific in &arc.specifics {
            if AnnotationParam::decode(specific)? == AnnotationParam::InhibitorArc {
                inhibitor = true;
            }
        }
        let tokens = arc.inscription.unwrap_or(1);
        if self.model.station_kind(target)? == StationKind::Transition {
            if inhibitor {
                self.model
                    .set_inhibiting_condition(target, 0, source, self.class, tokens)?;
            } else {
                self.model
                    .set_enabling_condition(target, 0, source, self.class, tokens)?;
            }
        } else if self.model.station_kind(source)? == StationKind::Transition {
            self.model
                .set_firing_outcome(source, 0, target, self.class, tokens)?;
        } else {
            warn!(
                target: "builder",
                "dropping token outcome of arc '{}': source '{}' is not a transition",
                arc.id, arc.source,
            );
        }
        Ok(())
    }

    fn build_measures(&mut self, index: Option<&[String]>) -> anyhow::Result<()> {
        if let Some(ids) = index {
            for id in ids {
                match self.nodes.get(id) {
                    Some(&station) => self.add_station_measure(station)?,
                    None => {
                        warn!(target: "builder", "index entry '{id}' matches no station");
                    }
                }
            }
        }
        if self.model.measures().is_empty() {
            // Nothing selected: observe everything, in creation order.
            for station in self.model.stations().collect::<Vec<_>>() {
                self.add_station_measure(station)?;
            }
        }
        Ok(())
    }

    fn add_station_measure(&mut self, station: StationId) -> anyhow::Result<()> {
        match self.model.station_kind(station)? {
            StationKind::Place => {
                self.model
                    .add_measure(Measure::QueueLength(station, self.class))?;
            }
            StationKind::Transition => {
                let mode = self.model.mode_name(station, 0)?.to_owned();
                self.model
                    .add_measure(Measure::FiringThroughput(station, mode))?;
            }
            kind => {
                warn!(target: "builder", "no measure defined for {kind:?} stations");
            }
        }
        Ok(())
    }
}
