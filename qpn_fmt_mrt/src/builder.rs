//! Instantiation of MapReduce templates into the base model.
//!
//! Each template contributes a fork/queue/semaphore/join ladder: a
//! map-side fork feeding the mapper queues into a semaphore and join,
//! then a reduce-side fork feeding the reducer queues into the closing
//! join. Declared inputs and outputs are wired once every template has
//! been instantiated, so templates may reference one another by name.

use crate::parser::{MrtDocument, MrtTemplate};
use log::{info, warn};
use qpn_core::{QpnModel, StationId, StationKind};

/// Builds a [`QpnModel`] out of an imported [`MrtDocument`].
pub struct TemplateBuilder {
    model: QpnModel,
    /// Per template: (map-side fork, reduce-side fork).
    forks: Vec<(StationId, StationId)>,
    /// Per template: (semaphore join, closing join).
    joins: Vec<(StationId, StationId)>,
}

impl TemplateBuilder {
    /// Instantiates every declared template into the document's base model.
    pub fn visit(document: MrtDocument) -> anyhow::Result<QpnModel> {
        info!(
            target: "builder",
            "instantiating {} MapReduce template(s)",
            document.templates.len(),
        );
        let mut builder = TemplateBuilder {
            model: document.model,
            forks: Vec::with_capacity(document.templates.len()),
            joins: Vec::with_capacity(document.templates.len()),
        };
        for (i, template) in document.templates.iter().enumerate() {
            builder.build_template(i, template)?;
        }
        for (i, template) in document.templates.iter().enumerate() {
            builder.link_template(i, template, &document.templates)?;
        }
        Ok(builder.model)
    }

    fn build_template(&mut self, i: usize, template: &MrtTemplate) -> anyhow::Result<()> {
        let n = i + 1;
        let map_fork = self
            .model
            .add_station(&format!("Fork {n}_1"), StationKind::Fork);
        let red_fork = self
            .model
            .add_station(&format!("Fork {n}_2"), StationKind::Fork);
        let queues: Vec<StationId> = (0..template.mappers + template.reducers)
            .map(|j| {
                self.model
                    .add_station(&format!("Queue {n}_{}", j + 1), StationKind::Server)
            })
            .collect();
        let semaphore = self
            .model
            .add_station(&format!("Semaphore {n}"), StationKind::Semaphore);
        let map_join = self
            .model
            .add_station(&format!("Join {n}_1"), StationKind::Join);
        let red_join = self
            .model
            .add_station(&format!("Join {n}_2"), StationKind::Join);

        for (j, &queue) in queues.iter().enumerate() {
            if (j as u32) < template.mappers {
                self.model.set_connected(map_fork, queue)?;
                self.model.set_connected(queue, semaphore)?;
            } else {
                self.model.set_connected(red_fork, queue)?;
                self.model.set_connected(queue, red_join)?;
            }
        }
        self.model.set_connected(semaphore, map_join)?;
        self.model.set_connected(map_join, red_fork)?;

        self.model.set_station_servers(map_fork, template.map_degree)?;
        self.model.set_station_servers(red_fork, template.red_degree)?;
        for (class_name, tokens) in &template.thresholds {
            match self.model.class_by_name(class_name) {
                Some(class) if *tokens > 0 => {
                    self.model.set_semaphore_threshold(semaphore, class, *tokens)?;
                }
                Some(_) => {}
                None => {
                    warn!(target: "builder", "threshold names unknown class '{class_name}'");
                }
            }
        }

        self.forks.push((map_fork, red_fork));
        self.joins.push((map_join, red_join));
        Ok(())
    }

    // A declared name resolves to the station of that name if one
    // exists, else to the named template's closing join (as input) or
    // map-side fork (as output). Unresolvable names wire nothing.
    fn resolve(
        &self,
        name: &str,
        templates: &[MrtTemplate],
        as_input: bool,
    ) -> Option<StationId> {
        if let Some(station) = self.model.station_by_name(name) {
            return Some(station);
        }
        let idx = templates
            .iter()
            .position(|t| t.name.as_deref() == Some(name))?;
        Some(if as_input {
            self.joins[idx].1
        } else {
            self.forks[idx].0
        })
    }

    fn link_template(
        &mut self,
        i: usize,
        template: &MrtTemplate,
        templates: &[MrtTemplate],
    ) -> anyhow::Result<()> {
        if let Some(name) = template.input.as_deref() {
            match self.resolve(name, templates, true) {
                Some(station) => self.model.set_connected(station, self.forks[i].0)?,
                None => warn!(target: "builder", "input '{name}' resolves to nothing"),
            }
        }
        if let Some(name) = template.output.as_deref() {
            match self.resolve(name, templates, false) {
                Some(station) => self.model.set_connected(self.joins[i].1, station)?,
                None => warn!(target: "builder", "output '{name}' resolves to nothing"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpn_core::ClassKind;

    fn template(name: &str, mappers: u32, reducers: u32) -> MrtTemplate {
        MrtTemplate {
            name: Some(name.to_string()),
            map_degree: mappers,
            red_degree: reducers,
            mappers,
            reducers,
            ..MrtTemplate::default()
        }
    }

    #[test]
    fn template_stations_and_wiring() {
        let document = MrtDocument {
            model: QpnModel::new(),
            templates: vec![template("mr1", 2, 1)],
        };
        let model = TemplateBuilder::visit(document).unwrap();
        // 2 forks + 3 queues + semaphore + 2 joins
        assert_eq!(model.station_count(), 8);
        let fork = model.station_by_name("Fork 1_1").unwrap();
        let q1 = model.station_by_name("Queue 1_1").unwrap();
        let q3 = model.station_by_name("Queue 1_3").unwrap();
        let semaphore = model.station_by_name("Semaphore 1").unwrap();
        let red_fork = model.station_by_name("Fork 1_2").unwrap();
        let red_join = model.station_by_name("Join 1_2").unwrap();
        assert!(model.connections().contains(&(fork, q1)));
        assert!(model.connections().contains(&(q1, semaphore)));
        assert!(model.connections().contains(&(red_fork, q3)));
        assert!(model.connections().contains(&(q3, red_join)));
        assert_eq!(model.station_server_count(fork), Some(2));
        assert_eq!(model.station_server_count(red_fork), Some(1));
    }

    #[test]
    fn templates_link_by_name() {
        let mut first = template("mr1", 1, 1);
        first.output = Some("mr2".to_string());
        let mut second = template("mr2", 1, 1);
        second.input = Some("mr1".to_string());
        let document = MrtDocument {
            model: QpnModel::new(),
            templates: vec![first, second],
        };
        let model = TemplateBuilder::visit(document).unwrap();
        let first_join = model.station_by_name("Join 1_2").unwrap();
        let second_fork = model.station_by_name("Fork 2_1").unwrap();
        assert!(model.connections().contains(&(first_join, second_fork)));
    }

    #[test]
    fn station_name_wins_over_template_name() {
        let mut model = QpnModel::new();
        let source = model.add_station("mr2", StationKind::Server);
        let mut first = template("mr1", 1, 1);
        first.input = Some("mr2".to_string());
        let second = template("mr2", 1, 1);
        let document = MrtDocument {
            model,
            templates: vec![first, second],
        };
        let model = TemplateBuilder::visit(document).unwrap();
        let fork = model.station_by_name("Fork 1_1").unwrap();
        assert!(model.connections().contains(&(source, fork)));
    }

    #[test]
    fn unknown_threshold_class_selects_nothing() {
        let mut base = QpnModel::new();
        base.add_class("Class1", ClassKind::Closed, 1, None);
        let mut t = template("mr1", 1, 1);
        t.thresholds = vec![
            ("Class1".to_string(), 3),
            ("NoSuch".to_string(), 2),
            ("Class1".to_string(), 0),
        ];
        let document = MrtDocument {
            model: base,
            templates: vec![t],
        };
        let model = TemplateBuilder::visit(document).unwrap();
        let semaphore = model.station_by_name("Semaphore 1").unwrap();
        let class = model.class_by_name("Class1").unwrap();
        assert_eq!(model.semaphore_threshold(semaphore, class), Some(3));
    }
}
