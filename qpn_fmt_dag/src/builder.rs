//! Translation of a pipeline description into an open queueing model.
//!
//! The connection list is folded back into a linear processing
//! sequence, each node becomes a bank of parallel queues scaled by its
//! input degree, and a single open class flows from source to sink.

use crate::parser::{DagDocument, DagNode};
use anyhow::Context;
use log::info;
use qpn_core::{ClassKind, Distribution, QpnModel, StationId, StationKind};
use thiserror::Error;

/// Rate of the open class's inter-arrival distribution.
const ARRIVAL_RATE: f64 = 0.5;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("connection list declares no head node")]
    MissingHead,
    #[error("no connection leaves node `{0}`")]
    BrokenChain(String),
    #[error("connection references undeclared node `{0}`")]
    UnknownNode(String),
}

// The head is the first source that never appears as a target; each
// following element is the target of its predecessor's connection.
fn processing_sequence(document: &DagDocument) -> Result<Vec<String>, BuilderError> {
    let head = document
        .connections
        .iter()
        .map(|c| c.source.as_str())
        .find(|src| !document.connections.iter().any(|c| c.target == *src))
        .ok_or(BuilderError::MissingHead)?;
    let mut sequence = vec![head.to_string()];
    for _ in 0..document.connections.len() {
        let last = sequence.last().expect("sequence is never empty");
        let next = document
            .connections
            .iter()
            .find(|c| &c.source == last)
            .ok_or_else(|| BuilderError::BrokenChain(last.clone()))?;
        sequence.push(next.target.clone());
    }
    Ok(sequence)
}

struct NodeParams {
    parallelism: u32,
    input_degree: u32,
}

fn node_params(node: &DagNode) -> anyhow::Result<NodeParams> {
    let parallelism = node.paralellism_level.trim().parse().with_context(|| {
        format!("failed to parse parallelism level of node '{}'", node.name)
    })?;
    let input_degree = node
        .input_degree
        .trim()
        .parse()
        .with_context(|| format!("failed to parse input degree of node '{}'", node.name))?;
    Ok(NodeParams {
        parallelism,
        input_degree,
    })
}

/// Builds a [`QpnModel`] out of an imported [`DagDocument`].
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Translates the pipeline description into an open queueing model.
    pub fn visit(document: &DagDocument) -> anyhow::Result<QpnModel> {
        let sequence = processing_sequence(document)?;
        info!(
            target: "builder",
            "building pipeline of {} stage(s)",
            sequence.len(),
        );
        let params: Vec<NodeParams> = sequence
            .iter()
            .map(|name| {
                let node = document
                    .node_by_name(name)
                    .ok_or_else(|| BuilderError::UnknownNode(name.clone()))?;
                node_params(node)
            })
            .collect::<anyhow::Result<_>>()?;

        let mut model = QpnModel::new();
        let queues: Vec<Vec<StationId>> = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                (0..p.parallelism)
                    .map(|j| {
                        model.add_station(
                            &format!("Queue {}_{}", i + 1, j + 1),
                            StationKind::Server,
                        )
                    })
                    .collect()
            })
            .collect();

        let fork = model.add_station("Fork 1", StationKind::Fork);
        model.set_station_servers(fork, params[0].input_degree)?;
        let join = model.add_station("Join 1", StationKind::Join);
        let mut scalers = vec![None];
        for (i, p) in params.iter().enumerate().skip(1) {
            let scaler = model.add_station(&format!("Scaler {i}"), StationKind::Scaler);
            model.set_station_servers(scaler, p.input_degree)?;
            scalers.push(Some(scaler));
        }

        let class = model.add_class(
            "Class1",
            ClassKind::Open,
            0,
            Some(Distribution::Exponential(ARRIVAL_RATE)),
        );
        let source = model.add_station("Source 1", StationKind::Source);
        let sink = model.add_station("Sink 1", StationKind::Sink);
        model.set_class_ref_station(class, source)?;

        model.set_connected(source, fork)?;
        for (i, bank) in queues.iter().enumerate() {
            let upstream = scalers[i].unwrap_or(fork);
            let downstream = scalers.get(i + 1).copied().flatten().unwrap_or(join);
            for &queue in bank {
                model.set_connected(upstream, queue)?;
                model.set_connected(queue, downstream)?;
            }
        }
        model.set_connected(join, sink)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DagConnection;

    fn node(name: &str, parallelism: &str, degree: &str) -> DagNode {
        DagNode {
            name: name.to_string(),
            paralellism_level: parallelism.to_string(),
            input_degree: degree.to_string(),
        }
    }

    fn connection(source: &str, target: &str) -> DagConnection {
        DagConnection {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn sequence_starts_at_the_unreferenced_source() {
        let document = DagDocument {
            nodes: vec![node("a", "1", "1"), node("b", "1", "1"), node("c", "1", "1")],
            connections: vec![connection("b", "c"), connection("a", "b")],
        };
        assert_eq!(processing_sequence(&document).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn cyclic_connections_have_no_head() {
        let document = DagDocument {
            nodes: vec![node("a", "1", "1"), node("b", "1", "1")],
            connections: vec![connection("a", "b"), connection("b", "a")],
        };
        assert!(matches!(
            processing_sequence(&document),
            Err(BuilderError::MissingHead)
        ));
    }

    #[test]
    fn pipeline_stations_and_wiring() {
        let document = DagDocument {
            nodes: vec![node("a", "2", "3"), node("b", "1", "2"), node("c", "1", "1")],
            connections: vec![connection("a", "b"), connection("b", "c")],
        };
        let model = PipelineBuilder::visit(&document).unwrap();
        // 4 queues + fork + join + 2 scalers + source + sink
        assert_eq!(model.station_count(), 10);
        let fork = model.station_by_name("Fork 1").unwrap();
        let q11 = model.station_by_name("Queue 1_1").unwrap();
        let q12 = model.station_by_name("Queue 1_2").unwrap();
        let s1 = model.station_by_name("Scaler 1").unwrap();
        let s2 = model.station_by_name("Scaler 2").unwrap();
        let q31 = model.station_by_name("Queue 3_1").unwrap();
        let join = model.station_by_name("Join 1").unwrap();
        let sink = model.station_by_name("Sink 1").unwrap();
        assert_eq!(model.station_server_count(fork), Some(3));
        assert_eq!(model.station_server_count(s1), Some(2));
        assert!(model.connections().contains(&(fork, q11)));
        assert!(model.connections().contains(&(fork, q12)));
        assert!(model.connections().contains(&(q11, s1)));
        assert!(model.connections().contains(&(s2, q31)));
        assert!(model.connections().contains(&(q31, join)));
        assert!(model.connections().contains(&(join, sink)));
    }

    #[test]
    fn open_class_references_the_source() {
        let document = DagDocument {
            nodes: vec![node("a", "1", "1"), node("b", "1", "1")],
            connections: vec![connection("a", "b")],
        };
        let model = PipelineBuilder::visit(&document).unwrap();
        let class = model.class_by_name("Class1").unwrap();
        let source = model.station_by_name("Source 1").unwrap();
        let job_class = model.class(class).unwrap();
        assert_eq!(job_class.kind, ClassKind::Open);
        assert_eq!(
            job_class.arrival,
            Some(Distribution::Exponential(ARRIVAL_RATE))
        );
        assert_eq!(job_class.reference, Some(source));
    }

    #[test]
    fn undeclared_node_is_fatal() {
        let document = DagDocument {
            nodes: vec![node("a", "1", "1")],
            connections: vec![connection("a", "b")],
        };
        assert!(PipelineBuilder::visit(&document).is_err());
    }
}
