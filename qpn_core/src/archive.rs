//! Persistence of a [`QpnModel`] as a simulation archive.
//!
//! An archive is an XML file with an `archive` root holding one `sim`
//! element: the model's classes, stations (with their parameter tables and
//! firing modes), connections and measures. Output is deterministic:
//! stations and classes in arena order, connections and measures in
//! insertion order, keyed tables in key order.
//!
//! The loader resolves name references only after the whole `sim` element
//! has been read, so forward references among stations are legal. The
//! `sim` reader is exposed on its own ([`read_sim`]) for documents that
//! embed a base model inside a larger file.

use crate::model::{
    ClassKind, Distribution, Measure, ModelError, QpnModel, ServerCount, StationKind,
};
use anyhow::{anyhow, bail, Context};
use log::{info, trace, warn};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Seek};
use std::path::Path;
use thiserror::Error;

const TAG_ARCHIVE: &str = "archive";
const TAG_SIM: &str = "sim";
const TAG_USER_CLASS: &str = "userClass";
const TAG_STATION: &str = "station";
const TAG_MODE: &str = "mode";
const TAG_ENABLING: &str = "enabling";
const TAG_INHIBITING: &str = "inhibiting";
const TAG_OUTCOME: &str = "outcome";
const TAG_PRELOAD: &str = "preload";
const TAG_SERVICE_TIME: &str = "serviceTime";
const TAG_FORK_PATH: &str = "forkPath";
const TAG_THRESHOLD: &str = "threshold";
const TAG_CONNECTION: &str = "connection";
const TAG_MEASURE: &str = "measure";

const ATTR_NAME: &str = "name";
const ATTR_TYPE: &str = "type";
const ATTR_POPULATION: &str = "population";
const ATTR_LAMBDA: &str = "lambda";
const ATTR_REFERENCE: &str = "referenceStation";
const ATTR_SERVERS: &str = "servers";
const ATTR_PRIORITY: &str = "priority";
const ATTR_WEIGHT: &str = "weight";
const ATTR_DISTRIBUTION: &str = "distribution";
const ATTR_STATION: &str = "station";
const ATTR_CLASS: &str = "class";
const ATTR_TOKENS: &str = "tokens";
const ATTR_JOBS: &str = "jobs";
const ATTR_TARGET: &str = "target";
const ATTR_PROBABILITY: &str = "probability";
const ATTR_SOURCE: &str = "source";
const ATTR_MODE: &str = "mode";

const DISTRIBUTION_ZERO: &str = "zero";
const DISTRIBUTION_EXPONENTIAL: &str = "exponential";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("unknown or unexpected tag `{0}`")]
    UnexpectedTag(String),
    #[error("unknown or unexpected end tag `{0}`")]
    UnexpectedEndTag(String),
    #[error("missing required attribute `{0}`")]
    MissingAttr(String),
    #[error("unknown station kind `{0}`")]
    UnknownStationKind(String),
    #[error("unknown class kind `{0}`")]
    UnknownClassKind(String),
    #[error("unknown distribution `{0}`")]
    UnknownDistribution(String),
    #[error("unknown measure type `{0}`")]
    UnknownMeasureType(String),
    #[error("unresolved station name `{0}`")]
    UnresolvedStation(String),
    #[error("unresolved class name `{0}`")]
    UnresolvedClass(String),
    #[error("no `sim` element found")]
    NoSim,
}

fn station_kind_name(kind: StationKind) -> &'static str {
    match kind {
        StationKind::Place => "place",
        StationKind::Transition => "transition",
        StationKind::Delay => "delay",
        StationKind::Fork => "fork",
        StationKind::Join => "join",
        StationKind::Semaphore => "semaphore",
        StationKind::Server => "server",
        StationKind::Scaler => "scaler",
        StationKind::Source => "source",
        StationKind::Sink => "sink",
    }
}

fn station_kind_from_name(name: &str) -> Result<StationKind, ArchiveError> {
    match name {
        "place" => Ok(StationKind::Place),
        "transition" => Ok(StationKind::Transition),
        "delay" => Ok(StationKind::Delay),
        "fork" => Ok(StationKind::Fork),
        "join" => Ok(StationKind::Join),
        "semaphore" => Ok(StationKind::Semaphore),
        "server" => Ok(StationKind::Server),
        "scaler" => Ok(StationKind::Scaler),
        "source" => Ok(StationKind::Source),
        "sink" => Ok(StationKind::Sink),
        _ => Err(ArchiveError::UnknownStationKind(name.to_string())),
    }
}

/// Saves a model to the given path as a simulation archive.
pub fn save_model(path: &Path, model: &QpnModel) -> anyhow::Result<()> {
    info!(target: "archive", "saving model to '{}'", path.display());
    let file = File::create(path)
        .with_context(|| format!("failed to create archive file '{}'", path.display()))?;
    let mut xml = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml.write_event(Event::Start(BytesStart::new(TAG_ARCHIVE)))?;
    xml.write_event(Event::Start(BytesStart::new(TAG_SIM)))?;

    for class_id in model.classes() {
        let class = model.class(class_id)?;
        let mut tag = BytesStart::new(TAG_USER_CLASS);
        tag.push_attribute((ATTR_NAME, class.name.as_str()));
        let kind = match class.kind {
            ClassKind::Open => "open",
            ClassKind::Closed => "closed",
        };
        tag.push_attribute((ATTR_TYPE, kind));
        tag.push_attribute((ATTR_POPULATION, class.population.to_string().as_str()));
        if let Some(Distribution::Exponential(lambda)) = class.arrival {
            tag.push_attribute((ATTR_LAMBDA, lambda.to_string().as_str()));
        }
        if let Some(reference) = class.reference {
            tag.push_attribute((ATTR_REFERENCE, model.station_name(reference)?));
        }
        xml.write_event(Event::Empty(tag))?;
    }

    for station_id in model.stations() {
        let station = &model.stations[station_id.index()];
        let mut tag = BytesStart::new(TAG_STATION);
        tag.push_attribute((ATTR_NAME, station.name.as_str()));
        tag.push_attribute((ATTR_TYPE, station_kind_name(station.kind)));
        if let Some(servers) = model.station_server_count(station_id) {
            tag.push_attribute((ATTR_SERVERS, servers.to_string().as_str()));
        }
        xml.write_event(Event::Start(tag))?;

        for ((_, class), jobs) in model.preloads.iter().filter(|((s, _), _)| *s == station_id) {
            let mut tag = BytesStart::new(TAG_PRELOAD);
            tag.push_attribute((ATTR_CLASS, model.class_name(*class)?));
            tag.push_attribute((ATTR_JOBS, jobs.to_string().as_str()));
            xml.write_event(Event::Empty(tag))?;
        }
        for ((_, class), distribution) in model
            .service_times
            .iter()
            .filter(|((s, _), _)| *s == station_id)
        {
            let mut tag = BytesStart::new(TAG_SERVICE_TIME);
            tag.push_attribute((ATTR_CLASS, model.class_name(*class)?));
            push_distribution(&mut tag, *distribution);
            xml.write_event(Event::Empty(tag))?;
        }
        for ((_, class), paths) in model
            .fork_paths
            .iter()
            .filter(|((s, _), _)| *s == station_id)
        {
            for (target, path) in paths {
                let mut tag = BytesStart::new(TAG_FORK_PATH);
                tag.push_attribute((ATTR_CLASS, model.class_name(*class)?));
                tag.push_attribute((ATTR_TARGET, model.station_name(*target)?));
                tag.push_attribute((ATTR_TOKENS, path.tokens.to_string().as_str()));
                tag.push_attribute((ATTR_PROBABILITY, path.probability.to_string().as_str()));
                xml.write_event(Event::Empty(tag))?;
            }
        }
        for ((_, class), tokens) in model
            .thresholds
            .iter()
            .filter(|((s, _), _)| *s == station_id)
        {
            let mut tag = BytesStart::new(TAG_THRESHOLD);
            tag.push_attribute((ATTR_CLASS, model.class_name(*class)?));
            tag.push_attribute((ATTR_TOKENS, tokens.to_string().as_str()));
            xml.write_event(Event::Empty(tag))?;
        }

        for mode in &station.modes {
            let mut tag = BytesStart::new(TAG_MODE);
            tag.push_attribute((ATTR_NAME, mode.name.as_str()));
            let servers = match mode.servers {
                ServerCount::Finite(n) => n as i64,
                // Wire encoding of an infinite server count.
                ServerCount::Infinite => -1,
            };
            tag.push_attribute((ATTR_SERVERS, servers.to_string().as_str()));
            tag.push_attribute((ATTR_PRIORITY, mode.priority.to_string().as_str()));
            tag.push_attribute((ATTR_WEIGHT, mode.weight.to_string().as_str()));
            push_distribution(&mut tag, mode.distribution);
            if mode.enabling.is_empty() && mode.inhibiting.is_empty() && mode.outcomes.is_empty() {
                xml.write_event(Event::Empty(tag))?;
                continue;
            }
            xml.write_event(Event::Start(tag))?;
            for (tag_name, conditions) in [
                (TAG_ENABLING, &mode.enabling),
                (TAG_INHIBITING, &mode.inhibiting),
                (TAG_OUTCOME, &mode.outcomes),
            ] {
                for condition in conditions {
                    let mut tag = BytesStart::new(tag_name);
                    tag.push_attribute((ATTR_STATION, model.station_name(condition.station)?));
                    tag.push_attribute((ATTR_CLASS, model.class_name(condition.class)?));
                    tag.push_attribute((ATTR_TOKENS, condition.tokens.to_string().as_str()));
                    xml.write_event(Event::Empty(tag))?;
                }
            }
            xml.write_event(Event::End(BytesEnd::new(TAG_MODE)))?;
        }

        xml.write_event(Event::End(BytesEnd::new(TAG_STATION)))?;
    }

    for (source, target) in model.connections() {
        let mut tag = BytesStart::new(TAG_CONNECTION);
        tag.push_attribute((ATTR_SOURCE, model.station_name(*source)?));
        tag.push_attribute((ATTR_TARGET, model.station_name(*target)?));
        xml.write_event(Event::Empty(tag))?;
    }

    for measure in model.measures() {
        let mut tag = BytesStart::new(TAG_MEASURE);
        match measure {
            Measure::QueueLength(station, class) => {
                tag.push_attribute((ATTR_TYPE, "queueLength"));
                tag.push_attribute((ATTR_STATION, model.station_name(*station)?));
                tag.push_attribute((ATTR_CLASS, model.class_name(*class)?));
            }
            Measure::Throughput(station, class) => {
                tag.push_attribute((ATTR_TYPE, "throughput"));
                tag.push_attribute((ATTR_STATION, model.station_name(*station)?));
                tag.push_attribute((ATTR_CLASS, model.class_name(*class)?));
            }
            Measure::FiringThroughput(station, mode) => {
                tag.push_attribute((ATTR_TYPE, "firingThroughput"));
                tag.push_attribute((ATTR_STATION, model.station_name(*station)?));
                tag.push_attribute((ATTR_MODE, mode.as_str()));
            }
        }
        xml.write_event(Event::Empty(tag))?;
    }

    xml.write_event(Event::End(BytesEnd::new(TAG_SIM)))?;
    xml.write_event(Event::End(BytesEnd::new(TAG_ARCHIVE)))?;
    Ok(())
}

fn push_distribution(tag: &mut BytesStart<'_>, distribution: Distribution) {
    match distribution {
        Distribution::Zero => {
            tag.push_attribute((ATTR_DISTRIBUTION, DISTRIBUTION_ZERO));
        }
        Distribution::Exponential(lambda) => {
            tag.push_attribute((ATTR_DISTRIBUTION, DISTRIBUTION_EXPONENTIAL));
            tag.push_attribute((ATTR_LAMBDA, lambda.to_string().as_str()));
        }
    }
}

// Raw, unresolved content of a `sim` element.
// Names are resolved against the model only once the whole element is read.
#[derive(Debug, Default)]
struct RawSim {
    classes: Vec<RawClass>,
    stations: Vec<RawStation>,
    connections: Vec<(String, String)>,
    measures: Vec<RawMeasure>,
}

#[derive(Debug)]
struct RawClass {
    name: String,
    kind: ClassKind,
    population: u32,
    arrival: Option<Distribution>,
    reference: Option<String>,
}

#[derive(Debug)]
struct RawStation {
    name: String,
    kind: StationKind,
    servers: Option<u32>,
    modes: Vec<RawMode>,
    preloads: Vec<(String, u32)>,
    service_times: Vec<(String, Distribution)>,
    fork_paths: Vec<RawForkPath>,
    thresholds: Vec<(String, u32)>,
}

#[derive(Debug)]
struct RawMode {
    name: String,
    servers: ServerCount,
    priority: i32,
    weight: f64,
    distribution: Distribution,
    enabling: Vec<RawCondition>,
    inhibiting: Vec<RawCondition>,
    outcomes: Vec<RawCondition>,
}

#[derive(Debug)]
struct RawCondition {
    station: String,
    class: String,
    tokens: u32,
}

#[derive(Debug)]
struct RawForkPath {
    class: String,
    target: String,
    tokens: u32,
    probability: f64,
}

#[derive(Debug)]
enum RawMeasure {
    QueueLength(String, String),
    Throughput(String, String),
    FiringThroughput(String, String),
}

fn attrs(
    tag: &BytesStart<'_>,
    keys: &[&str],
    opt_keys: &[&str],
) -> anyhow::Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in tag.attributes() {
        let attr = attr?;
        let key = String::from_utf8(attr.key.into_inner().to_vec())?;
        if keys.contains(&key.as_str()) || opt_keys.contains(&key.as_str()) {
            let val = attr.unescape_value()?.into_owned();
            attrs.insert(key, val);
        } else {
            warn!(target: "archive", "ignoring unknown attribute '{key}'");
        }
    }
    for key in keys {
        if !attrs.contains_key(*key) {
            bail!(ArchiveError::MissingAttr(key.to_string()));
        }
    }
    Ok(attrs)
}

fn parse_u32(attrs: &HashMap<String, String>, key: &str) -> anyhow::Result<u32> {
    attrs
        .get(key)
        .ok_or_else(|| anyhow!(ArchiveError::MissingAttr(key.to_string())))?
        .parse()
        .with_context(|| format!("failed to parse attribute '{key}' as integer"))
}

fn parse_distribution(attrs: &HashMap<String, String>) -> anyhow::Result<Distribution> {
    let kind = attrs
        .get(ATTR_DISTRIBUTION)
        .ok_or_else(|| anyhow!(ArchiveError::MissingAttr(ATTR_DISTRIBUTION.to_string())))?;
    match kind.as_str() {
        DISTRIBUTION_ZERO => Ok(Distribution::Zero),
        DISTRIBUTION_EXPONENTIAL => {
            let lambda = attrs
                .get(ATTR_LAMBDA)
                .ok_or_else(|| anyhow!(ArchiveError::MissingAttr(ATTR_LAMBDA.to_string())))?
                .parse()
                .context("failed to parse attribute 'lambda' as real")?;
            Ok(Distribution::Exponential(lambda))
        }
        _ => Err(anyhow!(ArchiveError::UnknownDistribution(kind.clone()))),
    }
}

fn parse_condition(tag: &BytesStart<'_>) -> anyhow::Result<RawCondition> {
    let attrs = attrs(tag, &[ATTR_STATION, ATTR_CLASS, ATTR_TOKENS], &[])?;
    Ok(RawCondition {
        station: attrs[ATTR_STATION].clone(),
        class: attrs[ATTR_CLASS].clone(),
        tokens: parse_u32(&attrs, ATTR_TOKENS)?,
    })
}

/// Reads one `sim` element into the given model.
///
/// The reader must be positioned right after the `sim` start tag;
/// the whole element, up to and including its end tag, is consumed.
pub fn read_sim<R: BufRead>(reader: &mut Reader<R>, model: &mut QpnModel) -> anyhow::Result<()> {
    let mut buf = Vec::new();
    let mut raw = RawSim::default();
    // Innermost open station/mode, if any.
    let mut station: Option<RawStation> = None;
    let mut mode: Option<RawMode> = None;
    loop {
        match reader
            .read_event_into(&mut buf)
            .context("failed reading event")?
        {
            Event::Start(tag) => {
                let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                trace!(target: "archive", "start tag '{tag_name}'");
                match tag_name {
                    TAG_STATION if station.is_none() => {
                        station = Some(parse_station(&tag)?);
                    }
                    TAG_MODE if station.is_some() && mode.is_none() => {
                        mode = Some(parse_mode(&tag)?);
                    }
                    _ => {
                        warn!(target: "archive", "unknown or unexpected tag '{tag_name}', skipping");
                        reader.read_to_end_into(tag.to_end().into_owned().name(), &mut buf)?;
                    }
                }
            }
            Event::Empty(tag) => {
                let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                trace!(target: "archive", "empty tag '{tag_name}'");
                match tag_name {
                    TAG_USER_CLASS if station.is_none() => {
                        raw.classes.push(parse_class(&tag)?);
                    }
                    TAG_STATION if station.is_none() => {
                        raw.stations.push(parse_station(&tag)?);
                    }
                    TAG_MODE if station.is_some() && mode.is_none() => {
                        let st = station.as_mut().expect("open station");
                        st.modes.push(parse_mode(&tag)?);
                    }
                    TAG_ENABLING if mode.is_some() => {
                        mode.as_mut()
                            .expect("open mode")
                            .enabling
                            .push(parse_condition(&tag)?);
                    }
                    TAG_INHIBITING if mode.is_some() => {
                        mode.as_mut()
                            .expect("open mode")
                            .inhibiting
                            .push(parse_condition(&tag)?);
                    }
                    TAG_OUTCOME if mode.is_some() => {
                        mode.as_mut()
                            .expect("open mode")
                            .outcomes
                            .push(parse_condition(&tag)?);
                    }
                    TAG_PRELOAD if station.is_some() && mode.is_none() => {
                        let attrs = attrs(&tag, &[ATTR_CLASS, ATTR_JOBS], &[])?;
                        let jobs = parse_u32(&attrs, ATTR_JOBS)?;
                        station
                            .as_mut()
                            .expect("open station")
                            .preloads
                            .push((attrs[ATTR_CLASS].clone(), jobs));
                    }
                    TAG_SERVICE_TIME if station.is_some() && mode.is_none() => {
                        let attrs =
                            attrs(&tag, &[ATTR_CLASS, ATTR_DISTRIBUTION], &[ATTR_LAMBDA])?;
                        let distribution = parse_distribution(&attrs)?;
                        station
                            .as_mut()
                            .expect("open station")
                            .service_times
                            .push((attrs[ATTR_CLASS].clone(), distribution));
                    }
                    TAG_FORK_PATH if station.is_some() && mode.is_none() => {
                        let attrs = attrs(
                            &tag,
                            &[ATTR_CLASS, ATTR_TARGET, ATTR_TOKENS, ATTR_PROBABILITY],
                            &[],
                        )?;
                        station
                            .as_mut()
                            .expect("open station")
                            .fork_paths
                            .push(RawForkPath {
                                class: attrs[ATTR_CLASS].clone(),
                                target: attrs[ATTR_TARGET].clone(),
                                tokens: parse_u32(&attrs, ATTR_TOKENS)?,
                                probability: attrs[ATTR_PROBABILITY]
                                    .parse()
                                    .context("failed to parse attribute 'probability' as real")?,
                            });
                    }
                    TAG_THRESHOLD if station.is_some() && mode.is_none() => {
                        let attrs = attrs(&tag, &[ATTR_CLASS, ATTR_TOKENS], &[])?;
                        let tokens = parse_u32(&attrs, ATTR_TOKENS)?;
                        station
                            .as_mut()
                            .expect("open station")
                            .thresholds
                            .push((attrs[ATTR_CLASS].clone(), tokens));
                    }
                    TAG_CONNECTION if station.is_none() => {
                        let attrs = attrs(&tag, &[ATTR_SOURCE, ATTR_TARGET], &[])?;
                        raw.connections
                            .push((attrs[ATTR_SOURCE].clone(), attrs[ATTR_TARGET].clone()));
                    }
                    TAG_MEASURE if station.is_none() => {
                        raw.measures.push(parse_measure(&tag)?);
                    }
                    _ => {
                        warn!(target: "archive", "ignoring unknown or unexpected empty tag '{tag_name}'");
                    }
                }
            }
            Event::End(tag) => {
                let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                trace!(target: "archive", "end tag '{tag_name}'");
                match tag_name {
                    TAG_MODE if mode.is_some() => {
                        let m = mode.take().expect("open mode");
                        station.as_mut().expect("open station").modes.push(m);
                    }
                    TAG_STATION if station.is_some() => {
                        let s = station.take().expect("open station");
                        raw.stations.push(s);
                    }
                    TAG_SIM => break,
                    _ => bail!(ArchiveError::UnexpectedEndTag(tag_name.to_string())),
                }
            }
            Event::Comment(_) | Event::Decl(_) => continue,
            Event::Text(t) => {
                let text = &*reader.decoder().decode(t.as_ref())?;
                if !text.trim().is_empty() {
                    bail!("text content not supported");
                }
            }
            Event::Eof => bail!("unexpected end of file inside `sim` element"),
            event => bail!("unsupported XML event {event:?}"),
        }
        buf.clear();
    }
    apply_sim(raw, model)
}

fn parse_class(tag: &BytesStart<'_>) -> anyhow::Result<RawClass> {
    let attrs = attrs(
        tag,
        &[ATTR_NAME, ATTR_TYPE, ATTR_POPULATION],
        &[ATTR_LAMBDA, ATTR_REFERENCE],
    )?;
    let kind = match attrs[ATTR_TYPE].as_str() {
        "open" => ClassKind::Open,
        "closed" => ClassKind::Closed,
        other => bail!(ArchiveError::UnknownClassKind(other.to_string())),
    };
    let arrival = attrs
        .get(ATTR_LAMBDA)
        .map(|lambda| {
            lambda
                .parse()
                .map(Distribution::Exponential)
                .context("failed to parse attribute 'lambda' as real")
        })
        .transpose()?;
    Ok(RawClass {
        name: attrs[ATTR_NAME].clone(),
        kind,
        population: parse_u32(&attrs, ATTR_POPULATION)?,
        arrival,
        reference: attrs.get(ATTR_REFERENCE).cloned(),
    })
}

fn parse_station(tag: &BytesStart<'_>) -> anyhow::Result<RawStation> {
    let attrs = attrs(tag, &[ATTR_NAME, ATTR_TYPE], &[ATTR_SERVERS])?;
    let kind = station_kind_from_name(&attrs[ATTR_TYPE])?;
    let servers = attrs
        .get(ATTR_SERVERS)
        .map(|s| s.parse().context("failed to parse attribute 'servers'"))
        .transpose()?;
    Ok(RawStation {
        name: attrs[ATTR_NAME].clone(),
        kind,
        servers,
        modes: Vec::new(),
        preloads: Vec::new(),
        service_times: Vec::new(),
        fork_paths: Vec::new(),
        thresholds: Vec::new(),
    })
}

fn parse_mode(tag: &BytesStart<'_>) -> anyhow::Result<RawMode> {
    let attrs = attrs(
        tag,
        &[
            ATTR_NAME,
            ATTR_SERVERS,
            ATTR_PRIORITY,
            ATTR_WEIGHT,
            ATTR_DISTRIBUTION,
        ],
        &[ATTR_LAMBDA],
    )?;
    let servers: i64 = attrs[ATTR_SERVERS]
        .parse()
        .context("failed to parse attribute 'servers' as integer")?;
    let servers = if servers < 0 {
        ServerCount::Infinite
    } else {
        ServerCount::Finite(servers as u32)
    };
    Ok(RawMode {
        name: attrs[ATTR_NAME].clone(),
        servers,
        priority: attrs[ATTR_PRIORITY]
            .parse()
            .context("failed to parse attribute 'priority' as integer")?,
        weight: attrs[ATTR_WEIGHT]
            .parse()
            .context("failed to parse attribute 'weight' as real")?,
        distribution: parse_distribution(&attrs)?,
        enabling: Vec::new(),
        inhibiting: Vec::new(),
        outcomes: Vec::new(),
    })
}

fn parse_measure(tag: &BytesStart<'_>) -> anyhow::Result<RawMeasure> {
    let attrs = attrs(tag, &[ATTR_TYPE, ATTR_STATION], &[ATTR_CLASS, ATTR_MODE])?;
    let station = attrs[ATTR_STATION].clone();
    match attrs[ATTR_TYPE].as_str() {
        "queueLength" => Ok(RawMeasure::QueueLength(
            station,
            attrs
                .get(ATTR_CLASS)
                .ok_or_else(|| anyhow!(ArchiveError::MissingAttr(ATTR_CLASS.to_string())))?
                .clone(),
        )),
        "throughput" => Ok(RawMeasure::Throughput(
            station,
            attrs
                .get(ATTR_CLASS)
                .ok_or_else(|| anyhow!(ArchiveError::MissingAttr(ATTR_CLASS.to_string())))?
                .clone(),
        )),
        "firingThroughput" => Ok(RawMeasure::FiringThroughput(
            station,
            attrs
                .get(ATTR_MODE)
                .ok_or_else(|| anyhow!(ArchiveError::MissingAttr(ATTR_MODE.to_string())))?
                .clone(),
        )),
        other => Err(anyhow!(ArchiveError::UnknownMeasureType(other.to_string()))),
    }
}

// Resolves all name references and replays the raw content onto the model.
fn apply_sim(raw: RawSim, model: &mut QpnModel) -> anyhow::Result<()> {
    for station in &raw.stations {
        model.add_station(&station.name, station.kind);
    }
    let resolve_station = |model: &QpnModel, name: &str| {
        model
            .station_by_name(name)
            .ok_or_else(|| anyhow!(ArchiveError::UnresolvedStation(name.to_string())))
    };
    for class in &raw.classes {
        let id = model.add_class(&class.name, class.kind, class.population, class.arrival);
        if let Some(reference) = &class.reference {
            let station = resolve_station(model, reference)?;
            model.set_class_ref_station(id, station)?;
        }
    }
    let resolve_class = |model: &QpnModel, name: &str| {
        model
            .class_by_name(name)
            .ok_or_else(|| anyhow!(ArchiveError::UnresolvedClass(name.to_string())))
    };
    for station in &raw.stations {
        let id = resolve_station(model, &station.name)?;
        if let Some(servers) = station.servers {
            model.set_station_servers(id, servers)?;
        }
        for (class, jobs) in &station.preloads {
            let class = resolve_class(model, class)?;
            model.set_preloaded_jobs(id, class, *jobs)?;
        }
        for (class, distribution) in &station.service_times {
            let class = resolve_class(model, class)?;
            model.set_service_time_distribution(id, class, *distribution)?;
        }
        for path in &station.fork_paths {
            let class = resolve_class(model, &path.class)?;
            let target = resolve_station(model, &path.target)?;
            model.set_fork_out_path(id, class, target, path.tokens, path.probability)?;
        }
        for (class, tokens) in &station.thresholds {
            let class = resolve_class(model, class)?;
            model.set_semaphore_threshold(id, class, *tokens)?;
        }
        if station.kind == StationKind::Transition && !station.modes.is_empty() {
            // Replace the default mode created by add_station.
            model.delete_transition_mode(id, 0)?;
            for mode in &station.modes {
                let index = model.add_transition_mode(id, &mode.name)?;
                model.set_number_of_servers(id, index, mode.servers)?;
                model.set_firing_time_distribution(id, index, mode.distribution)?;
                model.set_firing_priority(id, index, mode.priority)?;
                model.set_firing_weight(id, index, mode.weight)?;
                for condition in &mode.enabling {
                    let source = resolve_station(model, &condition.station)?;
                    let class = resolve_class(model, &condition.class)?;
                    model.set_enabling_condition(id, index, source, class, condition.tokens)?;
                }
                for condition in &mode.inhibiting {
                    let source = resolve_station(model, &condition.station)?;
                    let class = resolve_class(model, &condition.class)?;
                    model.set_inhibiting_condition(id, index, source, class, condition.tokens)?;
                }
                for condition in &mode.outcomes {
                    let target = resolve_station(model, &condition.station)?;
                    let class = resolve_class(model, &condition.class)?;
                    model.set_firing_outcome(id, index, target, class, condition.tokens)?;
                }
            }
        }
    }
    for (source, target) in &raw.connections {
        let source = resolve_station(model, source)?;
        let target = resolve_station(model, target)?;
        model.set_connected(source, target)?;
    }
    for measure in &raw.measures {
        let measure = match measure {
            RawMeasure::QueueLength(station, class) => Measure::QueueLength(
                resolve_station(model, station)?,
                resolve_class(model, class)?,
            ),
            RawMeasure::Throughput(station, class) => Measure::Throughput(
                resolve_station(model, station)?,
                resolve_class(model, class)?,
            ),
            RawMeasure::FiringThroughput(station, mode) => {
                Measure::FiringThroughput(resolve_station(model, station)?, mode.clone())
            }
        };
        model.add_measure(measure)?;
    }
    Ok(())
}

fn count_lines<R: BufRead + Seek>(mut reader: Reader<R>) -> usize {
    let end_pos = reader.buffer_position();
    reader.get_mut().rewind().unwrap();
    reader.into_inner().take(end_pos).lines().count()
}

/// Loads a model from a simulation archive file.
pub fn load_model(path: &Path) -> anyhow::Result<QpnModel> {
    info!(target: "archive", "loading model from '{}'", path.display());
    let mut reader = Reader::from_file(path)
        .with_context(|| format!("failed to create reader from file '{}'", path.display()))?;
    let mut model = QpnModel::new();
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .context("failed reading event")?
        {
            Event::Start(tag) => {
                let tag_name = &*reader.decoder().decode(tag.name().into_inner())?;
                match tag_name {
                    TAG_ARCHIVE => {}
                    TAG_SIM => {
                        read_sim(&mut reader, &mut model).with_context(|| {
                            format!(
                                "failed to parse archive at line {} in '{}'",
                                count_lines(reader),
                                path.display(),
                            )
                        })?;
                        return Ok(model);
                    }
                    _ => {
                        warn!(target: "archive", "unknown or unexpected tag '{tag_name}', skipping");
                        reader.read_to_end_into(tag.to_end().into_owned().name(), &mut buf)?;
                    }
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::Text(_) => continue,
            Event::Eof => bail!(ArchiveError::NoSim),
            event => bail!("unsupported XML event {event:?}"),
        }
        buf.clear();
    }
}
