use qpn_core::{Distribution, Measure, ServerCount, StationKind};
use qpn_fmt_pnml::{ModelBuilder, PnmlDocument};
use std::path::Path;

fn parse_fixture() -> PnmlDocument {
    PnmlDocument::parse(Path::new("./tests/fixtures/gspn.pnml")).unwrap()
}

#[test]
fn document_structure() {
    let document = parse_fixture();
    assert_eq!(document.places.len(), 3);
    assert_eq!(document.transitions.len(), 2);
    assert_eq!(document.arcs.len(), 6);

    let p1 = &document.places[0];
    assert_eq!(p1.id, "p1");
    assert_eq!(p1.name.as_deref(), Some("Idle"));
    assert_eq!(p1.marking, 2);
    // Self-closed place with no marking
    assert_eq!(document.places[2].marking, 0);

    let t1 = &document.transitions[0];
    assert_eq!(t1.name.as_deref(), Some("serve"));
    assert_eq!(t1.specifics.len(), 2);

    let a1 = &document.arcs[0];
    assert_eq!(a1.source, "p1");
    assert_eq!(a1.inscription, Some(2));
    assert_eq!(document.arcs[1].inscription, None);
}

#[test]
fn token_class_aggregates_markings() -> anyhow::Result<()> {
    let model = ModelBuilder::visit(&parse_fixture(), None)?;
    let class = model.class_by_name("Token").unwrap();
    assert_eq!(model.class_population(class)?, 3);
    let p1 = model.station_by_name("p1").unwrap();
    assert_eq!(model.class(class)?.reference, Some(p1));
    assert_eq!(model.preloaded_jobs(p1, class), 2);
    Ok(())
}

#[test]
fn transition_annotations_refine_mode_zero() -> anyhow::Result<()> {
    let model = ModelBuilder::visit(&parse_fixture(), None)?;
    let t1 = model.station_by_name("t1").unwrap();
    let mode = model.mode(t1, 0)?;
    assert_eq!(mode.distribution, Distribution::Exponential(2.5));
    assert_eq!(mode.priority, -1);
    assert_eq!(mode.weight, 1.0);
    assert_eq!(mode.servers, ServerCount::Infinite);

    let t2 = model.station_by_name("t2").unwrap();
    let mode = model.mode(t2, 0)?;
    assert_eq!(mode.distribution, Distribution::Zero);
    assert_eq!(mode.priority, 3);
    assert_eq!(mode.weight, 0.4);
    Ok(())
}

#[test]
fn arcs_become_conditions_and_connections() -> anyhow::Result<()> {
    let model = ModelBuilder::visit(&parse_fixture(), None)?;
    let class = model.class_by_name("Token").unwrap();
    let p1 = model.station_by_name("p1").unwrap();
    let p2 = model.station_by_name("p2").unwrap();
    let p3 = model.station_by_name("p3").unwrap();
    let t1 = model.station_by_name("t1").unwrap();
    let t2 = model.station_by_name("t2").unwrap();

    // The arc with an unresolved endpoint is dropped
    assert_eq!(model.connection_count(), 5);
    assert!(model.connections().contains(&(p1, t1)));

    let mode = model.mode(t1, 0)?;
    assert_eq!(mode.enabling.len(), 1);
    assert_eq!(mode.enabling[0].station, p1);
    assert_eq!(mode.enabling[0].class, class);
    assert_eq!(mode.enabling[0].tokens, 2);
    assert_eq!(mode.outcomes.len(), 1);
    assert_eq!(mode.outcomes[0].station, p2);
    assert_eq!(mode.outcomes[0].tokens, 1);

    let mode = model.mode(t2, 0)?;
    assert_eq!(mode.enabling.len(), 1);
    assert_eq!(mode.enabling[0].station, p2);
    assert_eq!(mode.inhibiting.len(), 1);
    assert_eq!(mode.inhibiting[0].station, p3);
    assert_eq!(mode.inhibiting[0].tokens, 1);
    assert_eq!(mode.outcomes.len(), 1);
    assert_eq!(mode.outcomes[0].station, p3);
    Ok(())
}

#[test]
fn fallback_measures_observe_everything() -> anyhow::Result<()> {
    let model = ModelBuilder::visit(&parse_fixture(), None)?;
    let class = model.class_by_name("Token").unwrap();
    let places = model.stations_of_kind(StationKind::Place);
    let transitions = model.stations_of_kind(StationKind::Transition);
    let measures = model.measures();
    assert_eq!(measures.len(), 5);
    for (i, &place) in places.iter().enumerate() {
        assert_eq!(measures[i], Measure::QueueLength(place, class));
    }
    for (i, &transition) in transitions.iter().enumerate() {
        assert_eq!(
            measures[places.len() + i],
            Measure::FiringThroughput(transition, "Mode0".to_string())
        );
    }
    Ok(())
}

#[test]
fn index_selects_measures() -> anyhow::Result<()> {
    let index = vec!["p2".to_string(), "t1".to_string(), "ghost".to_string()];
    let model = ModelBuilder::visit(&parse_fixture(), Some(index.as_slice()))?;
    let class = model.class_by_name("Token").unwrap();
    let p2 = model.station_by_name("p2").unwrap();
    let t1 = model.station_by_name("t1").unwrap();
    assert_eq!(
        model.measures(),
        &[
            Measure::QueueLength(p2, class),
            Measure::FiringThroughput(t1, "Mode0".to_string()),
        ]
    );
    Ok(())
}
