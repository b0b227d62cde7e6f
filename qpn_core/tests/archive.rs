use qpn_core::archive;
use qpn_core::{
    ClassKind, Distribution, ForkPath, Measure, QpnModel, ServerCount, StationKind,
};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("qpn_core_{name}_{}.jsimg", std::process::id()))
}

fn sample_model() -> QpnModel {
    let mut model = QpnModel::new();
    let place = model.add_station("JobQueue", StationKind::Place);
    let transition = model.add_station("StartJob", StationKind::Transition);
    let fork = model.add_station("ForkMaps", StationKind::Fork);
    let delay = model.add_station("Think", StationKind::Delay);
    let semaphore = model.add_station("Gate", StationKind::Semaphore);
    let token = model.add_class("Token", ClassKind::Closed, 5, None);
    let open = model.add_class(
        "Arrivals",
        ClassKind::Open,
        0,
        Some(Distribution::Exponential(0.5)),
    );
    model.set_class_ref_station(token, place).unwrap();
    model.set_class_ref_station(open, delay).unwrap();

    model.set_preloaded_jobs(place, token, 5).unwrap();
    model
        .set_service_time_distribution(delay, token, Distribution::Exponential(1.25))
        .unwrap();
    model.set_fork_out_path(fork, token, place, 3, 1.0).unwrap();
    model.set_semaphore_threshold(semaphore, token, 2).unwrap();
    model.set_station_servers(fork, 4).unwrap();

    model
        .set_number_of_servers(transition, 0, ServerCount::Infinite)
        .unwrap();
    model
        .set_firing_time_distribution(transition, 0, Distribution::Exponential(2.0))
        .unwrap();
    model.set_firing_priority(transition, 0, -1).unwrap();
    model
        .set_enabling_condition(transition, 0, place, token, 2)
        .unwrap();
    let second = model.add_transition_mode(transition, "Mode1").unwrap();
    model.set_firing_weight(transition, second, 0.25).unwrap();
    model
        .set_inhibiting_condition(transition, second, place, token, 1)
        .unwrap();
    model
        .set_firing_outcome(transition, second, delay, token, 1)
        .unwrap();

    model.set_connected(place, transition).unwrap();
    model.set_connected(transition, delay).unwrap();

    model.add_measure(Measure::QueueLength(place, token)).unwrap();
    model.add_measure(Measure::Throughput(delay, open)).unwrap();
    model
        .add_measure(Measure::FiringThroughput(transition, "Mode1".to_string()))
        .unwrap();
    model
}

#[test]
fn save_then_load_preserves_the_model() -> anyhow::Result<()> {
    let path = temp_path("roundtrip");
    let model = sample_model();
    archive::save_model(&path, &model)?;
    let loaded = archive::load_model(&path)?;
    std::fs::remove_file(&path)?;

    assert_eq!(loaded.station_count(), model.station_count());
    assert_eq!(loaded.class_count(), model.class_count());
    assert_eq!(loaded.connection_count(), model.connection_count());
    assert_eq!(loaded.measures().len(), model.measures().len());

    let place = loaded.station_by_name("JobQueue").unwrap();
    let transition = loaded.station_by_name("StartJob").unwrap();
    let fork = loaded.station_by_name("ForkMaps").unwrap();
    let delay = loaded.station_by_name("Think").unwrap();
    let semaphore = loaded.station_by_name("Gate").unwrap();
    let token = loaded.class_by_name("Token").unwrap();
    let open = loaded.class_by_name("Arrivals").unwrap();

    assert_eq!(loaded.station_kind(place)?, StationKind::Place);
    assert_eq!(loaded.station_kind(fork)?, StationKind::Fork);
    assert_eq!(loaded.class(token)?.population, 5);
    assert_eq!(loaded.class(token)?.reference, Some(place));
    assert_eq!(
        loaded.class(open)?.arrival,
        Some(Distribution::Exponential(0.5))
    );

    assert_eq!(loaded.preloaded_jobs(place, token), 5);
    assert_eq!(
        loaded.service_time_distribution(delay, token),
        Some(Distribution::Exponential(1.25))
    );
    assert_eq!(
        loaded.fork_out_path(fork, token, place),
        Some(ForkPath {
            tokens: 3,
            probability: 1.0
        })
    );
    assert_eq!(loaded.semaphore_threshold(semaphore, token), Some(2));
    assert_eq!(loaded.station_server_count(fork), Some(4));

    assert_eq!(loaded.mode_count(transition)?, 2);
    let first = loaded.mode(transition, 0)?;
    assert_eq!(first.name, "Mode0");
    assert_eq!(first.servers, ServerCount::Infinite);
    assert_eq!(first.distribution, Distribution::Exponential(2.0));
    assert_eq!(first.priority, -1);
    assert_eq!(first.enabling.len(), 1);
    assert_eq!(first.enabling[0].station, place);
    assert_eq!(first.enabling[0].tokens, 2);
    let second = loaded.mode(transition, 1)?;
    assert_eq!(second.name, "Mode1");
    assert_eq!(second.weight, 0.25);
    assert_eq!(second.inhibiting.len(), 1);
    assert_eq!(second.outcomes.len(), 1);
    assert_eq!(second.outcomes[0].station, delay);

    assert!(loaded.connections().contains(&(place, transition)));
    assert!(loaded
        .measures()
        .contains(&Measure::FiringThroughput(transition, "Mode1".to_string())));
    Ok(())
}

#[test]
fn saving_twice_is_deterministic() -> anyhow::Result<()> {
    let model = sample_model();
    let first = temp_path("det_a");
    let second = temp_path("det_b");
    archive::save_model(&first, &model)?;
    archive::save_model(&second, &model)?;
    let a = std::fs::read_to_string(&first)?;
    let b = std::fs::read_to_string(&second)?;
    std::fs::remove_file(&first)?;
    std::fs::remove_file(&second)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn missing_sim_element_is_an_error() -> anyhow::Result<()> {
    let path = temp_path("nosim");
    std::fs::write(&path, "<?xml version=\"1.0\"?>\n<archive></archive>\n")?;
    let result = archive::load_model(&path);
    std::fs::remove_file(&path)?;
    assert!(result.is_err());
    Ok(())
}
