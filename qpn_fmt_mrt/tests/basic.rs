use qpn_fmt_mrt::{MrtDocument, TemplateBuilder};
use std::path::Path;

fn parse_fixture() -> MrtDocument {
    MrtDocument::parse(Path::new("./tests/fixtures/mrt.xml")).unwrap()
}

#[test]
fn document_structure() {
    let document = parse_fixture();
    // The embedded base model is loaded before the templates
    assert_eq!(document.model.station_count(), 1);
    assert_eq!(document.model.class_count(), 1);
    assert_eq!(document.templates.len(), 2);

    let first = &document.templates[0];
    assert_eq!(first.name.as_deref(), Some("mr1"));
    assert_eq!(first.input.as_deref(), Some("WebServer"));
    assert_eq!(first.output.as_deref(), Some("mr2"));
    assert_eq!(first.map_degree, 2);
    assert_eq!(first.red_degree, 1);
    assert_eq!(first.mappers, 2);
    assert_eq!(first.reducers, 1);
    assert_eq!(
        first.thresholds,
        vec![("Class1".to_string(), 3), ("NoSuch".to_string(), 7)]
    );

    let second = &document.templates[1];
    assert_eq!(second.input.as_deref(), Some("mr1"));
    assert_eq!(second.output, None);
    assert!(second.thresholds.is_empty());
}

#[test]
fn templates_instantiate_over_the_base_model() -> anyhow::Result<()> {
    let model = TemplateBuilder::visit(parse_fixture())?;
    // base station + 8 stations for mr1 + 7 for mr2
    assert_eq!(model.station_count(), 16);

    let fork = model.station_by_name("Fork 1_1").unwrap();
    let red_fork = model.station_by_name("Fork 1_2").unwrap();
    assert_eq!(model.station_server_count(fork), Some(2));
    assert_eq!(model.station_server_count(red_fork), Some(1));

    let semaphore = model.station_by_name("Semaphore 1").unwrap();
    let class = model.class_by_name("Class1").unwrap();
    assert_eq!(model.semaphore_threshold(semaphore, class), Some(3));

    let q1 = model.station_by_name("Queue 1_1").unwrap();
    let q3 = model.station_by_name("Queue 1_3").unwrap();
    let map_join = model.station_by_name("Join 1_1").unwrap();
    let red_join = model.station_by_name("Join 1_2").unwrap();
    assert!(model.connections().contains(&(fork, q1)));
    assert!(model.connections().contains(&(q1, semaphore)));
    assert!(model.connections().contains(&(semaphore, map_join)));
    assert!(model.connections().contains(&(map_join, red_fork)));
    assert!(model.connections().contains(&(red_fork, q3)));
    assert!(model.connections().contains(&(q3, red_join)));
    Ok(())
}

#[test]
fn declared_names_wire_the_templates() -> anyhow::Result<()> {
    let model = TemplateBuilder::visit(parse_fixture())?;
    let base = model.station_by_name("WebServer").unwrap();
    let first_fork = model.station_by_name("Fork 1_1").unwrap();
    let first_join = model.station_by_name("Join 1_2").unwrap();
    let second_fork = model.station_by_name("Fork 2_1").unwrap();
    // mr1's input names a station of the base model
    assert!(model.connections().contains(&(base, first_fork)));
    // mr1's output and mr2's input both name the other template
    assert!(model.connections().contains(&(first_join, second_fork)));
    Ok(())
}
