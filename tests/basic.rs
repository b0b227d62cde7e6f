use clap::Parser;
use pnml_preprocessor::Cli;
use qpn_core::archive;
use std::path::PathBuf;

fn output_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("pnml_preprocessor_{name}_{}.jsimg", std::process::id()))
}

fn run(args: &[&str]) -> anyhow::Result<()> {
    Cli::try_parse_from(args)?.run()
}

#[test]
fn gspn_end_to_end() -> anyhow::Result<()> {
    let output = output_path("gspn");
    run(&[
        "pnml-preprocessor",
        "gspn",
        "tests/fixtures/gspn.pnml",
        output.to_str().unwrap(),
    ])?;
    let model = archive::load_model(&output)?;
    std::fs::remove_file(&output)?;
    assert_eq!(model.station_count(), 5);
    assert_eq!(model.class_count(), 1);
    assert_eq!(model.measures().len(), 5);
    Ok(())
}

#[test]
fn gspn_with_index_file() -> anyhow::Result<()> {
    let output = output_path("gspn_idx");
    run(&[
        "pnml-preprocessor",
        "gspn",
        "tests/fixtures/gspn.pnml",
        output.to_str().unwrap(),
        "tests/fixtures/index.txt",
    ])?;
    let model = archive::load_model(&output)?;
    std::fs::remove_file(&output)?;
    // One line per observed element
    assert_eq!(model.measures().len(), 2);
    Ok(())
}

#[test]
fn hadoop_cap_end_to_end() -> anyhow::Result<()> {
    let output = output_path("hadoop");
    run(&[
        "pnml-preprocessor",
        "swn-HadoopCap",
        "tests/fixtures/hadoop.pnml",
        output.to_str().unwrap(),
    ])?;
    let model = archive::load_model(&output)?;
    std::fs::remove_file(&output)?;
    assert_eq!(model.station_count(), 25);
    assert_eq!(model.class_count(), 6);
    let map_acq = model.station_by_name("MapAcqRes").unwrap();
    assert_eq!(model.mode_count(map_acq)?, 4);
    Ok(())
}

#[test]
fn mrt_end_to_end() -> anyhow::Result<()> {
    let output = output_path("mrt");
    run(&[
        "pnml-preprocessor",
        "mrt",
        "tests/fixtures/mrt.xml",
        output.to_str().unwrap(),
    ])?;
    let model = archive::load_model(&output)?;
    std::fs::remove_file(&output)?;
    assert_eq!(model.station_count(), 16);
    assert!(model.station_by_name("Semaphore 1").is_some());
    Ok(())
}

#[test]
fn dag_end_to_end() -> anyhow::Result<()> {
    let output = output_path("dag");
    run(&[
        "pnml-preprocessor",
        "dag",
        "tests/fixtures/dag.json",
        output.to_str().unwrap(),
    ])?;
    let model = archive::load_model(&output)?;
    std::fs::remove_file(&output)?;
    assert_eq!(model.station_count(), 10);
    assert!(model.station_by_name("Scaler 2").is_some());
    Ok(())
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    assert!(Cli::try_parse_from(["pnml-preprocessor"]).is_err());
}
