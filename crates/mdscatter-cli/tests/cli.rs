use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn mdscatter(args: &[&str], home: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mdscatter"))
        .args(args)
        .env("MDSCATTER_HOME", home)
        .env_remove("MDSCATTER_ATOM_DATABASE")
        .env_remove("RUST_LOG")
        .output()
        .expect("mdscatter should start")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_mock(path: &Path) {
    fs::write(
        path,
        r#"{"element": "Ar", "lattice_constant": 0.5, "repeats": [2, 2, 2], "n_frames": 4, "time_step": 0.1}"#,
    )
    .expect("mock spec should be written");
}

#[test]
fn atom_command_prints_the_database_entry() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = mdscatter(&["atom", "H"], temp.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("b_coherent"));

    let output = mdscatter(&["atom", "O", "--json"], temp.path());
    let entry: Value = serde_json::from_str(&stdout(&output)).expect("atom entry should be JSON");
    assert_eq!(entry["atomic_number"], 8);
}

#[test]
fn unknown_atom_exits_with_input_validation_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = mdscatter(&["atom", "Xx"], temp.path());
    assert_eq!(output.status.code(), Some(2));
    let diagnostic = stderr(&output);
    assert!(
        diagnostic.lines().any(|line| line.starts_with("ERROR: [INPUT.UNKNOWN_ATOM]")),
        "stderr: {diagnostic}"
    );
}

#[test]
fn jobs_command_lists_and_describes_jobs() {
    let temp = TempDir::new().expect("tempdir should be created");
    let listing = stdout(&mdscatter(&["jobs"], temp.path()));
    for name in ["Density", "PairDistributionFunction", "VelocityAutoCorrelationFunction"] {
        assert!(listing.contains(name), "missing {name} in {listing}");
    }

    let description = mdscatter(&["jobs", "PairDistributionFunction"], temp.path());
    assert!(description.status.success());
    assert!(stdout(&description).contains("r_values"));

    let unknown = mdscatter(&["jobs", "NoSuchJob"], temp.path());
    assert_eq!(unknown.status.code(), Some(2));
    assert!(stderr(&unknown).contains("JOB.UNKNOWN_JOB"));
}

#[test]
fn info_command_summarizes_a_trajectory() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mock = temp.path().join("argon.json");
    write_mock(&mock);
    let output = mdscatter(&["info", mock.to_str().expect("utf-8 path")], temp.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let summary = stdout(&output);
    assert!(summary.contains("number of atoms: 8"), "{summary}");
    assert!(summary.contains("frames: 4"), "{summary}");
    assert!(summary.contains("periodic: true"), "{summary}");
}

#[test]
fn run_writes_the_output_container() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mock = temp.path().join("argon.json");
    write_mock(&mock);
    let root = temp.path().join("results/density");
    let parameters = serde_json::json!({
        "trajectory": mock.display().to_string(),
        "output_files": [root.display().to_string(), ["container"], true],
    })
    .to_string();

    let output = mdscatter(&["run", "Density", "--parameters", &parameters], temp.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("finished"), "{}", stdout(&output));
    assert!(root.with_extension("mdo").exists());
    assert!(root.with_extension("log").exists());
}

#[test]
fn template_and_saved_documents_round_trip_through_run() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mock = temp.path().join("argon.json");
    write_mock(&mock);

    let template = temp.path().join("density_template.json");
    let output = mdscatter(&["template", "Density", template.to_str().expect("utf-8 path")], temp.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let document: Value =
        serde_json::from_str(&fs::read_to_string(&template).expect("template should exist")).expect("json");
    assert_eq!(document["job"], "Density");
    assert!(document["parameters"].get("frames").is_some());

    let saved = temp.path().join("density_job.json");
    let root = temp.path().join("saved");
    let parameters = serde_json::json!({
        "trajectory": mock.display().to_string(),
        "output_files": [root.display().to_string(), ["text"]],
    })
    .to_string();
    let output = mdscatter(
        &["save", "Density", "--parameters", &parameters, "--output", saved.to_str().expect("utf-8 path")],
        temp.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let output = mdscatter(&["run", "--file", saved.to_str().expect("utf-8 path")], temp.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(temp.path().join("saved_text").is_dir());
}

#[test]
fn parallel_check_compares_single_and_multicore_runs() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mock = temp.path().join("argon.json");
    write_mock(&mock);
    let parameters = serde_json::json!({
        "trajectory": mock.display().to_string(),
        "r_values": [0.0, 0.5, 0.01],
        "output_files": [temp.path().join("pdf").display().to_string(), ["container"]],
    })
    .to_string();
    let output = mdscatter(
        &["run", "PairDistributionFunction", "--parameters", &parameters, "--check-parallel"],
        temp.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("outputs agree"));
}

#[test]
fn check_rejects_unknown_settings() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = mdscatter(&["check", "Density", "--parameters", r#"{"bogus": 1}"#], temp.path());
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("JOB.UNKNOWN_SETTING"));
}

#[test]
fn convert_reads_extended_xyz() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("water.xyz");
    fs::write(
        &input,
        "3\nLattice=\"10 0 0 0 10 0 0 0 10\" Time=0.0\nO 0.0 0.0 0.0\nH 0.96 0.0 0.0\nH -0.24 0.93 0.0\n\
         3\nLattice=\"10 0 0 0 10 0 0 0 10\" Time=0.5\nO 0.1 0.0 0.0\nH 1.06 0.0 0.0\nH -0.14 0.93 0.0\n",
    )
    .expect("xyz should be written");
    let trajectory = temp.path().join("water.mdt");
    let output = mdscatter(
        &["convert", input.to_str().expect("utf-8 path"), trajectory.to_str().expect("utf-8 path")],
        temp.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("2 frames of 3 atoms"), "{}", stdout(&output));

    let info = mdscatter(&["info", trajectory.to_str().expect("utf-8 path")], temp.path());
    assert!(info.status.success(), "stderr: {}", stderr(&info));
    assert!(stdout(&info).contains("frames: 2"));
}
