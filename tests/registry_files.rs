use jelly_infer::frontend::cli::{Cli, CliConfig, Command};
use jelly_infer::registry::file;
use jelly_infer::{check_batch, parse_jelly, CheckOptions, Config, Registry};
use std::fs;
use tempfile::tempdir;

const REGISTRY: &str = r#"
[[type]]
name = "Reading"
params = ["@UNITVAR u"]
tag = [
    { name = "Missing" },
    { name = "Value", payload = "NUMBER{@UNITVAR u}" },
]

[[unit]]
name = "ft"
scale = "0.3048"
base = "m"
"#;

#[test]
fn discovered_config_points_at_its_registry() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("units.toml"), REGISTRY).unwrap();
    fs::write(
        dir.path().join(".jellyrc"),
        "registry = \"units.toml\"\n\n[infer]\nallow_defaulting = false\n",
    )
    .unwrap();
    let nested = dir.path().join("sheets").join("q3");
    fs::create_dir_all(&nested).unwrap();

    let config = Config::discover_from(&nested).unwrap();
    assert_eq!(config.registry, Some(dir.path().join("units.toml")));
    assert!(!config.check_options().allow_defaulting);

    let context = file::load(config.registry.as_deref().unwrap()).unwrap();
    let snapshot = context.snapshot();
    assert!(snapshot.lookup_declared_unit("ft").is_some());
    assert!(snapshot.lookup_declared_unit("km").is_some());

    let items = vec![
        parse_jelly("TAGGED \"Reading\" {ft}").unwrap(),
        parse_jelly("TAGGED \"Reading\" {@UNITVAR u}").unwrap(),
    ];
    let results = check_batch(snapshot, &items, config.check_options(), 1).unwrap();
    assert!(results[0].is_ok());
    assert!(!results[1].is_ok());
}

#[test]
fn cli_runs_against_a_registry_file() {
    let dir = tempdir().unwrap();
    let registry = dir.path().join("units.toml");
    fs::write(&registry, REGISTRY).unwrap();
    let config_path = dir.path().join("jelly.toml");
    fs::write(&config_path, "").unwrap();

    let cli = |command| CliConfig {
        command,
        registry: Some(registry.clone()),
        config: Some(config_path.clone()),
        no_default: false,
        json: true,
        verbose: false,
        color: false,
    };

    let ok = Cli::new(cli(Command::Check(vec!["NUMBER{ft/s}".into()]))).unwrap();
    assert_eq!(ok.run().unwrap(), 0);

    let mismatch = Cli::new(cli(Command::Unify("NUMBER{ft}".into(), "NUMBER{m}".into()))).unwrap();
    assert_eq!(mismatch.run().unwrap(), 1);

    let canon = Cli::new(cli(Command::Canon("ft/h".into()))).unwrap();
    assert_eq!(canon.run().unwrap(), 0);
}

#[test]
fn broken_registry_files_are_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[[unit]]\nname = \"league\"\nscale = \"3\"\nbase = \"mile\"\n").unwrap();
    assert!(file::load(&path).is_err());

    let options = CheckOptions::default();
    assert_eq!(options, Config::default().check_options());
}
