use anyhow::Result;
use fargate_stack::core::synth::MANIFEST_FILE;
use fargate_stack::domain::model::ResourceId;
use fargate_stack::utils::validation::Validate;
use fargate_stack::{
    build, JsonRenderer, LocalStorage, StackConfig, StackError, Synthesizer, YamlRenderer,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_build_contexts(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("nginx/conf.d"))?;
    fs::write(root.join("nginx/Dockerfile"), "FROM nginx:alpine\nCOPY conf.d /etc/nginx/conf.d\n")?;
    fs::write(
        root.join("nginx/conf.d/default.conf"),
        "server { listen 80; location / { fastcgi_pass 127.0.0.1:9000; } }\n",
    )?;
    fs::create_dir_all(root.join("matomo"))?;
    fs::write(root.join("matomo/Dockerfile"), "FROM matomo:fpm-alpine\n")?;
    Ok(())
}

#[test]
fn test_bundled_stack_config_matches_defaults() -> Result<()> {
    let config = StackConfig::from_toml_str(include_str!("../stack.toml"))?;
    config.validate()?;
    assert_eq!(config, StackConfig::default());
    Ok(())
}

#[test]
fn test_synthesize_cloud_assembly_from_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_build_contexts(temp_dir.path())?;

    let config_path = temp_dir.path().join("stack.toml");
    fs::write(&config_path, include_str!("../stack.toml"))?;
    let config = StackConfig::from_file(&config_path)?;
    let graph = build(&config)?;

    let out_dir = temp_dir.path().join("cdk.out");
    let synth = Synthesizer::new(LocalStorage::new(&out_dir), JsonRenderer, temp_dir.path());
    let result = synth.run(&graph)?;

    let template_path = out_dir.join(&result.template_file);
    assert!(template_path.exists());
    let template: serde_json::Value = serde_json::from_str(&fs::read_to_string(&template_path)?)?;
    assert_eq!(
        template["Resources"]["MatomoTarget"]["Properties"]["HealthCheckPath"],
        "/matomo.php"
    );
    assert_eq!(
        template["Outputs"]["MatomoURL"]["Value"]["Fn::Join"][1][0],
        "http://"
    );

    let nginx = result
        .assets
        .for_container(&ResourceId::new("MatomoNginx")?)
        .expect("nginx asset recorded");
    assert_eq!(nginx.source.directory, "./nginx");
    assert_eq!(nginx.fingerprint.as_ref().map(String::len), Some(64));

    let php = result
        .assets
        .for_container(&ResourceId::new("MatomoPHPFPM")?)
        .expect("php-fpm asset recorded");
    assert_ne!(nginx.fingerprint, php.fingerprint);

    let assets: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join(&result.asset_manifest_file))?)?;
    assert_eq!(
        assets["dockerImages"]["MatomoNginxImageUri"]["fingerprint"],
        nginx.fingerprint.clone().unwrap_or_default()
    );

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join(MANIFEST_FILE))?)?;
    assert_eq!(
        manifest["artifacts"]["MatomoFargateStack"]["properties"]["templateFile"],
        "MatomoFargateStack.template.json"
    );
    Ok(())
}

#[test]
fn test_resynthesis_produces_identical_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_build_contexts(temp_dir.path())?;
    let graph = build(&StackConfig::default())?;

    let mut outputs = Vec::new();
    for run in ["first", "second"] {
        let out_dir = temp_dir.path().join(run);
        let synth = Synthesizer::new(LocalStorage::new(&out_dir), YamlRenderer, temp_dir.path());
        let result = synth.run(&graph)?;
        outputs.push((
            fs::read(out_dir.join(&result.template_file))?,
            fs::read(out_dir.join(&result.asset_manifest_file))?,
        ));
    }

    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[test]
fn test_missing_build_context_fails_unless_skipped() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let graph = build(&StackConfig::default())?;
    let out_dir = temp_dir.path().join("cdk.out");

    let synth = Synthesizer::new(LocalStorage::new(&out_dir), JsonRenderer, temp_dir.path());
    assert!(matches!(synth.run(&graph), Err(StackError::Asset { .. })));
    // 失敗時不留下半套輸出
    assert!(!out_dir.exists() || fs::read_dir(&out_dir)?.next().is_none());

    let synth = Synthesizer::new(LocalStorage::new(&out_dir), JsonRenderer, temp_dir.path())
        .with_asset_fingerprints(false);
    let result = synth.run(&graph)?;
    assert!(result
        .assets
        .docker_images
        .values()
        .all(|asset| asset.fingerprint.is_none()));
    Ok(())
}
