//! Compose command

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use tracing::info;

use metricset_common::crd::MetricSet;
use metricset_engine::{CompiledMetricSet, ComposeConfig, Composer, Launch, Registry};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Full composition as JSON
    #[default]
    Json,
    /// Full composition as YAML
    Yaml,
    /// Rendered entrypoint scripts only
    Scripts,
    /// The entrypoint ConfigMap manifest
    Configmap,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// MetricSet YAML or JSON file
    pub file: PathBuf,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// Namespace for the ConfigMap (defaults to the MetricSet's namespace)
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Composer settings file (scriptRoot, entrypointVolume, idleCommand, shell)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: ComposeArgs) -> Result<()> {
    print!("{}", render(&args)?);
    Ok(())
}

fn render(args: &ComposeArgs) -> Result<String> {
    let set: MetricSet = serde_yaml::from_str(&read(&args.file)?)?;
    let config = match &args.config {
        Some(path) => serde_yaml::from_str::<ComposeConfig>(&read(path)?)?,
        None => ComposeConfig::default(),
    };

    let compiled = Composer::new(Registry::builtin())
        .with_config(config)
        .compose(&set)?;
    info!(
        metricset = %compiled.name,
        containers = compiled.containers.len(),
        "composed"
    );

    match args.output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&compiled)? + "\n"),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&compiled)?),
        OutputFormat::Scripts => Ok(scripts(&compiled)),
        OutputFormat::Configmap => {
            let namespace = args
                .namespace
                .as_deref()
                .or(set.metadata.namespace.as_deref())
                .unwrap_or("default");
            let config_map = compiled
                .to_config_map(namespace)
                .ok_or_else(|| Error::NothingPersisted {
                    name: compiled.name.clone(),
                })?;
            Ok(serde_yaml::to_string(&config_map)?)
        }
    }
}

fn scripts(compiled: &CompiledMetricSet) -> String {
    let mut out = String::new();
    for container in &compiled.containers {
        let location = match &container.launch {
            Launch::Persisted { path, .. } => path.as_str(),
            Launch::Inline => "inline",
        };
        out.push_str(&format!(
            "### {}/{} ({})\n",
            container.spec.job_group, container.spec.name, location
        ));
        out.push_str(&container.script);
        out.push('\n');
    }
    out
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::read_file(path, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const PENNANT: &str = r#"
apiVersion: flux-framework.org/v1alpha2
kind: MetricSet
metadata:
  name: pennant
  namespace: perf
spec:
  pods: 2
  application:
    image: ghcr.io/rse-ops/pennant:latest
    command: pennant /opt/test.pnt
  metrics:
    - name: app-pennant
  addons:
    - name: perf-hpctoolkit
      options:
        events: "-e IO"
        containerTarget: app
"#;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn args(file: &Path, output: OutputFormat) -> ComposeArgs {
        ComposeArgs {
            file: file.to_path_buf(),
            output,
            namespace: None,
            config: None,
        }
    }

    #[test]
    fn json_output_contains_wrapped_command() {
        let file = write_temp(PENNANT);
        let out = render(&args(file.path(), OutputFormat::Json)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["name"], "pennant");
        assert!(out.contains("hpcrun -e IO pennant /opt/test.pnt"));
    }

    #[test]
    fn scripts_output_labels_each_container() {
        let file = write_temp(PENNANT);
        let out = render(&args(file.path(), OutputFormat::Scripts)).unwrap();
        assert!(out.contains("### launcher/app (/metrics_operator/entrypoint-0.sh)"));
        assert!(out.contains("### worker/hpctoolkit (/metrics_operator/hpctoolkit-worker-entrypoint.sh)"));
    }

    #[test]
    fn configmap_uses_resource_namespace() {
        let file = write_temp(PENNANT);
        let out = render(&args(file.path(), OutputFormat::Configmap)).unwrap();
        assert!(out.contains("namespace: perf"));
        assert!(out.contains("kind: ConfigMap"));
    }

    #[test]
    fn config_file_overrides_script_root() {
        let file = write_temp(PENNANT);
        let config = write_temp("scriptRoot: /scripts\n");
        let mut a = args(file.path(), OutputFormat::Scripts);
        a.config = Some(config.path().to_path_buf());
        let out = render(&a).unwrap();
        assert!(out.contains("/scripts/entrypoint-0.sh"));
    }

    #[test]
    fn composition_errors_carry_category() {
        let file = write_temp(&PENNANT.replace("events: \"-e IO\"", "mount: /share"));
        let err = render(&args(file.path(), OutputFormat::Json)).unwrap_err();
        assert!(err.to_string().starts_with("ValidationError: "));
    }

    #[test]
    fn missing_file_names_path() {
        let err = render(&args(Path::new("/nonexistent/ms.yaml"), OutputFormat::Json)).unwrap_err();
        assert!(matches!(err, Error::ReadFile { .. }));
    }
}
