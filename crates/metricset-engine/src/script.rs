//! Entrypoint script rendering
//!
//! A rendered script has a fixed layout:
//!
//! ```text
//! #!/bin/bash
//! # header comment block (metric set, job group, container)
//! replica_index=...
//! <Pre fragments, in contribution order>
//! echo "<SEPARATOR>"
//! echo "<COLLECTION_START>"
//! <command>
//! echo "<COLLECTION_END>"
//! <Post fragments, in contribution order>
//! ```
//!
//! Markers are written only here. A fragment that already contains one is
//! rejected, so every rendered script carries each marker exactly once.

use metricset_common::markers::{self, COLLECTION_END, COLLECTION_START, SEPARATOR};
use metricset_common::{Error, Result};

use crate::config::ComposeConfig;
use crate::specs::{ContainerSpec, JobGroup};

/// Renders one container's [`EntrypointScript`](crate::specs::EntrypointScript)
/// into executable text
#[derive(Debug, Clone, Copy)]
pub struct ScriptRenderer<'a> {
    set_name: &'a str,
    config: &'a ComposeConfig,
    interactive: bool,
}

impl<'a> ScriptRenderer<'a> {
    /// Create a renderer for one MetricSet
    pub fn new(set_name: &'a str, config: &'a ComposeConfig) -> Self {
        Self {
            set_name,
            config,
            interactive: false,
        }
    }

    /// Keep containers alive after their script finishes
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Render `container`, which runs in `group`
    pub fn render(&self, container: &ContainerSpec, group: &JobGroup) -> Result<String> {
        let script = &container.script;
        let command = script.command.render();

        for fragment in script
            .pre
            .iter()
            .chain(std::iter::once(&command))
            .chain(script.post.iter())
        {
            if let Some(marker) = markers::find_marker(fragment) {
                return Err(Error::MarkerInFragment {
                    container: container.name.clone(),
                    marker,
                });
            }
        }

        let replicas = if group.replicas == 1 { "replica" } else { "replicas" };
        let mut out = format!(
            "#!{}\n# MetricSet: {}\n# Job group: {} ({} {replicas})\n# Container: {}\n\n",
            self.config.shell, self.set_name, group.name, group.replicas, container.name
        );
        out.push_str("replica_index=\"${JOB_COMPLETION_INDEX:-0}\"\n");

        for fragment in &script.pre {
            push_fragment(&mut out, fragment);
        }

        out.push('\n');
        out.push_str(&format!("echo \"{SEPARATOR}\"\n"));
        out.push_str(&format!("echo \"{COLLECTION_START}\"\n"));
        push_line(&mut out, &command);
        out.push_str(&format!("echo \"{COLLECTION_END}\"\n"));

        for fragment in &script.post {
            push_fragment(&mut out, fragment);
        }

        if self.interactive {
            out.push('\n');
            out.push_str("echo \"Interactive mode, keeping container alive\"\n");
            push_line(&mut out, &self.config.idle_command);
        }

        Ok(out)
    }
}

fn push_fragment(out: &mut String, fragment: &str) {
    let fragment = fragment.trim_matches('\n');
    if fragment.trim().is_empty() {
        return;
    }
    out.push('\n');
    push_line(out, fragment);
}

fn push_line(out: &mut String, text: &str) {
    out.push_str(text.trim_end());
    out.push('\n');
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::specs::{Command, EntrypointScript};

    fn container(script: EntrypointScript) -> ContainerSpec {
        ContainerSpec::new("app", "launcher", "image", script)
    }

    fn render(container: &ContainerSpec, interactive: bool) -> Result<String> {
        let config = ComposeConfig::default();
        ScriptRenderer::new("pennant", &config)
            .interactive(interactive)
            .render(container, &JobGroup::new("launcher", 1))
    }

    #[test]
    fn fragments_and_markers_in_order() {
        let script = EntrypointScript::new(Command::new("pennant /opt/test.pnt"))
            .with_pre("echo first")
            .with_pre("echo second")
            .with_post("echo done");
        let text = render(&container(script), false).unwrap();

        let pos = |needle: &str| text.find(needle).unwrap();
        assert!(text.starts_with("#!/bin/bash\n# MetricSet: pennant\n"));
        assert!(text.contains("# Job group: launcher (1 replica)"));
        assert!(pos("echo first") < pos("echo second"));
        assert!(pos("echo second") < pos(SEPARATOR));
        assert!(pos(SEPARATOR) < pos(COLLECTION_START));
        assert!(pos(COLLECTION_START) < pos("pennant /opt/test.pnt"));
        assert!(pos("pennant /opt/test.pnt") < pos(COLLECTION_END));
        assert!(pos(COLLECTION_END) < pos("echo done"));
        for marker in markers::ALL {
            assert_eq!(text.matches(marker).count(), 1);
        }
    }

    #[test]
    fn marker_in_fragment_is_rejected() {
        let script = EntrypointScript::new(Command::new("run"))
            .with_pre(format!("echo \"{COLLECTION_END}\""));
        let err = render(&container(script), false).unwrap_err();
        assert!(matches!(
            err,
            Error::MarkerInFragment { marker, .. } if marker == COLLECTION_END
        ));
    }

    #[test]
    fn interactive_appends_idle_wait() {
        let script = EntrypointScript::new(Command::new("run"));
        let text = render(&container(script), true).unwrap();
        assert!(text.trim_end().ends_with("sleep infinity"));
        assert!(text.find(COLLECTION_END).unwrap() < text.find("sleep infinity").unwrap());
    }

    #[test]
    fn rendering_is_deterministic() {
        let script = EntrypointScript::new(Command::new("run")).with_pre("echo a");
        let c = container(script);
        assert_eq!(render(&c, false).unwrap(), render(&c, false).unwrap());
    }
}
