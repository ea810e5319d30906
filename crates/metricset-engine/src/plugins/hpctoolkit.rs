//! The `perf-hpctoolkit` addon
//!
//! A standalone container in each targeted job group copies an HPCToolkit
//! view into a shared scratch volume. Every other container of the group
//! waits for that view to appear, and the targeted commands are run under
//! `hpcrun <events>`.

use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result};

use crate::assembly::AssemblyContext;
use crate::capability::{Addon, AddonBase, AddonScope, Family, Plugin, PluginDescriptor};
use crate::options::{OptionReader, OptionWriter};
use crate::specs::{Command, ContainerSpec, EntrypointScript, JobGroup, VolumeSource, VolumeSpec};

const IDENTIFIER: &str = "perf-hpctoolkit";
const VIEW_CONTAINER: &str = "hpctoolkit";
const VOLUME_NAME: &str = "hpctoolkit";
const DEFAULT_IMAGE: &str = "ghcr.io/converged-computing/metric-hpctoolkit-view:latest";
const DEFAULT_MOUNT: &str = "/opt/share";

/// Runs targeted commands under `hpcrun`
#[derive(Clone, Debug)]
pub struct HpcToolkit {
    base: AddonBase,
    events: String,
    mount: String,
    image: String,
    privileged: bool,
}

impl Default for HpcToolkit {
    fn default() -> Self {
        Self {
            base: AddonBase::new(
                PluginDescriptor::addon(
                    IDENTIFIER,
                    Family::Performance,
                    "performance tools for measurement and analysis",
                )
                .with_image(DEFAULT_IMAGE)
                .with_url("https://hpctoolkit.org"),
            ),
            events: String::new(),
            mount: DEFAULT_MOUNT.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            privileged: false,
        }
    }
}

impl HpcToolkit {
    fn view_script(&self) -> String {
        format!(
            r#"echo "Moving content from /opt/views to the shared volume at {mount}"
view=$(ls /opt/views/._view/)
view="/opt/views/._view/${{view}}"
viewroot="{mount}"
mkdir -p ${{viewroot}}/view
cp -R ${{view}}/* ${{viewroot}}/view
cp -R /opt/software ${{viewroot}}/
echo "HPCToolkit view is ready under ${{viewroot}}""#,
            mount = self.mount
        )
    }
}

impl Plugin for HpcToolkit {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.base.descriptor
    }

    fn set_options(&mut self, options: &OptionBag) -> Result<()> {
        let reader = OptionReader::new(IDENTIFIER, options);
        self.base.scope = AddonScope::read(&reader);
        self.events = reader.string_or("events", "");
        self.mount = reader.string_or("mount", DEFAULT_MOUNT);
        self.image = reader.string_or("image", DEFAULT_IMAGE);
        self.privileged = reader.flag("privileged");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.events.trim().is_empty() {
            return Err(Error::validation(
                IDENTIFIER,
                "events",
                "one or more 'events' for hpcrun are required (e.g. -e IO)",
            ));
        }
        if self.image.is_empty() {
            return Err(Error::validation(IDENTIFIER, "image", "a view 'image' is required"));
        }
        if !self.mount.starts_with('/') {
            return Err(Error::validation(
                IDENTIFIER,
                "mount",
                format!("'{}' is not an absolute path", self.mount),
            ));
        }
        Ok(())
    }

    fn options(&self) -> OptionBag {
        let writer = OptionWriter::new()
            .string("events", &self.events)
            .string("mount", &self.mount)
            .string("image", &self.image)
            .flag("privileged", self.privileged);
        self.base.scope.write(writer).finish()
    }
}

impl Addon for HpcToolkit {
    fn scope(&self) -> &AddonScope {
        &self.base.scope
    }

    fn assemble_containers(
        &self,
        group: &JobGroup,
        ctx: &AssemblyContext<'_>,
    ) -> Result<Vec<ContainerSpec>> {
        let script = EntrypointScript::new(Command::new(&ctx.config.idle_command))
            .named(format!("{VIEW_CONTAINER}-{}", group.name))
            .with_pre(self.view_script());
        Ok(vec![
            ContainerSpec::new(VIEW_CONTAINER, &group.name, &self.image, script).standalone(),
        ])
    }

    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        vec![VolumeSpec::new(VOLUME_NAME, VolumeSource::EmptyDir, &self.mount)]
    }

    fn setup_fragment(&self, _group: &JobGroup) -> Option<String> {
        Some(format!(
            r#"# HPCToolkit: wait for the shared view, then put it on the path
viewbase="{mount}"
software="${{viewbase}}/software"
viewbin="${{viewbase}}/view/bin"
export PATH=${{viewbin}}:$PATH
echo "Waiting for ${{viewbin}}/hpcrun"
until [ -x "${{viewbin}}/hpcrun" ] && [ -d "${{software}}" ]; do
    sleep 2
done
cp -R ${{software}} /opt/software
echo "-1" | tee /proc/sys/kernel/perf_event_paranoid"#,
            mount = self.mount
        ))
    }

    fn wrap_command(&self, container: &mut ContainerSpec) {
        container
            .script
            .command
            .wrap(&format!("hpcrun {}", self.events.trim()), "");
        if self.privileged {
            container.security.privileged = true;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capability::customize_scoped;
    use crate::config::ComposeConfig;
    use metricset_common::markers;

    fn configured(options: OptionBag) -> HpcToolkit {
        let mut addon = HpcToolkit::default();
        addon.set_options(&options).unwrap();
        addon
    }

    #[test]
    fn events_are_required() {
        let addon = configured(OptionBag::new());
        match addon.validate() {
            Err(Error::Validation { plugin, field, .. }) => {
                assert_eq!(plugin, IDENTIFIER);
                assert_eq!(field, "events");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn view_container_is_standalone_and_named_per_group() {
        let addon = configured(OptionBag::new().with("events", "-e IO"));
        let config = ComposeConfig::default();
        let ctx = AssemblyContext {
            set_name: "pennant",
            pods: 2,
            application: None,
            config: &config,
        };
        let containers = addon
            .assemble_containers(&JobGroup::new("launcher", 1), &ctx)
            .unwrap();
        assert_eq!(containers.len(), 1);
        assert!(containers[0].standalone);
        assert_eq!(containers[0].script.name.as_deref(), Some("hpctoolkit-launcher"));
        assert_eq!(containers[0].image, DEFAULT_IMAGE);
    }

    #[test]
    fn volume_uses_mount() {
        let addon = configured(OptionBag::new().with("events", "-e IO").with("mount", "/share"));
        let volumes = addon.assemble_volumes();
        assert_eq!(volumes[0].name, "hpctoolkit");
        assert_eq!(volumes[0].path, "/share");
        assert_eq!(volumes[0].source, VolumeSource::EmptyDir);
    }

    #[test]
    fn wraps_inside_launcher_and_sets_privileged() {
        let addon = configured(
            OptionBag::new()
                .with("events", "-e IO")
                .with("privileged", "true")
                .with("containerTarget", "app"),
        );
        let groups = vec![JobGroup::new("launcher", 1)];
        let script = EntrypointScript::new(
            Command::new("pennant /opt/test.pnt").with_launcher("mpirun --hostfile ./hostlist.txt"),
        );
        let mut containers = vec![ContainerSpec::new("app", "launcher", "pennant", script)];
        customize_scoped(&addon, &mut containers, &groups);

        let c = &containers[0];
        assert_eq!(
            c.script.command.render(),
            "mpirun --hostfile ./hostlist.txt hpcrun -e IO pennant /opt/test.pnt"
        );
        assert!(c.security.privileged);
        assert_eq!(c.script.pre.len(), 1);
    }

    #[test]
    fn fragments_carry_no_markers() {
        let addon = configured(OptionBag::new().with("events", "-e IO"));
        let setup = addon.setup_fragment(&JobGroup::new("m", 1)).unwrap();
        assert_eq!(markers::find_marker(&setup), None);
        assert_eq!(markers::find_marker(&addon.view_script()), None);
    }
}
