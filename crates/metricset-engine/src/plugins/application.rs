//! The `application` addon: an extra application container per job group

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result};

use crate::assembly::AssemblyContext;
use crate::capability::{Addon, AddonBase, AddonScope, Family, Plugin, PluginDescriptor};
use crate::options::{OptionReader, OptionWriter};
use crate::specs::{Command, ContainerSpec, EntrypointScript, JobGroup, Resources};

const DEFAULT_NAME: &str = "app";

/// Adds a named application container to each targeted job group
#[derive(Clone, Debug)]
pub struct ApplicationAddon {
    base: AddonBase,
    name: String,
    image: String,
    command: String,
    entrypoint: String,
    working_dir: String,
    pull_secret: String,
    privileged: bool,
    limits: BTreeMap<String, IntOrString>,
    requests: BTreeMap<String, IntOrString>,
}

impl Default for ApplicationAddon {
    fn default() -> Self {
        Self {
            base: AddonBase::new(PluginDescriptor::addon(
                "application",
                Family::Application,
                "basic application (container) type",
            )),
            name: DEFAULT_NAME.to_string(),
            image: String::new(),
            command: String::new(),
            entrypoint: String::new(),
            working_dir: String::new(),
            pull_secret: String::new(),
            privileged: false,
            limits: BTreeMap::new(),
            requests: BTreeMap::new(),
        }
    }
}

impl ApplicationAddon {
    /// Shell line that starts the application
    fn start_line(&self) -> &str {
        if self.entrypoint.is_empty() {
            &self.command
        } else {
            &self.entrypoint
        }
    }
}

impl Plugin for ApplicationAddon {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.base.descriptor
    }

    fn set_options(&mut self, options: &OptionBag) -> Result<()> {
        let reader = OptionReader::new(&self.base.descriptor.identifier, options);
        self.base.scope = AddonScope::read(&reader);
        self.name = reader.string_or("name", DEFAULT_NAME);
        self.image = reader.string_or("image", "");
        self.command = reader.string_or("command", "");
        self.entrypoint = reader.string_or("entrypoint", "");
        self.working_dir = reader.string_or("workingDir", "");
        self.pull_secret = reader.string_or("pullSecret", "");
        self.privileged = reader.flag("privileged");
        self.limits = reader.raw_map("resourceLimits");
        self.requests = reader.raw_map("resourceRequests");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let id = self.identifier();
        if self.image.is_empty() {
            return Err(Error::validation(id, "image", "a container 'image' is required"));
        }
        if self.command.is_empty() {
            return Err(Error::validation(id, "command", "a container 'command' is required"));
        }
        if self.name.is_empty() {
            return Err(Error::validation(id, "name", "container 'name' must not be empty"));
        }
        Ok(())
    }

    fn options(&self) -> OptionBag {
        let writer = OptionWriter::new()
            .string("name", &self.name)
            .string("image", &self.image)
            .string("command", &self.command)
            .string("entrypoint", &self.entrypoint)
            .string("workingDir", &self.working_dir)
            .string("pullSecret", &self.pull_secret)
            .flag("privileged", self.privileged)
            .raw_map("resourceLimits", &self.limits)
            .raw_map("resourceRequests", &self.requests);
        self.base.scope.write(writer).finish()
    }
}

impl Addon for ApplicationAddon {
    fn scope(&self) -> &AddonScope {
        &self.base.scope
    }

    fn assemble_containers(
        &self,
        group: &JobGroup,
        _ctx: &AssemblyContext<'_>,
    ) -> Result<Vec<ContainerSpec>> {
        let script = EntrypointScript::new(Command::new(self.start_line()))
            .named(format!("{}-{}", self.name, group.name));

        let mut container = ContainerSpec::new(&self.name, &group.name, &self.image, script)
            .with_working_dir(&self.working_dir);
        container.pull_secret = (!self.pull_secret.is_empty()).then(|| self.pull_secret.clone());
        container.security.privileged = self.privileged;
        container.resources = Resources {
            limits: self.limits.clone(),
            requests: self.requests.clone(),
        };
        Ok(vec![container])
    }
}
