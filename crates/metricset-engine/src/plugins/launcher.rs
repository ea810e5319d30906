//! Launcher/worker workload metrics (`app-pennant`, `app-lammps`)
//!
//! One replica in the `launcher` job group writes a hostlist and runs the
//! measured command under an MPI launcher; the `worker` job group idles
//! until the launcher's completion ends the job.

use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result, APPLICATION_CONTAINER, LAUNCHER_JOB_GROUP, WORKER_JOB_GROUP};

use crate::assembly::AssemblyContext;
use crate::capability::{Family, Metric, MetricKind, Plugin, PluginDescriptor};
use crate::options::{OptionReader, OptionWriter};
use crate::specs::{Command, ContainerSpec, EntrypointScript, JobGroup};

/// Launcher prefix used when `mpirun` is not set
pub const DEFAULT_MPIRUN: &str = "mpirun --hostfile ./hostlist.txt";

/// Worker container name
pub const WORKER_CONTAINER: &str = "worker";

/// Built-in defaults of one launcher/worker metric
#[derive(Clone, Copy, Debug)]
struct Defaults {
    command: &'static str,
    workdir: &'static str,
}

/// A workload metric with a launcher/worker split
#[derive(Clone, Debug)]
pub struct LauncherWorker {
    descriptor: PluginDescriptor,
    defaults: Defaults,
    command: String,
    mpirun: String,
    workdir: String,
    image: String,
}

impl LauncherWorker {
    fn new(descriptor: PluginDescriptor, defaults: Defaults) -> Self {
        let image = descriptor.default_image().to_string();
        Self {
            descriptor,
            defaults,
            command: String::new(),
            mpirun: DEFAULT_MPIRUN.to_string(),
            workdir: defaults.workdir.to_string(),
            image,
        }
    }

    /// `app-pennant`: unstructured mesh hydrodynamics
    pub fn pennant() -> Self {
        Self::new(
            PluginDescriptor::metric(
                "app-pennant",
                Family::Simulation,
                "Unstructured mesh hydrodynamics for advanced architectures",
            )
            .with_image("ghcr.io/converged-computing/metric-pennant:latest")
            .with_url("https://github.com/LLNL/pennant"),
            Defaults {
                command: "pennant /opt/pennant/test/sedovsmall/sedovsmall.pnt",
                workdir: "/opt/pennant/test",
            },
        )
    }

    /// `app-lammps`: molecular dynamics
    pub fn lammps() -> Self {
        Self::new(
            PluginDescriptor::metric(
                "app-lammps",
                Family::Simulation,
                "LAMMPS molecular dynamic simulation",
            )
            .with_image("ghcr.io/converged-computing/metric-lammps:latest")
            .with_url("https://www.lammps.org"),
            Defaults {
                command: "lmp -v x 2 -v y 2 -v z 2 -in in.reaxc.hns -nocite",
                workdir: "/opt/lammps/examples/reaxff/HNS",
            },
        )
    }

    /// Measured command: the `command` option, else the application's
    /// command, else the built-in default
    fn resolve_command<'a>(&'a self, ctx: &AssemblyContext<'a>) -> &'a str {
        if !self.command.is_empty() {
            &self.command
        } else if !ctx.application_command().is_empty() {
            ctx.application_command()
        } else {
            self.defaults.command
        }
    }

    fn hostlist_fragment(&self, ctx: &AssemblyContext<'_>) -> String {
        let mut lines = vec![
            "# Write the hostlist for the launcher".to_string(),
            "cat <<EOF > ./hostlist.txt".to_string(),
        ];
        for (group, replicas) in [
            (LAUNCHER_JOB_GROUP, 1),
            (WORKER_JOB_GROUP, ctx.worker_replicas()),
        ] {
            lines.extend((0..replicas).map(|index| ctx.hostname(group, index)));
        }
        lines.push("EOF".to_string());
        lines.push("cat ./hostlist.txt".to_string());
        lines.join("\n")
    }
}

impl Plugin for LauncherWorker {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn set_options(&mut self, options: &OptionBag) -> Result<()> {
        let reader = OptionReader::new(&self.descriptor.identifier, options);
        self.command = reader.string_or("command", "");
        self.mpirun = reader.string_or("mpirun", DEFAULT_MPIRUN);
        self.workdir = reader.string_or("workdir", self.defaults.workdir);
        self.image = reader.string_or("image", self.descriptor.default_image());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(Error::validation(
                self.identifier(),
                "image",
                "a container 'image' is required",
            ));
        }
        Ok(())
    }

    fn options(&self) -> OptionBag {
        OptionWriter::new()
            .string("command", &self.command)
            .string("mpirun", &self.mpirun)
            .string("workdir", &self.workdir)
            .string("image", &self.image)
            .finish()
    }
}

impl Metric for LauncherWorker {
    fn kind(&self) -> MetricKind {
        MetricKind::Workload
    }

    fn job_groups(&self, ctx: &AssemblyContext<'_>) -> Vec<JobGroup> {
        vec![
            JobGroup::new(LAUNCHER_JOB_GROUP, 1),
            JobGroup::new(WORKER_JOB_GROUP, ctx.worker_replicas()),
        ]
    }

    fn assemble_containers(&self, ctx: &AssemblyContext<'_>) -> Result<Vec<ContainerSpec>> {
        let command = Command::new(self.resolve_command(ctx)).with_launcher(&self.mpirun);
        let launcher_script =
            EntrypointScript::new(command).with_pre(self.hostlist_fragment(ctx));
        let worker_script = EntrypointScript::new(Command::new(&ctx.config.idle_command));

        let pull_secret = ctx.application.and_then(|a| a.pull_secret.clone());
        let mut launcher = ContainerSpec::new(
            APPLICATION_CONTAINER,
            LAUNCHER_JOB_GROUP,
            &self.image,
            launcher_script,
        )
        .with_working_dir(&self.workdir);
        launcher.pull_secret = pull_secret.clone();

        let mut worker =
            ContainerSpec::new(WORKER_CONTAINER, WORKER_JOB_GROUP, &self.image, worker_script)
                .with_working_dir(&self.workdir);
        worker.pull_secret = pull_secret;

        Ok(vec![launcher, worker])
    }
}
