//! The `perf-sysstat` monitor metric: `pidstat` against the application PID

use metricset_common::crd::OptionBag;
use metricset_common::{Error, Result, DEFAULT_JOB_GROUP};

use crate::assembly::AssemblyContext;
use crate::capability::{Family, Metric, MetricKind, Plugin, PluginDescriptor};
use crate::options::{OptionReader, OptionWriter};
use crate::specs::{Command, ContainerSpec, EntrypointScript};

const IDENTIFIER: &str = "perf-sysstat";
const DEFAULT_IMAGE: &str = "ghcr.io/converged-computing/metric-sysstat:latest";
const DEFAULT_RATE: i32 = 10;
const LOOP_SCRIPT: &str = "/tmp/pidstat-loop.sh";

/// `pidstat` reports taken at every timepoint: (label, flags)
const REPORTS: [(&str, &str); 6] = [
    ("CPU STATISTICS", "-u"),
    ("KERNEL STATISTICS", "-d"),
    ("POLICY", "-R"),
    ("PAGEFAULTS and MEMORY", "-r"),
    ("STACK UTILIZATION", "-s"),
    ("TASK SWITCHING", "-w"),
];

/// Samples process statistics of the application every `rate` seconds
#[derive(Clone, Debug)]
pub struct PidStat {
    descriptor: PluginDescriptor,
    rate: i32,
    completions: i32,
    threads: bool,
    image: String,
}

impl Default for PidStat {
    fn default() -> Self {
        Self {
            descriptor: PluginDescriptor::metric(
                IDENTIFIER,
                Family::Performance,
                "statistics for Linux tasks (processes) : I/O, CPU, memory, etc.",
            )
            .with_image(DEFAULT_IMAGE)
            .with_url("https://github.com/sysstat/sysstat"),
            rate: DEFAULT_RATE,
            completions: 0,
            threads: false,
            image: DEFAULT_IMAGE.to_string(),
        }
    }
}

impl PidStat {
    /// Single-quoted regex matching exactly the command line `command`
    fn process_pattern(command: &str) -> String {
        let mut pattern = String::with_capacity(command.len() + 2);
        pattern.push('\'');
        for ch in command.trim().chars() {
            match ch {
                '\'' => pattern.push_str(r"'\''"),
                '\\' | '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}'
                | '|' => {
                    pattern.push('\\');
                    pattern.push(ch);
                }
                _ => pattern.push(ch),
            }
        }
        pattern.push('\'');
        pattern
    }

    fn wait_fragment(command: &str) -> String {
        let pattern = Self::process_pattern(command);
        format!(
            r#"echo "Waiting for application PID..."
pid=$(pgrep -n -x -f {pattern})
while [ -z "${{pid}}" ]; do
    sleep 1
    pid=$(pgrep -n -x -f {pattern})
done
echo "Application PID is ${{pid}}""#
        )
    }

    /// Loop sampling process `$pid` until it exits
    fn sampling_loop(&self) -> String {
        let extra = if self.threads { " -t" } else { "" };
        let mut lines = vec![
            "i=0".to_string(),
            "while kill -0 ${pid} 2>/dev/null; do".to_string(),
        ];
        for (label, flag) in REPORTS {
            lines.push(format!("    echo \"{label} ${{i}}\""));
            lines.push(format!("    pidstat -p ${{pid}} {flag} -h{extra}"));
        }
        lines.push("    i=$((i+1))".to_string());
        if self.completions > 0 {
            lines.push(format!("    if [ ${{i}} -ge {} ]; then", self.completions));
            lines.push("        break".to_string());
            lines.push("    fi".to_string());
        }
        lines.push(format!("    sleep {}", self.rate));
        lines.push("done".to_string());
        lines.join("\n")
    }

    /// Writes the sampling loop to `LOOP_SCRIPT`, which takes the PID as `$1`
    fn loop_file_fragment(&self) -> String {
        format!(
            "cat <<'EOF' > {LOOP_SCRIPT}\npid=\"$1\"\n{}\nEOF",
            self.sampling_loop()
        )
    }
}

impl Plugin for PidStat {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn set_options(&mut self, options: &OptionBag) -> Result<()> {
        let reader = OptionReader::new(IDENTIFIER, options);
        self.rate = reader.int_or("rate", DEFAULT_RATE)?;
        self.completions = reader.int_or("completions", 0)?;
        self.threads = reader.flag("threads");
        self.image = reader.string_or("image", DEFAULT_IMAGE);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.rate <= 0 {
            return Err(Error::validation(
                IDENTIFIER,
                "rate",
                format!("rate must be a positive number of seconds, got {}", self.rate),
            ));
        }
        if self.completions < 0 {
            return Err(Error::validation(
                IDENTIFIER,
                "completions",
                "completions must not be negative",
            ));
        }
        Ok(())
    }

    fn options(&self) -> OptionBag {
        OptionWriter::new()
            .int("rate", self.rate)
            .int("completions", self.completions)
            .flag("threads", self.threads)
            .string("image", &self.image)
            .finish()
    }
}

impl Metric for PidStat {
    fn kind(&self) -> MetricKind {
        MetricKind::Monitor
    }

    fn assemble_containers(&self, ctx: &AssemblyContext<'_>) -> Result<Vec<ContainerSpec>> {
        let application = ctx.application.ok_or_else(|| Error::MissingApplication {
            plugin: IDENTIFIER.to_string(),
        })?;
        let command = format!("{} {LOOP_SCRIPT} ${{pid}}", ctx.config.shell);
        let script = EntrypointScript::new(Command::new(command))
            .with_pre(Self::wait_fragment(&application.command))
            .with_pre(self.loop_file_fragment());
        let mut container = ContainerSpec::new(IDENTIFIER, DEFAULT_JOB_GROUP, &self.image, script);
        container.security.add_capability("SYS_PTRACE");
        Ok(vec![container])
    }
}
