//! List command

use clap::Args;

use metricset_engine::{Family, Registry};

use super::format_table;
use crate::Result;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show one family (simulation, performance, storage, network, application)
    #[arg(long)]
    pub family: Option<Family>,

    /// Print identifiers only
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn run(args: ListArgs) -> Result<()> {
    print!("{}", render(Registry::builtin(), &args));
    Ok(())
}

fn render(registry: &Registry, args: &ListArgs) -> String {
    if args.quiet {
        return registry
            .list(args.family)
            .iter()
            .map(|id| format!("{id}\n"))
            .collect();
    }

    let rows: Vec<Vec<String>> = registry
        .descriptors()
        .filter(|d| args.family.map_or(true, |f| d.family == f))
        .map(|d| {
            vec![
                d.identifier.clone(),
                d.kind.as_str().to_string(),
                d.family.to_string(),
                d.summary.trim().to_string(),
            ]
        })
        .collect();
    format_table(&["NAME", "KIND", "FAMILY", "SUMMARY"], &rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn quiet_lists_sorted_identifiers() {
        let out = render(
            Registry::builtin(),
            &ListArgs {
                family: Some(Family::Simulation),
                quiet: true,
            },
        );
        assert_eq!(out, "app-lammps\napp-pennant\n");
    }

    #[test]
    fn table_includes_kind_and_family() {
        let out = render(
            Registry::builtin(),
            &ListArgs {
                family: Some(Family::Performance),
                quiet: false,
            },
        );
        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].starts_with("NAME"));
        assert!(lines.iter().any(|l| l.starts_with("perf-hpctoolkit") && l.contains("addon")));
        assert!(lines.iter().any(|l| l.starts_with("perf-sysstat") && l.contains("metric")));
    }
}
