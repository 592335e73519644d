//! Spek CLI: explores and reduces the demonstration scenarios from the
//! command line.

mod scenarios;

use std::env;
use std::io;
use std::process;

use clap::{CommandFactory, Parser as ClapParser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use tracing::info;

use scenarios::Scenario;
use spek_statespace::{explorer, lts::Lts, reduce, reduce_with, Cached, ObservationalCongruence, Strong, Weak};

#[derive(ClapParser)]
#[command(name = "spek")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explore and reduce Spek demonstration scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available demonstration scenarios
    List,

    /// Explore a scenario's reachable state space
    Explore {
        /// Scenario name (see `spek list`)
        name: String,
    },

    /// Reduce a scenario's LTS under a bisimilarity
    Reduce {
        name: String,
        #[arg(short, long, value_enum, default_value = "weak")]
        equivalence: Equivalence,
        #[arg(long)]
        remove_internal_loops: bool,
        /// Write the reduced graph to this path (`.bin` uses bincode,
        /// anything else JSON) instead of only printing its stats
        #[arg(long)]
        snapshot: Option<std::path::PathBuf>,
    },

    /// Check whether two scenarios (both graph-based) are isomorphic
    Isomorphic { left: String, right: String },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Equivalence {
    Strong,
    Weak,
    Ocong,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("spek {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("spek_cli=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => run_list(),
        Commands::Explore { name } => run_explore(&name),
        Commands::Reduce {
            name,
            equivalence,
            remove_internal_loops,
            snapshot,
        } => run_reduce(&name, equivalence, remove_internal_loops, snapshot.as_deref()),
        Commands::Isomorphic { left, right } => run_isomorphic(&left, &right),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "spek", &mut io::stdout());
}

fn run_list() {
    for name in scenarios::NAMES {
        println!("{name}");
    }
}

fn run_explore(name: &str) {
    let Some(scenario) = scenarios::build(name) else {
        eprintln!("Error: unknown scenario '{name}'");
        process::exit(1);
    };

    match scenario {
        Scenario::Machine(mut m) => {
            info!("exploring scenario '{name}'");
            let records = explorer::explore(
                &mut m.universe,
                &m.programs,
                &m.builtins,
                &m.registry,
                m.initial,
                &|u, p, b, s| spek_runtime::scheduler::schedule_all(u, p, b, s),
            );
            match records {
                Ok(records) => {
                    let transitions: usize = records.iter().map(|(_, es)| es.len()).sum();
                    println!("states: {}", records.len());
                    println!("transitions: {transitions}");
                    if let Some((last, _)) = records.last() {
                        let note = (m.describe)(&m.universe, last);
                        if !note.is_empty() {
                            println!("{note}");
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error exploring '{name}': {e}");
                    process::exit(1);
                }
            }
        }
        Scenario::Graph(lts) => {
            print_graph_stats(&lts);
        }
    }
}

fn print_graph_stats(lts: &Lts<String>) {
    let states = lts.reachable_states();
    let transitions: usize = states.iter().map(|&s| lts.transitions(s).len()).sum();
    println!("states: {}", states.len());
    println!("transitions: {transitions}");
}

fn run_reduce(name: &str, equivalence: Equivalence, remove_internal_loops: bool, snapshot: Option<&std::path::Path>) {
    let Some(scenario) = scenarios::build(name) else {
        eprintln!("Error: unknown scenario '{name}'");
        process::exit(1);
    };

    let reduced_graph = match scenario {
        Scenario::Machine(mut m) => {
            let records = explorer::explore(
                &mut m.universe,
                &m.programs,
                &m.builtins,
                &m.registry,
                m.initial,
                &|u, p, b, s| spek_runtime::scheduler::schedule_all(u, p, b, s),
            );
            let records = match records {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Error exploring '{name}': {e}");
                    process::exit(1);
                }
            };
            let lts = assemble_machine_lts(&records, &m.universe);
            let universe = m.universe;
            let reduced = match equivalence {
                Equivalence::Strong => reduce_with(&lts, &universe, &Strong, remove_internal_loops),
                Equivalence::Weak => reduce_with(&lts, &universe, &Cached::new(Weak), remove_internal_loops),
                Equivalence::Ocong => reduce_with(&lts, &universe, &Cached::new(ObservationalCongruence), remove_internal_loops),
            };
            map_to_unit(&reduced)
        }
        Scenario::Graph(lts) => match equivalence {
            Equivalence::Strong => reduce(&lts, &Strong, remove_internal_loops),
            Equivalence::Weak => reduce(&lts, &Cached::new(Weak), remove_internal_loops),
            Equivalence::Ocong => reduce(&lts, &Cached::new(ObservationalCongruence), remove_internal_loops),
        },
    };

    print_graph_stats(&reduced_graph);
    if let Some(path) = snapshot {
        if let Err(e) = write_snapshot(&reduced_graph, path) {
            eprintln!("Error writing snapshot to {}: {e}", path.display());
            process::exit(1);
        }
    }
}

/// Writes `lts` to `path`: bincode for a `.bin` extension, pretty JSON
/// otherwise. `MachineState`-backed scenarios are flattened to `String`
/// content by `map_to_unit` before reaching here, since only the graph
/// shape — not live arena handles — is meaningful once serialized.
fn write_snapshot(lts: &Lts<String>, path: &std::path::Path) -> io::Result<()> {
    let is_binary = path.extension().and_then(|ext| ext.to_str()) == Some("bin");
    if is_binary {
        let bytes = bincode::serialize(lts)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    } else {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, lts).map_err(io::Error::from)
    }
}

fn assemble_machine_lts(
    records: &[(spek_runtime::MachineState, Vec<(usize, spek_runtime::MachineState)>)],
    universe: &spek_core::Universe,
) -> Lts<spek_runtime::MachineState> {
    use spek_statespace::lts::{from_parts, StateNode, Transition};

    let index_of = |target: &spek_runtime::MachineState| {
        records.iter().position(|(s, _)| s.equals(target, universe)).expect("explorer always records every successor")
    };

    let states = records
        .iter()
        .map(|(s, successors)| StateNode {
            content: s.clone(),
            transitions: successors
                .iter()
                .map(|(idx, target)| Transition {
                    label: Some(*idx),
                    target: index_of(target),
                })
                .collect(),
        })
        .collect();

    from_parts(states, 0)
}

/// `reduce_with`'s content stays `MachineState`; downstream stats printing
/// only needs the graph shape, so this throws content away to reuse
/// `print_graph_stats`.
fn map_to_unit(lts: &Lts<spek_runtime::MachineState>) -> Lts<String> {
    use spek_statespace::lts::{from_parts, StateNode};
    let states = (0..lts.len())
        .map(|i| StateNode {
            content: String::new(),
            transitions: lts.transitions(i).to_vec(),
        })
        .collect();
    from_parts(states, lts.initial())
}

fn run_isomorphic(left: &str, right: &str) {
    let (Some(l), Some(r)) = (scenarios::build(left), scenarios::build(right)) else {
        eprintln!("Error: unknown scenario name");
        process::exit(1);
    };
    match (l, r) {
        (Scenario::Graph(lhs), Scenario::Graph(rhs)) => {
            let result = spek_statespace::isomorphic(&lhs, &rhs, |a, b| a == b);
            println!("{result}");
        }
        _ => {
            eprintln!("Error: isomorphic comparison is only supported between graph-based scenarios");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_statespace::lts::{from_parts, StateNode, Transition};

    fn sample_graph() -> Lts<String> {
        from_parts(
            vec![
                StateNode {
                    content: "a".to_string(),
                    transitions: vec![Transition { label: Some(0), target: 1 }],
                },
                StateNode {
                    content: "b".to_string(),
                    transitions: vec![],
                },
            ],
            0,
        )
    }

    #[test]
    fn json_snapshot_round_trips() {
        let lts = sample_graph();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        write_snapshot(&lts, &path).unwrap();
        let restored: Lts<String> = serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(restored.len(), lts.len());
        assert_eq!(restored.initial(), lts.initial());
    }

    #[test]
    fn binary_snapshot_round_trips() {
        let lts = sample_graph();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");
        write_snapshot(&lts, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let restored: Lts<String> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.len(), lts.len());
        assert_eq!(restored.content(1), lts.content(1));
    }
}
