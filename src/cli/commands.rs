//! Command dispatch
//!
//! Each command opens the configured network through the service container,
//! runs one operation and prints the result.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use termtree::Tree;
use tracing::{debug, instrument};

use crate::application::services::{LoadStatus, NetworkService};
use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, Settings};
use crate::domain::{parse_node_value, parse_property, Network, NewNode};
use crate::infrastructure::{InfraError, ServiceContainer};

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see --help".to_string(),
        ));
    };

    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => cmd_config(cli, command),
        _ => {
            let settings = Settings::load(cli.data_dir.as_deref())?;
            let container = ServiceContainer::new(settings);
            let mut service = container.network_service();
            report_load_status(&service);
            run(&container, &mut service, command)
        }
    }
}

fn run(
    container: &ServiceContainer,
    service: &mut NetworkService,
    command: &Commands,
) -> CliResult<()> {
    match command {
        Commands::Init => cmd_init(service),
        Commands::Show { tree, json } => cmd_show(service, *tree, *json),
        Commands::Stats => cmd_stats(service),
        Commands::Add {
            parent,
            id,
            value,
            props,
        } => cmd_add(service, parent.as_deref(), id.clone(), value.as_deref(), props),
        Commands::Remove { id } => {
            service.remove_node(id)?;
            output::success(&format!("removed '{id}'"));
            Ok(())
        }
        Commands::RemoveBulk { ids } => cmd_remove_bulk(service, ids),
        Commands::ImportSubtree { parent, file } => {
            let text = read_input(container, file)?;
            let added = service.import_subtree_json(parent, &text)?;
            output::success(&format!("imported {} nodes under '{parent}'", added.len()));
            for id in &added {
                output::detail(id);
            }
            Ok(())
        }
        Commands::Insight { id } => cmd_insight(service, id),
        Commands::Suggest { limit } => cmd_suggest(service, *limit),
        Commands::Settings { min_children } => {
            if service.update_settings(*min_children)? {
                output::success(&format!("min_children_threshold set to {min_children}"));
            } else {
                output::info(&format!("min_children_threshold already {min_children}"));
            }
            Ok(())
        }
        Commands::Import { file } => {
            let text = read_input(container, file)?;
            let issues = service.replace_from_json(&text)?;
            for issue in &issues {
                output::warning(issue);
            }
            output::success(&format!(
                "imported network with {} nodes",
                service.network().len()
            ));
            Ok(())
        }
        Commands::Export { output: target } => {
            let json = service.export_json()?;
            match target {
                Some(path) => {
                    container
                        .fs
                        .write(path, &json)
                        .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
                    output::success(&format!("exported to {}", path.display()));
                }
                None => output::info(&json),
            }
            Ok(())
        }
        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}

fn report_load_status(service: &NetworkService) {
    if let LoadStatus::Recovered(reason) = service.status() {
        output::warning(&format!(
            "could not read {}, started a fresh network: {}",
            service.persistence().path().display(),
            reason
        ));
    }
}

fn read_input(container: &ServiceContainer, path: &Path) -> CliResult<String> {
    container
        .fs
        .read_to_string(path)
        .map_err(|e| InfraError::io(format!("read {}", path.display()), e).into())
}

fn cmd_init(service: &NetworkService) -> CliResult<()> {
    let path = service.persistence().path().display().to_string();
    match service.status() {
        LoadStatus::Missing => output::success(&format!("created {path}")),
        _ => output::info(&format!(
            "{path} holds {} nodes",
            service.network().len()
        )),
    }
    Ok(())
}

#[instrument(level = "debug", skip(service))]
fn cmd_add(
    service: &mut NetworkService,
    parent: Option<&str>,
    id: Option<String>,
    value: Option<&str>,
    props: &[String],
) -> CliResult<()> {
    let mut spec = NewNode {
        id,
        value: match value {
            Some(raw) => parse_node_value(raw).map_err(ApplicationError::from)?,
            None => None,
        },
        ..NewNode::default()
    };
    for raw in props {
        let (key, value) = parse_property(raw).map_err(CliError::InvalidArgs)?;
        spec = spec.with_property(key, value);
    }
    debug!("add: parent={:?} spec={:?}", parent, spec);

    let id = service.add_node(parent, spec)?;
    output::success(&format!("added '{id}'"));
    Ok(())
}

fn cmd_remove_bulk(service: &mut NetworkService, ids: &[String]) -> CliResult<()> {
    let report = service.remove_nodes(ids)?;
    output::success(&format!("deleted {} nodes", report.deleted_count()));
    for id in &report.deleted {
        output::success_detail(id);
    }
    for (id, reason) in &report.failed {
        output::failure(&format!("{id}: {reason}"));
    }
    Ok(())
}

fn cmd_show(service: &NetworkService, tree: bool, json: bool) -> CliResult<()> {
    let network = service.network();
    if json {
        output::info(&service.export_json()?);
        return Ok(());
    }
    if network.is_empty() {
        output::info("empty network");
        return Ok(());
    }
    if tree {
        for root in network.nodes().filter(|n| n.is_root()) {
            let mut seen = HashSet::new();
            output::info(&network_tree(network, &root.id, &mut seen));
        }
        return Ok(());
    }

    output::header(&format!(
        "{:<24} {:>12} {:>5} {:>8} {:>12} {:>11}",
        "id", "value", "depth", "children", "profit", "criticality"
    ));
    for node in network.nodes() {
        let m = &node.metrics;
        output::info(&format!(
            "{:<24} {:>12.2} {:>5} {:>8} {:>12.2} {:>11}",
            node.id,
            node.value,
            m.depth,
            m.children_count,
            m.profit,
            output::criticality(m.criticality)
        ));
    }
    Ok(())
}

/// Tree rooted at `id`. Nodes already printed on this branch are not expanded
/// again, which keeps cyclic data finite.
pub fn network_tree(network: &Network, id: &str, seen: &mut HashSet<String>) -> Tree<String> {
    let label = match network.node(id) {
        Some(node) => format!(
            "{} (value {:.2}, crit {:.3})",
            node.id, node.value, node.metrics.criticality
        ),
        None => id.to_string(),
    };
    if !seen.insert(id.to_string()) {
        return Tree::new(format!("{label} ..."));
    }
    let leaves: Vec<Tree<String>> = network
        .direct_children(id)
        .into_iter()
        .map(|child| network_tree(network, child, seen))
        .collect();
    seen.remove(id);
    Tree::new(label).with_leaves(leaves)
}

fn cmd_stats(service: &NetworkService) -> CliResult<()> {
    let stats = service.stats();
    output::header("Network");
    output::action("nodes", &stats.total_nodes);
    output::action("edges", &stats.total_edges);
    output::action("max depth", &stats.max_depth);
    output::action("total value", &format!("{:.2}", stats.total_value));
    output::action("total profit", &format!("{:.2}", stats.total_profit));
    output::action(
        "min children",
        &service.network().settings().min_children_threshold,
    );
    Ok(())
}

fn cmd_insight(service: &NetworkService, id: &str) -> CliResult<()> {
    let insight = service.insight(id)?;
    output::header(&insight.id);
    output::action("value", &format!("{:.2}", insight.value));
    output::action("depth", &insight.depth);
    output::action(
        "children",
        &format!(
            "{} direct, {} total",
            insight.children_count, insight.total_children
        ),
    );
    output::action("profit", &format!("{:.2}", insight.profit));
    output::action("criticality", &output::criticality(insight.criticality));
    output::action(
        "needed",
        &format!(
            "{} of {} suggested{}",
            insight.needed_children,
            insight.suggested_children,
            if insight.is_chokepoint { " (chokepoint)" } else { "" }
        ),
    );
    output::action("parents", &insight.parents.join(", "));
    output::action("children ids", &insight.children.join(", "));
    for (key, value) in &insight.extra {
        output::detail(&format!("{key} = {value}"));
    }
    Ok(())
}

fn cmd_suggest(service: &NetworkService, limit: usize) -> CliResult<()> {
    let suggestions = service.suggestions(limit);
    if suggestions.is_empty() {
        output::success("no node needs more children");
        return Ok(());
    }
    output::header(&format!(
        "{:>3} {:<24} {:>9} {:>11} {:>8} {:>5}",
        "#", "id", "priority", "criticality", "needed", "depth"
    ));
    for (rank, s) in suggestions.iter().enumerate() {
        output::info(&format!(
            "{:>3} {:<24} {:>9.4} {:>11} {:>3}/{:<4} {:>5}",
            rank + 1,
            s.id,
            s.priority,
            output::criticality(s.criticality),
            s.current_children,
            s.suggested_children,
            s.depth
        ));
    }
    Ok(())
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(cli.data_dir.as_deref())?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            let settings = Settings::load(cli.data_dir.as_deref())?;
            match global_config_path() {
                Some(path) => output::action("global config", &path.display()),
                None => output::warning("no config directory on this platform"),
            }
            output::action("network file", &settings.network_path().display());
        }
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(())
}
