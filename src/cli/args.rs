//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::DEFAULT_SUGGESTION_LIMIT;

/// Hierarchical business network with derived depth, profit and criticality metrics
#[derive(Parser, Debug)]
#[command(name = "bizgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more detail (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Directory holding the network file (overrides config)
    #[arg(long, global = true, env = "BIZGRAPH_DATA_DIR", value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the network file if it does not exist yet
    Init,

    /// Print the network
    Show {
        /// Render as tree
        #[arg(long, conflicts_with = "json")]
        tree: bool,
        /// Print the full JSON document
        #[arg(long)]
        json: bool,
    },

    /// Whole-network totals
    Stats,

    /// Add a node (root when no parent is given and the network is empty)
    Add {
        /// Parent node id
        #[arg(short, long)]
        parent: Option<String>,
        /// Requested id (suffixed with _1, _2, ... when taken)
        #[arg(long)]
        id: Option<String>,
        /// Node value (default 1000.0)
        #[arg(long, allow_hyphen_values = true)]
        value: Option<String>,
        /// Extra property, KEY=VALUE (value parsed as JSON when possible)
        #[arg(long = "prop", value_name = "KEY=VALUE")]
        props: Vec<String>,
    },

    /// Remove a leaf node
    Remove {
        /// Node id
        id: String,
    },

    /// Remove several leaf nodes; nothing is removed if any id is rejected
    RemoveBulk {
        /// Node ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Import a {nodes, graph} fragment under an existing node
    ImportSubtree {
        /// Parent node id
        parent: String,
        /// Fragment JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Show a node with its parents and children
    Insight {
        /// Node id
        id: String,
    },

    /// Rank nodes that most need more children
    Suggest {
        /// Maximum number of suggestions (at least 1)
        #[arg(short, long, default_value_t = DEFAULT_SUGGESTION_LIMIT)]
        limit: usize,
    },

    /// Update network settings
    Settings {
        /// Minimum number of children per node
        #[arg(long, allow_hyphen_values = true)]
        min_children: i64,
    },

    /// Replace the whole network with a JSON document
    Import {
        /// Network JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Write the network JSON document
    Export {
        /// Output file (default: stdout)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config and data paths
    Path,

    /// Print a config template
    Template,
}
