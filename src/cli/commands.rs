use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "promptctl")]
#[command(version, about = "Compare prompt revisions side by side and promote the winner")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project the prompts belong to (overrides config and PROMPTCTL_PROJECT)
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Per-invocation timeout in milliseconds for A/B runs
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Proposed field values for a revision.
#[derive(Args, Debug, Clone, Default)]
pub struct RevisionArgs {
    /// System message
    #[arg(long)]
    pub system: Option<String>,

    /// User message template
    #[arg(long)]
    pub user: Option<String>,

    /// Model identifier
    #[arg(long)]
    pub model: Option<String>,
}

/// Where invocation input comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Input variables as a JSON object
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read input variables from a JSON file
    #[arg(long, value_name = "FILE")]
    pub input_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new promptctl project in the current directory
    Init,

    /// List prompts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a single prompt
    Get {
        slug: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a prompt
    Create {
        slug: String,

        /// Display name (defaults to the slug)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[command(flatten)]
        revision: RevisionArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update fields of a prompt in place
    Update {
        slug: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[command(flatten)]
        revision: RevisionArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a prompt
    Delete {
        slug: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Show what a revision would change, without staging it
    Diff {
        slug: String,

        #[command(flatten)]
        revision: RevisionArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a prompt once
    Invoke {
        slug: String,

        #[command(flatten)]
        input: InputArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Test a prompt. With revision flags, stage a candidate, run both
    /// versions on the same input and decide whether to promote.
    Test {
        slug: String,

        /// Input variables as a JSON object (omit to compare diffs only)
        #[arg(value_name = "INPUT")]
        input: Option<String>,

        #[command(flatten)]
        revision: RevisionArgs,

        /// Keep the candidate after deciding
        #[arg(long)]
        keep: bool,

        /// Promote without asking
        #[arg(long, short = 'f')]
        force: bool,

        /// Output the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy one prompt's system message, user template and model onto another
    Promote {
        /// Prompt to copy from
        #[arg(long)]
        from: String,

        /// Prompt to overwrite
        #[arg(long)]
        to: String,

        /// Keep the source prompt afterwards
        #[arg(long)]
        keep: bool,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Generate a typed TypeScript client for a prompt
    Generate {
        slug: String,

        /// Write to a file instead of stdout
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List the variables a prompt's templates reference
    Variables {
        slug: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete staged candidates left behind by interrupted runs
    Sweep {
        /// Only candidates of this prompt
        #[arg(long)]
        source: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Show recorded invocations
    Traces {
        /// Only traces of this prompt
        #[arg(long)]
        slug: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
