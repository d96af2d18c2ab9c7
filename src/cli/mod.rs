//! CLI argument definitions for Plancanvas.

use clap::{Parser, Subcommand};

/// Plancanvas - persistence and versioning for block-based planning canvases.
///
/// Every command opens an editing session on one canvas, applies the
/// change, saves, and closes the session.
#[derive(Parser, Debug)]
#[command(name = "pc")]
#[command(author, version, about = "Graph-document persistence for planning canvases", long_about = None)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PC_GIT_COMMIT"),
    ", built ",
    env!("PC_BUILD_TIMESTAMP"),
    ")"
))]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// User id of the caller
    #[arg(long, global = true, env = "PLANCANVAS_USER")]
    pub user: Option<String>,

    /// Email of the caller; shares are matched against it
    #[arg(long, global = true, env = "PLANCANVAS_EMAIL")]
    pub email: Option<String>,

    /// Canvas to work on (defaults to your most recently saved canvas)
    #[arg(long, global = true, env = "PLANCANVAS_CANVAS")]
    pub canvas: Option<String>,

    /// Override the autosave debounce window
    #[arg(long = "debounce-ms", global = true)]
    pub debounce_ms: Option<u64>,

    /// Emit logs as JSON lines on stderr
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Canvas documents (show, list, create, export, import)
    Canvas {
        #[command(subcommand)]
        command: CanvasCommands,
    },

    /// Blocks on the canvas
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Connect two blocks (optionally from or to a prompt handle)
    Connect {
        /// Source block id
        source: String,

        /// Target block id
        target: String,

        /// Attach at this prompt of the source block
        #[arg(long)]
        source_prompt: Option<String>,

        /// Attach at this prompt of the target block
        #[arg(long)]
        target_prompt: Option<String>,

        /// Edge id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Remove a connection
    Disconnect {
        /// Edge id
        edge_id: String,
    },

    /// Prompts inside a block
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },

    /// Record an external timer start/stop on a block
    Timer {
        #[command(subcommand)]
        command: TimerCommands,
    },

    /// Local backup versions
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Numbered save slots
    Slot {
        #[command(subcommand)]
        command: SlotCommands,
    },

    /// Show the audit trail, grouped by day
    Events {
        /// Only these event types (repeatable or comma-separated)
        #[arg(long = "type", value_delimiter = ',')]
        types: Vec<String>,

        /// all, today, yesterday, last7days, last30days or YYYY-MM-DD..YYYY-MM-DD
        #[arg(long, default_value = "all")]
        range: String,

        /// Maximum number of events
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Collaborator access (owner only)
    Share {
        #[command(subcommand)]
        command: ShareCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Canvas subcommands
#[derive(Subcommand, Debug)]
pub enum CanvasCommands {
    /// Show the current canvas
    Show,

    /// List canvases you own or that are shared with you
    List,

    /// Create a new, empty canvas
    Create {
        /// Title of the canvas
        #[arg(long)]
        title: Option<String>,
    },

    /// Rename the canvas
    Title {
        /// New title
        title: String,
    },

    /// Export the canvas
    Export {
        /// Write a Markdown outline instead of JSON
        #[arg(long)]
        outline: bool,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },

    /// Replace the canvas with an exported JSON file
    Import {
        /// Path to the exported JSON
        file: std::path::PathBuf,

        /// Confirm replacing the whole canvas
        #[arg(long)]
        yes: bool,
    },
}

/// Node subcommands
#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Add a block
    Add {
        /// Block kind: task or goal
        #[arg(short, long, default_value = "task")]
        kind: String,

        /// Block title
        #[arg(short, long)]
        title: Option<String>,

        /// X coordinate
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        x: f64,

        /// Y coordinate
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        y: f64,

        /// Block id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Rename a block
    Rename {
        /// Block id
        id: String,

        /// New title
        title: String,
    },

    /// Delete a block and its connections
    Delete {
        /// Block id
        id: String,
    },

    /// Move a block to a position
    Move {
        /// Block id
        id: String,

        /// New X coordinate
        #[arg(allow_negative_numbers = true)]
        x: f64,

        /// New Y coordinate
        #[arg(allow_negative_numbers = true)]
        y: f64,

        /// Move every block reachable from this one by the same delta
        #[arg(long)]
        cascade: bool,
    },
}

/// Prompt subcommands
#[derive(Subcommand, Debug)]
pub enum PromptCommands {
    /// Add a prompt to a block
    Add {
        /// Block id
        node: String,

        /// Prompt text
        content: String,
    },

    /// Change a prompt's text
    Edit {
        /// Block id
        node: String,

        /// Prompt id
        prompt: String,

        /// New text
        content: String,
    },

    /// Mark a prompt completed
    Done {
        /// Block id
        node: String,

        /// Prompt id
        prompt: String,
    },

    /// Mark a prompt not completed
    Undone {
        /// Block id
        node: String,

        /// Prompt id
        prompt: String,
    },

    /// Delete a prompt and connections attached to it
    Delete {
        /// Block id
        node: String,

        /// Prompt id
        prompt: String,
    },
}

/// Timer subcommands
#[derive(Subcommand, Debug)]
pub enum TimerCommands {
    /// Record that a timer started on a block
    Start {
        /// Block id
        node: String,
    },

    /// Record that a timer stopped on a block
    Stop {
        /// Block id
        node: String,
    },
}

/// Backup subcommands
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// List backup versions, newest first
    List,

    /// Make a backup version the current canvas (saved as a new version)
    Restore {
        /// Version number
        version: u64,
    },
}

/// Slot subcommands
#[derive(Subcommand, Debug)]
pub enum SlotCommands {
    /// Save the current canvas to a slot, overwriting it
    Save {
        /// Slot number
        slot: u32,

        /// Label for the slot
        #[arg(long)]
        name: Option<String>,
    },

    /// Replace the canvas with a slot's contents
    Load {
        /// Slot number
        slot: u32,
    },

    /// List occupied slots
    List,

    /// Clear a slot
    Delete {
        /// Slot number
        slot: u32,
    },
}

/// Share subcommands
#[derive(Subcommand, Debug)]
pub enum ShareCommands {
    /// List collaborators
    List,

    /// Grant or change access
    Add {
        /// Collaborator email
        #[arg(id = "collaborator_email", value_name = "EMAIL")]
        email: String,

        /// Access level: view or edit
        #[arg(short, long, default_value = "view")]
        level: String,
    },

    /// Revoke access
    Remove {
        /// Collaborator email
        #[arg(id = "collaborator_email", value_name = "EMAIL")]
        email: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each came from
    Show,
}
