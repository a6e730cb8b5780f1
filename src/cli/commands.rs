//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - resolve: detect the site for a coordinate
//! - sites / location: registry administration and the active location
//! - frequent: saved visitors for check-in prefill
//! - check-in / check-out / open / stats / log: visit operations
//! - auto-checkout / daemon: the daily bulk checkout

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use visitrack::domain::{Category, Purpose};
use visitrack::visits::LogSort;

/// Visitrack - visitor check-in with geofenced site detection and daily auto-checkout
#[derive(Parser, Debug)]
#[command(name = "visitrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// A position fix given on the command line
#[derive(Args, Debug, Clone)]
pub struct FixArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Reported accuracy in meters
    #[arg(long, default_value_t = 20.0)]
    pub accuracy: f64,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the registered site containing a position
    Resolve {
        #[command(flatten)]
        fix: FixArgs,
    },

    /// Site registry administration
    Sites {
        #[command(subcommand)]
        command: SitesCommands,
    },

    /// Active location management
    Location {
        #[command(subcommand)]
        command: LocationCommands,
    },

    /// Saved frequent visitors
    Frequent {
        #[command(subcommand)]
        command: FrequentCommands,
    },

    /// Check a visitor in at the active location
    CheckIn {
        /// Prefill from a saved frequent visitor; explicit flags still win
        #[arg(long)]
        frequent: Option<String>,

        /// Visitor first name
        #[arg(long, required_unless_present = "frequent")]
        first_name: Option<String>,

        /// Visitor last name
        #[arg(long, required_unless_present = "frequent")]
        last_name: Option<String>,

        /// Company (required at factory sites)
        #[arg(long)]
        company: Option<String>,

        /// Phone number (required at factory sites)
        #[arg(long)]
        phone: Option<String>,

        /// Visit purpose (meeting, delivery, maintenance, inspection, other)
        #[arg(short, long, default_value = "other")]
        purpose: Purpose,
    },

    /// Check out one visit, or every open visit of a category
    CheckOut {
        /// Visit ID to check out
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Check out every open visit
        #[arg(long)]
        all: bool,

        /// Category for --all (defaults to the active location's category)
        #[arg(long, requires = "all")]
        category: Option<Category>,
    },

    /// List open visits
    Open {
        /// Category (defaults to the active location's category)
        #[arg(long)]
        category: Option<Category>,
    },

    /// Open-visit counts per category
    Stats,

    /// Search the visit log
    Log {
        /// Filter by category
        #[arg(long)]
        category: Option<Category>,

        /// Visitor name substring
        #[arg(long)]
        visitor: Option<String>,

        /// Location name substring
        #[arg(long)]
        location: Option<String>,

        /// Filter by purpose
        #[arg(long)]
        purpose: Option<Purpose>,

        /// First check-in date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<chrono::NaiveDate>,

        /// Last check-in date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<chrono::NaiveDate>,

        /// Sort order (newest, oldest, name, location)
        #[arg(short, long, default_value = "newest")]
        sort: LogSort,
    },

    /// Daily auto-checkout
    AutoCheckout {
        #[command(subcommand)]
        command: AutoCheckoutCommands,
    },

    /// Run the auto-checkout scheduler in the foreground until Ctrl-C
    Daemon,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SitesCommands {
    /// List registered sites
    List,

    /// Register a site
    Add {
        /// Site name
        name: String,

        /// Site category (dormitory, factory)
        #[arg(long)]
        category: Category,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Geofence radius in kilometers
        #[arg(long)]
        radius: f64,
    },

    /// Edit a site; omitted fields keep their value
    Edit {
        /// Site ID
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        category: Option<Category>,

        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Geofence radius in kilometers
        #[arg(long)]
        radius: Option<f64>,
    },

    /// Remove a site
    Remove {
        /// Site ID
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum FrequentCommands {
    /// List saved visitors, newest first
    List,

    /// Save a visitor
    Add {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// Remove a saved visitor
    Remove {
        /// Frequent visitor ID
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LocationCommands {
    /// Show the active location and the location-change toggle
    Show,

    /// Select a registered site as the active location
    Select {
        /// Site ID
        id: String,
    },

    /// Detect the location from a position fix
    Refresh {
        #[command(flatten)]
        fix: FixArgs,
    },

    /// Enable or disable automatic location change
    ToggleChange,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AutoCheckoutCommands {
    /// Run the bulk checkout now
    Run,

    /// Show the auto-checkout settings
    Status,
}
