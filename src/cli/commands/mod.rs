use clap::{Parser, Subcommand};

mod subcommands;

pub use subcommands::VerifyCommands;

/// `TeamUp` - skill verification for hackathon team formation.
#[derive(Parser, Debug)]
#[command(name = "teamup")]
#[command(version)]
#[command(about = "Verify declared skills against GitHub activity and certificates.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a verification attempt for a user
    Verify {
        #[command(subcommand)]
        verify_command: VerifyCommands,
    },

    /// Show the active verification record of a user
    Status {
        /// User id
        #[arg(short, long)]
        user: String,
    },

    /// List every verification record of a user, newest first
    History {
        /// User id
        #[arg(short, long)]
        user: String,
    },

    /// Invalidate the active verification of a user
    Invalidate {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Reason (manual, profile_edited, expired, superseded)
        #[arg(long, default_value = "manual")]
        reason: String,
    },

    /// Apply a profile edit; invalidates the verification if skills drifted
    EditSkills {
        /// User id
        #[arg(short, long)]
        user: String,

        /// New declared skills, e.g. "Python:pro, React, Docker"
        #[arg(short, long)]
        skills: String,
    },

    /// Expire the active verification if it is older than the configured max age
    Expire {
        /// User id
        #[arg(short, long)]
        user: String,
    },

    /// Follow record changes for a user, sweeping stale records periodically
    Watch {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Seconds between expiry sweeps
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
}
