use clap::Subcommand;
use std::path::PathBuf;

/// Evidence paths for `verify`
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum VerifyCommands {
    /// Verify against public GitHub repositories (OAuth token required)
    Github {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Claimed GitHub profile URL
        #[arg(long)]
        profile_url: String,

        /// Read the OAuth access token from the first line of stdin instead of
        /// github.token / TEAMUP_GITHUB_TOKEN
        #[arg(long)]
        token_stdin: bool,

        /// Declared skills, e.g. "Python:pro, React, Docker"
        #[arg(short, long)]
        skills: String,
    },
    /// Verify against uploaded certificate images
    Certificate {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Full name on the profile
        #[arg(long)]
        name: String,

        /// Declared skills, e.g. "React, Figma"
        #[arg(short, long)]
        skills: String,

        /// Certificate files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
