use anyhow::{Context, anyhow};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::app::status::{render_history, render_record};
use crate::cli::commands::{Cli, Commands, VerifyCommands};
use crate::config::Config;
use crate::error::Result;
use crate::profile::{UserProfile, parse_skill_list};
use crate::verify::{
    CertificateAnalyzer, CertificateEvidence, CertificateUpload, EvidenceSource,
    ExtractedTextAnalyzer, FixedSession, GitHubEvidence, GitHubFetcher, HttpCertificateAnalyzer,
    InvalidationReason, ProfileEditOutcome, SqliteVerificationStore, VerificationManager,
};

/// Wire the configured collaborators into a manager acting for `user_id`.
pub async fn build_manager(config: &Config, user_id: &str) -> Result<VerificationManager> {
    let store = SqliteVerificationStore::open(&config.storage.resolved_database_path())
        .await?
        .with_poll_interval(config.storage.poll_interval());
    let fetcher = GitHubFetcher::new(&config.github)?;
    let analyzer: Arc<dyn CertificateAnalyzer> = match &config.certificate.endpoint {
        Some(endpoint) => Arc::new(HttpCertificateAnalyzer::new(
            endpoint.clone(),
            Duration::from_secs(config.certificate.timeout_secs),
        )?),
        None => Arc::new(ExtractedTextAnalyzer),
    };

    Ok(VerificationManager::new(
        Arc::new(store),
        Arc::new(fetcher),
        analyzer,
        Arc::new(FixedSession::signed_in(user_id)),
        config.verification.clone(),
    ))
}

async fn read_uploads(files: &[PathBuf]) -> Result<Vec<CertificateUpload>> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let image = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read certificate {}", path.display()))?;
        let file_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        uploads.push(CertificateUpload { file_name, image });
    }
    Ok(uploads)
}

/// First non-empty line of `reader`, trimmed.
async fn read_token<R: AsyncBufRead + Unpin>(mut reader: R) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read token from stdin")?;
    let token = line.trim();
    if token.is_empty() {
        return Err(anyhow!("No token on stdin").into());
    }
    Ok(token.to_string())
}

async fn github_token(config: &Config, token_stdin: bool) -> Result<String> {
    if token_stdin {
        return read_token(BufReader::new(tokio::io::stdin())).await;
    }
    config.github.token.clone().ok_or_else(|| {
        anyhow!(
            "GitHub verification needs an OAuth token \
             (TEAMUP_GITHUB_TOKEN, github.token or --token-stdin)"
        )
        .into()
    })
}

async fn run_verify(config: &Config, command: VerifyCommands) -> Result<()> {
    let (profile, source) = match command {
        VerifyCommands::Github {
            user,
            profile_url,
            token_stdin,
            skills,
        } => {
            let access_token = github_token(config, token_stdin).await?;
            let profile = UserProfile {
                user_id: user,
                full_name: String::new(),
                skills: parse_skill_list(&skills),
            };
            let source = EvidenceSource::GitHub(GitHubEvidence {
                profile_url,
                access_token,
            });
            (profile, source)
        }
        VerifyCommands::Certificate {
            user,
            name,
            skills,
            files,
        } => {
            let profile = UserProfile {
                user_id: user,
                full_name: name,
                skills: parse_skill_list(&skills),
            };
            let uploads = read_uploads(&files).await?;
            let source =
                EvidenceSource::Certificates(CertificateEvidence::for_profile(&profile, uploads));
            (profile, source)
        }
    };

    let manager = build_manager(config, &profile.user_id).await?;
    let record = manager
        .verify(&profile.user_id, &source, &profile.skills)
        .await?;
    println!("{}", render_record(&record));
    Ok(())
}

async fn run_watch(config: &Config, user: &str, interval_secs: u64) -> Result<()> {
    let manager = build_manager(config, user).await?;
    // Polls the database too, so writes from other `teamup` processes show up.
    let mut subscription = manager.subscribe(user).await?;

    match manager.get_active(user).await? {
        Some(record) => println!("{}", render_record(&record)),
        None => println!("No active verification for {user}."),
    }
    println!("Watching {user} (Ctrl+C to stop)");

    let mut sweep = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sweep.tick() => {
                let expired = manager.expire_stale(user, Utc::now()).await?;
                if expired > 0 {
                    info!(user_id = user, expired, "Expiry sweep invalidated records");
                }
            }
            changed = subscription.recv() => match changed {
                Some(record) => println!("\n{}", render_record(&record)),
                None => break,
            },
        }
    }

    subscription.cancel();
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Arc<Config>) -> Result<()> {
    match cli.command {
        Commands::Verify { verify_command } => run_verify(&config, verify_command).await,

        Commands::Status { user } => {
            let manager = build_manager(&config, &user).await?;
            match manager.get_active(&user).await? {
                Some(record) => println!("{}", render_record(&record)),
                None => println!("No active verification for {user}."),
            }
            Ok(())
        }

        Commands::History { user } => {
            let manager = build_manager(&config, &user).await?;
            println!("{}", render_history(&manager.history(&user).await?));
            Ok(())
        }

        Commands::Invalidate { user, reason } => {
            let reason: InvalidationReason = reason
                .parse()
                .map_err(|_| anyhow!("Unknown invalidation reason: {reason}"))?;
            let manager = build_manager(&config, &user).await?;
            let changed = manager.invalidate(&user, reason).await?;
            println!("Invalidated {changed} record(s) for {user}.");
            Ok(())
        }

        Commands::EditSkills { user, skills } => {
            let manager = build_manager(&config, &user).await?;
            let outcome = manager
                .apply_profile_edit(&user, &parse_skill_list(&skills))
                .await?;
            match outcome {
                ProfileEditOutcome::NoActiveRecord => {
                    println!("No active verification for {user}; nothing to reconcile.");
                }
                ProfileEditOutcome::Unchanged => {
                    println!("Declared skills unchanged; verification stays active.");
                }
                ProfileEditOutcome::Invalidated { record_id } => {
                    println!("Skills changed: verification {record_id} invalidated. Please re-verify.");
                }
            }
            Ok(())
        }

        Commands::Expire { user } => {
            let manager = build_manager(&config, &user).await?;
            let expired = manager.expire_stale(&user, Utc::now()).await?;
            println!("Expired {expired} record(s) for {user}.");
            Ok(())
        }

        Commands::Watch {
            user,
            interval_secs,
        } => run_watch(&config, &user, interval_secs).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::error::{TeamUpError, VerificationError};
    use clap::Parser;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> Config {
        Config {
            storage: StorageConfig {
                database_path: tmp.path().join("verifications.db").display().to_string(),
                ..StorageConfig::default()
            },
            ..Config::default()
        }
    }

    fn verify_github(profile_url: &str) -> Cli {
        Cli::parse_from([
            "teamup",
            "verify",
            "github",
            "--user",
            "u-1",
            "--profile-url",
            profile_url,
            "--skills",
            "Rust",
        ])
    }

    #[tokio::test]
    async fn verification_failures_keep_their_kind() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.github.token = Some("gho_configured".into());

        let err = dispatch(verify_github("https://gitlab.com/octocat"), Arc::new(config))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                TeamUpError::Verification(VerificationError::InvalidProfileUrl { .. })
            ),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn github_verify_without_token_names_the_sources() {
        let tmp = TempDir::new().unwrap();
        let err = dispatch(
            verify_github("https://github.com/octocat"),
            Arc::new(config_in(&tmp)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TeamUpError::Other(_)));
        assert!(err.to_string().contains("TEAMUP_GITHUB_TOKEN"));
    }

    #[tokio::test]
    async fn unknown_invalidation_reason_is_refused() {
        let tmp = TempDir::new().unwrap();
        let cli = Cli::parse_from(["teamup", "invalidate", "--user", "u-1", "--reason", "bored"]);
        let err = dispatch(cli, Arc::new(config_in(&tmp))).await.unwrap_err();
        assert!(err.to_string().contains("bored"));
    }

    #[tokio::test]
    async fn status_of_unknown_user_succeeds() {
        let tmp = TempDir::new().unwrap();
        let cli = Cli::parse_from(["teamup", "status", "--user", "nobody"]);
        dispatch(cli, Arc::new(config_in(&tmp))).await.unwrap();
    }

    #[tokio::test]
    async fn token_is_read_from_the_first_line() {
        let token = read_token(&b"  gho_from_stdin \nignored\n"[..]).await.unwrap();
        assert_eq!(token, "gho_from_stdin");

        let err = read_token(&b"\n"[..]).await.unwrap_err();
        assert!(err.to_string().contains("No token"));
    }
}
