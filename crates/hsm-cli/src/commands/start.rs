use anyhow::{Context, Result};
use hsm::client::HttpTokenClient;
use hsm::session::{SessionCache, SessionStore};
use tokio::process::Command;
use tracing::{info, warn};

use super::open_cache;
use crate::cli::StartArgs;

const JAVA: &str = "java";
const SERVER_JAR: &str = "Server/HytaleServer.jar";
const ASSETS: &str = "Assets.zip";

/// Arguments for `java`: JVM args, then `-jar` unless the JVM args already
/// name a jar, then `--assets` unless the server args already set it, then
/// the server args.
pub fn java_command_args(java_args: &[String], server_args: &[String]) -> Vec<String> {
    let mut args = java_args.to_vec();
    if !has_flag(java_args, "-jar") {
        args.extend(["-jar".to_string(), SERVER_JAR.to_string()]);
    }
    if !has_flag(server_args, "--assets") {
        args.extend(["--assets".to_string(), ASSETS.to_string()]);
    }
    args.extend_from_slice(server_args);
    args
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

pub async fn run(store: SessionStore, args: &StartArgs) -> Result<()> {
    let cache = open_cache(store).await?;
    let result = launch(&cache, args).await;
    cache.shutdown().await;
    result
}

async fn launch(cache: &SessionCache<HttpTokenClient>, args: &StartArgs) -> Result<()> {
    let session = cache
        .create_game_session()
        .await
        .context("Failed to create game session")?;
    info!(expires_at = %session.expires_at, "game session created");

    let java_args = java_command_args(&args.additional_java_args, &args.additional_args);
    info!(command = %format!("{JAVA} {}", java_args.join(" ")), "starting server");

    // Ctrl-C reaches the child through the shared process group.
    let status = Command::new(JAVA)
        .args(&java_args)
        .envs(session.env_vars())
        .status()
        .await;

    match &status {
        Ok(status) if status.success() => info!("server exited"),
        Ok(status) => warn!(%status, "server exited with error"),
        Err(e) => warn!(error = %e, "failed to start server"),
    }

    match cache.delete_game_session(&session.session_token).await {
        Ok(()) => info!("game session terminated"),
        Err(e) => warn!(error = %e, "failed to terminate game session"),
    }

    status.with_context(|| format!("Failed to start {JAVA}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_java_command_args_defaults() {
        assert_eq!(
            java_command_args(&[], &[]),
            strings(&["-jar", "Server/HytaleServer.jar", "--assets", "Assets.zip"])
        );
    }

    #[test]
    fn test_java_command_args_jvm_args_come_first() {
        let args = java_command_args(
            &strings(&["-Xmx4G", "-XX:+UseG1GC"]),
            &strings(&["--bind", "0.0.0.0:5520"]),
        );
        assert_eq!(
            args,
            strings(&[
                "-Xmx4G",
                "-XX:+UseG1GC",
                "-jar",
                "Server/HytaleServer.jar",
                "--assets",
                "Assets.zip",
                "--bind",
                "0.0.0.0:5520",
            ])
        );
    }

    #[test]
    fn test_java_command_args_custom_jar() {
        let args = java_command_args(&strings(&["-jar", "Custom.jar"]), &[]);
        assert_eq!(args, strings(&["-jar", "Custom.jar", "--assets", "Assets.zip"]));
    }

    #[test]
    fn test_java_command_args_custom_assets() {
        let args = java_command_args(&[], &strings(&["--assets", "Custom.zip"]));
        assert_eq!(
            args,
            strings(&["-jar", "Server/HytaleServer.jar", "--assets", "Custom.zip"])
        );
    }

    #[test]
    fn test_has_flag_matches_whole_argument() {
        assert!(has_flag(&strings(&["-jar"]), "-jar"));
        assert!(!has_flag(&strings(&["-jarfile"]), "-jar"));
        assert!(!has_flag(&strings(&["--assets=Custom.zip"]), "--assets"));
    }
}
