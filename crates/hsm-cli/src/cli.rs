use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "hsm")]
#[command(about = "hsm: game-session credentials for dedicated servers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Where the OAuth session is stored (default ~/.config/hsm/session.json)
    #[arg(long, global = true, env = "HSM_SESSION_LOCATION")]
    pub session_location: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authenticate this machine with the device flow
    Login(LoginArgs),
    /// Serve the session API
    Serve(ServeArgs),
    /// Launch a game server with a fresh game session
    Start(StartArgs),
    /// Print the signed download URL of a server release
    DownloadUrl(DownloadUrlArgs),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Print the session as JSON instead of saving it
    #[arg(long)]
    pub stdout: bool,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "HSM_PORT", default_value_t = 8080)]
    pub port: u16,

    /// JWKS endpoint; enables multi-tenant mode
    #[arg(long, env = "HSM_JWKS_ENDPOINT")]
    pub jwks_endpoint: Option<Url>,

    /// PEM bundle trusted when fetching the JWKS
    #[arg(long, env = "HSM_JWKS_CA_CERT", requires = "jwks_endpoint")]
    pub jwks_ca_cert: Option<PathBuf>,

    /// File holding a bearer token sent when fetching the JWKS
    #[arg(long, env = "HSM_JWKS_JWT_TOKEN_FILE", requires = "jwks_endpoint")]
    pub jwks_jwt_token_file: Option<PathBuf>,

    /// Path served without authentication (repeatable)
    #[arg(long = "public-path", value_name = "PATH")]
    pub public_paths: Vec<String>,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Extra JVM argument, placed before `-jar` (repeatable)
    #[arg(long, value_name = "ARG", allow_hyphen_values = true)]
    pub additional_java_args: Vec<String>,

    /// Extra server argument (repeatable)
    #[arg(long, value_name = "ARG", allow_hyphen_values = true)]
    pub additional_args: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DownloadUrlArgs {
    /// Release channel
    #[arg(long, default_value = hsm::PATCHLINE_RELEASE)]
    pub patchline: String,
}
