use anyhow::{Context, Result};
use hsm::device::DeviceFlow;
use hsm::session::SessionStore;
use tokio_util::sync::CancellationToken;

use super::http_client;
use crate::cli::LoginArgs;

pub async fn run(store: &SessionStore, args: &LoginArgs) -> Result<()> {
    let flow = DeviceFlow::new(http_client()?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    // The prompt goes to stderr so `--stdout` output stays pipeable.
    let session = flow
        .run(&cancel, |authorization| {
            eprintln!("To sign in, visit: {}", authorization.prompt_uri());
            eprintln!("and enter the code: {}", authorization.user_code);
            eprintln!("Waiting for authorization...");
        })
        .await
        .context("Device login failed")?;

    if args.stdout {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    store
        .save(&session)
        .await
        .with_context(|| format!("Failed to save session to {}", store.path().display()))?;
    println!("Session saved to {}", store.path().display());
    Ok(())
}
