use anyhow::Result;

use crate::adapter::{AdapterRegistry, Credentials};
use crate::config::Config;

/// Prints every configured adapter and whether it can be queried now.
///
/// Credentials are read from the environment first so that
/// authenticated adapters report their real availability.
pub async fn list_sources(config: &Config) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;
    let credentials = Credentials::from_env(config);

    if registry.is_empty() {
        println!("No adapters configured. Add [adapters.dump.<name>] or [adapters.http.<name>] to the config.");
        return Ok(());
    }

    println!("{:<16} {:<6} {:<10} DESCRIPTION", "SOURCE", "TYPE", "AVAILABLE");
    for adapter in registry.adapters() {
        let mut auth_error = None;
        if let Some(secret) = credentials.get(adapter.source_id()) {
            if let Err(e) = adapter.authenticate(secret).await {
                auth_error = Some(e);
            }
        }
        let available = auth_error.is_none() && adapter.is_available().await;
        println!(
            "{:<16} {:<6} {:<10} {}",
            adapter.source_id(),
            adapter.adapter_type(),
            available,
            adapter.description()
        );
        if let Some(e) = auth_error {
            println!("{:<16} {}", "", e);
        }
    }

    Ok(())
}
