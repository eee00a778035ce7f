//! Credential secret lifecycle.
//!
//! The signing secret lives in the settings store. Production deployments
//! regenerate it on every startup; development deployments keep the stored
//! secret so credentials survive restarts.

use rand::RngCore;

use crate::config::Environment;
use crate::store::SettingStore;

pub const SECRET_SETTING_KEY: &str = "credential_secret";

const SECRET_BYTES: usize = 64;

/// Resolve the signing secret for this process.
pub fn init_secret(store: &SettingStore, environment: Environment) -> std::io::Result<String> {
    if environment.is_production() {
        let secret = generate_secret();
        store.put(SECRET_SETTING_KEY, &secret)?;
        tracing::info!("Credential secret regenerated, outstanding credentials are now invalid");
        return Ok(secret);
    }

    if let Some(secret) = store.get::<String>(SECRET_SETTING_KEY) {
        return Ok(secret);
    }

    let secret = generate_secret();
    store.put(SECRET_SETTING_KEY, &secret)?;
    tracing::info!("Credential secret generated");
    Ok(secret)
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
