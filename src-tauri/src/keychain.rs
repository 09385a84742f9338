use keyring::Entry;
use log::{debug, error, info};
use secrecy::{ExposeSecret, SecretString};

const SERVICE: &str = "murmur.speech";
const ACCOUNT: &str = "azure_speech_key";

/// Environment fallback used when nothing is stored in the keychain
pub const SPEECH_KEY_ENV: &str = "AZURE_SPEECH_KEY";
pub const SPEECH_REGION_ENV: &str = "AZURE_SPEECH_REGION";

pub fn save_speech_key(key: &SecretString) -> Result<(), keyring::Error> {
    let entry = Entry::new(SERVICE, ACCOUNT)?;

    match entry.set_password(key.expose_secret()) {
        Ok(()) => {
            info!("Speech key saved to keychain");
            Ok(())
        }
        Err(e) => {
            error!("Failed to save speech key: {:?}", e);
            Err(e)
        }
    }
}

pub fn load_speech_key() -> Result<Option<SecretString>, keyring::Error> {
    debug!("Loading speech key (service '{}', account '{}')", SERVICE, ACCOUNT);

    let entry = Entry::new(SERVICE, ACCOUNT)?;

    match entry.get_password() {
        Ok(password) => Ok(Some(SecretString::from(password))),
        Err(keyring::Error::NoEntry) => {
            debug!("No speech key found in keychain");
            Ok(None)
        }
        Err(e) => {
            error!("Error loading speech key: {:?}", e);
            Err(e)
        }
    }
}

pub fn delete_speech_key() -> Result<(), keyring::Error> {
    let entry = Entry::new(SERVICE, ACCOUNT)?;

    match entry.delete_credential() {
        Ok(()) => {
            info!("Speech key deleted");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            debug!("No speech key to delete (not found)");
            Ok(())
        }
        Err(e) => {
            error!("Error deleting speech key: {:?}", e);
            Err(e)
        }
    }
}

/// Keychain first, then `AZURE_SPEECH_KEY` (which dotenvy may have loaded from `.env`)
pub fn resolve_speech_key() -> Option<SecretString> {
    let stored = load_speech_key().ok().flatten();
    stored.or_else(|| key_from_env(std::env::var(SPEECH_KEY_ENV).ok()))
}

fn key_from_env(value: Option<String>) -> Option<SecretString> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}
