//! Where to look for an existing installation to copy files from.

use std::path::{Path, PathBuf};

use conform_sync::DonorLocator;

/// Folder name of the installation under a Steam library.
pub const STEAM_APP_DIR: &str = "Limbus Company";

/// Explicit root if configured, otherwise the conventional Steam location
/// for this platform. Only an existing directory is returned.
#[derive(Debug, Clone)]
pub struct PlatformDonor {
    explicit: Option<PathBuf>,
}

impl PlatformDonor {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }
}

impl DonorLocator for PlatformDonor {
    fn resolve_donor_root(&self) -> Option<PathBuf> {
        let candidate = match &self.explicit {
            Some(path) => path.clone(),
            None => default_steam_root()?,
        };
        if candidate.is_dir() {
            Some(candidate)
        } else {
            tracing::debug!(path = %candidate.display(), "no donor installation");
            None
        }
    }
}

/// Registry key Steam records its install directory under.
#[cfg(windows)]
const STEAM_REGISTRY_KEY: &str = r"SOFTWARE\WOW6432Node\Valve\Steam";

/// The installation folder inside a Steam root.
fn steam_app_dir(steam_root: &Path) -> PathBuf {
    steam_root.join("steamapps").join("common").join(STEAM_APP_DIR)
}

/// Steam's registered install path, else the stock install location.
#[cfg(windows)]
fn default_steam_root() -> Option<PathBuf> {
    if let Some(registered) = registry_steam_root().map(|root| steam_app_dir(&root)) {
        if registered.is_dir() {
            return Some(registered);
        }
        tracing::debug!(path = %registered.display(), "registered Steam library has no installation");
    }
    let stock: PathBuf = ["C:\\", "Program Files (x86)", "Steam"].iter().collect();
    Some(steam_app_dir(&stock))
}

#[cfg(windows)]
fn registry_steam_root() -> Option<PathBuf> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    let key = RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey(STEAM_REGISTRY_KEY)
        .ok()?;
    let install: String = key.get_value("InstallPath").ok()?;
    Some(PathBuf::from(install))
}

/// The Steam library inside the default CrossOver bottle.
#[cfg(not(windows))]
fn default_steam_root() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let steam = home
        .join("Library/Application Support/CrossOver/Bottles/Steam/drive_c")
        .join("Program Files (x86)/Steam");
    Some(steam_app_dir(&steam))
}
