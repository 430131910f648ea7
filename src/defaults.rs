//! Default values and the per-OS config path resolution, following the teacher's
//! `directories::ProjectDirs`-based convention in `src/defaults.rs`.

use std::path::PathBuf;

use directories::ProjectDirs;

const ORGANIZATION: &str = "";
const APPLICATION: &str = "relaylink";

const CONFIG_FILE: &str = "relaylink.toml";

pub const fn port() -> u16 {
    4470
}

pub const fn max_message_length() -> usize {
    1024 * 16
}

fn project_dirs() -> Result<ProjectDirs, anyhow::Error> {
    ProjectDirs::from("", ORGANIZATION, APPLICATION)
        .ok_or_else(|| anyhow::anyhow!("could not determine the user's home directory"))
}

/// The default config file path: `<per-OS config dir>/relaylink.toml`.
pub fn config_path() -> Result<PathBuf, anyhow::Error> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}
