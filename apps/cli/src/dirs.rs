use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = "command-center";

/// `$XDG_CONFIG_HOME/command-center`, falling back to `~/.config/command-center`.
pub fn config_dir() -> PathBuf {
    if let Some(base) = std::env::var_os("XDG_CONFIG_HOME").filter(|value| !value.is_empty()) {
        return PathBuf::from(base).join(CONFIG_DIR_NAME);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join(CONFIG_DIR_NAME)
}
