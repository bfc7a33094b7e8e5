use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::term;

pub const DEFAULT_SERVER_URL: &str = "http://vega.ii.uam.es:8080/api";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Base URL of the directory and file exchange server
    pub server_url: Option<String>,
}

pub fn get_server_url(cfg: &Config) -> String {
    cfg.server_url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

const DEFAULT_CONFIG: &str = r#"
# Base URL of the directory and file exchange server
# (default: http://vega.ii.uam.es:8080/api)
#server_url = ""
"#;

// ---

/// Local state of one identity: its key, token, config and working
/// directories, all under a single root (`~/.seal` unless overridden).
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn default_root() -> Result<PathBuf, Box<dyn Error>> {
        let mut path = dirs::home_dir().ok_or("could not determine home directory")?;
        path.push(".seal");
        Ok(path)
    }

    pub fn create_dir_if_missing(&self) -> std::io::Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("seal.toml")
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.root.join("privateKey.pem")
    }

    pub fn token_path(&self) -> PathBuf {
        self.root.join("token.txt")
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.root.join("debug.log")
    }

    /// Detached signatures waiting for their file to be encrypted
    pub fn signed_dir(&self) -> PathBuf {
        self.root.join("signed_files")
    }

    /// Envelopes produced by `encrypt`
    pub fn encrypted_dir(&self) -> PathBuf {
        self.root.join("encrypted_files")
    }

    /// Verified plaintexts of downloaded envelopes
    pub fn downloaded_dir(&self) -> PathBuf {
        self.root.join("downloaded_files")
    }
}

// ---

pub fn read_config_as_string(
    workspace: &Workspace,
    config_path_override: &Option<String>,
) -> Result<String, Box<dyn Error>> {
    let config_path = match config_path_override {
        Some(config_path) => PathBuf::from(config_path),
        None => {
            let path = workspace.config_path();
            if !path.exists() {
                write_config(&path, DEFAULT_CONFIG);
            }
            path
        }
    };
    Ok(fs::read_to_string(&config_path)?)
}

pub fn get_config(
    workspace: &Workspace,
    config_path_override: &Option<String>,
) -> Result<Config, Box<dyn Error>> {
    let config: Config = toml::from_str(&read_config_as_string(workspace, config_path_override)?)?;
    Ok(config)
}

pub fn write_config(path: &Path, cfg: &str) {
    if let Err(e) = fs::write(path, cfg) {
        eprintln!("Failed to write to config file: {}", e);
    }
}

// ---

/// Reads the account token, asking for it (and saving it) the first time.
pub fn get_token(workspace: &Workspace) -> Result<String, Box<dyn Error>> {
    let path = workspace.token_path();
    if path.exists() {
        let token = fs::read_to_string(&path)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let token = term::ask_secret("Enter your token:")?.trim().to_string();
    if token.is_empty() {
        return Err("a token is required to talk to the server".into());
    }
    save_token(workspace, &token)?;
    Ok(token)
}

/// Stores the token readable by its owner only.
pub fn save_token(workspace: &Workspace, token: &str) -> std::io::Result<()> {
    let path = workspace.token_path();
    fs::write(&path, token)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
