use std::{env, fmt, path::Path};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::FilerError;

pub const USERNAME_ENV: &str = "PHYSIONET_USERNAME";
pub const PASSWORD_ENV: &str = "PHYSIONET_PASSWORD";

/// PhysioNet login used by both MIMIC-CXR and ImaGenome.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysioNetCredentials {
    pub username: String,
    pub password: String,
}

impl PhysioNetCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        PhysioNetCredentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads the credentials file (created empty by confy when absent),
    /// then applies the environment overrides.
    pub fn load(path: &Path) -> Result<Self, FilerError> {
        let credentials: PhysioNetCredentials = confy::load_path(path)?;
        info!("Loaded PhysioNet credentials from {}", path.display());
        let credentials = credentials.with_overrides(env::var(USERNAME_ENV).ok(), env::var(PASSWORD_ENV).ok());
        if !credentials.is_complete() {
            warn!(
                "PhysioNet credentials are incomplete; set {} and {} or edit {}",
                USERNAME_ENV,
                PASSWORD_ENV,
                path.display()
            );
        }
        Ok(credentials)
    }

    pub fn with_overrides(mut self, username: Option<String>, password: Option<String>) -> Self {
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            self.username = username;
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.password = password;
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for PhysioNetCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysioNetCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
