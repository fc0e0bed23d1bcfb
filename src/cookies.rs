//! Cookie persistence for institutional proxy access.
//!
//! Cookies exported from a logged-in browser session (JSON array, Playwright
//! / browser-extension format) are stored in a file and attached to download
//! requests for matching hosts.

use crate::error::{HarvestError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

/// Default cookie file path: `~/.litharvest_cookies.json`
fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".litharvest_cookies.json"))
        .ok_or_else(|| HarvestError::Config("Cannot determine home directory".to_string()))
}

/// Cookie entry matching Playwright's cookie format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, alias = "httpOnly")]
    pub http_only: bool,
    /// Unix timestamp in seconds; `None` or negative for session cookies
    #[serde(default, alias = "expirationDate")]
    pub expires: Option<f64>,
}

impl Cookie {
    fn is_expired(&self, now: f64) -> bool {
        matches!(self.expires, Some(t) if t > 0.0 && t < now)
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let domain = self.domain.to_lowercase();
        let bare = domain.trim_start_matches('.');

        let domain_ok = host == bare || host.ends_with(&format!(".{}", bare));
        let path_ok = self.path.is_empty() || url.path().starts_with(&self.path);
        let scheme_ok = !self.secure || url.scheme() == "https";

        domain_ok && path_ok && scheme_ok
    }
}

/// Build a `Cookie` header value for `url` from the cookies that apply to it.
///
/// Returns an empty string when nothing matches.
pub fn cookie_header_for(cookies: &[Cookie], url: &str) -> String {
    let Ok(url) = Url::parse(url) else {
        return String::new();
    };
    let now = Utc::now().timestamp() as f64;

    cookies
        .iter()
        .filter(|c| !c.is_expired(now))
        .filter(|c| c.matches(&url))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cookie manager for loading and saving cookies
pub struct CookieManager {
    path: PathBuf,
}

impl CookieManager {
    /// Create a new CookieManager with default path
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    /// Create a new CookieManager with custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the cookie file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load cookies from file
    ///
    /// Returns empty vec if file doesn't exist or is invalid
    pub fn load(&self) -> Vec<Cookie> {
        if !self.path.exists() {
            debug!("Cookie file not found: {:?}", self.path);
            return Vec::new();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Vec<Cookie>>(&content) {
                Ok(cookies) => {
                    info!("Loaded {} cookies from {:?}", cookies.len(), self.path);
                    cookies
                }
                Err(e) => {
                    warn!("Failed to parse cookies: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to read cookie file: {}", e);
                Vec::new()
            }
        }
    }

    /// Save cookies to file
    pub fn save(&self, cookies: &[Cookie]) -> Result<()> {
        let content = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&self.path, content)?;
        info!("Saved {} cookies to {:?}", cookies.len(), self.path);
        Ok(())
    }

    /// Validate exported cookie JSON and save it.
    pub fn import(&self, json: &str) -> Result<usize> {
        let cookies: Vec<Cookie> = serde_json::from_str(json.trim())?;
        if cookies.is_empty() {
            return Err(HarvestError::Validation("Cookie list is empty".to_string()));
        }
        if let Some(bad) = cookies.iter().find(|c| c.name.is_empty() || c.domain.is_empty()) {
            return Err(HarvestError::Validation(format!(
                "Cookie without name or domain: {:?}",
                bad.name
            )));
        }
        self.save(&cookies)?;
        Ok(cookies.len())
    }

    /// Clear stored cookies
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Cleared cookies at {:?}", self.path);
        }
        Ok(())
    }
}

impl Default for CookieManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            path: PathBuf::from(".litharvest_cookies.json"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn cookie(name: &str, domain: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    #[test]
    fn test_load_empty() {
        let manager = CookieManager::with_path(PathBuf::from("/nonexistent/path"));
        assert!(manager.load().is_empty());
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let manager = CookieManager::with_path(temp.path().to_path_buf());

        manager.save(&[cookie("ezproxy", ".library.example.edu")])?;
        let loaded = manager.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "ezproxy");
        Ok(())
    }

    #[test]
    fn test_import_browser_export() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let manager = CookieManager::with_path(temp.path().to_path_buf());

        let json = r#"[{"name": "sid", "value": "abc", "domain": ".example.edu",
                        "httpOnly": true, "expirationDate": 4102444800}]"#;
        assert_eq!(manager.import(json)?, 1);
        assert!(manager.load()[0].http_only);

        assert!(manager.import("[]").is_err());
        assert!(manager.import(r#"[{"name": "", "value": "x", "domain": "a.b"}]"#).is_err());
        Ok(())
    }

    #[test]
    fn test_cookie_header_matches_host() {
        let mut secure = cookie("secure", "proxy.example.edu");
        secure.secure = true;
        let mut expired = cookie("old", ".example.edu");
        expired.expires = Some(1.0);
        let cookies = vec![
            cookie("a", ".example.edu"),
            cookie("b", "other.org"),
            secure,
            expired,
        ];

        assert_eq!(
            cookie_header_for(&cookies, "https://proxy.example.edu/login?url=x"),
            "a=v; secure=v"
        );
        assert_eq!(cookie_header_for(&cookies, "http://proxy.example.edu/"), "a=v");
        assert_eq!(cookie_header_for(&cookies, "https://notexample.edu/"), "");
        assert_eq!(cookie_header_for(&cookies, "not a url"), "");
    }
}
