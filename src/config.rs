//!
//! gimme configuration
//! --------------------
//! Process-wide settings read once at startup. Environment variables provide the base layer and
//! command-line flags override them. Nothing here is mutated at request time.

use anyhow::{anyhow, Result};
use axum::http::HeaderValue;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_LOGIN_URL: &str = "/login/google";
pub const DEFAULT_IDENTITY_API: &str = "https://www.googleapis.com";
pub const DEFAULT_RESOURCE_MANAGER_API: &str = "https://cloudresourcemanager.googleapis.com/v1/projects";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const USAGE: &str = "gimme\n\nUSAGE:\n  gimme [--http-port N] [--bind ADDR] [--allowed-domains a.com,b.com] [--login-url URL]\n\nOPTIONS:\n  --http-port N            HTTP port (env: GIMME_HTTP_PORT, default 8080)\n  --bind ADDR              Bind address (env: GIMME_BIND_ADDR, default 0.0.0.0)\n  --allowed-domains LIST   Comma-separated sign-on domains allowed to use the tool (env: GIMME_ALLOWED_DOMAINS)\n  --login-url URL          Where unauthenticated users are sent (env: GIMME_LOGIN_URL, default /login/google)\n\nOTHER ENVIRONMENT:\n  GIMME_IDENTITY_API, GIMME_RESOURCE_MANAGER_API, GIMME_SESSION_TTL_SECS,\n  GIMME_HTTP_TIMEOUT_SECS, GIMME_SECURE_COOKIES\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Sign-on domains allowed through the gate. Exact, case-sensitive matches only.
    pub allowed_domains: Vec<String>,
    pub http_port: u16,
    pub bind_addr: String,
    /// Login flow of the external OAuth client.
    pub login_url: String,
    pub identity_api_base: String,
    pub resource_manager_base: String,
    pub session_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            http_port: DEFAULT_HTTP_PORT,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            identity_api_base: DEFAULT_IDENTITY_API.to_string(),
            resource_manager_base: DEFAULT_RESOURCE_MANAGER_API.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            secure_cookies: true,
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return match args.get(i + 1) {
                Some(v) if !v.starts_with("--") => Ok(Some(v.as_str())),
                _ => Err(anyhow!("missing value for {}", flag)),
            };
        }
        i += 1;
    }
    Ok(None)
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| anyhow!("invalid value for {}: {:?}", name, raw))
}

fn trim_base(raw: &str) -> String { raw.trim().trim_end_matches('/').to_string() }

impl Config {
    /// Load from the process environment and command line.
    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        Self::from_sources(|name| std::env::var(name).ok(), args)
    }

    /// Load from an arbitrary variable lookup; CLI arguments override the environment.
    pub fn from_sources<F>(env: F, args: &[String]) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = env("GIMME_ALLOWED_DOMAINS") { cfg.allowed_domains = parse_list(&v); }
        if let Some(v) = env("GIMME_HTTP_PORT") { cfg.http_port = parse_num("GIMME_HTTP_PORT", &v)?; }
        if let Some(v) = env("GIMME_BIND_ADDR") { cfg.bind_addr = v.trim().to_string(); }
        if let Some(v) = env("GIMME_LOGIN_URL") { cfg.login_url = v.trim().to_string(); }
        if let Some(v) = env("GIMME_IDENTITY_API") { cfg.identity_api_base = trim_base(&v); }
        if let Some(v) = env("GIMME_RESOURCE_MANAGER_API") { cfg.resource_manager_base = trim_base(&v); }
        if let Some(v) = env("GIMME_SESSION_TTL_SECS") { cfg.session_ttl_secs = parse_num("GIMME_SESSION_TTL_SECS", &v)?; }
        if let Some(v) = env("GIMME_HTTP_TIMEOUT_SECS") { cfg.http_timeout_secs = parse_num("GIMME_HTTP_TIMEOUT_SECS", &v)?; }
        if let Some(v) = env("GIMME_SECURE_COOKIES") {
            cfg.secure_cookies = parse_bool(&v).ok_or_else(|| anyhow!("invalid value for GIMME_SECURE_COOKIES: {:?}", v))?;
        }

        if let Some(v) = arg_value(args, "--http-port")? { cfg.http_port = parse_num("--http-port", v)?; }
        if let Some(v) = arg_value(args, "--bind")? { cfg.bind_addr = v.to_string(); }
        if let Some(v) = arg_value(args, "--allowed-domains")? { cfg.allowed_domains = parse_list(v); }
        if let Some(v) = arg_value(args, "--login-url")? { cfg.login_url = v.to_string(); }

        if cfg.session_ttl_secs == 0 { return Err(anyhow!("GIMME_SESSION_TTL_SECS must be positive")); }
        // sent verbatim as the Location of login redirects
        if cfg.login_url.is_empty() || HeaderValue::from_str(&cfg.login_url).is_err() {
            return Err(anyhow!("invalid login url: {:?}", cfg.login_url));
        }
        Ok(cfg)
    }
}
