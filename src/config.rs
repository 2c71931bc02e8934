// ABOUTME: Immutable configuration snapshot built from INI defaults merged with CLI overrides
// ABOUTME: INI is read first; any command-line flag that was actually given takes precedence

use ini::Ini;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Ini {
        path: String,
        #[source]
        source: ini::Error,
    },

    #[error("given client port is not a number: {0:?}")]
    BadPort(String),

    #[error("could not parse host/port/path arguments")]
    BadPositional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub bufsize: usize,
    pub timeout: u64,
    pub retry: u32,
    pub retrysec: f64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            host: "localhost".to_string(),
            port: 8888,
            path: "/".to_string(),
            bufsize: 16,
            timeout: 30,
            retry: 5,
            retrysec: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub bindings: String,
    pub client_max: usize,
    pub timeout: u64,
    pub countdown: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            bindings: ":8080".to_string(),
            client_max: 100,
            timeout: 180,
            countdown: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingOptions {
    pub quiet: bool,
    pub verbose: bool,
    pub logdir: Option<String>,
    pub logfile: Option<String>,
}

/// Immutable configuration snapshot. Built once at startup and passed by
/// reference from then on (replaces the original's global mutable constants).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub client: ClientOptions,
    pub server: ServerOptions,
    pub logging: LoggingOptions,
}

impl Options {
    /// Starts from built-in defaults, optionally overlaid by an INI file,
    /// with `host`/`port`/`path` set directly from parsed CLI positionals.
    /// Unknown INI sections/keys are accepted and ignored (passed through
    /// conceptually; nothing downstream consumes them).
    pub fn load(ini_path: Option<&Path>) -> Result<Options, ConfigError> {
        let mut options = Options::default();
        if let Some(path) = ini_path {
            let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Ini {
                path: path.display().to_string(),
                source,
            })?;
            apply_ini(&mut options, &ini);
        }
        Ok(options)
    }
}

fn apply_ini(options: &mut Options, ini: &Ini) {
    if let Some(section) = ini.section(Some("client")) {
        if let Some(v) = section.get("host") {
            options.client.host = v.to_string();
        }
        if let Some(v) = section.get("port").and_then(|v| v.parse().ok()) {
            options.client.port = v;
        }
        if let Some(v) = section.get("path") {
            options.client.path = v.to_string();
        }
        if let Some(v) = section.get("bufsize").and_then(|v| v.parse().ok()) {
            options.client.bufsize = v;
        }
        if let Some(v) = section.get("timeout").and_then(|v| v.parse().ok()) {
            options.client.timeout = v;
        }
        if let Some(v) = section.get("retry").and_then(|v| v.parse().ok()) {
            options.client.retry = v;
        }
        if let Some(v) = section.get("retrysec").and_then(|v| v.parse().ok()) {
            options.client.retrysec = v;
        }
    }
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("bindings") {
            options.server.bindings = v.to_string();
        }
        if let Some(v) = section.get("client_max").and_then(|v| v.parse().ok()) {
            options.server.client_max = v;
        }
        if let Some(v) = section.get("timeout").and_then(|v| v.parse().ok()) {
            options.server.timeout = v;
        }
        if let Some(v) = section.get("countdown").and_then(|v| v.parse().ok()) {
            options.server.countdown = v;
        }
    }
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("logdir") {
            options.logging.logdir = Some(v.to_string());
        }
        if let Some(v) = section.get("logfile") {
            options.logging.logfile = Some(v.to_string());
        }
    }
}

/// Parses the reflector's positional arguments: `host port [path]`,
/// `host:port[path]`, or a `scheme://host[:port][/path]` URL.
///
/// The port is `None` when the token gave no port at all (a bare host, or a
/// URL with no `:port`); callers should leave the configured default in
/// place rather than overwrite it with a guessed value.
pub fn parse_positional(args: &[String]) -> Result<(String, Option<u16>, String), ConfigError> {
    match args {
        [one] => parse_single_token(one),
        [host, port] => Ok((host.clone(), Some(parse_port(port)?), "/".to_string())),
        [host, port, path] => Ok((host.clone(), Some(parse_port(port)?), path.clone())),
        _ => Err(ConfigError::BadPositional),
    }
}

fn parse_single_token(token: &str) -> Result<(String, Option<u16>, String), ConfigError> {
    let without_scheme = token.split("://").last().unwrap_or(token);
    let (authority, path) = match without_scheme.find('/') {
        Some(idx) => (&without_scheme[..idx], without_scheme[idx..].to_string()),
        None => (without_scheme, "/".to_string()),
    };
    match authority.split_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?), path)),
        None => Ok((authority.to_string(), None, path)),
    }
}

fn parse_port(token: &str) -> Result<u16, ConfigError> {
    token.parse().map_err(|_| ConfigError::BadPort(token.to_string()))
}

/// Parses a server `bindings` string into `(host, port)`.
///
/// Accepts `":8080"`, `"8080"`, `"0.0.0.0:8080"`, or a plain integer; any
/// other shape falls back to `("", 8080)` rather than failing startup.
pub fn parse_bindings(bindings: &str) -> (String, u16) {
    if let Ok(port) = bindings.parse::<u16>() {
        return (String::new(), port);
    }
    if let Some(port_str) = bindings.strip_prefix(':') {
        if let Ok(port) = port_str.parse() {
            return (String::new(), port);
        }
    }
    if let Some((host, port_str)) = bindings.rsplit_once(':') {
        if let Ok(port) = port_str.parse() {
            return (host.to_string(), port);
        }
    }
    (String::new(), 8080)
}
