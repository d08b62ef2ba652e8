use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use streamproxy_common::{EncodingParams, StreamAction};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    /// Encoding parameters used when a request leaves them out
    #[serde(default)]
    pub defaults: EncodingParams,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Value of the `Server:` response header
    #[serde(default = "default_identity")]
    pub identity: String,

    /// How long a client may take to send its request head
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delivery used when a request does not name one
    #[serde(default)]
    pub default_action: StreamAction,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8002
}
fn default_identity() -> String {
    "Streamproxy".to_string()
}
fn default_request_timeout() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            identity: default_identity(),
            request_timeout_secs: default_request_timeout(),
            default_action: StreamAction::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Require HTTP Basic credentials on every request
    #[serde(default)]
    pub enabled: bool,

    /// Only members of this group may stream
    #[serde(default)]
    pub require_group: Option<String>,

    /// Accounts allowed to log in
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,

    /// Bcrypt hash of the password (generate with `streamproxy hash-password`)
    pub password_hash: String,

    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// Transcoder device nodes, tried in order
    #[serde(default = "default_device_paths")]
    pub device_paths: Vec<PathBuf>,

    /// Directory holding one property directory per device index
    #[serde(default = "default_property_root")]
    pub property_root: PathBuf,
}

fn default_device_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/dev/bcm_enc0"),
        PathBuf::from("/dev/bcm_enc1"),
    ]
}

fn default_property_root() -> PathBuf {
    PathBuf::from("/proc/stb/encoder")
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            device_paths: default_device_paths(),
            property_root: default_property_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Bytes buffered between the encoder and the client socket
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Bytes copied from the source to the encoder per write
    #[serde(default = "default_transfer_unit")]
    pub transfer_unit: usize,

    /// Poll interval while the encoder is starting up
    #[serde(default = "default_startup_poll_ms")]
    pub startup_poll_ms: u16,
}

fn default_queue_capacity() -> usize {
    1024 * 1024
}

fn default_transfer_unit() -> usize {
    256 * 188
}

fn default_startup_poll_ms() -> u16 {
    100
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            transfer_unit: default_transfer_unit(),
            startup_poll_ms: default_startup_poll_ms(),
        }
    }
}
