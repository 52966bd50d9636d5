use crate::ConfigError;

/// Endpoint partitions the Rate Limiter buckets independently, per
/// spec.md §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Default,
    Auth,
    Tarot,
    Chat,
    Upload,
}

impl EndpointClass {
    fn env_suffix(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Auth => "AUTH",
            Self::Tarot => "TAROT",
            Self::Chat => "CHAT",
            Self::Upload => "UPLOAD",
        }
    }

    fn default_capacity(self) -> u32 {
        match self {
            Self::Default => 100,
            Self::Auth => 5,
            Self::Tarot => 10,
            Self::Chat => 20,
            Self::Upload => 5,
        }
    }
}

/// Requests-per-minute capacity for each [`EndpointClass`], overridable
/// via `RATE_LIMITS_<CLASS>` environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    default: u32,
    auth: u32,
    tarot: u32,
    chat: u32,
    upload: u32,
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            default: read(EndpointClass::Default)?,
            auth: read(EndpointClass::Auth)?,
            tarot: read(EndpointClass::Tarot)?,
            chat: read(EndpointClass::Chat)?,
            upload: read(EndpointClass::Upload)?,
        })
    }

    pub fn capacity_per_minute(&self, class: EndpointClass) -> u32 {
        match class {
            EndpointClass::Default => self.default,
            EndpointClass::Auth => self.auth,
            EndpointClass::Tarot => self.tarot,
            EndpointClass::Chat => self.chat,
            EndpointClass::Upload => self.upload,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: EndpointClass::Default.default_capacity(),
            auth: EndpointClass::Auth.default_capacity(),
            tarot: EndpointClass::Tarot.default_capacity(),
            chat: EndpointClass::Chat.default_capacity(),
            upload: EndpointClass::Upload.default_capacity(),
        }
    }
}

fn read(class: EndpointClass) -> Result<u32, ConfigError> {
    let name = format!("RATE_LIMITS_{}", class.env_suffix());
    match std::env::var(&name) {
        Err(_) => Ok(class.default_capacity()),
        Ok(value) => value.parse::<u32>().map_err(|e| ConfigError::InvalidVar {
            name,
            value,
            reason: e.to_string(),
        }),
    }
}
