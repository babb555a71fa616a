//! Search endpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the three Yandex XML endpoints.
///
/// Only `Ru` enforces a per-second request cap; the other two are limited
/// by the hourly quota alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Server {
    #[default]
    #[serde(rename = "yandex.ru")]
    Ru,
    #[serde(rename = "yandex.com.tr")]
    Tr,
    #[serde(rename = "yandex.com")]
    Com,
}

impl Server {
    pub const ALL: [Server; 3] = [Server::Ru, Server::Tr, Server::Com];

    /// Host name used as the request base.
    pub fn host(&self) -> &'static str {
        match self {
            Server::Ru => "yandex.ru",
            Server::Tr => "yandex.com.tr",
            Server::Com => "yandex.com",
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.host())
    }

    /// Whether the per-second cap derived from the hourly quota applies.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Server::Ru)
    }

    /// Whether the `lr` (region) parameter is accepted.
    pub fn supports_region(&self) -> bool {
        matches!(self, Server::Ru | Server::Tr)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host())
    }
}

impl FromStr for Server {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yandex.ru" | "ru" => Ok(Server::Ru),
            "yandex.com.tr" | "tr" => Ok(Server::Tr),
            "yandex.com" | "com" => Ok(Server::Com),
            other => Err(format!(
                "unknown server '{}', expected one of yandex.ru, yandex.com.tr, yandex.com",
                other
            )),
        }
    }
}
