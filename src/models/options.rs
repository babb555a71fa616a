//! Enumerated search options and their bounds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Server;

/// Maximum query length in characters.
pub const QUERY_MAX: usize = 400;

pub const DOCS_MIN: u32 = 1;
pub const DOCS_MAX: u32 = 3;
pub const DOCS_DEFAULT: u32 = DOCS_MIN;

pub const SNIPPETS_MIN: u32 = 1;
pub const SNIPPETS_MAX: u32 = 5;
pub const SNIPPETS_DEFAULT: u32 = SNIPPETS_MIN;

pub const LIMIT_MIN: u32 = 1;
pub const LIMIT_MAX: u32 = 100;
pub const LIMIT_DEFAULT: u32 = 50;

pub const PAGE_MIN: u32 = 0;
pub const PAGE_DEFAULT: u32 = PAGE_MIN;

pub const REGION_MIN: u32 = 1;

/// Declares a closed set of wire values with parsing and display.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident default $default:ident {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const DEFAULT: $name = $name::$default;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            /// Comma separated list of accepted wire values.
            pub fn allowed() -> String {
                Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(",")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(format!(
                        "'{}' is not one of: {}",
                        other,
                        Self::allowed()
                    )),
                }
            }
        }
    };
}

wire_enum! {
    /// Interface language of notices in the response.
    Lang default Ru {
        Ru => "ru",
        Uk => "uk",
        Be => "be",
        Kk => "kk",
        Tr => "tr",
        En => "en",
    }
}

wire_enum! {
    /// Adult content filtering.
    Filter default Moderate {
        None => "none",
        Moderate => "moderate",
        Strict => "strict",
    }
}

wire_enum! {
    /// Result ordering: relevance or modification time.
    Sort default Rlv {
        Rlv => "rlv",
        Tm => "tm",
    }
}

wire_enum! {
    /// Direction for time sorting.
    Order default Descending {
        Ascending => "ascending",
        Descending => "descending",
    }
}

wire_enum! {
    /// Grouping of documents by domain.
    Group default Deep {
        Flat => "flat",
        Deep => "deep",
    }
}

impl Lang {
    /// Languages accepted by a given endpoint.
    pub fn allowed_for(server: Server) -> &'static [Lang] {
        match server {
            Server::Ru => &[Lang::Ru, Lang::Uk, Lang::Be, Lang::Kk],
            Server::Tr => &[Lang::Tr],
            Server::Com => &[Lang::En],
        }
    }
}
