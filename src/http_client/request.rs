//! Rendered outbound requests.

use url::form_urlencoded;
use url::Url;

use crate::models::Server;

/// Path of every XML API call.
pub const SEARCH_PATH: &str = "/search/xml";

/// Parameter carrying the API key; redacted in log lines.
const SECRET_PARAM: &str = "key";

/// A request ready to go on the wire: host, path and ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRequest {
    pub server: Server,
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl RenderedRequest {
    pub fn new(server: Server, params: Vec<(&'static str, String)>) -> Self {
        Self {
            server,
            path: SEARCH_PATH,
            params,
        }
    }

    /// Value of a parameter, if rendered.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    fn encode<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    /// Canonical full URL, credentials included. Parameter order is the
    /// rendering order, so equal queries always give equal signatures.
    pub fn signature(&self) -> String {
        let query = Self::encode(self.params.iter().map(|(k, v)| (*k, v.as_str())));
        format!("{}{}?{}", self.server.base_url(), self.path, query)
    }

    pub fn url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.signature())
    }

    /// One-line description safe for logs and error messages.
    pub fn debug_line(&self) -> String {
        let query = Self::encode(self.params.iter().map(|(k, v)| {
            if *k == SECRET_PARAM {
                (*k, "***")
            } else {
                (*k, v.as_str())
            }
        }));
        format!("GET {}{}?{}", self.server.base_url(), self.path, query)
    }
}
