//! Endpoint string parsing
//!
//! Turns a user-supplied ingest URL such as `rtmp://10.0.0.59:1935/app/key`
//! into a [`ConnectionTarget`].

use serde::Serialize;
use url::{Host, Url};

use crate::config::TargetConfig;
use crate::error::ParseError;

/// Where to connect and what to publish
///
/// Built once per `start()` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTarget {
    host: String,
    port: u16,
    application: String,
    stream_key: String,
}

impl ConnectionTarget {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }
}

/// The stream key is left out so it never ends up in logs.
impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rtmp://{}:{}/{}", self.host, self.port, self.application)
    }
}

/// Parse an endpoint string with the built-in defaults
pub fn parse_target(raw: &str) -> Result<ConnectionTarget, ParseError> {
    parse_target_with(raw, &TargetConfig::default())
}

/// Parse an endpoint string
///
/// Path rules:
/// - two or more segments: first is the application, last is the stream key
/// - one segment: used as both application and stream key
/// - no segments: the default application fills both fields
pub fn parse_target_with(raw: &str, defaults: &TargetConfig) -> Result<ConnectionTarget, ParseError> {
    let url = Url::parse(raw.trim()).map_err(|e| match e {
        url::ParseError::InvalidPort => ParseError::InvalidPort(raw.to_string()),
        other => ParseError::InvalidUri {
            input: raw.to_string(),
            reason: other.to_string(),
        },
    })?;

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => defaults.default_host.clone(),
    };

    let port = match url.port() {
        Some(0) => return Err(ParseError::InvalidPort(raw.to_string())),
        Some(port) => port,
        None => defaults.default_port,
    };

    if url.cannot_be_a_base() {
        return Err(ParseError::NotHierarchical(raw.to_string()));
    }

    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(decode_segment)
        .collect();

    // A single name fills both fields; kept as-is for compatibility with
    // existing endpoint strings.
    let (application, stream_key) = match segments.as_slice() {
        [] => (
            defaults.default_application.clone(),
            defaults.default_application.clone(),
        ),
        [only] => (only.clone(), only.clone()),
        [first, .., last] => (first.clone(), last.clone()),
    };

    Ok(ConnectionTarget {
        host,
        port,
        application,
        stream_key,
    })
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_segments() {
        let target = parse_target("rtmp://10.0.0.59:1935/iphone_app/stream1").unwrap();
        assert_eq!(target.host(), "10.0.0.59");
        assert_eq!(target.port(), 1935);
        assert_eq!(target.application(), "iphone_app");
        assert_eq!(target.stream_key(), "stream1");
    }

    #[test]
    fn test_single_segment_collapses() {
        let target = parse_target("rtmp://10.0.0.59:1935/iphone_stream").unwrap();
        assert_eq!(target.application(), "iphone_stream");
        assert_eq!(target.stream_key(), "iphone_stream");
    }

    #[test]
    fn test_first_and_last_of_many_segments() {
        let target = parse_target("rtmp://ingest.example.com/app/region/eu/key42").unwrap();
        assert_eq!(target.application(), "app");
        assert_eq!(target.stream_key(), "key42");
    }

    #[test]
    fn test_scheme_is_not_interpreted() {
        for scheme in ["rtmp", "rtmps", "http", "srt"] {
            let target = parse_target(&format!("{}://media.local:2000/app/key", scheme)).unwrap();
            assert_eq!(target.host(), "media.local");
            assert_eq!(target.port(), 2000);
            assert_eq!(target.application(), "app");
            assert_eq!(target.stream_key(), "key");
        }
    }

    #[test]
    fn test_missing_port_defaults_to_1935() {
        let target = parse_target("rtmp://media.local/app/key").unwrap();
        assert_eq!(target.port(), 1935);

        // Well-known scheme ports are ignored as well
        let target = parse_target("http://media.local/app/key").unwrap();
        assert_eq!(target.port(), 1935);
    }

    #[test]
    fn test_missing_host_defaults_to_localhost() {
        let target = parse_target("rtmp:/app/key").unwrap();
        assert_eq!(target.host(), "localhost");
        assert_eq!(target.port(), 1935);
        assert_eq!(target.application(), "app");
        assert_eq!(target.stream_key(), "key");
    }

    #[test]
    fn test_empty_path_uses_default_application() {
        let target = parse_target("rtmp://media.local:1936").unwrap();
        assert_eq!(target.application(), "live");
        assert_eq!(target.stream_key(), "live");
    }

    #[test]
    fn test_trailing_slash_and_encoding() {
        let target = parse_target("rtmp://media.local/my%20app/key%2Fone/").unwrap();
        assert_eq!(target.application(), "my app");
        assert_eq!(target.stream_key(), "key/one");
    }

    #[test]
    fn test_ipv6_host() {
        let target = parse_target("rtmp://[::1]:1935/app/key").unwrap();
        assert_eq!(target.host(), "::1");
    }

    #[test]
    fn test_custom_defaults() {
        let defaults = TargetConfig {
            default_host: "ingest.internal".to_string(),
            default_port: 1940,
            default_application: "main".to_string(),
        };
        let target = parse_target_with("rtmp:/", &defaults).unwrap();
        assert_eq!(target.host(), "ingest.internal");
        assert_eq!(target.port(), 1940);
        assert_eq!(target.application(), "main");
    }

    #[test]
    fn test_invalid_uri() {
        assert!(matches!(
            parse_target("not a url"),
            Err(ParseError::InvalidUri { .. })
        ));
        assert!(matches!(parse_target(""), Err(ParseError::InvalidUri { .. })));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(
            parse_target("rtmp://media.local:0/app/key"),
            Err(ParseError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_target("rtmp://media.local:70000/app/key"),
            Err(ParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_opaque_uri_rejected() {
        assert!(matches!(
            parse_target("rtmp:app/key"),
            Err(ParseError::NotHierarchical(_))
        ));
    }

    #[test]
    fn test_display_hides_stream_key() {
        let target = parse_target("rtmp://media.local/app/secret").unwrap();
        assert_eq!(target.to_string(), "rtmp://media.local:1935/app");
    }
}
