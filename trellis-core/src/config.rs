//! Runtime configuration.
//!
//! Both option structs deserialize from partial JSON: missing fields take
//! their defaults, so a host can ship `{}` or `{"ssr": true}`.

use serde::{Deserialize, Serialize};

/// Options for [`create_app`](crate::create_app).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    /// Server-side mode: event handlers are not bound to backend nodes and
    /// teleports render in place.
    pub ssr: bool,
}

/// Options shared by the watch family and registry registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Number of deliveries after which the listener disposes itself;
    /// 0 means unlimited.
    pub limit: u32,
    /// Coalesce the changes of one turn into a single delivery.
    pub batch: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            batch: true,
        }
    }
}

impl WatchOptions {
    /// Deliver synchronously, once per change.
    pub fn immediate() -> Self {
        Self {
            batch: false,
            ..Self::default()
        }
    }

    /// Dispose after `limit` deliveries.
    pub fn limited(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let watch: WatchOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(watch, WatchOptions::default());
        assert!(watch.batch);

        let watch: WatchOptions = serde_json::from_str(r#"{"limit": 2, "batch": false}"#).unwrap();
        assert_eq!(watch.limit, 2);
        assert!(!watch.batch);

        let app: AppOptions = serde_json::from_str(r#"{"ssr": true}"#).unwrap();
        assert!(app.ssr);
    }

    #[test]
    fn options_serialize() {
        let json = serde_json::to_value(WatchOptions::limited(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "limit": 3, "batch": true }));
    }
}
