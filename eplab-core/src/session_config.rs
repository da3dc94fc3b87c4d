use crate::provider::{self, ExecutionProvider};
use std::collections::BTreeMap;

/// Provider specific session options, keyed by option name.
///
/// The provider itself is always attached to the session; an empty option
/// set means "provider defaults".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    provider: String,
    options: BTreeMap<String, String>,
}

impl SessionConfig {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }
}

struct ProviderTuning {
    provider: &'static str,
    options: &'static [(&'static str, &'static str)],
}

// Providers missing from this table run with their defaults.
const TUNINGS: &[ProviderTuning] = &[
    ProviderTuning {
        provider: provider::OPENVINO,
        options: &[("num_of_threads", "4")],
    },
    ProviderTuning {
        provider: provider::QNN,
        options: &[("htp_performance_mode", "high_performance")],
    },
];

pub fn configure(provider: &ExecutionProvider) -> SessionConfig {
    let options = TUNINGS
        .iter()
        .find(|t| t.provider == provider.name())
        .map(|t| {
            t.options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    SessionConfig {
        provider: provider.name().to_string(),
        options,
    }
}
