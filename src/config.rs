//! Decoder configuration.

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::netflow::TemplateCache;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not parse decoder configuration: {source}"))]
    Parse { source: toml::de::Error },
}

/// Which namespace wins when a Data FlowSet ID is cached both as a Template
/// and as an Options-Template for the same exporter.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupPrecedence {
    /// Look in the Options-Template namespace first.
    #[default]
    OptionsFirst,

    /// Look in the Template namespace first.
    TemplatesFirst,
}

/// Configuration for the FlowSet decoder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DecoderConfig {
    /// Namespace precedence for Data FlowSet template resolution.
    #[serde(default)]
    pub lookup_precedence: LookupPrecedence,

    /// Learn Options-Templates and decode Options Data records.
    ///
    /// When disabled, Options-Template FlowSets are skipped by their declared length.
    #[serde(default = "default_true")]
    pub parse_options_templates: bool,

    /// Type enterprise-scoped IPFIX values.
    ///
    /// When disabled, enterprise-scoped values are kept as raw bytes.
    #[serde(default = "default_true")]
    pub parse_enterprise_fields: bool,

    /// Upper bound on the number of distinct cached templates.
    ///
    /// Redefinitions of an already cached template are always accepted; only
    /// new keys are refused once the bound is reached.
    #[serde(default)]
    pub max_templates: Option<usize>,

    /// Maximum number of characters a rendered value may occupy before it is truncated.
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_max_value_len() -> usize {
    64
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            lookup_precedence: LookupPrecedence::default(),
            parse_options_templates: default_true(),
            parse_enterprise_fields: default_true(),
            max_templates: None,
            max_value_len: default_max_value_len(),
        }
    }
}

impl DecoderConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).context(ParseSnafu)
    }

    /// Builds an empty template cache honoring `max_templates`.
    pub fn build_cache(&self) -> TemplateCache {
        match self.max_templates {
            Some(limit) => TemplateCache::with_max_templates(limit),
            None => TemplateCache::new(),
        }
    }
}
