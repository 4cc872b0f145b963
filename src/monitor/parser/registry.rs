// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use super::evrima::TheIsleParser;
use super::path_of_titans::PathOfTitansParser;
use super::traits::EventParser;
use crate::monitor::error::{Error, Result};

/// Parsers keyed by log format. Adding a game means registering a parser here.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn EventParser>>,
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in game format.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(TheIsleParser::new()?));
        registry.register(Arc::new(PathOfTitansParser::new()?));
        Ok(registry)
    }

    /// Register a parser under its own name, replacing any previous one.
    pub fn register(&mut self, parser: Arc<dyn EventParser>) {
        self.parsers.insert(parser.name().to_string(), parser);
    }

    pub fn get(&self, log_format: &str) -> Result<Arc<dyn EventParser>> {
        self.parsers
            .get(log_format)
            .cloned()
            .ok_or_else(|| Error::UnknownLogFormat(log_format.to_string()))
    }

    /// Registered format keys, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}
