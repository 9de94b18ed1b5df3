use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::counter::config::{ConfigPatch, Configuration, encode};
use crate::counter::params::QueryParams;

/// Where the shareable parameter set lives, conventionally a URL query.
pub trait ParamProvider {
    fn get(&self) -> QueryParams;
    fn replace(&mut self, params: QueryParams);
    /// Identity of the current snapshot; changes on every `replace`, even
    /// when the new parameters equal the old ones.
    fn revision(&self) -> u64;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryParams {
    params: QueryParams,
    revision: u64,
}

impl MemoryParams {
    pub fn new(params: QueryParams) -> Self {
        Self {
            params,
            revision: 0,
        }
    }

    pub fn from_query(query: &str) -> Self {
        Self::new(QueryParams::parse(query))
    }
}

impl ParamProvider for MemoryParams {
    fn get(&self) -> QueryParams {
        self.params.clone()
    }

    fn replace(&mut self, params: QueryParams) {
        self.params = params;
        self.revision = self.revision.wrapping_add(1);
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Typed view over a [`ParamProvider`].
pub struct ConfigStore<P: ParamProvider> {
    provider: P,
    clock: Arc<dyn Clock>,
}

impl<P: ParamProvider> ConfigStore<P> {
    pub fn new(provider: P, clock: Arc<dyn Clock>) -> Self {
        Self { provider, clock }
    }

    /// Decoded fresh from the provider on every call.
    pub fn read(&self) -> Configuration {
        Configuration::decode(&self.provider.get(), self.clock.now())
    }

    pub fn params(&self) -> QueryParams {
        self.provider.get()
    }

    pub fn revision(&self) -> u64 {
        self.provider.revision()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Parameters a merge of `patch` would produce, without writing them.
    pub fn preview_merge(&self, patch: &ConfigPatch) -> QueryParams {
        let mut next = self.provider.get();
        for value in patch.values() {
            let key = value.field().key();
            let encoded = encode(&value);
            next.delete(key);
            if !encoded.is_empty() {
                next.append(key, encoded);
            }
        }
        next
    }

    /// Writes every field present in `patch`; other keys are left alone.
    pub fn merge(&mut self, patch: &ConfigPatch) {
        let next = self.preview_merge(patch);
        debug!("merging configuration patch into '{next}'");
        self.provider.replace(next);
    }

    /// Replaces the whole parameter set, as following a shared link does.
    pub fn navigate(&mut self, params: QueryParams) {
        debug!("navigating to '{params}'");
        self.provider.replace(params);
    }
}
