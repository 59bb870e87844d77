//! In-memory cache storage.
//!
//! Uses a tokio RwLock over an ordered list of named stores. Nothing is
//! persisted; dropping the value drops every generation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::Error;
use crate::request::{RequestKey, Response};

type Store = HashMap<RequestKey, Response>;

/// In-process [`CacheStorage`] backend. Clones share the same stores.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    stores: Arc<RwLock<Vec<(String, Store)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn position(stores: &[(String, Store)], name: &str) -> Option<usize> {
    stores.iter().position(|(n, _)| n == name)
}

fn open_mut<'a>(stores: &'a mut Vec<(String, Store)>, name: &str) -> &'a mut Store {
    let idx = match position(stores, name) {
        Some(idx) => idx,
        None => {
            stores.push((name.to_string(), HashMap::new()));
            stores.len() - 1
        }
    };
    &mut stores[idx].1
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let mut stores = self.stores.write().await;
        open_mut(&mut stores, name);
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        let stores = self.stores.read().await;
        Ok(position(&stores, name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let stores = self.stores.read().await;
        Ok(stores.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut stores = self.stores.write().await;
        match position(&stores, name) {
            Some(idx) => {
                stores.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, Error> {
        let stores = self.stores.read().await;
        Ok(position(&stores, name).and_then(|idx| stores[idx].1.get(key).cloned()))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<(), Error> {
        let mut stores = self.stores.write().await;
        open_mut(&mut stores, name).insert(key.clone(), response.clone());
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<(), Error> {
        let mut stores = self.stores.write().await;
        let store = open_mut(&mut stores, name);
        for (key, response) in entries {
            store.insert(key.clone(), response.clone());
        }
        Ok(())
    }

    async fn entry_count(&self, name: &str) -> Result<u64, Error> {
        let stores = self.stores.read().await;
        Ok(position(&stores, name).map_or(0, |idx| stores[idx].1.len() as u64))
    }
}
