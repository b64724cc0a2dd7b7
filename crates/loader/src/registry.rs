use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use ertdata_api::HttpTransport;
use ertdata_types::ConnectionKey;
use tracing::info;

use crate::DataLoader;

/// Hands out one shared [`DataLoader`] per connection key.
///
/// Entries are never evicted, so two requests for equal keys always yield
/// the same instance for the lifetime of the registry. All clients share the
/// registry's transport.
pub struct ClientRegistry {
    transport: Arc<dyn HttpTransport>,
    query_cache_capacity: usize,
    clients: Mutex<HashMap<ConnectionKey, Arc<DataLoader>>>,
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.len())
            .field("query_cache_capacity", &self.query_cache_capacity)
            .finish()
    }
}

impl ClientRegistry {
    pub fn new(transport: Arc<dyn HttpTransport>, query_cache_capacity: usize) -> Self {
        Self {
            transport,
            query_cache_capacity,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The client for `key`, created on first use.
    pub fn get_or_create(&self, key: ConnectionKey) -> Arc<DataLoader> {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&key) {
            return Arc::clone(client);
        }

        info!(base_url = %key.base_url(), "creating storage client");
        let client = Arc::new(DataLoader::new(
            key.clone(),
            Arc::clone(&self.transport),
            self.query_cache_capacity,
        ));
        clients.insert(key, Arc::clone(&client));
        client
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use ertdata_api::RawResponse;
    use std::thread;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(ScriptedTransport::new(|_| Ok(RawResponse::new(200, "{}"))), 0)
    }

    #[test]
    fn equal_keys_share_one_client() {
        let registry = registry();

        let first = registry.get_or_create(ConnectionKey::new("http://a.local", Some("t".into())));
        let second = registry.get_or_create(ConnectionKey::new("http://a.local", Some("t".into())));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn token_is_part_of_the_key() {
        let registry = registry();

        let with_token = registry.get_or_create(ConnectionKey::new("http://a.local", Some("t".into())));
        let other_token = registry.get_or_create(ConnectionKey::new("http://a.local", Some("u".into())));
        let anonymous = registry.get_or_create(ConnectionKey::new("http://a.local", None));

        assert!(!Arc::ptr_eq(&with_token, &other_token));
        assert!(!Arc::ptr_eq(&with_token, &anonymous));
        assert_eq!(anonymous.key().token(), None);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn concurrent_first_requests_agree() {
        let registry = Arc::new(registry());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_create(ConnectionKey::new("http://a.local", None)))
            })
            .collect();
        let clients: Vec<Arc<DataLoader>> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

        assert!(clients.iter().all(|client| Arc::ptr_eq(client, &clients[0])));
        assert_eq!(registry.len(), 1);
    }
}
