//! Endpoint registry with ordered startup and shutdown.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use conduit_core::{MessagingError, MessagingResult};

use crate::lifecycle::Endpoint;

/// Registered endpoints, started in registration order and stopped in
/// reverse.
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<Arc<dyn Endpoint>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(Vec::new()),
        }
    }

    /// Register an endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint with the same name is registered.
    pub fn register(&self, endpoint: Arc<dyn Endpoint>) -> MessagingResult<()> {
        let mut endpoints = self.endpoints.write();
        if endpoints.iter().any(|e| e.name() == endpoint.name()) {
            return Err(MessagingError::configuration(format!(
                "endpoint '{}' is already registered",
                endpoint.name()
            )));
        }
        endpoints.push(endpoint);
        Ok(())
    }

    /// Get an endpoint by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Endpoint>> {
        self.endpoints
            .read()
            .iter()
            .find(|e| e.name() == name)
            .cloned()
    }

    /// Start every auto-startup endpoint.
    ///
    /// On failure, endpoints started by this call are stopped again in
    /// reverse order and the error is returned.
    pub fn start_all(&self) -> MessagingResult<()> {
        let endpoints = self.endpoints.read();
        let mut started: Vec<&Arc<dyn Endpoint>> = Vec::new();

        for endpoint in endpoints.iter().filter(|e| e.lifecycle().is_auto_startup()) {
            if endpoint.is_running() {
                continue;
            }
            if let Err(e) = endpoint.start() {
                error!(endpoint = %endpoint.name(), error = %e, "Failed to start endpoint");
                for started_endpoint in started.iter().rev() {
                    started_endpoint.stop();
                }
                return Err(e);
            }
            started.push(endpoint);
        }

        info!(started = started.len(), "Endpoints started");
        Ok(())
    }

    /// Stop every endpoint, last registered first.
    pub fn stop_all(&self) {
        for endpoint in self.endpoints.read().iter().rev() {
            endpoint.stop();
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        self.endpoints
            .read()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::lifecycle::EndpointLifecycle;

    struct Recorded {
        lifecycle: EndpointLifecycle,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Recorded {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                lifecycle: EndpointLifecycle::new(name),
                log: log.clone(),
                fail: false,
            })
        }

        fn failing(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                lifecycle: EndpointLifecycle::new(name),
                log: log.clone(),
                fail: true,
            })
        }
    }

    impl Endpoint for Recorded {
        fn lifecycle(&self) -> &EndpointLifecycle {
            &self.lifecycle
        }

        fn do_start(&self) -> MessagingResult<()> {
            if self.fail {
                return Err(MessagingError::Internal("refused".into()));
            }
            self.log.lock().push(format!("start {}", self.name()));
            Ok(())
        }

        fn do_stop(&self) {
            self.log.lock().push(format!("stop {}", self.name()));
        }
    }

    #[test]
    fn test_start_and_stop_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = EndpointRegistry::new();
        registry.register(Recorded::new("a", &log)).unwrap();
        registry.register(Recorded::new("b", &log)).unwrap();

        registry.start_all().unwrap();
        registry.stop_all();

        assert_eq!(*log.lock(), vec!["start a", "start b", "stop b", "stop a"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = EndpointRegistry::default();
        registry.register(Recorded::new("same", &log)).unwrap();
        assert!(registry.register(Recorded::new("same", &log)).is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_names(), vec!["same".to_string()]);
    }

    #[test]
    fn test_manual_endpoints_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = EndpointRegistry::new();
        let manual = Recorded::new("manual", &log);
        manual.lifecycle().set_auto_startup(false);
        registry.register(manual.clone()).unwrap();
        registry.register(Recorded::new("auto", &log)).unwrap();

        registry.start_all().unwrap();
        assert!(!manual.is_running());
        assert!(registry.get("auto").unwrap().is_running());
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = EndpointRegistry::new();
        registry.register(Recorded::new("first", &log)).unwrap();
        registry.register(Recorded::new("second", &log)).unwrap();
        registry.register(Recorded::failing("broken", &log)).unwrap();

        assert!(registry.start_all().is_err());
        assert_eq!(
            *log.lock(),
            vec!["start first", "start second", "stop second", "stop first"]
        );
        assert!(!registry.get("first").unwrap().is_running());
        assert!(registry.get("missing").is_none());
        assert!(!registry.is_empty());
    }
}
