//! Session event delegates for plain fetch tasks.

use std::sync::Arc;

use crate::{Outcome, Response};

/// Receives the events of plain fetch tasks, which have no completion closure.
pub trait SessionDelegate: Send + Sync {
    /// A non-redirect response arrived.
    fn on_response(&self, _response: &Response) {}

    /// A redirect response arrived that the transport did not follow.
    fn on_redirect(&self, _response: &Response) {}

    /// The logical request finished. Called exactly once per task.
    fn on_complete(&self, _outcome: &Outcome) {}
}

/// Ordered list of delegates notified one after another.
#[derive(Clone, Default)]
pub struct DelegateChain {
    delegates: Vec<Arc<dyn SessionDelegate>>,
}

impl DelegateChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delegate.
    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegates.push(delegate);
        self
    }

    /// Number of delegates.
    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    /// Whether the chain has no delegates.
    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl SessionDelegate for DelegateChain {
    fn on_response(&self, response: &Response) {
        for delegate in &self.delegates {
            delegate.on_response(response);
        }
    }

    fn on_redirect(&self, response: &Response) {
        for delegate in &self.delegates {
            delegate.on_redirect(response);
        }
    }

    fn on_complete(&self, outcome: &Outcome) {
        for delegate in &self.delegates {
            delegate.on_complete(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use parking_lot::Mutex;

    struct Named {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SessionDelegate for Named {
        fn on_response(&self, response: &Response) {
            self.log
                .lock()
                .push(format!("{}:response:{}", self.name, response.status().as_u16()));
        }

        fn on_complete(&self, outcome: &Outcome) {
            self.log
                .lock()
                .push(format!("{}:complete:{}", self.name, outcome.is_ok()));
        }
    }

    #[test]
    fn test_chain_notifies_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = DelegateChain::new()
            .with_delegate(Arc::new(Named { name: "a", log: log.clone() }))
            .with_delegate(Arc::new(Named { name: "b", log: log.clone() }));

        let response = Response::new(StatusCode::OK);
        chain.on_response(&response);
        chain.on_redirect(&response);
        chain.on_complete(&Ok(response));

        assert_eq!(
            *log.lock(),
            vec![
                "a:response:200",
                "b:response:200",
                "a:complete:true",
                "b:complete:true"
            ]
        );
        assert_eq!(chain.len(), 2);
    }
}
