//! Verb table and optional access-policy hook for the SPMP RPC plane.

use std::collections::HashMap;

use pnet_packets::SpmpPacket;

/// One SPMP verb's implementation: `args` is the request's positional
/// argument list, the return value is the response's `result` (on success)
/// or `error` (on failure).
pub type Verb = Box<dyn Fn(&[String]) -> Result<String, String> + Send + Sync>;

/// Consulted before a verb runs. Returning `false` turns the request into
/// an error response without invoking the verb at all.
pub trait AccessPolicy: Send + Sync {
    fn allow(&self, verb: &str, args: &[String]) -> bool;
}

/// An `AccessPolicy` that permits only a fixed set of verb names.
pub struct AllowList(pub Vec<String>);

impl AccessPolicy for AllowList {
    fn allow(&self, verb: &str, _args: &[String]) -> bool {
        self.0.iter().any(|v| v == verb)
    }
}

#[derive(Default)]
pub struct Dispatcher {
    verbs: HashMap<String, Verb>,
    access_policy: Option<Box<dyn AccessPolicy>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    pub fn register(&mut self, verb: impl Into<String>, callable: impl Fn(&[String]) -> Result<String, String> + Send + Sync + 'static) {
        self.verbs.insert(verb.into(), Box::new(callable));
    }

    pub fn set_access_policy(&mut self, policy: Box<dyn AccessPolicy>) {
        self.access_policy = Some(policy);
    }

    /// Handle one request, producing exactly one response: an access-policy
    /// rejection, an unknown-verb error, or the verb's own `Ok`/`Err`.
    pub fn dispatch(&self, request: &SpmpPacket) -> SpmpPacket {
        if let Some(policy) = &self.access_policy {
            if !policy.allow(&request.request, &request.args) {
                tracing::debug!(verb = %request.request, "spmp: access policy denied verb");
                return SpmpPacket::err(request.request_id, format!("verb {:?} not permitted", request.request));
            }
        }
        match self.verbs.get(&request.request) {
            Some(callable) => match callable(&request.args) {
                Ok(result) => SpmpPacket::ok(request.request_id, result),
                Err(message) => SpmpPacket::err(request.request_id, message),
            },
            None => SpmpPacket::err(request.request_id, format!("unknown verb {:?}", request.request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_verb_returns_an_error_response() {
        let dispatcher = Dispatcher::new();
        let response = dispatcher.dispatch(&SpmpPacket::request(1, "status", vec![]));
        assert_eq!(response.request_id, 1);
        assert!(response.error.is_some());
    }

    #[test]
    fn registered_verb_runs_and_returns_its_result() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("echo", |args| Ok(args.join(",")));
        let response = dispatcher.dispatch(&SpmpPacket::request(2, "echo", vec!["a".into(), "b".into()]));
        assert_eq!(response.error, None);
        assert_eq!(response.result, "a,b");
    }

    #[test]
    fn a_verb_can_fail_without_an_access_policy_involved() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("divide", |args| {
            let n: i64 = args[0].parse().map_err(|_| "not a number".to_string())?;
            let d: i64 = args[1].parse().map_err(|_| "not a number".to_string())?;
            if d == 0 {
                return Err("division by zero".into());
            }
            Ok((n / d).to_string())
        });
        let response = dispatcher.dispatch(&SpmpPacket::request(3, "divide", vec!["4".into(), "0".into()]));
        assert_eq!(response.error.as_deref(), Some("division by zero"));
    }

    #[test]
    fn access_policy_rejects_before_the_verb_runs() {
        let mut dispatcher = Dispatcher::new();
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_clone = ran.clone();
        dispatcher.register("danger", move |_args| {
            ran_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(String::new())
        });
        dispatcher.set_access_policy(Box::new(AllowList(vec!["status".into()])));

        let response = dispatcher.dispatch(&SpmpPacket::request(4, "danger", vec![]));
        assert!(response.error.is_some());
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
