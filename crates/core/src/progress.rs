//! Narrow callback channel from the storage engine to whatever wants to
//! observe its save lifecycle (principally the audit logger). Keeping this a
//! small trait rather than a direct dependency means the storage engine
//! never needs to know auditing exists.

/// Receives named lifecycle events from an atomic save. `meta` is a small
/// set of non-secret key/value pairs (paths, event names), never key
/// material or plaintext.
pub trait ProgressSink {
    fn on_event(&self, name: &str, meta: &[(&str, &str)]);
}

/// Default sink that discards every event.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_event(&self, _name: &str, _meta: &[(&str, &str)]) {}
}
