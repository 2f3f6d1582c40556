use std::sync::Arc;

/// Callback receiving decoded records of one kind.
///
/// Called on the delivery context only, never concurrently with another
/// subscriber callback. Keep it short; a slow subscriber delays every channel.
pub type Subscriber<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;
