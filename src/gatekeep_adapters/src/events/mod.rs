pub mod redis_event_sink;
pub mod tracing_event_sink;
