pub mod buffer_pool;
pub mod event_decoder;
pub mod sample_pipeline;
