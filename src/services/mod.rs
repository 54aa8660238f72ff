pub mod annotate;
pub mod assembler;
pub mod inference;
pub mod job_source;
pub mod model_server;
pub mod result_sink;
