//! Service layer
//!
//! Services contain business logic for the runner: launching apps and
//! buffering their output.
//!
//! All services are trait-based to enable testing and dependency injection.

mod execution;
mod log_buffer;

// Re-export traits
pub use execution::ExecutionService;
pub use log_buffer::LogBufferService;

// Re-export implementations
pub use execution::ProcessExecutionService;
pub use log_buffer::InMemoryLogBuffer;
