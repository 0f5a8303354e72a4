//! Registry trait for self-registering implementations.
//!
//! Every pluggable backend (storage, identity) exposes a `Registry` struct
//! implementing this trait so the service can map configuration names to
//! factory functions without hard-coding them.

/// Base trait for implementation registries.
///
/// Each implementation module must provide a Registry struct that implements
/// this trait, declaring the name it is configured under and the factory
/// that builds it.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This should match the key used in the TOML configuration, for example:
	/// - "memory" for storage.implementations.memory
	/// - "static" for identity.implementations.static
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
