use anyhow::Result;

use super::UnhandledError;

/// Embedder callbacks.
pub trait Host {
    /// Resolve a module name to stub bytes.
    fn import(&mut self, module: &str) -> Result<Vec<u8>>;

    fn print(&mut self, text: &str);

    /// Notified once for every error catchable that reaches an empty call stack.
    fn unhandled_error(&mut self, _err: &UnhandledError) {}
}
