use std::sync::Arc;

use tokio::sync::watch;

/// Shared chat input text.
///
/// Written by the user and by speech capture partials, taken by submit.
/// Clones share the same buffer; subscribers see every change.
#[derive(Debug, Clone)]
pub struct InputBuffer {
    tx: Arc<watch::Sender<String>>,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBuffer {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(String::new());
        Self { tx: Arc::new(tx) }
    }

    /// Replace the buffer contents
    pub fn set(&self, text: impl Into<String>) {
        self.tx.send_replace(text.into());
    }

    pub fn get(&self) -> String {
        self.tx.borrow().clone()
    }

    /// Return the contents and leave the buffer empty
    pub fn take(&self) -> String {
        self.tx.send_replace(String::new())
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears_buffer() {
        let buffer = InputBuffer::new();
        buffer.set("hello");
        assert_eq!(buffer.take(), "hello");
        assert_eq!(buffer.get(), "");
    }

    #[tokio::test]
    async fn test_clones_share_contents_and_notify() {
        let buffer = InputBuffer::new();
        let writer = buffer.clone();
        let mut rx = buffer.subscribe();

        writer.set("partial");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), "partial");
        assert_eq!(buffer.get(), "partial");
    }
}
