//! [`StateCell`] – a single-writer observable value.
//!
//! Wraps a [`tokio::sync::watch`] channel. The owning component holds the
//! cell and is the only writer; everyone else holds a
//! [`watch::Receiver`] and sees the latest value plus a change signal.
//! Writing a value equal to the current one is a no-op and wakes nobody.

use tokio::sync::watch;

/// Owned, observable state with change notification.
#[derive(Debug)]
pub struct StateCell<T> {
    sender: watch::Sender<T>,
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq,
{
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Replace the value. Returns `true` if it changed (and observers were
    /// notified).
    pub fn set(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// A new observer. Its first `changed()` resolves on the next write.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T> Default for StateCell<T>
where
    T: Clone + PartialEq + Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_change_only_when_value_differs() {
        let cell = StateCell::new(1u32);
        assert!(!cell.set(1));
        assert!(cell.set(2));
        assert_eq!(cell.get(), 2);
    }

    #[tokio::test]
    async fn subscribers_are_not_woken_by_equal_writes() {
        let cell = StateCell::new(String::from("lab"));
        let mut rx = cell.subscribe();

        cell.set("lab".to_string());
        assert!(!rx.has_changed().unwrap());

        cell.set("kitchen".to_string());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), "kitchen");
    }
}
