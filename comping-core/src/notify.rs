//! Change notification with scoped subscriptions.
//!
//! A [`Notifier`] fans an event out to every live subscriber. Subscribing
//! returns a [`Subscription`]; dropping it unsubscribes, so a listener can
//! never outlive the object that registered it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

pub struct Notifier<E> {
    inner: Arc<Mutex<Listeners<E>>>,
}

impl<E: 'static> Notifier<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut listeners = self.listeners();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::new(callback)));
            id
        };
        let weak: Weak<Mutex<Listeners<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut listeners = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    listeners.entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Call every subscriber. Callbacks run outside the internal lock, so a
    /// callback may subscribe or drop subscriptions.
    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .listeners()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().entries.len()
    }
}

impl<E: 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

/// Live registration on a [`Notifier`]. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an arbitrary unregistration action.
    pub(crate) fn from_cancel(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now. Same as dropping.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dropping_subscription_unsubscribes() {
        let notifier: Notifier<u32> = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = notifier.subscribe(move |v| {
            c.fetch_add(*v as usize, Ordering::SeqCst);
        });
        notifier.notify(&2);
        assert_eq!(notifier.listener_count(), 1);
        drop(sub);
        notifier.notify(&5);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn subscription_outliving_notifier_is_harmless() {
        let notifier: Notifier<()> = Notifier::new();
        let sub = notifier.subscribe(|_| {});
        drop(notifier);
        drop(sub);
    }

    #[test]
    fn callback_may_subscribe_during_notify() {
        let notifier: Notifier<()> = Notifier::new();
        let n2 = notifier.clone();
        let held = Arc::new(Mutex::new(Vec::new()));
        let h = Arc::clone(&held);
        let _sub = notifier.subscribe(move |_| {
            h.lock().unwrap().push(n2.subscribe(|_| {}));
        });
        notifier.notify(&());
        assert_eq!(notifier.listener_count(), 2);
    }
}
