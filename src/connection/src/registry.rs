use std::collections::HashMap;
use tokio::sync::oneshot;
use xf_types::{ChannelDescriptor, ChannelId, ChannelKey, Error, Result};

pub type Reply = oneshot::Sender<Result<ChannelId>>;

#[derive(Clone, Debug)]
pub struct ChannelMeta {
    pub key: ChannelKey,
    pub descriptor: ChannelDescriptor,
}

struct Pending {
    descriptor: ChannelDescriptor,
    waiters: Vec<Reply>,
}

#[derive(Debug, PartialEq)]
pub enum Lookup {
    Subscribed(ChannelId),
    Pending,
    Absent,
}

/// Subscription bookkeeping of one connection.
///
/// A key is never in `subs` and `pending` at once. While the socket is live a channel
/// id is in `channels` exactly when it is a value of `subs`; after a close `subs`
/// keeps its keys but their ids are no longer live and `lookup` reports them absent.
#[derive(Default)]
pub struct Registry {
    subs: HashMap<ChannelKey, ChannelId>,
    pending: HashMap<ChannelKey, Pending>,
    channels: HashMap<ChannelId, ChannelMeta>,
}

impl Registry {
    pub fn lookup(&self, key: &ChannelKey) -> Lookup {
        if let Some(id) = self.subs.get(key) {
            if self.channels.contains_key(id) {
                return Lookup::Subscribed(id.clone());
            }
        }
        if self.pending.contains_key(key) {
            Lookup::Pending
        } else {
            Lookup::Absent
        }
    }

    /// Adds a caller to a request that is already in flight.
    pub fn join(&mut self, key: &ChannelKey, reply: Reply) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.waiters.push(reply);
        }
    }

    pub fn begin(&mut self, key: ChannelKey, descriptor: ChannelDescriptor, reply: Reply) {
        self.subs.remove(&key);
        self.pending.insert(
            key,
            Pending {
                descriptor,
                waiters: vec![reply],
            },
        );
    }

    /// Registers a subscription that needs no acknowledgement.
    pub fn insert(&mut self, key: ChannelKey, id: ChannelId, descriptor: ChannelDescriptor) {
        self.pending.remove(&key);
        self.subs.insert(key.clone(), id.clone());
        self.channels.insert(id, ChannelMeta { key, descriptor });
    }

    pub fn find_pending(
        &self,
        mut matches: impl FnMut(&ChannelDescriptor) -> bool,
    ) -> Option<ChannelKey> {
        self.pending
            .iter()
            .find(|(_, p)| matches(&p.descriptor))
            .map(|(key, _)| key.clone())
    }

    /// Moves a pending request into `subs`/`channels` and resolves all its callers.
    pub fn commit(&mut self, key: &ChannelKey, id: ChannelId) -> bool {
        let Some(pending) = self.pending.remove(key) else {
            return false;
        };
        self.insert(key.clone(), id.clone(), pending.descriptor);
        for waiter in pending.waiters {
            let _ = waiter.send(Ok(id.clone()));
        }
        true
    }

    pub fn reject(&mut self, key: &ChannelKey, reason: &str) {
        if let Some(pending) = self.pending.remove(key) {
            for waiter in pending.waiters {
                let _ = waiter.send(Err(Error::SubscribeRejected(reason.to_string())));
            }
        }
    }

    /// Removes a committed subscription. The metadata is `None` when the id had
    /// already been invalidated by a close or disconnect.
    pub fn remove(&mut self, key: &ChannelKey) -> Option<(ChannelId, Option<ChannelMeta>)> {
        let id = self.subs.remove(key)?;
        let meta = self.channels.remove(&id);
        Some((id, meta))
    }

    pub fn meta(&self, id: &ChannelId) -> Option<&ChannelMeta> {
        self.channels.get(id)
    }

    pub fn contains_channel(&self, id: &ChannelId) -> bool {
        self.channels.contains_key(id)
    }

    /// Fails every pending request with `ConnectionClosed`.
    pub fn drop_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            for waiter in pending.waiters {
                let _ = waiter.send(Err(Error::ConnectionClosed));
            }
        }
    }

    /// Forgets the channel ids matching `predicate` and returns them. `subs` is untouched.
    pub fn drop_channels(&mut self, predicate: impl Fn(&ChannelId) -> bool) -> Vec<ChannelId> {
        let dropped: Vec<ChannelId> = self
            .channels
            .keys()
            .filter(|id| predicate(id))
            .cloned()
            .collect();
        for id in &dropped {
            self.channels.remove(id);
        }
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn channels_len(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::market;
    use xf_types::Exchange;

    fn descriptor() -> ChannelDescriptor {
        ChannelDescriptor::trades(market(Exchange::Bitfinex, "tBTCUSD"))
    }

    #[test]
    fn commit_resolves_every_waiter() {
        let mut registry = Registry::default();
        let d = descriptor();
        let key = d.key();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();

        registry.begin(key.clone(), d, tx1);
        assert_eq!(registry.lookup(&key), Lookup::Pending);
        registry.join(&key, tx2);

        assert!(registry.commit(&key, ChannelId::Numeric(7)));
        assert_eq!(rx1.try_recv().unwrap().unwrap(), ChannelId::Numeric(7));
        assert_eq!(rx2.try_recv().unwrap().unwrap(), ChannelId::Numeric(7));
        assert_eq!(registry.lookup(&key), Lookup::Subscribed(ChannelId::Numeric(7)));
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn reject_fails_waiters() {
        let mut registry = Registry::default();
        let d = descriptor();
        let key = d.key();
        let (tx, mut rx) = oneshot::channel();
        registry.begin(key.clone(), d, tx);

        registry.reject(&key, "symbol: invalid");

        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(Error::SubscribeRejected(reason)) if reason == "symbol: invalid"
        ));
        assert_eq!(registry.lookup(&key), Lookup::Absent);
    }

    #[test]
    fn dropped_channels_read_as_absent_but_keep_their_key() {
        let mut registry = Registry::default();
        let d = descriptor();
        let key = d.key();
        registry.insert(key.clone(), ChannelId::Numeric(3), d);

        registry.drop_channels(|_| true);

        assert_eq!(registry.lookup(&key), Lookup::Absent);
        let (id, meta) = registry.remove(&key).unwrap();
        assert_eq!(id, ChannelId::Numeric(3));
        assert!(meta.is_none());
    }

    #[test]
    fn begin_clears_a_stale_subscription() {
        let mut registry = Registry::default();
        let d = descriptor();
        let key = d.key();
        registry.insert(key.clone(), ChannelId::Numeric(3), d.clone());
        registry.drop_channels(|_| true);

        let (tx, _rx) = oneshot::channel();
        registry.begin(key.clone(), d, tx);

        assert!(registry.remove(&key).is_none());
        assert_eq!(registry.lookup(&key), Lookup::Pending);
    }

    #[test]
    fn drop_pending_reports_closed() {
        let mut registry = Registry::default();
        let d = descriptor();
        let (tx, mut rx) = oneshot::channel();
        registry.begin(d.key(), d, tx);

        registry.drop_pending();

        assert!(matches!(rx.try_recv().unwrap(), Err(Error::ConnectionClosed)));
    }
}
